//! Persistence seam and the on-disk implementation.
//!
//! Layout under the data root:
//!
//! ```text
//! zones/<zid>.<zname>/<zid>.<zname>.nfo
//! zones/<zid>.<zname>/rooms/<rid>.<rname>.room
//! players/<name>.player
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::graph::{Zone, build_zone};
use crate::record::{AreaRecord, PlayerRecord, RecordError};

pub trait Store {
    /// Every zone with its rooms. A record that can't be read is an error.
    fn load_zones(&self) -> anyhow::Result<Vec<Zone>>;

    fn save_zone(&self, zone: &Zone) -> anyhow::Result<()>;

    /// `Absent` when no record exists; `Malformed` when one exists but fails
    /// to parse.
    fn load_player(&self, name: &str) -> Result<PlayerRecord, RecordError>;

    fn save_player(&self, rec: &PlayerRecord) -> Result<(), RecordError>;

    /// Whether any character has ever been saved.
    fn has_players(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn zones_dir(&self) -> PathBuf {
        self.root.join("zones")
    }

    fn players_dir(&self) -> PathBuf {
        self.root.join("players")
    }

    fn player_path(&self, name: &str) -> PathBuf {
        self.players_dir()
            .join(format!("{}.player", name.to_lowercase()))
    }
}

/// `"<id>.<name>"` with the given extension stripped first.
fn split_stem(file_name: &str, ext: Option<&str>) -> Option<(String, String)> {
    let stem = match ext {
        Some(ext) => file_name.strip_suffix(ext)?.strip_suffix('.')?,
        None => file_name,
    };
    let (id, name) = stem.split_once('.')?;
    if id.is_empty() {
        return None;
    }
    Some((id.to_string(), name.to_string()))
}

fn sorted_entries(dir: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for ent in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let ent = ent?;
        let Ok(name) = ent.file_name().into_string() else {
            continue;
        };
        out.push((name, ent.path()));
    }
    out.sort();
    Ok(out)
}

fn read_area(path: &Path) -> anyhow::Result<AreaRecord> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    AreaRecord::parse(&text).with_context(|| format!("parse {}", path.display()))
}

impl Store for FileStore {
    fn load_zones(&self) -> anyhow::Result<Vec<Zone>> {
        let dir = self.zones_dir();
        let mut zones = Vec::new();
        for (dir_name, path) in sorted_entries(&dir)? {
            if !path.is_dir() {
                continue;
            }
            let Some((zid, zname)) = split_stem(&dir_name, None) else {
                debug!(dir = %path.display(), "skipping non-zone directory");
                continue;
            };
            let zrec = read_area(&path.join(format!("{dir_name}.nfo")))?;

            let mut rooms = Vec::new();
            let rooms_dir = path.join("rooms");
            if rooms_dir.is_dir() {
                for (file_name, rpath) in sorted_entries(&rooms_dir)? {
                    let Some((rid, rname)) = split_stem(&file_name, Some("room")) else {
                        continue;
                    };
                    rooms.push((rid, rname, read_area(&rpath)?));
                }
            }

            let zone = build_zone(&zid, &zname, zrec, rooms)
                .with_context(|| format!("zone {}", path.display()))?;
            info!(tag = ">", zone = %zone.id, rooms = zone.rooms.len(), "zone loaded");
            zones.push(zone);
        }
        Ok(zones)
    }

    fn save_zone(&self, zone: &Zone) -> anyhow::Result<()> {
        let stem = format!("{}.{}", zone.id, zone.name);
        let zdir = self.zones_dir().join(&stem);
        let rdir = zdir.join("rooms");
        fs::create_dir_all(&rdir).with_context(|| format!("create {}", rdir.display()))?;

        let nfo = zdir.join(format!("{stem}.nfo"));
        fs::write(&nfo, zone.to_record().render_zone())
            .with_context(|| format!("write {}", nfo.display()))?;

        for room in zone.rooms.values() {
            let p = rdir.join(format!("{}.{}.room", room.id, room.name));
            fs::write(&p, room.to_record().render_room())
                .with_context(|| format!("write {}", p.display()))?;
        }
        info!(tag = "<", zone = %zone.id, "zone saved");
        Ok(())
    }

    fn load_player(&self, name: &str) -> Result<PlayerRecord, RecordError> {
        let text = fs::read_to_string(self.player_path(name))?;
        let rec = PlayerRecord::parse(&text)?;
        info!(tag = ">", name = %rec.name, "player loaded");
        Ok(rec)
    }

    fn save_player(&self, rec: &PlayerRecord) -> Result<(), RecordError> {
        fs::create_dir_all(self.players_dir())?;
        fs::write(self.player_path(&rec.name), rec.render())?;
        Ok(())
    }

    fn has_players(&self) -> bool {
        let Ok(rd) = fs::read_dir(self.players_dir()) else {
            return false;
        };
        rd.filter_map(Result::ok)
            .any(|e| e.path().extension().is_some_and(|x| x == "player"))
    }
}
