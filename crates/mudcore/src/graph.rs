use std::collections::BTreeMap;

use anyhow::Context;

use crate::record::{AreaRecord, RecordError};
use crate::session::SessionKey;

/// A `(zone-id, room-id)` pair, written `"zone.room"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locator {
    pub zone: String,
    pub room: String,
}

impl Locator {
    pub fn new(zone: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            room: room.into(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (zone, room) = s.trim().split_once('.')?;
        if zone.is_empty() || room.is_empty() {
            return None;
        }
        Some(Self::new(zone, room))
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.zone, self.room)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exit {
    pub name: String,
    pub to: Locator,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub description: String,
    /// The room's own settings; zone settings are merged on read.
    pub settings: Vec<String>,
    exits: Vec<Exit>,
    occupants: BTreeMap<SessionKey, String>,
}

impl Room {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            settings: Vec::new(),
            exits: Vec::new(),
            occupants: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_exit(mut self, name: impl Into<String>, to: Locator) -> Self {
        self.exits.push(Exit {
            name: name.into(),
            to,
        });
        self
    }

    pub fn from_record(
        id: impl Into<String>,
        name: impl Into<String>,
        rec: AreaRecord,
    ) -> Result<Self, RecordError> {
        let mut room = Self::new(id, name).with_description(rec.description);
        room.settings = rec.settings;
        for (dir, to) in rec.exits {
            let to = Locator::parse(&to).ok_or_else(|| RecordError::Malformed {
                line: 0,
                reason: format!("exit {dir:?} has bad locator {to:?}"),
            })?;
            room = room.with_exit(dir, to);
        }
        Ok(room)
    }

    pub fn to_record(&self) -> AreaRecord {
        AreaRecord {
            settings: self.settings.clone(),
            description: self.description.clone(),
            exits: self
                .exits
                .iter()
                .map(|e| (e.name.clone(), e.to.to_string()))
                .collect(),
        }
    }

    pub fn exits(&self) -> &[Exit] {
        &self.exits
    }

    pub fn exit_names(&self) -> impl Iterator<Item = &str> {
        self.exits.iter().map(|e| e.name.as_str())
    }

    pub fn find_exit(&self, name: &str) -> Option<&Exit> {
        self.exits.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Name of the first exit leading to `to`.
    pub fn exit_to(&self, to: &Locator) -> Option<&str> {
        self.exits
            .iter()
            .find(|e| &e.to == to)
            .map(|e| e.name.as_str())
    }

    pub fn occupants(&self) -> &BTreeMap<SessionKey, String> {
        &self.occupants
    }

    pub fn add_occupant(&mut self, key: SessionKey, name: String) {
        self.occupants.insert(key, name);
    }

    /// Returns whether the session was present.
    pub fn remove_occupant(&mut self, key: &SessionKey) -> bool {
        self.occupants.remove(key).is_some()
    }

    /// Own settings plus any zone setting that isn't already present or
    /// vetoed locally (`x` is vetoed by `!x`, and `!x` by `x`).
    pub fn effective_settings(&self, zone_settings: &[String]) -> Vec<String> {
        let mut out = self.settings.clone();
        for s in zone_settings {
            if out.contains(s) {
                continue;
            }
            let veto = match s.strip_prefix('!') {
                Some(base) => base.to_string(),
                None => format!("!{s}"),
            };
            if !self.settings.contains(&veto) {
                out.push(s.clone());
            }
        }
        out
    }

    /// The room as `viewer` sees it.
    pub fn render_view(&self, viewer: &SessionKey) -> String {
        let mut s = format!("{}\n{}\n\n", self.name, self.description);

        let exits = self.exit_names().collect::<Vec<_>>();
        if exits.is_empty() {
            s.push_str("Exits: None\n");
        } else {
            s.push_str(&format!("Exits: {}\n", exits.join(", ")));
        }

        let others = self
            .occupants
            .iter()
            .filter(|(k, _)| *k != viewer)
            .map(|(_, n)| n.as_str())
            .collect::<Vec<_>>();
        if others.is_empty() {
            s.push_str("Players: None");
        } else {
            s.push_str(&format!("Players: {}", others.join(", ")));
        }
        s
    }
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub description: String,
    pub settings: Vec<String>,
    pub rooms: BTreeMap<String, Room>,
}

impl Zone {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            settings: Vec::new(),
            rooms: BTreeMap::new(),
        }
    }

    pub fn with_room(mut self, room: Room) -> Self {
        self.rooms.insert(room.id.clone(), room);
        self
    }

    pub fn to_record(&self) -> AreaRecord {
        AreaRecord {
            settings: self.settings.clone(),
            description: self.description.clone(),
            exits: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocationGraph {
    zones: BTreeMap<String, Zone>,
}

impl LocationGraph {
    pub fn new(zones: impl IntoIterator<Item = Zone>) -> Self {
        Self {
            zones: zones.into_iter().map(|z| (z.id.clone(), z)).collect(),
        }
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    pub fn room(&self, at: &Locator) -> Option<&Room> {
        self.zones.get(&at.zone)?.rooms.get(&at.room)
    }

    pub fn room_mut(&mut self, at: &Locator) -> Option<&mut Room> {
        self.zones.get_mut(&at.zone)?.rooms.get_mut(&at.room)
    }

    pub fn contains(&self, at: &Locator) -> bool {
        self.room(at).is_some()
    }

    pub fn room_count(&self) -> usize {
        self.zones.values().map(|z| z.rooms.len()).sum()
    }

    /// First room in zone-id then room-id order.
    pub fn first_locator(&self) -> Option<Locator> {
        self.zones.values().find_map(|z| {
            z.rooms
                .keys()
                .next()
                .map(|room| Locator::new(z.id.clone(), room.clone()))
        })
    }

    pub fn effective_settings(&self, at: &Locator) -> Option<Vec<String>> {
        let zone = self.zones.get(&at.zone)?;
        let room = zone.rooms.get(&at.room)?;
        Some(room.effective_settings(&zone.settings))
    }

    /// Every exit must land on an existing room.
    pub fn check_integrity(&self) -> anyhow::Result<()> {
        if self.room_count() == 0 {
            anyhow::bail!("world has no rooms");
        }
        for zone in self.zones.values() {
            for room in zone.rooms.values() {
                for exit in room.exits() {
                    if !self.contains(&exit.to) {
                        anyhow::bail!(
                            "exit {:?} in room {}.{} leads to missing room {}",
                            exit.name,
                            zone.id,
                            room.id,
                            exit.to
                        );
                    }
                }
            }
        }
        Ok(())
    }

    pub fn remove_everywhere(&mut self, key: &SessionKey) {
        for zone in self.zones.values_mut() {
            for room in zone.rooms.values_mut() {
                room.remove_occupant(key);
            }
        }
    }
}

pub(crate) fn build_zone(
    id: &str,
    name: &str,
    rec: AreaRecord,
    rooms: Vec<(String, String, AreaRecord)>,
) -> anyhow::Result<Zone> {
    let mut zone = Zone::new(id, name);
    zone.settings = rec.settings;
    zone.description = rec.description;
    for (rid, rname, rrec) in rooms {
        let room = Room::from_record(rid.as_str(), rname.as_str(), rrec)
            .with_context(|| format!("room {id}.{rid}"))?;
        zone.rooms.insert(rid, room);
    }
    Ok(zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn locator_round_trip_and_rejects() {
        let l = Locator::parse("town.square").unwrap();
        assert_eq!(l, Locator::new("town", "square"));
        assert_eq!(l.to_string(), "town.square");
        assert_eq!(Locator::parse("nodot"), None);
        assert_eq!(Locator::parse(".x"), None);
        assert_eq!(Locator::parse("x."), None);
    }

    #[test]
    fn zone_settings_inherit_unless_present_or_vetoed() {
        let mut room = Room::new("1", "Cellar");
        room.settings = s(&["dark", "!safe"]);
        let eff = room.effective_settings(&s(&["safe", "dark", "quiet", "!pvp"]));
        assert_eq!(eff, s(&["dark", "!safe", "quiet", "!pvp"]));
    }

    #[test]
    fn positive_room_setting_vetoes_negated_zone_setting() {
        let mut room = Room::new("1", "Arena");
        room.settings = s(&["pvp"]);
        assert_eq!(room.effective_settings(&s(&["!pvp"])), s(&["pvp"]));
    }

    #[test]
    fn graph_merges_zone_settings_on_read() {
        let mut zone = Zone::new("0", "town").with_room(Room::new("0", "Square"));
        zone.settings = s(&["safe"]);
        let g = LocationGraph::new([zone]);
        assert_eq!(g.effective_settings(&Locator::new("0", "0")), Some(s(&["safe"])));
        assert_eq!(g.effective_settings(&Locator::new("0", "1")), None);
    }

    #[test]
    fn integrity_check_rejects_dangling_exit() {
        let g = LocationGraph::new([Zone::new("0", "town")
            .with_room(Room::new("0", "Square").with_exit("north", Locator::new("0", "9")))]);
        let err = g.check_integrity().unwrap_err();
        assert!(err.to_string().contains("0.9"));
    }

    #[test]
    fn integrity_check_rejects_empty_world() {
        assert!(LocationGraph::default().check_integrity().is_err());
    }

    #[test]
    fn integrity_check_accepts_cross_zone_exits() {
        let g = LocationGraph::new([
            Zone::new("0", "town")
                .with_room(Room::new("0", "Square").with_exit("east", Locator::new("1", "0"))),
            Zone::new("1", "forest")
                .with_room(Room::new("0", "Edge").with_exit("west", Locator::new("0", "0"))),
        ]);
        g.check_integrity().unwrap();
        assert_eq!(g.first_locator(), Some(Locator::new("0", "0")));
    }

    #[test]
    fn exit_to_returns_first_match() {
        let r = Room::new("0", "Hall")
            .with_exit("north", Locator::new("0", "1"))
            .with_exit("up", Locator::new("0", "1"));
        assert_eq!(r.exit_to(&Locator::new("0", "1")), Some("north"));
        assert_eq!(r.exit_to(&Locator::new("0", "2")), None);
    }

    #[test]
    fn view_lists_exits_and_other_players() {
        let me = SessionKey::from("1.2.3.4:1");
        let mut r = Room::new("0", "Square")
            .with_description("Cobbles.")
            .with_exit("north", Locator::new("0", "1"))
            .with_exit("east", Locator::new("0", "2"));
        r.add_occupant(me.clone(), "Alice".into());
        r.add_occupant(SessionKey::from("1.2.3.4:2"), "Bob".into());

        let v = r.render_view(&me);
        assert_eq!(v, "Square\nCobbles.\n\nExits: north, east\nPlayers: Bob");
    }

    #[test]
    fn view_of_empty_room_says_none() {
        let v = Room::new("0", "Void").render_view(&SessionKey::from("k"));
        assert!(v.contains("Exits: None"));
        assert!(v.contains("Players: None"));
    }

    #[test]
    fn bad_exit_locator_in_record_is_malformed() {
        let rec = AreaRecord {
            exits: vec![("north".into(), "nowhere".into())],
            ..AreaRecord::default()
        };
        assert!(matches!(
            Room::from_record("0", "x", rec),
            Err(RecordError::Malformed { .. })
        ));
    }
}
