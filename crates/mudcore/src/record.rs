//! Line-oriented text records for players, zones and rooms.
//!
//! Player records are `key:value` lines. Zone and room records carry a
//! `settings:` line, a `description:` block closed by a lone `---`, and (rooms
//! only) one `exit.<direction>:<locator>` line per exit. `#` comments and blank
//! lines outside the description block are ignored.

use crate::graph::Locator;
use crate::session::{Role, Sex};

#[derive(Debug)]
pub enum RecordError {
    /// No record exists.
    Absent,
    /// A record exists but can't be trusted.
    Malformed { line: usize, reason: String },
    Io(std::io::Error),
}

impl RecordError {
    fn malformed(line: usize, reason: impl Into<String>) -> Self {
        RecordError::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Absent => write!(f, "record absent"),
            RecordError::Malformed { line, reason } => {
                write!(f, "malformed record at line {line}: {reason}")
            }
            RecordError::Io(e) => write!(f, "record io: {e}"),
        }
    }
}

impl std::error::Error for RecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RecordError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            RecordError::Absent
        } else {
            RecordError::Io(e)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub name: String,
    /// PHC-format password hash.
    pub pass: String,
    pub role: Role,
    pub sex: Sex,
    pub room: Option<Locator>,
}

impl PlayerRecord {
    pub fn parse(text: &str) -> Result<Self, RecordError> {
        let mut name = None;
        let mut pass = None;
        let mut role = Role::Normal;
        let mut sex = Sex::Unset;
        let mut room = None;

        for (i, raw) in text.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((k, v)) = line.split_once(':') else {
                return Err(RecordError::malformed(lineno, "expected key:value"));
            };
            let v = v.trim();
            match k.trim() {
                "name" => name = Some(v.to_string()),
                "pass" => pass = Some(v.to_string()),
                "role" => {
                    role = v
                        .parse::<i64>()
                        .ok()
                        .and_then(Role::from_level)
                        .ok_or_else(|| RecordError::malformed(lineno, format!("bad role {v:?}")))?;
                }
                "sex" => {
                    sex = Sex::parse(v)
                        .ok_or_else(|| RecordError::malformed(lineno, format!("bad sex {v:?}")))?;
                }
                "room" => {
                    if !v.is_empty() {
                        room = Some(Locator::parse(v).ok_or_else(|| {
                            RecordError::malformed(lineno, format!("bad locator {v:?}"))
                        })?);
                    }
                }
                _ => {}
            }
        }

        let name = name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| RecordError::malformed(0, "missing name"))?;
        let pass = pass
            .filter(|p| !p.is_empty())
            .ok_or_else(|| RecordError::malformed(0, "missing pass"))?;
        Ok(Self {
            name,
            pass,
            role,
            sex,
            room,
        })
    }

    pub fn render(&self) -> String {
        let room = self.room.as_ref().map(|l| l.to_string()).unwrap_or_default();
        format!(
            "name:{}\npass:{}\nrole:{}\nsex:{}\nroom:{}\n",
            self.name,
            self.pass,
            self.role.level(),
            self.sex.as_str(),
            room
        )
    }
}

/// The shared body of `.nfo` and `.room` files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AreaRecord {
    pub settings: Vec<String>,
    pub description: String,
    /// Raw `(direction, locator)` pairs in file order. Rooms only.
    pub exits: Vec<(String, String)>,
}

impl AreaRecord {
    pub fn parse(text: &str) -> Result<Self, RecordError> {
        let mut out = Self::default();
        let mut lines = text.lines().enumerate();

        while let Some((i, raw)) = lines.next() {
            let lineno = i + 1;
            let line = raw.trim_end();
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((k, v)) = line.split_once(':') else {
                return Err(RecordError::malformed(lineno, "expected key:value"));
            };

            if k == "settings" {
                out.settings = parse_settings(v);
            } else if k == "description" {
                let mut desc = Vec::new();
                let mut closed = false;
                for (_, d) in lines.by_ref() {
                    if d.trim_end() == "---" {
                        closed = true;
                        break;
                    }
                    desc.push(d.trim_end());
                }
                if !closed {
                    return Err(RecordError::malformed(
                        lineno,
                        "description block missing '---'",
                    ));
                }
                out.description = desc.join("\n");
            } else if let Some(dir) = k.strip_prefix("exit.") {
                let dir = dir.trim();
                let to = v.trim();
                if dir.is_empty() || to.is_empty() {
                    return Err(RecordError::malformed(lineno, "empty exit"));
                }
                out.exits.push((dir.to_string(), to.to_string()));
            }
        }
        Ok(out)
    }

    pub fn render_zone(&self) -> String {
        let mut s = String::new();
        s.push_str("# Zone settings.\n");
        s.push_str(&format!("settings:{}\n", render_settings(&self.settings)));
        s.push('\n');
        self.push_description(&mut s, "zone");
        s
    }

    pub fn render_room(&self) -> String {
        let mut s = String::new();
        s.push_str("# Settings\n");
        s.push_str(&format!("settings:{}\n", render_settings(&self.settings)));
        s.push('\n');
        self.push_description(&mut s, "room");
        s.push('\n');
        s.push_str("# Room exits. (zone.room)\n");
        for (dir, to) in &self.exits {
            s.push_str(&format!("exit.{dir}:{to}\n"));
        }
        s
    }

    fn push_description(&self, s: &mut String, what: &str) {
        s.push_str(&format!("# A description of the {what}. Ends with '---'.\n"));
        s.push_str("description:\n");
        if !self.description.is_empty() {
            s.push_str(&self.description);
            s.push('\n');
        }
        s.push_str("---\n");
    }
}

fn parse_settings(v: &str) -> Vec<String> {
    let v = v.trim();
    if v.is_empty() || v == "none" {
        return Vec::new();
    }
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn render_settings(settings: &[String]) -> String {
    if settings.is_empty() {
        "none".to_string()
    } else {
        settings.join(",")
    }
}
