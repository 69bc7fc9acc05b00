//! Log sink setup: console plus one file per server run.
//!
//! On startup any `*.log` left in the log directory is moved into `logs/`, and
//! a fresh file named after the local start time takes its place.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDateTime;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

const ARCHIVE_DIR: &str = "logs";

pub fn log_file_name(started: NaiveDateTime) -> String {
    format!("{}.log", started.format("%Y-%m-%d_%H:%M:%S"))
}

/// Archive old logs in `dir` and create a new empty log file. Returns its path.
pub fn rotate(dir: &Path, started: NaiveDateTime) -> anyhow::Result<PathBuf> {
    let archive = dir.join(ARCHIVE_DIR);
    fs::create_dir_all(&archive).with_context(|| format!("create {}", archive.display()))?;

    for ent in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let ent = ent?;
        let path = ent.path();
        if !path.is_file() || path.extension().is_none_or(|x| x != "log") {
            continue;
        }
        let dest = archive.join(ent.file_name());
        fs::rename(&path, &dest)
            .with_context(|| format!("archive {} -> {}", path.display(), dest.display()))?;
    }

    let path = dir.join(log_file_name(started));
    File::create(&path).with_context(|| format!("create {}", path.display()))?;
    Ok(path)
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(dir: &Path, started: NaiveDateTime) -> anyhow::Result<PathBuf> {
    let path = rotate(dir, started)?;
    let file = OpenOptions::new()
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,minimud=info,mudcore=info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .try_init()
        .context("install tracing subscriber")?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn names_file_by_start_time() {
        assert_eq!(log_file_name(at(7, 5, 0)), "2024-03-09_07:05:00.log");
    }

    #[test]
    fn archives_previous_logs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.log"), "x\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep\n").unwrap();

        let path = rotate(dir.path(), at(12, 0, 0)).unwrap();

        assert_eq!(path, dir.path().join("2024-03-09_12:00:00.log"));
        assert!(path.is_file());
        assert!(dir.path().join("logs/old.log").is_file());
        assert!(!dir.path().join("old.log").exists());
        assert!(dir.path().join("notes.txt").is_file());
    }

    #[test]
    fn second_run_archives_first_runs_log() {
        let dir = tempfile::tempdir().unwrap();
        let first = rotate(dir.path(), at(1, 0, 0)).unwrap();
        let second = rotate(dir.path(), at(2, 0, 0)).unwrap();
        assert!(!first.exists());
        assert!(dir.path().join("logs/2024-03-09_01:00:00.log").is_file());
        assert!(second.is_file());
    }
}
