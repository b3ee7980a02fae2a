//! Append-only file logging behind the `log` facade.
//!
//! Every record becomes one `[ISO-8601] [LEVEL] message` line appended to
//! the feeder log file (and mirrored to stderr while developing). The file
//! is the same one `GET /logs` tails, so the format stays line-oriented and
//! greppable.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use log::{LevelFilter, Log, Metadata, Record};

/// Default number of lines `GET /logs` returns when unspecified.
pub const DEFAULT_TAIL_LINES: usize = 100;

/// `log::Log` backend appending to a single file.
pub struct FileLogger {
    file: Mutex<File>,
    level: LevelFilter,
}

impl FileLogger {
    /// Open (or create) the log file in append mode.
    pub fn open(path: impl Into<PathBuf>, level: LevelFilter) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            file: Mutex::new(file),
            level,
        })
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{}] [{}] {}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            record.level(),
            record.args()
        );
        eprint!("{line}");
        let mut file = self.file.lock().unwrap();
        // A failed log write must not take the feeder down.
        let _ = file.write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = self.file.lock().unwrap().flush();
    }
}

/// Install the file logger as the global `log` backend.
pub fn init(path: impl Into<PathBuf>, level: LevelFilter) -> io::Result<()> {
    let logger = FileLogger::open(path, level)?;
    log::set_boxed_logger(Box::new(logger))
        .map_err(|err| io::Error::new(io::ErrorKind::AlreadyExists, err))?;
    log::set_max_level(level);
    Ok(())
}

/// Read the last `lines` non-empty lines of the log file.
///
/// Returns `(lines, total_line_count)`. A missing file reads as empty;
/// the daemon may simply not have logged anything yet.
pub fn tail_lines(path: &Path, lines: usize) -> io::Result<(Vec<String>, usize)> {
    let mut content = String::new();
    match File::open(path) {
        Ok(mut file) => {
            file.read_to_string(&mut content)?;
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(err) => return Err(err),
    }

    let all: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let total = all.len();
    let start = total.saturating_sub(lines);
    Ok((all[start..].iter().map(|l| l.to_string()).collect(), total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_of_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (lines, total) = tail_lines(&dir.path().join("feeder.log"), 100).unwrap();
        assert!(lines.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn tail_returns_last_n_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeder.log");
        let content: String = (1..=10).map(|i| format!("line {i}\n")).collect();
        fs::write(&path, content).unwrap();

        let (lines, total) = tail_lines(&path, 3).unwrap();
        assert_eq!(total, 10);
        assert_eq!(lines, vec!["line 8", "line 9", "line 10"]);
    }

    #[test]
    fn tail_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feeder.log");
        fs::write(&path, "one\n\n\ntwo\n").unwrap();

        let (lines, total) = tail_lines(&path, 10).unwrap();
        assert_eq!(total, 2);
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn logger_appends_formatted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/feeder.log");
        let logger = FileLogger::open(&path, LevelFilter::Info).unwrap();

        logger.log(
            &Record::builder()
                .args(format_args!("feed complete"))
                .level(log::Level::Info)
                .build(),
        );
        logger.flush();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[INFO] feed complete"));
        assert!(content.starts_with('['));
    }
}
