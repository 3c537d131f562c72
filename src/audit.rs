use crate::config::Config;
use crate::error::Result;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    Match,
    Fail,
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyResult::Match => write!(f, "Match"),
            VerifyResult::Fail => write!(f, "Fail"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub username: String,
    pub result: VerifyResult,
    pub note: String,
}

/// Append-only CSV log of verification attempts, one row per detected face:
/// `timestamp,username,result,note`.
pub struct VerificationLog {
    path: PathBuf,
}

impl VerificationLog {
    pub fn new_with_path(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    pub fn open(config: &Config) -> Result<Self> {
        Self::new_with_path(config.log_file()?)
    }

    /// Appends one entry stamped with the current local time. The file is
    /// created on first append.
    pub fn append(&self, username: &str, result: VerifyResult, note: &str) -> Result<()> {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let row = format!(
            "{},{},{},{}\n",
            csv_field(&timestamp),
            csv_field(username),
            result,
            csv_field(note)
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(row.as_bytes())?;
        Ok(())
    }

    /// Every entry in insertion order. An absent log file is an empty log,
    /// not an error.
    pub fn read_all(&self) -> Result<Vec<LogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path)?;
        let mut entries = Vec::new();
        for line in contents.lines() {
            if line.is_empty() {
                continue;
            }
            match parse_row(line) {
                Some(entry) => entries.push(entry),
                None => tracing::warn!("Skipping malformed log row: {}", line),
            }
        }
        Ok(entries)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn parse_row(line: &str) -> Option<LogEntry> {
    let fields = split_row(line);
    if fields.len() != 4 {
        return None;
    }
    let result = match fields[2].as_str() {
        "Match" => VerifyResult::Match,
        "Fail" => VerifyResult::Fail,
        _ => return None,
    };
    Some(LogEntry {
        timestamp: fields[0].clone(),
        username: fields[1].clone(),
        result,
        note: fields[3].clone(),
    })
}

fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    fn temp_log() -> (TempDir, VerificationLog) {
        let dir = TempDir::new().unwrap();
        let log = VerificationLog::new_with_path(dir.path().join("verification_log.csv")).unwrap();
        (dir, log)
    }

    #[test]
    fn absent_file_reads_as_empty() {
        let (_dir, log) = temp_log();
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn appends_preserve_insertion_order() {
        let (_dir, log) = temp_log();
        log.append("alice", VerifyResult::Match, "").unwrap();
        log.append("Unknown", VerifyResult::Fail, "").unwrap();
        log.append("bob", VerifyResult::Match, "re-check").unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].username, "alice");
        assert_eq!(entries[0].result, VerifyResult::Match);
        assert_eq!(entries[1].username, "Unknown");
        assert_eq!(entries[1].result, VerifyResult::Fail);
        assert_eq!(entries[2].note, "re-check");
    }

    #[test]
    fn timestamps_are_parsable() {
        let (_dir, log) = temp_log();
        log.append("alice", VerifyResult::Match, "").unwrap();

        let entries = log.read_all().unwrap();
        assert!(NaiveDateTime::parse_from_str(&entries[0].timestamp, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn notes_with_commas_round_trip() {
        let (_dir, log) = temp_log();
        log.append("alice", VerifyResult::Fail, "low light, retry advised")
            .unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries[0].note, "low light, retry advised");
    }

    #[test]
    fn later_appends_do_not_disturb_earlier_rows() {
        let (_dir, log) = temp_log();
        log.append("alice", VerifyResult::Match, "").unwrap();
        let first = log.read_all().unwrap();
        log.append("bob", VerifyResult::Fail, "").unwrap();
        let both = log.read_all().unwrap();

        assert_eq!(both[0], first[0]);
        assert_eq!(both.len(), 2);
    }
}
