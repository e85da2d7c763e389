use crate::util::{rfc3339, try_parse_i64};
use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryFileSet {
    pub most_recent: SummaryFile,
    pub oldest: SummaryFile,
}

impl SummaryFileSet {
    pub fn partition(paths: &[PathBuf]) -> Option<Self> {
        let mut most_recent: Option<SummaryFile> = None;
        let mut oldest: Option<SummaryFile> = None;
        for path in paths {
            let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!("could not read modification time of file {}: {e}", path.display());
                    continue;
                }
            };
            let file = SummaryFile {
                path: path.clone(),
                modified,
            };
            if most_recent.as_ref().is_none_or(|r| modified > r.modified) {
                most_recent = Some(file.clone());
            }
            if oldest.as_ref().is_none_or(|o| modified < o.modified) {
                oldest = Some(file);
            }
        }
        Some(Self {
            most_recent: most_recent?,
            oldest: oldest?,
        })
    }

    pub fn is_single(&self) -> bool {
        self.most_recent.path == self.oldest.path
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub read: u64,
    pub written: u64,
}

/// Event counts from the oldest summary file. The most recent file is only
/// logged; scanning it for errors is not done yet.
pub fn process_summary_files(paths: &[PathBuf]) -> Result<EventCounts> {
    if paths.is_empty() {
        info!("did not find any athena summary files");
        return Ok(EventCounts::default());
    }
    let Some(set) = SummaryFileSet::partition(paths) else {
        warn!("no usable athena summary files");
        return Ok(EventCounts::default());
    };

    if set.is_single() {
        info!(
            "summary file {} will be processed for errors and number of events",
            set.oldest.path.display()
        );
    } else {
        info!(
            "most recent summary file {} (updated at {}) will be processed for errors [to be implemented]",
            set.most_recent.path.display(),
            rfc3339(set.most_recent.modified)
        );
        info!(
            "oldest summary file {} (updated at {}) will be processed for number of events",
            set.oldest.path.display(),
            rfc3339(set.oldest.modified)
        );
    }

    let counts = events_from_summary_file(&set.oldest.path)?;
    info!("number of events: {} (read)", counts.read);
    info!("number of events: {} (written)", counts.written);
    Ok(counts)
}

pub fn events_from_summary_file(path: &Path) -> Result<EventCounts> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("failed to open summary file {}: {e}", path.display());
            return Ok(EventCounts::default());
        }
    };
    let text = String::from_utf8_lossy(&raw);
    if text.trim().is_empty() {
        warn!("failed to get number of events from empty summary file");
        return Ok(EventCounts::default());
    }
    parse_event_counts(&text).with_context(|| format!("summary file {}", path.display()))
}

pub fn parse_event_counts(text: &str) -> Result<EventCounts> {
    let read_re = Regex::new(r"^Events Read: *(\d+)")?;
    let written_re = Regex::new(r"^Events Written: *(\d+)")?;

    let mut counts = EventCounts::default();
    for line in text.lines() {
        if line.contains("Events Read:") {
            counts.read = counter(&read_re, line, "read");
        }
        if line.contains("Events Written:") {
            counts.written = counter(&written_re, line, "written");
        }
        if counts.read > 0 && counts.written > 0 {
            break;
        }
    }
    Ok(counts)
}

fn counter(re: &Regex, line: &str, what: &str) -> u64 {
    let value = re
        .captures(line)
        .and_then(|c| try_parse_i64(&c[1]))
        .and_then(|n| u64::try_from(n).ok());
    match value {
        Some(n) => n,
        None => {
            warn!("failed to convert number of {what} events to int: {line:?}");
            0
        }
    }
}
