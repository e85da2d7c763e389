use crate::util::try_parse_i64;
use anyhow::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Per-file metadata from a POOL-style `metadata.xml`, keyed by LFN.
pub type FileMetadata = BTreeMap<String, BTreeMap<String, String>>;

pub fn read_metadata(path: &Path) -> Result<FileMetadata> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("metadata not readable: {} ({e})", path.display());
            return Ok(FileMetadata::new());
        }
    };
    parse_metadata(&raw)
}

/// Extracts `<File>` entries. Entries without an `<lfn name=...>` are keyed
/// by their position.
pub fn parse_metadata(raw: &str) -> Result<FileMetadata> {
    let file_re = Regex::new(r"(?s)<File\b[^>]*>(.*?)</File>")?;
    let lfn_re = Regex::new(r"<lfn\b([^>]*)>")?;
    let meta_re = Regex::new(r"<metadata\b([^>]*)>")?;
    let attr_re = Regex::new(r#"([\w:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?;

    let mut out = FileMetadata::new();
    for (i, file) in file_re.captures_iter(raw).enumerate() {
        let body = &file[1];
        let lfn = lfn_re
            .captures_iter(body)
            .find_map(|c| attribute(&attr_re, &c[1], "name"))
            .unwrap_or_else(|| format!("#{i}"));
        let atts = meta_re
            .captures_iter(body)
            .filter_map(|c| {
                let tag = &c[1];
                Some((
                    attribute(&attr_re, tag, "att_name")?,
                    attribute(&attr_re, tag, "att_value")?,
                ))
            })
            .collect();
        out.insert(lfn, atts);
    }
    Ok(out)
}

// value of `name` in a tag body, single or double quoted
fn attribute(re: &Regex, tag: &str, name: &str) -> Option<String> {
    re.captures_iter(tag)
        .find(|c| &c[1] == name)
        .and_then(|c| c.get(2).or_else(|| c.get(3)))
        .map(|m| m.as_str().to_string())
}

pub fn total_number_of_events(metadata: &FileMetadata) -> u64 {
    let mut total = 0u64;
    for (lfn, atts) in metadata {
        let Some(raw) = atts.get("events") else {
            continue;
        };
        match try_parse_i64(raw).and_then(|n| u64::try_from(n).ok()) {
            Some(n) => total += n,
            None => warn!("failed to convert number of events for {lfn} to int: {raw}"),
        }
    }
    if total > 0 {
        info!("total number of events in metadata: {total}");
    }
    total
}
