use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum Pattern {
    Substring(String),
    Regex(Regex),
}

impl Pattern {
    pub fn substring(s: &str) -> Self {
        Pattern::Substring(s.to_string())
    }

    pub fn is_match(&self, line: &str) -> bool {
        match self {
            Pattern::Substring(s) => line.contains(s.as_str()),
            Pattern::Regex(r) => r.is_match(line),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TailBudget {
    pub bytes: u64,
    pub lines: usize,
}

fn open_existing(path: &Path) -> Option<File> {
    match File::open(path) {
        Ok(f) => Some(f),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => {
            warn!("cannot open {} ({e}); treating it as empty", path.display());
            None
        }
    }
}

/// Every line matched by any pattern, in file order. Missing or unreadable
/// files yield no lines.
pub fn grep(path: &Path, patterns: &[Pattern]) -> Vec<String> {
    let Some(f) = open_existing(path) else {
        return Vec::new();
    };
    let mut reader = BufReader::new(f);
    let mut out = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = match reader.read_until(b'\n', &mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("read error in {} ({e}); ignoring the file", path.display());
                return Vec::new();
            }
        };
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if patterns.iter().any(|p| p.is_match(line)) {
            out.push(line.to_string());
        }
    }
    out
}

pub fn tail(path: &Path, budget: TailBudget) -> String {
    let Some(mut f) = open_existing(path) else {
        return String::new();
    };
    match read_tail(&mut f, budget) {
        Ok(t) => t,
        Err(e) => {
            warn!("cannot read tail of {} ({e}); treating it as empty", path.display());
            String::new()
        }
    }
}

fn read_tail(f: &mut File, budget: TailBudget) -> std::io::Result<String> {
    let size = f.metadata()?.len();
    if size == 0 || budget.bytes == 0 {
        return Ok(String::new());
    }

    // one byte before the window tells whether it starts on a line boundary
    let start = size.saturating_sub(budget.bytes).saturating_sub(1);
    f.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity((size - start) as usize);
    f.read_to_end(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);

    let text = if start > 0 {
        match text.find('\n') {
            Some(i) => &text[i + 1..],
            None => "",
        }
    } else {
        &text[..]
    };

    let lines: Vec<&str> = text.lines().collect();
    let keep = lines.len().saturating_sub(budget.lines);
    Ok(lines[keep..].join("\n"))
}

pub fn last_line(path: &Path, budget: TailBudget) -> Option<String> {
    tail(path, budget)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}
