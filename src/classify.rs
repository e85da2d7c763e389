use crate::{
    config::Config,
    locate::ArtifactSet,
    scan::{self, Pattern, TailBudget},
};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[default]
    None,
    OutOfMemory,
    MissingInstallation,
    NfsSqliteLock,
    BadAlloc,
    NoUserTarball,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: u32,
    pub message: &'static str,
}

pub trait ErrorCatalog {
    fn info(&self, kind: ErrorKind) -> ErrorInfo;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCatalog;

impl ErrorCatalog for StandardCatalog {
    fn info(&self, kind: ErrorKind) -> ErrorInfo {
        let (code, message) = match kind {
            ErrorKind::None => (0, ""),
            ErrorKind::NfsSqliteLock => (1115, "NFS SQLite locking problems"),
            ErrorKind::NoUserTarball => (1155, "User tarball could not be downloaded from PanDA server"),
            ErrorKind::MissingInstallation => (1211, "Missing installation"),
            ErrorKind::OutOfMemory => (1212, "Payload ran out of memory"),
            ErrorKind::BadAlloc => (1223, "Transform failed due to bad_alloc"),
        };
        ErrorInfo { code, message }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ErrorKind,
    pub code: u32,
    pub diagnostic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detail {
    Standard,
    Message(String),
}

#[derive(Debug)]
pub struct Evidence<'a> {
    pub artifacts: &'a ArtifactSet,
    pub exit_code: i32,
    pub report_exit_code: Option<i32>,
    pub report_errors: Vec<String>,
    pub stdout_tail: String,
    pub install_check_chars: usize,
    pub no_user_tarball_exit_code: i32,
}

pub struct Detector {
    pub kind: ErrorKind,
    pub name: &'static str,
    check: fn(&Evidence<'_>) -> Result<Option<Detail>>,
}

impl Detector {
    pub fn check(&self, ev: &Evidence<'_>) -> Result<Option<Detail>> {
        (self.check)(ev)
    }
}

/// The battery, in priority order. The first positive detector wins.
pub const DETECTORS: [Detector; 5] = [
    Detector {
        kind: ErrorKind::OutOfMemory,
        name: "out-of-memory",
        check: is_out_of_memory,
    },
    Detector {
        kind: ErrorKind::MissingInstallation,
        name: "missing-installation",
        check: is_installation_error,
    },
    Detector {
        kind: ErrorKind::NfsSqliteLock,
        name: "nfs-sqlite-lock",
        check: is_nfssqlite_locking_problem,
    },
    Detector {
        kind: ErrorKind::BadAlloc,
        name: "bad-alloc",
        check: is_bad_alloc,
    },
    Detector {
        kind: ErrorKind::NoUserTarball,
        name: "no-user-tarball",
        check: is_missing_user_tarball,
    },
];

pub struct Classifier<'c> {
    catalog: &'c dyn ErrorCatalog,
    tail: TailBudget,
    install_check_chars: usize,
    no_user_tarball_exit_code: i32,
}

impl<'c> Classifier<'c> {
    pub fn new(cfg: &Config, catalog: &'c dyn ErrorCatalog) -> Self {
        Self {
            catalog,
            tail: TailBudget {
                bytes: cfg.scan.tail_bytes,
                lines: cfg.scan.tail_lines,
            },
            install_check_chars: cfg.scan.install_check_chars,
            no_user_tarball_exit_code: cfg.classify.no_user_tarball_exit_code,
        }
    }

    pub fn evidence<'a>(
        &self,
        artifacts: &'a ArtifactSet,
        exit_code: i32,
        report_exit_code: Option<i32>,
        report_errors: Vec<String>,
    ) -> Evidence<'a> {
        let stdout_tail = match artifacts.stdout.present() {
            Some(p) => scan::tail(p, self.tail),
            None => String::new(),
        };
        Evidence {
            artifacts,
            exit_code,
            report_exit_code,
            report_errors,
            stdout_tail,
            install_check_chars: self.install_check_chars,
            no_user_tarball_exit_code: self.no_user_tarball_exit_code,
        }
    }

    pub fn classify(&self, ev: &Evidence<'_>) -> Result<Option<Classification>> {
        for detector in &DETECTORS {
            if let Some(detail) = detector.check(ev)? {
                info!("classified payload failure: {} ({:?})", detector.name, detector.kind);
                return Ok(Some(self.finish(detector.kind, detail)));
            }
            debug!("detector {} negative", detector.name);
        }
        Ok(None)
    }

    pub fn classify_all(&self, ev: &Evidence<'_>) -> Result<Vec<Classification>> {
        let mut out = Vec::new();
        for detector in &DETECTORS {
            if let Some(detail) = detector.check(ev)? {
                out.push(self.finish(detector.kind, detail));
            }
        }
        Ok(out)
    }

    fn finish(&self, kind: ErrorKind, detail: Detail) -> Classification {
        let info = self.catalog.info(kind);
        let diagnostic = match detail {
            Detail::Standard => info.message.to_string(),
            Detail::Message(m) => m,
        };
        Classification {
            kind,
            code: info.code,
            diagnostic,
        }
    }
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.display().to_string())
}

fn is_out_of_memory(ev: &Evidence<'_>) -> Result<Option<Detail>> {
    let checks = [
        (
            &ev.artifacts.stderr,
            vec![Pattern::substring("FATAL out of memory: taking the application down")],
        ),
        (
            &ev.artifacts.stdout,
            vec![Pattern::substring("St9bad_alloc"), Pattern::substring("std::bad_alloc")],
        ),
    ];

    let mut out_of_memory = false;
    for (artifact, patterns) in checks {
        let Some(path) = artifact.present() else {
            warn!(
                "file does not exist: {} (cannot look for out-of-memory error in it)",
                artifact.path.display()
            );
            continue;
        };
        info!("looking for out-of-memory errors in {}", file_name(path));
        let matched = scan::grep(path, &patterns);
        if !matched.is_empty() {
            warn!("identified an out of memory error in {}:", file_name(path));
            for line in &matched {
                info!("{line}");
            }
            out_of_memory = true;
        }
    }
    Ok(out_of_memory.then_some(Detail::Standard))
}

fn is_installation_error(ev: &Evidence<'_>) -> Result<Option<Detail>> {
    let head: String = ev.stdout_tail.chars().take(ev.install_check_chars).collect();
    let missing = head.starts_with("sh:")
        && head.contains("setup.sh")
        && head.contains("No such file or directory");
    Ok(missing.then_some(Detail::Standard))
}

fn is_nfssqlite_locking_problem(ev: &Evidence<'_>) -> Result<Option<Detail>> {
    let Some(path) = ev.artifacts.stdout.present() else {
        return Ok(None);
    };
    let patterns = [
        Pattern::substring("prepare 5 database is locked"),
        Pattern::substring("Error SQLiteStatement"),
    ];
    let matched = scan::grep(path, &patterns);
    if matched.is_empty() {
        return Ok(None);
    }
    warn!("identified an NFS/Sqlite locking problem in {}", file_name(path));
    for line in &matched {
        info!("{line}");
    }
    Ok(Some(Detail::Standard))
}

fn is_bad_alloc(ev: &Evidence<'_>) -> Result<Option<Detail>> {
    match ev.report_exit_code {
        Some(code) if code != 0 => {}
        _ => return Ok(None),
    }
    let hit = ev.report_errors.iter().find(|m| m.contains("bad_alloc"));
    if let Some(m) = hit {
        warn!("encountered a bad_alloc error: {m}");
    }
    Ok(hit.map(|m| Detail::Message(m.clone())))
}

fn is_missing_user_tarball(ev: &Evidence<'_>) -> Result<Option<Detail>> {
    if ev.exit_code != ev.no_user_tarball_exit_code {
        return Ok(None);
    }
    warn!("user tarball was not downloaded (payload exit code {})", ev.exit_code);
    let url = extract_tarball_url(&ev.stdout_tail)?;
    Ok(Some(Detail::Message(format!(
        "User tarball {url} cannot be downloaded from PanDA server"
    ))))
}

pub fn extract_tarball_url(text: &str) -> Result<String> {
    let re = Regex::new(r"(https?://\S+)")?;
    Ok(re
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "(source unknown)".to_string()))
}
