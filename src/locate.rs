use crate::config::Files;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub exists: bool,
}

impl Artifact {
    fn resolve(workdir: &Path, name: &str) -> Self {
        let path = workdir.join(name);
        let exists = path.is_file();
        if !exists {
            debug!("artifact missing: {}", path.display());
        }
        Self { path, exists }
    }

    pub fn present(&self) -> Option<&Path> {
        self.exists.then_some(self.path.as_path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub workdir: PathBuf,
    pub stdout: Artifact,
    pub stderr: Artifact,
    pub job_report: Artifact,
    pub metadata_xml: Artifact,
    pub heartbeat: Artifact,
    pub memory_monitor: Artifact,
    pub summary_files: Vec<PathBuf>,
}

/// Resolves every known artifact under `workdir`. Never fails.
pub fn locate(workdir: &Path, files: &Files) -> ArtifactSet {
    ArtifactSet {
        workdir: workdir.to_path_buf(),
        stdout: Artifact::resolve(workdir, &files.payload_stdout),
        stderr: Artifact::resolve(workdir, &files.payload_stderr),
        job_report: Artifact::resolve(workdir, &files.job_report),
        metadata_xml: Artifact::resolve(workdir, &files.metadata_xml),
        heartbeat: Artifact::resolve(workdir, &files.heartbeat),
        memory_monitor: Artifact::resolve(workdir, &files.memory_monitor_output),
        summary_files: glob_files(workdir, &files.summary_patterns),
    }
}

fn glob_files(workdir: &Path, patterns: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for pattern in patterns {
        // the workdir is literal; only the configured pattern may glob
        let base = glob::Pattern::escape(&workdir.to_string_lossy());
        let full = Path::new(&base).join(pattern);
        let paths = match glob::glob(&full.to_string_lossy()) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("invalid summary pattern {pattern}: {e}");
                continue;
            }
        };
        let mut found: Vec<PathBuf> = paths
            .filter_map(|entry| match entry {
                Ok(path) if path.is_file() => Some(path),
                _ => None,
            })
            .collect();
        found.sort();
        for path in found {
            if !out.contains(&path) {
                out.push(path);
            }
        }
    }
    out
}
