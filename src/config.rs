use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub files: Files,
    #[serde(default)]
    pub scan: Scan,
    #[serde(default)]
    pub classify: Classify,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

/// Artifact names, relative to the job working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Files {
    pub payload_stdout: String,
    pub payload_stderr: String,
    pub job_report: String,
    pub metadata_xml: String,
    pub heartbeat: String,
    pub memory_monitor_output: String,
    pub summary_patterns: Vec<String>,
}
impl Default for Files {
    fn default() -> Self {
        Self {
            payload_stdout: "payload.stdout".into(),
            payload_stderr: "payload.stderr".into(),
            job_report: "jobReport.json".into(),
            metadata_xml: "metadata.xml".into(),
            heartbeat: "eventLoopHeartBeat.txt".into(),
            memory_monitor_output: "memory_monitor_output.txt".into(),
            summary_patterns: vec!["AthSummary*".into(), "AthenaSummary*".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub tail_bytes: u64,
    pub tail_lines: usize,
    pub install_check_chars: usize,
}
impl Default for Scan {
    fn default() -> Self {
        Self {
            tail_bytes: 64 * 1024,
            tail_lines: 10,
            install_check_chars: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classify {
    pub no_user_tarball_exit_code: i32,
}
impl Default for Classify {
    fn default() -> Self {
        Self {
            no_user_tarball_exit_code: 146,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub max_length: usize,
    pub heartbeat_pattern: String,
    pub min_fit_points: usize,
    pub fit_head_trim: usize,
    pub fit_tail_trim: usize,
}
impl Default for Metrics {
    fn default() -> Self {
        Self {
            max_length: 500,
            heartbeat_pattern: r"\ done\ processing\ event\ \#(\d+)\,".into(),
            min_fit_points: 8,
            fit_head_trim: 5,
            fit_tail_trim: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Features {
    pub machine_features_dir: String,
    pub job_features_dir: String,
    pub include: Vec<String>,
}
impl Default for Features {
    fn default() -> Self {
        Self {
            machine_features_dir: "".into(),
            job_features_dir: "".into(),
            include: vec!["hs06".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
