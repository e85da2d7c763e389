use crate::classify::{Classification, ErrorKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Running,
    Stageout,
    Finished,
    Failed,
    Holding,
}

impl JobState {
    pub fn is_final(self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed | JobState::Holding)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub workdir: PathBuf,
    /// Exit code of the payload process, before the job report is consulted.
    pub exit_code: i32,
    pub state: JobState,
    pub core_count: u32,
    pub actual_core_count: u32,
    /// Largest working directory size seen while the payload ran, in bytes.
    pub max_workdir_size: u64,
    pub dask_scheduler_ip: Option<String>,
    pub jupyter_session_ip: Option<String>,
}

impl JobDescriptor {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            ..Default::default()
        }
    }

    pub fn effective_core_count(&self) -> u32 {
        if self.actual_core_count > 0 {
            self.actual_core_count
        } else {
            self.core_count
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub exit_code: i32,
    pub exit_msg: String,
    /// 0 means unknown.
    pub nevents: u64,
    pub neventsw: u64,
    pub dbtime: Option<u64>,
    pub dbdata: Option<u64>,
    pub resimevents: Option<u64>,
    pub error_kind: ErrorKind,
    pub error_code: u32,
    pub error_diag: String,
}

impl JobResult {
    // first classification sticks
    pub fn set_classification(&mut self, c: Classification) {
        if self.error_kind != ErrorKind::None {
            return;
        }
        self.error_kind = c.kind;
        self.error_code = c.code;
        self.error_diag = c.diagnostic;
    }

    /// Sets the read-event count unless a higher-priority source already did.
    pub fn offer_nevents(&mut self, n: u64) -> bool {
        if self.nevents > 0 || n == 0 {
            return false;
        }
        self.nevents = n;
        true
    }
}
