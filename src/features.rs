use crate::util::{float_to_rounded_string, try_parse_f64};
use std::path::Path;
use tracing::{debug, info, warn};

pub const MACHINE_FEATURES: [&str; 4] = ["hs06", "shutdowntime", "total_cpu", "grace_secs"];

pub const JOB_FEATURES: [&str; 11] = [
    "allocated_cpu",
    "hs06_job",
    "shutdowntime_job",
    "grace_secs_job",
    "jobstart_secs",
    "job_id",
    "wall_limit_secs",
    "cpu_limit_secs",
    "max_rss_bytes",
    "max_swap_bytes",
    "scratch_limit_bytes",
];

// values as read from disk, in declaration order; empty means unset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSet {
    pub entries: Vec<(String, String)>,
}

impl FeatureSet {
    pub fn collect(dir: &str, names: &[&str], label: &str) -> Self {
        let base = Path::new(dir);
        let usable = !dir.is_empty() && base.is_dir();
        if usable {
            info!("collecting {label} features from {}", base.display());
        } else {
            debug!("{label} features path does not exist (path=\"{dir}\")");
        }
        let entries = names
            .iter()
            .map(|name| {
                let value = if usable {
                    read_value(&base.join(name))
                } else {
                    String::new()
                };
                (name.to_string(), value)
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, name: &str, value: String) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn render(&self, include: &[String]) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            if !include.is_empty() && !include.iter().any(|k| k == key) {
                continue;
            }
            if !value.is_empty() {
                out.push_str(&format!("{key}={value} "));
            }
        }
        out
    }
}

fn read_value(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s.trim().to_string(),
        Err(_) => String::new(),
    }
}

/// `hs06 * core_count / total_cpu`. Leaves the set untouched when a value
/// is missing or zero.
pub fn rescale_hs06(machine: &mut FeatureSet, core_count: u32) {
    let (Some(hs06), Some(total_cpu)) = (machine.get("hs06"), machine.get("total_cpu")) else {
        return;
    };
    let (Some(hs06_v), Some(total_v)) = (try_parse_f64(hs06), try_parse_f64(total_cpu)) else {
        warn!("cannot process hs06 machine feature (hs06={hs06}, total_cpu={total_cpu}, corecount={core_count})");
        return;
    };
    let hs06_i = hs06_v.trunc();
    let total_i = total_v.trunc();
    if total_i == 0.0 || core_count == 0 {
        warn!("cannot rescale hs06 (hs06={hs06}, total_cpu={total_cpu}, corecount={core_count}); value unavailable");
        return;
    }
    let scaled = hs06_i * f64::from(core_count) / total_i;
    let rendered = float_to_rounded_string(scaled, 2);
    info!("hs06={rendered} ({hs06}) total_cpu={total_cpu} corecount={core_count}");
    machine.set("hs06", rendered);
}
