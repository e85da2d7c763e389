use crate::util::{try_json_i64, try_json_u64};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

pub const N_EVENTS: &str = "n_events";
pub const DB_TIME: &str = "__db_time";
pub const DB_DATA: &str = "__db_data";
pub const RESIM_EVENTS: &str = "resimevents";

#[derive(Debug, Clone)]
pub struct ReportDocument {
    raw: Map<String, Value>,
    work_attributes: BTreeMap<String, Value>,
}

/// Loads the job report. Anything short of a JSON object is logged and
/// treated as absent.
pub fn load(path: &Path) -> Option<ReportDocument> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("job report not readable: {} ({e})", path.display());
            return None;
        }
    };
    let doc = match parse(&raw) {
        Some(doc) => doc,
        None => {
            warn!("job report is not a valid JSON object: {}", path.display());
            return None;
        }
    };
    match doc.raw.get("reportVersion") {
        Some(v) => info!("scanning job report (v {v}) for error info"),
        None => warn!("job report does not have the reportVersion key"),
    }
    Some(doc)
}

pub fn parse(raw: &str) -> Option<ReportDocument> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(ReportDocument::from_map(map)),
        Ok(_) => None,
        Err(e) => {
            warn!("job report parse error: {e}");
            None
        }
    }
}

impl ReportDocument {
    pub fn from_map(raw: Map<String, Value>) -> Self {
        let work_attributes = work_attributes(&raw);
        Self {
            raw,
            work_attributes,
        }
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    pub fn exit_code(&self) -> i32 {
        match self.raw.get("exitCode") {
            Some(v) => match try_json_i64(v).and_then(|n| i32::try_from(n).ok()) {
                Some(code) => {
                    info!("extracted exit code from job report: {code}");
                    code
                }
                None => {
                    warn!("job report exitCode is not an integer: {v} (will be set to 0)");
                    0
                }
            },
            None => {
                warn!("could not find compulsory payload exitCode in job report (will be set to 0)");
                0
            }
        }
    }

    pub fn exit_msg(&self) -> String {
        match self.raw.get("exitMsg") {
            Some(Value::String(s)) => {
                info!("extracted exit message from job report: {s}");
                s.clone()
            }
            Some(other) => {
                warn!("job report exitMsg is not a string: {other} (will be set to empty string)");
                String::new()
            }
            None => {
                warn!("could not find compulsory payload exitMsg in job report (will be set to empty string)");
                String::new()
            }
        }
    }

    /// Messages under `executor[0].logfileReport.details.ERROR[*].message`.
    pub fn error_messages(&self) -> Vec<String> {
        let Some(executor) = self.raw.get("executor") else {
            warn!("job report does not have the executor key");
            return Vec::new();
        };
        let details = executor
            .get(0)
            .and_then(|e| e.get("logfileReport"))
            .and_then(|l| l.get("details"))
            .and_then(|d| d.get("ERROR"));
        let Some(details) = details else {
            warn!("aborting job report scan: no executor[0].logfileReport.details.ERROR");
            return Vec::new();
        };
        let Some(items) = details.as_array() else {
            warn!("job report error details are not a list");
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|m| m.get("message").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    pub fn work_attributes(&self) -> &BTreeMap<String, Value> {
        &self.work_attributes
    }

    pub fn work_attr_u64(&self, key: &str) -> Option<u64> {
        let v = self.work_attributes.get(key)?;
        let parsed = try_json_u64(v);
        if parsed.is_none() {
            warn!("failed to convert work attribute {key}={v} to an integer");
        }
        parsed
    }
}

// top-level scalars, completed from resource.executor.<step> where missing
fn work_attributes(raw: &Map<String, Value>) -> BTreeMap<String, Value> {
    let mut attrs: BTreeMap<String, Value> = raw
        .iter()
        .filter(|(_, v)| !v.is_object() && !v.is_array())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let steps: Vec<&Map<String, Value>> = raw
        .get("resource")
        .and_then(|r| r.get("executor"))
        .and_then(Value::as_object)
        .map(|e| e.values().filter_map(Value::as_object).collect())
        .unwrap_or_default();
    if steps.is_empty() {
        return attrs;
    }

    let field = |name: &str| -> Vec<u64> {
        steps
            .iter()
            .filter_map(|s| s.get(name))
            .filter_map(try_json_u64)
            .collect()
    };

    if !attrs.contains_key(N_EVENTS) {
        if let Some(max) = field("nevents").into_iter().max() {
            attrs.insert(N_EVENTS.into(), Value::from(max));
        }
    }
    for (key, name) in [(DB_TIME, "dbTime"), (DB_DATA, "dbData"), (RESIM_EVENTS, "resimevents")] {
        if attrs.contains_key(key) {
            continue;
        }
        let values = field(name);
        if !values.is_empty() {
            attrs.insert(key.into(), Value::from(values.iter().sum::<u64>()));
        }
    }
    attrs
}
