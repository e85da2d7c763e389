use crate::{
    config::Config,
    features::{self, FeatureSet, JOB_FEATURES, MACHINE_FEATURES},
    job::{JobDescriptor, JobResult},
    locate::ArtifactSet,
    memory::{self, FitOptions},
    metadata,
    report::{DB_DATA, DB_TIME, N_EVENTS, RESIM_EVENTS, ReportDocument},
    scan::{self, TailBudget},
    summary,
};
use anyhow::{Context, Result};
use regex::Regex;
use std::fmt::Display;
use tracing::{debug, info, warn};

pub struct MetricsExtractor<'a> {
    cfg: &'a Config,
    heartbeat_re: Regex,
}

impl<'a> MetricsExtractor<'a> {
    pub fn new(cfg: &'a Config) -> Result<Self> {
        let heartbeat_re = Regex::new(&cfg.metrics.heartbeat_pattern)
            .with_context(|| format!("heartbeat pattern: {}", cfg.metrics.heartbeat_pattern))?;
        Ok(Self { cfg, heartbeat_re })
    }

    /// Event counts from the job report, then the XML metadata, then the
    /// summary files. A count found by an earlier source is final.
    pub fn find_number_of_events(
        &self,
        result: &mut JobResult,
        report: Option<&ReportDocument>,
        artifacts: &ArtifactSet,
    ) -> Result<()> {
        info!("looking for number of processed events (source #1: job report)");
        if let Some(n) = report.and_then(|r| r.work_attr_u64(N_EVENTS)) {
            result.offer_nevents(n);
        }
        if result.nevents > 0 {
            info!("found {} processed events", result.nevents);
            return Ok(());
        }

        info!("looking for number of processed events (source #2: metadata xml)");
        if let Some(path) = artifacts.metadata_xml.present() {
            let md = metadata::read_metadata(path)?;
            result.offer_nevents(metadata::total_number_of_events(&md));
        }
        if result.nevents > 0 {
            info!("found {} processed events", result.nevents);
            return Ok(());
        }

        info!("looking for number of processed events (source #3: athena summary file(s))");
        let counts = summary::process_summary_files(&artifacts.summary_files)?;
        if result.offer_nevents(counts.read) {
            info!("found {} processed (read) events", result.nevents);
        }
        if counts.written > 0 && result.neventsw == 0 {
            result.neventsw = counts.written;
            info!("found {} processed (written) events", result.neventsw);
        }
        Ok(())
    }

    pub fn find_db_info(&self, result: &mut JobResult, report: Option<&ReportDocument>) {
        let Some(report) = report else {
            return;
        };
        if let Some(t) = report.work_attr_u64(DB_TIME) {
            result.dbtime = Some(t);
            info!("dbtime (total): {t}");
        }
        if let Some(d) = report.work_attr_u64(DB_DATA) {
            result.dbdata = Some(d);
            info!("dbdata (total): {d}");
        }
        if report.work_attributes().contains_key(RESIM_EVENTS) {
            result.resimevents = report.work_attr_u64(RESIM_EVENTS);
        }
    }

    pub fn event_number(&self, artifacts: &ArtifactSet) -> Option<u64> {
        let Some(path) = artifacts.heartbeat.present() else {
            debug!("file {} does not exist (skip for now)", artifacts.heartbeat.path.display());
            return None;
        };
        let budget = TailBudget {
            bytes: self.cfg.scan.tail_bytes,
            lines: self.cfg.scan.tail_lines,
        };
        let line = scan::last_line(path, budget)?;
        number_in_string(&self.heartbeat_re, &line)
    }

    pub fn job_metrics(
        &self,
        job: &JobDescriptor,
        result: &JobResult,
        artifacts: &ArtifactSet,
    ) -> Result<String> {
        let mut m = String::new();

        if job.actual_core_count > 0 {
            m += &metrics_entry("actualCoreCount", job.actual_core_count);
        }
        if result.nevents > 0 {
            m += &metrics_entry("nEvents", result.nevents);
        }
        if result.neventsw > 0 {
            m += &metrics_entry("nEventsW", result.neventsw);
        }
        if let Some(t) = result.dbtime.filter(|t| *t > 0) {
            m += &metrics_entry("dbTime", t);
        }
        if let Some(d) = result.dbdata.filter(|d| *d > 0) {
            m += &metrics_entry("dbData", d);
        }
        if let Some(r) = result.resimevents {
            m += &metrics_entry("resimevents", r);
        }

        if job.state.is_final() {
            if job.max_workdir_size > 0 {
                m += &metrics_entry("workDirSize", job.max_workdir_size);
            } else {
                info!("will not add max space = {} B to job metrics", job.max_workdir_size);
            }
        }

        m = self.add_features(m, job.effective_core_count());
        m = self.add_analytics_data(m, job, artifacts);

        if let Some(n) = self.event_number(artifacts).filter(|n| *n > 0) {
            m += &metrics_entry("eventnumber", n);
        }

        if let (Some(sched), Some(session)) = (&job.dask_scheduler_ip, &job.jupyter_session_ip) {
            m += &metrics_entry("schedulerIP", sched);
            m += &metrics_entry("sessionIP", session);
        }

        let m = m.trim();
        if m.is_empty() {
            debug!("no job metrics (all values are zero)");
        } else {
            debug!("job metrics=\"{m}\"");
        }
        Ok(truncate_metrics(m, self.cfg.metrics.max_length))
    }

    fn add_features(&self, mut m: String, core_count: u32) -> String {
        if !m.is_empty() && !m.ends_with(' ') {
            m.push(' ');
        }
        let fcfg = &self.cfg.features;
        let mut machine = FeatureSet::collect(&fcfg.machine_features_dir, &MACHINE_FEATURES, "machine");
        let job = FeatureSet::collect(&fcfg.job_features_dir, &JOB_FEATURES, "job");
        features::rescale_hs06(&mut machine, core_count);
        m += &machine.render(&fcfg.include);
        m += &job.render(&fcfg.include);
        m
    }

    fn add_analytics_data(&self, mut m: String, job: &JobDescriptor, artifacts: &ArtifactSet) -> String {
        let Some(path) = artifacts.memory_monitor.present() else {
            return m;
        };
        let opts = FitOptions {
            min_points: self.cfg.metrics.min_fit_points,
            // tails are kept while running, dropped on the final update
            trim: job.state.is_final(),
            head_trim: self.cfg.metrics.fit_head_trim,
            tail_trim: self.cfg.metrics.fit_tail_trim,
        };
        if let Some(fit) = memory::fitted_data(path, opts) {
            m += &metrics_entry("leak", &fit.slope);
            if let Some(chi2) = &fit.chi2 {
                m += &metrics_entry("chi2", chi2);
            }
        }
        m
    }
}

pub fn metrics_entry(name: &str, value: impl Display) -> String {
    format!("{name}={value} ")
}

pub fn number_in_string(re: &Regex, line: &str) -> Option<u64> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .and_then(|g| g.as_str().parse::<u64>().ok())
}

/// Caps the metrics string at `max` characters: cut, then drop the last
/// space separated fragment so no partial entry is reported.
pub fn truncate_metrics(m: &str, max: usize) -> String {
    if m.chars().count() <= max {
        return m.to_string();
    }
    warn!("job_metrics out of size ({})", m.chars().count());
    let cut: String = m.chars().take(max).collect();
    let reduced = match cut.rsplit_once(' ') {
        Some((head, _)) => head.to_string(),
        None => String::new(),
    };
    warn!("job_metrics has been reduced to: {reduced}");
    reduced
}
