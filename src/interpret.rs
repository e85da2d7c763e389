use crate::{
    classify::{Classification, Classifier, ErrorCatalog, StandardCatalog},
    config::Config,
    job::{JobDescriptor, JobResult},
    locate::{self, ArtifactSet},
    metrics::MetricsExtractor,
    report::{self, ReportDocument},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    pub result: JobResult,
    pub metrics: String,
    pub artifacts: ArtifactSet,
}

pub struct Interpreter<'c> {
    cfg: Config,
    catalog: &'c dyn ErrorCatalog,
}

impl Interpreter<'static> {
    pub fn new(cfg: &Config) -> Self {
        Self::with_catalog(cfg, &StandardCatalog)
    }
}

impl<'c> Interpreter<'c> {
    pub fn with_catalog(cfg: &Config, catalog: &'c dyn ErrorCatalog) -> Self {
        Self {
            cfg: cfg.clone(),
            catalog,
        }
    }

    /// Interprets one job's artifacts. Never fails: an internal fault yields
    /// a result that keeps the descriptor's exit code and carries no
    /// classification or metrics.
    pub fn interpret(&self, job: &JobDescriptor) -> Interpretation {
        match self.try_interpret(job) {
            Ok(out) => out,
            Err(err) => {
                error!("payload interpretation failed for {}: {:#}", job.workdir.display(), err);
                Interpretation {
                    result: JobResult {
                        exit_code: job.exit_code,
                        ..Default::default()
                    },
                    metrics: String::new(),
                    artifacts: locate::locate(&job.workdir, &self.cfg.files),
                }
            }
        }
    }

    pub fn try_interpret(&self, job: &JobDescriptor) -> Result<Interpretation> {
        let artifacts = locate::locate(&job.workdir, &self.cfg.files);
        debug!(?artifacts, "artifacts");

        let report = self.load_report(&artifacts);
        let mut result = JobResult {
            exit_code: job.exit_code,
            ..Default::default()
        };

        let report_exit_code = report.as_ref().map(ReportDocument::exit_code);
        if let Some(doc) = &report {
            result.exit_code = report_exit_code.unwrap_or_default();
            result.exit_msg = doc.exit_msg();
        }

        if let Some(c) = self.classify(&artifacts, &result, report.as_ref(), report_exit_code)? {
            result.set_classification(c);
        }

        let extractor = MetricsExtractor::new(&self.cfg)?;
        extractor.find_number_of_events(&mut result, report.as_ref(), &artifacts)?;
        extractor.find_db_info(&mut result, report.as_ref());
        let metrics = extractor.job_metrics(job, &result, &artifacts)?;

        info!(
            "payload interpreted exit_code={} error={:?} code={} nevents={} neventsw={}",
            result.exit_code, result.error_kind, result.error_code, result.nevents, result.neventsw
        );

        Ok(Interpretation {
            result,
            metrics,
            artifacts,
        })
    }

    pub fn classify_job(&self, job: &JobDescriptor) -> Result<Option<Classification>> {
        let artifacts = locate::locate(&job.workdir, &self.cfg.files);
        let report = self.load_report(&artifacts);
        let report_exit_code = report.as_ref().map(ReportDocument::exit_code);
        let result = JobResult {
            exit_code: report_exit_code.unwrap_or(job.exit_code),
            ..Default::default()
        };
        self.classify(&artifacts, &result, report.as_ref(), report_exit_code)
    }

    fn load_report(&self, artifacts: &ArtifactSet) -> Option<ReportDocument> {
        match artifacts.job_report.present() {
            Some(path) => report::load(path),
            None => {
                warn!("job report does not exist: {}", artifacts.job_report.path.display());
                None
            }
        }
    }

    fn classify(
        &self,
        artifacts: &ArtifactSet,
        result: &JobResult,
        report: Option<&ReportDocument>,
        report_exit_code: Option<i32>,
    ) -> Result<Option<Classification>> {
        let classifier = Classifier::new(&self.cfg, self.catalog);
        let report_errors = match (report, report_exit_code) {
            (Some(doc), Some(code)) if code != 0 => doc.error_messages(),
            _ => Vec::new(),
        };
        let ev = classifier.evidence(artifacts, result.exit_code, report_exit_code, report_errors);
        classifier.classify(&ev)
    }
}
