pub mod classify;
pub mod cli;
pub mod config;
pub mod features;
pub mod interpret;
pub mod job;
pub mod locate;
pub mod memory;
pub mod metadata;
pub mod metrics;
pub mod report;
pub mod scan;
pub mod summary;
pub mod util;

pub use interpret::{Interpretation, Interpreter};
pub use job::{JobDescriptor, JobResult, JobState};
