//! Result reporting
//!
//! Two consumers learn about a finished test: the cloud vendor that
//! hosted the session (best-effort status update and job lookup) and the
//! local report document (ordered accumulation, rendered once at the end
//! of the run).

pub mod sink;
pub mod status;

pub use sink::{render_report, OutcomeKind, ReportSink, TestOutcomeRecord};
pub use status::{CloudStatusReporter, JobAuthMode, JobOutcome, JobReference};
