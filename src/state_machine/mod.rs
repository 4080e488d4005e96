mod job;
mod state;

pub use job::{JobContext, JobLog, LogEntry, LogLevel};
pub use state::{Event, JobStatus, PauseReason, StateMachine};
