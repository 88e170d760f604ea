pub mod event;
pub mod job;

pub use event::FileEvent;
pub use job::{JobOutcome, JobState, OutcomeKind, ProcessingJob};
