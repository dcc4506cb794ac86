pub mod backoff;
pub mod scheduled_task;

pub use scheduled_task::ScheduledTask;
