//! Background workers: the post scheduler and the token refresh sweep.

pub mod daemon;
pub mod refresh;

pub use daemon::{scheduler_daemon, PublishOutcome, Scheduler, SchedulerConfig};
pub use refresh::{refresh_cycle, refresh_daemon};
