pub mod auto_close;
pub mod rate_limit_cleanup;

pub use auto_close::{AutoCloseScheduler, SweepReport, DEFAULT_SWEEP_INTERVAL};
pub use rate_limit_cleanup::{spawn_rate_limit_cleanup_task, DEFAULT_CLEANUP_INTERVAL};
