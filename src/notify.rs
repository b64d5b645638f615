//! User-facing notifications
//!
//! The host decides how errors and status messages reach the user. The
//! bridge only reports them through [`Notifier`].

use tracing::{error, info};

/// Sink for messages meant for the user rather than the log.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// A failure the user should act on
    fn error(&self, message: &str);

    /// Progress or state changes, such as calibration prompts
    fn status(&self, message: &str);
}

/// Notifier that forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str) {
        error!("{}", message);
    }

    fn status(&self, message: &str) {
        info!("{}", message);
    }
}
