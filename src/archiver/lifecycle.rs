//! Shutdown coordination.

use crate::error::{Error, Result};

use super::NewsArchiver;

impl NewsArchiver {
    /// Request a graceful shutdown
    ///
    /// A running crawl stops before its next source and a running archive job stops
    /// before its next batch; the work in progress is finished and persisted first.
    /// Jobs started after this call fail with [`Error::ShuttingDown`].
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        tracing::info!("Initiating graceful shutdown");
        self.shutdown.cancel();
        Ok(())
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub(super) fn ensure_accepting(&self) -> Result<()> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        Ok(())
    }
}
