//! Run-scoped resources held while the engine is up.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{info, warn};

use super::CONTROLLER_TARGET;

/// Keeps the host responsive while the engine runs.
///
/// Acquisition and release are infallible from the controller's point of
/// view: implementations log their own failures, and a missed lock never
/// blocks the lifecycle.
pub trait RetentionLock: Send + Sync {
    /// Takes the lock for the duration of an engine run.
    fn acquire(&self);
    /// Releases the lock once the engine has stopped.
    fn release(&self);
}

/// Lock used when the host needs no retention support.
#[derive(Debug, Default)]
pub struct NoopRetentionLock;

impl RetentionLock for NoopRetentionLock {
    fn acquire(&self) {}

    fn release(&self) {}
}

/// Surfaces the running state to operators outside the control protocol.
pub trait StatusIndicator: Send + Sync {
    /// Marks the service as running.
    fn raise(&self);
    /// Clears the running marker.
    fn lower(&self);
}

/// Indicator backed by a marker file in the runtime directory.
///
/// The file exists exactly while the engine runs, so shell tooling can test
/// for it without speaking the control protocol.
#[derive(Debug)]
pub struct FileStatusIndicator {
    path: PathBuf,
}

impl FileStatusIndicator {
    /// Builds an indicator writing to the given marker path.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl StatusIndicator for FileStatusIndicator {
    fn raise(&self) {
        if let Err(error) = fs::write(&self.path, b"running\n") {
            warn!(
                target: CONTROLLER_TARGET,
                file = %self.path.display(),
                error = %error,
                "failed to write status marker"
            );
            return;
        }
        info!(
            target: CONTROLLER_TARGET,
            file = %self.path.display(),
            "status marker raised"
        );
    }

    fn lower(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(
                    target: CONTROLLER_TARGET,
                    file = %self.path.display(),
                    error = %error,
                    "failed to remove status marker"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_file_tracks_raise_and_lower() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("podiumd.status");
        let indicator = FileStatusIndicator::new(path.clone());

        indicator.raise();
        assert!(path.exists());
        indicator.lower();
        assert!(!path.exists());
        // Lowering an absent marker must stay quiet.
        indicator.lower();
    }
}
