//! Singleton guard and runtime artefacts for the daemon process.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use serde::Serialize;
use tracing::{info, warn};

use podium_config::RuntimePaths;

use super::PROCESS_TARGET;
use super::errors::LaunchError;

/// Holds the daemon lock and maintains the pid and health files.
///
/// Dropping the guard removes every runtime artefact it wrote, including a
/// status marker a crashed run may have left behind.
#[derive(Debug)]
pub(super) struct ProcessGuard {
    paths: RuntimePaths,
    _lock: File,
    pid: Option<u32>,
}

impl ProcessGuard {
    /// Acquires the daemon lock, reclaiming stale artefacts from a dead
    /// process.
    pub(super) fn acquire(paths: RuntimePaths) -> Result<Self, LaunchError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self {
            paths,
            _lock: lock,
            pid: None,
        })
    }

    /// Records the daemon PID for clients polling readiness.
    pub(super) fn write_pid(&mut self, pid: u32) -> Result<(), LaunchError> {
        let path = self.paths.pid_path();
        let mut file = open_private(path).map_err(|source| LaunchError::PidWrite {
            path: path.to_path_buf(),
            source,
        })?;
        writeln!(file, "{pid}")
            .and_then(|()| file.sync_all())
            .map_err(|source| LaunchError::PidWrite {
                path: path.to_path_buf(),
                source,
            })?;
        self.pid = Some(pid);
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %path.display(),
            "pid file written"
        );
        Ok(())
    }

    /// Publishes the daemon health state as a JSON snapshot.
    pub(super) fn write_health(&self, status: HealthState) -> Result<(), LaunchError> {
        let pid = self.pid.ok_or(LaunchError::MissingPid)?;
        let path = self.paths.health_path();
        let mut file = open_private(path).map_err(|source| LaunchError::HealthWrite {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot = HealthSnapshot::new(status, pid)?;
        serde_json::to_writer(&mut file, &snapshot)?;
        file.write_all(b"\n")
            .and_then(|()| file.sync_all())
            .map_err(|source| LaunchError::HealthWrite {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            target: PROCESS_TARGET,
            status = snapshot.status,
            file = %path.display(),
            "health snapshot updated"
        );
        Ok(())
    }

    pub(super) fn paths(&self) -> &RuntimePaths {
        &self.paths
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        for path in [
            self.paths.lock_path(),
            self.paths.pid_path(),
            self.paths.health_path(),
            self.paths.status_path(),
        ] {
            if let Err(error) = fs::remove_file(path)
                && error.kind() != io::ErrorKind::NotFound
            {
                warn!(
                    target: PROCESS_TARGET,
                    file = %path.display(),
                    error = %error,
                    "failed to remove runtime artefact"
                );
            }
        }
    }
}

/// Daemon health states published for readiness polling.
#[derive(Debug, Clone, Copy)]
pub(super) enum HealthState {
    Starting,
    Ready,
    Stopping,
}

impl HealthState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthSnapshot<'a> {
    status: &'a str,
    pid: u32,
    timestamp: u64,
}

impl HealthSnapshot<'_> {
    fn new(state: HealthState, pid: u32) -> Result<Self, LaunchError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|source| LaunchError::Clock { source })?
            .as_secs();
        Ok(Self {
            status: state.as_str(),
            pid,
            timestamp,
        })
    }
}

fn open_private(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

fn acquire_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    match options.open(paths.lock_path()) {
        Ok(file) => {
            info!(
                target: PROCESS_TARGET,
                file = %paths.lock_path().display(),
                "acquired daemon lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => reclaim_stale_lock(paths),
        Err(source) => Err(LaunchError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn reclaim_stale_lock(paths: &RuntimePaths) -> Result<File, LaunchError> {
    if let Some(pid) = read_pid(paths.pid_path())
        && pid != 0
    {
        match process_alive(pid) {
            Ok(true) => {
                info!(
                    target: PROCESS_TARGET,
                    pid,
                    "refusing to start: existing daemon alive"
                );
                return Err(LaunchError::AlreadyRunning { pid });
            }
            Ok(false) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid,
                    "existing daemon not detected; cleaning stale files"
                );
            }
            Err(error) => return Err(error),
        }
    }
    remove_if_present(paths.lock_path())?;
    remove_if_present(paths.pid_path())?;
    acquire_lock(paths)
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok()
}

fn remove_if_present(path: &Path) -> Result<(), LaunchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LaunchError::Cleanup {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn process_alive(pid: u32) -> Result<bool, LaunchError> {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(true),
        Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH | Errno::ECHILD) => Ok(false),
        Err(errno) => Err(LaunchError::CheckProcess { pid, source: errno }),
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use podium_config::{Config, SocketEndpoint};

    use super::*;

    fn runtime_paths(dir: &tempfile::TempDir) -> RuntimePaths {
        let socket = Utf8PathBuf::from_path_buf(dir.path().join("podiumd.sock")).expect("utf8");
        let mut config = Config::default();
        config.socket = SocketEndpoint::unix(socket);
        RuntimePaths::from_config(&config).expect("runtime paths")
    }

    #[test]
    fn guard_writes_and_cleans_runtime_artefacts() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = runtime_paths(&dir);
        {
            let mut guard = ProcessGuard::acquire(paths.clone()).expect("acquire guard");
            guard.write_pid(std::process::id()).expect("write pid");
            guard.write_health(HealthState::Ready).expect("write health");
            assert!(paths.lock_path().exists());
            assert!(paths.pid_path().exists());
            let health = fs::read_to_string(paths.health_path()).expect("read health");
            assert!(health.contains("\"status\":\"ready\""));
        }
        assert!(!paths.lock_path().exists());
        assert!(!paths.pid_path().exists());
        assert!(!paths.health_path().exists());
    }

    #[test]
    fn live_pid_blocks_a_second_acquire() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = runtime_paths(&dir);
        let mut guard = ProcessGuard::acquire(paths.clone()).expect("acquire guard");
        guard.write_pid(std::process::id()).expect("write pid");

        let error = ProcessGuard::acquire(paths).expect_err("second acquire should fail");
        assert!(matches!(error, LaunchError::AlreadyRunning { .. }));
    }

    #[test]
    fn stale_lock_from_a_dead_process_is_reclaimed() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = runtime_paths(&dir);
        fs::write(paths.lock_path(), b"").expect("seed stale lock");
        // PID 0 is never probed, so the lock counts as stale.
        fs::write(paths.pid_path(), b"0\n").expect("seed stale pid");

        let guard = ProcessGuard::acquire(paths.clone()).expect("reclaim stale lock");
        assert!(paths.lock_path().exists());
        drop(guard);
    }

    #[test]
    fn health_before_pid_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let paths = runtime_paths(&dir);
        let guard = ProcessGuard::acquire(paths).expect("acquire guard");
        let error = guard
            .write_health(HealthState::Starting)
            .expect_err("health without pid");
        assert!(matches!(error, LaunchError::MissingPid));
    }
}
