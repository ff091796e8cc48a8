//! Settings validation gating engine runs.

use std::fs;

use camino::Utf8Path;
use podium_config::Settings;

use crate::errors::CliError;

use super::machine::DesiredState;

/// Lowest port the engine may bind without privileges.
pub const PORT_MIN: u16 = 1024;

/// A usable music directory exists, is a directory, and is listable.
#[must_use]
pub fn music_directory_valid(path: &Utf8Path) -> bool {
    let std_path = path.as_std_path();
    std_path.is_dir() && fs::read_dir(std_path).is_ok()
}

/// Ports must parse as an unprivileged TCP port.
#[must_use]
pub fn port_valid(port: &str) -> bool {
    port.trim().parse::<u16>().is_ok_and(|value| value >= PORT_MIN)
}

/// Derives the reconciliation target from the persisted settings.
#[must_use]
pub fn desired_state(settings: &Settings) -> DesiredState {
    DesiredState {
        run_now: settings.run,
        directory_valid: music_directory_valid(&settings.music_directory),
        port_valid: port_valid(&settings.port),
    }
}

/// Rejects settings that cannot back an engine run.
///
/// The directory check takes precedence so a doubly broken document reports
/// the problem the user is most likely to fix first.
///
/// # Errors
///
/// Returns [`CliError::InvalidMusicDirectory`] or [`CliError::InvalidPort`].
pub fn validate(settings: &Settings) -> Result<(), CliError> {
    if !music_directory_valid(&settings.music_directory) {
        return Err(CliError::InvalidMusicDirectory {
            path: settings.music_directory.to_string(),
        });
    }
    if !port_valid(&settings.port) {
        return Err(CliError::InvalidPort {
            port: settings.port.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::privileged("80", false)]
    #[case::floor("1024", true)]
    #[case::ceiling("65535", true)]
    #[case::overflow("65536", false)]
    #[case::words("sixty-six hundred", false)]
    #[case::padded(" 6600 ", true)]
    fn port_range_is_enforced(#[case] port: &str, #[case] expected: bool) {
        assert_eq!(port_valid(port), expected);
    }

    #[test]
    fn directory_must_exist_and_be_a_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 dir");
        assert!(music_directory_valid(&root));
        assert!(!music_directory_valid(&root.join("missing")));

        let file = root.join("track.flac");
        fs::write(file.as_std_path(), b"").expect("touch file");
        assert!(!music_directory_valid(&file));
    }

    #[test]
    fn directory_failure_is_reported_before_port_failure() {
        let mut settings = Settings::default();
        settings.music_directory = Utf8PathBuf::from("/nonexistent/music");
        settings.port = "80".to_owned();
        assert!(matches!(
            validate(&settings),
            Err(CliError::InvalidMusicDirectory { .. })
        ));
    }

    #[test]
    fn valid_settings_pass() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut settings = Settings::default();
        settings.music_directory =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 dir");
        settings.port = "6600".to_owned();
        assert!(validate(&settings).is_ok());
        let desired = desired_state(&settings);
        assert!(desired.settings_valid());
        assert!(!desired.run_now);
    }
}
