use chromiumoxide::detection::{default_executable, DetectionOptions};
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Known SumatraPDF install locations, probed in order after the per-user
/// install under `%LOCALAPPDATA%`.
const SUMATRA_INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\SumatraPDF\SumatraPDF.exe",
    r"C:\Program Files (x86)\SumatraPDF\SumatraPDF.exe",
];

/// Result of probing the host for the external tools we can delegate to.
///
/// Detected once at startup and handed to the renderer and dispatcher, so
/// "is X installed" never lives in global state and a missing tool is a
/// plain `None` the fallback paths can act on.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// Chromium-based browser used for HTML-to-PDF rendering.
    pub chromium: Option<PathBuf>,
    /// CUPS `lp` queueing command.
    pub lp: Option<PathBuf>,
    /// BSD `lpr` queueing command.
    pub lpr: Option<PathBuf>,
    /// SumatraPDF viewer with command-line printing (Windows).
    pub sumatra: Option<PathBuf>,
}

impl Capabilities {
    pub fn detect() -> Self {
        let caps = Self {
            chromium: default_executable(DetectionOptions::default()).ok(),
            lp: find_in_path("lp"),
            lpr: find_in_path("lpr"),
            sumatra: find_sumatra(),
        };
        debug!("Detected capabilities: {:?}", caps);
        caps
    }
}

/// Locates an executable on the search path, like `shutil.which` or
/// `command -v`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn find_sumatra() -> Option<PathBuf> {
    let per_user = env::var_os("LOCALAPPDATA")
        .map(|dir| PathBuf::from(dir).join(r"SumatraPDF\SumatraPDF.exe"));

    per_user
        .into_iter()
        .chain(SUMATRA_INSTALL_PATHS.iter().map(PathBuf::from))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_binary_is_not_found() {
        assert_eq!(find_in_path("mdprint-no-such-binary"), None);
    }

    #[test]
    fn default_capabilities_are_empty() {
        let caps = Capabilities::default();
        assert!(caps.chromium.is_none());
        assert!(caps.lp.is_none());
        assert!(caps.lpr.is_none());
        assert!(caps.sumatra.is_none());
    }
}
