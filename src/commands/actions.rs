//! Desktop actions requested by commands
//!
//! Actions are fire-and-forget: failures are logged and never reach the loop.
//! The browser goes through the desktop URL handler, the editor is found on
//! `PATH`.

use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Default page opened by the browser command
pub const DEFAULT_BROWSER_URL: &str = "https://www.google.com";

#[cfg(target_os = "linux")]
const EDITOR_CANDIDATES: &[&str] = &[
    "gnome-text-editor",
    "gedit",
    "kate",
    "mousepad",
    "xed",
    "pluma",
];
#[cfg(target_os = "windows")]
const EDITOR_CANDIDATES: &[&str] = &["notepad"];
#[cfg(not(any(target_os = "linux", target_os = "windows")))]
const EDITOR_CANDIDATES: &[&str] = &[];

/// Side effect a command asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsAction {
    OpenBrowser,
    OpenEditor,
}

impl std::fmt::Display for OsAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenBrowser => write!(f, "open browser"),
            Self::OpenEditor => write!(f, "open editor"),
        }
    }
}

/// Executes [`OsAction`]s on behalf of the assistant loop
pub trait OsActions: Send + Sync {
    /// Start the action without waiting for it
    fn perform(&self, action: OsAction);
}

/// Logs actions instead of running them
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRun;

impl OsActions for DryRun {
    fn perform(&self, action: OsAction) {
        tracing::info!(%action, "dry run, action not executed");
    }
}

/// Launches the platform browser and a text editor
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    browser_url: String,
    editor: Option<String>,
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_BROWSER_URL.to_string(), None)
    }
}

impl SystemLauncher {
    /// `editor` overrides the per-platform editor search
    #[must_use]
    pub const fn new(browser_url: String, editor: Option<String>) -> Self {
        Self {
            browser_url,
            editor,
        }
    }

    #[must_use]
    pub fn browser_url(&self) -> &str {
        &self.browser_url
    }

    /// Editor program and its arguments, if one is installed
    #[must_use]
    pub fn editor_command(&self) -> Option<(PathBuf, Vec<String>)> {
        if let Some(editor) = &self.editor {
            return which::which(editor).ok().map(|path| (path, Vec::new()));
        }

        if cfg!(target_os = "macos") {
            return Some((PathBuf::from("open"), vec!["-a".into(), "TextEdit".into()]));
        }

        EDITOR_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(|path| (path, Vec::new()))
    }

    fn open_browser(&self) {
        tracing::info!(url = %self.browser_url, "opening browser");
        if let Err(e) = open::that_detached(&self.browser_url) {
            tracing::error!(url = %self.browser_url, error = %e, "failed to open browser");
        }
    }

    fn open_editor(&self) {
        let Some((program, args)) = self.editor_command() else {
            tracing::warn!("no text editor available");
            return;
        };

        tracing::info!(program = %program.display(), "launching editor");

        let spawned = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                // Reap in the background so the child never lingers as a zombie
                std::thread::spawn(move || {
                    if let Err(e) = child.wait() {
                        tracing::debug!(error = %e, "failed to reap launched process");
                    }
                });
            }
            Err(e) => {
                tracing::error!(program = %program.display(), error = %e, "launch failed");
            }
        }
    }
}

impl OsActions for SystemLauncher {
    fn perform(&self, action: OsAction) {
        match action {
            OsAction::OpenBrowser => self.open_browser(),
            OsAction::OpenEditor => self.open_editor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_url_defaults_and_overrides() {
        assert_eq!(SystemLauncher::default().browser_url(), DEFAULT_BROWSER_URL);
        let launcher = SystemLauncher::new("https://example.org".to_string(), None);
        assert_eq!(launcher.browser_url(), "https://example.org");
    }

    #[test]
    fn test_missing_editor_override_yields_nothing() {
        let launcher = SystemLauncher::new(
            DEFAULT_BROWSER_URL.to_string(),
            Some("surely-not-an-installed-editor-binary".to_string()),
        );
        assert!(launcher.editor_command().is_none());
    }

    #[test]
    fn test_action_display() {
        assert_eq!(OsAction::OpenBrowser.to_string(), "open browser");
        assert_eq!(OsAction::OpenEditor.to_string(), "open editor");
    }
}
