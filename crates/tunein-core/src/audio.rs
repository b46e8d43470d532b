//! External audio tool invocation.
//!
//! The audio authoring tool compiles a descriptor (`Radio_{id}.fdp`) into an
//! event file and a sound bank next to it. It is the only blocking call of a
//! build, so it runs with an optional timeout and a [`CancelToken`]; its
//! output goes to a log file whose tail is attached to failures.
//!
//! ## Command line
//!
//! | Setup | Command |
//! |---|---|
//! | native | `<tool> -pc <absolute descriptor>` |
//! | launcher | `<prefix> <tool> -pc <drive><absolute descriptor with \ separators>` |

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};
use wait_timeout::ChildExt;

use tunein_schema::EntityId;

use crate::config::BuildConfig;
use crate::paths;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lines of tool output attached to a failure.
const LOG_TAIL_LINES: usize = 20;

/// Errors raised by the audio tool stage.
#[derive(Error, Debug)]
pub enum ToolError {
    /// No tool path was configured.
    #[error("No audio tool configured (set <fmod> in the project, [tool] path, or TUNEIN_FMOD)")]
    NotConfigured,

    /// The configured tool does not exist.
    #[error("Audio tool not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The process could not be started.
    #[error("Failed to start {program}: {source}")]
    Spawn {
        /// Program that was executed.
        program: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Waiting on the process failed.
    #[error("Failed to wait for audio tool: {0}")]
    Wait(std::io::Error),

    /// The tool exited unsuccessfully.
    #[error("Audio tool failed with exit code {code:?}\n{log_tail}")]
    Failed {
        /// Exit code, if any.
        code: Option<i32>,
        /// Last lines of tool output.
        log_tail: String,
    },

    /// The tool ran past its deadline and was killed.
    #[error("Audio tool timed out after {secs}s")]
    TimedOut {
        /// Configured timeout.
        secs: u64,
    },

    /// The run was cancelled and the tool was killed.
    #[error("Audio tool cancelled")]
    Cancelled,

    /// The tool exited cleanly but an expected output is missing.
    #[error("Audio tool did not produce {}", .0.display())]
    MissingOutput(PathBuf),

    /// Filesystem error around the tool.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Moving an output into the staging tree failed.
    #[error("Failed to move {}: {message}", path.display())]
    Move {
        /// Output being moved.
        path: PathBuf,
        /// Underlying error.
        message: String,
    },
}

/// Shared flag that asks a running tool to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Translate a host path into the path a launcher such as wine sees.
///
/// Paths already carrying a drive letter are returned unchanged.
pub fn wine_path(drive: &str, path: &Path) -> String {
    let raw = path.to_string_lossy();
    if has_drive_letter(&raw) {
        return raw.into_owned();
    }
    let windows = raw.replace('/', "\\");
    if path.is_absolute() {
        format!("{}{windows}", drive.trim_end_matches('\\'))
    } else {
        windows
    }
}

/// Whether `raw` starts with a drive letter (`C:`).
pub fn has_drive_letter(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// A configured audio tool.
#[derive(Debug, Clone)]
pub struct AudioTool {
    program: PathBuf,
    prefix: Option<String>,
    wine_drive: String,
    timeout: Option<Duration>,
    cancel: CancelToken,
}

impl AudioTool {
    /// Use `program` directly.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix: None,
            wine_drive: crate::config::DEFAULT_WINE_DRIVE.to_string(),
            timeout: None,
            cancel: CancelToken::new(),
        }
    }

    /// Run the tool through a launcher that maps host paths onto `drive`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>, drive: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self.wine_drive = drive.into();
        self
    }

    /// Kill the tool after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Observe `cancel` while waiting.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build the tool from configuration, resolving its path.
    ///
    /// Relative paths resolve against `base_dir`; a bare name that does not
    /// exist there is looked up on `PATH` (native runs only).
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::NotConfigured`] or [`ToolError::NotFound`].
    pub fn from_config(config: &BuildConfig, base_dir: &Path) -> Result<Self, ToolError> {
        let configured = config.tool.path.as_ref().ok_or(ToolError::NotConfigured)?;
        let prefix = config
            .tool
            .prefix
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let program = resolve_program(configured, base_dir, prefix.is_none())?;
        let mut tool = Self::new(program).with_timeout(config.tool_timeout());
        if let Some(prefix) = prefix {
            tool = tool.with_prefix(prefix, config.tool.wine_drive.clone());
        }
        Ok(tool)
    }

    /// Resolved tool executable.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Launcher, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Drive used to translate paths for the launcher.
    pub fn wine_drive(&self) -> &str {
        &self.wine_drive
    }

    /// Assemble the command line for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor path cannot be made absolute.
    pub fn command(&self, descriptor: &Path) -> Result<Command, ToolError> {
        let absolute = std::path::absolute(descriptor).map_err(|source| ToolError::Io {
            path: descriptor.to_path_buf(),
            source,
        })?;

        let cmd = match &self.prefix {
            Some(prefix) => {
                let mut c = Command::new(prefix);
                c.arg(&self.program)
                    .arg("-pc")
                    .arg(wine_path(&self.wine_drive, &absolute));
                c
            }
            None => {
                let mut c = Command::new(&self.program);
                c.arg("-pc").arg(&absolute);
                c
            }
        };
        Ok(cmd)
    }

    /// Run the tool on `descriptor`, writing its output to `log_path`.
    ///
    /// # Errors
    ///
    /// Returns an error on spawn failure, non-zero exit, timeout or
    /// cancellation. The process is killed in the last two cases.
    pub fn run(&self, descriptor: &Path, log_path: &Path) -> Result<(), ToolError> {
        let log_err = |source| ToolError::Io {
            path: log_path.to_path_buf(),
            source,
        };
        let log_file = File::create(log_path).map_err(log_err)?;
        let mut cmd = self.command(descriptor)?;
        if let Some(dir) = descriptor.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone().map_err(log_err)?))
            .stderr(Stdio::from(log_file));

        let program = cmd.get_program().to_string_lossy().into_owned();
        info!("Running {program} on {}", descriptor.display());
        debug!("{cmd:?}");

        let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
            program: program.clone(),
            source,
        })?;

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.wait_timeout(POLL_INTERVAL).map_err(ToolError::Wait)? {
                break status;
            }
            if self.cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::Cancelled);
            }
            if let Some(timeout) = self.timeout {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::TimedOut {
                        secs: timeout.as_secs(),
                    });
                }
            }
        };

        if !status.success() {
            let log_tail = read_last_lines(log_path, LOG_TAIL_LINES).unwrap_or_default();
            return Err(ToolError::Failed {
                code: status.code(),
                log_tail,
            });
        }

        debug!("{program} finished in {:.1}s", start.elapsed().as_secs_f64());
        Ok(())
    }

    /// Run the tool and move its two outputs into `sound_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the run fails or an output is missing.
    pub fn build(
        &self,
        id: &EntityId,
        descriptor: &Path,
        sound_dir: &Path,
        log_path: &Path,
    ) -> Result<Vec<PathBuf>, ToolError> {
        self.run(descriptor, log_path)?;

        let source_dir = descriptor.parent().unwrap_or(Path::new("."));
        let outputs = paths::sound_outputs(id);
        for name in &outputs {
            let produced = source_dir.join(name);
            if !produced.is_file() {
                return Err(ToolError::MissingOutput(produced));
            }
        }

        let mut moved = Vec::with_capacity(outputs.len());
        for name in &outputs {
            let produced = source_dir.join(name);
            let target = sound_dir.join(name);
            fs_extra::file::move_file(
                &produced,
                &target,
                &fs_extra::file::CopyOptions::new().overwrite(true),
            )
            .map_err(|e| ToolError::Move {
                path: produced.clone(),
                message: e.to_string(),
            })?;
            debug!("Moved {} -> {}", produced.display(), target.display());
            moved.push(target);
        }
        Ok(moved)
    }
}

fn resolve_program(configured: &Path, base_dir: &Path, search_path: bool) -> Result<PathBuf, ToolError> {
    let candidate = if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        base_dir.join(configured)
    };
    if candidate.is_file() {
        return Ok(candidate);
    }

    let bare = configured.components().count() == 1;
    if search_path && bare {
        if let Ok(found) = which::which(configured) {
            return Ok(found);
        }
    }
    Err(ToolError::NotFound(candidate))
}

/// Read the last `n` lines of a log file, reading at most 16KB from the end.
fn read_last_lines(path: &Path, n: usize) -> std::io::Result<String> {
    const TAIL_SIZE: u64 = 16 * 1024;

    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let seek_pos = len.saturating_sub(TAIL_SIZE);
    file.seek(SeekFrom::Start(seek_pos))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let text = String::from_utf8_lossy(&buf);
    // Mid-file seek: the first line is partial.
    let content = if seek_pos > 0 {
        text.find('\n').map_or(&*text, |idx| &text[idx + 1..])
    } else {
        &*text
    };
    let lines: Vec<&str> = content.lines().collect();
    Ok(lines[lines.len().saturating_sub(n)..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wine_paths() {
        assert_eq!(
            wine_path("Z:", Path::new("/home/me/radio/Radio_ABCD.fdp")),
            "Z:\\home\\me\\radio\\Radio_ABCD.fdp"
        );
        assert_eq!(
            wine_path("W:", Path::new("C:\\music\\a.wav")),
            "C:\\music\\a.wav"
        );
        assert_eq!(wine_path("Z:", Path::new("music/a.wav")), "music\\a.wav");
    }

    #[test]
    fn native_command_line() {
        let tool = AudioTool::new("/opt/fmod/fmod_designercl");
        let cmd = tool.command(Path::new("/p/Radio_ABCD.fdp")).unwrap();
        assert_eq!(cmd.get_program(), "/opt/fmod/fmod_designercl");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["-pc", "/p/Radio_ABCD.fdp"]);
    }

    #[test]
    fn prefixed_command_line() {
        let tool = AudioTool::new("/opt/fmod/fmod_designercl.exe").with_prefix("wine", "Z:");
        let cmd = tool.command(Path::new("/p/Radio_ABCD.fdp")).unwrap();
        assert_eq!(cmd.get_program(), "wine");
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "/opt/fmod/fmod_designercl.exe",
                "-pc",
                "Z:\\p\\Radio_ABCD.fdp"
            ]
        );
    }

    #[test]
    fn unconfigured_tool() {
        let config = BuildConfig::default();
        assert!(matches!(
            AudioTool::from_config(&config, Path::new(".")),
            Err(ToolError::NotConfigured)
        ));
    }

    #[test]
    fn relative_tool_resolves_against_project() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fmod.exe"), b"").unwrap();
        let mut config = BuildConfig::default();
        config.tool.path = Some(PathBuf::from("fmod.exe"));
        config.tool.prefix = Some("wine".to_string());
        let tool = AudioTool::from_config(&config, dir.path()).unwrap();
        assert_eq!(tool.program(), dir.path().join("fmod.exe"));
        assert_eq!(tool.prefix(), Some("wine"));

        config.tool.path = Some(PathBuf::from("missing.exe"));
        assert!(matches!(
            AudioTool::from_config(&config, dir.path()),
            Err(ToolError::NotFound(_))
        ));
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn log_tail() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("tool.log");
        let body: String = (1..=30).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&log, body).unwrap();
        let tail = read_last_lines(&log, 3).unwrap();
        assert_eq!(tail, "line 28\nline 29\nline 30");
    }

    #[test]
    fn log_tail_drops_partial_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("tool.log");
        let padding = "x".repeat(50);
        let body: String = (0..1000).map(|i| format!("entry {i:04} {padding}\n")).collect();
        std::fs::write(&log, &body).unwrap();

        let tail = read_last_lines(&log, usize::MAX).unwrap();
        let lines: Vec<&str> = tail.lines().collect();
        assert!(lines.len() < 1000);
        assert!(
            lines
                .iter()
                .all(|l| l.starts_with("entry ") && l.len() == 61)
        );
        assert_eq!(lines.last().copied(), Some(format!("entry 0999 {padding}").as_str()));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("tool.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn failure_carries_log_tail() {
            let dir = tempfile::tempdir().unwrap();
            let tool = AudioTool::new(script(dir.path(), "echo 'bank build failed'; exit 3"));
            let descriptor = dir.path().join("Radio_ABCD.fdp");
            std::fs::write(&descriptor, "<project/>").unwrap();

            let err = tool.run(&descriptor, &dir.path().join("tool.log")).unwrap_err();
            match err {
                ToolError::Failed { code, log_tail } => {
                    assert_eq!(code, Some(3));
                    assert!(log_tail.contains("bank build failed"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn timeout_kills_the_tool() {
            let dir = tempfile::tempdir().unwrap();
            let tool = AudioTool::new(script(dir.path(), "sleep 30"))
                .with_timeout(Some(Duration::from_millis(200)));
            let descriptor = dir.path().join("Radio_ABCD.fdp");
            let started = Instant::now();
            let err = tool.run(&descriptor, &dir.path().join("tool.log")).unwrap_err();
            assert!(matches!(err, ToolError::TimedOut { .. }));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[test]
        fn cancellation_kills_the_tool() {
            let dir = tempfile::tempdir().unwrap();
            let token = CancelToken::new();
            token.cancel();
            let tool = AudioTool::new(script(dir.path(), "sleep 30")).with_cancel(token);
            let descriptor = dir.path().join("Radio_ABCD.fdp");
            let err = tool.run(&descriptor, &dir.path().join("tool.log")).unwrap_err();
            assert!(matches!(err, ToolError::Cancelled));
        }

        #[test]
        fn outputs_are_moved_into_sound_dir() {
            let dir = tempfile::tempdir().unwrap();
            let tool = AudioTool::new(script(
                dir.path(),
                "d=$(dirname \"$2\"); n=$(basename \"$2\" .fdp); echo fev > \"$d/$n.fev\"; echo fsb > \"$d/$n.fsb\"",
            ));
            let descriptor = dir.path().join("Radio_ABCD.fdp");
            std::fs::write(&descriptor, "<project/>").unwrap();
            let sound = dir.path().join("staging/sound");
            std::fs::create_dir_all(&sound).unwrap();

            let id = EntityId::new("ABCD").unwrap();
            let moved = tool
                .build(&id, &descriptor, &sound, &dir.path().join("tool.log"))
                .unwrap();
            assert_eq!(moved.len(), 2);
            assert!(sound.join("Radio_ABCD.fev").is_file());
            assert!(sound.join("Radio_ABCD.fsb").is_file());
            assert!(!dir.path().join("Radio_ABCD.fev").exists());
        }

        #[test]
        fn missing_output_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let tool = AudioTool::new(script(dir.path(), "exit 0"));
            let descriptor = dir.path().join("Radio_ABCD.fdp");
            std::fs::write(&descriptor, "<project/>").unwrap();
            let id = EntityId::new("ABCD").unwrap();
            let err = tool
                .build(&id, &descriptor, dir.path(), &dir.path().join("tool.log"))
                .unwrap_err();
            assert!(matches!(err, ToolError::MissingOutput(_)));
        }
    }
}
