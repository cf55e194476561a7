//! HAProxy process adapter.
//!
//! # Responsibilities
//! - Stage candidate configs next to the live file and validate them in place
//! - Commit accepted candidates with an atomic rename
//! - Run the reload command with a hard timeout
//! - Probe proxy health over HTTP
//!
//! # Design Decisions
//! - Commands are argv vectors, never shell strings; `{config}` is the only substitution
//! - A command is done when it exits; background children it leaves behind
//!   (a reload script starting the proxy) do not hold it up
//! - Timed-out commands are killed
//! - Diagnostic output of a failed command is kept for the caller

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;

use crate::config::HaproxyConfig;
use crate::health::HealthProbe;
use crate::reload::atomic;
use crate::reload::control::ProxyControl;
use crate::reload::error::ProxyError;

/// Replaced by the config file path in command arguments.
pub const CONFIG_PLACEHOLDER: &str = "{config}";

const MAX_DIAGNOSTIC_BYTES: usize = 2048;

/// Controls a real HAProxy through its config file and shell commands.
#[derive(Debug, Clone)]
pub struct HaproxyProcess {
    config_path: PathBuf,
    check_command: Vec<String>,
    reload_command: Vec<String>,
    lock_path: Option<PathBuf>,
    command_timeout: Duration,
    probe: HealthProbe,
}

impl HaproxyProcess {
    pub fn new(config: &HaproxyConfig) -> Self {
        Self {
            config_path: config.config_path.clone(),
            check_command: config.check_command.clone(),
            reload_command: config.reload_command.clone(),
            lock_path: config.lock_path.clone(),
            command_timeout: Duration::from_secs(config.reload_timeout_secs),
            probe: HealthProbe::new(
                config.health_url.clone(),
                Duration::from_millis(config.probe_timeout_ms),
            ),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn run(&self, argv: &[String], config_arg: &Path) -> Result<(), ProxyError> {
        let (program, args) = argv.split_first().ok_or(ProxyError::EmptyCommand)?;
        let config_arg = config_arg.to_string_lossy();
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.replace(CONFIG_PLACEHOLDER, &config_arg))
            .collect();
        let command = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        tracing::debug!(command = %command, "Running proxy command");

        // Output goes to files, not pipes: a reload script that leaves the
        // proxy running in the background keeps its inherited fds open.
        let stdout = tempfile::tempfile()?;
        let stderr = tempfile::tempfile()?;

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProxyError::Spawn {
                command: command.clone(),
                source,
            })?;

        let waited = tokio::time::timeout(self.command_timeout, child.wait()).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => return Err(ProxyError::Spawn { command, source }),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(command = %command, error = %e, "Failed to kill timed-out command");
                }
                return Err(ProxyError::Timeout {
                    command,
                    secs: self.command_timeout.as_secs(),
                });
            }
        };

        if status.success() {
            return Ok(());
        }

        let stderr = read_diagnostic(stderr).await?;
        let stdout = read_diagnostic(stdout).await?;
        let diagnostic = if stderr.trim().is_empty() { stdout } else { stderr };
        Err(ProxyError::Rejected {
            command,
            status: status.to_string(),
            output: truncate(diagnostic.trim(), MAX_DIAGNOSTIC_BYTES),
        })
    }
}

/// Read back at most twice the diagnostic budget of a captured stream.
async fn read_diagnostic(file: std::fs::File) -> Result<String, ProxyError> {
    let mut file = tokio::fs::File::from_std(file);
    file.seek(SeekFrom::Start(0)).await?;
    let mut bytes = Vec::new();
    file.take(2 * MAX_DIAGNOSTIC_BYTES as u64)
        .read_to_end(&mut bytes)
        .await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl ProxyControl for HaproxyProcess {
    async fn read_current_config(&self) -> Result<Option<String>, ProxyError> {
        match tokio::fs::read_to_string(&self.config_path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_config(&self, text: &str) -> Result<(), ProxyError> {
        let staged = atomic::stage(&self.config_path, text.as_bytes())?;
        self.run(&self.check_command, staged.path()).await?;
        staged.commit(&self.config_path)?;

        tracing::info!(path = %self.config_path.display(), bytes = text.len(), "Configuration committed");
        Ok(())
    }

    async fn trigger_reload(&self) -> Result<(), ProxyError> {
        self.run(&self.reload_command, &self.config_path).await
    }

    async fn health_check(&self) -> bool {
        self.probe.check().await
    }

    fn lock_held(&self) -> Option<PathBuf> {
        self.lock_path.as_ref().filter(|path| path.exists()).cloned()
    }

    async fn set_lock(&self, held: bool) -> Result<Option<PathBuf>, ProxyError> {
        let Some(path) = &self.lock_path else {
            return Ok(None);
        };
        if held {
            tokio::fs::write(path, b"").await?;
        } else {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(path.clone()))
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into(), "sh".into(), CONFIG_PLACEHOLDER.into()]
    }

    fn process(dir: &Path) -> HaproxyProcess {
        let config = HaproxyConfig {
            config_path: dir.join("haproxy.cfg"),
            check_command: sh("! grep -q REJECT \"$1\" || { echo \"[ALERT] bad line\" >&2; exit 1; }"),
            reload_command: sh("exit 0"),
            reload_timeout_secs: 2,
            ..HaproxyConfig::default()
        };
        HaproxyProcess::new(&config)
    }

    #[tokio::test]
    async fn test_accepted_config_is_committed() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = process(dir.path());

        assert_eq!(proxy.read_current_config().await.unwrap(), None);
        proxy.write_config("frontend ok\n").await.unwrap();

        assert_eq!(
            proxy.read_current_config().await.unwrap().as_deref(),
            Some("frontend ok\n")
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_config_leaves_live_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = process(dir.path());
        proxy.write_config("frontend ok\n").await.unwrap();

        let err = proxy.write_config("REJECT me\n").await.unwrap_err();
        match err {
            ProxyError::Rejected { output, .. } => assert_eq!(output, "[ALERT] bad line"),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(
            std::fs::read_to_string(dir.path().join("haproxy.cfg")).unwrap(),
            "frontend ok\n"
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_hung_reload_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut proxy = process(dir.path());
        proxy.reload_command = sh("sleep 30");
        proxy.command_timeout = Duration::from_millis(200);

        let err = proxy.trigger_reload().await.unwrap_err();
        assert!(matches!(err, ProxyError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_reload_that_backgrounds_a_child_returns_on_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut proxy = process(dir.path());
        proxy.reload_command = sh("sleep 5 & echo started; exit 0");

        let started = std::time::Instant::now();
        proxy.trigger_reload().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_failed_command_reports_stdout_when_stderr_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut proxy = process(dir.path());
        proxy.reload_command = sh("echo 'cannot bind socket'; exit 3");

        match proxy.trigger_reload().await.unwrap_err() {
            ProxyError::Rejected { output, status, .. } => {
                assert_eq!(output, "cannot bind socket");
                assert!(status.contains('3'), "{}", status);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut proxy = process(dir.path());
        proxy.reload_command = vec!["/nonexistent/haproxy-reload".into()];

        let err = proxy.trigger_reload().await.unwrap_err();
        assert!(matches!(err, ProxyError::Spawn { .. }));
    }

    #[test]
    fn test_lock_file_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let mut proxy = process(dir.path());
        let lock = dir.path().join("lock");
        proxy.lock_path = Some(lock.clone());

        assert_eq!(proxy.lock_held(), None);
        std::fs::write(&lock, "").unwrap();
        assert_eq!(proxy.lock_held(), Some(lock));
    }

    #[tokio::test]
    async fn test_set_lock_creates_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut proxy = process(dir.path());
        assert_eq!(proxy.set_lock(true).await.unwrap(), None);

        let lock = dir.path().join("lock");
        proxy.lock_path = Some(lock.clone());

        assert_eq!(proxy.set_lock(true).await.unwrap(), Some(lock.clone()));
        assert_eq!(proxy.lock_held(), Some(lock.clone()));
        proxy.set_lock(false).await.unwrap();
        assert_eq!(proxy.lock_held(), None);
        // Releasing twice is fine.
        assert_eq!(proxy.set_lock(false).await.unwrap(), Some(lock));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é…");
    }
}
