//! Runs generated tests against an artifact in a throwaway directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use taskweave_core::api::{CapabilityError, SandboxCapability, SandboxConfig, SandboxOutcome};

pub struct ProcessSandbox {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    max_log_bytes: usize,
    extension: String,
    root: PathBuf,
}

impl ProcessSandbox {
    pub fn new(cfg: &SandboxConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms),
            max_log_bytes: cfg.max_log_bytes,
            extension: cfg.file_extension.trim_start_matches('.').to_string(),
            root: std::env::temp_dir(),
        }
    }

    /// Create sandbox directories under `root` instead of the system temp dir.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    async fn write_files(
        &self,
        dir: &Path,
        artifact: &str,
        tests: &[String],
    ) -> std::io::Result<(PathBuf, Vec<PathBuf>)> {
        tokio::fs::create_dir_all(dir).await?;
        let artifact_path = dir.join(format!("artifact.{}", self.extension));
        tokio::fs::write(&artifact_path, artifact).await?;

        let mut test_paths = Vec::with_capacity(tests.len());
        for (i, test) in tests.iter().enumerate() {
            let path = dir.join(format!("test_artifact_{}.{}", i + 1, self.extension));
            tokio::fs::write(&path, test).await?;
            test_paths.push(path);
        }
        Ok((artifact_path, test_paths))
    }

    /// `{tests}` as a whole argument expands to one argument per test file.
    fn expand_args(&self, artifact: &Path, tests: &[PathBuf]) -> Vec<String> {
        let artifact = artifact.display().to_string();
        let mut out = Vec::with_capacity(self.args.len() + tests.len());
        for arg in &self.args {
            if arg == "{tests}" {
                out.extend(tests.iter().map(|p| p.display().to_string()));
                continue;
            }
            let joined = tests
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            out.push(arg.replace("{artifact}", &artifact).replace("{tests}", &joined));
        }
        out
    }

    /// Keep the tail of the output; failures are reported at the end.
    fn truncate_log(&self, log: String) -> String {
        if log.len() <= self.max_log_bytes {
            return log;
        }
        let mut start = log.len() - self.max_log_bytes;
        while !log.is_char_boundary(start) {
            start += 1;
        }
        format!("...{}", &log[start..])
    }

    async fn execute(&self, dir: &Path, artifact: &str, tests: &[String]) -> Result<SandboxOutcome, CapabilityError> {
        let (artifact_path, test_paths) = self
            .write_files(dir, artifact, tests)
            .await
            .map_err(|e| CapabilityError::Transient(format!("sandbox setup failed: {e}")))?;
        let args = self.expand_args(&artifact_path, &test_paths);

        let child = Command::new(&self.program)
            .args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CapabilityError::Rejected(format!("failed to start '{}': {e}", self.program))
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| CapabilityError::Transient(format!("sandbox process failed: {e}")))?,
            Err(_) => return Err(CapabilityError::Timeout(self.timeout)),
        };

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            log.push_str("\n--- stderr ---\n");
            log.push_str(&stderr);
        }

        Ok(SandboxOutcome {
            passed: output.status.success(),
            log: self.truncate_log(log),
        })
    }
}

#[async_trait]
impl SandboxCapability for ProcessSandbox {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(&self, artifact: &str, tests: &[String]) -> Result<SandboxOutcome, CapabilityError> {
        let dir = self
            .root
            .join(format!("taskweave-sandbox-{}", uuid::Uuid::new_v4()));
        tracing::debug!(
            target: "taskweave.sandbox",
            program = %self.program,
            dir = %dir.display(),
            tests = tests.len(),
            "sandbox run"
        );

        let result = self.execute(&dir, artifact, tests).await;
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            tracing::debug!(target: "taskweave.sandbox", dir = %dir.display(), error = %e, "sandbox cleanup failed");
        }

        match &result {
            Ok(outcome) => tracing::debug!(target: "taskweave.sandbox", passed = outcome.passed, "sandbox finished"),
            Err(e) => tracing::warn!(target: "taskweave.sandbox", error = %e, "sandbox error"),
        }
        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sandbox(program: &str, args: &[&str], root: &Path) -> ProcessSandbox {
        let cfg = SandboxConfig {
            program: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            timeout_ms: 5_000,
            max_log_bytes: 64,
            file_extension: "sh".into(),
        };
        ProcessSandbox::new(&cfg).with_root(root)
    }

    #[tokio::test]
    async fn test_exit_status_decides_pass() {
        let root = tempfile::tempdir().unwrap();
        let ok = sandbox("sh", &["{tests}"], root.path());
        let outcome = ok
            .run("echo artifact", &["echo checking; exit 0".to_string()])
            .await
            .unwrap();
        assert!(outcome.passed);
        assert!(outcome.log.contains("checking"));

        let failing = sandbox("sh", &["{tests}"], root.path());
        let outcome = failing
            .run("echo artifact", &["echo boom >&2; exit 3".to_string()])
            .await
            .unwrap();
        assert!(!outcome.passed);
        assert!(outcome.log.contains("boom"));

        // Sandbox directories are removed after each run.
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_artifact_placeholder_and_log_truncation() {
        let root = tempfile::tempdir().unwrap();
        let sb = sandbox("sh", &["-c", "cat {artifact}; cat {artifact}"], root.path());
        let artifact = "x".repeat(100);
        let outcome = sb.run(&artifact, &["unused".to_string()]).await.unwrap();
        assert!(outcome.passed);
        assert!(outcome.log.starts_with("..."));
        assert_eq!(outcome.log.len(), 64 + 3);
    }

    #[tokio::test]
    async fn test_missing_program_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let sb = sandbox("taskweave-no-such-program", &[], root.path());
        let err = sb.run("a", &["t".to_string()]).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let root = tempfile::tempdir().unwrap();
        let mut sb = sandbox("sh", &["-c", "sleep 5"], root.path());
        sb.timeout = Duration::from_millis(50);
        let err = sb.run("a", &["t".to_string()]).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Timeout(_)));
    }
}
