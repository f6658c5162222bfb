//! Deployment provisioning through an external command.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use taskweave_core::api::{
    CapabilityError, ProvisioningCapability, ProvisioningConfig, ResourceHandle,
};

lazy_static! {
    /// `resource_id: abc-123` / `RESOURCE_ID=abc-123`
    static ref RESOURCE_ID: Regex = Regex::new(r"(?im)^\s*resource[_ -]?id\s*[:=]\s*(\S+)\s*$")
        .expect("RESOURCE_ID is valid");
}

/// Pipes the deployment spec to a command on stdin and reads the resource
/// handle from its stdout.
pub struct CommandProvisioner {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandProvisioner {
    pub fn new(command: impl Into<String>, cfg: &ProvisioningConfig) -> Self {
        Self {
            command: command.into(),
            args: cfg.args.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }

    fn parse_handle(stdout: &str) -> ResourceHandle {
        let id = RESOURCE_ID
            .captures(stdout)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .or_else(|| {
                stdout
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("resource-{}", uuid::Uuid::new_v4()));
        let details = stdout.trim();
        ResourceHandle {
            id,
            details: (!details.is_empty()).then(|| details.to_string()),
        }
    }

    async fn execute(&self, spec: &str) -> Result<std::process::Output, CapabilityError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CapabilityError::Rejected(format!("failed to start '{}': {e}", self.command))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(spec.as_bytes())
                .await
                .map_err(|e| CapabilityError::Transient(format!("writing spec failed: {e}")))?;
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| CapabilityError::Transient(format!("provisioning process failed: {e}")))
    }
}

#[async_trait]
impl ProvisioningCapability for CommandProvisioner {
    fn name(&self) -> &str {
        "command"
    }

    async fn provision(&self, spec: &str) -> Result<ResourceHandle, CapabilityError> {
        tracing::info!(target: "taskweave.provision", command = %self.command, spec_len = spec.len(), "provisioning");
        let output = tokio::time::timeout(self.timeout, self.execute(spec))
            .await
            .map_err(|_| CapabilityError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CapabilityError::Rejected(format!(
                "provisioning exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let handle = Self::parse_handle(&String::from_utf8_lossy(&output.stdout));
        tracing::info!(target: "taskweave.provision", resource = %handle.id, "provisioned");
        Ok(handle)
    }
}

/// Used when no provisioning command is configured: deployment tasks still
/// complete, with a handle that says nothing was created.
pub struct DryRunProvisioner;

#[async_trait]
impl ProvisioningCapability for DryRunProvisioner {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn provision(&self, spec: &str) -> Result<ResourceHandle, CapabilityError> {
        tracing::info!(target: "taskweave.provision", spec_len = spec.len(), "dry-run provisioning");
        Ok(ResourceHandle {
            id: format!("dry-run-{}", uuid::Uuid::new_v4()),
            details: Some("no provisioning command configured; nothing was created".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handle_prefers_resource_id_line() {
        let handle = CommandProvisioner::parse_handle("creating...\nRESOURCE_ID=db-42\ndone\n");
        assert_eq!(handle.id, "db-42");
        assert!(handle.details.unwrap().contains("creating"));

        let handle = CommandProvisioner::parse_handle("\n  bucket-7  \n");
        assert_eq!(handle.id, "bucket-7");

        let handle = CommandProvisioner::parse_handle("");
        assert!(handle.id.starts_with("resource-"));
        assert!(handle.details.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_receives_spec_on_stdin() {
        let cfg = ProvisioningConfig {
            command: Some("sh".into()),
            args: vec!["-c".into(), "read spec; echo \"resource_id: $spec\"".into()],
            timeout_ms: 5_000,
        };
        let provisioner = CommandProvisioner::new("sh", &cfg);
        let handle = provisioner.provision("queue-1\n").await.unwrap();
        assert_eq!(handle.id, "queue-1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_rejected() {
        let cfg = ProvisioningConfig {
            command: Some("sh".into()),
            args: vec!["-c".into(), "echo quota exceeded >&2; exit 1".into()],
            timeout_ms: 5_000,
        };
        let err = CommandProvisioner::new("sh", &cfg)
            .provision("spec")
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Rejected(msg) if msg.contains("quota exceeded")));
    }
}
