use crate::error::{BackupError, Result};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A fully described vendor tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Exit code 0 and nothing written to stderr.
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && self.stderr.trim().is_empty()
    }
}

/// Runs the tool to completion, capturing both streams before the exit status
/// is inspected. The child is killed if `cancel` fires first.
pub async fn run_tool(invocation: &ToolInvocation, cancel: &CancellationToken) -> Result<ToolOutput> {
    debug!("Running {} with {} argument(s)", invocation.program, invocation.args.len());

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| {
        BackupError::ExternalTool(format!("Failed to start {}: {}", invocation.program, e))
    })?;

    let output = tokio::select! {
        output = child.wait_with_output() => output?,
        _ = cancel.cancelled() => return Err(BackupError::Cancelled),
    };

    Ok(ToolOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> ToolInvocation {
        ToolInvocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            envs: vec![],
        }
    }

    #[tokio::test]
    async fn test_clean_exit_succeeds() {
        let output = run_tool(&shell("echo done"), &CancellationToken::new()).await.unwrap();
        assert!(output.succeeded());
        assert_eq!(output.stdout.trim(), "done");
    }

    #[tokio::test]
    async fn test_stderr_fails_even_with_zero_exit() {
        let output = run_tool(&shell("echo 'Msg 3201' >&2; exit 0"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert!(!output.succeeded());
        assert!(output.stderr.contains("Msg 3201"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let output = run_tool(&shell("exit 3"), &CancellationToken::new()).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.succeeded());
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let mut invocation = shell("printf %s \"$PGPASSWORD\"");
        invocation.envs.push(("PGPASSWORD".to_string(), "s3cret".to_string()));
        let output = run_tool(&invocation, &CancellationToken::new()).await.unwrap();
        assert_eq!(output.stdout, "s3cret");
    }

    #[tokio::test]
    async fn test_missing_program_is_external_tool_error() {
        let invocation = ToolInvocation {
            program: "definitely-not-a-real-backup-tool".to_string(),
            args: vec![],
            envs: vec![],
        };
        let err = run_tool(&invocation, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BackupError::ExternalTool(_)));
    }

    #[tokio::test]
    async fn test_cancel_kills_child() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_tool(&shell("sleep 30"), &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
