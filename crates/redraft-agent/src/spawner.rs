use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::{CommandOutput, GenerationError, GeneratorConfig};

/// Utility for spawning generator processes
pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Spawn a process and capture its output.
    ///
    /// The child is killed if the returned future is dropped, so a caller-side
    /// timeout never leaves an orphaned process behind.
    pub async fn spawn(
        binary: &Path,
        args: &[&str],
        config: &GeneratorConfig,
    ) -> Result<CommandOutput, GenerationError> {
        let start = Instant::now();

        debug!(
            binary = %binary.display(),
            arg_count = args.len(),
            working_dir = %config.working_dir.display(),
            "Spawning generator process"
        );

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let mut stdout_handle = child
            .stdout
            .take()
            .ok_or_else(|| GenerationError::Execution("stdout not captured".into()))?;
        let mut stderr_handle = child
            .stderr
            .take()
            .ok_or_else(|| GenerationError::Execution("stderr not captured".into()))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        // Drain both pipes together so neither can fill up and stall the child
        let (stdout_read, stderr_read) = tokio::join!(
            stdout_handle.read_to_string(&mut stdout),
            stderr_handle.read_to_string(&mut stderr),
        );
        stdout_read
            .map_err(|e| GenerationError::Execution(format!("Failed to read stdout: {}", e)))?;
        stderr_read
            .map_err(|e| GenerationError::Execution(format!("Failed to read stderr: {}", e)))?;

        let status = child.wait().await?;
        let duration = start.elapsed();

        debug!(
            exit_code = status.code().unwrap_or(-1),
            duration_ms = duration.as_millis(),
            "Generator process completed"
        );

        Ok(CommandOutput::new(stdout, stderr, status.code().unwrap_or(-1)))
    }
}
