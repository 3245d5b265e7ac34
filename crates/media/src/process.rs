//! Running helper programs (speech, OCR) and collecting their output.

use std::process::Stdio;

use mathtutor_core::error::MediaError;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Split a configured command line into program and arguments.
pub(crate) fn split_command(command: &[String]) -> Option<(&str, &[String])> {
    command.split_first().map(|(program, args)| (program.as_str(), args))
}

/// Run `program args...`, feeding `input` on stdin, and return stdout.
pub(crate) async fn run_capture(
    program: &str,
    args: &[String],
    input: Option<&[u8]>,
) -> Result<String, MediaError> {
    debug!(program, ?args, "Running helper program");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| MediaError::Launch {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

    if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin.write_all(bytes).await?;
        // closing stdin signals end of input
        drop(stdin);
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(program, code, stderr = %stderr, "Helper program failed");
        return Err(MediaError::CommandFailed {
            program: program.to_string(),
            code,
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let out = run_capture("echo", &["hello".into()], None).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn feeds_stdin() {
        let out = run_capture("cat", &[], Some(b"x^2 + 1")).await.unwrap();
        assert_eq!(out, "x^2 + 1");
    }

    #[tokio::test]
    async fn nonzero_exit_is_command_failed() {
        let err = run_capture("false", &[], None).await.unwrap_err();
        assert!(matches!(err, MediaError::CommandFailed { code: 1, .. }));
    }

    #[tokio::test]
    async fn missing_program_is_launch_error() {
        let err = run_capture("mathtutor-no-such-program", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Launch { .. }));
    }

    #[test]
    fn command_splitting() {
        let command = vec!["espeak-ng".to_string(), "-s".into(), "150".into()];
        let (program, args) = split_command(&command).unwrap();
        assert_eq!(program, "espeak-ng");
        assert_eq!(args, ["-s", "150"]);
        assert!(split_command(&[]).is_none());
    }
}
