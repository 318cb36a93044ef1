//! External program runner.

use std::ffi::OsStr;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{CollectError, Result};

/// Run `program` with `args`, optionally feeding `stdin`, and return its
/// standard output.
///
/// # Errors
///
/// Returns `CollectError::ProgramNotFound` if the program cannot be found,
/// `CollectError::CommandExecution` if it cannot be run, and
/// `CollectError::CommandFailed` if it exits unsuccessfully.
pub async fn run_command<A>(program: &str, args: &[A], stdin: Option<&[u8]>) -> Result<String>
where
    A: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(
        program,
        args = %args
            .iter()
            .map(|a| a.as_ref().to_string_lossy())
            .collect::<Vec<_>>()
            .join(" "),
        "Running command"
    );

    let execution = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CollectError::ProgramNotFound {
                program: program.to_string(),
            }
        } else {
            CollectError::CommandExecution {
                program: program.to_string(),
                source: e,
            }
        }
    };

    let mut child = command.spawn().map_err(execution)?;
    let pipe = child.stdin.take();

    // Input is written while output is drained so neither side can stall on
    // a full pipe.
    let feed = async move {
        let (Some(input), Some(mut pipe)) = (stdin, pipe) else {
            return Ok(());
        };
        pipe.write_all(input).await?;
        // Closing the pipe lets the program see end of input.
        pipe.shutdown().await
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output.map_err(execution)?;

    // A program may exit without reading all of its input; its exit status
    // decides the outcome then.
    match fed {
        Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(execution(e)),
        _ => {}
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(CollectError::CommandFailed {
            program: program.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let out = run_command("echo", &["hello", "world"], None).await.unwrap();
        assert_eq!(out, "hello world\n");
    }

    #[tokio::test]
    async fn test_feeds_stdin() {
        let out = run_command::<&str>("cat", &[], Some(b"statement body"))
            .await
            .unwrap();
        assert_eq!(out, "statement body");
    }

    #[tokio::test]
    async fn test_large_input_and_output_do_not_stall() {
        let input = "statement line\n".repeat(64 * 1024);
        let out = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            run_command::<&str>("cat", &[], Some(input.as_bytes())),
        )
        .await
        .expect("command stalled")
        .unwrap();
        assert_eq!(out.len(), input.len());
    }

    #[tokio::test]
    async fn test_unread_input_is_not_an_error() {
        let input = vec![b'x'; 1024 * 1024];
        let out = run_command("sh", &["-c", "echo done"], Some(&input)).await.unwrap();
        assert_eq!(out, "done\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let err = run_command("sh", &["-c", "echo oops >&2; exit 3"], None)
            .await
            .unwrap_err();
        match err {
            CollectError::CommandFailed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_command::<&str>("rcm-no-such-program", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::ProgramNotFound { .. }));
    }
}
