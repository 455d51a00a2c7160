//! External tool command building and cancellable execution.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Number of stderr lines kept for error reporting.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    /// Add an input argument (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an output argument (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn video_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:v").output_arg(bitrate)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    pub fn frame_rate(self, fps: u32) -> Self {
        self.output_arg("-r").output_arg(fps.to_string())
    }

    pub fn scale(self, width: u32, height: u32) -> Self {
        self.output_arg("-vf")
            .output_arg(format!("scale={}:{}", width, height))
    }

    /// Drop the video stream.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Start of the kept range (output seek).
    pub fn start(self, seconds: f64) -> Self {
        self.output_arg("-ss").output_arg(format!("{:.3}", seconds))
    }

    /// End of the kept range.
    pub fn end(self, seconds: f64) -> Self {
        self.output_arg("-to").output_arg(format!("{:.3}", seconds))
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    ///
    /// Progress is written as key=value pairs to stdout.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
            "-nostats".to_string(),
            "-progress".to_string(),
            "pipe:1".to_string(),
        ];

        args.extend(self.input_args.iter().cloned());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Exit information of a finished tool.
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Last lines written to stderr
    pub stderr_tail: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last non-empty stderr line, for error messages.
    pub fn last_error_line(&self) -> Option<&str> {
        self.stderr_tail
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
    }
}

/// Runs an external tool as a cancellable subprocess.
///
/// The child is spawned with `kill_on_drop`, so dropping the future returned
/// by [`ToolRunner::run`] also terminates the process.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    program: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl ToolRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cancel_rx: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Run the tool, feeding every stdout line to `on_line`.
    pub async fn run<F>(&self, args: &[String], mut on_line: F) -> MediaResult<ToolOutput>
    where
        F: FnMut(&str),
    {
        debug!("Running {} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    MediaError::tool_not_found(self.program.display().to_string())
                }
                _ => MediaError::Io(e),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("stderr not captured"))?;

        let stderr_handle = tokio::spawn(collect_tail(stderr));
        let mut lines = BufReader::new(stdout).lines();
        let mut cancel_rx = self.cancel_rx.clone();

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => on_line(&line),
                    None => break,
                },
                _ = wait_cancelled(&mut cancel_rx) => {
                    info!("{} cancelled, killing process", self.program.display());
                    let _ = child.kill().await;
                    return Err(MediaError::Cancelled);
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = wait_cancelled(&mut cancel_rx) => {
                info!("{} cancelled, killing process", self.program.display());
                let _ = child.kill().await;
                return Err(MediaError::Cancelled);
            }
        };

        let stderr_tail = stderr_handle.await.unwrap_or_default();

        Ok(ToolOutput {
            status,
            stderr_tail,
        })
    }
}

/// Resolves once the signal is set. Never resolves without a signal.
async fn wait_cancelled(rx: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };

    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

async fn collect_tail<R>(reader: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut tail: Vec<String> = Vec::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.remove(0);
        }
        tail.push(line);
    }

    tail.join("\n")
}

/// Resolve a tool by name or path.
pub fn check_tool(program: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let program = program.as_ref();
    which::which(program).map_err(|_| MediaError::tool_not_found(program.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp3")
            .no_video()
            .audio_codec("mp3")
            .start(10.0)
            .end(30.5);

        let args = cmd.build_args();
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert!(args.windows(2).any(|w| w == ["-progress", "pipe:1"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "mp3"]));
        assert!(args.windows(2).any(|w| w == ["-ss", "10.000"]));
        assert!(args.windows(2).any(|w| w == ["-to", "30.500"]));
        assert_eq!(args.last().map(String::as_str), Some("output.mp3"));

        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let ss_pos = args.iter().position(|a| a == "-ss").unwrap();
        assert!(ss_pos > input_pos);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_collects_stdout_and_status() {
        let runner = ToolRunner::new("sh");
        let mut seen = Vec::new();
        let output = runner
            .run(
                &["-c".to_string(), "echo one; echo two; echo oops >&2; exit 3".to_string()],
                |line| seen.push(line.to_string()),
            )
            .await
            .unwrap();

        assert_eq!(seen, vec!["one", "two"]);
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(output.last_error_line(), Some("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_cancel_kills_process() {
        let (tx, rx) = watch::channel(false);
        let runner = ToolRunner::new("sh").with_cancel(rx);

        let handle = tokio::spawn(async move {
            runner
                .run(&["-c".to_string(), "sleep 30".to_string()], |_| {})
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("runner did not stop")
            .unwrap();
        assert!(matches!(result, Err(MediaError::Cancelled)));
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let runner = ToolRunner::new("definitely-not-a-real-tool-mediadl");
        let result = runner.run(&[], |_| {}).await;
        assert!(matches!(result, Err(MediaError::ToolNotFound(_))));
    }
}
