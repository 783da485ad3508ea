//! FFmpeg command builder and runner.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::MediaError;

/// Input or output of an ffmpeg invocation: a file or a stdio pipe.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    File(PathBuf),
    Pipe,
}

impl Endpoint {
    fn as_arg(&self) -> String {
        match self {
            Endpoint::File(path) => path.to_string_lossy().to_string(),
            Endpoint::Pipe => "-".to_string(),
        }
    }
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    program: PathBuf,
    input: Endpoint,
    output: Endpoint,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(program: impl AsRef<Path>, input: Endpoint, output: Endpoint) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            input,
            output,
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Raw RGB24 frames on the input side, e.g. when encoding from a pipe.
    pub fn raw_rgb_input(self, width: u32, height: u32, fps: f64) -> Self {
        self.input_arg("-f")
            .input_arg("rawvideo")
            .input_arg("-pix_fmt")
            .input_arg("rgb24")
            .input_arg("-s")
            .input_arg(format!("{}x{}", width, height))
            .input_arg("-r")
            .input_arg(format_fps(fps))
    }

    /// Decode frames in stored orientation, ignoring display-matrix rotation.
    /// Keeps the decoded size equal to the size ffprobe reports.
    pub fn no_autorotate(self) -> Self {
        self.input_arg("-noautorotate")
    }

    /// Raw RGB24 frames on the output side, e.g. when decoding to a pipe.
    pub fn raw_rgb_output(self) -> Self {
        self.output_args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-loglevel".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.as_arg());

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.as_arg());

        args
    }

    /// Spawns the process with stdin/stdout piped when the matching side is
    /// a pipe. Stderr is always captured.
    pub fn spawn(&self) -> Result<Child, MediaError> {
        let args = self.build_args();
        debug!("Running: {} {}", self.program.display(), args.join(" "));

        let stdin = if self.input == Endpoint::Pipe {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let stdout = if self.output == Endpoint::Pipe {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        Command::new(&self.program)
            .args(&args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::Spawn {
                program: self.program.display().to_string(),
                source: e,
            })
    }

    /// Runs the command to completion.
    pub fn run(&self) -> Result<(), MediaError> {
        let mut child = self.spawn()?;
        let stderr = StderrCollector::start(child.stderr.take());
        let status = child.wait()?;
        check_status(&self.program, status, stderr.finish())
    }
}

/// Drains a child's stderr on a background thread so the child never
/// blocks on a full pipe.
pub(crate) struct StderrCollector {
    handle: Option<JoinHandle<String>>,
}

impl StderrCollector {
    pub(crate) fn start(stderr: Option<ChildStderr>) -> Self {
        let handle = stderr.map(|mut pipe| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });
        Self { handle }
    }

    pub(crate) fn finish(mut self) -> String {
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

pub(crate) fn check_status(
    program: &Path,
    status: std::process::ExitStatus,
    stderr: String,
) -> Result<(), MediaError> {
    if status.success() {
        Ok(())
    } else {
        Err(MediaError::ExitStatus {
            program: program.display().to_string(),
            code: status.code(),
            stderr,
        })
    }
}

fn format_fps(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as u64)
    } else {
        format!("{:.3}", fps)
    }
}
