use std::{
    io::Read,
    path::Path,
    process::{Command, Stdio},
    thread,
};

use rbeconf_domain::{ConfigGenError, Result};

const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;
const TRUNCATION_MARKER: &str = "\n[...truncated...]\n";

fn max_capture_bytes() -> usize {
    std::env::var("RBECONF_MAX_CAPTURE_BYTES")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_CAPTURE_BYTES)
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Stdout followed by stderr.
    #[must_use]
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        text.push_str(&self.stderr);
        text
    }
}

/// Renders an invocation the way it is logged and reported in errors.
#[must_use]
pub fn display_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Execute a program and capture stdout/stderr.
///
/// The exact invocation is always logged; the captured output is logged as well
/// when the program exits unsuccessfully.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned or the I/O streams cannot
/// be read entirely. A non-zero exit is not an error here.
pub fn run_command(program: &str, args: &[String], cwd: Option<&Path>) -> Result<RunOutput> {
    let rendered = display_command(program, args);
    tracing::info!(command = %rendered, "running");

    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .map_err(ConfigGenError::io(format!("failed to start {program}")))?;
    let stdout = child.stdout.take().ok_or_else(|| missing_stream(program, "stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_stream(program, "stderr"))?;
    let limit = max_capture_bytes();
    let stdout_handle = thread::spawn(move || read_to_string_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_to_string_limited(stderr, limit));

    let status = child
        .wait()
        .map_err(ConfigGenError::io(format!("failed to wait for {program}")))?;
    let code = status.code().unwrap_or(-1);
    let stdout = join_reader(stdout_handle, program, "stdout")?;
    let stderr = join_reader(stderr_handle, program, "stderr")?;

    let output = RunOutput {
        code,
        stdout,
        stderr,
    };
    if !output.success() {
        tracing::warn!(
            command = %rendered,
            code,
            output = %output.combined().trim(),
            "command failed"
        );
    }
    Ok(output)
}

fn missing_stream(program: &str, stream: &str) -> ConfigGenError {
    ConfigGenError::Io {
        context: format!("{stream} missing for {program}"),
        source: std::io::Error::other("stream was not piped"),
    }
}

fn join_reader(
    handle: thread::JoinHandle<std::io::Result<(String, bool)>>,
    program: &str,
    stream: &str,
) -> Result<String> {
    let joined = handle.join().map_err(|_| ConfigGenError::Io {
        context: format!("{stream} reader for {program} panicked"),
        source: std::io::Error::other("reader thread panicked"),
    })?;
    let (mut text, truncated) =
        joined.map_err(ConfigGenError::io(format!("failed to read {stream} of {program}")))?;
    if truncated {
        text.push_str(TRUNCATION_MARKER);
    }
    Ok(text)
}

fn read_to_string_limited(mut reader: impl Read, limit: usize) -> std::io::Result<(String, bool)> {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        append_limited(&mut buffer, &chunk[..read], limit, &mut truncated);
    }
    Ok((String::from_utf8_lossy(&buffer).to_string(), truncated))
}

/// Keeps the most recent `limit` bytes; build failures put the useful part at
/// the end.
fn append_limited(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize, truncated: &mut bool) {
    if limit == 0 {
        return;
    }
    if buffer.len().saturating_add(chunk.len()) <= limit {
        buffer.extend_from_slice(chunk);
        return;
    }
    *truncated = true;
    let old_len = buffer.len();
    let excess = old_len.saturating_add(chunk.len()).saturating_sub(limit);
    if excess >= old_len {
        buffer.clear();
        let drop_from_chunk = excess.saturating_sub(old_len).min(chunk.len());
        buffer.extend_from_slice(&chunk[drop_from_chunk..]);
    } else {
        buffer.drain(0..excess);
        buffer.extend_from_slice(chunk);
    }
}
