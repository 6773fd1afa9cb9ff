//! Child process execution with streamed output.
//!
//! [`run_streaming`] spawns a prepared [`Command`], reads stdout and stderr
//! concurrently in raw chunks, forwards every chunk to the [`OutputSink`]
//! and to `tracing`, and enforces an optional timeout. Only a bounded tail
//! of the output is retained for error reporting.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use audioforma_core::progress::OutputStream;
use audioforma_core::types::JobId;

use crate::engine::OutputSink;
use crate::error::SeparatorError;

/// Read buffer size per stream.
const CHUNK_BYTES: usize = 8 * 1024;

/// Bytes of output kept for error messages, per stream.
const TAIL_BYTES: usize = 4 * 1024;

/// How long to wait for the output readers after the process exits.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a process that ran to completion (successfully or not).
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    /// Last lines of stderr, or of stdout when stderr was empty.
    pub tail: String,
}

/// Spawn `cmd` and stream its output into `sink` until it exits.
pub async fn run_streaming(
    cmd: &mut Command,
    job_id: &JobId,
    sink: OutputSink,
    timeout: Option<Duration>,
) -> Result<ProcessOutcome, SeparatorError> {
    // `kill_on_drop(true)` ensures the child is killed when dropped (e.g. on timeout).
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| SeparatorError::Spawn {
        program: program.clone(),
        source,
    })?;
    tracing::debug!(job_id = %job_id, program, pid = child.id(), "Engine process started");

    let stdout_task = tokio::spawn(pump(
        child.stdout.take(),
        sink.clone(),
        job_id.clone(),
        OutputStream::Stdout,
    ));
    let stderr_task = tokio::spawn(pump(
        child.stderr.take(),
        sink,
        job_id.clone(),
        OutputStream::Stderr,
    ));

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_elapsed) => {
                // Dropping `child` kills the process.
                stdout_task.abort();
                stderr_task.abort();
                return Err(SeparatorError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        },
        None => child.wait().await?,
    };

    let stdout_tail = drain(stdout_task).await;
    let stderr_tail = drain(stderr_task).await;
    let tail = if stderr_tail.trim().is_empty() {
        stdout_tail
    } else {
        stderr_tail
    };

    Ok(ProcessOutcome {
        success: status.success(),
        exit_code: status.code(),
        duration_ms: start.elapsed().as_millis() as u64,
        tail: tail.trim().to_string(),
    })
}

/// Wait for a reader task, giving up on pipes held open by grandchildren.
async fn drain(task: tokio::task::JoinHandle<String>) -> String {
    match tokio::time::timeout(READER_DRAIN_TIMEOUT, task).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            tracing::warn!("Engine output reader did not finish after process exit");
            String::new()
        }
    }
}

/// Forward one stream to the sink chunk by chunk. Returns the output tail.
async fn pump<R: AsyncRead + Unpin>(
    handle: Option<R>,
    sink: OutputSink,
    job_id: JobId,
    stream: OutputStream,
) -> String {
    let Some(mut reader) = handle else {
        return String::new();
    };
    let mut decoder = Utf8Decoder::default();
    let mut tail = OutputTail::new(TAIL_BYTES);
    let mut buf = vec![0u8; CHUNK_BYTES];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    stream = stream.as_str(),
                    error = %e,
                    "Engine output read failed"
                );
                break;
            }
        };
        let text = decoder.decode(&buf[..n]);
        if text.is_empty() {
            continue;
        }
        tracing::debug!(job_id = %job_id, stream = stream.as_str(), "{}", text.trim_end());
        tail.push(&text);
        // The receiver may be gone already; keep draining so the child never blocks.
        let _ = sink.send((stream, text));
    }
    let rest = decoder.finish();
    if !rest.is_empty() {
        tail.push(&rest);
        let _ = sink.send((stream, rest));
    }
    tail.into_string()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Incremental UTF-8 decoding that never splits a multi-byte character
/// across chunks. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);
        let keep = incomplete_suffix_len(&self.carry);
        let complete = self.carry.len() - keep;
        let text = String::from_utf8_lossy(&self.carry[..complete]).into_owned();
        self.carry.drain(..complete);
        text
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        text
    }
}

/// Length of a trailing, still incomplete UTF-8 sequence.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => 0,
        Err(e) if e.error_len().is_none() => bytes.len() - e.valid_up_to(),
        // An invalid byte in the middle: check only the last few bytes.
        Err(_) => {
            let start = bytes.len().saturating_sub(3);
            (start..bytes.len())
                .find(|&i| {
                    matches!(std::str::from_utf8(&bytes[i..]), Err(e) if e.error_len().is_none() && e.valid_up_to() == 0)
                })
                .map_or(0, |i| bytes.len() - i)
        }
    }
}

/// Keeps the last `limit` bytes of text, cut at a character boundary.
#[derive(Debug)]
struct OutputTail {
    buf: String,
    limit: usize,
}

impl OutputTail {
    fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
        }
    }

    fn push(&mut self, text: &str) {
        self.buf.push_str(text);
        if self.buf.len() > self.limit {
            let mut cut = self.buf.len() - self.limit;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    fn into_string(self) -> String {
        self.buf
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
