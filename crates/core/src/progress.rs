//! Progress parser for the separation engine's free-form output.
//!
//! The engine prints a stage marker line each time one model of the bag
//! starts and tqdm-style bars (`53%|█████ | 17.5/33.0 [...]`) inside a stage.
//! [`ProgressParser`] turns that stream into [`ProgressDelta`]s expressed as
//! fractions of the job's overall progress.
//!
//! The within-stage fraction deliberately divides by a fixed
//! `assumed_stage_secs` instead of the bar's own total: the total printed by
//! the engine depends on the input length and does not track wall-clock work.

use std::sync::LazyLock;

use regex::Regex;

use crate::job::{PROGRESS_PROCESSING_BASE, PROGRESS_PROCESSING_SCALE};

/// Matches `elapsed/total` pairs such as `17.5/30.0`.
static ELAPSED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\.\d+)/\d+\.\d+").expect("elapsed pattern is a valid regex")
});

/// Upper bound on an unterminated line kept in the buffer.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Tunables for one parser instance.
#[derive(Debug, Clone)]
pub struct ProgressSettings {
    /// Number of sequential stages (models) the engine runs.
    pub total_stages: u32,
    /// Expected processing time of one stage, in the engine's bar units.
    pub assumed_stage_secs: f64,
    /// Overall progress at the start of processing.
    pub base: f64,
    /// Share of overall progress reserved for processing.
    pub scale: f64,
    /// Substring identifying a stage marker line.
    pub stage_marker: String,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            total_stages: 4,
            assumed_stage_secs: 33.0,
            base: PROGRESS_PROCESSING_BASE,
            scale: PROGRESS_PROCESSING_SCALE,
            stage_marker: "Separating track".to_string(),
        }
    }
}

/// Engine output stream a chunk was read from.
///
/// Bars and stage markers arrive on different streams, each with its own
/// unterminated tail, so the parser buffers them separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Stdout => 0,
            Self::Stderr => 1,
        }
    }
}

/// One parsed progress signal. Ephemeral, never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressDelta {
    /// Number of stage markers seen so far.
    pub stage: u32,
    /// Fraction of the active stage, from the elapsed counter.
    pub within_stage: f64,
    /// Overall job progress in `[base, base + scale]`.
    pub overall: f64,
}

/// Stateful per-job parser. One stage counter, one line buffer per stream.
#[derive(Debug)]
pub struct ProgressParser {
    settings: ProgressSettings,
    completed_stages: u32,
    pending: [String; 2],
}

impl ProgressParser {
    pub fn new(settings: ProgressSettings) -> Self {
        Self {
            settings,
            completed_stages: 0,
            pending: [String::new(), String::new()],
        }
    }

    pub fn completed_stages(&self) -> u32 {
        self.completed_stages
    }

    /// Interpret one complete line.
    pub fn consume(&mut self, line: &str) -> Option<ProgressDelta> {
        if line.contains('%') {
            if let Some(elapsed) = parse_elapsed(line) {
                return Some(self.delta_for(elapsed));
            }
        }
        if line.contains(self.settings.stage_marker.as_str()) {
            self.completed_stages += 1;
            tracing::trace!(stage = self.completed_stages, "Stage marker");
        }
        None
    }

    /// Feed a raw chunk of `stream` output that may contain partial lines.
    ///
    /// Both `\n` and `\r` terminate a line; the unterminated tail is kept
    /// per stream until the next chunk or [`finish`](Self::finish).
    pub fn push(&mut self, stream: OutputStream, chunk: &str) -> Vec<ProgressDelta> {
        let idx = stream.index();
        self.pending[idx].push_str(chunk);

        let mut deltas = Vec::new();
        while let Some(pos) = self.pending[idx].find(['\n', '\r']) {
            let line: String = self.pending[idx].drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(delta) = self.consume(line) {
                deltas.push(delta);
            }
        }

        if self.pending[idx].len() > MAX_PENDING_BYTES {
            tracing::debug!(
                stream = stream.as_str(),
                bytes = self.pending[idx].len(),
                "Discarding oversized unterminated engine output"
            );
            self.pending[idx].clear();
        }
        deltas
    }

    /// Flush whatever unterminated text is left, stdout first.
    pub fn finish(&mut self) -> Vec<ProgressDelta> {
        let mut deltas = Vec::new();
        for idx in 0..self.pending.len() {
            let line = std::mem::take(&mut self.pending[idx]);
            if line.is_empty() {
                continue;
            }
            if let Some(delta) = self.consume(&line) {
                deltas.push(delta);
            }
        }
        deltas
    }

    fn delta_for(&self, elapsed: f64) -> ProgressDelta {
        let s = &self.settings;
        let stages = f64::from(s.total_stages.max(1));
        let within_stage = if s.assumed_stage_secs > 0.0 {
            elapsed / s.assumed_stage_secs
        } else {
            0.0
        };
        let processing_percent =
            (f64::from(self.completed_stages) * 100.0 + within_stage * 100.0) / stages;
        let overall = (s.base + processing_percent / 100.0 * s.scale).clamp(s.base, s.base + s.scale);

        ProgressDelta {
            stage: self.completed_stages,
            within_stage,
            overall,
        }
    }
}

fn parse_elapsed(line: &str) -> Option<f64> {
    let captures = ELAPSED_PATTERN.captures(line)?;
    captures.get(1)?.as_str().parse().ok()
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new(ProgressSettings::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
