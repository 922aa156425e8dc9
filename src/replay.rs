//! JSONL landmark replay: drive the pipeline without a camera or detector.
//!
//! Each line is one frame:
//!
//! ```json
//! {"t_ms": 1234, "landmarks": [{"x": 0.1, "y": 0.2}, ...], "confidence": 0.95}
//! {"t_ms": 1267, "landmarks": null}
//! ```
//!
//! A `null` (or absent) landmark list is a frame where no hand was found.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;
use opencv::core::Mat;
use serde::Deserialize;

use crate::landmarks::{HandDetection, HandProvider, Landmark};
use crate::Result;

#[derive(Debug, Deserialize)]
struct ReplayRecord {
    t_ms: u64,
    #[serde(default)]
    landmarks: Option<Vec<Landmark>>,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

/// One replayed frame: timestamp plus optional detection
#[derive(Debug, Clone)]
pub struct ReplayFrame {
    pub t_ms: u64,
    pub detection: Option<HandDetection>,
}

/// Recorded landmark session
pub struct ReplaySource {
    frames: Vec<ReplayFrame>,
    cursor: usize,
}

impl ReplaySource {
    /// Load a session from a JSONL file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut frames = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(&line)?;
            frames.push(ReplayFrame {
                t_ms: record.t_ms,
                detection: record.landmarks.map(|landmarks| HandDetection {
                    landmarks,
                    confidence: record.confidence,
                }),
            });
        }
        info!(
            "Loaded replay {} with {} frames",
            path.as_ref().display(),
            frames.len()
        );
        Ok(Self { frames, cursor: 0 })
    }

    /// Build a session directly from frames (tests)
    #[must_use]
    pub fn from_frames(frames: Vec<ReplayFrame>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Next frame in the session, or None when exhausted
    pub fn next_frame(&mut self) -> Option<&ReplayFrame> {
        let frame = self.frames.get(self.cursor)?;
        self.cursor += 1;
        Some(frame)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Rewind to the first frame
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl HandProvider for ReplaySource {
    fn detect(&mut self, _frame: &Mat, _t_ms: u64) -> Result<Option<HandDetection>> {
        Ok(self.next_frame().and_then(|f| f.detection.clone()))
    }
}
