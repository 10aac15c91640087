use anyhow::{Context, Result};
use std::io::BufRead;

use crate::detect::backend::PoseEstimator;
use crate::frame::Frame;
use crate::landmark::LandmarkSnapshot;

/// Estimator fed by an external model process writing one JSON snapshot per line.
///
/// Each call consumes one line. Blank lines and `null` mean "no pose". Lines
/// are re-stamped with the frame's capture time. End of input is reported as
/// no pose.
pub struct JsonLinesEstimator<R> {
    reader: R,
    line: String,
    lines_read: u64,
    exhausted: bool,
}

impl<R: BufRead + Send> JsonLinesEstimator<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            lines_read: 0,
            exhausted: false,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl<R: BufRead + Send> PoseEstimator for JsonLinesEstimator<R> {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn estimate(&mut self, frame: &Frame) -> Result<Option<LandmarkSnapshot>> {
        if self.exhausted {
            return Ok(None);
        }
        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .context("failed to read landmark line")?;
        if read == 0 {
            log::info!("landmark input ended after {} lines", self.lines_read);
            self.exhausted = true;
            return Ok(None);
        }
        self.lines_read += 1;
        let trimmed = self.line.trim();
        if trimmed.is_empty() || trimmed == "null" {
            return Ok(None);
        }
        let snapshot: LandmarkSnapshot = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid landmark line {}", self.lines_read))?;
        Ok(Some(snapshot.restamped(frame.captured_at)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::landmark::Joint;
    use std::io::Cursor;

    fn frame_at(ms: u64) -> Frame {
        Frame::new(vec![0u8; 3], 1, 1, ms, Timestamp::from_millis(ms)).unwrap()
    }

    #[test]
    fn reads_one_snapshot_per_frame() {
        let input = concat!(
            r#"{"timestamp_ms": 5, "landmarks": {"nose": {"x": 0.5, "y": 0.2, "visibility": 0.9}}}"#,
            "\n",
            "null\n",
            "{not json}\n",
        );
        let mut estimator = JsonLinesEstimator::new(Cursor::new(input));

        let first = estimator.estimate(&frame_at(100)).unwrap().unwrap();
        assert_eq!(first.captured_at(), Timestamp::from_millis(100));
        assert!((first.get(Joint::Nose).x - 0.5).abs() < 1e-6);

        assert!(estimator.estimate(&frame_at(150)).unwrap().is_none());
        assert!(estimator.estimate(&frame_at(200)).is_err());
        assert!(estimator.estimate(&frame_at(250)).unwrap().is_none());
        assert!(estimator.is_exhausted());
        assert_eq!(estimator.lines_read(), 3);
    }
}
