//! Frame sources.
//!
//! Camera capture itself lives outside this crate; a capture backend plugs in
//! by implementing `FrameSource`. The built-in `stub://` source produces
//! synthetic RGB frames for demos and tests.
//!
//! Sources are opened once, connected on `start()` and closed on `stop()`.
//! A closed source may be connected again.

mod synthetic;

pub use synthetic::SyntheticSource;

use anyhow::{bail, Result};

use crate::clock::Timestamp;
use crate::frame::Frame;

/// Configuration for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    /// Source URL (e.g. "stub://demo").
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Stop producing frames after this many (`None` = unbounded).
    pub frame_limit: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://default".to_string(),
            width: 640,
            height: 480,
            frame_limit: None,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub connects: u64,
    pub url: String,
}

pub trait FrameSource: Send {
    /// Acquire the capture resource. Called again after `close()` to resume.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame stamped with `now`.
    ///
    /// `Ok(None)` means no frame was available this cycle.
    fn next_frame(&mut self, now: Timestamp) -> Result<Option<Frame>>;

    /// Release the capture resource.
    fn close(&mut self);

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self, now: Timestamp) -> Result<Option<Frame>> {
        (**self).next_frame(now)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Opens the source named by `config.url`.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config)?));
    }
    bail!(
        "unsupported frame source '{}': only stub:// is built in, camera capture plugs in through FrameSource",
        config.url
    )
}
