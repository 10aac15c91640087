use anyhow::{bail, Result};

use crate::clock::Timestamp;
use crate::frame::{Frame, CHANNELS};
use crate::ingest::{FrameSource, SourceConfig, SourceStats};

/// Synthetic frame source for `stub://` URLs.
///
/// Produces a shifting gradient so consecutive frames differ.
pub struct SyntheticSource {
    config: SourceConfig,
    connected: bool,
    frame_count: u64,
    connects: u64,
    /// Simulated scene state, bumped every 50 frames.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            bail!(
                "synthetic source needs a non-empty frame, got {}x{}",
                config.width,
                config.height
            );
        }
        Ok(Self {
            config,
            connected: false,
            frame_count: 0,
            connects: 0,
            scene_state: 0,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize * CHANNELS;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let shift = self.frame_count + u64::from(self.scene_state);
        (0..pixel_count)
            .map(|i| ((i as u64 + shift) % 256) as u8)
            .collect()
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.connects += 1;
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self, now: Timestamp) -> Result<Option<Frame>> {
        if !self.connected {
            bail!("source {} is not connected", self.config.url);
        }
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        let pixels = self.generate_pixels();
        let seq = self.frame_count;
        self.frame_count += 1;
        Frame::new(pixels, self.config.width, self.config.height, seq, now).map(Some)
    }

    fn close(&mut self) {
        if self.connected {
            log::info!(
                "SyntheticSource: closed {} after {} frames",
                self.config.url,
                self.frame_count
            );
        }
        self.connected = false;
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            connects: self.connects,
            url: self.config.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> SourceConfig {
        SourceConfig {
            url: "stub://test".to_string(),
            width: 64,
            height: 48,
            frame_limit: None,
        }
    }

    #[test]
    fn produces_sequenced_frames() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config())?;
        source.connect()?;

        let first = source.next_frame(Timestamp::from_millis(0))?;
        let second = source.next_frame(Timestamp::from_millis(40))?;
        let (first, second) = match (first, second) {
            (Some(a), Some(b)) => (a, b),
            _ => panic!("expected two frames"),
        };
        assert_eq!((first.width, first.height), (64, 48));
        assert_eq!((first.seq, second.seq), (0, 1));
        assert_eq!(second.captured_at, Timestamp::from_millis(40));
        assert_ne!(first.pixels(), second.pixels());
        Ok(())
    }

    #[test]
    fn refuses_frames_while_closed_and_resumes() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config())?;
        assert!(source.next_frame(Timestamp::ZERO).is_err());

        source.connect()?;
        source.next_frame(Timestamp::ZERO)?;
        source.close();
        assert!(!source.is_healthy());
        assert!(source.next_frame(Timestamp::ZERO).is_err());

        source.connect()?;
        let frame = source.next_frame(Timestamp::from_millis(10))?;
        assert_eq!(frame.map(|f| f.seq), Some(1));
        assert_eq!(source.stats().connects, 2);
        Ok(())
    }

    #[test]
    fn frame_limit_ends_stream() -> Result<()> {
        let mut source = SyntheticSource::new(SourceConfig {
            frame_limit: Some(2),
            ..stub_config()
        })?;
        source.connect()?;
        assert!(source.next_frame(Timestamp::ZERO)?.is_some());
        assert!(source.next_frame(Timestamp::ZERO)?.is_some());
        assert!(source.next_frame(Timestamp::ZERO)?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }
}
