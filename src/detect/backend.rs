use anyhow::Result;

use crate::frame::Frame;
use crate::landmark::LandmarkSnapshot;

/// Pose estimator seam.
///
/// The estimator turns one camera frame into a `LandmarkSnapshot`, or `None`
/// when nobody is in view. Implementations run on the acquisition worker and
/// must not hold on to the frame past the call.
///
/// Returned snapshots should carry the frame's `captured_at` time; the
/// debounce timers are driven by it.
pub trait PoseEstimator: Send {
    /// Estimator identifier.
    fn name(&self) -> &'static str;

    /// Estimate the pose in a frame.
    fn estimate(&mut self, frame: &Frame) -> Result<Option<LandmarkSnapshot>>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn estimate(&mut self, frame: &Frame) -> Result<Option<LandmarkSnapshot>> {
        (**self).estimate(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
