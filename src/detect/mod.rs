mod backend;
mod backends;
mod stance;

pub use backend::PoseEstimator;
pub use backends::{JsonLinesEstimator, ScriptStep, ScriptedEstimator};
pub use stance::Stance;
