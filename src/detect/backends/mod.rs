mod jsonl;
mod scripted;

pub use jsonl::JsonLinesEstimator;
pub use scripted::{ScriptStep, ScriptedEstimator};
