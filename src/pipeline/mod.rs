//! Text-transformation pipeline.

pub mod replace;

pub use replace::ReplacementPipeline;
