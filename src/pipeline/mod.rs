pub mod orchestrator;
pub mod postprocess;

pub use orchestrator::OutfitImagePipeline;
