pub mod client;
pub mod job;
pub mod prompt;

pub use client::GenerationJobClient;
pub use job::OutfitItem;
