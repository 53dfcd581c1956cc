pub mod codec;
pub mod download;
pub mod host;

pub use host::{HostedImage, ImageHost};
