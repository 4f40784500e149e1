use std::sync::Arc;

pub mod cache;
pub mod decode;
pub mod fetch;

pub use cache::ImageCache;
pub use decode::decode_image;
pub use fetch::{DefaultFetcher, FetchPolicy, ImageFetcher};

/// A decoded image ready for `drawImage`.
#[derive(Clone, Debug)]
pub struct CachedImage {
    pub width: u32,
    pub height: u32,
    /// Premultiplied RGBA8, row-major, tightly packed.
    pub rgba8_premul: Arc<Vec<u8>>,
}
