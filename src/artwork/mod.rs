//! Content-addressed storage for embedded cover art.

mod store;

pub use store::{content_checksum, sniff_image_mime, ArtworkError, ArtworkStore};
