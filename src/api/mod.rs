pub mod client;
pub mod decode;
pub mod link;

pub use client::{CanvasClient, FetchError, PageSource, RawPage};
pub use decode::{decode_page, DecodeError};
pub use link::next_link;
