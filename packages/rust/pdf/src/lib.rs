//! Page-document assembly for PacketMaker.
//!
//! - [`merge`] concatenates section documents with duplex-safe padding
//! - [`stamp_footer`] overlays the running page label
//! - [`page_count`] and [`save_atomic`] are shared helpers

pub mod document;
pub mod footer;
pub mod merge;
pub mod metrics;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use document::{page_count, save_atomic};
pub use footer::{FooterStyle, render_footer, stamp_footer};
pub use merge::{PacketWriter, merge};
