//! Derived image assets for packet documents.
//!
//! Pure functions with a fixed contract, used by the enrichment step:
//! - [`normalize_logo`] trims the border around an organization logo
//! - [`make_qr_code`] renders a link as a printable QR code
//! - [`FaviconFetcher`] fetches a site icon as a best-effort link thumbnail

pub mod favicon;
pub mod logo;
pub mod qr;

pub use favicon::FaviconFetcher;
pub use logo::normalize_logo;
pub use qr::make_qr_code;
