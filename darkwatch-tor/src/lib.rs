//! DarkWatch Tor Layer
//!
//! Provides routed page retrieval for the scan pipeline:
//! - SOCKS5h proxy routing for hidden services, direct route otherwise
//! - The `Fetcher` capability boundary
//! - Headless browser fetcher (rendered DOM + screenshot)
//! - Plain HTTP fetcher

pub mod proxy;
pub mod fetcher;
pub mod browser;
pub mod http;

pub use proxy::*;
pub use fetcher::*;
pub use browser::*;
pub use http::*;
