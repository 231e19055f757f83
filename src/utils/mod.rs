//! Utility modules shared by the scraper and the vector store clients.
//!
//! - [`HttpClient`]: reqwest client with a user agent and timeouts applied

mod http;

pub use http::{HttpClient, DEFAULT_USER_AGENT};
