//! # Data Retrieval Module
//!
//! A centralized location for HTTP-based retrieval used by the feed monitors.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A generic HTTP `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`. It offers optional transient retries with
//!   exponential backoff, a bounded request timeout, and default headers. Its
//!   error type keeps transport faults, non-2xx statuses and JSON decode
//!   failures apart, because each feed reacts to them differently.

/// Generic HTTP API client with retry middleware and classified failures.
pub mod ky_http;

pub use ky_http::{ApiClient, ApiResponse, FetchError};
