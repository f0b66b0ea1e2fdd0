//! # Desktop Bridge Implementations
//!
//! Callback-driven transport for desktop platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! [`ReqwestTransport`] implements [`bridge_traits::Transport`] on top of a
//! pooled `reqwest` client:
//! - Data tasks buffer the response body in memory
//! - Upload tasks stream a byte buffer or a file as the request body
//! - Download tasks write the body to a staging file that is removed once the
//!   completion callback returns
//! - Cancelled downloads carry [`ResumeData`] and continue with an HTTP
//!   `Range` request
//!
//! Every task reports its lifecycle to the attached
//! [`TaskDelegate`](bridge_traits::TaskDelegate): response headers, data
//! chunks, upload and download progress, redirects, metrics and completion.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestTransport, TransportOptions};
//! use bridge_traits::{Request, Transport};
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = ReqwestTransport::new(TransportOptions::default()).unwrap();
//!     let task = transport
//!         .data_task(Request::get("https://example.com"), Box::new(|result| {
//!             println!("{:?}", result.map(|(_, response)| response.status));
//!         }))
//!         .unwrap();
//!     task.start();
//! }
//! ```

mod resume;
mod task;
mod transport;

pub use resume::ResumeData;
pub use task::ReqwestTask;
pub use transport::{ReqwestTransport, TransportOptions};
