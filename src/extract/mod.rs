//! Server side: identifier extraction and the durable cookie.
//!
//! [`LeadSourceExtractor`](extractor::LeadSourceExtractor) runs once per
//! request, before any body is produced. It reads the query string in every
//! encoding intermediaries are known to deliver, and when it finds an
//! identifier it queues a [`LeadCookie`](lead_cookie::LeadCookie) for the
//! response and exposes the value to the rest of the request.
//!
//! ```rust
//! use leadglue::base::config::TrackingConfig;
//! use leadglue::extract::extractor::LeadSourceExtractor;
//!
//! let extractor = LeadSourceExtractor::new(TrackingConfig::default());
//! let mut request = http::Request::get("/homes?switch_cls%5Bid%5D=ABC123")
//!     .body(())
//!     .unwrap();
//!
//! let outcome = extractor.on_request_start(&mut request);
//! let mut response = http::Response::new(());
//! outcome.apply_to_response(&mut response);
//!
//! assert_eq!(outcome.identifier().map(|id| id.as_str()), Some("ABC123"));
//! assert!(response.headers().contains_key(http::header::SET_COOKIE));
//! ```

pub mod extractor;
pub mod lead_cookie;
pub mod query;
pub mod sanitize;

pub use extractor::{ConnectionInfo, Extraction, ExtractionSource, LeadSourceExtractor, RequestStart};
pub use lead_cookie::LeadCookie;
