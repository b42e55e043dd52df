//! # leadglue
//!
//! Lead-source attribution glue for listing sites.
//!
//! A marketing identifier arrives on an inbound URL as `switch_cls[id]`. This
//! crate carries it forward so conversions on partner sites can be attributed
//! to the ad or listing that brought the visitor in.
//!
//! ## Components
//!
//! - **Server side** ([`extract`]): at request start, pull the identifier out
//!   of the query string in whichever encoding it arrived, and queue a 30-day
//!   `rentfetch_lead_source` cookie.
//! - **Page side** ([`decorate`]): at page ready, re-read the identifier from
//!   the page URL or 24-hour session memory and append it to outbound links,
//!   including links added later.
//!
//! The two sides share a [`TrackingConfig`](base::config::TrackingConfig) but
//! no state. The cookie and session memory are independent caches of the
//! same value.
//!
//! ## Quick Start
//!
//! ```rust
//! use leadglue::base::config::TrackingConfig;
//! use leadglue::extract::LeadSourceExtractor;
//!
//! let extractor = LeadSourceExtractor::new(TrackingConfig::default());
//! let extraction = extractor.extract("switch_cls[id]=ABC123").unwrap();
//! assert_eq!(extraction.identifier.as_str(), "ABC123");
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Configuration, identifier and error types
//! - [`extract`] - Query parsing, sanitization and the durable cookie
//! - [`decorate`] - Link qualification, rewriting, session memory and the watcher
//! - [`dom`] - The page model the decorator works on

pub mod base;
pub mod decorate;
pub mod dom;
pub mod extract;
