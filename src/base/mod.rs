//! Base types and error handling.
//!
//! - [`GlueError`](error::GlueError): errors from configuration and construction
//! - [`TrackingConfig`](config::TrackingConfig): settings shared by both components
//! - [`TrackingIdentifier`](identifier::TrackingIdentifier): the lead-source token

pub mod config;
pub mod error;
pub mod identifier;
