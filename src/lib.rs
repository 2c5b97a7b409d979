//! Gatekeeper - In-process Admission Control
//!
//! This crate decides whether a client may access a resource at a given
//! instant. Decisions come from composable rate limiting rules scoped by
//! the client's region and by the requested resource; region rules are
//! evaluated first, then resource rules.

pub mod config;
pub mod error;
pub mod ratelimit;
