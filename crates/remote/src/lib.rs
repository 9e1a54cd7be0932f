//! HTTP client for the remote generation service.
//!
//! Provides typed request/response wire types, the submit/status REST
//! wrappers, environment-driven configuration, and the bounded polling
//! loop that resolves asynchronous jobs to terminal results. Every
//! network call and every poll sleep honors a cancellation token.

pub mod api;
pub mod config;
pub mod poll;
pub mod types;
