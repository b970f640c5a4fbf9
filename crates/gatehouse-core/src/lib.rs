//! Core types and access logic for the Gatehouse gate-pass service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::GateStore`]; the HTTP layer talks to
//! [`gatekeeper::Gatekeeper`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod event;
pub mod gate;
pub mod gatekeeper;
pub mod graph;
pub mod lifecycle;
pub mod locks;
pub mod pass;
pub mod resolver;
pub mod snapshot;
pub mod status;
pub mod store;

pub use error::{Error, Result};
