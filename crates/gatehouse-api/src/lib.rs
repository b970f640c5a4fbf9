//! JSON REST API for Gatehouse.
//!
//! Exposes an axum [`Router`] backed by a [`Gatekeeper`] over any
//! [`GateStore`]. Auth, TLS, and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", gatehouse_api::api_router(gatekeeper.clone()))
//! ```

pub mod error;
pub mod gates;
pub mod passes;
pub mod scans;

use axum::{
  Router,
  routing::{get, post, put},
};
use gatehouse_core::{Error as CoreError, gatekeeper::Gatekeeper, store::GateStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `gatekeeper`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(gatekeeper: Gatekeeper<S>) -> Router<()>
where
  S: GateStore + 'static,
  S::Error: From<CoreError>,
{
  Router::new()
    // Gates
    .route("/gates", get(gates::list::<S>).post(gates::create::<S>))
    .route("/gates/{id}", get(gates::get_one::<S>).delete(gates::delete_one::<S>))
    .route("/gates/{id}/dependency", put(gates::set_dependency::<S>))
    // Passes
    .route("/passes", get(passes::list::<S>).post(passes::issue::<S>))
    .route("/passes/by-code/{code}", get(passes::by_code::<S>))
    .route("/passes/{id}", get(passes::get_one::<S>))
    .route("/passes/{id}/revoke", post(passes::revoke::<S>))
    .route(
      "/passes/{id}/visitors",
      get(passes::list_visitors::<S>).post(passes::add_visitor::<S>),
    )
    .route("/passes/{id}/events", get(passes::list_events::<S>))
    .route("/passes/{id}/access", get(passes::access::<S>))
    // Scans
    .route("/scans", post(scans::admit::<S>))
    .route("/access/resolve", post(scans::resolve))
    .with_state(gatekeeper)
}

// ─── Integration tests ────────────────────────────────────────────────────────
