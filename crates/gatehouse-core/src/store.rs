//! The `GateStore` trait: gate graph, pass ledger and event log.
//!
//! Implemented by storage backends (e.g. `gatehouse-store-sqlite`). The
//! [`Gatekeeper`](crate::gatekeeper::Gatekeeper) and the HTTP layer depend
//! on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  event::{GateEvent, NewGateEvent, Owner},
  gate::{Gate, NewGate},
  pass::{GatePass, NewGatePass, NewVisitor, PassStatus, Visitor, VisitorStatus},
};

/// Everything an accepted scan writes, applied atomically by
/// [`GateStore::commit_scan`].
#[derive(Debug, Clone)]
pub struct ScanCommit {
  pub event:           NewGateEvent,
  /// The pass must still be in this state...
  pub expected_status: PassStatus,
  /// ...with exactly this many uses, or nothing is written.
  pub expected_uses:   u32,
  pub next_status:     PassStatus,
  /// Add one to `uses_count`.
  pub increment:       bool,
  /// New status for the scanning visitor, when the owner is a visitor.
  pub visitor_status:  Option<VisitorStatus>,
}

/// Abstraction over a Gatehouse storage backend.
///
/// Gate events are append-only. All methods return `Send` futures so the
/// trait can be used from multi-threaded runtimes (e.g. tokio with `axum`).
pub trait GateStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Gates ─────────────────────────────────────────────────────────────

  /// Persist a new gate. Fails if the slug is taken or the dependency gate
  /// does not exist.
  fn add_gate(
    &self,
    input: NewGate,
  ) -> impl Future<Output = Result<Gate, Self::Error>> + Send + '_;

  fn get_gate(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Gate>, Self::Error>> + Send + '_;

  /// All gates in creation order.
  fn list_gates(&self) -> impl Future<Output = Result<Vec<Gate>, Self::Error>> + Send + '_;

  /// Re-point a gate's dependency. Refuses unknown parents and any change
  /// that would close a cycle.
  fn set_gate_dependency(
    &self,
    id: Uuid,
    dependency_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Gate, Self::Error>> + Send + '_;

  /// Delete a gate. Refused while other gates depend on it.
  fn delete_gate(&self, id: Uuid) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Passes ────────────────────────────────────────────────────────────

  /// Issue a pass with a freshly generated unique code, `pending` status
  /// and zero uses. `valid_from` defaults to now.
  fn issue_pass(
    &self,
    input: NewGatePass,
  ) -> impl Future<Output = Result<GatePass, Self::Error>> + Send + '_;

  fn get_pass(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<GatePass>, Self::Error>> + Send + '_;

  fn get_pass_by_code<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<GatePass>, Self::Error>> + Send + 'a;

  /// List passes, optionally for one house, in issue order.
  fn list_passes(
    &self,
    house_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<GatePass>, Self::Error>> + Send + '_;

  /// Overwrite a pass status (revocation, expiry). Revoking also revokes
  /// every visitor on the pass.
  fn set_pass_status(
    &self,
    id: Uuid,
    status: PassStatus,
  ) -> impl Future<Output = Result<GatePass, Self::Error>> + Send + '_;

  // ── Visitors ──────────────────────────────────────────────────────────

  fn add_visitor(
    &self,
    pass_id: Uuid,
    input: NewVisitor,
  ) -> impl Future<Output = Result<Visitor, Self::Error>> + Send + '_;

  fn get_visitor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Visitor>, Self::Error>> + Send + '_;

  fn list_visitors(
    &self,
    pass_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Visitor>, Self::Error>> + Send + '_;

  // ── Events ────────────────────────────────────────────────────────────

  /// Every event on a pass, in append order.
  fn list_events(
    &self,
    pass_id: Uuid,
  ) -> impl Future<Output = Result<Vec<GateEvent>, Self::Error>> + Send + '_;

  /// The owner's most recent event per gate on a pass, in append order.
  fn latest_events(
    &self,
    pass_id: Uuid,
    owner: Owner,
  ) -> impl Future<Output = Result<Vec<GateEvent>, Self::Error>> + Send + '_;

  /// Apply an accepted scan: compare-and-set the pass status and use count,
  /// append the event, update the visitor. Returns `None`, writing nothing,
  /// when the pass no longer matches the expected status and use count.
  fn commit_scan(
    &self,
    commit: ScanCommit,
  ) -> impl Future<Output = Result<Option<GateEvent>, Self::Error>> + Send + '_;
}
