//! Gate events — the append-only scan history.
//!
//! Events are never updated. A check-out is recorded as a new event that
//! carries the session's check-in time alongside the check-out time, so the
//! most recent event per (gate, owner) always describes the current state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Who a scan belongs to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OwnerKind {
  Resident,
  Visitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
  #[serde(rename = "owner_type")]
  pub kind: OwnerKind,
  #[serde(rename = "owner_id")]
  pub id:   Uuid,
}

impl Owner {
  pub fn resident(id: Uuid) -> Self { Self { kind: OwnerKind::Resident, id } }

  pub fn visitor(id: Uuid) -> Self { Self { kind: OwnerKind::Visitor, id } }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanAction {
  CheckIn,
  CheckOut,
}

/// A recorded scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateEvent {
  pub event_id:      Uuid,
  pub gate_id:       Uuid,
  #[serde(flatten)]
  pub owner:         Owner,
  pub gate_pass_id:  Uuid,
  pub checkin_time:  Option<DateTime<Utc>>,
  pub checkout_time: Option<DateTime<Utc>>,
  /// The agent or administrator who performed the scan.
  pub scanned_by:    Option<String>,
  pub created_at:    DateTime<Utc>,
}

/// An event about to be appended; ids and `created_at` are assigned by the
/// store.
#[derive(Debug, Clone)]
pub struct NewGateEvent {
  pub gate_id:       Uuid,
  pub owner:         Owner,
  pub gate_pass_id:  Uuid,
  pub checkin_time:  Option<DateTime<Utc>>,
  pub checkout_time: Option<DateTime<Utc>>,
  pub scanned_by:    Option<String>,
}
