//! Builds the per-gate status snapshot for one owner from the gate graph,
//! the pass, and the owner's scan history.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  event::GateEvent,
  gate::{Gate, GateRef},
  graph::GateGraph,
  lifecycle::{self, Rejection},
  pass::{GatePass, PassStatus},
  status::{GateStatus, GateStatusEntry, GateStatusMap},
};

/// The owner's standing at a gate, given its most recent event there.
pub fn owner_gate_status(event: &GateEvent) -> GateStatus {
  if event.checkout_time.is_some() {
    GateStatus::CheckedOut
  } else if event.checkin_time.is_some() {
    GateStatus::CheckedIn
  } else {
    GateStatus::Pending
  }
}

/// Keep only the most recent event per gate. `events` must be in append
/// order; later events win.
pub fn latest_per_gate(events: impl IntoIterator<Item = GateEvent>) -> HashMap<Uuid, GateEvent> {
  let mut latest = HashMap::new();
  for event in events {
    latest.insert(event.gate_id, event);
  }
  latest
}

pub fn gate_statuses(latest: &HashMap<Uuid, GateEvent>) -> HashMap<Uuid, GateStatus> {
  latest.iter().map(|(id, e)| (*id, owner_gate_status(e))).collect()
}

/// Why no gate is usable on `pass` at `now`, if that is the case.
fn pass_unavailable_reason(pass: &GatePass, now: DateTime<Utc>) -> Option<String> {
  match pass.status {
    PassStatus::Revoked => return Some("Pass has been revoked".into()),
    PassStatus::Expired => return Some("Pass has expired".into()),
    PassStatus::Completed => return Some("Pass has been used up".into()),
    PassStatus::Pending | PassStatus::CheckedIn | PassStatus::CheckedOut => {}
  }
  if pass.has_expired(now) {
    return Some("Pass has expired".into());
  }
  if pass.is_not_yet_valid(now) {
    return Some(format!("Pass is valid from {}", pass.valid_from.to_rfc3339()));
  }
  None
}

fn dependency_ref(gate: &Gate, graph: &GateGraph) -> Option<GateRef> {
  gate.dependency_id.map(|id| {
    graph
      .get(&id)
      .map(Gate::gate_ref)
      .unwrap_or(GateRef { id, name: String::new() })
  })
}

/// Assemble the snapshot in gate order. `latest` holds the owner's most
/// recent event per gate on this pass.
pub fn build_snapshot(
  graph: &GateGraph,
  latest: &HashMap<Uuid, GateEvent>,
  pass: &GatePass,
  now: DateTime<Utc>,
) -> GateStatusMap {
  let statuses = gate_statuses(latest);
  let unavailable = pass_unavailable_reason(pass, now);

  graph
    .gates()
    .iter()
    .map(|gate| {
      let base = |status| GateStatusEntry::new(gate.gate_ref(), dependency_ref(gate, graph), status);

      if let Some(event) = latest.get(&gate.gate_id) {
        let status = owner_gate_status(event);
        let message = match status {
          GateStatus::CheckedOut => format!("Checked out of {}", gate.name),
          _ => format!("Checked in at {}", gate.name),
        };
        return base(status).with_message(message).with_event(event.clone());
      }

      if let Some(reason) = &unavailable {
        return base(GateStatus::Unavailable).with_message(reason.clone());
      }

      match lifecycle::check_dependencies(gate, graph, &statuses) {
        Ok(()) => base(GateStatus::Pending).with_message(format!("Ready for scan at {}", gate.name)),
        Err(Rejection::DependencyNotCleared { ancestor, .. }) => base(GateStatus::Locked)
          .with_message(format!("Awaiting clearance at {}", ancestor.name)),
        Err(other) => base(GateStatus::Unavailable).with_message(other.to_string()),
      }
    })
    .collect()
}
