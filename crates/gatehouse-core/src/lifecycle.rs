//! The pass lifecycle guard: which scans a gate pass may accept, and what
//! state it moves to when it does.
//!
//! ```text
//! pending ──check-in──▶ checked_in ◀──check-in── checked_out
//!                           │                        ▲
//!                           └────────check-out───────┘
//! checked_in / checked_out ──quota spent, nobody inside──▶ completed
//! any non-terminal ──admin──▶ revoked
//! any non-terminal ──now > valid_to──▶ expired
//! ```
//!
//! Everything here is pure. Serialising concurrent scans against one pass
//! is the job of [`crate::gatekeeper::Gatekeeper`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
  Error, Result,
  event::ScanAction,
  gate::{Gate, GateRef},
  graph::GateGraph,
  pass::{GatePass, PassStatus, VisitorStatus},
  status::GateStatus,
};

// ─── Rejections ──────────────────────────────────────────────────────────────

/// Why a scan was refused. Returned to the gate agent as-is; never retried
/// automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
  #[error("{} must be cleared before {}", .ancestor.name, .gate.name)]
  DependencyNotCleared { gate: GateRef, ancestor: GateRef },

  #[error("gate pass has been revoked")]
  PassRevoked,

  #[error("gate pass has expired")]
  PassExpired,

  #[error("gate pass is already completed")]
  PassCompleted,

  #[error("gate pass is not valid before {valid_from}")]
  PassNotYetValid { valid_from: DateTime<Utc> },

  #[error("gate pass has used all {max_uses} of its entries")]
  QuotaExhausted { max_uses: u32 },

  #[error("cannot {action} while the pass is {status}")]
  InvalidTransition { status: PassStatus, action: ScanAction },

  #[error("owner is not checked in at {}", .gate.name)]
  NotCheckedIn { gate: GateRef },

  #[error("owner is already checked in at {}", .gate.name)]
  AlreadyCheckedIn { gate: GateRef },

  #[error("dependency chain of gate {gate_id} is malformed")]
  MalformedGraph { gate_id: Uuid },

  #[error("unknown gate {gate_id}")]
  GateNotFound { gate_id: Uuid },

  #[error("unknown gate pass {pass_id}")]
  PassNotFound { pass_id: Uuid },

  #[error("owner {owner_id} does not travel on this pass")]
  OwnerNotOnPass { owner_id: Uuid },

  #[error("scan time {timestamp} is too far from the gatehouse clock")]
  ClockSkew { timestamp: DateTime<Utc> },

  #[error("gate pass is being updated concurrently; scan again")]
  Contended,
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// The effect of an accepted scan on its pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub status:    PassStatus,
  /// Whether `uses_count` goes up by one.
  pub increment: bool,
}

/// Decide whether `pass` accepts `action` at `now`.
///
/// `open_sessions` is the number of (gate, owner) pairs on this pass that
/// are currently checked in, before this scan. A check-out completes the
/// pass only when the quota is spent and it closes the last open session.
///
/// Expiry is checked before the quota, so an expired pass is always
/// reported as expired.
pub fn evaluate(
  pass: &GatePass,
  action: ScanAction,
  open_sessions: usize,
  now: DateTime<Utc>,
) -> Result<Transition, Rejection> {
  match pass.status {
    PassStatus::Revoked => return Err(Rejection::PassRevoked),
    PassStatus::Expired => return Err(Rejection::PassExpired),
    PassStatus::Completed => return Err(Rejection::PassCompleted),
    PassStatus::Pending | PassStatus::CheckedIn | PassStatus::CheckedOut => {}
  }

  if pass.has_expired(now) {
    return Err(Rejection::PassExpired);
  }
  if pass.is_not_yet_valid(now) {
    return Err(Rejection::PassNotYetValid { valid_from: pass.valid_from });
  }

  match action {
    ScanAction::CheckIn => {
      if let Some(max_uses) = pass.max_uses
        && pass.uses_count >= max_uses
      {
        return Err(Rejection::QuotaExhausted { max_uses });
      }
      Ok(Transition { status: PassStatus::CheckedIn, increment: true })
    }
    ScanAction::CheckOut => match pass.status {
      PassStatus::CheckedIn | PassStatus::CheckedOut => {
        let nobody_inside = open_sessions <= 1;
        let status = if pass.quota_spent() && nobody_inside {
          PassStatus::Completed
        } else {
          PassStatus::CheckedOut
        };
        Ok(Transition { status, increment: false })
      }
      status => Err(Rejection::InvalidTransition { status, action }),
    },
  }
}

/// Administrative revocation. Terminal passes cannot be revoked.
pub fn revoke(pass: &GatePass) -> Result<PassStatus> {
  if pass.status.is_terminal() {
    return Err(Error::PassTerminal { id: pass.pass_id, status: pass.status });
  }
  Ok(PassStatus::Revoked)
}

/// The system expiry transition, if it is due.
pub fn expire_if_due(pass: &GatePass, now: DateTime<Utc>) -> Option<PassStatus> {
  (!pass.status.is_terminal() && pass.has_expired(now)).then_some(PassStatus::Expired)
}

/// Visitor status after an accepted scan. `still_inside` is the number of
/// gates the visitor remains checked in at afterwards.
pub fn visitor_status_after(action: ScanAction, still_inside: usize) -> VisitorStatus {
  match action {
    ScanAction::CheckIn => VisitorStatus::CheckedIn,
    ScanAction::CheckOut if still_inside > 0 => VisitorStatus::InProgress,
    ScanAction::CheckOut => VisitorStatus::CheckedOut,
  }
}

// ─── Per-gate admission ──────────────────────────────────────────────────────

/// Every ancestor of `gate` must be cleared (`checked_in` or `checked_out`)
/// by the owner whose per-gate `statuses` are given. The ancestor closest
/// to the root is reported first. Default gates have no requirement.
pub fn check_dependencies(
  gate: &Gate,
  graph: &GateGraph,
  statuses: &HashMap<Uuid, GateStatus>,
) -> Result<(), Rejection> {
  if gate.is_default {
    return Ok(());
  }

  let chain = graph
    .ancestors(gate.gate_id)
    .map_err(|_| Rejection::MalformedGraph { gate_id: gate.gate_id })?;

  match chain
    .into_iter()
    .find(|a| !statuses.get(&a.gate_id).is_some_and(|s| s.is_cleared()))
  {
    Some(unmet) => Err(Rejection::DependencyNotCleared {
      gate:     gate.gate_ref(),
      ancestor: unmet.gate_ref(),
    }),
    None => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() }

  fn pass(status: PassStatus, uses_count: u32, max_uses: Option<u32>) -> GatePass {
    GatePass {
      pass_id: Uuid::new_v4(),
      code: "K7P2QX9M".into(),
      status,
      valid_from: now() - Duration::days(1),
      valid_to: Some(now() + Duration::days(1)),
      max_uses,
      uses_count,
      house_id: Uuid::new_v4(),
      created_at: now() - Duration::days(2),
    }
  }

  fn gate(name: &str, dependency_id: Option<Uuid>) -> Gate {
    Gate {
      gate_id: Uuid::new_v4(),
      name: name.into(),
      slug: name.to_lowercase().replace(' ', "-"),
      is_default: dependency_id.is_none(),
      dependency_id,
      created_at: now(),
    }
  }

  #[test]
  fn first_check_in_moves_pending_to_checked_in() {
    let t = evaluate(&pass(PassStatus::Pending, 0, Some(3)), ScanAction::CheckIn, 0, now()).unwrap();
    assert_eq!(t, Transition { status: PassStatus::CheckedIn, increment: true });
  }

  #[test]
  fn check_in_is_refused_once_quota_is_used() {
    let err = evaluate(&pass(PassStatus::CheckedOut, 2, Some(2)), ScanAction::CheckIn, 0, now())
      .unwrap_err();
    assert_eq!(err, Rejection::QuotaExhausted { max_uses: 2 });
  }

  #[test]
  fn unlimited_passes_never_exhaust() {
    let t = evaluate(&pass(PassStatus::CheckedOut, 500, None), ScanAction::CheckIn, 0, now());
    assert!(t.is_ok());
  }

  #[test]
  fn expiry_wins_over_quota() {
    let mut p = pass(PassStatus::CheckedOut, 5, Some(5));
    p.valid_to = Some(now() - Duration::minutes(1));
    assert_eq!(evaluate(&p, ScanAction::CheckIn, 0, now()), Err(Rejection::PassExpired));
    assert_eq!(expire_if_due(&p, now()), Some(PassStatus::Expired));
  }

  #[test]
  fn open_validity_window_is_unbounded() {
    let mut p = pass(PassStatus::Pending, 0, None);
    p.valid_to = None;
    assert!(evaluate(&p, ScanAction::CheckIn, 0, now() + Duration::days(3650)).is_ok());
    assert_eq!(expire_if_due(&p, now() + Duration::days(3650)), None);
  }

  #[test]
  fn not_yet_valid_is_refused() {
    let mut p = pass(PassStatus::Pending, 0, None);
    p.valid_from = now() + Duration::hours(1);
    assert!(matches!(
      evaluate(&p, ScanAction::CheckIn, 0, now()),
      Err(Rejection::PassNotYetValid { .. })
    ));
  }

  #[test]
  fn terminal_states_refuse_scans() {
    let cases = [
      (PassStatus::Revoked, Rejection::PassRevoked),
      (PassStatus::Expired, Rejection::PassExpired),
      (PassStatus::Completed, Rejection::PassCompleted),
    ];
    for (status, expected) in cases {
      for action in [ScanAction::CheckIn, ScanAction::CheckOut] {
        assert_eq!(evaluate(&pass(status, 0, None), action, 0, now()), Err(expected.clone()));
      }
    }
  }

  #[test]
  fn check_out_before_check_in_is_invalid() {
    let err = evaluate(&pass(PassStatus::Pending, 0, None), ScanAction::CheckOut, 0, now())
      .unwrap_err();
    assert_eq!(
      err,
      Rejection::InvalidTransition { status: PassStatus::Pending, action: ScanAction::CheckOut }
    );
  }

  #[test]
  fn last_check_out_on_spent_pass_completes_it() {
    let p = pass(PassStatus::CheckedIn, 1, Some(1));
    let t = evaluate(&p, ScanAction::CheckOut, 1, now()).unwrap();
    assert_eq!(t, Transition { status: PassStatus::Completed, increment: false });

    // Someone is still inside at another gate.
    let t = evaluate(&p, ScanAction::CheckOut, 2, now()).unwrap();
    assert_eq!(t.status, PassStatus::CheckedOut);

    // Quota left: the pass stays reusable.
    let t = evaluate(&pass(PassStatus::CheckedIn, 1, Some(3)), ScanAction::CheckOut, 1, now())
      .unwrap();
    assert_eq!(t.status, PassStatus::CheckedOut);
  }

  #[test]
  fn revoke_only_from_non_terminal() {
    assert_eq!(revoke(&pass(PassStatus::CheckedIn, 1, None)).unwrap(), PassStatus::Revoked);
    assert!(matches!(
      revoke(&pass(PassStatus::Completed, 1, Some(1))),
      Err(Error::PassTerminal { status: PassStatus::Completed, .. })
    ));
  }

  #[test]
  fn visitor_status_tracks_remaining_sessions() {
    assert_eq!(visitor_status_after(ScanAction::CheckIn, 1), VisitorStatus::CheckedIn);
    assert_eq!(visitor_status_after(ScanAction::CheckOut, 1), VisitorStatus::InProgress);
    assert_eq!(visitor_status_after(ScanAction::CheckOut, 0), VisitorStatus::CheckedOut);
  }

  #[test]
  fn uncleared_ancestor_blocks_scan() {
    let a = gate("Main Gate", None);
    let b = gate("Block B", Some(a.gate_id));
    let graph = GateGraph::new([a.clone(), b.clone()]);

    let err = check_dependencies(&b, &graph, &HashMap::new()).unwrap_err();
    assert_eq!(
      err,
      Rejection::DependencyNotCleared { gate: b.gate_ref(), ancestor: a.gate_ref() }
    );

    let statuses = HashMap::from([(a.gate_id, GateStatus::Locked)]);
    assert!(check_dependencies(&b, &graph, &statuses).is_err());

    let statuses = HashMap::from([(a.gate_id, GateStatus::CheckedOut)]);
    assert!(check_dependencies(&b, &graph, &statuses).is_ok());
  }

  #[test]
  fn first_unmet_ancestor_is_closest_to_root() {
    let a = gate("Main Gate", None);
    let b = gate("Lobby", Some(a.gate_id));
    let c = gate("Lift", Some(b.gate_id));
    let graph = GateGraph::new([a.clone(), b.clone(), c.clone()]);

    let err = check_dependencies(&c, &graph, &HashMap::new()).unwrap_err();
    assert!(matches!(err, Rejection::DependencyNotCleared { ancestor, .. } if ancestor.id == a.gate_id));

    let statuses = HashMap::from([(a.gate_id, GateStatus::CheckedIn)]);
    let err = check_dependencies(&c, &graph, &statuses).unwrap_err();
    assert!(matches!(err, Rejection::DependencyNotCleared { ancestor, .. } if ancestor.id == b.gate_id));
  }

  #[test]
  fn default_gates_skip_the_chain() {
    let a = gate("Main Gate", None);
    let mut side = gate("Side Gate", Some(a.gate_id));
    side.is_default = true;
    let graph = GateGraph::new([a, side.clone()]);
    assert!(check_dependencies(&side, &graph, &HashMap::new()).is_ok());
  }

  #[test]
  fn cyclic_chain_is_malformed() {
    let mut a = gate("A", None);
    let b = gate("B", Some(a.gate_id));
    a.dependency_id = Some(b.gate_id);
    a.is_default = false;
    let graph = GateGraph::new([a.clone(), b]);
    assert_eq!(
      check_dependencies(&a, &graph, &HashMap::new()),
      Err(Rejection::MalformedGraph { gate_id: a.gate_id })
    );
  }

  #[test]
  fn rejections_serialise_with_reason_tag() {
    let json = serde_json::to_value(Rejection::QuotaExhausted { max_uses: 1 }).unwrap();
    assert_eq!(json, serde_json::json!({ "reason": "quota_exhausted", "max_uses": 1 }));
    let json = serde_json::to_value(Rejection::PassRevoked).unwrap();
    assert_eq!(json, serde_json::json!({ "reason": "pass_revoked" }));
  }
}
