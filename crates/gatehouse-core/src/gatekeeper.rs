//! [`Gatekeeper`] — scan admission, revocation, expiry and access trees on
//! top of any [`GateStore`].

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  event::{GateEvent, NewGateEvent, Owner, OwnerKind, ScanAction},
  graph::GateGraph,
  lifecycle::{self, Rejection},
  locks::PassLocks,
  pass::{GatePass, PassStatus},
  resolver::{self, AccessTree},
  snapshot,
  status::{GateStatus, GateStatusMap},
  store::{GateStore, ScanCommit},
};

/// Optimistic commits attempted per scan before giving up with
/// [`Rejection::Contended`].
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// How far, in seconds, a scan's timestamp may drift from the gatehouse
/// clock before the scan is refused with [`Rejection::ClockSkew`].
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

// ─── Request / outcome ───────────────────────────────────────────────────────

/// A scan presented at a gate.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
  pub gate_id:      Uuid,
  #[serde(flatten)]
  pub owner:        Owner,
  pub gate_pass_id: Uuid,
  pub action:       ScanAction,
  pub timestamp:    DateTime<Utc>,
  #[serde(default)]
  pub scanned_by:   Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ScanOutcome {
  Admitted {
    event:       GateEvent,
    pass_status: PassStatus,
    uses_count:  u32,
  },
  Rejected {
    #[serde(flatten)]
    reason: Rejection,
  },
}

impl ScanOutcome {
  pub fn is_admitted(&self) -> bool { matches!(self, Self::Admitted { .. }) }

  pub fn rejection(&self) -> Option<&Rejection> {
    match self {
      Self::Rejected { reason } => Some(reason),
      Self::Admitted { .. } => None,
    }
  }
}

enum Attempt {
  Done(ScanOutcome),
  Conflict,
}

fn rejected(reason: Rejection) -> Attempt { Attempt::Done(ScanOutcome::Rejected { reason }) }

// ─── Gatekeeper ──────────────────────────────────────────────────────────────

/// Serialises mutations per pass and applies the lifecycle rules.
///
/// Cloning is cheap; clones share the store and the lock table.
#[derive(Debug)]
pub struct Gatekeeper<S> {
  store: Arc<S>,
  locks: PassLocks,
}

impl<S> Clone for Gatekeeper<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), locks: self.locks.clone() }
  }
}

impl<S> Gatekeeper<S>
where
  S: GateStore,
  S::Error: From<Error>,
{
  pub fn new(store: Arc<S>) -> Self { Self { store, locks: PassLocks::new() } }

  pub fn store(&self) -> &Arc<S> { &self.store }

  // ── Scans ─────────────────────────────────────────────────────────────

  /// Validate and record a scan. Rejections come back as
  /// [`ScanOutcome::Rejected`]; `Err` is reserved for storage failures.
  pub async fn admit(&self, request: ScanRequest) -> Result<ScanOutcome, S::Error> {
    let _guard = self.locks.lock(request.gate_pass_id).await;

    for attempt in 1..=MAX_COMMIT_ATTEMPTS {
      match self.try_admit(&request).await? {
        Attempt::Done(outcome) => {
          match &outcome {
            ScanOutcome::Admitted { event, pass_status, uses_count } => tracing::info!(
              pass_id = %request.gate_pass_id,
              gate_id = %request.gate_id,
              event_id = %event.event_id,
              action = %request.action,
              status = %pass_status,
              uses_count,
              "scan admitted"
            ),
            ScanOutcome::Rejected { reason } => tracing::warn!(
              pass_id = %request.gate_pass_id,
              gate_id = %request.gate_id,
              action = %request.action,
              %reason,
              "scan rejected"
            ),
          }
          return Ok(outcome);
        }
        Attempt::Conflict => {
          tracing::debug!(pass_id = %request.gate_pass_id, attempt, "pass changed during scan; retrying");
        }
      }
    }

    tracing::warn!(pass_id = %request.gate_pass_id, "scan abandoned after repeated conflicts");
    Ok(ScanOutcome::Rejected { reason: Rejection::Contended })
  }

  async fn try_admit(&self, req: &ScanRequest) -> Result<Attempt, S::Error> {
    // Terminal clocks are trusted for the event record only. Expiry, which
    // is persisted and irreversible, follows the gatehouse clock.
    let server_now = Utc::now();
    if (req.timestamp - server_now).num_seconds().abs() > MAX_CLOCK_SKEW_SECS {
      return Ok(rejected(Rejection::ClockSkew { timestamp: req.timestamp }));
    }
    let now = req.timestamp;

    let Some(pass) = self.store.get_pass(req.gate_pass_id).await? else {
      return Ok(rejected(Rejection::PassNotFound { pass_id: req.gate_pass_id }));
    };

    if let Some(expired) = lifecycle::expire_if_due(&pass, server_now) {
      self.store.set_pass_status(pass.pass_id, expired).await?;
      tracing::info!(pass_id = %pass.pass_id, "gate pass expired");
      return Ok(rejected(Rejection::PassExpired));
    }

    let Some(gate) = self.store.get_gate(req.gate_id).await? else {
      return Ok(rejected(Rejection::GateNotFound { gate_id: req.gate_id }));
    };

    if req.owner.kind == OwnerKind::Visitor {
      let on_pass = self
        .store
        .get_visitor(req.owner.id)
        .await?
        .is_some_and(|v| v.gate_pass_id == pass.pass_id);
      if !on_pass {
        return Ok(rejected(Rejection::OwnerNotOnPass { owner_id: req.owner.id }));
      }
    }

    let events = self.store.list_events(pass.pass_id).await?;
    let sessions = latest_sessions(&events);
    let open_sessions = sessions
      .values()
      .filter(|e| snapshot::owner_gate_status(e) == GateStatus::CheckedIn)
      .count();

    let transition = match lifecycle::evaluate(&pass, req.action, open_sessions, now) {
      Ok(t) => t,
      Err(reason) => return Ok(rejected(reason)),
    };

    let owner_latest: HashMap<Uuid, GateEvent> = sessions
      .iter()
      .filter(|((_, owner), _)| *owner == req.owner)
      .map(|((gate_id, _), e)| (*gate_id, (*e).clone()))
      .collect();
    let statuses = snapshot::gate_statuses(&owner_latest);

    let graph = GateGraph::new(self.store.list_gates().await?);
    if let Err(reason) = lifecycle::check_dependencies(&gate, &graph, &statuses) {
      return Ok(rejected(reason));
    }

    let here = owner_latest.get(&gate.gate_id);
    let owner_inside = statuses.values().filter(|s| **s == GateStatus::CheckedIn).count();
    let (checkin_time, checkout_time, still_inside) = match req.action {
      ScanAction::CheckIn => {
        if here.is_some_and(|e| snapshot::owner_gate_status(e) == GateStatus::CheckedIn) {
          return Ok(rejected(Rejection::AlreadyCheckedIn { gate: gate.gate_ref() }));
        }
        (Some(now), None, owner_inside + 1)
      }
      ScanAction::CheckOut => match here {
        Some(e) if snapshot::owner_gate_status(e) == GateStatus::CheckedIn => {
          (e.checkin_time, Some(now), owner_inside.saturating_sub(1))
        }
        _ => return Ok(rejected(Rejection::NotCheckedIn { gate: gate.gate_ref() })),
      },
    };

    let commit = ScanCommit {
      event:           NewGateEvent {
        gate_id: gate.gate_id,
        owner: req.owner,
        gate_pass_id: pass.pass_id,
        checkin_time,
        checkout_time,
        scanned_by: req.scanned_by.clone(),
      },
      expected_status: pass.status,
      expected_uses:   pass.uses_count,
      next_status:     transition.status,
      increment:       transition.increment,
      visitor_status:  (req.owner.kind == OwnerKind::Visitor)
        .then(|| lifecycle::visitor_status_after(req.action, still_inside)),
    };

    Ok(match self.store.commit_scan(commit).await? {
      Some(event) => Attempt::Done(ScanOutcome::Admitted {
        event,
        pass_status: transition.status,
        uses_count: pass.uses_count + u32::from(transition.increment),
      }),
      None => Attempt::Conflict,
    })
  }

  // ── Administrative transitions ────────────────────────────────────────

  /// Revoke a pass and its visitors. Terminal passes are refused.
  pub async fn revoke(&self, pass_id: Uuid) -> Result<GatePass, S::Error> {
    let _guard = self.locks.lock(pass_id).await;

    let pass = self.store.get_pass(pass_id).await?.ok_or(Error::PassNotFound(pass_id))?;
    let status = lifecycle::revoke(&pass)?;
    let pass = self.store.set_pass_status(pass_id, status).await?;
    tracing::info!(%pass_id, code = %pass.code, "gate pass revoked");
    Ok(pass)
  }

  /// Expire every non-terminal pass whose window closed before `now`.
  /// Returns the ids that were expired.
  pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, S::Error> {
    let mut expired = Vec::new();

    for candidate in self.store.list_passes(None).await? {
      if lifecycle::expire_if_due(&candidate, now).is_none() {
        continue;
      }
      let _guard = self.locks.lock(candidate.pass_id).await;
      // Re-read under the lock; a scan or revocation may have won the race.
      let Some(pass) = self.store.get_pass(candidate.pass_id).await? else { continue };
      if let Some(status) = lifecycle::expire_if_due(&pass, now) {
        self.store.set_pass_status(pass.pass_id, status).await?;
        expired.push(pass.pass_id);
      }
    }

    if !expired.is_empty() {
      tracing::info!(count = expired.len(), "expired gate passes");
    }
    self.locks.prune();
    Ok(expired)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// The per-gate status snapshot of `owner` on a pass.
  pub async fn snapshot(
    &self,
    pass_id: Uuid,
    owner: Owner,
    now: DateTime<Utc>,
  ) -> Result<GateStatusMap, S::Error> {
    let pass = self.store.get_pass(pass_id).await?.ok_or(Error::PassNotFound(pass_id))?;
    let graph = GateGraph::new(self.store.list_gates().await?);
    let latest = snapshot::latest_per_gate(self.store.latest_events(pass_id, owner).await?);
    Ok(snapshot::build_snapshot(&graph, &latest, &pass, now))
  }

  /// Resolve the access tree of `owner` on a pass. Graph anomalies are
  /// logged, never fatal.
  pub async fn access_tree(
    &self,
    pass_id: Uuid,
    owner: Owner,
    now: DateTime<Utc>,
  ) -> Result<AccessTree, S::Error> {
    let map = self.snapshot(pass_id, owner, now).await?;
    Ok(resolve_logged(&map))
  }
}

/// Resolve `map`, logging any malformed-graph conditions first.
pub fn resolve_logged(map: &GateStatusMap) -> AccessTree {
  for anomaly in resolver::diagnose(map) {
    tracing::warn!(%anomaly, "malformed gate graph");
  }
  resolver::resolve(map)
}

/// Most recent event per (gate, owner) pair; `events` are in append order.
fn latest_sessions(events: &[GateEvent]) -> HashMap<(Uuid, Owner), &GateEvent> {
  let mut latest = HashMap::new();
  for event in events {
    latest.insert((event.gate_id, event.owner), event);
  }
  latest
}
