//! Integration tests for `SqliteStore` against an in-memory database,
//! including end-to-end [`Gatekeeper`] scans.

use std::sync::Arc;

use chrono::{Duration, Utc};
use gatehouse_core::{
  event::{NewGateEvent, Owner, ScanAction},
  gate::NewGate,
  gatekeeper::{Gatekeeper, ScanOutcome, ScanRequest},
  lifecycle::Rejection,
  pass::{CODE_LEN, NewGatePass, NewVisitor, PassStatus, VisitorStatus},
  resolver::BranchAnchor,
  status::GateStatus,
  store::{GateStore, ScanCommit},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn gatekeeper() -> Gatekeeper<SqliteStore> { Gatekeeper::new(Arc::new(store().await)) }

fn scan(gate_id: Uuid, owner: Owner, pass_id: Uuid, action: ScanAction) -> ScanRequest {
  ScanRequest {
    gate_id,
    owner,
    gate_pass_id: pass_id,
    action,
    timestamp: Utc::now(),
    scanned_by: Some("guard-1".into()),
  }
}

fn core_err(err: Error) -> gatehouse_core::Error {
  match err {
    Error::Core(e) => e,
    other => panic!("expected a core error, got {other:?}"),
  }
}

// ─── Gates ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_gate() {
  let s = store().await;

  let main = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let inner = s.add_gate(NewGate::new("Block A", "block-a").depends_on(main.gate_id)).await.unwrap();

  let fetched = s.get_gate(inner.gate_id).await.unwrap().unwrap();
  assert_eq!(fetched, inner);
  assert_eq!(fetched.dependency_id, Some(main.gate_id));
  assert!(s.get_gate(main.gate_id).await.unwrap().unwrap().is_default);

  let all = s.list_gates().await.unwrap();
  assert_eq!(all.iter().map(|g| g.gate_id).collect::<Vec<_>>(), vec![
    main.gate_id,
    inner.gate_id
  ]);
}

#[tokio::test]
async fn get_gate_missing_returns_none() {
  let s = store().await;
  assert!(s.get_gate(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_slug_is_refused() {
  let s = store().await;
  s.add_gate(NewGate::new("Main Gate", "main")).await.unwrap();

  let err = s.add_gate(NewGate::new("Other", "main")).await.unwrap_err();
  assert!(matches!(core_err(err), gatehouse_core::Error::SlugTaken(slug) if slug == "main"));
}

#[tokio::test]
async fn unknown_parent_is_refused() {
  let s = store().await;
  let ghost = Uuid::new_v4();

  let err = s.add_gate(NewGate::new("Pool", "pool").depends_on(ghost)).await.unwrap_err();
  assert!(matches!(core_err(err), gatehouse_core::Error::GateNotFound(id) if id == ghost));
  assert!(s.list_gates().await.unwrap().is_empty());
}

#[tokio::test]
async fn dependency_change_that_closes_a_cycle_is_refused() {
  let s = store().await;
  let a = s.add_gate(NewGate::new("A", "a")).await.unwrap();
  let b = s.add_gate(NewGate::new("B", "b").depends_on(a.gate_id)).await.unwrap();
  let c = s.add_gate(NewGate::new("C", "c").depends_on(b.gate_id)).await.unwrap();

  let err = s.set_gate_dependency(a.gate_id, Some(c.gate_id)).await.unwrap_err();
  assert!(matches!(core_err(err), gatehouse_core::Error::DependencyCycle(_)));

  let err = s.set_gate_dependency(a.gate_id, Some(a.gate_id)).await.unwrap_err();
  assert!(matches!(core_err(err), gatehouse_core::Error::DependencyCycle(_)));

  // Re-pointing C at A is fine, as is clearing a dependency.
  let c = s.set_gate_dependency(c.gate_id, Some(a.gate_id)).await.unwrap();
  assert_eq!(c.dependency_id, Some(a.gate_id));
  let b = s.set_gate_dependency(b.gate_id, None).await.unwrap();
  assert_eq!(b.dependency_id, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_dependency_edits_never_persist_a_cycle() {
  let s = Arc::new(store().await);

  for round in 0..50 {
    let a = s.add_gate(NewGate::new("A", format!("a-{round}"))).await.unwrap();
    let b = s.add_gate(NewGate::new("B", format!("b-{round}"))).await.unwrap();

    let forward = tokio::spawn({
      let s = Arc::clone(&s);
      async move { s.set_gate_dependency(a.gate_id, Some(b.gate_id)).await }
    });
    let backward = tokio::spawn({
      let s = Arc::clone(&s);
      async move { s.set_gate_dependency(b.gate_id, Some(a.gate_id)).await }
    });
    let results = [forward.await.unwrap(), backward.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "round {round}");
    let refused = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(core_err(refused), gatehouse_core::Error::DependencyCycle(_)));

    let a = s.get_gate(a.gate_id).await.unwrap().unwrap();
    let b = s.get_gate(b.gate_id).await.unwrap().unwrap();
    assert!(
      !(a.dependency_id == Some(b.gate_id) && b.dependency_id == Some(a.gate_id)),
      "round {round} left a loop between A and B"
    );
  }
}

#[tokio::test]
async fn delete_gate_refuses_dependents_and_history() {
  let s = store().await;
  let main = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pool = s.add_gate(NewGate::new("Pool", "pool").depends_on(main.gate_id)).await.unwrap();

  let err = s.delete_gate(main.gate_id).await.unwrap_err();
  assert!(matches!(core_err(err), gatehouse_core::Error::GateHasDependents(id) if id == main.gate_id));

  let pass = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();
  let resident = Owner::resident(Uuid::new_v4());
  s.commit_scan(ScanCommit {
    event:           NewGateEvent {
      gate_id:       pool.gate_id,
      owner:         resident,
      gate_pass_id:  pass.pass_id,
      checkin_time:  Some(Utc::now()),
      checkout_time: None,
      scanned_by:    None,
    },
    expected_status: PassStatus::Pending,
    expected_uses:   0,
    next_status:     PassStatus::CheckedIn,
    increment:       true,
    visitor_status:  None,
  })
  .await
  .unwrap()
  .unwrap();

  let err = s.delete_gate(pool.gate_id).await.unwrap_err();
  assert!(matches!(core_err(err), gatehouse_core::Error::GateHasHistory(_)));

  let spare = s.add_gate(NewGate::new("Spare", "spare")).await.unwrap();
  s.delete_gate(spare.gate_id).await.unwrap();
  assert!(s.get_gate(spare.gate_id).await.unwrap().is_none());
}

// ─── Passes ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn issue_pass_generates_a_code() {
  let s = store().await;
  let house = Uuid::new_v4();

  let pass = s.issue_pass(NewGatePass::new(house)).await.unwrap();
  assert_eq!(pass.code.len(), CODE_LEN);
  assert_eq!(pass.status, PassStatus::Pending);
  assert_eq!(pass.uses_count, 0);

  let by_code = s.get_pass_by_code(&pass.code).await.unwrap().unwrap();
  assert_eq!(by_code.pass_id, pass.pass_id);
  assert!(s.get_pass_by_code("NOPE2345").await.unwrap().is_none());
}

#[tokio::test]
async fn pass_round_trips_optional_limits() {
  let s = store().await;
  let valid_to = Utc::now() + Duration::hours(4);

  let pass = s
    .issue_pass(NewGatePass { max_uses: Some(3), valid_to: Some(valid_to), ..NewGatePass::new(Uuid::new_v4()) })
    .await
    .unwrap();

  let fetched = s.get_pass(pass.pass_id).await.unwrap().unwrap();
  assert_eq!(fetched.max_uses, Some(3));
  assert_eq!(fetched.valid_to.map(|t| t.timestamp()), Some(valid_to.timestamp()));
}

#[tokio::test]
async fn list_passes_filters_by_house() {
  let s = store().await;
  let house = Uuid::new_v4();
  let first = s.issue_pass(NewGatePass::new(house)).await.unwrap();
  s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();
  let second = s.issue_pass(NewGatePass::new(house)).await.unwrap();

  let mine = s.list_passes(Some(house)).await.unwrap();
  assert_eq!(mine.iter().map(|p| p.pass_id).collect::<Vec<_>>(), vec![
    first.pass_id,
    second.pass_id
  ]);
  assert_eq!(s.list_passes(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn set_pass_status_on_missing_pass_fails() {
  let s = store().await;
  let err = s.set_pass_status(Uuid::new_v4(), PassStatus::Expired).await.unwrap_err();
  assert!(matches!(core_err(err), gatehouse_core::Error::PassNotFound(_)));
}

// ─── Visitors ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn visitors_belong_to_a_pass() {
  let s = store().await;
  let pass = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();

  let ada = s
    .add_visitor(pass.pass_id, NewVisitor { email: Some("ada@example.com".into()), ..NewVisitor::new("Ada") })
    .await
    .unwrap();
  s.add_visitor(pass.pass_id, NewVisitor::new("Grace")).await.unwrap();

  let fetched = s.get_visitor(ada.visitor_id).await.unwrap().unwrap();
  assert_eq!(fetched, ada);
  assert_eq!(fetched.status, VisitorStatus::Pending);

  let names: Vec<_> =
    s.list_visitors(pass.pass_id).await.unwrap().into_iter().map(|v| v.name).collect();
  assert_eq!(names, vec!["Ada", "Grace"]);

  let err = s.add_visitor(Uuid::new_v4(), NewVisitor::new("Nobody")).await.unwrap_err();
  assert!(matches!(core_err(err), gatehouse_core::Error::PassNotFound(_)));
}

// ─── Scan commits ────────────────────────────────────────────────────────────

#[tokio::test]
async fn stale_commit_writes_nothing() {
  let s = store().await;
  let gate = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();

  let commit = |expected_uses| ScanCommit {
    event: NewGateEvent {
      gate_id:       gate.gate_id,
      owner:         Owner::resident(Uuid::new_v4()),
      gate_pass_id:  pass.pass_id,
      checkin_time:  Some(Utc::now()),
      checkout_time: None,
      scanned_by:    None,
    },
    expected_status: PassStatus::Pending,
    expected_uses,
    next_status: PassStatus::CheckedIn,
    increment: true,
    visitor_status: None,
  };

  assert!(s.commit_scan(commit(1)).await.unwrap().is_none());
  assert!(s.list_events(pass.pass_id).await.unwrap().is_empty());

  assert!(s.commit_scan(commit(0)).await.unwrap().is_some());
  // The pass has moved on; replaying the same expectation loses.
  assert!(s.commit_scan(commit(0)).await.unwrap().is_none());

  let pass = s.get_pass(pass.pass_id).await.unwrap().unwrap();
  assert_eq!(pass.status, PassStatus::CheckedIn);
  assert_eq!(pass.uses_count, 1);
  assert_eq!(s.list_events(pass.pass_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn commit_never_exceeds_max_uses() {
  let s = store().await;
  let gate = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = s
    .issue_pass(NewGatePass { max_uses: Some(0), ..NewGatePass::new(Uuid::new_v4()) })
    .await
    .unwrap();

  let applied = s
    .commit_scan(ScanCommit {
      event:           NewGateEvent {
        gate_id:       gate.gate_id,
        owner:         Owner::resident(Uuid::new_v4()),
        gate_pass_id:  pass.pass_id,
        checkin_time:  Some(Utc::now()),
        checkout_time: None,
        scanned_by:    None,
      },
      expected_status: PassStatus::Pending,
      expected_uses:   0,
      next_status:     PassStatus::CheckedIn,
      increment:       true,
      visitor_status:  None,
    })
    .await
    .unwrap();
  assert!(applied.is_none());
}

// ─── Gatekeeper ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn check_in_then_out_completes_single_use_pass() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let gate = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = s
    .issue_pass(NewGatePass { max_uses: Some(1), ..NewGatePass::new(Uuid::new_v4()) })
    .await
    .unwrap();
  let visitor = s.add_visitor(pass.pass_id, NewVisitor::new("Ada")).await.unwrap();
  let owner = Owner::visitor(visitor.visitor_id);

  let outcome =
    gk.admit(scan(gate.gate_id, owner, pass.pass_id, ScanAction::CheckIn)).await.unwrap();
  let ScanOutcome::Admitted { event, pass_status, uses_count } = outcome else {
    panic!("check-in rejected: {outcome:?}");
  };
  assert_eq!(pass_status, PassStatus::CheckedIn);
  assert_eq!(uses_count, 1);
  assert!(event.checkin_time.is_some());
  assert_eq!(event.scanned_by.as_deref(), Some("guard-1"));
  assert_eq!(
    s.get_visitor(visitor.visitor_id).await.unwrap().unwrap().status,
    VisitorStatus::CheckedIn
  );

  let outcome =
    gk.admit(scan(gate.gate_id, owner, pass.pass_id, ScanAction::CheckOut)).await.unwrap();
  let ScanOutcome::Admitted { event: out, pass_status, .. } = outcome else {
    panic!("check-out rejected: {outcome:?}");
  };
  assert_eq!(pass_status, PassStatus::Completed);
  assert_eq!(out.checkin_time, event.checkin_time);
  assert!(out.checkout_time.is_some());
  assert_eq!(
    s.get_visitor(visitor.visitor_id).await.unwrap().unwrap().status,
    VisitorStatus::CheckedOut
  );

  let outcome =
    gk.admit(scan(gate.gate_id, owner, pass.pass_id, ScanAction::CheckIn)).await.unwrap();
  assert_eq!(outcome.rejection(), Some(&Rejection::PassCompleted));

  // Events are append-only: the check-out is a second row.
  assert_eq!(s.list_events(pass.pass_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_check_ins_respect_the_quota() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let gate = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = s
    .issue_pass(NewGatePass { max_uses: Some(1), ..NewGatePass::new(Uuid::new_v4()) })
    .await
    .unwrap();
  let ada = s.add_visitor(pass.pass_id, NewVisitor::new("Ada")).await.unwrap();
  let grace = s.add_visitor(pass.pass_id, NewVisitor::new("Grace")).await.unwrap();

  let (first, second) = tokio::join!(
    gk.admit(scan(gate.gate_id, Owner::visitor(ada.visitor_id), pass.pass_id, ScanAction::CheckIn)),
    gk.admit(scan(gate.gate_id, Owner::visitor(grace.visitor_id), pass.pass_id, ScanAction::CheckIn)),
  );
  let outcomes = [first.unwrap(), second.unwrap()];

  assert_eq!(outcomes.iter().filter(|o| o.is_admitted()).count(), 1);
  assert!(
    outcomes
      .iter()
      .any(|o| o.rejection() == Some(&Rejection::QuotaExhausted { max_uses: 1 }))
  );

  let pass = s.get_pass(pass.pass_id).await.unwrap().unwrap();
  assert_eq!(pass.uses_count, 1);
  assert_eq!(s.list_events(pass.pass_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_scans_from_separate_gatekeepers_respect_the_quota() {
  // Two gatekeepers share the database but not a lock table, so the
  // compare-and-set in the store is what keeps the quota.
  let shared = Arc::new(store().await);
  let a = Gatekeeper::new(Arc::clone(&shared));
  let b = Gatekeeper::new(Arc::clone(&shared));

  let gate = shared.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = shared
    .issue_pass(NewGatePass { max_uses: Some(1), ..NewGatePass::new(Uuid::new_v4()) })
    .await
    .unwrap();
  let r1 = Owner::resident(Uuid::new_v4());
  let r2 = Owner::resident(Uuid::new_v4());

  let (first, second) = tokio::join!(
    a.admit(scan(gate.gate_id, r1, pass.pass_id, ScanAction::CheckIn)),
    b.admit(scan(gate.gate_id, r2, pass.pass_id, ScanAction::CheckIn)),
  );
  let admitted = [first.unwrap(), second.unwrap()].iter().filter(|o| o.is_admitted()).count();
  assert_eq!(admitted, 1);
  assert_eq!(shared.get_pass(pass.pass_id).await.unwrap().unwrap().uses_count, 1);
}

#[tokio::test]
async fn dependency_must_be_cleared_first() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let a = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let b = s.add_gate(NewGate::new("Block B", "block-b").depends_on(a.gate_id)).await.unwrap();
  let pass = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();
  let resident = Owner::resident(Uuid::new_v4());

  let outcome =
    gk.admit(scan(b.gate_id, resident, pass.pass_id, ScanAction::CheckIn)).await.unwrap();
  assert_eq!(
    outcome.rejection(),
    Some(&Rejection::DependencyNotCleared { gate: b.gate_ref(), ancestor: a.gate_ref() })
  );
  assert!(s.list_events(pass.pass_id).await.unwrap().is_empty());

  assert!(
    gk.admit(scan(a.gate_id, resident, pass.pass_id, ScanAction::CheckIn))
      .await
      .unwrap()
      .is_admitted()
  );
  assert!(
    gk.admit(scan(b.gate_id, resident, pass.pass_id, ScanAction::CheckIn))
      .await
      .unwrap()
      .is_admitted()
  );
}

#[tokio::test]
async fn expired_pass_is_rejected_and_persisted() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let gate = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = s
    .issue_pass(NewGatePass {
      valid_from: Some(Utc::now() - Duration::days(2)),
      valid_to: Some(Utc::now() - Duration::days(1)),
      max_uses: Some(5),
      ..NewGatePass::new(Uuid::new_v4())
    })
    .await
    .unwrap();

  let outcome = gk
    .admit(scan(gate.gate_id, Owner::resident(Uuid::new_v4()), pass.pass_id, ScanAction::CheckIn))
    .await
    .unwrap();
  assert_eq!(outcome.rejection(), Some(&Rejection::PassExpired));
  assert_eq!(s.get_pass(pass.pass_id).await.unwrap().unwrap().status, PassStatus::Expired);
}

#[tokio::test]
async fn future_dated_scan_cannot_expire_a_live_pass() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let gate = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = s
    .issue_pass(NewGatePass {
      valid_to: Some(Utc::now() + Duration::days(1)),
      ..NewGatePass::new(Uuid::new_v4())
    })
    .await
    .unwrap();
  let resident = Owner::resident(Uuid::new_v4());

  let mut far_ahead = scan(gate.gate_id, resident, pass.pass_id, ScanAction::CheckIn);
  far_ahead.timestamp = Utc::now() + Duration::days(365);
  let outcome = gk.admit(far_ahead.clone()).await.unwrap();
  assert_eq!(outcome.rejection(), Some(&Rejection::ClockSkew { timestamp: far_ahead.timestamp }));

  let stored = s.get_pass(pass.pass_id).await.unwrap().unwrap();
  assert_eq!(stored.status, PassStatus::Pending);
  assert!(s.list_events(pass.pass_id).await.unwrap().is_empty());

  assert!(
    gk.admit(scan(gate.gate_id, resident, pass.pass_id, ScanAction::CheckIn))
      .await
      .unwrap()
      .is_admitted()
  );
}

#[tokio::test]
async fn backdated_scan_does_not_revive_an_expired_pass() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let gate = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = s
    .issue_pass(NewGatePass {
      valid_from: Some(Utc::now() - Duration::days(1)),
      valid_to: Some(Utc::now() - Duration::seconds(30)),
      ..NewGatePass::new(Uuid::new_v4())
    })
    .await
    .unwrap();

  // Within the allowed drift and before `valid_to`, but the pass is already
  // over by the gatehouse clock.
  let mut backdated =
    scan(gate.gate_id, Owner::resident(Uuid::new_v4()), pass.pass_id, ScanAction::CheckIn);
  backdated.timestamp = Utc::now() - Duration::seconds(60);
  let outcome = gk.admit(backdated).await.unwrap();

  assert_eq!(outcome.rejection(), Some(&Rejection::PassExpired));
  assert_eq!(s.get_pass(pass.pass_id).await.unwrap().unwrap().status, PassStatus::Expired);

  let mut far_behind =
    scan(gate.gate_id, Owner::resident(Uuid::new_v4()), pass.pass_id, ScanAction::CheckIn);
  far_behind.timestamp = Utc::now() - Duration::days(30);
  assert!(matches!(gk.admit(far_behind).await.unwrap().rejection(), Some(Rejection::ClockSkew { .. })));
}

#[tokio::test]
async fn check_out_without_check_in_is_rejected() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let gate = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();

  let outcome = gk
    .admit(scan(gate.gate_id, Owner::resident(Uuid::new_v4()), pass.pass_id, ScanAction::CheckOut))
    .await
    .unwrap();
  assert_eq!(
    outcome.rejection(),
    Some(&Rejection::InvalidTransition { status: PassStatus::Pending, action: ScanAction::CheckOut })
  );
}

#[tokio::test]
async fn unknown_visitor_is_not_on_the_pass() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let gate = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();
  let other = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();
  let stranger = s.add_visitor(other.pass_id, NewVisitor::new("Mallory")).await.unwrap();

  let outcome = gk
    .admit(scan(gate.gate_id, Owner::visitor(stranger.visitor_id), pass.pass_id, ScanAction::CheckIn))
    .await
    .unwrap();
  assert_eq!(outcome.rejection(), Some(&Rejection::OwnerNotOnPass { owner_id: stranger.visitor_id }));
}

#[tokio::test]
async fn revoke_cascades_to_visitors() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let gate = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let pass = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();
  let ada = s.add_visitor(pass.pass_id, NewVisitor::new("Ada")).await.unwrap();

  let revoked = gk.revoke(pass.pass_id).await.unwrap();
  assert_eq!(revoked.status, PassStatus::Revoked);
  assert_eq!(s.get_visitor(ada.visitor_id).await.unwrap().unwrap().status, VisitorStatus::Revoked);

  let outcome = gk
    .admit(scan(gate.gate_id, Owner::visitor(ada.visitor_id), pass.pass_id, ScanAction::CheckIn))
    .await
    .unwrap();
  assert_eq!(outcome.rejection(), Some(&Rejection::PassRevoked));

  let err = gk.revoke(pass.pass_id).await.unwrap_err();
  assert!(matches!(core_err(err), gatehouse_core::Error::PassTerminal { .. }));
}

#[tokio::test]
async fn sweep_expires_only_due_passes() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let now = Utc::now();

  let due = s
    .issue_pass(NewGatePass {
      valid_from: Some(now - Duration::hours(3)),
      valid_to: Some(now - Duration::hours(1)),
      ..NewGatePass::new(Uuid::new_v4())
    })
    .await
    .unwrap();
  let open = s
    .issue_pass(NewGatePass { valid_to: Some(now + Duration::hours(1)), ..NewGatePass::new(Uuid::new_v4()) })
    .await
    .unwrap();
  let endless = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();

  let expired = gk.sweep_expired(now).await.unwrap();
  assert_eq!(expired, vec![due.pass_id]);

  assert_eq!(s.get_pass(due.pass_id).await.unwrap().unwrap().status, PassStatus::Expired);
  assert_eq!(s.get_pass(open.pass_id).await.unwrap().unwrap().status, PassStatus::Pending);
  assert_eq!(s.get_pass(endless.pass_id).await.unwrap().unwrap().status, PassStatus::Pending);

  assert!(gk.sweep_expired(now).await.unwrap().is_empty());
}

#[tokio::test]
async fn access_tree_follows_the_owner() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let main = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  let block = s.add_gate(NewGate::new("Block B", "block-b").depends_on(main.gate_id)).await.unwrap();
  let pool = s.add_gate(NewGate::new("Pool", "pool").depends_on(block.gate_id)).await.unwrap();
  let pass = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();
  let resident = Owner::resident(Uuid::new_v4());

  assert!(
    gk.admit(scan(main.gate_id, resident, pass.pass_id, ScanAction::CheckIn))
      .await
      .unwrap()
      .is_admitted()
  );

  let tree = gk.access_tree(pass.pass_id, resident, Utc::now()).await.unwrap();
  let order: Vec<_> = tree.main_path.iter().map(|e| (e.id(), e.status)).collect();
  assert_eq!(order, vec![
    (main.gate_id, GateStatus::CheckedIn),
    (block.gate_id, GateStatus::Pending),
    (pool.gate_id, GateStatus::Locked),
  ]);
  assert!(tree.branches.is_empty());
  assert_eq!(tree.next_gate().map(|e| e.id()), Some(block.gate_id));

  // Another owner on the same pass has cleared nothing.
  let guest = Owner::resident(Uuid::new_v4());
  let tree = gk.access_tree(pass.pass_id, guest, Utc::now()).await.unwrap();
  assert_eq!(tree.next_gate().map(|e| e.id()), Some(main.gate_id));
}

#[tokio::test]
async fn revoked_pass_tree_is_all_branches() {
  let gk = gatekeeper().await;
  let s = gk.store();
  let main = s.add_gate(NewGate::new("Main Gate", "main").default_gate()).await.unwrap();
  s.add_gate(NewGate::new("Pool", "pool").depends_on(main.gate_id)).await.unwrap();
  let pass = s.issue_pass(NewGatePass::new(Uuid::new_v4())).await.unwrap();
  gk.revoke(pass.pass_id).await.unwrap();

  let tree = gk.access_tree(pass.pass_id, Owner::resident(Uuid::new_v4()), Utc::now()).await.unwrap();
  assert!(tree.main_path.is_empty());
  assert_eq!(tree.len(), 2);
  assert!(
    tree
      .branches
      .values()
      .flatten()
      .all(|e| e.status == GateStatus::Unavailable)
  );
  assert!(tree.branches.contains_key(&BranchAnchor::Root));
}
