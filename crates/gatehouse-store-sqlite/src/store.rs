//! [`SqliteStore`]: the SQLite implementation of [`GateStore`].

use std::path::Path;

use chrono::Utc;
use gatehouse_core::{
  Error as CoreError,
  event::{GateEvent, NewGateEvent, Owner, OwnerKind},
  gate::{Gate, NewGate},
  graph::GateGraph,
  pass::{
    GatePass, NewGatePass, NewVisitor, PassStatus, Visitor, VisitorStatus, generate_code,
  },
  store::{GateStore, ScanCommit},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    EVENT_COLUMNS, GATE_COLUMNS, PASS_COLUMNS, RawEvent, RawGate, RawPass, RawVisitor,
    VISITOR_COLUMNS, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

/// How many freshly generated codes to try before giving up on a pass.
const CODE_ATTEMPTS: usize = 5;

/// Domain outcome of a closure run on the connection thread. The outer
/// result carries database failures, the inner one refusals.
type Checked<T> = std::result::Result<T, CoreError>;

/// Refuses a dependency edit naming an unknown gate or closing a loop.
fn check_dependency(graph: &GateGraph, id: Uuid, dependency_id: Option<Uuid>) -> Checked<()> {
  if graph.get(&id).is_none() {
    return Err(CoreError::GateNotFound(id));
  }
  if let Some(parent) = dependency_id {
    if graph.get(&parent).is_none() {
      return Err(CoreError::GateNotFound(parent));
    }
    if graph.would_cycle(id, parent) {
      return Err(CoreError::DependencyCycle(id));
    }
  }
  Ok(())
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Gatehouse store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn require_gate(&self, id: Uuid) -> Result<Gate> {
    self.get_gate(id).await?.ok_or(Error::Core(CoreError::GateNotFound(id)))
  }

  async fn require_pass(&self, id: Uuid) -> Result<GatePass> {
    self.get_pass(id).await?.ok_or(Error::Core(CoreError::PassNotFound(id)))
  }

  async fn query_passes(
    &self,
    sql: String,
    param: Option<String>,
  ) -> Result<Vec<GatePass>> {
    let raws: Vec<RawPass> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = match param {
          Some(p) => stmt.query_map(rusqlite::params![p], RawPass::from_row)?,
          None => stmt.query_map([], RawPass::from_row)?,
        }
        .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPass::into_pass).collect()
  }
}

// ─── GateStore impl ──────────────────────────────────────────────────────────

impl GateStore for SqliteStore {
  type Error = Error;

  // ── Gates ─────────────────────────────────────────────────────────────────

  async fn add_gate(&self, input: NewGate) -> Result<Gate> {
    let gate = Gate {
      gate_id:       Uuid::new_v4(),
      name:          input.name,
      slug:          input.slug,
      is_default:    input.is_default,
      dependency_id: input.dependency_id,
      created_at:    Utc::now(),
    };

    let id_str   = encode_uuid(gate.gate_id);
    let name     = gate.name.clone();
    let slug     = gate.slug.clone();
    let is_def   = gate.is_default;
    let dep      = gate.dependency_id;
    let dep_str  = dep.map(encode_uuid);
    let at_str   = encode_dt(gate.created_at);

    let checked: Checked<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let taken = tx
          .query_row("SELECT 1 FROM gates WHERE slug = ?1", rusqlite::params![slug], |_| {
            Ok(())
          })
          .optional()?
          .is_some();
        if taken {
          return Ok(Err(CoreError::SlugTaken(slug)));
        }

        if let (Some(dep), Some(dep_str)) = (dep, dep_str.as_ref()) {
          let exists = tx
            .query_row(
              "SELECT 1 FROM gates WHERE gate_id = ?1",
              rusqlite::params![dep_str],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if !exists {
            return Ok(Err(CoreError::GateNotFound(dep)));
          }
        }

        tx.execute(
          "INSERT INTO gates (gate_id, name, slug, is_default, dependency_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, name, slug, is_def, dep_str, at_str],
        )?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;
    checked?;

    Ok(gate)
  }

  async fn get_gate(&self, id: Uuid) -> Result<Option<Gate>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawGate> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {GATE_COLUMNS} FROM gates WHERE gate_id = ?1"),
              rusqlite::params![id_str],
              RawGate::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawGate::into_gate).transpose()
  }

  async fn list_gates(&self) -> Result<Vec<Gate>> {
    let raws: Vec<RawGate> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {GATE_COLUMNS} FROM gates ORDER BY rowid"))?;
        let rows = stmt
          .query_map([], RawGate::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGate::into_gate).collect()
  }

  async fn set_gate_dependency(&self, id: Uuid, dependency_id: Option<Uuid>) -> Result<Gate> {
    let id_str  = encode_uuid(id);
    let dep_str = dependency_id.map(encode_uuid);

    // The graph is read and the edge written under one transaction, so two
    // edits that each close half of a loop cannot both pass the check.
    let checked: Result<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let raws = {
          let mut stmt = tx.prepare(&format!("SELECT {GATE_COLUMNS} FROM gates"))?;
          stmt
            .query_map([], RawGate::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let gates = match raws.into_iter().map(RawGate::into_gate).collect::<Result<Vec<_>>>() {
          Ok(gates) => gates,
          Err(e) => return Ok(Err(e)),
        };
        if let Err(refusal) = check_dependency(&GateGraph::new(gates), id, dependency_id) {
          return Ok(Err(refusal.into()));
        }

        tx.execute(
          "UPDATE gates SET dependency_id = ?1 WHERE gate_id = ?2",
          rusqlite::params![dep_str, id_str],
        )?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;
    checked?;

    tracing::info!(gate_id = %id, ?dependency_id, "gate dependency updated");
    self.require_gate(id).await
  }

  async fn delete_gate(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);

    let checked: Checked<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists = tx
          .query_row("SELECT 1 FROM gates WHERE gate_id = ?1", rusqlite::params![id_str], |_| {
            Ok(())
          })
          .optional()?
          .is_some();
        if !exists {
          return Ok(Err(CoreError::GateNotFound(id)));
        }

        let dependents: i64 = tx.query_row(
          "SELECT COUNT(*) FROM gates WHERE dependency_id = ?1 AND gate_id != ?1",
          rusqlite::params![id_str],
          |r| r.get(0),
        )?;
        if dependents > 0 {
          return Ok(Err(CoreError::GateHasDependents(id)));
        }

        let history: i64 = tx.query_row(
          "SELECT COUNT(*) FROM gate_events WHERE gate_id = ?1",
          rusqlite::params![id_str],
          |r| r.get(0),
        )?;
        if history > 0 {
          return Ok(Err(CoreError::GateHasHistory(id)));
        }

        tx.execute("DELETE FROM gates WHERE gate_id = ?1", rusqlite::params![id_str])?;
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;
    checked?;

    tracing::info!(gate_id = %id, "gate deleted");
    Ok(())
  }

  // ── Passes ────────────────────────────────────────────────────────────────

  async fn issue_pass(&self, input: NewGatePass) -> Result<GatePass> {
    let now = Utc::now();
    let mut pass = GatePass {
      pass_id:    Uuid::new_v4(),
      code:       String::new(),
      status:     PassStatus::Pending,
      valid_from: input.valid_from.unwrap_or(now),
      valid_to:   input.valid_to,
      max_uses:   input.max_uses,
      uses_count: 0,
      house_id:   input.house_id,
      created_at: now,
    };

    let id_str     = encode_uuid(pass.pass_id);
    let status_str = pass.status.as_ref().to_owned();
    let from_str   = encode_dt(pass.valid_from);
    let to_str     = pass.valid_to.map(encode_dt);
    let max_uses   = pass.max_uses;
    let house_str  = encode_uuid(pass.house_id);
    let at_str     = encode_dt(pass.created_at);

    let code: Option<String> = self
      .conn
      .call(move |conn| {
        for _ in 0..CODE_ATTEMPTS {
          let code = generate_code();
          let taken = conn
            .query_row(
              "SELECT 1 FROM gate_passes WHERE code = ?1",
              rusqlite::params![code],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if taken {
            continue;
          }

          conn.execute(
            "INSERT INTO gate_passes (
               pass_id, code, status, valid_from, valid_to,
               max_uses, uses_count, house_id, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
            rusqlite::params![
              id_str, code, status_str, from_str, to_str, max_uses, house_str, at_str,
            ],
          )?;
          return Ok(Some(code));
        }
        Ok(None)
      })
      .await?;

    pass.code = code.ok_or(Error::CodeCollision)?;
    tracing::info!(pass_id = %pass.pass_id, house_id = %pass.house_id, "pass issued");
    Ok(pass)
  }

  async fn get_pass(&self, id: Uuid) -> Result<Option<GatePass>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawPass> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PASS_COLUMNS} FROM gate_passes WHERE pass_id = ?1"),
              rusqlite::params![id_str],
              RawPass::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPass::into_pass).transpose()
  }

  async fn get_pass_by_code(&self, code: &str) -> Result<Option<GatePass>> {
    let code = code.to_owned();

    let raw: Option<RawPass> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {PASS_COLUMNS} FROM gate_passes WHERE code = ?1"),
              rusqlite::params![code],
              RawPass::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawPass::into_pass).transpose()
  }

  async fn list_passes(&self, house_id: Option<Uuid>) -> Result<Vec<GatePass>> {
    match house_id {
      Some(house) => {
        self
          .query_passes(
            format!("SELECT {PASS_COLUMNS} FROM gate_passes WHERE house_id = ?1 ORDER BY rowid"),
            Some(encode_uuid(house)),
          )
          .await
      }
      None => {
        self
          .query_passes(format!("SELECT {PASS_COLUMNS} FROM gate_passes ORDER BY rowid"), None)
          .await
      }
    }
  }

  async fn set_pass_status(&self, id: Uuid, status: PassStatus) -> Result<GatePass> {
    let id_str     = encode_uuid(id);
    let status_str = status.as_ref().to_owned();
    let revoked    = VisitorStatus::Revoked.as_ref().to_owned();

    let checked: Checked<()> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE gate_passes SET status = ?1 WHERE pass_id = ?2",
          rusqlite::params![status_str, id_str],
        )?;
        if updated == 0 {
          return Ok(Err(CoreError::PassNotFound(id)));
        }
        if status == PassStatus::Revoked {
          tx.execute(
            "UPDATE visitors SET status = ?1 WHERE gate_pass_id = ?2",
            rusqlite::params![revoked, id_str],
          )?;
        }
        tx.commit()?;
        Ok(Ok(()))
      })
      .await?;
    checked?;

    self.require_pass(id).await
  }

  // ── Visitors ──────────────────────────────────────────────────────────────

  async fn add_visitor(&self, pass_id: Uuid, input: NewVisitor) -> Result<Visitor> {
    let visitor = Visitor {
      visitor_id:       Uuid::new_v4(),
      gate_pass_id:     pass_id,
      name:             input.name,
      email:            input.email,
      phone:            input.phone,
      pass_code_suffix: input.pass_code_suffix,
      status:           VisitorStatus::Pending,
    };

    let id_str     = encode_uuid(visitor.visitor_id);
    let pass_str   = encode_uuid(pass_id);
    let name       = visitor.name.clone();
    let email      = visitor.email.clone();
    let phone      = visitor.phone.clone();
    let suffix     = visitor.pass_code_suffix.clone();
    let status_str = visitor.status.as_ref().to_owned();

    let checked: Checked<()> = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM gate_passes WHERE pass_id = ?1",
            rusqlite::params![pass_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(Err(CoreError::PassNotFound(pass_id)));
        }

        conn.execute(
          &format!("INSERT INTO visitors ({VISITOR_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
          rusqlite::params![id_str, pass_str, name, email, phone, suffix, status_str],
        )?;
        Ok(Ok(()))
      })
      .await?;
    checked?;

    Ok(visitor)
  }

  async fn get_visitor(&self, id: Uuid) -> Result<Option<Visitor>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawVisitor> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE visitor_id = ?1"),
              rusqlite::params![id_str],
              RawVisitor::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVisitor::into_visitor).transpose()
  }

  async fn list_visitors(&self, pass_id: Uuid) -> Result<Vec<Visitor>> {
    let pass_str = encode_uuid(pass_id);

    let raws: Vec<RawVisitor> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VISITOR_COLUMNS} FROM visitors WHERE gate_pass_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![pass_str], RawVisitor::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVisitor::into_visitor).collect()
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn list_events(&self, pass_id: Uuid) -> Result<Vec<GateEvent>> {
    let pass_str = encode_uuid(pass_id);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM gate_events WHERE gate_pass_id = ?1 ORDER BY seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![pass_str], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn latest_events(&self, pass_id: Uuid, owner: Owner) -> Result<Vec<GateEvent>> {
    let pass_str  = encode_uuid(pass_id);
    let kind_str  = owner.kind.as_ref().to_owned();
    let owner_str = encode_uuid(owner.id);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM gate_events
           WHERE seq IN (
             SELECT MAX(seq) FROM gate_events
             WHERE gate_pass_id = ?1 AND owner_type = ?2 AND owner_id = ?3
             GROUP BY gate_id
           )
           ORDER BY seq"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![pass_str, kind_str, owner_str], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn commit_scan(&self, commit: ScanCommit) -> Result<Option<GateEvent>> {
    let ScanCommit {
      event: NewGateEvent { gate_id, owner, gate_pass_id, checkin_time, checkout_time, scanned_by },
      expected_status,
      expected_uses,
      next_status,
      increment,
      visitor_status,
    } = commit;

    let event = GateEvent {
      event_id: Uuid::new_v4(),
      gate_id,
      owner,
      gate_pass_id,
      checkin_time,
      checkout_time,
      scanned_by,
      created_at: Utc::now(),
    };

    let pass_str     = encode_uuid(gate_pass_id);
    let next_str     = next_status.as_ref().to_owned();
    let expected_str = expected_status.as_ref().to_owned();
    let inc          = i64::from(increment);
    let event_row    = (
      encode_uuid(event.event_id),
      encode_uuid(event.gate_id),
      event.owner.kind.as_ref().to_owned(),
      encode_uuid(event.owner.id),
      event.checkin_time.map(encode_dt),
      event.checkout_time.map(encode_dt),
      event.scanned_by.clone(),
      encode_dt(event.created_at),
    );
    let visitor_update = visitor_status
      .filter(|_| owner.kind == OwnerKind::Visitor)
      .map(|s| (s.as_ref().to_owned(), encode_uuid(owner.id)));

    let applied: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Compare-and-set: only the writer that saw the current state wins,
        // and the quota ceiling is enforced in the same statement.
        let updated = tx.execute(
          "UPDATE gate_passes
              SET status = ?1, uses_count = uses_count + ?2
            WHERE pass_id = ?3
              AND status = ?4
              AND uses_count = ?5
              AND (max_uses IS NULL OR uses_count + ?2 <= max_uses)",
          rusqlite::params![next_str, inc, pass_str, expected_str, expected_uses],
        )?;
        if updated == 0 {
          return Ok(false);
        }

        let (event_id, gate_id, owner_type, owner_id, checkin, checkout, scanned_by, at) =
          event_row;
        tx.execute(
          &format!(
            "INSERT INTO gate_events ({EVENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
          ),
          rusqlite::params![
            event_id, gate_id, owner_type, owner_id, pass_str, checkin, checkout, scanned_by, at,
          ],
        )?;

        if let Some((status, visitor_id)) = visitor_update {
          tx.execute(
            "UPDATE visitors SET status = ?1 WHERE visitor_id = ?2 AND gate_pass_id = ?3",
            rusqlite::params![status, visitor_id, pass_str],
          )?;
        }

        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(applied.then_some(event))
  }
}
