//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings, and
//! status enums their snake_case names.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use gatehouse_core::{
  event::{GateEvent, Owner, OwnerKind},
  gate::Gate,
  pass::{GatePass, PassStatus, Visitor, VisitorStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

/// Parse a snake_case status column.
pub fn decode_status<T: FromStr>(s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Core(gatehouse_core::Error::UnknownStatus(s.to_owned())))
}

// ─── Column lists ────────────────────────────────────────────────────────────

pub const GATE_COLUMNS: &str = "gate_id, name, slug, is_default, dependency_id, created_at";

pub const PASS_COLUMNS: &str =
  "pass_id, code, status, valid_from, valid_to, max_uses, uses_count, house_id, created_at";

pub const VISITOR_COLUMNS: &str =
  "visitor_id, gate_pass_id, name, email, phone, pass_code_suffix, status";

pub const EVENT_COLUMNS: &str = "event_id, gate_id, owner_type, owner_id, gate_pass_id, \
                                 checkin_time, checkout_time, scanned_by, created_at";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `gates` row.
pub struct RawGate {
  pub gate_id:       String,
  pub name:          String,
  pub slug:          String,
  pub is_default:    bool,
  pub dependency_id: Option<String>,
  pub created_at:    String,
}

impl RawGate {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      gate_id:       row.get(0)?,
      name:          row.get(1)?,
      slug:          row.get(2)?,
      is_default:    row.get(3)?,
      dependency_id: row.get(4)?,
      created_at:    row.get(5)?,
    })
  }

  pub fn into_gate(self) -> Result<Gate> {
    Ok(Gate {
      gate_id:       decode_uuid(&self.gate_id)?,
      name:          self.name,
      slug:          self.slug,
      is_default:    self.is_default,
      dependency_id: self.dependency_id.as_deref().map(decode_uuid).transpose()?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `gate_passes` row.
pub struct RawPass {
  pub pass_id:    String,
  pub code:       String,
  pub status:     String,
  pub valid_from: String,
  pub valid_to:   Option<String>,
  pub max_uses:   Option<u32>,
  pub uses_count: u32,
  pub house_id:   String,
  pub created_at: String,
}

impl RawPass {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      pass_id:    row.get(0)?,
      code:       row.get(1)?,
      status:     row.get(2)?,
      valid_from: row.get(3)?,
      valid_to:   row.get(4)?,
      max_uses:   row.get(5)?,
      uses_count: row.get(6)?,
      house_id:   row.get(7)?,
      created_at: row.get(8)?,
    })
  }

  pub fn into_pass(self) -> Result<GatePass> {
    Ok(GatePass {
      pass_id:    decode_uuid(&self.pass_id)?,
      code:       self.code,
      status:     decode_status::<PassStatus>(&self.status)?,
      valid_from: decode_dt(&self.valid_from)?,
      valid_to:   decode_opt_dt(self.valid_to.as_deref())?,
      max_uses:   self.max_uses,
      uses_count: self.uses_count,
      house_id:   decode_uuid(&self.house_id)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `visitors` row.
pub struct RawVisitor {
  pub visitor_id:       String,
  pub gate_pass_id:     String,
  pub name:             String,
  pub email:            Option<String>,
  pub phone:            Option<String>,
  pub pass_code_suffix: Option<String>,
  pub status:           String,
}

impl RawVisitor {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      visitor_id:       row.get(0)?,
      gate_pass_id:     row.get(1)?,
      name:             row.get(2)?,
      email:            row.get(3)?,
      phone:            row.get(4)?,
      pass_code_suffix: row.get(5)?,
      status:           row.get(6)?,
    })
  }

  pub fn into_visitor(self) -> Result<Visitor> {
    Ok(Visitor {
      visitor_id:       decode_uuid(&self.visitor_id)?,
      gate_pass_id:     decode_uuid(&self.gate_pass_id)?,
      name:             self.name,
      email:            self.email,
      phone:            self.phone,
      pass_code_suffix: self.pass_code_suffix,
      status:           decode_status::<VisitorStatus>(&self.status)?,
    })
  }
}

/// Raw values read directly from a `gate_events` row.
pub struct RawEvent {
  pub event_id:      String,
  pub gate_id:       String,
  pub owner_type:    String,
  pub owner_id:      String,
  pub gate_pass_id:  String,
  pub checkin_time:  Option<String>,
  pub checkout_time: Option<String>,
  pub scanned_by:    Option<String>,
  pub created_at:    String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:      row.get(0)?,
      gate_id:       row.get(1)?,
      owner_type:    row.get(2)?,
      owner_id:      row.get(3)?,
      gate_pass_id:  row.get(4)?,
      checkin_time:  row.get(5)?,
      checkout_time: row.get(6)?,
      scanned_by:    row.get(7)?,
      created_at:    row.get(8)?,
    })
  }

  pub fn into_event(self) -> Result<GateEvent> {
    Ok(GateEvent {
      event_id:      decode_uuid(&self.event_id)?,
      gate_id:       decode_uuid(&self.gate_id)?,
      owner:         Owner {
        kind: decode_status::<OwnerKind>(&self.owner_type)?,
        id:   decode_uuid(&self.owner_id)?,
      },
      gate_pass_id:  decode_uuid(&self.gate_pass_id)?,
      checkin_time:  decode_opt_dt(self.checkin_time.as_deref())?,
      checkout_time: decode_opt_dt(self.checkout_time.as_deref())?,
      scanned_by:    self.scanned_by,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}
