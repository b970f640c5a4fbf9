//! Gate passes and the visitors attached to them.

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

// ─── Pass status ─────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PassStatus {
  #[default]
  Pending,
  CheckedIn,
  CheckedOut,
  Completed,
  Revoked,
  Expired,
}

impl PassStatus {
  /// Terminal passes accept no further scans.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Revoked | Self::Expired)
  }
}

// ─── Gate pass ───────────────────────────────────────────────────────────────

/// An issued gate pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePass {
  pub pass_id:    Uuid,
  /// Human-shareable issuance code; unique across all passes.
  pub code:       String,
  pub status:     PassStatus,
  pub valid_from: DateTime<Utc>,
  /// `None` means the pass never expires.
  pub valid_to:   Option<DateTime<Utc>>,
  /// `None` means unlimited uses.
  pub max_uses:   Option<u32>,
  /// Incremented once per accepted check-in; never decremented.
  pub uses_count: u32,
  pub house_id:   Uuid,
  pub created_at: DateTime<Utc>,
}

impl GatePass {
  pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
    self.valid_to.is_some_and(|to| now > to)
  }

  pub fn is_not_yet_valid(&self, now: DateTime<Utc>) -> bool {
    now < self.valid_from
  }

  /// `true` once `uses_count` has reached `max_uses`. Always `false` for
  /// unlimited passes.
  pub fn quota_spent(&self) -> bool {
    self.max_uses.is_some_and(|max| self.uses_count >= max)
  }
}

/// Input to [`crate::store::GateStore::issue_pass`]. The code, status and
/// counters are assigned by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewGatePass {
  pub house_id:   Uuid,
  pub valid_from: Option<DateTime<Utc>>,
  pub valid_to:   Option<DateTime<Utc>>,
  pub max_uses:   Option<u32>,
}

impl NewGatePass {
  pub fn new(house_id: Uuid) -> Self {
    Self { house_id, valid_from: None, valid_to: None, max_uses: None }
  }
}

// ─── Codes ───────────────────────────────────────────────────────────────────

/// Unambiguous uppercase alphabet (no `0/O`, `1/I`). Its length divides 256,
/// so `byte % len` is unbiased.
const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LEN: usize = 8;

/// Generate a random pass code from the OS RNG.
pub fn generate_code() -> String {
  let mut bytes = [0u8; CODE_LEN];
  OsRng.fill_bytes(&mut bytes);
  bytes
    .iter()
    .map(|b| CODE_ALPHABET[(*b as usize) % CODE_ALPHABET.len()] as char)
    .collect()
}

// ─── Visitors ────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VisitorStatus {
  #[default]
  Pending,
  CheckedIn,
  CheckedOut,
  InProgress,
  Revoked,
}

/// A named guest travelling on a gate pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
  pub visitor_id:       Uuid,
  pub gate_pass_id:     Uuid,
  pub name:             String,
  pub email:            Option<String>,
  pub phone:            Option<String>,
  /// Per-visitor disambiguator appended to the parent pass code.
  pub pass_code_suffix: Option<String>,
  pub status:           VisitorStatus,
}

impl Visitor {
  /// The code shown to this visitor, e.g. `ABC123-02`. Display only; lookups
  /// always go through the parent pass code.
  pub fn display_code(&self, pass_code: &str) -> String {
    match &self.pass_code_suffix {
      Some(suffix) => format!("{pass_code}-{suffix}"),
      None => pass_code.to_owned(),
    }
  }
}

/// Input to [`crate::store::GateStore::add_visitor`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewVisitor {
  pub name:             String,
  pub email:            Option<String>,
  pub phone:            Option<String>,
  pub pass_code_suffix: Option<String>,
}

impl NewVisitor {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), email: None, phone: None, pass_code_suffix: None }
  }
}
