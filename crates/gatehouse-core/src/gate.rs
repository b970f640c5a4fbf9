//! Gates — the physical checkpoints a pass holder moves through.
//!
//! Each gate names at most one dependency gate that must be cleared before
//! it. Together the gates form a forest of dependency trees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
  pub gate_id:       Uuid,
  pub name:          String,
  /// Unique, URL-safe identifier.
  pub slug:          String,
  /// A default gate may be scanned without clearing any other gate first.
  pub is_default:    bool,
  /// The gate that must be cleared before this one.
  pub dependency_id: Option<Uuid>,
  pub created_at:    DateTime<Utc>,
}

impl Gate {
  pub fn gate_ref(&self) -> GateRef {
    GateRef { id: self.gate_id, name: self.name.clone() }
  }
}

/// Input to [`crate::store::GateStore::add_gate`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewGate {
  pub name:          String,
  pub slug:          String,
  #[serde(default)]
  pub is_default:    bool,
  pub dependency_id: Option<Uuid>,
}

impl NewGate {
  pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
    Self {
      name:          name.into(),
      slug:          slug.into(),
      is_default:    false,
      dependency_id: None,
    }
  }

  pub fn default_gate(mut self) -> Self {
    self.is_default = true;
    self
  }

  pub fn depends_on(mut self, gate_id: Uuid) -> Self {
    self.dependency_id = Some(gate_id);
    self
  }
}

/// Gate identity as carried inside status snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GateRef {
  pub id:   Uuid,
  pub name: String,
}
