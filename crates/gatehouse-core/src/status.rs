//! Per-gate status snapshots — the input to the access resolver.
//!
//! A snapshot is a flat map from gate id to [`GateStatusEntry`], each entry
//! pointing at its dependency gate. The resolver rebuilds the tree from
//! those parent pointers at read time.

use std::{collections::HashMap, fmt};

use serde::{
  Deserialize, Deserializer, Serialize, Serializer,
  de::{MapAccess, SeqAccess, Visitor},
  ser::SerializeSeq as _,
};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{event::GateEvent, gate::GateRef};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Where an owner stands at one gate.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GateStatus {
  CheckedIn,
  CheckedOut,
  Pending,
  /// A dependency gate has not been cleared yet.
  Locked,
  /// The owner cannot use this gate at all.
  Unavailable,
}

impl GateStatus {
  /// Traversal has started here or can start here.
  pub fn is_active(self) -> bool {
    match self {
      Self::CheckedIn | Self::CheckedOut | Self::Pending => true,
      Self::Locked | Self::Unavailable => false,
    }
  }

  /// The owner has passed through this gate.
  pub fn is_cleared(self) -> bool {
    match self {
      Self::CheckedIn | Self::CheckedOut => true,
      Self::Pending | Self::Locked | Self::Unavailable => false,
    }
  }
}

// ─── Entry ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStatusEntry {
  pub gate:            GateRef,
  // TODO: drop the `dependancy_gate` alias once every snapshot producer has
  // migrated to the corrected key.
  #[serde(alias = "dependancy_gate")]
  pub dependency_gate: Option<GateRef>,
  pub status:          GateStatus,
  #[serde(default)]
  pub event:           Option<GateEvent>,
  #[serde(default)]
  pub message:         String,
}

impl GateStatusEntry {
  pub fn new(gate: GateRef, dependency_gate: Option<GateRef>, status: GateStatus) -> Self {
    Self { gate, dependency_gate, status, event: None, message: String::new() }
  }

  pub fn id(&self) -> Uuid { self.gate.id }

  pub fn dependency_id(&self) -> Option<Uuid> {
    self.dependency_gate.as_ref().map(|g| g.id)
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = message.into();
    self
  }

  pub fn with_event(mut self, event: GateEvent) -> Self {
    self.event = Some(event);
    self
  }
}

// ─── Map ─────────────────────────────────────────────────────────────────────

/// An insertion-ordered, id-indexed arena of status entries for one owner.
///
/// Inserting an id that is already present replaces the entry in place, so
/// iteration order is the order in which ids were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateStatusMap {
  entries: Vec<GateStatusEntry>,
  index:   HashMap<Uuid, usize>,
}

impl GateStatusMap {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, entry: GateStatusEntry) {
    match self.index.get(&entry.id()) {
      Some(&i) => self.entries[i] = entry,
      None => {
        self.index.insert(entry.id(), self.entries.len());
        self.entries.push(entry);
      }
    }
  }

  pub fn get(&self, gate_id: &Uuid) -> Option<&GateStatusEntry> {
    self.index.get(gate_id).map(|&i| &self.entries[i])
  }

  pub fn contains(&self, gate_id: &Uuid) -> bool { self.index.contains_key(gate_id) }

  /// Arena slot of `gate_id`, if present.
  pub fn position(&self, gate_id: &Uuid) -> Option<usize> {
    self.index.get(gate_id).copied()
  }

  pub fn entries(&self) -> &[GateStatusEntry] { &self.entries }

  pub fn iter(&self) -> std::slice::Iter<'_, GateStatusEntry> { self.entries.iter() }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl FromIterator<GateStatusEntry> for GateStatusMap {
  fn from_iter<I: IntoIterator<Item = GateStatusEntry>>(iter: I) -> Self {
    let mut map = Self::new();
    for entry in iter {
      map.insert(entry);
    }
    map
  }
}

impl<'a> IntoIterator for &'a GateStatusMap {
  type Item = &'a GateStatusEntry;
  type IntoIter = std::slice::Iter<'a, GateStatusEntry>;

  fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}

/// Serialised as a list of entries in map order.
impl Serialize for GateStatusMap {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
    for entry in &self.entries {
      seq.serialize_element(entry)?;
    }
    seq.end()
  }
}

/// Accepts either a list of entries or an object keyed by gate id. Document
/// order is preserved in both cases; object keys are ignored in favour of
/// each entry's own `gate.id`.
impl<'de> Deserialize<'de> for GateStatusMap {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct MapVisitor;

    impl<'de> Visitor<'de> for MapVisitor {
      type Value = GateStatusMap;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a list of gate status entries or an object keyed by gate id")
      }

      fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut map = GateStatusMap::new();
        while let Some(entry) = seq.next_element::<GateStatusEntry>()? {
          map.insert(entry);
        }
        Ok(map)
      }

      fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = GateStatusMap::new();
        while let Some((_key, entry)) = access.next_entry::<String, GateStatusEntry>()? {
          map.insert(entry);
        }
        Ok(map)
      }
    }

    deserializer.deserialize_any(MapVisitor)
  }
}

// ─── Snapshot envelope ───────────────────────────────────────────────────────

/// The envelope snapshot producers send to `POST /access/resolve`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessSnapshot {
  // TODO: drop the `dependancy_map` alias together with `dependancy_gate`.
  #[serde(alias = "dependancy_map")]
  pub dependency_map: GateStatusMap,
}
