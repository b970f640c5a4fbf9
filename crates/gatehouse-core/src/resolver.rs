//! Access resolution: turns a flat per-gate status snapshot into the tree
//! shown to an owner.
//!
//! The snapshot only carries parent pointers. [`resolve`] rebuilds a single
//! main path (gates the owner has cleared, is clearing, or may reach) and
//! hangs every `unavailable` gate off the nearest gate already placed. The
//! walk is driven by an explicit visited set over arena slots, so dangling
//! references, self loops and cycles all terminate; none of them is an
//! error here. Use [`diagnose`] to report them.

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  fmt,
  str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::status::{GateStatus, GateStatusEntry, GateStatusMap};

// ─── Output ──────────────────────────────────────────────────────────────────

/// Key of a branch list: the gate it hangs off, or the `"root"` sentinel
/// when nothing has been placed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BranchAnchor {
  Root,
  Gate(Uuid),
}

impl fmt::Display for BranchAnchor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Root => f.write_str("root"),
      Self::Gate(id) => write!(f, "{id}"),
    }
  }
}

impl FromStr for BranchAnchor {
  type Err = uuid::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "root" => Ok(Self::Root),
      other => Ok(Self::Gate(Uuid::parse_str(other)?)),
    }
  }
}

impl Serialize for BranchAnchor {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for BranchAnchor {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// The resolved view of one owner's access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTree {
  /// Gates on the live route, every ancestor before its descendants.
  pub main_path: Vec<GateStatusEntry>,
  /// Gates that could not be placed on the main path.
  pub branches:  BTreeMap<BranchAnchor, Vec<GateStatusEntry>>,
}

impl AccessTree {
  /// The first gate on the main path the owner has not cleared yet.
  pub fn next_gate(&self) -> Option<&GateStatusEntry> {
    self.main_path.iter().find(|e| !e.status.is_cleared())
  }

  /// Number of entries placed across the main path and all branches.
  pub fn len(&self) -> usize {
    self.main_path.len() + self.branches.values().map(Vec::len).sum::<usize>()
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Active gates sort before locked and unavailable ones; the sort is stable,
/// so ties keep input order.
fn rank(status: GateStatus) -> u8 {
  if status.is_active() { 0 } else { 1 }
}

/// Rebuild the access tree for `map`. Pure and deterministic: the same
/// input always produces the same output.
pub fn resolve(map: &GateStatusMap) -> AccessTree {
  let mut resolver = Resolver::new(map);

  let mut roots: Vec<usize> = map
    .iter()
    .enumerate()
    .filter(|(_, e)| e.dependency_id().is_none_or(|dep| !map.contains(&dep)))
    .map(|(slot, _)| slot)
    .collect();
  roots.sort_by_key(|&slot| rank(map.entries()[slot].status));

  for slot in roots {
    resolver.process(slot);
  }

  // Anything still unvisited is disconnected from every root: a cycle, a
  // self loop, or the subtree of an unavailable gate. Each orphan is entered
  // from its highest unvisited ancestor so parents still precede children,
  // or where its cycle closes.
  for slot in 0..map.len() {
    if !resolver.visited[slot] {
      let start = resolver.orphan_head(slot);
      resolver.process(start);
    }
  }

  tracing::debug!(
    gates = map.len(),
    main_path = resolver.tree.main_path.len(),
    branches = resolver.tree.branches.len(),
    "resolved access tree"
  );
  resolver.tree
}

struct Resolver<'a> {
  entries:  &'a [GateStatusEntry],
  map:      &'a GateStatusMap,
  /// Child slots per parent gate id, in input order.
  children: HashMap<Uuid, Vec<usize>>,
  visited:  Vec<bool>,
  tree:     AccessTree,
}

impl<'a> Resolver<'a> {
  fn new(map: &'a GateStatusMap) -> Self {
    let mut children: HashMap<Uuid, Vec<usize>> = HashMap::new();
    for (slot, entry) in map.iter().enumerate() {
      if let Some(parent) = entry.dependency_id() {
        children.entry(parent).or_default().push(slot);
      }
    }

    Self {
      entries: map.entries(),
      map,
      children,
      visited: vec![false; map.len()],
      tree: AccessTree::default(),
    }
  }

  /// Depth-first placement starting at `start`. Equivalent to the recursive
  /// formulation: children are pushed in reverse so the first-ranked child
  /// and its whole subtree are placed before its siblings.
  fn process(&mut self, start: usize) {
    let mut stack = vec![start];

    while let Some(slot) = stack.pop() {
      if self.visited[slot] {
        continue;
      }
      let entry = &self.entries[slot];

      if entry.status == GateStatus::Unavailable {
        let anchor = self.anchor_for(entry);
        self.visited[slot] = true;
        self.tree.branches.entry(anchor).or_default().push(entry.clone());
        continue;
      }

      self.visited[slot] = true;
      self.tree.main_path.push(entry.clone());

      let mut kids: Vec<usize> = self
        .children
        .get(&entry.id())
        .map(|slots| slots.iter().copied().filter(|&c| !self.visited[c]).collect())
        .unwrap_or_default();
      kids.sort_by_key(|&c| rank(self.entries[c].status));
      stack.extend(kids.into_iter().rev());
    }
  }

  /// Climb from `slot` through unvisited, placeable parents. Stops at an
  /// unavailable parent or a missing one. A climb that wraps a cycle enters
  /// it where the chain closes, which is `slot` itself when `slot` is on the
  /// cycle, so cyclic orphans keep their input order.
  fn orphan_head(&self, slot: usize) -> usize {
    let mut head = slot;
    let mut seen = HashSet::from([slot]);

    while let Some(parent) = self.entries[head]
      .dependency_id()
      .and_then(|id| self.map.position(&id))
    {
      if self.visited[parent] || self.entries[parent].status == GateStatus::Unavailable {
        break;
      }
      if !seen.insert(parent) {
        return parent;
      }
      head = parent;
    }
    head
  }

  /// Nearest visited ancestor of `entry`, falling back to the head of the
  /// main path, then to the root sentinel.
  fn anchor_for(&self, entry: &GateStatusEntry) -> BranchAnchor {
    let mut seen = HashSet::new();
    let mut cursor = entry.dependency_id();

    while let Some(id) = cursor {
      if !seen.insert(id) {
        break;
      }
      match self.map.position(&id) {
        Some(slot) if self.visited[slot] => return BranchAnchor::Gate(id),
        Some(slot) => cursor = self.entries[slot].dependency_id(),
        None => break,
      }
    }

    match self.tree.main_path.first() {
      Some(head) => BranchAnchor::Gate(head.id()),
      None => BranchAnchor::Root,
    }
  }
}

// ─── Diagnostics ─────────────────────────────────────────────────────────────

/// A structural problem in a snapshot. The resolver tolerates all of these;
/// callers log them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphAnomaly {
  /// The dependency points at a gate missing from the snapshot.
  DanglingDependency { gate_id: Uuid, missing: Uuid },
  SelfLoop { gate_id: Uuid },
  /// The gate sits on a dependency cycle longer than one.
  Cycle { gate_id: Uuid },
}

impl fmt::Display for GraphAnomaly {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::DanglingDependency { gate_id, missing } => {
        write!(f, "gate {gate_id} depends on unknown gate {missing}")
      }
      Self::SelfLoop { gate_id } => write!(f, "gate {gate_id} depends on itself"),
      Self::Cycle { gate_id } => write!(f, "gate {gate_id} is part of a dependency cycle"),
    }
  }
}

/// Find dangling references, self loops and cycles in `map`, in input
/// order.
pub fn diagnose(map: &GateStatusMap) -> Vec<GraphAnomaly> {
  let mut anomalies = Vec::new();

  for entry in map {
    let id = entry.id();
    let Some(dep) = entry.dependency_id() else { continue };

    if dep == id {
      anomalies.push(GraphAnomaly::SelfLoop { gate_id: id });
      continue;
    }
    if !map.contains(&dep) {
      anomalies.push(GraphAnomaly::DanglingDependency { gate_id: id, missing: dep });
      continue;
    }

    let mut seen = HashSet::from([id]);
    let mut cursor = Some(dep);
    while let Some(current) = cursor {
      if current == id {
        anomalies.push(GraphAnomaly::Cycle { gate_id: id });
        break;
      }
      if !seen.insert(current) {
        break;
      }
      cursor = map.get(&current).and_then(GateStatusEntry::dependency_id);
    }
  }

  anomalies
}
