//! Read-only view over the gate dependency forest.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::{Error, Result, gate::Gate};

/// Id-indexed gates with parent-pointer walks.
#[derive(Debug, Clone, Default)]
pub struct GateGraph {
  gates: Vec<Gate>,
  index: HashMap<Uuid, usize>,
}

impl GateGraph {
  pub fn new(gates: impl IntoIterator<Item = Gate>) -> Self {
    let gates: Vec<Gate> = gates.into_iter().collect();
    let index = gates.iter().enumerate().map(|(i, g)| (g.gate_id, i)).collect();
    Self { gates, index }
  }

  pub fn get(&self, gate_id: &Uuid) -> Option<&Gate> {
    self.index.get(gate_id).map(|&i| &self.gates[i])
  }

  pub fn gates(&self) -> &[Gate] { &self.gates }

  /// Gates whose dependency is `gate_id`.
  pub fn children(&self, gate_id: Uuid) -> impl Iterator<Item = &Gate> + '_ {
    self
      .gates
      .iter()
      .filter(move |g| g.dependency_id == Some(gate_id) && g.gate_id != gate_id)
  }

  /// The dependency chain above `gate_id`, root first, excluding the gate
  /// itself. A dependency id with no matching gate ends the chain.
  pub fn ancestors(&self, gate_id: Uuid) -> Result<Vec<&Gate>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([gate_id]);
    let mut next = self.get(&gate_id).and_then(|g| g.dependency_id);

    while let Some(parent_id) = next {
      if !seen.insert(parent_id) {
        return Err(Error::DependencyCycle(parent_id));
      }
      match self.get(&parent_id) {
        Some(parent) => {
          chain.push(parent);
          next = parent.dependency_id;
        }
        None => break,
      }
    }

    chain.reverse();
    Ok(chain)
  }

  /// Whether making `new_parent` the dependency of `child` would close a
  /// loop.
  pub fn would_cycle(&self, child: Uuid, new_parent: Uuid) -> bool {
    let mut seen = HashSet::new();
    let mut cursor = Some(new_parent);
    while let Some(id) = cursor {
      if id == child || !seen.insert(id) {
        return true;
      }
      cursor = self.get(&id).and_then(|g| g.dependency_id);
    }
    false
  }
}
