//! Error types for `gatehouse-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("gate not found: {0}")]
  GateNotFound(Uuid),

  #[error("gate pass not found: {0}")]
  PassNotFound(Uuid),

  #[error("visitor not found: {0}")]
  VisitorNotFound(Uuid),

  #[error("gate slug already in use: {0:?}")]
  SlugTaken(String),

  #[error("gate {0} still has dependent gates")]
  GateHasDependents(Uuid),

  #[error("gate {0} has recorded scans and cannot be deleted")]
  GateHasHistory(Uuid),

  #[error("dependency cycle through gate {0}")]
  DependencyCycle(Uuid),

  #[error("gate pass {id} is already {status}")]
  PassTerminal {
    id:     Uuid,
    status: crate::pass::PassStatus,
  },

  #[error("unknown status value: {0:?}")]
  UnknownStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
