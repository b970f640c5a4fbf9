//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use gatehouse_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error by the domain error somewhere in its source
  /// chain. Anything else is a 500.
  pub fn from_store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    let mut cursor: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(e) = cursor {
      if let Some(core) = e.downcast_ref::<CoreError>() {
        match core {
          CoreError::GateNotFound(_)
          | CoreError::PassNotFound(_)
          | CoreError::VisitorNotFound(_) => return Self::NotFound(core.to_string()),
          CoreError::SlugTaken(_)
          | CoreError::GateHasDependents(_)
          | CoreError::GateHasHistory(_)
          | CoreError::DependencyCycle(_)
          | CoreError::PassTerminal { .. } => return Self::Conflict(core.to_string()),
          CoreError::UnknownStatus(_) => break,
        }
      }
      cursor = e.source();
    }
    Self::Store(Box::new(err))
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
