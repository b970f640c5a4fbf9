//! Scan admission and ad-hoc access resolution.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/scans` | Body: [`ScanBody`]; 201 when admitted, 422 when rejected |
//! | `POST` | `/access/resolve` | Body: [`AccessSnapshot`]; returns the resolved [`AccessTree`] |
//!
//! A rejected scan is a normal outcome, not an error: the body is the
//! [`ScanOutcome`] with its machine-readable `reason`.

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use gatehouse_core::{
  Error as CoreError,
  event::{Owner, ScanAction},
  gatekeeper::{Gatekeeper, ScanOutcome, ScanRequest, resolve_logged},
  resolver::AccessTree,
  status::AccessSnapshot,
  store::GateStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

/// A scan as posted by a gate terminal. `timestamp` defaults to the time
/// the request is handled; one too far from the server clock is rejected
/// with `clock_skew`.
#[derive(Debug, Deserialize)]
pub struct ScanBody {
  pub gate_id:      Uuid,
  #[serde(flatten)]
  pub owner:        Owner,
  pub gate_pass_id: Uuid,
  pub action:       ScanAction,
  #[serde(default)]
  pub timestamp:    Option<DateTime<Utc>>,
  #[serde(default)]
  pub scanned_by:   Option<String>,
}

impl From<ScanBody> for ScanRequest {
  fn from(body: ScanBody) -> Self {
    Self {
      gate_id:      body.gate_id,
      owner:        body.owner,
      gate_pass_id: body.gate_pass_id,
      action:       body.action,
      timestamp:    body.timestamp.unwrap_or_else(Utc::now),
      scanned_by:   body.scanned_by,
    }
  }
}

/// `POST /scans`
pub async fn admit<S>(
  State(gk): State<Gatekeeper<S>>,
  Json(body): Json<ScanBody>,
) -> Result<(StatusCode, Json<ScanOutcome>), ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  let outcome = gk.admit(body.into()).await.map_err(ApiError::from_store)?;
  let status = if outcome.is_admitted() {
    StatusCode::CREATED
  } else {
    StatusCode::UNPROCESSABLE_ENTITY
  };
  Ok((status, Json(outcome)))
}

/// `POST /access/resolve`
pub async fn resolve(Json(snapshot): Json<AccessSnapshot>) -> Json<AccessTree> {
  Json(resolve_logged(&snapshot.dependency_map))
}
