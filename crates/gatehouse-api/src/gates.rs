//! Handlers for `/gates` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/gates` | Creation order |
//! | `POST`   | `/gates` | Body: [`NewGate`]; returns 201 |
//! | `GET`    | `/gates/:id` | 404 if not found |
//! | `DELETE` | `/gates/:id` | 409 while gates depend on it or scans reference it |
//! | `PUT`    | `/gates/:id/dependency` | Body: `{"dependency_id": "<uuid>" \| null}` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use gatehouse_core::{
  Error as CoreError,
  gate::{Gate, NewGate},
  gatekeeper::Gatekeeper,
  store::GateStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /gates`
pub async fn list<S>(State(gk): State<Gatekeeper<S>>) -> Result<Json<Vec<Gate>>, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  let gates = gk.store().list_gates().await.map_err(ApiError::from_store)?;
  Ok(Json(gates))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /gates`
pub async fn create<S>(
  State(gk): State<Gatekeeper<S>>,
  Json(body): Json<NewGate>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  if body.slug.trim().is_empty() {
    return Err(ApiError::BadRequest("gate slug must not be empty".into()));
  }
  let gate = gk.store().add_gate(body).await.map_err(ApiError::from_store)?;
  tracing::info!(gate_id = %gate.gate_id, slug = %gate.slug, "gate created");
  Ok((StatusCode::CREATED, Json(gate)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /gates/:id`
pub async fn get_one<S>(
  State(gk): State<Gatekeeper<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Gate>, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  let gate = gk
    .store()
    .get_gate(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("gate {id} not found")))?;
  Ok(Json(gate))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /gates/:id`
pub async fn delete_one<S>(
  State(gk): State<Gatekeeper<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  gk.store().delete_gate(id).await.map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Dependency ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DependencyBody {
  #[serde(default)]
  pub dependency_id: Option<Uuid>,
}

/// `PUT /gates/:id/dependency`
pub async fn set_dependency<S>(
  State(gk): State<Gatekeeper<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<DependencyBody>,
) -> Result<Json<Gate>, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  let gate = gk
    .store()
    .set_gate_dependency(id, body.dependency_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(gate))
}
