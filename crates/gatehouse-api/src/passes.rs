//! Handlers for `/passes` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/passes` | Optional `?house_id=<uuid>` |
//! | `POST` | `/passes` | Body: [`NewGatePass`]; returns 201 with the generated code |
//! | `GET`  | `/passes/:id` | 404 if not found |
//! | `GET`  | `/passes/by-code/:code` | Lookup by the code printed on the pass |
//! | `POST` | `/passes/:id/revoke` | 409 if already terminal |
//! | `GET`  | `/passes/:id/visitors` | |
//! | `POST` | `/passes/:id/visitors` | Body: [`NewVisitor`]; returns 201 |
//! | `GET`  | `/passes/:id/events` | Append order |
//! | `GET`  | `/passes/:id/access` | `?owner_type=&owner_id=[&at=]`; resolved [`AccessTree`] |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use gatehouse_core::{
  Error as CoreError,
  event::{GateEvent, Owner, OwnerKind},
  gatekeeper::Gatekeeper,
  pass::{GatePass, NewGatePass, NewVisitor, Visitor},
  resolver::AccessTree,
  store::GateStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

async fn require_pass<S>(gk: &Gatekeeper<S>, id: Uuid) -> Result<GatePass, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  gk.store()
    .get_pass(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("gate pass {id} not found")))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub house_id: Option<Uuid>,
}

/// `GET /passes[?house_id=<uuid>]`
pub async fn list<S>(
  State(gk): State<Gatekeeper<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<GatePass>>, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  let passes = gk.store().list_passes(params.house_id).await.map_err(ApiError::from_store)?;
  Ok(Json(passes))
}

// ─── Issue ────────────────────────────────────────────────────────────────────

/// `POST /passes`
pub async fn issue<S>(
  State(gk): State<Gatekeeper<S>>,
  Json(body): Json<NewGatePass>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  if let (Some(from), Some(to)) = (body.valid_from, body.valid_to)
    && to <= from
  {
    return Err(ApiError::BadRequest("valid_to must be after valid_from".into()));
  }
  let pass = gk.store().issue_pass(body).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(pass)))
}

// ─── Lookup ───────────────────────────────────────────────────────────────────

/// `GET /passes/:id`
pub async fn get_one<S>(
  State(gk): State<Gatekeeper<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<GatePass>, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  Ok(Json(require_pass(&gk, id).await?))
}

/// `GET /passes/by-code/:code`
pub async fn by_code<S>(
  State(gk): State<Gatekeeper<S>>,
  Path(code): Path<String>,
) -> Result<Json<GatePass>, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  let code = code.trim().to_ascii_uppercase();
  let pass = gk
    .store()
    .get_pass_by_code(&code)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("no gate pass with code {code}")))?;
  Ok(Json(pass))
}

// ─── Revoke ───────────────────────────────────────────────────────────────────

/// `POST /passes/:id/revoke`
pub async fn revoke<S>(
  State(gk): State<Gatekeeper<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<GatePass>, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  let pass = gk.revoke(id).await.map_err(ApiError::from_store)?;
  Ok(Json(pass))
}

// ─── Visitors ─────────────────────────────────────────────────────────────────

/// `GET /passes/:id/visitors`
pub async fn list_visitors<S>(
  State(gk): State<Gatekeeper<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Visitor>>, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  require_pass(&gk, id).await?;
  let visitors = gk.store().list_visitors(id).await.map_err(ApiError::from_store)?;
  Ok(Json(visitors))
}

/// `POST /passes/:id/visitors`
pub async fn add_visitor<S>(
  State(gk): State<Gatekeeper<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewVisitor>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  let pass = require_pass(&gk, id).await?;
  if pass.status.is_terminal() {
    let refused = CoreError::PassTerminal { id, status: pass.status };
    return Err(ApiError::Conflict(refused.to_string()));
  }
  let visitor = gk.store().add_visitor(id, body).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(visitor)))
}

// ─── Events ───────────────────────────────────────────────────────────────────

/// `GET /passes/:id/events`
pub async fn list_events<S>(
  State(gk): State<Gatekeeper<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<GateEvent>>, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  require_pass(&gk, id).await?;
  let events = gk.store().list_events(id).await.map_err(ApiError::from_store)?;
  Ok(Json(events))
}

// ─── Access tree ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AccessParams {
  pub owner_type: OwnerKind,
  pub owner_id:   Uuid,
  /// Evaluate validity windows at this instant. Defaults to now.
  pub at:         Option<DateTime<Utc>>,
}

/// `GET /passes/:id/access?owner_type=<kind>&owner_id=<uuid>[&at=<rfc3339>]`
pub async fn access<S>(
  State(gk): State<Gatekeeper<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<AccessParams>,
) -> Result<Json<AccessTree>, ApiError>
where
  S: GateStore,
  S::Error: From<CoreError>,
{
  let owner = Owner { kind: params.owner_type, id: params.owner_id };
  let tree = gk
    .access_tree(id, owner, params.at.unwrap_or_else(Utc::now))
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(tree))
}
