//! HTTP handlers for the reporting API.

use axum::{
  extract::{Query, State},
  http::StatusCode,
  Json,
};
use std::sync::Arc;
use tracing::{error, warn};

use abort_engine::store::SignalFilter;
use abort_engine::Ring;

use crate::annotation::to_annotations;
use crate::date;
use crate::state::AppState;
use crate::types::{AnnotationQuery, Annotations, SearchQuery};

pub async fn health() -> &'static str {
  "ok"
}

/// Incidents whose time lies strictly between `starttime` and `endtime`.
pub async fn annotations(
  State(state): State<Arc<AppState>>,
  Query(q): Query<AnnotationQuery>,
) -> Result<Json<Annotations>, StatusCode> {
  let (Some(start), Some(end)) = (q.starttime.as_deref(), q.endtime.as_deref()) else {
    return Err(StatusCode::BAD_REQUEST);
  };
  let (Some(start), Some(end)) = (date::parse_bound(start), date::parse_bound(end)) else {
    warn!(starttime = start, endtime = end, "annotations: invalid time bound");
    return Err(StatusCode::BAD_REQUEST);
  };

  // Anything but a ring name means both rings.
  let ring = q.entity.as_deref().and_then(Ring::from_str_loose);
  let filter = SignalFilter {
    ring,
    first_per_channel: true,
    incident_after: Some(start),
    incident_before: Some(end),
    ..SignalFilter::default()
  };

  match state.signals.fetch_abort_signals(&filter).await {
    Ok(rows) => Ok(Json(to_annotations(&rows))),
    Err(e) => {
      error!(error = %e, "annotations: db error");
      Err(StatusCode::INTERNAL_SERVER_ERROR)
    }
  }
}

/// Ring names starting with `entity`.
pub async fn search(Query(q): Query<SearchQuery>) -> Result<Json<Vec<&'static str>>, StatusCode> {
  let prefix = q.entity.ok_or(StatusCode::BAD_REQUEST)?;
  let names = [Ring::Ler, Ring::Her]
    .into_iter()
    .map(Ring::as_str)
    .filter(|name| name.starts_with(prefix.as_str()))
    .collect();
  Ok(Json(names))
}
