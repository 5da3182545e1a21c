use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::reconciler::{load_history, PlaybackFrame, TrackSummary};
use crate::sample::PositionSample;
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, AuthenticatedUser};
use crate::web::config::Permission;

#[derive(Debug, Serialize, ToSchema)]
pub struct LoadTrackResponse {
    pub track_id: String,
    pub samples: usize,
}

#[derive(Debug, Deserialize)]
pub struct TimeQuery {
    #[serde(deserialize_with = "deserialize_datetime")]
    pub time: DateTime<Utc>,
}

/// Replaces the track with the stored history. The request waits for the
/// fetch; concurrent loads for one track resolve in completion order.
#[utoipa::path(
    post,
    path = "/api/tracks/{id}/load",
    tag = "tracks",
    params(
        ("id" = String, Path, description = "Track ID")
    ),
    responses(
        (status = 200, description = "History installed", body = LoadTrackResponse),
        (status = 400, description = "Invalid track ID", body = ErrorResponse),
        (status = 401, description = "Missing or invalid API key"),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "No history for this track", body = ErrorResponse),
        (status = 502, description = "History could not be read", body = ErrorResponse)
    ),
    security(("api_key" = []))
)]
pub async fn load_track(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> ApiResult<Json<LoadTrackResponse>> {
    require_permission(&user, Permission::LoadTracks)?;

    let samples = load_history(state.history.as_ref(), &state.reconciler, &id)
        .await
        .inspect_err(|e| log::warn!("Loading track {} failed: {}", id, e))?;

    Ok(Json(LoadTrackResponse {
        track_id: id,
        samples,
    }))
}

#[utoipa::path(
    get,
    path = "/api/tracks/{id}",
    tag = "tracks",
    params(
        ("id" = String, Path, description = "Track ID")
    ),
    responses(
        (status = 200, description = "Track summary", body = TrackSummary),
        (status = 404, description = "Track not loaded", body = ErrorResponse)
    )
)]
pub async fn get_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TrackSummary>> {
    state
        .reconciler
        .lock()
        .await
        .track_summary(&id)
        .map(Json)
        .ok_or(ApiError::NotFound("track_not_found"))
}

#[utoipa::path(
    get,
    path = "/api/tracks/{id}/samples/{index}",
    tag = "tracks",
    params(
        ("id" = String, Path, description = "Track ID"),
        ("index" = usize, Path, description = "Zero-based sample index")
    ),
    responses(
        (status = 200, description = "Sample at index", body = PositionSample),
        (status = 404, description = "Track not loaded or index out of range", body = ErrorResponse)
    )
)]
pub async fn get_sample(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<Json<PositionSample>> {
    let reconciler = state.reconciler.lock().await;
    if reconciler.track(&id).is_none() {
        return Err(ApiError::NotFound("track_not_found"));
    }
    reconciler
        .sample_at(&id, index)
        .cloned()
        .map(Json)
        .ok_or(ApiError::NotFound("sample_not_found"))
}

#[utoipa::path(
    get,
    path = "/api/tracks/{id}/scrub",
    tag = "tracks",
    params(
        ("id" = String, Path, description = "Track ID"),
        ("time" = String, Query, description = "Playback time (RFC3339)")
    ),
    responses(
        (status = 200, description = "First sample within one sampling interval", body = PlaybackFrame),
        (status = 400, description = "Missing or invalid time"),
        (status = 404, description = "Track not loaded or no sample near time", body = ErrorResponse)
    )
)]
pub async fn scrub(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TimeQuery>,
) -> ApiResult<Json<PlaybackFrame>> {
    let reconciler = state.reconciler.lock().await;
    if reconciler.track(&id).is_none() {
        return Err(ApiError::NotFound("track_not_found"));
    }
    reconciler
        .scrub(&id, query.time)
        .map(Json)
        .ok_or(ApiError::NotFound("sample_not_found"))
}

#[utoipa::path(
    get,
    path = "/api/tracks/{id}/interpolate",
    tag = "tracks",
    params(
        ("id" = String, Path, description = "Track ID"),
        ("time" = String, Query, description = "Playback time (RFC3339)")
    ),
    responses(
        (status = 200, description = "Position interpolated between bracketing samples", body = PositionSample),
        (status = 400, description = "Missing or invalid time"),
        (status = 404, description = "Track not loaded or time not bracketed", body = ErrorResponse)
    )
)]
pub async fn interpolate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TimeQuery>,
) -> ApiResult<Json<PositionSample>> {
    let reconciler = state.reconciler.lock().await;
    if reconciler.track(&id).is_none() {
        return Err(ApiError::NotFound("track_not_found"));
    }
    reconciler
        .interpolate(&id, query.time)
        .map(Json)
        .ok_or(ApiError::NotFound("sample_not_found"))
}

fn deserialize_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::config::Config;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    const TRACK: &str = r#"[{
        "vehicle": "rover1",
        "coords_array_order": ["lon", "lat", "heading"],
        "times": [["2024-01-01T00:00:00Z", "2024-01-01T00:00:10Z"]],
        "coords": [[[0.0, 0.0, 350.0], [10.0, 20.0, 10.0]]]
    }]"#;

    fn setup() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("rover1.json"), TRACK).unwrap();
        let yaml = format!("history:\n  folder: {}\n", dir.path().display());
        let state = AppState::new(Config::from_yaml(&yaml).unwrap());
        (dir, state)
    }

    fn loader() -> AuthenticatedUser {
        AuthenticatedUser {
            name: "test".into(),
            permissions: HashSet::from([Permission::LoadTracks]),
        }
    }

    fn at(raw: &str) -> Query<TimeQuery> {
        Query(TimeQuery {
            time: DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc),
        })
    }

    async fn load(state: &AppState) {
        let Json(loaded) = load_track(State(state.clone()), loader(), Path("rover1".into()))
            .await
            .unwrap();
        assert_eq!(loaded.samples, 2);
    }

    #[tokio::test]
    async fn load_then_query() {
        let (_dir, state) = setup();
        load(&state).await;

        let Json(summary) = get_track(State(state.clone()), Path("rover1".into()))
            .await
            .unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.interval_estimate_seconds, Some(10.0));

        let Json(sample) = get_sample(State(state.clone()), Path(("rover1".into(), 1)))
            .await
            .unwrap();
        assert_eq!(sample.lon, 10.0);

        let Json(frame) = scrub(
            State(state.clone()),
            Path("rover1".into()),
            at("2024-01-01T00:00:03Z"),
        )
        .await
        .unwrap();
        assert_eq!(frame.index, 0);

        let Json(mid) = interpolate(
            State(state),
            Path("rover1".into()),
            at("2024-01-01T00:00:05Z"),
        )
        .await
        .unwrap();
        assert!((mid.lon - 5.0).abs() < 1e-9);
        assert!((mid.lat - 10.0).abs() < 1e-9);
        // 350 -> 10 crosses north, not south.
        assert!(mid.aux[0].abs() < 1e-9 || (mid.aux[0] - 360.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn queries_distinguish_missing_track_from_missing_sample() {
        let (_dir, state) = setup();
        let missing = get_sample(State(state.clone()), Path(("rover1".into(), 0))).await;
        assert!(matches!(missing, Err(ApiError::NotFound("track_not_found"))));

        load(&state).await;
        let out_of_range = get_sample(State(state.clone()), Path(("rover1".into(), 2))).await;
        assert!(matches!(
            out_of_range,
            Err(ApiError::NotFound("sample_not_found"))
        ));

        let far = scrub(
            State(state),
            Path("rover1".into()),
            at("2024-01-02T00:00:00Z"),
        )
        .await;
        assert!(matches!(far, Err(ApiError::NotFound("sample_not_found"))));
    }

    #[tokio::test]
    async fn loading_unknown_track_is_not_found() {
        let (_dir, state) = setup();
        let result = load_track(State(state), loader(), Path("ghost".into())).await;
        assert!(matches!(result, Err(ApiError::NotFound("history_not_found"))));
    }

    #[tokio::test]
    async fn loading_requires_permission() {
        let (_dir, state) = setup();
        let publisher = AuthenticatedUser {
            name: "test".into(),
            permissions: HashSet::from([Permission::PublishPositions]),
        };
        let result = load_track(State(state), publisher, Path("rover1".into())).await;
        assert!(matches!(result, Err(ApiError::Permission(_))));
    }
}
