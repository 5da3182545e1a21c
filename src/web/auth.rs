use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::history::FileHistorySource;
use crate::reconciler::{BroadcastSink, Reconciler};

use super::config::{Config, Permission};

pub type SharedReconciler = Arc<Mutex<Reconciler<BroadcastSink>>>;

#[derive(Clone)]
pub struct AuthenticatedUser {
    pub name: String,
    pub permissions: HashSet<Permission>,
}

impl AuthenticatedUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    fn anonymous() -> Self {
        AuthenticatedUser {
            name: "anonymous".to_string(),
            permissions: [Permission::PublishPositions, Permission::LoadTracks].into(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub reconciler: SharedReconciler,
    pub history: Arc<FileHistorySource>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sink = BroadcastSink::new(config.web.stream_capacity);
        let reconciler = Reconciler::new(config.reconciler_settings(), sink);
        let history = FileHistorySource::new(config.history.folder.clone());
        AppState {
            config: Arc::new(config),
            reconciler: Arc::new(Mutex::new(reconciler)),
            history: Arc::new(history),
        }
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidFormat,
    InvalidKey,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingAuth => "Missing Authorization header",
            AuthError::InvalidFormat => "Invalid Authorization format",
            AuthError::InvalidKey => "Invalid API key",
        };
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug)]
pub struct PermissionError;

impl IntoResponse for PermissionError {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Insufficient permissions" })),
        )
            .into_response()
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !state.config.auth_enabled() {
            return Ok(AuthenticatedUser::anonymous());
        }

        let auth_header = parts
            .headers
            .get("Authorization")
            .ok_or(AuthError::MissingAuth)?
            .to_str()
            .map_err(|_| AuthError::InvalidFormat)?;

        let key = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidFormat)?;

        let api_key = state
            .config
            .find_api_key(key)
            .ok_or(AuthError::InvalidKey)?;

        Ok(AuthenticatedUser {
            name: api_key.name.clone(),
            permissions: api_key.permissions.clone(),
        })
    }
}

pub fn require_permission(
    user: &AuthenticatedUser,
    permission: Permission,
) -> Result<(), PermissionError> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        log::warn!("{} lacks permission {:?}", user.name, permission);
        Err(PermissionError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn state(yaml: &str) -> AppState {
        AppState::new(Config::from_yaml(yaml).unwrap())
    }

    const KEYED: &str = r#"
history:
  folder: ./tracks
api_keys:
  - { key: pub-key, name: gateway, permissions: [publish_positions] }
"#;

    async fn authenticate(
        state: &AppState,
        header: Option<&str>,
    ) -> Result<AuthenticatedUser, AuthError> {
        let mut builder = Request::builder().uri("/api/channels/rover1/positions");
        if let Some(value) = header {
            builder = builder.header("Authorization", value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, state).await
    }

    #[tokio::test]
    async fn bearer_key_resolves_to_its_permissions() {
        let state = state(KEYED);
        let user = authenticate(&state, Some("Bearer pub-key")).await.unwrap();
        assert_eq!(user.name, "gateway");
        assert!(require_permission(&user, Permission::PublishPositions).is_ok());
        assert!(require_permission(&user, Permission::LoadTracks).is_err());
    }

    #[tokio::test]
    async fn bad_credentials_are_rejected() {
        let state = state(KEYED);
        assert!(matches!(
            authenticate(&state, None).await,
            Err(AuthError::MissingAuth)
        ));
        assert!(matches!(
            authenticate(&state, Some("Token pub-key")).await,
            Err(AuthError::InvalidFormat)
        ));
        assert!(matches!(
            authenticate(&state, Some("Bearer other")).await,
            Err(AuthError::InvalidKey)
        ));
    }

    #[tokio::test]
    async fn no_keys_means_open_access() {
        let state = state("history:\n  folder: ./tracks\n");
        let user = authenticate(&state, None).await.unwrap();
        assert!(user.has_permission(Permission::LoadTracks));
    }
}
