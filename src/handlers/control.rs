use crate::{
    models::{AddFileRequest, AddFileResponse, DeleteResponse, ErrorResponse, GetIdQuery, SessionQuery},
    session::RegistryError,
    AppState,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::io::ErrorKind;
use tracing::{error, info, warn};

fn registry_error_status(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::Resolve { source, .. } if source.kind() == ErrorKind::NotFound => {
            StatusCode::NOT_FOUND
        }
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::Resolve { .. } | RegistryError::NotAFile(_) | RegistryError::Unreadable { .. } => {
            StatusCode::BAD_REQUEST
        }
        RegistryError::Watch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Start previewing a file, or confirm it is already previewed.
///
/// The body is parsed as JSON whatever its content type.
pub async fn add_file(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<AddFileResponse>), (StatusCode, Json<ErrorResponse>)> {
    let request: AddFileRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected add request: {}", e);
        ErrorResponse::reply(StatusCode::BAD_REQUEST, format!("invalid request body: {e}"))
    })?;

    match state.registry.add(&request.path).await {
        Ok(id) => {
            info!("Previewing '{}' as session '{}'", request.path, id);
            Ok((StatusCode::OK, Json(AddFileResponse { id })))
        }
        Err(e) => {
            error!("Failed to preview '{}': {}", request.path, e);
            Err(ErrorResponse::reply(registry_error_status(&e), e.to_string()))
        }
    }
}

/// Session id of a previewed file; the body is empty when it is not previewed
pub async fn get_id(State(state): State<AppState>, Query(query): Query<GetIdQuery>) -> String {
    let Some(path) = query.path.filter(|p| !p.is_empty()) else {
        return String::new();
    };
    state.registry.get_id(&path).await.unwrap_or_default()
}

/// Remove one session, or with no id shut the whole server down
pub async fn delete_file(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<(StatusCode, Json<DeleteResponse>), (StatusCode, Json<ErrorResponse>)> {
    let Some(target) = query.id.filter(|id| !id.is_empty()) else {
        return Ok(shutdown(&state).await);
    };

    // Older clients send the file path in place of the id
    let result = match state.registry.remove_id(&target).await {
        Err(RegistryError::NotFound(_)) => state.registry.remove_path(&target).await,
        other => other,
    };

    match result {
        Ok(()) => {
            info!("Stopped previewing '{}'", target);
            Ok((StatusCode::OK, Json(DeleteResponse { success: true })))
        }
        Err(e) => {
            warn!("Failed to remove '{}': {}", target, e);
            Err(ErrorResponse::reply(registry_error_status(&e), e.to_string()))
        }
    }
}

async fn shutdown(state: &AppState) -> (StatusCode, Json<DeleteResponse>) {
    let removed = state.registry.remove_all().await;
    info!("Shutdown requested, removed {} sessions", removed);
    state.shutdown.cancel();
    (StatusCode::OK, Json(DeleteResponse { success: true }))
}
