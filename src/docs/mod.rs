use utoipa::OpenApi;
use crate::models::*;

/// Preview a file
#[utoipa::path(
    post,
    path = "/",
    request_body = AddFileRequest,
    responses(
        (status = 200, description = "File is being previewed", body = AddFileResponse),
        (status = 400, description = "Not a readable regular file", body = ErrorResponse),
        (status = 404, description = "File does not exist", body = ErrorResponse),
        (status = 500, description = "File could not be watched", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn add_file_doc() {}

/// Look up the session id of a file
#[utoipa::path(
    get,
    path = "/getid",
    params(GetIdQuery),
    responses(
        (status = 200, description = "Session id, empty when the file is not previewed", body = String, content_type = "text/plain")
    )
)]
#[allow(dead_code)]
pub async fn get_id_doc() {}

/// Stop previewing one file, or shut the server down when no id is given
#[utoipa::path(
    delete,
    path = "/",
    params(SessionQuery),
    responses(
        (status = 200, description = "Session removed, or server shutting down", body = DeleteResponse),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn delete_file_doc() {}

/// Preview page, live-update WebSocket, or the list of previewed files
#[utoipa::path(
    get,
    path = "/",
    params(SessionQuery),
    responses(
        (status = 200, description = "HTML page", content_type = "text/html"),
        (status = 101, description = "Live-update stream when requested as a WebSocket upgrade"),
        (status = 404, description = "Unknown session", content_type = "text/html")
    )
)]
#[allow(dead_code)]
pub async fn preview_doc() {}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Session counts and process resource usage
#[utoipa::path(
    get,
    path = "/diagnostics",
    responses(
        (status = 200, description = "Diagnostics", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        add_file_doc,
        get_id_doc,
        delete_file_doc,
        preview_doc,
        health_check_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            AddFileRequest,
            AddFileResponse,
            DeleteResponse,
            ErrorResponse,
            HealthResponse,
            DiagnosticsResponse,
            SessionInfo
        )
    ),
    tags(
        (name = "livemark", description = "Preview control API")
    )
)]
pub struct ApiDoc;
