use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Request payload for previewing a file
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct AddFileRequest {
    #[serde(rename = "Path", alias = "path")]
    pub path: String,
}

/// Response returned once the file's session exists
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct AddFileResponse {
    pub id: String,
}

/// Query for looking up a session id by file path
#[derive(Serialize, Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct GetIdQuery {
    pub path: Option<String>,
}

/// Query selecting a session. Absent on `DELETE /`, which shuts the server down.
#[derive(Serialize, Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct SessionQuery {
    pub id: Option<String>,
}

/// Response returned after removing sessions
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct DeleteResponse {
    pub success: bool,
}
