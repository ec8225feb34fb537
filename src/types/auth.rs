use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn ok() -> Self {
        StatusResponse {
            success: true,
            message: None,
        }
    }

    pub fn ok_with(message: &str) -> Self {
        StatusResponse {
            success: true,
            message: Some(message.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct AuthStatusResponse {
    pub is_logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}
