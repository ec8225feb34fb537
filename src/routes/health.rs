use actix_web::{get, web};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct PingResponse {
    pub status: String,
}

#[utoipa::path(get, path = "/ping", tag = "health", responses((status = 200, body = PingResponse)))]
#[get("/ping")]
pub async fn ping() -> web::Json<PingResponse> {
    web::Json(PingResponse {
        status: "ok".to_string(),
    })
}
