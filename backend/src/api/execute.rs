use actix_web::{post, web, HttpResponse, Responder};
use serde::Deserialize;

use crate::services::Engine;

#[derive(Deserialize)]
pub struct ExecuteRequest {
    #[serde(rename = "deviceId")]
    pub device_id: Option<i32>,
    #[serde(rename = "actionId")]
    pub action_id: Option<i32>,
}

/// Synchronous single-shot RPC against one device. The device's decoded
/// JSON-RPC response is passed through as the response body.
#[post("/execute")]
pub async fn execute(engine: web::Data<Engine>, body: web::Json<ExecuteRequest>) -> impl Responder {
    let (device_id, action_id) = match (body.device_id, body.action_id) {
        (Some(device_id), Some(action_id)) => (device_id, action_id),
        _ => return HttpResponse::BadRequest().body("invalid params"),
    };

    match engine.execute(device_id, action_id).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            log::error!(
                "failed to execute action {} on device {}: {}",
                action_id,
                device_id,
                e
            );
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}
