use rocket::get;
use rocket::serde::json::Json;
use serde_json::json;
use serde_json::value::Value;

use crate::pod;

#[get("/health")]
pub fn live() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": pod::timestamp(),
    }))
}

// No dependency to check yet, ready as soon as the server accepts requests.
#[get("/readiness")]
pub fn ready() -> Json<Value> {
    Json(json!({
        "status": "ready",
        "timestamp": pod::timestamp(),
    }))
}
