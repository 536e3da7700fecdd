use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;

pub mod collaborators;
pub mod dashboard;
pub mod measurements;
pub mod oil_changes;
pub mod products;
pub mod stock;
pub mod users;
pub mod vehicles;

#[get("/")]
async fn index() -> impl Responder {
    "Fleet maintenance back-office"
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index).service(
        web::scope("/api")
            .configure(users::configure)
            .configure(collaborators::configure)
            .configure(vehicles::configure)
            .configure(measurements::configure)
            .configure(oil_changes::configure)
            .configure(products::configure)
            .configure(stock::configure)
            .configure(dashboard::configure),
    );
}

/// List payload shared by every collection endpoint: `{ "rows": n, key: [...] }`.
pub(crate) fn list_response<T: Serialize>(key: &str, items: &[T]) -> HttpResponse {
    let mut body = serde_json::Map::new();
    body.insert("rows".to_string(), serde_json::json!(items.len()));
    body.insert(key.to_string(), serde_json::json!(items));
    HttpResponse::Ok().json(serde_json::Value::Object(body))
}
