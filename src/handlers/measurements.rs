use actix_web::{delete, get, post, web, HttpResponse};
use chrono::NaiveDateTime;
use serde::Serialize;
use validator::Validate;

use super::list_response;
use super::vehicles::fetch_vehicle;
use crate::auth::require_admin_password;
use crate::error::{not_found, AppError, AppResult};
use crate::maintenance::{check_measurement_advance, current_measurement};
use crate::model::*;
use crate::AppState;

const UPDATE_COLUMNS: &str =
    r#"id, vehicle_id, previous_value, new_value, "timestamp", author, note"#;

#[derive(Debug, Serialize, sqlx::FromRow)]
struct LatestMeasurement {
    vehicle_id: i32,
    plate: String,
    new_value: f64,
    timestamp: Option<NaiveDateTime>,
}

async fn fetch_updates(
    conn: &mut sqlx::PgConnection,
    vehicle_id: i32,
) -> AppResult<Vec<MeasurementUpdate>> {
    Ok(sqlx::query_as::<_, MeasurementUpdate>(&format!(
        "SELECT {UPDATE_COLUMNS} FROM public.atualizacoes_km WHERE vehicle_id = $1 ORDER BY id"
    ))
    .bind(vehicle_id)
    .fetch_all(conn)
    .await?)
}

#[get("/vehicles/{id}/measurements")]
async fn get_vehicle_measurements(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
) -> AppResult<HttpResponse> {
    let vehicle_id = path.into_inner().0;
    fetch_vehicle(&data.db, vehicle_id).await?;

    let updates = sqlx::query_as::<_, MeasurementUpdate>(&format!(
        r#"
        SELECT {UPDATE_COLUMNS} FROM public.atualizacoes_km
        WHERE vehicle_id = $1
        ORDER BY "timestamp" DESC NULLS LAST, id DESC
        "#
    ))
    .bind(vehicle_id)
    .fetch_all(&data.db)
    .await?;

    Ok(list_response("measurements", &updates))
}

#[get("/vehicles/{id}/measurements/latest")]
async fn get_latest_measurement(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
) -> AppResult<HttpResponse> {
    let vehicle_id = path.into_inner().0;
    let latest = sqlx::query_as::<_, LatestMeasurement>(
        r#"
        SELECT m.vehicle_id, v.plate, m.new_value, m."timestamp"
        FROM public.atualizacoes_km m
        INNER JOIN public.veiculos v ON m.vehicle_id = v.id
        WHERE m.vehicle_id = $1 AND m."timestamp" IS NOT NULL
        ORDER BY m."timestamp" DESC, m.id DESC
        LIMIT 1
        "#,
    )
    .bind(vehicle_id)
    .fetch_optional(&data.db)
    .await?
    .ok_or_else(|| AppError::NotFound("No measurement record".to_string()))?;

    Ok(HttpResponse::Ok().json(latest))
}

/// Appends to the log and mirrors the value onto the vehicle row.
#[post("/vehicles/{id}/measurements")]
async fn post_measurement(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
    request: web::Json<PostMeasurement>,
) -> AppResult<HttpResponse> {
    let vehicle_id = path.into_inner().0;
    request.validate()?;

    let mut tx = data.db.begin().await?;
    let (previous,): (f64,) = sqlx::query_as(
        "SELECT current_measurement FROM public.veiculos WHERE id = $1 FOR UPDATE",
    )
    .bind(vehicle_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| not_found("Vehicle", vehicle_id))?;

    check_measurement_advance(previous, request.value)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let record = sqlx::query_as::<_, Record>(
        r#"
        INSERT INTO public.atualizacoes_km
        (vehicle_id, previous_value, new_value, "timestamp", author, note)
        VALUES($1, $2, $3, (now() AT TIME ZONE 'UTC'::text), $4, $5)
        RETURNING id;
        "#,
    )
    .bind(vehicle_id)
    .bind(previous)
    .bind(request.value)
    .bind(&request.author)
    .bind(&request.note)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE public.veiculos SET current_measurement = $2 WHERE id = $1")
        .bind(vehicle_id)
        .bind(request.value)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    log::info!(
        "Vehicle {} measurement {} -> {}",
        vehicle_id,
        previous,
        request.value
    );
    Ok(HttpResponse::Created().json(record.id))
}

/// Admin-only. Removes one log entry and recomputes the vehicle's current
/// value from whatever remains (0 when nothing does).
#[delete("/measurements/{id}")]
async fn delete_measurement(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
    request: web::Json<AdminPassword>,
) -> AppResult<HttpResponse> {
    let update_id = path.into_inner().0;
    require_admin_password(&data.db, &request.admin_password).await?;

    let mut tx = data.db.begin().await?;
    let (vehicle_id,): (i32,) = sqlx::query_as(
        "DELETE FROM public.atualizacoes_km WHERE id = $1 RETURNING vehicle_id",
    )
    .bind(update_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| not_found("Measurement update", update_id))?;

    let remaining = fetch_updates(&mut tx, vehicle_id).await?;
    let current = current_measurement(&remaining);

    sqlx::query("UPDATE public.veiculos SET current_measurement = $2 WHERE id = $1")
        .bind(vehicle_id)
        .bind(current)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    log::warn!(
        "Measurement update {} deleted; vehicle {} current measurement is now {}",
        update_id,
        vehicle_id,
        current
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "vehicle_id": vehicle_id,
        "current_measurement": current,
    })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_latest_measurement)
        .service(get_vehicle_measurements)
        .service(post_measurement)
        .service(delete_measurement);
}
