use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use sqlx::types::Json;
use validator::Validate;

use super::list_response;
use super::stock::insert_exit;
use crate::error::{not_found, AppError, AppResult};
use crate::model::*;
use crate::AppState;

pub(crate) const OIL_CHANGE_COLUMNS: &str =
    "id, vehicle_id, changed_at, measurement_at_change, next_due_threshold, consumables, author, note";

#[derive(Debug, Deserialize)]
struct OilChangeFilter {
    vehicle_id: Option<i32>,
}

pub(crate) async fn fetch_all_oil_changes(db: &sqlx::PgPool) -> AppResult<Vec<OilChange>> {
    Ok(sqlx::query_as::<_, OilChange>(&format!(
        "SELECT {OIL_CHANGE_COLUMNS} FROM public.trocas_oleo ORDER BY id"
    ))
    .fetch_all(db)
    .await?)
}

#[get("/oil-changes")]
async fn get_oil_changes(
    data: web::Data<AppState>,
    filter: web::Query<OilChangeFilter>,
) -> AppResult<HttpResponse> {
    let changes = sqlx::query_as::<_, OilChange>(&format!(
        r#"
        SELECT {OIL_CHANGE_COLUMNS} FROM public.trocas_oleo
        WHERE ($1::INTEGER IS NULL OR vehicle_id = $1)
        ORDER BY changed_at DESC NULLS LAST, id DESC
        "#
    ))
    .bind(filter.vehicle_id)
    .fetch_all(&data.db)
    .await?;

    Ok(list_response("oil_changes", &changes))
}

/// Records the service and books every consumable as a stock exit tied to
/// the vehicle, all in one transaction.
#[post("/oil-changes")]
async fn post_oil_change(
    data: web::Data<AppState>,
    request: web::Json<PostOilChange>,
) -> AppResult<HttpResponse> {
    request.validate()?;
    let request = request.into_inner();

    let mut tx = data.db.begin().await?;
    let (current,): (f64,) = sqlx::query_as(
        "SELECT current_measurement FROM public.veiculos WHERE id = $1 FOR UPDATE",
    )
    .bind(request.vehicle_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| not_found("Vehicle", request.vehicle_id))?;

    let measurement_at_change = request.measurement_at_change.unwrap_or(current);
    if request.next_due_threshold <= measurement_at_change {
        return Err(AppError::BadRequest(format!(
            "Next change threshold {} must be greater than the measurement at change {}",
            request.next_due_threshold, measurement_at_change
        )));
    }

    let record = sqlx::query_as::<_, Record>(
        r#"
        INSERT INTO public.trocas_oleo
        (vehicle_id, changed_at, measurement_at_change, next_due_threshold, consumables, author, note)
        VALUES($1, (now() AT TIME ZONE 'UTC'::text), $2, $3, $4, $5, $6)
        RETURNING id;
        "#,
    )
    .bind(request.vehicle_id)
    .bind(measurement_at_change)
    .bind(request.next_due_threshold)
    .bind(Json(&request.consumables))
    .bind(&request.author)
    .bind(&request.note)
    .fetch_one(&mut *tx)
    .await?;

    let note = format!("Oil change #{}", record.id);
    for consumable in &request.consumables {
        insert_exit(
            &mut tx,
            consumable.product_id,
            consumable.quantity,
            request.collaborator_id,
            Some(request.vehicle_id),
            Some(&note),
            Some(record.id),
        )
        .await?;
    }

    tx.commit().await?;
    log::info!(
        "Oil change {} for vehicle {} at {} (next at {}, {} consumables)",
        record.id,
        request.vehicle_id,
        measurement_at_change,
        request.next_due_threshold,
        request.consumables.len()
    );
    Ok(HttpResponse::Created().json(record.id))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_oil_changes).service(post_oil_change);
}
