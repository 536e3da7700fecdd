use actix_web::{delete, get, post, put, web, HttpResponse};
use validator::Validate;

use super::list_response;
use crate::error::{not_found, AppResult};
use crate::model::*;
use crate::AppState;

pub(crate) const VEHICLE_COLUMNS: &str =
    "id, plate, model, brand, measurement_kind, current_measurement, status, created_at";

pub(crate) async fn fetch_vehicle(db: &sqlx::PgPool, vehicle_id: i32) -> AppResult<Vehicle> {
    sqlx::query_as::<_, Vehicle>(&format!(
        "SELECT {VEHICLE_COLUMNS} FROM public.veiculos WHERE id = $1"
    ))
    .bind(vehicle_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| not_found("Vehicle", vehicle_id))
}

pub(crate) async fn fetch_all_vehicles(db: &sqlx::PgPool) -> AppResult<Vec<Vehicle>> {
    Ok(sqlx::query_as::<_, Vehicle>(&format!(
        "SELECT {VEHICLE_COLUMNS} FROM public.veiculos ORDER BY plate"
    ))
    .fetch_all(db)
    .await?)
}

#[get("/vehicles")]
async fn get_vehicles(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let vehicles = fetch_all_vehicles(&data.db).await?;
    Ok(list_response("vehicles", &vehicles))
}

#[get("/vehicles/{id}")]
async fn get_vehicle_by_id(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
) -> AppResult<HttpResponse> {
    let vehicle = fetch_vehicle(&data.db, path.into_inner().0).await?;
    Ok(HttpResponse::Ok().json(vehicle))
}

/// Creates the vehicle and seeds its measurement log with the initial value.
#[post("/vehicles")]
async fn post_vehicle(
    data: web::Data<AppState>,
    request: web::Json<PostVehicle>,
) -> AppResult<HttpResponse> {
    request.validate()?;
    let plate = request.plate.trim().to_uppercase();

    let mut tx = data.db.begin().await?;
    let record = sqlx::query_as::<_, Record>(
        r#"
        INSERT INTO public.veiculos
        (plate, model, brand, measurement_kind, current_measurement, status)
        VALUES($1, $2, $3, $4, $5, $6)
        RETURNING id;
        "#,
    )
    .bind(&plate)
    .bind(&request.model)
    .bind(&request.brand)
    .bind(request.measurement_kind.as_str())
    .bind(request.initial_measurement)
    .bind(request.status.as_str())
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO public.atualizacoes_km
        (vehicle_id, previous_value, new_value, "timestamp", author, note)
        VALUES($1, 0, $2, (now() AT TIME ZONE 'UTC'::text), $3, 'Initial measurement');
        "#,
    )
    .bind(record.id)
    .bind(request.initial_measurement)
    .bind(&request.author)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    log::info!("Vehicle {} ({}) created", record.id, plate);
    Ok(HttpResponse::Created().json(record.id))
}

#[put("/vehicles/{id}")]
async fn put_vehicle(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
    request: web::Json<PutVehicle>,
) -> AppResult<HttpResponse> {
    let vehicle_id = path.into_inner().0;
    request.validate()?;

    sqlx::query_as::<_, Record>(
        r#"
        UPDATE public.veiculos
        SET plate = $2, model = $3, brand = $4, measurement_kind = $5, status = $6
        WHERE id = $1
        RETURNING id;
        "#,
    )
    .bind(vehicle_id)
    .bind(request.plate.trim().to_uppercase())
    .bind(&request.model)
    .bind(&request.brand)
    .bind(request.measurement_kind.as_str())
    .bind(request.status.as_str())
    .fetch_optional(&data.db)
    .await?
    .ok_or_else(|| not_found("Vehicle", vehicle_id))?;

    Ok(HttpResponse::Ok().body("Vehicle updated"))
}

#[delete("/vehicles/{id}")]
async fn delete_vehicle_by_id(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
) -> AppResult<HttpResponse> {
    let vehicle_id = path.into_inner().0;
    sqlx::query_as::<_, Record>(
        r#"
        DELETE FROM public.veiculos
        WHERE id=$1
        RETURNING id;
        "#,
    )
    .bind(vehicle_id)
    .fetch_optional(&data.db)
    .await?
    .ok_or_else(|| not_found("Vehicle", vehicle_id))?;

    log::info!("Vehicle {} deleted", vehicle_id);
    Ok(HttpResponse::Ok().body("Vehicle deleted"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_vehicles)
        .service(get_vehicle_by_id)
        .service(post_vehicle)
        .service(put_vehicle)
        .service(delete_vehicle_by_id);
}
