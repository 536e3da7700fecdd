use std::collections::HashMap;

use actix_web::{delete, get, post, web, HttpResponse};
use serde::Serialize;
use validator::Validate;

use super::list_response;
use crate::error::{not_found, AppError, AppResult};
use crate::model::*;
use crate::AppState;

pub const UNKNOWN_PRODUCT: &str = "Unknown product";
pub const UNKNOWN_COLLABORATOR: &str = "Unknown collaborator";
pub const UNKNOWN_VEHICLE: &str = "Unknown vehicle";

/// Id -> display name tables used to join movements in memory.
#[derive(Debug, Default)]
pub struct NameLookup {
    products: HashMap<i32, String>,
    collaborators: HashMap<i32, String>,
    vehicles: HashMap<i32, String>,
}

impl NameLookup {
    pub fn new(
        products: Vec<(i32, String)>,
        collaborators: Vec<(i32, String)>,
        vehicles: Vec<(i32, String)>,
    ) -> Self {
        Self {
            products: products.into_iter().collect(),
            collaborators: collaborators.into_iter().collect(),
            vehicles: vehicles.into_iter().collect(),
        }
    }

    async fn load(db: &sqlx::PgPool) -> AppResult<Self> {
        let products: Vec<(i32, String)> =
            sqlx::query_as(r#"SELECT id, "name" FROM public.produtos"#)
                .fetch_all(db)
                .await?;
        let collaborators: Vec<(i32, String)> =
            sqlx::query_as(r#"SELECT id, "name" FROM public.colaboradores"#)
                .fetch_all(db)
                .await?;
        let vehicles: Vec<(i32, String)> =
            sqlx::query_as("SELECT id, plate FROM public.veiculos")
                .fetch_all(db)
                .await?;
        Ok(Self::new(products, collaborators, vehicles))
    }

    pub fn product(&self, id: i32) -> String {
        self.products
            .get(&id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string())
    }

    /// `None` only when no collaborator was referenced at all.
    pub fn collaborator(&self, id: Option<i32>) -> Option<String> {
        id.map(|id| {
            self.collaborators
                .get(&id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_COLLABORATOR.to_string())
        })
    }

    pub fn vehicle(&self, id: Option<i32>) -> Option<String> {
        id.map(|id| {
            self.vehicles
                .get(&id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_VEHICLE.to_string())
        })
    }
}

#[derive(Debug, Serialize)]
pub struct StockEntryView {
    #[serde(flatten)]
    pub entry: StockEntry,
    pub product_name: String,
}

#[derive(Debug, Serialize)]
pub struct StockExitView {
    #[serde(flatten)]
    pub exit: StockExit,
    pub product_name: String,
    pub collaborator_name: Option<String>,
    pub vehicle_plate: Option<String>,
}

pub fn entry_views(entries: Vec<StockEntry>, names: &NameLookup) -> Vec<StockEntryView> {
    entries
        .into_iter()
        .map(|entry| StockEntryView {
            product_name: names.product(entry.product_id),
            entry,
        })
        .collect()
}

pub fn exit_views(exits: Vec<StockExit>, names: &NameLookup) -> Vec<StockExitView> {
    exits
        .into_iter()
        .map(|exit| StockExitView {
            product_name: names.product(exit.product_id),
            collaborator_name: names.collaborator(exit.collaborator_id),
            vehicle_plate: names.vehicle(exit.vehicle_id),
            exit,
        })
        .collect()
}

/// Adds `delta` to a product's quantity inside `conn`'s transaction.
/// Refuses to let the quantity go below zero.
pub(crate) async fn adjust_stock(
    conn: &mut sqlx::PgConnection,
    product_id: i32,
    delta: f64,
) -> AppResult<f64> {
    let (name, quantity): (String, f64) = sqlx::query_as(
        r#"SELECT "name", quantity FROM public.produtos WHERE id = $1 FOR UPDATE"#,
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| not_found("Product", product_id))?;

    let updated = quantity + delta;
    if updated < 0.0 {
        return Err(AppError::BadRequest(format!(
            "Insufficient stock for '{}': {} available, {} requested",
            name, quantity, -delta
        )));
    }

    sqlx::query("UPDATE public.produtos SET quantity = $2 WHERE id = $1")
        .bind(product_id)
        .bind(updated)
        .execute(&mut *conn)
        .await?;

    Ok(updated)
}

/// Records an exit and takes it out of stock. Caller owns the transaction.
pub(crate) async fn insert_exit(
    conn: &mut sqlx::PgConnection,
    product_id: i32,
    quantity: f64,
    collaborator_id: Option<i32>,
    vehicle_id: Option<i32>,
    note: Option<&str>,
    oil_change_id: Option<i32>,
) -> AppResult<i32> {
    adjust_stock(&mut *conn, product_id, -quantity).await?;

    let record = sqlx::query_as::<_, Record>(
        r#"
        INSERT INTO public.saidas
        (product_id, quantity, collaborator_id, vehicle_id, note, oil_change_id)
        VALUES($1, $2, $3, $4, $5, $6)
        RETURNING id;
        "#,
    )
    .bind(product_id)
    .bind(quantity)
    .bind(collaborator_id)
    .bind(vehicle_id)
    .bind(note)
    .bind(oil_change_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(record.id)
}

#[derive(Debug, Serialize)]
struct MovementResult {
    id: i32,
    product_quantity: f64,
}

#[get("/stock/entries")]
async fn get_entries(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let entries = sqlx::query_as::<_, StockEntry>(
        r#"
        SELECT id, product_id, quantity, supplier, note, created_at
        FROM public.entradas
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .fetch_all(&data.db)
    .await?;
    let names = NameLookup::load(&data.db).await?;

    Ok(list_response("entries", &entry_views(entries, &names)))
}

#[post("/stock/entries")]
async fn post_entry(
    data: web::Data<AppState>,
    request: web::Json<PostStockEntry>,
) -> AppResult<HttpResponse> {
    request.validate()?;

    let mut tx = data.db.begin().await?;
    let product_quantity = adjust_stock(&mut tx, request.product_id, request.quantity).await?;
    let record = sqlx::query_as::<_, Record>(
        r#"
        INSERT INTO public.entradas
        (product_id, quantity, supplier, note)
        VALUES($1, $2, $3, $4)
        RETURNING id;
        "#,
    )
    .bind(request.product_id)
    .bind(request.quantity)
    .bind(&request.supplier)
    .bind(&request.note)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    log::info!(
        "Stock entry {}: +{} of product {}",
        record.id,
        request.quantity,
        request.product_id
    );
    Ok(HttpResponse::Created().json(MovementResult {
        id: record.id,
        product_quantity,
    }))
}

/// Reverses the entry; rejected when that stock has already been consumed.
#[delete("/stock/entries/{id}")]
async fn delete_entry(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
) -> AppResult<HttpResponse> {
    let entry_id = path.into_inner().0;

    let mut tx = data.db.begin().await?;
    let (product_id, quantity): (i32, f64) = sqlx::query_as(
        "DELETE FROM public.entradas WHERE id = $1 RETURNING product_id, quantity",
    )
    .bind(entry_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| not_found("Stock entry", entry_id))?;
    adjust_stock(&mut tx, product_id, -quantity).await?;
    tx.commit().await?;

    log::info!("Stock entry {} deleted", entry_id);
    Ok(HttpResponse::Ok().body("Stock entry deleted"))
}

#[get("/stock/exits")]
async fn get_exits(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let exits = sqlx::query_as::<_, StockExit>(
        r#"
        SELECT id, product_id, quantity, collaborator_id, vehicle_id, note, oil_change_id, created_at
        FROM public.saidas
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .fetch_all(&data.db)
    .await?;
    let names = NameLookup::load(&data.db).await?;

    Ok(list_response("exits", &exit_views(exits, &names)))
}

#[post("/stock/exits")]
async fn post_exit(
    data: web::Data<AppState>,
    request: web::Json<PostStockExit>,
) -> AppResult<HttpResponse> {
    request.validate()?;

    let mut tx = data.db.begin().await?;
    let id = insert_exit(
        &mut tx,
        request.product_id,
        request.quantity,
        request.collaborator_id,
        request.vehicle_id,
        request.note.as_deref(),
        None,
    )
    .await?;
    let (product_quantity,): (f64,) =
        sqlx::query_as("SELECT quantity FROM public.produtos WHERE id = $1")
            .bind(request.product_id)
            .fetch_one(&mut *tx)
            .await?;
    tx.commit().await?;

    log::info!(
        "Stock exit {}: -{} of product {}",
        id,
        request.quantity,
        request.product_id
    );
    Ok(HttpResponse::Created().json(MovementResult {
        id,
        product_quantity,
    }))
}

/// Exits booked by an oil change belong to that record and stay put.
pub fn ensure_exit_deletable(exit_id: i32, oil_change_id: Option<i32>) -> AppResult<()> {
    match oil_change_id {
        Some(oil_change_id) => Err(AppError::BadRequest(format!(
            "Stock exit {} was booked by oil change #{} and cannot be deleted on its own",
            exit_id, oil_change_id
        ))),
        None => Ok(()),
    }
}

/// Puts the quantity back into stock.
#[delete("/stock/exits/{id}")]
async fn delete_exit(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
) -> AppResult<HttpResponse> {
    let exit_id = path.into_inner().0;

    let mut tx = data.db.begin().await?;
    let (product_id, quantity, oil_change_id): (i32, f64, Option<i32>) = sqlx::query_as(
        "DELETE FROM public.saidas WHERE id = $1 RETURNING product_id, quantity, oil_change_id",
    )
    .bind(exit_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| not_found("Stock exit", exit_id))?;
    ensure_exit_deletable(exit_id, oil_change_id)?;
    adjust_stock(&mut tx, product_id, quantity).await?;
    tx.commit().await?;

    log::info!("Stock exit {} deleted", exit_id);
    Ok(HttpResponse::Ok().body("Stock exit deleted"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_entries)
        .service(post_entry)
        .service(delete_entry)
        .service(get_exits)
        .service(post_exit)
        .service(delete_exit);
}
