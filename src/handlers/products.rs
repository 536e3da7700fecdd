use actix_web::{delete, get, post, put, web, HttpResponse};
use validator::Validate;

use super::list_response;
use crate::error::{not_found, AppResult};
use crate::model::*;
use crate::AppState;

pub(crate) const PRODUCT_COLUMNS: &str =
    r#"id, "name", category, unit, quantity, minimum_stock, created_at"#;

pub(crate) async fn fetch_all_products(db: &sqlx::PgPool) -> AppResult<Vec<Product>> {
    Ok(sqlx::query_as::<_, Product>(&format!(
        r#"SELECT {PRODUCT_COLUMNS} FROM public.produtos ORDER BY "name""#
    ))
    .fetch_all(db)
    .await?)
}

#[get("/products")]
async fn get_products(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let products = fetch_all_products(&data.db).await?;
    Ok(list_response("products", &products))
}

#[get("/products/low-stock")]
async fn get_low_stock_products(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let products: Vec<Product> = fetch_all_products(&data.db)
        .await?
        .into_iter()
        .filter(Product::is_low_stock)
        .collect();
    Ok(list_response("products", &products))
}

#[get("/products/{id}")]
async fn get_product_by_id(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
) -> AppResult<HttpResponse> {
    let product_id = path.into_inner().0;
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM public.produtos WHERE id = $1"
    ))
    .bind(product_id)
    .fetch_optional(&data.db)
    .await?
    .ok_or_else(|| not_found("Product", product_id))?;

    Ok(HttpResponse::Ok().json(product))
}

#[post("/products")]
async fn post_product(
    data: web::Data<AppState>,
    request: web::Json<PostProduct>,
) -> AppResult<HttpResponse> {
    request.validate()?;

    let record = sqlx::query_as::<_, Record>(
        r#"
        INSERT INTO public.produtos
        ("name", category, unit, quantity, minimum_stock)
        VALUES($1, $2, $3, $4, $5)
        RETURNING id;
        "#,
    )
    .bind(&request.name)
    .bind(&request.category)
    .bind(&request.unit)
    .bind(request.quantity)
    .bind(request.minimum_stock)
    .fetch_one(&data.db)
    .await?;

    log::info!("Product {} created", record.id);
    Ok(HttpResponse::Created().json(record.id))
}

#[put("/products/{id}")]
async fn put_product(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
    request: web::Json<PutProduct>,
) -> AppResult<HttpResponse> {
    let product_id = path.into_inner().0;
    request.validate()?;

    sqlx::query_as::<_, Record>(
        r#"
        UPDATE public.produtos
        SET "name" = $2, category = $3, unit = $4, minimum_stock = $5
        WHERE id = $1
        RETURNING id;
        "#,
    )
    .bind(product_id)
    .bind(&request.name)
    .bind(&request.category)
    .bind(&request.unit)
    .bind(request.minimum_stock)
    .fetch_optional(&data.db)
    .await?
    .ok_or_else(|| not_found("Product", product_id))?;

    Ok(HttpResponse::Ok().body("Product updated"))
}

/// Products referenced by stock movements can't be deleted (foreign key -> 400).
#[delete("/products/{id}")]
async fn delete_product_by_id(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
) -> AppResult<HttpResponse> {
    let product_id = path.into_inner().0;
    sqlx::query_as::<_, Record>(
        r#"
        DELETE FROM public.produtos
        WHERE id=$1
        RETURNING id;
        "#,
    )
    .bind(product_id)
    .fetch_optional(&data.db)
    .await?
    .ok_or_else(|| not_found("Product", product_id))?;

    log::info!("Product {} deleted", product_id);
    Ok(HttpResponse::Ok().body("Product deleted"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_products)
        .service(get_low_stock_products)
        .service(get_product_by_id)
        .service(post_product)
        .service(put_product)
        .service(delete_product_by_id);
}
