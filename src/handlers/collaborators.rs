use actix_web::{delete, get, post, put, web, HttpResponse};
use validator::Validate;

use super::list_response;
use crate::error::{not_found, AppResult};
use crate::model::*;
use crate::AppState;

const COLUMNS: &str =
    r#"id, "name", registration, "position", department, phone, active, created_at"#;

#[get("/collaborators")]
async fn get_collaborators(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let collaborators = sqlx::query_as::<_, Collaborator>(&format!(
        r#"SELECT {COLUMNS} FROM public.colaboradores ORDER BY "name""#
    ))
    .fetch_all(&data.db)
    .await?;

    Ok(list_response("collaborators", &collaborators))
}

#[get("/collaborators/{id}")]
async fn get_collaborator_by_id(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
) -> AppResult<HttpResponse> {
    let collaborator_id = path.into_inner().0;
    let collaborator = sqlx::query_as::<_, Collaborator>(&format!(
        "SELECT {COLUMNS} FROM public.colaboradores WHERE id = $1"
    ))
    .bind(collaborator_id)
    .fetch_optional(&data.db)
    .await?
    .ok_or_else(|| not_found("Collaborator", collaborator_id))?;

    Ok(HttpResponse::Ok().json(collaborator))
}

#[post("/collaborators")]
async fn post_collaborator(
    data: web::Data<AppState>,
    request: web::Json<PostCollaborator>,
) -> AppResult<HttpResponse> {
    request.validate()?;

    let record = sqlx::query_as::<_, Record>(
        r#"
        INSERT INTO public.colaboradores
        ("name", registration, "position", department, phone, active)
        VALUES($1, $2, $3, $4, $5, $6)
        RETURNING id;
        "#,
    )
    .bind(&request.name)
    .bind(&request.registration)
    .bind(&request.position)
    .bind(&request.department)
    .bind(&request.phone)
    .bind(request.active)
    .fetch_one(&data.db)
    .await?;

    log::info!("Collaborator {} created", record.id);
    Ok(HttpResponse::Created().json(record.id))
}

#[put("/collaborators/{id}")]
async fn put_collaborator(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
    request: web::Json<PostCollaborator>,
) -> AppResult<HttpResponse> {
    let collaborator_id = path.into_inner().0;
    request.validate()?;

    sqlx::query_as::<_, Record>(
        r#"
        UPDATE public.colaboradores
        SET "name" = $2, registration = $3, "position" = $4, department = $5, phone = $6, active = $7
        WHERE id = $1
        RETURNING id;
        "#,
    )
    .bind(collaborator_id)
    .bind(&request.name)
    .bind(&request.registration)
    .bind(&request.position)
    .bind(&request.department)
    .bind(&request.phone)
    .bind(request.active)
    .fetch_optional(&data.db)
    .await?
    .ok_or_else(|| not_found("Collaborator", collaborator_id))?;

    Ok(HttpResponse::Ok().body("Collaborator updated"))
}

#[delete("/collaborators/{id}")]
async fn delete_collaborator_by_id(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
) -> AppResult<HttpResponse> {
    let collaborator_id = path.into_inner().0;
    sqlx::query_as::<_, Record>(
        r#"
        DELETE FROM public.colaboradores
        WHERE id=$1
        RETURNING id;
        "#,
    )
    .bind(collaborator_id)
    .fetch_optional(&data.db)
    .await?
    .ok_or_else(|| not_found("Collaborator", collaborator_id))?;

    log::info!("Collaborator {} deleted", collaborator_id);
    Ok(HttpResponse::Ok().body("Collaborator deleted"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_collaborators)
        .service(get_collaborator_by_id)
        .service(post_collaborator)
        .service(put_collaborator)
        .service(delete_collaborator_by_id);
}
