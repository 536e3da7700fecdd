use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;
use validator::Validate;

use super::list_response;
use crate::auth::{self, hash_password, user_creation_gate, UserCreation};
use crate::error::{not_found, AppError, AppResult};
use crate::model::*;
use crate::permissions;
use crate::AppState;

#[derive(Debug, Deserialize)]
struct PutPermissions {
    pages: Vec<Page>,
}

/// Checks credentials and answers with the pages the user's role may open.
/// No token is issued; the client keeps its own session flag.
#[post("/auth/login")]
async fn login(
    data: web::Data<AppState>,
    request: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    request.validate()?;

    let user = auth::login(&data.db, &request.username, &request.password).await?;
    let pages = permissions::load(&data.db).await?.allowed_pages(user.role);

    log::info!("User '{}' logged in as {}", user.username, user.role);
    Ok(HttpResponse::Ok().json(LoginResponse { user, pages }))
}

#[get("/users")]
async fn get_users(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, "name", username, password_hash, "role", created_at
        FROM public.usuarios
        ORDER BY "name"
        "#,
    )
    .fetch_all(&data.db)
    .await?;

    Ok(list_response("users", &users))
}

/// Only an admin may add users. While no admin exists, the first one may be
/// created without a password so a fresh install can be bootstrapped.
#[post("/users")]
async fn post_user(
    data: web::Data<AppState>,
    request: web::Json<PostUser>,
) -> AppResult<HttpResponse> {
    request.validate()?;

    let mut tx = data.db.begin().await?;
    sqlx::query("LOCK TABLE public.usuarios IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;
    let (admin_count,): (i64,) =
        sqlx::query_as(r#"SELECT COUNT(*) FROM public.usuarios WHERE "role" = 'admin'"#)
            .fetch_one(&mut *tx)
            .await?;

    if user_creation_gate(admin_count, request.role)? == UserCreation::RequiresAdminPassword {
        auth::require_admin_password(
            &data.db,
            request.admin_password.as_deref().unwrap_or_default(),
        )
        .await?;
    }

    let password_hash = hash_password(&request.password)?;
    let record = sqlx::query_as::<_, Record>(
        r#"
        INSERT INTO public.usuarios
        ("name", username, password_hash, "role")
        VALUES($1, $2, $3, $4)
        RETURNING id;
        "#,
    )
    .bind(&request.name)
    .bind(request.username.trim())
    .bind(password_hash)
    .bind(request.role.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    log::info!("User {} created with role {}", record.id, request.role);
    Ok(HttpResponse::Created().json(record.id))
}

#[delete("/users/{id}")]
async fn delete_user_by_id(
    data: web::Data<AppState>,
    path: web::Path<(i32,)>,
    request: web::Json<AdminPassword>,
) -> AppResult<HttpResponse> {
    let user_id = path.into_inner().0;
    auth::require_admin_password(&data.db, &request.admin_password).await?;

    sqlx::query_as::<_, Record>(
        r#"
        DELETE FROM public.usuarios
        WHERE id=$1
        RETURNING id;
        "#,
    )
    .bind(user_id)
    .fetch_optional(&data.db)
    .await?
    .ok_or_else(|| not_found("User", user_id))?;

    log::info!("User {} deleted", user_id);
    Ok(HttpResponse::Ok().body("User deleted"))
}

#[get("/permissions/{role}")]
async fn get_role_permissions(
    data: web::Data<AppState>,
    path: web::Path<(String,)>,
) -> AppResult<HttpResponse> {
    let role = parse_role(path.into_inner().0)?;
    let pages = permissions::load(&data.db).await?.allowed_pages(role);
    Ok(HttpResponse::Ok().json(RolePages { role, pages }))
}

#[put("/permissions/{role}")]
async fn put_role_permissions(
    data: web::Data<AppState>,
    path: web::Path<(String,)>,
    request: web::Json<PutPermissions>,
) -> AppResult<HttpResponse> {
    let role = parse_role(path.into_inner().0)?;
    permissions::replace(&data.db, role, &request.pages).await?;

    let pages = permissions::load(&data.db).await?.allowed_pages(role);
    Ok(HttpResponse::Ok().json(RolePages { role, pages }))
}

fn parse_role(role: String) -> AppResult<UserRole> {
    UserRole::try_from(role).map_err(|e| AppError::BadRequest(e.to_string()))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(login)
        .service(get_users)
        .service(post_user)
        .service(delete_user_by_id)
        .service(get_role_permissions)
        .service(put_role_permissions);
}
