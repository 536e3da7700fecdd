use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::model::{User, UserRole};

pub fn hash_password(password: &str) -> AppResult<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// A malformed stored hash counts as a mismatch rather than an error.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or_else(|e| {
        log::warn!("Stored password hash could not be checked: {}", e);
        false
    })
}

pub async fn login(pool: &PgPool, username: &str, password: &str) -> AppResult<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, "name", username, password_hash, "role", created_at
        FROM public.usuarios
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match user {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        _ => Err(AppError::Unauthorized("Invalid username or password".to_string())),
    }
}

/// Gate for destructive actions: the password must belong to an admin.
pub async fn require_admin_password(pool: &PgPool, password: &str) -> AppResult<()> {
    if password.is_empty() {
        return Err(AppError::Forbidden("Admin password required".to_string()));
    }

    let hashes: Vec<(String,)> = sqlx::query_as(
        r#"SELECT password_hash FROM public.usuarios WHERE "role" = 'admin'"#,
    )
    .fetch_all(pool)
    .await?;

    if hashes.iter().any(|(hash,)| verify_password(password, hash)) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Invalid admin password".to_string()))
    }
}

/// What creating a user of `role` takes, given how many admins exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCreation {
    /// Bootstrap: no admin exists yet, so the first admin is created freely.
    Open,
    RequiresAdminPassword,
}

pub fn user_creation_gate(admin_count: i64, role: UserRole) -> AppResult<UserCreation> {
    match (admin_count, role) {
        (0, UserRole::Admin) => Ok(UserCreation::Open),
        (0, _) => Err(AppError::BadRequest(
            "The first user must be an admin".to_string(),
        )),
        _ => Ok(UserCreation::RequiresAdminPassword),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let hash = bcrypt::hash("frota2024", 4).unwrap();
        assert!(verify_password("frota2024", &hash));
        assert!(!verify_password("frota2025", &hash));
    }

    #[test]
    fn plaintext_in_the_hash_column_never_matches() {
        assert!(!verify_password("frota2024", "frota2024"));
    }

    #[test]
    fn first_admin_can_be_created_without_a_password() {
        assert_eq!(
            user_creation_gate(0, UserRole::Admin).unwrap(),
            UserCreation::Open
        );
    }

    #[test]
    fn first_user_must_be_an_admin() {
        let err = user_creation_gate(0, UserRole::Operator).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn once_an_admin_exists_every_creation_is_gated() {
        for role in UserRole::ALL {
            assert_eq!(
                user_creation_gate(1, *role).unwrap(),
                UserCreation::RequiresAdminPassword
            );
        }
    }

    #[test]
    fn hash_password_uses_bcrypt() {
        let hash = hash_password("s3cret!").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("s3cret!", &hash));
    }
}
