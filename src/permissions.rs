use std::collections::{BTreeSet, HashMap};

use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::model::{Page, PermissionRow, UserRole};

/// Role-to-page mapping as stored in `permissoes_acesso`.
#[derive(Debug, Default, Clone)]
pub struct PermissionMap {
    pages: HashMap<UserRole, BTreeSet<Page>>,
}

impl PermissionMap {
    /// Builds the map from raw rows. Rows naming an unknown role or page are
    /// ignored so a stray row can't lock everyone out.
    pub fn from_rows(rows: Vec<PermissionRow>) -> Self {
        let mut pages: HashMap<UserRole, BTreeSet<Page>> = HashMap::new();
        for row in rows {
            let (role, page) = match (UserRole::try_from(row.role), Page::try_from(row.page)) {
                (Ok(role), Ok(page)) => (role, page),
                (Err(e), _) | (_, Err(e)) => {
                    log::warn!("Skipping permission row: {}", e);
                    continue;
                }
            };
            pages.entry(role).or_default().insert(page);
        }
        Self { pages }
    }

    pub fn can_access(&self, role: UserRole, page: Page) -> bool {
        role == UserRole::Admin
            || self
                .pages
                .get(&role)
                .map_or(false, |pages| pages.contains(&page))
    }

    pub fn allowed_pages(&self, role: UserRole) -> Vec<Page> {
        Page::ALL
            .iter()
            .copied()
            .filter(|page| self.can_access(role, *page))
            .collect()
    }
}

pub async fn load(pool: &PgPool) -> AppResult<PermissionMap> {
    let rows = sqlx::query_as::<_, PermissionRow>(
        r#"SELECT "role", page FROM public.permissoes_acesso ORDER BY id"#,
    )
    .fetch_all(pool)
    .await?;

    Ok(PermissionMap::from_rows(rows))
}

/// Replaces every page granted to `role` in one transaction.
pub async fn replace(pool: &PgPool, role: UserRole, pages: &[Page]) -> AppResult<()> {
    if role == UserRole::Admin {
        return Err(AppError::BadRequest(
            "The admin role always has access to every page".to_string(),
        ));
    }

    let unique: BTreeSet<Page> = pages.iter().copied().collect();
    let mut tx = pool.begin().await?;

    sqlx::query(r#"DELETE FROM public.permissoes_acesso WHERE "role" = $1"#)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await?;

    for page in unique {
        sqlx::query(r#"INSERT INTO public.permissoes_acesso ("role", page) VALUES ($1, $2)"#)
            .bind(role.as_str())
            .bind(page.as_str())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    log::info!("Permissions for role '{}' replaced", role);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str, page: &str) -> PermissionRow {
        PermissionRow {
            role: role.to_string(),
            page: page.to_string(),
        }
    }

    #[test]
    fn admin_sees_every_page() {
        let map = PermissionMap::from_rows(Vec::new());
        assert_eq!(map.allowed_pages(UserRole::Admin), Page::ALL.to_vec());
    }

    #[test]
    fn roles_only_see_granted_pages() {
        let map = PermissionMap::from_rows(vec![
            row("operator", "stock"),
            row("operator", "dashboard"),
            row("manager", "vehicles"),
        ]);

        assert_eq!(
            map.allowed_pages(UserRole::Operator),
            vec![Page::Dashboard, Page::Stock]
        );
        assert!(map.can_access(UserRole::Manager, Page::Vehicles));
        assert!(!map.can_access(UserRole::Manager, Page::Users));
    }

    #[test]
    fn unknown_rows_are_dropped() {
        let map = PermissionMap::from_rows(vec![
            row("operator", "reports"),
            row("guest", "dashboard"),
            row("operator", "maintenance"),
        ]);

        assert_eq!(map.allowed_pages(UserRole::Operator), vec![Page::Maintenance]);
    }
}
