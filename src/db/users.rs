//! Tenant and user storage

use super::filter::SqlFilter;
use super::{audit, entitlements, text_column};
use crate::auth::Role;
use crate::error::AppError;
use crate::models::{
    slugify, NewAudit, Page, Paginated, Tenant, UpdateUserRequest, User, UserFilter,
};
use chrono::Utc;
use deadpool_postgres::Pool;
use serde_json::json;
use tokio_postgres::Row;
use tracing::info;
use uuid::Uuid;

const COLUMNS: &str =
    "id, tenant_id, email, password_hash, name, role, is_active, last_login, created_at, updated_at";

fn from_row(row: &Row) -> Result<User, AppError> {
    Ok(User {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        name: row.try_get("name")?,
        role: text_column(row, "role")?,
        is_active: row.try_get("is_active")?,
        last_login: row.try_get("last_login")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Fields for a new user; the password is already hashed
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub role: Role,
}

#[derive(Clone)]
pub struct UserService {
    pool: Pool,
}

impl UserService {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a tenant, its first admin and default entitlements together
    pub async fn register_tenant_with_admin(
        &self,
        tenant_name: &str,
        admin: NewUser<'_>,
    ) -> Result<(Tenant, User), AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let tenant_id = Uuid::new_v4();
        // Suffix keeps slugs unique when two organisations share a name
        let slug = format!("{}-{}", slugify(tenant_name), &tenant_id.simple().to_string()[..8]);
        let tenant_row = tx
            .query_one(
                "INSERT INTO tenants (id, name, slug) VALUES ($1, $2, $3)
                 RETURNING id, name, slug, created_at",
                &[&tenant_id, &tenant_name, &slug],
            )
            .await?;
        let tenant = Tenant {
            id: tenant_row.try_get("id")?,
            name: tenant_row.try_get("name")?,
            slug: tenant_row.try_get("slug")?,
            created_at: tenant_row.try_get("created_at")?,
        };

        let user = insert_user(&tx, tenant_id, &admin).await?;
        entitlements::seed_defaults(&tx, tenant_id).await?;
        audit::record(
            &tx,
            NewAudit::new(tenant_id, "tenant", "tenant.registered")
                .by(user.id)
                .on(tenant_id)
                .with_details(json!({ "name": tenant.name, "adminEmail": user.email })),
        )
        .await?;

        tx.commit().await?;
        info!(tenant_id = %tenant.id, slug = %tenant.slug, "Tenant registered");
        Ok((tenant, user))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM users WHERE email = $1", COLUMNS),
                &[&email],
            )
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    /// Look up a user inside one tenant
    pub async fn find_by_id(&self, tenant_id: Uuid, id: Uuid) -> Result<Option<User>, AppError> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {} FROM users WHERE id = $1 AND tenant_id = $2", COLUMNS),
                &[&id, &tenant_id],
            )
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<User, AppError> {
        self.find_by_id(tenant_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    pub async fn list(&self, tenant_id: Uuid, filter: &UserFilter) -> Result<Paginated<User>, AppError> {
        let page = Page::new(filter.page, filter.limit);
        let mut sql = SqlFilter::for_tenant(tenant_id);
        sql.eq_opt("role", filter.role.map(|r| r.as_str().to_string()))
            .search(&["name", "email"], filter.search.as_deref());

        let client = self.pool.get().await?;
        let where_sql = sql.where_sql();
        let total: i64 = client
            .query_one(&format!("SELECT COUNT(*) FROM users{}", where_sql), &sql.params())
            .await?
            .try_get(0)?;
        let limit = sql.page_clause(page);
        let rows = client
            .query(
                &format!("SELECT {} FROM users{} ORDER BY created_at DESC{}", COLUMNS, where_sql, limit),
                &sql.params(),
            )
            .await?;

        Ok(Paginated {
            items: rows.iter().map(from_row).collect::<Result<_, _>>()?,
            pagination: page.meta(total),
        })
    }

    /// Add a user to an existing tenant
    pub async fn create(&self, tenant_id: Uuid, actor_id: Uuid, new_user: NewUser<'_>) -> Result<User, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let user = insert_user(&tx, tenant_id, &new_user).await?;
        audit::record(
            &tx,
            NewAudit::new(tenant_id, "user", "user.created")
                .by(actor_id)
                .on(user.id)
                .with_details(json!({ "email": user.email, "role": user.role })),
        )
        .await?;

        tx.commit().await?;
        Ok(user)
    }

    pub async fn update(
        &self,
        tenant_id: Uuid,
        actor_id: Uuid,
        id: Uuid,
        changes: &UpdateUserRequest,
    ) -> Result<User, AppError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                &format!(
                    "UPDATE users SET
                        name = COALESCE($3, name),
                        role = COALESCE($4, role),
                        is_active = COALESCE($5, is_active),
                        updated_at = $6
                     WHERE id = $1 AND tenant_id = $2
                     RETURNING {}",
                    COLUMNS
                ),
                &[
                    &id,
                    &tenant_id,
                    &changes.name,
                    &changes.role.map(|r| r.as_str()),
                    &changes.is_active,
                    &Utc::now(),
                ],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;
        let user = from_row(&row)?;

        audit::record(
            &tx,
            NewAudit::new(tenant_id, "user", "user.updated")
                .by(actor_id)
                .on(id)
                .with_details(json!({
                    "name": changes.name,
                    "role": changes.role,
                    "isActive": changes.is_active,
                })),
        )
        .await?;

        tx.commit().await?;
        Ok(user)
    }

    /// Users are deactivated rather than deleted; proposals keep their author
    pub async fn deactivate(&self, tenant_id: Uuid, actor_id: Uuid, id: Uuid) -> Result<(), AppError> {
        if id == actor_id {
            return Err(AppError::BadRequest("You cannot deactivate your own account".to_string()));
        }

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let updated = tx
            .execute(
                "UPDATE users SET is_active = false, updated_at = now()
                 WHERE id = $1 AND tenant_id = $2",
                &[&id, &tenant_id],
            )
            .await?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }

        audit::record(
            &tx,
            NewAudit::new(tenant_id, "user", "user.deactivated").by(actor_id).on(id),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn touch_last_login(&self, id: Uuid) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client
            .execute("UPDATE users SET last_login = now() WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }
}

async fn insert_user(
    tx: &deadpool_postgres::Transaction<'_>,
    tenant_id: Uuid,
    user: &NewUser<'_>,
) -> Result<User, AppError> {
    let now = Utc::now();
    let row = tx
        .query_one(
            &format!(
                "INSERT INTO users (id, tenant_id, email, password_hash, name, role, is_active, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, true, $7, $7)
                 RETURNING {}",
                COLUMNS
            ),
            &[
                &Uuid::new_v4(),
                &tenant_id,
                &user.email,
                &user.password_hash,
                &user.name,
                &user.role.as_str(),
                &now,
            ],
        )
        .await?;
    from_row(&row)
}
