use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::warn;

use super::repo_types::{NewUser, Page, Role, User, UserChanges, UserRow};

/// Key for the advisory lock serializing bootstrap-admin inserts.
const BOOTSTRAP_LOCK_KEY: i64 = 0x7573_6572_6164_6d6e;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    Conflict,
    #[error("user not found")]
    NotFound,
    #[error("an admin already exists")]
    AdminExists,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("corrupt user record: {0}")]
    Corrupt(String),
}

/// Persistent user collection. Implementations own the email-uniqueness
/// invariant; callers never check-then-insert.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> Result<User, StoreError>;
    /// Inserts `new` as an admin only while no admin exists.
    async fn create_first_admin(&self, new: NewUser) -> Result<User, StoreError>;
    async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list(&self, page: Page) -> Result<Vec<User>, StoreError>;
    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
    async fn admin_exists(&self) -> Result<bool, StoreError>;
}

const USER_COLUMNS: &str = "id, email, password_hash, is_active, role, created_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }
}

fn map_write_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::Conflict;
        }
    }
    StoreError::Database(e)
}

fn into_user(row: UserRow) -> Result<User, StoreError> {
    User::try_from(row).map_err(|e| {
        warn!(error = %e, "stored user has an invalid role");
        StoreError::Corrupt(e)
    })
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, password_hash, is_active, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(new.password_hash.as_str())
        .bind(new.is_active)
        .bind(new.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(map_write_err)?;
        into_user(row)
    }

    async fn create_first_admin(&self, new: NewUser) -> Result<User, StoreError> {
        let mut tx = self.db.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(BOOTSTRAP_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE role = 'admin')")
                .fetch_one(&mut *tx)
                .await?;
        if exists {
            return Err(StoreError::AdminExists);
        }

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (email, password_hash, is_active, role)
            VALUES ($1, $2, $3, 'admin')
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.email)
        .bind(new.password_hash.as_str())
        .bind(new.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_err)?;
        tx.commit().await?;
        into_user(row)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_user).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_user).transpose()
    }

    async fn list(&self, page: Page) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(into_user).collect()
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   password_hash = COALESCE($3, password_hash),
                   is_active = COALESCE($4, is_active),
                   role = COALESCE($5, role)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.email)
        .bind(changes.password_hash.map(|d| d.into_string()))
        .bind(changes.is_active)
        .bind(changes.role.map(|r| r.as_str()))
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_err)?;
        row.map(into_user).transpose()?.ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn admin_exists(&self) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE role = $1)")
            .bind(Role::Admin.as_str())
            .fetch_one(&self.db)
            .await?;
        Ok(exists)
    }
}
