use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, sqlite::SqliteRow, Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Round-trips a trivial query to confirm the database is reachable.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Connect)?;
        Ok(())
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns a handle for user accounts.
    pub fn users(&self) -> UserRepository {
        UserRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for the product catalogue.
    pub fn products(&self) -> ProductRepository {
        ProductRepository {
            pool: self.pool.clone(),
        }
    }

    /// Returns a handle for cookie-backed login sessions.
    pub fn sessions(&self) -> SessionRepository {
        SessionRepository {
            pool: self.pool.clone(),
        }
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

pub const ROLE_ADMIN: &str = "admin";

/// Public view of a user row. Credentials never leave the repository through this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
}

impl UserRecord {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            role: row.get("role"),
            created_at: row.get("created_at"),
        }
    }
}

/// User row together with its stored password material.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: UserRecord,
    pub password_hash: String,
    pub password_salt: String,
}

/// Data required to seed the administrative account.
pub struct NewAdmin<'a> {
    pub email: Cow<'a, str>,
    pub name: Cow<'a, str>,
    pub password_hash: Cow<'a, str>,
    pub password_salt: Cow<'a, str>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminSeedOutcome {
    Created,
    AlreadyPresent,
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates the admin account unless a user with the same email exists.
    ///
    /// Safe to call on every boot; an existing account is left untouched.
    pub async fn ensure_admin(&self, admin: NewAdmin<'_>) -> Result<AdminSeedOutcome, UserError> {
        let result = sqlx::query(
            "INSERT INTO users (id, email, name, role, password_hash, password_salt, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(email) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(admin.email.as_ref())
        .bind(admin.name.as_ref())
        .bind(ROLE_ADMIN)
        .bind(admin.password_hash.as_ref())
        .bind(admin.password_salt.as_ref())
        .bind(to_rfc3339(admin.created_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(AdminSeedOutcome::AlreadyPresent)
        } else {
            Ok(AdminSeedOutcome::Created)
        }
    }

    pub async fn list(&self) -> Result<Vec<UserRecord>, UserError> {
        let rows = sqlx::query(
            "SELECT id, email, name, role, created_at FROM users ORDER BY created_at, email",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(UserRecord::from_row).collect())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, UserError> {
        let row = sqlx::query("SELECT id, email, name, role, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(UserRecord::from_row))
    }

    pub async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, UserError> {
        let row = sqlx::query(
            "SELECT id, email, name, role, created_at, password_hash, password_salt \
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserCredentials {
            user: UserRecord::from_row(&row),
            password_hash: row.get("password_hash"),
            password_salt: row.get("password_salt"),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price_cents: i64,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ProductRecord {
    fn from_row(row: &SqliteRow) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            price_cents: row.get("price_cents"),
            image_url: row.get("image_url"),
            category: row.get("category"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub image_url: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProductError {
    #[error("product not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const PRODUCT_COLUMNS: &str =
    "id, name, description, price_cents, image_url, category, created_at, updated_at";

#[derive(Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub async fn list(&self) -> Result<Vec<ProductRecord>, ProductError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(ProductRecord::from_row).collect())
    }

    pub async fn find(&self, id: &str) -> Result<ProductRecord, ProductError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ProductError::NotFound)?;
        Ok(ProductRecord::from_row(&row))
    }

    pub async fn create(
        &self,
        product: NewProduct,
        now: DateTime<Utc>,
    ) -> Result<ProductRecord, ProductError> {
        let id = Uuid::new_v4().to_string();
        let timestamp = to_rfc3339(now);
        sqlx::query(
            "INSERT INTO products \
             (id, name, description, price_cents, image_url, category, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(&product.image_url)
        .bind(&product.category)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&self.pool)
        .await?;

        self.find(&id).await
    }

    pub async fn update(
        &self,
        id: &str,
        update: ProductUpdate,
        now: DateTime<Utc>,
    ) -> Result<ProductRecord, ProductError> {
        let result = sqlx::query(
            "UPDATE products SET \
                 name = COALESCE(?, name), \
                 description = COALESCE(?, description), \
                 price_cents = COALESCE(?, price_cents), \
                 image_url = COALESCE(?, image_url), \
                 category = COALESCE(?, category), \
                 updated_at = ? \
             WHERE id = ?",
        )
        .bind(update.name)
        .bind(update.description)
        .bind(update.price_cents)
        .bind(update.image_url)
        .bind(update.category)
        .bind(to_rfc3339(now))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ProductError::NotFound);
        }
        self.find(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ProductError> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ProductError::NotFound);
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("user does not exist")]
    MissingUser,
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Opens a session for `user_id` and returns its opaque token.
    pub async fn create(&self, user_id: &str, now: DateTime<Utc>) -> Result<String, SessionError> {
        let token = Uuid::new_v4().simple().to_string();
        let result = sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(user_id)
            .bind(to_rfc3339(now))
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(token),
            Err(sqlx::Error::Database(db_err)) => {
                if db_err.code() == Some(Cow::Borrowed("787")) {
                    return Err(SessionError::MissingUser);
                }
                Err(SessionError::Database(sqlx::Error::Database(db_err)))
            }
            Err(err) => Err(SessionError::Database(err)),
        }
    }

    pub async fn find_user(&self, token: &str) -> Result<Option<UserRecord>, SessionError> {
        let row = sqlx::query(
            "SELECT u.id, u.email, u.name, u.role, u.created_at \
             FROM sessions s JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(SessionError::Database)?;
        Ok(row.as_ref().map(UserRecord::from_row))
    }

    /// Removes the session; unknown tokens are ignored.
    pub async fn revoke(&self, token: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(SessionError::Database)?;
        Ok(())
    }
}

fn to_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
