//! User repository trait and SQLite implementation

use crate::error::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_auth::User;
use sqlx::{query, query_as, FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

type Result<T> = std::result::Result<T, RepositoryError>;

/// Fields for a user created on first login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub google_id: String,
    pub email: String,
    pub name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>>;

    /// Return the user for `new_user.google_id`, creating it if absent.
    ///
    /// An existing row is returned unchanged. Concurrent first logins for
    /// the same subject converge on one row.
    async fn find_or_create(&self, new_user: &NewUser, now: DateTime<Utc>) -> Result<User>;
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    google_id: String,
    email: String,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
    created_at: i64,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self> {
        let created_at = DateTime::<Utc>::from_timestamp(row.created_at, 0).ok_or_else(|| {
            RepositoryError::CorruptRow(format!("created_at out of range for {}", row.id))
        })?;
        Ok(User {
            id: row.id,
            google_id: row.google_id,
            email: row.email,
            name: row.name,
            given_name: row.given_name,
            family_name: row.family_name,
            picture: row.picture,
            created_at,
        })
    }
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        query_as::<_, UserRow>("SELECT * FROM users WHERE google_id = ?")
            .bind(google_id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_or_create(&self, new_user: &NewUser, now: DateTime<Utc>) -> Result<User> {
        let inserted = query(
            r#"
            INSERT INTO users (
                id, google_id, email, name, given_name, family_name, picture, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(google_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&new_user.google_id)
        .bind(&new_user.email)
        .bind(&new_user.name)
        .bind(&new_user.given_name)
        .bind(&new_user.family_name)
        .bind(&new_user.picture)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            debug!(google_id = %new_user.google_id, "Created user");
        }

        self.find_by_google_id(&new_user.google_id)
            .await?
            .ok_or_else(|| {
                RepositoryError::CorruptRow(format!(
                    "user for subject {} missing after insert",
                    new_user.google_id
                ))
            })
    }
}
