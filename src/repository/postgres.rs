//! PostgreSQL implementation of the persistence ports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::{
    ConfirmAccountRepository, RefreshTokenRepository, Result, RoleRepository,
    StorageError, UserRepository,
};
use crate::user::{ConfirmAccount, Coordinates, Profile, RefreshToken, Role, User};

const USER_COLUMNS: &str = "id, email, password, first_name, last_name, timezone, gender, \
     avatar, latitude, longitude, roles, enabled, confirmed, created_at";

/// PostgreSQL backed repositories.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new [`PgStore`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// User row as stored in the database.
#[derive(Debug, FromRow)]
struct UserRecord {
    id: String,
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    timezone: String,
    gender: Option<String>,
    avatar: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    roles: Vec<String>,
    enabled: bool,
    confirmed: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        Self {
            id: r.id,
            email: r.email,
            password: r.password,
            profile: Profile {
                first_name: r.first_name,
                last_name: r.last_name,
                timezone: r.timezone,
                gender: r.gender,
                avatar: r.avatar,
                coordinates: r
                    .latitude
                    .zip(r.longitude)
                    .map(|(lat, lon)| Coordinates { lat, lon }),
            },
            roles: r.roles,
            enabled: r.enabled,
            confirmed: r.confirmed,
            created_at: r.created_at,
        }
    }
}

/// Turn unique violations into [`StorageError::Duplicate`].
fn duplicate(entity: &'static str) -> impl FnOnce(sqlx::Error) -> StorageError {
    move |err| {
        let unique = err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());

        if unique {
            StorageError::Duplicate { entity }
        } else {
            StorageError::Sql(err)
        }
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn create(&self, user: &User) -> Result<()> {
        let coordinates = user.profile.coordinates;

        sqlx::query(
            r#"INSERT INTO users (id, email, password, first_name, last_name, timezone, gender,
                avatar, latitude, longitude, roles, enabled, confirmed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.profile.first_name)
        .bind(&user.profile.last_name)
        .bind(&user.profile.timezone)
        .bind(&user.profile.gender)
        .bind(&user.profile.avatar)
        .bind(coordinates.map(|c| c.lat))
        .bind(coordinates.map(|c| c.lon))
        .bind(&user.roles)
        .bind(user.enabled)
        .bind(user.confirmed)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(duplicate("email"))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record.map(User::from))
    }

    async fn update(&self, user: &User) -> Result<()> {
        let coordinates = user.profile.coordinates;

        let result = sqlx::query(
            r#"UPDATE users
                SET first_name = $1, last_name = $2, timezone = $3, gender = $4, avatar = $5,
                    latitude = $6, longitude = $7, roles = $8, enabled = $9, confirmed = $10
                WHERE id = $11"#,
        )
        .bind(&user.profile.first_name)
        .bind(&user.profile.last_name)
        .bind(&user.profile.timezone)
        .bind(&user.profile.gender)
        .bind(&user.profile.avatar)
        .bind(coordinates.map(|c| c.lat))
        .bind(coordinates.map(|c| c.lon))
        .bind(&user.roles)
        .bind(user.enabled)
        .bind(user.confirmed)
        .bind(&user.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound { entity: "user" });
        }

        Ok(())
    }
}

#[async_trait]
impl RoleRepository for PgStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>> {
        Ok(
            sqlx::query_as::<_, Role>("SELECT name, description FROM roles WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}

#[async_trait]
impl RefreshTokenRepository for PgStore {
    async fn store(&self, token: &RefreshToken) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO refresh_tokens (token, user_id, created_at) VALUES ($1, $2, $3)"#,
        )
        .bind(&token.token)
        .bind(&token.user_id)
        .bind(token.created_at)
        .execute(&self.pool)
        .await
        .map_err(duplicate("refresh token"))?;

        Ok(())
    }

    async fn find(&self, token: &str) -> Result<Option<RefreshToken>> {
        Ok(sqlx::query_as::<_, RefreshToken>(
            "SELECT token, user_id, created_at FROM refresh_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ConfirmAccountRepository for PgStore {
    async fn store(&self, record: &ConfirmAccount) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO confirm_accounts (token, user_id, expire_at) VALUES ($1, $2, $3)"#,
        )
        .bind(&record.token)
        .bind(&record.user_id)
        .bind(record.expire_at)
        .execute(&self.pool)
        .await
        .map_err(duplicate("confirmation token"))?;

        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<ConfirmAccount>> {
        // Row lock of DELETE makes concurrent callers wait, then miss.
        Ok(sqlx::query_as::<_, ConfirmAccount>(
            "DELETE FROM confirm_accounts WHERE token = $1 RETURNING token, user_id, expire_at",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM confirm_accounts WHERE expire_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
