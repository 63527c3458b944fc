//! Credential store: persistence for account records.
//!
//! The store is the only arbiter of username/email uniqueness. Callers must
//! treat [`StoreError::Conflict`] as the authoritative duplicate signal.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::accounts::model::{Account, NewAccount, ProfileChanges, Role};

pub const USERNAME_CONSTRAINT: &str = "accounts_username_key";
pub const EMAIL_CONSTRAINT: &str = "accounts_email_key";

const ACCOUNT_COLUMNS: &str = r#"
    id, username, email, password_hash, first_name, last_name, role, is_staff,
    phone_number, gender, date_of_birth, nationality, address, city, state,
    postal_code, country, profile_picture, bio, website, business_name,
    business_license, email_verified, phone_verified, identity_verified,
    license_verified, language_preference, receive_notifications, receive_sms,
    created_at, updated_at, last_login_at
"#;

/// Field whose uniqueness constraint rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
}

impl UniqueField {
    pub fn as_str(&self) -> &'static str {
        match self {
            UniqueField::Username => "username",
            UniqueField::Email => "email",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{} already taken", .0.as_str())]
    Conflict(UniqueField),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create(&self, new: NewAccount) -> Result<Account, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn find_by_id_and_role(&self, id: Uuid, role: Role)
        -> Result<Option<Account>, StoreError>;
    /// Newest first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Account>, StoreError>;
    /// Writes only the columns present in `changes`, in one statement, and
    /// bumps `updated_at`. `None` when the account does not exist.
    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<Account>, StoreError>;
    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<bool, StoreError>;
    async fn set_profile_picture(&self, id: Uuid, key: Option<&str>) -> Result<bool, StoreError>;
    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError>;
    /// `false` when no such account existed.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some(USERNAME_CONSTRAINT) => return StoreError::Conflict(UniqueField::Username),
                Some(EMAIL_CONSTRAINT) => return StoreError::Conflict(UniqueField::Email),
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

fn push_set<'a, T>(query: &mut QueryBuilder<'a, Postgres>, column: &str, value: &Option<T>)
where
    T: Clone + Send + 'a + sqlx::Encode<'a, Postgres> + sqlx::Type<Postgres>,
{
    if let Some(v) = value {
        query.push(", ").push(column).push(" = ").push_bind(v.clone());
    }
}

fn profile_update_query(id: Uuid, c: &ProfileChanges) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("UPDATE accounts SET updated_at = now()");
    push_set(&mut query, "first_name", &c.first_name);
    push_set(&mut query, "last_name", &c.last_name);
    push_set(&mut query, "phone_number", &c.phone_number);
    push_set(&mut query, "gender", &c.gender);
    push_set(&mut query, "date_of_birth", &c.date_of_birth);
    push_set(&mut query, "nationality", &c.nationality);
    push_set(&mut query, "address", &c.address);
    push_set(&mut query, "city", &c.city);
    push_set(&mut query, "state", &c.state);
    push_set(&mut query, "postal_code", &c.postal_code);
    push_set(&mut query, "country", &c.country);
    push_set(&mut query, "bio", &c.bio);
    push_set(&mut query, "website", &c.website);
    push_set(&mut query, "business_name", &c.business_name);
    push_set(&mut query, "business_license", &c.business_license);
    push_set(&mut query, "language_preference", &c.language_preference);
    push_set(&mut query, "receive_notifications", &c.receive_notifications);
    push_set(&mut query, "receive_sms", &c.receive_sms);
    query.push(" WHERE id = ").push_bind(id);
    query.push(" RETURNING ").push(ACCOUNT_COLUMNS);
    query
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn create(&self, new: NewAccount) -> Result<Account, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO accounts (username, email, password_hash, first_name, last_name, role, phone_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(new.role)
            .bind(&new.phone_number)
            .fetch_one(&self.db)
            .await
            .map_err(map_unique_violation)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(account)
    }

    async fn find_by_id_and_role(
        &self,
        id: Uuid,
        role: Role,
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND role = $2");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .bind(role)
            .fetch_optional(&self.db)
            .await?;
        Ok(account)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Account>, StoreError> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, Account>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<Account>, StoreError> {
        let mut query = profile_update_query(id, changes);
        let account = query
            .build_query_as::<Account>()
            .fetch_optional(&self.db)
            .await?;
        Ok(account)
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE accounts SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(hash)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_profile_picture(&self, id: Uuid, key: Option<&str>) -> Result<bool, StoreError> {
        let res = sqlx::query(
            "UPDATE accounts SET profile_picture = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(key)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE accounts SET last_login_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() == 1)
    }
}
