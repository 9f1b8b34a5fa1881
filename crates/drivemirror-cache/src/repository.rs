//! SQLite implementation of IStateRepository
//!
//! Concrete storage for accounts and file records. Handles domain type
//! conversion, credential encryption and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type                 | SQL Type | Strategy                                   |
//! |-----------------------------|----------|--------------------------------------------|
//! | AccountId, FileRecordId     | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | Email, RemoteId             | TEXT     | String via `.as_str()` / `::new()`         |
//! | Category                    | TEXT     | Slug via `.slug()` / `FromStr`             |
//! | access/refresh tokens       | TEXT     | `CredentialCipher` ciphertext              |
//! | DateTime<Utc>               | TEXT     | RFC 3339, microsecond precision            |
//! | bool                        | INTEGER  | 0 / 1                                      |
//! | PathBuf                     | TEXT     | Lossy UTF-8 string                         |

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use drivemirror_core::credentials::CredentialCipher;
use drivemirror_core::domain::{
    newtypes::{AccountId, Email, FileRecordId, RemoteId},
    Account, Category, Credentials, FileRecord,
};
use drivemirror_core::ports::{IStateRepository, RecordFilter};

use crate::CacheError;

/// SQLite-based implementation of the state repository port
///
/// Tokens are encrypted with the configured cipher before they are written
/// and decrypted when rows are read back.
pub struct SqliteStateRepository {
    pool: SqlitePool,
    cipher: CredentialCipher,
}

impl SqliteStateRepository {
    /// Creates a new repository over the given pool
    pub fn new(pool: SqlitePool, cipher: CredentialCipher) -> Self {
        Self { pool, cipher }
    }

    fn account_from_row(&self, row: &SqliteRow) -> Result<Account, CacheError> {
        let id_str: String = row.get("id");
        let email_str: String = row.get("email");
        let display_name: String = row.get("display_name");
        let access_token: String = row.get("access_token");
        let refresh_token: Option<String> = row.get("refresh_token");
        let expires_at: Option<String> = row.get("token_expires_at");
        let is_active: bool = row.get("is_active");
        let is_default: bool = row.get("is_default");
        let created_at: String = row.get("created_at");

        let id = AccountId::from_str(&id_str)
            .map_err(|e| CacheError::SerializationError(format!("Invalid account ID: {}", e)))?;
        let email = Email::new(email_str)
            .map_err(|e| CacheError::SerializationError(format!("Invalid email: {}", e)))?;

        let credentials = Credentials::new(
            self.cipher.decrypt(&access_token)?,
            self.cipher.decrypt_opt(refresh_token.as_deref())?,
            parse_optional_datetime(expires_at)?,
        );

        Ok(Account::with_id(
            id,
            email,
            display_name,
            credentials,
            is_active,
            is_default,
            parse_datetime(&created_at)?,
        ))
    }

    async fn fetch_accounts(&self, sql: &str) -> anyhow::Result<Vec<Account>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        let mut accounts = Vec::with_capacity(rows.len());
        for row in &rows {
            accounts.push(self.account_from_row(row)?);
        }
        Ok(accounts)
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime<Utc> from an RFC 3339 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Rows touched by hand through sqlite3 may carry its default format
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

/// SQLITE_CONSTRAINT_FOREIGNKEY
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";
/// SQLITE_CONSTRAINT_TRIGGER, raised by `ON DELETE RESTRICT` actions
const SQLITE_CONSTRAINT_TRIGGER: &str = "1811";

/// Whether a failed delete was blocked by rows that still reference it
fn is_reference_violation(err: &dyn sqlx::error::DatabaseError) -> bool {
    err.is_foreign_key_violation()
        || matches!(
            err.code().as_deref(),
            Some(SQLITE_CONSTRAINT_FOREIGNKEY | SQLITE_CONSTRAINT_TRIGGER)
        )
}

fn file_record_from_row(row: &SqliteRow) -> Result<FileRecord, CacheError> {
    let id_str: String = row.get("id");
    let category_str: String = row.get("category");
    let size_bytes: i64 = row.get("size_bytes");
    let download_count: i64 = row.get("download_count");
    let remote_file_id: Option<String> = row.get("remote_file_id");
    let remote_account_id: Option<String> = row.get("remote_account_id");
    let local_path: Option<String> = row.get("local_path");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let id = FileRecordId::from_str(&id_str)
        .map_err(|e| CacheError::SerializationError(format!("Invalid record ID: {}", e)))?;
    let category = Category::from_str(&category_str)
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;
    let remote_file_id = remote_file_id
        .map(RemoteId::new)
        .transpose()
        .map_err(|e| CacheError::SerializationError(format!("Invalid remote ID: {}", e)))?;
    let remote_account_id = remote_account_id
        .as_deref()
        .map(AccountId::from_str)
        .transpose()
        .map_err(|e| CacheError::SerializationError(format!("Invalid account ID: {}", e)))?;

    Ok(FileRecord {
        id,
        title: row.get("title"),
        description: row.get("description"),
        version: row.get("version"),
        category,
        original_name: row.get("original_name"),
        size_bytes: size_bytes.max(0) as u64,
        mime_type: row.get("mime_type"),
        download_count: download_count.max(0) as u64,
        sort_position: row.get("sort_position"),
        remote_file_id,
        remote_account_id,
        local_path: local_path.map(PathBuf::from),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

// ============================================================================
// IStateRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateRepository for SqliteStateRepository {
    // --- Account operations ---

    async fn save_account(&self, account: &Account) -> anyhow::Result<()> {
        let id = account.id().to_string();
        let credentials = account.credentials();
        let access_token = self.cipher.encrypt(&credentials.access_token)?;
        let refresh_token = self
            .cipher
            .encrypt_opt(credentials.refresh_token.as_deref())?;
        let expires_at = credentials.expires_at.as_ref().map(format_datetime);

        // UPSERT keeps the row in place; REPLACE would trip the file record FK
        sqlx::query(
            "INSERT INTO accounts \
             (id, email, display_name, access_token, refresh_token, token_expires_at, \
              is_active, is_default, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
              email = excluded.email, \
              display_name = excluded.display_name, \
              access_token = excluded.access_token, \
              refresh_token = excluded.refresh_token, \
              token_expires_at = excluded.token_expires_at, \
              is_active = excluded.is_active, \
              is_default = excluded.is_default",
        )
        .bind(&id)
        .bind(account.email().as_str())
        .bind(account.display_name())
        .bind(&access_token)
        .bind(&refresh_token)
        .bind(&expires_at)
        .bind(account.is_active())
        .bind(account.is_default())
        .bind(format_datetime(&account.created_at()))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save account {}", account.email()))?;

        tracing::trace!(account_id = %id, "Saved account");
        Ok(())
    }

    async fn get_account(&self, id: &AccountId) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(self.account_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn find_account_by_email(&self, email: &Email) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE email = ?")
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(self.account_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_default_account(&self) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query("SELECT * FROM accounts WHERE is_default = 1 LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(self.account_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>> {
        self.fetch_accounts("SELECT * FROM accounts ORDER BY created_at ASC, email ASC")
            .await
    }

    async fn list_active_accounts(&self) -> anyhow::Result<Vec<Account>> {
        self.fetch_accounts(
            "SELECT * FROM accounts WHERE is_active = 1 ORDER BY created_at ASC, email ASC",
        )
        .await
    }

    async fn update_credentials(
        &self,
        id: &AccountId,
        credentials: &Credentials,
    ) -> anyhow::Result<()> {
        let access_token = self.cipher.encrypt(&credentials.access_token)?;
        let refresh_token = self
            .cipher
            .encrypt_opt(credentials.refresh_token.as_deref())?;
        let expires_at = credentials.expires_at.as_ref().map(format_datetime);

        let result = sqlx::query(
            "UPDATE accounts SET access_token = ?, refresh_token = ?, token_expires_at = ? \
             WHERE id = ?",
        )
        .bind(&access_token)
        .bind(&refresh_token)
        .bind(&expires_at)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Account {} not found", id);
        }

        tracing::trace!(account_id = %id, "Updated credentials");
        Ok(())
    }

    async fn set_account_active(&self, id: &AccountId, active: bool) -> anyhow::Result<()> {
        let result = sqlx::query("UPDATE accounts SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Account {} not found", id);
        }

        tracing::trace!(account_id = %id, active, "Updated account active flag");
        Ok(())
    }

    async fn set_default_account(&self, id: &AccountId) -> anyhow::Result<()> {
        let id_str = id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE accounts SET is_default = 0 WHERE is_default = 1 AND id != ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE accounts SET is_default = 1, is_active = 1 WHERE id = ?")
            .bind(&id_str)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the cleared default
            anyhow::bail!("Account {} not found", id);
        }

        tx.commit().await?;

        tracing::trace!(account_id = %id_str, "Set default account");
        Ok(())
    }

    async fn delete_account(&self, id: &AccountId) -> anyhow::Result<()> {
        let id_str = id.to_string();

        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(&id_str)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                tracing::trace!(account_id = %id_str, "Deleted account");
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if is_reference_violation(&*db_err) => {
                anyhow::bail!("Account {} is still referenced by file records", id)
            }
            Err(e) => Err(e.into()),
        }
    }

    // --- File record operations ---

    async fn save_file_record(&self, record: &FileRecord) -> anyhow::Result<()> {
        let id = record.id.to_string();
        let local_path = record
            .local_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        sqlx::query(
            "INSERT INTO file_records \
             (id, title, description, version, category, original_name, size_bytes, \
              mime_type, download_count, sort_position, remote_file_id, remote_account_id, \
              local_path, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
              title = excluded.title, \
              description = excluded.description, \
              version = excluded.version, \
              category = excluded.category, \
              original_name = excluded.original_name, \
              size_bytes = excluded.size_bytes, \
              mime_type = excluded.mime_type, \
              download_count = excluded.download_count, \
              sort_position = excluded.sort_position, \
              remote_file_id = excluded.remote_file_id, \
              remote_account_id = excluded.remote_account_id, \
              local_path = excluded.local_path, \
              updated_at = excluded.updated_at",
        )
        .bind(&id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.version)
        .bind(record.category.slug())
        .bind(&record.original_name)
        .bind(record.size_bytes as i64)
        .bind(&record.mime_type)
        .bind(record.download_count as i64)
        .bind(record.sort_position)
        .bind(record.remote_file_id.as_ref().map(|r| r.as_str()))
        .bind(record.remote_account_id.map(|a| a.to_string()))
        .bind(&local_path)
        .bind(format_datetime(&record.created_at))
        .bind(format_datetime(&record.updated_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save file record {}", id))?;

        tracing::trace!(record_id = %id, "Saved file record");
        Ok(())
    }

    async fn get_file_record(&self, id: &FileRecordId) -> anyhow::Result<Option<FileRecord>> {
        let row = sqlx::query("SELECT * FROM file_records WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(file_record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn list_file_records(&self, filter: &RecordFilter) -> anyhow::Result<Vec<FileRecord>> {
        let mut sql = String::from("SELECT * FROM file_records WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(ref account_id) = filter.account_id {
            sql.push_str(" AND remote_account_id = ?");
            binds.push(account_id.to_string());
        }

        if let Some(category) = filter.category {
            sql.push_str(" AND category = ?");
            binds.push(category.slug().to_string());
        }

        if filter.remote_only {
            sql.push_str(" AND remote_file_id IS NOT NULL");
        }

        sql.push_str(" ORDER BY sort_position ASC, created_at DESC");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(file_record_from_row(row)?);
        }

        Ok(records)
    }

    async fn delete_file_record(&self, id: &FileRecordId) -> anyhow::Result<()> {
        let id_str = id.to_string();

        sqlx::query("DELETE FROM file_records WHERE id = ?")
            .bind(&id_str)
            .execute(&self.pool)
            .await?;

        tracing::trace!(record_id = %id_str, "Deleted file record");
        Ok(())
    }

    async fn increment_download_count(
        &self,
        id: &FileRecordId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE file_records SET download_count = download_count + 1, updated_at = ? \
             WHERE id = ?",
        )
        .bind(format_datetime(&at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("File record {} not found", id);
        }
        Ok(())
    }

    async fn next_sort_position(&self) -> anyhow::Result<i64> {
        let next: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(sort_position), -1) + 1 FROM file_records")
                .fetch_one(&self.pool)
                .await?;
        Ok(next)
    }
}
