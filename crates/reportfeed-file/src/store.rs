//! Filesystem storage for the file-backed backend.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use reportfeed_core::Result;
use reportfeed_core::error::{Error, InvalidInputError, ProtocolError, StoreError};
use reportfeed_core::record::{CREATED_AT_COLUMN, ID_COLUMN, OWNER_COLUMN};
use reportfeed_core::{Query, Record, RecordId, Row, TableName, UserId};

fn malformed(err: impl std::fmt::Display) -> Error {
    Error::Store(StoreError::Malformed {
        message: err.to_string(),
    })
}

/// Account metadata stored in the local backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAccount {
    /// The user id.
    pub id: String,
    /// Sign-in email, stored lowercased.
    pub email: String,
    /// Display name metadata.
    #[serde(default)]
    pub display_name: Option<String>,
    /// When the account was created.
    pub created_at: String,
    /// Password hash (bcrypt).
    pub password_hash: String,
}

/// An entry in the change log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChangeLogEvent {
    /// The table that changed.
    pub table: String,
    /// The affected row.
    pub id: String,
    /// The row's owner, when it has one.
    #[serde(default)]
    pub owner: Option<String>,
    /// ISO 8601 timestamp.
    pub time: String,
    /// The operation type.
    pub op: ChangeLogOp,
}

/// The type of change log operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChangeLogOp {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
}

/// Last issued `created_at`, in microseconds, so rows created in the same
/// microsecond still sort in creation order.
static LAST_TIMESTAMP_MICROS: AtomicI64 = AtomicI64::new(0);

fn next_timestamp() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_TIMESTAMP_MICROS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_TIMESTAMP_MICROS.compare_exchange_weak(
            prev,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
            Err(actual) => prev = actual,
        }
    }
}

/// Filesystem-backed storage.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a new file store at the given root directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the data directory.
    pub(crate) fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    fn accounts_dir(&self) -> PathBuf {
        self.store_dir().join("accounts")
    }

    fn tables_dir(&self) -> PathBuf {
        self.store_dir().join("tables")
    }

    fn account_path(&self, id: &UserId) -> PathBuf {
        self.accounts_dir().join(id.as_str()).join("account.json")
    }

    fn table_dir(&self, table: &TableName) -> PathBuf {
        self.tables_dir().join(table.as_str())
    }

    fn record_path(&self, table: &TableName, id: &RecordId) -> PathBuf {
        self.table_dir(table).join(format!("{}.json", id))
    }

    /// Get the change log path.
    pub(crate) fn changes_path(&self) -> PathBuf {
        self.store_dir().join("changes.jsonl")
    }

    fn changes_lock_path(&self) -> PathBuf {
        self.store_dir().join("changes.lock")
    }

    /// Write `content` to `path` through a temp file so readers never see a
    /// partial row.
    fn write_atomic(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// Append an event to the change log.
    fn append_change(&self, table: &TableName, record: &Record, op: ChangeLogOp) -> Result<()> {
        let changes_path = self.changes_path();
        fs::create_dir_all(self.store_dir())?;

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.changes_lock_path())?;

        lock_file.lock_exclusive()?;

        let event = ChangeLogEvent {
            table: table.to_string(),
            id: record.id().to_string(),
            owner: record.owner(OWNER_COLUMN).map(str::to_string),
            time: Utc::now().to_rfc3339(),
            op,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&changes_path)?;

        let line = serde_json::to_string(&event).map_err(malformed)?;

        writeln!(file, "{}", line)?;
        file.sync_data()?;

        lock_file.unlock()?;

        Ok(())
    }

    // ========================================================================
    // Accounts
    // ========================================================================

    #[instrument(skip(self, password_hash))]
    pub fn create_account(
        &self,
        email: &str,
        display_name: &str,
        password_hash: &str,
    ) -> Result<LocalAccount> {
        let id = UserId::new(Uuid::new_v4().to_string())?;

        let account = LocalAccount {
            id: id.to_string(),
            email: email.to_lowercase(),
            display_name: Some(display_name.to_string()),
            created_at: Utc::now().to_rfc3339(),
            password_hash: password_hash.to_string(),
        };

        self.save_account(&account)?;

        debug!(user = %id, "Created local account");

        Ok(account)
    }

    pub fn save_account(&self, account: &LocalAccount) -> Result<()> {
        let id = UserId::new(account.id.as_str())?;
        let content = serde_json::to_string_pretty(account).map_err(malformed)?;
        Self::write_atomic(&self.account_path(&id), &content)
    }

    pub fn get_account(&self, id: &UserId) -> Result<Option<LocalAccount>> {
        let account_path = self.account_path(id);

        if !account_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&account_path)?;
        let account: LocalAccount = serde_json::from_str(&content).map_err(malformed)?;

        Ok(Some(account))
    }

    pub fn list_accounts(&self) -> Result<Vec<LocalAccount>> {
        let accounts_dir = self.accounts_dir();

        if !accounts_dir.exists() {
            return Ok(Vec::new());
        }

        let mut accounts = Vec::new();

        for entry in fs::read_dir(&accounts_dir)? {
            let account_file = entry?.path().join("account.json");

            if account_file.exists() {
                let content = fs::read_to_string(&account_file)?;
                match serde_json::from_str::<LocalAccount>(&content) {
                    Ok(account) => accounts.push(account),
                    Err(e) => warn!(path = %account_file.display(), error = %e, "Skipping unreadable account"),
                }
            }
        }

        Ok(accounts)
    }

    pub fn find_account_by_email(&self, email: &str) -> Result<Option<LocalAccount>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .list_accounts()?
            .into_iter()
            .find(|a| a.email == email))
    }

    // ========================================================================
    // Rows
    // ========================================================================

    fn read_record(&self, path: &Path) -> Result<Record> {
        let content = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content).map_err(malformed)?;
        Record::new(value)
    }

    #[instrument(skip(self, payload), fields(%table))]
    pub fn insert(&self, table: &TableName, payload: &Row) -> Result<Record> {
        let id = match payload.get(ID_COLUMN) {
            Some(Value::String(s)) => RecordId::new(s.as_str())?,
            Some(Value::Number(n)) => RecordId::new(n.to_string())?,
            Some(_) => {
                return Err(InvalidInputError::Row {
                    reason: "'id' must be a string or number".to_string(),
                }
                .into());
            }
            None => RecordId::new(Uuid::new_v4().to_string())?,
        };

        let path = self.record_path(table, &id);
        if path.exists() {
            return Err(Error::Store(StoreError::Rejected(ProtocolError::new(
                409,
                Some("23505".to_string()),
                Some(format!("duplicate key value: {table}/{id}")),
            ))));
        }

        let mut row = payload.clone();
        row.insert(ID_COLUMN, id.as_str());
        row.insert(
            CREATED_AT_COLUMN,
            next_timestamp().to_rfc3339_opts(SecondsFormat::Micros, true),
        );

        let record = Record::new(row.into_value())?;
        let content = serde_json::to_string_pretty(record.row()).map_err(malformed)?;
        Self::write_atomic(&path, &content)?;

        self.append_change(table, &record, ChangeLogOp::Insert)?;

        debug!(%id, "Inserted row");

        Ok(record)
    }

    #[instrument(skip(self, patch), fields(%table, %id))]
    pub fn update(&self, table: &TableName, id: &RecordId, patch: &Row) -> Result<Record> {
        let path = self.record_path(table, id);

        if !path.exists() {
            return Err(Error::Store(StoreError::NotFound {
                table: table.clone(),
                id: id.clone(),
            }));
        }

        let current = self.read_record(&path)?;
        let mut row = current.row().clone();
        row.merge(patch);
        // Keys and creation time are owned by the store.
        row.insert(ID_COLUMN, id.as_str());
        row.insert(
            CREATED_AT_COLUMN,
            current
                .created_at()
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        );

        let record = Record::new(row.into_value())?;
        let content = serde_json::to_string_pretty(record.row()).map_err(malformed)?;
        Self::write_atomic(&path, &content)?;

        self.append_change(table, &record, ChangeLogOp::Update)?;

        debug!("Updated row");

        Ok(record)
    }

    pub fn get(&self, table: &TableName, id: &RecordId) -> Result<Option<Record>> {
        let path = self.record_path(table, id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_record(&path).map(Some)
    }

    #[instrument(skip(self), fields(table = %query.table))]
    pub fn query(&self, query: &Query) -> Result<Vec<Record>> {
        let dir = self.table_dir(&query.table);

        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match self.read_record(&path) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable row"),
            }
        }

        Ok(query.apply(records))
    }
}
