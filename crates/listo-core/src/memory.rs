use std::collections::{BTreeMap, HashSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::backend::{Backend, BackendError, Operation, Query};
use crate::model::{AuthUser, PROFILES_TABLE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    salt: String,
    password_digest: String,
}

impl Account {
    fn new(email: &str, password: &str) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        let password_digest = digest_password(&salt, password);
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            salt,
            password_digest,
        }
    }

    fn verify(&self, password: &str) -> bool {
        digest_password(&self.salt, password) == self.password_digest
    }

    fn user(&self) -> AuthUser {
        AuthUser {
            id: self.id,
            email: Some(self.email.clone()),
        }
    }
}

/// Everything the in-memory service holds; serializable so it can be
/// persisted by the local backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryState {
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<Value>>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub session: Option<AuthUser>,
}

#[derive(Debug, Default)]
struct Inner {
    state: MemoryState,
    failures: HashSet<(Operation, String)>,
    calls: usize,
}

/// In-process row storage with session auth and per-owner row visibility.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: MemoryState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                ..Inner::default()
            }),
        }
    }

    pub fn snapshot(&self) -> MemoryState {
        self.inner.lock().state.clone()
    }

    /// Makes every later `operation` on `table` fail until cleared.
    pub fn fail_on(&self, operation: Operation, table: &str) {
        self.inner.lock().failures.insert((operation, table.to_string()));
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// Number of table operations served so far.
    pub fn call_count(&self) -> usize {
        self.inner.lock().calls
    }

    /// Raw rows, including soft-deleted ones and rows of every owner.
    pub fn raw_rows(&self, table: &str) -> Vec<Value> {
        self.inner
            .lock()
            .state
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

impl Inner {
    fn begin(&mut self, operation: Operation, table: &str) -> Result<Uuid, BackendError> {
        self.calls += 1;
        if self.failures.contains(&(operation, table.to_string())) {
            return Err(BackendError::Injected {
                operation,
                table: table.to_string(),
            });
        }
        self.state
            .session
            .as_ref()
            .map(|user| user.id)
            .ok_or(BackendError::Unauthenticated)
    }

    fn visible<'a>(&'a self, table: &'a str, owner: Uuid) -> impl Iterator<Item = &'a Value> + 'a {
        self.state
            .tables
            .get(table)
            .into_iter()
            .flatten()
            .filter(move |row| owned_by(table, row, owner))
    }
}

impl Backend for MemoryBackend {
    fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        Ok(self.inner.lock().state.session.clone())
    }

    #[instrument(skip(self, password))]
    fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let mut inner = self.inner.lock();
        let normalized = email.trim().to_ascii_lowercase();
        if inner.state.accounts.iter().any(|a| a.email == normalized) {
            return Err(BackendError::Auth("User already registered".to_string()));
        }
        if password.len() < 6 {
            return Err(BackendError::Auth(
                "Password should be at least 6 characters".to_string(),
            ));
        }

        let account = Account::new(&normalized, password);
        let user = account.user();
        inner.state.accounts.push(account);
        inner.state.session = Some(user.clone());
        debug!(user_id = %user.id, "registered account");
        Ok(user)
    }

    #[instrument(skip(self, password))]
    fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let mut inner = self.inner.lock();
        let normalized = email.trim().to_ascii_lowercase();
        let user = inner
            .state
            .accounts
            .iter()
            .find(|a| a.email == normalized && a.verify(password))
            .map(Account::user)
            .ok_or_else(|| BackendError::Auth("Invalid login credentials".to_string()))?;
        inner.state.session = Some(user.clone());
        debug!(user_id = %user.id, "signed in");
        Ok(user)
    }

    fn sign_out(&self) -> Result<(), BackendError> {
        self.inner.lock().state.session = None;
        Ok(())
    }

    #[instrument(skip(self, row))]
    fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        let mut inner = self.inner.lock();
        let owner = inner.begin(Operation::Insert, table)?;

        let Value::Object(mut fields) = row else {
            return Err(BackendError::Status {
                code: 400,
                message: "row must be a JSON object".to_string(),
            });
        };
        fields
            .entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        fields.entry("deleted_at").or_insert(Value::Null);

        let row = Value::Object(fields);
        if !owned_by(table, &row, owner) {
            return Err(BackendError::Status {
                code: 403,
                message: format!(
                    "new row violates row-level security policy for table \"{table}\""
                ),
            });
        }

        inner
            .state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        trace!(table, "inserted row");
        Ok(row)
    }

    #[instrument(skip(self, query))]
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        let mut inner = self.inner.lock();
        let owner = inner.begin(Operation::Select, table)?;

        let mut rows: Vec<Value> = inner
            .visible(table, owner)
            .filter(|row| query.matches(row))
            .cloned()
            .collect();

        if let Some(embed) = &query.embed {
            for row in &mut rows {
                let related = row.get(&embed.foreign_key).cloned().and_then(|key| {
                    inner
                        .visible(&embed.table, owner)
                        .find(|candidate| candidate.get("id") == Some(&key))
                        .map(|candidate| {
                            let mut picked = Map::new();
                            for column in &embed.columns {
                                picked.insert(
                                    column.clone(),
                                    candidate.get(column).cloned().unwrap_or(Value::Null),
                                );
                            }
                            Value::Object(picked)
                        })
                });
                if let Value::Object(fields) = row {
                    fields.insert(embed.alias.clone(), related.unwrap_or(Value::Null));
                }
            }
        }

        trace!(table, count = rows.len(), "selected rows");
        Ok(rows)
    }

    #[instrument(skip(self, query, patch))]
    fn update(&self, table: &str, query: &Query, patch: Value) -> Result<usize, BackendError> {
        let mut inner = self.inner.lock();
        let owner = inner.begin(Operation::Update, table)?;

        let Value::Object(patch) = patch else {
            return Err(BackendError::Status {
                code: 400,
                message: "patch must be a JSON object".to_string(),
            });
        };

        let mut changed = 0;
        if let Some(rows) = inner.state.tables.get_mut(table) {
            for row in rows
                .iter_mut()
                .filter(|row| owned_by(table, row, owner) && query.matches(row))
            {
                if let Value::Object(fields) = row {
                    for (key, value) in &patch {
                        fields.insert(key.clone(), value.clone());
                    }
                    changed += 1;
                }
            }
        }

        trace!(table, changed, "updated rows");
        Ok(changed)
    }
}

fn owner_column(table: &str) -> &'static str {
    if table == PROFILES_TABLE { "id" } else { "user_id" }
}

fn owned_by(table: &str, row: &Value, owner: Uuid) -> bool {
    row.get(owner_column(table))
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .is_some_and(|id| id == owner)
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
