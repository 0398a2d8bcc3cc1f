use std::fmt;

use serde_json::Value;

use crate::model::AuthUser;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("query returned no rows")]
    NoRows,
    #[error("backend returned status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("{0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to decode backend payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("injected failure on {operation} {table}")]
    Injected { operation: Operation, table: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    IsNull(String),
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(column, _) | Filter::IsNull(column) => column,
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Filter::Eq(column, expected) => row.get(column) == Some(expected),
            Filter::IsNull(column) => row.get(column).is_none_or(Value::is_null),
        }
    }
}

/// One foreign relation pulled into each selected row, PostgREST style:
/// `alias:table(columns)` resolved through `foreign_key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub table: String,
    pub foreign_key: String,
    pub columns: Vec<String>,
    pub alias: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub embed: Option<Embed>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull(column.to_string()));
        self
    }

    pub fn embed(mut self, alias: &str, table: &str, foreign_key: &str, columns: &[&str]) -> Self {
        self.embed = Some(Embed {
            table: table.to_string(),
            foreign_key: foreign_key.to_string(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            alias: alias.to_string(),
        });
        self
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// PostgREST `select` parameter for this query.
    pub fn select_clause(&self) -> String {
        match &self.embed {
            Some(embed) => format!(
                "*,{}:{}({})",
                embed.alias,
                embed.table,
                embed.columns.join(",")
            ),
            None => "*".to_string(),
        }
    }
}

/// Row storage plus session authentication, the only collaborator the
/// gateway talks to.
pub trait Backend {
    fn current_user(&self) -> Result<Option<AuthUser>, BackendError>;

    fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, BackendError>;

    fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError>;

    fn sign_out(&self) -> Result<(), BackendError>;

    /// Inserts one row and returns it as stored.
    fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError>;

    fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError>;

    /// Applies `patch` to every matching row and returns how many changed.
    fn update(&self, table: &str, query: &Query, patch: Value) -> Result<usize, BackendError>;

    /// Single-row fetch; zero rows is `NoRows`.
    fn select_single(&self, table: &str, query: &Query) -> Result<Value, BackendError> {
        self.select(table, query)?
            .into_iter()
            .next()
            .ok_or(BackendError::NoRows)
    }
}

impl<B: Backend + ?Sized> Backend for &B {
    fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        (**self).current_user()
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        (**self).sign_up(email, password)
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        (**self).sign_in(email, password)
    }

    fn sign_out(&self) -> Result<(), BackendError> {
        (**self).sign_out()
    }

    fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        (**self).insert(table, row)
    }

    fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        (**self).select(table, query)
    }

    fn update(&self, table: &str, query: &Query, patch: Value) -> Result<usize, BackendError> {
        (**self).update(table, query, patch)
    }

    fn select_single(&self, table: &str, query: &Query) -> Result<Value, BackendError> {
        (**self).select_single(table, query)
    }
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        (**self).current_user()
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        (**self).sign_up(email, password)
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        (**self).sign_in(email, password)
    }

    fn sign_out(&self) -> Result<(), BackendError> {
        (**self).sign_out()
    }

    fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        (**self).insert(table, row)
    }

    fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        (**self).select(table, query)
    }

    fn update(&self, table: &str, query: &Query, patch: Value) -> Result<usize, BackendError> {
        (**self).update(table, query, patch)
    }

    fn select_single(&self, table: &str, query: &Query) -> Result<Value, BackendError> {
        (**self).select_single(table, query)
    }
}
