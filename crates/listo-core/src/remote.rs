use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, BackendError, Filter, Query};
use crate::model::AuthUser;

const SESSION_FILE: &str = "session.json";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const NO_ROWS_CODE: &str = "PGRST116";

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub url: String,
    pub anon_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

/// Persists the signed-in session between invocations.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    #[instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let session = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.path.display()))?;
        Ok(Some(session))
    }

    #[instrument(skip(self, session))]
    pub fn save(&self, session: Option<&Session>) -> anyhow::Result<()> {
        let Some(session) = session else {
            if self.path.exists() {
                fs::remove_file(&self.path)
                    .with_context(|| format!("failed removing {}", self.path.display()))?;
            }
            return Ok(());
        };

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut temp = NamedTempFile::new_in(dir)?;
        writeln!(temp, "{}", serde_json::to_string(session)?)?;
        temp.flush()?;
        temp.persist(&self.path)
            .map_err(|err| anyhow!("failed to persist {}: {}", self.path.display(), err))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    user: AuthUser,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl ErrorBody {
    fn text(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
    }

    fn is_no_rows(&self) -> bool {
        self.code.as_ref().and_then(Value::as_str) == Some(NO_ROWS_CODE)
    }
}

/// Supabase-compatible service: GoTrue auth plus PostgREST tables.
#[derive(Debug)]
pub struct RemoteBackend {
    client: Client,
    base: Url,
    anon_key: String,
    session: Mutex<Option<Session>>,
    store: SessionStore,
}

impl RemoteBackend {
    #[instrument(skip(settings, store), fields(url = %settings.url))]
    pub fn new(settings: &RemoteSettings, store: SessionStore) -> anyhow::Result<Self> {
        let base = Url::parse(settings.url.trim_end_matches('/'))
            .with_context(|| format!("invalid remote url: {}", settings.url))?;
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed building HTTP client for remote backend")?;
        let session = store.load()?;

        info!(
            url = %base,
            has_session = session.is_some(),
            "initialized remote backend"
        );

        Ok(Self {
            client,
            base,
            anon_key: settings.anon_key.clone(),
            session: Mutex::new(session),
            store,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        let joined = format!("{}/{}", self.base.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|err| BackendError::Transport(err.to_string()))
    }

    fn table_url(&self, table: &str, query: Option<&Query>) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        if let Some(query) = query {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", &query.select_clause());
            for filter in &query.filters {
                let condition = match filter {
                    Filter::Eq(_, value) => format!("eq.{}", filter_value(value)),
                    Filter::IsNull(_) => "is.null".to_string(),
                };
                pairs.append_pair(filter.column(), &condition);
            }
        }
        Ok(url)
    }

    fn bearer(&self) -> Result<String, BackendError> {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(BackendError::Unauthenticated)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        let token = self.bearer()?;
        Ok(request
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {token}")))
    }

    fn store_session(&self, session: Option<Session>) -> Result<(), BackendError> {
        self.store
            .save(session.as_ref())
            .map_err(|err| BackendError::Storage(format!("{err:#}")))?;
        *self.session.lock() = session;
        Ok(())
    }

    fn auth_request(&self, url: Url, body: &Value) -> Result<Value, BackendError> {
        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .map_err(transport)?;
        let status = response.status();
        let text = response.text().map_err(transport)?;
        if !status.is_success() {
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
            return Err(BackendError::Auth(
                body.text().unwrap_or_else(|| format!("HTTP {status}")),
            ));
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn credentials(email: &str, password: &str) -> Value {
        json!({ "email": email, "password": password })
    }
}

impl Backend for RemoteBackend {
    #[instrument(skip(self))]
    fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        let Ok(token) = self.bearer() else {
            return Ok(None);
        };

        let response = self
            .client
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .map_err(transport)?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            warn!("stored session rejected; clearing it");
            self.store_session(None)?;
            return Ok(None);
        }
        let text = read_success(response)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    #[instrument(skip(self, password))]
    fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let body = self.auth_request(
            self.endpoint("auth/v1/signup")?,
            &Self::credentials(email, password),
        )?;

        // Without email confirmation the service answers with a full session.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)?;
            let user = token.user.clone();
            self.store_session(Some(Session {
                access_token: token.access_token,
                refresh_token: token.refresh_token,
                user: token.user,
            }))?;
            return Ok(user);
        }
        Ok(serde_json::from_value(body)?)
    }

    #[instrument(skip(self, password))]
    fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let body = self.auth_request(url, &Self::credentials(email, password))?;
        let token: TokenResponse = serde_json::from_value(body)?;
        let user = token.user.clone();
        self.store_session(Some(Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            user: token.user,
        }))?;
        debug!(user_id = %user.id, "signed in remotely");
        Ok(user)
    }

    #[instrument(skip(self))]
    fn sign_out(&self) -> Result<(), BackendError> {
        if let Ok(request) = self.authorized(self.client.post(self.endpoint("auth/v1/logout")?)) {
            match request.send() {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "remote logout rejected");
                }
                Err(err) => warn!(error = %err, "remote logout failed"),
                Ok(_) => {}
            }
        }
        self.store_session(None)
    }

    #[instrument(skip(self, row))]
    fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        let request = self
            .authorized(self.client.post(self.table_url(table, None)?))?
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=representation")
            .body(serde_json::to_vec(&row)?);
        let text = read_success(request.send().map_err(transport)?)?;
        let rows: Vec<Value> = serde_json::from_str(&text)?;
        rows.into_iter().next().ok_or(BackendError::NoRows)
    }

    #[instrument(skip(self, query))]
    fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        let request = self.authorized(self.client.get(self.table_url(table, Some(query))?))?;
        let text = read_success(request.send().map_err(transport)?)?;
        Ok(serde_json::from_str(&text)?)
    }

    #[instrument(skip(self, query, patch))]
    fn update(&self, table: &str, query: &Query, patch: Value) -> Result<usize, BackendError> {
        let mut url = self.table_url(table, Some(query))?;
        // PATCH takes filters only.
        let filters: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != "select")
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut().clear().extend_pairs(filters);

        let request = self
            .authorized(self.client.patch(url))?
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return=representation")
            .body(serde_json::to_vec(&patch)?);
        let text = read_success(request.send().map_err(transport)?)?;
        let rows: Vec<Value> = serde_json::from_str(&text)?;
        Ok(rows.len())
    }

    #[instrument(skip(self, query))]
    fn select_single(&self, table: &str, query: &Query) -> Result<Value, BackendError> {
        let request = self
            .authorized(self.client.get(self.table_url(table, Some(query))?))?
            .header(ACCEPT, SINGLE_OBJECT);
        let text = read_success(request.send().map_err(transport)?)?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn read_success(response: Response) -> Result<String, BackendError> {
    let status = response.status();
    let text = response.text().map_err(transport)?;
    if status.is_success() {
        return Ok(text);
    }

    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    if body.is_no_rows() {
        return Err(BackendError::NoRows);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(BackendError::Unauthenticated);
    }
    Err(BackendError::Status {
        code: status.as_u16(),
        message: body.text().unwrap_or(text),
    })
}

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Transport(err.to_string())
}

fn filter_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tempfile::tempdir;
    use uuid::Uuid;

    use super::{RemoteBackend, RemoteSettings, Session, SessionStore, filter_value};
    use crate::backend::Query;
    use crate::model::AuthUser;

    fn backend(dir: &std::path::Path) -> RemoteBackend {
        let settings = RemoteSettings {
            url: "https://example.supabase.co/".to_string(),
            anon_key: "anon".to_string(),
            timeout: Duration::from_secs(5),
        };
        RemoteBackend::new(&settings, SessionStore::new(dir)).expect("backend")
    }

    #[test]
    fn table_url_encodes_filters_and_embed() {
        let temp = tempdir().expect("tempdir");
        let backend = backend(temp.path());
        let query = Query::new()
            .eq("user_id", "u-1")
            .is_null("deleted_at")
            .embed("category", "categories", "category_id", &["name"]);

        let url = backend.table_url("tasks", Some(&query)).expect("url");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(url.path(), "/rest/v1/tasks");
        assert_eq!(
            pairs,
            vec![
                ("select".to_string(), "*,category:categories(name)".to_string()),
                ("user_id".to_string(), "eq.u-1".to_string()),
                ("deleted_at".to_string(), "is.null".to_string()),
            ]
        );
    }

    #[test]
    fn session_store_round_trips_and_clears() {
        let temp = tempdir().expect("tempdir");
        let store = SessionStore::new(temp.path());
        assert!(store.load().expect("load").is_none());

        let session = Session {
            access_token: "token".to_string(),
            refresh_token: None,
            user: AuthUser {
                id: Uuid::new_v4(),
                email: Some("s@example.com".to_string()),
            },
        };
        store.save(Some(&session)).expect("save");
        assert_eq!(store.load().expect("load"), Some(session));

        store.save(None).expect("clear");
        assert!(store.load().expect("load").is_none());
    }

    #[test]
    fn filter_values_render_without_quotes() {
        assert_eq!(filter_value(&json!("abc")), "abc");
        assert_eq!(filter_value(&json!(true)), "true");
    }
}
