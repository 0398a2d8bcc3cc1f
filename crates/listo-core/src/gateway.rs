use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::backend::{Backend, BackendError, Query};
use crate::messages;
use crate::model::{
    AuthUser, CATEGORIES_TABLE, Category, DEFAULT_CATEGORY_NAME, NewCategory, NewTask,
    PROFILES_TABLE, Profile, ProfileRow, TASKS_TABLE, Task, TaskPatch,
};

/// Uniform result of every remote operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or(messages::UNKNOWN_ERROR)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(self
                .error
                .unwrap_or_else(|| messages::UNKNOWN_ERROR.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum GatewayFailure {
    #[error("no authenticated user")]
    NotAuthenticated,
    #[error("no {0} row matched")]
    NoMatch(&'static str),
    /// Carries a message meant for the user verbatim.
    #[error("{0}")]
    Reported(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("failed to decode rows: {0}")]
    Decode(#[from] serde_json::Error),
}

type Outcome<T> = Result<T, GatewayFailure>;

/// Wraps an injected backend and turns every operation into an
/// [`Envelope`]. Nothing raised below this boundary escapes it.
#[derive(Debug)]
pub struct Gateway<B> {
    backend: B,
}

impl<B: Backend> Gateway<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn settle<T>(operation: &'static str, fallback: &str, outcome: Outcome<T>) -> Envelope<T> {
        match outcome {
            Ok(data) => {
                debug!(operation, "gateway operation succeeded");
                Envelope::ok(data)
            }
            Err(GatewayFailure::Reported(message)) => {
                info!(operation, message = %message, "gateway operation refused");
                Envelope::fail(message)
            }
            Err(err) => {
                error!(operation, error = %err, "gateway operation failed");
                Envelope::fail(fallback)
            }
        }
    }

    fn require_user(&self) -> Outcome<AuthUser> {
        self.backend
            .current_user()?
            .ok_or(GatewayFailure::NotAuthenticated)
    }

    fn rows<T: DeserializeOwned>(rows: Vec<Value>) -> Outcome<Vec<T>> {
        Ok(serde_json::from_value(Value::Array(rows))?)
    }

    fn update_one(&self, table: &'static str, id: Uuid, patch: Value) -> Outcome<()> {
        let changed = self
            .backend
            .update(table, &Query::new().eq("id", id.to_string()), patch)?;
        if changed == 0 {
            return Err(GatewayFailure::NoMatch(table));
        }
        Ok(())
    }

    fn task_query(user: &AuthUser) -> Query {
        Query::new()
            .eq("user_id", user.id.to_string())
            .is_null("deleted_at")
            .embed("category", CATEGORIES_TABLE, "category_id", &["name"])
    }

    // -- session ----------------------------------------------------------

    #[instrument(skip(self))]
    pub fn current_user(&self) -> Envelope<AuthUser> {
        Self::settle("current_user", messages::NOT_AUTHENTICATED, self.require_user())
    }

    #[instrument(skip(self, password))]
    pub fn login(&self, email: &str, password: &str) -> Envelope<AuthUser> {
        match self.backend.sign_in(email.trim(), password) {
            Ok(user) => {
                info!(user_id = %user.id, "logged in");
                Envelope::ok(user)
            }
            Err(err) => {
                error!(error = %err, "login failed");
                Envelope::fail(err.to_string())
            }
        }
    }

    /// Signs up, then creates the profile row and the default category.
    #[instrument(skip(self, password))]
    pub fn register(&self, email: &str, password: &str, name: &str) -> Envelope<AuthUser> {
        let outcome = (|| -> Result<AuthUser, BackendError> {
            let user = self.backend.sign_up(email.trim(), password)?;
            self.backend.insert(
                PROFILES_TABLE,
                json!({ "id": user.id, "name": name.trim() }),
            )?;
            self.backend.insert(
                CATEGORIES_TABLE,
                serde_json::to_value(NewCategory {
                    name: DEFAULT_CATEGORY_NAME.to_string(),
                    user_id: user.id,
                })?,
            )?;
            Ok(user)
        })();

        match outcome {
            Ok(user) => {
                info!(user_id = %user.id, "registered");
                Envelope::ok(user)
            }
            Err(err) => {
                error!(error = %err, "registration failed");
                Envelope::fail(err.to_string())
            }
        }
    }

    #[instrument(skip(self))]
    pub fn logout(&self) -> Envelope<()> {
        let outcome = self.backend.sign_out().map_err(GatewayFailure::from);
        Self::settle("logout", messages::LOGOUT_FAILED, outcome)
    }

    // -- tasks ------------------------------------------------------------

    #[instrument(skip(self))]
    pub fn get_all_tasks(&self) -> Envelope<Vec<Task>> {
        let outcome = self.require_user().and_then(|user| {
            Self::rows(self.backend.select(TASKS_TABLE, &Self::task_query(&user))?)
        });
        Self::settle("get_all_tasks", messages::TASKS_LOAD_FAILED, outcome)
    }

    #[instrument(skip(self))]
    pub fn get_tasks_by_category(&self, category_id: Uuid) -> Envelope<Vec<Task>> {
        let outcome = self.require_user().and_then(|user| {
            let query = Self::task_query(&user).eq("category_id", category_id.to_string());
            Self::rows(self.backend.select(TASKS_TABLE, &query)?)
        });
        Self::settle(
            "get_tasks_by_category",
            messages::CATEGORY_TASKS_LOAD_FAILED,
            outcome,
        )
    }

    #[instrument(skip(self))]
    pub fn get_task_by_id(&self, task_id: Uuid) -> Envelope<Task> {
        let outcome = self.require_user().and_then(|user| {
            let query = Self::task_query(&user).eq("id", task_id.to_string());
            match self.backend.select_single(TASKS_TABLE, &query) {
                Ok(row) => Ok(serde_json::from_value(row)?),
                Err(BackendError::NoRows) => {
                    Err(GatewayFailure::Reported(messages::TASK_NOT_FOUND.to_string()))
                }
                Err(err) => Err(err.into()),
            }
        });
        Self::settle("get_task_by_id", messages::TASK_LOAD_FAILED, outcome)
    }

    #[instrument(skip(self, task), fields(title_len = task.title.len()))]
    pub fn create_task(&self, task: &NewTask) -> Envelope<Task> {
        let outcome = serde_json::to_value(task)
            .map_err(GatewayFailure::from)
            .and_then(|row| Ok(self.backend.insert(TASKS_TABLE, row)?))
            .and_then(|row| Ok(serde_json::from_value(row)?));
        Self::settle("create_task", messages::TASK_CREATE_FAILED, outcome)
    }

    #[instrument(skip(self))]
    pub fn update_task_status(&self, task_id: Uuid, completed: bool) -> Envelope<()> {
        let outcome = self.update_one(TASKS_TABLE, task_id, json!({ "completed": completed }));
        Self::settle("update_task_status", messages::TASK_STATUS_FAILED, outcome)
    }

    #[instrument(skip(self, patch))]
    pub fn update_task(&self, task_id: Uuid, patch: &TaskPatch) -> Envelope<()> {
        let outcome = serde_json::to_value(patch)
            .map_err(GatewayFailure::from)
            .and_then(|patch| self.update_one(TASKS_TABLE, task_id, patch));
        Self::settle("update_task", messages::TASK_UPDATE_FAILED, outcome)
    }

    #[instrument(skip(self))]
    pub fn soft_delete_task(&self, task_id: Uuid) -> Envelope<()> {
        let outcome = self.update_one(TASKS_TABLE, task_id, json!({ "deleted_at": Utc::now() }));
        Self::settle("soft_delete_task", messages::TASK_DELETE_FAILED, outcome)
    }

    // -- categories -------------------------------------------------------

    #[instrument(skip(self))]
    pub fn create_category(&self, name: &str, user_id: Uuid) -> Envelope<Category> {
        let outcome = serde_json::to_value(NewCategory {
            name: name.to_string(),
            user_id,
        })
        .map_err(GatewayFailure::from)
        .and_then(|row| Ok(self.backend.insert(CATEGORIES_TABLE, row)?))
        .and_then(|row| Ok(serde_json::from_value(row)?));
        Self::settle("create_category", messages::CATEGORY_CREATE_FAILED, outcome)
    }

    #[instrument(skip(self))]
    pub fn get_categories(&self, user_id: Uuid) -> Envelope<Vec<Category>> {
        let query = Query::new()
            .eq("user_id", user_id.to_string())
            .is_null("deleted_at");
        let outcome = self
            .backend
            .select(CATEGORIES_TABLE, &query)
            .map_err(GatewayFailure::from)
            .and_then(Self::rows);
        Self::settle("get_categories", messages::CATEGORIES_LOAD_FAILED, outcome)
    }

    #[instrument(skip(self))]
    pub fn get_all_categories_with_deleted(&self, user_id: Uuid) -> Envelope<Vec<Category>> {
        let query = Query::new().eq("user_id", user_id.to_string());
        let outcome = self
            .backend
            .select(CATEGORIES_TABLE, &query)
            .map_err(GatewayFailure::from)
            .and_then(Self::rows);
        Self::settle(
            "get_all_categories_with_deleted",
            messages::CATEGORIES_LOAD_FAILED,
            outcome,
        )
    }

    #[instrument(skip(self))]
    pub fn update_category(&self, category_id: Uuid, name: &str) -> Envelope<()> {
        let outcome = self.update_one(CATEGORIES_TABLE, category_id, json!({ "name": name }));
        Self::settle("update_category", messages::CATEGORY_UPDATE_FAILED, outcome)
    }

    /// Refuses while any task, soft-deleted ones included, still points at
    /// the category.
    #[instrument(skip(self))]
    pub fn soft_delete_category(&self, category_id: Uuid) -> Envelope<()> {
        let outcome = (|| -> Outcome<()> {
            let referencing = self.backend.select(
                TASKS_TABLE,
                &Query::new().eq("category_id", category_id.to_string()),
            )?;
            if !referencing.is_empty() {
                debug!(count = referencing.len(), "category still referenced");
                return Err(GatewayFailure::Reported(
                    messages::CATEGORY_HAS_TASKS.to_string(),
                ));
            }
            self.update_one(
                CATEGORIES_TABLE,
                category_id,
                json!({ "deleted_at": Utc::now() }),
            )
        })();
        Self::settle("soft_delete_category", messages::CATEGORY_DELETE_FAILED, outcome)
    }

    // -- profile ----------------------------------------------------------

    /// A missing profile row still yields a profile with default fields.
    #[instrument(skip(self))]
    pub fn get_profile(&self) -> Envelope<Profile> {
        let outcome = self.require_user().and_then(|user| {
            let query = Query::new().eq("id", user.id.to_string());
            let row: Option<ProfileRow> = match self.backend.select_single(PROFILES_TABLE, &query) {
                Ok(row) => Some(serde_json::from_value(row)?),
                Err(BackendError::NoRows) => None,
                Err(err) => return Err(err.into()),
            };

            let name = row
                .as_ref()
                .and_then(|r| r.name.clone())
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| messages::DEFAULT_PROFILE_NAME.to_string());
            Ok(Profile {
                id: user.id,
                name,
                email: user
                    .email
                    .clone()
                    .unwrap_or_else(|| messages::UNKNOWN_EMAIL.to_string()),
                updated_at: row.and_then(|r| r.updated_at),
            })
        });
        Self::settle("get_profile", messages::PROFILE_LOAD_FAILED, outcome)
    }

    #[instrument(skip(self))]
    pub fn update_user_name(&self, name: &str) -> Envelope<()> {
        let outcome = self.require_user().and_then(|user| {
            self.update_one(
                PROFILES_TABLE,
                user.id,
                json!({ "name": name, "updated_at": Utc::now() }),
            )
        });
        Self::settle("update_user_name", messages::PROFILE_RENAME_FAILED, outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::{Envelope, Gateway};
    use crate::backend::Operation;
    use crate::memory::MemoryBackend;
    use crate::messages;
    use crate::model::NewTask;

    fn signed_in() -> Gateway<MemoryBackend> {
        let gateway = Gateway::new(MemoryBackend::new());
        assert!(gateway.register("g@example.com", "secret1", "Gabi").success);
        gateway
    }

    #[test]
    fn envelope_into_result_prefers_error_text() {
        let env: Envelope<u8> = Envelope::fail("nope");
        assert_eq!(env.into_result(), Err("nope".to_string()));
        assert_eq!(Envelope::ok(3_u8).into_result(), Ok(3));
    }

    #[test]
    fn register_creates_profile_and_default_category() {
        let gateway = signed_in();
        let user = gateway.current_user().into_result().expect("user");

        let categories = gateway.get_categories(user.id).into_result().expect("categories");
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "General");

        let profile = gateway.get_profile().into_result().expect("profile");
        assert_eq!(profile.name, "Gabi");
        assert_eq!(profile.email, "g@example.com");
    }

    #[test]
    fn reads_without_session_fail_with_fixed_message() {
        let gateway = Gateway::new(MemoryBackend::new());
        let env = gateway.get_all_tasks();
        assert!(!env.success);
        assert_eq!(env.error.as_deref(), Some(messages::TASKS_LOAD_FAILED));
    }

    #[test]
    fn backend_failures_map_to_envelope() {
        let gateway = signed_in();
        let user = gateway.current_user().into_result().expect("user");
        let category = gateway
            .get_categories(user.id)
            .into_result()
            .expect("categories")[0]
            .id;
        gateway.backend().fail_on(Operation::Insert, "tasks");

        let env = gateway.create_task(&NewTask {
            title: "Leer".to_string(),
            description: String::new(),
            due: NaiveDate::from_ymd_opt(2030, 1, 1).expect("date"),
            completed: false,
            category_id: category,
            user_id: user.id,
        });
        assert_eq!(env, Envelope::fail(messages::TASK_CREATE_FAILED));
    }
}
