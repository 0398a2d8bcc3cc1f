use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::datetime::{format_due, parse_due};
use crate::gateway::Gateway;
use crate::messages;
use crate::model::{AuthUser, Category, NewTask, Task, TaskPatch};

pub const TITLE_MIN_CREATE: usize = 3;
pub const TITLE_MAX_EDIT: usize = 100;
pub const DESCRIPTION_MAX: usize = 500;
pub const CATEGORY_NAME_MAX: usize = 100;

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// Result of submitting a form.
#[derive(Debug, Clone, PartialEq)]
pub enum Submit<T> {
    /// Validation failed; nothing was sent.
    Invalid,
    Failed(String),
    Done(T),
}

impl<T> Submit<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Submit::Done(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    /// Raw due date input, parsed on validation.
    pub due: String,
    pub category_id: Option<Uuid>,
}

impl TaskDraft {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub due: Option<String>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.due.is_none()
    }
}

/// A draft that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTask {
    pub title: String,
    pub description: String,
    pub due: NaiveDate,
    pub category_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Create,
    Edit,
}

fn validate_task(
    draft: &TaskDraft,
    today: NaiveDate,
    flow: Flow,
) -> Result<ValidTask, FieldErrors> {
    let mut errors = FieldErrors::default();

    let title = draft.title.trim();
    match flow {
        Flow::Create if title.chars().count() < TITLE_MIN_CREATE => {
            errors.title = Some(messages::TITLE_TOO_SHORT.to_string());
        }
        Flow::Edit if title.is_empty() => {
            errors.title = Some(messages::TITLE_REQUIRED.to_string());
        }
        Flow::Edit if draft.title.chars().count() > TITLE_MAX_EDIT => {
            errors.title = Some(messages::TITLE_TOO_LONG.to_string());
        }
        _ => {}
    }

    if draft.description.chars().count() > DESCRIPTION_MAX {
        errors.description = Some(messages::DESCRIPTION_TOO_LONG.to_string());
    }

    if draft.category_id.is_none() {
        errors.category = Some(messages::CATEGORY_REQUIRED.to_string());
    }

    let due = if draft.due.trim().is_empty() {
        errors.due = Some(messages::DUE_REQUIRED.to_string());
        None
    } else {
        match parse_due(&draft.due, today) {
            Ok(due) if flow == Flow::Edit && due <= today => {
                errors.due = Some(messages::DUE_BEFORE_TODAY.to_string());
                None
            }
            Ok(due) => Some(due),
            Err(err) => {
                debug!(error = %err, "unparseable due date");
                errors.due = Some(messages::DUE_INVALID.to_string());
                None
            }
        }
    };

    match (errors.is_empty(), due, draft.category_id) {
        (true, Some(due), Some(category_id)) => Ok(ValidTask {
            title: title.to_string(),
            description: draft.description.trim().to_string(),
            due,
            category_id,
        }),
        _ => Err(errors),
    }
}

/// Create flow: title of at least three characters, optional description
/// up to 500, a selected category and a due date.
pub fn validate_create(draft: &TaskDraft, today: NaiveDate) -> Result<ValidTask, FieldErrors> {
    validate_task(draft, today, Flow::Create)
}

/// Edit flow: required title up to 100 characters and a due date strictly
/// after `today`.
pub fn validate_edit(draft: &TaskDraft, today: NaiveDate) -> Result<ValidTask, FieldErrors> {
    validate_task(draft, today, Flow::Edit)
}

pub fn validate_category_name(name: &str) -> Result<String, String> {
    if name.trim().is_empty() {
        return Err(messages::CATEGORY_NAME_EMPTY.to_string());
    }
    let len = name.chars().count();
    if len > CATEGORY_NAME_MAX {
        return Err(messages::category_name_too_long(len));
    }
    Ok(name.trim().to_string())
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| match Regex::new(EMAIL_PATTERN) {
            Ok(re) => Some(re),
            Err(err) => {
                error!(error = %err, "email pattern failed to compile");
                None
            }
        })
        .as_ref()
}

fn looks_like_email(email: &str) -> bool {
    let email = email.trim();
    match email_regex() {
        Some(re) => re.is_match(email),
        None => email
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.')),
    }
}

#[derive(Debug, Default)]
pub struct CreateTaskForm {
    pub draft: TaskDraft,
    pub errors: FieldErrors,
    pub error: Option<String>,
    pub loading: bool,
    categories: Vec<Category>,
}

impl CreateTaskForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Fills the category picker; silently leaves it empty without a user.
    #[instrument(skip(self, gateway))]
    pub fn load_categories<B: Backend>(&mut self, gateway: &Gateway<B>) {
        let Ok(user) = gateway.current_user().into_result() else {
            return;
        };
        if let Ok(categories) = gateway.get_categories(user.id).into_result() {
            self.categories = categories;
        }
    }

    pub fn title_error(&self) -> bool {
        self.errors.title.is_some()
    }

    pub fn validate(&mut self, today: NaiveDate) -> Option<ValidTask> {
        match validate_create(&self.draft, today) {
            Ok(valid) => {
                self.errors = FieldErrors::default();
                Some(valid)
            }
            Err(errors) => {
                self.errors = errors;
                None
            }
        }
    }

    #[instrument(skip(self, gateway))]
    pub fn submit<B: Backend>(&mut self, gateway: &Gateway<B>, today: NaiveDate) -> Submit<Task> {
        self.error = None;
        let Some(valid) = self.validate(today) else {
            debug!(errors = ?self.errors, "create task draft rejected");
            return Submit::Invalid;
        };

        self.loading = true;
        let outcome = gateway.current_user().into_result().and_then(|user| {
            gateway
                .create_task(&NewTask {
                    title: valid.title,
                    description: valid.description,
                    due: valid.due,
                    completed: false,
                    category_id: valid.category_id,
                    user_id: user.id,
                })
                .into_result()
        });
        self.loading = false;

        match outcome {
            Ok(task) => {
                info!(task_id = %task.id, "task created");
                self.draft.clear();
                Submit::Done(task)
            }
            Err(message) => {
                self.error = Some(message.clone());
                Submit::Failed(message)
            }
        }
    }
}

#[derive(Debug)]
pub struct EditTaskForm {
    task_id: Uuid,
    pub task: Option<Task>,
    pub draft: TaskDraft,
    pub errors: FieldErrors,
    pub error: Option<String>,
    pub not_found: bool,
    pub loading: bool,
    pub loading_delete: bool,
    categories: Vec<Category>,
}

impl EditTaskForm {
    pub fn new(task_id: Uuid) -> Self {
        Self {
            task_id,
            task: None,
            draft: TaskDraft::default(),
            errors: FieldErrors::default(),
            error: None,
            not_found: false,
            loading: false,
            loading_delete: false,
            categories: Vec::new(),
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Loads the task into the draft and preselects its category by name.
    #[instrument(skip(self, gateway), fields(task_id = %self.task_id))]
    pub fn load<B: Backend>(&mut self, gateway: &Gateway<B>) {
        self.loading = true;
        self.error = None;

        let Ok(user) = gateway.current_user().into_result() else {
            self.error = Some(messages::NOT_AUTHENTICATED.to_string());
            self.loading = false;
            return;
        };

        let task = gateway.get_task_by_id(self.task_id).into_result().ok();
        match &task {
            Some(task) => {
                self.draft.title = task.title.clone();
                self.draft.description = task.description.clone().unwrap_or_default();
                self.draft.due = format_due(task.due);
            }
            None => {
                self.not_found = true;
                self.error = Some(messages::TASK_NOT_FOUND.to_string());
            }
        }

        if let Ok(categories) = gateway.get_categories(user.id).into_result() {
            if let Some(name) = task.as_ref().and_then(Task::category_name) {
                self.draft.category_id = categories
                    .iter()
                    .find(|c| c.name == name)
                    .map(|c| c.id);
            }
            self.categories = categories;
        }

        self.task = task;
        self.loading = false;
    }

    pub fn validate(&mut self, today: NaiveDate) -> Option<ValidTask> {
        match validate_edit(&self.draft, today) {
            Ok(valid) => {
                self.errors = FieldErrors::default();
                Some(valid)
            }
            Err(errors) => {
                self.errors = errors;
                None
            }
        }
    }

    #[instrument(skip(self, gateway), fields(task_id = %self.task_id))]
    pub fn submit<B: Backend>(&mut self, gateway: &Gateway<B>, today: NaiveDate) -> Submit<()> {
        let Some(valid) = self.validate(today) else {
            debug!(errors = ?self.errors, "edit task draft rejected");
            return Submit::Invalid;
        };

        self.loading = true;
        self.error = None;
        let patch = TaskPatch {
            title: Some(valid.title),
            description: Some(valid.description),
            due: Some(valid.due),
            category_id: Some(valid.category_id),
        };
        let outcome = gateway.update_task(self.task_id, &patch);
        self.loading = false;

        match outcome.into_result() {
            Ok(()) => Submit::Done(()),
            Err(message) => {
                self.error = Some(message.clone());
                Submit::Failed(message)
            }
        }
    }

    #[instrument(skip(self, gateway), fields(task_id = %self.task_id))]
    pub fn delete<B: Backend>(&mut self, gateway: &Gateway<B>) -> Submit<()> {
        self.loading_delete = true;
        self.error = None;
        let outcome = gateway.soft_delete_task(self.task_id);
        self.loading_delete = false;

        match outcome.into_result() {
            Ok(()) => Submit::Done(()),
            Err(message) => {
                self.error = Some(message.clone());
                Submit::Failed(message)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct CreateCategoryForm {
    pub name: String,
    pub error: Option<String>,
    pub loading: bool,
}

impl CreateCategoryForm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[instrument(skip(self, gateway))]
    pub fn submit<B: Backend>(&mut self, gateway: &Gateway<B>, user_id: Uuid) -> Submit<Category> {
        let name = match validate_category_name(&self.name) {
            Ok(name) => name,
            Err(message) => {
                self.error = Some(message);
                return Submit::Invalid;
            }
        };

        self.loading = true;
        let outcome = gateway.create_category(&name, user_id);
        self.loading = false;

        match outcome.into_result() {
            Ok(category) => {
                self.name.clear();
                self.error = None;
                Submit::Done(category)
            }
            Err(_) => {
                self.error = Some(messages::CATEGORY_CREATE_FAILED.to_string());
                Submit::Failed(messages::CATEGORY_CREATE_FAILED.to_string())
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub error: Option<String>,
    pub loading: bool,
}

impl LoginForm {
    #[instrument(skip(self, gateway), fields(email = %self.email))]
    pub fn submit<B: Backend>(&mut self, gateway: &Gateway<B>) -> Submit<AuthUser> {
        self.error = None;
        self.loading = true;
        let outcome = gateway.login(&self.email, &self.password);
        self.loading = false;

        match outcome.into_result() {
            Ok(user) => Submit::Done(user),
            Err(message) => {
                self.error = Some(message.clone());
                Submit::Failed(message)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub error: Option<String>,
    pub email_error: bool,
    pub password_error: bool,
    pub loading: bool,
}

impl RegisterForm {
    #[instrument(skip(self, gateway), fields(email = %self.email))]
    pub fn submit<B: Backend>(&mut self, gateway: &Gateway<B>) -> Submit<AuthUser> {
        self.error = None;
        self.email_error = false;
        self.password_error = false;

        if self.password != self.confirm_password {
            self.password_error = true;
            self.error = Some(messages::PASSWORDS_DIFFER.to_string());
            return Submit::Invalid;
        }
        if !looks_like_email(&self.email) {
            self.email_error = true;
            self.error = Some(messages::EMAIL_INVALID.to_string());
            return Submit::Invalid;
        }

        self.loading = true;
        let outcome = gateway.register(&self.email, &self.password, &self.name);
        self.loading = false;

        match outcome.into_result() {
            Ok(user) => Submit::Done(user),
            Err(message) if message.contains("already registered") => {
                warn!("email already registered");
                self.email_error = true;
                self.error = Some(messages::EMAIL_TAKEN.to_string());
                Submit::Failed(messages::EMAIL_TAKEN.to_string())
            }
            Err(message) => {
                self.error = Some(message.clone());
                Submit::Failed(message)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct RenameProfileForm {
    pub name: String,
    pub error: Option<String>,
}

impl RenameProfileForm {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: None,
        }
    }

    #[instrument(skip(self, gateway))]
    pub fn submit<B: Backend>(&mut self, gateway: &Gateway<B>) -> Submit<()> {
        let name = self.name.trim();
        if name.is_empty() {
            self.error = Some(messages::PROFILE_NAME_EMPTY.to_string());
            return Submit::Invalid;
        }

        match gateway.update_user_name(name).into_result() {
            Ok(()) => {
                self.error = None;
                Submit::Done(())
            }
            Err(message) => {
                self.error = Some(message.clone());
                Submit::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::{
        TaskDraft, email_regex, looks_like_email, validate_category_name, validate_create,
        validate_edit,
    };
    use crate::messages;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("date")
    }

    fn draft(title: &str, due: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: String::new(),
            due: due.to_string(),
            category_id: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn email_shape_is_checked_against_the_cached_pattern() {
        assert!(looks_like_email(" ana@example.com "));
        assert!(!looks_like_email("ana@example"));
        assert!(!looks_like_email("ana example@x.com"));
        assert!(std::ptr::eq(
            email_regex().expect("pattern compiles"),
            email_regex().expect("pattern compiles"),
        ));
    }

    #[test]
    fn huge_day_offset_is_an_invalid_due_date() {
        let errors =
            validate_create(&draft("Viaje", "+999999999999d"), today()).expect_err("offset");
        assert_eq!(errors.due.as_deref(), Some(messages::DUE_INVALID));
        assert!(errors.title.is_none());
    }

    #[test]
    fn create_requires_three_trimmed_characters() {
        let errors = validate_create(&draft("  ab  ", "2026-10-20"), today()).expect_err("short");
        assert_eq!(errors.title.as_deref(), Some(messages::TITLE_TOO_SHORT));
        assert!(errors.due.is_none());

        let valid = validate_create(&draft(" abc ", "2026-10-19"), today()).expect("valid");
        assert_eq!(valid.title, "abc");
    }

    #[test]
    fn edit_rejects_today_and_long_titles() {
        let errors = validate_edit(&draft("Pagar luz", "2026-10-19"), today()).expect_err("today");
        assert_eq!(errors.due.as_deref(), Some(messages::DUE_BEFORE_TODAY));

        let long = "x".repeat(101);
        let errors = validate_edit(&draft(&long, "2026-10-20"), today()).expect_err("long");
        assert_eq!(errors.title.as_deref(), Some(messages::TITLE_TOO_LONG));

        let errors = validate_edit(&draft("   ", "2026-10-20"), today()).expect_err("blank");
        assert_eq!(errors.title.as_deref(), Some(messages::TITLE_REQUIRED));
    }

    #[test]
    fn every_failing_field_is_reported() {
        let empty = TaskDraft {
            description: "d".repeat(501),
            ..TaskDraft::default()
        };
        let errors = validate_create(&empty, today()).expect_err("empty");
        assert!(errors.title.is_some());
        assert!(errors.description.is_some());
        assert_eq!(errors.category.as_deref(), Some(messages::CATEGORY_REQUIRED));
        assert_eq!(errors.due.as_deref(), Some(messages::DUE_REQUIRED));
    }

    #[test]
    fn category_names_are_bounded() {
        assert_eq!(
            validate_category_name("   "),
            Err(messages::CATEGORY_NAME_EMPTY.to_string())
        );
        assert_eq!(
            validate_category_name(&"c".repeat(101)),
            Err("Máximo 100 caracteres (actual: 101)".to_string())
        );
        assert_eq!(validate_category_name(" hogar "), Ok("hogar".to_string()));
        assert!(validate_category_name(&"c".repeat(100)).is_ok());
    }
}
