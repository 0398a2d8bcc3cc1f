use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TASKS_TABLE: &str = "tasks";
pub const CATEGORIES_TABLE: &str = "categories";
pub const PROFILES_TABLE: &str = "profiles";

/// Category created for every new account.
pub const DEFAULT_CATEGORY_NAME: &str = "General";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    pub due: NaiveDate,

    #[serde(default)]
    pub completed: bool,

    pub category_id: Uuid,

    /// Denormalized category, embedded at read time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryRef>,

    #[serde(default)]
    pub user_id: Option<Uuid>,

    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn category_name(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.name.as_str())
    }

    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.due < today
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub user_id: Uuid,

    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Row shape of the `profiles` table; the email lives on the auth principal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileRow {
    pub id: Uuid,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due: NaiveDate,
    pub completed: bool,
    pub category_id: Uuid,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub user_id: Uuid,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use super::{Task, TaskPatch};

    #[test]
    fn task_row_with_embedded_category_deserializes() {
        let row = json!({
            "id": "7c1c4c8e-0f7e-4a52-9d77-1f0f5b0ad001",
            "title": "Pay rent",
            "description": null,
            "due": "2026-11-01",
            "completed": false,
            "category_id": "7c1c4c8e-0f7e-4a52-9d77-1f0f5b0ad002",
            "user_id": "7c1c4c8e-0f7e-4a52-9d77-1f0f5b0ad003",
            "deleted_at": null,
            "category": { "name": "hogar" }
        });

        let task: Task = serde_json::from_value(row).expect("task row");
        assert_eq!(task.category_name(), Some("hogar"));
        assert!(task.deleted_at.is_none());
        assert!(task.is_past_due(
            NaiveDate::from_ymd_opt(2026, 11, 2).expect("date")
        ));
    }

    #[test]
    fn empty_patch_serializes_to_empty_object() {
        let patch = TaskPatch::default();
        assert_eq!(
            serde_json::to_value(&patch).expect("patch json"),
            serde_json::json!({})
        );
    }
}
