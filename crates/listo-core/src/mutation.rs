use std::str::FromStr;

use anyhow::anyhow;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::gateway::{Envelope, Gateway};
use crate::messages;
use crate::model::Task;
use crate::routes::Route;

/// What a failed toggle does to the local flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TogglePolicy {
    /// Shipped behavior: the flag ends up `false` whatever it was before.
    #[default]
    ResetToIncomplete,
    RestorePrevious,
}

/// What a failed delete does to the local list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Shipped behavior: the task stays gone locally.
    #[default]
    KeepRemoved,
    Restore,
}

impl FromStr for TogglePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reset" => Ok(Self::ResetToIncomplete),
            "restore" => Ok(Self::RestorePrevious),
            other => Err(anyhow!("invalid toggle revert policy: {other}")),
        }
    }
}

impl FromStr for DeletePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::KeepRemoved),
            "restore" => Ok(Self::Restore),
            other => Err(anyhow!("invalid delete revert policy: {other}")),
        }
    }
}

/// A local change already applied, waiting for its remote outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    SetStatus {
        id: Uuid,
        completed: bool,
        previous: bool,
    },
    Delete {
        id: Uuid,
        removed: Option<(usize, Task)>,
    },
}

impl MutationKind {
    pub fn task_id(&self) -> Uuid {
        match self {
            MutationKind::SetStatus { id, .. } | MutationKind::Delete { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
}

impl Notice {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskMutations {
    pub toggle_policy: TogglePolicy,
    pub delete_policy: DeletePolicy,
}

impl TaskMutations {
    pub fn new(toggle_policy: TogglePolicy, delete_policy: DeletePolicy) -> Self {
        Self {
            toggle_policy,
            delete_policy,
        }
    }

    /// Flips the flag in `tasks` right away. `None` when the task is not in
    /// the list, in which case nothing is sent either.
    #[instrument(skip(self, tasks))]
    pub fn toggle_complete(&self, tasks: &mut [Task], id: Uuid) -> Option<MutationKind> {
        let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
            warn!(%id, "toggle for a task that is not loaded");
            return None;
        };
        let previous = task.completed;
        task.completed = !previous;
        debug!(%id, completed = task.completed, "optimistic toggle applied");
        Some(MutationKind::SetStatus {
            id,
            completed: task.completed,
            previous,
        })
    }

    /// Drops the task from `tasks` right away; the remote soft delete is
    /// still issued when it was not loaded.
    #[instrument(skip(self, tasks))]
    pub fn delete_task(&self, tasks: &mut Vec<Task>, id: Uuid) -> MutationKind {
        let removed = tasks
            .iter()
            .position(|t| t.id == id)
            .map(|index| (index, tasks.remove(index)));
        debug!(%id, was_loaded = removed.is_some(), "optimistic delete applied");
        MutationKind::Delete { id, removed }
    }

    pub fn edit_task(&self, id: Uuid) -> Route {
        Route::EditTask(id)
    }

    pub fn request<B: Backend>(gateway: &Gateway<B>, kind: &MutationKind) -> Envelope<()> {
        match kind {
            MutationKind::SetStatus { id, completed, .. } => {
                gateway.update_task_status(*id, *completed)
            }
            MutationKind::Delete { id, .. } => gateway.soft_delete_task(*id),
        }
    }

    /// Reconciles the local list with the remote outcome and returns the
    /// notice to show, if any.
    #[instrument(
        skip(self, tasks, outcome),
        fields(task_id = %kind.task_id(), success = outcome.success)
    )]
    pub fn settle(
        &self,
        tasks: &mut Vec<Task>,
        kind: MutationKind,
        outcome: &Envelope<()>,
    ) -> Option<Notice> {
        if outcome.success {
            return None;
        }

        match kind {
            MutationKind::SetStatus { id, previous, .. } => {
                let reverted = match self.toggle_policy {
                    TogglePolicy::ResetToIncomplete => false,
                    TogglePolicy::RestorePrevious => previous,
                };
                if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
                    task.completed = reverted;
                }
                warn!(%id, reverted, "remote toggle failed; local flag reverted");
                Some(Notice::new(messages::NOTICE_STATUS_FAILED))
            }
            MutationKind::Delete { id, removed } => {
                if self.delete_policy == DeletePolicy::Restore
                    && let Some((index, task)) = removed
                {
                    let index = index.min(tasks.len());
                    tasks.insert(index, task);
                }
                warn!(%id, policy = ?self.delete_policy, "remote delete failed");
                Some(Notice::new(messages::NOTICE_DELETE_FAILED))
            }
        }
    }

    pub fn apply<B: Backend>(
        &self,
        gateway: &Gateway<B>,
        tasks: &mut Vec<Task>,
        kind: MutationKind,
    ) -> Option<Notice> {
        let outcome = Self::request(gateway, &kind);
        self.settle(tasks, kind, &outcome)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::{DeletePolicy, MutationKind, TaskMutations, TogglePolicy};
    use crate::gateway::Envelope;
    use crate::model::Task;
    use crate::routes::Route;

    fn task(title: &str, completed: bool) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: None,
            due: NaiveDate::from_ymd_opt(2030, 5, 1).expect("date"),
            completed,
            category_id: Uuid::new_v4(),
            category: None,
            user_id: None,
            deleted_at: None,
        }
    }

    #[test]
    fn failed_toggle_resets_to_incomplete_even_from_incomplete() {
        let mut tasks = vec![task("a", false)];
        let id = tasks[0].id;
        let mutations = TaskMutations::default();

        let pending = mutations.toggle_complete(&mut tasks, id).expect("pending");
        assert!(tasks[0].completed);

        let notice = mutations.settle(&mut tasks, pending, &Envelope::fail("x"));
        assert!(notice.is_some());
        assert!(!tasks[0].completed);
    }

    #[test]
    fn failed_toggle_can_restore_previous_value() {
        let mut tasks = vec![task("a", true)];
        let id = tasks[0].id;
        let mutations = TaskMutations::new(TogglePolicy::RestorePrevious, DeletePolicy::default());

        let pending = mutations.toggle_complete(&mut tasks, id).expect("pending");
        assert!(!tasks[0].completed);
        mutations.settle(&mut tasks, pending, &Envelope::fail("x"));
        assert!(tasks[0].completed);

        let mutations = TaskMutations::default();
        let pending = mutations.toggle_complete(&mut tasks, id).expect("pending");
        mutations.settle(&mut tasks, pending, &Envelope::fail("x"));
        assert!(!tasks[0].completed, "reset policy ignores the prior value");
    }

    #[test]
    fn failed_delete_keeps_or_restores() {
        let mut tasks = vec![task("a", false), task("b", false), task("c", false)];
        let id = tasks[1].id;

        let keep = TaskMutations::default();
        let pending = keep.delete_task(&mut tasks, id);
        assert_eq!(tasks.len(), 2);
        keep.settle(&mut tasks, pending.clone(), &Envelope::fail("x"));
        assert_eq!(tasks.len(), 2);

        let restore = TaskMutations::new(TogglePolicy::default(), DeletePolicy::Restore);
        restore.settle(&mut tasks, pending, &Envelope::fail("x"));
        assert_eq!(tasks[1].title, "b");
    }

    #[test]
    fn successful_outcomes_raise_no_notice() {
        let mut tasks = vec![task("a", false)];
        let id = tasks[0].id;
        let mutations = TaskMutations::default();
        let pending = mutations.toggle_complete(&mut tasks, id).expect("pending");
        assert_eq!(mutations.settle(&mut tasks, pending, &Envelope::ok(())), None);
        assert!(tasks[0].completed);
    }

    #[test]
    fn unknown_task_toggle_sends_nothing_and_edit_navigates() {
        let mut tasks = vec![task("a", false)];
        let mutations = TaskMutations::default();
        let stray = Uuid::new_v4();
        assert_eq!(mutations.toggle_complete(&mut tasks, stray), None);
        assert!(matches!(
            mutations.delete_task(&mut tasks, stray),
            MutationKind::Delete { removed: None, .. }
        ));
        assert_eq!(mutations.edit_task(stray), Route::EditTask(stray));
    }

    #[test]
    fn policies_parse_from_config_values() {
        assert_eq!(
            "restore".parse::<TogglePolicy>().expect("toggle"),
            TogglePolicy::RestorePrevious
        );
        assert_eq!("KEEP".parse::<DeletePolicy>().expect("delete"), DeletePolicy::KeepRemoved);
        assert!("sometimes".parse::<TogglePolicy>().is_err());
    }
}
