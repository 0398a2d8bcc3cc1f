use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::gateway::{Envelope, Gateway};
use crate::messages;
use crate::model::{Category, Profile, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Identifies one request; only the most recent ticket may write state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

/// `idle -> loading -> {ready, failed}` with generation tagging, so a
/// response that arrives after a newer request began is dropped.
#[derive(Debug, Clone)]
pub struct Loader<T> {
    phase: Phase,
    data: Option<T>,
    error: Option<String>,
    generation: u64,
}

impl<T> Default for Loader<T> {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            data: None,
            error: None,
            generation: 0,
        }
    }
}

impl<T> Loader<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        self.phase = Phase::Loading;
        self.error = None;
        Ticket {
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.generation == self.generation
    }

    /// Returns `false` when the ticket is stale and the outcome was dropped.
    pub fn resolve(&mut self, ticket: Ticket, outcome: Envelope<T>) -> bool {
        if !self.is_current(ticket) {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale response"
            );
            return false;
        }

        match outcome {
            Envelope {
                success: true,
                data: Some(data),
                ..
            } => {
                self.data = Some(data);
                self.phase = Phase::Ready;
            }
            failed => {
                let message = failed.error_message().to_string();
                warn!(error = %message, "load failed");
                self.error = Some(message);
                self.phase = Phase::Failed;
            }
        }
        true
    }

    pub fn fail(&mut self, ticket: Ticket, message: impl Into<String>) -> bool {
        self.resolve(ticket, Envelope::fail(message))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn data_mut(&mut self) -> Option<&mut T> {
        self.data.as_mut()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// A data-loading hook: a loader plus the gateway call that feeds it.
pub trait Hook {
    type Data;

    fn loader(&self) -> &Loader<Self::Data>;

    fn loader_mut(&mut self) -> &mut Loader<Self::Data>;

    fn fetch<B: Backend>(&self, gateway: &Gateway<B>) -> Envelope<Self::Data>;

    fn begin(&mut self) -> Ticket {
        self.loader_mut().begin()
    }

    fn resolve(&mut self, ticket: Ticket, outcome: Envelope<Self::Data>) -> bool {
        self.loader_mut().resolve(ticket, outcome)
    }

    /// One full cycle: begin, round trip, resolve.
    fn load<B: Backend>(&mut self, gateway: &Gateway<B>) -> bool {
        let ticket = self.begin();
        let outcome = self.fetch(gateway);
        self.resolve(ticket, outcome)
    }
}

#[derive(Debug, Default)]
pub struct TasksHook {
    loader: Loader<Vec<Task>>,
}

impl TasksHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[Task] {
        self.loader.data().map(Vec::as_slice).unwrap_or_default()
    }

    /// Local task list for optimistic mutations.
    pub fn tasks_mut(&mut self) -> &mut Vec<Task> {
        self.loader.data.get_or_insert_with(Vec::new)
    }
}

impl Hook for TasksHook {
    type Data = Vec<Task>;

    fn loader(&self) -> &Loader<Vec<Task>> {
        &self.loader
    }

    fn loader_mut(&mut self) -> &mut Loader<Vec<Task>> {
        &mut self.loader
    }

    #[instrument(skip(self, gateway))]
    fn fetch<B: Backend>(&self, gateway: &Gateway<B>) -> Envelope<Vec<Task>> {
        gateway.get_all_tasks()
    }
}

#[derive(Debug, Default)]
pub struct TasksByCategoryHook {
    category_id: Option<Uuid>,
    loader: Loader<Vec<Task>>,
}

impl TasksByCategoryHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category_id(&self) -> Option<Uuid> {
        self.category_id
    }

    /// Dependency change: a new id starts a new generation, the same id
    /// does nothing.
    pub fn set_category(&mut self, category_id: Uuid) -> Option<Ticket> {
        if self.category_id == Some(category_id) {
            return None;
        }
        self.category_id = Some(category_id);
        Some(self.loader.begin())
    }

    pub fn tasks(&self) -> &[Task] {
        self.loader.data().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn tasks_mut(&mut self) -> &mut Vec<Task> {
        self.loader.data.get_or_insert_with(Vec::new)
    }
}

impl Hook for TasksByCategoryHook {
    type Data = Vec<Task>;

    fn loader(&self) -> &Loader<Vec<Task>> {
        &self.loader
    }

    fn loader_mut(&mut self) -> &mut Loader<Vec<Task>> {
        &mut self.loader
    }

    #[instrument(skip(self, gateway), fields(category_id = ?self.category_id))]
    fn fetch<B: Backend>(&self, gateway: &Gateway<B>) -> Envelope<Vec<Task>> {
        match self.category_id {
            Some(id) => gateway.get_tasks_by_category(id),
            None => Envelope::fail(messages::CATEGORY_TASKS_LOAD_FAILED),
        }
    }
}

#[derive(Debug, Default)]
pub struct CategoriesHook {
    loader: Loader<Vec<Category>>,
}

impl CategoriesHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn categories(&self) -> &[Category] {
        self.loader.data().map(Vec::as_slice).unwrap_or_default()
    }

    /// Re-runs the load cycle, e.g. after a category was created.
    pub fn refetch<B: Backend>(&mut self, gateway: &Gateway<B>) -> bool {
        self.load(gateway)
    }
}

impl Hook for CategoriesHook {
    type Data = Vec<Category>;

    fn loader(&self) -> &Loader<Vec<Category>> {
        &self.loader
    }

    fn loader_mut(&mut self) -> &mut Loader<Vec<Category>> {
        &mut self.loader
    }

    #[instrument(skip(self, gateway))]
    fn fetch<B: Backend>(&self, gateway: &Gateway<B>) -> Envelope<Vec<Category>> {
        match gateway.current_user().into_result() {
            Ok(user) => gateway.get_categories(user.id),
            Err(_) => Envelope::fail(messages::CATEGORIES_LOAD_FAILED),
        }
    }
}

#[derive(Debug, Default)]
pub struct ProfileHook {
    loader: Loader<Profile>,
}

impl ProfileHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.loader.data()
    }
}

impl Hook for ProfileHook {
    type Data = Profile;

    fn loader(&self) -> &Loader<Profile> {
        &self.loader
    }

    fn loader_mut(&mut self) -> &mut Loader<Profile> {
        &mut self.loader
    }

    #[instrument(skip(self, gateway))]
    fn fetch<B: Backend>(&self, gateway: &Gateway<B>) -> Envelope<Profile> {
        gateway.get_profile()
    }
}

#[cfg(test)]
mod tests {
    use super::{Loader, Phase};
    use crate::gateway::Envelope;

    #[test]
    fn begin_clears_previous_error() {
        let mut loader: Loader<u32> = Loader::new();
        assert_eq!(loader.phase(), Phase::Idle);

        let first = loader.begin();
        loader.fail(first, "boom");
        assert_eq!(loader.phase(), Phase::Failed);
        assert_eq!(loader.error(), Some("boom"));

        let second = loader.begin();
        assert!(loader.is_loading());
        assert_eq!(loader.error(), None);
        assert!(loader.resolve(second, Envelope::ok(7)));
        assert_eq!(loader.data(), Some(&7));
        assert_eq!(loader.phase(), Phase::Ready);
    }

    #[test]
    fn stale_ticket_is_ignored() {
        let mut loader: Loader<&str> = Loader::new();
        let old = loader.begin();
        let new = loader.begin();

        assert!(loader.resolve(new, Envelope::ok("fresh")));
        assert!(!loader.resolve(old, Envelope::ok("stale")));
        assert_eq!(loader.data(), Some(&"fresh"));
    }

    #[test]
    fn failure_keeps_previous_data() {
        let mut loader: Loader<u8> = Loader::new();
        let t = loader.begin();
        loader.resolve(t, Envelope::ok(1));
        let t = loader.begin();
        loader.resolve(t, Envelope::fail("down"));
        assert_eq!(loader.data(), Some(&1));
        assert_eq!(loader.error(), Some("down"));
    }
}
