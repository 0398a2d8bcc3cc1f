use std::io::Write;

use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::backend::Backend;
use crate::cli::{CategoryCommand, Command, ProfileCommand, TaskArgs, TaskEditArgs};
use crate::forms::{
    CreateCategoryForm, CreateTaskForm, EditTaskForm, LoginForm, RegisterForm, RenameProfileForm,
    Submit, validate_category_name,
};
use crate::gateway::Gateway;
use crate::loader::{
    CategoriesHook, Hook, Loader, Phase, ProfileHook, TasksByCategoryHook, TasksHook,
};
use crate::messages;
use crate::model::DEFAULT_CATEGORY_NAME;
use crate::mutation::{MutationKind, TaskMutations};
use crate::render::Renderer;
use crate::routes::{Route, guard};

/// The screen a command stands for.
pub fn route_for(command: &Command) -> Route {
    match command {
        Command::Register { .. } => Route::Register,
        Command::Login { .. } => Route::Login,
        Command::Logout => Route::Landing,
        Command::List { category: None } | Command::Done { .. } | Command::Delete { .. } => {
            Route::Dashboard
        }
        Command::List {
            category: Some(id),
        } => Route::Category(*id),
        Command::Show { id } | Command::Edit { id, .. } => Route::EditTask(*id),
        Command::Add(_) => Route::NewTask,
        Command::Categories { .. } | Command::Category(_) => Route::Categories,
        Command::Profile { .. } => Route::Profile,
    }
}

/// Drives hooks and forms for one command and renders into `out`.
pub struct Shell<'a, B, W> {
    pub gateway: &'a Gateway<B>,
    pub renderer: &'a Renderer,
    pub mutations: TaskMutations,
    pub today: NaiveDate,
    pub out: W,
}

fn ready<T>(loader: &Loader<T>) -> anyhow::Result<&T> {
    match (loader.phase(), loader.data()) {
        (Phase::Ready, Some(data)) => Ok(data),
        _ => Err(anyhow!(
            "{}",
            loader.error().unwrap_or(messages::UNKNOWN_ERROR)
        )),
    }
}

fn envelope_error(message: String) -> anyhow::Error {
    anyhow!(message)
}

impl<'a, B: Backend, W: Write> Shell<'a, B, W> {
    #[instrument(skip_all)]
    pub fn dispatch(&mut self, command: Option<Command>) -> anyhow::Result<()> {
        let authenticated = self.gateway.current_user().success;

        let Some(command) = command else {
            return if authenticated {
                self.list(None)
            } else {
                writeln!(self.out, "{}", messages::WELCOME)?;
                Ok(())
            };
        };

        let requested = route_for(&command);
        let landed = guard(requested, authenticated);
        debug!(%requested, %landed, authenticated, "routing command");

        if landed != requested {
            return match landed {
                Route::Login => Err(anyhow!(
                    "{} (usa `listo login`)",
                    messages::NOT_AUTHENTICATED
                )),
                _ => {
                    info!(%requested, "already signed in; showing dashboard");
                    self.list(None)
                }
            };
        }

        match command {
            Command::Register {
                name,
                email,
                password,
                confirm_password,
            } => self.register(name, email, password, confirm_password),
            Command::Login { email, password } => self.login(email, password),
            Command::Logout => self.logout(),
            Command::List { category } => self.list(category),
            Command::Show { id } => self.show(id),
            Command::Add(args) => self.add(args),
            Command::Edit { id, fields } => self.edit(id, fields),
            Command::Done { id } => self.toggle(id),
            Command::Delete { id } => self.delete(id),
            Command::Categories { all } => self.categories(all),
            Command::Category(action) => self.category(action),
            Command::Profile { action } => self.profile(action),
        }
    }

    fn register(
        &mut self,
        name: String,
        email: String,
        password: String,
        confirm_password: Option<String>,
    ) -> anyhow::Result<()> {
        let mut form = RegisterForm {
            name,
            email,
            confirm_password: confirm_password.unwrap_or_else(|| password.clone()),
            password,
            ..RegisterForm::default()
        };

        match form.submit(self.gateway) {
            Submit::Done(user) => {
                let label = format!(
                    "{}: {}",
                    messages::ACCOUNT_CREATED,
                    user.email.as_deref().unwrap_or(&form.email)
                );
                self.renderer.write_notice(&mut self.out, &label)
            }
            Submit::Invalid | Submit::Failed(_) => Err(anyhow!(
                "{}",
                form.error.as_deref().unwrap_or(messages::UNKNOWN_ERROR)
            )),
        }
    }

    fn login(&mut self, email: String, password: String) -> anyhow::Result<()> {
        let mut form = LoginForm {
            email,
            password,
            ..LoginForm::default()
        };

        match form.submit(self.gateway) {
            Submit::Done(user) => {
                let label = format!(
                    "{}: {}",
                    messages::SIGNED_IN,
                    user.email.as_deref().unwrap_or(&form.email)
                );
                self.renderer.write_notice(&mut self.out, &label)
            }
            Submit::Invalid | Submit::Failed(_) => Err(anyhow!(
                "{}",
                form.error.as_deref().unwrap_or(messages::UNKNOWN_ERROR)
            )),
        }
    }

    fn logout(&mut self) -> anyhow::Result<()> {
        self.gateway
            .logout()
            .into_result()
            .map_err(envelope_error)?;
        self.renderer.write_notice(&mut self.out, messages::SIGNED_OUT)
    }

    fn list(&mut self, category: Option<Uuid>) -> anyhow::Result<()> {
        match category {
            None => {
                let mut hook = TasksHook::new();
                hook.load(self.gateway);
                let tasks = ready(hook.loader())?;
                self.renderer
                    .write_tasks(&mut self.out, messages::ALL_TASKS_TITLE, tasks, self.today)
            }
            Some(id) => {
                let mut hook = TasksByCategoryHook::new();
                if let Some(ticket) = hook.set_category(id) {
                    let outcome = hook.fetch(self.gateway);
                    hook.resolve(ticket, outcome);
                }
                let tasks = ready(hook.loader())?;
                let title = messages::category_tasks_title(
                    tasks.first().and_then(|task| task.category_name()),
                );
                self.renderer
                    .write_tasks(&mut self.out, &title, tasks, self.today)
            }
        }
    }

    fn show(&mut self, id: Uuid) -> anyhow::Result<()> {
        let mut loader = Loader::new();
        let ticket = loader.begin();
        loader.resolve(ticket, self.gateway.get_task_by_id(id));
        let task = ready(&loader)?;
        self.renderer
            .write_task_detail(&mut self.out, task, self.today)
    }

    fn add(&mut self, args: TaskArgs) -> anyhow::Result<()> {
        let mut form = CreateTaskForm::new();
        form.load_categories(self.gateway);

        let category_id = args.category.or_else(|| {
            form.categories()
                .iter()
                .find(|c| c.name == DEFAULT_CATEGORY_NAME)
                .map(|c| c.id)
        });
        form.draft.title = args.title;
        form.draft.description = args.description;
        form.draft.due = args.due;
        form.draft.category_id = category_id;

        match form.submit(self.gateway, self.today) {
            Submit::Done(task) => {
                let label = format!("{}: {}", messages::TASK_CREATED, task.id);
                self.renderer.write_notice(&mut self.out, &label)
            }
            Submit::Invalid => {
                self.renderer
                    .write_field_errors(&mut self.out, &form.errors)?;
                Err(anyhow!(messages::FORM_INVALID))
            }
            Submit::Failed(message) => Err(envelope_error(message)),
        }
    }

    fn edit(&mut self, id: Uuid, fields: TaskEditArgs) -> anyhow::Result<()> {
        let mut form = EditTaskForm::new(id);
        form.load(self.gateway);
        if let Some(message) = form.error.take() {
            return Err(anyhow!(message));
        }

        if let Some(title) = fields.title {
            form.draft.title = title;
        }
        if let Some(description) = fields.description {
            form.draft.description = description;
        }
        if let Some(due) = fields.due {
            form.draft.due = due;
        }
        if let Some(category) = fields.category {
            form.draft.category_id = Some(category);
        }

        match form.submit(self.gateway, self.today) {
            Submit::Done(()) => self
                .renderer
                .write_notice(&mut self.out, messages::TASK_UPDATED),
            Submit::Invalid => {
                self.renderer
                    .write_field_errors(&mut self.out, &form.errors)?;
                Err(anyhow!(messages::FORM_INVALID))
            }
            Submit::Failed(message) => Err(envelope_error(message)),
        }
    }

    /// Dashboard toggle: the flag flips before the round trip and the list
    /// is rendered with whatever state the reconciliation left.
    fn toggle(&mut self, id: Uuid) -> anyhow::Result<()> {
        let mut hook = TasksHook::new();
        hook.load(self.gateway);
        ready(hook.loader())?;

        let Some(pending) = self.mutations.toggle_complete(hook.tasks_mut(), id) else {
            return Err(anyhow!(messages::TASK_NOT_FOUND));
        };
        let completed = matches!(pending, MutationKind::SetStatus { completed: true, .. });

        let notice = self
            .mutations
            .apply(self.gateway, hook.tasks_mut(), pending);
        self.renderer.write_tasks(
            &mut self.out,
            messages::ALL_TASKS_TITLE,
            hook.tasks(),
            self.today,
        )?;

        match notice {
            Some(notice) => Err(anyhow!(notice.message)),
            None => self.renderer.write_notice(
                &mut self.out,
                if completed {
                    messages::TASK_MARKED_DONE
                } else {
                    messages::TASK_MARKED_PENDING
                },
            ),
        }
    }

    fn delete(&mut self, id: Uuid) -> anyhow::Result<()> {
        let mut hook = TasksHook::new();
        hook.load(self.gateway);
        ready(hook.loader())?;

        let pending = self.mutations.delete_task(hook.tasks_mut(), id);
        let notice = self
            .mutations
            .apply(self.gateway, hook.tasks_mut(), pending);
        self.renderer.write_tasks(
            &mut self.out,
            messages::ALL_TASKS_TITLE,
            hook.tasks(),
            self.today,
        )?;

        match notice {
            Some(notice) => Err(anyhow!(notice.message)),
            None => self
                .renderer
                .write_notice(&mut self.out, messages::TASK_DELETED),
        }
    }

    fn categories(&mut self, all: bool) -> anyhow::Result<()> {
        if all {
            let user = self
                .gateway
                .current_user()
                .into_result()
                .map_err(envelope_error)?;
            let categories = self
                .gateway
                .get_all_categories_with_deleted(user.id)
                .into_result()
                .map_err(envelope_error)?;
            return self
                .renderer
                .write_categories(&mut self.out, &categories);
        }

        let mut hook = CategoriesHook::new();
        hook.load(self.gateway);
        let categories = ready(hook.loader())?;
        self.renderer
            .write_categories(&mut self.out, categories)
    }

    fn category(&mut self, action: CategoryCommand) -> anyhow::Result<()> {
        match action {
            CategoryCommand::Add { name } => {
                let user = self
                    .gateway
                    .current_user()
                    .into_result()
                    .map_err(envelope_error)?;
                let mut form = CreateCategoryForm::new(name);
                match form.submit(self.gateway, user.id) {
                    Submit::Done(category) => {
                        let label = format!("{}: {}", messages::CATEGORY_CREATED, category.id);
                        self.renderer.write_notice(&mut self.out, &label)
                    }
                    Submit::Invalid | Submit::Failed(_) => Err(anyhow!(
                        "{}",
                        form.error.as_deref().unwrap_or(messages::UNKNOWN_ERROR)
                    )),
                }
            }
            CategoryCommand::Rename { id, name } => {
                let name = validate_category_name(&name).map_err(envelope_error)?;
                self.gateway
                    .update_category(id, &name)
                    .into_result()
                    .map_err(envelope_error)?;
                self.renderer
                    .write_notice(&mut self.out, messages::CATEGORY_RENAMED)
            }
            CategoryCommand::Delete { id } => {
                self.gateway
                    .soft_delete_category(id)
                    .into_result()
                    .map_err(envelope_error)?;
                self.renderer
                    .write_notice(&mut self.out, messages::CATEGORY_DELETED)
            }
        }
    }

    fn profile(&mut self, action: Option<ProfileCommand>) -> anyhow::Result<()> {
        match action {
            None => {
                let mut hook = ProfileHook::new();
                hook.load(self.gateway);
                let profile = ready(hook.loader())?;
                self.renderer.write_profile(&mut self.out, profile)
            }
            Some(ProfileCommand::Rename { name }) => {
                let mut form = RenameProfileForm::new(name);
                match form.submit(self.gateway) {
                    Submit::Done(()) => self
                        .renderer
                        .write_notice(&mut self.out, messages::PROFILE_RENAMED),
                    Submit::Invalid | Submit::Failed(_) => Err(anyhow!(
                        "{}",
                        form.error.as_deref().unwrap_or(messages::UNKNOWN_ERROR)
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::route_for;
    use crate::cli::{CategoryCommand, Command};
    use crate::routes::Route;

    #[test]
    fn mutations_belong_to_the_dashboard() {
        let id = Uuid::new_v4();
        assert_eq!(route_for(&Command::Done { id }), Route::Dashboard);
        assert_eq!(route_for(&Command::Delete { id }), Route::Dashboard);
        assert_eq!(
            route_for(&Command::List { category: Some(id) }),
            Route::Category(id)
        );
        assert_eq!(
            route_for(&Command::Category(CategoryCommand::Delete { id })),
            Route::Categories
        );
        assert_eq!(route_for(&Command::Logout), Route::Landing);
    }
}
