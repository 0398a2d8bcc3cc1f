use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use listo_core::backend::{Backend, Operation};
use listo_core::cli::Command;
use listo_core::commands::Shell;
use listo_core::forms::{CreateCategoryForm, CreateTaskForm, EditTaskForm, Submit};
use listo_core::gateway::Gateway;
use listo_core::loader::{Hook, Phase, TasksByCategoryHook, TasksHook};
use listo_core::local::LocalBackend;
use listo_core::memory::MemoryBackend;
use listo_core::messages;
use listo_core::model::{Category, NewTask, Task};
use listo_core::mutation::TaskMutations;
use listo_core::render::Renderer;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).expect("date")
}

fn registered() -> Gateway<MemoryBackend> {
    let gateway = Gateway::new(MemoryBackend::new());
    let user = gateway.register("ana@example.com", "secreto1", "Ana");
    assert!(user.success, "{:?}", user.error);
    gateway
}

fn user_id<B: Backend>(gateway: &Gateway<B>) -> Uuid {
    gateway.current_user().into_result().expect("signed in").id
}

fn category<B: Backend>(gateway: &Gateway<B>, name: &str) -> Category {
    gateway
        .create_category(name, user_id(gateway))
        .into_result()
        .expect("category")
}

fn task<B: Backend>(gateway: &Gateway<B>, title: &str, category_id: Uuid) -> Task {
    gateway
        .create_task(&NewTask {
            title: title.to_string(),
            description: String::new(),
            due: NaiveDate::from_ymd_opt(2026, 11, 1).expect("date"),
            completed: false,
            category_id,
            user_id: user_id(gateway),
        })
        .into_result()
        .expect("task")
}

#[test]
fn registration_seeds_profile_and_default_category() {
    let gateway = registered();

    let categories = gateway
        .get_categories(user_id(&gateway))
        .into_result()
        .expect("categories");
    let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["General"]);

    let profile = gateway.get_profile().into_result().expect("profile");
    assert_eq!(profile.name, "Ana");
    assert_eq!(profile.email, "ana@example.com");

    let again = gateway.register("ANA@example.com", "secreto1", "Otra");
    assert!(!again.success);
}

#[test]
fn soft_deleted_tasks_leave_every_read() {
    let gateway = registered();
    let hogar = category(&gateway, "Hogar");
    let keep = task(&gateway, "Barrer", hogar.id);
    let gone = task(&gateway, "Lavar", hogar.id);

    assert!(gateway.soft_delete_task(gone.id).success);

    let all = gateway.get_all_tasks().into_result().expect("all");
    assert_eq!(all.iter().map(|t| t.id).collect::<Vec<_>>(), vec![keep.id]);
    assert_eq!(all[0].category_name(), Some("Hogar"));

    let by_category = gateway
        .get_tasks_by_category(hogar.id)
        .into_result()
        .expect("by category");
    assert_eq!(by_category.len(), 1);

    let missing = gateway.get_task_by_id(gone.id);
    assert!(!missing.success);
    assert_eq!(missing.error_message(), messages::TASK_NOT_FOUND);

    let raw = gateway.backend().raw_rows("tasks");
    assert_eq!(raw.len(), 2, "soft delete keeps the row");
}

#[test]
fn category_with_tasks_cannot_be_deleted() {
    let gateway = registered();
    let salud = category(&gateway, "Salud");
    let consulta = task(&gateway, "Consulta", salud.id);

    let refused = gateway.soft_delete_category(salud.id);
    assert!(!refused.success);
    assert_eq!(refused.error_message(), messages::CATEGORY_HAS_TASKS);

    assert!(gateway.soft_delete_task(consulta.id).success);
    let still_referenced = gateway.soft_delete_category(salud.id);
    assert_eq!(still_referenced.error_message(), messages::CATEGORY_HAS_TASKS);

    let uid = user_id(&gateway);
    let live = gateway.get_categories(uid).into_result().expect("live");
    assert!(live.iter().any(|c| c.id == salud.id && c.deleted_at.is_none()));
}

#[test]
fn empty_category_is_soft_deleted() {
    let gateway = registered();
    let vacia = category(&gateway, "Vacia");

    assert!(gateway.soft_delete_category(vacia.id).success);

    let uid = user_id(&gateway);
    let live = gateway.get_categories(uid).into_result().expect("live");
    assert!(live.iter().all(|c| c.id != vacia.id));
    let with_deleted = gateway
        .get_all_categories_with_deleted(uid)
        .into_result()
        .expect("all");
    assert!(
        with_deleted
            .iter()
            .any(|c| c.id == vacia.id && c.deleted_at.is_some())
    );
}

#[test]
fn toggle_is_immediate_and_failure_resets_to_incomplete() {
    let gateway = registered();
    let ocio = category(&gateway, "Ocio");
    let cine = task(&gateway, "Cine", ocio.id);

    let mut hook = TasksHook::new();
    assert!(hook.load(&gateway));
    let mutations = TaskMutations::default();

    let pending = mutations
        .toggle_complete(hook.tasks_mut(), cine.id)
        .expect("loaded");
    assert!(hook.tasks()[0].completed, "flag flips before the round trip");

    gateway.backend().fail_on(Operation::Update, "tasks");
    let notice = mutations.apply(&gateway, hook.tasks_mut(), pending);
    assert_eq!(
        notice.map(|n| n.message),
        Some(messages::NOTICE_STATUS_FAILED.to_string())
    );
    assert!(!hook.tasks()[0].completed);

    gateway.backend().clear_failures();
    let pending = mutations
        .toggle_complete(hook.tasks_mut(), cine.id)
        .expect("loaded");
    assert_eq!(mutations.apply(&gateway, hook.tasks_mut(), pending), None);

    let stored = gateway.get_task_by_id(cine.id).into_result().expect("task");
    assert!(stored.completed);
}

#[test]
fn failed_delete_keeps_the_task_hidden_locally() {
    let gateway = registered();
    let hogar = category(&gateway, "Hogar");
    let planchar = task(&gateway, "Planchar", hogar.id);

    let mut hook = TasksHook::new();
    hook.load(&gateway);
    let mutations = TaskMutations::default();

    gateway.backend().fail_on(Operation::Update, "tasks");
    let pending = mutations.delete_task(hook.tasks_mut(), planchar.id);
    let notice = mutations.apply(&gateway, hook.tasks_mut(), pending);
    assert!(notice.is_some());
    assert!(hook.tasks().is_empty());

    gateway.backend().clear_failures();
    assert!(gateway.get_task_by_id(planchar.id).success, "still stored remotely");
}

#[test]
fn switching_category_discards_the_older_response() {
    let gateway = registered();
    let a = category(&gateway, "Laborales");
    let b = category(&gateway, "Personales");
    task(&gateway, "Informe", a.id);
    let gym = task(&gateway, "Gimnasio", b.id);

    let mut hook = TasksByCategoryHook::new();
    let first = hook.set_category(a.id).expect("first generation");
    let late_for_a = gateway.get_tasks_by_category(a.id);

    let second = hook.set_category(b.id).expect("second generation");
    assert!(hook.set_category(b.id).is_none(), "same id does not refetch");
    let outcome = hook.fetch(&gateway);
    assert!(hook.resolve(second, outcome));

    assert!(!hook.resolve(first, late_for_a));
    assert_eq!(hook.loader().phase(), Phase::Ready);
    assert_eq!(
        hook.tasks().iter().map(|t| t.id).collect::<Vec<_>>(),
        vec![gym.id]
    );
}

#[test]
fn invalid_forms_never_reach_the_backend() {
    let gateway = registered();
    let general = gateway
        .get_categories(user_id(&gateway))
        .into_result()
        .expect("categories")
        .remove(0);

    let mut create = CreateTaskForm::new();
    create.draft.title = "ab".to_string();
    create.draft.due = "2026-10-25".to_string();
    create.draft.category_id = Some(general.id);
    let before = gateway.backend().call_count();
    assert_eq!(create.submit(&gateway, today()), Submit::Invalid);
    assert!(create.title_error());
    assert_eq!(gateway.backend().call_count(), before);

    create.draft.title = "abc".to_string();
    let created = create.submit(&gateway, today());
    let Submit::Done(created) = created else {
        panic!("expected a created task, got {created:?}");
    };
    assert_eq!(create.draft.title, "", "draft resets after success");

    let mut edit = EditTaskForm::new(created.id);
    edit.load(&gateway);
    assert_eq!(edit.draft.category_id, Some(general.id));
    assert_eq!(edit.draft.due, "2026-10-25");

    edit.draft.due = "2026-10-19".to_string();
    let before = gateway.backend().call_count();
    assert_eq!(edit.submit(&gateway, today()), Submit::Invalid);
    assert_eq!(edit.errors.due.as_deref(), Some(messages::DUE_BEFORE_TODAY));
    assert_eq!(gateway.backend().call_count(), before);

    edit.draft.due = "2026-10-20".to_string();
    edit.draft.title = "  Pagar renta  ".to_string();
    assert_eq!(edit.submit(&gateway, today()), Submit::Done(()));
    let stored = gateway.get_task_by_id(created.id).into_result().expect("task");
    assert_eq!(stored.title, "Pagar renta");

    let mut blank = CreateCategoryForm::new("   ");
    let before = gateway.backend().call_count();
    assert_eq!(blank.submit(&gateway, user_id(&gateway)), Submit::Invalid);
    assert_eq!(blank.error.as_deref(), Some(messages::CATEGORY_NAME_EMPTY));
    assert_eq!(gateway.backend().call_count(), before);

    assert_eq!(edit.delete(&gateway), Submit::Done(()));
    assert!(!edit.loading_delete);
    assert!(!gateway.get_task_by_id(created.id).success);
}

#[test]
fn editing_a_missing_task_reports_not_found() {
    let gateway = registered();
    let mut edit = EditTaskForm::new(Uuid::new_v4());
    edit.load(&gateway);
    assert!(edit.not_found);
    assert_eq!(edit.error.as_deref(), Some(messages::TASK_NOT_FOUND));

    let general = gateway
        .get_categories(user_id(&gateway))
        .into_result()
        .expect("categories")
        .remove(0);
    let private = task(&gateway, "Privada", general.id);

    assert!(gateway.register("beto@example.com", "secreto2", "Beto").success);
    let foreign = gateway.get_task_by_id(private.id);
    assert_eq!(foreign, listo_core::gateway::Envelope::fail(messages::TASK_NOT_FOUND));
}

#[test]
fn signed_out_reads_fail_with_their_load_message() {
    let gateway = Gateway::new(MemoryBackend::new());
    let tasks = gateway.get_all_tasks();
    assert!(!tasks.success);
    assert_eq!(tasks.error_message(), messages::TASKS_LOAD_FAILED);

    let profile = gateway.get_profile();
    assert!(!profile.success);
    assert_eq!(profile.error_message(), messages::PROFILE_LOAD_FAILED);

    let user = gateway.current_user();
    assert_eq!(user.error_message(), messages::NOT_AUTHENTICATED);
}

fn shell_output(
    gateway: &Gateway<MemoryBackend>,
    command: Option<Command>,
) -> (anyhow::Result<()>, String) {
    let renderer = Renderer::plain();
    let mut out = Vec::new();
    let result = Shell {
        gateway,
        renderer: &renderer,
        mutations: TaskMutations::default(),
        today: today(),
        out: &mut out,
    }
    .dispatch(command);
    (result, String::from_utf8(out).expect("utf8"))
}

#[test]
fn commands_are_guarded_and_render_the_dashboard() {
    let anonymous = Gateway::new(MemoryBackend::new());
    let (result, _) = shell_output(&anonymous, Some(Command::List { category: None }));
    let err = result.expect_err("guarded");
    assert!(err.to_string().starts_with(messages::NOT_AUTHENTICATED));

    let (result, text) = shell_output(&anonymous, None);
    assert!(result.is_ok());
    assert_eq!(text.trim(), messages::WELCOME);

    let gateway = registered();
    let (result, text) = shell_output(&gateway, Some(Command::List { category: None }));
    assert!(result.is_ok());
    assert!(text.starts_with(messages::ALL_TASKS_TITLE));
    assert!(text.trim_end().ends_with(messages::NO_TASKS));

    let hogar = category(&gateway, "Hogar");
    let barrer = task(&gateway, "Barrer", hogar.id);
    let (result, text) = shell_output(&gateway, Some(Command::Done { id: barrer.id }));
    assert!(result.is_ok());
    assert!(text.contains("[x]"));
    assert!(text.contains("Completadas (1)"));
    assert!(text.contains(messages::TASK_MARKED_DONE));

    let (result, text) = shell_output(
        &gateway,
        Some(Command::List {
            category: Some(hogar.id),
        }),
    );
    assert!(result.is_ok());
    assert!(text.starts_with("Tareas de la categoría Hogar"));

    let (result, _) = shell_output(
        &gateway,
        Some(Command::Login {
            email: "ana@example.com".to_string(),
            password: "secreto1".to_string(),
        }),
    );
    assert!(result.is_ok(), "signed-in users land on the dashboard");
}

#[test]
fn local_backend_survives_reopening() {
    let dir = tempfile::tempdir().expect("tempdir");

    let first = Gateway::new(LocalBackend::open(dir.path()).expect("open"));
    assert!(first.register("luis@example.com", "secreto1", "Luis").success);
    let uid = user_id(&first);
    let finanzas = first
        .create_category("Financieras", uid)
        .into_result()
        .expect("category");
    drop(first);

    let reopened = Gateway::new(LocalBackend::open(dir.path()).expect("reopen"));
    let names: Vec<String> = reopened
        .get_categories(uid)
        .into_result()
        .expect("categories")
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["General".to_string(), finanzas.name]);
}
