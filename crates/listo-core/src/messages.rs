//! User-facing strings. The client ships in Spanish; log output stays in
//! English.

pub const NOT_AUTHENTICATED: &str = "Usuario no autenticado";
pub const UNKNOWN_ERROR: &str = "Error desconocido";

pub const LOGOUT_FAILED: &str = "No se pudo cerrar la sesión";

pub const TASKS_LOAD_FAILED: &str = "No se pudieron cargar las tareas";
pub const CATEGORY_TASKS_LOAD_FAILED: &str =
    "No se pudieron cargar las tareas de esta categoría";
pub const TASK_NOT_FOUND: &str = "Tarea no encontrada";
pub const TASK_LOAD_FAILED: &str = "No se pudo cargar la tarea";
pub const TASK_CREATE_FAILED: &str = "No se pudo crear la tarea";
pub const TASK_STATUS_FAILED: &str = "No se puede actualizar el estado.";
pub const TASK_UPDATE_FAILED: &str = "No se pudo actualizar la tarea";
pub const TASK_DELETE_FAILED: &str = "No se pudo eliminar la tarea";

pub const CATEGORY_CREATE_FAILED: &str = "No se pudo crear la categoría";
pub const CATEGORIES_LOAD_FAILED: &str = "No se pudieron cargar las categorías";
pub const CATEGORY_UPDATE_FAILED: &str = "No se pudo actualizar la categoría";
pub const CATEGORY_DELETE_FAILED: &str = "No se pudo eliminar la categoría";
pub const CATEGORY_HAS_TASKS: &str =
    "No se puede eliminar esta categoría porque tiene tareas asociadas";

pub const PROFILE_LOAD_FAILED: &str = "No se pudo cargar el perfil del usuario";
pub const PROFILE_RENAME_FAILED: &str = "No se pudo actualizar el nombre";
pub const DEFAULT_PROFILE_NAME: &str = "Usuario";
pub const UNKNOWN_EMAIL: &str = "correo@desconocido.com";

// Optimistic mutation notices.
pub const NOTICE_STATUS_FAILED: &str = "No se pudo actualizar el estado";
pub const NOTICE_DELETE_FAILED: &str = "No se pudo eliminar la tarea";

// Form validation.
pub const TITLE_REQUIRED: &str = "El título es obligatorio";
pub const TITLE_TOO_SHORT: &str = "El título debe tener al menos 3 caracteres";
pub const TITLE_TOO_LONG: &str = "El título no puede exceder 100 caracteres";
pub const DESCRIPTION_TOO_LONG: &str = "La descripción no puede exceder 500 caracteres";
pub const CATEGORY_REQUIRED: &str = "Debes seleccionar una categoría";
pub const DUE_REQUIRED: &str = "La fecha límite es obligatoria";
pub const DUE_BEFORE_TODAY: &str = "La fecha límite no puede ser anterior a hoy";
pub const DUE_INVALID: &str = "La fecha límite no es válida";
pub const CATEGORY_NAME_EMPTY: &str = "El nombre no puede estar vacío";
pub const PROFILE_NAME_EMPTY: &str = "El nombre no puede estar vacío";
pub const PASSWORDS_DIFFER: &str = "Las contraseñas no coinciden";
pub const EMAIL_INVALID: &str = "Correo electrónico inválido";
pub const EMAIL_TAKEN: &str = "Este correo ya está registrado";

pub const NO_TASKS: &str = "No hay tareas registradas";
pub const NO_CATEGORIES: &str = "No hay categorías registradas";

pub const ALL_TASKS_TITLE: &str = "Todas tus tareas";

/// Heading for one category's tasks, named after the first task's category.
pub fn category_tasks_title(name: Option<&str>) -> String {
    format!("Tareas de la categoría {}", name.unwrap_or("Categoría"))
}

pub fn completed_divider(count: usize) -> String {
    format!("Completadas ({count})")
}

pub fn category_name_too_long(len: usize) -> String {
    format!("Máximo 100 caracteres (actual: {len})")
}

pub const SIGNED_OUT: &str = "Sesión cerrada";
pub const WELCOME: &str =
    "Organiza tus tareas por categorías. Usa `listo register` o `listo login` para empezar.";
pub const FORM_INVALID: &str = "Revisa los campos marcados";

// Confirmations.
pub const ACCOUNT_CREATED: &str = "Cuenta creada";
pub const SIGNED_IN: &str = "Sesión iniciada";
pub const TASK_CREATED: &str = "Tarea creada";
pub const TASK_UPDATED: &str = "Tarea actualizada";
pub const TASK_DELETED: &str = "Tarea eliminada";
pub const TASK_MARKED_DONE: &str = "Tarea completada";
pub const TASK_MARKED_PENDING: &str = "Tarea pendiente";
pub const CATEGORY_CREATED: &str = "Categoría creada";
pub const CATEGORY_RENAMED: &str = "Categoría actualizada";
pub const CATEGORY_DELETED: &str = "Categoría eliminada";
pub const PROFILE_RENAMED: &str = "Nombre actualizado";
