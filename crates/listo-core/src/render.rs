use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_due;
use crate::forms::FieldErrors;
use crate::messages;
use crate::model::{Category, Profile, Task};
use crate::palette::{DEFAULT_COLOR, category_color};

const RED: &str = "31";
const YELLOW: &str = "33";
const GREEN: &str = "32";
const BOLD: &str = "1";
const DIM: &str = "2";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.color_enabled()?;

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    /// Task list under `title`: pending tasks first, then completed ones
    /// below a `Completadas (N)` divider. Past-due dates are red; the
    /// category cell takes the category's palette color.
    #[tracing::instrument(skip(self, out, tasks))]
    pub fn write_tasks<W: Write>(
        &self,
        mut out: W,
        title: &str,
        tasks: &[Task],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(title, BOLD))?;
        writeln!(out)?;

        if tasks.is_empty() {
            writeln!(out, "{}", messages::NO_TASKS)?;
            return Ok(());
        }

        let (completed, pending): (Vec<&Task>, Vec<&Task>) =
            tasks.iter().partition(|task| task.completed);

        if !pending.is_empty() {
            self.write_task_table(&mut out, &pending, today)?;
        }
        if !completed.is_empty() {
            if !pending.is_empty() {
                writeln!(out)?;
            }
            let divider = messages::completed_divider(completed.len());
            writeln!(out, "-- {} --", self.paint(&divider, DIM))?;
            self.write_task_table(&mut out, &completed, today)?;
        }
        Ok(())
    }

    fn write_task_table<W: Write>(
        &self,
        mut out: W,
        tasks: &[&Task],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "".to_string(),
            "ID".to_string(),
            "Vence".to_string(),
            "Categoría".to_string(),
            "Título".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for &task in tasks {
            let mark = if task.completed {
                self.paint("[x]", GREEN)
            } else {
                "[ ]".to_string()
            };

            let due = format_due(task.due);
            let due = if task.is_past_due(today) && !task.completed {
                self.paint(&due, RED)
            } else {
                due
            };

            let category = task.category_name().unwrap_or_default();
            let category = self.paint(category, category_color(category));

            rows.push(vec![
                mark,
                self.paint(&task.id.to_string(), YELLOW),
                due,
                category,
                task.title.clone(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, out, task), fields(task_id = %task.id))]
    pub fn write_task_detail<W: Write>(
        &self,
        mut out: W,
        task: &Task,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let due = format_due(task.due);
        let due = if task.is_past_due(today) && !task.completed {
            self.paint(&due, RED)
        } else {
            due
        };

        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "título      {}", task.title)?;
        writeln!(
            out,
            "descripción {}",
            task.description.as_deref().unwrap_or_default()
        )?;
        writeln!(out, "vence       {due}")?;
        writeln!(
            out,
            "categoría   {} ({})",
            task.category_name().unwrap_or_default(),
            task.category_id
        )?;
        writeln!(
            out,
            "estado      {}",
            if task.completed {
                "completada"
            } else {
                "pendiente"
            }
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, out, categories))]
    pub fn write_categories<W: Write>(
        &self,
        mut out: W,
        categories: &[Category],
    ) -> anyhow::Result<()> {
        if categories.is_empty() {
            writeln!(out, "{}", messages::NO_CATEGORIES)?;
            return Ok(());
        }

        let headers = vec!["ID".to_string(), "Nombre".to_string(), "".to_string()];
        let rows = categories
            .iter()
            .map(|category| {
                let color = if category.deleted_at.is_some() {
                    DEFAULT_COLOR
                } else {
                    category_color(&category.name)
                };
                vec![
                    category.id.to_string(),
                    self.paint(&category.name, color),
                    if category.deleted_at.is_some() {
                        "(eliminada)".to_string()
                    } else {
                        String::new()
                    },
                ]
            })
            .collect();

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn write_profile<W: Write>(&self, mut out: W, profile: &Profile) -> anyhow::Result<()> {
        writeln!(out, "nombre  {}", profile.name)?;
        writeln!(out, "correo  {}", profile.email)?;
        if let Some(updated_at) = profile.updated_at {
            writeln!(out, "editado {}", updated_at.format("%Y-%m-%d %H:%M"))?;
        }
        Ok(())
    }

    pub fn write_notice<W: Write>(&self, mut out: W, message: &str) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(message, YELLOW))?;
        Ok(())
    }

    pub fn write_field_errors<W: Write>(
        &self,
        mut out: W,
        errors: &FieldErrors,
    ) -> anyhow::Result<()> {
        let fields = [
            ("título", &errors.title),
            ("descripción", &errors.description),
            ("categoría", &errors.category),
            ("fecha", &errors.due),
        ];
        for (field, message) in fields {
            if let Some(message) = message {
                writeln!(out, "{field}: {}", self.paint(message, RED))?;
            }
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        let padding = widths[idx].saturating_sub(UnicodeWidthStr::width(headers[idx].as_str()));
        write!(writer, "{}{} ", headers[idx], " ".repeat(padding))?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
