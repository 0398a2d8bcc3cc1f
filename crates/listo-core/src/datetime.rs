use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "listo-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "LISTO_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "LISTO_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "America/Mexico_City";

pub const DATE_FORMAT: &str =
  "%Y-%m-%d";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

/// Calendar day of `now` in the project
/// timezone; due dates compare against it.
#[must_use]
pub fn today(
  now: DateTime<Utc>
) -> NaiveDate {
  now
    .with_timezone(project_timezone())
    .date_naive()
}

#[must_use]
pub fn format_due(
  date: NaiveDate
) -> String {
  date.format(DATE_FORMAT).to_string()
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  dirs::config_dir().map(|dir| {
    dir
      .join("listo")
      .join(TIMEZONE_CONFIG_FILE)
  })
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Accepts `YYYY-MM-DD`, `DD/MM/YYYY`,
/// `today`/`hoy`, `tomorrow`/`mañana`,
/// `+Nd` offsets and weekday names (next
/// occurrence after `today`).
#[tracing::instrument(skip(today))]
pub fn parse_due(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower = token.to_lowercase();

  match lower.as_str() {
    | "" => {
      return Err(anyhow!(
        "due date is empty"
      ));
    }
    | "today" | "hoy" => {
      return Ok(today);
    }
    | "tomorrow" | "mañana" => {
      return Ok(
        today + Duration::days(1)
      );
    }
    | _ => {}
  }

  if let Some(days) = lower
    .strip_prefix('+')
    .and_then(|rest| {
      rest.strip_suffix('d')
    })
  {
    let days: i64 =
      days.parse().with_context(|| {
        format!(
          "invalid day offset: {token}"
        )
      })?;
    return Duration::try_days(days)
      .and_then(|offset| {
        today.checked_add_signed(offset)
      })
      .ok_or_else(|| {
        anyhow!(
          "day offset out of range: \
           {token}"
        )
      });
  }

  if let Some(weekday) =
    parse_weekday(&lower)
  {
    let mut candidate =
      today + Duration::days(1);
    while candidate.weekday() != weekday
    {
      candidate += Duration::days(1);
    }
    return Ok(candidate);
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token,
      DATE_FORMAT
    )
  {
    return Ok(date);
  }

  NaiveDate::parse_from_str(
    token, "%d/%m/%Y"
  )
  .with_context(|| {
    format!(
      "unrecognized due date: {token}"
    )
  })
}

fn parse_weekday(
  token: &str
) -> Option<Weekday> {
  match token {
    | "monday" | "mon" | "lunes" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "martes" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed"
    | "miércoles" | "miercoles" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "jueves" => {
      Some(Weekday::Thu)
    }
    | "friday" | "fri" | "viernes" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" | "sábado"
    | "sabado" => Some(Weekday::Sat),
    | "sunday" | "sun" | "domingo" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    format_due,
    parse_due
  };

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_iso_and_slash_dates() {
    let today = day(2026, 10, 19);
    assert_eq!(
      parse_due("2026-12-24", today)
        .expect("iso"),
      day(2026, 12, 24)
    );
    assert_eq!(
      parse_due("24/12/2026", today)
        .expect("slash"),
      day(2026, 12, 24)
    );
  }

  #[test]
  fn parses_relative_words() {
    let today = day(2026, 10, 19);
    assert_eq!(
      parse_due("mañana", today)
        .expect("tomorrow"),
      day(2026, 10, 20)
    );
    assert_eq!(
      parse_due("+10d", today)
        .expect("offset"),
      day(2026, 10, 29)
    );
    // 2026-10-19 is a Monday.
    assert_eq!(
      parse_due("monday", today)
        .expect("weekday"),
      day(2026, 10, 26)
    );
  }

  #[test]
  fn out_of_range_offsets_are_errors() {
    let today = day(2026, 10, 19);
    assert!(
      parse_due(
        "+999999999999d",
        today
      )
      .is_err()
    );
    assert!(
      parse_due("+100000000d", today)
        .is_err()
    );
  }

  #[test]
  fn rejects_garbage() {
    let today = day(2026, 10, 19);
    assert!(
      parse_due("someday", today)
        .is_err()
    );
    assert!(
      parse_due("  ", today).is_err()
    );
    assert_eq!(
      format_due(today),
      "2026-10-19"
    );
  }
}
