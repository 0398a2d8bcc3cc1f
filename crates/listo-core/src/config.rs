use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::mutation::{
  DeletePolicy,
  TogglePolicy
};
use crate::remote::RemoteSettings;

const RC_ENV_VAR: &str = "LISTORC";
const URL_ENV_VAR: &str = "LISTO_URL";
const ANON_KEY_ENV_VAR: &str =
  "LISTO_ANON_KEY";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 =
  30;

/// Which backend the client talks to.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum BackendKind {
  Local,
  Remote
}

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    map.insert(
      "data.location".to_string(),
      "~/.listo".to_string()
    );
    map.insert(
      "backend".to_string(),
      "local".to_string()
    );
    map.insert(
      "color".to_string(),
      "on".to_string()
    );
    map.insert(
      "remote.timeout".to_string(),
      DEFAULT_REMOTE_TIMEOUT_SECS
        .to_string()
    );
    map.insert(
      "mutations.toggle_revert"
        .to_string(),
      "reset".to_string()
    );
    map.insert(
      "mutations.delete_revert"
        .to_string(),
      "keep".to_string()
    );

    Config {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let listorc =
      resolve_listorc_path(rc_override)?;
    if let Some(path) = listorc {
      info!(listorc = %path.display(), "loading listorc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no listorc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// The `color` key; defaults to on.
  pub fn color_enabled(
    &self
  ) -> anyhow::Result<bool> {
    match self.get("color") {
      | None => Ok(true),
      | Some(raw) => {
        parse_bool(&raw).ok_or_else(
          || {
            anyhow!(
              "invalid color setting: \
               {raw}"
            )
          }
        )
      }
    }
  }

  pub fn backend_kind(
    &self
  ) -> anyhow::Result<BackendKind> {
    let raw = self
      .get("backend")
      .unwrap_or_else(|| {
        "local".to_string()
      });
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "local" => Ok(BackendKind::Local),
      | "remote" => {
        Ok(BackendKind::Remote)
      }
      | other => Err(anyhow!(
        "invalid backend setting: \
         {other}"
      ))
    }
  }

  pub fn toggle_policy(
    &self
  ) -> anyhow::Result<TogglePolicy> {
    self
      .get("mutations.toggle_revert")
      .map_or(
        Ok(TogglePolicy::default()),
        |raw| raw.parse()
      )
  }

  pub fn delete_policy(
    &self
  ) -> anyhow::Result<DeletePolicy> {
    self
      .get("mutations.delete_revert")
      .map_or(
        Ok(DeletePolicy::default()),
        |raw| raw.parse()
      )
  }

  /// Remote settings from the rc keys,
  /// falling back to `LISTO_URL` and
  /// `LISTO_ANON_KEY`.
  #[tracing::instrument(skip(self))]
  pub fn remote_settings(
    &self
  ) -> anyhow::Result<RemoteSettings> {
    let url = non_empty(
      self.get("remote.url")
    )
    .or_else(|| {
      non_empty(
        std::env::var(URL_ENV_VAR).ok()
      )
    });
    let anon_key = non_empty(
      self.get("remote.anon_key")
    )
    .or_else(|| {
      non_empty(
        std::env::var(ANON_KEY_ENV_VAR)
          .ok()
      )
    });

    let (Some(url), Some(anon_key)) =
      (url, anon_key)
    else {
      return Err(anyhow!(
        "missing remote backend \
         settings"
      ));
    };

    let timeout_secs = match self
      .get("remote.timeout")
    {
      | Some(raw) => {
        raw.trim().parse::<u64>().with_context(|| {
          format!(
            "invalid remote.timeout: {raw}"
          )
        })?
      }
      | None => {
        DEFAULT_REMOTE_TIMEOUT_SECS
      }
    };

    Ok(RemoteSettings {
      url,
      anon_key,
      timeout: Duration::from_secs(
        timeout_secs
      )
    })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_listorc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  let candidate = home.join(".listorc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".listo"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn non_empty(
  value: Option<String>
) -> Option<String> {
  value
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
