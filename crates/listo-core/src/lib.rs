pub mod backend;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod forms;
pub mod gateway;
pub mod loader;
pub mod local;
pub mod memory;
pub mod messages;
pub mod model;
pub mod mutation;
pub mod palette;
pub mod remote;
pub mod render;
pub mod routes;

use std::ffi::OsString;
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::backend::Backend;
use crate::config::{
  BackendKind,
  Config
};

/// Builds the backend named by the
/// `backend` key.
#[tracing::instrument(skip(cfg))]
pub fn open_backend(
  cfg: &Config,
  data_dir: &Path
) -> anyhow::Result<Box<dyn Backend>> {
  match cfg.backend_kind()? {
    | BackendKind::Local => {
      let backend =
        local::LocalBackend::open(
          data_dir
        )
        .with_context(|| {
          format!(
            "failed to open local \
             backend at {}",
            data_dir.display()
          )
        })?;
      Ok(Box::new(backend))
    }
    | BackendKind::Remote => {
      let settings =
        cfg.remote_settings()?;
      let store =
        remote::SessionStore::new(
          data_dir
        );
      let backend =
        remote::RemoteBackend::new(
          &settings, store
        )?;
      Ok(Box::new(backend))
    }
  }
}

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting listo CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.listorc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let gateway = gateway::Gateway::new(
    open_backend(&cfg, &data_dir)?
  );
  let renderer =
    render::Renderer::new(&cfg)?;
  let mutations =
    mutation::TaskMutations::new(
      cfg.toggle_policy()?,
      cfg.delete_policy()?
    );

  let mut shell = commands::Shell {
    gateway:   &gateway,
    renderer:  &renderer,
    mutations,
    today:     datetime::today(Utc::now()),
    out:       std::io::stdout().lock()
  };
  shell.dispatch(cli.command)?;

  info!("done");
  Ok(())
}
