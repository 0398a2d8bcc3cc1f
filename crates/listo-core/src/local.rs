use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::backend::{Backend, BackendError, Query};
use crate::memory::{MemoryBackend, MemoryState};
use crate::model::AuthUser;

const STATE_FILE: &str = "listo.json";

/// Offline backend: the in-memory service, snapshotted to disk after every
/// write.
#[derive(Debug)]
pub struct LocalBackend {
    pub data_dir: PathBuf,
    pub state_path: PathBuf,
    memory: MemoryBackend,
}

impl LocalBackend {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let state_path = data_dir.join(STATE_FILE);
        let state = if state_path.exists() {
            load_state(&state_path)?
        } else {
            MemoryState::default()
        };

        info!(
            data_dir = %data_dir.display(),
            state = %state_path.display(),
            accounts = state.accounts.len(),
            "opened local backend"
        );

        Ok(Self {
            data_dir,
            state_path,
            memory: MemoryBackend::from_state(state),
        })
    }

    fn persist(&self) -> Result<(), BackendError> {
        save_state_atomic(&self.state_path, &self.memory.snapshot()).map_err(|err| {
            warn!(error = %err, "failed to persist local backend state");
            BackendError::Storage(format!("{err:#}"))
        })
    }
}

impl Backend for LocalBackend {
    fn current_user(&self) -> Result<Option<AuthUser>, BackendError> {
        self.memory.current_user()
    }

    fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let user = self.memory.sign_up(email, password)?;
        self.persist()?;
        Ok(user)
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, BackendError> {
        let user = self.memory.sign_in(email, password)?;
        self.persist()?;
        Ok(user)
    }

    fn sign_out(&self) -> Result<(), BackendError> {
        self.memory.sign_out()?;
        self.persist()
    }

    fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        let row = self.memory.insert(table, row)?;
        self.persist()?;
        Ok(row)
    }

    fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        self.memory.select(table, query)
    }

    fn update(&self, table: &str, query: &Query, patch: Value) -> Result<usize, BackendError> {
        let changed = self.memory.update(table, query, patch)?;
        if changed > 0 {
            self.persist()?;
        }
        Ok(changed)
    }
}

#[instrument(skip(path))]
fn load_state(path: &Path) -> anyhow::Result<MemoryState> {
    debug!(file = %path.display(), "loading local state");
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(MemoryState::default());
    }
    serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", path.display()))
}

#[instrument(skip(path, state))]
fn save_state_atomic(path: &Path, state: &MemoryState) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving local state atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let serialized = serde_json::to_string_pretty(state)?;
    writeln!(temp, "{serialized}")?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
