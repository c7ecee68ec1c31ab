//! File-backed implementations of the state ports.
//!
//! Layout under the state directory:
//!
//! ```text
//! plane.yaml              PlaneConfig
//! setup-state.json        {"last_completed_step": n}
//! watch-state.json        last committed enabled flag per owner
//! agents/<instance>.json  AgentRecord
//! ```
//!
//! Every write goes to a temp file that is renamed into place, so readers see
//! either the old or the new content. Blocking I/O runs on
//! `tokio::task::spawn_blocking`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::application::ports::{
    AgentRecordStore, PlaneStore, SetupStateStore, WatchSnapshotStore,
};
use crate::domain::{AgentRecord, PlaneConfig, WatchSnapshot};

/// Environment variable overriding the state directory.
pub const STATE_DIR_ENV: &str = "AGENTS_PLANE_HOME";

const PLANE_FILE: &str = "plane.yaml";
const SETUP_FILE: &str = "setup-state.json";
const WATCH_FILE: &str = "watch-state.json";
const AGENTS_DIR: &str = "agents";

#[derive(Debug, Default, Serialize, Deserialize)]
struct SetupMarker {
    last_completed_step: u32,
}

/// Root of all persisted plane state.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// `$AGENTS_PLANE_HOME`, or `~/.agents-plane`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn from_env() -> Result<Self> {
        if let Some(dir) = std::env::var_os(STATE_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::new(PathBuf::from(dir)));
        }
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        Ok(Self::new(home.join(".agents-plane")))
    }

    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, instance_name: &str) -> Result<PathBuf> {
        anyhow::ensure!(
            is_safe_file_stem(instance_name),
            "invalid instance name '{instance_name}'"
        );
        Ok(self
            .root
            .join(AGENTS_DIR)
            .join(format!("{instance_name}.json")))
    }
}

fn is_safe_file_stem(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[derive(Clone, Copy)]
enum Format {
    Json,
    Yaml,
}

fn read_sync<T: DeserializeOwned>(path: &Path, format: Format) -> Result<Option<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    let value = match format {
        Format::Json => serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?,
        Format::Yaml => serde_yaml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?,
    };
    Ok(Some(value))
}

fn write_sync<T: Serialize>(path: &Path, value: &T, format: Format) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let content = match format {
        Format::Json => serde_json::to_string_pretty(value).context("serializing state")?,
        Format::Yaml => serde_yaml::to_string(value).context("serializing state")?,
    };

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);
    std::fs::write(&temp_path, &content)
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
    }

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("finalizing {}", path.display()))
}

async fn read<T>(path: PathBuf, format: Format) -> Result<Option<T>>
where
    T: DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || read_sync(&path, format))
        .await
        .context("state load task panicked")?
}

async fn write<T>(path: PathBuf, value: T, format: Format) -> Result<()>
where
    T: Serialize + Send + 'static,
{
    tokio::task::spawn_blocking(move || write_sync(&path, &value, format))
        .await
        .context("state save task panicked")?
}

impl PlaneStore for StateDir {
    async fn load_plane(&self) -> Result<Option<PlaneConfig>> {
        read(self.root.join(PLANE_FILE), Format::Yaml).await
    }

    async fn save_plane(&self, plane: &PlaneConfig) -> Result<()> {
        write(self.root.join(PLANE_FILE), plane.clone(), Format::Yaml).await
    }
}

impl SetupStateStore for StateDir {
    async fn current_step(&self) -> Result<u32> {
        let marker: Option<SetupMarker> = read(self.root.join(SETUP_FILE), Format::Json).await?;
        Ok(marker.unwrap_or_default().last_completed_step)
    }

    async fn advance(&self, step: u32) -> Result<()> {
        let current = self.current_step().await?;
        if step <= current {
            return Ok(());
        }
        let marker = SetupMarker {
            last_completed_step: step,
        };
        write(self.root.join(SETUP_FILE), marker, Format::Json).await
    }

    async fn reset(&self) -> Result<()> {
        write(self.root.join(SETUP_FILE), SetupMarker::default(), Format::Json).await
    }
}

impl AgentRecordStore for StateDir {
    async fn load_record(&self, instance_name: &str) -> Result<Option<AgentRecord>> {
        read(self.record_path(instance_name)?, Format::Json).await
    }

    async fn save_record(&self, record: &AgentRecord) -> Result<()> {
        let path = self.record_path(&record.instance_name)?;
        write(path, record.clone(), Format::Json).await
    }

    async fn list_records(&self) -> Result<Vec<AgentRecord>> {
        let dir = self.root.join(AGENTS_DIR);
        tokio::task::spawn_blocking(move || list_sync(&dir))
            .await
            .context("state load task panicked")?
    }

    async fn delete_record(&self, instance_name: &str) -> Result<bool> {
        let path = self.record_path(instance_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
}

fn list_sync(dir: &Path) -> Result<Vec<AgentRecord>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
    };
    let mut records = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("listing {}", dir.display()))?
            .path();
        if path.extension().is_some_and(|ext| ext == "json")
            && let Some(record) = read_sync::<AgentRecord>(&path, Format::Json)?
        {
            records.push(record);
        }
    }
    records.sort_by(|a, b| a.instance_name.cmp(&b.instance_name));
    Ok(records)
}

impl WatchSnapshotStore for StateDir {
    async fn load_snapshot(&self) -> Result<WatchSnapshot> {
        Ok(read(self.root.join(WATCH_FILE), Format::Json)
            .await?
            .unwrap_or_default())
    }

    async fn save_snapshot(&self, snapshot: &WatchSnapshot) -> Result<()> {
        write(self.root.join(WATCH_FILE), snapshot.clone(), Format::Json).await
    }
}
