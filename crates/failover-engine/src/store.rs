//! Durable configuration and task storage.

use crate::config::MonitorConfig;
use crate::task::ScheduledTask;
use async_trait::async_trait;
use common::{Error, Result};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

const CONFIG_FILE: &str = "config.json";
const TASKS_FILE: &str = "tasks.json";

/// Persisted monitoring configuration
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The saved config, `None` if nothing was saved yet
    async fn load(&self) -> Result<Option<MonitorConfig>>;

    async fn save(&self, config: &MonitorConfig) -> Result<()>;
}

/// Persisted scheduled tasks
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>>;

    async fn get_all(&self) -> Result<Vec<ScheduledTask>>;

    /// Insert or replace by id
    async fn save(&self, task: &ScheduledTask) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// JSON files in a directory: `config.json` and `tasks.json`
pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles on tasks.json
    tasks_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open a store in `dir`, creating the directory if needed
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            tasks_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(format!("{}: {}", path.display(), e))),
        }
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{}.tmp", name));
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote store file");
        Ok(())
    }

    async fn read_tasks(&self) -> Result<BTreeMap<String, ScheduledTask>> {
        Ok(self.read_json(TASKS_FILE).await?.unwrap_or_default())
    }
}

#[async_trait]
impl ConfigStore for JsonFileStore {
    async fn load(&self) -> Result<Option<MonitorConfig>> {
        self.read_json(CONFIG_FILE).await
    }

    async fn save(&self, config: &MonitorConfig) -> Result<()> {
        self.write_json(CONFIG_FILE, config).await
    }
}

#[async_trait]
impl TaskStore for JsonFileStore {
    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>> {
        let _guard = self.tasks_lock.lock().await;
        Ok(self.read_tasks().await?.remove(id))
    }

    async fn get_all(&self) -> Result<Vec<ScheduledTask>> {
        let _guard = self.tasks_lock.lock().await;
        Ok(self.read_tasks().await?.into_values().collect())
    }

    async fn save(&self, task: &ScheduledTask) -> Result<()> {
        let _guard = self.tasks_lock.lock().await;
        let mut tasks = self.read_tasks().await?;
        tasks.insert(task.id.clone(), task.clone());
        self.write_json(TASKS_FILE, &tasks).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.tasks_lock.lock().await;
        let mut tasks = self.read_tasks().await?;
        if tasks.remove(id).is_some() {
            self.write_json(TASKS_FILE, &tasks).await?;
        }
        Ok(())
    }
}

/// In-memory store, for tests and ephemeral deployments
#[derive(Default)]
pub struct MemoryStore {
    config: RwLock<Option<MonitorConfig>>,
    tasks: RwLock<BTreeMap<String, ScheduledTask>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self) -> Result<Option<MonitorConfig>> {
        Ok(self.config.read().clone())
    }

    async fn save(&self, config: &MonitorConfig) -> Result<()> {
        *self.config.write() = Some(config.clone());
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>> {
        Ok(self.tasks.read().get(id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<ScheduledTask>> {
        Ok(self.tasks.read().values().cloned().collect())
    }

    async fn save(&self, task: &ScheduledTask) -> Result<()> {
        self.tasks.write().insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.tasks.write().remove(id);
        Ok(())
    }
}
