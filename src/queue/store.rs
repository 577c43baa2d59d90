//! Queue membership persistence
//!
//! Only waiting players are persisted. Sessions in team review or later live
//! in memory and are lost on restart.

use crate::error::{MatchmakingError, Result};
use crate::types::{ChannelId, PlayerId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio::sync::Mutex;
use tracing::debug;

/// Mirror of per-channel queue membership
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persisted members of the channel's queue, empty if none
    async fn load_queue(&self, channel_id: ChannelId) -> Result<Vec<PlayerId>>;

    /// Replace the channel's persisted members
    async fn save_queue(&self, channel_id: ChannelId, members: &[PlayerId]) -> Result<()>;
}

/// Queue store that forgets everything on restart
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    queues: RwLock<HashMap<ChannelId, Vec<PlayerId>>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn load_queue(&self, channel_id: ChannelId) -> Result<Vec<PlayerId>> {
        let queues = self
            .queues
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue store read lock".to_string(),
            })?;
        Ok(queues.get(&channel_id).cloned().unwrap_or_default())
    }

    async fn save_queue(&self, channel_id: ChannelId, members: &[PlayerId]) -> Result<()> {
        let mut queues = self
            .queues
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire queue store write lock".to_string(),
            })?;
        queues.insert(channel_id, members.to_vec());
        Ok(())
    }
}

/// Every channel's members in one JSON document, rewritten through a temp file
/// and a rename so a crash never leaves a half-written file behind
#[derive(Debug)]
pub struct JsonFileQueueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<ChannelId, Vec<PlayerId>>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(MatchmakingError::store("read queue state", e).into()),
        };

        if raw.is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_slice(&raw)
            .map_err(|e| MatchmakingError::store("parse queue state", e).into())
    }
}

#[async_trait]
impl QueueStore for JsonFileQueueStore {
    async fn load_queue(&self, channel_id: ChannelId) -> Result<Vec<PlayerId>> {
        let all = self.read_all().await?;
        Ok(all.get(&channel_id).cloned().unwrap_or_default())
    }

    async fn save_queue(&self, channel_id: ChannelId, members: &[PlayerId]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.read_all().await?;
        all.insert(channel_id, members.to_vec());

        let encoded = serde_json::to_vec_pretty(&all)
            .map_err(|e| MatchmakingError::store("encode queue state", e))?;

        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        tokio::fs::write(&tmp_path, &encoded)
            .await
            .map_err(|e| MatchmakingError::store("write queue state", e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| MatchmakingError::store("replace queue state", e))?;

        debug!(
            "Persisted {} members for channel {} to {}",
            members.len(),
            channel_id,
            self.path.display()
        );
        Ok(())
    }
}
