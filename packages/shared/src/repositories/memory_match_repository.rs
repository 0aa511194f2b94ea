use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::models::log_entry::MatchLogEntry;
use crate::models::match_session::MatchSnapshot;
use crate::models::piece::Color;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
use crate::repositories::match_repository::{LogAppend, MatchRepository};

#[derive(Debug, Clone)]
struct HeldLock {
    token: String,
    expires_at: i64,
}

/// Process-local storage with the same conditional semantics as the
/// DynamoDB tables. Used for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryMatchRepository {
    locks: Mutex<HashMap<String, HeldLock>>,
    matches: Mutex<HashMap<String, MatchSnapshot>>,
    logs: Mutex<HashMap<(String, Color), Vec<MatchLogEntry>>>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn acquire_lock(
        &self,
        room_id: &str,
        token: &str,
        ttl_ms: i64,
        now_ms: i64,
    ) -> Result<bool, MatchRepositoryError> {
        let mut locks = self.locks.lock().await;
        if let Some(held) = locks.get(room_id) {
            if held.expires_at >= now_ms {
                return Ok(false);
            }
        }
        locks.insert(
            room_id.to_string(),
            HeldLock {
                token: token.to_string(),
                expires_at: now_ms + ttl_ms,
            },
        );
        Ok(true)
    }

    async fn release_lock(&self, room_id: &str, token: &str) -> Result<(), MatchRepositoryError> {
        let mut locks = self.locks.lock().await;
        if locks.get(room_id).map(|held| held.token.as_str()) == Some(token) {
            locks.remove(room_id);
        }
        Ok(())
    }

    async fn create_match(&self, snapshot: &MatchSnapshot) -> Result<(), MatchRepositoryError> {
        let mut matches = self.matches.lock().await;
        if matches.contains_key(&snapshot.room_id) {
            return Err(MatchRepositoryError::Conflict(snapshot.room_id.clone()));
        }
        matches.insert(snapshot.room_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn get_match(&self, room_id: &str) -> Result<Option<MatchSnapshot>, MatchRepositoryError> {
        Ok(self.matches.lock().await.get(room_id).cloned())
    }

    async fn update_match(
        &self,
        snapshot: &MatchSnapshot,
        expected_version: u64,
        appends: &[LogAppend],
    ) -> Result<(), MatchRepositoryError> {
        let mut matches = self.matches.lock().await;
        let stored = matches
            .get_mut(&snapshot.room_id)
            .filter(|stored| stored.version == expected_version)
            .ok_or_else(|| MatchRepositoryError::Conflict(snapshot.room_id.clone()))?;

        let mut logs = self.logs.lock().await;
        let match_id = &snapshot.config.match_id;
        for append in appends {
            let held = logs
                .get(&(match_id.clone(), append.color))
                .map_or(0, Vec::len);
            if held < append.start {
                return Err(MatchRepositoryError::Conflict(format!(
                    "{} log has {} entries, cannot write at {}",
                    append.color, held, append.start
                )));
            }
        }
        for append in appends {
            let log = logs.entry((match_id.clone(), append.color)).or_default();
            log.truncate(append.start);
            log.extend_from_slice(&append.entries);
        }
        *stored = snapshot.clone();
        Ok(())
    }

    async fn read_log(
        &self,
        match_id: &str,
        color: Color,
        from: usize,
    ) -> Result<Vec<MatchLogEntry>, MatchRepositoryError> {
        let logs = self.logs.lock().await;
        Ok(logs
            .get(&(match_id.to_string(), color))
            .map(|log| log.iter().skip(from).cloned().collect())
            .unwrap_or_default())
    }
}
