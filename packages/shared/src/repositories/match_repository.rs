use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Put, TransactWriteItem};
use aws_sdk_dynamodb::Client;
use serde::{Deserialize, Serialize};
use serde_dynamo::{from_item, to_item};
use tracing::{debug, warn};

use crate::models::log_entry::MatchLogEntry;
use crate::models::match_session::MatchSnapshot;
use crate::models::piece::Color;
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;

#[cfg(test)]
use mockall::automock;

/// Entries for positions `start..` of one color's log, written together
/// with the snapshot that acknowledges them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogAppend {
    pub color: Color,
    pub start: usize,
    pub entries: Vec<MatchLogEntry>,
}

/// Storage for room snapshots, the per-room intent lock and the two
/// append-only per-color logs.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Takes the room lock unless another unexpired holder has it.
    async fn acquire_lock(
        &self,
        room_id: &str,
        token: &str,
        ttl_ms: i64,
        now_ms: i64,
    ) -> Result<bool, MatchRepositoryError>;

    /// Releases the lock if `token` still holds it.
    async fn release_lock(&self, room_id: &str, token: &str) -> Result<(), MatchRepositoryError>;

    async fn create_match(&self, snapshot: &MatchSnapshot) -> Result<(), MatchRepositoryError>;

    async fn get_match(&self, room_id: &str) -> Result<Option<MatchSnapshot>, MatchRepositoryError>;

    /// Atomically replaces the snapshot and writes `appends` to its logs.
    /// Fails with `Conflict`, writing nothing, unless the stored snapshot is
    /// still at `expected_version`. Log positions from an append's `start` on
    /// were never acknowledged and are overwritten.
    async fn update_match(
        &self,
        snapshot: &MatchSnapshot,
        expected_version: u64,
        appends: &[LogAppend],
    ) -> Result<(), MatchRepositoryError>;

    /// Reads one color's log from position `from` to the end.
    async fn read_log(
        &self,
        match_id: &str,
        color: Color,
        from: usize,
    ) -> Result<Vec<MatchLogEntry>, MatchRepositoryError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct LockRecord {
    room_id: String,
    lock_token: String,
    expires_at: i64,
}

/// One write's worth of a color's log. `seq` is the log position of the
/// first entry.
#[derive(Debug, Serialize, Deserialize)]
struct LogPage {
    stream: String,
    seq: u64,
    entries: Vec<MatchLogEntry>,
}

fn lock_key(room_id: &str) -> String {
    format!("{}#lock", room_id)
}

fn stream_key(match_id: &str, color: Color) -> String {
    format!("{}#{}", match_id, color.code())
}

pub struct DynamoDbMatchRepository {
    pub client: Client,
    pub state_table: String,
    pub log_table: String,
}

impl DynamoDbMatchRepository {
    pub fn new(client: Client, state_table: impl Into<String>, log_table: impl Into<String>) -> Self {
        Self {
            client,
            state_table: state_table.into(),
            log_table: log_table.into(),
        }
    }

    fn log_page_item(
        &self,
        match_id: &str,
        append: &LogAppend,
    ) -> Result<TransactWriteItem, MatchRepositoryError> {
        let page = LogPage {
            stream: stream_key(match_id, append.color),
            seq: append.start as u64,
            entries: append.entries.clone(),
        };
        let item = to_item(page).map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;

        let put = Put::builder()
            .table_name(&self.log_table)
            .set_item(Some(item))
            .build()
            .map_err(|e| MatchRepositoryError::DynamoDb(format!("Failed to build put: {:?}", e)))?;

        Ok(TransactWriteItem::builder().put(put).build())
    }

    async fn put_snapshot(
        &self,
        snapshot: &MatchSnapshot,
        condition: &str,
    ) -> Result<(), MatchRepositoryError> {
        let item = to_item(snapshot)
            .map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;

        let result = self
            .client
            .put_item()
            .table_name(&self.state_table)
            .set_item(Some(item))
            .condition_expression(condition)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        return Err(MatchRepositoryError::Conflict(snapshot.room_id.clone()));
                    }
                }
                Err(MatchRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl MatchRepository for DynamoDbMatchRepository {
    async fn acquire_lock(
        &self,
        room_id: &str,
        token: &str,
        ttl_ms: i64,
        now_ms: i64,
    ) -> Result<bool, MatchRepositoryError> {
        let record = LockRecord {
            room_id: lock_key(room_id),
            lock_token: token.to_string(),
            expires_at: now_ms + ttl_ms,
        };
        let item =
            to_item(record).map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;

        let result = self
            .client
            .put_item()
            .table_name(&self.state_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(room_id) OR expires_at < :now")
            .expression_attribute_values(":now", AttributeValue::N(now_ms.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        debug!(room_id, "Room lock is held elsewhere");
                        return Ok(false);
                    }
                }
                Err(MatchRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn release_lock(&self, room_id: &str, token: &str) -> Result<(), MatchRepositoryError> {
        let result = self
            .client
            .delete_item()
            .table_name(&self.state_table)
            .key("room_id", AttributeValue::S(lock_key(room_id)))
            .condition_expression("lock_token = :token")
            .expression_attribute_values(":token", AttributeValue::S(token.to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if let SdkError::ServiceError(service_err) = &e {
                    if service_err.err().is_conditional_check_failed_exception() {
                        warn!(room_id, "Room lock expired before release");
                        return Ok(());
                    }
                }
                Err(MatchRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn create_match(&self, snapshot: &MatchSnapshot) -> Result<(), MatchRepositoryError> {
        self.put_snapshot(snapshot, "attribute_not_exists(room_id)")
            .await
    }

    async fn get_match(&self, room_id: &str) -> Result<Option<MatchSnapshot>, MatchRepositoryError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.state_table)
            .key("room_id", AttributeValue::S(room_id.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| MatchRepositoryError::DynamoDb(e.to_string()))?;

        if let Some(item) = result.item {
            let snapshot: MatchSnapshot = from_item(item)
                .map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;
            Ok(Some(snapshot))
        } else {
            Ok(None)
        }
    }

    async fn update_match(
        &self,
        snapshot: &MatchSnapshot,
        expected_version: u64,
        appends: &[LogAppend],
    ) -> Result<(), MatchRepositoryError> {
        let item = to_item(snapshot)
            .map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;
        let put = Put::builder()
            .table_name(&self.state_table)
            .set_item(Some(item))
            .condition_expression("attribute_exists(room_id) AND #version = :expected")
            .expression_attribute_names("#version", "version")
            .expression_attribute_values(":expected", AttributeValue::N(expected_version.to_string()))
            .build()
            .map_err(|e| MatchRepositoryError::DynamoDb(format!("Failed to build put: {:?}", e)))?;

        let mut transact_items = vec![TransactWriteItem::builder().put(put).build()];
        for append in appends.iter().filter(|append| !append.entries.is_empty()) {
            transact_items.push(self.log_page_item(&snapshot.config.match_id, append)?);
        }

        match self
            .client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Some(service_error) = e.as_service_error() {
                    if matches!(
                        service_error,
                        TransactWriteItemsError::TransactionCanceledException(_)
                    ) {
                        warn!(
                            room_id = %snapshot.room_id,
                            expected_version,
                            "Snapshot moved on before commit"
                        );
                        return Err(MatchRepositoryError::Conflict(snapshot.room_id.clone()));
                    }
                }
                Err(MatchRepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    async fn read_log(
        &self,
        match_id: &str,
        color: Color,
        from: usize,
    ) -> Result<Vec<MatchLogEntry>, MatchRepositoryError> {
        let stream = stream_key(match_id, color);
        let mut pages = Vec::new();

        // The page holding position `from`, if it starts earlier.
        let head = self
            .client
            .query()
            .table_name(&self.log_table)
            .key_condition_expression("#stream = :stream AND #seq <= :from")
            .expression_attribute_names("#stream", "stream")
            .expression_attribute_names("#seq", "seq")
            .expression_attribute_values(":stream", AttributeValue::S(stream.clone()))
            .expression_attribute_values(":from", AttributeValue::N(from.to_string()))
            .scan_index_forward(false)
            .limit(1)
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| MatchRepositoryError::DynamoDb(e.to_string()))?;
        for item in head.items.unwrap_or_default() {
            let page: LogPage = from_item(item)
                .map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;
            pages.push(page);
        }

        let mut start_key = None;
        loop {
            let output = self
                .client
                .query()
                .table_name(&self.log_table)
                .key_condition_expression("#stream = :stream AND #seq > :from")
                .expression_attribute_names("#stream", "stream")
                .expression_attribute_names("#seq", "seq")
                .expression_attribute_values(":stream", AttributeValue::S(stream.clone()))
                .expression_attribute_values(":from", AttributeValue::N(from.to_string()))
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| MatchRepositoryError::DynamoDb(e.to_string()))?;

            for item in output.items.unwrap_or_default() {
                let page: LogPage = from_item(item)
                    .map_err(|e| MatchRepositoryError::Serialization(e.to_string()))?;
                pages.push(page);
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(flatten_pages(pages, from))
    }
}

/// Entries at positions `from..` of pages sorted by `seq`. A page that
/// starts inside an earlier one overwrote its unacknowledged tail.
fn flatten_pages(pages: Vec<LogPage>, from: usize) -> Vec<MatchLogEntry> {
    let mut log: Vec<MatchLogEntry> = Vec::new();
    let mut base = None;
    for page in pages {
        let seq = page.seq as usize;
        let start = *base.get_or_insert(seq);
        log.truncate(seq - start);
        if log.len() < seq - start {
            break;
        }
        log.extend(page.entries);
    }
    match base {
        Some(start) if start <= from => log.into_iter().skip(from - start).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(lock_key("room-1"), "room-1#lock");
        assert_eq!(stream_key("m1", Color::White), "m1#w");
        assert_eq!(stream_key("m1", Color::Black), "m1#b");
    }

    fn page(seq: u64, sans: &[&str]) -> LogPage {
        LogPage {
            stream: "m1#w".to_string(),
            seq,
            entries: sans
                .iter()
                .map(|san| MatchLogEntry::chess(Color::White, *san, None))
                .collect(),
        }
    }

    fn sans(entries: &[MatchLogEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|entry| match entry {
                MatchLogEntry::Chess(chess) => chess.san.clone(),
                other => panic!("unexpected entry {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_log_page_roundtrips_through_dynamo_item() {
        let record = page(7, &["e4", "e5"]);

        let item: serde_dynamo::Item = to_item(&record).unwrap();
        let back: LogPage = from_item(item).unwrap();

        assert_eq!(back.seq, 7);
        assert_eq!(back.entries, record.entries);
    }

    #[test]
    fn test_pages_flatten_from_inside_the_first_page() {
        let pages = vec![page(2, &["d4", "d5"]), page(4, &["c4"])];

        assert_eq!(sans(&flatten_pages(pages, 3)), vec!["d5", "c4"]);
    }

    #[test]
    fn test_later_page_overwrites_unacknowledged_tail() {
        let pages = vec![page(0, &["e4", "stale", "stale"]), page(1, &["e5"])];

        assert_eq!(sans(&flatten_pages(pages, 0)), vec!["e4", "e5"]);
    }

    #[test]
    fn test_flatten_stops_at_a_gap() {
        let pages = vec![page(0, &["e4"]), page(3, &["Nf3"])];

        assert_eq!(sans(&flatten_pages(pages, 0)), vec!["e4"]);
        assert!(flatten_pages(Vec::new(), 5).is_empty());
        assert!(flatten_pages(vec![page(3, &["Nf3"])], 1).is_empty());
    }

    #[tokio::test]
    async fn test_mock_repository_reports_contended_lock() {
        let mut mock = MockMatchRepository::new();
        mock.expect_acquire_lock().returning(|_, _, _, _| Ok(false));

        let acquired = mock.acquire_lock("room-1", "token", 1_000, 0).await.unwrap();

        assert!(!acquired);
    }
}
