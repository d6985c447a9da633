//! Shared test utilities for the s3tool-rs library crate.
//!
//! Holds the tracing helper and an in-memory [`MockStorage`] that behaves
//! like a single S3 bucket, so the command policies can be tested without
//! network access.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use chrono::{DateTime, TimeZone, Utc};

use crate::config::Config;
use crate::reporting::ReportSink;
use crate::safety::ConfirmationPort;
use crate::storage::{Storage, StorageTrait};
use crate::types::error::S3ToolError;
use crate::types::{
    Acl, Grant, ListEntry, ListPage, ListRequest, ObjectAcl, ObjectMetadata, ObjectOwner,
    ObjectSummary, TransferStatistics,
};

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// Clonable in-memory writer used to capture command output.
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A [`ReportSink`] whose stdout and stderr can be inspected afterwards.
pub(crate) fn captured_sink() -> (ReportSink, SharedBuffer, SharedBuffer) {
    let out = SharedBuffer::default();
    let err = SharedBuffer::default();
    let sink = ReportSink::new(Box::new(out.clone()), Box::new(err.clone()));
    (sink, out, err)
}

/// Confirmation port that replays canned answers and records the questions.
///
/// Once the answers run out every further question is declined.
#[derive(Default)]
pub(crate) struct CannedConfirmation {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl CannedConfirmation {
    pub fn new(answers: &[bool]) -> Self {
        CannedConfirmation {
            answers: Mutex::new(answers.iter().copied().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl ConfirmationPort for CannedConfirmation {
    fn ask(&self, message: &str) -> Result<bool> {
        self.asked.lock().unwrap().push(message.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(false))
    }
}

/// Create a default [`Config`] for the `test-bucket` bucket.
pub(crate) fn make_test_config() -> Config {
    Config::for_bucket("test-bucket")
}

pub(crate) const MOCK_OWNER_ID: &str = "75aa57f09aa0c8caeab4f8c24e99d10f8e7faeebf76c078efc7c6caea54ba06a";
pub(crate) const MOCK_OWNER_NAME: &str = "s3tool-owner";
pub(crate) const ALL_USERS_URI: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Storage operations that can be made to fail for a given key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MockOperation {
    List,
    Head,
    GetAcl,
    PutAcl,
    /// Fails after half of the object has been written to the destination.
    Get,
    /// Fails before anything is written to the destination.
    GetRequest,
    Put,
    Copy,
    Delete,
}

/// Records of calls made to the mock.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StorageCall {
    ListObjects {
        prefix: String,
        delimiter: Option<String>,
        continuation_token: Option<String>,
    },
    HeadObject {
        key: String,
    },
    GetObjectAcl {
        key: String,
    },
    PutObjectAcl {
        key: String,
        acl: Acl,
    },
    GetObject {
        key: String,
    },
    PutObject {
        key: String,
        size: u64,
        content_type: Option<String>,
        acl: Acl,
    },
    CopyObject {
        source_key: String,
        destination_key: String,
        acl: Acl,
    },
    DeleteObject {
        key: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MockObject {
    pub data: Vec<u8>,
    pub acl: Acl,
    pub content_type: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl MockObject {
    pub fn new(data: &[u8]) -> Self {
        MockObject {
            data: data.to_vec(),
            acl: Acl::Private,
            content_type: None,
            last_modified: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        }
    }
}

/// In-memory bucket implementing [`StorageTrait`].
///
/// Listing follows S3 semantics: keys come back in lexicographic order,
/// a delimiter collapses keys into common prefixes, and `max_keys` bounds
/// objects plus common prefixes of a page. Deleting a missing key succeeds
/// silently, as it does on S3.
#[derive(Clone)]
pub(crate) struct MockStorage {
    bucket: String,
    stats_sender: Sender<TransferStatistics>,
    objects: Arc<Mutex<BTreeMap<String, MockObject>>>,
    calls: Arc<Mutex<Vec<StorageCall>>>,
    failures: Arc<Mutex<HashSet<(MockOperation, String)>>>,
}

impl MockStorage {
    pub fn new(stats_sender: Sender<TransferStatistics>) -> Self {
        MockStorage {
            bucket: "test-bucket".to_string(),
            stats_sender,
            objects: Arc::new(Mutex::new(BTreeMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_keys(stats_sender: Sender<TransferStatistics>, keys: &[&str]) -> Self {
        let storage = MockStorage::new(stats_sender);
        for key in keys {
            storage.insert(key, b"");
        }
        storage
    }

    pub fn insert(&self, key: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), MockObject::new(data));
    }

    pub fn object(&self, key: &str) -> Option<MockObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_on(&self, operation: MockOperation, key: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((operation, key.to_string()));
    }

    pub fn boxed(&self) -> Storage {
        Box::new(self.clone())
    }

    fn record(&self, call: StorageCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failure(&self, operation: MockOperation, key: &str) -> Result<()> {
        if self
            .failures
            .lock()
            .unwrap()
            .contains(&(operation, key.to_string()))
        {
            return Err(anyhow!(S3ToolError::Storage(format!(
                "AccessDenied: injected {operation:?} failure for {key}"
            ))));
        }
        Ok(())
    }

    fn require(&self, key: &str) -> Result<MockObject> {
        self.object(key).ok_or_else(|| {
            anyhow!(S3ToolError::NotFound {
                key: key.to_string()
            })
        })
    }
}

// Continuation tokens remember the last emitted entry. A `P:` token marks a
// common prefix whose whole subtree has been emitted already.
fn encode_token(entry: &ListEntry) -> String {
    match entry {
        ListEntry::Object(object) => format!("K:{}", object.key),
        ListEntry::CommonPrefix(prefix) => format!("P:{prefix}"),
    }
}

fn is_consumed(token: &str, key: &str) -> bool {
    match token.split_once(':') {
        Some(("P", prefix)) => key <= prefix || key.starts_with(prefix),
        Some((_, last_key)) => key <= last_key,
        None => false,
    }
}

#[async_trait]
impl StorageTrait for MockStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(
        &self,
        request: &ListRequest,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        self.record(StorageCall::ListObjects {
            prefix: request.prefix.clone(),
            delimiter: request.delimiter.clone(),
            continuation_token: continuation_token.clone(),
        });
        self.check_failure(MockOperation::List, &request.prefix)?;

        let max_keys = if request.max_keys <= 0 {
            1000
        } else {
            request.max_keys as usize
        };

        let objects = self.objects.lock().unwrap();
        let mut entries: Vec<ListEntry> = Vec::new();
        let mut truncated = false;
        for (key, object) in objects.iter() {
            if !key.starts_with(&request.prefix) {
                continue;
            }
            if let Some(token) = &continuation_token {
                if is_consumed(token, key) {
                    continue;
                }
            }

            let common_prefix = request
                .delimiter
                .as_deref()
                .filter(|delimiter| !delimiter.is_empty())
                .and_then(|delimiter| {
                    key[request.prefix.len()..]
                        .find(delimiter)
                        .map(|idx| key[..request.prefix.len() + idx + delimiter.len()].to_string())
                });

            let entry = match common_prefix {
                Some(common_prefix) => {
                    if entries.last().map(ListEntry::key) == Some(common_prefix.as_str()) {
                        continue;
                    }
                    ListEntry::CommonPrefix(common_prefix)
                }
                None => ListEntry::Object(ObjectSummary {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: Some(object.last_modified),
                }),
            };

            if entries.len() == max_keys {
                truncated = true;
                break;
            }
            entries.push(entry);
        }

        let next_continuation_token = if truncated {
            entries.last().map(encode_token)
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata> {
        self.record(StorageCall::HeadObject {
            key: key.to_string(),
        });
        self.check_failure(MockOperation::Head, key)?;

        let object = self.require(key)?;
        Ok(ObjectMetadata {
            key: key.to_string(),
            size: object.data.len() as u64,
            content_type: object.content_type,
            last_modified: Some(object.last_modified),
        })
    }

    async fn get_object_acl(&self, key: &str) -> Result<ObjectAcl> {
        self.record(StorageCall::GetObjectAcl {
            key: key.to_string(),
        });
        self.check_failure(MockOperation::GetAcl, key)?;

        let object = self.require(key)?;
        let mut grants = vec![Grant {
            grantee: format!("CanonicalUser:{MOCK_OWNER_ID}"),
            permission: "FULL_CONTROL".to_string(),
        }];
        if matches!(object.acl, Acl::PublicRead | Acl::PublicReadWrite) {
            grants.push(Grant {
                grantee: format!("Group:{ALL_USERS_URI}"),
                permission: "READ".to_string(),
            });
        }

        Ok(ObjectAcl {
            owner: Some(ObjectOwner {
                display_name: Some(MOCK_OWNER_NAME.to_string()),
                id: Some(MOCK_OWNER_ID.to_string()),
            }),
            grants,
        })
    }

    async fn put_object_acl(&self, key: &str, acl: Acl) -> Result<()> {
        self.record(StorageCall::PutObjectAcl {
            key: key.to_string(),
            acl,
        });
        self.check_failure(MockOperation::PutAcl, key)?;

        let mut objects = self.objects.lock().unwrap();
        let object = objects.get_mut(key).ok_or_else(|| {
            anyhow!(S3ToolError::NotFound {
                key: key.to_string()
            })
        })?;
        object.acl = acl;
        Ok(())
    }

    async fn get_object(&self, key: &str, destination: &Path) -> Result<u64> {
        self.record(StorageCall::GetObject {
            key: key.to_string(),
        });

        self.check_failure(MockOperation::GetRequest, key)?;
        let object = self.require(key)?;
        if self.check_failure(MockOperation::Get, key).is_err() {
            let half = &object.data[..object.data.len() / 2];
            tokio::fs::write(destination, half).await?;
            return Err(anyhow!(S3ToolError::Transfer {
                key: key.to_string(),
                message: "connection reset".to_string(),
            }));
        }

        tokio::fs::write(destination, &object.data).await?;
        self.send_stats(TransferStatistics::TransferBytes {
            key: key.to_string(),
            bytes: object.data.len() as u64,
        })
        .await;

        Ok(object.data.len() as u64)
    }

    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        content_type: Option<String>,
        acl: Acl,
    ) -> Result<u64> {
        self.record(StorageCall::PutObject {
            key: key.to_string(),
            size,
            content_type: content_type.clone(),
            acl,
        });
        self.check_failure(MockOperation::Put, key)?;

        let data = tokio::fs::read(source).await?;
        self.send_stats(TransferStatistics::TransferBytes {
            key: key.to_string(),
            bytes: data.len() as u64,
        })
        .await;

        let mut object = MockObject::new(&data);
        object.acl = acl;
        object.content_type = content_type;
        self.objects.lock().unwrap().insert(key.to_string(), object);

        Ok(size)
    }

    async fn copy_object(&self, source_key: &str, destination_key: &str, acl: Acl) -> Result<()> {
        self.record(StorageCall::CopyObject {
            source_key: source_key.to_string(),
            destination_key: destination_key.to_string(),
            acl,
        });
        self.check_failure(MockOperation::Copy, source_key)?;

        let mut object = self.require(source_key)?;
        object.acl = acl;
        self.objects
            .lock()
            .unwrap()
            .insert(destination_key.to_string(), object);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.record(StorageCall::DeleteObject {
            key: key.to_string(),
        });
        self.check_failure(MockOperation::Delete, key)?;

        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn get_client(&self) -> Option<Arc<Client>> {
        None
    }

    async fn send_stats(&self, stats: TransferStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prefix: &str, delimiter: Option<&str>, max_keys: i32) -> ListRequest {
        ListRequest {
            prefix: prefix.to_string(),
            delimiter: delimiter.map(str::to_string),
            max_keys,
        }
    }

    #[tokio::test]
    async fn mock_list_collapses_common_prefixes() {
        let (stats_sender, _stats_receiver) = async_channel::unbounded();
        let storage = MockStorage::with_keys(
            stats_sender,
            &["a/1.txt", "a/2.txt", "b.txt", "c/d/e.txt"],
        );

        let page = storage
            .list_objects(&request("", Some("/"), 1000), None)
            .await
            .unwrap();
        let keys: Vec<&str> = page.entries.iter().map(ListEntry::key).collect();
        assert_eq!(keys, vec!["a/", "b.txt", "c/"]);
        assert!(page.next_continuation_token.is_none());
    }

    #[tokio::test]
    async fn mock_list_paginates_without_repeats() {
        let (stats_sender, _stats_receiver) = async_channel::unbounded();
        let storage = MockStorage::with_keys(
            stats_sender,
            &["a/1.txt", "a/2.txt", "b.txt", "c/d/e.txt", "d.txt"],
        );

        let mut token = None;
        let mut keys = Vec::new();
        loop {
            let page = storage
                .list_objects(&request("", Some("/"), 1), token)
                .await
                .unwrap();
            keys.extend(page.entries.iter().map(|entry| entry.key().to_string()));
            token = page.next_continuation_token;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(keys, vec!["a/", "b.txt", "c/", "d.txt"]);
    }

    #[tokio::test]
    async fn mock_delete_of_missing_key_is_silent() {
        let (stats_sender, _stats_receiver) = async_channel::unbounded();
        let storage = MockStorage::new(stats_sender);

        assert!(storage.delete_object("missing.txt").await.is_ok());
        assert!(storage.head_object("missing.txt").await.is_err());
    }
}
