use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use dyn_clone::DynClone;

use crate::config::Config;
use crate::types::{
    Acl, ListPage, ListRequest, ObjectAcl, ObjectMetadata, TransferStatistics,
};

pub mod s3;

/// Type alias for a boxed Storage trait object.
///
/// Cloning a `Storage` is cheap and shares the underlying client, so one
/// handle can be handed to every worker of a batch.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// Factory trait for creating Storage instances.
#[async_trait]
pub trait StorageFactory {
    async fn create(config: &Config, stats_sender: Sender<TransferStatistics>) -> Storage;
}

/// Object store capabilities consumed by the operation policies.
///
/// Keys are full object keys. Every method that addresses a single object
/// returns an error wrapping [`S3ToolError::NotFound`](crate::types::error::S3ToolError)
/// when the object does not exist, so policies can tell a missing key apart
/// from any other failure.
#[async_trait]
pub trait StorageTrait: DynClone {
    fn bucket(&self) -> &str;

    /// Fetch one page of a listing.
    ///
    /// Objects and common prefixes are merged in lexicographic key order.
    async fn list_objects(
        &self,
        request: &ListRequest,
        continuation_token: Option<String>,
    ) -> Result<ListPage>;

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata>;

    async fn get_object_acl(&self, key: &str) -> Result<ObjectAcl>;

    async fn put_object_acl(&self, key: &str, acl: Acl) -> Result<()>;

    /// Stream an object into `destination`, sending `TransferBytes` as data
    /// arrives. Returns the number of bytes written.
    async fn get_object(&self, key: &str, destination: &Path) -> Result<u64>;

    /// Upload `source` with the given content type and ACL in a single
    /// request, sending `TransferBytes` as data is read. Returns the number
    /// of bytes sent.
    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        content_type: Option<String>,
        acl: Acl,
    ) -> Result<u64>;

    /// Server-side copy within the bucket, applying `acl` to the new object.
    async fn copy_object(&self, source_key: &str, destination_key: &str, acl: Acl) -> Result<()>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Get the underlying AWS S3 Client for direct API access.
    fn get_client(&self) -> Option<Arc<Client>>;

    async fn send_stats(&self, stats: TransferStatistics);
}

dyn_clone::clone_trait_object!(StorageTrait);

/// Create the S3 storage used by every command.
pub async fn create_storage(config: &Config, stats_sender: Sender<TransferStatistics>) -> Storage {
    s3::S3StorageFactory::create(config, stats_sender).await
}
