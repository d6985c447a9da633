//! Shared E2E test infrastructure for s3tool-rs.
//!
//! Provides `TestHelper` for bucket management, object operations, and command
//! execution against real AWS S3. All helpers use the `s3tool-e2e-test` AWS profile.

#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier,
    ObjectOwnership, Permission,
};
use s3tool_rs::config::args::build_config_from_args;
use s3tool_rs::reporting::ReportSink;
use s3tool_rs::safety::ConfirmationPort;
use s3tool_rs::storage::create_storage;
use s3tool_rs::{Config, create_pipeline_cancellation_token, exit_code_from_error, run_command};
use uuid::Uuid;

/// AWS profile used for all E2E tests.
const AWS_PROFILE: &str = "s3tool-e2e-test";

/// Region used when the profile does not name one.
const DEFAULT_REGION: &str = "us-east-1";

/// Canned ACL accepted by buckets with object ownership enforced.
pub const E2E_PERMISSION: &str = "bucket-owner-full-control";

/// Outcome of one command run.
#[derive(Debug)]
pub struct CommandResult {
    /// Lines written to the stdout side of the sink.
    pub out: Vec<String>,
    /// Lines written to the stderr side of the sink.
    pub err: Vec<String>,
    /// Process exit code the CLI would have returned.
    pub exit_code: i32,
}

/// In-memory writer shared between the sink and the test.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
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

/// Answers every confirmation with the same value and records the questions.
#[derive(Default)]
pub struct FixedConfirmation {
    pub answer: bool,
    pub asked: Mutex<Vec<String>>,
}

impl FixedConfirmation {
    pub fn new(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            asked: Mutex::new(Vec::new()),
        })
    }
}

impl ConfirmationPort for FixedConfirmation {
    fn ask(&self, message: &str) -> anyhow::Result<bool> {
        self.asked.lock().unwrap().push(message.to_string());
        Ok(self.answer)
    }
}

/// RAII guard that deletes all objects and the bucket when dropped.
///
/// Cleanup runs even if the test panics. Call `TestHelper::bucket_guard()`
/// right after creating a bucket.
pub struct BucketGuard {
    helper: Arc<TestHelper>,
    bucket: String,
}

impl BucketGuard {
    /// Clean up explicitly at the end of a successful test.
    pub async fn cleanup(self) {
        self.helper.delete_bucket_cascade(&self.bucket).await;
        std::mem::forget(self);
    }
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        let helper = self.helper.clone();
        let bucket = self.bucket.clone();
        // block_on() may panic while the runtime shuts down after a failed test.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(async move {
                    helper.delete_bucket_cascade(&bucket).await;
                });
            });
        }));
    }
}

/// Shared test helper for E2E tests.
pub struct TestHelper {
    client: Client,
    region: String,
}

impl TestHelper {
    /// Create a new TestHelper with an S3 client configured via the e2e test profile.
    pub async fn new() -> Arc<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(AWS_PROFILE)
            .load()
            .await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let client = Client::new(&sdk_config);

        Arc::new(Self { client, region })
    }

    pub fn bucket_guard(self: &Arc<Self>, bucket: &str) -> BucketGuard {
        BucketGuard {
            helper: Arc::clone(self),
            bucket: bucket.to_string(),
        }
    }

    /// Returns a name like `s3tool-e2e-<uuid>`, unique across parallel runs.
    pub fn generate_bucket_name(&self) -> String {
        format!("s3tool-e2e-{}", Uuid::new_v4())
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // -----------------------------------------------------------------------
    // Bucket management
    // -----------------------------------------------------------------------

    pub async fn create_bucket(&self, bucket: &str) {
        self.create_bucket_with_ownership(bucket, None).await;
    }

    /// Create a bucket that accepts object ACLs.
    pub async fn create_bucket_with_acls(&self, bucket: &str) {
        self.create_bucket_with_ownership(bucket, Some(ObjectOwnership::BucketOwnerPreferred))
            .await;
    }

    async fn create_bucket_with_ownership(
        &self,
        bucket: &str,
        object_ownership: Option<ObjectOwnership>,
    ) {
        let mut builder = self
            .client
            .create_bucket()
            .bucket(bucket)
            .set_object_ownership(object_ownership);

        // us-east-1 must NOT specify a location constraint
        if self.region != "us-east-1" {
            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            builder = builder.create_bucket_configuration(config);
        }

        builder
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to create bucket {bucket}: {e}"));
    }

    /// Delete every object and then the bucket. Errors are ignored.
    pub async fn delete_bucket_cascade(&self, bucket: &str) {
        let keys = match self.try_list_objects(bucket, "").await {
            Some(keys) => keys,
            None => return,
        };

        for chunk in keys.chunks(1000) {
            let identifiers: Vec<ObjectIdentifier> = chunk
                .iter()
                .filter_map(|key| ObjectIdentifier::builder().key(key).build().ok())
                .collect();
            let Ok(delete) = Delete::builder()
                .set_objects(Some(identifiers))
                .quiet(true)
                .build()
            else {
                continue;
            };
            let _ = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await;
        }

        let _ = self.client.delete_bucket().bucket(bucket).send().await;
    }

    // -----------------------------------------------------------------------
    // Object operations
    // -----------------------------------------------------------------------

    pub async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put object {key}: {e}"));
    }

    pub async fn get_object_bytes(&self, bucket: &str, key: &str) -> Vec<u8> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to get object {key}: {e}"));
        output
            .body
            .collect()
            .await
            .unwrap_or_else(|e| panic!("Failed to read body of {key}: {e}"))
            .into_bytes()
            .to_vec()
    }

    /// Permissions granted on `key`, in grant order.
    pub async fn object_permissions(&self, bucket: &str, key: &str) -> Vec<Permission> {
        let output = self
            .client
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to get ACL of {key}: {e}"));
        output
            .grants()
            .iter()
            .filter_map(|grant| grant.permission().cloned())
            .collect()
    }

    /// List object keys under the given prefix.
    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Vec<String> {
        self.try_list_objects(bucket, prefix)
            .await
            .unwrap_or_else(|| panic!("Failed to list objects in {bucket}/{prefix}"))
    }

    async fn try_list_objects(&self, bucket: &str, prefix: &str) -> Option<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req.send().await.ok()?;
            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Some(keys)
    }

    pub async fn count_objects(&self, bucket: &str, prefix: &str) -> usize {
        self.list_objects(bucket, prefix).await.len()
    }

    // -----------------------------------------------------------------------
    // Command execution
    // -----------------------------------------------------------------------

    /// Build a Config for `bucket` from command-line style arguments.
    ///
    /// `args` starts at the subcommand name; global options for the e2e
    /// profile are prepended.
    pub fn build_config(bucket: &str, args: Vec<&str>) -> Config {
        let mut full_args = vec![
            "s3tool",
            "--bucket",
            bucket,
            "--profile",
            AWS_PROFILE,
            "--show-no-progress",
        ];
        full_args.extend(args);

        build_config_from_args(full_args)
            .unwrap_or_else(|e| panic!("Failed to build config: {e}"))
    }

    /// Run the configured command, answering every prompt with "no".
    pub async fn run_command(config: Config) -> CommandResult {
        Self::run_command_with_confirmation(config, FixedConfirmation::new(false)).await
    }

    pub async fn run_command_with_confirmation(
        config: Config,
        confirmation_port: Arc<dyn ConfirmationPort>,
    ) -> CommandResult {
        let (stats_sender, stats_receiver) = async_channel::unbounded();
        let storage = create_storage(&config, stats_sender).await;

        let out = SharedBuffer::default();
        let err = SharedBuffer::default();
        let mut sink = ReportSink::new(Box::new(out.clone()), Box::new(err.clone()));

        let result = run_command(
            &config,
            storage,
            create_pipeline_cancellation_token(),
            &mut sink,
            confirmation_port,
        )
        .await;
        drop(stats_receiver);

        CommandResult {
            out: out.lines(),
            err: err.lines(),
            exit_code: result.as_ref().map_or_else(exit_code_from_error, |_| 0),
        }
    }
}

/// Default timeout for E2E tests (5 minutes).
pub const E2E_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Wraps an async E2E test body with a timeout.
///
/// Usage:
/// ```ignore
/// #[tokio::test(flavor = "multi_thread")]
/// async fn e2e_my_test() {
///     e2e_timeout!(async {
///         // test body here
///     });
/// }
/// ```
#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}
