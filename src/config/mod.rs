pub mod args;

use std::path::PathBuf;

use aws_smithy_types::checksum_config::RequestChecksumCalculation;

use crate::types::{Acl, FieldSelector, S3Credentials};

/// Main configuration for s3tool-rs.
///
/// Built once at process start (see [`args`]) and passed by reference into
/// the storage constructor and the command being run. Nothing in the library
/// reads environment variables on its own.
///
/// ```
/// use s3tool_rs::Config;
/// use s3tool_rs::config::CommandConfig;
///
/// let config = Config::for_bucket("my-bucket");
/// assert_eq!(config.bucket, "my-bucket");
/// assert!(matches!(config.command, CommandConfig::List(_)));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub bucket: String,
    pub client_config: Option<ClientConfig>,
    /// URL prepended to keys in http-prefix display mode.
    pub http_prefix: String,
    pub show_no_progress: bool,
    pub tracing_config: Option<TracingConfig>,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
    pub command: CommandConfig,
}

impl Config {
    /// Create a `Config` with CLI defaults for the given bucket.
    ///
    /// The command defaults to a key listing of the `source/` prefix.
    pub fn for_bucket(bucket: &str) -> Self {
        Config {
            bucket: bucket.to_string(),
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bucket: String::new(),
            client_config: None,
            http_prefix: String::new(),
            show_no_progress: false,
            tracing_config: None,
            auto_complete_shell: None,
            command: CommandConfig::List(ListConfig::default()),
        }
    }
}

/// Per-command settings.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandConfig {
    List(ListConfig),
    Upload(UploadConfig),
    Download(DownloadConfig),
    Delete(DeleteConfig),
    Move(MoveConfig),
    ChangePermissions(PermissionConfig),
    CreateUploadList(UploadListConfig),
}

impl CommandConfig {
    pub fn name(&self) -> &'static str {
        match self {
            CommandConfig::List(_) => "list",
            CommandConfig::Upload(_) => "upload",
            CommandConfig::Download(_) => "download",
            CommandConfig::Delete(_) => "delete",
            CommandConfig::Move(_) => "move",
            CommandConfig::ChangePermissions(_) => "change-permissions",
            CommandConfig::CreateUploadList(_) => "create-upload-list",
        }
    }

    /// Commands that fan items out over the worker pool and report per item.
    pub fn is_batch(&self) -> bool {
        !matches!(
            self,
            CommandConfig::List(_) | CommandConfig::CreateUploadList(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListConfig {
    pub prefix: String,
    pub delimiter: Option<String>,
    /// Page size of each listing request.
    pub max_keys: i32,
    /// Total entries to emit; 0 means unlimited.
    pub limit: usize,
    pub field: FieldSelector,
    /// Ignore prefix and delimiter and walk the whole bucket.
    pub all: bool,
    pub http_prefix: bool,
}

impl Default for ListConfig {
    fn default() -> Self {
        ListConfig {
            prefix: "source/".to_string(),
            delimiter: None,
            max_keys: 1000,
            limit: 0,
            field: FieldSelector::Key,
            all: false,
            http_prefix: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    pub files: Vec<PathBuf>,
    /// Comma-separated list of file paths, as written by `create-upload-list`.
    pub from_list: Option<PathBuf>,
    pub upload_path: String,
    pub acl: Acl,
    pub worker_size: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadConfig {
    pub keys: Vec<String>,
    /// Folder prefix whose every object is downloaded.
    pub recursive_prefix: Option<String>,
    pub download_path: PathBuf,
    pub worker_size: u16,
    pub max_keys: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteConfig {
    pub keys: Vec<String>,
    pub prompt: bool,
    pub worker_size: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveConfig {
    pub origin_keys: Vec<String>,
    pub destination_path: Option<String>,
    pub rename: Option<String>,
    pub acl: Acl,
    pub worker_size: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PermissionConfig {
    pub prefixes: Vec<String>,
    pub prefix_worker_size: u16,
    pub changer_worker_size: u16,
    pub acl: Acl,
    pub max_keys: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadListConfig {
    pub files_path: PathBuf,
    pub file_extension: String,
    pub output_path: PathBuf,
}

/// AWS S3 client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
    pub disable_stalled_stream_protection: bool,
    pub request_checksum_calculation: RequestChecksumCalculation,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}
