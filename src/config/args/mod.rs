use crate::config::{
    CLITimeoutConfig, ClientConfig, CommandConfig, Config, DeleteConfig, DownloadConfig,
    ListConfig, MoveConfig, PermissionConfig, RetryConfig, TracingConfig, UploadConfig,
    UploadListConfig,
};
use crate::types::{AccessKeys, Acl, FieldSelector, S3Credentials};
use aws_smithy_types::checksum_config::RequestChecksumCalculation;
use clap::builder::NonEmptyStringValueParser;
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::ffi::OsString;
use std::path::PathBuf;


// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_LIST_PREFIX: &str = "source/";
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_LIST_LIMIT: usize = 0;
const DEFAULT_UPLOAD_THREADS: u16 = 3;
const DEFAULT_DOWNLOAD_THREADS: u16 = 3;
const DEFAULT_DOWNLOAD_PATH: &str = ".";
const DEFAULT_DELETE_THREADS: u16 = 1;
const DEFAULT_MOVE_THREADS: u16 = 1;
const DEFAULT_PREFIX_THREADS: u16 = 3;
const DEFAULT_CHANGER_THREADS: u16 = 50;
const DEFAULT_UPLOAD_LIST_OUTPUT_PATH: &str = ".";
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;
const DEFAULT_DISABLE_STALLED_STREAM_PROTECTION: bool = false;
const DEFAULT_SHOW_NO_PROGRESS: bool = false;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_MISSING_COMMAND: &str =
    "A command is required (list, upload, download, delete, move, change-permissions, create-upload-list).";
const ERROR_MESSAGE_THREADS_ZERO: &str = "Thread count must be at least 1.";
const ERROR_MESSAGE_MAX_KEYS_NOT_POSITIVE: &str = "Max keys must be at least 1.";
const ERROR_MESSAGE_SECRET_KEY_REQUIRED: &str =
    "--secret-access-key is required when --access-key is given.";
const ERROR_MESSAGE_DESTINATION_REQUIRED: &str =
    "Either --destination-path or --rename must be given.";

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// s3tool - Bulk operations on a single S3 bucket.
///
/// List, upload, download, delete, move and change the ACL of objects,
/// with a bounded number of concurrent requests.
///
/// Example:
///   s3tool --bucket my-bucket list --prefix source/ --delimiter /
///   s3tool --bucket my-bucket upload --upload-path videos a.mp4 b.mp4
///   s3tool --bucket my-bucket delete --no-prompt --threads 8 source/a.mp4
#[derive(Parser, Clone, Debug)]
#[command(name = "s3tool", version, about, long_about = None)]
pub struct CLIArgs {
    /// Bucket every command operates on.
    #[arg(
        long,
        env = "BUCKET_NAME",
        value_parser = NonEmptyStringValueParser::new(),
        default_value_if("auto_complete_shell", clap::builder::ArgPredicate::IsPresent, "ignored"),
        required = false,
    )]
    pub bucket: String,

    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Don't show the progress bar.
    #[arg(long, env, default_value_t = DEFAULT_SHOW_NO_PROGRESS, help_heading = "General")]
    pub show_no_progress: bool,

    /// URL prepended to keys by `list --http-prefix`.
    #[arg(long, env = "HTTP_PREFIX", default_value = "", help_heading = "General")]
    pub http_prefix_url: String,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Verbosity level. -q (quiet), default (normal), -v, -vv, -vvv.
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable AWS SDK tracing.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    // -----------------------------------------------------------------------
    // Retry options
    // -----------------------------------------------------------------------
    /// Maximum retry attempts for AWS SDK operations. Default: 10.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    /// Initial backoff in milliseconds for retries. Default: 100.
    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    // -----------------------------------------------------------------------
    // Timeout options
    // -----------------------------------------------------------------------
    /// Overall operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    /// Per-attempt operation timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    /// Connection timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    /// Read timeout in milliseconds.
    #[arg(long, env, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    // -----------------------------------------------------------------------
    // AWS configuration
    // -----------------------------------------------------------------------
    /// AWS profile. If not set, access keys or the default provider chain are used.
    #[arg(long, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub profile: Option<String>,

    /// AWS access key ID.
    #[arg(long, env = "ACCESS_KEY", value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub access_key: Option<String>,

    /// AWS secret access key.
    #[arg(long, env = "SECRET_ACCESS_KEY", value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub secret_access_key: Option<String>,

    /// AWS session token.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub session_token: Option<String>,

    /// AWS region.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint URL (e.g. MinIO, DigitalOcean Spaces).
    #[arg(long, env = "ENDPOINT", value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub endpoint_url: Option<String>,

    /// Force path-style access (required for some S3-compatible services).
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "AWS")]
    pub force_path_style: bool,

    /// Disable stalled stream protection.
    #[arg(long, env, default_value_t = DEFAULT_DISABLE_STALLED_STREAM_PROTECTION, help_heading = "AWS")]
    pub disable_stalled_stream_protection: bool,

    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List keys under a prefix.
    List(ListArgs),
    /// Upload local files.
    Upload(UploadArgs),
    /// Download objects into a local directory.
    Download(DownloadArgs),
    /// Delete objects.
    Delete(DeleteArgs),
    /// Move objects to another folder, or rename a single object.
    Move(MoveArgs),
    /// Apply a canned ACL to every object under the given prefixes.
    ChangePermissions(ChangePermissionsArgs),
    /// Write a comma-separated list of local files for `upload --from-list`.
    CreateUploadList(CreateUploadListArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ListArgs {
    /// Prefix to look for keys.
    #[arg(long, default_value = DEFAULT_LIST_PREFIX)]
    pub prefix: String,

    /// Group keys sharing a prefix up to this delimiter.
    #[arg(long)]
    pub delimiter: Option<String>,

    /// Max keys per listing request.
    #[arg(long, default_value_t = DEFAULT_MAX_KEYS, allow_negative_numbers = true)]
    pub max_keys: i32,

    /// Stop after this many entries. 0 means no limit.
    #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
    pub limit: usize,

    /// Attribute printed for each object.
    #[arg(long, value_enum, default_value_t = FieldSelector::Key)]
    pub field: FieldSelector,

    /// USE WITH CAUTION! Walk every key in the bucket.
    #[arg(long)]
    pub all: bool,

    /// Prepend the HTTP URL prefix to keys.
    #[arg(long)]
    pub http_prefix: bool,
}

#[derive(Args, Clone, Debug)]
pub struct UploadArgs {
    /// Local files to upload.
    pub files: Vec<PathBuf>,

    /// Read files to upload from a list written by `create-upload-list`.
    #[arg(long)]
    pub from_list: Option<PathBuf>,

    /// Key prefix the files are uploaded under.
    #[arg(long)]
    pub upload_path: String,

    /// Canned ACL of the uploaded objects.
    #[arg(long, value_enum, default_value_t = Acl::PublicRead)]
    pub permission: Acl,

    #[arg(long, default_value_t = DEFAULT_UPLOAD_THREADS)]
    pub threads: u16,
}

#[derive(Args, Clone, Debug)]
pub struct DownloadArgs {
    /// Keys to download.
    pub keys: Vec<String>,

    /// Download every object under this folder prefix.
    #[arg(long)]
    pub recursive: Option<String>,

    #[arg(long, default_value = DEFAULT_DOWNLOAD_PATH)]
    pub download_path: PathBuf,

    #[arg(long, default_value_t = DEFAULT_DOWNLOAD_THREADS)]
    pub threads: u16,

    /// Max keys per listing request with --recursive.
    #[arg(long, default_value_t = DEFAULT_MAX_KEYS, allow_negative_numbers = true)]
    pub max_keys: i32,
}

#[derive(Args, Clone, Debug)]
pub struct DeleteArgs {
    /// Keys to delete.
    pub keys: Vec<String>,

    /// Do not ask before deleting each key.
    #[arg(long)]
    pub no_prompt: bool,

    /// The prompt is only shown with a single thread.
    #[arg(long, default_value_t = DEFAULT_DELETE_THREADS)]
    pub threads: u16,
}

#[derive(Args, Clone, Debug)]
pub struct MoveArgs {
    /// Keys to move.
    pub origin_keys: Vec<String>,

    /// Folder the objects are moved into. Must not end with '/'.
    #[arg(long)]
    pub destination_path: Option<String>,

    /// New leaf name for a single object, kept in its folder.
    #[arg(long)]
    pub rename: Option<String>,

    #[arg(long, value_enum, default_value_t = Acl::PublicRead)]
    pub permission: Acl,

    #[arg(long, default_value_t = DEFAULT_MOVE_THREADS)]
    pub threads: u16,
}

#[derive(Args, Clone, Debug)]
pub struct ChangePermissionsArgs {
    /// Key prefixes whose objects are updated.
    pub prefixes: Vec<String>,

    /// Number of prefixes listed at once.
    #[arg(long, default_value_t = DEFAULT_PREFIX_THREADS)]
    pub prefix_threads: u16,

    /// Number of objects updated at once for each prefix.
    #[arg(long, default_value_t = DEFAULT_CHANGER_THREADS)]
    pub changer_threads: u16,

    #[arg(long, value_enum, default_value_t = Acl::PublicRead)]
    pub permission: Acl,

    #[arg(long, default_value_t = DEFAULT_MAX_KEYS, allow_negative_numbers = true)]
    pub max_keys: i32,
}

#[derive(Args, Clone, Debug)]
pub struct CreateUploadListArgs {
    /// Directory searched (non-recursively) for files.
    #[arg(long)]
    pub files_path: PathBuf,

    /// Extension of the files to include, without the dot.
    #[arg(long)]
    pub file_extension: String,

    /// Directory `upload.txt` is written to.
    #[arg(long, default_value = DEFAULT_UPLOAD_LIST_OUTPUT_PATH)]
    pub output_path: PathBuf,
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use s3tool_rs::config::args::{Commands, parse_from_args};
///
/// let args = vec!["s3tool", "--bucket", "my-bucket", "delete", "--no-prompt", "a/b.txt"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(matches!(cli_args.command, Some(Commands::Delete(ref delete)) if delete.no_prompt));
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

// ---------------------------------------------------------------------------
// Validation and Config conversion
// ---------------------------------------------------------------------------

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.access_key.is_some() && self.secret_access_key.is_none() {
            return Err(ERROR_MESSAGE_SECRET_KEY_REQUIRED.to_string());
        }

        let Some(command) = &self.command else {
            if self.auto_complete_shell.is_some() {
                return Ok(());
            }
            return Err(ERROR_MESSAGE_MISSING_COMMAND.to_string());
        };

        let (threads, max_keys): (Vec<u16>, Option<i32>) = match command {
            // A non-positive page size for list is reported by the lister.
            Commands::List(_) => (vec![], None),
            Commands::Upload(upload) => (vec![upload.threads], None),
            Commands::Download(download) => (vec![download.threads], Some(download.max_keys)),
            Commands::Delete(delete) => (vec![delete.threads], None),
            Commands::Move(mv) => {
                if mv.destination_path.is_none() && mv.rename.is_none() {
                    return Err(ERROR_MESSAGE_DESTINATION_REQUIRED.to_string());
                }
                (vec![mv.threads], None)
            }
            Commands::ChangePermissions(change) => (
                vec![change.prefix_threads, change.changer_threads],
                Some(change.max_keys),
            ),
            Commands::CreateUploadList(_) => (vec![], None),
        };

        if threads.contains(&0) {
            return Err(ERROR_MESSAGE_THREADS_ZERO.to_string());
        }
        if max_keys.is_some_and(|max_keys| max_keys <= 0) {
            return Err(ERROR_MESSAGE_MAX_KEYS_NOT_POSITIVE.to_string());
        }

        Ok(())
    }

    fn build_client_config(&self) -> Option<ClientConfig> {
        let credential = if let Some(ref profile) = self.profile {
            S3Credentials::Profile(profile.clone())
        } else if let Some(ref access_key) = self.access_key {
            S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: self.secret_access_key.clone().unwrap_or_default(),
                    session_token: self.session_token.clone(),
                },
            }
        } else {
            S3Credentials::FromEnvironment
        };

        Some(ClientConfig {
            credential,
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            force_path_style: self.force_path_style,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
            disable_stalled_stream_protection: self.disable_stalled_stream_protection,
            request_checksum_calculation: RequestChecksumCalculation::WhenRequired,
        })
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }
}

impl From<Commands> for CommandConfig {
    fn from(command: Commands) -> Self {
        match command {
            Commands::List(list) => CommandConfig::List(ListConfig {
                prefix: list.prefix,
                delimiter: list.delimiter,
                max_keys: list.max_keys,
                limit: list.limit,
                field: list.field,
                all: list.all,
                http_prefix: list.http_prefix,
            }),
            Commands::Upload(upload) => CommandConfig::Upload(UploadConfig {
                files: upload.files,
                from_list: upload.from_list,
                upload_path: upload.upload_path,
                acl: upload.permission,
                worker_size: upload.threads,
            }),
            Commands::Download(download) => CommandConfig::Download(DownloadConfig {
                keys: download.keys,
                recursive_prefix: download.recursive,
                download_path: download.download_path,
                worker_size: download.threads,
                max_keys: download.max_keys,
            }),
            Commands::Delete(delete) => CommandConfig::Delete(DeleteConfig {
                keys: delete.keys,
                prompt: !delete.no_prompt,
                worker_size: delete.threads,
            }),
            Commands::Move(mv) => CommandConfig::Move(MoveConfig {
                origin_keys: mv.origin_keys,
                destination_path: mv.destination_path,
                rename: mv.rename,
                acl: mv.permission,
                worker_size: mv.threads,
            }),
            Commands::ChangePermissions(change) => {
                CommandConfig::ChangePermissions(PermissionConfig {
                    prefixes: change.prefixes,
                    prefix_worker_size: change.prefix_threads,
                    changer_worker_size: change.changer_threads,
                    acl: change.permission,
                    max_keys: change.max_keys,
                })
            }
            Commands::CreateUploadList(create) => {
                CommandConfig::CreateUploadList(UploadListConfig {
                    files_path: create.files_path,
                    file_extension: create.file_extension,
                    output_path: create.output_path,
                })
            }
        }
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        args.validate()?;

        let client_config = args.build_client_config();
        let tracing_config = args.build_tracing_config();
        let command = args
            .command
            .map(CommandConfig::from)
            .unwrap_or_else(|| CommandConfig::List(ListConfig::default()));

        Ok(Config {
            bucket: args.bucket,
            client_config,
            http_prefix: args.http_prefix_url,
            show_no_progress: args.show_no_progress,
            tracing_config,
            auto_complete_shell: args.auto_complete_shell,
            command,
        })
    }
}
