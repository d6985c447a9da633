use std::collections::HashSet;

use anyhow::{Result, anyhow};
use tracing::{debug, info, trace};

use crate::config::ListConfig;
use crate::key_path::{DELIMITER, apply_http_prefix, validate_folder_prefix};
use crate::reporting::ReportSink;
use crate::storage::Storage;
use crate::types::error::S3ToolError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{FieldSelector, ListEntry, ListRequest, ObjectSummary};

const BYTES_PER_MIB: u128 = 1024 * 1024;
const LAST_MODIFIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Prints the objects matching a [`ListConfig`], one line per entry.
///
/// Pages are fetched on demand and entries are written as soon as their
/// page arrives, so `limit` stops the listing without reading further pages.
///
/// ```text
/// Idle -> Fetching(token) -> Emitting -> Fetching(next token) | Done
/// ```
pub struct ObjectLister {
    storage: Storage,
    config: ListConfig,
    http_prefix: String,
    cancellation_token: PipelineCancellationToken,
}

impl ObjectLister {
    pub fn new(
        storage: Storage,
        config: ListConfig,
        http_prefix: String,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            config,
            http_prefix,
            cancellation_token,
        }
    }

    /// Reject listings whose per-object metadata fetches would be unbounded.
    pub fn validate(&self) -> Result<()> {
        if self.config.all && self.config.field.needs_object_acl() && self.config.limit == 0 {
            return Err(anyhow!(S3ToolError::InvalidConfig(
                "--all with --field owner or --field acl requires --limit.".to_string()
            )));
        }
        if self.config.max_keys <= 0 {
            return Err(anyhow!(S3ToolError::InvalidConfig(
                "--max-keys must be greater than 0.".to_string()
            )));
        }
        Ok(())
    }

    fn request(&self) -> ListRequest {
        if self.config.all {
            return ListRequest {
                prefix: String::new(),
                delimiter: None,
                max_keys: self.config.max_keys,
            };
        }

        ListRequest {
            prefix: self.config.prefix.clone(),
            delimiter: self
                .config
                .delimiter
                .clone()
                .filter(|delimiter| !delimiter.is_empty()),
            max_keys: self.config.max_keys,
        }
    }

    /// Run the listing and write every entry to `sink`.
    ///
    /// Returns the number of emitted entries.
    pub async fn list(&self, sink: &mut ReportSink) -> Result<usize> {
        self.validate()?;

        let request = self.request();
        debug!(
            prefix = request.prefix,
            delimiter = request.delimiter,
            max_keys = request.max_keys,
            limit = self.config.limit,
            all = self.config.all,
            "list objects has started."
        );

        let mut continuation_token = None;
        let mut emitted_prefixes = HashSet::new();
        let mut emitted = 0usize;

        'pages: loop {
            if self.cancellation_token.is_cancelled() {
                return Err(anyhow!(S3ToolError::Cancelled));
            }

            let page = self
                .storage
                .list_objects(&request, continuation_token.take())
                .await?;
            trace!(entries = page.entries.len(), "list page received.");

            for entry in &page.entries {
                if self.limit_reached(emitted) {
                    break 'pages;
                }
                if let ListEntry::CommonPrefix(prefix) = entry {
                    if !emitted_prefixes.insert(prefix.clone()) {
                        continue;
                    }
                }

                let line = self.render(entry).await?;
                sink.out_line(&line)?;
                emitted += 1;
            }

            match page.next_continuation_token {
                Some(token) if !self.limit_reached(emitted) => continuation_token = Some(token),
                _ => break,
            }
        }

        if emitted == 0 {
            info!(prefix = request.prefix, "No key was found!");
        }
        debug!(emitted = emitted, "list objects has been completed.");

        Ok(emitted)
    }

    fn limit_reached(&self, emitted: usize) -> bool {
        self.config.limit != 0 && emitted >= self.config.limit
    }

    fn display_key(&self, key: &str) -> String {
        if self.config.http_prefix {
            return apply_http_prefix(key, &self.http_prefix);
        }
        key.to_string()
    }

    async fn render(&self, entry: &ListEntry) -> Result<String> {
        let object = match entry {
            ListEntry::CommonPrefix(prefix) => return Ok(self.display_key(prefix)),
            ListEntry::Object(object) => object,
        };

        Ok(match self.config.field {
            FieldSelector::Key => self.display_key(&object.key),
            FieldSelector::Size => render_size(object),
            FieldSelector::LastModified => render_last_modified(object),
            FieldSelector::Owner => {
                let acl = self.storage.get_object_acl(&object.key).await?;
                acl.owner
                    .map(|owner| owner.to_string())
                    .unwrap_or_else(|| "-".to_string())
            }
            FieldSelector::Acl => self.storage.get_object_acl(&object.key).await?.to_string(),
        })
    }
}

/// `<key> -> <MiB truncated to one decimal>Mb`
fn render_size(object: &ObjectSummary) -> String {
    format!("{} -> {}", object.key, format_size_mb(object.size))
}

fn render_last_modified(object: &ObjectSummary) -> String {
    object
        .last_modified
        .map(|last_modified| last_modified.format(LAST_MODIFIED_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Format a byte count in MiB, truncated (not rounded) to one decimal.
pub fn format_size_mb(bytes: u64) -> String {
    let tenths = bytes as u128 * 10 / BYTES_PER_MIB;
    format!("{}.{}Mb", tenths / 10, tenths % 10)
}

/// Every object key under `prefix`, across all pages, in key order.
pub async fn list_all_keys(storage: &Storage, prefix: &str, max_keys: i32) -> Result<Vec<String>> {
    let request = ListRequest {
        prefix: prefix.to_string(),
        delimiter: None,
        max_keys,
    };

    let mut keys = Vec::new();
    let mut continuation_token = None;
    loop {
        let page = storage.list_objects(&request, continuation_token).await?;
        keys.extend(page.entries.into_iter().filter_map(|entry| match entry {
            ListEntry::Object(object) => Some(object.key),
            ListEntry::CommonPrefix(_) => None,
        }));

        match page.next_continuation_token {
            Some(token) => continuation_token = Some(token),
            None => break,
        }
    }

    Ok(keys)
}

/// Keys of every object inside a folder prefix, for recursive operations.
///
/// The prefix must contain the delimiter. Folder markers (keys ending with
/// the delimiter) are skipped.
pub async fn list_folder_keys(storage: &Storage, prefix: &str, max_keys: i32) -> Result<Vec<String>> {
    validate_folder_prefix(prefix).map_err(|e| anyhow!(S3ToolError::InvalidKeyPath(e)))?;

    let keys = list_all_keys(storage, prefix, max_keys)
        .await?
        .into_iter()
        .filter(|key| !key.ends_with(DELIMITER))
        .collect();

    Ok(keys)
}
