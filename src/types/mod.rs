use std::fmt;
use std::fmt::{Debug, Display, Formatter};

use aws_sdk_s3::types::ObjectCannedAcl;
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

use crate::types::error::S3ToolError;

pub mod error;
pub mod token;

/// Canned ACL applied to an object.
///
/// The set is closed; the value is handed to the store as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum Acl {
    Private,
    #[default]
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    AwsExecRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
}

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
            Acl::PublicReadWrite => "public-read-write",
            Acl::AuthenticatedRead => "authenticated-read",
            Acl::AwsExecRead => "aws-exec-read",
            Acl::BucketOwnerRead => "bucket-owner-read",
            Acl::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

impl Display for Acl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Acl> for ObjectCannedAcl {
    fn from(acl: Acl) -> Self {
        ObjectCannedAcl::from(acl.as_str())
    }
}

/// Attribute printed for each listed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FieldSelector {
    #[default]
    Key,
    Size,
    #[value(alias = "last_modified")]
    LastModified,
    Owner,
    Acl,
}

impl FieldSelector {
    /// Selectors that cost one extra metadata request per object.
    pub fn needs_object_acl(&self) -> bool {
        matches!(self, FieldSelector::Owner | FieldSelector::Acl)
    }
}

/// Object as returned by a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One line of a listing: a real object or a collapsed common prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum ListEntry {
    Object(ObjectSummary),
    CommonPrefix(String),
}

impl ListEntry {
    pub fn key(&self) -> &str {
        match self {
            ListEntry::Object(object) => &object.key,
            ListEntry::CommonPrefix(prefix) => prefix,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    /// Objects and common prefixes merged in lexicographic order.
    pub entries: Vec<ListEntry>,
    pub next_continuation_token: Option<String>,
}

/// Parameters of a single listing call.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub max_keys: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectOwner {
    pub display_name: Option<String>,
    pub id: Option<String>,
}

impl Display for ObjectOwner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.display_name.as_deref().unwrap_or("-"),
            self.id.as_deref().unwrap_or("-")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grant {
    /// `Type:identifier`, e.g. `CanonicalUser:75aa...` or `Group:http://acs...`.
    pub grantee: String,
    pub permission: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectAcl {
    pub owner: Option<ObjectOwner>,
    pub grants: Vec<Grant>,
}

impl Display for ObjectAcl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let grants: Vec<String> = self
            .grants
            .iter()
            .map(|grant| format!("{} {}", grant.grantee, grant.permission))
            .collect();
        write!(f, "[{}]", grants.join(", "))
    }
}

/// Outcome of one work item.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    Success(String),
    /// Declined at the confirmation prompt. Not an error.
    Aborted(String),
    Failure(S3ToolError),
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, OperationResult::Failure(_))
    }

    pub fn failure(&self) -> Option<&S3ToolError> {
        match self {
            OperationResult::Failure(e) => Some(e),
            _ => None,
        }
    }
}

/// Progress and result events sent through the stats channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferStatistics {
    TransferStart { key: String, total_bytes: u64 },
    TransferBytes { key: String, bytes: u64 },
    TransferComplete { key: String },
    ItemComplete { key: String },
    ItemSkip { key: String },
    ItemError { key: String },
}

#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair, cleared from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
