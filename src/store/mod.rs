mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::{GitInfo, ReleasePatch};

/// Most records a single `list` call returns. Later insertions beyond the cap
/// are the omitted ones; there is no cursor.
pub const MAX_LIST_ITEMS: usize = 100;

/// Attribute a `seek` scan compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekAttr {
    Source,
    KubeRef,
    Status,
}

impl SeekAttr {
    pub fn from_param(name: &str) -> Option<Self> {
        match name {
            "source" => Some(Self::Source),
            "kube_ref" => Some(Self::KubeRef),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// ReleaseStore defines the release-metadata database interface.
pub trait ReleaseStore: Send + Sync {
    fn initialize(&self) -> Result<()>;

    /// Inserts a new record, stamping `created_at`, and returns the stored
    /// copy. A record already keyed by (namespace, app, revision) fails with
    /// `AlreadyExists`; the existing record is left untouched.
    fn create(&self, namespace: &str, app: &str, revision: &str, record: &GitInfo)
    -> Result<GitInfo>;

    /// Merges `patch.files` entry-by-entry and replaces `status` when present.
    /// `head_commit` and the rest of the record are never rewritten. Absent
    /// key fails with `NotFound`.
    fn update(
        &self,
        namespace: &str,
        app: &str,
        revision: &str,
        patch: &ReleasePatch,
    ) -> Result<GitInfo>;

    fn get(&self, namespace: &str, app: &str, revision: &str) -> Result<Option<GitInfo>>;

    /// First [`MAX_LIST_ITEMS`] records for an app, in insertion order.
    fn list(&self, namespace: &str, app: &str) -> Result<Vec<GitInfo>>;

    /// Linear scan over an app's records for attribute equality.
    fn seek(&self, namespace: &str, app: &str, attr: SeekAttr, value: &str)
    -> Result<Vec<GitInfo>>;
}
