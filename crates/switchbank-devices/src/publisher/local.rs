//! Local metadata sink.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use switchbank_core::config::defaults;
use switchbank_core::DataTree;
use tracing::debug;

use super::MetadataSink;
use crate::error::Result;
use crate::metadata::MetadataDigest;

/// Commits metadata straight into the data tree.
///
/// Entries are staged in a batch, committed in one step and the batch is
/// cleared afterwards.
pub struct LocalSink {
    tree: DataTree,
    batch: Mutex<Vec<(String, Value)>>,
}

impl LocalSink {
    pub fn new(tree: DataTree) -> Self {
        Self {
            tree,
            batch: Mutex::new(Vec::new()),
        }
    }

    /// Stage the entries of a digest.
    pub fn add_metas(&self, digest: &MetadataDigest) -> &Self {
        self.batch.lock().extend(digest.to_metas());
        self
    }

    /// Commit and clear the staged batch. Returns the number of entries.
    pub fn commit(&self) -> usize {
        let batch = std::mem::take(&mut *self.batch.lock());
        let committed = self.tree.commit_metas(batch, defaults::PLUGIN_ID);
        debug!(committed, "metadata committed locally");
        committed
    }

    pub fn pending(&self) -> usize {
        self.batch.lock().len()
    }
}

#[async_trait]
impl MetadataSink for LocalSink {
    fn name(&self) -> &str {
        "local"
    }

    async fn publish(&self, digest: &MetadataDigest) -> Result<u32> {
        self.add_metas(digest).commit();
        Ok(1)
    }
}
