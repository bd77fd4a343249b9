// Copyright 2025 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.
//
// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

//! Partitioned bulk-write helper for tagging runs.
//!
//! One tagging run writes its member lists as numbered JSON partitions
//! under `tagging/{tag}/{time_key}/`, so independent workers can write
//! their own partition without coordinating, and a consumer can stream
//! the whole run back partition by partition.

use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::storage::adapter::ObjectStorage;
use crate::storage::error::StorageResult;

/// Member lists for one tagging run.
pub struct TaggingMembers {
    storage: Arc<dyn ObjectStorage>,
    tag: String,
    time_key: String,
}

impl TaggingMembers {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        tag: impl Into<String>,
        time_key: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            tag: tag.into(),
            time_key: time_key.into(),
        }
    }

    /// Prefix holding every partition of this run.
    pub fn prefix(&self) -> String {
        format!("tagging/{}/{}", self.tag, self.time_key)
    }

    /// Key of one numbered partition, zero-padded to keep listings in
    /// partition order.
    pub fn partition_key(&self, partition: u32) -> String {
        format!("{}/{:04}.json", self.prefix(), partition)
    }

    /// Write the member list of one partition, overwriting any previous
    /// content.
    pub async fn insert_file(&self, partition: u32, members: &[Value]) -> StorageResult<()> {
        let key = self.partition_key(partition);
        self.storage
            .put_object(&Value::Array(members.to_vec()), &key)
            .await
    }

    /// Read the member list of one partition. A partition nobody wrote, or
    /// one whose content is not readable as JSON, reads as empty.
    pub async fn get_file(&self, partition: u32) -> StorageResult<Vec<Value>> {
        let key = self.partition_key(partition);
        match self.storage.get_object(&key).await {
            Ok(bytes) => Ok(Self::parse_members(&bytes, &key)),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn parse_members(bytes: &[u8], key: &str) -> Vec<Value> {
        match serde_json::from_slice(bytes) {
            Ok(members) => members,
            Err(e) => {
                warn!("Unreadable tagging partition {}: {}", key, e);
                Vec::new()
            }
        }
    }

    /// Stream every partition's member list, one `Vec` per JSON partition
    /// file, in the backend's listing order.
    pub async fn iterate_all_members(
        &self,
    ) -> StorageResult<impl Stream<Item = StorageResult<Vec<Value>>> + '_> {
        let keys = self.list_partition_keys().await?;
        Ok(futures::stream::iter(keys).then(move |key| async move {
            let bytes = self.storage.get_object(&key).await?;
            Ok(Self::parse_members(&bytes, &key))
        }))
    }

    /// Delete every partition of this run.
    ///
    /// Returns whether the run is fully gone: an already-missing partition
    /// counts as deleted, any other per-key failure is logged and turns the
    /// result false without stopping the sweep.
    pub async fn delete_all_files(&self) -> StorageResult<bool> {
        let keys = self.list_partition_keys().await?;
        let mut all_deleted = true;
        for key in keys {
            match self.storage.delete_object(&key).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    warn!("Failed to delete tagging partition {}: {}", key, e);
                    all_deleted = false;
                }
            }
        }
        Ok(all_deleted)
    }

    async fn list_partition_keys(&self) -> StorageResult<Vec<String>> {
        let keys = match self.storage.list_files(&self.prefix(), false).await {
            Ok(keys) => keys,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(keys.into_iter().filter(|k| k.ends_with(".json")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::config::StorageConfig;
    use crate::storage::local::LocalAdapter;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_members(tag: &str, time_key: &str) -> (TempDir, TaggingMembers) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig::local()
            .with_option("local_path", temp_dir.path().to_string_lossy());
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalAdapter::new(&config).unwrap());
        (temp_dir, TaggingMembers::new(storage, tag, time_key))
    }

    #[test]
    fn test_partition_key_layout() {
        let (_tmp, members) = test_members("abc", "2024-01");
        assert_eq!(members.prefix(), "tagging/abc/2024-01");
        assert_eq!(members.partition_key(3), "tagging/abc/2024-01/0003.json");
        assert_eq!(members.partition_key(1234), "tagging/abc/2024-01/1234.json");
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let (_tmp, members) = test_members("abc", "2024-01");
        let payload = vec![json!({"id": 1}), json!({"id": 2})];

        members.insert_file(3, &payload).await.unwrap();
        assert_eq!(members.get_file(3).await.unwrap(), payload);

        // Overwrite replaces, never merges.
        let replacement = vec![json!({"id": 9})];
        members.insert_file(3, &replacement).await.unwrap();
        assert_eq!(members.get_file(3).await.unwrap(), replacement);
    }

    #[tokio::test]
    async fn test_get_unwritten_partition_is_empty() {
        let (_tmp, members) = test_members("abc", "2024-01");
        assert!(members.get_file(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_partition_reads_as_empty() {
        let (tmp, members) = test_members("abc", "2024-01");

        let corrupt = tmp.path().join("tagging/abc/2024-01/0003.json");
        std::fs::create_dir_all(corrupt.parent().unwrap()).unwrap();
        std::fs::write(&corrupt, b"not json at all {{{").unwrap();
        members.insert_file(4, &[json!("ok")]).await.unwrap();

        // A partition with unreadable content reads as empty, like a
        // partition nobody wrote.
        assert!(members.get_file(3).await.unwrap().is_empty());

        // The stream skips over the corrupt partition's content the same
        // way instead of aborting the run.
        let stream = members.iterate_all_members().await.unwrap();
        let mut collected: Vec<Vec<Value>> = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<StorageResult<_>>()
            .unwrap();
        collected.sort_by_key(|partition| partition.len());
        assert_eq!(collected, vec![vec![], vec![json!("ok")]]);
    }

    #[tokio::test]
    async fn test_runs_are_isolated_by_tag_and_time() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig::local()
            .with_option("local_path", temp_dir.path().to_string_lossy());
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalAdapter::new(&config).unwrap());

        let run_a = TaggingMembers::new(storage.clone(), "abc", "2024-01");
        let run_b = TaggingMembers::new(storage.clone(), "abc", "2024-02");
        let run_c = TaggingMembers::new(storage, "xyz", "2024-01");

        run_a.insert_file(0, &[json!("a")]).await.unwrap();
        run_b.insert_file(0, &[json!("b")]).await.unwrap();

        assert_eq!(run_a.get_file(0).await.unwrap(), vec![json!("a")]);
        assert_eq!(run_b.get_file(0).await.unwrap(), vec![json!("b")]);
        assert!(run_c.get_file(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_iterate_all_members_streams_every_partition() {
        let (_tmp, members) = test_members("abc", "2024-01");
        members.insert_file(0, &[json!("p0")]).await.unwrap();
        members.insert_file(1, &[json!("p1a"), json!("p1b")]).await.unwrap();
        members.insert_file(2, &[]).await.unwrap();

        let stream = members.iterate_all_members().await.unwrap();
        let mut collected: Vec<Vec<Value>> = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<StorageResult<_>>()
            .unwrap();
        collected.sort_by_key(|partition| partition.len());

        assert_eq!(
            collected,
            vec![
                vec![],
                vec![json!("p0")],
                vec![json!("p1a"), json!("p1b")]
            ]
        );
    }

    #[tokio::test]
    async fn test_iterate_empty_run_yields_nothing() {
        let (_tmp, members) = test_members("abc", "2024-01");
        let stream = members.iterate_all_members().await.unwrap();
        assert!(stream.collect::<Vec<_>>().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_files() {
        let (_tmp, members) = test_members("abc", "2024-01");
        members.insert_file(0, &[json!("a")]).await.unwrap();
        members.insert_file(1, &[json!("b")]).await.unwrap();

        assert!(members.delete_all_files().await.unwrap());
        assert!(members.get_file(0).await.unwrap().is_empty());
        assert!(members.get_file(1).await.unwrap().is_empty());

        // Deleting an already-empty run is vacuously complete.
        assert!(members.delete_all_files().await.unwrap());
    }
}
