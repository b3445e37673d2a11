use crate::engine::EngineOptions;
use crate::index::IndexSnapshot;
use anyhow::{Context, Result};
use serde_json::Value;
use sled::Db;
use std::path::Path;

const DOCS_TREE: &str = "documents";
const INDEX_TREE: &str = "index";
const METADATA_TREE: &str = "metadata";

const SNAPSHOT_KEY: &[u8] = b"snapshot";
const OPTIONS_KEY: &[u8] = b"options";

/// On-disk home of a collection, its index snapshot and the options it was built with
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open or create a storage database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path).context("Failed to open database")?;
        Ok(Self { db })
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open().context("Failed to create in-memory database")?;
        Ok(Self { db })
    }

    // ========== Document Operations ==========

    /// Replace the stored collection, keeping document order
    pub fn save_documents(&self, docs: &[Value]) -> Result<()> {
        let tree = self.db.open_tree(DOCS_TREE)?;
        tree.clear()?;
        for (i, doc) in docs.iter().enumerate() {
            // bincode cannot decode serde_json::Value
            let serialized = serde_json::to_vec(doc)?;
            tree.insert((i as u64).to_be_bytes(), serialized)?;
        }
        Ok(())
    }

    /// Stored collection in its original order
    pub fn load_documents(&self) -> Result<Vec<Value>> {
        let tree = self.db.open_tree(DOCS_TREE)?;
        let mut docs = Vec::with_capacity(tree.len());

        for item in tree.iter() {
            let (_, value) = item?;
            let doc: Value = serde_json::from_slice(&value).context("Corrupt stored document")?;
            docs.push(doc);
        }

        Ok(docs)
    }

    pub fn count_documents(&self) -> Result<usize> {
        let tree = self.db.open_tree(DOCS_TREE)?;
        Ok(tree.len())
    }

    // ========== Index Operations ==========

    pub fn save_snapshot(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let tree = self.db.open_tree(INDEX_TREE)?;
        let serialized = bincode::serialize(snapshot)?;
        tree.insert(SNAPSHOT_KEY, serialized)?;
        tree.flush()?;
        Ok(())
    }

    pub fn load_snapshot(&self) -> Result<Option<IndexSnapshot>> {
        let tree = self.db.open_tree(INDEX_TREE)?;
        if let Some(data) = tree.get(SNAPSHOT_KEY)? {
            let snapshot: IndexSnapshot = bincode::deserialize(&data)?;
            Ok(Some(snapshot))
        } else {
            Ok(None)
        }
    }

    // ========== Metadata Operations ==========

    pub fn save_options(&self, options: &EngineOptions) -> Result<()> {
        let tree = self.db.open_tree(METADATA_TREE)?;
        tree.insert(OPTIONS_KEY, serde_json::to_vec(options)?)?;
        Ok(())
    }

    pub fn load_options(&self) -> Result<Option<EngineOptions>> {
        let tree = self.db.open_tree(METADATA_TREE)?;
        if let Some(data) = tree.get(OPTIONS_KEY)? {
            Ok(Some(serde_json::from_slice(&data)?))
        } else {
            Ok(None)
        }
    }

    /// Flush all changes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Clear all data
    pub fn clear(&self) -> Result<()> {
        self.db.drop_tree(DOCS_TREE)?;
        self.db.drop_tree(INDEX_TREE)?;
        self.db.drop_tree(METADATA_TREE)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::GetFn;
    use crate::index::create_index;
    use crate::keys::KeySpec;
    use serde_json::json;

    #[test]
    fn test_storage_documents() -> Result<()> {
        let storage = Storage::in_memory()?;
        let docs: Vec<Value> = (0..300).map(|i| json!({"title": format!("doc {}", i)})).collect();

        storage.save_documents(&docs)?;
        assert_eq!(storage.count_documents()?, 300);
        assert_eq!(storage.load_documents()?, docs);

        storage.save_documents(&docs[..2])?;
        assert_eq!(storage.count_documents()?, 2);
        Ok(())
    }

    #[test]
    fn test_storage_snapshot_and_options() -> Result<()> {
        let storage = Storage::in_memory()?;
        assert!(storage.load_snapshot()?.is_none());

        let keys = vec![KeySpec::weighted("title", 2.0), "tags".into()];
        let docs = vec![json!({"title": "Dune", "tags": ["sand", "spice"]})];
        let snapshot = create_index(&keys, &docs, GetFn::default())?.to_snapshot();

        storage.save_snapshot(&snapshot)?;
        assert_eq!(storage.load_snapshot()?, Some(snapshot));

        let options = EngineOptions {
            keys,
            threshold: 0.2,
            ..Default::default()
        };
        storage.save_options(&options)?;
        let loaded = storage.load_options()?.context("options missing")?;
        assert_eq!(loaded.keys, options.keys);
        assert_eq!(loaded.threshold, 0.2);

        storage.clear()?;
        assert!(storage.load_options()?.is_none());
        Ok(())
    }
}
