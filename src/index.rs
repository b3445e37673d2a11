use crate::document::{FieldValue, GetFn};
use crate::error::Result;
use crate::keys::{Key, KeySpec, KeyStore};
use crate::tokenizer::{FieldNorm, Tokenizer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One searchable string with its field-length norm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedValue {
    pub value: String,
    /// Position within the array it came from, if any
    pub position: Option<usize>,
    pub norm: f64,
}

/// What a key resolved to for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldEntry {
    Single(IndexedValue),
    Multi(Vec<IndexedValue>),
}

/// Index entry for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    /// Entry of a plain string collection
    Text { value: String, index: usize, norm: f64 },
    /// Entry of an object collection, keyed by key position
    Object {
        index: usize,
        fields: BTreeMap<usize, FieldEntry>,
    },
}

impl Record {
    /// Position of the source document in the collection
    pub fn index(&self) -> usize {
        match self {
            Record::Text { index, .. } | Record::Object { index, .. } => *index,
        }
    }

    fn index_mut(&mut self) -> &mut usize {
        match self {
            Record::Text { index, .. } | Record::Object { index, .. } => index,
        }
    }
}

/// Portable form of an index: resolved keys plus records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub keys: Vec<Key>,
    pub records: Vec<Record>,
}

/// Per-document extraction of every configured key.
#[derive(Debug)]
pub struct FuzzyIndex {
    keys: KeyStore,
    records: Vec<Record>,
    get_fn: GetFn,
    norm: FieldNorm,
    is_created: bool,
}

impl FuzzyIndex {
    pub fn new(get_fn: GetFn) -> Self {
        Self {
            keys: KeyStore::default(),
            records: Vec::new(),
            get_fn,
            norm: FieldNorm::new(),
            is_created: false,
        }
    }

    /// Rebuild an index from a snapshot without touching the documents
    pub fn from_snapshot(snapshot: IndexSnapshot, get_fn: GetFn) -> Self {
        let mut index = Self::new(get_fn);
        index.set_keys(snapshot.keys);
        index.records = snapshot.records;
        index.is_created = true;
        index
    }

    pub fn set_keys(&mut self, keys: Vec<Key>) {
        self.keys = KeyStore::from_keys(keys);
    }

    /// Index a whole collection once
    pub fn create(&mut self, docs: &[Value]) {
        if self.is_created || docs.is_empty() {
            return;
        }
        self.is_created = true;

        let strings_only = docs[0].is_string();
        for (i, doc) in docs.iter().enumerate() {
            if strings_only {
                self.add_string(doc, i);
            } else {
                self.add_object(doc, i);
            }
        }

        tracing::debug!(
            "Indexed {} documents into {} records ({} distinct norms)",
            docs.len(),
            self.records.len(),
            self.norm.len()
        );
        self.norm.clear();
    }

    /// Append a document whose position in the collection is `index`.
    ///
    /// Blank string documents leave no record, so the position has to come
    /// from the collection rather than from the last record.
    pub fn add_at(&mut self, doc: &Value, index: usize) {
        if doc.is_string() {
            self.add_string(doc, index);
        } else {
            self.add_object(doc, index);
        }
    }

    /// Drop the record of document `index` and shift later documents down by one.
    ///
    /// Returns whether a record was removed; blank documents never had one.
    pub fn remove_at(&mut self, index: usize) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.index() != index);

        for record in &mut self.records {
            let i = record.index_mut();
            if *i > index {
                *i -= 1;
            }
        }

        let removed = self.records.len() != before;
        tracing::debug!("Removed document {} (had record: {})", index, removed);
        removed
    }

    pub fn value_for_key<'a>(&self, record: &'a Record, key_id: &str) -> Option<&'a FieldEntry> {
        match record {
            Record::Object { fields, .. } => {
                self.keys.position(key_id).and_then(|pos| fields.get(&pos))
            }
            Record::Text { .. } => None,
        }
    }

    /// Resolved key with the given id
    pub fn key(&self, id: &str) -> Option<&Key> {
        self.keys.get(id)
    }

    pub fn keys(&self) -> &[Key] {
        self.keys.keys()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn to_snapshot(&self) -> IndexSnapshot {
        IndexSnapshot {
            keys: self.keys.keys().to_vec(),
            records: self.records.clone(),
        }
    }

    pub fn stats(&self) -> IndexStats {
        let total_values = self
            .records
            .iter()
            .map(|record| match record {
                Record::Text { .. } => 1,
                Record::Object { fields, .. } => fields
                    .values()
                    .map(|entry| match entry {
                        FieldEntry::Single(_) => 1,
                        FieldEntry::Multi(values) => values.len(),
                    })
                    .sum(),
            })
            .sum();

        IndexStats {
            total_records: self.records.len(),
            total_keys: self.keys.len(),
            total_values,
        }
    }

    fn add_string(&mut self, doc: &Value, index: usize) {
        let Some(text) = doc.as_str() else {
            return;
        };
        if Tokenizer::is_blank(text) {
            return;
        }
        let norm = self.norm.get(text);
        self.records.push(Record::Text {
            value: text.to_string(),
            index,
            norm,
        });
    }

    fn add_object(&mut self, doc: &Value, index: usize) {
        let mut fields = BTreeMap::new();

        for (pos, key) in self.keys.keys().iter().enumerate() {
            match self.get_fn.call(doc, &key.path) {
                FieldValue::Absent => {}
                FieldValue::Leaf(text) => {
                    if !Tokenizer::is_blank(&text) {
                        let norm = self.norm.get(&text);
                        fields.insert(
                            pos,
                            FieldEntry::Single(IndexedValue {
                                value: text,
                                position: None,
                                norm,
                            }),
                        );
                    }
                }
                FieldValue::Sequence(items) => {
                    let mut values = Vec::new();
                    flatten(&items, &mut self.norm, &mut values);
                    if !values.is_empty() {
                        fields.insert(pos, FieldEntry::Multi(values));
                    }
                }
            }
        }

        self.records.push(Record::Object { index, fields });
    }
}

/// Depth-first walk of nested sequences keeping non-blank leaves.
fn flatten(items: &[FieldValue], norm: &mut FieldNorm, out: &mut Vec<IndexedValue>) {
    for (position, item) in items.iter().enumerate() {
        match item {
            FieldValue::Leaf(text) if !Tokenizer::is_blank(text) => out.push(IndexedValue {
                value: text.clone(),
                position: Some(position),
                norm: norm.get(text),
            }),
            FieldValue::Sequence(nested) => flatten(nested, norm, out),
            _ => {}
        }
    }
}

/// Build an index for `docs` over the given keys
pub fn create_index(specs: &[KeySpec], docs: &[Value], get_fn: GetFn) -> Result<FuzzyIndex> {
    let store = KeyStore::new(specs)?;
    let mut index = FuzzyIndex::new(get_fn);
    index.set_keys(store.keys().to_vec());
    index.create(docs);
    Ok(index)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_records: usize,
    pub total_keys: usize,
    pub total_values: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn books() -> Vec<Value> {
        vec![
            json!({"title": "Old Man's War", "author": {"name": "John Scalzi"}, "tags": ["fiction", ["war", " "]]}),
            json!({"title": "The Lock Artist", "author": {"name": "Steve Hamilton"}}),
            json!({"title": "   ", "tags": []}),
        ]
    }

    #[test]
    fn test_string_collection() {
        let docs = vec![json!("apple"), json!("  "), json!("big orange")];
        let index = create_index(&[], &docs, GetFn::default()).unwrap();

        assert_eq!(index.size(), 2);
        assert_eq!(
            index.records()[1],
            Record::Text {
                value: "big orange".into(),
                index: 2,
                norm: 0.707
            }
        );
    }

    #[test]
    fn test_object_collection() -> Result<()> {
        let keys = vec!["title".into(), "author.name".into(), "tags".into()];
        let index = create_index(&keys, &books(), GetFn::default())?;

        assert_eq!(index.size(), 3);
        let first = &index.records()[0];
        assert_eq!(
            index.value_for_key(first, "author.name"),
            Some(&FieldEntry::Single(IndexedValue {
                value: "John Scalzi".into(),
                position: None,
                norm: 0.707
            }))
        );
        match index.value_for_key(first, "tags") {
            Some(FieldEntry::Multi(values)) => {
                let found: Vec<_> = values.iter().map(|v| (v.value.as_str(), v.position)).collect();
                assert_eq!(found, vec![("fiction", Some(0)), ("war", Some(0))]);
            }
            other => panic!("unexpected tags entry: {:?}", other),
        }

        // Blank title and empty tags leave the record without fields
        assert_eq!(index.value_for_key(&index.records()[2], "title"), None);
        assert_eq!(index.value_for_key(&index.records()[2], "tags"), None);
        Ok(())
    }

    #[test]
    fn test_add_and_remove_shift_indices() -> Result<()> {
        let keys = vec!["title".into()];
        let mut index = create_index(&keys, &books(), GetFn::default())?;

        index.add_at(&json!({"title": "Dune"}), 3);
        assert_eq!(index.records()[3].index(), 3);
        assert_eq!(index.key("title").map(|k| k.weight), Some(1.0));

        assert!(index.remove_at(1));
        let indices: Vec<_> = index.records().iter().map(Record::index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(!index.remove_at(10));
        Ok(())
    }

    #[test]
    fn test_add_after_trailing_blank_document() {
        let docs = vec![json!("a"), json!("  ")];
        let mut index = create_index(&[], &docs, GetFn::default()).unwrap();

        index.add_at(&json!("b"), docs.len());
        let indices: Vec<_> = index.records().iter().map(Record::index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn test_remove_blank_string_document() {
        let docs = vec![json!("a"), json!(""), json!("c")];
        let mut index = create_index(&[], &docs, GetFn::default()).unwrap();

        assert!(!index.remove_at(1));
        let indices: Vec<_> = index.records().iter().map(Record::index).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_snapshot_roundtrip() -> Result<()> {
        let keys = vec![KeySpec::weighted("title", 2.0), "tags".into()];
        let index = create_index(&keys, &books(), GetFn::default())?;

        let json = serde_json::to_string(&index.to_snapshot()).unwrap();
        let snapshot: IndexSnapshot = serde_json::from_str(&json).unwrap();
        let restored = FuzzyIndex::from_snapshot(snapshot, GetFn::default());

        assert_eq!(restored.records(), index.records());
        assert_eq!(restored.keys(), index.keys());
        assert_eq!(restored.stats().total_values, index.stats().total_values);
        Ok(())
    }
}
