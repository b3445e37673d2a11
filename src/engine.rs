use crate::bitap::MatchOptions;
use crate::document::GetFn;
use crate::error::Result;
use crate::index::{create_index, FieldEntry, FuzzyIndex, Record};
use crate::keys::{Key, KeySpec};
use crate::logical::Expression;
use crate::ranking::{compute_scores, format_results, FieldMatch, ScoredDocument, SearchResult, SortFn};
use crate::searcher::Searcher;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine configuration.
///
/// Deserializes from the same camelCase JSON object the options are
/// usually written as; missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineOptions {
    /// Compare without lower-casing pattern and text
    pub is_case_sensitive: bool,
    pub include_score: bool,
    /// Report matched character ranges per key
    pub include_matches: bool,
    pub should_sort: bool,
    pub keys: Vec<KeySpec>,
    pub location: usize,
    pub threshold: f64,
    pub distance: usize,
    pub find_all_matches: bool,
    pub min_match_char_length: usize,
    pub ignore_location: bool,
    pub ignore_field_norm: bool,
    /// Parse patterns with the `=`, `!`, `^`, `$`, `'` markers
    pub use_extended_search: bool,
    #[serde(skip)]
    pub sort_fn: SortFn,
    #[serde(skip)]
    pub get_fn: GetFn,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let matching = MatchOptions::default();
        Self {
            is_case_sensitive: matching.is_case_sensitive,
            include_score: false,
            include_matches: matching.include_matches,
            should_sort: true,
            keys: Vec::new(),
            location: matching.location,
            threshold: matching.threshold,
            distance: matching.distance,
            find_all_matches: matching.find_all_matches,
            min_match_char_length: matching.min_match_char_length,
            ignore_location: matching.ignore_location,
            ignore_field_norm: false,
            use_extended_search: false,
            sort_fn: SortFn::default(),
            get_fn: GetFn::default(),
        }
    }
}

impl EngineOptions {
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            location: self.location,
            threshold: self.threshold,
            distance: self.distance,
            include_matches: self.include_matches,
            find_all_matches: self.find_all_matches,
            min_match_char_length: self.min_match_char_length,
            is_case_sensitive: self.is_case_sensitive,
            ignore_location: self.ignore_location,
        }
    }
}

/// Per-call search options
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
}

/// A search query: a pattern string or a `$and`/`$or` tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Pattern(String),
    Logical(Value),
}

impl From<&str> for Query {
    fn from(pattern: &str) -> Self {
        Query::Pattern(pattern.to_string())
    }
}

impl From<String> for Query {
    fn from(pattern: String) -> Self {
        Query::Pattern(pattern)
    }
}

impl From<Value> for Query {
    fn from(value: Value) -> Self {
        match value {
            Value::String(pattern) => Query::Pattern(pattern),
            other => Query::Logical(other),
        }
    }
}

/// Fuzzy search over an in-memory collection
#[derive(Debug)]
pub struct SearchEngine {
    options: EngineOptions,
    docs: Vec<Value>,
    index: FuzzyIndex,
}

impl SearchEngine {
    /// Index `docs` and create an engine over them
    pub fn new(docs: Vec<Value>, options: EngineOptions) -> Result<Self> {
        Self::with_index(docs, options, None)
    }

    /// Create an engine, reusing a prebuilt index when one is given
    pub fn with_index(
        docs: Vec<Value>,
        options: EngineOptions,
        index: Option<FuzzyIndex>,
    ) -> Result<Self> {
        let index = match index {
            Some(index) => index,
            None => create_index(&options.keys, &docs, options.get_fn.clone())?,
        };

        Ok(Self {
            options,
            docs,
            index,
        })
    }

    /// Replace the collection, rebuilding the index unless one is given
    pub fn set_collection(&mut self, docs: Vec<Value>, index: Option<FuzzyIndex>) -> Result<()> {
        self.index = match index {
            Some(index) => index,
            None => create_index(&self.options.keys, &docs, self.options.get_fn.clone())?,
        };
        self.docs = docs;
        Ok(())
    }

    /// Append a document; nulls are ignored
    pub fn add(&mut self, doc: Value) {
        if doc.is_null() {
            return;
        }
        self.index.add_at(&doc, self.docs.len());
        self.docs.push(doc);
    }

    /// Remove every document the predicate selects and return them
    pub fn remove<F>(&mut self, predicate: F) -> Vec<Value>
    where
        F: Fn(&Value, usize) -> bool,
    {
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.docs.len() {
            if predicate(&self.docs[i], i) {
                removed.extend(self.remove_at(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Remove the document at `index`; later documents move down by one
    pub fn remove_at(&mut self, index: usize) -> Option<Value> {
        if index >= self.docs.len() {
            return None;
        }
        self.index.remove_at(index);
        Some(self.docs.remove(index))
    }

    pub fn index(&self) -> &FuzzyIndex {
        &self.index
    }

    pub fn documents(&self) -> &[Value] {
        &self.docs
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Search the collection
    pub fn search(&self, query: impl Into<Query>, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        let query = query.into();
        let match_options = self.options.match_options();

        let mut results = match &query {
            Query::Pattern(pattern) => {
                let searcher =
                    Searcher::new(pattern, match_options, self.options.use_extended_search);
                self.search_records(&searcher)
            }
            Query::Logical(tree) => {
                let expression =
                    Expression::parse(tree, match_options, self.options.use_extended_search)?;
                self.search_logical(&expression)
            }
        };

        compute_scores(&mut results, self.options.ignore_field_norm);

        if self.options.should_sort {
            let sort_fn = &self.options.sort_fn;
            results.sort_by(|a, b| sort_fn.compare(a, b));
        }

        if let Some(limit) = options.limit {
            results.truncate(limit);
        }

        tracing::debug!(
            "Query {:?} matched {} of {} records",
            query,
            results.len(),
            self.index.size()
        );

        Ok(format_results(
            results,
            &self.docs,
            self.options.include_matches,
            self.options.include_score,
        ))
    }

    /// Run a pattern over every key of every record
    fn search_records(&self, searcher: &Searcher) -> Vec<ScoredDocument> {
        self.index
            .records()
            .iter()
            .filter_map(|record| {
                let (index, matches) = match record {
                    Record::Text { value, index, norm } => {
                        let result = searcher.search_in(value);
                        if !result.is_match {
                            return None;
                        }
                        let found = FieldMatch {
                            score: result.score,
                            key: None,
                            value: value.clone(),
                            ref_index: None,
                            norm: *norm,
                            indices: result.indices,
                        };
                        (*index, vec![found])
                    }
                    Record::Object { index, fields } => {
                        let matches: Vec<_> = self
                            .index
                            .keys()
                            .iter()
                            .enumerate()
                            .flat_map(|(pos, key)| find_matches(Some(key), fields.get(&pos), searcher))
                            .collect();
                        (*index, matches)
                    }
                };
                (!matches.is_empty()).then(|| ScoredDocument::new(index, matches))
            })
            .collect()
    }

    fn search_logical(&self, expression: &Expression) -> Vec<ScoredDocument> {
        self.index
            .records()
            .iter()
            .filter_map(|record| {
                let Record::Object { index, .. } = record else {
                    return None;
                };
                let matches = expression.evaluate(&|key_id: &str, searcher: &Searcher| {
                    find_matches(
                        self.index.key(key_id),
                        self.index.value_for_key(record, key_id),
                        searcher,
                    )
                });
                (!matches.is_empty()).then(|| ScoredDocument::new(*index, matches))
            })
            .collect()
    }
}

/// Every value of one key that the searcher accepts
fn find_matches(key: Option<&Key>, entry: Option<&FieldEntry>, searcher: &Searcher) -> Vec<FieldMatch> {
    let values = match entry {
        None => return Vec::new(),
        Some(FieldEntry::Single(value)) => std::slice::from_ref(value),
        Some(FieldEntry::Multi(values)) => values.as_slice(),
    };

    values
        .iter()
        .filter_map(|v| {
            let result = searcher.search_in(&v.value);
            result.is_match.then(|| FieldMatch {
                score: result.score,
                key: key.cloned(),
                value: v.value.clone(),
                ref_index: v.position,
                norm: v.norm,
                indices: result.indices,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{get_path, FieldValue};
    use serde_json::json;

    #[test]
    fn test_engine_exact_then_fuzzy() -> Result<()> {
        let options = EngineOptions {
            include_score: true,
            ..Default::default()
        };
        let engine = SearchEngine::new(vec![json!("Tom"), json!("Tim")], options)?;

        let results = engine.search("Tom", &SearchOptions::default())?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].item, json!("Tom"));
        assert_eq!(results[0].ref_index, 0);
        assert_eq!(results[0].score, Some(0.0));
        assert_eq!(results[1].item, json!("Tim"));
        assert_eq!(results[1].ref_index, 1);
        assert!(results[1].score.unwrap_or(0.0) > 0.0);
        Ok(())
    }

    #[test]
    fn test_engine_extended_exact() -> Result<()> {
        let options = EngineOptions {
            use_extended_search: true,
            ..Default::default()
        };
        let engine = SearchEngine::new(vec![json!("Tom"), json!("Tim")], options)?;

        let results = engine.search("=Tom", &SearchOptions::default())?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item, json!("Tom"));
        Ok(())
    }

    #[test]
    fn test_engine_min_match_char_length() -> Result<()> {
        let options = EngineOptions {
            include_matches: true,
            min_match_char_length: 3,
            ..Default::default()
        };
        let engine = SearchEngine::new(vec![json!("hello world")], options)?;

        let results = engine.search("wor", &SearchOptions::default())?;
        let matches = results[0].matches.as_ref().map(Vec::as_slice).unwrap_or(&[]);
        assert!(matches[0].indices.contains(&(6, 8)));
        Ok(())
    }

    #[test]
    fn test_engine_add_and_remove() -> Result<()> {
        let mut engine = SearchEngine::new(vec![json!("apple"), json!("banana")], EngineOptions::default())?;
        engine.add(json!("cherry"));
        engine.add(Value::Null);
        assert_eq!(engine.documents().len(), 3);

        assert_eq!(engine.remove_at(0), Some(json!("apple")));
        assert_eq!(engine.remove_at(10), None);

        let results = engine.search("cherry", &SearchOptions::default())?;
        assert_eq!(results[0].ref_index, 1);
        assert!(engine.search("apple", &SearchOptions::default())?.is_empty());

        let removed = engine.remove(|doc, _| doc.as_str().is_some_and(|s| s.starts_with('b')));
        assert_eq!(removed, vec![json!("banana")]);
        assert_eq!(engine.search("cherry", &SearchOptions::default())?[0].ref_index, 0);
        Ok(())
    }

    #[test]
    fn test_custom_get_fn() -> Result<()> {
        let get_fn = GetFn::new(|doc: &Value, path: &[String]| match path.first().map(String::as_str) {
            Some("full_name") => FieldValue::Leaf(format!(
                "{} {}",
                doc["first"].as_str().unwrap_or_default(),
                doc["last"].as_str().unwrap_or_default()
            )),
            _ => get_path(doc, path),
        });
        let options = EngineOptions {
            keys: vec!["full_name".into()],
            include_matches: true,
            get_fn,
            ..Default::default()
        };
        let docs = vec![
            json!({"first": "Alan", "last": "Turing"}),
            json!({"first": "Ada", "last": "Lovelace"}),
        ];
        let engine = SearchEngine::new(docs, options)?;

        let results = engine.search("ada lovelace", &SearchOptions::default())?;
        assert_eq!(results[0].ref_index, 1);
        let matches = results[0].matches.clone().unwrap_or_default();
        assert_eq!(matches[0].value, "Ada Lovelace");
        assert_eq!(matches[0].key.as_deref(), Some("full_name"));
        Ok(())
    }

    #[test]
    fn test_set_collection() -> Result<()> {
        let mut engine = SearchEngine::new(vec![json!("apple")], EngineOptions::default())?;

        engine.set_collection(vec![json!("cherry"), json!("banana")], None)?;
        assert_eq!(engine.index().size(), 2);
        assert_eq!(engine.search("banana", &SearchOptions::default())?[0].ref_index, 1);
        assert!(engine.search("apple", &SearchOptions::default())?.is_empty());

        let docs = vec![json!("apple")];
        let prebuilt = create_index(&[], &docs, GetFn::default())?;
        engine.set_collection(docs, Some(prebuilt))?;
        assert_eq!(engine.search("apple", &SearchOptions::default())?[0].item, json!("apple"));
        Ok(())
    }

    #[test]
    fn test_logical_keys_come_from_index() -> Result<()> {
        let docs = vec![json!({"title": "Dune"})];
        let index = create_index(&["title".into()], &docs, GetFn::default())?;
        let options = EngineOptions {
            include_score: true,
            ..Default::default()
        };
        let engine = SearchEngine::with_index(docs, options, Some(index))?;

        let logical = engine.search(json!({"title": "dune"}), &SearchOptions::default())?;
        let pattern = engine.search("dune", &SearchOptions::default())?;
        assert_eq!(logical[0].score, Some(f64::EPSILON));
        assert_eq!(logical[0].score, pattern[0].score);
        Ok(())
    }

    #[test]
    fn test_options_from_json() -> std::result::Result<(), serde_json::Error> {
        let options: EngineOptions = serde_json::from_str(
            r#"{"threshold": 0.3, "keys": ["title", {"name": "author", "weight": 2}], "useExtendedSearch": true}"#,
        )?;
        assert_eq!(options.threshold, 0.3);
        assert_eq!(options.keys.len(), 2);
        assert!(options.use_extended_search);
        assert!(options.should_sort);
        assert_eq!(options.distance, 100);
        Ok(())
    }
}
