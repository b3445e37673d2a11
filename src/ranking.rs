use crate::bitap::MatchRange;
use crate::keys::Key;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A value of a document that matched the query.
#[derive(Debug, Clone)]
pub struct FieldMatch {
    pub score: f64,
    /// Absent for plain string collections
    pub key: Option<Key>,
    pub value: String,
    /// Position within the source array, for array values
    pub ref_index: Option<usize>,
    pub norm: f64,
    pub indices: Option<Vec<MatchRange>>,
}

/// A matching document before it is materialized.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub ref_index: usize,
    pub matches: Vec<FieldMatch>,
    pub score: f64,
}

impl ScoredDocument {
    pub fn new(ref_index: usize, matches: Vec<FieldMatch>) -> Self {
        Self {
            ref_index,
            matches,
            score: 1.0,
        }
    }
}

/// Aggregate every document's matches into one score.
///
/// The score is the product of `score ^ (weight * norm)` over its matches.
/// A perfect keyed match is floored at `f64::EPSILON` so that it still
/// ranks by its weight instead of zeroing the whole product.
pub fn compute_scores(results: &mut [ScoredDocument], ignore_field_norm: bool) {
    for result in results.iter_mut() {
        result.score = result.matches.iter().fold(1.0, |total, m| {
            let weight = m.key.as_ref().map(|k| k.weight);
            let score = match weight {
                Some(_) if m.score == 0.0 => f64::EPSILON,
                _ => m.score,
            };
            let norm = if ignore_field_norm { 1.0 } else { m.norm };
            total * score.powf(weight.unwrap_or(1.0) * norm)
        });
    }
}

/// Ascending score, then original position
pub fn default_sort(a: &ScoredDocument, b: &ScoredDocument) -> Ordering {
    a.score
        .partial_cmp(&b.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.ref_index.cmp(&b.ref_index))
}

/// Caller-supplied result ordering.
#[derive(Clone)]
pub struct SortFn(Arc<dyn Fn(&ScoredDocument, &ScoredDocument) -> Ordering + Send + Sync>);

impl SortFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ScoredDocument, &ScoredDocument) -> Ordering + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn compare(&self, a: &ScoredDocument, b: &ScoredDocument) -> Ordering {
        (self.0)(a, b)
    }
}

impl Default for SortFn {
    fn default() -> Self {
        Self::new(default_sort)
    }
}

impl fmt::Debug for SortFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SortFn(..)")
    }
}

/// Matched ranges of one value, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDetail {
    pub indices: Vec<MatchRange>,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "refIndex", skip_serializing_if = "Option::is_none")]
    pub ref_index: Option<usize>,
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub item: Value,
    #[serde(rename = "refIndex")]
    pub ref_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<Vec<MatchDetail>>,
}

/// Attach documents, and optionally scores and match details
pub fn format_results(
    results: Vec<ScoredDocument>,
    docs: &[Value],
    include_matches: bool,
    include_score: bool,
) -> Vec<SearchResult> {
    results
        .into_iter()
        .map(|result| {
            let matches = include_matches.then(|| {
                result
                    .matches
                    .iter()
                    .filter_map(|m| {
                        let indices = m.indices.as_ref().filter(|ix| !ix.is_empty())?;
                        Some(MatchDetail {
                            indices: indices.clone(),
                            value: m.value.clone(),
                            key: m.key.as_ref().map(|k| k.src.clone()),
                            ref_index: m.ref_index,
                        })
                    })
                    .collect()
            });

            SearchResult {
                item: docs.get(result.ref_index).cloned().unwrap_or(Value::Null),
                ref_index: result.ref_index,
                score: include_score.then_some(result.score),
                matches,
            }
        })
        .collect()
}
