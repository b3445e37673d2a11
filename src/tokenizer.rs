use std::collections::HashMap;

/// Decimal places kept for field-length norms.
const NORM_PRECISION: i32 = 3;

/// Text normalization shared by patterns and indexed values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer {
    is_case_sensitive: bool,
}

impl Tokenizer {
    pub fn new(is_case_sensitive: bool) -> Self {
        Self { is_case_sensitive }
    }

    /// Lower-case text unless the tokenizer is case sensitive
    pub fn normalize(&self, text: &str) -> String {
        if self.is_case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    }

    /// Whitespace-separated word count
    pub fn word_count(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// A value made only of whitespace is never indexed
    pub fn is_blank(text: &str) -> bool {
        text.trim().is_empty()
    }
}

/// Memoized `1 / sqrt(word_count)` rounded to three decimals.
///
/// Owned by a single index and cleared once a bulk build finishes, so no
/// cache outlives the index that filled it.
#[derive(Debug, Default)]
pub struct FieldNorm {
    cache: HashMap<usize, f64>,
}

impl FieldNorm {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }

    pub fn get(&mut self, text: &str) -> f64 {
        let words = Tokenizer::word_count(text).max(1);
        *self.cache.entry(words).or_insert_with(|| {
            let scale = 10f64.powi(NORM_PRECISION);
            ((1.0 / (words as f64).sqrt()) * scale).round() / scale
        })
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
