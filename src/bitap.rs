//! Bitap approximate matching.
//!
//! Patterns are matched with a bit-parallel edit-distance sweep over a
//! 32-bit mask. Longer patterns are cut into 32-character chunks that are
//! searched independently; a chunked pattern matches only when every chunk
//! does, and its score is the mean of the chunk scores. That score is an
//! approximation of what a single wide sweep would give, not an exact
//! equivalent.

use crate::error::{Error, Result};
use crate::tokenizer::Tokenizer;
use std::collections::HashMap;

/// Width of the bitmask, and so the longest pattern a single sweep handles.
pub const MAX_BITS: usize = 32;

/// Best score ever reported for an inexact match.
const MIN_FUZZY_SCORE: f64 = 0.001;

/// Inclusive character range `[start, end]`.
pub type MatchRange = (usize, usize);

/// Knobs of the fuzzy matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Where in the text the pattern is expected
    pub location: usize,
    /// 0.0 requires a perfect match, 1.0 matches anything
    pub threshold: f64,
    /// How far from `location` a match may drift before it scores 1.0
    pub distance: usize,
    pub include_matches: bool,
    pub find_all_matches: bool,
    pub min_match_char_length: usize,
    pub is_case_sensitive: bool,
    pub ignore_location: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            location: 0,
            threshold: 0.6,
            distance: 100,
            include_matches: false,
            find_all_matches: false,
            min_match_char_length: 1,
            is_case_sensitive: false,
            ignore_location: false,
        }
    }
}

/// Outcome of matching one pattern against one string. Score 0 is perfect.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub is_match: bool,
    pub score: f64,
    pub indices: Option<Vec<MatchRange>>,
}

impl MatchResult {
    pub fn miss() -> Self {
        Self {
            is_match: false,
            score: 1.0,
            indices: None,
        }
    }
}

/// Score of a candidate: error ratio plus distance from the expected location.
pub fn compute_score(
    pattern_len: usize,
    errors: usize,
    current_location: i64,
    expected_location: i64,
    options: &MatchOptions,
) -> f64 {
    let accuracy = errors as f64 / pattern_len as f64;
    if options.ignore_location {
        return accuracy;
    }

    let proximity = (expected_location - current_location).abs();
    if options.distance == 0 {
        return if proximity != 0 { 1.0 } else { accuracy };
    }

    accuracy + proximity as f64 / options.distance as f64
}

/// Turn a per-character match mask into ranges at least `min_len` long
pub fn mask_to_indices(mask: &[bool], min_len: usize) -> Vec<MatchRange> {
    let mut indices = Vec::new();
    let mut start: Option<usize> = None;

    for (i, &matched) in mask.iter().enumerate() {
        match (matched, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= min_len {
                    indices.push((s, i - 1));
                }
                start = None;
            }
            _ => {}
        }
    }

    if let Some(s) = start {
        if mask.len() - s >= min_len {
            indices.push((s, mask.len() - 1));
        }
    }

    indices
}

/// Bit positions of every character of a pattern no longer than [`MAX_BITS`]
pub fn pattern_alphabet(pattern: &[char]) -> HashMap<char, u32> {
    let len = pattern.len();
    let mut alphabet = HashMap::new();
    for (i, c) in pattern.iter().enumerate() {
        *alphabet.entry(*c).or_insert(0) |= 1u32 << (len - i - 1);
    }
    alphabet
}

/// Single-sweep bitap search of `pattern` in `text`.
///
/// Text and pattern are compared as given; no case folding happens here.
/// Fails with [`Error::PatternTooLong`] when the pattern does not fit the mask.
pub fn bitap_search(text: &str, pattern: &str, options: &MatchOptions) -> Result<MatchResult> {
    let pattern: Vec<char> = pattern.chars().collect();
    if pattern.len() > MAX_BITS {
        return Err(Error::PatternTooLong { max: MAX_BITS });
    }
    let chunk = Chunk::new(pattern, 0);
    let text: Vec<char> = text.chars().collect();
    Ok(chunk.search(&text, options.location, options))
}

/// A slice of at most [`MAX_BITS`] pattern characters and its alphabet.
#[derive(Debug, Clone)]
struct Chunk {
    pattern: Vec<char>,
    alphabet: HashMap<char, u32>,
    start_index: usize,
}

impl Chunk {
    fn new(pattern: Vec<char>, start_index: usize) -> Self {
        let alphabet = pattern_alphabet(&pattern);
        Self {
            pattern,
            alphabet,
            start_index,
        }
    }

    fn search(&self, text: &[char], location: usize, options: &MatchOptions) -> MatchResult {
        let pattern = &self.pattern;
        let pattern_len = pattern.len();
        if pattern_len == 0 {
            return MatchResult::miss();
        }
        let text_len = text.len();

        let expected_location = location.min(text_len) as i64;
        let score_at = |errors: usize, current_location: i64| {
            compute_score(pattern_len, errors, current_location, expected_location, options)
        };

        let mut current_threshold = options.threshold;
        let compute_matches = options.min_match_char_length > 1 || options.include_matches;
        let mut match_mask = vec![false; if compute_matches { text_len } else { 0 }];

        // Exact occurrences tighten the threshold before the sweep
        let mut search_from = expected_location as usize;
        while let Some(index) = find_from(text, pattern, search_from) {
            current_threshold = current_threshold.min(score_at(0, index as i64));
            search_from = index + pattern_len;
            if compute_matches {
                match_mask[index..index + pattern_len].fill(true);
            }
        }

        let mut best_location: i64 = -1;
        let mut last_bit_arr: Vec<u32> = Vec::new();
        let mut final_score = 1.0;
        let mut bin_max = (pattern_len + text_len) as i64;
        let mask = 1u32 << (pattern_len - 1);

        for errors in 0..pattern_len {
            // Widest window around the expected location that can still pass
            let mut bin_min = 0;
            let mut bin_mid = bin_max;
            while bin_min < bin_mid {
                if score_at(errors, expected_location + bin_mid) <= current_threshold {
                    bin_min = bin_mid;
                } else {
                    bin_max = bin_mid;
                }
                bin_mid = (bin_max - bin_min) / 2 + bin_min;
            }
            bin_max = bin_mid;

            let mut start = (expected_location - bin_mid + 1).max(1);
            let finish = if options.find_all_matches {
                text_len as i64
            } else {
                (expected_location + bin_mid).min(text_len as i64) + pattern_len as i64
            };

            let mut bit_arr = vec![0u32; finish as usize + 2];
            bit_arr[finish as usize + 1] = (1u32 << errors) - 1;
            let last = |k: usize| last_bit_arr.get(k).copied().unwrap_or(0);

            let mut j = finish;
            while j >= start {
                let current_location = (j - 1) as usize;
                let char_match = text
                    .get(current_location)
                    .and_then(|c| self.alphabet.get(c))
                    .copied()
                    .unwrap_or(0);

                if compute_matches && current_location < text_len {
                    match_mask[current_location] = char_match != 0;
                }

                let ju = j as usize;
                bit_arr[ju] = ((bit_arr[ju + 1] << 1) | 1) & char_match;
                if errors > 0 {
                    bit_arr[ju] |= ((last(ju + 1) | last(ju)) << 1) | 1 | last(ju + 1);
                }

                if bit_arr[ju] & mask != 0 {
                    final_score = score_at(errors, current_location as i64);
                    if final_score <= current_threshold {
                        current_threshold = final_score;
                        best_location = current_location as i64;
                        if best_location <= expected_location {
                            break;
                        }
                        start = (2 * expected_location - best_location).max(1);
                    }
                }
                j -= 1;
            }

            // One more error can no longer beat the best match
            if score_at(errors + 1, expected_location) > current_threshold {
                break;
            }
            last_bit_arr = bit_arr;
        }

        let mut result = MatchResult {
            is_match: best_location >= 0,
            score: final_score.max(MIN_FUZZY_SCORE),
            indices: None,
        };

        if compute_matches {
            let indices = mask_to_indices(&match_mask, options.min_match_char_length);
            if indices.is_empty() {
                result.is_match = false;
            } else if options.include_matches {
                result.indices = Some(indices);
            }
        }

        result
    }
}

fn find_from(text: &[char], pattern: &[char], from: usize) -> Option<usize> {
    if from > text.len() || pattern.len() > text.len() - from {
        return None;
    }
    text[from..]
        .windows(pattern.len())
        .position(|window| window == pattern)
        .map(|pos| pos + from)
}

/// Fuzzy matcher for one pattern of any length.
#[derive(Debug, Clone)]
pub struct BitapSearcher {
    pattern: String,
    chunks: Vec<Chunk>,
    options: MatchOptions,
    tokenizer: Tokenizer,
}

impl BitapSearcher {
    pub fn new(pattern: &str, options: MatchOptions) -> Self {
        let tokenizer = Tokenizer::new(options.is_case_sensitive);
        let pattern = tokenizer.normalize(pattern);
        let chars: Vec<char> = pattern.chars().collect();
        let len = chars.len();

        let mut chunks = Vec::new();
        if len > MAX_BITS {
            let remainder = len % MAX_BITS;
            let full = len - remainder;
            for start in (0..full).step_by(MAX_BITS) {
                chunks.push(Chunk::new(chars[start..start + MAX_BITS].to_vec(), start));
            }
            // The tail chunk overlaps the previous one so it stays full width
            if remainder > 0 {
                let start = len - MAX_BITS;
                chunks.push(Chunk::new(chars[start..].to_vec(), start));
            }
        } else if len > 0 {
            chunks.push(Chunk::new(chars, 0));
        }

        Self {
            pattern,
            chunks,
            options,
            tokenizer,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn search_in(&self, text: &str) -> MatchResult {
        let text = self.tokenizer.normalize(text);

        if self.pattern == text {
            let len = text.chars().count();
            return MatchResult {
                is_match: true,
                score: 0.0,
                indices: (self.options.include_matches && len > 0).then(|| vec![(0, len - 1)]),
            };
        }

        if self.chunks.is_empty() {
            return MatchResult::miss();
        }

        let text: Vec<char> = text.chars().collect();
        let mut all_matched = true;
        let mut total_score = 0.0;
        let mut all_indices = Vec::new();

        for chunk in &self.chunks {
            let location = self.options.location.saturating_add(chunk.start_index);
            let result = chunk.search(&text, location, &self.options);
            all_matched &= result.is_match;
            total_score += result.score;
            if let (true, Some(indices)) = (result.is_match, result.indices) {
                all_indices.extend(indices);
            }
        }

        if !all_matched {
            return MatchResult::miss();
        }

        MatchResult {
            is_match: true,
            score: total_score / self.chunks.len() as f64,
            indices: self.options.include_matches.then_some(all_indices),
        }
    }
}
