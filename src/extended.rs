//! Extended query syntax.
//!
//! A query is split on `|` into OR-groups and each group on unquoted
//! spaces into terms. Every term in a group must match for the group to
//! match; the first group that matches decides the result.
//!
//! | Token            | Kind                 |
//! |------------------|----------------------|
//! | `=text`          | exact                |
//! | `'text`          | include (substring)  |
//! | `^text`          | prefix               |
//! | `!^text`         | inverse prefix       |
//! | `!text$`         | inverse suffix       |
//! | `text$`          | suffix               |
//! | `!text`          | inverse exact        |
//! | `text`           | fuzzy                |
//!
//! Any of them may wrap the text in double quotes to keep spaces.

use crate::bitap::{BitapSearcher, MatchOptions, MatchRange, MatchResult};
use crate::tokenizer::Tokenizer;

/// How a single term is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Exact,
    Include,
    PrefixExact,
    InversePrefixExact,
    InverseSuffixExact,
    SuffixExact,
    InverseExact,
    Fuzzy,
}

impl TermKind {
    /// Detection order; earlier kinds win.
    pub const ALL: [TermKind; 8] = [
        TermKind::Exact,
        TermKind::Include,
        TermKind::PrefixExact,
        TermKind::InversePrefixExact,
        TermKind::InverseSuffixExact,
        TermKind::SuffixExact,
        TermKind::InverseExact,
        TermKind::Fuzzy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TermKind::Exact => "exact",
            TermKind::Include => "include",
            TermKind::PrefixExact => "prefix-exact",
            TermKind::InversePrefixExact => "inverse-prefix-exact",
            TermKind::InverseSuffixExact => "inverse-suffix-exact",
            TermKind::SuffixExact => "suffix-exact",
            TermKind::InverseExact => "inverse-exact",
            TermKind::Fuzzy => "fuzzy",
        }
    }

    /// Leading and trailing markers around the literal
    fn markers(self) -> (&'static str, &'static str) {
        match self {
            TermKind::Exact => ("=", ""),
            TermKind::Include => ("'", ""),
            TermKind::PrefixExact => ("^", ""),
            TermKind::InversePrefixExact => ("!^", ""),
            TermKind::InverseSuffixExact => ("!", "$"),
            TermKind::SuffixExact => ("", "$"),
            TermKind::InverseExact => ("!", ""),
            TermKind::Fuzzy => ("", ""),
        }
    }

    /// Literal of a quoted token such as `^"some text"`
    fn match_quoted(self, token: &str) -> Option<&str> {
        let (lead, trail) = self.markers();
        token
            .strip_prefix(lead)?
            .strip_prefix('"')?
            .strip_suffix(trail)?
            .strip_suffix('"')
            .filter(|literal| !literal.is_empty())
    }

    /// Literal of a bare token such as `^text`; a lone marker is no literal
    fn match_bare(self, token: &str) -> Option<&str> {
        let (lead, trail) = self.markers();
        token
            .strip_prefix(lead)?
            .strip_suffix(trail)
            .filter(|literal| !literal.is_empty())
    }

    /// Whether matched ranges are reported as found rather than as a span
    fn reports_ranges(self) -> bool {
        matches!(self, TermKind::Fuzzy | TermKind::Include)
    }
}

/// One compiled query term.
#[derive(Debug, Clone)]
pub struct Term {
    kind: TermKind,
    pattern: String,
    fuzzy: Option<BitapSearcher>,
}

impl Term {
    pub fn new(kind: TermKind, pattern: &str, options: MatchOptions) -> Self {
        let fuzzy = (kind == TermKind::Fuzzy).then(|| BitapSearcher::new(pattern, options));
        Self {
            kind,
            pattern: pattern.to_string(),
            fuzzy,
        }
    }

    pub fn kind(&self) -> TermKind {
        self.kind
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Match against already normalized text
    pub fn search(&self, text: &str) -> MatchResult {
        if let Some(fuzzy) = &self.fuzzy {
            return fuzzy.search_in(text);
        }

        let pattern = self.pattern.as_str();
        let text_len = text.chars().count();
        let pattern_len = pattern.chars().count();
        let whole = span(0, text_len);

        let (is_match, indices) = match self.kind {
            TermKind::Exact => (text == pattern, span(0, pattern_len)),
            TermKind::InverseExact => (text != pattern, whole),
            TermKind::PrefixExact => (text.starts_with(pattern), span(0, pattern_len)),
            TermKind::InversePrefixExact => (!text.starts_with(pattern), whole),
            TermKind::SuffixExact => (
                text.ends_with(pattern),
                span(text_len.saturating_sub(pattern_len), text_len),
            ),
            TermKind::InverseSuffixExact => (!text.ends_with(pattern), whole),
            TermKind::Include => {
                let ranges = occurrences(text, pattern);
                return MatchResult {
                    is_match: !ranges.is_empty(),
                    score: if ranges.is_empty() { 0.0 } else { 1.0 },
                    indices: Some(ranges),
                };
            }
            TermKind::Fuzzy => return MatchResult::miss(),
        };

        MatchResult {
            is_match,
            score: if is_match { 0.0 } else { 1.0 },
            indices: Some(indices.into_iter().collect()),
        }
    }
}

/// Range covering `[start, end)`, none when empty
fn span(start: usize, end: usize) -> Option<MatchRange> {
    (end > start).then(|| (start, end - 1))
}

/// Every non-overlapping occurrence of `pattern`, in characters
fn occurrences(text: &str, pattern: &str) -> Vec<MatchRange> {
    if pattern.is_empty() {
        return Vec::new();
    }
    let pattern_len = pattern.chars().count();
    text.match_indices(pattern)
        .map(|(byte_pos, _)| {
            let start = text[..byte_pos].chars().count();
            (start, start + pattern_len - 1)
        })
        .collect()
}

/// Split on spaces that are outside double quotes
fn split_terms(group: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in group.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ' ' if !in_quotes => {
                terms.push(&group[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&group[start..]);

    terms.into_iter().filter(|t| !t.trim().is_empty()).collect()
}

/// Classify one token, quoted forms first
pub fn parse_term(token: &str, options: MatchOptions) -> Term {
    let quoted = TermKind::ALL
        .iter()
        .find_map(|&kind| kind.match_quoted(token).map(|literal| (kind, literal)));
    let (kind, literal) = quoted
        .or_else(|| {
            TermKind::ALL
                .iter()
                .find_map(|&kind| kind.match_bare(token).map(|literal| (kind, literal)))
        })
        .unwrap_or((TermKind::Fuzzy, token));

    Term::new(kind, literal, options)
}

/// Parse a query into OR-groups of AND-ed terms
pub fn parse_query(query: &str, options: MatchOptions) -> Vec<Vec<Term>> {
    query
        .split('|')
        .map(|group| {
            split_terms(group.trim())
                .into_iter()
                .map(|token| parse_term(token, options))
                .collect()
        })
        .collect()
}

/// Matcher for the extended syntax.
#[derive(Debug, Clone)]
pub struct ExtendedSearcher {
    query: Vec<Vec<Term>>,
    options: MatchOptions,
    tokenizer: Tokenizer,
}

impl ExtendedSearcher {
    pub fn new(pattern: &str, options: MatchOptions) -> Self {
        let tokenizer = Tokenizer::new(options.is_case_sensitive);
        let query = parse_query(&tokenizer.normalize(pattern), options);
        for (i, group) in query.iter().enumerate() {
            let kinds: Vec<_> = group.iter().map(|t| t.kind().name()).collect();
            tracing::trace!("Group {}: {:?}", i, kinds);
        }
        Self {
            query,
            options,
            tokenizer,
        }
    }

    pub fn groups(&self) -> &[Vec<Term>] {
        &self.query
    }

    pub fn search_in(&self, text: &str) -> MatchResult {
        let text = self.tokenizer.normalize(text);

        for group in &self.query {
            if group.is_empty() {
                continue;
            }

            let mut total_score = 0.0;
            let mut indices = Vec::new();
            let mut all_matched = true;

            for term in group {
                let result = term.search(&text);
                if !result.is_match {
                    all_matched = false;
                    break;
                }
                total_score += result.score;

                if self.options.include_matches {
                    let ranges = result.indices.unwrap_or_default();
                    if term.kind().reports_ranges() {
                        indices.extend(ranges);
                    } else {
                        indices.extend(ranges.into_iter().take(1));
                    }
                }
            }

            if all_matched {
                return MatchResult {
                    is_match: true,
                    score: total_score / group.len() as f64,
                    indices: self.options.include_matches.then_some(indices),
                };
            }
        }

        MatchResult::miss()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(query: &str) -> Vec<Vec<(TermKind, String)>> {
        parse_query(query, MatchOptions::default())
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|t| (t.kind(), t.pattern().to_string()))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_term_classification() {
        let parsed = kinds("=scheme 'python ^java !^earlang !.js$ .go$ !ruby jscript");
        assert_eq!(
            parsed,
            vec![vec![
                (TermKind::Exact, "scheme".to_string()),
                (TermKind::Include, "python".to_string()),
                (TermKind::PrefixExact, "java".to_string()),
                (TermKind::InversePrefixExact, "earlang".to_string()),
                (TermKind::InverseSuffixExact, ".js".to_string()),
                (TermKind::SuffixExact, ".go".to_string()),
                (TermKind::InverseExact, "ruby".to_string()),
                (TermKind::Fuzzy, "jscript".to_string()),
            ]]
        );
    }

    #[test]
    fn test_quoted_terms_and_groups() {
        let parsed = kinds(r#"="old man" | ^"the lock"$ 'x | "two words""#);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0], vec![(TermKind::Exact, "old man".to_string())]);
        // Quotes must close the token, so this is a bare prefix term
        assert_eq!(
            parsed[1],
            vec![
                (TermKind::PrefixExact, "\"the lock\"$".to_string()),
                (TermKind::Include, "x".to_string()),
            ]
        );
        assert_eq!(parsed[2], vec![(TermKind::Fuzzy, "two words".to_string())]);
    }

    #[test]
    fn test_lone_markers_are_fuzzy() {
        let options = MatchOptions::default();
        for marker in ["$", "!", "^", "="] {
            let term = parse_term(marker, options);
            assert_eq!(term.kind(), TermKind::Fuzzy);
            assert_eq!(term.pattern(), marker);
            assert!(!term.search("tom").is_match);
        }

        let quoted = parse_term(r#"="""#, options);
        assert_eq!(quoted.kind(), TermKind::Exact);
        assert_eq!(quoted.pattern(), r#""""#);

        let searcher = ExtendedSearcher::new("tom !", options);
        assert!(!searcher.search_in("tom").is_match);
        assert!(searcher.search_in("tom!").is_match);
    }

    #[test]
    fn test_exact_terms() {
        let options = MatchOptions::default();
        let exact = parse_term("=tom", options);
        assert!(exact.search("tom").is_match);
        assert!(!exact.search("tim").is_match);

        let not = parse_term("!tom", options);
        assert!(not.search("tim").is_match);
        assert!(!not.search("tom").is_match);

        let suffix = parse_term("man$", options);
        let result = suffix.search("old man");
        assert!(result.is_match);
        assert_eq!(result.indices, Some(vec![(4, 6)]));

        assert!(!parse_term("!^old", options).search("old man").is_match);
        assert!(parse_term("!man$", options).search("man old").is_match);
    }

    #[test]
    fn test_include_term() {
        let term = parse_term("'an", MatchOptions::default());
        let result = term.search("banana man");
        assert!(result.is_match);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.indices, Some(vec![(1, 2), (3, 4), (8, 9)]));

        let miss = term.search("xyz");
        assert!(!miss.is_match);
        assert_eq!(miss.score, 0.0);
    }

    #[test]
    fn test_groups_and_or() {
        let options = MatchOptions {
            include_matches: true,
            ..Default::default()
        };
        let searcher = ExtendedSearcher::new("^old 'war | =dune", options);

        let result = searcher.search_in("Old Man's War");
        assert!(result.is_match);
        assert_eq!(result.score, 0.5);
        assert_eq!(result.indices, Some(vec![(0, 2), (10, 12)]));

        assert!(searcher.search_in("DUNE").is_match);
        assert!(!searcher.search_in("old man").is_match);
        assert!(!ExtendedSearcher::new("", options).search_in("old").is_match);
    }
}
