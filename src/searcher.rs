use crate::bitap::{BitapSearcher, MatchOptions, MatchResult};
use crate::extended::ExtendedSearcher;

/// A compiled pattern, ready to be run against indexed strings.
#[derive(Debug, Clone)]
pub enum Searcher {
    /// Whole pattern matched approximately
    Fuzzy(BitapSearcher),
    /// Marker syntax with OR-groups
    Extended(ExtendedSearcher),
}

impl Searcher {
    /// Pick the searcher the options ask for
    pub fn new(pattern: &str, options: MatchOptions, use_extended_search: bool) -> Self {
        if use_extended_search {
            Searcher::Extended(ExtendedSearcher::new(pattern, options))
        } else {
            Searcher::Fuzzy(BitapSearcher::new(pattern, options))
        }
    }

    pub fn search_in(&self, text: &str) -> MatchResult {
        match self {
            Searcher::Fuzzy(searcher) => searcher.search_in(text),
            Searcher::Extended(searcher) => searcher.search_in(text),
        }
    }
}
