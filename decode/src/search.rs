//! Byte-sequence search over decoded output.
//!
//! Shared between the protocol analyzers: anything that can say "does my
//! value match this byte" and "do I carry errors" can be searched. The
//! filter is applied first, then a direct subsequence scan runs over the
//! filtered view; results reference the original list by typed index and
//! never copy the decoded bytes.

use derive_more::{From, Into};
use typed_index_collections::TiVec;

/// Index into a decoded-byte list.
#[derive(From, Into, Debug, Default, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteIndex(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SearchFilter {
    All,
    OnlyErrors,
    NoErrors,
}

/// What the search engine needs to know about a decoded byte.
pub trait SearchRecord {
    /// Does this record carry `expected`? SPI words match on either
    /// direction; UART bytes on their single value.
    fn value_matches(&self, expected: u8) -> bool;

    fn has_errors(&self) -> bool;

    fn timestamp(&self) -> f64;
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MatchResult {
    /// Index of the match's first byte in the original decoded list.
    pub index: ByteIndex,
    pub timestamp: f64,
}

/// Holds the results of the most recent search only; every [`search`]
/// call discards the previous ones.
///
/// [`search`]: SearchIndex::search
#[derive(Debug, Default)]
pub struct SearchIndex {
    matches: Vec<MatchResult>,
}

impl SearchIndex {
    pub fn search<R: SearchRecord>(
        &mut self,
        records: &TiVec<ByteIndex, R>,
        pattern: &[u8],
        filter: SearchFilter,
    ) -> usize {
        self.matches.clear();
        if pattern.is_empty() {
            return 0;
        }

        let filtered: Vec<ByteIndex> = records
            .iter_enumerated()
            .filter(|(_, r)| match filter {
                SearchFilter::All => true,
                SearchFilter::OnlyErrors => r.has_errors(),
                SearchFilter::NoErrors => !r.has_errors(),
            })
            .map(|(i, _)| i)
            .collect();

        if filtered.len() < pattern.len() {
            return 0;
        }
        for start in 0..=filtered.len() - pattern.len() {
            let hit = pattern
                .iter()
                .enumerate()
                .all(|(k, &expected)| records[filtered[start + k]].value_matches(expected));
            if hit {
                let index = filtered[start];
                self.matches.push(MatchResult {
                    index,
                    timestamp: records[index].timestamp(),
                });
            }
        }
        self.matches.len()
    }

    pub fn has_matches(&self) -> bool {
        !self.matches.is_empty()
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn matches(&self) -> &[MatchResult] {
        &self.matches
    }
}
