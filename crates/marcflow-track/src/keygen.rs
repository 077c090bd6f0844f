//! Sequence-analysis key generation.
//!
//! A key generator maps the record tokens of a chunk (identifiers extracted
//! from its bibliographic records) to the set of match keys used for
//! dependency probing. Deduplication matters: repeated tokens within a
//! chunk would otherwise inflate the dependency sets for no ordering gain.

use std::collections::BTreeSet;

use marcflow_core::SinkId;

/// Maps a chunk's record tokens to its sequence-analysis match keys.
///
/// Implementations must be pure and deterministic: same tokens, same keys,
/// no side effects. An absent token list is passed as the empty slice and
/// yields the empty set.
pub trait KeyGenerator: Send + Sync {
    /// Computes the match keys for an ordered token sequence.
    fn keys(&self, tokens: &[String]) -> BTreeSet<String>;
}

/// The standard key generator: deduplicates the token list.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyGenerator;

impl KeyGenerator for DefaultKeyGenerator {
    fn keys(&self, tokens: &[String]) -> BTreeSet<String> {
        tokens.iter().cloned().collect()
    }
}

/// Key generator that disables sequence analysis entirely.
///
/// Used for sinks where record ordering is irrelevant; every chunk becomes
/// immediately eligible for dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopKeyGenerator;

impl KeyGenerator for NoopKeyGenerator {
    fn keys(&self, _tokens: &[String]) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Key generator folding the sink identifier into every key.
///
/// Match keys are compared by hash across one sink/submitter scope already;
/// this variant additionally namespaces the key text itself, for sinks that
/// share token vocabularies with other sinks through external tooling.
#[derive(Debug, Clone, Copy)]
pub struct SinkScopedKeyGenerator {
    sink_id: SinkId,
}

impl SinkScopedKeyGenerator {
    /// Creates a generator scoped to the given sink.
    #[must_use]
    pub const fn new(sink_id: SinkId) -> Self {
        Self { sink_id }
    }
}

impl KeyGenerator for SinkScopedKeyGenerator {
    fn keys(&self, tokens: &[String]) -> BTreeSet<String> {
        tokens
            .iter()
            .map(|token| format!("{}/{token}", self.sink_id))
            .collect()
    }
}
