// Content-addressed cache of the last ingested upload set.
//
// The key hashes every source's name, size and content digest in order, so
// any change to the input set produces a new key and forces a reload.
use crate::error::{AnalyzerError, Result};
use crate::loader::{load_reports, SourceFile};
use crate::types::LoadOutcome;
use sha2::{Digest, Sha256};
use tracing::debug;

pub fn cache_key(sources: &[SourceFile]) -> String {
    let mut hasher = Sha256::new();
    for s in sources {
        hasher.update(s.name.as_bytes());
        hasher.update([0u8]);
        hasher.update((s.bytes.len() as u64).to_le_bytes());
        hasher.update(Sha256::digest(&s.bytes));
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Default)]
pub struct LoadCache {
    entry: Option<(String, LoadOutcome)>,
    hits: usize,
    misses: usize,
}

impl LoadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached outcome for this exact upload set, loading it on a miss.
    /// Failed loads are not cached.
    pub fn get_or_load(&mut self, sources: &[SourceFile]) -> Result<&LoadOutcome> {
        let key = cache_key(sources);
        let hit = matches!(&self.entry, Some((k, _)) if *k == key);
        if hit {
            self.hits += 1;
            debug!(key = %key, "load cache hit");
        } else {
            self.misses += 1;
            debug!(key = %key, "load cache miss");
            let outcome = load_reports(sources)?;
            self.entry = Some((key, outcome));
        }
        self.entry
            .as_ref()
            .map(|(_, outcome)| outcome)
            .ok_or(AnalyzerError::NoData)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
