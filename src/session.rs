//! Per-participant session state.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::ChainError;
use crate::quorum::QuorumWaiter;
use crate::store::SessionIds;

/// Who put a word into the reply log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOrigin {
    /// Arrived as a transmission from another participant.
    Received,
    /// Typed and submitted by this participant.
    Sent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyEntry {
    pub word: String,
    pub origin: ReplyOrigin,
}

/// The seen-words set together with the reply log it guards.
///
/// Append-only: a word (compared lowercase) enters at most once, whichever
/// path sees it first.
#[derive(Debug, Default)]
pub struct Transcript {
    seen: HashSet<String>,
    log: Vec<ReplyEntry>,
}

impl Transcript {
    pub fn contains(&self, word: &str) -> bool {
        self.seen.contains(&word.to_lowercase())
    }

    /// Add `word` unless already seen. Returns the lowercased word when it was new.
    pub fn record(&mut self, word: &str, origin: ReplyOrigin) -> Option<String> {
        let word = word.to_lowercase();
        if !self.seen.insert(word.clone()) {
            return None;
        }
        self.log.push(ReplyEntry {
            word: word.clone(),
            origin,
        });
        Some(word)
    }

    pub fn entries(&self) -> &[ReplyEntry] {
        &self.log
    }

    /// Logged words in display order.
    pub fn words(&self) -> Vec<String> {
        self.log.iter().map(|e| e.word.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }
}

/// A [`Transcript`] shared by the transmission poller and the response
/// submitter. Every check-then-add happens under one lock acquisition.
#[derive(Debug, Clone, Default)]
pub struct SharedTranscript(Arc<Mutex<Transcript>>);

impl SharedTranscript {
    pub fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, word: &str, origin: ReplyOrigin) -> Option<String> {
        self.lock().record(word, origin)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.lock().contains(word)
    }

    pub fn words(&self) -> Vec<String> {
        self.lock().words()
    }
}

/// Everything the session knows about itself.
#[derive(Debug, Default)]
pub struct SessionContext {
    pub ids: Option<SessionIds>,
    pub participant_id: Option<u64>,
    pub node_id: Option<u64>,
    pub quorum: QuorumWaiter,
    pub transcript: SharedTranscript,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_participant(&self) -> Result<u64, ChainError> {
        self.participant_id
            .ok_or(ChainError::MissingIdentity("participant id"))
    }

    pub fn require_node(&self) -> Result<u64, ChainError> {
        self.node_id.ok_or(ChainError::MissingIdentity("node id"))
    }

    pub fn require_ids(&self) -> Result<&SessionIds, ChainError> {
        self.ids
            .as_ref()
            .ok_or(ChainError::MissingIdentity("session identifiers"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_case_insensitive() {
        let mut t = Transcript::default();
        assert_eq!(t.record("Cat", ReplyOrigin::Received), Some("cat".to_string()));
        assert_eq!(t.record("CAT", ReplyOrigin::Sent), None);
        assert_eq!(t.record("cat", ReplyOrigin::Received), None);
        assert_eq!(t.words(), vec!["cat"]);
        assert!(t.contains("cAt"));
    }

    #[test]
    fn log_keeps_arrival_order_and_origin() {
        let mut t = Transcript::default();
        t.record("dog", ReplyOrigin::Received);
        t.record("emu", ReplyOrigin::Sent);
        assert_eq!(
            t.entries(),
            &[
                ReplyEntry {
                    word: "dog".to_string(),
                    origin: ReplyOrigin::Received
                },
                ReplyEntry {
                    word: "emu".to_string(),
                    origin: ReplyOrigin::Sent
                },
            ]
        );
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn shared_transcript_dedups_across_threads() {
        let shared = SharedTranscript::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = shared.clone();
                std::thread::spawn(move || s.record("Owl", ReplyOrigin::Received).is_some())
            })
            .collect();
        let inserted = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|new| *new)
            .count();
        assert_eq!(inserted, 1);
        assert_eq!(shared.words(), vec!["owl"]);
    }

    #[test]
    fn missing_ids_are_reported() {
        let ctx = SessionContext::new();
        assert!(matches!(
            ctx.require_node(),
            Err(ChainError::MissingIdentity("node id"))
        ));
        assert!(ctx.require_participant().is_err());
        assert!(ctx.require_ids().is_err());
    }
}
