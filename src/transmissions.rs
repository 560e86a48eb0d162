//! Incoming words from the rest of the chain.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::api::ExperimentApi;
use crate::error::ChainError;
use crate::screen::{Screen, ScreenEvent};
use crate::session::{ReplyOrigin, SharedTranscript};

/// Polls the node's pending transmissions and appends unseen words to the
/// reply log.
///
/// No cursor is kept: the server moves transmissions out of `pending` once
/// they are fetched, and the transcript drops anything already seen.
pub struct TransmissionPoller<A> {
    api: Arc<A>,
    node_id: u64,
    transcript: SharedTranscript,
    screen: Screen,
    interval: Duration,
}

impl<A: ExperimentApi> TransmissionPoller<A> {
    pub fn new(
        api: Arc<A>,
        node_id: u64,
        transcript: SharedTranscript,
        screen: Screen,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            node_id,
            transcript,
            screen,
            interval,
        }
    }

    /// One poll. Returns the words that were new to the reply log.
    ///
    /// Info bodies are fetched concurrently, then recorded oldest first
    /// (the server lists newest first). A failed info fetch skips that word.
    pub async fn poll_once(&self) -> Result<Vec<String>, ChainError> {
        let transmissions = self.api.pending_transmissions(self.node_id).await?;
        if transmissions.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = transmissions.len(), "pending transmissions");

        let fetches = transmissions
            .iter()
            .rev()
            .map(|t| self.api.info(self.node_id, t.info_id));
        let infos = join_all(fetches).await;

        let mut fresh = Vec::new();
        for info in infos {
            let info = match info {
                Ok(info) => info,
                Err(e) => {
                    warn!(error = %e, "info fetch failed, skipping");
                    continue;
                }
            };
            if let Some(word) = self.transcript.record(&info.contents, ReplyOrigin::Received) {
                self.screen.show(ScreenEvent::Reply {
                    word: word.clone(),
                    origin: ReplyOrigin::Received,
                });
                fresh.push(word);
            }
        }
        Ok(fresh)
    }

    /// Poll forever, waiting `interval` after each poll whatever its outcome.
    /// Stops only when the owning task is aborted.
    pub async fn run(self) {
        loop {
            if let Err(e) = self.poll_once().await {
                warn!(error = %e, node = self.node_id, "transmission poll failed, will retry");
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryExperiment;
    use crate::store::SessionIds;

    async fn setup(exp: MemoryExperiment) -> (Arc<MemoryExperiment>, u64) {
        let exp = Arc::new(exp);
        let p = exp
            .create_participant(&SessionIds::generate_debug())
            .await
            .unwrap();
        let node = exp.create_node(p.id).await.unwrap();
        (exp, node.id)
    }

    #[tokio::test]
    async fn words_are_lowercased_and_in_chronological_order() {
        let (exp, node) = setup(MemoryExperiment::new(1)).await;
        exp.deliver("Apple");
        exp.deliver("BANANA");
        let transcript = SharedTranscript::default();
        let poller = TransmissionPoller::new(
            Arc::clone(&exp),
            node,
            transcript.clone(),
            Screen::detached(),
            Duration::from_secs(1),
        );
        let fresh = poller.poll_once().await.unwrap();
        assert_eq!(fresh, vec!["apple", "banana"]);
        assert_eq!(transcript.words(), vec!["apple", "banana"]);
    }

    #[tokio::test]
    async fn redelivered_transmission_shows_once() {
        let (exp, node) = setup(MemoryExperiment::new(1).with_sticky_pending()).await;
        exp.deliver("kiwi");
        let (screen, mut rx) = Screen::channel();
        let transcript = SharedTranscript::default();
        let poller = TransmissionPoller::new(
            Arc::clone(&exp),
            node,
            transcript.clone(),
            screen,
            Duration::from_secs(1),
        );
        assert_eq!(poller.poll_once().await.unwrap(), vec!["kiwi"]);
        assert!(poller.poll_once().await.unwrap().is_empty());
        assert_eq!(transcript.words(), vec!["kiwi"]);

        let mut replies = 0;
        while let Ok(ScreenEvent::Reply { .. }) = rx.try_recv() {
            replies += 1;
        }
        assert_eq!(replies, 1);
    }

    #[tokio::test]
    async fn already_sent_word_is_not_shown_again() {
        let (exp, node) = setup(MemoryExperiment::new(1)).await;
        let transcript = SharedTranscript::default();
        transcript.record("pear", ReplyOrigin::Sent);
        exp.deliver("Pear");
        let poller = TransmissionPoller::new(
            exp,
            node,
            transcript.clone(),
            Screen::detached(),
            Duration::from_secs(1),
        );
        assert!(poller.poll_once().await.unwrap().is_empty());
        assert_eq!(transcript.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_polling_after_failures() {
        let (exp, node) = setup(MemoryExperiment::new(1)).await;
        exp.fail_next_polls(2);
        exp.deliver("plum");
        let transcript = SharedTranscript::default();
        let poller = TransmissionPoller::new(
            Arc::clone(&exp),
            node,
            transcript.clone(),
            Screen::detached(),
            Duration::from_secs(1),
        );
        let handle = tokio::spawn(poller.run());
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.abort();

        assert_eq!(exp.call_count("pending_transmissions"), 3);
        assert_eq!(transcript.words(), vec!["plum"]);
    }
}
