//! Outgoing reproduction words.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error};

use crate::api::ExperimentApi;
use crate::error::ChainError;
use crate::screen::{Screen, ScreenEvent};
use crate::session::{ReplyOrigin, SharedTranscript};

/// The "Send" button. Disabled while a response is in flight.
#[derive(Debug, Clone)]
pub struct SendControl {
    enabled: Arc<AtomicBool>,
    screen: Screen,
}

impl SendControl {
    /// A control that starts disabled, as on page load.
    pub fn new(screen: Screen) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
            screen,
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        self.screen.show(ScreenEvent::SendEnabled(true));
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.screen.show(ScreenEvent::SendEnabled(false));
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Result of checking one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Nothing typed; nothing happens.
    Empty,
    /// More than one word.
    MultiWord,
    /// Already in the reply log.
    Duplicate(String),
    /// Logged; the lowercased word is returned and the raw text should be sent.
    Accepted(String),
}

/// Validates participant input and posts accepted words to the node.
pub struct ResponseSubmitter<A> {
    api: Arc<A>,
    node_id: u64,
    transcript: SharedTranscript,
    send: SendControl,
    screen: Screen,
}

impl<A> Clone for ResponseSubmitter<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            node_id: self.node_id,
            transcript: self.transcript.clone(),
            send: self.send.clone(),
            screen: self.screen.clone(),
        }
    }
}

impl<A: ExperimentApi> ResponseSubmitter<A> {
    pub fn new(
        api: Arc<A>,
        node_id: u64,
        transcript: SharedTranscript,
        send: SendControl,
        screen: Screen,
    ) -> Self {
        Self {
            api,
            node_id,
            transcript,
            send,
            screen,
        }
    }

    pub fn send_control(&self) -> &SendControl {
        &self.send
    }

    /// Check `input` and, when it passes, log it as sent and clear the field.
    ///
    /// Rejections other than [`Validation::Empty`] re-enable the send control.
    /// Nothing here touches the server.
    pub fn validate(&self, input: &str) -> Validation {
        if input.trim().is_empty() {
            return Validation::Empty;
        }
        if input.contains(' ') {
            debug!(%input, "rejecting multi-word response");
            self.send.enable();
            return Validation::MultiWord;
        }
        let Some(word) = self.transcript.record(input, ReplyOrigin::Sent) else {
            debug!(%input, "rejecting duplicate response");
            self.send.enable();
            return Validation::Duplicate(input.to_lowercase());
        };
        self.screen.show(ScreenEvent::Reply {
            word: word.clone(),
            origin: ReplyOrigin::Sent,
        });
        self.screen.show(ScreenEvent::InputCleared);
        Validation::Accepted(word)
    }

    /// Post `contents` to the node. The send control is re-enabled only once
    /// the server acknowledges.
    pub async fn deliver(&self, contents: &str) -> Result<(), ChainError> {
        self.api.create_info(self.node_id, contents).await?;
        self.send.enable();
        Ok(())
    }

    /// [`validate`](Self::validate) then [`deliver`](Self::deliver).
    pub async fn submit(&self, input: &str) -> Result<Validation, ChainError> {
        let outcome = self.validate(input);
        if matches!(outcome, Validation::Accepted(_)) {
            if let Err(e) = self.deliver(input).await {
                error!(error = %e, "response delivery failed; send stays disabled");
                return Err(e);
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryExperiment;
    use crate::store::SessionIds;

    async fn submitter() -> (Arc<MemoryExperiment>, ResponseSubmitter<MemoryExperiment>) {
        let exp = Arc::new(MemoryExperiment::new(1));
        let p = exp
            .create_participant(&SessionIds::generate_debug())
            .await
            .unwrap();
        let node = exp.create_node(p.id).await.unwrap();
        let screen = Screen::detached();
        let s = ResponseSubmitter::new(
            Arc::clone(&exp),
            node.id,
            SharedTranscript::default(),
            SendControl::new(screen.clone()),
            screen,
        );
        (exp, s)
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let (exp, s) = submitter().await;
        assert_eq!(s.submit("").await.unwrap(), Validation::Empty);
        assert_eq!(s.submit("   ").await.unwrap(), Validation::Empty);
        assert!(!s.send_control().is_enabled());
        assert!(s.transcript.lock().is_empty());
        assert!(exp.sent().is_empty());
    }

    #[tokio::test]
    async fn multi_word_is_rejected_without_mutation() {
        let (exp, s) = submitter().await;
        s.send_control().disable();
        assert_eq!(s.submit("a b").await.unwrap(), Validation::MultiWord);
        assert!(s.send_control().is_enabled());
        assert!(s.transcript.lock().is_empty());
        assert!(exp.sent().is_empty());
    }

    #[tokio::test]
    async fn second_identical_word_is_rejected() {
        let (exp, s) = submitter().await;
        assert_eq!(
            s.submit("cat").await.unwrap(),
            Validation::Accepted("cat".to_string())
        );
        s.send_control().disable();
        assert_eq!(
            s.submit("Cat").await.unwrap(),
            Validation::Duplicate("cat".to_string())
        );
        assert!(s.send_control().is_enabled());
        assert_eq!(exp.sent(), vec!["cat"]);
        assert_eq!(s.transcript.words(), vec!["cat"]);
    }

    #[tokio::test]
    async fn accepted_word_sends_raw_text_and_reenables() {
        let (exp, s) = submitter().await;
        s.send_control().disable();
        assert_eq!(
            s.submit("Zebra").await.unwrap(),
            Validation::Accepted("zebra".to_string())
        );
        assert_eq!(exp.sent(), vec!["Zebra"]);
        assert!(s.send_control().is_enabled());
    }

    #[tokio::test]
    async fn failed_delivery_leaves_send_disabled() {
        let exp = Arc::new(MemoryExperiment::new(1));
        let screen = Screen::detached();
        // Node 42 does not exist on the memory server.
        let s = ResponseSubmitter::new(
            exp,
            42,
            SharedTranscript::default(),
            SendControl::new(screen.clone()),
            screen,
        );
        s.send_control().disable();
        assert!(s.submit("owl").await.is_err());
        assert!(!s.send_control().is_enabled());
        assert!(s.transcript.contains("owl"));
    }
}
