//! In-process experiment server.
//!
//! [`MemoryExperiment`] answers the same calls as the HTTP server from a
//! scripted state: a fixed quorum, a readiness script, the stimulus word list
//! and a queue of incoming words. It backs `--dry-run` and the test suites.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::{Info, Node, Participant, QuestionResponse, Summary, Transmission, WORKING};
use super::ExperimentApi;
use crate::error::ChainError;
use crate::store::SessionIds;

#[derive(Debug)]
struct State {
    quorum: u32,
    /// Ready counts handed out by successive `/summary` calls; the last one repeats.
    readiness: VecDeque<u32>,
    info_count: u64,
    word_list: Vec<String>,
    next_id: u64,
    participant: Option<u64>,
    node: Option<u64>,
    node_error: Option<ChainError>,
    /// Stored infos as (id, contents).
    infos: Vec<(u64, String)>,
    pending: Vec<Transmission>,
    /// Transmissions stay pending after being fetched.
    sticky_pending: bool,
    failing_polls: u32,
    sent: Vec<String>,
    questions: Vec<QuestionResponse>,
    completed: Option<String>,
    calls: Vec<String>,
}

/// Scripted experiment state shared behind a mutex.
#[derive(Debug)]
pub struct MemoryExperiment {
    state: Mutex<State>,
}

impl Default for MemoryExperiment {
    fn default() -> Self {
        Self::new(1)
    }
}

impl MemoryExperiment {
    /// An experiment whose quorum is `quorum` and whose readiness is always met.
    pub fn new(quorum: u32) -> Self {
        Self {
            state: Mutex::new(State {
                quorum,
                readiness: VecDeque::from([quorum]),
                info_count: 0,
                word_list: Vec::new(),
                next_id: 1,
                participant: None,
                node: None,
                node_error: None,
                infos: Vec::new(),
                pending: Vec::new(),
                sticky_pending: false,
                failing_polls: 0,
                sent: Vec::new(),
                questions: Vec::new(),
                completed: None,
                calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ready counts returned by successive summary polls.
    pub fn with_readiness(self, counts: impl IntoIterator<Item = u32>) -> Self {
        {
            let mut state = self.lock();
            state.readiness = counts.into_iter().collect();
        }
        self
    }

    /// The stimulus list the participant's node receives.
    pub fn with_word_list<S: Into<String>>(self, words: impl IntoIterator<Item = S>) -> Self {
        {
            let mut state = self.lock();
            state.word_list = words.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Infos already present before the participant arrives.
    pub fn with_existing_infos(self, count: u64) -> Self {
        self.lock().info_count = count;
        self
    }

    /// Make node creation fail, optionally with a replacement page.
    pub fn failing_node_creation(self, status: u16, page: Option<&str>) -> Self {
        self.lock().node_error = Some(ChainError::Http {
            status,
            url: "memory:/node".to_string(),
            page: page.map(str::to_string),
        });
        self
    }

    /// Keep transmissions pending after they are fetched, as a lagging
    /// server would.
    pub fn with_sticky_pending(self) -> Self {
        self.lock().sticky_pending = true;
        self
    }

    /// Fail the next `n` transmission polls.
    pub fn fail_next_polls(&self, n: u32) {
        self.lock().failing_polls = n;
    }

    /// Queue `word` as an incoming transmission to the participant's node.
    pub fn deliver(&self, word: &str) -> u64 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.infos.push((id, word.to_string()));
        state.pending.push(Transmission {
            id: Some(id),
            info_id: id,
            status: Some("pending".to_string()),
        });
        id
    }

    /// Words the participant posted, in order.
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    pub fn questions(&self) -> Vec<QuestionResponse> {
        self.lock().questions.clone()
    }

    /// The unique id passed to `worker_complete`, if it was called.
    pub fn completed(&self) -> Option<String> {
        self.lock().completed.clone()
    }

    /// Every endpoint called so far, by name.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == name).count()
    }

    fn record(state: &mut State, name: &str) {
        state.calls.push(name.to_string());
    }

    fn alloc(state: &mut State) -> u64 {
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    fn check_node(state: &State, node_id: u64) -> Result<(), ChainError> {
        if state.node == Some(node_id) {
            Ok(())
        } else {
            Err(ChainError::Http {
                status: 404,
                url: format!("memory:/node/{node_id}"),
                page: None,
            })
        }
    }
}

impl ExperimentApi for MemoryExperiment {
    async fn create_participant(&self, _ids: &SessionIds) -> Result<Participant, ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "create_participant");
        let id = Self::alloc(&mut state);
        state.participant = Some(id);
        Ok(Participant { id })
    }

    async fn create_node(&self, participant_id: u64) -> Result<Node, ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "create_node");
        if let Some(err) = state.node_error.take() {
            return Err(err);
        }
        if state.participant != Some(participant_id) {
            return Err(ChainError::Http {
                status: 403,
                url: format!("memory:/node/{participant_id}"),
                page: None,
            });
        }
        let id = Self::alloc(&mut state);
        state.node = Some(id);
        Ok(Node { id })
    }

    async fn received_infos(&self, node_id: u64) -> Result<Vec<Info>, ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "received_infos");
        Self::check_node(&state, node_id)?;
        let contents =
            serde_json::to_string(&state.word_list).map_err(|e| ChainError::json("infos", e))?;
        Ok(vec![Info { id: None, contents }])
    }

    async fn pending_transmissions(&self, node_id: u64) -> Result<Vec<Transmission>, ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "pending_transmissions");
        if state.failing_polls > 0 {
            state.failing_polls -= 1;
            return Err(ChainError::Connect {
                url: format!("memory:/node/{node_id}/transmissions"),
                detail: "scripted failure".to_string(),
            });
        }
        Self::check_node(&state, node_id)?;
        let mut pending = if state.sticky_pending {
            state.pending.clone()
        } else {
            std::mem::take(&mut state.pending)
        };
        // Newest first, like the server's listing.
        pending.reverse();
        Ok(pending)
    }

    async fn info(&self, node_id: u64, info_id: u64) -> Result<Info, ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "info");
        Self::check_node(&state, node_id)?;
        state
            .infos
            .iter()
            .find(|(id, _)| *id == info_id)
            .map(|(id, contents)| Info {
                id: Some(*id),
                contents: contents.clone(),
            })
            .ok_or_else(|| ChainError::Http {
                status: 404,
                url: format!("memory:/info/{node_id}/{info_id}"),
                page: None,
            })
    }

    async fn create_info(&self, node_id: u64, contents: &str) -> Result<(), ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "create_info");
        Self::check_node(&state, node_id)?;
        state.sent.push(contents.to_string());
        state.info_count += 1;
        Ok(())
    }

    async fn info_count(&self) -> Result<u64, ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "info_count");
        Ok(state.info_count)
    }

    async fn summary(&self) -> Result<Summary, ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "summary");
        let ready = if state.readiness.len() > 1 {
            state.readiness.pop_front().unwrap_or_default()
        } else {
            state.readiness.front().copied().unwrap_or_default()
        };
        Ok(Summary(vec![(WORKING.to_string(), ready)]))
    }

    async fn quorum(&self) -> Result<u32, ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "quorum");
        Ok(state.quorum)
    }

    async fn submit_question(
        &self,
        participant_id: u64,
        response: &QuestionResponse,
    ) -> Result<(), ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "submit_question");
        if state.participant != Some(participant_id) {
            return Err(ChainError::MissingIdentity("participant id"));
        }
        state.questions.push(response.clone());
        Ok(())
    }

    async fn worker_complete(&self, ids: &SessionIds) -> Result<(), ChainError> {
        let mut state = self.lock();
        Self::record(&mut state, "worker_complete");
        state.completed = Some(ids.unique_id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readiness_script_pops_until_last() {
        let exp = MemoryExperiment::new(2).with_readiness([0, 1, 2]);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(exp.summary().await.unwrap().ready().unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 2, 2]);
    }

    #[tokio::test]
    async fn node_requires_participant() {
        let exp = MemoryExperiment::new(1);
        assert!(exp.create_node(99).await.is_err());
        let p = exp
            .create_participant(&SessionIds::generate_debug())
            .await
            .unwrap();
        assert!(exp.create_node(p.id).await.is_ok());
    }

    #[tokio::test]
    async fn delivered_words_are_fetched_once() {
        let exp = MemoryExperiment::new(1);
        let p = exp
            .create_participant(&SessionIds::generate_debug())
            .await
            .unwrap();
        let node = exp.create_node(p.id).await.unwrap();
        let info_id = exp.deliver("Apple");

        let first = exp.pending_transmissions(node.id).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].info_id, info_id);
        assert!(exp.pending_transmissions(node.id).await.unwrap().is_empty());
        assert_eq!(exp.info(node.id, info_id).await.unwrap().contents, "Apple");
    }

    #[tokio::test]
    async fn sticky_pending_redelivers() {
        let exp = MemoryExperiment::new(1).with_sticky_pending();
        let p = exp
            .create_participant(&SessionIds::generate_debug())
            .await
            .unwrap();
        let node = exp.create_node(p.id).await.unwrap();
        exp.deliver("pear");
        assert_eq!(exp.pending_transmissions(node.id).await.unwrap().len(), 1);
        assert_eq!(exp.pending_transmissions(node.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scripted_node_failure_fires_once() {
        let exp = MemoryExperiment::new(1).failing_node_creation(403, Some("<p>full</p>"));
        let p = exp
            .create_participant(&SessionIds::generate_debug())
            .await
            .unwrap();
        let err = exp.create_node(p.id).await.unwrap_err();
        assert_eq!(err.page(), Some("<p>full</p>"));
        assert!(exp.create_node(p.id).await.is_ok());
    }
}
