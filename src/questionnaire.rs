//! Final questionnaire and assignment completion.

use std::collections::BTreeMap;

use tracing::info;

use crate::api::{ExperimentApi, QuestionResponse};
use crate::error::ChainError;
use crate::store::SessionIds;

/// Answers collected on the questionnaire page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Questionnaire {
    pub answers: BTreeMap<String, String>,
}

impl Questionnaire {
    pub fn new(answers: BTreeMap<String, String>) -> Self {
        Self { answers }
    }

    /// The answers as the single form submission the server records.
    pub fn to_response(&self) -> Result<QuestionResponse, ChainError> {
        Ok(QuestionResponse {
            question: "questionnaire".to_string(),
            number: 1,
            response: serde_json::to_string(&self.answers)
                .map_err(|e| ChainError::json("response", e))?,
        })
    }

    /// Flush the responses (when a participant exists), then mark the
    /// assignment complete. A failed flush stops before completion.
    pub async fn submit<A: ExperimentApi>(
        &self,
        api: &A,
        participant_id: Option<u64>,
        ids: &SessionIds,
    ) -> Result<(), ChainError> {
        if let Some(pid) = participant_id {
            api.submit_question(pid, &self.to_response()?).await?;
            info!(participant = pid, "questionnaire responses recorded");
        }
        api.worker_complete(ids).await?;
        info!(unique_id = %ids.unique_id(), "assignment complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryExperiment;

    fn answers() -> Questionnaire {
        Questionnaire::new(BTreeMap::from([
            ("difficulty".to_string(), "3".to_string()),
            ("engagement".to_string(), "5".to_string()),
        ]))
    }

    #[test]
    fn response_is_json_object() {
        let r = answers().to_response().unwrap();
        assert_eq!(r.number, 1);
        let v: serde_json::Value = serde_json::from_str(&r.response).unwrap();
        assert_eq!(v["engagement"], "5");
    }

    #[tokio::test]
    async fn responses_precede_completion() {
        let exp = MemoryExperiment::new(1);
        let ids = SessionIds::generate_debug();
        let p = exp.create_participant(&ids).await.unwrap();

        answers().submit(&exp, Some(p.id), &ids).await.unwrap();

        let calls = exp.calls();
        let q = calls.iter().position(|c| c == "submit_question").unwrap();
        let w = calls.iter().position(|c| c == "worker_complete").unwrap();
        assert!(q < w);
        assert_eq!(exp.questions().len(), 1);
        assert_eq!(exp.completed(), Some(ids.unique_id()));
    }

    #[tokio::test]
    async fn without_participant_only_completes() {
        let exp = MemoryExperiment::new(1);
        let ids = SessionIds::generate_debug();
        answers().submit(&exp, None, &ids).await.unwrap();
        assert_eq!(exp.call_count("submit_question"), 0);
        assert_eq!(exp.call_count("worker_complete"), 1);
    }

    #[tokio::test]
    async fn failed_flush_skips_completion() {
        let exp = MemoryExperiment::new(1);
        let ids = SessionIds::generate_debug();
        // No participant was created, so the memory server refuses the answers.
        assert!(answers().submit(&exp, Some(77), &ids).await.is_err());
        assert!(exp.completed().is_none());
    }
}
