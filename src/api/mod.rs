//! # Experiment API
//!
//! Everything the participant client asks of the experiment server goes
//! through [`ExperimentApi`]. Two implementations ship with the crate:
//!
//! - [`ExperimentClient`]: the real HTTP client (reqwest).
//! - [`MemoryExperiment`]: an in-process experiment with scripted quorum,
//!   readiness and transmissions, used for dry runs and tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = ExperimentClient::builder("http://localhost:5000")
//!     .request_timeout(Duration::from_secs(10))
//!     .build();
//! let quorum = client.quorum().await?;
//! ```

pub mod client;
pub mod memory;
pub mod types;

use std::future::Future;

pub use client::{ExperimentClient, ExperimentClientBuilder, ExperimentClientConfig};
pub use memory::MemoryExperiment;
pub use types::{Info, Node, Participant, QuestionResponse, Summary, Transmission};

use crate::error::ChainError;
use crate::store::SessionIds;

/// The server endpoints a participant session uses.
///
/// Implementations must be shareable across the tasks a page spawns, hence the
/// `Send + Sync` bounds on the trait and on every returned future.
pub trait ExperimentApi: Send + Sync + 'static {
    /// `POST /participant/{worker_id}/{hit_id}/{assignment_id}/{mode}`
    fn create_participant(
        &self,
        ids: &SessionIds,
    ) -> impl Future<Output = Result<Participant, ChainError>> + Send;

    /// `POST /node/{participant_id}`
    fn create_node(
        &self,
        participant_id: u64,
    ) -> impl Future<Output = Result<Node, ChainError>> + Send;

    /// `GET /node/{node_id}/received_infos`
    fn received_infos(
        &self,
        node_id: u64,
    ) -> impl Future<Output = Result<Vec<Info>, ChainError>> + Send;

    /// `GET /node/{node_id}/transmissions?status=pending`
    fn pending_transmissions(
        &self,
        node_id: u64,
    ) -> impl Future<Output = Result<Vec<Transmission>, ChainError>> + Send;

    /// `GET /info/{node_id}/{info_id}`
    fn info(
        &self,
        node_id: u64,
        info_id: u64,
    ) -> impl Future<Output = Result<Info, ChainError>> + Send;

    /// `POST /info/{node_id}` with `info_type=Info`
    fn create_info(
        &self,
        node_id: u64,
        contents: &str,
    ) -> impl Future<Output = Result<(), ChainError>> + Send;

    /// `GET /info`: number of infos in the experiment so far.
    fn info_count(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// `GET /summary`
    fn summary(&self) -> impl Future<Output = Result<Summary, ChainError>> + Send;

    /// `GET /experiment/quorum`
    fn quorum(&self) -> impl Future<Output = Result<u32, ChainError>> + Send;

    /// `POST /question/{participant_id}`
    fn submit_question(
        &self,
        participant_id: u64,
        response: &QuestionResponse,
    ) -> impl Future<Output = Result<(), ChainError>> + Send;

    /// `GET /worker_complete?uniqueId=...`
    fn worker_complete(
        &self,
        ids: &SessionIds,
    ) -> impl Future<Output = Result<(), ChainError>> + Send;
}
