//! # chain-participant
//!
//! Headless participant client for networked word-of-mouth transmission-chain
//! (memory chain) experiments. One [`SessionController`] walks a participant
//! through consent, instructions, the waiting room, the word-learning and
//! filler tasks, the chat-style reproduction task and the questionnaire,
//! talking to the experiment server through an [`ExperimentApi`].
//!
//! ```rust,ignore
//! let api = Arc::new(ExperimentClient::builder("http://localhost:5000").build());
//! let (screen, events) = Screen::channel();
//! let (input_tx, input_rx) = tokio::sync::mpsc::channel(32);
//! let controller = SessionController::new(api, LocalStore::in_memory(), screen, input_rx, options);
//! let report = controller.run().await?;
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod navigation;
pub mod questionnaire;
pub mod quorum;
pub mod responses;
pub mod screen;
pub mod session;
pub mod store;
pub mod transmissions;
pub mod wordlist;

pub use api::{ExperimentApi, ExperimentClient, MemoryExperiment};
pub use config::ParticipantConfig;
pub use controller::{
    ConsentDecision, InputSource, ParticipantInput, SessionController, SessionEnd,
    SessionOptions, SessionReport,
};
pub use error::ChainError;
pub use navigation::{ExitGuard, Route};
pub use screen::{Screen, ScreenEvent};
pub use store::{LocalStore, SessionIds};
