//! # Session progression
//!
//! Walks one participant through the experiment:
//!
//! ```text
//! Consent ──► Instructions ──► Waiting ──► Exp ──► Questionnaire
//!    │                           │          │
//!    └──► Closed                 └──────────┴──► Questionnaire (late arrival,
//!                                                 benign server error, leave)
//! ```
//!
//! Each page is a method returning a [`PageOutcome`]. A server error that
//! carries a replacement page ends the session on that page; one without a
//! page sends the participant to the questionnaire.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::api::ExperimentApi;
use crate::config::TimingConfig;
use crate::error::ChainError;
use crate::navigation::{ExitGuard, Navigator, PageScope, Route};
use crate::questionnaire::Questionnaire;
use crate::responses::{ResponseSubmitter, SendControl, Validation};
use crate::screen::{Screen, ScreenEvent};
use crate::session::{ReplyEntry, SessionContext};
use crate::store::{LocalStore, SessionIds};
use crate::transmissions::TransmissionPoller;
use crate::wordlist::{run_filler_task, WordListPresenter};

/// Something the participant did on the task page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantInput {
    /// Text entered in the response field and sent.
    Word(String),
    /// The "leave chat" button.
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsentDecision {
    #[default]
    Accept,
    Decline,
}

/// Where participant input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputSource {
    /// Someone typing live. Input entered before the task page is discarded
    /// and input arriving while a response is in flight is ignored.
    #[default]
    Interactive,
    /// Input prepared in advance (a pipe or file). Every line is kept and
    /// each response is delivered before the next one is read.
    Scripted,
}

/// How a session is set up.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Server base URL, used to build page URLs.
    pub base_url: String,
    /// Identifiers from the entry URL, stored on consent.
    pub entry: Option<SessionIds>,
    pub consent: ConsentDecision,
    pub timing: TimingConfig,
    pub questionnaire: Questionnaire,
    pub input: InputSource,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            entry: None,
            consent: ConsentDecision::Accept,
            timing: TimingConfig::default(),
            questionnaire: Questionnaire::default(),
            input: InputSource::Interactive,
        }
    }
}

/// Where a page sends the participant.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Navigate(Route),
    /// The server replaced the page; the normal flow ends here.
    Render(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    /// The questionnaire was submitted and the assignment completed.
    Completed,
    /// Consent was declined.
    Declined,
    /// The server ended the session with its own page.
    ServerPage(String),
}

/// What happened, for the caller to inspect after [`SessionController::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub history: Vec<Route>,
    pub replies: Vec<ReplyEntry>,
    pub participant_id: Option<u64>,
    pub node_id: Option<u64>,
}

/// Drives one participant session from consent to exit.
pub struct SessionController<A> {
    api: Arc<A>,
    ctx: SessionContext,
    nav: Navigator,
    screen: Screen,
    store: LocalStore,
    input: mpsc::Receiver<ParticipantInput>,
    options: SessionOptions,
}

impl<A: ExperimentApi> SessionController<A> {
    pub fn new(
        api: Arc<A>,
        store: LocalStore,
        screen: Screen,
        input: mpsc::Receiver<ParticipantInput>,
        options: SessionOptions,
    ) -> Self {
        let nav = Navigator::new(options.base_url.clone(), ExitGuard::default(), screen.clone());
        Self {
            api,
            ctx: SessionContext::new(),
            nav,
            screen,
            store,
            input,
            options,
        }
    }

    /// Handle on the exit guard, for the leave prompt.
    pub fn exit_guard(&self) -> ExitGuard {
        self.nav.guard().clone()
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Run the session to its end.
    ///
    /// # Errors
    /// Configuration problems (no identifiers to consent with), local store
    /// failures, and questionnaire submission failures. Everything else ends
    /// in a navigation or a rendered server page.
    pub async fn run(mut self) -> Result<SessionReport, ChainError> {
        let mut route = Route::Consent;
        self.nav.go_to_page(route, None, None);

        loop {
            let outcome = match route {
                Route::Consent => self.consent_page()?,
                Route::Instructions(_) => self.instructions_page(),
                Route::Waiting => self.waiting_page().await?,
                Route::Exp => self.exp_page().await?,
                Route::Questionnaire => {
                    self.questionnaire_page().await?;
                    return Ok(self.report(SessionEnd::Completed));
                }
                Route::Closed => return Ok(self.report(SessionEnd::Declined)),
            };

            match outcome {
                PageOutcome::Navigate(next) => {
                    self.nav
                        .go_to_page(next, self.ctx.ids.as_ref(), self.ctx.participant_id);
                    route = next;
                }
                PageOutcome::Render(page) => {
                    error!(%route, "server replaced the page, session over");
                    self.screen.show(ScreenEvent::Page(page.clone()));
                    return Ok(self.report(SessionEnd::ServerPage(page)));
                }
            }
        }
    }

    fn report(&self, end: SessionEnd) -> SessionReport {
        SessionReport {
            end,
            history: self.nav.history().to_vec(),
            replies: self.ctx.transcript.lock().entries().to_vec(),
            participant_id: self.ctx.participant_id,
            node_id: self.ctx.node_id,
        }
    }

    /// Map a failed server call onto the error taxonomy.
    fn server_error(&self, err: ChainError) -> PageOutcome {
        match err.page() {
            Some(page) => PageOutcome::Render(page.to_string()),
            None => {
                warn!(error = %err, "server error without a page, going to questionnaire");
                self.nav.guard().disarm();
                PageOutcome::Navigate(Route::Questionnaire)
            }
        }
    }

    fn consent_page(&mut self) -> Result<PageOutcome, ChainError> {
        match self.options.consent {
            ConsentDecision::Accept => {
                let ids = self.options.entry.clone().ok_or_else(|| {
                    ChainError::Config("no session identifiers to consent with".to_string())
                })?;
                ids.save(&mut self.store)?;
                info!(worker = %ids.worker_id, assignment = %ids.assignment_id, "consented");
                self.ctx.ids = Some(ids);
                self.nav.guard().disarm();
                Ok(PageOutcome::Navigate(Route::Instructions(1)))
            }
            ConsentDecision::Decline => {
                info!("consent declined");
                self.nav.guard().disarm();
                Ok(PageOutcome::Navigate(Route::Closed))
            }
        }
    }

    fn instructions_page(&mut self) -> PageOutcome {
        self.nav.guard().disarm();
        PageOutcome::Navigate(Route::Waiting)
    }

    async fn waiting_page(&mut self) -> Result<PageOutcome, ChainError> {
        let interval = self.options.timing.quorum_poll();

        let any_infos = loop {
            match self.api.info_count().await {
                Ok(count) => break count > 0,
                Err(e) => {
                    warn!(error = %e, "info count failed, will retry");
                    tokio::time::sleep(interval).await;
                }
            }
        };

        let ids = SessionIds::load(&self.store)
            .or_else(|| self.ctx.ids.clone())
            .ok_or(ChainError::MissingIdentity("session identifiers"))?;
        let participant = match self.api.create_participant(&ids).await {
            Ok(p) => p,
            Err(e) => return Ok(self.server_error(e)),
        };
        info!(participant = participant.id, "participant created");
        self.ctx.ids = Some(ids);
        self.ctx.participant_id = Some(participant.id);

        if any_infos {
            info!("experiment already has infos, skipping to questionnaire");
            self.nav.guard().disarm();
            return Ok(PageOutcome::Navigate(Route::Questionnaire));
        }

        let progress = self
            .ctx
            .quorum
            .wait(&*self.api, &self.screen, interval)
            .await;
        info!(ready = progress.ready, quorum = progress.quorum, "quorum reached");
        self.nav.guard().disarm();
        Ok(PageOutcome::Navigate(Route::Exp))
    }

    async fn exp_page(&mut self) -> Result<PageOutcome, ChainError> {
        let participant_id = self.ctx.require_participant()?;
        let node = match self.api.create_node(participant_id).await {
            Ok(node) => node,
            Err(e) => return Ok(self.server_error(e)),
        };
        info!(node = node.id, "node created");
        self.ctx.node_id = Some(node.id);

        let words = match self.fetch_word_list().await {
            Ok(words) => words,
            Err(e) => return Ok(self.server_error(e)),
        };

        let timing = self.options.timing.clone();
        WordListPresenter::new(words)
            .present(&self.screen, timing.word_reveal())
            .await;
        run_filler_task(&self.screen, timing.filler()).await;

        self.reproduction_task().await
    }

    async fn fetch_word_list(&self) -> Result<Vec<String>, ChainError> {
        let node_id = self.ctx.require_node()?;
        let infos = self.api.received_infos(node_id).await?;
        let first = infos
            .first()
            .ok_or_else(|| ChainError::json("infos", "no word list received"))?;
        first.word_list()
    }

    /// The chat-style reproduction task. Returns when the participant leaves,
    /// input ends, or the chat timeout fires.
    async fn reproduction_task(&mut self) -> Result<PageOutcome, ChainError> {
        let node_id = self.ctx.require_node()?;
        let timing = self.options.timing.clone();
        let transcript = self.ctx.transcript.clone();

        let mut scope = PageScope::new();
        let send = SendControl::new(self.screen.clone());
        let submitter = ResponseSubmitter::new(
            Arc::clone(&self.api),
            node_id,
            transcript.clone(),
            send.clone(),
            self.screen.clone(),
        );

        let scripted = self.options.input == InputSource::Scripted;
        if !scripted {
            while let Ok(stale) = self.input.try_recv() {
                debug!(?stale, "discarding input entered before the task");
            }
        }

        self.screen.show(ScreenEvent::TaskReady);
        send.enable();
        scope.spawn(
            TransmissionPoller::new(
                Arc::clone(&self.api),
                node_id,
                transcript,
                self.screen.clone(),
                timing.transmission_poll(),
            )
            .run(),
        );

        let deadline = timing.chat_timeout().map(|d| Instant::now() + d);
        loop {
            let input = match deadline {
                Some(at) => match tokio::time::timeout_at(at, self.input.recv()).await {
                    Ok(input) => input,
                    Err(_) => {
                        info!("chat time is up");
                        None
                    }
                },
                None => self.input.recv().await,
            };

            match input {
                Some(ParticipantInput::Word(text)) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    if !send.is_enabled() {
                        info!(%text, "previous response still sending, input ignored");
                        continue;
                    }
                    send.disable();
                    if let Validation::Accepted(word) = submitter.validate(&text) {
                        debug!(%word, "response accepted");
                        if scripted {
                            if let Err(e) = submitter.deliver(&text).await {
                                error!(error = %e, "response delivery failed");
                                send.enable();
                            }
                        } else {
                            let submitter = submitter.clone();
                            scope.spawn_to_completion(async move {
                                if let Err(e) = submitter.deliver(&text).await {
                                    error!(error = %e, "response delivery failed");
                                }
                            });
                        }
                    }
                }
                Some(ParticipantInput::Leave) | None => break,
            }
        }

        // Responses already accepted still reach the server; polling stops.
        scope.close().await;
        info!(words = self.ctx.transcript.lock().len(), "leaving chat");
        self.nav.guard().disarm();
        Ok(PageOutcome::Navigate(Route::Questionnaire))
    }

    async fn questionnaire_page(&mut self) -> Result<(), ChainError> {
        let ids = self.ctx.require_ids()?.clone();
        self.options
            .questionnaire
            .submit(&*self.api, self.ctx.participant_id, &ids)
            .await
    }
}
