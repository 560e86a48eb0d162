//! Page routes, the exit guard and page-scoped tasks.
//!
//! A "page" owns every task it starts through a [`PageScope`]. Navigating away
//! closes the scope: polling loops are aborted the way a full page load
//! discards timers in a browser, while requests already sent are allowed to
//! finish.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Url;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::screen::{Screen, ScreenEvent};
use crate::store::SessionIds;

/// Named pages of the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Consent,
    Instructions(u8),
    Waiting,
    /// The word-learning, filler and reproduction tasks.
    Exp,
    Questionnaire,
    /// The participant declined consent and the window was closed.
    Closed,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Consent => "/consent".to_string(),
            Route::Instructions(n) => format!("/instructions/instructions-{n}"),
            Route::Waiting => "/waiting".to_string(),
            Route::Exp => "/exp".to_string(),
            Route::Questionnaire => "/questionnaire".to_string(),
            Route::Closed => String::new(),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Consent => "Consent",
            Route::Instructions(_) => "Instructions",
            Route::Waiting => "Waiting room",
            Route::Exp => "Experiment",
            Route::Questionnaire => "Questionnaire",
            Route::Closed => "Closed",
        }
    }

    /// Whether loading this page arms the exit guard.
    pub fn guards_exit(&self) -> bool {
        !matches!(self, Route::Questionnaire | Route::Closed)
    }

    /// Absolute page URL carrying the session identifiers.
    pub fn url(&self, base: &str, ids: Option<&SessionIds>, participant_id: Option<u64>) -> String {
        if *self == Route::Closed {
            return String::new();
        }
        let path = self.path();
        let Ok(mut url) = Url::parse(base) else {
            return format!("{}{}", base.trim_end_matches('/'), path);
        };
        // Appended segment by segment so a base like `http://host/expt` keeps its prefix.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        {
            let mut query = url.query_pairs_mut();
            if let Some(ids) = ids {
                query
                    .append_pair("hit_id", &ids.hit_id)
                    .append_pair("assignment_id", &ids.assignment_id)
                    .append_pair("worker_id", &ids.worker_id)
                    .append_pair("mode", &ids.mode);
            }
            if let Some(pid) = participant_id {
                query.append_pair("participant_id", &pid.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        url.to_string()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Closed => write!(f, "closed"),
            other => write!(f, "{}", other.path()),
        }
    }
}

/// Whether leaving the current page should ask for confirmation.
#[derive(Debug, Clone, Default)]
pub struct ExitGuard(Arc<AtomicBool>);

impl ExitGuard {
    pub fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn disarm(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Performs page transitions and remembers where the participant has been.
#[derive(Debug)]
pub struct Navigator {
    base_url: String,
    guard: ExitGuard,
    screen: Screen,
    history: Vec<Route>,
}

impl Navigator {
    pub fn new(base_url: impl Into<String>, guard: ExitGuard, screen: Screen) -> Self {
        Self {
            base_url: base_url.into(),
            guard,
            screen,
            history: Vec::new(),
        }
    }

    /// Load `route`. Guarded pages arm the exit guard on load; the caller
    /// disarms it first for transitions the participant asked for.
    pub fn go_to_page(
        &mut self,
        route: Route,
        ids: Option<&SessionIds>,
        participant_id: Option<u64>,
    ) {
        let url = route.url(&self.base_url, ids, participant_id);
        if route.guards_exit() {
            self.guard.arm();
        }
        info!(%route, armed = self.guard.is_armed(), "navigating");
        self.history.push(route);
        self.screen.show(ScreenEvent::Navigated { route, url });
    }

    pub fn current(&self) -> Option<Route> {
        self.history.last().copied()
    }

    pub fn history(&self) -> &[Route] {
        &self.history
    }

    pub fn guard(&self) -> &ExitGuard {
        &self.guard
    }
}

/// Tasks owned by the current page.
///
/// [`close`](PageScope::close) aborts the cancellable tasks and waits for the
/// ones spawned with [`spawn_to_completion`](PageScope::spawn_to_completion).
/// Dropping the scope without closing it aborts everything.
#[derive(Debug, Default)]
pub struct PageScope {
    tasks: Vec<JoinHandle<()>>,
    finishing: Vec<JoinHandle<()>>,
}

impl PageScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(tokio::spawn(task));
    }

    /// Spawn a task that leaving the page must not cut short.
    pub fn spawn_to_completion<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.finishing.retain(|t| !t.is_finished());
        self.finishing.push(tokio::spawn(task));
    }

    /// Number of tasks still running.
    pub fn active(&self) -> usize {
        self.tasks
            .iter()
            .chain(&self.finishing)
            .filter(|t| !t.is_finished())
            .count()
    }

    /// Leave the page: abort the cancellable tasks, then wait out the rest.
    pub async fn close(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let finishing: Vec<_> = self.finishing.drain(..).collect();
        if !finishing.is_empty() {
            debug!(count = finishing.len(), "waiting for page tasks to finish");
        }
        for task in finishing {
            if let Err(e) = task.await {
                warn!(error = %e, "page task did not finish cleanly");
            }
        }
    }
}

impl Drop for PageScope {
    fn drop(&mut self) {
        for task in self.tasks.iter().chain(&self.finishing) {
            task.abort();
        }
    }
}
