//! What the participant sees.
//!
//! Components never write to the terminal directly; they emit [`ScreenEvent`]s
//! through a [`Screen`] handle. The binary renders them with [`render`], tests
//! read them off the channel.

use colored::*;
use tokio::sync::mpsc;

use crate::navigation::Route;
use crate::session::ReplyOrigin;

/// One visible change on the participant's screen.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    /// A new page was loaded.
    Navigated { route: Route, url: String },
    /// Waiting-room progress bar, in percent (may exceed 100).
    Progress(u32),
    /// The current stimulus word.
    Stimulus(String),
    /// The filler task interstitial replaced the stimulus.
    FillerTask,
    /// The reproduction form is visible and focused.
    TaskReady,
    /// A word was appended to the reply log.
    Reply { word: String, origin: ReplyOrigin },
    /// The send control changed state.
    SendEnabled(bool),
    /// The response field was cleared and refocused.
    InputCleared,
    /// The server replaced the page with its own body.
    Page(String),
}

/// Sender half of the screen. Cloning is cheap; a detached screen drops
/// everything.
#[derive(Debug, Clone, Default)]
pub struct Screen {
    tx: Option<mpsc::UnboundedSender<ScreenEvent>>,
}

impl Screen {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScreenEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn detached() -> Self {
        Self::default()
    }

    pub fn show(&self, event: ScreenEvent) {
        if let Some(tx) = &self.tx {
            // A closed receiver means nobody is watching; the session goes on.
            let _ = tx.send(event);
        }
    }
}

/// Terminal rendering of an event, or `None` for events with nothing to print.
pub fn render(event: &ScreenEvent) -> Option<String> {
    let line = match event {
        ScreenEvent::Navigated { route, .. } => {
            format!("{} {}", "==".bright_black(), route.title().bright_yellow().bold())
        }
        ScreenEvent::Progress(percent) => {
            let filled = (*percent).min(100) as usize / 5;
            format!(
                "[{}{}] {}",
                "#".repeat(filled).bright_green(),
                ".".repeat(20 - filled),
                format!("{percent}%").bright_white()
            )
        }
        ScreenEvent::Stimulus(word) => format!("  {}", word.bright_white().bold()),
        ScreenEvent::FillerTask => "Filler task: please wait...".bright_magenta().to_string(),
        ScreenEvent::TaskReady => "Type the words you remember, one per line. \
                                   Enter /leave when you are done."
            .bright_cyan()
            .to_string(),
        ScreenEvent::Reply { word, origin } => match origin {
            ReplyOrigin::Sent => format!("  {}", word.cyan()),
            ReplyOrigin::Received => format!("  {word}"),
        },
        ScreenEvent::Page(html) => format!("{}\n{html}", "Server message:".bright_red().bold()),
        ScreenEvent::SendEnabled(_) | ScreenEvent::InputCleared => return None,
    };
    Some(line)
}
