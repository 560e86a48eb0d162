//! Word-learning phase: stimulus reveal followed by the filler task.

use std::time::Duration;

use tracing::debug;

use crate::screen::{Screen, ScreenEvent};

/// One step of the reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reveal {
    Word(String),
    /// The list just ran out; hand off to the filler task.
    Exhausted,
}

/// Reveals a word list last-element-first.
#[derive(Debug)]
pub struct WordListPresenter {
    pending: Vec<String>,
    exhausted: bool,
}

impl WordListPresenter {
    pub fn new(words: Vec<String>) -> Self {
        Self {
            pending: words,
            exhausted: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Pop the next word. Yields [`Reveal::Exhausted`] exactly once, then `None`.
    pub fn next_reveal(&mut self) -> Option<Reveal> {
        match self.pending.pop() {
            Some(word) => Some(Reveal::Word(word)),
            None if !self.exhausted => {
                self.exhausted = true;
                Some(Reveal::Exhausted)
            }
            None => None,
        }
    }

    /// Show every word for `delay`, in pop order.
    pub async fn present(&mut self, screen: &Screen, delay: Duration) {
        while let Some(Reveal::Word(word)) = self.next_reveal() {
            debug!(%word, remaining = self.remaining(), "revealing stimulus");
            screen.show(ScreenEvent::Stimulus(word));
            tokio::time::sleep(delay).await;
        }
    }
}

/// Hide the stimulus and hold the filler interstitial for `duration`.
pub async fn run_filler_task(screen: &Screen, duration: Duration) {
    debug!(?duration, "filler task");
    screen.show(ScreenEvent::FillerTask);
    tokio::time::sleep(duration).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn reveals_in_stack_order_then_exhausts_once() {
        let mut p = WordListPresenter::new(words(&["x", "y", "z"]));
        assert_eq!(p.next_reveal(), Some(Reveal::Word("z".to_string())));
        assert_eq!(p.next_reveal(), Some(Reveal::Word("y".to_string())));
        assert_eq!(p.next_reveal(), Some(Reveal::Word("x".to_string())));
        assert_eq!(p.next_reveal(), Some(Reveal::Exhausted));
        assert_eq!(p.next_reveal(), None);
        assert_eq!(p.next_reveal(), None);
    }

    #[test]
    fn empty_list_exhausts_immediately() {
        let mut p = WordListPresenter::new(Vec::new());
        assert_eq!(p.next_reveal(), Some(Reveal::Exhausted));
        assert_eq!(p.next_reveal(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn present_then_filler_timing() {
        let (screen, mut rx) = Screen::channel();
        let mut p = WordListPresenter::new(words(&["x", "y", "z"]));
        let started = tokio::time::Instant::now();

        p.present(&screen, Duration::from_millis(2000)).await;
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        run_filler_task(&screen, Duration::from_secs(30)).await;
        assert_eq!(started.elapsed(), Duration::from_secs(36));

        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        assert_eq!(
            events,
            vec![
                ScreenEvent::Stimulus("z".to_string()),
                ScreenEvent::Stimulus("y".to_string()),
                ScreenEvent::Stimulus("x".to_string()),
                ScreenEvent::FillerTask,
            ]
        );
        assert_eq!(p.next_reveal(), None);
    }
}
