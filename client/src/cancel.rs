//! Cooperative cancellation for in-flight loads and renders.
//!
//! The viewer runs on a single-threaded event loop, so a shared `Cell` is enough.
//! A token is handed to the async work; the owner flips it when the work is
//! superseded or the session is torn down.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// Hands out one token per generation and cancels the previous one.
#[derive(Debug, Default)]
pub struct Generations {
    current: Cell<u64>,
    token: std::cell::RefCell<Option<CancellationToken>>,
}

impl Generations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels whatever is in flight and starts a new generation.
    pub fn begin(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        if let Some(previous) = self.token.replace(Some(token.clone())) {
            previous.cancel();
        }
        let generation = self.current.get() + 1;
        self.current.set(generation);
        (generation, token)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current.get() == generation
    }

    /// Cancels the in-flight generation without starting a new one.
    pub fn cancel(&self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.current.set(self.current.get() + 1);
    }

    /// Drops the token of a finished generation so it is not cancelled later.
    pub fn finish(&self, generation: u64) {
        if self.is_current(generation) {
            self.token.replace(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let token = CancellationToken::new();
        let worker = token.clone();
        assert!(!worker.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(worker.is_cancelled());
    }

    #[test]
    fn new_generation_cancels_the_previous_token() {
        let generations = Generations::new();
        let (first, first_token) = generations.begin();
        let (second, second_token) = generations.begin();
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert!(!generations.is_current(first));
        assert!(generations.is_current(second));
    }

    #[test]
    fn cancel_invalidates_current_generation() {
        let generations = Generations::new();
        let (generation, token) = generations.begin();
        generations.cancel();
        assert!(token.is_cancelled());
        assert!(!generations.is_current(generation));
    }

    #[test]
    fn finished_generation_is_not_cancelled_later() {
        let generations = Generations::new();
        let (generation, token) = generations.begin();
        generations.finish(generation);
        generations.cancel();
        assert!(!token.is_cancelled());
    }
}
