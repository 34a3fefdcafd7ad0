//! Confirmation and Cancellation
//!
//! Every mutating step asks a [`Confirm`] implementation first. The answer
//! is one of four [`Decision`]s:
//!
//! - `Proceed` - perform this step
//! - `Skip` - leave this item alone; not an error
//! - `ProceedAll` - perform this and every later step without asking
//! - `AbortAll` - stop the batch; nothing further is mutated
//!
//! [`Gate`] remembers a `ProceedAll` for the rest of an invocation.
//! [`CancelToken`] is the caller's stop signal; engines check it between
//! items only.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Answer to a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Proceed,
    Skip,
    ProceedAll,
    AbortAll,
}

/// A pending mutating step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Shown when only describing what would happen
    pub what_if: String,
    /// The question put to the operator
    pub query: String,
    pub caption: &'static str,
}

impl Prompt {
    pub const CAPTION: &'static str = "Confirm";

    pub fn new(what_if: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            what_if: what_if.into(),
            query: query.into(),
            caption: Self::CAPTION,
        }
    }
}

/// Decision callback consulted before each mutating step
pub trait Confirm {
    fn confirm(&mut self, prompt: &Prompt) -> Decision;
}

impl<F> Confirm for F
where
    F: FnMut(&Prompt) -> Decision,
{
    fn confirm(&mut self, prompt: &Prompt) -> Decision {
        self(prompt)
    }
}

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysProceed;

impl Confirm for AlwaysProceed {
    fn confirm(&mut self, _prompt: &Prompt) -> Decision {
        Decision::Proceed
    }
}

/// Reports what would happen and performs nothing
#[derive(Debug, Clone, Default)]
pub struct WhatIf {
    pub described: Vec<String>,
}

impl Confirm for WhatIf {
    fn confirm(&mut self, prompt: &Prompt) -> Decision {
        log::info!("What if: {}", prompt.what_if);
        self.described.push(prompt.what_if.clone());
        Decision::Skip
    }
}

/// Outcome of passing a prompt through a [`Gate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Skip,
    Abort,
}

/// Confirmation state for one invocation
pub struct Gate<'c> {
    confirm: &'c mut dyn Confirm,
    approve_all: bool,
    aborted: bool,
}

impl<'c> Gate<'c> {
    pub fn new(confirm: &'c mut dyn Confirm) -> Self {
        Self {
            confirm,
            approve_all: false,
            aborted: false,
        }
    }

    /// Ask about one step
    pub fn check(&mut self, prompt: &Prompt) -> Verdict {
        if self.aborted {
            return Verdict::Abort;
        }
        if self.approve_all {
            return Verdict::Proceed;
        }

        match self.confirm.confirm(prompt) {
            Decision::Proceed => Verdict::Proceed,
            Decision::Skip => {
                log::debug!("declined: {}", prompt.query);
                Verdict::Skip
            }
            Decision::ProceedAll => {
                self.approve_all = true;
                Verdict::Proceed
            }
            Decision::AbortAll => {
                log::debug!("aborted at: {}", prompt.query);
                self.aborted = true;
                Verdict::Abort
            }
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

/// Cooperative stop signal shared between a caller and an engine
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Prompt {
        Prompt::new("Will delete", "Delete?")
    }

    #[test]
    fn test_proceed_all_is_remembered() {
        let mut asked = 0;
        let mut answer = |_: &Prompt| {
            asked += 1;
            Decision::ProceedAll
        };
        let mut gate = Gate::new(&mut answer);
        assert_eq!(gate.check(&prompt()), Verdict::Proceed);
        assert_eq!(gate.check(&prompt()), Verdict::Proceed);
        drop(gate);
        assert_eq!(asked, 1);
    }

    #[test]
    fn test_abort_is_sticky() {
        let mut answer = |_: &Prompt| Decision::AbortAll;
        let mut gate = Gate::new(&mut answer);
        assert_eq!(gate.check(&prompt()), Verdict::Abort);
        assert!(gate.is_aborted());
        assert_eq!(gate.check(&prompt()), Verdict::Abort);
    }

    #[test]
    fn test_what_if_skips() {
        let mut what_if = WhatIf::default();
        let mut gate = Gate::new(&mut what_if);
        assert_eq!(gate.check(&prompt()), Verdict::Skip);
        drop(gate);
        assert_eq!(what_if.described, vec!["Will delete".to_string()]);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
