//! Unit-of-work scope lifecycle.
//!
//! ```text
//! Idle -> Active -> Committed  -> Closed
//!                -> RolledBack -> Closed
//!                -> Closed               (read-only success)
//! ```

use std::fmt;

use thiserror::Error;

/// Whether a scope may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeMode {
    #[default]
    ReadWrite,
    /// Success never commits; the transaction is rolled back on close.
    ReadOnly,
}

impl ScopeMode {
    pub fn from_read_only(read_only: bool) -> Self {
        if read_only { Self::ReadOnly } else { Self::ReadWrite }
    }

    pub fn is_read_only(self) -> bool {
        self == Self::ReadOnly
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Idle,
    Active,
    Committed,
    RolledBack,
    Closed,
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid {mode:?} scope transition from {from} to {to}")]
pub struct ScopeTransitionError {
    pub mode: ScopeMode,
    pub from: ScopeState,
    pub to: ScopeState,
}

/// Tracks one scope through its lifecycle.
#[derive(Debug)]
pub struct ScopeLifecycle {
    mode: ScopeMode,
    state: ScopeState,
}

impl ScopeLifecycle {
    pub fn new(mode: ScopeMode) -> Self {
        Self {
            mode,
            state: ScopeState::Idle,
        }
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    pub fn state(&self) -> ScopeState {
        self.state
    }

    pub fn allows(&self, next: ScopeState) -> bool {
        use ScopeState::*;
        match (self.state, next) {
            (Idle, Active) => true,
            (Active, Committed) => !self.mode.is_read_only(),
            (Active, RolledBack) => true,
            (Active, Closed) => self.mode.is_read_only(),
            (Committed, Closed) | (RolledBack, Closed) => true,
            _ => false,
        }
    }

    pub fn advance(&mut self, next: ScopeState) -> Result<ScopeState, ScopeTransitionError> {
        if !self.allows(next) {
            return Err(ScopeTransitionError {
                mode: self.mode,
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(from = %self.state, to = %next, "scope transition");
        self.state = next;
        Ok(next)
    }
}
