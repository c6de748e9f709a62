use thiserror::Error;

use crate::phase::Phase;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("cannot {operation} in phase {phase}, must be {expected}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
        expected: &'static str,
    },
    #[error("shoe exhausted after {dealt} of {total} cards")]
    ExhaustedShoe { dealt: usize, total: usize },
    #[error("invalid bet amount: {0}")]
    InvalidBet(String),
    #[error("invalid deck count: {0}, at least one deck is required")]
    InvalidDeckCount(usize),
    #[error("invalid table rules: {0}")]
    InvalidRules(String),
    #[error("invalid phase transition from {from} to {to}")]
    IllegalTransition { from: Phase, to: Phase },
    #[error("engine state lock poisoned")]
    StatePoisoned,
}

impl GameError {
    /// Whether the caller caused the failure and may retry after re-reading state.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GameError::InvalidPhase { .. }
                | GameError::InvalidBet(_)
                | GameError::InvalidDeckCount(_)
                | GameError::IllegalTransition { .. }
        )
    }
}
