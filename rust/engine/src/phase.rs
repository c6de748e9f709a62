use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::GameError;

/// Lifecycle phase of the single in-flight hand.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Initial state, waiting for a bet.
    WaitingForDeal,
    /// Hand accepted; the shoe is built and shuffled next.
    Shuffling,
    /// Initial cards are being dealt.
    Dealing,
    /// Player decides between hit and stand.
    PlayerTurn,
    /// Dealer draws to the house rule.
    DealerTurn,
    /// Outcome and payout are computed.
    Resolution,
    /// Hand finished; also the starting point of the next hand.
    Complete,
}

pub const ALL_PHASES: [Phase; 7] = [
    Phase::WaitingForDeal,
    Phase::Shuffling,
    Phase::Dealing,
    Phase::PlayerTurn,
    Phase::DealerTurn,
    Phase::Resolution,
    Phase::Complete,
];

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::WaitingForDeal => "WAITING_FOR_DEAL",
            Phase::Shuffling => "SHUFFLING",
            Phase::Dealing => "DEALING",
            Phase::PlayerTurn => "PLAYER_TURN",
            Phase::DealerTurn => "DEALER_TURN",
            Phase::Resolution => "RESOLUTION",
            Phase::Complete => "COMPLETE",
        }
    }

    /// Legal successors of this phase.
    pub fn successors(self) -> &'static [Phase] {
        match self {
            Phase::WaitingForDeal => &[Phase::Shuffling],
            Phase::Shuffling => &[Phase::Dealing],
            // Straight to resolution on a natural.
            Phase::Dealing => &[Phase::PlayerTurn, Phase::Resolution],
            // Straight to resolution on a bust.
            Phase::PlayerTurn => &[Phase::DealerTurn, Phase::Resolution],
            Phase::DealerTurn => &[Phase::Resolution],
            Phase::Resolution => &[Phase::Complete],
            Phase::Complete => &[Phase::WaitingForDeal, Phase::Shuffling],
        }
    }

    pub fn can_transition_to(self, next: Phase) -> bool {
        self.successors().contains(&next)
    }

    /// A new hand may start from here.
    pub fn accepts_new_hand(self) -> bool {
        self.can_transition_to(Phase::Shuffling)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn validate_transition(from: Phase, to: Phase) -> Result<(), GameError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(GameError::IllegalTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_hands_start_from_waiting_or_complete_only() {
        let starters: Vec<Phase> = ALL_PHASES
            .iter()
            .copied()
            .filter(|p| p.accepts_new_hand())
            .collect();
        assert_eq!(starters, vec![Phase::WaitingForDeal, Phase::Complete]);
    }

    #[test]
    fn complete_loops_back() {
        assert!(validate_transition(Phase::Complete, Phase::WaitingForDeal).is_ok());
        assert!(validate_transition(Phase::Complete, Phase::Shuffling).is_ok());
    }

    #[test]
    fn skipping_phases_is_rejected() {
        assert_eq!(
            validate_transition(Phase::WaitingForDeal, Phase::PlayerTurn),
            Err(GameError::IllegalTransition {
                from: Phase::WaitingForDeal,
                to: Phase::PlayerTurn
            })
        );
        assert!(validate_transition(Phase::DealerTurn, Phase::PlayerTurn).is_err());
        assert!(validate_transition(Phase::Resolution, Phase::Resolution).is_err());
    }

    #[test]
    fn serializes_in_screaming_case() {
        let json = serde_json::to_string(&Phase::WaitingForDeal).expect("serialize");
        assert_eq!(json, "\"WAITING_FOR_DEAL\"");
        for phase in ALL_PHASES {
            let json = serde_json::to_string(&phase).expect("serialize");
            assert_eq!(json, format!("\"{}\"", phase));
        }
    }
}
