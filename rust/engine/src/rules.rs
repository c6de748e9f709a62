use serde::{Deserialize, Serialize};

use crate::cards::CARDS_PER_DECK;
use crate::errors::GameError;
use crate::types::{amount_str, apply_bps, Amount};

/// Standard shoe size.
pub const STANDARD_DECKS: usize = 7;

/// Upper bound on cards one side can hold in a round: every card is worth at
/// least one point, so a hand that is not yet bust holds at most 21 cards and
/// the next draw ends it.
pub const MAX_CARDS_PER_SIDE: usize = 22;

/// Cards a single round can consume, player and dealer together.
pub const MAX_CARDS_PER_ROUND: usize = 2 * MAX_CARDS_PER_SIDE;

/// Ceiling for any basis-point rule (10x the bet).
pub const MAX_RULE_BPS: u32 = 100_000;

// A single deck already outlasts the longest possible round, so a fresh shoe per
// hand can never run dry.
const _: () = assert!(MAX_CARDS_PER_ROUND <= CARDS_PER_DECK);

/// House rules applied by both the interactive table and the event resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRules {
    pub num_decks: usize,
    pub hit_soft_17: bool,
    /// Blackjack payout as a fraction of the bet, in basis points (15000 = 3:2).
    pub blackjack_payout_bps: u32,
    /// Fee charged on every bet, in basis points.
    pub table_fee_bps: u32,
    /// Flat randomness-oracle fee charged per hand.
    #[serde(with = "amount_str")]
    pub oracle_fee: Amount,
}

impl Default for TableRules {
    fn default() -> Self {
        Self {
            num_decks: STANDARD_DECKS,
            hit_soft_17: true,
            blackjack_payout_bps: 15_000,
            table_fee_bps: 5,
            oracle_fee: 0,
        }
    }
}

impl TableRules {
    pub fn validate(&self) -> Result<(), GameError> {
        if self.num_decks == 0 {
            return Err(GameError::InvalidDeckCount(self.num_decks));
        }
        if self.blackjack_payout_bps > MAX_RULE_BPS || self.table_fee_bps > MAX_RULE_BPS {
            return Err(GameError::InvalidRules(format!(
                "basis points must not exceed {MAX_RULE_BPS}"
            )));
        }
        Ok(())
    }

    pub fn fees_for(&self, bet: Amount) -> FeeBreakdown {
        FeeBreakdown {
            oracle: self.oracle_fee,
            table: apply_bps(bet, self.table_fee_bps),
        }
    }
}

/// Ancillary fees attached to a resolved hand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeeBreakdown {
    #[serde(with = "amount_str")]
    pub oracle: Amount,
    #[serde(with = "amount_str")]
    pub table: Amount,
}

impl FeeBreakdown {
    pub fn total(&self) -> Amount {
        self.oracle.saturating_add(self.table)
    }
}

/// Rejects bets that cannot be settled.
///
/// # Examples
///
/// ```
/// use fairhand_engine::rules::validate_bet;
///
/// assert!(validate_bet(100).is_ok());
/// assert!(validate_bet(0).is_err());
/// ```
pub fn validate_bet(bet: Amount) -> Result<(), GameError> {
    if bet == 0 {
        return Err(GameError::InvalidBet("bet must be greater than zero".into()));
    }
    Ok(())
}
