//! Seed-driven resolution of a hand with no player decisions.
//!
//! [`resolve_hand`] is what the event pipeline runs once randomness arrives:
//! a fresh shoe shuffled with the delivered seed, the opening deal, the dealer
//! drawing to rule unless either side holds a natural, then settlement. It is a
//! pure function of its arguments, so a retry after a failed write yields the
//! same bytes.

use serde::{Deserialize, Serialize};

use crate::cards::{face_up, Card, CardFace};
use crate::deck::Deck;
use crate::errors::GameError;
use crate::hand::{dealer_play, evaluate_outcome, is_blackjack, Outcome};
use crate::rules::{FeeBreakdown, TableRules};
use crate::types::{amount_str, Address, Amount, HandId, Seed};

/// Opening two cards per side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialDeal {
    pub dealer: Vec<Card>,
    pub player: Vec<Card>,
}

impl InitialDeal {
    pub fn has_natural(&self) -> bool {
        is_blackjack(&self.dealer) || is_blackjack(&self.player)
    }
}

/// Deals dealer, player, dealer, player. The dealer's second card is the hole card.
pub fn deal_initial(deck: &mut Deck) -> Result<InitialDeal, GameError> {
    let mut dealer = Vec::with_capacity(2);
    let mut player = Vec::with_capacity(2);
    for _ in 0..2 {
        dealer.push(deck.deal()?);
        player.push(deck.deal()?);
    }
    Ok(InitialDeal { dealer, player })
}

/// Final, fully revealed record of one resolved hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandResult {
    pub hand_id: HandId,
    pub player: Address,
    pub token: Address,
    #[serde(with = "amount_str")]
    pub amount: Amount,
    pub seed: Seed,
    pub dealer_hand: Vec<CardFace>,
    pub player_hand: Vec<CardFace>,
    pub outcome: Outcome,
    #[serde(with = "amount_str")]
    pub payout: Amount,
    pub fees: FeeBreakdown,
}

pub fn resolve_hand(
    hand_id: HandId,
    player: Address,
    token: Address,
    amount: Amount,
    seed: &Seed,
    rules: &TableRules,
) -> Result<HandResult, GameError> {
    rules.validate()?;
    let mut deck = Deck::new(rules.num_decks)?;
    deck.shuffle(seed.as_bytes());

    let InitialDeal {
        dealer,
        player: player_cards,
    } = deal_initial(&mut deck)?;
    let dealer = if is_blackjack(&dealer) || is_blackjack(&player_cards) {
        dealer
    } else {
        dealer_play(&mut deck, dealer, rules.hit_soft_17)?
    };

    let (outcome, payout) =
        evaluate_outcome(&player_cards, &dealer, amount, rules.blackjack_payout_bps);
    tracing::debug!(
        hand_id,
        %player,
        %outcome,
        payout = %payout,
        cards_used = deck.dealt(),
        "hand resolved from seed"
    );

    Ok(HandResult {
        hand_id,
        player,
        token,
        amount,
        seed: *seed,
        dealer_hand: face_up(&dealer),
        player_hand: face_up(&player_cards),
        outcome,
        payout,
        fees: rules.fees_for(amount),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Rank, Suit};

    #[test]
    fn deal_alternates_starting_with_dealer() {
        let mut deck = Deck::new(1).expect("deck");
        let deal = deal_initial(&mut deck).expect("deal");
        // Unshuffled shoe: A♣ 2♣ 3♣ 4♣
        assert_eq!(
            deal.dealer,
            vec![
                Card::new(Rank::Ace, Suit::Clubs),
                Card::new(Rank::Three, Suit::Clubs)
            ]
        );
        assert_eq!(
            deal.player,
            vec![
                Card::new(Rank::Two, Suit::Clubs),
                Card::new(Rank::Four, Suit::Clubs)
            ]
        );
        assert_eq!(deck.dealt(), 4);
        assert!(!deal.has_natural());
    }

    #[test]
    fn result_shows_every_card_face_up() {
        let result = resolve_hand(
            1,
            Address([1; 20]),
            Address([2; 20]),
            100,
            &Seed([0; 32]),
            &TableRules::default(),
        )
        .expect("resolve");
        assert!(result.dealer_hand.iter().all(|c| !c.is_face_down()));
        assert!(result.player_hand.iter().all(|c| !c.is_face_down()));
        assert_eq!(result.player_hand.len(), 2);
    }

    #[test]
    fn invalid_rules_are_rejected() {
        let rules = TableRules {
            num_decks: 0,
            ..Default::default()
        };
        assert_eq!(
            resolve_hand(1, Address::default(), Address::default(), 1, &Seed::default(), &rules),
            Err(GameError::InvalidDeckCount(0))
        );
    }
}
