//! Pure blackjack hand evaluation. Nothing here touches shared state; every
//! function is a deterministic function of its arguments (and, for
//! [`dealer_play`], of the deck's remaining order).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cards::{Card, Rank};
use crate::deck::Deck;
use crate::errors::GameError;
use crate::types::{apply_bps, Amount};

/// Dealer stands on this total (hard), and on soft totals unless hitting soft 17.
pub const DEALER_STAND: u32 = 17;
pub const BLACKJACK: u32 = 21;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct HandValue {
    pub total: u32,
    /// At least one ace is still counted as 11 in `total`.
    pub soft: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Lose,
    Push,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Lose => "lose",
            Outcome::Push => "push",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sums the hand with aces high, then demotes aces to 1 one at a time while
/// the total exceeds 21.
pub fn hand_value(cards: &[Card]) -> HandValue {
    let mut total = 0;
    let mut high_aces = 0;
    for card in cards {
        if card.rank == Rank::Ace {
            high_aces += 1;
        }
        total += card.rank.points();
    }
    while total > BLACKJACK && high_aces > 0 {
        total -= 10;
        high_aces -= 1;
    }
    HandValue {
        total,
        soft: high_aces > 0,
    }
}

/// Exactly two cards: one ace and one ten-valued card.
pub fn is_blackjack(cards: &[Card]) -> bool {
    match cards {
        [a, b] => {
            (a.rank == Rank::Ace && b.rank.is_ten_valued())
                || (b.rank == Rank::Ace && a.rank.is_ten_valued())
        }
        _ => false,
    }
}

pub fn is_bust(cards: &[Card]) -> bool {
    hand_value(cards).total > BLACKJACK
}

/// Draws for the dealer until the house rule says stand. Returns the final hand.
pub fn dealer_play(
    deck: &mut Deck,
    mut dealer: Vec<Card>,
    hit_soft_17: bool,
) -> Result<Vec<Card>, GameError> {
    loop {
        let value = hand_value(&dealer);
        let must_hit = value.total < DEALER_STAND
            || (value.total == DEALER_STAND && value.soft && hit_soft_17);
        if !must_hit {
            return Ok(dealer);
        }
        dealer.push(deck.deal()?);
    }
}

/// Settles one hand. Precedence: both naturals push; player natural pays
/// `bet * blackjack_payout_bps / 10000`; dealer natural loses; player bust
/// loses; dealer bust pays even money; otherwise the higher total wins even
/// money and equal totals push.
pub fn evaluate_outcome(
    player: &[Card],
    dealer: &[Card],
    bet: Amount,
    blackjack_payout_bps: u32,
) -> (Outcome, Amount) {
    let player_bj = is_blackjack(player);
    let dealer_bj = is_blackjack(dealer);

    if player_bj && dealer_bj {
        return (Outcome::Push, 0);
    }
    if player_bj {
        return (Outcome::Win, apply_bps(bet, blackjack_payout_bps));
    }
    if dealer_bj {
        return (Outcome::Lose, 0);
    }
    if is_bust(player) {
        return (Outcome::Lose, 0);
    }
    if is_bust(dealer) {
        return (Outcome::Win, bet);
    }

    let player_total = hand_value(player).total;
    let dealer_total = hand_value(dealer).total;
    match player_total.cmp(&dealer_total) {
        std::cmp::Ordering::Greater => (Outcome::Win, bet),
        std::cmp::Ordering::Less => (Outcome::Lose, 0),
        std::cmp::Ordering::Equal => (Outcome::Push, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::Suit;

    fn c(rank: Rank) -> Card {
        Card::new(rank, Suit::Spades)
    }

    #[test]
    fn ace_six_is_soft_seventeen() {
        assert_eq!(
            hand_value(&[c(Rank::Ace), c(Rank::Six)]),
            HandValue {
                total: 17,
                soft: true
            }
        );
    }

    #[test]
    fn ace_demotes_when_over_twenty_one() {
        assert_eq!(
            hand_value(&[c(Rank::Ace), c(Rank::Six), c(Rank::Nine)]),
            HandValue {
                total: 16,
                soft: false
            }
        );
    }

    #[test]
    fn only_one_of_two_aces_demotes() {
        assert_eq!(
            hand_value(&[c(Rank::Ace), c(Rank::Ace)]),
            HandValue {
                total: 12,
                soft: true
            }
        );
        assert_eq!(
            hand_value(&[c(Rank::Ace), c(Rank::Ace), c(Rank::King)]),
            HandValue {
                total: 12,
                soft: false
            }
        );
    }

    #[test]
    fn blackjack_needs_exactly_two_cards() {
        assert!(is_blackjack(&[c(Rank::Ace), c(Rank::King)]));
        assert!(is_blackjack(&[c(Rank::Ten), c(Rank::Ace)]));
        assert!(!is_blackjack(&[c(Rank::Ace), c(Rank::Six), c(Rank::Four)]));
        assert!(!is_blackjack(&[c(Rank::Ace), c(Rank::Nine)]));
        assert!(!is_blackjack(&[]));
    }

    #[test]
    fn bust_is_strictly_over_twenty_one() {
        assert!(!is_bust(&[c(Rank::King), c(Rank::Queen), c(Rank::Ace)]));
        assert!(is_bust(&[c(Rank::King), c(Rank::Queen), c(Rank::Two)]));
    }

    #[test]
    fn natural_pays_configured_ratio() {
        assert_eq!(
            evaluate_outcome(
                &[c(Rank::Ace), c(Rank::King)],
                &[c(Rank::Nine), c(Rank::Seven)],
                100,
                15_000
            ),
            (Outcome::Win, 150)
        );
    }

    #[test]
    fn two_naturals_push() {
        assert_eq!(
            evaluate_outcome(
                &[c(Rank::Ace), c(Rank::King)],
                &[c(Rank::Queen), c(Rank::Ace)],
                100,
                15_000
            ),
            (Outcome::Push, 0)
        );
    }

    #[test]
    fn dealer_natural_beats_twenty_one() {
        assert_eq!(
            evaluate_outcome(
                &[c(Rank::Seven), c(Rank::Seven), c(Rank::Seven)],
                &[c(Rank::Ace), c(Rank::Jack)],
                100,
                15_000
            ),
            (Outcome::Lose, 0)
        );
    }

    #[test]
    fn player_bust_loses_even_if_dealer_busts() {
        assert_eq!(
            evaluate_outcome(
                &[c(Rank::King), c(Rank::Six), c(Rank::Nine)],
                &[c(Rank::King), c(Rank::Six), c(Rank::Eight)],
                100,
                15_000
            ),
            (Outcome::Lose, 0)
        );
    }

    #[test]
    fn dealer_bust_pays_even_money() {
        assert_eq!(
            evaluate_outcome(
                &[c(Rank::King), c(Rank::Eight)],
                &[c(Rank::Ten), c(Rank::Six), c(Rank::King)],
                100,
                15_000
            ),
            (Outcome::Win, 100)
        );
    }

    #[test]
    fn totals_compare() {
        let eighteen = [c(Rank::King), c(Rank::Eight)];
        let nineteen = [c(Rank::King), c(Rank::Nine)];
        assert_eq!(
            evaluate_outcome(&nineteen, &eighteen, 40, 15_000),
            (Outcome::Win, 40)
        );
        assert_eq!(
            evaluate_outcome(&eighteen, &nineteen, 40, 15_000),
            (Outcome::Lose, 0)
        );
        assert_eq!(
            evaluate_outcome(&eighteen, &eighteen, 40, 15_000),
            (Outcome::Push, 0)
        );
    }

    #[test]
    fn dealer_hits_soft_seventeen_only_when_enabled() {
        let mut deck = Deck::new(1).expect("deck");
        // Canonical order starts A♣ 2♣ ...
        let stood = dealer_play(&mut deck, vec![c(Rank::Ace), c(Rank::Six)], false)
            .expect("dealer plays");
        assert_eq!(stood.len(), 2);
        assert_eq!(deck.dealt(), 0);

        let hit = dealer_play(&mut deck, vec![c(Rank::Ace), c(Rank::Six)], true)
            .expect("dealer plays");
        // A+6+A = soft 18, stand.
        assert_eq!(hit.len(), 3);
        assert_eq!(hand_value(&hit).total, 18);
    }

    #[test]
    fn dealer_stands_on_hard_seventeen() {
        let mut deck = Deck::new(1).expect("deck");
        let hand = dealer_play(&mut deck, vec![c(Rank::King), c(Rank::Seven)], true)
            .expect("dealer plays");
        assert_eq!(hand.len(), 2);
    }

    #[test]
    fn dealer_draw_surfaces_exhaustion() {
        let mut deck = Deck::new(1).expect("deck");
        while deck.remaining() > 0 {
            deck.deal().expect("card");
        }
        assert!(matches!(
            dealer_play(&mut deck, vec![c(Rank::Two), c(Rank::Three)], true),
            Err(GameError::ExhaustedShoe { .. })
        ));
    }
}
