use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cards::{face_up, Card, CardFace, CARDS_PER_DECK};
use crate::deck::Deck;
use crate::errors::GameError;
use crate::hand::{
    dealer_play, evaluate_outcome, hand_value, is_blackjack, is_bust, HandValue, Outcome,
};
use crate::phase::{validate_transition, Phase};
use crate::resolve::deal_initial;
use crate::rules::{validate_bet, FeeBreakdown, TableRules};
use crate::types::{amount_str, Address, Amount, HandId};

/// Card-counting figures shown next to the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CountingInfo {
    pub running_count: i32,
    /// Running count per deck still in the shoe.
    pub true_count: f64,
    /// Share of the shoe already dealt, 0-100.
    pub shoe_pct: u32,
}

/// Betting guide-rails displayed to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLimits {
    #[serde(with = "amount_str")]
    pub anchor: Amount,
    pub spread: u32,
    pub growth_cap_bps: u32,
    #[serde(with = "amount_str")]
    pub table_min: Amount,
    #[serde(with = "amount_str")]
    pub table_max: Amount,
    #[serde(with = "amount_str")]
    pub last_bet: Amount,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            anchor: 100,
            spread: 4,
            growth_cap_bps: 3300,
            table_min: 5,
            table_max: 5000,
            last_bet: 0,
        }
    }
}

/// Everything a client may know about the hand in progress.
///
/// The dealer's raw cards never leave the process: while the hole card is
/// hidden only `dealer_hand` (the display form) is serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub phase: Phase,
    pub phase_detail: String,
    pub hand_id: Option<HandId>,
    pub player: Option<Address>,
    pub token: Option<Address>,
    #[serde(with = "amount_str")]
    pub bet_amount: Amount,
    pub deck_initialized: bool,
    pub cards_dealt: usize,
    pub total_cards: usize,
    #[serde(skip_serializing, default)]
    pub dealer_cards: Vec<Card>,
    pub player_cards: Vec<Card>,
    pub dealer_hand: Vec<CardFace>,
    pub player_hand: Vec<CardFace>,
    pub outcome: Option<Outcome>,
    #[serde(with = "amount_str")]
    pub payout: Amount,
    pub fees: FeeBreakdown,
    pub counting: CountingInfo,
    pub limits: TableLimits,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl EngineState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            phase: Phase::WaitingForDeal,
            phase_detail: "Waiting for a bet".to_string(),
            hand_id: None,
            player: None,
            token: None,
            bet_amount: 0,
            deck_initialized: false,
            cards_dealt: 0,
            total_cards: 0,
            dealer_cards: Vec::new(),
            player_cards: Vec::new(),
            dealer_hand: Vec::new(),
            player_hand: Vec::new(),
            outcome: None,
            payout: 0,
            fees: FeeBreakdown::default(),
            counting: CountingInfo::default(),
            limits: TableLimits::default(),
            created_at: now,
            last_updated: now,
        }
    }

    pub fn player_value(&self) -> HandValue {
        hand_value(&self.player_cards)
    }

    /// Hi-Lo count over the cards currently face-up on the table.
    pub fn visible_running_count(&self) -> i32 {
        self.dealer_hand
            .iter()
            .chain(self.player_hand.iter())
            .map(|face| match face {
                CardFace::Up(card) => card.hi_lo(),
                CardFace::Down => 0,
            })
            .sum()
    }

    fn require(&self, expected: Phase, operation: &'static str) -> Result<(), GameError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(GameError::InvalidPhase {
                operation,
                phase: self.phase,
                expected: expected.as_str(),
            })
        }
    }

    fn advance(&mut self, to: Phase, detail: &str) -> Result<(), GameError> {
        validate_transition(self.phase, to)?;
        tracing::debug!(hand_id = ?self.hand_id, from = %self.phase, to = %to, "phase transition");
        self.phase = to;
        self.phase_detail = detail.to_string();
        self.last_updated = Utc::now();
        Ok(())
    }

    fn show_hole_card(&mut self) {
        self.dealer_hand = face_up(&self.dealer_cards);
    }

    fn sync_shoe(&mut self, shoe: &Deck) {
        self.deck_initialized = true;
        self.cards_dealt = shoe.dealt();
        self.total_cards = shoe.len();
    }
}

#[derive(Debug, Clone)]
struct Table {
    state: EngineState,
    shoe: Option<Deck>,
}

impl Table {
    fn shoe_mut(&mut self) -> Result<&mut Deck, GameError> {
        // Every phase past SHUFFLING owns a shoe; a missing one means the
        // shoe was never built, which reads as an empty shoe.
        self.shoe.as_mut().ok_or(GameError::ExhaustedShoe { dealt: 0, total: 0 })
    }
}

/// The table session: one in-flight hand behind a read-write lock.
///
/// Every mutating operation holds the write lock for its whole duration and
/// works on a copy that is committed only on success, so a failed operation
/// leaves the session untouched and readers never see a half-applied step.
///
/// # Examples
///
/// ```
/// use fairhand_engine::engine::TableEngine;
/// use fairhand_engine::phase::Phase;
/// use fairhand_engine::rules::TableRules;
/// use fairhand_engine::types::Address;
///
/// let table = TableEngine::new(TableRules::default()).unwrap();
/// table.start_hand(1, Address([1; 20]), Address([2; 20]), 100).unwrap();
/// let state = table.shuffle_and_deal(&[0u8; 32]).unwrap();
/// assert_eq!(state.phase, Phase::PlayerTurn);
/// assert!(state.dealer_hand[1].is_face_down());
/// ```
#[derive(Debug)]
pub struct TableEngine {
    rules: TableRules,
    table: RwLock<Table>,
}

impl TableEngine {
    pub fn new(rules: TableRules) -> Result<Self, GameError> {
        rules.validate()?;
        Ok(Self {
            rules,
            table: RwLock::new(Table {
                state: EngineState::new(Utc::now()),
                shoe: None,
            }),
        })
    }

    pub fn rules(&self) -> &TableRules {
        &self.rules
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Table>, GameError> {
        self.table.read().map_err(|_| GameError::StatePoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Table>, GameError> {
        self.table.write().map_err(|_| GameError::StatePoisoned)
    }

    /// Applies `step` to a copy of the table and commits it only if it succeeds.
    fn mutate<F>(&self, step: F) -> Result<EngineState, GameError>
    where
        F: FnOnce(&mut Table) -> Result<(), GameError>,
    {
        let mut guard = self.write()?;
        let mut next = guard.clone();
        step(&mut next)?;
        let snapshot = next.state.clone();
        *guard = next;
        Ok(snapshot)
    }

    /// Copy of the whole session.
    pub fn state(&self) -> Result<EngineState, GameError> {
        Ok(self.read()?.state.clone())
    }

    /// Back to the initial waiting state. Limits and the creation time survive.
    pub fn reset(&self) -> Result<EngineState, GameError> {
        self.mutate(|table| {
            let fresh = EngineState {
                created_at: table.state.created_at,
                limits: table.state.limits,
                ..EngineState::new(Utc::now())
            };
            table.state = fresh;
            table.shoe = None;
            tracing::info!("table reset");
            Ok(())
        })
    }

    pub fn start_hand(
        &self,
        hand_id: HandId,
        player: Address,
        token: Address,
        bet_amount: Amount,
    ) -> Result<EngineState, GameError> {
        self.mutate(|table| {
            let phase = table.state.phase;
            if !phase.accepts_new_hand() {
                return Err(GameError::InvalidPhase {
                    operation: "start a hand",
                    phase,
                    expected: "WAITING_FOR_DEAL or COMPLETE",
                });
            }
            validate_bet(bet_amount)?;

            let previous = &table.state;
            let mut state = EngineState {
                phase,
                created_at: previous.created_at,
                counting: previous.counting,
                limits: TableLimits {
                    last_bet: bet_amount,
                    ..previous.limits
                },
                ..EngineState::new(Utc::now())
            };
            state.hand_id = Some(hand_id);
            state.player = Some(player);
            state.token = Some(token);
            state.bet_amount = bet_amount;
            state.advance(Phase::Shuffling, "Shuffling the shoe")?;

            table.state = state;
            table.shoe = None;
            tracing::info!(hand_id, %player, bet = %bet_amount, "hand started");
            Ok(())
        })
    }

    /// Builds a fresh shoe, shuffles it with `seed` and deals two cards each.
    /// A natural on either side reveals the hole card and skips the player's turn.
    pub fn shuffle_and_deal(&self, seed: &[u8]) -> Result<EngineState, GameError> {
        let rules = &self.rules;
        self.mutate(|table| {
            table.state.require(Phase::Shuffling, "shuffle and deal")?;

            let mut shoe = Deck::new(rules.num_decks)?;
            shoe.shuffle(seed);
            let state = &mut table.state;
            state.advance(Phase::Dealing, "Dealing")?;

            let deal = deal_initial(&mut shoe)?;
            state.dealer_hand = vec![CardFace::Up(deal.dealer[0]), CardFace::Down];
            state.player_hand = face_up(&deal.player);
            state.dealer_cards = deal.dealer.clone();
            state.player_cards = deal.player.clone();
            state.sync_shoe(&shoe);

            if deal.has_natural() {
                state.show_hole_card();
                state.advance(Phase::Resolution, "Blackjack")?;
            } else {
                state.advance(Phase::PlayerTurn, "Hit or stand")?;
            }
            tracing::info!(
                hand_id = ?state.hand_id,
                phase = %state.phase,
                player_total = state.player_value().total,
                "cards dealt"
            );
            table.shoe = Some(shoe);
            Ok(())
        })
    }

    pub fn player_hit(&self) -> Result<EngineState, GameError> {
        self.mutate(|table| {
            table.state.require(Phase::PlayerTurn, "hit")?;
            let card = table.shoe_mut()?.deal()?;
            let dealt = table.shoe_mut()?.dealt();
            let state = &mut table.state;
            state.player_cards.push(card);
            state.player_hand.push(CardFace::Up(card));
            state.cards_dealt = dealt;

            if is_bust(&state.player_cards) {
                state.show_hole_card();
                state.advance(Phase::Resolution, "Player busts")?;
            }
            tracing::debug!(
                hand_id = ?state.hand_id,
                card = %card,
                player_total = state.player_value().total,
                "player hit"
            );
            Ok(())
        })
    }

    pub fn player_stand(&self) -> Result<EngineState, GameError> {
        self.mutate(|table| {
            let state = &mut table.state;
            state.require(Phase::PlayerTurn, "stand")?;
            state.show_hole_card();
            state.advance(Phase::DealerTurn, "Dealer plays")?;
            Ok(())
        })
    }

    pub fn dealer_play(&self) -> Result<EngineState, GameError> {
        let hit_soft_17 = self.rules.hit_soft_17;
        self.mutate(|table| {
            table.state.require(Phase::DealerTurn, "play the dealer hand")?;
            let opening = table.state.dealer_cards.clone();
            let shoe = table.shoe_mut()?;
            let dealer = dealer_play(shoe, opening, hit_soft_17)?;
            let dealt = shoe.dealt();

            let state = &mut table.state;
            state.dealer_cards = dealer;
            state.show_hole_card();
            state.cards_dealt = dealt;
            state.advance(Phase::Resolution, "Resolving")?;
            tracing::debug!(
                hand_id = ?state.hand_id,
                dealer_total = hand_value(&state.dealer_cards).total,
                "dealer stands"
            );
            Ok(())
        })
    }

    pub fn resolve_hand(&self) -> Result<EngineState, GameError> {
        let rules = &self.rules;
        self.mutate(|table| {
            let state = &mut table.state;
            state.require(Phase::Resolution, "resolve the hand")?;
            let (outcome, payout) = evaluate_outcome(
                &state.player_cards,
                &state.dealer_cards,
                state.bet_amount,
                rules.blackjack_payout_bps,
            );
            state.outcome = Some(outcome);
            state.payout = payout;
            state.fees = rules.fees_for(state.bet_amount);
            state.show_hole_card();

            let detail = match outcome {
                Outcome::Win if is_blackjack(&state.player_cards) => "Blackjack pays",
                Outcome::Win => "Player wins",
                Outcome::Lose => "Dealer wins",
                Outcome::Push => "Push",
            };
            state.advance(Phase::Complete, detail)?;
            tracing::info!(
                hand_id = ?state.hand_id,
                %outcome,
                payout = %payout,
                "hand complete"
            );
            Ok(())
        })
    }

    /// Display-only counting update; legal in every phase.
    pub fn update_counting(&self, running_count: i32) -> Result<EngineState, GameError> {
        self.mutate(|table| {
            let (dealt, total) = table
                .shoe
                .as_ref()
                .map(|shoe| (shoe.dealt(), shoe.len()))
                .unwrap_or((0, 0));
            let remaining = total.saturating_sub(dealt);
            let decks_left = remaining as f64 / CARDS_PER_DECK as f64;

            let counting = &mut table.state.counting;
            counting.running_count = running_count;
            counting.true_count = if decks_left > 0.0 {
                running_count as f64 / decks_left
            } else {
                running_count as f64
            };
            counting.shoe_pct = if total > 0 {
                (dealt * 100 / total) as u32
            } else {
                0
            };
            table.state.last_updated = Utc::now();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{Rank, Suit};

    fn table() -> TableEngine {
        TableEngine::new(TableRules::default()).expect("table")
    }

    fn start(table: &TableEngine) {
        table
            .start_hand(7, Address([1; 20]), Address([2; 20]), 1_000)
            .expect("start hand");
    }

    #[test]
    fn starts_waiting_for_deal() {
        let state = table().state().expect("state");
        assert_eq!(state.phase, Phase::WaitingForDeal);
        assert!(!state.deck_initialized);
        assert_eq!(state.limits, TableLimits::default());
    }

    #[test]
    fn second_hand_is_rejected_while_one_is_active() {
        let table = table();
        start(&table);
        let err = table
            .start_hand(8, Address([1; 20]), Address([2; 20]), 1_000)
            .unwrap_err();
        assert!(matches!(
            err,
            GameError::InvalidPhase {
                phase: Phase::Shuffling,
                ..
            }
        ));
        assert_eq!(table.state().expect("state").hand_id, Some(7));
    }

    #[test]
    fn zero_bet_is_rejected_without_mutation() {
        let table = table();
        let before = table.state().expect("state");
        assert!(matches!(
            table.start_hand(1, Address::default(), Address::default(), 0),
            Err(GameError::InvalidBet(_))
        ));
        assert_eq!(table.state().expect("state"), before);
    }

    #[test]
    fn deal_hides_hole_card_until_stand() {
        let table = table();
        start(&table);
        let dealt = table.shuffle_and_deal(&[0u8; 32]).expect("deal");
        assert_eq!(dealt.phase, Phase::PlayerTurn);
        assert!(dealt.dealer_hand[1].is_face_down());
        assert_eq!(dealt.cards_dealt, 4);
        assert_eq!(dealt.total_cards, 7 * 52);

        let json = serde_json::to_value(&dealt).expect("serialize");
        assert!(json.get("dealer_cards").is_none());

        let stood = table.player_stand().expect("stand");
        assert_eq!(stood.phase, Phase::DealerTurn);
        assert!(stood.dealer_hand.iter().all(|c| !c.is_face_down()));
    }

    #[test]
    fn counting_uses_shoe_depth() {
        let table = table();
        let idle = table.update_counting(3).expect("counting");
        assert_eq!(idle.counting.running_count, 3);
        assert_eq!(idle.counting.shoe_pct, 0);

        start(&table);
        table.shuffle_and_deal(&[0u8; 32]).expect("deal");
        let state = table.update_counting(6).expect("counting");
        // 360 cards left = 6.92 decks
        assert!((state.counting.true_count - 6.0 / (360.0 / 52.0)).abs() < 1e-9);
        assert_eq!(state.counting.shoe_pct, 1);
    }

    #[test]
    fn visible_count_ignores_hole_card() {
        let mut state = EngineState::new(Utc::now());
        state.dealer_hand = vec![
            CardFace::Up(Card::new(Rank::Five, Suit::Clubs)),
            CardFace::Down,
        ];
        state.player_hand = face_up(&[
            Card::new(Rank::Two, Suit::Hearts),
            Card::new(Rank::King, Suit::Hearts),
        ]);
        assert_eq!(state.visible_running_count(), 1);
    }

    #[test]
    fn reset_keeps_creation_time() {
        let table = table();
        let created = table.state().expect("state").created_at;
        start(&table);
        let state = table.reset().expect("reset");
        assert_eq!(state.phase, Phase::WaitingForDeal);
        assert_eq!(state.hand_id, None);
        assert_eq!(state.created_at, created);
    }
}
