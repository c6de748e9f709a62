use sha2::{Digest, Sha256};

use crate::cards::{full_deck, Card, CARDS_PER_DECK};
use crate::errors::GameError;

/// Deterministic integer stream expanded from a seed by chained SHA-256.
///
/// The initial state is `sha256(seed)`. Each draw consumes four state bytes as a
/// big-endian `u32`; once fewer than four bytes remain the state is replaced by
/// `sha256(state)`. Changing any of this changes every historical shuffle.
#[derive(Debug, Clone)]
pub struct SeedStream {
    state: [u8; 32],
    pos: usize,
}

impl SeedStream {
    pub fn new(seed: &[u8]) -> Self {
        Self {
            state: Sha256::digest(seed).into(),
            pos: 0,
        }
    }

    /// Next value in `[0, max)`. Plain modulo reduction; slightly biased when
    /// `max` does not divide 2^32.
    pub fn next_below(&mut self, max: u32) -> u32 {
        debug_assert!(max > 0);
        if self.pos + 4 > self.state.len() {
            self.state = Sha256::digest(self.state).into();
            self.pos = 0;
        }
        let word = [
            self.state[self.pos],
            self.state[self.pos + 1],
            self.state[self.pos + 2],
            self.state[self.pos + 3],
        ];
        self.pos += 4;
        u32::from_be_bytes(word) % max
    }
}

/// A shoe of one or more decks plus the draw cursor.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
    position: usize,
}

impl Deck {
    /// `num_decks` standard decks in canonical order. No randomness is involved.
    pub fn new(num_decks: usize) -> Result<Self, GameError> {
        if num_decks == 0 {
            return Err(GameError::InvalidDeckCount(num_decks));
        }
        let mut cards = Vec::with_capacity(num_decks * CARDS_PER_DECK);
        for _ in 0..num_decks {
            cards.extend(full_deck());
        }
        Ok(Self { cards, position: 0 })
    }

    /// Fisher-Yates from the last index down to 1, driven by [`SeedStream`].
    /// Resets the draw cursor.
    pub fn shuffle(&mut self, seed: &[u8]) {
        let mut stream = SeedStream::new(seed);
        for i in (1..self.cards.len()).rev() {
            let j = stream.next_below((i + 1) as u32) as usize;
            self.cards.swap(i, j);
        }
        self.position = 0;
    }

    pub fn deal(&mut self) -> Result<Card, GameError> {
        let card = self
            .cards
            .get(self.position)
            .copied()
            .ok_or(GameError::ExhaustedShoe {
                dealt: self.position,
                total: self.cards.len(),
            })?;
        self.position += 1;
        Ok(card)
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn dealt(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.position)
    }
}
