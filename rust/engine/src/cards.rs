use std::fmt;

use serde::{Deserialize, Serialize};

/// Asset path shown for a card dealt face-down.
pub const FACE_DOWN_PATH: &str = "/cards/back.png";

/// Cards in one standard deck.
pub const CARDS_PER_DECK: usize = 52;

/// Represents one of the four suits in a standard 52-card deck.
/// Declaration order is the canonical shoe order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Suit {
    /// Clubs suit (♣)
    Clubs,
    /// Diamonds suit (♦)
    Diamonds,
    /// Hearts suit (♥)
    Hearts,
    /// Spades suit (♠)
    Spades,
}

impl Suit {
    pub fn symbol(self) -> &'static str {
        match self {
            Suit::Clubs => "C",
            Suit::Diamonds => "D",
            Suit::Hearts => "H",
            Suit::Spades => "S",
        }
    }
}

/// Represents the rank of a playing card, Ace through King.
/// Declaration order is the canonical shoe order within a suit.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Rank {
    Ace,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    Ten,
    Jack,
    Queen,
    King,
}

impl Rank {
    /// Blackjack point value with the ace counted high.
    pub fn points(self) -> u32 {
        match self {
            Rank::Ace => 11,
            Rank::Two => 2,
            Rank::Three => 3,
            Rank::Four => 4,
            Rank::Five => 5,
            Rank::Six => 6,
            Rank::Seven => 7,
            Rank::Eight => 8,
            Rank::Nine => 9,
            Rank::Ten | Rank::Jack | Rank::Queen | Rank::King => 10,
        }
    }

    pub fn is_ten_valued(self) -> bool {
        matches!(self, Rank::Ten | Rank::Jack | Rank::Queen | Rank::King)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        }
    }
}

/// Represents a single playing card with a suit and rank.
/// Immutable value type; the shoe, both hands and every result hold copies.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Card {
    /// The suit of the card (Clubs, Diamonds, Hearts, or Spades)
    pub suit: Suit,
    /// The rank of the card (Ace through King)
    pub rank: Rank,
}

impl Card {
    pub const fn new(rank: Rank, suit: Suit) -> Self {
        Self { suit, rank }
    }

    /// Stable asset path for the face-up card, e.g. `/cards/10-H.png`.
    pub fn image_path(&self) -> String {
        format!("/cards/{}-{}.png", self.rank.symbol(), self.suit.symbol())
    }

    /// Hi-Lo counting tag: +1 for 2-6, 0 for 7-9, -1 for tens and aces.
    pub fn hi_lo(&self) -> i32 {
        match self.rank {
            Rank::Two | Rank::Three | Rank::Four | Rank::Five | Rank::Six => 1,
            Rank::Seven | Rank::Eight | Rank::Nine => 0,
            _ => -1,
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.rank.symbol(), self.suit.symbol())
    }
}

/// Display form of a dealt card: visible to the player or still hidden.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "FaceRepr", try_from = "FaceRepr")]
pub enum CardFace {
    Up(Card),
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FaceKind {
    Up,
    Down,
}

// Wire shape: the asset path rides along so clients never derive it themselves.
#[derive(Serialize, Deserialize)]
struct FaceRepr {
    face: FaceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    card: Option<Card>,
    #[serde(default)]
    image: String,
}

impl From<CardFace> for FaceRepr {
    fn from(face: CardFace) -> Self {
        match face {
            CardFace::Up(card) => FaceRepr {
                face: FaceKind::Up,
                card: Some(card),
                image: card.image_path(),
            },
            CardFace::Down => FaceRepr {
                face: FaceKind::Down,
                card: None,
                image: FACE_DOWN_PATH.to_string(),
            },
        }
    }
}

impl TryFrom<FaceRepr> for CardFace {
    type Error = String;

    fn try_from(repr: FaceRepr) -> Result<Self, Self::Error> {
        match (repr.face, repr.card) {
            (FaceKind::Up, Some(card)) => Ok(CardFace::Up(card)),
            (FaceKind::Up, None) => Err("face-up card without a card".to_string()),
            (FaceKind::Down, _) => Ok(CardFace::Down),
        }
    }
}

impl CardFace {
    pub fn is_face_down(&self) -> bool {
        matches!(self, CardFace::Down)
    }

    pub fn image_path(&self) -> String {
        match self {
            CardFace::Up(card) => card.image_path(),
            CardFace::Down => FACE_DOWN_PATH.to_string(),
        }
    }
}

/// Every card face-up, in dealt order.
pub fn face_up(cards: &[Card]) -> Vec<CardFace> {
    cards.iter().copied().map(CardFace::Up).collect()
}

pub fn all_suits() -> [Suit; 4] {
    [Suit::Clubs, Suit::Diamonds, Suit::Hearts, Suit::Spades]
}

pub fn all_ranks() -> [Rank; 13] {
    [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
    ]
}

/// One deck in canonical suit-major, rank-minor order.
pub fn full_deck() -> Vec<Card> {
    let mut v = Vec::with_capacity(CARDS_PER_DECK);
    for &s in &all_suits() {
        for &r in &all_ranks() {
            v.push(Card { suit: s, rank: r });
        }
    }
    v
}

/// Hi-Lo running count over the given cards.
pub fn running_count(cards: &[Card]) -> i32 {
    cards.iter().map(Card::hi_lo).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_deck_is_suit_major_rank_minor() {
        let deck = full_deck();
        assert_eq!(deck.len(), CARDS_PER_DECK);
        assert_eq!(deck[0], Card::new(Rank::Ace, Suit::Clubs));
        assert_eq!(deck[12], Card::new(Rank::King, Suit::Clubs));
        assert_eq!(deck[13], Card::new(Rank::Ace, Suit::Diamonds));
        assert_eq!(deck[51], Card::new(Rank::King, Suit::Spades));
    }

    #[test]
    fn image_paths_match_asset_names() {
        assert_eq!(
            Card::new(Rank::Ten, Suit::Hearts).image_path(),
            "/cards/10-H.png"
        );
        assert_eq!(CardFace::Down.image_path(), FACE_DOWN_PATH);
        assert_eq!(
            CardFace::Up(Card::new(Rank::Ace, Suit::Spades)).image_path(),
            "/cards/A-S.png"
        );
    }

    #[test]
    fn face_serializes_with_image_path() {
        let json = serde_json::to_value(CardFace::Up(Card::new(Rank::Queen, Suit::Clubs)))
            .expect("serialize face");
        assert_eq!(json["face"], "up");
        assert_eq!(json["image"], "/cards/Q-C.png");

        let json = serde_json::to_value(CardFace::Down).expect("serialize face");
        assert_eq!(json["face"], "down");
        assert_eq!(json["image"], FACE_DOWN_PATH);

        let back: CardFace = serde_json::from_value(json).expect("deserialize face");
        assert!(back.is_face_down());
    }

    #[test]
    fn hi_lo_balances_over_a_full_deck() {
        assert_eq!(running_count(&full_deck()), 0);
        assert_eq!(Card::new(Rank::Five, Suit::Hearts).hi_lo(), 1);
        assert_eq!(Card::new(Rank::Eight, Suit::Hearts).hi_lo(), 0);
        assert_eq!(Card::new(Rank::Ace, Suit::Hearts).hi_lo(), -1);
    }
}
