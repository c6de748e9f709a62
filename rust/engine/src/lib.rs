//! # fairhand-engine: Provably Fair Blackjack Core
//!
//! A deterministic blackjack engine for a single table. Every shoe order is
//! derived from an externally supplied seed, so any hand can be replayed and
//! audited from its seed alone.
//!
//! ## Core Modules
//!
//! - [`cards`] - Card representation (Suit, Rank, Card) and face-up/face-down display form
//! - [`deck`] - Multi-deck shoe with the SHA-256 hash-chain shuffle
//! - [`hand`] - Hand value, blackjack and bust checks, dealer policy, settlement
//! - [`phase`] - Hand lifecycle phases and the legal transition table
//! - [`engine`] - The lock-guarded table session driving one hand at a time
//! - [`resolve`] - Seed-only resolution used by the event pipeline
//! - [`rules`] - House rules, fees and bet validation
//! - [`types`] - Hand ids, addresses, seeds and amounts
//! - [`errors`] - Error types for game operations
//!
//! ## Quick Start
//!
//! ```rust
//! use fairhand_engine::cards::{Card, Rank, Suit};
//! use fairhand_engine::hand::{evaluate_outcome, hand_value, Outcome};
//!
//! let player = [
//!     Card::new(Rank::Ace, Suit::Spades),
//!     Card::new(Rank::King, Suit::Hearts),
//! ];
//! let dealer = [
//!     Card::new(Rank::Nine, Suit::Clubs),
//!     Card::new(Rank::Seven, Suit::Diamonds),
//! ];
//!
//! assert_eq!(hand_value(&player).total, 21);
//! assert_eq!(evaluate_outcome(&player, &dealer, 100, 15_000), (Outcome::Win, 150));
//! ```
//!
//! ## Deterministic Shuffling
//!
//! The same seed always yields the same shoe:
//!
//! ```rust
//! use fairhand_engine::deck::Deck;
//!
//! let mut a = Deck::new(7).unwrap();
//! let mut b = Deck::new(7).unwrap();
//! a.shuffle(b"round-42");
//! b.shuffle(b"round-42");
//! assert_eq!(a.cards(), b.cards());
//! ```

pub mod cards;
pub mod deck;
pub mod engine;
pub mod errors;
pub mod hand;
pub mod phase;
pub mod resolve;
pub mod rules;
pub mod types;
