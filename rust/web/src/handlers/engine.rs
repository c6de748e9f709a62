//! Thin adapters from HTTP requests onto the table session's entry points.
//! No game logic lives here; every rule is enforced by [`TableEngine`].

use crate::errors::IntoErrorResponse;
use fairhand_engine::engine::{EngineState, TableEngine};
use fairhand_engine::errors::GameError;
use fairhand_engine::types::{amount_str, Address, Amount, HandId, Seed};
use serde::Deserialize;
use std::sync::Arc;
use warp::reply::{self, Response};
use warp::Reply;

#[derive(Debug, Deserialize)]
pub struct StartHandRequest {
    pub hand_id: HandId,
    pub player: Address,
    pub token: Address,
    #[serde(with = "amount_str")]
    pub amount: Amount,
}

#[derive(Debug, Default, Deserialize)]
pub struct DealRequest {
    /// Hex seed; a fresh random one is drawn when omitted.
    #[serde(default)]
    pub seed: Option<Seed>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CountingRequest {
    /// Defaults to the hi-lo count of the cards currently visible.
    #[serde(default)]
    pub running_count: Option<i32>,
}

fn respond(result: Result<EngineState, GameError>) -> Response {
    match result {
        Ok(state) => reply::json(&state).into_response(),
        Err(err) => err.into_http_response(),
    }
}

/// Snapshot of the table.
///
/// # HTTP Method and Path
/// - **Method**: GET
/// - **Path**: `/api/engine/state`
///
/// # Response Format
/// - **Success (200 OK)**: the `EngineState` as JSON. Amounts are decimal
///   strings and the dealer's hole card is reported face down until revealed.
/// - **Error (500)**: `state_poisoned` if a writer panicked mid-update
pub async fn get_state(engine: Arc<TableEngine>) -> Response {
    respond(engine.state())
}

/// Opens a hand for `player` and moves the table to SHUFFLING.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/engine/bet`
///
/// # Request Format
/// ```json
/// {
///   "hand_id": 7,
///   "player": "0x…20 bytes…",
///   "token": "0x…20 bytes…",
///   "amount": "1000000"
/// }
/// ```
///
/// # Error Cases
/// - `invalid_phase` (409): a hand is already in progress
/// - `invalid_bet` (400): zero amount
pub async fn start_hand(engine: Arc<TableEngine>, request: StartHandRequest) -> Response {
    respond(engine.start_hand(
        request.hand_id,
        request.player,
        request.token,
        request.amount,
    ))
}

/// Shuffles a fresh shoe with the given seed and deals the opening cards.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/engine/deal`
///
/// # Error Cases
/// - `invalid_phase` (409): no hand has been opened
pub async fn deal(engine: Arc<TableEngine>, request: DealRequest) -> Response {
    let seed = request.seed.unwrap_or_else(Seed::generate);
    tracing::debug!(%seed, "dealing with seed");
    respond(engine.shuffle_and_deal(seed.as_bytes()))
}

pub async fn hit(engine: Arc<TableEngine>) -> Response {
    respond(engine.player_hit())
}

pub async fn stand(engine: Arc<TableEngine>) -> Response {
    respond(engine.player_stand())
}

pub async fn dealer_play(engine: Arc<TableEngine>) -> Response {
    respond(engine.dealer_play())
}

pub async fn resolve(engine: Arc<TableEngine>) -> Response {
    respond(engine.resolve_hand())
}

pub async fn reset(engine: Arc<TableEngine>) -> Response {
    respond(engine.reset())
}

/// Stores a running count for the counting display.
///
/// # HTTP Method and Path
/// - **Method**: POST
/// - **Path**: `/api/engine/counting`
pub async fn update_counting(engine: Arc<TableEngine>, request: CountingRequest) -> Response {
    let running_count = match request.running_count {
        Some(count) => count,
        None => match engine.state() {
            Ok(state) => state.visible_running_count(),
            Err(err) => return err.into_http_response(),
        },
    };
    respond(engine.update_counting(running_count))
}
