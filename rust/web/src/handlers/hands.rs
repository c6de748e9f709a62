use crate::errors::IntoErrorResponse;
use crate::store::{HandStore, StoreError};
use fairhand_engine::types::HandId;
use std::sync::Arc;
use warp::reply::{self, Response};
use warp::Reply;

/// Durable record of a hand seen by the event pipeline.
///
/// # HTTP Method and Path
/// - **Method**: GET
/// - **Path**: `/api/hands/{hand_id}`
///
/// # Error Cases
/// - `hand_not_found` (404): the pipeline has no record of the hand
/// - `storage_error` (500): the store could not be read
pub async fn get_hand(store: Arc<dyn HandStore>, hand_id: HandId) -> Response {
    match store.load_hand(hand_id).await {
        Ok(Some(record)) => reply::json(&record).into_response(),
        Ok(None) => StoreError::UnknownHand(hand_id).into_http_response(),
        Err(err) => err.into_http_response(),
    }
}
