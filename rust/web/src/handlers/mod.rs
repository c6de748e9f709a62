pub mod engine;
pub mod hands;
pub mod health;

pub use engine::{
    deal, dealer_play, get_state, hit, reset, resolve, stand, start_hand, update_counting,
    CountingRequest, DealRequest, StartHandRequest,
};
pub use hands::get_hand;
pub use health::health;
