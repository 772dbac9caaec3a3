//! Types shared by the game server and its clients: the card deck and the
//! JSON wire protocol.

pub mod deck;
pub mod protocol;

pub use deck::{common_symbol, deck_size, generate_deck, Card, Symbol};
pub use protocol::{Packet, PlayerInfo, PlayerView, TableView};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Deck order used for regular games: 57 cards with 8 symbols each.
pub const DEFAULT_DECK_ORDER: u32 = 7;
/// Extra cards discarded when a player wins on their own avatar symbol.
pub const BONUS_DISCARDS: usize = 3;

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn timestamp_nanos() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_nanos();
    (nanos.min(i64::MAX as u128)) as i64
}
