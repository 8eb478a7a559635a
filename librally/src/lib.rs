//! Core engine for Rally, a two-party state-channel wagering game.
//!
//! Everything in this crate is synchronous and deterministic. The two
//! participants coordinate exclusively by exchanging signed, turn-numbered
//! [`position::Position`]s over a relay; on-chain interaction (funding,
//! disputes, settlement) is delegated to the `rally-chain` crate through the
//! request types the wallet state machines emit.

pub mod amount;
pub mod channel;
pub mod codec;
pub mod commitment;
pub mod crypto;
pub mod game;
pub mod helpers;
pub mod message;
pub mod position;
pub mod resolution;
pub mod wallet;
