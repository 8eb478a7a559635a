//! The per-player game engines.
//!
//! Two independent, single-threaded state machines, one per player role,
//! coordinating only through exchanged positions. Each operation runs to
//! completion and returns the (possibly unchanged) next engine. Illegal
//! inputs (a call from the wrong state, a position with the wrong phase or
//! a non-consecutive turn number, a channel mismatch) are absorbed as
//! no-ops, never errors.
//!
//! The driving loop's contract after every operation:
//! - [`AEngine::outbound_position`] / [`BEngine::outbound_position`] holds a
//!   position to sign and send; call `message_sent` once it is dispatched.
//! - [`AEngine::pending_funding_action`] / [`BEngine::pending_funding_action`]
//!   holds a chain action to hand to the wallet; call `transaction_sent`
//!   once it has been broadcast.

mod player_a;
mod player_b;
mod result;

pub use player_a::{AEngine, PlayerAState};
pub use player_b::{BEngine, PlayerBState};
pub use result::{calculate_result, settle, GameResult};

use crate::amount::TokenAmount;
use crate::crypto::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A chain-facing request emitted by a funding-phase state, serviced by the
/// wallet's funding machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingAction {
    /// Deploy the adjudicator, funding A's share in the same transaction.
    Deploy { value: TokenAmount },
    /// Deposit B's share into the deployed adjudicator.
    Deposit { adjudicator: Address, value: TokenAmount },
}

/// Chain events the engines consume during the funding phase, forwarded from
/// the on-chain event service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// The adjudicator contract is live at this address.
    DeployConfirmed { adjudicator: Address },
    /// The adjudicator's holdings for this channel changed.
    FundsReceived { destination_holdings: TokenAmount },
}

/// Rejected `setup_game` preconditions. These are caller errors at
/// construction time, not transition guards.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GameSetupError {
    #[error("The stake must be greater than zero")]
    ZeroStake,
}

pub(crate) fn check_setup(stake: TokenAmount) -> Result<(), GameSetupError> {
    if stake.is_zero() {
        return Err(GameSetupError::ZeroStake);
    }
    Ok(())
}
