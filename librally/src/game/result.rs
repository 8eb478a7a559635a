use crate::amount::TokenAmount;
use crate::position::Play;
use crate::resolution::Resolution;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The outcome of one round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    AWon,
    BWon,
    Tie,
}

impl Display for GameResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameResult::AWon => write!(f, "A won"),
            GameResult::BWon => write!(f, "B won"),
            GameResult::Tie => write!(f, "Tie"),
        }
    }
}

/// Decide a round: `d = (a_play - b_play + 2) mod 3`; 0 means A won,
/// 1 means B won, 2 a tie.
pub fn calculate_result(a_play: Play, b_play: Play) -> GameResult {
    let d = (a_play.as_u8() + 5 - b_play.as_u8()) % 3;
    match d {
        0 => GameResult::AWon,
        1 => GameResult::BWon,
        _ => GameResult::Tie,
    }
}

/// Settle a round against its pre-round resolution.
///
/// The provisional Propose/Accept shift already moved the stake from A to B;
/// settlement works from the pre-round balances instead of adjusting that
/// shift: a tie restores them, a B win re-applies the shift, an A win moves
/// the stake the other way.
pub fn settle(result: GameResult, pre_round: Resolution, stake: TokenAmount) -> Option<Resolution> {
    match result {
        GameResult::Tie => Some(pre_round),
        GameResult::BWon => pre_round.shift_to_b(stake),
        GameResult::AWon => pre_round.shift_to_a(stake),
    }
}
