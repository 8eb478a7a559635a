use crate::amount::TokenAmount;
use crate::channel::Channel;
use crate::commitment::{PreCommit, Salt};
use crate::resolution::Resolution;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One of the three plays in a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Play {
    Rock,
    Paper,
    Scissors,
}

impl Play {
    pub const fn as_u8(&self) -> u8 {
        match self {
            Play::Rock => 0,
            Play::Paper => 1,
            Play::Scissors => 2,
        }
    }

    pub const fn from_u8(value: u8) -> Option<Play> {
        match value {
            0 => Some(Play::Rock),
            1 => Some(Play::Paper),
            2 => Some(Play::Scissors),
            _ => None,
        }
    }
}

impl Display for Play {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Play::Rock => write!(f, "Rock"),
            Play::Paper => write!(f, "Paper"),
            Play::Scissors => write!(f, "Scissors"),
        }
    }
}

/// The round data carried by a `Game`-phase position.
///
/// A round is one Propose/Accept/Reveal cycle bracketed by `Resting`
/// positions. The stake is repeated on every round position so the
/// adjudicator can validate a transition from the position pair alone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameRound {
    /// Between rounds; the last round (if any) has settled.
    Resting { stake: TokenAmount },
    /// A has committed to a hidden play and provisionally staked.
    Propose { stake: TokenAmount, pre_commit: PreCommit },
    /// B has answered with an open play, mirroring the provisional stake.
    Accept { stake: TokenAmount, pre_commit: PreCommit, b_play: Play },
    /// A has opened the commitment; the resolution reflects the result.
    Reveal { stake: TokenAmount, b_play: Play, a_play: Play, salt: Salt },
}

impl GameRound {
    pub fn stake(&self) -> TokenAmount {
        match self {
            GameRound::Resting { stake }
            | GameRound::Propose { stake, .. }
            | GameRound::Accept { stake, .. }
            | GameRound::Reveal { stake, .. } => *stake,
        }
    }
}

/// Which phase of the channel a position belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateKind {
    PreFundSetup,
    PostFundSetup,
    Game(GameRound),
    Conclude,
}

impl StateKind {
    pub fn game_round(&self) -> Option<&GameRound> {
        match self {
            StateKind::Game(round) => Some(round),
            _ => None,
        }
    }
}

/// A signed, turn-numbered snapshot of channel state.
///
/// Positions are exchanged as fixed-layout hex strings (see [`crate::codec`])
/// so that either party can replay them to the on-chain adjudicator
/// unchanged. Every accepted position's `turn_num` is exactly one greater
/// than its predecessor's.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub channel: Channel,
    pub turn_num: u64,
    pub state: StateKind,
    pub resolution: Resolution,
    pub state_count: u64,
}

impl Position {
    pub fn pre_fund_setup(channel: Channel, turn_num: u64, resolution: Resolution, state_count: u64) -> Self {
        Position { channel, turn_num, state: StateKind::PreFundSetup, resolution, state_count }
    }

    pub fn post_fund_setup(channel: Channel, turn_num: u64, resolution: Resolution, state_count: u64) -> Self {
        Position { channel, turn_num, state: StateKind::PostFundSetup, resolution, state_count }
    }

    pub fn game(channel: Channel, turn_num: u64, resolution: Resolution, round: GameRound) -> Self {
        Position { channel, turn_num, state: StateKind::Game(round), resolution, state_count: 0 }
    }

    pub fn conclude(channel: Channel, turn_num: u64, resolution: Resolution) -> Self {
        Position { channel, turn_num, state: StateKind::Conclude, resolution, state_count: 0 }
    }

    pub fn is_conclude(&self) -> bool {
        matches!(self.state, StateKind::Conclude)
    }

    pub fn game_round(&self) -> Option<&GameRound> {
        self.state.game_round()
    }

    /// Build the `Conclude` position that follows this one, carrying the
    /// resolution forward unchanged.
    pub fn next_conclude(&self) -> Position {
        Position::conclude(self.channel, self.turn_num + 1, self.resolution)
    }
}

/// The shared guard for accepting a peer position: it must be the very next
/// turn on the very same channel. Anything else is dropped silently, since
/// peers legitimately retransmit and race.
pub fn valid_transition(last: &Position, candidate: &Position) -> bool {
    candidate.channel == last.channel && candidate.turn_num == last.turn_num + 1
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Address;

    fn channel() -> Channel {
        Channel::new(Address::new([1; 20]), 7, [Address::new([2; 20]), Address::new([3; 20])])
    }

    #[test]
    fn valid_transition_checks_turn_and_channel() {
        let resolution = Resolution::new(5u64, 4u64);
        let last = Position::pre_fund_setup(channel(), 0, resolution, 0);
        let next = Position::pre_fund_setup(channel(), 1, resolution, 1);
        assert!(valid_transition(&last, &next));

        let skipped = Position::pre_fund_setup(channel(), 2, resolution, 1);
        assert!(!valid_transition(&last, &skipped));

        let other_channel = Channel::new(Address::new([9; 20]), 7, *channel().participants());
        let wrong = Position::pre_fund_setup(other_channel, 1, resolution, 1);
        assert!(!valid_transition(&last, &wrong));
    }

    #[test]
    fn next_conclude_carries_resolution() {
        let last = Position::game(
            channel(),
            7,
            Resolution::new(6u64, 3u64),
            GameRound::Resting { stake: TokenAmount::new(1) },
        );
        let conclude = last.next_conclude();
        assert_eq!(conclude.turn_num, 8);
        assert!(conclude.is_conclude());
        assert_eq!(conclude.resolution, last.resolution);
    }

    #[test]
    fn play_codes() {
        for play in [Play::Rock, Play::Paper, Play::Scissors] {
            assert_eq!(Play::from_u8(play.as_u8()), Some(play));
        }
        assert_eq!(Play::from_u8(3), None);
    }
}
