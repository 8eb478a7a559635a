//! The fixed-layout hex codec for [`Position`]s.
//!
//! A position is signed, transmitted, and replayed on-chain as a single
//! `0x`-prefixed hex string. Fields are big-endian and left-padded to fixed
//! widths, concatenated in a fixed order:
//!
//! channel header: adjudicator type (20 bytes), channel nonce (32),
//! participant count (32), participant A (20), participant B (20);
//! state header: state type (32), turn number (32), state count (32),
//! resolution A (32), resolution B (32);
//! game suffix (present only for `Game` positions): position type (32),
//! stake (32), pre-commit (32), B's play (32), A's play (32), salt (32).
//! Suffix fields the round phase does not use are zero-filled.
//!
//! The codec performs no signature checks, and `decode(encode(p)) == p` for
//! every valid position.

use crate::amount::TokenAmount;
use crate::channel::Channel;
use crate::commitment::{PreCommit, Salt};
use crate::crypto::Address;
use crate::position::{GameRound, Play, Position, StateKind};
use crate::resolution::Resolution;
use std::fmt::Write as _;
use thiserror::Error;

const WORD: usize = 64; // hex chars in a 32-byte field
const ADDRESS: usize = 40; // hex chars in a 20-byte field

const STATE_PRE_FUND_SETUP: u64 = 0;
const STATE_POST_FUND_SETUP: u64 = 1;
const STATE_GAME: u64 = 2;
const STATE_CONCLUDE: u64 = 3;

const POSITION_RESTING: u64 = 0;
const POSITION_PROPOSE: u64 = 1;
const POSITION_ACCEPT: u64 = 2;
const POSITION_REVEAL: u64 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Position hex must be 0x-prefixed")]
    MissingPrefix,
    #[error("Position hex is truncated at field `{0}`")]
    Truncated(&'static str),
    #[error("Field `{0}` is not valid hex")]
    InvalidHex(&'static str),
    #[error("Field `{0}` does not fit in 64 bits")]
    FieldOverflow(&'static str),
    #[error("A channel must have exactly 2 participants, got {0}")]
    InvalidParticipantCount(u64),
    #[error("Unrecognized position: {0}")]
    UnrecognizedPosition(String),
    #[error("Unexpected trailing data after position")]
    TrailingData,
}

/// Encode a position to its fixed-layout hex string.
pub fn encode(position: &Position) -> String {
    let mut out = String::with_capacity(2 + 952);
    out.push_str("0x");
    push_address(&mut out, &position.channel.adjudicator_type());
    push_u64(&mut out, position.channel.nonce());
    push_u64(&mut out, 2);
    push_address(&mut out, &position.channel.participants()[0]);
    push_address(&mut out, &position.channel.participants()[1]);
    push_u64(&mut out, state_type_code(&position.state));
    push_u64(&mut out, position.turn_num);
    push_u64(&mut out, position.state_count);
    push_u64(&mut out, position.resolution.a.to_units());
    push_u64(&mut out, position.resolution.b.to_units());

    if let StateKind::Game(round) = &position.state {
        push_u64(&mut out, position_type_code(round));
        push_u64(&mut out, round.stake().to_units());
        match round {
            GameRound::Resting { .. } => {
                push_zero_words(&mut out, 4);
            }
            GameRound::Propose { pre_commit, .. } => {
                push_bytes32(&mut out, pre_commit.as_bytes());
                push_zero_words(&mut out, 3);
            }
            GameRound::Accept { pre_commit, b_play, .. } => {
                push_bytes32(&mut out, pre_commit.as_bytes());
                push_u64(&mut out, b_play.as_u8() as u64);
                push_zero_words(&mut out, 2);
            }
            GameRound::Reveal { b_play, a_play, salt, .. } => {
                push_zero_words(&mut out, 1);
                push_u64(&mut out, b_play.as_u8() as u64);
                push_u64(&mut out, a_play.as_u8() as u64);
                push_bytes32(&mut out, salt.as_bytes());
            }
        }
    }
    out
}

/// Decode a position from its fixed-layout hex string. The inverse of
/// [`encode`].
pub fn decode(data: &str) -> Result<Position, CodecError> {
    let rest = data.strip_prefix("0x").ok_or(CodecError::MissingPrefix)?;
    let mut reader = Reader { rest };

    let adjudicator_type = reader.address("adjudicator_type")?;
    let nonce = reader.u64("nonce")?;
    let participant_count = reader.u64("participant_count")?;
    if participant_count != 2 {
        return Err(CodecError::InvalidParticipantCount(participant_count));
    }
    let participant_a = reader.address("participant_a")?;
    let participant_b = reader.address("participant_b")?;
    let channel = Channel::new(adjudicator_type, nonce, [participant_a, participant_b]);

    let state_type = reader.u64("state_type")?;
    let turn_num = reader.u64("turn_num")?;
    let state_count = reader.u64("state_count")?;
    let resolution = Resolution::new(reader.u64("resolution_a")?, reader.u64("resolution_b")?);

    let state = match state_type {
        STATE_PRE_FUND_SETUP => StateKind::PreFundSetup,
        STATE_POST_FUND_SETUP => StateKind::PostFundSetup,
        STATE_CONCLUDE => StateKind::Conclude,
        STATE_GAME => StateKind::Game(decode_round(&mut reader)?),
        other => return Err(CodecError::UnrecognizedPosition(format!("unknown state type {other}"))),
    };
    if !reader.rest.is_empty() {
        return Err(CodecError::TrailingData);
    }
    Ok(Position { channel, turn_num, state, resolution, state_count })
}

fn decode_round(reader: &mut Reader<'_>) -> Result<GameRound, CodecError> {
    let position_type = reader.u64("position_type")?;
    let stake = TokenAmount::new(reader.u64("stake")?);
    let pre_commit = reader.bytes32("pre_commit")?;
    let b_play = reader.u64("b_play")?;
    let a_play = reader.u64("a_play")?;
    let salt = reader.bytes32("salt")?;

    let round = match position_type {
        POSITION_RESTING => GameRound::Resting { stake },
        POSITION_PROPOSE => GameRound::Propose { stake, pre_commit: PreCommit::from_bytes(pre_commit) },
        POSITION_ACCEPT => GameRound::Accept {
            stake,
            pre_commit: PreCommit::from_bytes(pre_commit),
            b_play: decode_play(b_play)?,
        },
        POSITION_REVEAL => GameRound::Reveal {
            stake,
            b_play: decode_play(b_play)?,
            a_play: decode_play(a_play)?,
            salt: Salt::from_bytes(salt),
        },
        other => return Err(CodecError::UnrecognizedPosition(format!("unknown position type {other}"))),
    };
    Ok(round)
}

fn decode_play(value: u64) -> Result<Play, CodecError> {
    u8::try_from(value)
        .ok()
        .and_then(Play::from_u8)
        .ok_or_else(|| CodecError::UnrecognizedPosition(format!("unknown play {value}")))
}

fn state_type_code(state: &StateKind) -> u64 {
    match state {
        StateKind::PreFundSetup => STATE_PRE_FUND_SETUP,
        StateKind::PostFundSetup => STATE_POST_FUND_SETUP,
        StateKind::Game(_) => STATE_GAME,
        StateKind::Conclude => STATE_CONCLUDE,
    }
}

fn position_type_code(round: &GameRound) -> u64 {
    match round {
        GameRound::Resting { .. } => POSITION_RESTING,
        GameRound::Propose { .. } => POSITION_PROPOSE,
        GameRound::Accept { .. } => POSITION_ACCEPT,
        GameRound::Reveal { .. } => POSITION_REVEAL,
    }
}

fn push_u64(out: &mut String, value: u64) {
    let _ = write!(out, "{value:064x}");
}

fn push_address(out: &mut String, address: &Address) {
    out.push_str(&hex::encode(address.as_bytes()));
}

fn push_bytes32(out: &mut String, bytes: &[u8; 32]) {
    out.push_str(&hex::encode(bytes));
}

fn push_zero_words(out: &mut String, words: usize) {
    for _ in 0..words {
        out.push_str(&"0".repeat(WORD));
    }
}

struct Reader<'a> {
    rest: &'a str,
}

impl<'a> Reader<'a> {
    fn take(&mut self, width: usize, field: &'static str) -> Result<&'a str, CodecError> {
        if self.rest.len() < width {
            return Err(CodecError::Truncated(field));
        }
        let (head, tail) = self.rest.split_at(width);
        self.rest = tail;
        Ok(head)
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, CodecError> {
        let word = self.take(WORD, field)?;
        let (high, low) = word.split_at(WORD - 16);
        if high.bytes().any(|b| b != b'0') {
            // Could still be garbage hex, which takes precedence as a diagnostic.
            if !high.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(CodecError::InvalidHex(field));
            }
            return Err(CodecError::FieldOverflow(field));
        }
        u64::from_str_radix(low, 16).map_err(|_| CodecError::InvalidHex(field))
    }

    fn address(&mut self, field: &'static str) -> Result<Address, CodecError> {
        let chunk = self.take(ADDRESS, field)?;
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(chunk, &mut bytes).map_err(|_| CodecError::InvalidHex(field))?;
        Ok(Address::new(bytes))
    }

    fn bytes32(&mut self, field: &'static str) -> Result<[u8; 32], CodecError> {
        let chunk = self.take(WORD, field)?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(chunk, &mut bytes).map_err(|_| CodecError::InvalidHex(field))?;
        Ok(bytes)
    }
}
