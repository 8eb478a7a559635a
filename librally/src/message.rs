//! The peer message envelope and its validation.
//!
//! All cross-participant coordination happens by exchanging these envelopes
//! over a relay; there is no shared memory between the two players.

use crate::channel::PlayerRole;
use crate::codec::{self, CodecError};
use crate::crypto::{Address, MessageSigner, Signature};
use crate::position::Position;
use serde::{Deserialize, Serialize};

/// A position hex string plus the sender's signature over it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPosition {
    pub data: String,
    pub signature: Signature,
}

impl SignedPosition {
    /// Encode and sign a position in one step.
    pub fn seal<S: MessageSigner>(position: &Position, signer: &S) -> Self {
        let data = codec::encode(position);
        let signature = signer.sign(&data);
        SignedPosition { data, signature }
    }
}

/// The outcome of checking an inbound envelope. Signature problems are
/// reported as data, never raised; only a malformed position hex is an error
/// worth surfacing (and then only to the decode call).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validation {
    Valid(Position),
    /// The signature did not recover to the participant expected to have
    /// produced this turn.
    BadSignature { expected: Address, recovered: Option<Address> },
}

/// Decode an envelope and verify its signature against the channel
/// participant whose turn the position claims to be.
pub fn validate<S: MessageSigner>(envelope: &SignedPosition, signer: &S) -> Result<Validation, CodecError> {
    let position = codec::decode(&envelope.data)?;
    let expected = position.channel.mover(position.turn_num);
    let recovered = signer.recover(&envelope.data, &envelope.signature);
    if recovered == Some(expected) {
        Ok(Validation::Valid(position))
    } else {
        Ok(Validation::BadSignature { expected, recovered })
    }
}

/// Outbound half of the relay the engines talk through. `to` is the peer's
/// channel address; routing beyond that is the relay's problem.
pub trait SendPeerMessage {
    fn send_message(&self, to: Address, message: SignedPosition);
}

/// User-consent callbacks consumed by the wallet machines. The wallet never
/// blocks on these; the answer arrives later as an input.
pub trait ConsentPrompt {
    fn request_approval(&self, description: &str);
}

impl PlayerRole {
    /// The peer a player with this role sends messages to.
    pub fn peer_of(&self, participants: &[Address; 2]) -> Address {
        match self {
            PlayerRole::A => participants[1],
            PlayerRole::B => participants[0],
        }
    }
}
