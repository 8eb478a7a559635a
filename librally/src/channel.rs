use crate::crypto::Address;
use blake2::{Blake2b512, Digest};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// The unique identifier for a channel.
///
/// Derived from a Blake2b-512 hash (domain separator: `"Rally ChannelId v1"`)
/// over the adjudicator type, the channel nonce (little-endian u64), and the
/// two participant addresses in order, truncated to 32 bytes. Two channels
/// between the same participants are distinguished by their nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    [u8; 32],
);

impl ChannelId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn as_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl Debug for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelId({})", self.as_hex())
    }
}

/// Which side of the channel a participant plays. A initiates every round;
/// the roles never swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerRole {
    A,
    B,
}

impl PlayerRole {
    pub const fn other(&self) -> Self {
        match self {
            PlayerRole::A => PlayerRole::B,
            PlayerRole::B => PlayerRole::A,
        }
    }

    /// The role whose turn it is to produce the position with this turn
    /// number. A sends the even turns (0, 2, ...), B the odd ones.
    pub const fn mover_of(turn_num: u64) -> Self {
        if turn_num % 2 == 0 {
            PlayerRole::A
        } else {
            PlayerRole::B
        }
    }
}

impl Display for PlayerRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerRole::A => write!(f, "A"),
            PlayerRole::B => write!(f, "B"),
        }
    }
}

/// The immutable identity of a channel: the adjudicator library it runs
/// against, a nonce, and the two participants, in move order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    adjudicator_type: Address,
    nonce: u64,
    participants: [Address; 2],
}

impl Channel {
    pub fn new(adjudicator_type: Address, nonce: u64, participants: [Address; 2]) -> Self {
        Channel { adjudicator_type, nonce, participants }
    }

    pub fn adjudicator_type(&self) -> Address {
        self.adjudicator_type
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn participants(&self) -> &[Address; 2] {
        &self.participants
    }

    pub fn participant(&self, role: PlayerRole) -> Address {
        match role {
            PlayerRole::A => self.participants[0],
            PlayerRole::B => self.participants[1],
        }
    }

    /// The address expected to have signed the position with this turn number.
    pub fn mover(&self, turn_num: u64) -> Address {
        self.participant(PlayerRole::mover_of(turn_num))
    }

    pub fn channel_id(&self) -> ChannelId {
        let mut hasher = Blake2b512::new();
        hasher.update(b"Rally ChannelId v1");
        hasher.update(self.adjudicator_type.as_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.participants[0].as_bytes());
        hasher.update(self.participants[1].as_bytes());
        let out = hasher.finalize();
        let mut id = [0u8; 32];
        id.copy_from_slice(&out[..32]);
        ChannelId(id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn channel() -> Channel {
        Channel::new(addr(1), 42, [addr(2), addr(3)])
    }

    #[test]
    fn channel_id_is_stable() {
        assert_eq!(channel().channel_id(), channel().channel_id());
    }

    #[test]
    fn channel_id_distinguishes_fields() {
        let base = channel().channel_id();
        assert_ne!(Channel::new(addr(9), 42, [addr(2), addr(3)]).channel_id(), base);
        assert_ne!(Channel::new(addr(1), 43, [addr(2), addr(3)]).channel_id(), base);
        assert_ne!(Channel::new(addr(1), 42, [addr(3), addr(2)]).channel_id(), base);
    }

    #[test]
    fn mover_alternates() {
        let channel = channel();
        assert_eq!(channel.mover(0), addr(2));
        assert_eq!(channel.mover(1), addr(3));
        assert_eq!(channel.mover(6), addr(2));
        assert_eq!(PlayerRole::mover_of(7), PlayerRole::B);
        assert_eq!(PlayerRole::A.other(), PlayerRole::B);
    }
}
