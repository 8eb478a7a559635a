//! The channel wallet: custody of the signing key and the on-chain side of a
//! channel's life.
//!
//! Where the [`game`] engines drive the off-chain move sequence, the wallet
//! machines in this module drive everything that touches the adjudicator
//! contract: backing the channel with deposits ([`FundingMachine`]),
//! answering an on-chain challenge ([`ChallengeMachine`]) and recovering the
//! final balances ([`WithdrawalMachine`]). Each machine consumes one external
//! input per step and emits at most one effect, which the embedding
//! application routes to the user, the peer relay or the transaction
//! submission pipeline.
//!
//! The wallet keeps co-signing and validating game positions whatever its
//! funding machine is doing; a pending deposit must never stall the peer's
//! move exchange.
//!
//! [`game`]: crate::game

mod challenge;
mod error;
mod funding;
mod withdrawal;

pub use challenge::{ChallengeEffect, ChallengeMachine, ChallengeResponse, ChallengeState};
pub use error::WalletError;
pub use funding::{FundingEffect, FundingInput, FundingMachine, FundingRequest, FundingState};
pub use withdrawal::{WithdrawalEffect, WithdrawalInput, WithdrawalMachine, WithdrawalState};

use crate::amount::TokenAmount;
use crate::channel::{Channel, PlayerRole};
use crate::crypto::{Address, MessageSigner};
use crate::helpers::Timestamp;
use crate::message::{self, SignedPosition, Validation};
use crate::position::Position;
use log::*;
use serde::{Deserialize, Serialize};

/// Both parties' signed `Conclude` positions, as the adjudicator's conclude
/// entry point wants them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcludeProof {
    pub ours: SignedPosition,
    pub theirs: SignedPosition,
}

/// An on-chain call a wallet machine wants made. The wallet never talks to a
/// node itself; intents are handed to the transaction submission service,
/// which owns nonces and retries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionIntent {
    Deploy { value: TokenAmount },
    Deposit { adjudicator: Address, value: TokenAmount },
    Conclude { adjudicator: Address, proof: ConcludeProof },
    ConcludeAndWithdraw { adjudicator: Address, proof: ConcludeProof, destination: Address },
    Withdraw { adjudicator: Address, destination: Address },
}

/// One participant's wallet for one channel.
///
/// Owns the signer, tracks the latest position seen on the channel, and
/// embeds the funding machine. Challenge and withdrawal machines are built
/// on demand from the wallet's view of the channel.
pub struct ChannelWallet<S: MessageSigner> {
    channel: Channel,
    role: PlayerRole,
    signer: S,
    funding: FundingMachine,
    latest: Option<(Position, SignedPosition)>,
}

impl<S: MessageSigner> ChannelWallet<S> {
    pub fn new(channel: Channel, role: PlayerRole, signer: S) -> Self {
        ChannelWallet { channel, role, signer, funding: FundingMachine::new(role), latest: None }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn role(&self) -> PlayerRole {
        self.role
    }

    pub fn funding(&self) -> &FundingState {
        self.funding.state()
    }

    /// The most recent position this wallet has signed or accepted.
    pub fn latest_position(&self) -> Option<&Position> {
        self.latest.as_ref().map(|(position, _)| position)
    }

    pub fn latest_envelope(&self) -> Option<&SignedPosition> {
        self.latest.as_ref().map(|(_, envelope)| envelope)
    }

    /// Sign an outbound position. Serviced in any funding state; signing
    /// never advances the funding machine.
    pub fn sign_position(&mut self, position: &Position) -> SignedPosition {
        let envelope = SignedPosition::seal(position, &self.signer);
        self.remember(position, &envelope);
        envelope
    }

    /// Check an inbound envelope against the participant whose turn it
    /// claims, and adopt it as the latest position if it verifies. Serviced
    /// in any funding state.
    pub fn validate_position(&mut self, envelope: &SignedPosition) -> Result<Position, WalletError> {
        match message::validate(envelope, &self.signer)? {
            Validation::Valid(position) => {
                self.remember(&position, envelope);
                Ok(position)
            }
            Validation::BadSignature { expected, recovered } => {
                let position = crate::codec::decode(&envelope.data)?;
                warn!("Rejecting position at turn {} with a bad signature", position.turn_num);
                Err(WalletError::BadSignature { expected, recovered, turn_num: position.turn_num })
            }
        }
    }

    /// Adopt a position as the channel's latest only if it advances the
    /// turn counter. A replayed earlier envelope still carries a valid
    /// signature; it must not roll the stored position back, or a later
    /// challenge would be answered from stale state.
    fn remember(&mut self, position: &Position, envelope: &SignedPosition) {
        let advances = self.latest.as_ref().is_none_or(|(held, _)| position.turn_num > held.turn_num);
        if advances {
            self.latest = Some((position.clone(), envelope.clone()));
        } else {
            debug!("Ignoring position at turn {} for the stored latest", position.turn_num);
        }
    }

    pub fn handle_funding(&mut self, input: FundingInput) -> Option<FundingEffect> {
        self.funding.handle(input)
    }

    /// Start a dispute machine for a challenge observed on chain, seeded
    /// with this wallet's latest position.
    pub fn acknowledge_challenge(
        &self,
        challenge: Position,
        newer: Option<Position>,
        expiry: Timestamp,
    ) -> Result<ChallengeMachine, WalletError> {
        let (local, _) = self.latest.as_ref().ok_or(WalletError::NoPosition)?;
        Ok(ChallengeMachine::acknowledge(self.role, local.clone(), newer, challenge, expiry))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::MockSigner;
    use crate::resolution::Resolution;
    use std::time::Duration;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn channel() -> Channel {
        Channel::new(addr(0xaa), 7, [addr(1), addr(2)])
    }

    fn wallets() -> (ChannelWallet<MockSigner>, ChannelWallet<MockSigner>) {
        let a = ChannelWallet::new(channel(), PlayerRole::A, MockSigner::new(addr(1)));
        let b = ChannelWallet::new(channel(), PlayerRole::B, MockSigner::new(addr(2)));
        (a, b)
    }

    #[test]
    fn signing_keeps_working_while_funding_is_pending() {
        let (mut a, mut b) = wallets();
        let request = FundingRequest { channel: channel(), balances: Resolution::new(5u64, 4u64) };
        a.handle_funding(FundingInput::Request(request));
        a.handle_funding(FundingInput::Approved);
        let before = a.funding().clone();

        let position = Position::pre_fund_setup(channel(), 0, Resolution::new(5u64, 4u64), 0);
        let envelope = a.sign_position(&position);
        assert_eq!(b.validate_position(&envelope).unwrap(), position);
        assert_eq!(a.funding(), &before);
        assert_eq!(a.latest_position(), Some(&position));
    }

    #[test]
    fn envelope_signed_by_the_wrong_party_is_rejected() {
        let (mut a, mut b) = wallets();
        // Turn 0 is A's; B signs it anyway.
        let position = Position::pre_fund_setup(channel(), 0, Resolution::new(5u64, 4u64), 0);
        let envelope = b.sign_position(&position);
        let err = a.validate_position(&envelope).unwrap_err();
        assert!(matches!(err, WalletError::BadSignature { expected, turn_num: 0, .. } if expected == addr(1)));
        assert_eq!(a.latest_position(), None);
    }

    #[test]
    fn replayed_older_envelope_does_not_roll_back_the_latest() {
        let (mut a, mut b) = wallets();
        let first = Position::pre_fund_setup(channel(), 0, Resolution::new(5u64, 4u64), 0);
        let second = Position::pre_fund_setup(channel(), 1, Resolution::new(5u64, 4u64), 1);
        let first_envelope = a.sign_position(&first);
        b.validate_position(&first_envelope).unwrap();
        let second_envelope = b.sign_position(&second);
        a.validate_position(&second_envelope).unwrap();

        // The turn-0 envelope verifies fine; it must still not displace
        // turn 1 on either side.
        assert_eq!(a.validate_position(&first_envelope).unwrap(), first);
        assert_eq!(a.latest_position(), Some(&second));
        a.sign_position(&first);
        assert_eq!(a.latest_position(), Some(&second));
        b.validate_position(&second_envelope).unwrap();
        assert_eq!(b.latest_position(), Some(&second));
    }

    #[test]
    fn challenge_needs_a_stored_position() {
        let (a, _) = wallets();
        let challenge = Position::pre_fund_setup(channel(), 1, Resolution::new(5u64, 4u64), 1);
        let err = a.acknowledge_challenge(challenge, None, Timestamp::from_now(Duration::from_secs(60)));
        assert!(matches!(err, Err(WalletError::NoPosition)));
    }
}
