//! Pure construction of adjudicator calls.
//!
//! Positions arrive here already hex-encoded and signed; each builder packs
//! a 4-byte selector with the raw payload bytes into a [`TransactionRequest`].
//! Full ABI encoding of the calldata is the node gateway's concern, not
//! this crate's.

use crate::errors::BuilderError;
use crate::transaction::TransactionRequest;
use librally::amount::TokenAmount;
use librally::crypto::Address;
use librally::message::SignedPosition;
use librally::wallet::{ConcludeProof, TransactionIntent};

pub const DEPLOY_SELECTOR: [u8; 4] = [0x1a, 0x69, 0x25, 0x23];
pub const DEPOSIT_SELECTOR: [u8; 4] = [0xb6, 0xb5, 0x5f, 0x25];
pub const CREATE_CHALLENGE_SELECTOR: [u8; 4] = [0x83, 0x95, 0x10, 0xa9];
pub const RESPOND_WITH_MOVE_SELECTOR: [u8; 4] = [0x3b, 0x56, 0xef, 0x34];
pub const RESPOND_WITH_ALTERNATIVE_MOVE_SELECTOR: [u8; 4] = [0x76, 0x2b, 0x4c, 0xe1];
pub const REFUTE_SELECTOR: [u8; 4] = [0x2f, 0x6f, 0x8f, 0x3d];
pub const CONCLUDE_SELECTOR: [u8; 4] = [0xd9, 0x4f, 0x1f, 0x57];
pub const CONCLUDE_AND_WITHDRAW_SELECTOR: [u8; 4] = [0x4a, 0x3c, 0x7b, 0x9e];
pub const WITHDRAW_SELECTOR: [u8; 4] = [0x51, 0xcf, 0xf8, 0xd9];

fn position_bytes(envelope: &SignedPosition) -> Result<Vec<u8>, BuilderError> {
    let stripped = envelope.data.strip_prefix("0x").ok_or(BuilderError::MissingPrefix)?;
    let mut bytes = hex::decode(stripped)?;
    bytes.extend_from_slice(&envelope.signature.to_bytes());
    Ok(bytes)
}

fn call(selector: [u8; 4], payloads: &[&[u8]]) -> Vec<u8> {
    let mut data = selector.to_vec();
    for payload in payloads {
        data.extend_from_slice(payload);
    }
    data
}

/// Deploy the adjudicator for a channel, funding A's share in the same
/// transaction.
pub fn deploy(participants: &[Address; 2], value: TokenAmount, chain_id: u64) -> TransactionRequest {
    let data = call(DEPLOY_SELECTOR, &[participants[0].as_bytes(), participants[1].as_bytes()]);
    TransactionRequest { to: None, data, value, chain_id }
}

pub fn deposit(adjudicator: Address, destination: Address, value: TokenAmount, chain_id: u64) -> TransactionRequest {
    let data = call(DEPOSIT_SELECTOR, &[destination.as_bytes()]);
    TransactionRequest { to: Some(adjudicator), data, value, chain_id }
}

pub fn create_challenge(
    adjudicator: Address,
    agreed: &SignedPosition,
    challenge: &SignedPosition,
    chain_id: u64,
) -> Result<TransactionRequest, BuilderError> {
    let data = call(CREATE_CHALLENGE_SELECTOR, &[&position_bytes(agreed)?, &position_bytes(challenge)?]);
    Ok(TransactionRequest { to: Some(adjudicator), data, value: TokenAmount::ZERO, chain_id })
}

pub fn respond_with_move(
    adjudicator: Address,
    response: &SignedPosition,
    chain_id: u64,
) -> Result<TransactionRequest, BuilderError> {
    let data = call(RESPOND_WITH_MOVE_SELECTOR, &[&position_bytes(response)?]);
    Ok(TransactionRequest { to: Some(adjudicator), data, value: TokenAmount::ZERO, chain_id })
}

/// Answer a challenge with a move that was already made and cached, rather
/// than a fresh one.
pub fn respond_with_alternative_move(
    adjudicator: Address,
    alternative: &SignedPosition,
    response: &SignedPosition,
    chain_id: u64,
) -> Result<TransactionRequest, BuilderError> {
    let data =
        call(RESPOND_WITH_ALTERNATIVE_MOVE_SELECTOR, &[&position_bytes(alternative)?, &position_bytes(response)?]);
    Ok(TransactionRequest { to: Some(adjudicator), data, value: TokenAmount::ZERO, chain_id })
}

pub fn refute(
    adjudicator: Address,
    refutation: &SignedPosition,
    chain_id: u64,
) -> Result<TransactionRequest, BuilderError> {
    let data = call(REFUTE_SELECTOR, &[&position_bytes(refutation)?]);
    Ok(TransactionRequest { to: Some(adjudicator), data, value: TokenAmount::ZERO, chain_id })
}

pub fn conclude(adjudicator: Address, proof: &ConcludeProof, chain_id: u64) -> Result<TransactionRequest, BuilderError> {
    let data = call(CONCLUDE_SELECTOR, &[&position_bytes(&proof.ours)?, &position_bytes(&proof.theirs)?]);
    Ok(TransactionRequest { to: Some(adjudicator), data, value: TokenAmount::ZERO, chain_id })
}

pub fn conclude_and_withdraw(
    adjudicator: Address,
    proof: &ConcludeProof,
    destination: Address,
    chain_id: u64,
) -> Result<TransactionRequest, BuilderError> {
    let data = call(
        CONCLUDE_AND_WITHDRAW_SELECTOR,
        &[&position_bytes(&proof.ours)?, &position_bytes(&proof.theirs)?, destination.as_bytes()],
    );
    Ok(TransactionRequest { to: Some(adjudicator), data, value: TokenAmount::ZERO, chain_id })
}

pub fn withdraw(
    adjudicator: Address,
    participant: Address,
    destination: Address,
    chain_id: u64,
) -> Result<TransactionRequest, BuilderError> {
    let data = call(WITHDRAW_SELECTOR, &[participant.as_bytes(), destination.as_bytes()]);
    Ok(TransactionRequest { to: Some(adjudicator), data, value: TokenAmount::ZERO, chain_id })
}

/// Map a wallet machine's intent to a concrete request. `participant` is the
/// local signing address, used for plain withdrawals.
pub fn from_intent(
    intent: &TransactionIntent,
    participants: &[Address; 2],
    participant: Address,
    chain_id: u64,
) -> Result<TransactionRequest, BuilderError> {
    match intent {
        TransactionIntent::Deploy { value } => Ok(deploy(participants, *value, chain_id)),
        TransactionIntent::Deposit { adjudicator, value } => {
            Ok(deposit(*adjudicator, participant, *value, chain_id))
        }
        TransactionIntent::Conclude { adjudicator, proof } => conclude(*adjudicator, proof, chain_id),
        TransactionIntent::ConcludeAndWithdraw { adjudicator, proof, destination } => {
            conclude_and_withdraw(*adjudicator, proof, *destination, chain_id)
        }
        TransactionIntent::Withdraw { adjudicator, destination } => {
            withdraw(*adjudicator, participant, *destination, chain_id)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use librally::channel::Channel;
    use librally::crypto::MockSigner;
    use librally::position::Position;
    use librally::resolution::Resolution;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn envelope() -> SignedPosition {
        let channel = Channel::new(addr(0xaa), 1, [addr(1), addr(2)]);
        let position = Position::conclude(channel, 8, Resolution::new(6u64, 3u64));
        SignedPosition::seal(&position, &MockSigner::new(addr(1)))
    }

    #[test]
    fn deploy_has_no_recipient_and_carries_value() {
        let request = deploy(&[addr(1), addr(2)], TokenAmount::new(5), 3);
        assert_eq!(request.to, None);
        assert_eq!(request.value, TokenAmount::new(5));
        assert_eq!(&request.data[..4], &DEPLOY_SELECTOR);
        assert_eq!(request.data.len(), 4 + 40);
    }

    #[test]
    fn respond_with_move_packs_position_and_signature() {
        let envelope = envelope();
        let request = respond_with_move(addr(0xcc), &envelope, 3).unwrap();
        assert_eq!(request.to, Some(addr(0xcc)));
        assert_eq!(&request.data[..4], &RESPOND_WITH_MOVE_SELECTOR);
        // Selector, position bytes, 65-byte signature.
        let position_len = (envelope.data.len() - 2) / 2;
        assert_eq!(request.data.len(), 4 + position_len + 65);
    }

    #[test]
    fn malformed_position_hex_is_rejected() {
        let mut envelope = envelope();
        envelope.data = envelope.data.trim_start_matches("0x").to_string();
        assert!(matches!(respond_with_move(addr(0xcc), &envelope, 3), Err(BuilderError::MissingPrefix)));
    }

    #[test]
    fn intents_map_to_their_calls() {
        let intent = TransactionIntent::Withdraw { adjudicator: addr(0xcc), destination: addr(0x0d) };
        let request = from_intent(&intent, &[addr(1), addr(2)], addr(1), 3).unwrap();
        assert_eq!(&request.data[..4], &WITHDRAW_SELECTOR);
        assert_eq!(request.to, Some(addr(0xcc)));
    }
}
