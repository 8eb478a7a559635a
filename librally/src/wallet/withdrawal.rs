use crate::crypto::Address;
use crate::wallet::{ConcludeProof, TransactionIntent};
use log::*;
use serde::{Deserialize, Serialize};

/// Recovering a party's final balance from the adjudicator once play is
/// over. If the channel was never concluded on chain, the withdrawal carries
/// the conclude proof along and both happen in one call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalState {
    SelectWithdrawalAddress,
    ApproveWithdrawal { destination: Address },
    WaitForWithdrawalToBeSentToSigner { destination: Address },
    SubmitWithdrawalInSigner { destination: Address },
    WaitForWithdrawalConfirmation { destination: Address },
    AcknowledgeWithdrawalSuccess { destination: Address },
    WithdrawalDeclined,
    Done { destination: Address },
}

impl WithdrawalState {
    pub fn name(&self) -> &'static str {
        match self {
            WithdrawalState::SelectWithdrawalAddress => "SelectWithdrawalAddress",
            WithdrawalState::ApproveWithdrawal { .. } => "ApproveWithdrawal",
            WithdrawalState::WaitForWithdrawalToBeSentToSigner { .. } => "WaitForWithdrawalToBeSentToSigner",
            WithdrawalState::SubmitWithdrawalInSigner { .. } => "SubmitWithdrawalInSigner",
            WithdrawalState::WaitForWithdrawalConfirmation { .. } => "WaitForWithdrawalConfirmation",
            WithdrawalState::AcknowledgeWithdrawalSuccess { .. } => "AcknowledgeWithdrawalSuccess",
            WithdrawalState::WithdrawalDeclined => "WithdrawalDeclined",
            WithdrawalState::Done { .. } => "Done",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalInput {
    AddressSelected { destination: Address },
    Approved,
    Declined,
    TransactionQueued,
    TransactionSubmitted,
    Confirmed,
    Acknowledged,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawalEffect {
    PromptForApproval { destination: Address },
    Submit(TransactionIntent),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalMachine {
    adjudicator: Address,
    /// Present when the channel has not yet been concluded on chain; the
    /// withdrawal then concludes and withdraws in one transaction.
    proof: Option<ConcludeProof>,
    state: WithdrawalState,
}

impl WithdrawalMachine {
    pub fn new(adjudicator: Address, proof: Option<ConcludeProof>) -> Self {
        WithdrawalMachine { adjudicator, proof, state: WithdrawalState::SelectWithdrawalAddress }
    }

    pub fn state(&self) -> &WithdrawalState {
        &self.state
    }

    pub fn handle(&mut self, input: WithdrawalInput) -> Option<WithdrawalEffect> {
        use WithdrawalInput as In;
        use WithdrawalState as St;
        let state = std::mem::replace(&mut self.state, St::SelectWithdrawalAddress);
        let (state, effect) = match (state, input) {
            (St::SelectWithdrawalAddress, In::AddressSelected { destination }) => {
                (St::ApproveWithdrawal { destination }, Some(WithdrawalEffect::PromptForApproval { destination }))
            }
            (St::ApproveWithdrawal { destination }, In::Approved) => {
                let intent = match self.proof.clone() {
                    Some(proof) => TransactionIntent::ConcludeAndWithdraw {
                        adjudicator: self.adjudicator,
                        proof,
                        destination,
                    },
                    None => TransactionIntent::Withdraw { adjudicator: self.adjudicator, destination },
                };
                (St::WaitForWithdrawalToBeSentToSigner { destination }, Some(WithdrawalEffect::Submit(intent)))
            }
            (St::ApproveWithdrawal { .. }, In::Declined) => {
                info!("Withdrawal declined by the user");
                (St::WithdrawalDeclined, None)
            }
            (St::WaitForWithdrawalToBeSentToSigner { destination }, In::TransactionQueued) => {
                (St::SubmitWithdrawalInSigner { destination }, None)
            }
            (St::SubmitWithdrawalInSigner { destination }, In::TransactionSubmitted) => {
                (St::WaitForWithdrawalConfirmation { destination }, None)
            }
            (St::WaitForWithdrawalConfirmation { destination }, In::Confirmed) => {
                info!("Withdrawal to {destination} confirmed");
                (St::AcknowledgeWithdrawalSuccess { destination }, None)
            }
            (St::AcknowledgeWithdrawalSuccess { destination }, In::Acknowledged) => (St::Done { destination }, None),
            (state, input) => {
                debug!("Withdrawal input {input:?} dropped in state {}", state.name());
                (state, None)
            }
        };
        self.state = state;
        effect
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::Channel;
    use crate::crypto::MockSigner;
    use crate::message::SignedPosition;
    use crate::position::Position;
    use crate::resolution::Resolution;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn proof() -> ConcludeProof {
        let channel = Channel::new(addr(0xaa), 7, [addr(1), addr(2)]);
        let ours = Position::conclude(channel, 8, Resolution::new(6u64, 3u64));
        let theirs = Position::conclude(channel, 9, Resolution::new(6u64, 3u64));
        let signer_a = MockSigner::new(addr(1));
        let signer_b = MockSigner::new(addr(2));
        ConcludeProof {
            ours: SignedPosition::seal(&ours, &signer_a),
            theirs: SignedPosition::seal(&theirs, &signer_b),
        }
    }

    #[test]
    fn withdrawal_with_proof_concludes_in_one_call() {
        let mut machine = WithdrawalMachine::new(addr(0xcc), Some(proof()));
        let effect = machine.handle(WithdrawalInput::AddressSelected { destination: addr(0x0d) });
        assert_eq!(effect, Some(WithdrawalEffect::PromptForApproval { destination: addr(0x0d) }));

        let effect = machine.handle(WithdrawalInput::Approved);
        assert!(matches!(
            effect,
            Some(WithdrawalEffect::Submit(TransactionIntent::ConcludeAndWithdraw { .. }))
        ));
        assert_eq!(machine.handle(WithdrawalInput::TransactionQueued), None);
        assert_eq!(machine.handle(WithdrawalInput::TransactionSubmitted), None);
        assert_eq!(machine.handle(WithdrawalInput::Confirmed), None);
        assert_eq!(machine.handle(WithdrawalInput::Acknowledged), None);
        assert_eq!(machine.state(), &WithdrawalState::Done { destination: addr(0x0d) });
    }

    #[test]
    fn withdrawal_after_conclusion_is_plain() {
        let mut machine = WithdrawalMachine::new(addr(0xcc), None);
        machine.handle(WithdrawalInput::AddressSelected { destination: addr(0x0d) });
        let effect = machine.handle(WithdrawalInput::Approved);
        assert_eq!(
            effect,
            Some(WithdrawalEffect::Submit(TransactionIntent::Withdraw {
                adjudicator: addr(0xcc),
                destination: addr(0x0d),
            }))
        );
    }

    #[test]
    fn confirmation_before_submission_is_dropped() {
        let mut machine = WithdrawalMachine::new(addr(0xcc), None);
        machine.handle(WithdrawalInput::AddressSelected { destination: addr(0x0d) });
        assert_eq!(machine.handle(WithdrawalInput::Confirmed), None);
        assert_eq!(machine.state(), &WithdrawalState::ApproveWithdrawal { destination: addr(0x0d) });
    }

    #[test]
    fn declining_is_terminal() {
        let mut machine = WithdrawalMachine::new(addr(0xcc), None);
        machine.handle(WithdrawalInput::AddressSelected { destination: addr(0x0d) });
        assert_eq!(machine.handle(WithdrawalInput::Declined), None);
        assert_eq!(machine.state(), &WithdrawalState::WithdrawalDeclined);
        assert_eq!(machine.handle(WithdrawalInput::Approved), None);
    }
}
