use crate::amount::TokenAmount;
use crate::channel::{Channel, PlayerRole};
use crate::crypto::Address;
use crate::resolution::Resolution;
use crate::wallet::TransactionIntent;
use log::*;
use serde::{Deserialize, Serialize};

/// What the application asks the wallet to fund: a channel and the opening
/// balances. A pays `balances.a` into the deploy, B deposits `balances.b`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRequest {
    pub channel: Channel,
    pub balances: Resolution,
}

/// The funding machine's states. A walks the deploy leg, B the deposit leg;
/// the request, approval and post-fund tail are shared.
///
/// ```mermaid
/// stateDiagram-v2
///     [*] --> WaitForFundingRequest
///     WaitForFundingRequest --> ApproveFunding: Request
///     ApproveFunding --> FundingDeclined: Declined
///     ApproveFunding --> AWaitForDeployToBeSentToSigner: Approved (A)
///     AWaitForDeployToBeSentToSigner --> ASubmitDeployInSigner: TransactionQueued
///     ASubmitDeployInSigner --> WaitForDeployConfirmation: TransactionSubmitted
///     WaitForDeployConfirmation --> AWaitForDeposit: DeployConfirmed
///     AWaitForDeposit --> AWaitForPostFundSetup: Deposited (full)
///     AWaitForPostFundSetup --> AcknowledgeFundingSuccess: PostFundSetupComplete
///     ApproveFunding --> BWaitForDeployAddress: Approved (B)
///     BWaitForDeployAddress --> BWaitForDepositToBeSentToSigner: DeployConfirmed
///     BWaitForDepositToBeSentToSigner --> BSubmitDepositInSigner: TransactionQueued
///     BSubmitDepositInSigner --> WaitForDepositConfirmation: TransactionSubmitted
///     WaitForDepositConfirmation --> BWaitForPostFundSetup: Deposited (full)
///     BWaitForPostFundSetup --> AcknowledgeFundingSuccess: PostFundSetupComplete
///     AcknowledgeFundingSuccess --> WaitForUpdate: Acknowledged
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingState {
    WaitForFundingRequest,
    ApproveFunding,
    AWaitForDeployToBeSentToSigner,
    ASubmitDeployInSigner,
    WaitForDeployConfirmation,
    AWaitForDeposit { adjudicator: Address },
    AWaitForPostFundSetup { adjudicator: Address },
    BWaitForDeployAddress,
    BWaitForDepositToBeSentToSigner { adjudicator: Address },
    BSubmitDepositInSigner { adjudicator: Address },
    WaitForDepositConfirmation { adjudicator: Address },
    BWaitForPostFundSetup { adjudicator: Address },
    AcknowledgeFundingSuccess { adjudicator: Address },
    WaitForUpdate { adjudicator: Address },
    FundingDeclined,
}

impl FundingState {
    pub fn name(&self) -> &'static str {
        match self {
            FundingState::WaitForFundingRequest => "WaitForFundingRequest",
            FundingState::ApproveFunding => "ApproveFunding",
            FundingState::AWaitForDeployToBeSentToSigner => "AWaitForDeployToBeSentToSigner",
            FundingState::ASubmitDeployInSigner => "ASubmitDeployInSigner",
            FundingState::WaitForDeployConfirmation => "WaitForDeployConfirmation",
            FundingState::AWaitForDeposit { .. } => "AWaitForDeposit",
            FundingState::AWaitForPostFundSetup { .. } => "AWaitForPostFundSetup",
            FundingState::BWaitForDeployAddress => "BWaitForDeployAddress",
            FundingState::BWaitForDepositToBeSentToSigner { .. } => "BWaitForDepositToBeSentToSigner",
            FundingState::BSubmitDepositInSigner { .. } => "BSubmitDepositInSigner",
            FundingState::WaitForDepositConfirmation { .. } => "WaitForDepositConfirmation",
            FundingState::BWaitForPostFundSetup { .. } => "BWaitForPostFundSetup",
            FundingState::AcknowledgeFundingSuccess { .. } => "AcknowledgeFundingSuccess",
            FundingState::WaitForUpdate { .. } => "WaitForUpdate",
            FundingState::FundingDeclined => "FundingDeclined",
        }
    }
}

/// External inputs the funding machine consumes, one per step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingInput {
    Request(FundingRequest),
    Approved,
    Declined,
    /// The transaction was accepted by the submission pipeline.
    TransactionQueued,
    /// The transaction was broadcast.
    TransactionSubmitted,
    DeployConfirmed { adjudicator: Address },
    Deposited { destination_holdings: TokenAmount },
    PostFundSetupComplete,
    Acknowledged,
}

/// At most one of these comes back from each step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingEffect {
    PromptForApproval { request: FundingRequest },
    Submit(TransactionIntent),
    /// Tell the peer where the adjudicator was deployed.
    ShareAdjudicator { adjudicator: Address },
    Funded { adjudicator: Address },
}

/// Drives the deposit dance backing one channel, independent of round logic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingMachine {
    role: PlayerRole,
    request: Option<FundingRequest>,
    state: FundingState,
}

impl FundingMachine {
    pub fn new(role: PlayerRole) -> Self {
        FundingMachine { role, request: None, state: FundingState::WaitForFundingRequest }
    }

    pub fn state(&self) -> &FundingState {
        &self.state
    }

    pub fn role(&self) -> PlayerRole {
        self.role
    }

    /// Consume one input. Inputs that make no sense in the current state are
    /// dropped without changing it.
    pub fn handle(&mut self, input: FundingInput) -> Option<FundingEffect> {
        use FundingInput as In;
        use FundingState as St;
        let state = std::mem::replace(&mut self.state, St::WaitForFundingRequest);
        let (state, effect) = match (state, input) {
            (St::WaitForFundingRequest, In::Request(request)) => {
                self.request = Some(request.clone());
                (St::ApproveFunding, Some(FundingEffect::PromptForApproval { request }))
            }
            (St::ApproveFunding, In::Declined) => {
                info!("Funding declined by the user");
                (St::FundingDeclined, None)
            }
            (St::ApproveFunding, In::Approved) => match (self.role, &self.request) {
                (PlayerRole::A, Some(request)) => {
                    let intent = TransactionIntent::Deploy { value: request.balances.a };
                    (St::AWaitForDeployToBeSentToSigner, Some(FundingEffect::Submit(intent)))
                }
                (PlayerRole::B, Some(_)) => (St::BWaitForDeployAddress, None),
                (_, None) => (St::ApproveFunding, None),
            },
            // A's deploy leg
            (St::AWaitForDeployToBeSentToSigner, In::TransactionQueued) => (St::ASubmitDeployInSigner, None),
            (St::ASubmitDeployInSigner, In::TransactionSubmitted) => (St::WaitForDeployConfirmation, None),
            (St::WaitForDeployConfirmation, In::DeployConfirmed { adjudicator }) => {
                info!("Adjudicator deployed at {adjudicator}");
                (St::AWaitForDeposit { adjudicator }, Some(FundingEffect::ShareAdjudicator { adjudicator }))
            }
            (St::AWaitForDeposit { adjudicator }, In::Deposited { destination_holdings }) => {
                if self.fully_funded(destination_holdings) {
                    (St::AWaitForPostFundSetup { adjudicator }, None)
                } else {
                    (St::AWaitForDeposit { adjudicator }, None)
                }
            }
            (St::AWaitForPostFundSetup { adjudicator }, In::PostFundSetupComplete) => {
                (St::AcknowledgeFundingSuccess { adjudicator }, Some(FundingEffect::Funded { adjudicator }))
            }
            // B's deposit leg
            (St::BWaitForDeployAddress, In::DeployConfirmed { adjudicator }) => match &self.request {
                Some(request) => {
                    let intent = TransactionIntent::Deposit { adjudicator, value: request.balances.b };
                    (St::BWaitForDepositToBeSentToSigner { adjudicator }, Some(FundingEffect::Submit(intent)))
                }
                None => (St::BWaitForDeployAddress, None),
            },
            (St::BWaitForDepositToBeSentToSigner { adjudicator }, In::TransactionQueued) => {
                (St::BSubmitDepositInSigner { adjudicator }, None)
            }
            (St::BSubmitDepositInSigner { adjudicator }, In::TransactionSubmitted) => {
                (St::WaitForDepositConfirmation { adjudicator }, None)
            }
            (St::WaitForDepositConfirmation { adjudicator }, In::Deposited { destination_holdings }) => {
                if self.fully_funded(destination_holdings) {
                    (St::BWaitForPostFundSetup { adjudicator }, None)
                } else {
                    (St::WaitForDepositConfirmation { adjudicator }, None)
                }
            }
            (St::BWaitForPostFundSetup { adjudicator }, In::PostFundSetupComplete) => {
                (St::AcknowledgeFundingSuccess { adjudicator }, Some(FundingEffect::Funded { adjudicator }))
            }
            // Shared tail
            (St::AcknowledgeFundingSuccess { adjudicator }, In::Acknowledged) => {
                (St::WaitForUpdate { adjudicator }, None)
            }
            (state, input) => {
                debug!("Funding input {input:?} dropped in state {}", state.name());
                (state, None)
            }
        };
        self.state = state;
        effect
    }

    fn fully_funded(&self, destination_holdings: TokenAmount) -> bool {
        match &self.request {
            Some(request) => destination_holdings >= request.balances.total(),
            None => false,
        }
    }
}
