use crate::amount::TokenAmount;
use crate::channel::Channel;
use crate::commitment::{hash_commitment, PreCommit, Salt};
use crate::crypto::Address;
use crate::game::result::{calculate_result, settle};
use crate::game::{check_setup, ChainEvent, FundingAction, GameSetupError};
use crate::position::{valid_transition, GameRound, Play, Position, StateKind};
use crate::resolution::Resolution;
use log::*;
use serde::{Deserialize, Serialize};

/// Player B's application state. Mirrors [`PlayerAState`], with the deposit
/// (rather than deploy) funding leg and the responder's half of the round
/// cycle: B chooses a play only after receiving A's `Propose`.
///
/// [`PlayerAState`]: crate::game::PlayerAState
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerBState {
    WaitForPreFundSetupA { expected: Position },
    ReadyToSendPreFundSetupB { position: Position },
    WaitForAToDeploy { last: Position },
    ReadyToDeposit { last: Position, adjudicator: Address },
    WaitForBlockchainDeposit { last: Position, adjudicator: Address },
    WaitForPostFundSetupA { last: Position },
    ReadyToSendPostFundSetupB { position: Position },
    WaitForPropose { last: Position },
    ReadyToChooseBPlay { propose: Position, pre_round: Resolution },
    ReadyToSendAccept { position: Position, b_play: Play, pre_commit: PreCommit, pre_round: Resolution },
    WaitForReveal { last: Position, b_play: Play, pre_commit: PreCommit, pre_round: Resolution },
    ReadyToSendResting { position: Position },
    InsufficientFunds { last: Position },
    Concluded { position: Position, sent: bool },
}

impl PlayerBState {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerBState::WaitForPreFundSetupA { .. } => "WaitForPreFundSetupA",
            PlayerBState::ReadyToSendPreFundSetupB { .. } => "ReadyToSendPreFundSetupB",
            PlayerBState::WaitForAToDeploy { .. } => "WaitForAToDeploy",
            PlayerBState::ReadyToDeposit { .. } => "ReadyToDeposit",
            PlayerBState::WaitForBlockchainDeposit { .. } => "WaitForBlockchainDeposit",
            PlayerBState::WaitForPostFundSetupA { .. } => "WaitForPostFundSetupA",
            PlayerBState::ReadyToSendPostFundSetupB { .. } => "ReadyToSendPostFundSetupB",
            PlayerBState::WaitForPropose { .. } => "WaitForPropose",
            PlayerBState::ReadyToChooseBPlay { .. } => "ReadyToChooseBPlay",
            PlayerBState::ReadyToSendAccept { .. } => "ReadyToSendAccept",
            PlayerBState::WaitForReveal { .. } => "WaitForReveal",
            PlayerBState::ReadyToSendResting { .. } => "ReadyToSendResting",
            PlayerBState::InsufficientFunds { .. } => "InsufficientFunds",
            PlayerBState::Concluded { .. } => "Concluded",
        }
    }
}

/// The game engine for player B, the responder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BEngine {
    channel: Channel,
    stake: TokenAmount,
    state: PlayerBState,
}

impl BEngine {
    /// Start a new game from B's side, waiting for A's turn-0
    /// `PreFundSetup`. The channel, stake and opening balances are agreed
    /// out of band before either engine is built.
    pub fn setup_game(channel: Channel, stake: TokenAmount, balances: Resolution) -> Result<Self, GameSetupError> {
        check_setup(stake)?;
        let expected = Position::pre_fund_setup(channel, 0, balances, 0);
        info!("B: new game on channel {}", channel.channel_id());
        Ok(BEngine { channel, stake, state: PlayerBState::WaitForPreFundSetupA { expected } })
    }

    pub fn state(&self) -> &PlayerBState {
        &self.state
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn stake(&self) -> TokenAmount {
        self.stake
    }

    pub fn resolution(&self) -> Resolution {
        self.last_position().resolution
    }

    pub fn is_concluded(&self) -> bool {
        matches!(self.state, PlayerBState::Concluded { .. })
    }

    pub fn last_position(&self) -> &Position {
        match &self.state {
            PlayerBState::WaitForPreFundSetupA { expected } => expected,
            PlayerBState::ReadyToSendPreFundSetupB { position }
            | PlayerBState::ReadyToSendPostFundSetupB { position }
            | PlayerBState::ReadyToSendAccept { position, .. }
            | PlayerBState::ReadyToSendResting { position }
            | PlayerBState::Concluded { position, .. } => position,
            PlayerBState::WaitForAToDeploy { last }
            | PlayerBState::ReadyToDeposit { last, .. }
            | PlayerBState::WaitForBlockchainDeposit { last, .. }
            | PlayerBState::WaitForPostFundSetupA { last }
            | PlayerBState::WaitForPropose { last }
            | PlayerBState::WaitForReveal { last, .. }
            | PlayerBState::InsufficientFunds { last } => last,
            PlayerBState::ReadyToChooseBPlay { propose, .. } => propose,
        }
    }

    pub fn outbound_position(&self) -> Option<&Position> {
        match &self.state {
            PlayerBState::ReadyToSendPreFundSetupB { position }
            | PlayerBState::ReadyToSendPostFundSetupB { position }
            | PlayerBState::ReadyToSendAccept { position, .. }
            | PlayerBState::ReadyToSendResting { position } => Some(position),
            PlayerBState::Concluded { position, sent: false } => Some(position),
            _ => None,
        }
    }

    pub fn pending_funding_action(&self) -> Option<FundingAction> {
        match &self.state {
            PlayerBState::ReadyToDeposit { last, adjudicator } => {
                Some(FundingAction::Deposit { adjudicator: *adjudicator, value: last.resolution.b })
            }
            _ => None,
        }
    }

    pub fn message_sent(self) -> Self {
        let BEngine { channel, stake, state } = self;
        let state = match state {
            PlayerBState::ReadyToSendPreFundSetupB { position } => PlayerBState::WaitForAToDeploy { last: position },
            PlayerBState::ReadyToSendPostFundSetupB { position } => PlayerBState::WaitForPropose { last: position },
            PlayerBState::ReadyToSendAccept { position, b_play, pre_commit, pre_round } => {
                PlayerBState::WaitForReveal { last: position, b_play, pre_commit, pre_round }
            }
            PlayerBState::ReadyToSendResting { position } => {
                if position.resolution.can_fund_round(stake) {
                    PlayerBState::WaitForPropose { last: position }
                } else {
                    info!("B: insufficient funds for another round at {}", position.resolution);
                    PlayerBState::InsufficientFunds { last: position }
                }
            }
            PlayerBState::Concluded { position, .. } => PlayerBState::Concluded { position, sent: true },
            other => other,
        };
        BEngine { channel, stake, state }
    }

    pub fn transaction_sent(self) -> Self {
        let BEngine { channel, stake, state } = self;
        let state = match state {
            PlayerBState::ReadyToDeposit { last, adjudicator } => {
                PlayerBState::WaitForBlockchainDeposit { last, adjudicator }
            }
            other => other,
        };
        BEngine { channel, stake, state }
    }

    /// Answer A's proposal with an open play, legal only from
    /// `ReadyToChooseBPlay`. Reuses A's commitment and mirrors the
    /// provisional stake shift already present in the `Propose`.
    pub fn choose_play(self, play: Play) -> Self {
        let BEngine { channel, stake, state } = self;
        let state = match state {
            PlayerBState::ReadyToChooseBPlay { propose, pre_round } => {
                // ReadyToChooseBPlay is only ever entered with a Propose.
                match propose.game_round() {
                    Some(GameRound::Propose { pre_commit, .. }) => {
                        let pre_commit = *pre_commit;
                        let position = Position::game(
                            channel,
                            propose.turn_num + 1,
                            propose.resolution,
                            GameRound::Accept { stake, pre_commit, b_play: play },
                        );
                        debug!("B: answered with {play} at turn {}", position.turn_num);
                        PlayerBState::ReadyToSendAccept { position, b_play: play, pre_commit, pre_round }
                    }
                    _ => PlayerBState::ReadyToChooseBPlay { propose, pre_round },
                }
            }
            other => {
                debug!("B: choose_play ignored in state {}", other.name());
                other
            }
        };
        BEngine { channel, stake, state }
    }

    pub fn receive_position(self, candidate: Position) -> Self {
        // The opening position has no predecessor; it must equal what was
        // agreed out of band.
        if let PlayerBState::WaitForPreFundSetupA { expected } = &self.state {
            if candidate == *expected {
                let position = Position::pre_fund_setup(self.channel, 1, candidate.resolution, 1);
                return BEngine {
                    channel: self.channel,
                    stake: self.stake,
                    state: PlayerBState::ReadyToSendPreFundSetupB { position },
                };
            }
            debug!("B: opening position does not match the agreed game");
            return self;
        }
        if !valid_transition(self.last_position(), &candidate) {
            debug!(
                "B: dropping position at turn {} in state {} (expected turn {})",
                candidate.turn_num,
                self.state.name(),
                self.last_position().turn_num + 1
            );
            return self;
        }
        let BEngine { channel, stake, state } = self;
        let kind = candidate.state.clone();
        let state = match (state, &kind) {
            (PlayerBState::WaitForPostFundSetupA { last }, StateKind::PostFundSetup) => {
                if candidate.resolution == last.resolution && candidate.state_count == 0 {
                    let position = Position::post_fund_setup(channel, candidate.turn_num + 1, candidate.resolution, 1);
                    PlayerBState::ReadyToSendPostFundSetupB { position }
                } else {
                    PlayerBState::WaitForPostFundSetupA { last }
                }
            }
            (PlayerBState::WaitForPropose { last }, StateKind::Game(GameRound::Propose { stake: round_stake, .. })) => {
                let provisional = last.resolution.shift_to_b(stake);
                if *round_stake == stake && provisional == Some(candidate.resolution) {
                    if last.resolution.can_fund_round(stake) {
                        PlayerBState::ReadyToChooseBPlay { pre_round: last.resolution, propose: candidate }
                    } else {
                        info!("B: insufficient funds to accept a round at {}", last.resolution);
                        PlayerBState::InsufficientFunds { last: candidate }
                    }
                } else {
                    debug!("B: rejecting Propose at turn {}", candidate.turn_num);
                    PlayerBState::WaitForPropose { last }
                }
            }
            (
                PlayerBState::WaitForReveal { last, b_play, pre_commit, pre_round },
                StateKind::Game(GameRound::Reveal { stake: round_stake, b_play: revealed_b, a_play, salt }),
            ) => {
                let opened = hash_commitment(*a_play, salt);
                let expected = settle(calculate_result(*a_play, b_play), pre_round, stake);
                let acceptable = *round_stake == stake
                    && *revealed_b == b_play
                    && opened == pre_commit
                    && expected == Some(candidate.resolution);
                if acceptable {
                    info!("B: round settled at {}", candidate.resolution);
                    let position = Position::game(
                        channel,
                        candidate.turn_num + 1,
                        candidate.resolution,
                        GameRound::Resting { stake },
                    );
                    PlayerBState::ReadyToSendResting { position }
                } else {
                    debug!("B: rejecting Reveal at turn {}", candidate.turn_num);
                    PlayerBState::WaitForReveal { last, b_play, pre_commit, pre_round }
                }
            }
            (PlayerBState::Concluded { position, sent }, _) => PlayerBState::Concluded { position, sent },
            (_state, StateKind::Conclude) => {
                info!("B: peer concluded at turn {}", candidate.turn_num);
                PlayerBState::Concluded { position: candidate.next_conclude(), sent: false }
            }
            (state, _) => {
                debug!("B: position phase not expected in state {}", state.name());
                state
            }
        };
        BEngine { channel, stake, state }
    }

    pub fn receive_event(self, event: ChainEvent) -> Self {
        let BEngine { channel, stake, state } = self;
        let state = match (state, event) {
            (PlayerBState::WaitForAToDeploy { last }, ChainEvent::DeployConfirmed { adjudicator }) => {
                info!("B: adjudicator deployed at {adjudicator}");
                PlayerBState::ReadyToDeposit { last, adjudicator }
            }
            (
                PlayerBState::WaitForBlockchainDeposit { last, adjudicator },
                ChainEvent::FundsReceived { destination_holdings },
            ) => {
                if destination_holdings >= last.resolution.total() {
                    PlayerBState::WaitForPostFundSetupA { last }
                } else {
                    PlayerBState::WaitForBlockchainDeposit { last, adjudicator }
                }
            }
            (state, _) => state,
        };
        BEngine { channel, stake, state }
    }

    pub fn conclude(self) -> Self {
        if self.is_concluded() {
            return self;
        }
        let position = self.last_position().next_conclude();
        info!("B: concluding at turn {} with {}", position.turn_num, position.resolution);
        BEngine { channel: self.channel, stake: self.stake, state: PlayerBState::Concluded { position, sent: false } }
    }
}
