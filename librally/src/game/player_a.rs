use crate::amount::TokenAmount;
use crate::channel::Channel;
use crate::commitment::{hash_commitment, Salt};
use crate::crypto::Address;
use crate::game::result::{calculate_result, settle, GameResult};
use crate::game::{check_setup, ChainEvent, FundingAction, GameSetupError};
use crate::position::{valid_transition, GameRound, Play, Position, StateKind};
use crate::resolution::Resolution;
use log::*;
use serde::{Deserialize, Serialize};

/// ```mermaid
/// stateDiagram-v2
///     [*] --> ReadyToSendPreFundSetupA : setup_game()
///     ReadyToSendPreFundSetupA --> WaitForPreFundSetupB : message_sent()
///     WaitForPreFundSetupB --> ReadyToDeploy : receive_position(PreFundSetupB)
///     ReadyToDeploy --> WaitForBlockchainDeploy : transaction_sent()
///     WaitForBlockchainDeploy --> WaitForBToDeposit : receive_event(DeployConfirmed)
///     WaitForBToDeposit --> ReadyToSendPostFundSetupA : receive_event(FundsReceived)
///     ReadyToSendPostFundSetupA --> WaitForPostFundSetupB : message_sent()
///     WaitForPostFundSetupB --> ReadyToChooseAPlay : receive_position(PostFundSetupB)
///     ReadyToChooseAPlay --> ReadyToSendPropose : choose_play()
///     ReadyToSendPropose --> WaitForAccept : message_sent()
///     WaitForAccept --> ReadyToSendReveal : receive_position(Accept)
///     ReadyToSendReveal --> WaitForResting : message_sent()
///     WaitForResting --> ReadyToChooseAPlay : receive_position(Resting)
///     WaitForResting --> InsufficientFunds : balance below stake
///     ReadyToChooseAPlay --> Concluded : conclude()
/// ```
///
/// Player A's application state, a closed set of variants each holding
/// exactly the position and round data needed to resume.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerAState {
    ReadyToSendPreFundSetupA { position: Position },
    WaitForPreFundSetupB { last: Position },
    ReadyToDeploy { last: Position },
    WaitForBlockchainDeploy { last: Position },
    WaitForBToDeposit { last: Position, adjudicator: Address },
    ReadyToSendPostFundSetupA { position: Position },
    WaitForPostFundSetupB { last: Position },
    ReadyToChooseAPlay { last: Position },
    ReadyToSendPropose { position: Position, a_play: Play, salt: Salt, pre_round: Resolution },
    WaitForAccept { last: Position, a_play: Play, salt: Salt, pre_round: Resolution },
    ReadyToSendReveal { position: Position, result: GameResult },
    WaitForResting { last: Position },
    InsufficientFunds { last: Position },
    Concluded { position: Position, sent: bool },
}

impl PlayerAState {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerAState::ReadyToSendPreFundSetupA { .. } => "ReadyToSendPreFundSetupA",
            PlayerAState::WaitForPreFundSetupB { .. } => "WaitForPreFundSetupB",
            PlayerAState::ReadyToDeploy { .. } => "ReadyToDeploy",
            PlayerAState::WaitForBlockchainDeploy { .. } => "WaitForBlockchainDeploy",
            PlayerAState::WaitForBToDeposit { .. } => "WaitForBToDeposit",
            PlayerAState::ReadyToSendPostFundSetupA { .. } => "ReadyToSendPostFundSetupA",
            PlayerAState::WaitForPostFundSetupB { .. } => "WaitForPostFundSetupB",
            PlayerAState::ReadyToChooseAPlay { .. } => "ReadyToChooseAPlay",
            PlayerAState::ReadyToSendPropose { .. } => "ReadyToSendPropose",
            PlayerAState::WaitForAccept { .. } => "WaitForAccept",
            PlayerAState::ReadyToSendReveal { .. } => "ReadyToSendReveal",
            PlayerAState::WaitForResting { .. } => "WaitForResting",
            PlayerAState::InsufficientFunds { .. } => "InsufficientFunds",
            PlayerAState::Concluded { .. } => "Concluded",
        }
    }
}

/// The game engine for player A, the round initiator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AEngine {
    channel: Channel,
    stake: TokenAmount,
    state: PlayerAState,
}

impl AEngine {
    /// Start a new game. Produces the engine holding the first outbound
    /// `PreFundSetup` position at turn 0.
    pub fn setup_game(channel: Channel, stake: TokenAmount, balances: Resolution) -> Result<Self, GameSetupError> {
        check_setup(stake)?;
        let position = Position::pre_fund_setup(channel, 0, balances, 0);
        info!("A: new game on channel {}", channel.channel_id());
        Ok(AEngine { channel, stake, state: PlayerAState::ReadyToSendPreFundSetupA { position } })
    }

    pub fn state(&self) -> &PlayerAState {
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
        matches!(self.state, PlayerAState::Concluded { .. })
    }

    /// The most recent position this engine is anchored to, whether ours or
    /// the peer's.
    pub fn last_position(&self) -> &Position {
        match &self.state {
            PlayerAState::ReadyToSendPreFundSetupA { position }
            | PlayerAState::ReadyToSendPostFundSetupA { position }
            | PlayerAState::ReadyToSendPropose { position, .. }
            | PlayerAState::ReadyToSendReveal { position, .. }
            | PlayerAState::Concluded { position, .. } => position,
            PlayerAState::WaitForPreFundSetupB { last }
            | PlayerAState::ReadyToDeploy { last }
            | PlayerAState::WaitForBlockchainDeploy { last }
            | PlayerAState::WaitForBToDeposit { last, .. }
            | PlayerAState::WaitForPostFundSetupB { last }
            | PlayerAState::ReadyToChooseAPlay { last }
            | PlayerAState::WaitForAccept { last, .. }
            | PlayerAState::WaitForResting { last }
            | PlayerAState::InsufficientFunds { last } => last,
        }
    }

    /// A position waiting to be signed and sent to the peer, if any. Call
    /// [`message_sent`](Self::message_sent) once it has been dispatched.
    pub fn outbound_position(&self) -> Option<&Position> {
        match &self.state {
            PlayerAState::ReadyToSendPreFundSetupA { position }
            | PlayerAState::ReadyToSendPostFundSetupA { position }
            | PlayerAState::ReadyToSendPropose { position, .. }
            | PlayerAState::ReadyToSendReveal { position, .. } => Some(position),
            PlayerAState::Concluded { position, sent: false } => Some(position),
            _ => None,
        }
    }

    /// A chain action waiting to be serviced by the wallet, if any. Call
    /// [`transaction_sent`](Self::transaction_sent) once it has been
    /// broadcast.
    pub fn pending_funding_action(&self) -> Option<FundingAction> {
        match &self.state {
            PlayerAState::ReadyToDeploy { last } => Some(FundingAction::Deploy { value: last.resolution.a }),
            _ => None,
        }
    }

    /// Acknowledge that the pending outbound position has been dispatched.
    pub fn message_sent(self) -> Self {
        let AEngine { channel, stake, state } = self;
        let state = match state {
            PlayerAState::ReadyToSendPreFundSetupA { position } => PlayerAState::WaitForPreFundSetupB { last: position },
            PlayerAState::ReadyToSendPostFundSetupA { position } => {
                PlayerAState::WaitForPostFundSetupB { last: position }
            }
            PlayerAState::ReadyToSendPropose { position, a_play, salt, pre_round } => {
                PlayerAState::WaitForAccept { last: position, a_play, salt, pre_round }
            }
            PlayerAState::ReadyToSendReveal { position, .. } => PlayerAState::WaitForResting { last: position },
            PlayerAState::Concluded { position, .. } => PlayerAState::Concluded { position, sent: true },
            other => other,
        };
        AEngine { channel, stake, state }
    }

    /// Acknowledge that the pending chain action has been broadcast.
    pub fn transaction_sent(self) -> Self {
        let AEngine { channel, stake, state } = self;
        let state = match state {
            PlayerAState::ReadyToDeploy { last } => PlayerAState::WaitForBlockchainDeploy { last },
            other => other,
        };
        AEngine { channel, stake, state }
    }

    /// Commit to a play, legal only from `ReadyToChooseAPlay`: draws a fresh
    /// salt, provisionally shifts the stake to B, and prepares the `Propose`.
    pub fn choose_play(self, play: Play) -> Self {
        let AEngine { channel, stake, state } = self;
        let state = match state {
            PlayerAState::ReadyToChooseAPlay { last } => {
                let salt = Salt::random(&mut rand::rng());
                let pre_commit = hash_commitment(play, &salt);
                match last.resolution.shift_to_b(stake) {
                    Some(provisional) => {
                        let position = Position::game(
                            channel,
                            last.turn_num + 1,
                            provisional,
                            GameRound::Propose { stake, pre_commit },
                        );
                        debug!("A: committed to {play} at turn {}", position.turn_num);
                        PlayerAState::ReadyToSendPropose { position, a_play: play, salt, pre_round: last.resolution }
                    }
                    None => {
                        warn!("A: cannot stake {stake} from {}", last.resolution);
                        PlayerAState::ReadyToChooseAPlay { last }
                    }
                }
            }
            other => {
                debug!("A: choose_play ignored in state {}", other.name());
                other
            }
        };
        AEngine { channel, stake, state }
    }

    /// Feed a peer position into the engine. Positions that are not the
    /// expected phase, not the next turn, or not this channel are dropped
    /// with the state unchanged.
    pub fn receive_position(self, candidate: Position) -> Self {
        if !valid_transition(self.last_position(), &candidate) {
            debug!(
                "A: dropping position at turn {} in state {} (expected turn {})",
                candidate.turn_num,
                self.state.name(),
                self.last_position().turn_num + 1
            );
            return self;
        }
        let AEngine { channel, stake, state } = self;
        let kind = candidate.state.clone();
        let state = match (state, &kind) {
            (PlayerAState::WaitForPreFundSetupB { last }, StateKind::PreFundSetup) => {
                if candidate.resolution == last.resolution && candidate.state_count == 1 {
                    PlayerAState::ReadyToDeploy { last: candidate }
                } else {
                    PlayerAState::WaitForPreFundSetupB { last }
                }
            }
            (PlayerAState::WaitForPostFundSetupB { last }, StateKind::PostFundSetup) => {
                if candidate.resolution == last.resolution && candidate.state_count == 1 {
                    enter_choose_play(candidate, stake)
                } else {
                    PlayerAState::WaitForPostFundSetupB { last }
                }
            }
            (
                PlayerAState::WaitForAccept { last, a_play, salt, pre_round },
                StateKind::Game(GameRound::Accept { stake: round_stake, pre_commit, b_play }),
            ) => {
                let ours = hash_commitment(a_play, &salt);
                let acceptable =
                    *round_stake == stake && *pre_commit == ours && candidate.resolution == last.resolution;
                if !acceptable {
                    debug!("A: rejecting Accept at turn {}", candidate.turn_num);
                    PlayerAState::WaitForAccept { last, a_play, salt, pre_round }
                } else {
                    let result = calculate_result(a_play, *b_play);
                    match settle(result, pre_round, stake) {
                        Some(settled) => {
                            info!("A: round result {result}, resolution {settled}");
                            let reveal = Position::game(
                                channel,
                                candidate.turn_num + 1,
                                settled,
                                GameRound::Reveal { stake, b_play: *b_play, a_play, salt },
                            );
                            PlayerAState::ReadyToSendReveal { position: reveal, result }
                        }
                        None => PlayerAState::WaitForAccept { last, a_play, salt, pre_round },
                    }
                }
            }
            (PlayerAState::WaitForResting { last }, StateKind::Game(GameRound::Resting { stake: round_stake })) => {
                if *round_stake == stake && candidate.resolution == last.resolution {
                    enter_choose_play(candidate, stake)
                } else {
                    PlayerAState::WaitForResting { last }
                }
            }
            (PlayerAState::Concluded { position, sent }, _) => PlayerAState::Concluded { position, sent },
            (_state, StateKind::Conclude) => {
                info!("A: peer concluded at turn {}", candidate.turn_num);
                PlayerAState::Concluded { position: candidate.next_conclude(), sent: false }
            }
            (state, _) => {
                debug!("A: position phase not expected in state {}", state.name());
                state
            }
        };
        AEngine { channel, stake, state }
    }

    /// Feed a chain event into the funding phase.
    pub fn receive_event(self, event: ChainEvent) -> Self {
        let AEngine { channel, stake, state } = self;
        let state = match (state, event) {
            (PlayerAState::WaitForBlockchainDeploy { last }, ChainEvent::DeployConfirmed { adjudicator }) => {
                info!("A: adjudicator deployed at {adjudicator}");
                PlayerAState::WaitForBToDeposit { last, adjudicator }
            }
            (
                PlayerAState::WaitForBToDeposit { last, adjudicator },
                ChainEvent::FundsReceived { destination_holdings },
            ) => {
                if destination_holdings >= last.resolution.total() {
                    let position = Position::post_fund_setup(channel, last.turn_num + 1, last.resolution, 0);
                    PlayerAState::ReadyToSendPostFundSetupA { position }
                } else {
                    // Partial deposit; keep waiting.
                    PlayerAState::WaitForBToDeposit { last, adjudicator }
                }
            }
            (state, _) => state,
        };
        AEngine { channel, stake, state }
    }

    /// Build a `Conclude` position from the last known resolution, for
    /// voluntary or forced exit.
    pub fn conclude(self) -> Self {
        if self.is_concluded() {
            return self;
        }
        let position = self.last_position().next_conclude();
        info!("A: concluding at turn {} with {}", position.turn_num, position.resolution);
        AEngine { channel: self.channel, stake: self.stake, state: PlayerAState::Concluded { position, sent: false } }
    }
}

fn enter_choose_play(last: Position, stake: TokenAmount) -> PlayerAState {
    if last.resolution.can_fund_round(stake) {
        PlayerAState::ReadyToChooseAPlay { last }
    } else {
        info!("A: insufficient funds for another round at {}", last.resolution);
        PlayerAState::InsufficientFunds { last }
    }
}
