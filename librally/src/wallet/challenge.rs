//! Answering an on-chain challenge.
//!
//! A challenge is a stalled counterparty's (or a cheater's) claim that some
//! position is the channel's latest. The non-challenging party gets until
//! the expiry to answer with a better story, after which the adjudicator
//! settles on the challenged position.

use crate::channel::PlayerRole;
use crate::helpers::Timestamp;
use crate::position::Position;
use log::*;
use serde::{Deserialize, Serialize};

/// The answers a party may pick from, depending on what it holds relative to
/// the challenged position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeResponse {
    /// Produce the natural next move on top of the challenged position.
    RespondWithMove,
    /// Resend a move we already made past the challenged position.
    RespondWithExistingMove,
    /// Present a strictly newer signed position; the challenge was stale.
    Refute,
    /// Give up on further play and conclude at the known balances.
    Conclude,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeState {
    /// Waiting for exactly one response to be selected before the expiry.
    AcknowledgeChallenge { expiry: Timestamp, responses: Vec<ChallengeResponse> },
    /// A response is on chain; waiting for the adjudicator to clear or the
    /// clock to run out.
    WaitForChallengeConcludeOrExpire { expiry: Timestamp },
    /// The challenge was answered in time; normal play may resume.
    ChallengeAnswered,
    /// The expiry elapsed. The channel is closed; withdrawal is next.
    ChannelClosed,
}

/// The single on-chain call a selected response turns into. Positions come
/// back raw; the caller seals and routes them to the submission service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengeEffect {
    /// Ask the game engine for the move that follows `last`, then put it on
    /// chain as the response.
    RespondWithMove { last: Position },
    RespondWithExistingMove { response: Position },
    Refute { refutation: Position },
    Conclude { position: Position },
}

/// Dispute machine for one observed challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeMachine {
    role: PlayerRole,
    /// The position this party holds as latest. If the challenge was more
    /// advanced than what we had stored, this is the challenge itself.
    local: Position,
    newer: Option<Position>,
    challenge: Position,
    state: ChallengeState,
}

impl ChallengeMachine {
    /// Enter `AcknowledgeChallenge`, working out which responses the party's
    /// holdings support. `newer` is any valid position received out of band
    /// after the challenged one.
    pub fn acknowledge(
        role: PlayerRole,
        local: Position,
        newer: Option<Position>,
        challenge: Position,
        expiry: Timestamp,
    ) -> Self {
        let mut responses = Vec::new();
        let mut local = local;
        if challenge.turn_num > local.turn_num {
            // The challenger knows more than we do. Adopt their position as
            // the reference and either play on from it or bail out.
            info!("Challenge at turn {} is ahead of our turn {}", challenge.turn_num, local.turn_num);
            local = challenge.clone();
            responses.push(ChallengeResponse::RespondWithMove);
            responses.push(ChallengeResponse::Conclude);
        } else {
            if local == challenge && PlayerRole::mover_of(challenge.turn_num + 1) == role {
                responses.push(ChallengeResponse::RespondWithMove);
            }
            if local.turn_num > challenge.turn_num {
                responses.push(ChallengeResponse::RespondWithExistingMove);
            }
        }
        if newer.as_ref().is_some_and(|n| n.turn_num > challenge.turn_num) {
            responses.push(ChallengeResponse::Refute);
        }
        let state = ChallengeState::AcknowledgeChallenge { expiry, responses };
        ChallengeMachine { role, local, newer, challenge, state }
    }

    pub fn state(&self) -> &ChallengeState {
        &self.state
    }

    pub fn role(&self) -> PlayerRole {
        self.role
    }

    pub fn challenged_position(&self) -> &Position {
        &self.challenge
    }

    pub fn responses(&self) -> &[ChallengeResponse] {
        match &self.state {
            ChallengeState::AcknowledgeChallenge { responses, .. } => responses,
            _ => &[],
        }
    }

    /// Commit to one of the offered responses. Selecting a response that was
    /// not offered, or selecting twice, changes nothing.
    pub fn select(&mut self, response: ChallengeResponse) -> Option<ChallengeEffect> {
        let ChallengeState::AcknowledgeChallenge { expiry, responses } = &self.state else {
            debug!("Response selected but no challenge is pending");
            return None;
        };
        if !responses.contains(&response) {
            debug!("Response {response:?} is not available for this challenge");
            return None;
        }
        let expiry = *expiry;
        let effect = match response {
            ChallengeResponse::RespondWithMove => ChallengeEffect::RespondWithMove { last: self.local.clone() },
            ChallengeResponse::RespondWithExistingMove => {
                ChallengeEffect::RespondWithExistingMove { response: self.local.clone() }
            }
            ChallengeResponse::Refute => match &self.newer {
                Some(refutation) => ChallengeEffect::Refute { refutation: refutation.clone() },
                None => return None,
            },
            ChallengeResponse::Conclude => ChallengeEffect::Conclude { position: self.local.next_conclude() },
        };
        self.state = ChallengeState::WaitForChallengeConcludeOrExpire { expiry };
        Some(effect)
    }

    /// The timeout watcher fired. An unanswered challenge is force-concluded;
    /// an answered one that still expired means the channel is closed.
    pub fn expired(&mut self) -> Option<ChallengeEffect> {
        match &self.state {
            ChallengeState::AcknowledgeChallenge { .. } => {
                warn!("Challenge expired unanswered; concluding at turn {}", self.local.turn_num + 1);
                self.state = ChallengeState::ChannelClosed;
                Some(ChallengeEffect::Conclude { position: self.local.next_conclude() })
            }
            ChallengeState::WaitForChallengeConcludeOrExpire { .. } => {
                self.state = ChallengeState::ChannelClosed;
                None
            }
            _ => None,
        }
    }

    /// The adjudicator reported the challenge cleared.
    pub fn challenge_concluded(&mut self) {
        if matches!(self.state, ChallengeState::WaitForChallengeConcludeOrExpire { .. }) {
            self.state = ChallengeState::ChallengeAnswered;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::amount::TokenAmount;
    use crate::channel::Channel;
    use crate::crypto::Address;
    use crate::position::StateKind;
    use crate::resolution::Resolution;
    use std::time::Duration;

    fn channel() -> Channel {
        Channel::new(Address::new([0xaa; 20]), 7, [Address::new([1; 20]), Address::new([2; 20])])
    }

    fn post_fund(turn_num: u64, state_count: u64) -> Position {
        Position::post_fund_setup(channel(), turn_num, Resolution::new(5u64, 4u64), state_count)
    }

    fn expiry() -> Timestamp {
        Timestamp::from_now(Duration::from_secs(600))
    }

    #[test]
    fn our_turn_offers_respond_with_move() {
        let local = post_fund(3, 1);
        let machine = ChallengeMachine::acknowledge(PlayerRole::A, local.clone(), None, local, expiry());
        assert_eq!(machine.responses(), &[ChallengeResponse::RespondWithMove]);
    }

    #[test]
    fn already_answered_offers_existing_move() {
        let local = post_fund(3, 1);
        let challenged = post_fund(2, 0);
        let machine = ChallengeMachine::acknowledge(PlayerRole::B, local.clone(), None, challenged, expiry());
        assert_eq!(machine.responses(), &[ChallengeResponse::RespondWithExistingMove]);

        let mut machine = machine;
        let effect = machine.select(ChallengeResponse::RespondWithExistingMove);
        assert_eq!(effect, Some(ChallengeEffect::RespondWithExistingMove { response: local }));
        assert!(matches!(machine.state(), ChallengeState::WaitForChallengeConcludeOrExpire { .. }));
    }

    #[test]
    fn newer_position_offers_refutation() {
        let local = post_fund(2, 0);
        let newer = post_fund(3, 1);
        let machine =
            ChallengeMachine::acknowledge(PlayerRole::A, local.clone(), Some(newer.clone()), local, expiry());
        assert!(machine.responses().contains(&ChallengeResponse::Refute));
        let mut machine = machine;
        assert_eq!(machine.select(ChallengeResponse::Refute), Some(ChallengeEffect::Refute { refutation: newer }));
    }

    #[test]
    fn challenge_ahead_of_us_is_absorbed() {
        let local = post_fund(2, 0);
        let challenged = post_fund(3, 1);
        let mut machine = ChallengeMachine::acknowledge(PlayerRole::A, local, None, challenged.clone(), expiry());
        assert_eq!(machine.responses(), &[ChallengeResponse::RespondWithMove, ChallengeResponse::Conclude]);
        let effect = machine.select(ChallengeResponse::Conclude);
        match effect {
            Some(ChallengeEffect::Conclude { position }) => {
                assert_eq!(position.turn_num, challenged.turn_num + 1);
                assert_eq!(position.state, StateKind::Conclude);
                assert_eq!(position.resolution.total(), TokenAmount::new(9));
            }
            other => panic!("expected a conclude effect, got {other:?}"),
        }
    }

    #[test]
    fn unoffered_response_is_a_no_op() {
        let local = post_fund(3, 1);
        let mut machine = ChallengeMachine::acknowledge(PlayerRole::A, local.clone(), None, local, expiry());
        assert_eq!(machine.select(ChallengeResponse::Refute), None);
        assert!(matches!(machine.state(), ChallengeState::AcknowledgeChallenge { .. }));
    }

    #[test]
    fn expiry_forces_a_conclude() {
        let local = post_fund(3, 1);
        let mut machine = ChallengeMachine::acknowledge(PlayerRole::A, local.clone(), None, local, expiry());
        let effect = machine.expired();
        assert!(matches!(effect, Some(ChallengeEffect::Conclude { .. })));
        assert_eq!(machine.state(), &ChallengeState::ChannelClosed);
    }

    #[test]
    fn cleared_challenge_resumes_play() {
        let local = post_fund(3, 1);
        let mut machine = ChallengeMachine::acknowledge(PlayerRole::A, local.clone(), None, local, expiry());
        machine.select(ChallengeResponse::RespondWithMove);
        machine.challenge_concluded();
        assert_eq!(machine.state(), &ChallengeState::ChallengeAnswered);
    }
}
