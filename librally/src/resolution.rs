use crate::amount::TokenAmount;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

//------------------------------------          Resolution          ------------------------------------------------//

/// How the channel's funds would be divided between the two participants if
/// the channel settled at this position: `[player A, player B]`.
///
/// The total is conserved across a round; only the stake moves between the
/// two entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub a: TokenAmount,
    pub b: TokenAmount,
}

impl Resolution {
    pub fn new(a: impl Into<TokenAmount>, b: impl Into<TokenAmount>) -> Self {
        Resolution { a: a.into(), b: b.into() }
    }

    pub fn total(&self) -> TokenAmount {
        self.a + self.b
    }

    /// Move `stake` from A to B. This is the provisional shift applied by a
    /// `Propose`/`Accept`, and the settlement when B wins the round.
    pub fn shift_to_b(&self, stake: TokenAmount) -> Option<Self> {
        let a = self.a.checked_sub(stake)?;
        let b = self.b.checked_add(stake)?;
        Some(Resolution { a, b })
    }

    /// Move `stake` from B to A: the settlement when A wins the round.
    pub fn shift_to_a(&self, stake: TokenAmount) -> Option<Self> {
        let a = self.a.checked_add(stake)?;
        let b = self.b.checked_sub(stake)?;
        Some(Resolution { a, b })
    }

    /// Whether both participants can cover another round at `stake`.
    pub fn can_fund_round(&self, stake: TokenAmount) -> bool {
        self.a >= stake && self.b >= stake
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.a, self.b)
    }
}
