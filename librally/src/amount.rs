use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::ops::Add;

/// An amount of the channel's settlement token, in its smallest unit.
///
/// Arithmetic that could underflow (paying out a stake) goes through the
/// checked methods; anything that returns `None` means the caller asked for
/// more than the balance holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAmount(u64);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub fn new(units: u64) -> Self {
        TokenAmount(units)
    }

    pub fn to_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(other.0).map(TokenAmount)
    }

    pub fn checked_sub(&self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_sub(other.0).map(TokenAmount)
    }

    /// Double this amount. Used when a full round's winnings (the stake from
    /// each side) move in one settlement step.
    pub fn checked_double(&self) -> Option<TokenAmount> {
        self.0.checked_mul(2).map(TokenAmount)
    }
}

impl Add for TokenAmount {
    type Output = TokenAmount;

    fn add(self, rhs: TokenAmount) -> TokenAmount {
        TokenAmount(self.0 + rhs.0)
    }
}

impl From<u64> for TokenAmount {
    fn from(units: u64) -> Self {
        TokenAmount(units)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::TokenAmount;

    #[test]
    fn checked_arithmetic() {
        let five = TokenAmount::new(5);
        let three = TokenAmount::new(3);
        assert_eq!(five.checked_sub(three), Some(TokenAmount::new(2)));
        assert_eq!(three.checked_sub(five), None);
        assert_eq!(five.checked_add(three), Some(TokenAmount::new(8)));
        assert_eq!(TokenAmount::new(u64::MAX).checked_add(TokenAmount::new(1)), None);
        assert_eq!(three.checked_double(), Some(TokenAmount::new(6)));
    }

    #[test]
    fn zero() {
        assert!(TokenAmount::ZERO.is_zero());
        assert!(!TokenAmount::new(1).is_zero());
    }
}
