use crate::codec::CodecError;
use crate::crypto::Address;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum WalletError {
    #[error("The position could not be decoded. {0}")]
    Codec(#[from] CodecError),
    #[error("The position was signed by {recovered:?}, but turn {turn_num} belongs to {expected}")]
    BadSignature { expected: Address, recovered: Option<Address>, turn_num: u64 },
    #[error("The wallet holds no position for this channel yet")]
    NoPosition,
}
