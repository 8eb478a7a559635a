use librally::channel::ChannelId;
use thiserror::Error;

/// What a node client can report back. The submission service classifies
/// these by message text, the way node error strings arrive in practice.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainClientError {
    #[error("The node rejected the transaction. {0}")]
    Rejected(String),
    #[error("RPC error: {0}")]
    Rpc(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransactionSubmissionError {
    #[error("maxSendAttempts was zero, so nothing was sent")]
    ZeroAttempts,
    #[error("All send attempts failed. {}", attempts.join("; "))]
    FailedAllAttempts { attempts: Vec<String> },
    #[error("Send failed with an unrecognized error. {}", attempts.join("; "))]
    UnknownError { attempts: Vec<String> },
}

impl TransactionSubmissionError {
    /// The per-attempt error messages, oldest first.
    pub fn attempts(&self) -> &[String] {
        match self {
            TransactionSubmissionError::ZeroAttempts => &[],
            TransactionSubmissionError::FailedAllAttempts { attempts }
            | TransactionSubmissionError::UnknownError { attempts } => attempts,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EventServiceError {
    #[error("Channel {0} has not been registered with the event service")]
    NotRegistered(ChannelId),
    #[error("Channel {0} has no wallet attached to forward funding updates to")]
    NoChannelWallet(ChannelId),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum BuilderError {
    #[error("The position payload is not 0x-prefixed hex. {0}")]
    InvalidPayload(#[from] hex::FromHexError),
    #[error("The position payload is missing its 0x prefix")]
    MissingPrefix,
}
