//! The on-chain side of a rally channel: nonce-safe transaction
//! submission, adjudicator event routing, call construction and expiry
//! timers. Everything off-chain lives in `librally`.

pub mod builder;
pub mod errors;
pub mod events;
pub mod submitter;
pub mod transaction;
pub mod watcher;

pub use errors::{BuilderError, ChainClientError, EventServiceError, TransactionSubmissionError};
pub use events::{
    ChannelFundingSink, EventKind, EventSubscriber, OnchainEvent, OnchainEventService, DEFAULT_CONFIRMATION_DEPTH,
};
pub use submitter::{ChainClient, SubmitOptions, TransactionResponse, TransactionSubmissionService};
pub use transaction::{
    ChainTransaction, MemoryTransactionStore, TransactionReceipt, TransactionRequest, TransactionStatus,
    TransactionStore, TxHash,
};
pub use watcher::TimeoutWatcher;
