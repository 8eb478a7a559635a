//! The single choke-point for on-chain sends.
//!
//! Every transaction for one signing key goes through one
//! [`TransactionSubmissionService`], which serializes sends behind an async
//! mutex so nonce assignment cannot race, retries the error shapes nodes
//! produce transiently, and records each attempt in a [`TransactionStore`].

use crate::errors::{ChainClientError, TransactionSubmissionError};
use crate::transaction::{
    ChainTransaction, TransactionReceipt, TransactionRequest, TransactionStatus, TransactionStore, TxHash,
};
use librally::channel::ChannelId;
use librally::crypto::Address;
use log::*;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A minimal node client. Implementations talk JSON-RPC; tests swap in a
/// scripted mock.
pub trait ChainClient: Clone + Send + Sync + 'static {
    /// The number of transactions the chain has seen from `address`,
    /// including pending ones. Doubles as the next free nonce.
    fn transaction_count(&self, address: Address) -> impl Future<Output = Result<u64, ChainClientError>> + Send;

    fn send_transaction(
        &self,
        nonce: u64,
        request: TransactionRequest,
    ) -> impl Future<Output = Result<TxHash, ChainClientError>> + Send;

    fn wait_for_receipt(&self, tx_hash: TxHash) -> impl Future<Output = Result<TransactionReceipt, ChainClientError>> + Send;
}

/// Error shapes a node emits for conditions that clear on their own, mostly
/// nonce races with transactions sent outside this service. Matched
/// case-insensitively as substrings.
const RECOVERABLE_PATTERNS: [&str; 4] =
    ["bad nonce", "invalid nonce", "replacement transaction underpriced", "missing transaction hash"];

fn is_recoverable(message: &str) -> bool {
    let message = message.to_lowercase();
    RECOVERABLE_PATTERNS.iter().any(|pattern| message.contains(pattern))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitOptions {
    pub max_send_attempts: usize,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        SubmitOptions { max_send_attempts: 3 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransactionResponse {
    pub tx_hash: TxHash,
    pub nonce: u64,
}

/// The in-memory half of nonce assignment. The chain count is sampled fresh
/// for every attempt; this only remembers what we ourselves handed out.
#[derive(Default)]
struct NonceLane {
    last_assigned: Option<u64>,
}

impl NonceLane {
    fn next(&mut self, chain_count: u64) -> u64 {
        let nonce = match self.last_assigned {
            Some(last) => chain_count.max(last + 1),
            None => chain_count,
        };
        self.last_assigned = Some(nonce);
        nonce
    }
}

pub struct TransactionSubmissionService<C, S> {
    client: C,
    store: Arc<S>,
    sender: Address,
    lane: Mutex<NonceLane>,
}

impl<C, S> TransactionSubmissionService<C, S>
where
    C: ChainClient,
    S: TransactionStore,
{
    pub fn new(client: C, store: Arc<S>, sender: Address) -> Self {
        TransactionSubmissionService { client, store, sender, lane: Mutex::new(NonceLane::default()) }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Send one transaction, retrying recoverable node errors up to
    /// `max_send_attempts` times with a fresh nonce sample per attempt.
    /// Returns as soon as the transaction is broadcast; mining is tracked by
    /// a background task that updates the store.
    pub async fn submit_transaction(
        &self,
        channel_id: ChannelId,
        request: TransactionRequest,
        options: SubmitOptions,
    ) -> Result<TransactionResponse, TransactionSubmissionError> {
        if options.max_send_attempts == 0 {
            return Err(TransactionSubmissionError::ZeroAttempts);
        }
        // Holding the lane across all attempts totally orders sends.
        let mut lane = self.lane.lock().await;
        let mut attempts = Vec::new();
        for attempt in 1..=options.max_send_attempts {
            let chain_count = match self.client.transaction_count(self.sender).await {
                Ok(count) => count,
                Err(err) => {
                    attempts.push(format!("attempt {attempt}: {err}"));
                    return Err(TransactionSubmissionError::UnknownError { attempts });
                }
            };
            let nonce = lane.next(chain_count);
            self.store.upsert(ChainTransaction {
                channel_id,
                nonce,
                from: self.sender,
                request: request.clone(),
                status: TransactionStatus::Pending,
                tx_hash: None,
                receipt: None,
                error: None,
            });
            match self.client.send_transaction(nonce, request.clone()).await {
                Ok(tx_hash) => {
                    debug!("Broadcast {tx_hash} with nonce {nonce} on attempt {attempt}");
                    self.store.set_status(&channel_id, nonce, TransactionStatus::Submitted, Some(tx_hash), None);
                    self.track_receipt(channel_id, nonce, tx_hash);
                    return Ok(TransactionResponse { tx_hash, nonce });
                }
                Err(err) => {
                    let message = err.to_string();
                    self.store.set_status(&channel_id, nonce, TransactionStatus::Failed, None, Some(message.clone()));
                    attempts.push(format!("attempt {attempt}: {message}"));
                    if !is_recoverable(&message) {
                        warn!("Send failed with an unrecognized error, giving up: {message}");
                        return Err(TransactionSubmissionError::UnknownError { attempts });
                    }
                    info!("Send attempt {attempt} failed recoverably: {message}");
                }
            }
        }
        Err(TransactionSubmissionError::FailedAllAttempts { attempts })
    }

    /// Watch for the receipt without blocking the submitting caller.
    fn track_receipt(&self, channel_id: ChannelId, nonce: u64, tx_hash: TxHash) {
        let client = self.client.clone();
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match client.wait_for_receipt(tx_hash).await {
                Ok(receipt) => store.set_receipt(&channel_id, nonce, receipt),
                Err(err) => {
                    warn!("Receipt lookup for {tx_hash} failed: {err}");
                    store.set_status(&channel_id, nonce, TransactionStatus::Failed, None, Some(err.to_string()));
                }
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transaction::MemoryTransactionStore;
    use librally::amount::TokenAmount;
    use librally::channel::Channel;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn channel_id() -> ChannelId {
        Channel::new(addr(0xaa), 1, [addr(1), addr(2)]).channel_id()
    }

    fn request() -> TransactionRequest {
        TransactionRequest { to: Some(addr(0xcc)), data: vec![0xde, 0xad], value: TokenAmount::new(1), chain_id: 3 }
    }

    /// Scripted node: pops one result per send, records the nonces used.
    #[derive(Clone, Default)]
    struct MockClient {
        chain_count: Arc<StdMutex<u64>>,
        script: Arc<StdMutex<VecDeque<Result<(), ChainClientError>>>>,
        sent_nonces: Arc<StdMutex<Vec<u64>>>,
    }

    impl MockClient {
        fn with_script(script: Vec<Result<(), ChainClientError>>) -> Self {
            let client = MockClient::default();
            *client.script.lock().unwrap() = script.into();
            client
        }

        fn set_chain_count(&self, count: u64) {
            *self.chain_count.lock().unwrap() = count;
        }

        fn sent_nonces(&self) -> Vec<u64> {
            self.sent_nonces.lock().unwrap().clone()
        }
    }

    impl ChainClient for MockClient {
        async fn transaction_count(&self, _address: Address) -> Result<u64, ChainClientError> {
            Ok(*self.chain_count.lock().unwrap())
        }

        async fn send_transaction(&self, nonce: u64, _request: TransactionRequest) -> Result<TxHash, ChainClientError> {
            let outcome = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
            self.sent_nonces.lock().unwrap().push(nonce);
            outcome.map(|_| {
                let mut bytes = [0u8; 32];
                bytes[..8].copy_from_slice(&nonce.to_le_bytes());
                TxHash::from_bytes(bytes)
            })
        }

        async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt, ChainClientError> {
            Ok(TransactionReceipt { tx_hash, block_number: 1, success: true })
        }
    }

    fn service(client: MockClient) -> TransactionSubmissionService<MockClient, MemoryTransactionStore> {
        TransactionSubmissionService::new(client, Arc::new(MemoryTransactionStore::new()), addr(0x05))
    }

    #[tokio::test]
    async fn zero_attempts_sends_nothing() {
        env_logger::try_init().ok();
        let client = MockClient::default();
        let service = service(client.clone());
        let err = service
            .submit_transaction(channel_id(), request(), SubmitOptions { max_send_attempts: 0 })
            .await
            .unwrap_err();
        assert_eq!(err, TransactionSubmissionError::ZeroAttempts);
        assert!(client.sent_nonces().is_empty());
    }

    #[tokio::test]
    async fn recoverable_failures_retry_up_to_the_bound() {
        env_logger::try_init().ok();
        let bad = Err(ChainClientError::Rejected("Bad Nonce".into()));
        let client = MockClient::with_script(vec![bad.clone(), bad.clone(), bad]);
        let service = service(client.clone());
        let err = service
            .submit_transaction(channel_id(), request(), SubmitOptions { max_send_attempts: 3 })
            .await
            .unwrap_err();
        match err {
            TransactionSubmissionError::FailedAllAttempts { attempts } => {
                assert_eq!(attempts.len(), 3);
                assert!(attempts[0].starts_with("attempt 1:"));
                assert!(attempts[2].starts_with("attempt 3:"));
            }
            other => panic!("expected FailedAllAttempts, got {other:?}"),
        }
        assert_eq!(client.sent_nonces().len(), 3);
    }

    #[tokio::test]
    async fn unrecognized_errors_fail_fast() {
        env_logger::try_init().ok();
        let client =
            MockClient::with_script(vec![Err(ChainClientError::Rejected("intrinsic gas too low".into()))]);
        let service = service(client.clone());
        let err = service
            .submit_transaction(channel_id(), request(), SubmitOptions { max_send_attempts: 5 })
            .await
            .unwrap_err();
        assert!(matches!(err, TransactionSubmissionError::UnknownError { ref attempts } if attempts.len() == 1));
        // The remaining four attempts were not consumed.
        assert_eq!(client.sent_nonces().len(), 1);
    }

    #[tokio::test]
    async fn nonces_never_collide_under_concurrent_submits() {
        env_logger::try_init().ok();
        let client = MockClient::default();
        let service = Arc::new(service(client.clone()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.submit_transaction(channel_id(), request(), SubmitOptions::default()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let mut nonces = client.sent_nonces();
        nonces.sort_unstable();
        assert_eq!(nonces, (0..8).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn nonce_resyncs_with_the_chain_count() {
        env_logger::try_init().ok();
        let client = MockClient::default();
        let service = service(client.clone());
        let first = service.submit_transaction(channel_id(), request(), SubmitOptions::default()).await.unwrap();
        assert_eq!(first.nonce, 0);

        // Something outside this service pushed the account to nonce 10.
        client.set_chain_count(10);
        let second = service.submit_transaction(channel_id(), request(), SubmitOptions::default()).await.unwrap();
        assert_eq!(second.nonce, 10);

        // Chain count lags what we assigned; in-memory wins.
        client.set_chain_count(4);
        let third = service.submit_transaction(channel_id(), request(), SubmitOptions::default()).await.unwrap();
        assert_eq!(third.nonce, 11);
    }

    #[tokio::test]
    async fn store_tracks_the_transaction_to_success() {
        env_logger::try_init().ok();
        let client = MockClient::default();
        let service = service(client);
        let id = channel_id();
        let response = service.submit_transaction(id, request(), SubmitOptions::default()).await.unwrap();

        // The receipt task runs in the background.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let tx = service.store().get(&id, response.nonce).unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(tx.tx_hash, Some(response.tx_hash));
        assert_eq!(tx.from, addr(0x05));
        assert_eq!(tx.receipt.map(|r| r.block_number), Some(1));
    }

    #[tokio::test]
    async fn failed_attempts_are_recorded_before_the_retry_succeeds() {
        env_logger::try_init().ok();
        let client = MockClient::with_script(vec![Err(ChainClientError::Rejected("invalid nonce".into())), Ok(())]);
        let service = service(client.clone());
        let id = channel_id();
        let response = service.submit_transaction(id, request(), SubmitOptions::default()).await.unwrap();
        assert_eq!(client.sent_nonces(), vec![0, 1]);
        let failed = service.store().get(&id, 0).unwrap();
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("The node rejected the transaction. invalid nonce"));
        assert_eq!(response.nonce, 1);
    }
}
