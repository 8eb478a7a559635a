//! Transaction records and the store that tracks them through their
//! lifecycle.

use librally::channel::ChannelId;
use librally::crypto::Address;
use librally::amount::TokenAmount;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Mutex;

/// A transaction hash as reported by the node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(
    #[serde(serialize_with = "librally::helpers::to_hex", deserialize_with = "librally::helpers::array_from_hex")]
    [u8; 32],
);

impl TxHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        TxHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn as_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl Display for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl Debug for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TxHash({})", self.as_hex())
    }
}

/// An unsigned call, ready for nonce assignment and broadcast. `to` is
/// `None` for contract deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub to: Option<Address>,
    pub data: Vec<u8>,
    pub value: TokenAmount,
    pub chain_id: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Persisted before the send is attempted.
    Pending,
    /// Broadcast; a hash exists but the transaction may still be dropped.
    Submitted,
    Success,
    Failed,
}

/// What the node reports once a transaction is mined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub success: bool,
}

/// A submission-service record, keyed by channel and nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub channel_id: ChannelId,
    pub nonce: u64,
    pub from: Address,
    pub request: TransactionRequest,
    pub status: TransactionStatus,
    pub tx_hash: Option<TxHash>,
    pub receipt: Option<TransactionReceipt>,
    /// The node's rejection message, kept for failed sends.
    pub error: Option<String>,
}

/// Persistence for the submission service. The service writes `Pending`
/// before each send, `Submitted` on broadcast, and the terminal states from
/// a background task.
pub trait TransactionStore: Send + Sync + 'static {
    fn upsert(&self, tx: ChainTransaction);
    fn set_status(
        &self,
        channel_id: &ChannelId,
        nonce: u64,
        status: TransactionStatus,
        tx_hash: Option<TxHash>,
        error: Option<String>,
    );
    /// Attach the mined receipt and move the record to its terminal status.
    fn set_receipt(&self, channel_id: &ChannelId, nonce: u64, receipt: TransactionReceipt);
    fn get(&self, channel_id: &ChannelId, nonce: u64) -> Option<ChainTransaction>;
    fn by_channel(&self, channel_id: &ChannelId) -> Vec<ChainTransaction>;
}

/// In-memory store. Good enough for a single process; swap in something
/// durable behind the same trait for anything longer-lived.
#[derive(Default)]
pub struct MemoryTransactionStore {
    inner: Mutex<HashMap<(ChannelId, u64), ChainTransaction>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(ChannelId, u64), ChainTransaction>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TransactionStore for MemoryTransactionStore {
    fn upsert(&self, tx: ChainTransaction) {
        self.lock().insert((tx.channel_id, tx.nonce), tx);
    }

    fn set_status(
        &self,
        channel_id: &ChannelId,
        nonce: u64,
        status: TransactionStatus,
        tx_hash: Option<TxHash>,
        error: Option<String>,
    ) {
        if let Some(tx) = self.lock().get_mut(&(*channel_id, nonce)) {
            tx.status = status;
            if tx_hash.is_some() {
                tx.tx_hash = tx_hash;
            }
            if error.is_some() {
                tx.error = error;
            }
        }
    }

    fn set_receipt(&self, channel_id: &ChannelId, nonce: u64, receipt: TransactionReceipt) {
        if let Some(tx) = self.lock().get_mut(&(*channel_id, nonce)) {
            tx.status = if receipt.success { TransactionStatus::Success } else { TransactionStatus::Failed };
            tx.tx_hash = Some(receipt.tx_hash);
            tx.receipt = Some(receipt);
        }
    }

    fn get(&self, channel_id: &ChannelId, nonce: u64) -> Option<ChainTransaction> {
        self.lock().get(&(*channel_id, nonce)).cloned()
    }

    fn by_channel(&self, channel_id: &ChannelId) -> Vec<ChainTransaction> {
        let mut txs: Vec<ChainTransaction> =
            self.lock().values().filter(|tx| tx.channel_id == *channel_id).cloned().collect();
        txs.sort_by_key(|tx| tx.nonce);
        txs
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use librally::channel::Channel;

    fn channel_id() -> ChannelId {
        Channel::new(Address::new([0xaa; 20]), 1, [Address::new([1; 20]), Address::new([2; 20])]).channel_id()
    }

    fn request() -> TransactionRequest {
        TransactionRequest { to: None, data: vec![1, 2, 3], value: TokenAmount::new(5), chain_id: 3 }
    }

    fn pending(id: ChannelId, nonce: u64) -> ChainTransaction {
        ChainTransaction {
            channel_id: id,
            nonce,
            from: Address::new([5; 20]),
            request: request(),
            status: TransactionStatus::Pending,
            tx_hash: None,
            receipt: None,
            error: None,
        }
    }

    #[test]
    fn lifecycle_updates_are_visible() {
        let store = MemoryTransactionStore::new();
        let id = channel_id();
        store.upsert(pending(id, 7));
        let hash = TxHash::from_bytes([9; 32]);
        store.set_status(&id, 7, TransactionStatus::Submitted, Some(hash), None);
        let tx = store.get(&id, 7).unwrap();
        assert_eq!(tx.status, TransactionStatus::Submitted);
        assert_eq!(tx.tx_hash, Some(hash));

        // The receipt lands as the terminal update and keeps the hash.
        let receipt = TransactionReceipt { tx_hash: hash, block_number: 42, success: true };
        store.set_receipt(&id, 7, receipt);
        let tx = store.get(&id, 7).unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);
        assert_eq!(tx.tx_hash, Some(hash));
        assert_eq!(tx.receipt, Some(receipt));
        assert_eq!(tx.error, None);
    }

    #[test]
    fn failed_sends_keep_the_node_message() {
        let store = MemoryTransactionStore::new();
        let id = channel_id();
        store.upsert(pending(id, 2));
        store.set_status(&id, 2, TransactionStatus::Failed, None, Some("bad nonce".into()));
        let tx = store.get(&id, 2).unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.error.as_deref(), Some("bad nonce"));
    }

    #[test]
    fn reverted_receipts_mark_the_transaction_failed() {
        let store = MemoryTransactionStore::new();
        let id = channel_id();
        store.upsert(pending(id, 3));
        let receipt = TransactionReceipt { tx_hash: TxHash::from_bytes([7; 32]), block_number: 9, success: false };
        store.set_receipt(&id, 3, receipt);
        let tx = store.get(&id, 3).unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.receipt, Some(receipt));
    }

    #[test]
    fn by_channel_is_nonce_ordered() {
        let store = MemoryTransactionStore::new();
        let id = channel_id();
        for nonce in [3u64, 1, 2] {
            store.upsert(pending(id, nonce));
        }
        let nonces: Vec<u64> = store.by_channel(&id).into_iter().map(|tx| tx.nonce).collect();
        assert_eq!(nonces, vec![1, 2, 3]);
    }
}
