//! Per-channel registration and dedup of adjudicator events.
//!
//! Channels register the asset-holder addresses they care about; the service
//! keeps one live subscription per distinct address no matter how many
//! channels share it, files incoming events against the owning channel, and
//! forwards deposits to the channel's wallet.

use crate::errors::EventServiceError;
use crate::transaction::TxHash;
use librally::amount::TokenAmount;
use librally::channel::ChannelId;
use librally::crypto::Address;
use librally::helpers::Timestamp;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Deposited,
    ChallengeCreated,
    GameConcluded,
    Refuted,
    RespondedWithMove,
}

/// An adjudicator event, already decoded from the log stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnchainEvent {
    Deposited {
        asset_holder: Address,
        transaction_hash: TxHash,
        block_number: u64,
        amount_deposited: TokenAmount,
        destination_holdings: TokenAmount,
        /// Set once the deposit is buried under the confirmation depth.
        /// Fresh events arrive with this unset; [`OnchainEventService::process_new_block`]
        /// flips it.
        finalized: bool,
    },
    ChallengeCreated { destination: Address, expiry: Timestamp, challenge: String },
    GameConcluded { destination: Address },
    Refuted { destination: Address, refutation: String },
    RespondedWithMove { destination: Address, response: String },
}

impl OnchainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            OnchainEvent::Deposited { .. } => EventKind::Deposited,
            OnchainEvent::ChallengeCreated { .. } => EventKind::ChallengeCreated,
            OnchainEvent::GameConcluded { .. } => EventKind::GameConcluded,
            OnchainEvent::Refuted { .. } => EventKind::Refuted,
            OnchainEvent::RespondedWithMove { .. } => EventKind::RespondedWithMove,
        }
    }

    /// The asset-holder address the event was emitted for.
    pub fn destination(&self) -> Address {
        match self {
            OnchainEvent::Deposited { asset_holder, .. } => *asset_holder,
            OnchainEvent::ChallengeCreated { destination, .. }
            | OnchainEvent::GameConcluded { destination }
            | OnchainEvent::Refuted { destination, .. }
            | OnchainEvent::RespondedWithMove { destination, .. } => *destination,
        }
    }
}

/// The channel wallet's funding callback.
pub trait ChannelFundingSink: Send + Sync + 'static {
    fn update_channel_funding(&self, channel_id: ChannelId, amount: TokenAmount, token: Option<Address>);
}

/// Where subscriptions land. Real implementations install a log filter at
/// the node; tests record the calls.
pub trait EventSubscriber: Send + Sync + 'static {
    fn subscribe(&self, asset_holder: Address);
    fn unsubscribe(&self, asset_holder: Address);
}

impl<T: EventSubscriber> EventSubscriber for Arc<T> {
    fn subscribe(&self, asset_holder: Address) {
        self.as_ref().subscribe(asset_holder)
    }

    fn unsubscribe(&self, asset_holder: Address) {
        self.as_ref().unsubscribe(asset_holder)
    }
}

struct Inner {
    /// Channels by the asset-holder addresses they registered.
    channels: HashMap<Address, HashSet<ChannelId>>,
    registered: HashMap<ChannelId, Vec<Address>>,
    events: HashMap<ChannelId, Vec<OnchainEvent>>,
}

/// Blocks that must be mined on top of a deposit before it counts as final.
pub const DEFAULT_CONFIRMATION_DEPTH: u64 = 5;

pub struct OnchainEventService<E, W> {
    subscriber: E,
    wallet: Option<Arc<W>>,
    confirmation_depth: u64,
    inner: Mutex<Inner>,
}

impl<E, W> OnchainEventService<E, W>
where
    E: EventSubscriber,
    W: ChannelFundingSink,
{
    pub fn new(subscriber: E) -> Self {
        let inner = Inner { channels: HashMap::new(), registered: HashMap::new(), events: HashMap::new() };
        OnchainEventService {
            subscriber,
            wallet: None,
            confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
            inner: Mutex::new(inner),
        }
    }

    pub fn with_wallet(mut self, wallet: Arc<W>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn with_confirmation_depth(mut self, depth: u64) -> Self {
        self.confirmation_depth = depth;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a channel and the asset-holder addresses backing it.
    /// Idempotent: repeat registration of a known channel is a no-op
    /// success, and an address shared by several channels gets exactly one
    /// subscription.
    pub fn register_channel(&self, channel_id: ChannelId, asset_holders: &[Address]) {
        let mut inner = self.lock();
        if inner.registered.contains_key(&channel_id) {
            debug!("Channel {channel_id} is already registered");
            return;
        }
        for holder in asset_holders {
            let watchers = inner.channels.entry(*holder).or_default();
            if watchers.is_empty() {
                self.subscriber.subscribe(*holder);
            }
            watchers.insert(channel_id);
        }
        inner.registered.insert(channel_id, asset_holders.to_vec());
        info!("Registered channel {channel_id} for {} asset holder(s)", asset_holders.len());
    }

    /// Drop a channel's registration, tearing down any subscription no other
    /// channel still needs.
    pub fn unregister_channel(&self, channel_id: ChannelId) -> Result<(), EventServiceError> {
        let mut inner = self.lock();
        let holders = inner.registered.remove(&channel_id).ok_or(EventServiceError::NotRegistered(channel_id))?;
        for holder in holders {
            if let Some(watchers) = inner.channels.get_mut(&holder) {
                watchers.remove(&channel_id);
                if watchers.is_empty() {
                    inner.channels.remove(&holder);
                    self.subscriber.unsubscribe(holder);
                }
            }
        }
        inner.events.remove(&channel_id);
        Ok(())
    }

    /// File an event from the log stream. Events for addresses no channel
    /// registered are dropped; deposits are forwarded to the wallet.
    pub fn process_event(&self, event: OnchainEvent) -> Result<(), EventServiceError> {
        let destination = event.destination();
        let channel_ids: Vec<ChannelId> = {
            let mut inner = self.lock();
            let Some(watchers) = inner.channels.get(&destination) else {
                debug!("Dropping event for unregistered address {destination}");
                return Ok(());
            };
            let ids: Vec<ChannelId> = watchers.iter().copied().collect();
            for id in &ids {
                inner.events.entry(*id).or_default().push(event.clone());
            }
            ids
        };
        if let OnchainEvent::Deposited { amount_deposited, .. } = &event {
            for id in channel_ids {
                let wallet = self.wallet.as_ref().ok_or(EventServiceError::NoChannelWallet(id))?;
                wallet.update_channel_funding(id, *amount_deposited, None);
            }
        }
        Ok(())
    }

    /// Advance the service's view of the chain head. Filed deposits become
    /// final once `confirmation_depth` blocks have been mined on top of the
    /// block that carried them; reorgs shallower than that cannot unwind a
    /// final deposit.
    pub fn process_new_block(&self, head: u64) {
        let mut inner = self.lock();
        for events in inner.events.values_mut() {
            for event in events.iter_mut() {
                if let OnchainEvent::Deposited { block_number, finalized, transaction_hash, .. } = event {
                    if !*finalized && head >= *block_number + self.confirmation_depth {
                        debug!("Deposit {transaction_hash} is final at head {head}");
                        *finalized = true;
                    }
                }
            }
        }
    }

    /// The definitive event of a kind for a channel. For `Deposited` this is
    /// the record with the greatest holdings, so replayed or reordered logs
    /// cannot move it backwards.
    pub fn latest_event(&self, channel_id: ChannelId, kind: EventKind) -> Result<Option<OnchainEvent>, EventServiceError> {
        let inner = self.lock();
        if !inner.registered.contains_key(&channel_id) {
            return Err(EventServiceError::NotRegistered(channel_id));
        }
        let events = inner.events.get(&channel_id).map(Vec::as_slice).unwrap_or_default();
        let latest = match kind {
            EventKind::Deposited => events
                .iter()
                .filter(|e| e.kind() == EventKind::Deposited)
                .max_by_key(|e| match e {
                    OnchainEvent::Deposited { destination_holdings, .. } => *destination_holdings,
                    _ => TokenAmount::ZERO,
                }),
            _ => events.iter().rev().find(|e| e.kind() == kind),
        };
        Ok(latest.cloned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn channel_id(nonce: u64) -> ChannelId {
        librally::channel::Channel::new(addr(0xaa), nonce, [addr(1), addr(2)]).channel_id()
    }

    #[derive(Default)]
    struct MockSubscriber {
        subscribed: Mutex<Vec<Address>>,
        unsubscribed: Mutex<Vec<Address>>,
    }

    impl EventSubscriber for MockSubscriber {
        fn subscribe(&self, asset_holder: Address) {
            self.subscribed.lock().unwrap().push(asset_holder);
        }

        fn unsubscribe(&self, asset_holder: Address) {
            self.unsubscribed.lock().unwrap().push(asset_holder);
        }
    }

    #[derive(Default)]
    struct MockWallet {
        updates: Mutex<Vec<(ChannelId, TokenAmount)>>,
    }

    impl ChannelFundingSink for MockWallet {
        fn update_channel_funding(&self, channel_id: ChannelId, amount: TokenAmount, _token: Option<Address>) {
            self.updates.lock().unwrap().push((channel_id, amount));
        }
    }

    fn service() -> (OnchainEventService<Arc<MockSubscriber>, MockWallet>, Arc<MockSubscriber>, Arc<MockWallet>) {
        let subscriber = Arc::new(MockSubscriber::default());
        let wallet = Arc::new(MockWallet::default());
        let service = OnchainEventService::new(Arc::clone(&subscriber)).with_wallet(Arc::clone(&wallet));
        (service, subscriber, wallet)
    }

    fn deposit_at(asset_holder: Address, amount: u64, holdings: u64, block_number: u64) -> OnchainEvent {
        OnchainEvent::Deposited {
            asset_holder,
            transaction_hash: TxHash::from_bytes([amount as u8; 32]),
            block_number,
            amount_deposited: TokenAmount::new(amount),
            destination_holdings: TokenAmount::new(holdings),
            finalized: false,
        }
    }

    fn deposit(asset_holder: Address, amount: u64, holdings: u64) -> OnchainEvent {
        deposit_at(asset_holder, amount, holdings, 100)
    }

    #[test]
    fn registration_is_idempotent() {
        let (service, subscriber, _) = service();
        service.register_channel(channel_id(1), &[addr(0xcc)]);
        service.register_channel(channel_id(1), &[addr(0xcc)]);
        assert_eq!(subscriber.subscribed.lock().unwrap().len(), 1);
    }

    #[test]
    fn shared_asset_holder_gets_one_subscription() {
        let (service, subscriber, _) = service();
        service.register_channel(channel_id(1), &[addr(0xcc)]);
        service.register_channel(channel_id(2), &[addr(0xcc), addr(0xdd)]);
        let subscribed = subscriber.subscribed.lock().unwrap().clone();
        assert_eq!(subscribed, vec![addr(0xcc), addr(0xdd)]);

        // The shared subscription survives one channel leaving.
        service.unregister_channel(channel_id(1)).unwrap();
        assert!(subscriber.unsubscribed.lock().unwrap().is_empty());
        service.unregister_channel(channel_id(2)).unwrap();
        assert_eq!(subscriber.unsubscribed.lock().unwrap().len(), 2);
    }

    #[test]
    fn deposits_are_forwarded_to_the_wallet() {
        let (service, _, wallet) = service();
        service.register_channel(channel_id(1), &[addr(0xcc)]);
        service.process_event(deposit(addr(0xcc), 5, 5)).unwrap();
        assert_eq!(wallet.updates.lock().unwrap().clone(), vec![(channel_id(1), TokenAmount::new(5))]);
    }

    #[test]
    fn unregistered_addresses_are_ignored() {
        let (service, _, wallet) = service();
        service.register_channel(channel_id(1), &[addr(0xcc)]);
        service.process_event(deposit(addr(0xee), 5, 5)).unwrap();
        assert!(wallet.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_wallet_is_an_error() {
        let subscriber = Arc::new(MockSubscriber::default());
        let service: OnchainEventService<_, MockWallet> = OnchainEventService::new(Arc::clone(&subscriber));
        service.register_channel(channel_id(1), &[addr(0xcc)]);
        let err = service.process_event(deposit(addr(0xcc), 5, 5)).unwrap_err();
        assert_eq!(err, EventServiceError::NoChannelWallet(channel_id(1)));
    }

    #[test]
    fn latest_deposit_has_the_greatest_holdings() {
        let (service, _, _) = service();
        service.register_channel(channel_id(1), &[addr(0xcc)]);
        service.process_event(deposit(addr(0xcc), 4, 9)).unwrap();
        service.process_event(deposit(addr(0xcc), 5, 5)).unwrap();

        let latest = service.latest_event(channel_id(1), EventKind::Deposited).unwrap();
        assert_eq!(latest, Some(deposit(addr(0xcc), 4, 9)));
        // Stable across repeated calls.
        let again = service.latest_event(channel_id(1), EventKind::Deposited).unwrap();
        assert_eq!(latest, again);
    }

    #[test]
    fn deposits_finalize_after_the_confirmation_depth() {
        let subscriber = Arc::new(MockSubscriber::default());
        let wallet = Arc::new(MockWallet::default());
        let service =
            OnchainEventService::new(Arc::clone(&subscriber)).with_wallet(wallet).with_confirmation_depth(3);
        service.register_channel(channel_id(1), &[addr(0xcc)]);
        service.process_event(deposit_at(addr(0xcc), 5, 5, 100)).unwrap();

        let is_final = |service: &OnchainEventService<Arc<MockSubscriber>, MockWallet>| {
            match service.latest_event(channel_id(1), EventKind::Deposited).unwrap() {
                Some(OnchainEvent::Deposited { finalized, .. }) => finalized,
                other => panic!("expected a deposit, got {other:?}"),
            }
        };
        assert!(!is_final(&service));

        // Two blocks on top is one short of the depth.
        service.process_new_block(102);
        assert!(!is_final(&service));
        service.process_new_block(103);
        assert!(is_final(&service));
    }

    #[test]
    fn latest_event_requires_registration() {
        let (service, _, _) = service();
        let err = service.latest_event(channel_id(9), EventKind::Deposited).unwrap_err();
        assert_eq!(err, EventServiceError::NotRegistered(channel_id(9)));
    }
}
