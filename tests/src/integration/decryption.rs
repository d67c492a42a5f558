//! # Decryption Flows
//!
//! Missing keys, the one-retry escalation to the consumer, per-key queue
//! unlocking and key rotation through the store-backed key exchange.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use shared_types::{Address, EncryptionType, GroupKey};
    use stream_subscription::adapters::{encrypt_group_key, InMemoryGroupKeyStore, StoreKeyExchange};
    use stream_subscription::{KeyRequestState, Subscription, SubscriptionConfig};

    use crate::integration::fixtures::*;

    fn k1() -> GroupKey {
        GroupKey::new("k1", [1; 32])
    }

    fn k2() -> GroupKey {
        GroupKey::new("k2", [2; 32])
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_permanent_reported_once() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let s = &fixture.subscription;

        s.handle_real_time_message(encrypted(1, None, &k1()));
        assert_eq!(s.queued_for(&publisher(), "k1"), 1);
        assert_eq!(fixture.requester.count(), 1);
        assert!(fixture.handler.failures.lock().is_empty());

        // The key that arrives does not open the message
        let bogus = GroupKey::new("k1", [9; 32]);
        fixture.store.add(STREAM_ID, bogus.clone());
        s.on_new_keys_added(&publisher(), &[bogus.clone()]);

        assert_eq!(fixture.handler.failures.lock().len(), 1);
        assert_eq!(s.queued_messages(), 0);
        assert_eq!(s.key_request_state("k1"), KeyRequestState::Absent);

        // Not requeued, not requested again, not reported again
        tokio::time::sleep(Duration::from_secs(5)).await;
        s.on_new_keys_added(&publisher(), &[bogus]);
        assert_eq!(fixture.handler.failures.lock().len(), 1);
        assert_eq!(fixture.requester.count(), 1);
        assert!(fixture.handler.delivered.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_arrival_unlocks_only_its_messages() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let s = &fixture.subscription;

        s.handle_real_time_message(encrypted(1, None, &k1()));
        s.handle_real_time_message(encrypted(2, Some(1), &k2()));
        assert_eq!(s.queued_for(&publisher(), "k1"), 1);
        assert_eq!(s.queued_for(&publisher(), "k2"), 1);

        fixture.store.add(STREAM_ID, k1());
        s.on_new_keys_added(&publisher(), &[k1()]);

        assert_eq!(fixture.handler.timestamps(), vec![1]);
        assert_eq!(s.queued_for(&publisher(), "k2"), 1);
        assert!(matches!(s.key_request_state("k2"), KeyRequestState::Pending { .. }));

        fixture.store.add(STREAM_ID, k2());
        s.on_new_keys_added(&publisher(), &[k2()]);
        assert_eq!(fixture.handler.timestamps(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_behind_pending_key_keep_chain_order() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let s = &fixture.subscription;

        for ts in 1..=3 {
            let prev = (ts > 1).then(|| ts - 1);
            s.handle_real_time_message(encrypted(ts, prev, &k1()));
        }
        assert_eq!(s.queued_for(&publisher(), "k1"), 3);
        assert_eq!(fixture.requester.count(), 1);

        fixture.store.add(STREAM_ID, k1());
        s.on_new_keys_added(&publisher(), &[k1()]);

        assert_eq!(fixture.handler.timestamps(), vec![1, 2, 3]);
        let delivered = fixture.handler.delivered.lock();
        assert!(delivered
            .iter()
            .all(|m| m.encryption_type() == EncryptionType::None));
        assert_eq!(delivered[0].content_json().unwrap()["n"], 1);
    }

    #[tokio::test]
    async fn test_rotated_key_decrypts_following_messages() {
        let store = Arc::new(InMemoryGroupKeyStore::new());
        store.add(STREAM_ID, k1());
        let exchange = Arc::new(StoreKeyExchange::new(store.clone()));
        let fixture =
            Fixture::with_exchange(SubscriptionConfig::for_testing(), exchange.clone(), store);

        let weak = fixture.subscription.downgrade();
        exchange.set_listener(Arc::new(move |publisher: &Address, keys: &[GroupKey]| {
            if let Some(subscription) = weak.upgrade() {
                subscription.on_new_keys_added(publisher, keys);
            }
        }));

        let rotated = encrypt_group_key(&k2(), &k1()).unwrap();
        let announce = encrypted(1, None, &k1()).with_new_group_key(rotated);
        fixture.subscription.handle_real_time_message(announce);
        fixture
            .subscription
            .handle_real_time_message(encrypted(2, Some(1), &k2()));

        assert_eq!(fixture.handler.timestamps(), vec![1, 2]);
        assert_eq!(fixture.requester.count(), 0);
        assert!(fixture.store.contains(STREAM_ID, "k2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_response_through_exchange_unlocks_queue() {
        let store = Arc::new(InMemoryGroupKeyStore::new());
        let exchange = Arc::new(StoreKeyExchange::new(store.clone()));
        let fixture =
            Fixture::with_exchange(SubscriptionConfig::for_testing(), exchange.clone(), store);
        let weak = fixture.subscription.downgrade();
        exchange.set_listener(Arc::new(move |publisher: &Address, keys: &[GroupKey]| {
            if let Some(subscription) = weak.upgrade() {
                subscription.on_new_keys_added(publisher, keys);
            }
        }));

        fixture
            .subscription
            .handle_real_time_message(encrypted(1, None, &k1()));
        assert_eq!(fixture.subscription.queued_messages(), 1);

        exchange.add_keys(STREAM_ID, &publisher(), vec![k1()]);

        assert_eq!(fixture.handler.timestamps(), vec![1]);
        assert_eq!(fixture.subscription.key_request_state("k1"), KeyRequestState::Absent);
    }
}
