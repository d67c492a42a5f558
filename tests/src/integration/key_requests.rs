//! # Group-Key Request Flows
//!
//! One immediate request per missing key, retries every propagation
//! timeout, and a hard stop after the attempt budget.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use shared_types::{Address, GroupKey, GroupKeyRequest};
    use stream_subscription::adapters::{AesGcmDecryptor, InMemoryGroupKeyStore, WireGroupKeyRequester};
    use stream_subscription::{
        BasicSubscription, KeyRequestState, Subscription, SubscriptionConfig, SubscriptionPorts,
    };

    use crate::integration::fixtures::*;

    fn key() -> GroupKey {
        GroupKey::new("k1", [1; 32])
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_ten_requests_then_silence() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let s = &fixture.subscription;

        s.handle_real_time_message(encrypted(1, None, &key()));
        assert_eq!(fixture.requester.count(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fixture.requester.count(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fixture.requester.count(), 10);
        assert_eq!(s.key_request_state("k1"), KeyRequestState::Exhausted);

        // Exhaustion leaves the message where it was
        assert_eq!(s.queued_for(&publisher(), "k1"), 1);
        assert!(fixture.handler.failures.lock().is_empty());

        let requests = fixture.requester.requests.lock();
        assert!(requests
            .iter()
            .all(|(to, ids)| *to == publisher() && ids == &vec!["k1".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_after_exhaustion_still_unlocks() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let s = &fixture.subscription;

        s.handle_real_time_message(encrypted(1, None, &key()));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(s.key_request_state("k1"), KeyRequestState::Exhausted);

        fixture.store.add(STREAM_ID, key());
        s.on_new_keys_added(&publisher(), &[key()]);

        assert_eq!(fixture.handler.timestamps(), vec![1]);
        assert_eq!(s.key_request_state("k1"), KeyRequestState::Absent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_after_exhaustion_fails_permanently() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let s = &fixture.subscription;

        s.handle_real_time_message(encrypted(1, None, &key()));
        tokio::time::sleep(Duration::from_secs(10)).await;

        // The key already failed once; this one is not given another cycle
        s.handle_real_time_message(encrypted(2, Some(1), &key()));
        assert_eq!(fixture.handler.failures.lock().len(), 1);
        assert_eq!(fixture.requester.count(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolved_key_stops_requests() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let s = &fixture.subscription;

        s.handle_real_time_message(encrypted(1, None, &key()));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(fixture.requester.count(), 3);

        fixture.store.add(STREAM_ID, key());
        s.on_new_keys_added(&publisher(), &[key()]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fixture.requester.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wire_requester_encodes_request() {
        let sent: Arc<Mutex<Vec<(Address, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        let requester = WireGroupKeyRequester::new(
            STREAM_ID,
            "rsa-public-key",
            Arc::new(move |to: &Address, json: String| sink.lock().push((to.clone(), json))),
        );
        let handler = Arc::new(RecordingHandler::default());
        let ports = SubscriptionPorts {
            handler: handler.clone(),
            key_store: Arc::new(InMemoryGroupKeyStore::new()),
            key_exchange: Arc::new(NoopKeyExchange),
            key_requester: Some(Arc::new(requester)),
            decryptor: Arc::new(AesGcmDecryptor),
        };
        let subscription =
            BasicSubscription::new(stream(), SubscriptionConfig::for_testing(), ports).unwrap();

        subscription.handle_real_time_message(encrypted(1, None, &key()));

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, publisher());
        let request = GroupKeyRequest::from_json(&sent[0].1).unwrap();
        assert_eq!(request.stream_id, STREAM_ID);
        assert_eq!(request.rsa_public_key, "rsa-public-key");
        assert_eq!(request.group_key_ids, vec!["k1".to_string()]);
    }
}
