//! # Ordering Flows
//!
//! Chain order under shuffled arrival, gap skipping on a full buffer, gap
//! reports on a timer, and resend requests from the wire gap handler.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use proptest::prelude::*;
    use shared_types::{MessageRef, ResendFromRequest};
    use stream_subscription::{ResendGapHandler, Subscription, SubscriptionConfig};

    use crate::integration::fixtures::*;

    // =========================================================================
    // ORDER
    // =========================================================================

    proptest! {
        #[test]
        fn prop_shuffled_chain_delivered_in_order(order in Just((2..=40i64).collect::<Vec<_>>()).prop_shuffle()) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let _guard = runtime.enter();
            let fixture = Fixture::new(SubscriptionConfig::default());

            fixture.subscription.handle_real_time_message(message(1, None));
            for ts in order {
                fixture.subscription.handle_real_time_message(message(ts, Some(ts - 1)));
            }

            prop_assert_eq!(fixture.handler.timestamps(), (1..=40).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_chains_are_independent() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let s = &fixture.subscription;

        s.handle_real_time_message(message_on("a", 1, None));
        s.handle_real_time_message(message_on("b", 10, None));
        s.handle_real_time_message(message_on("a", 3, Some(2)));
        s.handle_real_time_message(message_on("b", 11, Some(10)));

        // chain a is blocked at 2, chain b is not
        assert_eq!(fixture.handler.timestamps(), vec![1, 10, 11]);
        assert_eq!(s.chains().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicates_dropped() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let s = &fixture.subscription;

        s.handle_real_time_message(message(1, None));
        s.handle_real_time_message(message(2, Some(1)));
        s.handle_resent_message(message(1, None));
        s.handle_resent_message(message(2, Some(1)));

        assert_eq!(fixture.handler.timestamps(), vec![1, 2]);
    }

    // =========================================================================
    // GAPS
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_full_buffer_skips_gap_without_reporting() {
        let config = SubscriptionConfig {
            max_queue_size: 4,
            ..SubscriptionConfig::for_testing()
        };
        let fixture = Fixture::new(config);
        let gaps = Arc::new(RecordingGapHandler::default());
        fixture.subscription.set_gap_handler(gaps.clone());

        fixture.subscription.handle_real_time_message(message(1, None));
        // 2 never arrives; 3..=7 is one more than the buffer holds
        for ts in 3..=7 {
            fixture.subscription.handle_real_time_message(message(ts, Some(ts - 1)));
        }

        assert_eq!(fixture.handler.timestamps(), vec![1, 3, 4, 5, 6, 7]);
        let chain = &fixture.subscription.chains()[0];
        assert!(chain.gap.is_none());
        assert!(!chain.gap_timer_active);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(gaps.gaps.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_stays_bounded_without_skipping() {
        let config = SubscriptionConfig {
            max_queue_size: 3,
            skip_gaps_on_full_queue: false,
            ..SubscriptionConfig::for_testing()
        };
        let fixture = Fixture::new(config);
        let s = &fixture.subscription;

        s.handle_real_time_message(message(1, None));
        for ts in 3..=102 {
            s.handle_real_time_message(message(ts, Some(ts - 1)));
        }
        assert_eq!(s.chains()[0].queued, 3);

        s.handle_real_time_message(message(2, Some(1)));
        assert_eq!(fixture.handler.timestamps(), vec![1, 2, 3, 4, 5]);
        assert_eq!(s.chains()[0].queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gap_reported_after_propagation_timeout() {
        let config = SubscriptionConfig {
            propagation_timeout_ms: 200,
            resend_timeout_ms: 100,
            max_gap_requests: 3,
            ..SubscriptionConfig::for_testing()
        };
        let fixture = Fixture::new(config);
        let gaps = Arc::new(RecordingGapHandler::default());
        fixture.subscription.set_gap_handler(gaps.clone());

        fixture.subscription.handle_real_time_message(message(1, None));
        fixture.subscription.handle_real_time_message(message(5, Some(4)));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(gaps.gaps.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        {
            let reported = gaps.gaps.lock();
            assert_eq!(reported.len(), 1);
            assert_eq!(reported[0].from, MessageRef::new(1, 1));
            assert_eq!(reported[0].to, MessageRef::new(4, 0));
        }

        // Capped at max_gap_requests
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gaps.gaps.lock().len(), 3);
        assert!(!fixture.subscription.chains()[0].gap_timer_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_gap_policy_stops_reporting_but_keeps_buffer() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        fixture.subscription.handle_real_time_message(message(1, None));
        fixture.subscription.handle_real_time_message(message(3, Some(2)));

        tokio::time::sleep(Duration::from_secs(1)).await;
        let chain = &fixture.subscription.chains()[0];
        assert!(!chain.gap_timer_active);
        assert_eq!(chain.queued, 1);

        // The chain recovers when the missing message shows up
        fixture.subscription.handle_resent_message(message(2, Some(1)));
        assert_eq!(fixture.handler.timestamps(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resend_gap_handler_requests_chain_from_gap_start() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sink = sent.clone();
        fixture.subscription.set_gap_handler(Arc::new(ResendGapHandler::new(
            None,
            Arc::new(move |json: String| sink.lock().push(json)),
        )));

        fixture.subscription.handle_real_time_message(message(1, None));
        fixture.subscription.handle_real_time_message(message(4, Some(3)));
        tokio::time::sleep(Duration::from_millis(150)).await;

        let sent = sent.lock();
        assert_eq!(sent.len(), 1);
        let request = ResendFromRequest::from_json(&sent[0]).unwrap();
        assert_eq!(request.stream_id, STREAM_ID);
        assert_eq!(request.from, MessageRef::new(1, 1));
        assert_eq!(request.publisher_id, Some(publisher()));
        assert_eq!(request.msg_chain_id.as_deref(), Some("chain-a"));
        assert!(request.session_token.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_gap_reports() {
        let fixture = Fixture::new(SubscriptionConfig::for_testing());
        let gaps = Arc::new(RecordingGapHandler::default());
        fixture.subscription.set_gap_handler(gaps.clone());

        fixture.subscription.handle_real_time_message(message(1, None));
        fixture.subscription.handle_real_time_message(message(3, Some(2)));
        fixture.subscription.clear();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(gaps.gaps.lock().is_empty());
        assert_eq!(fixture.subscription.chains()[0].queued, 1);
    }
}
