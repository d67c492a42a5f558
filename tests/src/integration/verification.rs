//! # Signature Verification Flows
//!
//! Policy decisions against a stream metadata source, with real secp256k1
//! signatures and the metadata caches under a paused clock.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use shared_crypto::Secp256k1KeyPair;
    use shared_types::{Address, StreamMessage, StreamMetadata};
    use stream_subscription::domain::sign_message;
    use stream_subscription::{
        SignatureVerificationPolicy, StreamMetadataSource, SubscribedStreams, SubscriptionError,
        VerificationConfig,
    };

    use crate::integration::fixtures::*;

    struct MetadataServer {
        requires_signed_data: bool,
        publishers: Vec<Address>,
        stream_fetches: AtomicUsize,
        publisher_fetches: AtomicUsize,
    }

    impl MetadataServer {
        fn new(requires_signed_data: bool, publishers: Vec<Address>) -> Arc<Self> {
            Arc::new(Self {
                requires_signed_data,
                publishers,
                stream_fetches: AtomicUsize::new(0),
                publisher_fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl StreamMetadataSource for MetadataServer {
        async fn fetch_stream(&self, stream_id: &str) -> Result<StreamMetadata, SubscriptionError> {
            self.stream_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(StreamMetadata::new(stream_id, self.requires_signed_data))
        }

        async fn fetch_publishers(&self, _stream_id: &str) -> Result<Vec<Address>, SubscriptionError> {
            self.publisher_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.publishers.clone())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl StreamMetadataSource for Unreachable {
        async fn fetch_stream(&self, stream_id: &str) -> Result<StreamMetadata, SubscriptionError> {
            Err(SubscriptionError::MetadataFetch {
                stream_id: stream_id.to_string(),
                reason: "connection refused".to_string(),
            })
        }

        async fn fetch_publishers(&self, stream_id: &str) -> Result<Vec<Address>, SubscriptionError> {
            Err(SubscriptionError::MetadataFetch {
                stream_id: stream_id.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn signed_by(keypair: &Secp256k1KeyPair, ts: i64) -> StreamMessage {
        let id = shared_types::MessageId::new(
            STREAM_ID,
            0,
            ts,
            0,
            Address::from_bytes(keypair.address()),
            "chain-a",
        );
        sign_message(StreamMessage::new(id, "{}"), keypair).unwrap()
    }

    fn auto(source: Arc<dyn StreamMetadataSource>) -> SubscribedStreams {
        SubscribedStreams::new(source, VerificationConfig::default())
    }

    #[tokio::test]
    async fn test_auto_policy_matrix() {
        let publisher_key = Secp256k1KeyPair::generate();
        let publishers = vec![Address::from_bytes(publisher_key.address())];

        let relaxed = auto(MetadataServer::new(false, publishers.clone()));
        let strict = auto(MetadataServer::new(true, publishers));

        // Unsigned: follows the stream flag
        assert!(relaxed.verify_stream_message(&message(1, None)).await.is_ok());
        assert!(matches!(
            strict.verify_stream_message(&message(1, None)).await,
            Err(SubscriptionError::InvalidSignature { .. })
        ));

        // Signed: checked against publishers whatever the flag says
        let good = signed_by(&publisher_key, 2);
        assert!(relaxed.verify_stream_message(&good).await.is_ok());
        assert!(strict.verify_stream_message(&good).await.is_ok());

        let stranger = signed_by(&Secp256k1KeyPair::generate(), 3);
        assert!(relaxed.verify_stream_message(&stranger).await.is_err());
        assert!(strict.verify_stream_message(&stranger).await.is_err());
    }

    #[tokio::test]
    async fn test_tampered_content_rejected() {
        let publisher_key = Secp256k1KeyPair::generate();
        let streams = auto(MetadataServer::new(
            false,
            vec![Address::from_bytes(publisher_key.address())],
        ));

        let signed = signed_by(&publisher_key, 1);
        let tampered = StreamMessage::new(signed.message_id().clone(), r#"{"evil":true}"#)
            .with_signature(signed.signature().unwrap_or_default());

        assert!(streams.verify_stream_message(&tampered).await.is_err());
    }

    #[tokio::test]
    async fn test_never_policy_skips_fetch() {
        let server = MetadataServer::new(true, vec![]);
        let streams = SubscribedStreams::new(
            server.clone(),
            VerificationConfig::default().with_policy(SignatureVerificationPolicy::Never),
        );

        assert!(streams.verify_stream_message(&message(1, None)).await.is_ok());
        assert_eq!(server.stream_fetches.load(Ordering::SeqCst), 0);
        assert_eq!(server.publisher_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces() {
        let streams = auto(Arc::new(Unreachable));
        assert!(matches!(
            streams.verify_stream_message(&message(1, None)).await,
            Err(SubscriptionError::MetadataFetch { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_metadata_fetched_once_per_fifteen_minutes() {
        let server = MetadataServer::new(false, vec![]);
        let streams = auto(server.clone());

        streams.verify_stream_message(&message(1, None)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        streams.verify_stream_message(&message(2, Some(1))).await.unwrap();
        assert_eq!(server.stream_fetches.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        streams.verify_stream_message(&message(3, Some(2))).await.unwrap();
        assert_eq!(server.stream_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publisher_set_cached_independently() {
        let publisher_key = Secp256k1KeyPair::generate();
        let server = MetadataServer::new(false, vec![Address::from_bytes(publisher_key.address())]);
        let streams = auto(server.clone());

        streams.verify_stream_message(&signed_by(&publisher_key, 1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20 * 60)).await;
        streams.verify_stream_message(&signed_by(&publisher_key, 2)).await.unwrap();
        assert_eq!(server.publisher_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(server.stream_fetches.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        streams.verify_stream_message(&signed_by(&publisher_key, 3)).await.unwrap();
        assert_eq!(server.publisher_fetches.load(Ordering::SeqCst), 2);
    }
}
