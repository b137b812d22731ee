//! Storage HTTP API Integration Tests
//!
//! Verifies the requests the storage client and the concrete strategies put
//! on the wire, against a mock backend.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use media_uploadr::config::MIN_PART_SIZE;
    use media_uploadr::storage::{RelayEndpoint, StorageClient, StorageClientConfig};
    use media_uploadr::upload::chain::RunOptions;
    use media_uploadr::upload::{
        DirectShape, DirectStrategy, RelayStrategy, ResumableStrategy, UploadStrategy,
    };
    use media_uploadr::{
        classify, DestinationId, ErrorKind, Payload, ProgressReporter, StrategyChain,
        TransferError, UploadOutcome,
    };
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{
        body_string, body_string_contains, header, header_exists, method, path, query_param,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "avatars/7_1700000000000_abcdef012345.jpg";
    const OBJECT_PATH: &str = "/media/avatars/7_1700000000000_abcdef012345.jpg";

    /// Helper to create a client against the mock server
    fn create_client(server: &MockServer) -> Arc<StorageClient> {
        let mut config = StorageClientConfig::new(server.uri(), "media");
        config.public_base_url = Some("https://cdn.example.com".into());
        config.relay = Some(RelayEndpoint {
            url: format!("{}/api/uploads", server.uri()),
            timeout: Duration::from_secs(10),
        });
        Arc::new(StorageClient::new(config).unwrap())
    }

    fn destination() -> DestinationId {
        DestinationId::from_key(KEY)
    }

    fn payload() -> Payload {
        Payload::new(Bytes::from_static(b"\xFF\xD8\xFFjpeg-ish"), "image/jpeg")
            .with_metadata("original-name", "me.jpg")
    }

    #[tokio::test]
    async fn test_direct_simple_sends_type_and_metadata() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .and(header("content-type", "image/jpeg"))
            .and(header("x-amz-meta-original-name", "me.jpg"))
            .and(header("content-length", "11"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"abc123\""))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = DirectStrategy::new(create_client(&server), DirectShape::Simple);
        let url = strategy
            .transfer(&destination(), &payload(), &ProgressReporter::silent())
            .await
            .unwrap();

        assert_eq!(url, format!("https://cdn.example.com{OBJECT_PATH}"));
    }

    #[tokio::test]
    async fn test_direct_octet_stream_drops_metadata() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .and(header("content-type", "application/octet-stream"))
            .and(header_exists("x-amz-meta-original-name"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .and(header("content-type", "application/octet-stream"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = DirectStrategy::new(create_client(&server), DirectShape::OctetStream);
        strategy
            .transfer(&destination(), &payload(), &ProgressReporter::silent())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_direct_base64_sends_encoded_text() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .and(query_param("encoding", "base64"))
            .and(header("content-type", "text/plain"))
            .and(header("x-amz-meta-original-content-type", "image/jpeg"))
            .and(body_string("/9j/anBlZy1pc2g="))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = DirectStrategy::new(create_client(&server), DirectShape::Base64);
        strategy
            .transfer(&destination(), &payload(), &ProgressReporter::silent())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_object_error_body_is_decoded() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>CORSResponse</Code><Message>CORS not enabled</Message></Error>"#,
            ))
            .mount(&server)
            .await;

        let strategy = DirectStrategy::new(create_client(&server), DirectShape::Simple);
        let err = strategy
            .transfer(&destination(), &payload(), &ProgressReporter::silent())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            TransferError::Backend {
                status: 403,
                code: Some("CORSResponse".into()),
                message: "CORS not enabled".into(),
            }
        );
        assert_eq!(classify(&err).kind, ErrorKind::CrossOriginConfig);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transient() {
        let client = StorageClient::new(StorageClientConfig::new("http://127.0.0.1:9", "media"))
            .unwrap();
        let strategy = DirectStrategy::new(Arc::new(client), DirectShape::Simple);

        let err = strategy
            .transfer(&destination(), &payload(), &ProgressReporter::silent())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Network(_)), "{err:?}");
        assert_eq!(classify(&err).kind, ErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_resumable_uploads_parts_and_completes() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploads", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<InitiateMultipartUploadResult>
    <Bucket>media</Bucket>
    <Key>avatars/7_1700000000000_abcdef012345.jpg</Key>
    <UploadId>upload-123</UploadId>
</InitiateMultipartUploadResult>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .and(query_param("partNumber", "1"))
            .and(query_param("uploadId", "upload-123"))
            .and(header("content-length", MIN_PART_SIZE.to_string().as_str()))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag-1\""))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .and(query_param("partNumber", "2"))
            .and(query_param("uploadId", "upload-123"))
            .and(header("content-length", "100"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag-2\""))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploadId", "upload-123"))
            .and(body_string_contains("<PartNumber>2</PartNumber>"))
            .and(body_string_contains("etag-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<CompleteMultipartUploadResult><ETag>\"final\"</ETag></CompleteMultipartUploadResult>",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = ResumableStrategy::new(create_client(&server));
        let payload = Payload::new(
            Bytes::from(vec![7u8; MIN_PART_SIZE + 100]),
            "image/jpeg",
        );
        let url = strategy
            .transfer(&destination(), &payload, &ProgressReporter::silent())
            .await
            .unwrap();

        assert_eq!(url, format!("https://cdn.example.com{OBJECT_PATH}"));
    }

    #[tokio::test]
    async fn test_resumable_aborts_on_part_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(query_param("uploads", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<InitiateMultipartUploadResult><UploadId>upload-9</UploadId></InitiateMultipartUploadResult>",
            ))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(query_param("uploadId", "upload-9"))
            .respond_with(ResponseTemplate::new(507).set_body_string(
                "<Error><Code>QuotaExceeded</Code><Message>Bucket is full</Message></Error>",
            ))
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploadId", "upload-9"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = ResumableStrategy::new(create_client(&server));
        let err = strategy
            .transfer(&destination(), &payload(), &ProgressReporter::silent())
            .await
            .unwrap_err();

        assert_eq!(classify(&err).kind, ErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_resumable_interrupted_by_deadline_is_aborted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(query_param("uploads", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<InitiateMultipartUploadResult><UploadId>UP1</UploadId></InitiateMultipartUploadResult>",
            ))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(query_param("uploadId", "UP1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"etag-1\"")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploadId", "UP1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let strategy: Arc<dyn UploadStrategy> =
            Arc::new(ResumableStrategy::new(create_client(&server)));
        let chain = StrategyChain::new(vec![strategy]);
        let outcome = chain
            .run(
                &destination(),
                &payload(),
                RunOptions {
                    max_attempts: 1,
                    deadline: Some(Duration::from_millis(500)),
                    on_progress: None,
                },
            )
            .await;

        assert!(matches!(
            outcome,
            UploadOutcome::Failure {
                kind: ErrorKind::Timeout,
                strategy: "direct-resumable",
                ..
            }
        ));

        // The abort runs on a spawned task after the transfer is dropped
        let mut aborted = false;
        for _ in 0..50 {
            let requests = server.received_requests().await.unwrap_or_default();
            if requests
                .iter()
                .any(|r| r.method.as_str() == "DELETE" && r.url.query() == Some("uploadId=UP1"))
            {
                aborted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(aborted, "multipart upload UP1 was not aborted");
    }

    #[tokio::test]
    async fn test_relay_posts_form_and_returns_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/uploads"))
            .and(header_exists("content-type"))
            .and(body_string_contains("name=\"path\""))
            .and(body_string_contains(KEY))
            .and(body_string_contains("name=\"contentType\""))
            .and(body_string_contains("name=\"file\""))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"url":"https://cdn.example.com/media/from-relay.jpg"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        // Text body so the form can be matched as a string
        let payload = Payload::new(Bytes::from_static(b"plain image bytes"), "image/jpeg");
        let strategy = RelayStrategy::new(create_client(&server));
        let url = strategy
            .transfer(&destination(), &payload, &ProgressReporter::silent())
            .await
            .unwrap();

        assert_eq!(url, "https://cdn.example.com/media/from-relay.jpg");
    }

    #[tokio::test]
    async fn test_relay_structured_error_is_classified_by_code() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/uploads"))
            .respond_with(ResponseTemplate::new(400).set_body_string(
                r#"{"error":{"code":"storage/quota-exceeded","message":"Quota exceeded"}}"#,
            ))
            .mount(&server)
            .await;

        let strategy = RelayStrategy::new(create_client(&server));
        let err = strategy
            .transfer(&destination(), &payload(), &ProgressReporter::silent())
            .await
            .unwrap_err();

        assert_eq!(classify(&err).kind, ErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_relay_malformed_success_body_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/uploads"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let strategy = RelayStrategy::new(create_client(&server));
        let err = strategy
            .transfer(&destination(), &payload(), &ProgressReporter::silent())
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::Other(_)));
    }

    #[tokio::test]
    async fn test_delete_object_variants() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/media/present.jpg"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/media/gone.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = create_client(&server);
        client
            .delete_object(&DestinationId::from_key("present.jpg"))
            .await
            .unwrap();

        let err = client
            .delete_object(&DestinationId::from_key("gone.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::NotFound(_)));
    }
}
