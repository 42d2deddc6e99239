//! # Router-level flows over an in-memory tunnel
//!
//! The broker router is driven with `tower::ServiceExt::oneshot`; the worker
//! side is either a real `WorkerRelay` or a scripted peer that answers
//! selectively.

#[cfg(test)]
mod tests {
    use crate::harness::{attach_memory_worker, body_text, broker, inbound, spawn_relay};
    use axum::body::Body;
    use bytes::Bytes;
    use http::{Request, Response, StatusCode};
    use shared_wire::{
        decode_request, encode_response, CorrelationId, FrameSink, FrameSource, MemorySource,
        CORRELATION_HEADER, MAX_HEADERS,
    };
    use std::time::{Duration, Instant};
    use tower::ServiceExt;
    use tunnel_broker::SessionEnd;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    async fn next_request(source: &mut MemorySource) -> Request<Bytes> {
        let frame = source
            .next_frame()
            .await
            .expect("tunnel open")
            .expect("frame readable");
        decode_request(&frame).expect("well-formed request frame")
    }

    fn reply_to(request: &Request<Bytes>, status: StatusCode) -> Bytes {
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = status;
        let token = CorrelationId::from_headers(request.headers()).expect("token injected");
        token.inject(response.headers_mut());
        encode_response(&response)
    }

    // =============================================================================
    // DELIVERY
    // =============================================================================

    #[tokio::test]
    async fn test_delivered_within_window() {
        let service = broker(Duration::from_secs(4));
        let (_session, worker_end) = attach_memory_worker(&service);
        let _relay = spawn_relay(worker_end);

        let request = Request::builder()
            .method("POST")
            .uri("/orders?id=7")
            .header("content-type", "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let response = service.router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_HEADER));
        assert_eq!(body_text(response).await, "Done\n");

        let stats = service.registry().stats().snapshot();
        assert_eq!(stats.delivered, 1);
        assert_eq!(service.registry().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_status_is_passed_through() {
        let service = broker(Duration::from_secs(4));
        let (_session, worker_end) = attach_memory_worker(&service);
        let (mut worker_sink, mut worker_source) = worker_end.split();

        let worker = tokio::spawn(async move {
            let request = next_request(&mut worker_source).await;
            assert_eq!(request.uri().path(), "/made");
            worker_sink
                .send_frame(reply_to(&request, StatusCode::CREATED))
                .await
                .unwrap();
            (worker_sink, worker_source)
        });

        let response = service
            .router()
            .oneshot(inbound("PUT", "/made"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_text(response).await, "Done\n");
        let _ = worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_many_concurrent_callers_each_get_their_response() {
        let service = broker(Duration::from_secs(4));
        let (_session, worker_end) = attach_memory_worker(&service);
        let _relay = spawn_relay(worker_end);
        let router = service.router();

        let callers: Vec<_> = (0..50)
            .map(|i| {
                let router = router.clone();
                tokio::spawn(async move {
                    router
                        .oneshot(inbound("GET", &format!("/item/{i}")))
                        .await
                        .unwrap()
                        .status()
                })
            })
            .collect();

        for caller in callers {
            assert_eq!(caller.await.unwrap(), StatusCode::OK);
        }

        let stats = service.registry().stats().snapshot();
        assert_eq!(stats.subscribed, 50);
        assert_eq!(stats.delivered, 50);
        assert_eq!(stats.unmatched, 0);
    }

    // =============================================================================
    // TIMEOUTS
    // =============================================================================

    #[tokio::test]
    async fn test_no_worker_times_out() {
        let service = broker(Duration::from_millis(100));

        let response = service
            .router()
            .oneshot(inbound("GET", "/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_text(response).await, "Timeout\n");
    }

    #[tokio::test]
    async fn test_only_answered_token_succeeds() {
        let service = broker(Duration::from_millis(300));
        let (_session, worker_end) = attach_memory_worker(&service);
        let (mut worker_sink, mut worker_source) = worker_end.split();

        // Answers /t2 only; /t1 is read and ignored
        let worker = tokio::spawn(async move {
            for _ in 0..2 {
                let request = next_request(&mut worker_source).await;
                if request.uri().path() == "/t2" {
                    worker_sink
                        .send_frame(reply_to(&request, StatusCode::OK))
                        .await
                        .unwrap();
                }
            }
            (worker_sink, worker_source)
        });

        let router = service.router();
        let t1 = tokio::spawn(router.clone().oneshot(inbound("GET", "/t1")));
        let t2 = tokio::spawn(router.oneshot(inbound("GET", "/t2")));

        let t2 = t2.await.unwrap().unwrap();
        let t1 = t1.await.unwrap().unwrap();

        assert_eq!(t2.status(), StatusCode::OK);
        assert_eq!(t1.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_text(t1).await, "Timeout\n");
        let _ = worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_late_response_is_dropped() {
        let service = broker(Duration::from_millis(100));
        let registry = service.registry();
        let (_session, worker_end) = attach_memory_worker(&service);
        let (mut worker_sink, mut worker_source) = worker_end.split();

        let worker = tokio::spawn(async move {
            let request = next_request(&mut worker_source).await;
            tokio::time::sleep(Duration::from_millis(300)).await;
            worker_sink
                .send_frame(reply_to(&request, StatusCode::OK))
                .await
                .unwrap();
            (worker_sink, worker_source)
        });

        let response = service
            .router()
            .oneshot(inbound("GET", "/slow"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let _ = worker.await.unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while registry.stats().snapshot().unmatched == 0 {
            assert!(Instant::now() < deadline, "late response never dispatched");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.stats().snapshot().delivered, 0);
    }

    // =============================================================================
    // SESSION LIFECYCLE
    // =============================================================================

    #[tokio::test]
    async fn test_worker_disconnect_releases_waiting_callers() {
        let service = broker(Duration::from_secs(30));
        let (session, worker_end) = attach_memory_worker(&service);
        let (mut worker_sink, mut worker_source) = worker_end.split();

        let worker = tokio::spawn(async move {
            let _ = next_request(&mut worker_source).await;
            worker_sink.close().await.unwrap();
        });

        let started = Instant::now();
        let response = service
            .router()
            .oneshot(inbound("GET", "/abandoned"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(session.await.unwrap(), SessionEnd::PeerClosed);
        assert!(!service.hub().is_active());
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_new_worker_after_disconnect() {
        let service = broker(Duration::from_secs(4));

        let (session, worker_end) = attach_memory_worker(&service);
        drop(worker_end);
        assert_eq!(session.await.unwrap(), SessionEnd::PeerClosed);

        let (_session, worker_end) = attach_memory_worker(&service);
        let _relay = spawn_relay(worker_end);

        let response = service
            .router()
            .oneshot(inbound("GET", "/again"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_plain_get_on_tunnel_path_while_connected() {
        let service = broker(Duration::from_secs(4));
        let (_session, _worker_end) = attach_memory_worker(&service);
        let active = service.hub().active_session();

        let response = service
            .router()
            .oneshot(inbound("GET", "/ws"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        assert_eq!(service.hub().active_session(), active);
    }

    // =============================================================================
    // HEADER BUDGET
    // =============================================================================

    fn with_headers(count: usize) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri("/crowded");
        for i in 0..count {
            builder = builder.header(format!("x-h{i}"), "v");
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_header_heavy_request_reaches_worker() {
        let service = broker(Duration::from_millis(500));
        let (_session, worker_end) = attach_memory_worker(&service);
        let _relay = spawn_relay(worker_end);
        let router = service.router();

        // hyper's default inbound cap, and the largest count the broker accepts
        for count in [100, MAX_HEADERS - 2] {
            let response = router.clone().oneshot(with_headers(count)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{count} headers");
        }
        assert_eq!(service.registry().stats().snapshot().delivered, 2);
    }

    #[tokio::test]
    async fn test_header_overflow_rejected_without_waiting() {
        let service = broker(Duration::from_secs(30));
        let (_session, worker_end) = attach_memory_worker(&service);
        let _relay = spawn_relay(worker_end);

        let started = Instant::now();
        let response = service
            .router()
            .oneshot(with_headers(MAX_HEADERS - 1))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(service.registry().stats().snapshot().subscribed, 0);
    }
}
