//! # Real sockets
//!
//! The broker serves on an ephemeral TCP port, the worker dials it with
//! tokio-tungstenite, and inbound callers speak raw HTTP/1.1 encoded with the
//! shared codec.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{Request, Response, StatusCode};
    use shared_wire::{decode_response, encode_request, CORRELATION_HEADER};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tunnel_broker::{BrokerConfig, BrokerError, BrokerService, TunnelHub};
    use tunnel_worker::{connect, ConnectError, WorkerRelay};

    struct RunningBroker {
        addr: SocketAddr,
        hub: Arc<TunnelHub>,
        stop: Option<oneshot::Sender<()>>,
        server: JoinHandle<Result<(), BrokerError>>,
    }

    impl RunningBroker {
        async fn start(timeout: Duration) -> Self {
            let mut config = BrokerConfig::default();
            config.ingress.timeout = timeout;
            let service = BrokerService::new(config).unwrap();
            let hub = service.hub();

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (stop, stopped) = oneshot::channel::<()>();
            let server = tokio::spawn(service.serve_on(listener, None, async {
                let _ = stopped.await;
            }));

            Self {
                addr,
                hub,
                stop: Some(stop),
                server,
            }
        }

        fn tunnel_url(&self) -> String {
            format!("ws://{}/ws", self.addr)
        }

        async fn wait_for_session(&self) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while !self.hub.is_active() {
                assert!(Instant::now() < deadline, "worker never attached");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        async fn stop(mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            tokio::time::timeout(Duration::from_secs(5), self.server)
                .await
                .expect("server stops")
                .unwrap()
                .unwrap();
        }
    }

    /// One HTTP/1.1 exchange over a fresh connection.
    async fn call(addr: SocketAddr, method: &str, path: &str) -> Response<Bytes> {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("host", addr.to_string())
            .header("connection", "close")
            .body(Bytes::new())
            .unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(&encode_request(&request)).await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        decode_response(&raw).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_end_to_end_over_websocket() {
        let broker = RunningBroker::start(Duration::from_secs(4)).await;

        let (sink, source) = connect(&broker.tunnel_url()).await.unwrap();
        let worker = tokio::spawn(async move { WorkerRelay::new().run(sink, source).await });
        broker.wait_for_session().await;

        let response = call(broker.addr, "GET", "/hello?name=tunnel").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &Bytes::from_static(b"Done\n"));
        assert!(response.headers().contains_key(CORRELATION_HEADER));

        worker.abort();
        broker.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_worker_gets_conflict() {
        let broker = RunningBroker::start(Duration::from_secs(4)).await;

        let (sink, source) = connect(&broker.tunnel_url()).await.unwrap();
        let worker = tokio::spawn(async move { WorkerRelay::new().run(sink, source).await });
        broker.wait_for_session().await;

        match connect(&broker.tunnel_url()).await {
            Err(ConnectError::Handshake {
                source: tokio_tungstenite::tungstenite::Error::Http(response),
                ..
            }) => assert_eq!(response.status(), StatusCode::CONFLICT),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second worker was accepted"),
        }

        // The first worker still serves traffic
        let response = call(broker.addr, "POST", "/still-up").await;
        assert_eq!(response.status(), StatusCode::OK);

        worker.abort();
        broker.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_gone_means_timeout() {
        let broker = RunningBroker::start(Duration::from_millis(200)).await;

        let (sink, source) = connect(&broker.tunnel_url()).await.unwrap();
        broker.wait_for_session().await;
        drop(sink);
        drop(source);

        let response = call(broker.addr, "GET", "/nobody-home").await;

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.body(), &Bytes::from_static(b"Timeout\n"));

        broker.stop().await;
    }
}
