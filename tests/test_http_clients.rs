//! HTTP client tests against an in-process fake server
//!
//! The fake speaks just enough HTTP/1.1 for one GET per connection, records
//! the raw request head and answers with a canned status and body.

#[cfg(test)]
mod http_client_tests {
    use modwatch::scraper::proxy::DISABLE_MODULE_FETCH_HEADER;
    use modwatch::scraper::{
        IndexClient, IndexSource, Manifest, ManifestSource, ProxyClient, BEGINNING_OF_TIME,
    };
    use modwatch::version::parse_timestamp;
    use modwatch::ScrapeError;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const USER_AGENT: &str = "modwatch-test/1.0";

    struct FakeServer {
        base_url: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakeServer {
        /// Serve `(status, body)` for every request
        async fn start(status: u16, body: &str) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let seen = requests.clone();
            let body = body.to_string();

            tokio::spawn(async move {
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    seen.lock().unwrap().push(String::from_utf8_lossy(&head).to_string());

                    let response = format!(
                        "HTTP/1.1 {} Fake\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });

            Self {
                base_url: format!("http://{}", addr),
                requests,
            }
        }

        fn request_line(&self, idx: usize) -> String {
            self.requests.lock().unwrap()[idx]
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        }

        fn request_head(&self, idx: usize) -> String {
            self.requests.lock().unwrap()[idx].to_lowercase()
        }
    }

    fn index_client(base_url: &str) -> IndexClient {
        IndexClient::new(base_url, Duration::from_secs(3), USER_AGENT).unwrap()
    }

    fn proxy_client(base_url: &str) -> ProxyClient {
        ProxyClient::new(base_url, Duration::from_secs(3), USER_AGENT).unwrap()
    }

    #[tokio::test]
    async fn test_index_page_request_and_decode() {
        let body = concat!(
            r#"{"Path":"golang.org/x/text","Version":"v0.3.0","Timestamp":"2019-04-10T19:08:52.997264Z"}"#,
            "\n",
            r#"{"Path":"github.com/Foo/bar","Version":"v0.0.0-20190410-abc","Timestamp":"2019-04-10T19:08:53.5Z"}"#,
            "\n"
        );
        let server = FakeServer::start(200, body).await;
        let since = parse_timestamp(BEGINNING_OF_TIME).unwrap();

        let page = index_client(&server.base_url).fetch_page(since, 2000).await.unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page[0].path, "golang.org/x/text");
        assert_eq!(page[1].version, "v0.0.0-20190410-abc");

        let line = server.request_line(0);
        assert!(line.starts_with("GET /index?"), "request line: {}", line);
        assert!(line.contains("limit=2000"));
        assert!(line.contains("since=2019-04-10T19%3A08%3A52.997264000Z"));
        assert!(server.request_head(0).contains(&format!("user-agent: {}", USER_AGENT)));
    }

    #[tokio::test]
    async fn test_index_error_status_is_protocol_error() {
        let server = FakeServer::start(503, "unavailable").await;
        let since = parse_timestamp(BEGINNING_OF_TIME).unwrap();

        let result = index_client(&server.base_url).fetch_page(since, 2000).await;
        assert!(matches!(result, Err(ScrapeError::Protocol { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_index_malformed_body_is_decode_error() {
        let server = FakeServer::start(200, "{\"Path\":\"a\"\n").await;
        let since = parse_timestamp(BEGINNING_OF_TIME).unwrap();

        let result = index_client(&server.base_url).fetch_page(since, 2000).await;
        assert!(matches!(result, Err(ScrapeError::Decode { line: 1, .. })));
    }

    #[tokio::test]
    async fn test_proxy_fetch_encodes_case_and_sends_headers() {
        let server = FakeServer::start(200, "module github.com/BurntSushi/toml\n").await;

        let manifest = proxy_client(&server.base_url)
            .fetch_manifest("github.com/BurntSushi/toml", "v0.3.1")
            .await
            .unwrap();

        assert_eq!(manifest, Manifest::Found("module github.com/BurntSushi/toml\n".to_string()));
        assert_eq!(
            server.request_line(0),
            "GET /github.com/!burnt!sushi/toml/@v/v0.3.1.mod HTTP/1.1"
        );
        let head = server.request_head(0);
        assert!(head.contains(&format!("{}: true", DISABLE_MODULE_FETCH_HEADER.to_lowercase())));
        assert!(head.contains(&format!("user-agent: {}", USER_AGENT)));
    }

    #[tokio::test]
    async fn test_proxy_gone_is_not_an_error() {
        let server = FakeServer::start(410, "not found: gone").await;

        let manifest = proxy_client(&server.base_url)
            .fetch_manifest("example.com/withdrawn", "v1.0.0")
            .await
            .unwrap();
        assert_eq!(manifest, Manifest::Gone);
    }

    #[tokio::test]
    async fn test_proxy_other_status_is_fatal() {
        let server = FakeServer::start(404, "not found").await;

        let result = proxy_client(&server.base_url)
            .fetch_manifest("example.com/missing", "v1.0.0")
            .await;
        assert!(matches!(result, Err(ScrapeError::Protocol { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = proxy_client(&format!("http://{}", addr))
            .fetch_manifest("example.com/a", "v1.0.0")
            .await;
        assert!(matches!(result, Err(ScrapeError::Transport(_))));
    }
}
