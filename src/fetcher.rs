use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tracing::{error, info, warn};

use crate::config::ScraperConfig;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Result of fetching one URL. Exhaustion is an expected outcome, not an error:
/// callers skip the URL and move on.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fetched(String),
    Exhausted { attempts: u32, reason: String },
}

/// Anything that can turn a URL into page markup.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

/// Plain HTTP fetcher with rotating client identity and linear backoff.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpFetcher {
    pub fn new(cfg: &ScraperConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()?;
        Ok(Self {
            client,
            max_retries: cfg.max_retries,
            base_delay: cfg.retry_base_delay(),
        })
    }
}

/// Delay before the next attempt after `attempt` (1-based) failed.
pub fn backoff_after(base: Duration, attempt: u32) -> Duration {
    base * attempt
}

/// Build a fresh header set for one request. Nothing is shared between calls.
pub fn identity_headers() -> HeaderMap {
    let agent = USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0]);

    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(agent));
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let mut reason = String::from("no attempts made");

        for attempt in 1..=self.max_retries {
            match self.client.get(url).headers(identity_headers()).send().await {
                Ok(resp) if resp.status() == StatusCode::OK => match resp.text().await {
                    Ok(body) => {
                        info!("Fetched {} (attempt {}/{})", url, attempt, self.max_retries);
                        return FetchOutcome::Fetched(body);
                    }
                    Err(e) => {
                        reason = format!("body read failed: {}", e);
                        warn!("Attempt {} failed for {}: {}", attempt, url, reason);
                    }
                },
                Ok(resp) => {
                    reason = format!("status {}", resp.status().as_u16());
                    warn!("Failed to fetch {}, {}", url, reason);
                }
                Err(e) => {
                    reason = e.to_string();
                    error!("Attempt {} failed for {}: {}", attempt, url, e);
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(backoff_after(self.base_delay, attempt)).await;
            }
        }

        warn!("Giving up on {} after {} attempts", url, self.max_retries);
        FetchOutcome::Exhausted {
            attempts: self.max_retries,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    type Requests = Arc<Mutex<Vec<String>>>;

    /// Serve `statuses` in order (last one repeats), keeping each raw request.
    async fn serve(statuses: Vec<u16>) -> (String, Requests) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests: Requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else { break };
                let mut buf = [0u8; 8192];
                let n = sock.read(&mut buf).await.unwrap_or(0);
                let seen = {
                    let mut log = log.lock().unwrap();
                    log.push(String::from_utf8_lossy(&buf[..n]).into_owned());
                    log.len()
                };
                let status = statuses[(seen - 1).min(statuses.len() - 1)];
                let body = if status == 200 { "<html>ok</html>" } else { "nope" };
                let resp = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });

        (format!("http://{}/page", addr), requests)
    }

    /// Value of header `name` in a raw HTTP/1.1 request.
    fn header_value<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
        raw.lines().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }

    fn fetcher(max_retries: u32) -> HttpFetcher {
        HttpFetcher::new(&ScraperConfig {
            max_retries,
            retry_base_delay_ms: 1,
            request_timeout_ms: 2000,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn backoff_is_linear() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_after(base, 1), Duration::from_millis(1000));
        assert_eq!(backoff_after(base, 2), Duration::from_millis(2000));
        assert_eq!(backoff_after(base, 3), Duration::from_millis(3000));
    }

    #[test]
    fn headers_carry_identity() {
        let h = identity_headers();
        let ua = h.get(header::USER_AGENT).unwrap().to_str().unwrap();
        assert!(USER_AGENTS.iter().any(|a| *a == ua));
        assert_eq!(h.get(header::PRAGMA).unwrap().to_str().unwrap(), "no-cache");
        assert_eq!(
            h.get(header::ACCEPT_LANGUAGE).unwrap().to_str().unwrap(),
            "en-US,en;q=0.9"
        );
    }

    #[tokio::test]
    async fn retries_until_ok() {
        let (url, requests) = serve(vec![500, 200]).await;
        let outcome = fetcher(3).fetch(&url).await;
        assert_eq!(outcome, FetchOutcome::Fetched("<html>ok</html>".into()));

        let requests = requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 2);
        for raw in &requests {
            let ua = header_value(raw, "user-agent").expect("user-agent sent");
            assert!(USER_AGENTS.iter().any(|a| *a == ua), "unexpected agent {:?}", ua);
            assert_eq!(header_value(raw, "pragma"), Some("no-cache"));
            assert_eq!(header_value(raw, "cache-control"), Some("no-cache"));
        }
    }

    #[tokio::test]
    async fn exhaustion_is_not_an_error() {
        let (url, requests) = serve(vec![500]).await;
        let outcome = fetcher(3).fetch(&url).await;
        match outcome {
            FetchOutcome::Exhausted { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert_eq!(reason, "status 500");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn network_errors_use_up_attempts() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let outcome = fetcher(3).fetch(&format!("http://127.0.0.1:{}/page", port)).await;
        match outcome {
            FetchOutcome::Exhausted { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(!reason.starts_with("status"), "reason: {}", reason);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
