//! Slack notification sink
//!
//! Run outcomes go to an incoming webhook when one is configured. Delivery
//! is best-effort: a failed notification never changes the run's result.

use crate::error::{Error, Result};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Read the webhook url from the credentials file
pub fn load_webhook(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map(|content| content.trim().to_string())
        .map_err(|err| {
            Error::Config(format!(
                "cannot read slack webhook {}: {err}",
                path.display()
            ))
        })
}

/// Sink for run outcome messages
pub struct Notifier {
    webhook: Option<String>,
    client: reqwest::Client,
}

impl Notifier {
    pub fn new(webhook: Option<String>) -> Self {
        Self {
            webhook,
            client: reqwest::Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .expect("reqwest client with static configuration"),
        }
    }

    /// Post a message if a webhook is configured
    pub async fn send(&self, text: &str) {
        let Some(webhook) = &self.webhook else {
            return;
        };
        let result = self
            .client
            .post(webhook)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!("slack webhook returned {}", response.status());
            }
            Err(err) => warn!("slack notification failed: {err}"),
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_webhook_is_a_noop() {
        Notifier::new(None).send("nothing happens").await;
    }

    #[tokio::test]
    async fn send_posts_the_message_to_the_webhook() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                // The JSON body is the last thing on the wire.
                if buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.ends_with(b"}") {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });

        Notifier::new(Some(format!("http://{addr}/webhook")))
            .send("I updated the existing rebase PR: https://example.com/pull/1")
            .await;

        let request = server.await.unwrap();
        assert!(request.contains("POST /webhook"));
        assert!(request.contains("I updated the existing rebase PR"));
    }

    #[test]
    fn missing_webhook_file_is_config_error() {
        let err = load_webhook(Path::new("/no/such/webhook")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
