use std::{net::IpAddr, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

/// Finds out which public address traffic sent through a tunnel comes out of.
#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait EgressVerifier: Send + Sync {
    /// `None` when the address could not be determined, for whatever reason.
    async fn verify(&self, local_port: u16) -> Option<String>;
}

/// Asks a plain-text IP echo service, going through the SOCKS listener on `local_port`.
pub(crate) struct HttpEgressVerifier {
    echo_url: String,
    timeout: Duration,
}

#[derive(Error, Debug)]
enum EgressError {
    #[error("request through the tunnel failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("echo service answered {0:?}, which is not an address")]
    NotAnAddress(String),
}

impl HttpEgressVerifier {
    pub fn new(echo_url: impl Into<String>, timeout: Duration) -> Self {
        HttpEgressVerifier {
            echo_url: echo_url.into(),
            timeout,
        }
    }
    async fn lookup(&self, local_port: u16) -> Result<String, EgressError> {
        // socks5h so the echo host is resolved on the far side of the tunnel
        let proxy = reqwest::Proxy::all(format!("socks5h://127.0.0.1:{local_port}"))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .build()?;
        let body = client
            .get(&self.echo_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_echo_body(&body).ok_or_else(|| EgressError::NotAnAddress(body.trim().to_string()))
    }
}

#[async_trait]
impl EgressVerifier for HttpEgressVerifier {
    async fn verify(&self, local_port: u16) -> Option<String> {
        match self.lookup(local_port).await {
            Ok(address) => {
                debug!(local_port, %address, "egress verified");
                Some(address)
            }
            Err(e) => {
                warn!(local_port, "egress verification failed: {e}");
                None
            }
        }
    }
}

fn parse_echo_body(body: &str) -> Option<String> {
    let candidate = body.trim();
    candidate
        .parse::<IpAddr>()
        .ok()
        .map(|_| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn echo_body_parsing() {
        assert_eq!(
            parse_echo_body("159.203.10.4\n"),
            Some(String::from("159.203.10.4"))
        );
        assert_eq!(
            parse_echo_body("  2001:db8::1 "),
            Some(String::from("2001:db8::1"))
        );
        assert_eq!(parse_echo_body("<html>rate limited</html>"), None);
        assert_eq!(parse_echo_body(""), None);
    }

    #[tokio::test]
    async fn dead_tunnel_is_a_soft_failure() {
        // grab a free port, then close it so nothing is listening there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let verifier = HttpEgressVerifier::new("http://example.com/ip", Duration::from_secs(5));
        assert_eq!(verifier.verify(port).await, None);
    }

    #[tokio::test]
    async fn silent_tunnel_times_out() {
        // accepts connections but never speaks SOCKS back
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let verifier =
            HttpEgressVerifier::new("http://example.com/ip", Duration::from_millis(300));
        let started = Instant::now();
        assert_eq!(verifier.verify(port).await, None);
        assert!(started.elapsed() < Duration::from_secs(5));
        holder.abort();
    }
}
