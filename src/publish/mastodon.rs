use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::{send_checked, PublishError, PublishTarget};

/// Connection settings for a Mastodon account.
#[derive(Clone)]
pub struct MastodonConfig {
    /// Instance base URL, e.g. `https://mastodon.social`
    pub url: String,
    pub access_token: SecretString,
}

/// Posts public statuses through the Mastodon REST API.
pub struct MastodonClient {
    client: reqwest::Client,
    config: MastodonConfig,
}

impl MastodonClient {
    pub fn new(client: reqwest::Client, config: MastodonConfig) -> Self {
        Self { client, config }
    }
}

/// Mastodon deduplicates statuses carrying the same key for an hour, so a
/// retry after a lost response does not post twice.
fn idempotency_key(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[async_trait]
impl PublishTarget for MastodonClient {
    fn name(&self) -> &str {
        "mastodon"
    }

    async fn publish(&self, text: &str, _link: Option<&str>) -> Result<(), PublishError> {
        let url = format!("{}/api/v1/statuses", self.config.url.trim_end_matches('/'));
        let request = self
            .client
            .post(url)
            .bearer_auth(self.config.access_token.expose_secret())
            .header("Idempotency-Key", idempotency_key(text))
            .json(&json!({
                "status": text,
                "visibility": "public",
            }));

        match send_checked(request).await {
            Ok(_) => Ok(()),
            Err(PublishError::HttpStatus { status: 401 | 403, body }) => {
                Err(PublishError::Auth(body))
            }
            Err(e) => Err(e),
        }
    }
}
