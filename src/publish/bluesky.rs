use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::facets::extract_facets;
use super::{send_checked, PublishError, PublishTarget};
use crate::feed::read_limited_bytes;

pub const DEFAULT_SERVICE: &str = "https://bsky.social";
pub const DEFAULT_CARD_SERVICE: &str = "https://cardyb.bsky.app";

/// Bluesky rejects blobs over 1MB for external thumbnails
const MAX_THUMB_SIZE: usize = 1_000_000;

/// Connection settings for a Bluesky account.
#[derive(Clone)]
pub struct BlueskyConfig {
    /// PDS base URL, e.g. `https://bsky.social`
    pub service: String,
    /// Link-card metadata service base URL
    pub card_service: String,
    /// Handle or DID
    pub identifier: String,
    pub app_password: SecretString,
}

impl BlueskyConfig {
    pub fn new(identifier: impl Into<String>, app_password: SecretString) -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            card_service: DEFAULT_CARD_SERVICE.to_string(),
            identifier: identifier.into(),
            app_password,
        }
    }
}

struct Session {
    did: String,
    access_jwt: SecretString,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    did: String,
    access_jwt: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CardMetadata {
    title: String,
    description: String,
    image: String,
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: Value,
}

/// Publishes to Bluesky through the AT Protocol XRPC API.
///
/// Logs in on first use and keeps the session. Posts carry link and
/// hashtag facets plus, when the card service cooperates, an external
/// embed with thumbnail. Embed failures never fail the post.
pub struct BlueskyClient {
    client: reqwest::Client,
    config: BlueskyConfig,
    session: Mutex<Option<Session>>,
}

impl BlueskyClient {
    pub fn new(client: reqwest::Client, config: BlueskyConfig) -> Self {
        Self {
            client,
            config,
            session: Mutex::new(None),
        }
    }

    fn xrpc(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.config.service.trim_end_matches('/'), method)
    }

    /// Logs in with the identifier and app password.
    async fn create_session(&self) -> Result<Session, PublishError> {
        let request = self
            .client
            .post(self.xrpc("com.atproto.server.createSession"))
            .json(&json!({
                "identifier": self.config.identifier,
                "password": self.config.app_password.expose_secret(),
            }));

        let response = match send_checked(request).await {
            Ok(response) => response,
            Err(PublishError::HttpStatus { status: 400 | 401, body }) => {
                return Err(PublishError::Auth(body));
            }
            Err(e) => return Err(e),
        };

        let body: CreateSessionResponse = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;

        tracing::info!(did = %body.did, "Bluesky session created");
        Ok(Session {
            did: body.did,
            access_jwt: SecretString::from(body.access_jwt),
        })
    }

    /// Returns `(did, access token)`, logging in first if needed.
    async fn session(&self) -> Result<(String, SecretString), PublishError> {
        let mut session = self.session.lock().await;
        if session.is_none() {
            *session = Some(self.create_session().await?);
        }
        match session.as_ref() {
            Some(s) => Ok((s.did.clone(), s.access_jwt.clone())),
            None => Err(PublishError::Auth("no session".into())),
        }
    }

    /// Drops the cached session so the next attempt logs in again.
    async fn invalidate_session(&self) {
        *self.session.lock().await = None;
    }

    /// Builds an `app.bsky.embed.external` card for `link`.
    ///
    /// Best effort: any failure yields `None` (no embed) or an embed without
    /// a thumbnail.
    async fn build_embed(&self, link: &str, token: &SecretString) -> Option<Value> {
        let metadata = match self.fetch_card(link).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(link = %link, error = %e, "Failed to fetch link metadata, posting without embed");
                return None;
            }
        };

        let title = if metadata.title.is_empty() {
            link
        } else {
            metadata.title.as_str()
        };
        let mut external = json!({
            "uri": link,
            "title": title,
            "description": metadata.description,
        });

        if !metadata.image.is_empty() {
            match self.upload_thumbnail(&metadata.image, token).await {
                Ok(blob) => external["thumb"] = blob,
                Err(e) => {
                    tracing::warn!(image = %metadata.image, error = %e, "Failed to upload thumbnail");
                }
            }
        }

        Some(json!({
            "$type": "app.bsky.embed.external",
            "external": external,
        }))
    }

    async fn fetch_card(&self, link: &str) -> Result<CardMetadata, PublishError> {
        let url = url::Url::parse_with_params(
            &format!("{}/v1/extract", self.config.card_service.trim_end_matches('/')),
            &[("url", link)],
        )
        .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;

        let response = send_checked(self.client.get(url.as_str())).await?;
        response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))
    }

    async fn upload_thumbnail(
        &self,
        image_url: &str,
        token: &SecretString,
    ) -> Result<Value, PublishError> {
        let response = send_checked(self.client.get(image_url)).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = read_limited_bytes(response, MAX_THUMB_SIZE)
            .await
            .map_err(|e| PublishError::InvalidResponse(format!("thumbnail: {e}")))?;

        let request = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes);

        let body: UploadBlobResponse = send_checked(request)
            .await?
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;
        Ok(body.blob)
    }
}

#[async_trait]
impl PublishTarget for BlueskyClient {
    fn name(&self) -> &str {
        "bluesky"
    }

    async fn publish(&self, text: &str, link: Option<&str>) -> Result<(), PublishError> {
        let (did, token) = self.session().await?;

        let mut record = json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });

        let facets = extract_facets(text, link);
        if !facets.is_empty() {
            record["facets"] = serde_json::to_value(&facets)
                .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;
        }

        if let Some(link) = link {
            if let Some(embed) = self.build_embed(link, &token).await {
                record["embed"] = embed;
            }
        }

        let request = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .bearer_auth(token.expose_secret())
            .json(&json!({
                "repo": did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }));

        match send_checked(request).await {
            Ok(_) => Ok(()),
            Err(PublishError::HttpStatus { status: 401, body }) => {
                self.invalidate_session().await;
                Err(PublishError::SessionExpired(body))
            }
            Err(e) => Err(e),
        }
    }
}
