use std::time::Duration as StdDuration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::time::sleep;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_PAGE_SIZE: usize = 100;
const MAX_RATE_LIMIT_RETRIES: usize = 5;
const REDACTED_BODY_MAX_LEN: usize = 200;

const API_BASE_ENV: &str = "JOBTRAIL_MAIL_API_BASE";
const TOKEN_URL_ENV: &str = "JOBTRAIL_TOKEN_URL";
const CLIENT_ID_ENV: &str = "GOOGLE_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "GOOGLE_CLIENT_SECRET";

/// A provider-side label: opaque id plus the human-readable name, which may
/// carry arbitrary parent-folder prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailLabel {
    pub id: String,
    pub name: String,
}

/// One page of a message-id listing.
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Fully fetched inbox message, reduced to the metadata the reconciliation
/// pipeline consumes. Not persisted; discarded at the end of each run.
#[derive(Debug, Clone)]
pub struct InboxMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub label_ids: Vec<String>,
    pub subject: String,
    pub sender_name: String,
    pub sender_email: String,
    pub snippet: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in_seconds: i64,
}

/// Remote mail provider boundary: token refresh, label listing, message-id
/// listing (paged), and single-message fetch.
#[async_trait(?Send)]
pub trait MailGateway {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken>;

    async fn list_labels(&self, access_token: &str) -> Result<Vec<MailLabel>>;

    async fn list_message_ids(
        &self,
        access_token: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<MessagePage>;

    async fn get_message(&self, access_token: &str, message_id: &str) -> Result<InboxMessage>;
}

/// OAuth client configuration for the token-refresh exchange.
#[derive(Debug, Clone)]
pub struct OauthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl OauthClientConfig {
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var(CLIENT_ID_ENV)
            .with_context(|| format!("{CLIENT_ID_ENV} must be set for token refresh"))?;
        let client_secret = std::env::var(CLIENT_SECRET_ENV)
            .with_context(|| format!("{CLIENT_SECRET_ENV} must be set for token refresh"))?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GmailClient {
    client: Client,
    api_base: String,
    token_url: String,
    oauth: OauthClientConfig,
}

impl GmailClient {
    pub fn new(oauth: OauthClientConfig) -> Self {
        let api_base = env_override(API_BASE_ENV).unwrap_or_else(|| GMAIL_API_BASE.to_string());
        let token_url = env_override(TOKEN_URL_ENV).unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string());
        Self {
            client: Client::new(),
            api_base,
            token_url,
            oauth,
        }
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self::new(OauthClientConfig::from_env()?))
    }

    async fn fetch_with_retry(&self, token: &str, url: &str) -> Result<String> {
        let mut backoff_seconds = 1u64;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = self
                .client
                .get(url)
                .bearer_auth(token)
                .header("accept", "application/json")
                .send()
                .await
                .with_context(|| format!("mail api request: {url}"))?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt == MAX_RATE_LIMIT_RETRIES {
                    let body = response
                        .text()
                        .await
                        .context("read mail api 429 response body")?;
                    return Err(anyhow!(
                        "mail api request exhausted retries: {}",
                        redact_response_body(&body)
                    ));
                }

                let retry_after_seconds = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(backoff_seconds);

                sleep(StdDuration::from_secs(retry_after_seconds)).await;
                backoff_seconds = (backoff_seconds * 2).min(32);
                continue;
            }

            let status = response.status();
            let body = response
                .text()
                .await
                .context("read mail api response body")?;
            if !status.is_success() {
                return Err(anyhow!(
                    "mail api request failed: status={} body={}",
                    status,
                    redact_response_body(&body)
                ));
            }

            return Ok(body);
        }

        Err(anyhow!("mail api request failed without response"))
    }
}

#[async_trait(?Send)]
impl MailGateway for GmailClient {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .with_context(|| format!("request oauth token from {}", self.token_url))?;

        let status = response.status();
        let body = response.text().await.context("read oauth token response")?;
        if !status.is_success() {
            return Err(anyhow!(
                "oauth token refresh failed: status={} body={}",
                status,
                redact_response_body(&body)
            ));
        }

        let payload: OAuthTokenResponse =
            serde_json::from_str(&body).context("decode oauth token JSON response")?;

        Ok(RefreshedToken {
            access_token: payload.access_token,
            expires_in_seconds: payload.expires_in,
        })
    }

    async fn list_labels(&self, access_token: &str) -> Result<Vec<MailLabel>> {
        let url = format!("{}/users/me/labels", self.api_base);
        let body = self.fetch_with_retry(access_token, &url).await?;
        let payload: GmailLabelList =
            serde_json::from_str(&body).context("decode mail label list")?;
        Ok(payload
            .labels
            .into_iter()
            .map(|label| MailLabel {
                id: label.id,
                name: label.name,
            })
            .collect())
    }

    async fn list_message_ids(
        &self,
        access_token: &str,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let mut url = format!(
            "{}/users/me/messages?maxResults={DEFAULT_PAGE_SIZE}&q={}",
            self.api_base,
            urlencode(query)
        );
        if let Some(pt) = page_token {
            url.push_str(&format!("&pageToken={pt}"));
        }
        let body = self.fetch_with_retry(access_token, &url).await?;
        let payload: GmailMessageList =
            serde_json::from_str(&body).context("decode mail message list")?;
        Ok(MessagePage {
            ids: payload
                .messages
                .unwrap_or_default()
                .into_iter()
                .map(|stub| stub.id)
                .collect(),
            next_page_token: payload.next_page_token,
        })
    }

    async fn get_message(&self, access_token: &str, message_id: &str) -> Result<InboxMessage> {
        let url = format!("{}/users/me/messages/{message_id}?format=full", self.api_base);
        let body = self.fetch_with_retry(access_token, &url).await?;
        let payload: GmailMessage = serde_json::from_str(&body).context("decode mail message")?;
        Ok(map_message(payload))
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= REDACTED_BODY_MAX_LEN {
        trimmed.to_string()
    } else {
        format!("{}…", &trimmed[..REDACTED_BODY_MAX_LEN])
    }
}

fn map_message(message: GmailMessage) -> InboxMessage {
    let subject = extract_header(&message.payload, "Subject").unwrap_or_default();
    let from = extract_header(&message.payload, "From").unwrap_or_default();
    let (sender_name, sender_email) = parse_from_header(&from);
    let received_at = message
        .internal_date
        .as_deref()
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single());

    InboxMessage {
        id: message.id,
        thread_id: message.thread_id,
        label_ids: message.label_ids.unwrap_or_default(),
        subject,
        sender_name,
        sender_email,
        snippet: message.snippet,
        received_at,
    }
}

fn extract_header(payload: &GmailPayload, name: &str) -> Option<String> {
    payload
        .headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
        .map(|header| header.value.clone())
}

/// Split a `Display Name <address>` From header. Headers without the angle
/// form yield the raw value for both parts, matching how downstream
/// heuristics treat bare addresses.
pub fn parse_from_header(raw: &str) -> (String, String) {
    let trimmed = raw.trim();
    if let (Some(open), Some(close)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
        if open < close {
            let name = trimmed[..open].trim().trim_matches('"').to_string();
            let address = trimmed[open + 1..close].trim().to_string();
            if !address.is_empty() {
                return (name, address);
            }
        }
    }
    (trimmed.to_string(), trimmed.to_string())
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct GmailLabelList {
    #[serde(default)]
    labels: Vec<GmailLabelEntry>,
}

#[derive(Debug, Deserialize)]
struct GmailLabelEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessageList {
    messages: Option<Vec<GmailMessageStub>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GmailMessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: Option<String>,
    label_ids: Option<Vec<String>>,
    snippet: Option<String>,
    #[serde(default)]
    payload: GmailPayload,
    internal_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GmailPayload {
    #[serde(default)]
    headers: Vec<GmailHeader>,
}

#[derive(Debug, Deserialize)]
struct GmailHeader {
    name: String,
    value: String,
}
