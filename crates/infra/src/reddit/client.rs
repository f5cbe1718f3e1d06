use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use quill_core::domain::comments::{OwnComment, Reply};
use quill_core::domain::items::Item;
use quill_core::domain::source::{ContentSource, SourceError};
use quill_core::types::content_id::ContentId;

const TOKEN_ENDPOINT: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
const REPLY_FETCH_LIMIT: usize = 100;
const DELETED_AUTHOR: &str = "[deleted]";

#[derive(Debug, Error)]
pub enum RedditError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited (retry after {0:?})")]
    RateLimited(Option<Duration>),
    #[error("api error: {0}")]
    Api(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<RedditError> for SourceError {
    fn from(err: RedditError) -> Self {
        match err {
            RedditError::RateLimited(retry_after) => SourceError::RateLimited { retry_after },
            RedditError::Http(err) if err.is_connect() || err.is_timeout() => {
                SourceError::Unavailable(err.to_string())
            }
            RedditError::Http(err) => match err.status() {
                Some(status) if status.is_server_error() => {
                    SourceError::Unavailable(err.to_string())
                }
                _ => SourceError::Request(err.to_string()),
            },
            RedditError::Api(message) => SourceError::Request(message),
            RedditError::InvalidResponse(message) => SourceError::InvalidResponse(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

/// Script-app client for a single subreddit, authenticating with the
/// password grant.
pub struct RedditClient {
    http: reqwest::Client,
    credentials: RedditCredentials,
    subreddit: String,
    token: Mutex<Option<AccessToken>>,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl RedditClient {
    pub fn new(http: reqwest::Client, credentials: RedditCredentials, subreddit: String) -> Self {
        Self {
            http,
            credentials,
            subreddit,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, RedditError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }
        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .header(USER_AGENT, &self.credentials.user_agent)
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;
        let payload: TokenResponse = check_status(response)?.json().await?;
        if let Some(error) = payload.error {
            return Err(RedditError::Api(format!("token request failed: {error}")));
        }
        let value = payload
            .access_token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| RedditError::InvalidResponse("missing access token".to_string()))?;
        let lifetime = payload.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        if guard.is_none() {
            info!(username = %self.credentials.username, "authenticated with reddit");
        }
        *guard = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        debug!(lifetime_secs = lifetime, "reddit access token refreshed");
        Ok(value)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, RedditError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{API_BASE}{path}"))
            .bearer_auth(token)
            .header(USER_AGENT, &self.credentials.user_agent)
            .query(query)
            .send()
            .await?;
        Ok(check_status(response)?.json().await?)
    }

    async fn submit_comment(&self, thing_id: &str, text: &str) -> Result<String, RedditError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(format!("{API_BASE}/api/comment"))
            .bearer_auth(token)
            .header(USER_AGENT, &self.credentials.user_agent)
            .form(&[("api_type", "json"), ("thing_id", thing_id), ("text", text)])
            .send()
            .await?;
        let payload: Value = check_status(response)?.json().await?;
        parse_comment_submission(&payload)
    }

    async fn link_id_of(&self, comment_id: &str) -> Result<String, RedditError> {
        let value = self
            .get_json("/api/info", &[("id", format!("t1_{comment_id}"))])
            .await?;
        let comment = listing_children(&value)?
            .into_iter()
            .filter(|thing| thing.kind == "t1")
            .find_map(|thing| serde_json::from_value::<CommentData>(thing.data).ok())
            .ok_or_else(|| RedditError::InvalidResponse(format!("comment {comment_id} not found")))?;
        Ok(strip_kind(&comment.link_id).to_string())
    }
}

#[async_trait]
impl ContentSource for RedditClient {
    fn account_name(&self) -> &str {
        &self.credentials.username
    }

    async fn fetch_newest(&self, limit: usize) -> Result<Vec<Item>, SourceError> {
        let value = self
            .get_json(
                &format!("/r/{}/new", self.subreddit),
                &[("limit", limit.to_string()), ("raw_json", "1".to_string())],
            )
            .await?;
        Ok(parse_items(&value)?)
    }

    async fn fetch_own_comments(&self, limit: usize) -> Result<Vec<OwnComment>, SourceError> {
        let value = self
            .get_json(
                &format!("/user/{}/comments", self.credentials.username),
                &[
                    ("limit", limit.to_string()),
                    ("sort", "new".to_string()),
                    ("raw_json", "1".to_string()),
                ],
            )
            .await?;
        Ok(parse_own_comments(&value)?)
    }

    async fn fetch_replies(&self, comment_id: &str) -> Result<Vec<Reply>, SourceError> {
        let link_id = self.link_id_of(comment_id).await?;
        let value = self
            .get_json(
                &format!("/comments/{link_id}"),
                &[
                    ("comment", comment_id.to_string()),
                    ("depth", "2".to_string()),
                    ("limit", REPLY_FETCH_LIMIT.to_string()),
                    ("raw_json", "1".to_string()),
                ],
            )
            .await?;
        Ok(parse_replies(&value, comment_id)?)
    }

    async fn post_comment(&self, item_id: &ContentId, text: &str) -> Result<String, SourceError> {
        Ok(self.submit_comment(&format!("t3_{item_id}"), text).await?)
    }

    async fn post_reply(&self, comment_id: &str, text: &str) -> Result<String, SourceError> {
        Ok(self.submit_comment(&format!("t1_{comment_id}"), text).await?)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct LinkData {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    author: Option<String>,
    created_utc: f64,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    #[serde(default)]
    link_id: String,
    #[serde(default)]
    parent_id: String,
    author: Option<String>,
    #[serde(default)]
    body: String,
    created_utc: f64,
    #[serde(default)]
    replies: Value,
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RedditError> {
    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        let headers = response.headers();
        let retry_after = header_duration(headers, "retry-after")
            .or_else(|| header_duration(headers, "x-ratelimit-reset"));
        return Err(RedditError::RateLimited(retry_after));
    }
    Ok(response.error_for_status()?)
}

fn header_duration(headers: &HeaderMap, name: &str) -> Option<Duration> {
    let raw = headers.get(name)?.to_str().ok()?;
    let secs: f64 = raw.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn listing_children(value: &Value) -> Result<Vec<Thing>, RedditError> {
    let listing: Listing = serde_json::from_value(value.clone())
        .map_err(|err| RedditError::InvalidResponse(format!("invalid listing: {err}")))?;
    Ok(listing.data.children)
}

fn parse_items(value: &Value) -> Result<Vec<Item>, RedditError> {
    let mut items = Vec::new();
    for thing in listing_children(value)? {
        if thing.kind != "t3" {
            continue;
        }
        let link: LinkData = match serde_json::from_value(thing.data) {
            Ok(link) => link,
            Err(err) => {
                warn!(error = %err, "skipping malformed link");
                continue;
            }
        };
        let id = match ContentId::try_from(link.id.as_str()) {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "skipping link with invalid id");
                continue;
            }
        };
        items.push(Item {
            id,
            title: link.title,
            body: link.selftext,
            author: link.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
            created_at: from_unix(link.created_utc),
        });
    }
    Ok(items)
}

fn parse_own_comments(value: &Value) -> Result<Vec<OwnComment>, RedditError> {
    Ok(comment_things(listing_children(value)?)
        .into_iter()
        .map(|comment| OwnComment {
            item_id: strip_kind(&comment.link_id).to_string(),
            id: comment.id,
            body: comment.body,
            created_at: from_unix(comment.created_utc),
        })
        .collect())
}

/// Direct replies to `comment_id` from a `/comments/{link}?comment=` thread.
fn parse_replies(value: &Value, comment_id: &str) -> Result<Vec<Reply>, RedditError> {
    let thread = value
        .as_array()
        .and_then(|parts| parts.get(1))
        .ok_or_else(|| RedditError::InvalidResponse("missing comment listing".to_string()))?;
    let Some(target) = comment_things(listing_children(thread)?)
        .into_iter()
        .find(|comment| comment.id == comment_id)
    else {
        return Ok(Vec::new());
    };
    // An empty string stands in for a listing when there are no replies.
    if !target.replies.is_object() {
        return Ok(Vec::new());
    }
    let parent_fullname = format!("t1_{comment_id}");
    Ok(comment_things(listing_children(&target.replies)?)
        .into_iter()
        .filter(|reply| reply.parent_id == parent_fullname)
        .map(|reply| Reply {
            id: reply.id,
            parent_id: comment_id.to_string(),
            author: reply.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
            body: reply.body,
            created_at: from_unix(reply.created_utc),
        })
        .collect())
}

fn comment_things(things: Vec<Thing>) -> Vec<CommentData> {
    things
        .into_iter()
        .filter(|thing| thing.kind == "t1")
        .filter_map(|thing| serde_json::from_value(thing.data).ok())
        .collect()
}

fn parse_comment_submission(payload: &Value) -> Result<String, RedditError> {
    let json = payload
        .get("json")
        .ok_or_else(|| RedditError::InvalidResponse("missing json envelope".to_string()))?;
    if let Some(errors) = json.get("errors").and_then(Value::as_array) {
        if let Some(first) = errors.first().and_then(Value::as_array) {
            let code = first.first().and_then(Value::as_str).unwrap_or_default();
            let message = first.get(1).and_then(Value::as_str).unwrap_or_default();
            if code == "RATELIMIT" {
                return Err(RedditError::RateLimited(parse_retry_after(message)));
            }
            return Err(RedditError::Api(format!("{code}: {message}")));
        }
    }
    json.pointer("/data/things/0/data/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RedditError::InvalidResponse("missing comment id".to_string()))
}

/// Reads "try again in 5 minutes" style hints from a RATELIMIT message.
fn parse_retry_after(message: &str) -> Option<Duration> {
    let words: Vec<&str> = message
        .split_whitespace()
        .map(|word| word.trim_matches(|ch: char| !ch.is_alphanumeric()))
        .collect();
    words.windows(2).find_map(|pair| {
        let amount: u64 = pair[0].parse().ok()?;
        let unit = pair[1].to_ascii_lowercase();
        if unit.starts_with("millisecond") {
            Some(Duration::from_millis(amount))
        } else if unit.starts_with("second") {
            Some(Duration::from_secs(amount))
        } else if unit.starts_with("minute") {
            amount.checked_mul(60).map(Duration::from_secs)
        } else {
            None
        }
    })
}

fn strip_kind(fullname: &str) -> &str {
    match fullname.split_once('_') {
        Some((kind, id)) if kind.starts_with('t') => id,
        _ => fullname,
    }
}

fn from_unix(secs: f64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs.trunc() as i64, 0).unwrap_or_else(Utc::now)
}
