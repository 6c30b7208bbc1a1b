use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;

use super::normalize::{note_from_body, notes_from_body};
use super::{NoteRemote, RemoteError, RemoteOutcome, RemoteResult};
use crate::model::{Note, NoteId};

/// Collection paths relative to the base URL, tried in order.
const COLLECTION_PATHS: [&[&str]; 2] = [&["notes"], &["api", "notes"]];
/// Methods tried, in order, when updating a note.
const UPDATE_METHODS: [Method; 2] = [Method::PUT, Method::PATCH];

/// HTTP client for the note service.
///
/// Every operation probes the candidate paths in order and stops at the first
/// 2xx. Connection failures, timeouts and non-2xx statuses move on to the
/// next candidate; when all are exhausted the call reports
/// [`RemoteOutcome::Unavailable`]. Any other request failure, or a 2xx body
/// that claims to be JSON but is not, is a [`RemoteError`] and ends the probe.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Option<Url>,
}

#[derive(Debug, Serialize)]
struct NotePayload<'a> {
    title: &'a str,
    content: &'a str,
}

#[derive(Debug)]
enum ResponseBody {
    Json(Value),
    Text(String),
}

#[derive(Debug)]
enum Attempt {
    Success(ResponseBody),
    Failed(String),
}

impl HttpRemote {
    /// A client for `base_url`, or an unconfigured client when it is `None`.
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self, RemoteError> {
        let base_url = base_url.map(parse_base_url).transpose()?;
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    fn endpoints(base: &Url, suffix: Option<&str>) -> Vec<Url> {
        COLLECTION_PATHS
            .iter()
            .map(|segments| {
                let mut url = base.clone();
                // `parse_base_url` guarantees an http(s) URL, which always
                // accepts path segments.
                if let Ok(mut path) = url.path_segments_mut() {
                    path.pop_if_empty().extend(segments.iter());
                    if let Some(suffix) = suffix {
                        path.push(suffix);
                    }
                }
                url
            })
            .collect()
    }

    async fn attempt(
        &self,
        method: Method,
        url: Url,
        payload: Option<&NotePayload<'_>>,
    ) -> Result<Attempt, RemoteError> {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if err.is_connect() || err.is_timeout() => {
                tracing::debug!(%method, %url, ?err, "note service unreachable");
                return Ok(Attempt::Failed(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        let raw = match response.text().await {
            Ok(raw) => raw,
            Err(err) if err.is_timeout() => return Ok(Attempt::Failed(err.to_string())),
            Err(err) => return Err(err.into()),
        };
        let body = if is_json && !raw.trim().is_empty() {
            match serde_json::from_str(&raw) {
                Ok(value) => ResponseBody::Json(value),
                Err(err) if status.is_success() => {
                    return Err(RemoteError::Malformed {
                        url: url.to_string(),
                        reason: err.to_string(),
                    })
                }
                Err(_) => ResponseBody::Text(raw),
            }
        } else {
            ResponseBody::Text(raw)
        };

        if status.is_success() {
            tracing::debug!(%method, %url, status = status.as_u16(), "note service accepted request");
            Ok(Attempt::Success(body))
        } else {
            let message = error_message(status, &body);
            tracing::debug!(%method, %url, status = status.as_u16(), %message, "note service rejected request");
            Ok(Attempt::Failed(message))
        }
    }

    /// Try each URL in order with `method`, returning the first 2xx body.
    async fn first_success(
        &self,
        method: Method,
        urls: &[Url],
        payload: Option<&NotePayload<'_>>,
    ) -> Result<Option<ResponseBody>, RemoteError> {
        let mut last_failure = None;
        for url in urls {
            match self.attempt(method.clone(), url.clone(), payload).await? {
                Attempt::Success(body) => return Ok(Some(body)),
                Attempt::Failed(message) => last_failure = Some(message),
            }
        }
        if let Some(message) = last_failure {
            tracing::info!(%method, %message, "note service unavailable");
        }
        Ok(None)
    }
}

#[async_trait]
impl NoteRemote for HttpRemote {
    async fn fetch_all(&self) -> RemoteResult<Vec<Note>> {
        let Some(base) = &self.base_url else {
            return Ok(RemoteOutcome::Unconfigured);
        };
        let urls = Self::endpoints(base, None);
        let Some(body) = self.first_success(Method::GET, &urls, None).await? else {
            return Ok(RemoteOutcome::Unavailable);
        };
        Ok(match body {
            ResponseBody::Json(value) => match notes_from_body(&value) {
                Some(notes) => RemoteOutcome::Value(notes),
                None => {
                    tracing::warn!("note list response had an unrecognised shape");
                    RemoteOutcome::Unavailable
                }
            },
            ResponseBody::Text(_) => RemoteOutcome::Unavailable,
        })
    }

    async fn create(&self, title: &str, content: &str) -> RemoteResult<Note> {
        let Some(base) = &self.base_url else {
            return Ok(RemoteOutcome::Unconfigured);
        };
        let urls = Self::endpoints(base, None);
        let payload = NotePayload { title, content };
        let body = self.first_success(Method::POST, &urls, Some(&payload)).await?;
        Ok(single_note(body))
    }

    async fn update(&self, id: &NoteId, title: &str, content: &str) -> RemoteResult<Note> {
        let Some(base) = &self.base_url else {
            return Ok(RemoteOutcome::Unconfigured);
        };
        let urls = Self::endpoints(base, Some(id.as_str()));
        let payload = NotePayload { title, content };
        for method in UPDATE_METHODS {
            if let Some(body) = self.first_success(method, &urls, Some(&payload)).await? {
                return Ok(single_note(Some(body)));
            }
        }
        Ok(RemoteOutcome::Unavailable)
    }

    async fn delete(&self, id: &NoteId) -> RemoteResult<()> {
        let Some(base) = &self.base_url else {
            return Ok(RemoteOutcome::Unconfigured);
        };
        let urls = Self::endpoints(base, Some(id.as_str()));
        Ok(match self.first_success(Method::DELETE, &urls, None).await? {
            Some(_) => RemoteOutcome::Value(()),
            None => RemoteOutcome::Unavailable,
        })
    }
}

fn single_note(body: Option<ResponseBody>) -> RemoteOutcome<Note> {
    match body {
        Some(ResponseBody::Json(value)) => match note_from_body(&value) {
            Some(note) => RemoteOutcome::Value(note),
            None => {
                tracing::warn!("note response had an unrecognised shape");
                RemoteOutcome::Unavailable
            }
        },
        Some(ResponseBody::Text(_)) | None => RemoteOutcome::Unavailable,
    }
}

fn parse_base_url(raw: &str) -> Result<Url, RemoteError> {
    let url = Url::parse(raw.trim()).map_err(|err| RemoteError::InvalidUrl(format!("{raw}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RemoteError::InvalidUrl(format!(
            "{raw}: URL must start with http:// or https://"
        )));
    }
    Ok(url)
}

/// `detail` or `message` from a JSON error body, else a generic status line.
fn error_message(status: StatusCode, body: &ResponseBody) -> String {
    if let ResponseBody::Json(Value::Object(map)) = body {
        for field in ["detail", "message"] {
            if let Some(Value::String(text)) = map.get(field) {
                return text.clone();
            }
        }
    }
    format!("Request failed: {}", status.as_u16())
}
