//! HTTP proxy executor
//!
//! Owns the whole life cycle of one outgoing request: substitution,
//! validation, auth application, dispatch, the manual redirect loop, capped
//! body capture, timing, and history recording. The client never follows
//! redirects on its own; hop handling (method downgrade, auth re-application,
//! chain tracking) is all here.

use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use std::collections::HashMap;
use std::time::Instant;
use url::Url;
use uuid::Uuid;

use super::history::HistoryRecorder;
use super::types::{OutboundRequest, ProxyResponse};
use crate::auth::apply_auth;
use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::identity::CallerIdentity;
use crate::model::{BodyType, RequestBody, RequestHistory};
use crate::vars::{expand, VariableStore};

/// Upstream failure markers surfaced with `status_code = 0`
const UPSTREAM_UNREACHABLE: &str = "UPSTREAM_UNREACHABLE";
const UPSTREAM_TIMEOUT: &str = "UPSTREAM_TIMEOUT";
const UPSTREAM_IO: &str = "UPSTREAM_IO";

enum UpstreamFailure {
    Unreachable(String),
    Timeout(String),
    Io(String),
}

impl UpstreamFailure {
    fn marker(&self) -> &'static str {
        match self {
            UpstreamFailure::Unreachable(_) => UPSTREAM_UNREACHABLE,
            UpstreamFailure::Timeout(_) => UPSTREAM_TIMEOUT,
            UpstreamFailure::Io(_) => UPSTREAM_IO,
        }
    }

    fn describe(&self) -> String {
        let detail = match self {
            UpstreamFailure::Unreachable(d)
            | UpstreamFailure::Timeout(d)
            | UpstreamFailure::Io(d) => d,
        };
        format!("{}: {}", self.marker(), detail)
    }
}

fn classify(error: reqwest::Error) -> std::result::Result<UpstreamFailure, Error> {
    if error.is_builder() {
        // Malformed header names/values surface here; that is caller input,
        // not an upstream fault
        return Err(Error::Validation(format!("invalid request: {error}")));
    }
    if error.is_timeout() {
        Ok(UpstreamFailure::Timeout(error.to_string()))
    } else if error.is_connect() {
        Ok(UpstreamFailure::Unreachable(error.to_string()))
    } else {
        Ok(UpstreamFailure::Io(error.to_string()))
    }
}

/// Replace or append one query pair on a URL
fn upsert_url_query(url: &mut Url, key: &str, value: &str) {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if let Some(pos) = pairs.iter().position(|(k, _)| k == key) {
        pairs[pos].1 = value.to_string();
    } else {
        pairs.push((key.to_string(), value.to_string()));
    }
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
}

/// Executes resolved requests against arbitrary remote hosts
pub struct ProxyExecutor {
    client: reqwest::Client,
    config: ProxyConfig,
    recorder: HistoryRecorder,
}

impl ProxyExecutor {
    /// Build the executor and its shared client
    ///
    /// The client is constructed with redirects disabled; it is cheap to
    /// clone and reused for every execution.
    pub fn new(config: ProxyConfig, recorder: HistoryRecorder) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            recorder,
        })
    }

    /// Execute one request end to end
    ///
    /// Returns `Err` only for caller mistakes (invalid URL, malformed auth
    /// config). Upstream failures come back as a normal [`ProxyResponse`]
    /// with `status_code = 0` and an error marker, and are still recorded to
    /// history when enabled.
    pub async fn execute(
        &self,
        input: OutboundRequest,
        store: &VariableStore,
        identity: &CallerIdentity,
    ) -> Result<ProxyResponse> {
        let mut unresolved: Vec<String> = Vec::new();
        let track = |names: Vec<String>, unresolved: &mut Vec<String>| {
            for name in names {
                if !unresolved.iter().any(|u| u == &name) {
                    unresolved.push(name);
                }
            }
        };

        // Substitute the URL, then validate what came out
        let url_expansion = expand(&input.url, store);
        track(url_expansion.unresolved, &mut unresolved);
        let mut current_url = Url::parse(&url_expansion.output)
            .map_err(|_| Error::Validation(format!("INVALID_URL: {}", url_expansion.output)))?;
        if !matches!(current_url.scheme(), "http" | "https") {
            return Err(Error::Validation(format!(
                "INVALID_URL: unsupported scheme {}",
                current_url.scheme()
            )));
        }
        if current_url.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(Error::Validation(
                "INVALID_URL: missing host".to_string(),
            ));
        }

        // Substitute enabled headers and query params
        let mut headers: Vec<(String, String)> = Vec::new();
        for entry in input.headers.iter().filter(|h| h.is_enabled) {
            let expansion = expand(&entry.value, store);
            track(expansion.unresolved, &mut unresolved);
            headers.push((entry.key.clone(), expansion.output));
        }
        for entry in input.params.iter().filter(|p| p.is_enabled) {
            let expansion = expand(&entry.value, store);
            track(expansion.unresolved, &mut unresolved);
            upsert_url_query(&mut current_url, &entry.key, &expansion.output);
        }

        // Substitute and encode the body
        let (mut body, implied_content_type) = {
            let (bytes, content_type, body_unresolved) = build_body(&input.body, store);
            track(body_unresolved, &mut unresolved);
            (bytes, content_type)
        };

        let timeout = self.config.clamp_timeout(input.timeout_ms);

        // Auth; query-type credentials are tracked separately so they can be
        // re-applied to every redirect hop
        let mut auth_query: Vec<(String, String)> = Vec::new();
        let auth_unresolved = apply_auth(&input.auth, store, &mut headers, &mut auth_query)?;
        track(auth_unresolved, &mut unresolved);
        for (key, value) in &auth_query {
            upsert_url_query(&mut current_url, key, value);
        }

        if !headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
        {
            headers.push(("User-Agent".to_string(), self.config.user_agent.clone()));
        }
        if let Some(content_type) = implied_content_type {
            if !headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            {
                headers.push(("Content-Type".to_string(), content_type));
            }
        }

        let mut method: reqwest::Method = input.method.into();
        let mut redirect_chain: Vec<String> = Vec::new();
        let mut redirect_chain_overflow = false;

        let started = Instant::now();
        let deadline = started + timeout;

        tracing::debug!(method = %method, url = %current_url, "dispatching proxy request");

        let outcome = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break Err(UpstreamFailure::Timeout("request deadline exceeded".to_string()));
            }

            let mut builder = self
                .client
                .request(method.clone(), current_url.clone())
                .timeout(remaining);
            for (key, value) in &headers {
                builder = builder.header(key.as_str(), value.as_str());
            }
            if let Some(bytes) = &body {
                builder = builder.body(bytes.clone());
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => match classify(e) {
                    Ok(failure) => break Err(failure),
                    Err(error) => return Err(error),
                },
            };

            let status = response.status();
            if status.is_redirection() && input.follow_redirects {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                // A 3xx without a Location is returned as-is
                let Some(location) = location else {
                    break Ok(response);
                };
                if redirect_chain.len() >= self.config.max_redirects {
                    redirect_chain_overflow = true;
                    break Ok(response);
                }
                let Ok(next) = current_url.join(&location) else {
                    break Ok(response);
                };
                redirect_chain.push(next.to_string());

                // 301/302/303 downgrade to GET and drop the body; 307/308
                // preserve both
                if matches!(status.as_u16(), 301 | 302 | 303) {
                    method = reqwest::Method::GET;
                    body = None;
                    headers.retain(|(k, _)| {
                        !k.eq_ignore_ascii_case(CONTENT_TYPE.as_str())
                            && !k.eq_ignore_ascii_case(CONTENT_LENGTH.as_str())
                    });
                }

                current_url = next;

                // Auth is re-sent on every hop; upserts keep it idempotent
                let hop_unresolved =
                    apply_auth(&input.auth, store, &mut headers, &mut auth_query)?;
                track(hop_unresolved, &mut unresolved);
                for (key, value) in &auth_query {
                    upsert_url_query(&mut current_url, key, value);
                }
                continue;
            }

            break Ok(response);
        };

        let response = match outcome {
            Ok(response) => response,
            Err(failure) => {
                return Ok(self
                    .finish_failed(
                        &input, identity, &current_url, &headers, &body, failure, started,
                        redirect_chain, unresolved,
                    )
                    .await);
            }
        };

        // Capture the body, capped and bounded by the remaining deadline
        let status = response.status();
        let response_headers = response.headers().clone();
        let cap = self.config.max_response_bytes;
        let mut stream = response.bytes_stream();
        let mut captured: Vec<u8> = Vec::new();
        let mut body_truncated = false;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let chunk = match tokio::time::timeout(remaining, stream.next()).await {
                Err(_) => {
                    return Ok(self
                        .finish_failed(
                            &input,
                            identity,
                            &current_url,
                            &headers,
                            &body,
                            UpstreamFailure::Timeout("body read exceeded deadline".to_string()),
                            started,
                            redirect_chain,
                            unresolved,
                        )
                        .await);
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    return Ok(self
                        .finish_failed(
                            &input,
                            identity,
                            &current_url,
                            &headers,
                            &body,
                            UpstreamFailure::Io(e.to_string()),
                            started,
                            redirect_chain,
                            unresolved,
                        )
                        .await);
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            if captured.len() + chunk.len() > cap {
                let take = cap - captured.len();
                captured.extend_from_slice(&chunk[..take]);
                body_truncated = true;
                break;
            }
            captured.extend_from_slice(&chunk);
        }

        let response_time_ms = started.elapsed().as_millis() as u64;
        let response_size_bytes = captured.len() as u64;
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let content_type = response_headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut header_map: HashMap<String, Vec<String>> = HashMap::new();
        for key in response_headers.keys() {
            let values: Vec<String> = response_headers
                .get_all(key)
                .iter()
                .filter_map(|v| v.to_str().ok().map(str::to_string))
                .collect();
            header_map.insert(key.as_str().to_string(), values);
        }

        let response_body = String::from_utf8_lossy(&captured).into_owned();

        tracing::info!(
            status = status.as_u16(),
            bytes = response_size_bytes,
            elapsed_ms = response_time_ms,
            redirects = redirect_chain.len(),
            "proxy response"
        );

        let history_id = if input.save_to_history {
            let entry = self.history_entry(
                &input,
                identity,
                &current_url,
                &headers,
                &body,
                status.as_u16(),
                &status_text,
                &header_map,
                Some(&response_body),
                response_size_bytes,
                response_time_ms,
                content_type.clone(),
                None,
            );
            self.recorder.record(entry).await
        } else {
            None
        };

        Ok(ProxyResponse {
            status_code: status.as_u16(),
            status_text,
            response_headers: header_map,
            response_body,
            response_time_ms,
            response_size_bytes,
            content_type,
            redirect_chain,
            body_truncated,
            redirect_chain_overflow,
            unresolved_variables: unresolved,
            error: None,
            history_id,
        })
    }

    /// Assemble the zero-status envelope for an upstream failure and record
    /// it to history
    #[allow(clippy::too_many_arguments)]
    async fn finish_failed(
        &self,
        input: &OutboundRequest,
        identity: &CallerIdentity,
        url: &Url,
        headers: &[(String, String)],
        body: &Option<Vec<u8>>,
        failure: UpstreamFailure,
        started: Instant,
        redirect_chain: Vec<String>,
        unresolved: Vec<String>,
    ) -> ProxyResponse {
        let response_time_ms = started.elapsed().as_millis() as u64;
        let error = failure.describe();
        tracing::warn!(url = %url, elapsed_ms = response_time_ms, "upstream failure: {error}");

        let history_id = if input.save_to_history {
            let entry = self.history_entry(
                input,
                identity,
                url,
                headers,
                body,
                0,
                "",
                &HashMap::new(),
                None,
                0,
                response_time_ms,
                None,
                Some(error.clone()),
            );
            self.recorder.record(entry).await
        } else {
            None
        };

        ProxyResponse {
            status_code: 0,
            status_text: String::new(),
            response_headers: HashMap::new(),
            response_body: String::new(),
            response_time_ms,
            response_size_bytes: 0,
            content_type: None,
            redirect_chain,
            body_truncated: false,
            redirect_chain_overflow: false,
            unresolved_variables: unresolved,
            error: Some(error),
            history_id,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn history_entry(
        &self,
        input: &OutboundRequest,
        identity: &CallerIdentity,
        url: &Url,
        headers: &[(String, String)],
        body: &Option<Vec<u8>>,
        status_code: u16,
        status_text: &str,
        response_headers: &HashMap<String, Vec<String>>,
        response_body: Option<&str>,
        response_size_bytes: u64,
        duration_ms: u64,
        content_type: Option<String>,
        error: Option<String>,
    ) -> RequestHistory {
        let request_headers: HashMap<String, String> = headers.iter().cloned().collect();
        let (request_body, request_body_truncated) = match body {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                let (stored, truncated) = self.recorder.truncate_body(&text);
                (Some(stored), truncated)
            }
            None => (None, false),
        };
        let (response_body, response_body_truncated) = match response_body {
            Some(text) => {
                let (stored, truncated) = self.recorder.truncate_body(text);
                (Some(stored), truncated)
            }
            None => (None, false),
        };

        RequestHistory {
            id: Uuid::new_v4(),
            team_id: identity.team_id,
            user_id: identity.user_id,
            method: input.method,
            url: url.to_string(),
            request_headers,
            request_body,
            request_body_truncated,
            status_code,
            status_text: status_text.to_string(),
            response_headers: response_headers.clone(),
            response_body,
            response_body_truncated,
            response_size_bytes,
            duration_ms,
            content_type,
            error,
            collection_id: input.collection_id,
            request_id: input.request_id,
            environment_id: input.environment_id,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Encode the body and derive its implied content type
///
/// Returns `(bytes, content_type, unresolved)`. Raw and GraphQL content is
/// template-expanded; binary content is passed through opaque.
fn build_body(
    body: &Option<RequestBody>,
    store: &VariableStore,
) -> (Option<Vec<u8>>, Option<String>, Vec<String>) {
    let Some(body) = body else {
        return (None, None, Vec::new());
    };

    let mut unresolved: Vec<String> = Vec::new();
    let render = |template: &str, unresolved: &mut Vec<String>| -> String {
        let expansion = expand(template, store);
        for name in expansion.unresolved {
            if !unresolved.iter().any(|u| u == &name) {
                unresolved.push(name);
            }
        }
        expansion.output
    };

    match body.body_type {
        BodyType::None => (None, None, unresolved),

        BodyType::RawJson
        | BodyType::RawXml
        | BodyType::RawHtml
        | BodyType::RawText
        | BodyType::RawYaml => {
            let raw = body.raw.clone().unwrap_or_default();
            let rendered = render(&raw, &mut unresolved);
            (
                Some(rendered.into_bytes()),
                body.body_type.content_type().map(str::to_string),
                unresolved,
            )
        }

        BodyType::Binary => (
            body.raw.clone().map(String::into_bytes),
            body.body_type.content_type().map(str::to_string),
            unresolved,
        ),

        BodyType::XWwwFormUrlencoded => {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for field in body.form_data.iter().filter(|f| f.is_enabled) {
                let value = render(&field.value, &mut unresolved);
                serializer.append_pair(&field.key, &value);
            }
            (
                Some(serializer.finish().into_bytes()),
                body.body_type.content_type().map(str::to_string),
                unresolved,
            )
        }

        BodyType::FormData => {
            let boundary = format!("courier-{}", Uuid::new_v4().simple());
            let mut encoded = String::new();
            for field in body.form_data.iter().filter(|f| f.is_enabled) {
                let value = render(&field.value, &mut unresolved);
                encoded.push_str(&format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    field.key, value
                ));
            }
            encoded.push_str(&format!("--{boundary}--\r\n"));
            (
                Some(encoded.into_bytes()),
                Some(format!("multipart/form-data; boundary={boundary}")),
                unresolved,
            )
        }

        BodyType::Graphql => {
            let query = render(&body.graphql_query.clone().unwrap_or_default(), &mut unresolved);
            let variables_raw =
                render(&body.graphql_variables.clone().unwrap_or_default(), &mut unresolved);
            let variables: serde_json::Value = if variables_raw.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&variables_raw).unwrap_or(serde_json::json!({}))
            };
            let payload = serde_json::json!({ "query": query, "variables": variables });
            (
                Some(payload.to_string().into_bytes()),
                body.body_type.content_type().map(str::to_string),
                unresolved,
            )
        }
    }
}
