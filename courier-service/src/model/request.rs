//! Stored request templates and their child collections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::AuthType;

/// HTTP methods a stored request may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Whether a request with this method normally carries a body
    pub fn allows_body(&self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// A key/value entry with an enabled toggle, used for headers, query params,
/// and form fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueEntry {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl KeyValueEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            is_enabled: true,
        }
    }
}

/// Body payload discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BodyType {
    None,
    FormData,
    XWwwFormUrlencoded,
    RawJson,
    RawXml,
    RawHtml,
    RawText,
    RawYaml,
    Binary,
    Graphql,
}

impl BodyType {
    /// Content type implied by the body kind, when the caller set none
    ///
    /// `FormData` is excluded: its multipart content type carries a
    /// per-request boundary and is produced alongside the encoded body.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            BodyType::None | BodyType::FormData => None,
            BodyType::XWwwFormUrlencoded => Some("application/x-www-form-urlencoded"),
            BodyType::RawJson | BodyType::Graphql => Some("application/json"),
            BodyType::RawXml => Some("application/xml"),
            BodyType::RawHtml => Some("text/html"),
            BodyType::RawText => Some("text/plain"),
            BodyType::RawYaml => Some("application/yaml"),
            BodyType::Binary => Some("application/octet-stream"),
        }
    }
}

/// Request body, both as stored and as carried on the proxy wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    #[serde(rename = "type")]
    pub body_type: BodyType,

    /// Raw content for the RAW_* and BINARY kinds
    #[serde(default)]
    pub raw: Option<String>,

    /// Fields for FORM_DATA and X_WWW_FORM_URLENCODED
    #[serde(default)]
    pub form_data: Vec<KeyValueEntry>,

    #[serde(default)]
    pub graphql_query: Option<String>,

    /// GraphQL variables as a JSON object string
    #[serde(default)]
    pub graphql_variables: Option<String>,

    /// Original filename for BINARY uploads
    #[serde(default)]
    pub binary_file_name: Option<String>,
}

/// Script slot discriminator; a request holds at most one script per type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScriptType {
    PreRequest,
    PostResponse,
}

/// A pre-request or post-response snippet attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub script_type: ScriptType,
    pub source: String,
}

/// A stored HTTP call template
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDefinition {
    pub id: Uuid,
    pub folder_id: Uuid,
    pub name: String,
    pub method: HttpMethod,

    /// URL template; `{{name}}` placeholders are expanded at execution time
    pub url: String,

    /// Caller-supplied ordering hint within the folder
    #[serde(default)]
    pub sort_order: i32,

    #[serde(default)]
    pub headers: Vec<KeyValueEntry>,

    #[serde(default)]
    pub params: Vec<KeyValueEntry>,

    #[serde(default)]
    pub body: Option<RequestBody>,

    #[serde(default)]
    pub auth_type: Option<AuthType>,

    #[serde(default)]
    pub auth_config: Option<serde_json::Value>,

    #[serde(default)]
    pub scripts: Vec<Script>,

    pub created_at: DateTime<Utc>,
}

impl RequestDefinition {
    /// Source of the script of the given type, if attached
    pub fn script(&self, script_type: ScriptType) -> Option<&str> {
        self.scripts
            .iter()
            .find(|s| s.script_type == script_type)
            .map(|s| s.source.as_str())
    }
}
