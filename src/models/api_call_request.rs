//! # API Call Request Envelope
//!
//! The payload persisted inside an `apiCall` task. The JSON shape is shared with stored
//! queues written by earlier SDK releases, so field names and the nested body encoding
//! must not change:
//!
//! ```json
//! {
//!   "apiKey": "...",
//!   "endPoint": "https://api.iterable.com/api/",
//!   "auth": { "userId": null, "email": "user@example.com", "authToken": null },
//!   "deviceMetadata": { "deviceId": "...", "platform": "iOS", "appPackageName": "..." },
//!   "iterableRequest": {
//!     "type": "post",
//!     "value": { "path": "events/track", "args": null, "body": "<base64 of JSON object>" }
//!   }
//! }
//! ```
//!
//! A POST body is JSON-encoded on its own and carried as base64 bytes inside the envelope,
//! so GET and POST variants store the same way regardless of body content.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{QueueError, Result};

/// Query arguments, kept sorted so URLs are deterministic
pub type RequestArgs = BTreeMap<String, String>;

/// Free-form JSON object sent as a POST body
pub type RequestBody = Map<String, Value>;

/// Identity the request is made on behalf of
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auth {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub auth_token: Option<String>,
}

impl Auth {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn with_user_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Whether both identities name the same user
    pub fn same_user(&self, other: &Auth) -> bool {
        match (&self.email, &other.email, &self.user_id, &other.user_id) {
            (Some(a), Some(b), _, _) => a == b,
            (None, None, Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Device the SDK runs on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetadata {
    pub device_id: String,
    pub platform: String,
    pub app_package_name: String,
}

/// GET request: path plus query arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetRequest {
    pub path: String,
    #[serde(default)]
    pub args: Option<RequestArgs>,
}

/// POST request: path, query arguments and a JSON object body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRequest {
    pub path: String,
    #[serde(default)]
    pub args: Option<RequestArgs>,
    #[serde(default, with = "nested_json_body")]
    pub body: Option<RequestBody>,
}

impl PostRequest {
    pub fn adding_body_field(&self, key: impl Into<String>, value: Value) -> PostRequest {
        let mut body = self.body.clone().unwrap_or_default();
        body.insert(key.into(), value);
        PostRequest {
            path: self.path.clone(),
            args: self.args.clone(),
            body: Some(body),
        }
    }
}

/// Request before the endpoint and headers are applied; exactly one variant is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum IterableRequest {
    Get(GetRequest),
    Post(PostRequest),
}

impl IterableRequest {
    pub fn get(path: impl Into<String>, args: Option<RequestArgs>) -> Self {
        IterableRequest::Get(GetRequest {
            path: path.into(),
            args,
        })
    }

    pub fn post(path: impl Into<String>, body: Option<RequestBody>) -> Self {
        IterableRequest::Post(PostRequest {
            path: path.into(),
            args: None,
            body,
        })
    }

    pub fn path(&self) -> &str {
        match self {
            IterableRequest::Get(request) => &request.path,
            IterableRequest::Post(request) => &request.path,
        }
    }

    pub fn args(&self) -> Option<&RequestArgs> {
        match self {
            IterableRequest::Get(request) => request.args.as_ref(),
            IterableRequest::Post(request) => request.args.as_ref(),
        }
    }

    /// Add a body field; GET requests are returned unchanged
    pub fn adding_body_field(&self, key: impl Into<String>, value: Value) -> IterableRequest {
        match self {
            IterableRequest::Post(request) => {
                IterableRequest::Post(request.adding_body_field(key, value))
            }
            get => get.clone(),
        }
    }
}

/// Everything needed to replay an API call after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallRequest {
    pub api_key: String,
    pub end_point: String,
    pub auth: Auth,
    pub device_metadata: DeviceMetadata,
    pub iterable_request: IterableRequest,
}

impl ApiCallRequest {
    /// Encode for storage in a task's `data` column
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            QueueError::request_creation(format!("could not serialize api call request: {e}"))
        })
    }

    /// Decode a task's `data` column
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Body map <-> base64 of its JSON encoding.
///
/// Bytes that decode to valid JSON but not to an object yield `None`, matching how stored
/// queues from earlier releases are read.
mod nested_json_body {
    use super::*;
    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(body: &Option<RequestBody>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match body {
            Some(body) => {
                let bytes = serde_json::to_vec(body).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&BASE64_STANDARD.encode(bytes))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<RequestBody>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(encoded) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };

        let bytes = BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| D::Error::custom(format!("invalid base64 body: {e}")))?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| D::Error::custom(format!("invalid JSON body: {e}")))?;

        match value {
            Value::Object(map) => Ok(Some(map)),
            _ => Ok(None),
        }
    }
}
