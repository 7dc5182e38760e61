//! Turns a stored [`ApiCallRequest`] envelope into an [`HttpRequest`].

use reqwest::Url;
use std::collections::BTreeMap;

use crate::constants::headers;
use crate::error::{QueueError, Result};
use crate::models::{ApiCallRequest, IterableRequest};
use crate::network::network_session::{HttpMethod, HttpRequest};

/// Builds the wire request for an envelope.
///
/// `processor` is the value of the `SDK-Request-Processor` header. `auth_token`, when set,
/// takes precedence over the token stored in the envelope.
pub fn build_http_request(
    envelope: &ApiCallRequest,
    processor: &str,
    sdk_version: &str,
    auth_token: Option<&str>,
) -> Result<HttpRequest> {
    let url = build_url(&envelope.end_point, envelope.iterable_request.path(), envelope.iterable_request.args())?;

    let mut header_map = BTreeMap::new();
    header_map.insert(
        headers::CONTENT_TYPE.to_string(),
        headers::APPLICATION_JSON.to_string(),
    );
    header_map.insert(headers::API_KEY.to_string(), envelope.api_key.clone());
    header_map.insert(
        headers::SDK_PLATFORM.to_string(),
        envelope.device_metadata.platform.clone(),
    );
    header_map.insert(headers::SDK_VERSION.to_string(), sdk_version.to_string());
    header_map.insert(
        headers::SDK_REQUEST_PROCESSOR.to_string(),
        processor.to_string(),
    );
    if let Some(token) = auth_token.or(envelope.auth.auth_token.as_deref()) {
        header_map.insert(headers::AUTHORIZATION.to_string(), format!("Bearer {token}"));
    }

    let (method, body) = match &envelope.iterable_request {
        IterableRequest::Get(_) => (HttpMethod::Get, None),
        IterableRequest::Post(post) => {
            let body = match &post.body {
                Some(body) => serde_json::to_vec(body)?,
                None => b"{}".to_vec(),
            };
            (HttpMethod::Post, Some(body))
        }
    };

    Ok(HttpRequest {
        method,
        url,
        headers: header_map,
        body,
    })
}

fn build_url(
    end_point: &str,
    path: &str,
    args: Option<&BTreeMap<String, String>>,
) -> Result<Url> {
    let raw = format!("{end_point}{path}");
    let url = match args {
        Some(args) if !args.is_empty() => Url::parse_with_params(&raw, args.iter()),
        _ => Url::parse(&raw),
    };
    url.map_err(|e| QueueError::request_creation(format!("invalid url '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Auth, DeviceMetadata, RequestArgs, RequestBody};
    use serde_json::{json, Value};

    fn envelope(request: IterableRequest, auth: Auth) -> ApiCallRequest {
        ApiCallRequest {
            api_key: "test-api-key".to_string(),
            end_point: "https://api.iterable.com/api/".to_string(),
            auth,
            device_metadata: DeviceMetadata {
                device_id: "d".to_string(),
                platform: "iOS".to_string(),
                app_package_name: "com.example.app".to_string(),
            },
            iterable_request: request,
        }
    }

    #[test]
    fn test_post_request() {
        let mut body = RequestBody::new();
        body.insert("eventName".to_string(), json!("CustomEvent1"));
        let envelope = envelope(
            IterableRequest::post("events/track", Some(body)),
            Auth::with_email("user@example.com").with_auth_token("stored-token"),
        );

        let request = build_http_request(&envelope, "Offline", "6.5.0", None).unwrap();

        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url.as_str(), "https://api.iterable.com/api/events/track");
        assert_eq!(request.header("api-key"), Some("test-api-key"));
        assert_eq!(request.header("Authorization"), Some("Bearer stored-token"));
        assert_eq!(request.header("SDK-Request-Processor"), Some("Offline"));
        assert_eq!(request.header("SDK-Version"), Some("6.5.0"));
        assert_eq!(request.header("SDK-Platform"), Some("iOS"));

        let sent: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({"eventName": "CustomEvent1"}));
    }

    #[test]
    fn test_get_request_with_sorted_encoded_args() {
        let mut args = RequestArgs::new();
        args.insert("email".to_string(), "user+1@example.com".to_string());
        args.insert("count".to_string(), "10".to_string());
        let envelope = envelope(
            IterableRequest::get("inApp/getMessages", Some(args)),
            Auth::with_email("user+1@example.com"),
        );

        let request = build_http_request(&envelope, "Online", "6.5.0", Some("fresh")).unwrap();

        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(
            request.url.as_str(),
            "https://api.iterable.com/api/inApp/getMessages?count=10&email=user%2B1%40example.com"
        );
        assert_eq!(request.body, None);
        assert_eq!(request.header("authorization"), Some("Bearer fresh"));
    }

    #[test]
    fn test_missing_body_sends_empty_object_and_no_token() {
        let envelope = envelope(
            IterableRequest::post("users/update", None),
            Auth::with_user_id("u-1"),
        );

        let request = build_http_request(&envelope, "Offline", "6.5.0", None).unwrap();
        assert_eq!(request.body.as_deref(), Some(&b"{}"[..]));
        assert_eq!(request.header("authorization"), None);
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut envelope = envelope(IterableRequest::get("x", None), Auth::with_user_id("u"));
        envelope.end_point = "not a url".to_string();

        assert!(matches!(
            build_http_request(&envelope, "Offline", "1", None),
            Err(QueueError::RequestCreationError(_))
        ));
    }
}
