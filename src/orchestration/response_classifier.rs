//! # Response Classification
//!
//! Maps the outcome of one network call to what the queue should do with the task.
//!
//! | Outcome | Category |
//! |---|---|
//! | transport error | `Retry`, default backoff |
//! | 2xx, empty or JSON object body | `Success` |
//! | 2xx, body that is not a JSON object | `NoRetry` |
//! | 401 / 403 | `AuthFailure` (the processor consults the auth manager) |
//! | 429, 5xx | `Retry`, honouring `Retry-After` |
//! | other 4xx, anything else | `NoRetry` |

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

use crate::constants::{headers, keys};
use crate::error::{QueueError, Result};
use crate::models::{SendRequestError, SendRequestValue};
use crate::network::HttpResponse;

/// Classification of a single response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseCategory {
    Success(SendRequestValue),
    NoRetry(SendRequestError),
    Retry {
        retry_after: Option<Duration>,
        detail: SendRequestError,
    },
    AuthFailure {
        status: u16,
        detail: SendRequestError,
    },
}

impl ResponseCategory {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResponseCategory::Retry { .. })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseClassifier;

impl ResponseClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify the result of [`NetworkSession::send`](crate::network::NetworkSession::send)
    pub fn classify(&self, outcome: &Result<HttpResponse>) -> ResponseCategory {
        match outcome {
            Ok(response) => self.classify_response(response),
            Err(error) => self.classify_error(error),
        }
    }

    pub fn classify_error(&self, error: &QueueError) -> ResponseCategory {
        let detail = SendRequestError::from(error);
        if error.is_transport() {
            ResponseCategory::Retry {
                retry_after: None,
                detail,
            }
        } else {
            ResponseCategory::NoRetry(detail)
        }
    }

    pub fn classify_response(&self, response: &HttpResponse) -> ResponseCategory {
        let status = response.status;
        match status {
            200..=299 => match parse_success_body(&response.body) {
                Some(value) => ResponseCategory::Success(value),
                None => ResponseCategory::NoRetry(failure_detail(response, "could not parse json")),
            },
            401 | 403 => ResponseCategory::AuthFailure {
                status,
                detail: failure_detail(response, "Unauthorized"),
            },
            429 => ResponseCategory::Retry {
                retry_after: parse_retry_after(response, Utc::now()),
                detail: failure_detail(response, "Rate limited"),
            },
            400..=499 => ResponseCategory::NoRetry(failure_detail(response, "Invalid Request")),
            500..=599 => ResponseCategory::Retry {
                retry_after: parse_retry_after(response, Utc::now()),
                detail: failure_detail(response, "Internal Server Error"),
            },
            _ => ResponseCategory::NoRetry(failure_detail(response, "Unexpected response status")),
        }
    }
}

/// Empty bodies count as `{}`; anything but a JSON object is rejected
fn parse_success_body(body: &[u8]) -> Option<SendRequestValue> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Some(Value::Object(Default::default()));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn failure_detail(response: &HttpResponse, fallback: &str) -> SendRequestError {
    let reason = serde_json::from_slice::<Value>(&response.body)
        .ok()
        .and_then(|value| {
            value
                .get(keys::MESSAGE)
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| fallback.to_string());

    let error = QueueError::ServerError {
        status: response.status,
        message: reason,
    };
    SendRequestError::from(&error).with_data(response.body.clone())
}

/// `Retry-After` as delta-seconds or an HTTP date relative to `now`
pub fn parse_retry_after(response: &HttpResponse, now: DateTime<Utc>) -> Option<Duration> {
    let raw = response.header(headers::RETRY_AFTER)?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
