//! Test Helpers
//!
//! Mock collaborators and fixtures shared by unit and integration tests.

pub mod mock_network_session;

pub use mock_network_session::{MockBehavior, MockNetworkSession};

use serde_json::json;

use crate::constants::DEFAULT_API_ENDPOINT;
use crate::models::{ApiCallRequest, Auth, DeviceMetadata, IterableRequest, RequestBody};

pub fn sample_device() -> DeviceMetadata {
    DeviceMetadata {
        device_id: "5B8E5E6E-7F4C-4D4A-9F2B-2C1D0E3A4B5C".to_string(),
        platform: "iOS".to_string(),
        app_package_name: "com.example.offline-queue".to_string(),
    }
}

/// `events/track` body with two data fields
pub fn sample_track_event_body() -> RequestBody {
    let mut body = RequestBody::new();
    body.insert("email".to_string(), json!("user@example.com"));
    body.insert("eventName".to_string(), json!("CustomEvent1"));
    body.insert(
        "dataFields".to_string(),
        json!({"var1": "val1", "var2": "val2"}),
    );
    body
}

/// Track-event envelope for `user@example.com`
pub fn sample_envelope() -> ApiCallRequest {
    ApiCallRequest {
        api_key: "zee-api-key".to_string(),
        end_point: DEFAULT_API_ENDPOINT.to_string(),
        auth: Auth::with_email("user@example.com"),
        device_metadata: sample_device(),
        iterable_request: IterableRequest::post("events/track", Some(sample_track_event_body())),
    }
}
