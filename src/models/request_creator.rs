//! Builds the [`IterableRequest`] for each public SDK call.
//!
//! Only the handful of calls the request processors expose are covered here; the
//! envelope format is what matters to the queue, not the individual payload fields.

use chrono::Utc;
use serde_json::{json, Value};

use crate::constants::{keys, paths};
use crate::error::{QueueError, Result};
use crate::models::api_call_request::{Auth, DeviceMetadata, IterableRequest, RequestArgs, RequestBody};

pub struct RequestCreator {
    auth: Auth,
    device_metadata: DeviceMetadata,
    sdk_version: String,
}

impl RequestCreator {
    pub fn new(auth: Auth, device_metadata: DeviceMetadata, sdk_version: impl Into<String>) -> Self {
        Self {
            auth,
            device_metadata,
            sdk_version: sdk_version.into(),
        }
    }

    pub fn create_track_event_request(
        &self,
        event_name: &str,
        data_fields: Option<RequestBody>,
    ) -> Result<IterableRequest> {
        let mut body = self.user_identity(keys::EMAIL, keys::USER_ID)?;
        body.insert(keys::EVENT_NAME.to_string(), json!(event_name));
        body.insert(keys::CREATED_AT.to_string(), json!(Utc::now().timestamp()));
        if let Some(fields) = data_fields {
            body.insert(keys::DATA_FIELDS.to_string(), Value::Object(fields));
        }

        Ok(IterableRequest::post(paths::TRACK_EVENT, Some(body)))
    }

    pub fn create_update_user_request(
        &self,
        data_fields: RequestBody,
        merge_nested_objects: bool,
    ) -> Result<IterableRequest> {
        let mut body = self.user_identity(keys::EMAIL, keys::USER_ID)?;
        body.insert(keys::DATA_FIELDS.to_string(), Value::Object(data_fields));
        body.insert(
            keys::MERGE_NESTED_OBJECTS.to_string(),
            json!(merge_nested_objects),
        );

        Ok(IterableRequest::post(paths::UPDATE_USER, Some(body)))
    }

    pub fn create_update_email_request(&self, new_email: &str) -> Result<IterableRequest> {
        let mut body = self.user_identity(keys::CURRENT_EMAIL, keys::CURRENT_USER_ID)?;
        body.insert(keys::NEW_EMAIL.to_string(), json!(new_email));

        Ok(IterableRequest::post(paths::UPDATE_EMAIL, Some(body)))
    }

    pub fn create_get_in_app_messages_request(&self, count: u32) -> Result<IterableRequest> {
        let mut args = RequestArgs::new();
        for (key, value) in self.user_identity(keys::EMAIL, keys::USER_ID)? {
            if let Value::String(value) = value {
                args.insert(key, value);
            }
        }
        args.insert(keys::COUNT.to_string(), count.to_string());
        args.insert(
            keys::PLATFORM.to_string(),
            self.device_metadata.platform.clone(),
        );
        args.insert(keys::SDK_VERSION.to_string(), self.sdk_version.clone());
        args.insert(
            keys::PACKAGE_NAME.to_string(),
            self.device_metadata.app_package_name.clone(),
        );

        Ok(IterableRequest::get(paths::GET_IN_APP_MESSAGES, Some(args)))
    }

    /// Email wins over user id; a request with neither cannot be attributed
    fn user_identity(&self, email_key: &str, user_id_key: &str) -> Result<RequestBody> {
        let mut body = RequestBody::new();
        match (&self.auth.email, &self.auth.user_id) {
            (Some(email), _) => {
                body.insert(email_key.to_string(), json!(email));
            }
            (None, Some(user_id)) => {
                body.insert(user_id_key.to_string(), json!(user_id));
            }
            (None, None) => {
                return Err(QueueError::request_creation(
                    "Both email and userId are nil",
                ))
            }
        }
        Ok(body)
    }
}
