//! # System Constants
//!
//! Wire-level names shared by the request envelope, the HTTP layer and the task store.

/// Default API endpoint requests are sent to
pub const DEFAULT_API_ENDPOINT: &str = "https://api.iterable.com/api/";

/// Task types persisted in the `task_type` column
pub mod task_types {
    pub const API_CALL: &str = "apiCall";
}

/// Version written into every new task row
pub const TASK_VERSION: i64 = 1;

/// HTTP header names sent with every API call
pub mod headers {
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const API_KEY: &str = "Api-Key";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const SDK_PLATFORM: &str = "SDK-Platform";
    pub const SDK_VERSION: &str = "SDK-Version";
    pub const SDK_REQUEST_PROCESSOR: &str = "SDK-Request-Processor";
    pub const RETRY_AFTER: &str = "retry-after";

    pub const APPLICATION_JSON: &str = "application/json";
    pub const PROCESSOR_OFFLINE: &str = "Offline";
    pub const PROCESSOR_ONLINE: &str = "Online";
}

/// API paths used by the request creator
pub mod paths {
    pub const TRACK_EVENT: &str = "events/track";
    pub const UPDATE_USER: &str = "users/update";
    pub const UPDATE_EMAIL: &str = "users/updateEmail";
    pub const GET_IN_APP_MESSAGES: &str = "inApp/getMessages";
}

/// JSON body and query keys
pub mod keys {
    pub const EMAIL: &str = "email";
    pub const USER_ID: &str = "userId";
    pub const EVENT_NAME: &str = "eventName";
    pub const DATA_FIELDS: &str = "dataFields";
    pub const CREATED_AT: &str = "createdAt";
    pub const MERGE_NESTED_OBJECTS: &str = "mergeNestedObjects";
    pub const CURRENT_EMAIL: &str = "currentEmail";
    pub const CURRENT_USER_ID: &str = "currentUserId";
    pub const NEW_EMAIL: &str = "newEmail";
    pub const COUNT: &str = "count";
    pub const PLATFORM: &str = "platform";
    pub const SDK_VERSION: &str = "SDKVersion";
    pub const PACKAGE_NAME: &str = "packageName";
    pub const MESSAGE: &str = "msg";
}
