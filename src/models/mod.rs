//! # Data Models
//!
//! - [`task`] - the persisted task record
//! - [`api_call_request`] - the API call envelope stored in a task's payload
//! - [`task_result`] - attempt results and completion outcomes
//! - [`request_creator`] - builders for the requests the SDK issues

pub mod api_call_request;
pub mod request_creator;
pub mod task;
pub mod task_result;

pub use api_call_request::{
    ApiCallRequest, Auth, DeviceMetadata, GetRequest, IterableRequest, PostRequest, RequestArgs,
    RequestBody,
};
pub use request_creator::RequestCreator;
pub use task::{Task, TaskType};
pub use task_result::{SendRequestError, SendRequestValue, TaskOutcome, TaskResult};
