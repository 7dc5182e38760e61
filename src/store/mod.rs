//! # Task Store
//!
//! Durable, transactional storage for queued tasks, backed by SQLite through `sqlx`.
//!
//! Reads go straight to the pool and may run concurrently. Every mutation happens inside
//! a [`StoreContext`], which wraps a transaction: nothing is durable until
//! [`StoreContext::save`] is called, and a context dropped without saving rolls back.
//!
//! ```rust,no_run
//! use offline_queue::models::{Task, TaskType};
//! use offline_queue::store::TaskStore;
//!
//! # async fn example() -> offline_queue::Result<()> {
//! let store = TaskStore::in_memory().await?;
//!
//! let mut context = store.context().await?;
//! context.create(&Task::new(TaskType::ApiCall, b"{}".to_vec(), Task::now())).await?;
//! context.save().await?;
//!
//! assert_eq!(store.count().await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod schema;
pub mod task_store;

pub use task_store::{StoreContext, TaskStore};
