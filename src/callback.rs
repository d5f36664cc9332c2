//! Completion-callback style on top of the async operations
//!
//! ```no_run
//! # async fn demo(table: std::sync::Arc<docshape::Table>) {
//! let handle = docshape::callback::complete(
//!     async move { table.count(Default::default()).await },
//!     |result| match result {
//!         Ok(count) => println!("{} documents", count),
//!         Err(e) => eprintln!("count failed: {}", e),
//!     },
//! );
//! handle.await.ok();
//! # }
//! ```

use std::future::Future;
use tokio::task::JoinHandle;

use crate::error::DbResult;

/// Spawn `operation` and hand its result to `callback` once it resolves
pub fn complete<T, F, C>(operation: F, callback: C) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Future<Output = DbResult<T>> + Send + 'static,
    C: FnOnce(DbResult<T>) + Send + 'static,
{
    tokio::spawn(async move {
        callback(operation.await);
    })
}
