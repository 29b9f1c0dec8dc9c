//! Deferred execution of action work.
//!
//! Three primitives cover every timing discipline the dispatcher needs:
//! run after a delay, run now, and run once a pending response completes.
//! Each takes a `synchronous` flag; when set, the caller's task sleeps and
//! runs the work inline so the response is written before the call returns.
//! When clear, the work is handed to the runtime and the caller continues
//! immediately. Workers are tokio tasks, so every submission is accepted.

use crate::error::Result;
use crate::message::HttpResponse;
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;

/// Handle to an HTTP response that completes later.
///
/// Completes with `Ok(None)` when the origin produced an empty response,
/// or fails with one of the transport errors in [`crate::Error`].
pub type PendingResponse = BoxFuture<'static, Result<Option<HttpResponse>>>;

/// Executes units of work now, after a delay, or upon completion of a
/// pending response
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

impl Scheduler {
    /// Create a scheduler
    pub fn new() -> Self {
        Self
    }

    /// Sleep for `delay`, then run `task`
    pub async fn schedule<F>(&self, delay: Duration, synchronous: bool, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if synchronous {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        } else {
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                task.await;
            });
        }
    }

    /// Run `task` now
    pub async fn submit<F>(&self, synchronous: bool, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if synchronous {
            task.await;
        } else {
            tokio::spawn(task);
        }
    }

    /// Run `task` with the outcome of `pending` once it completes.
    ///
    /// With `synchronous` set the caller blocks until the pending response
    /// resolves; otherwise the continuation runs on a worker.
    pub async fn submit_on_complete<F, Fut>(
        &self,
        pending: PendingResponse,
        synchronous: bool,
        task: F,
    ) where
        F: FnOnce(Result<Option<HttpResponse>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if synchronous {
            task(pending.await).await;
        } else {
            tokio::spawn(async move {
                task(pending.await).await;
            });
        }
    }
}
