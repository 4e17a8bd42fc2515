//! The asynchronous consumer of batches.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::batch::Batch;

/// Consumer of batches, invoked at most once at a time.
///
/// The returned future is the in-flight invocation; the sink hands out the
/// next batch only after it resolves. An `Err` is treated according to the
/// sink's [`FailurePolicy`](crate::sink::FailurePolicy).
///
/// Any `FnMut(Batch<T>) -> impl Future<Output = anyhow::Result<()>>` closure
/// is a handler.
pub trait BatchHandler<T>: Send + 'static {
    fn handle(&mut self, batch: Batch<T>) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<T, F, Fut> BatchHandler<T> for F
where
    F: FnMut(Batch<T>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handle(&mut self, batch: Batch<T>) -> BoxFuture<'static, anyhow::Result<()>> {
        self(batch).boxed()
    }
}
