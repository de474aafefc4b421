use std::future::Future;

use anyhow::Result;
use async_trait::async_trait;

use crate::stats::raw::RawSnapshot;

pub mod json_file;

pub use json_file::JsonFileProvider;

/// Source of raw statistics reports, polled once per collection cycle.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(&self) -> Result<RawSnapshot>;
}

/// Adapts any async closure into a [`SnapshotProvider`].
pub struct ProviderFn<F>(pub F);

#[async_trait]
impl<F, Fut> SnapshotProvider for ProviderFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<RawSnapshot>> + Send,
{
    async fn snapshot(&self) -> Result<RawSnapshot> {
        (self.0)().await
    }
}
