use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::call::ToolCall;
use crate::error::ToolError;

/// Performs the actual work of a tool once the gateway has authorized it.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> Result<serde_json::Value, ToolError>;
}

/// Future returned by closures wrapped in [`FnHandler`].
pub type BoxedToolFuture = Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send>>;

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(ToolCall) -> BoxedToolFuture + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(ToolCall) -> BoxedToolFuture + Send + Sync,
{
    async fn execute(&self, call: &ToolCall) -> Result<serde_json::Value, ToolError> {
        (self.f)(call.clone()).await
    }
}
