use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::call::ToolCall;
use crate::error::ToolError;
use crate::handler::ToolHandler;

/// Returns the call's parameters and counts invocations.
#[derive(Debug, Default)]
pub struct EchoHandler {
    calls: AtomicUsize,
}

impl EchoHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocations(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHandler for EchoHandler {
    async fn execute(&self, call: &ToolCall) -> Result<serde_json::Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "echo": call.parameters }))
    }
}

/// Sleeps before answering.
#[derive(Debug)]
pub struct SlowHandler {
    delay: Duration,
}

impl SlowHandler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ToolHandler for SlowHandler {
    async fn execute(&self, _call: &ToolCall) -> Result<serde_json::Value, ToolError> {
        tokio::time::sleep(self.delay).await;
        Ok(json!({ "slept_ms": self.delay.as_millis() as u64 }))
    }
}

/// Always fails with a fixed message.
#[derive(Debug)]
pub struct FailingHandler {
    message: String,
}

impl FailingHandler {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for FailingHandler {
    async fn execute(&self, _call: &ToolCall) -> Result<serde_json::Value, ToolError> {
        Err(ToolError::new(self.message.clone()))
    }
}
