//! Rate-limited tool executor.
//!
//! Enforces the per-query invocation cap, bounds each call with a wall-clock
//! timeout, records latency on the [`ToolCall`], and converts every failure
//! into a short observation so the reasoning loop keeps going.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::state::ToolCall;

use super::ToolRegistry;

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    max_calls_per_query: u32,
    tool_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, max_calls_per_query: u32, tool_timeout: Duration) -> Self {
        Self {
            registry,
            max_calls_per_query,
            tool_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Executes one tool call and returns the observation. The shared
    /// `counter` is the per-query invocation count.
    pub async fn execute(&self, call: &mut ToolCall, counter: &AtomicU32) -> String {
        let used = counter.fetch_add(1, Ordering::SeqCst);
        if used >= self.max_calls_per_query {
            counter.fetch_sub(1, Ordering::SeqCst);
            warn!(tool = %call.tool_name, limit = self.max_calls_per_query, "tool limit reached");
            let obs = format!(
                "Tool limit reached ({} calls per query). Answer with the information gathered so far.",
                self.max_calls_per_query
            );
            call.result = Some(obs.clone());
            return obs;
        }

        let Some(tool) = self.registry.get(&call.tool_name) else {
            let obs = format!("Unknown tool: {}.", call.tool_name);
            call.result = Some(obs.clone());
            return obs;
        };

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.tool_timeout, tool.call(call.arguments.clone())).await;
        call.execution_time = started.elapsed().as_secs_f64();

        let observation = match outcome {
            Ok(Ok(result)) => {
                info!(
                    tool = %call.tool_name,
                    elapsed_s = call.execution_time,
                    "tool executed"
                );
                result
            }
            Ok(Err(e)) => {
                warn!(tool = %call.tool_name, error = %e, "tool failed");
                format!("Tool error: {e}")
            }
            Err(_) => {
                warn!(tool = %call.tool_name, timeout_s = self.tool_timeout.as_secs(), "tool timed out");
                format!(
                    "Tool error: {} timed out after {}s",
                    call.tool_name,
                    self.tool_timeout.as_secs()
                )
            }
        };

        call.result = Some(observation.clone());
        observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::StaticTool;
    use crate::tools::{Tool, ToolSourceError, ToolSpec};
    use async_trait::async_trait;
    use serde_json::json;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "slow".into(),
                description: None,
                input_schema: json!({}),
            }
        }

        async fn call(&self, _args: serde_json::Value) -> Result<String, ToolSourceError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("never".into())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "failing".into(),
                description: None,
                input_schema: json!({}),
            }
        }

        async fn call(&self, _args: serde_json::Value) -> Result<String, ToolSourceError> {
            Err(ToolSourceError::Execution("store offline".into()))
        }
    }

    fn executor(tools: Vec<Arc<dyn Tool>>, max_calls: u32) -> ToolExecutor {
        ToolExecutor::new(
            Arc::new(ToolRegistry::new(tools)),
            max_calls,
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn executes_and_records_latency() {
        let exec = executor(
            vec![Arc::new(StaticTool {
                name: "echo".into(),
                output: "hello".into(),
            })],
            10,
        );
        let counter = AtomicU32::new(0);
        let mut call = ToolCall::new("echo", json!({}));
        let obs = exec.execute(&mut call, &counter).await;
        assert_eq!(obs, "hello");
        assert_eq!(call.result.as_deref(), Some("hello"));
        assert!(call.execution_time >= 0.0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cap_produces_synthetic_observation() {
        let exec = executor(
            vec![Arc::new(StaticTool {
                name: "echo".into(),
                output: "hello".into(),
            })],
            2,
        );
        let counter = AtomicU32::new(0);
        for _ in 0..2 {
            let mut call = ToolCall::new("echo", json!({}));
            exec.execute(&mut call, &counter).await;
        }
        let mut call = ToolCall::new("echo", json!({}));
        let obs = exec.execute(&mut call, &counter).await;
        assert!(obs.contains("Tool limit reached"));
        // Counter never exceeds the cap.
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_observation() {
        let exec = executor(vec![], 10);
        let counter = AtomicU32::new(0);
        let mut call = ToolCall::new("nope", json!({}));
        let obs = exec.execute(&mut call, &counter).await;
        assert_eq!(obs, "Unknown tool: nope.");
    }

    #[tokio::test]
    async fn tool_error_becomes_short_observation() {
        let exec = executor(vec![Arc::new(FailingTool)], 10);
        let counter = AtomicU32::new(0);
        let mut call = ToolCall::new("failing", json!({}));
        let obs = exec.execute(&mut call, &counter).await;
        assert!(obs.starts_with("Tool error:"));
        assert!(obs.contains("store offline"));
    }

    #[tokio::test]
    async fn timeout_becomes_observation() {
        let exec = executor(vec![Arc::new(SlowTool)], 10);
        let counter = AtomicU32::new(0);
        let mut call = ToolCall::new("slow", json!({}));
        let obs = exec.execute(&mut call, &counter).await;
        assert!(obs.contains("timed out"));
    }
}
