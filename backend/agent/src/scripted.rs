use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::StreamExt;
use conductor_core::{AgentMessage, MessageStream, QueryRequest, QueryRunner};

/// A query runner that replays a fixed message script.
///
/// Stands in for the external LLM in tests and dry runs. Every request it
/// receives is recorded for inspection.
#[derive(Clone)]
pub struct ScriptedRunner {
    name: String,
    script: Vec<AgentMessage>,
    delay: Option<Duration>,
    start_error: Option<String>,
    requests: Arc<Mutex<Vec<QueryRequest>>>,
}

impl ScriptedRunner {
    pub fn new(script: Vec<AgentMessage>) -> Self {
        Self {
            name: "scripted".to_string(),
            script,
            delay: None,
            start_error: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer every prompt with one assistant turn and a successful result.
    pub fn with_response(response: impl Into<String>) -> Self {
        let response = response.into();
        Self::new(vec![
            AgentMessage::assistant(response.clone()),
            AgentMessage::result(response),
        ])
    }

    /// Sleep before yielding each message.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail `query` itself, as a runner that cannot start would.
    pub fn failing_start(mut self, error: impl Into<String>) -> Self {
        self.start_error = Some(error.into());
        self
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl QueryRunner for ScriptedRunner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, request: QueryRequest) -> Result<MessageStream> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        if let Some(err) = &self.start_error {
            return Err(anyhow!("{err}"));
        }

        let delay = self.delay;
        let stream = futures::stream::iter(self.script.clone()).then(move |msg| async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            Ok(msg)
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_and_records_requests() {
        let runner = ScriptedRunner::with_response("hello");
        let request = QueryRequest {
            prompt: "hi".into(),
            ..Default::default()
        };
        let messages: Vec<_> = runner
            .query(request)
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].as_ref().unwrap(), &AgentMessage::assistant("hello"));
        assert_eq!(runner.requests()[0].prompt, "hi");
    }

    #[tokio::test]
    async fn failing_start_errors() {
        let runner = ScriptedRunner::new(vec![]).failing_start("no binary");
        let err = runner.query(QueryRequest::default()).await.err().unwrap();
        assert!(err.to_string().contains("no binary"));
    }
}
