//! Shared test helpers for agent tests.

use filvyn_core::error::ProviderError;
use filvyn_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue.
/// Panics if more calls are made than responses provided.
pub struct ScriptedProvider {
    responses: Vec<String>,
    error: Option<ProviderError>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            responses: Vec::new(),
            error: Some(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let call = requests.len();
        requests.push(request);

        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        let content = self.responses.get(call).cloned().unwrap_or_else(|| {
            panic!(
                "ScriptedProvider: no more responses (call #{call}, have {})",
                self.responses.len()
            )
        });
        Ok(ProviderResponse {
            content,
            model: requests[call].model.clone(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }
}

/// Render an `<invoke>` block.
pub fn invoke(name: &str, params: &[(&str, &str)]) -> String {
    let mut out = format!("<invoke name=\"{name}\">\n");
    for (k, v) in params {
        out.push_str(&format!("    <parameter name=\"{k}\">{}</parameter>\n", escape(v)));
    }
    out.push_str("</invoke>\n");
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
