//! Mock model client for deterministic testing and offline runs.
//!
//! Responses come from, in order: the scripted queue, the handler, and
//! finally a default. The default answers schema requests with a
//! placeholder object shaped like the schema, and plain requests with a
//! fixed text.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{GenerateRequest, GenerateResponse, ModelClient};
use crate::errors::LlmError;

type Handler = Box<dyn Fn(&GenerateRequest) -> Result<GenerateResponse, LlmError> + Send + Sync>;

pub struct MockModelClient {
    scripted: Mutex<VecDeque<Result<GenerateResponse, LlmError>>>,
    handler: Option<Handler>,
    default_text: String,
    latency: Duration,
    requests: Mutex<Vec<GenerateRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockModelClient {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockModelClient {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            handler: None,
            default_text: "Mock response".to_string(),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Queue a successful text response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_result(Ok(GenerateResponse::from_text(text)))
    }

    /// Queue a failure
    pub fn with_error(self, err: LlmError) -> Self {
        self.with_result(Err(err))
    }

    pub fn with_result(self, result: Result<GenerateResponse, LlmError>) -> Self {
        lock(&self.scripted).push_back(result);
        self
    }

    /// Compute responses from the request once the script is used up
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&GenerateRequest) -> Result<GenerateResponse, LlmError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn with_default_text(mut self, text: impl Into<String>) -> Self {
        self.default_text = text.into();
        self
    }

    /// Simulated latency for every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<GenerateRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Highest number of calls that were in progress at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn respond(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        if let Some(result) = lock(&self.scripted).pop_front() {
            return result;
        }
        if let Some(handler) = &self.handler {
            return handler(request);
        }
        match &request.response_schema {
            Some(schema) => Ok(GenerateResponse::from_text(placeholder(schema).to_string())),
            None => Ok(GenerateResponse::from_text(self.default_text.clone())),
        }
    }
}

/// A value matching a Gemini-style schema (uppercase `type` names)
fn placeholder(schema: &Value) -> Value {
    if let Some(first) = schema
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|values| values.first())
    {
        return first.clone();
    }

    match schema.get("type").and_then(Value::as_str).unwrap_or("STRING") {
        "OBJECT" => {
            let properties = schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| {
                    props
                        .iter()
                        .map(|(name, prop)| (name.clone(), placeholder(prop)))
                        .collect::<Map<_, _>>()
                })
                .unwrap_or_default();
            Value::Object(properties)
        }
        "ARRAY" => match schema.get("items") {
            Some(items) if items.get("type").and_then(Value::as_str) == Some("OBJECT") => {
                Value::Array(Vec::new())
            }
            Some(items) => Value::Array(vec![placeholder(items)]),
            None => Value::Array(Vec::new()),
        },
        "INTEGER" | "NUMBER" => Value::from(0),
        "BOOLEAN" => Value::Bool(false),
        _ => Value::String("Mock value".to_string()),
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let result = self.respond(&request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}
