//! Request routing and JSON responses for the messaging layer.
//!
//! Handling is synchronous and transport-free; the service loop hands over
//! the subject and payload and publishes whatever comes back.

use crate::config::NatsConfig;
use crate::demo::{simulate_payment, DemoTrigger};
use crate::error::{PipelineError, Result, SchemaError};
use crate::features::LABEL_COLUMN;
use crate::metrics::ScoringMetrics;
use crate::scoring::ScoringService;
use crate::types::verdict::ScoringResult;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Operation selected by a request subject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Score,
    Batch,
    Payment,
    Health,
    Metrics,
    Sample,
}

/// Body of a simulated payment request
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub amount: f64,
}

/// Handler output
#[derive(Debug, Clone)]
pub struct Response {
    pub body: Value,
    /// Single-transaction result to fan out on the result subject
    pub scored: Option<ScoringResult>,
}

impl Response {
    fn body(body: Value) -> Self {
        Self { body, scored: None }
    }

    fn error(err: &PipelineError) -> Self {
        Self::body(json!({
            "error": err.kind(),
            "detail": err.to_string(),
        }))
    }

    pub fn is_error(&self) -> bool {
        self.body.get("error").is_some()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.body).unwrap_or_default()
    }
}

pub struct RequestHandler {
    service: Arc<ScoringService>,
    metrics: Arc<ScoringMetrics>,
    demo: DemoTrigger,
    routes: HashMap<String, Route>,
}

impl RequestHandler {
    pub fn new(
        service: Arc<ScoringService>,
        metrics: Arc<ScoringMetrics>,
        demo: DemoTrigger,
        nats: &NatsConfig,
    ) -> Self {
        let routes = [
            (&nats.score_subject, Route::Score),
            (&nats.batch_subject, Route::Batch),
            (&nats.payment_subject, Route::Payment),
            (&nats.health_subject, Route::Health),
            (&nats.metrics_subject, Route::Metrics),
            (&nats.sample_subject, Route::Sample),
        ]
        .into_iter()
        .map(|(subject, route)| (subject.clone(), route))
        .collect();

        Self {
            service,
            metrics,
            demo,
            routes,
        }
    }

    pub fn route(&self, subject: &str) -> Option<Route> {
        self.routes.get(subject).copied()
    }

    /// Handle one request; failures become `{error, detail}` bodies
    pub fn handle(&self, route: Route, payload: &[u8]) -> Response {
        let started = Instant::now();
        let response = match self.dispatch(route, payload) {
            Ok(response) => response,
            Err(e) => {
                self.metrics.record_error(e.kind());
                if e.is_recoverable() {
                    warn!(route = ?route, kind = e.kind(), error = %e, "Request rejected");
                } else {
                    error!(route = ?route, kind = e.kind(), error = %e, "Request failed");
                }
                Response::error(&e)
            }
        };
        self.metrics.record_request(started.elapsed());
        response
    }

    fn dispatch(&self, route: Route, payload: &[u8]) -> Result<Response> {
        match route {
            Route::Score => {
                let value: Value = serde_json::from_slice(payload)?;
                let result = self.service.score_json(&value)?;
                Ok(self.scored(result))
            }
            Route::Batch => {
                // Anything that is not JSON at all is read as CSV
                let summary = match serde_json::from_slice::<Value>(payload) {
                    Ok(Value::Array(rows)) => self.service.score_batch_json(&rows)?,
                    Ok(_) => return Err(SchemaError::NotAnArray.into()),
                    Err(_) => self.service.score_batch_csv(payload)?,
                };
                self.metrics
                    .record_batch(summary.total_transactions, summary.fraud_count);
                Ok(Response::body(serde_json::to_value(&summary)?))
            }
            Route::Payment => {
                let request: PaymentRequest = serde_json::from_slice(payload)?;
                let result = simulate_payment(
                    &self.service,
                    &self.demo,
                    request.amount,
                    &mut rand::thread_rng(),
                )?;
                Ok(self.scored(result))
            }
            Route::Health => Ok(Response::body(serde_json::to_value(self.service.health())?)),
            Route::Metrics => {
                let report = self.service.metrics_report()?;
                Ok(Response::body(serde_json::to_value(&report)?))
            }
            Route::Sample => {
                let example = self.service.random_sample()?;
                let mut body = serde_json::to_value(example.features)?;
                if let Some(fields) = body.as_object_mut() {
                    fields.insert(LABEL_COLUMN.to_string(), json!(example.label.as_u8()));
                }
                Ok(Response::body(body))
            }
        }
    }

    fn scored(&self, result: ScoringResult) -> Response {
        self.metrics.record_score(result.probability, result.is_flagged());
        if result.is_flagged() {
            info!(
                score_id = %result.score_id,
                probability = result.probability,
                processing_time_ms = result.processing_time_ms,
                "Transaction flagged"
            );
        } else {
            debug!(
                score_id = %result.score_id,
                probability = result.probability,
                "Transaction approved"
            );
        }

        let body = serde_json::to_value(&result).unwrap_or(Value::Null);
        Response {
            body,
            scored: Some(result),
        }
    }
}
