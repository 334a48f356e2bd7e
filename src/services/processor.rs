use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::models::batch::ProjectRequest;
use crate::models::verdict::{Verdict, VerdictRecord};
use crate::services::evaluation::EvaluationGateway;

/// Turns a claimed batch payload into its ordered outcome.
#[async_trait]
pub trait Processor: Send + Sync {
    /// One record per input project, in input order.
    async fn process(&self, batch_id: i64, payload: &[ProjectRequest]) -> Vec<VerdictRecord>;
}

/// Evaluates every project of a batch sequentially through the gateway.
///
/// A failing project never aborts the batch; even a panic during one
/// evaluation is contained and recorded as that project's `error` verdict.
pub struct BatchProcessor {
    gateway: Arc<EvaluationGateway>,
}

impl BatchProcessor {
    pub fn new(gateway: Arc<EvaluationGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Processor for BatchProcessor {
    async fn process(&self, batch_id: i64, payload: &[ProjectRequest]) -> Vec<VerdictRecord> {
        let started = Instant::now();
        let mut outcome = Vec::with_capacity(payload.len());

        for (position, project) in payload.iter().enumerate() {
            let record = match AssertUnwindSafe(self.gateway.evaluate(project)).catch_unwind().await {
                Ok(record) => record,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::error!(
                        batch_id,
                        position,
                        project = %project.name,
                        panic = %message,
                        "Evaluation panicked"
                    );
                    VerdictRecord::error(&project.name, format!("Evaluation error: unexpected failure: {message}"))
                }
            };
            outcome.push(record);
        }

        let errors = outcome.iter().filter(|r| r.verdict == Verdict::Error).count();
        let elapsed = started.elapsed();
        metrics::histogram!("batch_processing_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            batch_id,
            projects = outcome.len(),
            errors,
            duration_ms = elapsed.as_millis() as u64,
            "Batch processed"
        );

        outcome
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let from_str: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(from_str.as_ref()), "boom");

        let from_string: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(from_string.as_ref()), "bang");

        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
