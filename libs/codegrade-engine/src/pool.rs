// Bounded entry point: every evaluation waits for a permit before compiling
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::Engine;
use codegrade_common::types::{Evaluation, TestCase};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Clone)]
pub struct GradingPool {
    engine: Arc<Engine>,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl GradingPool {
    pub fn new(engine: Arc<Engine>, max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            engine,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(Engine::from_config(config)),
            config.max_concurrent_evaluations,
        )
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn evaluate(&self, source: &str, test_spec: Option<&str>) -> Result<Evaluation, EngineError> {
        let _permit = self.acquire().await?;
        self.engine.evaluate(source, test_spec).await
    }

    pub async fn evaluate_cases(&self, source: &str, cases: Vec<TestCase>) -> Result<Evaluation, EngineError> {
        let _permit = self.acquire().await?;
        self.engine.evaluate_cases(source, cases).await
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, EngineError> {
        if self.permits.available_permits() == 0 {
            debug!(capacity = self.capacity, "Grading pool saturated, waiting for a permit");
        }
        self.permits
            .acquire()
            .await
            .map_err(|_| EngineError::Internal("grading pool is closed".to_string()))
    }
}
