//! Mock classification service for testing.
//!
//! Answers from substring rules registered up front. Unmatched text gets the
//! conservative answer (not technical, no label). Calls are recorded.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{Classification, ClassificationService, ClassificationTask, ServiceError};

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    technical_topic: Option<String>,
    subject_topic: Option<String>,
}

/// Mock classifier driven by substring rules.
#[derive(Debug, Clone, Default)]
pub struct MockClassificationService {
    rules: Arc<Mutex<Vec<Rule>>>,
    failure: Option<ServiceError>,
    delay: Duration,
    calls: Arc<Mutex<Vec<(String, ClassificationTask)>>>,
}

impl MockClassificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text containing `pattern` (case-insensitive) is a technical question on `topic`.
    pub fn with_technical(self, pattern: &str, topic: &str) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_lowercase(),
            technical_topic: Some(topic.to_string()),
            subject_topic: None,
        });
        self
    }

    /// Text containing `pattern` (case-insensitive) gets the intake topic `label`.
    pub fn with_subject_topic(self, pattern: &str, label: &str) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_lowercase(),
            technical_topic: None,
            subject_topic: Some(label.to_string()),
        });
        self
    }

    /// Every call fails with `error`.
    pub fn failing(mut self, error: ServiceError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Sets simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns the number of calls made, across all tasks.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Returns the number of calls made for `task`.
    pub fn calls_for(&self, task: ClassificationTask) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| *t == task)
            .count()
    }

    fn answer(&self, text: &str, task: ClassificationTask) -> Classification {
        let lower = text.to_lowercase();
        let rules = self.rules.lock().unwrap();
        let matching = || rules.iter().filter(|r| lower.contains(&r.pattern));
        match task {
            ClassificationTask::TechnicalQuestion => {
                Classification::Flag(matching().any(|r| r.technical_topic.is_some()))
            }
            ClassificationTask::TechnicalTopic => {
                Classification::Label(matching().find_map(|r| r.technical_topic.clone()))
            }
            ClassificationTask::SubjectTopic => {
                Classification::Label(matching().find_map(|r| r.subject_topic.clone()))
            }
        }
    }
}

#[async_trait]
impl ClassificationService for MockClassificationService {
    async fn classify(
        &self,
        text: &str,
        task: ClassificationTask,
    ) -> Result<Classification, ServiceError> {
        self.calls.lock().unwrap().push((text.to_string(), task));

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(self.answer(text, task))
    }
}
