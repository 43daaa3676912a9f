use kameo::Actor;
use kameo::message::{Context, Message};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::reply::{Reply, ReplyError};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::messaging::DeadLetterSink;

// ============================================================================
// Dead Letter Actor
// ============================================================================
//
// Holds consumed messages whose handling failed, for inspection.
// Parking is the end of the road: offsets are committed and nothing is
// redelivered automatically. The store is bounded; the oldest entries are
// evicted first.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub id: Uuid,
    pub topic: String,
    pub key: Option<String>,
    pub payload: String,
    pub reason: &'static str,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct ParkDeadLetter(pub DeadLetter);

#[derive(Debug)]
pub struct GetDeadLetters {
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct DeadLetterReport {
    pub total_parked: u64,
    pub by_topic: BTreeMap<String, u64>,
    /// Most recent first
    pub recent: Vec<DeadLetter>,
}

impl Reply for DeadLetterReport {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Actor
// ============================================================================

pub struct DeadLetterActor {
    letters: VecDeque<DeadLetter>,
    capacity: usize,
    total_parked: u64,
    by_topic: BTreeMap<String, u64>,
    metrics: Option<Arc<Metrics>>,
}

impl DeadLetterActor {
    pub fn new(capacity: usize) -> Self {
        Self {
            letters: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            total_parked: 0,
            by_topic: BTreeMap::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl Actor for DeadLetterActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(capacity = state.capacity, "DeadLetterActor started");
        Ok(state)
    }
}

impl Message<ParkDeadLetter> for DeadLetterActor {
    type Reply = ();

    async fn handle(&mut self, msg: ParkDeadLetter, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let letter = msg.0;

        tracing::error!(
            dead_letter_id = %letter.id,
            topic = %letter.topic,
            key = ?letter.key,
            reason = letter.reason,
            error = %letter.error_message,
            "💀 Message parked as dead letter"
        );

        if let Some(ref metrics) = self.metrics {
            metrics.record_dead_letter(&letter.topic);
        }

        self.total_parked += 1;
        *self.by_topic.entry(letter.topic.clone()).or_default() += 1;

        if self.letters.len() == self.capacity {
            self.letters.pop_front();
        }
        self.letters.push_back(letter);
    }
}

impl Message<GetDeadLetters> for DeadLetterActor {
    type Reply = DeadLetterReport;

    async fn handle(&mut self, msg: GetDeadLetters, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        DeadLetterReport {
            total_parked: self.total_parked,
            by_topic: self.by_topic.clone(),
            recent: self.letters.iter().rev().take(msg.limit).cloned().collect(),
        }
    }
}

#[async_trait]
impl DeadLetterSink for ActorRef<DeadLetterActor> {
    async fn park(&self, letter: DeadLetter) {
        if let Err(e) = self.tell(ParkDeadLetter(letter)).send().await {
            tracing::error!(error = %e, "Failed to reach DeadLetterActor");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kameo::prelude::*;

    fn letter(topic: &str) -> DeadLetter {
        DeadLetter {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            key: None,
            payload: "{}".to_string(),
            reason: "decode",
            error_message: "missing field".to_string(),
            failed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_bounded_store_keeps_latest() {
        let actor = DeadLetterActor::spawn(DeadLetterActor::new(2));

        for topic in ["a", "b", "c"] {
            actor.park(letter(topic)).await;
        }

        let report = actor.ask(GetDeadLetters { limit: 10 }).await.unwrap();
        assert_eq!(report.total_parked, 3);
        assert_eq!(report.recent.len(), 2);
        assert_eq!(report.recent[0].topic, "c");
        assert_eq!(report.recent[1].topic, "b");
        assert_eq!(report.by_topic.get("a"), Some(&1));
    }
}
