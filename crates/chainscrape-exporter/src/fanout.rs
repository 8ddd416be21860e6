//! Per-request fan-out over independent upstream queries.
//!
//! Every `SourceQuery` runs on its own tokio task inside a `JoinSet` and
//! writes exactly one `QueryOutcome` into the slot matching its position.
//! Siblings never cancel each other; a failed, timed-out or panicking task
//! only empties its own slot. Dropping the `run` future (client went away)
//! drops the `JoinSet`, which aborts whatever is still running.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::Instrument;

use chainscrape_core::error::{FailureKind, Result, SourceFailure};
use chainscrape_core::normalize::RawNumber;

use crate::metric_set::GaugeDecl;

/// One value destined for `gauge`, placed by `labels` after the query's
/// base labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub gauge: &'static GaugeDecl,
    pub labels: Vec<String>,
    pub value: RawNumber,
}

impl RawSample {
    pub fn new(gauge: &'static GaugeDecl, labels: Vec<String>, value: RawNumber) -> Self {
        Self {
            gauge,
            labels,
            value,
        }
    }

    /// Sample that needs no labels beyond the query's own.
    pub fn scalar(gauge: &'static GaugeDecl, value: RawNumber) -> Self {
        Self::new(gauge, Vec::new(), value)
    }
}

pub type RawValue = Vec<RawSample>;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Ok(RawValue),
    Failed(SourceFailure),
}

/// A unit of upstream work, executed exactly once.
pub struct SourceQuery {
    pub source: &'static str,
    /// Gauges this query may feed.
    pub gauges: &'static [&'static GaugeDecl],
    /// Label values shared by every sample (request parameters).
    pub labels: Vec<String>,
    fut: BoxFuture<'static, Result<RawValue>>,
}

impl SourceQuery {
    pub fn new<F>(
        source: &'static str,
        gauges: &'static [&'static GaugeDecl],
        labels: Vec<String>,
        fut: F,
    ) -> Self
    where
        F: std::future::Future<Output = Result<RawValue>> + Send + 'static,
    {
        Self {
            source,
            gauges,
            labels,
            fut: Box::pin(fut),
        }
    }
}

/// A query after the join: its declaration plus what came back.
#[derive(Debug)]
pub struct CompletedQuery {
    pub source: &'static str,
    pub gauges: &'static [&'static GaugeDecl],
    pub labels: Vec<String>,
    pub outcome: QueryOutcome,
    pub elapsed: Duration,
}

pub struct FanOut {
    upstream_timeout: Duration,
    deadline: Instant,
}

impl FanOut {
    /// `request_deadline` counts from now; create this when the request
    /// arrives so prerequisite lookups spend from the same budget.
    pub fn new(upstream_timeout: Duration, request_deadline: Duration) -> Self {
        Self {
            upstream_timeout,
            deadline: Instant::now() + request_deadline,
        }
    }

    /// Time a single upstream call may take right now.
    pub fn bound(&self) -> Duration {
        self.upstream_timeout
            .min(self.deadline.saturating_duration_since(Instant::now()))
    }

    pub async fn run(&self, queries: Vec<SourceQuery>) -> Vec<CompletedQuery> {
        let mut decls = Vec::with_capacity(queries.len());
        let mut slots: Vec<Option<(QueryOutcome, Duration)>> = Vec::with_capacity(queries.len());
        let mut set = JoinSet::new();
        let bound = self.bound();

        for (idx, q) in queries.into_iter().enumerate() {
            let SourceQuery {
                source,
                gauges,
                labels,
                fut,
            } = q;
            decls.push((source, gauges, labels));
            slots.push(None);

            let task = async move {
                tracing::debug!(source, "query started");
                let started = Instant::now();
                let outcome = match tokio::time::timeout(bound, AssertUnwindSafe(fut).catch_unwind()).await {
                    Ok(Ok(Ok(raw))) => QueryOutcome::Ok(raw),
                    Ok(Ok(Err(e))) => QueryOutcome::Failed(e.into()),
                    Ok(Err(_)) => QueryOutcome::Failed(SourceFailure::new(
                        FailureKind::Panicked,
                        "query task panicked",
                    )),
                    Err(_) => QueryOutcome::Failed(SourceFailure::new(
                        FailureKind::TimedOut,
                        format!("no response within {}ms", bound.as_millis()),
                    )),
                };
                let elapsed = started.elapsed();
                match &outcome {
                    QueryOutcome::Ok(_) => {
                        tracing::debug!(source, elapsed_secs = elapsed.as_secs_f64(), "query finished")
                    }
                    QueryOutcome::Failed(f) => {
                        tracing::warn!(source, elapsed_secs = elapsed.as_secs_f64(), error = %f, "query failed")
                    }
                }
                (idx, outcome, elapsed)
            };
            set.spawn(task.in_current_span());
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome, elapsed)) => {
                    if let Some(slot) = slots.get_mut(idx) {
                        *slot = Some((outcome, elapsed));
                    }
                }
                // Panics are caught inside the task, so this is only reachable
                // through an external abort. The slot is filled below.
                Err(e) => tracing::error!(error = %e, "query task did not complete"),
            }
        }

        decls
            .into_iter()
            .zip(slots)
            .map(|((source, gauges, labels), slot)| {
                let (outcome, elapsed) = slot.unwrap_or_else(|| {
                    (
                        QueryOutcome::Failed(SourceFailure::new(
                            FailureKind::Other,
                            "query task did not complete",
                        )),
                        Duration::ZERO,
                    )
                });
                CompletedQuery {
                    source,
                    gauges,
                    labels,
                    outcome,
                    elapsed,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;
    use chainscrape_core::error::ExporterError;
    use chainscrape_core::normalize::Scaling;

    static G: GaugeDecl = GaugeDecl {
        name: "test_gauge",
        help: "test",
        label_keys: &["k"],
        scaling: Scaling::Unscaled,
    };
    static GAUGES: &[&GaugeDecl] = &[&G];

    fn ok_query(name: &'static str, v: i64, delay: Duration) -> SourceQuery {
        SourceQuery::new(name, GAUGES, vec![name.to_string()], async move {
            tokio::time::sleep(delay).await;
            Ok(vec![RawSample::scalar(&G, RawNumber::Count(v))])
        })
    }

    fn failing_query(name: &'static str) -> SourceQuery {
        SourceQuery::new(name, GAUGES, vec![name.to_string()], async move {
            Err(ExporterError::SourceUnavailable("connection refused".into()))
        })
    }

    fn kind(c: &CompletedQuery) -> Option<FailureKind> {
        match &c.outcome {
            QueryOutcome::Ok(_) => None,
            QueryOutcome::Failed(f) => Some(f.kind),
        }
    }

    #[tokio::test]
    async fn results_keep_query_order() {
        let fan = FanOut::new(Duration::from_secs(5), Duration::from_secs(10));
        let out = fan
            .run(vec![
                ok_query("slow", 1, Duration::from_millis(50)),
                ok_query("fast", 2, Duration::ZERO),
            ])
            .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, "slow");
        assert_eq!(out[1].source, "fast");
        assert_eq!(
            out[0].outcome,
            QueryOutcome::Ok(vec![RawSample::scalar(&G, RawNumber::Count(1))])
        );
    }

    #[tokio::test]
    async fn every_failure_subset_leaves_siblings_intact() {
        for mask in 0u8..8 {
            let queries = (0..3)
                .map(|i| {
                    if mask & (1 << i) != 0 {
                        failing_query("bad")
                    } else {
                        ok_query("good", i, Duration::ZERO)
                    }
                })
                .collect();
            let out = FanOut::new(Duration::from_secs(5), Duration::from_secs(10))
                .run(queries)
                .await;
            for (i, c) in out.iter().enumerate() {
                let failed = mask & (1 << i) != 0;
                assert_eq!(kind(c).is_some(), failed, "mask {mask:03b} slot {i}");
            }
        }
    }

    #[tokio::test]
    async fn panic_is_confined_to_its_slot() {
        let boom = SourceQuery::new("boom", GAUGES, vec![], async {
            if true {
                panic!("decoder bug");
            }
            Ok(vec![])
        });
        let out = FanOut::new(Duration::from_secs(5), Duration::from_secs(10))
            .run(vec![boom, ok_query("fine", 7, Duration::ZERO)])
            .await;
        assert_eq!(kind(&out[0]), Some(FailureKind::Panicked));
        assert_eq!(kind(&out[1]), None);
    }

    #[tokio::test]
    async fn hung_query_is_bounded_by_timeout() {
        let started = std::time::Instant::now();
        let out = FanOut::new(Duration::from_millis(100), Duration::from_secs(10))
            .run(vec![
                ok_query("hung", 1, Duration::from_secs(30)),
                ok_query("fine", 2, Duration::ZERO),
            ])
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(kind(&out[0]), Some(FailureKind::TimedOut));
        assert_eq!(kind(&out[1]), None);
    }

    #[tokio::test]
    async fn request_deadline_clips_upstream_timeout() {
        let fan = FanOut::new(Duration::from_secs(60), Duration::from_millis(100));
        assert!(fan.bound() <= Duration::from_millis(100));
        let out = fan.run(vec![ok_query("hung", 1, Duration::from_secs(30))]).await;
        assert_eq!(kind(&out[0]), Some(FailureKind::TimedOut));
    }

    #[tokio::test]
    async fn empty_plan_returns_nothing() {
        let out = FanOut::new(Duration::from_secs(1), Duration::from_secs(1))
            .run(Vec::new())
            .await;
        assert!(out.is_empty());
    }
}
