//! Ephemeral, request-scoped gauge registry.
//!
//! A `MetricSet` is created when a scrape starts, filled from the joined
//! query outcomes and consumed by exposition. Nothing in it outlives the
//! request, so labels from one caller can never leak into another's output.
//!
//! A gauge only gets a series when a value was actually obtained. Failures
//! leave the series absent rather than zero.

use std::collections::{BTreeMap, HashMap};

use prometheus::{GaugeVec, Opts, Registry};

use chainscrape_core::amount::Accuracy;
use chainscrape_core::error::{ExporterError, FailureKind, Result, SourceFailure};
use chainscrape_core::normalize::{Normalizer, RawNumber, Scaling};

use crate::fanout::{CompletedQuery, QueryOutcome};

/// Static description of one gauge family.
#[derive(Debug, PartialEq)]
pub struct GaugeDecl {
    pub name: &'static str,
    pub help: &'static str,
    /// Variable label keys in the order values are supplied.
    pub label_keys: &'static [&'static str],
    pub scaling: Scaling,
}

/// A source whose query failed or whose samples could not be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFailure {
    pub source: &'static str,
    pub kind: FailureKind,
}

pub struct MetricSet {
    registry: Registry,
    gauges: HashMap<&'static str, GaugeVec>,
    normalizer: Normalizer,
    failures: Vec<RecordedFailure>,
}

impl MetricSet {
    /// Register one `GaugeVec` per declaration in a fresh registry.
    pub fn new(
        normalizer: Normalizer,
        const_labels: &BTreeMap<String, String>,
        decls: &[&'static GaugeDecl],
    ) -> Result<Self> {
        let registry = Registry::new();
        let mut gauges = HashMap::with_capacity(decls.len());
        let consts: HashMap<String, String> = const_labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for decl in decls {
            let opts = Opts::new(decl.name, decl.help).const_labels(consts.clone());
            let gauge = GaugeVec::new(opts, decl.label_keys).map_err(|e| {
                ExporterError::Internal(format!("gauge {}: {e}", decl.name))
            })?;
            registry.register(Box::new(gauge.clone())).map_err(|e| {
                ExporterError::Internal(format!("register {}: {e}", decl.name))
            })?;
            gauges.insert(decl.name, gauge);
        }

        Ok(Self {
            registry,
            gauges,
            normalizer,
            failures: Vec::new(),
        })
    }

    /// Fold one joined query into the set.
    pub fn apply(&mut self, done: CompletedQuery) {
        let samples = match done.outcome {
            QueryOutcome::Ok(samples) => samples,
            QueryOutcome::Failed(failure) => {
                // The fan-out already logged the cause.
                self.failures.push(RecordedFailure {
                    source: done.source,
                    kind: failure.kind,
                });
                return;
            }
        };

        for sample in samples {
            if !done.gauges.iter().any(|g| std::ptr::eq(*g, sample.gauge)) {
                self.reject(
                    done.source,
                    SourceFailure::new(
                        FailureKind::Other,
                        format!("sample for undeclared gauge {}", sample.gauge.name),
                    ),
                );
                continue;
            }
            let mut labels = done.labels.clone();
            labels.extend(sample.labels);
            if let Err(e) = self.put(sample.gauge, &labels, &sample.value) {
                self.reject(done.source, e.into());
            }
        }
    }

    /// Set a value that did not come through the fan-out (prerequisite
    /// responses). Failures are recorded against `source` like any other.
    pub fn set(&mut self, source: &'static str, decl: &'static GaugeDecl, labels: &[String], value: RawNumber) {
        if let Err(e) = self.put(decl, labels, &value) {
            self.reject(source, e.into());
        }
    }

    pub fn failures(&self) -> &[RecordedFailure] {
        &self.failures
    }

    /// Hand the registry to exposition. The set is gone afterwards.
    pub fn into_registry(self) -> Registry {
        self.registry
    }

    fn put(&self, decl: &'static GaugeDecl, labels: &[String], value: &RawNumber) -> Result<()> {
        let gauge = self.gauges.get(decl.name).ok_or_else(|| {
            ExporterError::Internal(format!("gauge {} is not registered for this route", decl.name))
        })?;
        if labels.len() != decl.label_keys.len() {
            return Err(ExporterError::NormalizationFailure(format!(
                "{}: expected labels {:?}, got {} values",
                decl.name,
                decl.label_keys,
                labels.len()
            )));
        }

        let n = self.normalizer.normalize(value, decl.scaling)?;
        if n.accuracy != Accuracy::Exact {
            tracing::trace!(gauge = decl.name, accuracy = ?n.accuracy, value = n.value, "inexact conversion");
        }

        let values: Vec<&str> = labels.iter().map(String::as_str).collect();
        let child = gauge
            .get_metric_with_label_values(&values)
            .map_err(|e| ExporterError::Internal(format!("{}: {e}", decl.name)))?;
        child.set(n.value);
        Ok(())
    }

    fn reject(&mut self, source: &'static str, failure: SourceFailure) {
        tracing::warn!(source, error = %failure, "value not set");
        self.failures.push(RecordedFailure {
            source,
            kind: failure.kind,
        });
    }
}
