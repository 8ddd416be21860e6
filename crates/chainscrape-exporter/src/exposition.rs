//! Prometheus text rendering of a finished `MetricSet` and of the
//! exporter's own registry.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};

use chainscrape_core::error::ExporterError;

use crate::error::ApiResult;
use crate::metric_set::MetricSet;

/// Encode and consume the set. Families without samples are skipped by
/// `Registry::gather`, so failed sources leave no trace in the document.
pub fn render(set: MetricSet) -> ApiResult<Response> {
    encode(&set.into_registry().gather())
}

pub fn encode(families: &[MetricFamily]) -> ApiResult<Response> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(families, &mut buf)
        .map_err(|e| ExporterError::Internal(format!("encode metrics: {e}")))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buf,
    )
        .into_response())
}
