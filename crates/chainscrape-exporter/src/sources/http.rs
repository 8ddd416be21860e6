//! JSON over HTTP shared by the REST and JSON-RPC adapters.

use serde::{de::DeserializeOwned, Serialize};

use chainscrape_core::error::{ExporterError, Result};

/// Upper bound on how much of an error body ends up in a log line.
const MAX_ERROR_BODY: usize = 256;

pub(crate) async fn get_json<T: DeserializeOwned>(client: &reqwest::Client, url: &str) -> Result<T> {
    let resp = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| ExporterError::SourceUnavailable(format!("GET {url}: {e}")))?;
    read_json(resp, url).await
}

pub(crate) async fn post_json<B, T>(client: &reqwest::Client, url: &str, body: &B) -> Result<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let resp = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| ExporterError::SourceUnavailable(format!("POST {url}: {e}")))?;
    read_json(resp, url).await
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response, url: &str) -> Result<T> {
    let status = resp.status();
    let body = resp
        .bytes()
        .await
        .map_err(|e| ExporterError::SourceUnavailable(format!("{url}: reading body: {e}")))?;

    if !status.is_success() {
        return Err(ExporterError::SourceUnavailable(format!(
            "{url}: {status}: {}",
            squash(&body)
        )));
    }

    serde_json::from_slice(&body).map_err(|e| ExporterError::DecodeFailure(format!("{url}: {e}")))
}

/// Single-line, length-capped rendering of an error body.
fn squash(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let mut line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
        line.push_str("...");
    }
    line
}

/// Join a configured base URL and an absolute path.
pub(crate) fn join(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
