//! Reqwest-backed [`HttpExchange`] implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Version;
use tracing::debug;

use crate::document::{RequestBody, RequestEcho, Response, Timings};

use super::response::normalize_response;
use super::{HttpExchange, HttpOptions, ProgressHook, TransportError};

/// Executes one HTTP call with reqwest, streaming the body so progress can
/// be observed, and normalizes the native response.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestExchange;

#[async_trait]
impl HttpExchange for ReqwestExchange {
    async fn execute(
        &self,
        url: &str,
        options: &HttpOptions,
        progress: Option<ProgressHook>,
    ) -> Result<Response, TransportError> {
        let started = Instant::now();

        let mut builder = reqwest::Client::builder().gzip(options.decompress);
        if let Some(agent) = &options.agent {
            builder = builder
                .proxy(reqwest::Proxy::http(&agent.http)?)
                .proxy(reqwest::Proxy::https(&agent.https)?);
        }
        if let Some(timeout) = options.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout));
        }
        let client = builder.build()?;

        let method = reqwest::Method::from_bytes(options.method.as_bytes())
            .map_err(|_| TransportError::InvalidMethod(options.method.clone()))?;
        let mut request = client.request(method, url);
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }
        request = match &options.body {
            Some(RequestBody::Text(text)) => request.body(text.clone()),
            Some(RequestBody::Binary(bytes)) => request.body(bytes.clone()),
            None => request,
        };

        let native = request.send().await?;
        if options.throw_http_errors {
            native.error_for_status_ref()?;
        }

        let status = native.status();
        let version = version_label(native.version());
        let first_byte = started.elapsed();
        let raw_headers: Vec<String> = native
            .headers()
            .iter()
            .flat_map(|(name, value)| {
                [
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                ]
            })
            .collect();
        let content_length = native.content_length();

        let mut raw_body: Vec<u8> = Vec::new();
        let mut stream = native.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(TransportError::Http)?;
            raw_body.extend_from_slice(&chunk);
            if let (Some(hook), Some(total)) = (&progress, content_length) {
                if total > 0 {
                    let fraction = (raw_body.len() as f64 / total as f64).min(1.0);
                    hook(fraction);
                }
            }
        }

        let total = started.elapsed();
        let timings = Timings {
            first_byte: Some(duration_ms(first_byte)),
            download: Some(duration_ms(total.saturating_sub(first_byte))),
            total: Some(duration_ms(total)),
            ..Timings::default()
        };
        debug!(status = status.as_u16(), bytes = raw_body.len(), "http call finished");

        let echo = RequestEcho {
            method: options.method.clone(),
            url: url.to_string(),
            headers: options.headers.clone(),
            body: options.body.clone(),
        };
        Ok(normalize_response(
            status.as_u16(),
            status.canonical_reason().map(str::to_string),
            version,
            raw_headers,
            raw_body,
            timings,
            echo,
        ))
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn version_label(version: Version) -> &'static str {
    if version == Version::HTTP_09 {
        "0.9"
    } else if version == Version::HTTP_10 {
        "1.0"
    } else if version == Version::HTTP_11 {
        "1.1"
    } else if version == Version::HTTP_2 {
        "2"
    } else if version == Version::HTTP_3 {
        "3"
    } else {
        "1.1"
    }
}
