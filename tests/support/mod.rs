//! Shared test doubles: in-memory file provider, scripted HTTP exchange and
//! collecting sinks. Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use httpfile::document::{RequestBody, RequestEcho, Response, Timings};
use httpfile::io::{ProgressSink, WarningSink};
use httpfile::resolve::FileLoader;
use httpfile::transport::{
    normalize_response, HttpExchange, HttpOptions, ProgressHook, TransportError,
};

/// Installs a per-test tracing subscriber; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// File provider backed by a map, the way editor embeddings provide unsaved
/// buffers.
pub struct MemoryLoader {
    files: HashMap<PathBuf, String>,
}

impl MemoryLoader {
    pub fn empty() -> Self {
        Self {
            files: HashMap::new(),
        }
    }

    pub fn new<'a, I>(files: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self {
            files: files
                .into_iter()
                .map(|(path, text)| (PathBuf::from(path), text.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl FileLoader for MemoryLoader {
    async fn read(&self, path: &Path) -> std::io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }
}

/// One request observed by the fake exchange.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub started: Instant,
    pub finished: Instant,
}

/// What the fake exchange should answer for one attempt.
pub struct FakeReply {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub delay: Duration,
    /// Cumulative download fractions to feed the progress hook.
    pub progress: Vec<f64>,
}

impl Default for FakeReply {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            delay: Duration::ZERO,
            progress: Vec::new(),
        }
    }
}

impl FakeReply {
    pub fn json(body: &str) -> Self {
        Self {
            body: body.to_string(),
            ..Self::default()
        }
    }
}

type Responder = Box<dyn Fn(usize, &str, &HttpOptions) -> FakeReply + Send + Sync>;

/// Scripted [`HttpExchange`] recording every attempt in issue order.
pub struct FakeExchange {
    responder: Responder,
    seen: Mutex<Vec<SeenRequest>>,
    calls: AtomicUsize,
}

impl FakeExchange {
    pub fn new(
        responder: impl Fn(usize, &str, &HttpOptions) -> FakeReply + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            seen: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Routes by `(method, url prefix)`; unrouted requests get an empty 200.
    pub fn with_routes(routes: Vec<(&str, &str, &str)>) -> Arc<Self> {
        let routes: Vec<(String, String, String)> = routes
            .into_iter()
            .map(|(method, prefix, body)| {
                (method.to_string(), prefix.to_string(), body.to_string())
            })
            .collect();
        Self::new(move |_, url, options| {
            routes
                .iter()
                .find(|(method, prefix, _)| *method == options.method && url.starts_with(prefix))
                .map(|(_, _, body)| FakeReply::json(body))
                .unwrap_or_default()
        })
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpExchange for FakeExchange {
    async fn execute(
        &self,
        url: &str,
        options: &HttpOptions,
        progress: Option<ProgressHook>,
    ) -> Result<Response, TransportError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.responder)(index, url, options);
        let started = Instant::now();
        if reply.delay > Duration::ZERO {
            tokio::time::sleep(reply.delay).await;
        }
        if let Some(hook) = &progress {
            for fraction in &reply.progress {
                hook(*fraction);
            }
        }

        let finished = Instant::now();
        self.seen.lock().unwrap().push(SeenRequest {
            method: options.method.clone(),
            url: url.to_string(),
            headers: options.headers.clone(),
            body: options
                .body
                .as_ref()
                .and_then(RequestBody::as_text)
                .map(str::to_string),
            started,
            finished,
        });

        let raw_headers = reply
            .headers
            .iter()
            .flat_map(|(name, value)| [name.clone(), value.clone()])
            .collect();
        let echo = RequestEcho {
            method: options.method.clone(),
            url: url.to_string(),
            headers: options.headers.clone(),
            body: options.body.clone(),
        };
        Ok(normalize_response(
            reply.status,
            None,
            "HTTP/1.1",
            raw_headers,
            reply.body.into_bytes(),
            Timings::default(),
            echo,
        ))
    }
}

/// Warning sink collecting messages for assertions.
#[derive(Default)]
pub struct CollectingWarnings(pub Mutex<Vec<String>>);

impl WarningSink for CollectingWarnings {
    fn warn(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

/// Progress sink collecting increments for assertions.
#[derive(Default)]
pub struct CollectingProgress(pub Mutex<Vec<f64>>);

impl ProgressSink for CollectingProgress {
    fn report(&self, _message: &str, increment: f64) {
        self.0.lock().unwrap().push(increment);
    }
}
