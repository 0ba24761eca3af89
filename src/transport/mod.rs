//! # Transport Client
//!
//! Protocol-specific request execution with repeat, progress and
//! cancellation, plus normalization into the uniform [`Response`] shape.
//!
//! The [`HttpClient`] resolves one option bag per logical request (built-in
//! defaults, then environment overrides, then per-request fields), extracts
//! the target address out of that bag and hands both to a raw-I/O
//! [`HttpExchange`]. Repeat fans the same resolved options out N times;
//! cancellation is cooperative and scoped to exactly one in-flight single
//! call.

pub mod amqp;
pub mod http;
pub mod response;

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::config::RequestOverrides;
use crate::document::{Headers, Repeat, RepeatOrder, Request, RequestBody, Response};
use crate::io::ProgressSink;

pub use http::ReqwestExchange;
pub use response::{format_size, merge_raw_http_headers, normalize_response};

/// Outcome of one transport send. Explicit cancellation is a non-error
/// "no response" signal, never an exception.
#[derive(Debug)]
pub enum SendOutcome {
    Completed(Box<Response>),
    Cancelled,
}

impl SendOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SendOutcome::Cancelled)
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            SendOutcome::Completed(response) => Some(*response),
            SendOutcome::Cancelled => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    /// Precondition failure raised before any I/O.
    #[error("request has no target address")]
    MissingUrl,
    /// Invariant violation: the call neither failed nor was cancelled, yet
    /// produced no response object.
    #[error("call settled without a response")]
    MissingResponse,
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
    #[error("invalid request method: {0}")]
    InvalidMethod(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

type CancelCallback = Box<dyn Fn() + Send + Sync>;

/// Concurrent registry of cancel callbacks. Independent sends register and
/// deregister freely; firing it aborts the in-flight single calls and yields
/// the non-error [`SendOutcome::Cancelled`] outcome.
#[derive(Default)]
pub struct CancellationRegistry {
    callbacks: DashMap<u64, CancelCallback>,
    next_id: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, callback: CancelCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.insert(id, callback);
        id
    }

    pub fn deregister(&self, id: u64) {
        self.callbacks.remove(&id);
    }

    pub fn cancel_all(&self) {
        for entry in self.callbacks.iter() {
            entry.value()();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

/// Plain/secure tunnel agents derived from a proxy address. The raw proxy
/// field itself is never forwarded to the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyAgents {
    pub http: String,
    pub https: String,
}

/// The resolved option bag handed to an [`HttpExchange`]. The target address
/// is deliberately not part of it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HttpOptions {
    pub method: String,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    pub decompress: bool,
    pub retry: u32,
    pub throw_http_errors: bool,
    /// Pass-through transport option; the pipeline implements no timeout.
    pub timeout_ms: Option<u64>,
    pub agent: Option<ProxyAgents>,
}

/// Cumulative download fraction callback handed to the exchange. The client
/// converts it to incremental deltas for the registered sink.
pub type ProgressHook = Box<dyn Fn(f64) + Send + Sync>;

/// Raw HTTP I/O seam. The real implementation is [`ReqwestExchange`]; tests
/// substitute a scripted fake.
#[async_trait]
pub trait HttpExchange: Send + Sync {
    async fn execute(
        &self,
        url: &str,
        options: &HttpOptions,
        progress: Option<ProgressHook>,
    ) -> Result<Response, TransportError>;
}

/// Per-send execution context for the client.
#[derive(Clone, Default)]
pub struct ClientContext {
    pub repeat: Option<Repeat>,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub cancellation: Option<Arc<CancellationRegistry>>,
}

/// HTTP transport client bound to environment-level default overrides.
#[derive(Clone)]
pub struct HttpClient {
    defaults: RequestOverrides,
    exchange: Arc<dyn HttpExchange>,
}

/// Factory mirroring the environment-config entry point: default overrides
/// in, ready-to-send client out.
pub fn http_client_factory(defaults: Option<RequestOverrides>) -> HttpClient {
    HttpClient::new(defaults.unwrap_or_default(), Arc::new(ReqwestExchange))
}

impl HttpClient {
    pub fn new(defaults: RequestOverrides, exchange: Arc<dyn HttpExchange>) -> Self {
        Self { defaults, exchange }
    }

    /// Merge order, later overrides earlier: built-in defaults, environment
    /// overrides, per-request fields. The target address is extracted and
    /// excluded from the returned option bag.
    pub fn resolve_options(
        &self,
        request: &Request,
    ) -> Result<(String, HttpOptions), TransportError> {
        if request.url.trim().is_empty() {
            return Err(TransportError::MissingUrl);
        }

        let mut options = HttpOptions {
            method: if request.method.is_empty() {
                "GET".to_string()
            } else {
                request.method.clone()
            },
            headers: vec![
                ("accept".to_string(), "*/*".to_string()),
                ("user-agent".to_string(), "httpfile".to_string()),
            ],
            body: request.body.clone(),
            decompress: true,
            retry: 0,
            throw_http_errors: false,
            timeout_ms: None,
            agent: None,
        };

        for (name, value) in &self.defaults.headers {
            upsert_header(&mut options.headers, name, value);
        }
        if let Some(decompress) = self.defaults.decompress {
            options.decompress = decompress;
        }
        if let Some(retry) = self.defaults.retry {
            options.retry = retry;
        }
        if let Some(throw) = self.defaults.throw_http_errors {
            options.throw_http_errors = throw;
        }
        if let Some(timeout) = self.defaults.timeout_ms {
            options.timeout_ms = Some(timeout);
        }

        for (name, value) in &request.headers {
            upsert_header(&mut options.headers, name, value);
        }

        if let Some(proxy) = request.proxy.clone().or_else(|| self.defaults.proxy.clone()) {
            options.agent = Some(ProxyAgents {
                http: proxy.clone(),
                https: proxy,
            });
        }

        Ok((request.url.clone(), options))
    }

    /// Sends one logical request. Repeat semantics, progress and cancellation
    /// come from `context`.
    pub async fn send(
        &self,
        request: &Request,
        context: &ClientContext,
    ) -> Result<SendOutcome, TransportError> {
        let (url, options) = self.resolve_options(request)?;
        debug!(url = %url, method = %options.method, "dispatching http request");

        let response = match context.repeat {
            Some(repeat) if repeat.count > 0 => self.load_repeat(&url, &options, repeat).await?,
            _ => match self.load(&url, &options, context).await? {
                Some(response) => Some(response),
                None => return Ok(SendOutcome::Cancelled),
            },
        };

        match response {
            Some(response) => Ok(SendOutcome::Completed(Box::new(response))),
            None => Err(TransportError::MissingResponse),
        }
    }

    /// Issues `repeat.count` independent attempts with identical resolved
    /// options. Earlier attempts' responses are discarded; repeat exists to
    /// generate load, not to aggregate results.
    async fn load_repeat(
        &self,
        url: &str,
        options: &HttpOptions,
        repeat: Repeat,
    ) -> Result<Option<Response>, TransportError> {
        if repeat.order == RepeatOrder::Parallel {
            let attempts = (0..repeat.count).map(|_| self.exchange.execute(url, options, None));
            // join_all keeps issue order, so popping surfaces the attempt
            // issued last even when an earlier attempt finishes later. This
            // is externally observable behavior and must not change.
            let mut responses = join_all(attempts)
                .await
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(responses.pop());
        }

        let mut last = None;
        for _ in 0..repeat.count {
            last = Some(self.exchange.execute(url, options, None).await?);
        }
        Ok(last)
    }

    /// One single (non-repeated) call. Returns `None` when cancelled.
    async fn load(
        &self,
        url: &str,
        options: &HttpOptions,
        context: &ClientContext,
    ) -> Result<Option<Response>, TransportError> {
        let progress = context.progress.as_ref().map(|sink| {
            let sink = Arc::clone(sink);
            let previous = Mutex::new(0.0_f64);
            Box::new(move |percent: f64| {
                let mut prev = previous.lock().expect("progress lock poisoned");
                let increment = (percent - *prev) * 100.0;
                *prev = percent;
                sink.report("call http request", increment);
            }) as ProgressHook
        });

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let registration = context.cancellation.as_ref().map(|registry| {
            let sender = Mutex::new(Some(cancel_tx));
            let id = registry.register(Box::new(move || {
                if let Some(tx) = sender.lock().expect("cancel lock poisoned").take() {
                    let _ = tx.send(());
                }
            }));
            (Arc::clone(registry), id)
        });

        let settled = if registration.is_some() {
            tokio::select! {
                result = self.exchange.execute(url, options, progress) => Some(result),
                _ = cancel_rx => None,
            }
        } else {
            Some(self.exchange.execute(url, options, progress).await)
        };

        // Deregister unconditionally once the call settles, success or not.
        if let Some((registry, id)) = registration {
            registry.deregister(id);
        }

        match settled {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }
}

fn upsert_header(headers: &mut Headers, name: &str, value: &str) {
    match headers
        .iter_mut()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
    {
        Some((_, existing_value)) => *existing_value = value.to_string(),
        None => headers.push((name.to_string(), value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_merges_defaults_env_and_request_in_order() {
        let defaults = RequestOverrides {
            headers: vec![("user-agent".to_string(), "env-agent".to_string())],
            retry: Some(2),
            ..RequestOverrides::default()
        };
        let client = HttpClient::new(defaults, Arc::new(ReqwestExchange));

        let mut request = Request::new("POST", "http://localhost/post");
        request
            .headers
            .push(("Accept".to_string(), "application/json".to_string()));
        let (url, options) = client.resolve_options(&request).unwrap();

        assert_eq!(url, "http://localhost/post");
        assert_eq!(options.retry, 2);
        assert!(options.decompress);
        assert!(!options.throw_http_errors);
        // Per-request Accept overrides the built-in; env user-agent overrides
        // the built-in; the bag itself carries no address.
        let accept = options
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("accept"))
            .unwrap();
        assert_eq!(accept.1, "application/json");
        let agent = options
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("user-agent"))
            .unwrap();
        assert_eq!(agent.1, "env-agent");
    }

    #[test]
    fn missing_url_fails_before_any_io() {
        let client = HttpClient::new(RequestOverrides::default(), Arc::new(ReqwestExchange));
        let request = Request::new("GET", "  ");
        assert!(matches!(
            client.resolve_options(&request),
            Err(TransportError::MissingUrl)
        ));
    }

    #[test]
    fn proxy_becomes_tunnel_agents_and_is_not_forwarded_raw() {
        let client = HttpClient::new(RequestOverrides::default(), Arc::new(ReqwestExchange));
        let mut request = Request::new("GET", "http://localhost/json");
        request.proxy = Some("http://proxy:3128".to_string());
        let (_, options) = client.resolve_options(&request).unwrap();
        let agent = options.agent.unwrap();
        assert_eq!(agent.http, "http://proxy:3128");
        assert_eq!(agent.https, "http://proxy:3128");
    }

    #[test]
    fn cancellation_registry_registers_and_deregisters() {
        let registry = CancellationRegistry::new();
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let id = registry.register(Box::new(move || {
            flag.store(true, Ordering::SeqCst);
        }));
        assert!(!registry.is_empty());
        registry.cancel_all();
        assert!(fired.load(Ordering::SeqCst));
        registry.deregister(id);
        assert!(registry.is_empty());
    }
}
