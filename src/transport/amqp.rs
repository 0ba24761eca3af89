//! AMQP-style messaging boundary.
//!
//! The full wire implementation is an external library; this module carries
//! the request shape (broker message properties), the dispatch predicate and
//! the exchange seam the dispatcher routes AMQP-tagged requests to.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Protocol, Request, Response};

use super::{SendOutcome, TransportError};

/// Broker message properties attached to an AMQP request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AmqpProperties {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub delivery_mode: Option<u8>,
    pub priority: Option<u8>,
    pub app_id: Option<String>,
    pub headers: Vec<(String, String)>,
}

/// True when the dispatcher should route `request` to the AMQP client.
pub fn is_amqp_request(request: &Request) -> bool {
    request.protocol == Protocol::Amqp
}

/// Performs the actual broker publish. Implemented by an external AMQP
/// library binding.
#[async_trait]
pub trait AmqpExchange: Send + Sync {
    async fn publish(&self, request: &Request) -> Result<Response, TransportError>;
}

/// Protocol client for AMQP-tagged requests.
#[derive(Clone, Default)]
pub struct AmqpClient {
    exchange: Option<Arc<dyn AmqpExchange>>,
}

impl AmqpClient {
    pub fn new(exchange: Option<Arc<dyn AmqpExchange>>) -> Self {
        Self { exchange }
    }

    pub async fn send(&self, request: &Request) -> Result<SendOutcome, TransportError> {
        if request.url.is_empty() {
            return Err(TransportError::MissingUrl);
        }
        let Some(exchange) = &self.exchange else {
            return Err(TransportError::UnsupportedProtocol("AMQP".to_string()));
        };
        let response = exchange.publish(request).await?;
        Ok(SendOutcome::Completed(Box::new(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_matches_protocol_tag() {
        let mut request = Request::new("PUBLISH", "amqp://localhost/orders");
        assert!(!is_amqp_request(&request));
        request.protocol = Protocol::Amqp;
        assert!(is_amqp_request(&request));
    }

    #[tokio::test]
    async fn publish_without_exchange_is_unsupported() {
        let client = AmqpClient::default();
        let mut request = Request::new("PUBLISH", "amqp://localhost/orders");
        request.protocol = Protocol::Amqp;
        let err = client.send(&request).await.unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedProtocol(_)));
    }
}
