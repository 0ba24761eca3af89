//! # Action Pipeline
//!
//! Ordered set of protocol/feature plugins executed per region at send time.
//! Each [`Action`] declares which action ids it must run before or after; the
//! global order is computed once at pipeline construction via a topological
//! sort (ties broken by registration order) and an unsatisfiable constraint
//! set is a construction-time fatal error. Execution is a single logical
//! flow: one action completes before the next starts, and an action failure
//! halts the remaining pipeline for that region without aborting sibling
//! regions.

pub mod graphql;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::document::{Repeat, Request, Response};
use crate::io::{NullWarningSink, ProgressSink, WarningSink};
use crate::pipeline::graphql::GqlRegionData;
use crate::transport::amqp::{is_amqp_request, AmqpClient};
use crate::transport::{CancellationRegistry, ClientContext, HttpClient, SendOutcome, TransportError};
use crate::variables::VariableSet;

#[derive(Error, Debug)]
pub enum ActionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid graphql variables: {0}")]
    InvalidVariables(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("action ordering cycle involving '{0}'")]
    OrderingCycle(String),
    #[error("action '{id}' failed: {source}")]
    ActionFailed {
        id: String,
        #[source]
        source: ActionError,
    },
}

/// Transient state owned by exactly one pipeline execution of one region.
/// Destroyed when the pipeline finishes.
pub struct ProcessorContext {
    /// The in-progress request actions enrich before transport.
    pub request: Option<Request>,
    /// Set by the transport action once the call completes.
    pub response: Option<Response>,
    pub gql: Option<GqlRegionData>,
    pub variables: VariableSet,
    pub repeat: Option<Repeat>,
    /// Free-form bag for cross-action communication within this execution.
    pub data: HashMap<String, Value>,
    pub warnings: Arc<dyn WarningSink>,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub cancellation: Option<Arc<CancellationRegistry>>,
    /// True when the transport call was cooperatively cancelled.
    pub cancelled: bool,
}

impl ProcessorContext {
    pub fn new(request: Option<Request>) -> Self {
        Self {
            request,
            response: None,
            gql: None,
            variables: VariableSet::new(),
            repeat: None,
            data: HashMap::new(),
            warnings: Arc::new(NullWarningSink),
            progress: None,
            cancellation: None,
            cancelled: false,
        }
    }
}

/// One pipeline plugin. Side effects are limited to mutating the context.
#[async_trait]
pub trait Action: Send + Sync {
    fn id(&self) -> &str;

    /// Action ids this action must run before.
    fn before(&self) -> Vec<String> {
        Vec::new()
    }

    /// Action ids this action must run after.
    fn after(&self) -> Vec<String> {
        Vec::new()
    }

    async fn process(&self, context: &mut ProcessorContext) -> Result<(), ActionError>;
}

/// Actions in their computed global order.
pub struct Pipeline {
    actions: Vec<Arc<dyn Action>>,
}

impl Pipeline {
    /// Computes the global order once. A cycle in the before/after
    /// declarations fails here, never at send time.
    pub fn new(actions: Vec<Arc<dyn Action>>) -> Result<Self, PipelineError> {
        let order = topological_order(&actions)?;
        Ok(Self {
            actions: order.into_iter().map(|i| Arc::clone(&actions[i])).collect(),
        })
    }

    pub fn action_ids(&self) -> Vec<&str> {
        self.actions.iter().map(|action| action.id()).collect()
    }

    /// Runs the actions strictly in order, each awaited to completion. The
    /// first failure halts the rest and is reported to the caller.
    pub async fn execute(&self, context: &mut ProcessorContext) -> Result<(), PipelineError> {
        for action in &self.actions {
            debug!(action = action.id(), "running pipeline action");
            if let Err(source) = action.process(context).await {
                warn!(action = action.id(), error = %source, "pipeline action failed");
                return Err(PipelineError::ActionFailed {
                    id: action.id().to_string(),
                    source,
                });
            }
        }
        Ok(())
    }
}

/// Kahn's algorithm over the declared constraints; ties broken by
/// registration order. Constraints naming unregistered ids are ignored.
fn topological_order(actions: &[Arc<dyn Action>]) -> Result<Vec<usize>, PipelineError> {
    let index_of: HashMap<&str, usize> = actions
        .iter()
        .enumerate()
        .map(|(index, action)| (action.id(), index))
        .collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); actions.len()];
    let mut indegree: Vec<usize> = vec![0; actions.len()];
    let mut add_edge = |from: usize, to: usize, successors: &mut Vec<Vec<usize>>, indegree: &mut Vec<usize>| {
        if !successors[from].contains(&to) {
            successors[from].push(to);
            indegree[to] += 1;
        }
    };
    for (index, action) in actions.iter().enumerate() {
        for target in action.before() {
            if let Some(&other) = index_of.get(target.as_str()) {
                add_edge(index, other, &mut successors, &mut indegree);
            }
        }
        for target in action.after() {
            if let Some(&other) = index_of.get(target.as_str()) {
                add_edge(other, index, &mut successors, &mut indegree);
            }
        }
    }

    let mut order = Vec::with_capacity(actions.len());
    let mut placed = vec![false; actions.len()];
    while order.len() < actions.len() {
        let next = (0..actions.len()).find(|&i| !placed[i] && indegree[i] == 0);
        let Some(next) = next else {
            let stuck = (0..actions.len())
                .find(|&i| !placed[i])
                .map(|i| actions[i].id().to_string())
                .unwrap_or_default();
            return Err(PipelineError::OrderingCycle(stuck));
        };
        placed[next] = true;
        order.push(next);
        for &succ in &successors[next] {
            indegree[succ] -= 1;
        }
    }
    Ok(order)
}

/// Transport dispatch action: routes the enriched request to the protocol
/// client matching its tag and stores the normalized response back on the
/// context.
pub struct DispatchAction {
    http: HttpClient,
    amqp: AmqpClient,
}

impl DispatchAction {
    pub const ID: &'static str = "http";

    pub fn new(http: HttpClient, amqp: AmqpClient) -> Self {
        Self { http, amqp }
    }
}

#[async_trait]
impl Action for DispatchAction {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn process(&self, context: &mut ProcessorContext) -> Result<(), ActionError> {
        let Some(request) = context.request.clone() else {
            return Ok(());
        };

        let outcome = if is_amqp_request(&request) {
            self.amqp.send(&request).await?
        } else {
            let client_context = ClientContext {
                repeat: request.repeat.or(context.repeat),
                progress: context.progress.clone(),
                cancellation: context.cancellation.clone(),
            };
            self.http.send(&request, &client_context).await?
        };

        match outcome {
            SendOutcome::Completed(response) => context.response = Some(*response),
            SendOutcome::Cancelled => context.cancelled = true,
        }
        Ok(())
    }
}
