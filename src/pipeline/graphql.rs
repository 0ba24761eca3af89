//! GraphQL query assembler action.
//!
//! Runs before the transport action. Resolves the region's query source,
//! recursively pulls in every fragment the query (or an already pulled
//! fragment) spreads via `...Name`, and replaces the request body with the
//! structured envelope `{query, operationName?, variables?}`. The visited
//! set threaded through the recursion guarantees termination under mutual
//! fragment references and that each fragment appears at most once.

use std::path::PathBuf;
use std::sync::Arc;

use async_recursion::async_recursion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::document::RequestBody;
use crate::io::WarningSink;
use crate::resolve::FileLoader;

use super::{Action, ActionError, ProcessorContext};

/// Where query or fragment text comes from: literal text from the document,
/// or an external file resolved at assembly time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GqlSource {
    Literal(String),
    File(PathBuf),
}

/// Assembler input attached to a region during parsing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GqlRegionData {
    pub operation_name: Option<String>,
    pub query: Option<GqlSource>,
    /// Known fragments in definition order, shared across the document.
    pub fragments: Vec<(String, GqlSource)>,
}

/// The structured envelope posted to a GraphQL endpoint. Field order is the
/// wire order.
#[derive(Debug, Serialize)]
struct GqlPostRequest {
    query: String,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    operation_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<Value>,
}

/// Pipeline action assembling GraphQL request bodies.
pub struct GraphqlAction {
    loader: Arc<dyn FileLoader>,
}

impl GraphqlAction {
    pub const ID: &'static str = "gql";

    pub fn new(loader: Arc<dyn FileLoader>) -> Self {
        Self { loader }
    }

    /// Resolves one source to text. A loader miss is recoverable: the user
    /// gets a warning, the log gets an entry, and assembly proceeds without
    /// that content.
    async fn resolve_source(
        &self,
        source: &GqlSource,
        missing_message: &str,
        warnings: &Arc<dyn WarningSink>,
    ) -> Option<String> {
        match source {
            GqlSource::Literal(text) => Some(text.clone()),
            GqlSource::File(path) => match self.loader.read(path).await {
                Ok(text) => Some(text),
                Err(_) => {
                    warnings.warn(missing_message);
                    warn!(path = %path.display(), "{missing_message}");
                    None
                }
            },
        }
    }

    /// Collects every fragment the query transitively spreads, in discovery
    /// order. `seen` is the visited set: a fragment already collected is
    /// never resolved or appended again.
    #[async_recursion]
    async fn extract_used_fragments(
        &self,
        query: &str,
        data: &GqlRegionData,
        seen: &mut Vec<(String, String)>,
        warnings: &Arc<dyn WarningSink>,
    ) {
        for (name, source) in &data.fragments {
            if seen.iter().any(|(existing, _)| existing == name) {
                continue;
            }
            if !query.contains(&format!("...{name}")) {
                continue;
            }
            let message = format!("query fragment {name} not found");
            let Some(fragment) = self.resolve_source(source, &message, warnings).await else {
                continue;
            };
            seen.push((name.clone(), fragment.clone()));
            // The fragment may spread further fragments itself.
            self.extract_used_fragments(&fragment, data, seen, warnings)
                .await;
        }
    }
}

#[async_trait]
impl Action for GraphqlAction {
    fn id(&self) -> &str {
        Self::ID
    }

    fn before(&self) -> Vec<String> {
        vec![super::DispatchAction::ID.to_string()]
    }

    async fn process(&self, context: &mut ProcessorContext) -> Result<(), ActionError> {
        if context.request.is_none() {
            return Ok(());
        }
        let Some(data) = context.gql.clone() else {
            return Ok(());
        };
        let Some(query_source) = &data.query else {
            return Ok(());
        };

        debug!("building graphql query");
        let warnings = Arc::clone(&context.warnings);
        let Some(query) = self
            .resolve_source(query_source, "query import not found", &warnings)
            .await
        else {
            return Ok(());
        };

        let mut seen = Vec::new();
        self.extract_used_fragments(&query, &data, &mut seen, &warnings)
            .await;
        let mut full_query = query;
        for (_, fragment) in &seen {
            full_query.push('\n');
            full_query.push_str(fragment);
        }

        let Some(request) = context.request.as_mut() else {
            return Ok(());
        };
        let variables = match request.body.as_ref().and_then(RequestBody::as_text) {
            Some(text) => Some(serde_json::from_str(text)?),
            None => None,
        };
        let envelope = GqlPostRequest {
            query: full_query,
            operation_name: data.operation_name.clone(),
            variables,
        };
        request.body = Some(RequestBody::Text(serde_json::to_string(&envelope)?));
        Ok(())
    }
}
