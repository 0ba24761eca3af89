//! Top-level send orchestration.
//!
//! [`Runner`] ties the components together: resolve imports and references
//! for the target region, execute grafted prerequisites, interpolate
//! variables into the request, run the action pipeline and store the
//! normalized response back on the region.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{init_http_client, EnvironmentConfig};
use crate::document::{Document, Region, Request, RequestBody, Response};
use crate::error::{Error, Result};
use crate::io::{NullWarningSink, ProgressSink, WarningSink};
use crate::pipeline::graphql::GraphqlAction;
use crate::pipeline::{DispatchAction, Pipeline, ProcessorContext};
use crate::resolve::{FileLoader, Resolver};
use crate::transport::amqp::AmqpClient;
use crate::transport::{CancellationRegistry, HttpClient};
use crate::variables::{replace_variables, VariableSet};

/// Selection options for one send.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// When set, referenced regions only run if selected by name;
    /// `@forceRef` references run regardless.
    pub name_filter: Option<Vec<String>>,
}

/// What one send produced, beyond the response stored on the region.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendReport {
    /// True when the transport call was cooperatively cancelled.
    pub cancelled: bool,
}

/// Executes regions of parsed documents.
pub struct Runner {
    loader: Arc<dyn FileLoader>,
    pipeline: Pipeline,
    warnings: Arc<dyn WarningSink>,
    progress: Option<Arc<dyn ProgressSink>>,
    cancellation: Option<Arc<CancellationRegistry>>,
}

impl Runner {
    /// Runner with the default reqwest-backed transport.
    pub fn new(loader: Arc<dyn FileLoader>) -> Result<Self> {
        let http = init_http_client(&EnvironmentConfig::default());
        Self::with_clients(loader, http, AmqpClient::default())
    }

    /// Runner over explicit protocol clients. The pipeline order (GraphQL
    /// assembly before transport dispatch) is computed here, once.
    pub fn with_clients(
        loader: Arc<dyn FileLoader>,
        http: HttpClient,
        amqp: AmqpClient,
    ) -> Result<Self> {
        let pipeline = Pipeline::new(vec![
            Arc::new(GraphqlAction::new(Arc::clone(&loader))),
            Arc::new(DispatchAction::new(http, amqp)),
        ])?;
        Ok(Self {
            loader,
            pipeline,
            warnings: Arc::new(NullWarningSink),
            progress: None,
            cancellation: None,
        })
    }

    pub fn with_warnings(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancellation(mut self, cancellation: Arc<CancellationRegistry>) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub async fn send(&self, document: &mut Document, region_index: usize) -> Result<SendReport> {
        self.send_with_options(document, region_index, &SendOptions::default())
            .await
    }

    pub async fn send_with_options(
        &self,
        document: &mut Document,
        region_index: usize,
        options: &SendOptions,
    ) -> Result<SendReport> {
        if region_index >= document.regions.len() {
            return Err(Error::internal(format!(
                "region index {region_index} out of bounds for {}",
                document.path.display()
            )));
        }

        let mut resolver = Resolver::new(Arc::clone(&self.loader));
        let resolved = resolver.resolve(document, region_index).await?;
        let mut variables = resolved.variables;

        for prerequisite in &resolved.prerequisites {
            let selected = options.name_filter.as_ref().is_none_or(|filter| {
                filter
                    .iter()
                    .any(|name| prerequisite.region.matches_name(name))
            });
            if !selected && !prerequisite.force {
                debug!(
                    region = prerequisite.region.name.as_deref().unwrap_or("<unnamed>"),
                    "referenced region skipped by selection filter"
                );
                continue;
            }

            let context = self
                .execute_region(&prerequisite.region, &prerequisite.variables)
                .await?;
            // The referenced region's locals become visible to the referrer,
            // and a named region's response body becomes a variable under
            // its name.
            variables.extend_text(prerequisite.region.variables.iter().cloned());
            if let (Some(name), Some(response)) = (&prerequisite.region.name, &context.response) {
                variables.set(name.clone(), response_value(response));
            }
        }

        // Region locals overlay everything else.
        let region = &document.regions[region_index];
        variables.extend_text(region.variables.iter().cloned());

        let mut context = self.execute_region(region, &variables).await?;
        let report = SendReport {
            cancelled: context.cancelled,
        };
        document.regions[region_index].response = context.response.take();
        Ok(report)
    }

    /// Sends every region carrying a request, in document order. A failing
    /// region is reported and does not abort its siblings.
    pub async fn send_all(&self, document: &mut Document) -> Vec<(usize, Result<SendReport>)> {
        let indices: Vec<usize> = document
            .regions
            .iter()
            .enumerate()
            .filter(|(_, region)| region.request.is_some())
            .map(|(index, _)| index)
            .collect();

        let mut results = Vec::with_capacity(indices.len());
        for index in indices {
            let result = self.send(document, index).await;
            if let Err(error) = &result {
                warn!(region = index, error = %error, "region send failed");
            }
            results.push((index, result));
        }
        results
    }

    /// Builds a processor context for one region and runs the pipeline on
    /// it. The context is exclusively owned by this execution.
    async fn execute_region(
        &self,
        region: &Region,
        variables: &VariableSet,
    ) -> Result<ProcessorContext> {
        let request = region
            .request
            .clone()
            .map(|request| interpolate_request(request, variables));
        let repeat = request.as_ref().and_then(|request| request.repeat);

        let mut context = ProcessorContext::new(request);
        context.gql = region.gql.clone();
        context.variables = variables.clone();
        context.repeat = repeat;
        context.warnings = Arc::clone(&self.warnings);
        context.progress = self.progress.clone();
        context.cancellation = self.cancellation.clone();

        self.pipeline.execute(&mut context).await?;
        Ok(context)
    }
}

/// Substitutes `{{expr}}` in the request's address, headers and text body,
/// and prefixes a relative address with the `host` variable.
fn interpolate_request(mut request: Request, variables: &VariableSet) -> Request {
    request.url = replace_variables(&request.url, variables);
    if request.url.starts_with('/') {
        if let Some(Value::String(host)) = variables.get("host") {
            request.url = format!("{host}{}", request.url);
        }
    }
    for (_, value) in request.headers.iter_mut() {
        *value = replace_variables(value, variables);
    }
    if let Some(RequestBody::Text(text)) = &request.body {
        request.body = Some(RequestBody::Text(replace_variables(text, variables)));
    }
    request
}

/// A JSON response body is addressable field by field; anything else is the
/// raw text.
fn response_value(response: &Response) -> Value {
    match &response.body {
        Some(body) => serde_json::from_str(body)
            .unwrap_or_else(|_| Value::String(body.clone())),
        None => Value::Null,
    }
}
