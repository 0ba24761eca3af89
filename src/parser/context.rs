//! Parser-invocation-scoped shared state.
//!
//! One [`ParserContext`] exists per region draft within one parse pass. The
//! open-symbol marker for the response parser lives here as an explicit typed
//! field, never in a global and never in a stringly data bag, so state cannot
//! leak across documents or repeated parses.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::document::{Region, RegionRef, Request, RequestBody, Symbol};
use crate::pipeline::graphql::{GqlRegionData, GqlSource};

/// Where request parsing currently stands within the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Headers,
    Body,
}

/// An inline `fragment Name on Type { … }` block under construction.
#[derive(Debug, Clone)]
pub struct FragmentDraft {
    pub name: String,
    pub lines: Vec<String>,
    pub depth: i32,
    pub opened: bool,
}

/// Shared state for one region draft of one parse pass.
#[derive(Debug, Default)]
pub struct ParserContext {
    pub symbols: Vec<Symbol>,
    /// Index into `symbols` of the open response symbol. Exclusively owned by
    /// the response parser until it is explicitly closed.
    pub open_response: Option<usize>,
    pub name: Option<String>,
    pub metadata: Vec<(String, Option<String>)>,
    pub imports: Vec<String>,
    pub refs: Vec<RegionRef>,
    pub variables: Vec<(String, String)>,
    pub request: Option<Request>,
    pub request_state: RequestState,
    pub body_lines: Vec<String>,
    /// Set by the `GRAPHQL <url>` request-line alias.
    pub graphql_alias: bool,
    /// `gql <Name> < <path>` imports collected in this region.
    pub gql_files: Vec<(String, String)>,
    pub open_fragment: Option<FragmentDraft>,
    /// Completed inline fragment definitions, in order of appearance.
    pub fragments: Vec<(String, String)>,
}

impl ParserContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a finished fragment draft into the completed list.
    pub fn finish_fragment(&mut self) {
        if let Some(draft) = self.open_fragment.take() {
            self.fragments.push((draft.name, draft.lines.join("\n")));
        }
    }

    /// Turns the accumulated state into a [`Region`], folding this region's
    /// fragment definitions into the document-wide fragment list. Returns
    /// `None` for regions that carry nothing addressable.
    pub fn finalize(
        mut self,
        start_line: usize,
        end_line: usize,
        end_offset: usize,
        document_fragments: &mut Vec<(String, GqlSource)>,
        document_dir: &Path,
    ) -> Option<Region> {
        self.finish_fragment();
        for (name, text) in self.fragments.drain(..) {
            document_fragments.push((name, GqlSource::Literal(text)));
        }
        for (name, path) in self.gql_files.drain(..) {
            let resolved = join_path(document_dir, &path);
            document_fragments.push((name, GqlSource::File(resolved)));
        }

        let body = body_text(&self.body_lines);
        let mut request = self.request;
        let mut gql = None;
        if let Some(req) = request.as_mut() {
            match body {
                Some(body) if self.graphql_alias || is_gql_operation(&body) => {
                    let (query, variables) = split_gql_body(&body);
                    req.body = variables.map(RequestBody::Text);
                    gql = Some(GqlRegionData {
                        operation_name: operation_name(&query),
                        query: Some(GqlSource::Literal(query)),
                        fragments: document_fragments.clone(),
                    });
                }
                Some(body) => req.body = Some(RequestBody::Text(body)),
                None => {}
            }
        }

        let region = Region {
            start_line,
            end_line,
            end_offset,
            name: self.name,
            metadata: self.metadata,
            imports: self.imports,
            refs: self.refs,
            variables: self.variables,
            symbols: self.symbols,
            request,
            response: None,
            gql,
        };
        if region.is_empty() { None } else { Some(region) }
    }
}

/// Joins a directive path against the document directory, stripping a leading
/// `./` so in-memory loaders see stable keys.
pub fn join_path(dir: &Path, path: &str) -> PathBuf {
    let trimmed = path.trim().trim_start_matches("./");
    dir.join(trimmed)
}

fn body_text(lines: &[String]) -> Option<String> {
    let leading_blank = lines
        .iter()
        .take_while(|line| line.trim().is_empty())
        .count();
    if leading_blank == lines.len() {
        return None;
    }
    let trailing_blank = lines
        .iter()
        .rev()
        .take_while(|line| line.trim().is_empty())
        .count();
    let kept = &lines[leading_blank..lines.len() - trailing_blank];
    if kept.is_empty() {
        None
    } else {
        Some(kept.join("\n"))
    }
}

fn is_gql_operation(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with("query")
        || trimmed.starts_with("mutation")
        || trimmed.starts_with("subscription")
}

fn operation_name(query: &str) -> Option<String> {
    let pattern = Regex::new(r"^\s*(?:query|mutation|subscription)\s+([A-Za-z_][A-Za-z0-9_]*)")
        .unwrap();
    pattern
        .captures(query)
        .map(|caps| caps[1].to_string())
}

/// Splits a GraphQL region body into the operation text and the JSON object
/// immediately trailing it, which is interpreted as its `variables`.
fn split_gql_body(body: &str) -> (String, Option<String>) {
    let mut depth: i32 = 0;
    let mut opened = false;
    for (index, ch) in body.char_indices() {
        match ch {
            '{' => {
                depth += 1;
                opened = true;
            }
            '}' => {
                depth -= 1;
                if opened && depth == 0 {
                    let query = body[..=index].trim_end().to_string();
                    let rest = body[index + 1..].trim();
                    if rest.starts_with('{') {
                        return (query, Some(rest.to_string()));
                    }
                    return (query, None);
                }
            }
            _ => {}
        }
    }
    (body.trim_end().to_string(), None)
}
