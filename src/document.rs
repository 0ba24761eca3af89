//! # Document Model
//!
//! A parsed request-definition file is a [`Document`]: an ordered sequence of
//! [`Region`]s, each of which may carry one [`Request`], a name, metadata tags
//! and the [`Symbol`]s the parser produced for it. After execution a region
//! additionally carries the normalized [`Response`].
//!
//! Documents are immutable once parsed; re-parsing a file replaces the whole
//! document. Region order is execution order within a document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::pipeline::graphql::GqlRegionData;
use crate::transport::amqp::AmqpProperties;

/// Ordered, multi-valued header list. Order is preserved as written.
pub type Headers = Vec<(String, String)>;

/// A line/offset position within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: usize,
    pub offset: usize,
}

/// The kind of span a [`Symbol`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolKind {
    Request,
    Response,
    Comment,
    Variable,
    Import,
    Reference,
    Gql,
}

/// A typed span within a region: a request line, a response status line,
/// a variable assignment, an import directive and so on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub description: String,
    pub kind: SymbolKind,
    pub start: Pos,
    pub end: Pos,
}

/// Execution order of repeated requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RepeatOrder {
    #[default]
    Sequential,
    Parallel,
}

/// Causes one logical request to be issued `count` times. Earlier attempts'
/// responses are discarded; repeat exists to generate load, not to aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repeat {
    pub count: u32,
    pub order: RepeatOrder,
}

/// Wire protocol a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum Protocol {
    #[default]
    #[strum(serialize = "HTTP")]
    Http,
    #[strum(serialize = "AMQP")]
    Amqp,
}

/// Request body. Anything that is neither text nor binary is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestBody {
    Text(String),
    Binary(Vec<u8>),
}

impl RequestBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RequestBody::Text(text) => Some(text),
            RequestBody::Binary(_) => None,
        }
    }
}

/// An executable request attached to a region.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Request {
    pub protocol: Protocol,
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: Option<RequestBody>,
    /// Broker message properties, only meaningful for AMQP requests.
    pub amqp: Option<AmqpProperties>,
    /// Proxy address. Consumed by the transport client, never forwarded.
    pub proxy: Option<String>,
    pub repeat: Option<Repeat>,
}

impl Request {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// First header value matching `name`, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Echo of the issued request kept on the normalized response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestEcho {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: Option<RequestBody>,
}

/// Timing phases of one transport call, in milliseconds. Phases a transport
/// cannot observe stay `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Timings {
    pub wait: Option<f64>,
    pub dns: Option<f64>,
    pub tcp: Option<f64>,
    pub tls: Option<f64>,
    pub request: Option<f64>,
    pub first_byte: Option<f64>,
    pub download: Option<f64>,
    pub total: Option<f64>,
}

/// Derived response metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    /// Approximate wire size (raw headers + raw body), human readable.
    pub size: String,
}

/// Uniform response shape every transport is normalized into.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response {
    pub status_code: u16,
    pub status_message: Option<String>,
    /// Protocol label with version prefix, e.g. `HTTP/1.1`.
    pub protocol: String,
    /// Version with the protocol prefix stripped, e.g. `1.1`. Both forms are
    /// retained.
    pub http_version: String,
    /// Structured headers: lower-cased name to ordered value list.
    pub headers: HashMap<String, Vec<String>>,
    /// Original flat alternating name/value header array.
    pub raw_headers: Vec<String>,
    pub body: Option<String>,
    pub raw_body: Vec<u8>,
    pub content_type: Option<String>,
    pub timings: Timings,
    /// When the response settled.
    pub timestamp: Option<DateTime<Utc>>,
    pub request: Option<RequestEcho>,
    pub meta: ResponseMeta,
}

impl Response {
    /// First value of a structured header, by lower-cased name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// A named reference to a region defined elsewhere (`@ref` / `@forceRef`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRef {
    pub name: String,
    /// `@forceRef` forces inclusion even when a selection filter would skip
    /// the referenced region.
    pub force: bool,
}

/// A bounded span within a document representing one logical request/response
/// unit or metadata block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub start_line: usize,
    pub end_line: usize,
    pub end_offset: usize,
    /// Name assigned via `@name`.
    pub name: Option<String>,
    /// Remaining `@key value` metadata tags (value-less tags carry `None`).
    pub metadata: Vec<(String, Option<String>)>,
    /// `@import` paths declared in this region.
    pub imports: Vec<String>,
    /// `@ref` / `@forceRef` declarations.
    pub refs: Vec<RegionRef>,
    /// `@key=value` assignments. Local to this region when it is named,
    /// file-global otherwise.
    pub variables: Vec<(String, String)>,
    pub symbols: Vec<Symbol>,
    pub request: Option<Request>,
    pub response: Option<Response>,
    /// GraphQL assembly input when this region carries a GraphQL operation.
    pub gql: Option<GqlRegionData>,
}

impl Region {
    /// True when the region carries nothing addressable and can be dropped.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
            && self.request.is_none()
            && self.imports.is_empty()
            && self.refs.is_empty()
            && self.variables.is_empty()
            && self.metadata.is_empty()
            && self.name.is_none()
    }

    /// True when the region is addressable by some name, via `@name` or a
    /// value-less metadata tag. Addressable regions scope their variables
    /// locally.
    pub fn is_named(&self) -> bool {
        self.name.is_some() || self.metadata.iter().any(|(_, value)| value.is_none())
    }

    /// True when `name` selects this region, either via `@name` or via a
    /// value-less metadata tag of the same name.
    pub fn matches_name(&self, name: &str) -> bool {
        if self.name.as_deref() == Some(name) {
            return true;
        }
        self.metadata
            .iter()
            .any(|(key, value)| key == name && value.is_none())
    }
}

/// One parsed request-definition file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub path: PathBuf,
    pub regions: Vec<Region>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            regions: Vec::new(),
        }
    }

    /// Directory imports and gql file references resolve against.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn region_by_name(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|region| region.matches_name(name))
    }

    /// `@import` paths declared anywhere in the file. Imports apply at file
    /// scope regardless of the region they were written in.
    pub fn import_paths(&self) -> impl Iterator<Item = &str> {
        self.regions
            .iter()
            .flat_map(|region| region.imports.iter())
            .map(String::as_str)
    }

    /// Global-scope variables: assignments in regions addressable by no
    /// name. Visible to every region in the file and to importers; named or
    /// tag-addressable regions contribute theirs only when referenced.
    pub fn global_variables(&self) -> Vec<(String, String)> {
        self.regions
            .iter()
            .filter(|region| !region.is_named())
            .flat_map(|region| region.variables.iter().cloned())
            .collect()
    }
}
