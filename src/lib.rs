//! # httpfile
//!
//! Executes textual request-definition files against multiple wire
//! protocols: plain HTTP, GraphQL-over-HTTP and AMQP-style messaging.
//! Files may import each other, reference named regions across files and
//! scope variables per file or per region; one logical request can be
//! repeated sequentially or in parallel for load-style execution.
//!
//! ## Processing pipeline
//!
//! ```text
//! Text → Region/Symbol Parser → Document → Resolver → Action Pipeline → Transport → Response
//! ```
//!
//! - [`parser`] turns raw text into the addressable [`document`] model via a
//!   cooperative, ordered set of line parsers.
//! - [`resolve`] handles `@import`, `@ref`/`@forceRef` and variable
//!   visibility across files, with cycle detection.
//! - [`pipeline`] runs protocol/feature actions in one topologically sorted
//!   order per process, including the GraphQL query assembler.
//! - [`transport`] executes the enriched request with repeat, progress and
//!   cancellation semantics and normalizes every protocol-native result
//!   into the uniform [`document::Response`] shape.
//! - [`runner`] is the embedder-facing entry point tying it all together.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use httpfile::{parser, resolve::FsLoader, Runner};
//!
//! let mut document = parser::parse("requests.http", "GET https://example.org/json\n");
//! let runner = Runner::new(Arc::new(FsLoader))?;
//! runner.send(&mut document, 0).await?;
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod io;
pub mod parser;
pub mod pipeline;
pub mod resolve;
pub mod runner;
pub mod transport;
pub mod variables;

pub use error::{Error, Result};
pub use parser::parse;
pub use runner::{Runner, SendOptions, SendReport};
