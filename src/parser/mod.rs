//! # Region/Symbol Parser
//!
//! Turns raw request-definition text into the addressable [`Document`] model.
//!
//! The registry walks a single-pass [`LineSource`] and offers each line to an
//! ordered list of [`LineParser`] variants. A parser either defers, in which
//! case the next parser sees the same line, or claims lines up to and
//! including a given line; the registry never re-delivers a consumed line to
//! a different parser within the same pass. `###` separators finalize the
//! current region draft, and a blank line closes every parser that does not
//! treat blank lines as opaque continuation. Non-match is not an error:
//! a line no parser claims is skipped with a debug log.

pub mod context;
pub mod line_source;
pub mod parsers;
pub mod response;

use std::path::Path;

use tracing::debug;

use crate::document::Document;
use crate::pipeline::graphql::GqlSource;

pub use context::{ParserContext, RequestState};
pub use line_source::{Line, LineSource};
pub use parsers::{LineParser, ParseOutcome};
pub use response::ResponseParser;

/// Ordered parser registry for one parse pass.
fn registry() -> Vec<LineParser> {
    vec![
        LineParser::Meta(parsers::MetaParser::new()),
        LineParser::Variable(parsers::VariableParser::new()),
        LineParser::Gql(parsers::GqlParser::new()),
        LineParser::Request(parsers::RequestParser::new()),
        LineParser::Response(ResponseParser::new()),
        LineParser::Body(parsers::BodyParser),
    ]
}

/// Parses `text` into a [`Document`]. Parsing is total: unrecognized lines
/// are skipped, and all hard failures (imports, references) belong to
/// resolution, not parsing.
pub fn parse(path: impl AsRef<Path>, text: &str) -> Document {
    let lines: Vec<&str> = text.lines().collect();
    let parsers = registry();
    let mut document = Document::new(path.as_ref());
    let mut document_fragments: Vec<(String, GqlSource)> = Vec::new();

    let mut source = LineSource::new(&lines);
    let mut context = ParserContext::new();
    let mut region_start = 0usize;
    let mut last_consumed = 0usize;

    while let Some(line) = source.peek() {
        if line.text.trim_start().starts_with("###") {
            finalize_region(
                &parsers,
                std::mem::take(&mut context),
                region_start,
                last_consumed,
                &lines,
                &mut document,
                &mut document_fragments,
            );
            source.next();
            region_start = line.index;
            last_consumed = line.index;
            continue;
        }

        // A blank line inside an open fragment block is body content, not a
        // boundary; the gql parser keeps extending the draft.
        if line.is_blank() && context.open_fragment.is_none() {
            for parser in &parsers {
                if !parser.supports_empty_line() {
                    parser.close(&mut context);
                }
            }
            if context.open_response.is_none() {
                match context.request_state {
                    RequestState::Headers => context.request_state = RequestState::Body,
                    RequestState::Body => context.body_lines.push(String::new()),
                    RequestState::Idle => {}
                }
                source.next();
                last_consumed = line.index;
                continue;
            }
        }

        let mut consumed = false;
        for parser in &parsers {
            let mark = source.mark();
            match parser.try_consume(&mut source, &mut context) {
                ParseOutcome::Consumed { end_line } => {
                    last_consumed = end_line;
                    consumed = true;
                    break;
                }
                ParseOutcome::NotConsumed => source.reset(mark),
            }
        }
        if !consumed {
            debug!(line = line.index, text = line.text, "no parser claimed line");
            source.next();
            last_consumed = line.index;
        }
    }

    finalize_region(
        &parsers,
        context,
        region_start,
        last_consumed,
        &lines,
        &mut document,
        &mut document_fragments,
    );
    document
}

#[allow(clippy::too_many_arguments)]
fn finalize_region(
    parsers: &[LineParser],
    mut context: ParserContext,
    start_line: usize,
    end_line: usize,
    lines: &[&str],
    document: &mut Document,
    document_fragments: &mut Vec<(String, GqlSource)>,
) {
    for parser in parsers {
        parser.close(&mut context);
    }
    let end_offset = lines.get(end_line).map(|line| line.len()).unwrap_or(0);
    let dir = document.dir().to_path_buf();
    if let Some(region) =
        context.finalize(start_line, end_line, end_offset, document_fragments, &dir)
    {
        document.regions.push(region);
    }
}
