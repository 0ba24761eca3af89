//! Response region parser.
//!
//! Recognizes a response status line (optional leading whitespace, a
//! protocol/version token, a 3-digit status in [100,599], a free-form reason
//! phrase) and then claims every following line of the region as response
//! content by extending the open response symbol. The open-symbol marker is
//! cleared in [`close`](ResponseParser::close) so it never survives a region
//! boundary or a repeated parse.

use regex::Regex;

use crate::document::{Pos, Symbol, SymbolKind};

use super::context::ParserContext;
use super::line_source::LineSource;
use super::parsers::ParseOutcome;

#[derive(Debug)]
pub struct ResponseParser {
    status_line: Regex,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            status_line: Regex::new(r"^\s*(HTTP/\S+)\s+([1-5][0-9][0-9])\s*(.*)$").unwrap(),
        }
    }

    /// Blank lines are opaque continuation once a response is open.
    pub fn supports_empty_line(&self) -> bool {
        true
    }

    pub fn try_consume(
        &self,
        source: &mut LineSource<'_>,
        context: &mut ParserContext,
    ) -> ParseOutcome {
        let Some(line) = source.next() else {
            return ParseOutcome::NotConsumed;
        };

        if let Some(index) = context.open_response {
            let symbol = &mut context.symbols[index];
            symbol.end = Pos {
                line: line.index,
                offset: line.text.len(),
            };
            return ParseOutcome::Consumed {
                end_line: line.index,
            };
        }

        let Some(caps) = self.status_line.captures(line.text) else {
            return ParseOutcome::NotConsumed;
        };
        let status: u16 = caps[2].parse().unwrap_or_default();
        if !(100..=599).contains(&status) {
            return ParseOutcome::NotConsumed;
        }

        context.symbols.push(Symbol {
            name: "response".to_string(),
            description: "response".to_string(),
            kind: SymbolKind::Response,
            start: Pos {
                line: line.index,
                offset: 0,
            },
            end: Pos {
                line: line.index,
                offset: line.text.len(),
            },
        });
        context.open_response = Some(context.symbols.len() - 1);
        ParseOutcome::Consumed {
            end_line: line.index,
        }
    }

    pub fn close(&self, context: &mut ParserContext) {
        context.open_response = None;
    }
}
