//! The ordered set of line parsers.
//!
//! Each parser is one variant of the closed [`LineParser`] enum. The registry
//! tries them in priority order per line; a parser either defers
//! ([`ParseOutcome::NotConsumed`], the next parser gets the same line) or
//! claims lines up to and including a given line, optionally publishing
//! symbols into the shared [`ParserContext`].

use regex::Regex;

use crate::document::{Pos, RegionRef, Request, Symbol, SymbolKind};

use super::context::{FragmentDraft, ParserContext, RequestState};
use super::line_source::{Line, LineSource};
use super::response::ResponseParser;

/// Result of one try-consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The line was not recognized; the registry tries the next parser.
    NotConsumed,
    /// Lines up to and including `end_line` now belong to this parser.
    Consumed { end_line: usize },
}

fn symbol(kind: SymbolKind, name: &str, description: &str, line: Line<'_>) -> Symbol {
    Symbol {
        name: name.to_string(),
        description: description.to_string(),
        kind,
        start: Pos {
            line: line.index,
            offset: 0,
        },
        end: Pos {
            line: line.index,
            offset: line.text.len(),
        },
    }
}

/// Comment and metadata lines: `# …`, `# @name X`, `# @import <path>`,
/// `# @ref <name>`, `# @forceRef <name>`, `# @key value`.
#[derive(Debug)]
pub struct MetaParser {
    comment: Regex,
    directive: Regex,
}

impl MetaParser {
    pub fn new() -> Self {
        Self {
            comment: Regex::new(r"^\s*(?:#|//)\s?(.*)$").unwrap(),
            directive: Regex::new(r"^@([\w\-]+)(?:\s+(.+?))?\s*$").unwrap(),
        }
    }

    fn try_consume(&self, source: &mut LineSource<'_>, context: &mut ParserContext) -> ParseOutcome {
        if context.request_state == RequestState::Body {
            return ParseOutcome::NotConsumed;
        }
        let Some(line) = source.next() else {
            return ParseOutcome::NotConsumed;
        };
        let Some(caps) = self.comment.captures(line.text) else {
            return ParseOutcome::NotConsumed;
        };
        let content = caps[1].trim().to_string();

        match self.directive.captures(&content) {
            Some(directive) => {
                let key = directive[1].to_string();
                let value = directive.get(2).map(|m| m.as_str().trim().to_string());
                self.apply(context, &key, value, line);
            }
            None => {
                context
                    .symbols
                    .push(symbol(SymbolKind::Comment, "comment", &content, line));
            }
        }
        ParseOutcome::Consumed {
            end_line: line.index,
        }
    }

    fn apply(&self, context: &mut ParserContext, key: &str, value: Option<String>, line: Line<'_>) {
        match (key, value) {
            ("name", Some(name)) => {
                context
                    .symbols
                    .push(symbol(SymbolKind::Comment, "name", &name, line));
                context.name = Some(name);
            }
            ("import", Some(path)) => {
                context
                    .symbols
                    .push(symbol(SymbolKind::Import, "import", &path, line));
                context.imports.push(path);
            }
            ("ref", Some(name)) => {
                context
                    .symbols
                    .push(symbol(SymbolKind::Reference, "ref", &name, line));
                context.refs.push(RegionRef { name, force: false });
            }
            ("forceRef", Some(name)) => {
                context
                    .symbols
                    .push(symbol(SymbolKind::Reference, "forceRef", &name, line));
                context.refs.push(RegionRef { name, force: true });
            }
            (key, value) => {
                context
                    .symbols
                    .push(symbol(
                        SymbolKind::Comment,
                        key,
                        value.as_deref().unwrap_or(""),
                        line,
                    ));
                context.metadata.push((key.to_string(), value));
            }
        }
    }
}

/// Variable assignment lines: `@key=value`.
#[derive(Debug)]
pub struct VariableParser {
    assignment: Regex,
}

impl VariableParser {
    pub fn new() -> Self {
        Self {
            assignment: Regex::new(r"^\s*@([\w\-]+)\s*=\s*(.*)$").unwrap(),
        }
    }

    fn try_consume(&self, source: &mut LineSource<'_>, context: &mut ParserContext) -> ParseOutcome {
        if context.request_state == RequestState::Body {
            return ParseOutcome::NotConsumed;
        }
        let Some(line) = source.next() else {
            return ParseOutcome::NotConsumed;
        };
        let Some(caps) = self.assignment.captures(line.text) else {
            return ParseOutcome::NotConsumed;
        };
        let name = caps[1].to_string();
        let value = caps[2].trim().to_string();
        context
            .symbols
            .push(symbol(SymbolKind::Variable, &name, &value, line));
        context.variables.push((name, value));
        ParseOutcome::Consumed {
            end_line: line.index,
        }
    }
}

/// GraphQL directives ahead of the request line: `gql <Name> < <path>`
/// fragment/operation imports and inline `fragment Name on Type { … }`
/// definitions.
#[derive(Debug)]
pub struct GqlParser {
    import: Regex,
    fragment: Regex,
}

impl GqlParser {
    pub fn new() -> Self {
        Self {
            import: Regex::new(r"^\s*gql\s+([\w\-]+)\s*<\s*(.+?)\s*$").unwrap(),
            fragment: Regex::new(r"^\s*fragment\s+([A-Za-z_][A-Za-z0-9_]*)\s+on\b").unwrap(),
        }
    }

    fn try_consume(&self, source: &mut LineSource<'_>, context: &mut ParserContext) -> ParseOutcome {
        if context.request.is_some() {
            return ParseOutcome::NotConsumed;
        }
        let Some(line) = source.next() else {
            return ParseOutcome::NotConsumed;
        };

        if context.open_fragment.is_some() {
            Self::extend_fragment(context, line);
            return ParseOutcome::Consumed {
                end_line: line.index,
            };
        }

        if let Some(caps) = self.import.captures(line.text) {
            let name = caps[1].to_string();
            let path = caps[2].to_string();
            context
                .symbols
                .push(symbol(SymbolKind::Gql, &name, &path, line));
            context.gql_files.push((name, path));
            return ParseOutcome::Consumed {
                end_line: line.index,
            };
        }

        if let Some(caps) = self.fragment.captures(line.text) {
            let name = caps[1].to_string();
            context
                .symbols
                .push(symbol(SymbolKind::Gql, "fragment", &name, line));
            context.open_fragment = Some(FragmentDraft {
                name,
                lines: Vec::new(),
                depth: 0,
                opened: false,
            });
            Self::extend_fragment(context, line);
            return ParseOutcome::Consumed {
                end_line: line.index,
            };
        }

        ParseOutcome::NotConsumed
    }

    fn extend_fragment(context: &mut ParserContext, line: Line<'_>) {
        let draft = context
            .open_fragment
            .as_mut()
            .expect("extend_fragment requires an open fragment");
        draft.lines.push(line.text.to_string());
        for ch in line.text.chars() {
            match ch {
                '{' => {
                    draft.depth += 1;
                    draft.opened = true;
                }
                '}' => draft.depth -= 1,
                _ => {}
            }
        }
        if draft.opened && draft.depth <= 0 {
            context.finish_fragment();
        }
    }

    fn close(&self, context: &mut ParserContext) {
        context.finish_fragment();
    }
}

/// Request lines (`GET <url> [version]`, the `GRAPHQL <url>` alias) and the
/// header lines that follow them.
#[derive(Debug)]
pub struct RequestParser {
    request_line: Regex,
    header: Regex,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            request_line: Regex::new(
                r"^\s*(GET|POST|PUT|DELETE|PATCH|HEAD|OPTIONS|TRACE|CONNECT|GRAPHQL)\s+(\S+)(?:\s+(HTTP/\S+))?\s*$",
            )
            .unwrap(),
            header: Regex::new(r"^\s*([\w\-]+)\s*:\s*(.*)$").unwrap(),
        }
    }

    fn try_consume(&self, source: &mut LineSource<'_>, context: &mut ParserContext) -> ParseOutcome {
        let Some(line) = source.next() else {
            return ParseOutcome::NotConsumed;
        };

        if let Some(request) = context.request.as_mut() {
            if context.request_state != RequestState::Headers {
                return ParseOutcome::NotConsumed;
            }
            let Some(caps) = self.header.captures(line.text) else {
                return ParseOutcome::NotConsumed;
            };
            request
                .headers
                .push((caps[1].to_string(), caps[2].trim().to_string()));
            return ParseOutcome::Consumed {
                end_line: line.index,
            };
        }

        let Some(caps) = self.request_line.captures(line.text) else {
            return ParseOutcome::NotConsumed;
        };
        let mut method = caps[1].to_string();
        let url = caps[2].to_string();
        if method == "GRAPHQL" {
            method = "POST".to_string();
            context.graphql_alias = true;
        }
        context
            .symbols
            .push(symbol(SymbolKind::Request, &method, &url, line));
        context.request = Some(Request::new(method, url));
        context.request_state = RequestState::Headers;
        ParseOutcome::Consumed {
            end_line: line.index,
        }
    }
}

/// Fallback body accumulator: once a request is open, every line that no
/// earlier parser claimed belongs to the body.
#[derive(Debug, Default)]
pub struct BodyParser;

impl BodyParser {
    fn try_consume(&self, source: &mut LineSource<'_>, context: &mut ParserContext) -> ParseOutcome {
        if context.request.is_none() {
            return ParseOutcome::NotConsumed;
        }
        let Some(line) = source.next() else {
            return ParseOutcome::NotConsumed;
        };
        context.request_state = RequestState::Body;
        context.body_lines.push(line.text.to_string());
        ParseOutcome::Consumed {
            end_line: line.index,
        }
    }
}

/// Enumerated, ordered list of parser variants. Priority order is the
/// declaration order used by [`super::parse`]; there is no open-ended
/// dispatch.
#[derive(Debug)]
pub enum LineParser {
    Meta(MetaParser),
    Variable(VariableParser),
    Gql(GqlParser),
    Request(RequestParser),
    Response(ResponseParser),
    Body(BodyParser),
}

impl LineParser {
    /// Whether a blank line is opaque continuation for this parser. The
    /// registry closes parsers that answer `false` at a blank-line boundary.
    pub fn supports_empty_line(&self) -> bool {
        match self {
            LineParser::Response(parser) => parser.supports_empty_line(),
            LineParser::Body(_) => true,
            LineParser::Meta(_) | LineParser::Variable(_) | LineParser::Gql(_)
            | LineParser::Request(_) => false,
        }
    }

    pub fn try_consume(
        &self,
        source: &mut LineSource<'_>,
        context: &mut ParserContext,
    ) -> ParseOutcome {
        match self {
            LineParser::Meta(parser) => parser.try_consume(source, context),
            LineParser::Variable(parser) => parser.try_consume(source, context),
            LineParser::Gql(parser) => parser.try_consume(source, context),
            LineParser::Request(parser) => parser.try_consume(source, context),
            LineParser::Response(parser) => parser.try_consume(source, context),
            LineParser::Body(parser) => parser.try_consume(source, context),
        }
    }

    /// Invoked when the enclosing region or document scan terminates.
    pub fn close(&self, context: &mut ParserContext) {
        match self {
            LineParser::Response(parser) => parser.close(context),
            LineParser::Gql(parser) => parser.close(context),
            LineParser::Meta(_) | LineParser::Variable(_) | LineParser::Request(_)
            | LineParser::Body(_) => {}
        }
    }
}
