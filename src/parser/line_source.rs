//! Single-pass line sequence shared by all parser attempts of one pass.

/// One line of the document under parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub index: usize,
    pub text: &'a str,
}

impl Line<'_> {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Non-restartable (index, text) sequence over a document. Parsers pull
/// exactly one line per attempt; the registry marks the position before an
/// attempt and resets it when the parser defers, so a consumed line is never
/// re-delivered to a different parser within the same pass.
#[derive(Debug)]
pub struct LineSource<'a> {
    lines: &'a [&'a str],
    pos: usize,
}

impl<'a> LineSource<'a> {
    pub fn new(lines: &'a [&'a str]) -> Self {
        Self { lines, pos: 0 }
    }

    pub fn next(&mut self) -> Option<Line<'a>> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }

    pub fn peek(&self) -> Option<Line<'a>> {
        self.lines.get(self.pos).map(|text| Line {
            index: self.pos,
            text,
        })
    }

    pub fn mark(&self) -> usize {
        self.pos
    }

    pub fn reset(&mut self, mark: usize) {
        self.pos = mark;
    }

    pub fn is_done(&self) -> bool {
        self.pos >= self.lines.len()
    }
}
