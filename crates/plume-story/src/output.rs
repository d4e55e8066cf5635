//! Line assembly: text, glue, line breaks and tags.

use std::collections::VecDeque;

/// A finished line of output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    /// The text, trimmed with inner whitespace collapsed.
    pub text: String,
    /// Tags attached while the line was built.
    pub tags: Vec<String>,
}

/// Accumulates text into lines.
///
/// A line break only completes a line that has visible text. Glue
/// suppresses line breaks until more text arrives, and glue directly after
/// a completed line reopens it.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    lines: VecDeque<Line>,
    current: String,
    tags: Vec<String>,
    glue: bool,
    reopenable: bool,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text to the line being built.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.current.push_str(text);
        if !text.trim().is_empty() {
            self.glue = false;
        }
        self.reopenable = false;
    }

    /// Attach a tag to the line being built.
    pub fn push_tag(&mut self, tag: &str) {
        self.tags.push(tag.trim().to_string());
        self.reopenable = false;
    }

    /// A structural line break.
    pub fn line_break(&mut self) {
        if self.glue || self.current.trim().is_empty() {
            return;
        }
        self.complete();
        self.reopenable = true;
    }

    /// Join the next text onto the current line.
    pub fn glue(&mut self) {
        if self.reopenable && self.current.is_empty() {
            if let Some(line) = self.lines.pop_back() {
                self.current = line.text;
                self.tags = line.tags;
            }
        }
        self.reopenable = false;
        self.glue = true;
    }

    /// Complete whatever is pending. Called when the flow stops.
    pub fn flush(&mut self) {
        if !self.current.trim().is_empty() {
            self.complete();
        } else if !self.tags.is_empty() {
            self.current.clear();
            self.lines.push_back(Line {
                text: String::new(),
                tags: std::mem::take(&mut self.tags),
            });
        }
        self.glue = false;
        self.reopenable = false;
    }

    fn complete(&mut self) {
        let text = self.current.split_whitespace().collect::<Vec<_>>().join(" ");
        self.current.clear();
        self.lines.push_back(Line {
            text,
            tags: std::mem::take(&mut self.tags),
        });
    }

    /// Whether a finished line is waiting.
    pub fn has_line(&self) -> bool {
        !self.lines.is_empty()
    }

    /// Take the oldest finished line.
    pub fn pop_line(&mut self) -> Option<Line> {
        self.lines.pop_front()
    }
}
