//! Indented JavaScript text output.

use crate::error::InternalError;

/// Spaces per indentation level.
const INDENT: &str = "  ";

/// Accumulates emitted JavaScript, tracking the current indentation.
///
/// The emitter knows nothing about JavaScript; it only concatenates
/// fragments and prefixes lines with the current indentation.
#[derive(Debug, Default)]
pub struct Emitter {
    output: String,
    indent: usize,
}

impl Emitter {
    /// Create an empty emitter at indentation level zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append fragments with no indentation and no newline.
    pub fn write(&mut self, fragments: &[&str]) {
        for fragment in fragments {
            self.output.push_str(fragment);
        }
    }

    /// Append the whitespace for the current indentation level.
    pub fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.output.push_str(INDENT);
        }
    }

    /// Append an indented line made of `fragments`.
    ///
    /// An empty slice writes a blank line without indentation.
    pub fn write_line(&mut self, fragments: &[&str]) {
        if !fragments.is_empty() {
            self.write_indent();
            self.write(fragments);
        }
        self.output.push('\n');
    }

    /// Indent following lines one more level.
    pub fn increase_indent(&mut self) {
        self.indent += 1;
    }

    /// Indent following lines one level less.
    pub fn decrease_indent(&mut self) -> Result<(), InternalError> {
        self.indent = self
            .indent
            .checked_sub(1)
            .ok_or(InternalError::IndentUnderflow)?;
        Ok(())
    }

    /// Current indentation level.
    pub fn indent(&self) -> usize {
        self.indent
    }

    /// Consume the emitter and return the accumulated text.
    pub fn finish(self) -> String {
        self.output
    }
}
