//! Error types for template compilation.

use std::{
    error::Error,
    fmt::{self, Debug, Display},
};

use miette::SourceSpan;
use tmpljs_parse::{NodeKind, ParseError, Pos, Tree};

/// Error returned when templates cannot be compiled.
#[derive(Clone)]
pub struct CompileError {
    /// The specific kind of error
    kind: CompileErrorKind,
    /// Template being compiled when the error occurred
    template: Option<String>,
    /// 1-based line of the offending node
    line: Option<usize>,
    /// Source code for diagnostics
    source_code: Option<String>,
    /// Primary span where the error occurred
    span: Option<SourceSpan>,
}

impl CompileError {
    /// Returns a reference to the error kind for detailed error inspection.
    pub fn kind(&self) -> &CompileErrorKind {
        &self.kind
    }

    /// Name of the template the error belongs to, when known.
    pub fn template(&self) -> Option<&str> {
        match &self.kind {
            CompileErrorKind::Parse(err) => Some(err.template()),
            _ => self.template.as_deref(),
        }
    }

    /// Whether this error is a defect in the compiler rather than in the
    /// template.
    pub fn is_internal(&self) -> bool {
        matches!(self.kind, CompileErrorKind::Internal(_))
    }

    /// A lowering error located at `pos` in `tree`.
    pub(crate) fn lowering(message: impl Into<String>, tree: &Tree, pos: Pos) -> Self {
        let source = tree.source();
        let (line, _) = tree.location(pos);
        let offset = pos.min(source.len());
        CompileError {
            kind: CompileErrorKind::Lowering {
                message: message.into(),
            },
            template: Some(tree.name.clone()),
            line: Some(line),
            source_code: Some(source.to_string()),
            span: Some(SourceSpan::from(offset..offset)),
        }
    }

    /// A lowering error that is not tied to a node, such as a bad namespace.
    pub(crate) fn unlocated(message: impl Into<String>) -> Self {
        CompileErrorKind::Lowering {
            message: message.into(),
        }
        .into()
    }

    /// Attach the template being compiled, unless one is already known.
    pub(crate) fn in_template(mut self, name: &str) -> Self {
        if self.template.is_none() {
            self.template = Some(name.to_string());
        }
        self
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CompileErrorKind::Parse(err) => write!(f, "{err}"),
            CompileErrorKind::Lowering { message } => match (&self.template, self.line) {
                (Some(template), Some(line)) => write!(f, "template: {template}:{line}: {message}"),
                (Some(template), None) => write!(f, "template: {template}: {message}"),
                _ => f.write_str(message),
            },
            CompileErrorKind::Internal(err) => match &self.template {
                Some(template) => write!(f, "{err} (compiling template {template:?})"),
                None => write!(f, "{err}"),
            },
        }
    }
}

impl Debug for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileError")
            .field("kind", &self.kind)
            .field("template", &self.template)
            .field("line", &self.line)
            .field("span", &self.span)
            .finish()
    }
}

impl Error for CompileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            CompileErrorKind::Parse(err) => Some(err),
            CompileErrorKind::Internal(err) => Some(err),
            CompileErrorKind::Lowering { .. } => None,
        }
    }
}

impl From<CompileErrorKind> for CompileError {
    fn from(kind: CompileErrorKind) -> Self {
        CompileError {
            kind,
            template: None,
            line: None,
            source_code: None,
            span: None,
        }
    }
}

impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        CompileErrorKind::Parse(err).into()
    }
}

impl From<InternalError> for CompileError {
    fn from(err: InternalError) -> Self {
        CompileErrorKind::Internal(err).into()
    }
}

/// Classification of compile errors.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CompileErrorKind {
    /// The template source failed to parse.
    Parse(ParseError),
    /// A node is well-formed but has no JavaScript equivalent.
    Lowering {
        /// What went wrong.
        message: String,
    },
    /// The compiler broke one of its own invariants.
    Internal(InternalError),
}

impl CompileErrorKind {
    /// Returns an error code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CompileErrorKind::Parse(err) => err.kind().code(),
            CompileErrorKind::Lowering { .. } => "tmpljs::lowering",
            CompileErrorKind::Internal(err) => err.code(),
        }
    }
}

/// A broken compiler invariant. Never caused by template input alone.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InternalError {
    /// A node kind reached a lowering rule that does not accept it.
    UnexpectedNode {
        /// Kind of the offending node.
        kind: NodeKind,
        /// Position class that was being lowered.
        context: &'static str,
    },
    /// An accumulator frame was popped with none on the stack.
    AccumulatorUnderflow,
    /// An accumulator was needed with none on the stack.
    NoAccumulator,
    /// Indentation was decreased below zero.
    IndentUnderflow,
}

impl InternalError {
    /// Returns an error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            InternalError::UnexpectedNode { .. } => "tmpljs::internal::unexpected_node",
            InternalError::AccumulatorUnderflow => "tmpljs::internal::accumulator_underflow",
            InternalError::NoAccumulator => "tmpljs::internal::no_accumulator",
            InternalError::IndentUnderflow => "tmpljs::internal::indent_underflow",
        }
    }
}

impl Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("internal compiler error: ")?;
        match self {
            InternalError::UnexpectedNode { kind, context } => {
                write!(f, "unexpected {} node in {context} position", kind.as_str())
            }
            InternalError::AccumulatorUnderflow => write!(f, "accumulator stack underflow"),
            InternalError::NoAccumulator => write!(f, "no active accumulator"),
            InternalError::IndentUnderflow => write!(f, "indentation decreased below zero"),
        }
    }
}

impl Error for InternalError {}

// ============================================================================
// Diagnostic Implementation
// ============================================================================

impl miette::Diagnostic for CompileError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        match &self.kind {
            CompileErrorKind::Parse(err) => miette::Diagnostic::source_code(err),
            _ => self
                .source_code
                .as_ref()
                .map(|s| s as &dyn miette::SourceCode),
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        if let CompileErrorKind::Parse(err) = &self.kind {
            return miette::Diagnostic::labels(err);
        }
        let span = self.span?;
        Some(Box::new(std::iter::once(miette::LabeledSpan::at(
            span,
            "cannot be compiled",
        ))))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        match &self.kind {
            CompileErrorKind::Parse(err) => miette::Diagnostic::help(err),
            CompileErrorKind::Internal(_) => Some(Box::new("this is a bug in tmpljs")),
            CompileErrorKind::Lowering { .. } => None,
        }
    }
}
