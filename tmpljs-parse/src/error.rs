//! Error types for template parsing.

use std::{
    error::Error,
    fmt::{self, Debug, Display},
};

use miette::SourceSpan;

use crate::ast::{Pos, location};

/// Error returned when a template source cannot be parsed.
#[derive(Clone)]
pub struct ParseError {
    /// The specific kind of error
    pub(crate) kind: ParseErrorKind,
    /// Name of the top-level template being parsed
    pub(crate) template: String,
    /// 1-based line of the offending token
    pub(crate) line: usize,
    /// Source code for diagnostics
    pub(crate) source_code: Option<String>,
    /// Primary span where the error occurred
    pub(crate) span: Option<SourceSpan>,
}

impl ParseError {
    /// Returns a reference to the error kind for detailed error inspection.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Name of the template whose source failed to parse.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// 1-based line number of the error.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Byte span of the error, when known.
    pub fn span(&self) -> Option<SourceSpan> {
        self.span
    }

    /// Create an error located at `pos` in `source`.
    pub(crate) fn at(kind: ParseErrorKind, template: &str, source: &str, pos: Pos) -> Self {
        let (line, _) = location(source, pos);
        ParseError {
            kind,
            template: template.to_string(),
            line,
            source_code: Some(source.to_string()),
            span: Some(SourceSpan::from(pos.min(source.len())..pos.min(source.len()))),
        }
    }

    /// Widen the span to `len` bytes.
    pub(crate) fn with_len(mut self, len: usize) -> Self {
        if let Some(span) = self.span {
            self.span = Some(SourceSpan::new(span.offset().into(), len));
        }
        self
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "template: {}:{}: {}", self.template, self.line, self.kind)
    }
}

impl Debug for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseError")
            .field("kind", &self.kind)
            .field("template", &self.template)
            .field("line", &self.line)
            .field("span", &self.span)
            .finish()
    }
}

impl Error for ParseError {}

/// Detailed classification of parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseErrorKind {
    // Lexical errors
    /// End of input inside an action.
    UnclosedAction,
    /// `/*` without `*/`.
    UnclosedComment,
    /// `*/` not immediately followed by the right delimiter.
    CommentEndsBeforeDelimiter,
    /// Right delimiter reached with open parentheses.
    UnclosedLeftParen,
    /// `)` without a matching `(`.
    UnexpectedRightParen,
    /// `:` not followed by `=`.
    ExpectedDeclare,
    /// Double-quoted string not closed on the same line.
    UnterminatedString,
    /// Raw string not closed.
    UnterminatedRawString,
    /// Character constant not closed.
    UnterminatedChar,
    /// Character that cannot follow a word.
    BadCharacter(char),
    /// Character that cannot appear in an action.
    UnrecognizedCharacter(char),
    /// Malformed numeric literal.
    BadNumber(String),
    /// Numeric literal that does not denote a value.
    IllegalNumber(String),
    /// Quoted literal whose escapes are invalid.
    InvalidQuoted {
        /// Literal as written.
        literal: String,
        /// What went wrong.
        reason: String,
    },

    // Syntax errors
    /// Token that does not belong where it was found.
    Unexpected {
        /// Description of the token.
        found: String,
        /// Construct being parsed.
        context: String,
    },
    /// `{{end}}` or `{{else}}` without an open construct.
    UnexpectedClause(String),
    /// Input ended inside a construct.
    UnexpectedEof,
    /// A second `{{else}}` where `{{end}}` was required.
    ExpectedEnd(String),
    /// Identifier not in the function table.
    UnknownFunction {
        /// The unknown name.
        name: String,
        /// Closest known name, if any is close.
        suggestion: Option<String>,
    },
    /// Variable used before declaration.
    UndefinedVariable(String),
    /// Pipeline without commands.
    MissingValue(String),
    /// Command without operands.
    EmptyCommand,
    /// A later pipeline stage starting with a constant or dot (1-based stage).
    NonExecutableStage(usize),
    /// More variables than the construct allows.
    TooManyDeclarations(String),
    /// Range declaration list followed by something other than a variable.
    RangeDeclarations,
    /// Field access on a constant or dot, such as `"x".Y`.
    DotAfterTerm(String),
    /// `{{break}}` outside of a range body.
    BreakOutsideRange,
    /// `{{continue}}` outside of a range body.
    ContinueOutsideRange,
    /// Two non-empty definitions of one template name.
    MultipleDefinition(String),
}

impl ParseErrorKind {
    /// Returns an error code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ParseErrorKind::UnclosedAction => "tmpljs::parse::unclosed_action",
            ParseErrorKind::UnclosedComment => "tmpljs::parse::unclosed_comment",
            ParseErrorKind::CommentEndsBeforeDelimiter => "tmpljs::parse::comment_delimiter",
            ParseErrorKind::UnclosedLeftParen => "tmpljs::parse::unclosed_paren",
            ParseErrorKind::UnexpectedRightParen => "tmpljs::parse::unexpected_paren",
            ParseErrorKind::ExpectedDeclare => "tmpljs::parse::expected_declare",
            ParseErrorKind::UnterminatedString => "tmpljs::parse::unterminated_string",
            ParseErrorKind::UnterminatedRawString => "tmpljs::parse::unterminated_raw_string",
            ParseErrorKind::UnterminatedChar => "tmpljs::parse::unterminated_char",
            ParseErrorKind::BadCharacter(_) => "tmpljs::parse::bad_character",
            ParseErrorKind::UnrecognizedCharacter(_) => "tmpljs::parse::unrecognized_character",
            ParseErrorKind::BadNumber(_) => "tmpljs::parse::bad_number",
            ParseErrorKind::IllegalNumber(_) => "tmpljs::parse::illegal_number",
            ParseErrorKind::InvalidQuoted { .. } => "tmpljs::parse::invalid_quoted",
            ParseErrorKind::Unexpected { .. } => "tmpljs::parse::unexpected",
            ParseErrorKind::UnexpectedClause(_) => "tmpljs::parse::unexpected_clause",
            ParseErrorKind::UnexpectedEof => "tmpljs::parse::unexpected_eof",
            ParseErrorKind::ExpectedEnd(_) => "tmpljs::parse::expected_end",
            ParseErrorKind::UnknownFunction { .. } => "tmpljs::parse::unknown_function",
            ParseErrorKind::UndefinedVariable(_) => "tmpljs::parse::undefined_variable",
            ParseErrorKind::MissingValue(_) => "tmpljs::parse::missing_value",
            ParseErrorKind::EmptyCommand => "tmpljs::parse::empty_command",
            ParseErrorKind::NonExecutableStage(_) => "tmpljs::parse::non_executable_stage",
            ParseErrorKind::TooManyDeclarations(_) => "tmpljs::parse::too_many_declarations",
            ParseErrorKind::RangeDeclarations => "tmpljs::parse::range_declarations",
            ParseErrorKind::DotAfterTerm(_) => "tmpljs::parse::dot_after_term",
            ParseErrorKind::BreakOutsideRange => "tmpljs::parse::break_outside_range",
            ParseErrorKind::ContinueOutsideRange => "tmpljs::parse::continue_outside_range",
            ParseErrorKind::MultipleDefinition(_) => "tmpljs::parse::multiple_definition",
        }
    }
}

impl Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::UnclosedAction => write!(f, "unclosed action"),
            ParseErrorKind::UnclosedComment => write!(f, "unclosed comment"),
            ParseErrorKind::CommentEndsBeforeDelimiter => {
                write!(f, "comment ends before closing delimiter")
            }
            ParseErrorKind::UnclosedLeftParen => write!(f, "unclosed left paren"),
            ParseErrorKind::UnexpectedRightParen => write!(f, "unexpected right paren"),
            ParseErrorKind::ExpectedDeclare => write!(f, "expected :="),
            ParseErrorKind::UnterminatedString => write!(f, "unterminated quoted string"),
            ParseErrorKind::UnterminatedRawString => write!(f, "unterminated raw quoted string"),
            ParseErrorKind::UnterminatedChar => write!(f, "unterminated character constant"),
            ParseErrorKind::BadCharacter(c) => write!(f, "bad character {c:?}"),
            ParseErrorKind::UnrecognizedCharacter(c) => {
                write!(f, "unrecognized character in action: {c:?}")
            }
            ParseErrorKind::BadNumber(text) => write!(f, "bad number syntax: {text:?}"),
            ParseErrorKind::IllegalNumber(text) => write!(f, "illegal number syntax: {text:?}"),
            ParseErrorKind::InvalidQuoted { literal, reason } => {
                write!(f, "invalid literal {literal}: {reason}")
            }
            ParseErrorKind::Unexpected { found, context } => {
                write!(f, "unexpected {found} in {context}")
            }
            ParseErrorKind::UnexpectedClause(clause) => write!(f, "unexpected {clause}"),
            ParseErrorKind::UnexpectedEof => write!(f, "unexpected EOF"),
            ParseErrorKind::ExpectedEnd(found) => write!(f, "expected end; found {found}"),
            ParseErrorKind::UnknownFunction { name, suggestion } => {
                write!(f, "function {name:?} not defined")?;
                if let Some(suggestion) = suggestion {
                    write!(f, " (did you mean {suggestion:?}?)")?;
                }
                Ok(())
            }
            ParseErrorKind::UndefinedVariable(name) => write!(f, "undefined variable {name:?}"),
            ParseErrorKind::MissingValue(context) => write!(f, "missing value for {context}"),
            ParseErrorKind::EmptyCommand => write!(f, "empty command"),
            ParseErrorKind::NonExecutableStage(stage) => {
                write!(f, "non executable command in pipeline stage {stage}")
            }
            ParseErrorKind::TooManyDeclarations(context) => {
                write!(f, "too many declarations in {context}")
            }
            ParseErrorKind::RangeDeclarations => write!(f, "range can only initialize variables"),
            ParseErrorKind::DotAfterTerm(term) => write!(f, "unexpected . after term {term:?}"),
            ParseErrorKind::BreakOutsideRange => write!(f, "{{{{break}}}} outside {{{{range}}}}"),
            ParseErrorKind::ContinueOutsideRange => {
                write!(f, "{{{{continue}}}} outside {{{{range}}}}")
            }
            ParseErrorKind::MultipleDefinition(name) => {
                write!(f, "multiple definition of template {name:?}")
            }
        }
    }
}

// ============================================================================
// Diagnostic Implementation
// ============================================================================

impl miette::Diagnostic for ParseError {
    fn code<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        self.source_code
            .as_ref()
            .map(|s| s as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        let span = self.span?;
        let label = match &self.kind {
            ParseErrorKind::UnknownFunction { name, .. } => format!("unknown function `{name}`"),
            ParseErrorKind::UndefinedVariable(name) => format!("`{name}` is not declared"),
            ParseErrorKind::UnclosedAction => "action opened here".to_string(),
            _ => "error occurred here".to_string(),
        };
        Some(Box::new(std::iter::once(miette::LabeledSpan::at(
            span, label,
        ))))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        match &self.kind {
            ParseErrorKind::UnknownFunction {
                suggestion: Some(suggestion),
                ..
            } => Some(Box::new(format!("did you mean `{suggestion}`?"))),
            ParseErrorKind::UnknownFunction { .. } => Some(Box::new(
                "register the function with the compiler before parsing",
            )),
            ParseErrorKind::BreakOutsideRange | ParseErrorKind::ContinueOutsideRange => {
                Some(Box::new("only valid inside the body of a {{range}}"))
            }
            _ => None,
        }
    }
}
