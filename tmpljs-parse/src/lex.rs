//! Lexical scanning of template sources.
//!
//! The lexer is pull-based: the parser asks for one item at a time and the
//! lexer runs its state functions until one of them produces an item. Text
//! outside actions is scanned in one go up to the next left delimiter.

use std::fmt::{self, Display};

use crate::ast::{Pos, is_space};
use crate::error::{ParseError, ParseErrorKind};

const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";
/// Length of `- ` / ` -`.
const TRIM_MARKER_LEN: usize = 2;

/// Kind of a lexed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemKind {
    Text,
    LeftDelim,
    RightDelim,
    Space,
    Identifier,
    Field,
    Variable,
    String,
    RawString,
    CharConstant,
    Number,
    Complex,
    Bool,
    Dot,
    Nil,
    Pipe,
    LeftParen,
    RightParen,
    Declare,
    Assign,
    /// Printable ASCII character not otherwise classified, such as `,`.
    Char,
    // keywords
    Block,
    Break,
    Continue,
    Define,
    Else,
    End,
    If,
    Range,
    Template,
    With,
    Eof,
}

impl ItemKind {
    fn is_keyword(self) -> bool {
        matches!(
            self,
            ItemKind::Block
                | ItemKind::Break
                | ItemKind::Continue
                | ItemKind::Define
                | ItemKind::Else
                | ItemKind::End
                | ItemKind::If
                | ItemKind::Range
                | ItemKind::Template
                | ItemKind::With
                | ItemKind::Dot
                | ItemKind::Nil
        )
    }
}

fn keyword(word: &str) -> Option<ItemKind> {
    Some(match word {
        "." => ItemKind::Dot,
        "block" => ItemKind::Block,
        "break" => ItemKind::Break,
        "continue" => ItemKind::Continue,
        "define" => ItemKind::Define,
        "else" => ItemKind::Else,
        "end" => ItemKind::End,
        "if" => ItemKind::If,
        "range" => ItemKind::Range,
        "nil" => ItemKind::Nil,
        "template" => ItemKind::Template,
        "with" => ItemKind::With,
        _ => return None,
    })
}

/// A token together with its position and text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Item<'a> {
    pub kind: ItemKind,
    pub pos: Pos,
    pub val: &'a str,
}

impl Item<'_> {
    pub(crate) const EOF: Item<'static> = Item {
        kind: ItemKind::Eof,
        pos: 0,
        val: "",
    };
}

impl Display for Item<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == ItemKind::Eof {
            return f.write_str("EOF");
        }
        if self.kind.is_keyword() {
            return write!(f, "<{}>", self.val);
        }
        if self.val.chars().count() > 10 {
            let head: String = self.val.chars().take(10).collect();
            return write!(f, "{head:?}...");
        }
        write!(f, "{:?}", self.val)
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Text,
    LeftDelim,
    Comment,
    InsideAction,
    RightDelim,
    Space,
    Identifier,
    Field,
    Variable,
    Char,
    Number,
    Quote,
    RawQuote,
}

enum Step<'a> {
    Next(State),
    Emit(Item<'a>),
}

type LexResult<'a> = Result<Step<'a>, ParseError>;

/// Scanner over one template source.
pub(crate) struct Lexer<'a> {
    name: &'a str,
    input: &'a str,
    left_delim: &'a str,
    right_delim: &'a str,
    /// Current position.
    pos: usize,
    /// Start of the item being scanned.
    start: usize,
    /// Width of the last char read, for `backup`.
    width: usize,
    paren_depth: usize,
    inside_action: bool,
    break_ok: bool,
    continue_ok: bool,
}

impl<'a> Lexer<'a> {
    /// Create a lexer. `name` is only used in error messages.
    pub(crate) fn new(
        name: &'a str,
        input: &'a str,
        left_delim: &'a str,
        right_delim: &'a str,
    ) -> Self {
        Self {
            name,
            input,
            left_delim,
            right_delim,
            pos: 0,
            start: 0,
            width: 0,
            paren_depth: 0,
            inside_action: false,
            break_ok: true,
            continue_ok: true,
        }
    }

    /// Whether `break` and `continue` are keywords. When the function table
    /// defines a function with that name it wins and the word lexes as an
    /// identifier.
    pub(crate) fn with_loop_keywords(mut self, break_ok: bool, continue_ok: bool) -> Self {
        self.break_ok = break_ok;
        self.continue_ok = continue_ok;
        self
    }

    /// Scan the next item. Once the input is exhausted every call returns EOF.
    pub(crate) fn next_item(&mut self) -> Result<Item<'a>, ParseError> {
        let mut state = if self.inside_action {
            State::InsideAction
        } else {
            State::Text
        };
        loop {
            let step = match state {
                State::Text => self.lex_text(),
                State::LeftDelim => self.lex_left_delim(),
                State::Comment => self.lex_comment(),
                State::InsideAction => self.lex_inside_action(),
                State::RightDelim => self.lex_right_delim(),
                State::Space => self.lex_space(),
                State::Identifier => self.lex_identifier(),
                State::Field => self.lex_field_or_variable(ItemKind::Field),
                State::Variable => self.lex_variable(),
                State::Char => self.lex_char(),
                State::Number => self.lex_number(),
                State::Quote => self.lex_quote(),
                State::RawQuote => self.lex_raw_quote(),
            }?;
            match step {
                Step::Next(next) => state = next,
                Step::Emit(item) => return Ok(item),
            }
        }
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn next_char(&mut self) -> Option<char> {
        match self.rest().chars().next() {
            Some(c) => {
                self.width = c.len_utf8();
                self.pos += self.width;
                Some(c)
            }
            None => {
                self.width = 0;
                None
            }
        }
    }

    /// Step back one char. Only valid once per call of `next_char`.
    fn backup(&mut self) {
        self.pos -= self.width;
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn ignore(&mut self) {
        self.start = self.pos;
    }

    fn accept(&mut self, valid: &str) -> bool {
        match self.next_char() {
            Some(c) if valid.contains(c) => true,
            _ => {
                self.backup();
                false
            }
        }
    }

    fn accept_run(&mut self, valid: &str) {
        while let Some(c) = self.next_char() {
            if !valid.contains(c) {
                self.backup();
                return;
            }
        }
    }

    fn this_item(&mut self, kind: ItemKind) -> Item<'a> {
        let item = Item {
            kind,
            pos: self.start,
            val: &self.input[self.start..self.pos],
        };
        self.start = self.pos;
        item
    }

    fn emit(&mut self, kind: ItemKind) -> LexResult<'a> {
        Ok(Step::Emit(self.this_item(kind)))
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::at(kind, self.name, self.input, self.start)
    }

    /// Whether the input is at the right delimiter, and whether a trim
    /// marker precedes it.
    fn at_right_delim(&self) -> (bool, bool) {
        let rest = self.rest();
        if has_right_trim_marker(rest) && rest[TRIM_MARKER_LEN..].starts_with(self.right_delim) {
            return (true, true);
        }
        (rest.starts_with(self.right_delim), false)
    }

    /// Whether the next char can end a word.
    fn at_terminator(&self) -> bool {
        match self.peek() {
            None => true,
            Some(c) if is_space(c) => true,
            Some('.' | ',' | '|' | ':' | ')' | '(') => true,
            Some(_) => self.rest().starts_with(self.right_delim),
        }
    }

    // ------------------------------------------------------------------
    // States
    // ------------------------------------------------------------------

    fn lex_text(&mut self) -> LexResult<'a> {
        if let Some(x) = self.rest().find(self.left_delim) {
            if x > 0 {
                self.pos += x;
                let delim_end = self.pos + self.left_delim.len();
                let trim_len = if has_left_trim_marker(&self.input[delim_end..]) {
                    right_trim_length(&self.input[self.start..self.pos])
                } else {
                    0
                };
                self.pos -= trim_len;
                let item = self.this_item(ItemKind::Text);
                self.pos += trim_len;
                self.ignore();
                if !item.val.is_empty() {
                    return Ok(Step::Emit(item));
                }
            }
            return Ok(Step::Next(State::LeftDelim));
        }
        self.pos = self.input.len();
        if self.pos > self.start {
            return self.emit(ItemKind::Text);
        }
        self.emit(ItemKind::Eof)
    }

    fn lex_left_delim(&mut self) -> LexResult<'a> {
        self.pos += self.left_delim.len();
        let after_marker = if has_left_trim_marker(self.rest()) {
            TRIM_MARKER_LEN
        } else {
            0
        };
        if self.input[self.pos + after_marker..].starts_with(LEFT_COMMENT) {
            self.pos += after_marker;
            self.ignore();
            return Ok(Step::Next(State::Comment));
        }
        let item = self.this_item(ItemKind::LeftDelim);
        self.inside_action = true;
        self.pos += after_marker;
        self.ignore();
        self.paren_depth = 0;
        Ok(Step::Emit(item))
    }

    /// Comments are dropped; the trim markers around them still apply.
    fn lex_comment(&mut self) -> LexResult<'a> {
        self.pos += LEFT_COMMENT.len();
        let Some(x) = self.rest().find(RIGHT_COMMENT) else {
            return Err(self.error(ParseErrorKind::UnclosedComment));
        };
        self.pos += x + RIGHT_COMMENT.len();
        let (delim, trim) = self.at_right_delim();
        if !delim {
            return Err(self.error(ParseErrorKind::CommentEndsBeforeDelimiter));
        }
        if trim {
            self.pos += TRIM_MARKER_LEN;
        }
        self.pos += self.right_delim.len();
        if trim {
            self.pos += left_trim_length(self.rest());
        }
        self.ignore();
        Ok(Step::Next(State::Text))
    }

    fn lex_right_delim(&mut self) -> LexResult<'a> {
        let (_, trim) = self.at_right_delim();
        if trim {
            self.pos += TRIM_MARKER_LEN;
            self.ignore();
        }
        self.pos += self.right_delim.len();
        let item = self.this_item(ItemKind::RightDelim);
        if trim {
            self.pos += left_trim_length(self.rest());
            self.ignore();
        }
        self.inside_action = false;
        Ok(Step::Emit(item))
    }

    fn lex_inside_action(&mut self) -> LexResult<'a> {
        let (delim, _) = self.at_right_delim();
        if delim {
            if self.paren_depth == 0 {
                return Ok(Step::Next(State::RightDelim));
            }
            return Err(self.error(ParseErrorKind::UnclosedLeftParen));
        }
        let Some(c) = self.next_char() else {
            return Err(self.error(ParseErrorKind::UnclosedAction));
        };
        match c {
            c if is_space(c) => {
                self.backup();
                Ok(Step::Next(State::Space))
            }
            '=' => self.emit(ItemKind::Assign),
            ':' => {
                if self.next_char() != Some('=') {
                    return Err(self.error(ParseErrorKind::ExpectedDeclare));
                }
                self.emit(ItemKind::Declare)
            }
            '|' => self.emit(ItemKind::Pipe),
            '"' => Ok(Step::Next(State::Quote)),
            '`' => Ok(Step::Next(State::RawQuote)),
            '$' => Ok(Step::Next(State::Variable)),
            '\'' => Ok(Step::Next(State::Char)),
            '.' => {
                // `.5` is a number, anything else a field or dot
                match self.input.as_bytes().get(self.pos) {
                    Some(b) if b.is_ascii_digit() => {
                        self.backup();
                        Ok(Step::Next(State::Number))
                    }
                    Some(_) => Ok(Step::Next(State::Field)),
                    None => {
                        self.backup();
                        Ok(Step::Next(State::Number))
                    }
                }
            }
            '+' | '-' | '0'..='9' => {
                self.backup();
                Ok(Step::Next(State::Number))
            }
            c if is_alphanumeric(c) => {
                self.backup();
                Ok(Step::Next(State::Identifier))
            }
            '(' => {
                self.paren_depth += 1;
                self.emit(ItemKind::LeftParen)
            }
            ')' => {
                if self.paren_depth == 0 {
                    return Err(self.error(ParseErrorKind::UnexpectedRightParen));
                }
                self.paren_depth -= 1;
                self.emit(ItemKind::RightParen)
            }
            c if c.is_ascii() && !c.is_ascii_control() => self.emit(ItemKind::Char),
            c => Err(self.error(ParseErrorKind::UnrecognizedCharacter(c))),
        }
    }

    fn lex_space(&mut self) -> LexResult<'a> {
        let mut spaces = 0;
        while let Some(c) = self.peek()
            && is_space(c)
        {
            self.next_char();
            spaces += 1;
        }
        // a trim-marked right delimiter starts with a space
        let tail = &self.input[self.pos - 1..];
        if has_right_trim_marker(tail) && tail[TRIM_MARKER_LEN..].starts_with(self.right_delim) {
            self.backup();
            if spaces == 1 {
                return Ok(Step::Next(State::RightDelim));
            }
        }
        self.emit(ItemKind::Space)
    }

    fn lex_identifier(&mut self) -> LexResult<'a> {
        while let Some(c) = self.next_char() {
            if !is_alphanumeric(c) {
                self.backup();
                break;
            }
        }
        if !self.at_terminator() {
            let bad = self.peek().unwrap_or_default();
            return Err(self.error(ParseErrorKind::BadCharacter(bad)));
        }
        let word = &self.input[self.start..self.pos];
        let kind = match keyword(word) {
            Some(ItemKind::Break) if !self.break_ok => ItemKind::Identifier,
            Some(ItemKind::Continue) if !self.continue_ok => ItemKind::Identifier,
            Some(kind) => kind,
            None if word == "true" || word == "false" => ItemKind::Bool,
            None => ItemKind::Identifier,
        };
        self.emit(kind)
    }

    fn lex_variable(&mut self) -> LexResult<'a> {
        if self.at_terminator() {
            // a bare `$`
            return self.emit(ItemKind::Variable);
        }
        self.lex_field_or_variable(ItemKind::Variable)
    }

    fn lex_field_or_variable(&mut self, kind: ItemKind) -> LexResult<'a> {
        if self.at_terminator() {
            return self.emit(if kind == ItemKind::Variable {
                ItemKind::Variable
            } else {
                ItemKind::Dot
            });
        }
        while let Some(c) = self.next_char() {
            if !is_alphanumeric(c) {
                self.backup();
                break;
            }
        }
        if !self.at_terminator() {
            let bad = self.peek().unwrap_or_default();
            return Err(self.error(ParseErrorKind::BadCharacter(bad)));
        }
        self.emit(kind)
    }

    fn lex_char(&mut self) -> LexResult<'a> {
        loop {
            match self.next_char() {
                Some('\\') => match self.next_char() {
                    Some(c) if c != '\n' => {}
                    _ => return Err(self.error(ParseErrorKind::UnterminatedChar)),
                },
                None | Some('\n') => return Err(self.error(ParseErrorKind::UnterminatedChar)),
                Some('\'') => break,
                Some(_) => {}
            }
        }
        self.emit(ItemKind::CharConstant)
    }

    fn lex_quote(&mut self) -> LexResult<'a> {
        loop {
            match self.next_char() {
                Some('\\') => match self.next_char() {
                    Some(c) if c != '\n' => {}
                    _ => return Err(self.error(ParseErrorKind::UnterminatedString)),
                },
                None | Some('\n') => return Err(self.error(ParseErrorKind::UnterminatedString)),
                Some('"') => break,
                Some(_) => {}
            }
        }
        self.emit(ItemKind::String)
    }

    fn lex_raw_quote(&mut self) -> LexResult<'a> {
        loop {
            match self.next_char() {
                None => return Err(self.error(ParseErrorKind::UnterminatedRawString)),
                Some('`') => break,
                Some(_) => {}
            }
        }
        self.emit(ItemKind::RawString)
    }

    /// Numbers are scanned permissively here and validated by the parser.
    fn lex_number(&mut self) -> LexResult<'a> {
        if !self.scan_number() {
            let text = self.input[self.start..self.pos].to_string();
            return Err(self.error(ParseErrorKind::BadNumber(text)));
        }
        if let Some('+' | '-') = self.peek() {
            // complex: 1+2i, no spaces, must end in 'i'
            if !self.scan_number() || !self.input[..self.pos].ends_with('i') {
                let text = self.input[self.start..self.pos].to_string();
                return Err(self.error(ParseErrorKind::BadNumber(text)));
            }
            return self.emit(ItemKind::Complex);
        }
        self.emit(ItemKind::Number)
    }

    fn scan_number(&mut self) -> bool {
        const DECIMAL: &str = "0123456789_";
        const HEX: &str = "0123456789abcdefABCDEF_";
        self.accept("+-");
        let mut digits = DECIMAL;
        if self.accept("0") {
            // a leading 0 does not mean octal in floats
            if self.accept("xX") {
                digits = HEX;
            } else if self.accept("oO") {
                digits = "01234567_";
            } else if self.accept("bB") {
                digits = "01_";
            }
        }
        self.accept_run(digits);
        if self.accept(".") {
            self.accept_run(digits);
        }
        if digits == DECIMAL && self.accept("eE") {
            self.accept("+-");
            self.accept_run(DECIMAL);
        }
        if digits == HEX && self.accept("pP") {
            self.accept("+-");
            self.accept_run(DECIMAL);
        }
        // imaginary
        self.accept("i");
        if let Some(c) = self.peek()
            && is_alphanumeric(c)
        {
            self.next_char();
            return false;
        }
        true
    }
}

fn has_left_trim_marker(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= TRIM_MARKER_LEN && b[0] == b'-' && is_space(char::from(b[1]))
}

fn has_right_trim_marker(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= TRIM_MARKER_LEN && is_space(char::from(b[0])) && b[1] == b'-'
}

fn right_trim_length(s: &str) -> usize {
    s.len() - s.trim_end_matches(is_space).len()
}

fn left_trim_length(s: &str) -> usize {
    s.len() - s.trim_start_matches(is_space).len()
}

fn is_alphanumeric(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}
