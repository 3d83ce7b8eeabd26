//! Recursive-descent parser producing template trees.

use std::sync::Arc;

use crate::ast::{
    ActionNode, BoolNode, BranchNode, BreakNode, ChainNode, CommandNode, ContinueNode, DotNode,
    FieldNode, IdentifierNode, ListNode, NilNode, Node, NumberKind, NumberNode, PipeNode, Pos,
    StringNode, TemplateNode, TextNode, Tree, VariableNode,
};
use crate::error::{ParseError, ParseErrorKind};
use crate::funcs::{FuncNames, suggest};
use crate::lex::{Item, ItemKind, Lexer};
use crate::unquote::{unquote, unquote_char};
use crate::{DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM, TreeSet, number};

type PResult<T> = Result<T, ParseError>;

/// Parse `text` into the set of trees it defines.
///
/// The top-level template is stored under `name`; every `{{define}}` and
/// `{{block}}` adds a tree of its own. Empty delimiters select the defaults
/// `{{` and `}}`. Identifiers must name a function in `funcs`.
///
/// ```
/// use tmpljs_parse::{BUILTINS, parse};
///
/// let trees = parse("page", r#"{{define "row"}}<td>{{.}}</td>{{end}}"#, "", "", BUILTINS)?;
/// assert_eq!(trees.keys().collect::<Vec<_>>(), ["page", "row"]);
/// assert_eq!(trees["row"].root.to_string(), "<td>{{.}}</td>");
/// # Ok::<(), tmpljs_parse::ParseError>(())
/// ```
pub fn parse<F: FuncNames + ?Sized>(
    name: &str,
    text: &str,
    left_delim: &str,
    right_delim: &str,
    funcs: &F,
) -> Result<TreeSet, ParseError> {
    let left_delim = if left_delim.is_empty() {
        DEFAULT_LEFT_DELIM
    } else {
        left_delim
    };
    let right_delim = if right_delim.is_empty() {
        DEFAULT_RIGHT_DELIM
    } else {
        right_delim
    };
    let mut parser = Parser::new(name, text, left_delim, right_delim, funcs);
    let root = parser.parse_top()?;
    parser.add(name, root)?;
    debug!(template = name, trees = parser.trees.len(), "parsed template source");
    Ok(parser.trees)
}

/// What a statement-level parse step produced. `{{end}}` and `{{else}}` only
/// terminate lists and never become nodes.
enum Stmt {
    Node(Node),
    End,
    Else(Pos),
}

impl Stmt {
    fn describe(&self) -> String {
        match self {
            Stmt::Node(node) => node.to_string(),
            Stmt::End => "{{end}}".to_string(),
            Stmt::Else(_) => "{{else}}".to_string(),
        }
    }
}

struct Parser<'a, F: ?Sized> {
    parse_name: &'a str,
    text: &'a str,
    source: Arc<str>,
    funcs: &'a F,
    lex: Lexer<'a>,
    /// Three-token lookahead.
    token: [Item<'a>; 3],
    peek_count: usize,
    /// Variables in scope, innermost last.
    vars: Vec<String>,
    range_depth: usize,
    trees: TreeSet,
}

impl<'a, F: FuncNames + ?Sized> Parser<'a, F> {
    fn new(
        name: &'a str,
        text: &'a str,
        left_delim: &'a str,
        right_delim: &'a str,
        funcs: &'a F,
    ) -> Self {
        let lex = Lexer::new(name, text, left_delim, right_delim)
            .with_loop_keywords(!funcs.has_func("break"), !funcs.has_func("continue"));
        Self {
            parse_name: name,
            text,
            source: Arc::from(text),
            funcs,
            lex,
            token: [Item::EOF; 3],
            peek_count: 0,
            vars: vec!["$".to_string()],
            range_depth: 0,
            trees: TreeSet::new(),
        }
    }

    // ------------------------------------------------------------------
    // Lookahead
    // ------------------------------------------------------------------

    fn next(&mut self) -> PResult<Item<'a>> {
        if self.peek_count > 0 {
            self.peek_count -= 1;
        } else {
            self.token[0] = self.lex.next_item()?;
        }
        Ok(self.token[self.peek_count])
    }

    fn backup(&mut self) {
        self.peek_count += 1;
    }

    /// Push back `t1`; the token already in slot 0 follows it.
    fn backup2(&mut self, t1: Item<'a>) {
        self.token[1] = t1;
        self.peek_count = 2;
    }

    /// Push back `t2` then `t1`; the token already in slot 0 follows them.
    fn backup3(&mut self, t2: Item<'a>, t1: Item<'a>) {
        self.token[1] = t1;
        self.token[2] = t2;
        self.peek_count = 3;
    }

    fn peek(&mut self) -> PResult<Item<'a>> {
        if self.peek_count > 0 {
            return Ok(self.token[self.peek_count - 1]);
        }
        self.peek_count = 1;
        self.token[0] = self.lex.next_item()?;
        Ok(self.token[0])
    }

    fn next_non_space(&mut self) -> PResult<Item<'a>> {
        loop {
            let token = self.next()?;
            if token.kind != ItemKind::Space {
                return Ok(token);
            }
        }
    }

    fn peek_non_space(&mut self) -> PResult<Item<'a>> {
        let token = self.next_non_space()?;
        self.backup();
        Ok(token)
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        self.error_at(kind, self.token[0].pos)
    }

    fn error_at(&self, kind: ParseErrorKind, pos: Pos) -> ParseError {
        ParseError::at(kind, self.parse_name, self.text, pos)
    }

    fn unexpected(&self, token: Item<'a>, context: &str) -> ParseError {
        self.error_at(
            ParseErrorKind::Unexpected {
                found: token.to_string(),
                context: context.to_string(),
            },
            token.pos,
        )
        .with_len(token.val.len())
    }

    fn expect(&mut self, expected: ItemKind, context: &str) -> PResult<Item<'a>> {
        let token = self.next_non_space()?;
        if token.kind != expected {
            return Err(self.unexpected(token, context));
        }
        Ok(token)
    }

    // ------------------------------------------------------------------
    // Trees
    // ------------------------------------------------------------------

    fn parse_top(&mut self) -> PResult<ListNode> {
        let mut root = ListNode::new(self.peek()?.pos);
        while self.peek()?.kind != ItemKind::Eof {
            if self.peek()?.kind == ItemKind::LeftDelim {
                let delim = self.next()?;
                if self.next_non_space()?.kind == ItemKind::Define {
                    self.parse_definition()?;
                    continue;
                }
                self.backup2(delim);
            }
            match self.text_or_action()? {
                Stmt::Node(node) => root.push(node),
                other => {
                    return Err(self.error(ParseErrorKind::UnexpectedClause(other.describe())));
                }
            }
        }
        Ok(root)
    }

    /// Run `f` as the body of a separate tree: no variables but `$` are
    /// visible and no range is open.
    fn in_new_tree<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        let vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let range_depth = std::mem::take(&mut self.range_depth);
        let result = f(self);
        self.vars = vars;
        self.range_depth = range_depth;
        result
    }

    /// `{{define "name"}} ... {{end}}`, with the left delimiter and keyword
    /// already consumed.
    fn parse_definition(&mut self) -> PResult<()> {
        const CONTEXT: &str = "define clause";
        let token = self.next_non_space()?;
        let name = self.template_name(token, CONTEXT)?;
        self.expect(ItemKind::RightDelim, CONTEXT)?;
        let (root, end) = self.in_new_tree(Self::item_list)?;
        if !matches!(end, Stmt::End) {
            return Err(self.error(ParseErrorKind::Unexpected {
                found: end.describe(),
                context: CONTEXT.to_string(),
            }));
        }
        self.add(&name, root)
    }

    /// Record a tree. A blank tree never replaces or conflicts with a
    /// non-blank one of the same name.
    fn add(&mut self, name: &str, root: ListNode) -> PResult<()> {
        if let Some(existing) = self.trees.get(name)
            && !existing.root.is_blank()
        {
            if root.is_blank() {
                return Ok(());
            }
            return Err(self.error(ParseErrorKind::MultipleDefinition(name.to_string())));
        }
        trace!(template = name, "adding tree");
        let tree = Tree::new(name, self.parse_name, root, Arc::clone(&self.source));
        self.trees.insert(name.to_string(), tree);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Parse statements up to `{{end}}` or `{{else}}`, returning the
    /// terminator.
    fn item_list(&mut self) -> PResult<(ListNode, Stmt)> {
        let mut list = ListNode::new(self.peek_non_space()?.pos);
        while self.peek_non_space()?.kind != ItemKind::Eof {
            match self.text_or_action()? {
                Stmt::Node(node) => list.push(node),
                end => return Ok((list, end)),
            }
        }
        Err(self.error(ParseErrorKind::UnexpectedEof))
    }

    fn text_or_action(&mut self) -> PResult<Stmt> {
        let token = self.next_non_space()?;
        match token.kind {
            ItemKind::Text => Ok(Stmt::Node(Node::Text(TextNode {
                pos: token.pos,
                text: token.val.to_string(),
            }))),
            ItemKind::LeftDelim => self.action(),
            _ => Err(self.unexpected(token, "input")),
        }
    }

    /// Everything after a left delimiter: a control keyword or a pipeline.
    fn action(&mut self) -> PResult<Stmt> {
        let token = self.next_non_space()?;
        let node = match token.kind {
            ItemKind::Block => self.block_control()?,
            ItemKind::Break => self.loop_control(token, ItemKind::Break)?,
            ItemKind::Continue => self.loop_control(token, ItemKind::Continue)?,
            ItemKind::Else => return self.else_control(),
            ItemKind::End => {
                self.expect(ItemKind::RightDelim, "end")?;
                return Ok(Stmt::End);
            }
            ItemKind::If => Node::If(self.parse_control("if")?),
            ItemKind::Range => Node::Range(self.parse_control("range")?),
            ItemKind::Template => self.template_control()?,
            ItemKind::With => Node::With(self.parse_control("with")?),
            _ => {
                self.backup();
                let pos = self.peek()?.pos;
                // declared variables stay in scope until the enclosing end
                let pipe = self.pipeline("command", ItemKind::RightDelim)?;
                Node::Action(ActionNode { pos, pipe })
            }
        };
        Ok(Stmt::Node(node))
    }

    fn loop_control(&mut self, keyword: Item<'a>, kind: ItemKind) -> PResult<Node> {
        let is_break = kind == ItemKind::Break;
        let context = if is_break {
            "{{break}}"
        } else {
            "{{continue}}"
        };
        let token = self.next_non_space()?;
        if token.kind != ItemKind::RightDelim {
            return Err(self.unexpected(token, context));
        }
        let pos = keyword.pos;
        if self.range_depth == 0 {
            let kind = if is_break {
                ParseErrorKind::BreakOutsideRange
            } else {
                ParseErrorKind::ContinueOutsideRange
            };
            return Err(self.error_at(kind, pos).with_len(keyword.val.len()));
        }
        Ok(if is_break {
            Node::Break(BreakNode { pos })
        } else {
            Node::Continue(ContinueNode { pos })
        })
    }

    /// `{{else if ...}}` and `{{else with ...}}` leave the keyword pending so
    /// that the enclosing control can parse it as a nested construct.
    fn else_control(&mut self) -> PResult<Stmt> {
        let peek = self.peek_non_space()?;
        if matches!(peek.kind, ItemKind::If | ItemKind::With) {
            return Ok(Stmt::Else(peek.pos));
        }
        let token = self.expect(ItemKind::RightDelim, "else")?;
        Ok(Stmt::Else(token.pos))
    }

    /// Shared body of `if`, `range` and `with`.
    fn parse_control(&mut self, context: &'static str) -> PResult<BranchNode> {
        let scope = self.vars.len();
        let pipe = self.pipeline(context, ItemKind::RightDelim)?;
        let is_range = context == "range";
        if is_range {
            self.range_depth += 1;
        }
        let (list, next) = self.item_list()?;
        if is_range {
            self.range_depth -= 1;
        }
        let else_list = match next {
            Stmt::Else(pos) => {
                let chained = match context {
                    "if" => Some(ItemKind::If),
                    "with" => Some(ItemKind::With),
                    _ => None,
                };
                if chained.is_some() && chained == Some(self.peek()?.kind) {
                    // {{if a}}x{{else if b}}y{{end}} is {{if a}}x{{else}}{{if b}}y{{end}}{{end}}
                    self.next()?;
                    let nested = self.parse_control(context)?;
                    let mut else_list = ListNode::new(pos);
                    else_list.push(if context == "if" {
                        Node::If(nested)
                    } else {
                        Node::With(nested)
                    });
                    Some(else_list)
                } else {
                    let (else_list, next) = self.item_list()?;
                    if !matches!(next, Stmt::End) {
                        return Err(self.error(ParseErrorKind::ExpectedEnd(next.describe())));
                    }
                    Some(else_list)
                }
            }
            _ => None,
        };
        self.vars.truncate(scope);
        Ok(BranchNode {
            pos: pipe.pos,
            pipe,
            list,
            else_list,
        })
    }

    fn template_control(&mut self) -> PResult<Node> {
        const CONTEXT: &str = "template clause";
        let token = self.next_non_space()?;
        let name = self.template_name(token, CONTEXT)?;
        let pipe = if self.next_non_space()?.kind != ItemKind::RightDelim {
            self.backup();
            Some(self.pipeline(CONTEXT, ItemKind::RightDelim)?)
        } else {
            None
        };
        Ok(Node::Template(TemplateNode {
            pos: token.pos,
            name,
            pipe,
        }))
    }

    /// `{{block "name" pipeline}} body {{end}}` defines `name` and invokes
    /// it in place.
    fn block_control(&mut self) -> PResult<Node> {
        const CONTEXT: &str = "block clause";
        let token = self.next_non_space()?;
        let name = self.template_name(token, CONTEXT)?;
        let pipe = self.pipeline(CONTEXT, ItemKind::RightDelim)?;
        let (root, end) = self.in_new_tree(Self::item_list)?;
        if !matches!(end, Stmt::End) {
            return Err(self.error(ParseErrorKind::Unexpected {
                found: end.describe(),
                context: CONTEXT.to_string(),
            }));
        }
        self.add(&name, root)?;
        Ok(Node::Template(TemplateNode {
            pos: token.pos,
            name,
            pipe: Some(pipe),
        }))
    }

    fn template_name(&self, token: Item<'a>, context: &str) -> PResult<String> {
        match token.kind {
            ItemKind::String | ItemKind::RawString => {
                self.unquote(token)
            }
            _ => Err(self.unexpected(token, context)),
        }
    }

    fn unquote(&self, token: Item<'a>) -> PResult<String> {
        unquote(token.val).map_err(|reason| {
            self.error_at(
                ParseErrorKind::InvalidQuoted {
                    literal: token.val.to_string(),
                    reason: reason.to_string(),
                },
                token.pos,
            )
            .with_len(token.val.len())
        })
    }

    // ------------------------------------------------------------------
    // Pipelines
    // ------------------------------------------------------------------

    fn pipeline(&mut self, context: &str, end: ItemKind) -> PResult<PipeNode> {
        let mut pipe = PipeNode::new(self.peek_non_space()?.pos);
        self.declarations(&mut pipe, context)?;
        loop {
            let token = self.next_non_space()?;
            match token.kind {
                kind if kind == end => {
                    self.check_pipeline(&pipe, context)?;
                    return Ok(pipe);
                }
                ItemKind::Bool
                | ItemKind::CharConstant
                | ItemKind::Complex
                | ItemKind::Dot
                | ItemKind::Field
                | ItemKind::Identifier
                | ItemKind::Number
                | ItemKind::Nil
                | ItemKind::RawString
                | ItemKind::String
                | ItemKind::Variable
                | ItemKind::LeftParen => {
                    self.backup();
                    let cmd = self.command()?;
                    pipe.cmds.push(cmd);
                }
                _ => return Err(self.unexpected(token, context)),
            }
        }
    }

    /// Leading `$x :=`, `$x =` or, in a range, `$i, $v :=`.
    ///
    /// Telling `$x := 1` from `$x foo` takes three tokens of lookahead since
    /// spaces are tokens too.
    fn declarations(&mut self, pipe: &mut PipeNode, context: &str) -> PResult<()> {
        loop {
            let v = self.peek_non_space()?;
            if v.kind != ItemKind::Variable {
                return Ok(());
            }
            self.next()?;
            let token_after_variable = self.peek()?;
            let next = self.peek_non_space()?;
            match next.kind {
                ItemKind::Assign | ItemKind::Declare => {
                    pipe.is_assign = next.kind == ItemKind::Assign;
                    self.next_non_space()?;
                    pipe.decl.push(VariableNode::new(v.pos, v.val));
                    self.vars.push(v.val.to_string());
                }
                ItemKind::Char if next.val == "," => {
                    self.next_non_space()?;
                    pipe.decl.push(VariableNode::new(v.pos, v.val));
                    self.vars.push(v.val.to_string());
                    if context == "range" && pipe.decl.len() < 2 {
                        match self.peek_non_space()?.kind {
                            ItemKind::Variable | ItemKind::RightDelim | ItemKind::RightParen => {
                                continue;
                            }
                            _ => return Err(self.error(ParseErrorKind::RangeDeclarations)),
                        }
                    }
                    return Err(self.error(ParseErrorKind::TooManyDeclarations(
                        context.to_string(),
                    )));
                }
                _ if token_after_variable.kind == ItemKind::Space => {
                    self.backup3(v, token_after_variable);
                }
                _ => self.backup2(v),
            }
            return Ok(());
        }
    }

    fn check_pipeline(&self, pipe: &PipeNode, context: &str) -> PResult<()> {
        if pipe.cmds.is_empty() {
            return Err(self.error(ParseErrorKind::MissingValue(context.to_string())));
        }
        // only the first stage may start with a constant
        for (i, cmd) in pipe.cmds.iter().enumerate().skip(1) {
            if let Some(
                Node::Bool(_) | Node::Dot(_) | Node::Nil(_) | Node::Number(_) | Node::String(_),
            ) = cmd.args.first()
            {
                return Err(self.error_at(ParseErrorKind::NonExecutableStage(i + 1), cmd.pos));
            }
        }
        Ok(())
    }

    fn command(&mut self) -> PResult<CommandNode> {
        let mut cmd = CommandNode {
            pos: self.peek_non_space()?.pos,
            args: Vec::new(),
        };
        loop {
            self.peek_non_space()?;
            if let Some(operand) = self.operand()? {
                cmd.args.push(operand);
            }
            let token = self.next()?;
            match token.kind {
                ItemKind::Space => continue,
                ItemKind::RightDelim | ItemKind::RightParen => self.backup(),
                ItemKind::Pipe => {}
                _ => return Err(self.unexpected(token, "operand")),
            }
            break;
        }
        if cmd.args.is_empty() {
            return Err(self.error(ParseErrorKind::EmptyCommand));
        }
        Ok(cmd)
    }

    /// A term optionally followed by field accesses.
    fn operand(&mut self) -> PResult<Option<Node>> {
        let Some(node) = self.term()? else {
            return Ok(None);
        };
        let first = self.peek()?;
        if first.kind != ItemKind::Field {
            return Ok(Some(node));
        }
        let mut fields = Vec::new();
        while self.peek()?.kind == ItemKind::Field {
            let field = self.next()?;
            fields.push(field.val[1..].to_string());
        }
        let node = match node {
            Node::Field(mut field) => {
                field.ident.extend(fields);
                Node::Field(field)
            }
            Node::Variable(mut var) => {
                var.ident.extend(fields);
                Node::Variable(var)
            }
            Node::Bool(_) | Node::String(_) | Node::Number(_) | Node::Nil(_) | Node::Dot(_) => {
                return Err(
                    self.error_at(ParseErrorKind::DotAfterTerm(node.to_string()), first.pos)
                );
            }
            other => Node::Chain(ChainNode {
                pos: first.pos,
                node: Box::new(other),
                field: fields,
            }),
        };
        Ok(Some(node))
    }

    fn term(&mut self) -> PResult<Option<Node>> {
        let token = self.next_non_space()?;
        let pos = token.pos;
        let node = match token.kind {
            ItemKind::Identifier => {
                if !self.funcs.has_func(token.val) {
                    let kind = ParseErrorKind::UnknownFunction {
                        name: token.val.to_string(),
                        suggestion: suggest(token.val, self.funcs),
                    };
                    return Err(self.error_at(kind, pos).with_len(token.val.len()));
                }
                Node::Identifier(IdentifierNode {
                    pos,
                    ident: token.val.to_string(),
                })
            }
            ItemKind::Dot => Node::Dot(DotNode { pos }),
            ItemKind::Nil => Node::Nil(NilNode { pos }),
            ItemKind::Variable => self.use_var(token)?,
            ItemKind::Field => Node::Field(FieldNode::new(pos, token.val)),
            ItemKind::Bool => Node::Bool(BoolNode {
                pos,
                value: token.val == "true",
            }),
            ItemKind::CharConstant | ItemKind::Complex | ItemKind::Number => self.number(token)?,
            ItemKind::LeftParen => {
                Node::Pipe(self.pipeline("parenthesized pipeline", ItemKind::RightParen)?)
            }
            ItemKind::String | ItemKind::RawString => Node::String(StringNode {
                pos,
                quoted: token.val.to_string(),
                text: self.unquote(token)?,
            }),
            _ => {
                self.backup();
                return Ok(None);
            }
        };
        Ok(Some(node))
    }

    fn use_var(&self, token: Item<'a>) -> PResult<Node> {
        let var = VariableNode::new(token.pos, token.val);
        if self.vars.iter().any(|name| name == var.name()) {
            return Ok(Node::Variable(var));
        }
        Err(self
            .error_at(
                ParseErrorKind::UndefinedVariable(var.name().to_string()),
                token.pos,
            )
            .with_len(token.val.len()))
    }

    fn number(&self, token: Item<'a>) -> PResult<Node> {
        let kind = if token.kind == ItemKind::CharConstant {
            let c = unquote_char(token.val).map_err(|reason| {
                self.error_at(
                    ParseErrorKind::InvalidQuoted {
                        literal: token.val.to_string(),
                        reason: reason.to_string(),
                    },
                    token.pos,
                )
            })?;
            NumberKind::Char(c)
        } else {
            number::classify(token.val, token.kind == ItemKind::Complex).ok_or_else(|| {
                self.error_at(
                    ParseErrorKind::IllegalNumber(token.val.to_string()),
                    token.pos,
                )
            })?
        };
        Ok(Node::Number(NumberNode {
            pos: token.pos,
            kind,
            text: token.val.to_string(),
        }))
    }
}
