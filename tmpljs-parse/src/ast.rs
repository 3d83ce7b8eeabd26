//! Template node types.
//!
//! The tree mirrors Go's `text/template/parse` package: a template is a list
//! of statement nodes (text, actions and control structures), and pipelines
//! are made of commands whose arguments are expression nodes.

use std::fmt::{self, Display, Write};
use std::sync::Arc;

/// Byte offset into the template source.
pub type Pos = usize;

/// A node in a template tree.
///
/// The set of kinds is closed from the point of view of the parser, but the
/// enum is non-exhaustive so consumers must decide what to do with kinds they
/// were not built for.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Node {
    /// Plain text copied to the output.
    Text(TextNode),
    /// A non-control action such as `{{.Field}}` or `{{$x := 1}}`.
    Action(ActionNode),
    /// A parenthesised pipeline used as an argument.
    Pipe(PipeNode),
    /// A single command of a pipeline.
    Command(CommandNode),
    /// `{{if}}` with optional `{{else}}`.
    If(BranchNode),
    /// `{{range}}` with optional `{{else}}`.
    Range(BranchNode),
    /// `{{with}}` with optional `{{else}}`.
    With(BranchNode),
    /// `{{template "name" pipeline}}`.
    Template(TemplateNode),
    /// A field chain on dot, such as `.A.B`.
    Field(FieldNode),
    /// Field access on the result of a term that is not dot or a variable.
    Chain(ChainNode),
    /// A variable, possibly followed by fields: `$x.A`.
    Variable(VariableNode),
    /// A function name.
    Identifier(IdentifierNode),
    /// A numeric or character constant.
    Number(NumberNode),
    /// `true` or `false`.
    Bool(BoolNode),
    /// A quoted or raw string constant.
    String(StringNode),
    /// The cursor, `.`.
    Dot(DotNode),
    /// The untyped `nil` constant.
    Nil(NilNode),
    /// `{{break}}` inside a range.
    Break(BreakNode),
    /// `{{continue}}` inside a range.
    Continue(ContinueNode),
}

/// Discriminant of [`Node`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum NodeKind {
    Text,
    Action,
    Pipe,
    Command,
    If,
    Range,
    With,
    Template,
    Field,
    Chain,
    Variable,
    Identifier,
    Number,
    Bool,
    String,
    Dot,
    Nil,
    Break,
    Continue,
}

impl NodeKind {
    /// Lowercase name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Text => "text",
            NodeKind::Action => "action",
            NodeKind::Pipe => "pipe",
            NodeKind::Command => "command",
            NodeKind::If => "if",
            NodeKind::Range => "range",
            NodeKind::With => "with",
            NodeKind::Template => "template",
            NodeKind::Field => "field",
            NodeKind::Chain => "chain",
            NodeKind::Variable => "variable",
            NodeKind::Identifier => "identifier",
            NodeKind::Number => "number",
            NodeKind::Bool => "bool",
            NodeKind::String => "string",
            NodeKind::Dot => "dot",
            NodeKind::Nil => "nil",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Node {
    /// Position of the node in the source.
    pub fn pos(&self) -> Pos {
        match self {
            Node::Text(n) => n.pos,
            Node::Action(n) => n.pos,
            Node::Pipe(n) => n.pos,
            Node::Command(n) => n.pos,
            Node::If(n) | Node::Range(n) | Node::With(n) => n.pos,
            Node::Template(n) => n.pos,
            Node::Field(n) => n.pos,
            Node::Chain(n) => n.pos,
            Node::Variable(n) => n.pos,
            Node::Identifier(n) => n.pos,
            Node::Number(n) => n.pos,
            Node::Bool(n) => n.pos,
            Node::String(n) => n.pos,
            Node::Dot(n) => n.pos,
            Node::Nil(n) => n.pos,
            Node::Break(n) => n.pos,
            Node::Continue(n) => n.pos,
        }
    }

    /// Kind of the node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Text(_) => NodeKind::Text,
            Node::Action(_) => NodeKind::Action,
            Node::Pipe(_) => NodeKind::Pipe,
            Node::Command(_) => NodeKind::Command,
            Node::If(_) => NodeKind::If,
            Node::Range(_) => NodeKind::Range,
            Node::With(_) => NodeKind::With,
            Node::Template(_) => NodeKind::Template,
            Node::Field(_) => NodeKind::Field,
            Node::Chain(_) => NodeKind::Chain,
            Node::Variable(_) => NodeKind::Variable,
            Node::Identifier(_) => NodeKind::Identifier,
            Node::Number(_) => NodeKind::Number,
            Node::Bool(_) => NodeKind::Bool,
            Node::String(_) => NodeKind::String,
            Node::Dot(_) => NodeKind::Dot,
            Node::Nil(_) => NodeKind::Nil,
            Node::Break(_) => NodeKind::Break,
            Node::Continue(_) => NodeKind::Continue,
        }
    }
}

/// An ordered sequence of statement nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListNode {
    /// Position of the first node, or of the enclosing construct.
    pub pos: Pos,
    /// The nodes, in execution order.
    pub nodes: Vec<Node>,
}

impl ListNode {
    /// Create an empty list at `pos`.
    pub fn new(pos: Pos) -> Self {
        Self {
            pos,
            nodes: Vec::new(),
        }
    }

    /// Append a node.
    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Whether the list only holds whitespace text. Empty trees never
    /// conflict with another definition of the same name.
    pub fn is_blank(&self) -> bool {
        self.nodes.iter().all(|node| match node {
            Node::Text(text) => text.text.trim_matches(is_space).is_empty(),
            _ => false,
        })
    }
}

pub(crate) fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    /// The text, byte for byte as it appeared (after trim markers applied).
    pub text: String,
}

/// A non-control action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    /// The pipeline to evaluate.
    pub pipe: PipeNode,
}

/// A pipeline with optional variable declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    /// `$x = ...` rather than `$x := ...`.
    pub is_assign: bool,
    /// Declared or assigned variables, in source order.
    pub decl: Vec<VariableNode>,
    /// Commands in lexical order.
    pub cmds: Vec<CommandNode>,
}

impl PipeNode {
    /// Create an empty pipeline at `pos`.
    pub fn new(pos: Pos) -> Self {
        Self {
            pos,
            is_assign: false,
            decl: Vec::new(),
            cmds: Vec::new(),
        }
    }
}

/// A command: an operand optionally followed by arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    /// Operand first, then its arguments.
    pub args: Vec<Node>,
}

/// Shared shape of `if`, `range` and `with`.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    /// The controlling pipeline.
    pub pipe: PipeNode,
    /// Executed when the pipeline is non-empty.
    pub list: ListNode,
    /// Executed otherwise, when present.
    pub else_list: Option<ListNode>,
}

/// `{{template "name" pipeline}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    /// Name of the invoked template (unquoted).
    pub name: String,
    /// Data passed to the template; `None` passes nil.
    pub pipe: Option<PipeNode>,
}

/// `.A.B`: field names without the leading dots.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    #[allow(missing_docs)]
    pub ident: Vec<String>,
}

impl FieldNode {
    /// Build from the lexed text `.A.B`.
    pub fn new(pos: Pos, text: &str) -> Self {
        Self {
            pos,
            ident: text[1..].split('.').map(str::to_string).collect(),
        }
    }
}

/// `(pipeline).A.B`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    /// The term the fields apply to.
    pub node: Box<Node>,
    /// Field names without the leading dots.
    pub field: Vec<String>,
}

/// `$x` or `$x.A.B`; the first element is the variable name with its `$`.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    #[allow(missing_docs)]
    pub ident: Vec<String>,
}

impl VariableNode {
    /// Build from the lexed text `$x.A`.
    pub fn new(pos: Pos, text: &str) -> Self {
        Self {
            pos,
            ident: text.split('.').map(str::to_string).collect(),
        }
    }

    /// The variable name, `$x`.
    pub fn name(&self) -> &str {
        &self.ident[0]
    }
}

/// A function name.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    #[allow(missing_docs)]
    pub ident: String,
}

/// How a numeric constant was written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberKind {
    /// Integer, any base.
    Int,
    /// Floating point, decimal or hex.
    Float,
    /// Imaginary or complex, such as `1i` or `1+2i`.
    Complex,
    /// Character constant such as `'a'`, with its value.
    Char(char),
}

/// A numeric constant. The original text is kept so no precision is lost.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    #[allow(missing_docs)]
    pub kind: NumberKind,
    /// Text as written in the template.
    pub text: String,
}

/// `true` or `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoolNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    #[allow(missing_docs)]
    pub value: bool,
}

/// A string constant.
#[derive(Debug, Clone, PartialEq)]
pub struct StringNode {
    #[allow(missing_docs)]
    pub pos: Pos,
    /// As written, with quotes.
    pub quoted: String,
    /// Unquoted value.
    pub text: String,
}

/// `.`
#[derive(Debug, Clone, PartialEq)]
pub struct DotNode {
    #[allow(missing_docs)]
    pub pos: Pos,
}

/// `nil`
#[derive(Debug, Clone, PartialEq)]
pub struct NilNode {
    #[allow(missing_docs)]
    pub pos: Pos,
}

/// `{{break}}`
#[derive(Debug, Clone, PartialEq)]
pub struct BreakNode {
    #[allow(missing_docs)]
    pub pos: Pos,
}

/// `{{continue}}`
#[derive(Debug, Clone, PartialEq)]
pub struct ContinueNode {
    #[allow(missing_docs)]
    pub pos: Pos,
}

/// One parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    /// Name of the template this tree defines.
    pub name: String,
    /// Name of the top-level template whose source contained this tree.
    pub parse_name: String,
    /// Top-level nodes.
    pub root: ListNode,
    source: Arc<str>,
}

impl Tree {
    /// Create a tree over `source`.
    pub fn new(
        name: impl Into<String>,
        parse_name: impl Into<String>,
        root: ListNode,
        source: Arc<str>,
    ) -> Self {
        Self {
            name: name.into(),
            parse_name: parse_name.into(),
            root,
            source,
        }
    }

    /// Full source text the tree was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 1-based line and column of `pos`.
    pub fn location(&self, pos: Pos) -> (usize, usize) {
        location(&self.source, pos)
    }
}

pub(crate) fn location(source: &str, pos: Pos) -> (usize, usize) {
    let pos = pos.min(source.len());
    let before = &source.as_bytes()[..pos];
    let line = 1 + before.iter().filter(|&&b| b == b'\n').count();
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    (line, pos - line_start + 1)
}

// =============================================================================
// Display implementations
// =============================================================================

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text(n) => f.write_str(&n.text),
            Node::Action(n) => write!(f, "{{{{{}}}}}", n.pipe),
            Node::Pipe(n) => write!(f, "{n}"),
            Node::Command(n) => write!(f, "{n}"),
            Node::If(n) => write_branch(f, "if", n),
            Node::Range(n) => write_branch(f, "range", n),
            Node::With(n) => write_branch(f, "with", n),
            Node::Template(n) => match &n.pipe {
                Some(pipe) => write!(f, "{{{{template {:?} {pipe}}}}}", n.name),
                None => write!(f, "{{{{template {:?}}}}}", n.name),
            },
            Node::Field(n) => {
                for ident in &n.ident {
                    write!(f, ".{ident}")?;
                }
                Ok(())
            }
            Node::Chain(n) => {
                if let Node::Pipe(pipe) = n.node.as_ref() {
                    write!(f, "({pipe})")?;
                } else {
                    write!(f, "{}", n.node)?;
                }
                for field in &n.field {
                    write!(f, ".{field}")?;
                }
                Ok(())
            }
            Node::Variable(n) => f.write_str(&n.ident.join(".")),
            Node::Identifier(n) => f.write_str(&n.ident),
            Node::Number(n) => f.write_str(&n.text),
            Node::Bool(n) => write!(f, "{}", n.value),
            Node::String(n) => f.write_str(&n.quoted),
            Node::Dot(_) => f.write_char('.'),
            Node::Nil(_) => f.write_str("nil"),
            Node::Break(_) => f.write_str("{{break}}"),
            Node::Continue(_) => f.write_str("{{continue}}"),
        }
    }
}

fn write_branch(f: &mut fmt::Formatter<'_>, keyword: &str, n: &BranchNode) -> fmt::Result {
    write!(f, "{{{{{keyword} {}}}}}{}", n.pipe, n.list)?;
    if let Some(else_list) = &n.else_list {
        write!(f, "{{{{else}}}}{else_list}")?;
    }
    f.write_str("{{end}}")
}

impl Display for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            write!(f, "{node}")?;
        }
        Ok(())
    }
}

impl Display for PipeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.decl.is_empty() {
            let names: Vec<String> = self.decl.iter().map(|v| v.ident.join(".")).collect();
            let op = if self.is_assign { "=" } else { ":=" };
            write!(f, "{} {op} ", names.join(", "))?;
        }
        for (i, cmd) in self.cmds.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{cmd}")?;
        }
        Ok(())
    }
}

impl Display for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_char(' ')?;
            }
            if let Node::Pipe(pipe) = arg {
                write!(f, "({pipe})")?;
            } else {
                write!(f, "{arg}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_counts_lines_and_columns() {
        let src = "ab\ncd\nef";
        assert_eq!(location(src, 0), (1, 1));
        assert_eq!(location(src, 4), (2, 2));
        assert_eq!(location(src, 6), (3, 1));
        assert_eq!(location(src, 100), (3, 3));
    }

    #[test]
    fn blank_lists() {
        let mut list = ListNode::new(0);
        assert!(list.is_blank());
        list.push(Node::Text(TextNode {
            pos: 0,
            text: " \n\t".into(),
        }));
        assert!(list.is_blank());
        list.push(Node::Dot(DotNode { pos: 3 }));
        assert!(!list.is_blank());
    }

    #[test]
    fn field_and_variable_idents() {
        assert_eq!(FieldNode::new(0, ".A.B").ident, vec!["A", "B"]);
        let var = VariableNode::new(0, "$x.Name");
        assert_eq!(var.name(), "$x");
        assert_eq!(var.ident, vec!["$x", "Name"]);
    }
}
