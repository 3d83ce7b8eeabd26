//! Lowering of template nodes to JavaScript statements and expressions.
//!
//! Statement-position nodes (text, actions, control structures, template
//! calls) write to the emitter or queue values on the active accumulator.
//! Expression-position nodes (pipelines, commands, operands) lower to a
//! JavaScript expression string.

use std::collections::HashSet;

use tmpljs_parse::{
    BranchNode, CommandNode, ListNode, Node, PipeNode, Pos, TemplateNode, Tree, VariableNode,
};

use crate::accumulator::Accumulators;
use crate::compile::Session;
use crate::emitter::Emitter;
use crate::error::{CompileError, InternalError};
use crate::escape::{js_string, property};

/// Accumulator variable of every emitted function.
pub(crate) const OUTPUT_VAR: &str = "output";

/// Parameter holding the data the template is executed with.
pub(crate) const DATA_PARAM: &str = "opt_data";

/// Parameter holding a caller-supplied accumulator.
pub(crate) const SB_PARAM: &str = "opt_sb";

type Result<T, E = CompileError> = std::result::Result<T, E>;

/// Lowering state for one template function.
pub(crate) struct Lowerer<'a> {
    session: &'a Session<'a>,
    tree: &'a Tree,
    out: &'a mut Emitter,
    acc: &'a mut Accumulators,
    /// Template variable name to JavaScript name, innermost scope last.
    scopes: Vec<Vec<(String, String)>>,
    /// Expressions dot refers to, innermost last.
    dots: Vec<String>,
    /// Names that must not be declared again in this function.
    used: HashSet<String>,
    next_temp: usize,
}

impl<'a> Lowerer<'a> {
    pub(crate) fn new(
        session: &'a Session<'a>,
        tree: &'a Tree,
        out: &'a mut Emitter,
        acc: &'a mut Accumulators,
    ) -> Self {
        Self {
            session,
            tree,
            out,
            acc,
            scopes: vec![vec![("$".to_string(), DATA_PARAM.to_string())]],
            dots: vec![DATA_PARAM.to_string()],
            used: session.globals().clone(),
            next_temp: 0,
        }
    }

    pub(crate) fn lower_list(&mut self, list: &ListNode) -> Result<()> {
        for node in &list.nodes {
            self.lower_node(node)?;
        }
        Ok(())
    }

    /// Lower a statement-position node.
    pub(crate) fn lower_node(&mut self, node: &Node) -> Result<()> {
        match node {
            Node::Text(text) => {
                self.acc.enqueue(js_string(&text.text))?;
                Ok(())
            }
            Node::Action(action) => self.lower_action(&action.pipe),
            Node::If(branch) => self.lower_if(branch),
            Node::Range(branch) => self.lower_range(branch),
            Node::With(branch) => self.lower_with(branch),
            Node::Template(template) => self.lower_template(template),
            Node::Break(_) => self.jump("break"),
            Node::Continue(_) => self.jump("continue"),
            other => Err(unexpected(other, "statement")),
        }
    }

    /// Write out everything queued on the active accumulator.
    pub(crate) fn flush(&mut self) -> Result<()> {
        self.acc.flush_pending(self.out)?;
        Ok(())
    }

    fn lower_action(&mut self, pipe: &PipeNode) -> Result<()> {
        if pipe.decl.is_empty() {
            let value = self.lower_pipe(pipe)?;
            self.acc.enqueue(value)?;
            return Ok(());
        }
        self.flush()?;
        self.lower_declaration(pipe)?;
        Ok(())
    }

    fn lower_if(&mut self, branch: &BranchNode) -> Result<()> {
        trace!(pos = branch.pos, "lower if");
        self.flush()?;
        self.scopes.push(Vec::new());
        let cond = self.lower_condition(&branch.pipe)?;
        let test = self.truth(&cond);
        self.out.write_line(&["if (", &test, ") {"]);
        self.lower_if_branches(branch)?;
        self.out.write_line(&["}"]);
        self.scopes.pop();
        Ok(())
    }

    /// Body and else chain of an `if`, up to but excluding the closing brace.
    fn lower_if_branches(&mut self, branch: &BranchNode) -> Result<()> {
        self.lower_block(&branch.list)?;
        let Some(else_list) = &branch.else_list else {
            return Ok(());
        };
        match else_list.nodes.as_slice() {
            // a condition with declarations needs statements before the test
            [Node::If(chained)] if chained.pipe.decl.is_empty() => {
                self.scopes.push(Vec::new());
                let cond = self.lower_pipe(&chained.pipe)?;
                let test = self.truth(&cond);
                self.out.write_line(&["} else if (", &test, ") {"]);
                self.lower_if_branches(chained)?;
                self.scopes.pop();
            }
            _ => {
                self.out.write_line(&["} else {"]);
                self.lower_block(else_list)?;
            }
        }
        Ok(())
    }

    fn lower_range(&mut self, branch: &BranchNode) -> Result<()> {
        trace!(pos = branch.pos, "lower range");
        self.flush()?;
        self.scopes.push(Vec::new());
        let value = self.lower_pipe(&branch.pipe)?;
        let [list, keys, index, item] = self.temps(["list", "keys", "i", "item"]);
        let keys_call = format!("{}({list})", self.session.helper("keys"));
        let key = format!("{keys}[{index}]");

        self.out.write_line(&["var ", &list, " = ", &value, ";"]);
        self.out.write_line(&["var ", &keys, " = ", &keys_call, ";"]);
        self.out.write_line(&["if (", &keys, ".length > 0) {"]);
        self.out.increase_indent();
        self.out.write_line(&[
            "for (var ", &index, " = 0; ", &index, " < ", &keys, ".length; ", &index, "++) {",
        ]);
        self.out.increase_indent();
        self.out.write_line(&["var ", &item, " = ", &list, "[", &key, "];"]);
        let is_assign = branch.pipe.is_assign;
        match branch.pipe.decl.as_slice() {
            [] => {}
            [elem] => {
                self.bind(elem, is_assign, &item)?;
            }
            [index_var, elem] => {
                self.bind(index_var, is_assign, &key)?;
                self.bind(elem, is_assign, &item)?;
            }
            _ => return Err(self.error(branch.pipe.pos, "too many declarations in range")),
        }
        self.dots.push(item);
        self.lower_list(&branch.list)?;
        self.flush()?;
        self.dots.pop();
        self.out.decrease_indent()?;
        self.out.write_line(&["}"]);
        self.out.decrease_indent()?;
        if let Some(else_list) = &branch.else_list {
            self.out.write_line(&["} else {"]);
            self.lower_block(else_list)?;
        }
        self.out.write_line(&["}"]);
        self.scopes.pop();
        Ok(())
    }

    fn lower_with(&mut self, branch: &BranchNode) -> Result<()> {
        trace!(pos = branch.pos, "lower with");
        self.flush()?;
        self.scopes.push(Vec::new());
        let value = if branch.pipe.decl.is_empty() {
            let value = self.lower_pipe(&branch.pipe)?;
            let [temp] = self.temps(["with"]);
            self.out.write_line(&["var ", &temp, " = ", &value, ";"]);
            temp
        } else {
            self.lower_declaration(&branch.pipe)?
        };
        let test = self.truth(&value);
        self.out.write_line(&["if (", &test, ") {"]);
        self.dots.push(value);
        self.lower_block(&branch.list)?;
        self.dots.pop();
        if let Some(else_list) = &branch.else_list {
            self.out.write_line(&["} else {"]);
            self.lower_block(else_list)?;
        }
        self.out.write_line(&["}"]);
        self.scopes.pop();
        Ok(())
    }

    fn lower_template(&mut self, template: &TemplateNode) -> Result<()> {
        self.flush()?;
        let data = match &template.pipe {
            Some(pipe) => self.lower_condition(pipe)?,
            None => "null".to_string(),
        };
        let target = self.session.function_path(&template.name).ok_or_else(|| {
            self.error(
                template.pos,
                format!(
                    "template name {:?} cannot be called without a namespace",
                    template.name
                ),
            )
        })?;
        self.acc.enqueue(format!("{target}({data})"))?;
        Ok(())
    }

    fn jump(&mut self, keyword: &str) -> Result<()> {
        self.flush()?;
        self.out.write_line(&[keyword, ";"]);
        Ok(())
    }

    /// Indented list followed by a flush, for the inside of a brace pair.
    fn lower_block(&mut self, list: &ListNode) -> Result<()> {
        self.out.increase_indent();
        self.lower_list(list)?;
        self.flush()?;
        self.out.decrease_indent()?;
        Ok(())
    }

    /// The value a control structure tests, declaring its variable if any.
    fn lower_condition(&mut self, pipe: &PipeNode) -> Result<String> {
        if pipe.decl.is_empty() {
            self.lower_pipe(pipe)
        } else {
            self.lower_declaration(pipe)
        }
    }

    /// Emit the statement binding the variable declared by `pipe` and
    /// return its JavaScript name.
    fn lower_declaration(&mut self, pipe: &PipeNode) -> Result<String> {
        let [var] = pipe.decl.as_slice() else {
            return Err(self.error(pipe.pos, "too many declarations"));
        };
        let value = self.lower_pipe(pipe)?;
        self.bind(var, pipe.is_assign, &value)
    }

    fn bind(&mut self, var: &VariableNode, is_assign: bool, value: &str) -> Result<String> {
        let name = if is_assign {
            let name = self.lookup(var)?;
            self.out.write_line(&[&name, " = ", value, ";"]);
            name
        } else {
            let name = self.declare(var.name());
            self.out.write_line(&["var ", &name, " = ", value, ";"]);
            name
        };
        Ok(name)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn lower_pipe(&mut self, pipe: &PipeNode) -> Result<String> {
        let mut value = None;
        for cmd in &pipe.cmds {
            value = Some(self.lower_command(cmd, value)?);
        }
        value.ok_or_else(|| self.error(pipe.pos, "missing value for pipeline"))
    }

    /// Lower one pipeline stage; `piped` is the previous stage's value.
    fn lower_command(&mut self, cmd: &CommandNode, piped: Option<String>) -> Result<String> {
        let Some((first, rest)) = cmd.args.split_first() else {
            return Err(self.error(cmd.pos, "empty command"));
        };
        let mut args = Vec::with_capacity(rest.len() + 1);
        for arg in rest {
            args.push(self.lower_operand(arg)?);
        }
        args.extend(piped);

        match first {
            Node::Identifier(ident) if self.session.is_short_circuit(&ident.ident) => {
                self.short_circuit(&ident.ident, args, ident.pos)
            }
            Node::Identifier(ident) => {
                let callee = self.callee(&ident.ident, ident.pos)?;
                Ok(call(&callee, &args))
            }
            Node::Field(field) => {
                let dot = self.dot().to_string();
                self.invoke(&dot, &field.ident, &args, first)
            }
            Node::Chain(chain) => {
                let base = self.lower_chain_base(&chain.node)?;
                self.invoke(&base, &chain.field, &args, first)
            }
            Node::Variable(var) => {
                let base = self.lookup(var)?;
                self.invoke(&base, var.ident.get(1..).unwrap_or_default(), &args, first)
            }
            Node::Nil(nil) => Err(self.error(nil.pos, "nil is not a command")),
            other => {
                let value = self.lower_operand(other)?;
                if !args.is_empty() {
                    return Err(self.non_function(other));
                }
                Ok(value)
            }
        }
    }

    /// Lower an expression-position node.
    fn lower_operand(&mut self, node: &Node) -> Result<String> {
        match node {
            Node::Dot(_) => Ok(self.dot().to_string()),
            Node::Nil(_) => Ok("null".to_string()),
            Node::Bool(b) => Ok(b.value.to_string()),
            Node::String(s) => Ok(js_string(&s.text)),
            Node::Number(n) => n.to_js_literal().ok_or_else(|| {
                self.error(n.pos, format!("complex constant {} is not supported", n.text))
            }),
            Node::Field(field) => Ok(access(self.dot(), &field.ident)),
            Node::Variable(var) => {
                let base = self.lookup(var)?;
                Ok(access(&base, var.ident.get(1..).unwrap_or_default()))
            }
            Node::Chain(chain) => {
                let base = self.lower_chain_base(&chain.node)?;
                Ok(access(&base, &chain.field))
            }
            Node::Identifier(ident) if self.session.is_short_circuit(&ident.ident) => {
                self.short_circuit(&ident.ident, Vec::new(), ident.pos)
            }
            Node::Identifier(ident) => {
                let callee = self.callee(&ident.ident, ident.pos)?;
                Ok(call(&callee, &[]))
            }
            Node::Pipe(pipe) => {
                if !pipe.decl.is_empty() {
                    return Err(self.error(
                        pipe.pos,
                        "declarations in parenthesized pipelines are not supported",
                    ));
                }
                self.lower_pipe(pipe)
            }
            Node::Command(cmd) => self.lower_command(cmd, None),
            other => Err(unexpected(other, "expression")),
        }
    }

    /// Builtin `and`/`or`: each argument is evaluated only while the result
    /// is still undecided. The result is the deciding argument, or the last.
    fn short_circuit(&mut self, name: &str, mut args: Vec<String>, pos: Pos) -> Result<String> {
        let Some(mut value) = args.pop() else {
            return Err(self.error(
                pos,
                format!("wrong number of args for {name}: want at least 1 got 0"),
            ));
        };
        while let Some(arg) = args.pop() {
            let [param] = self.temps(["cond"]);
            let test = self.truth(&param);
            let choice = if name == "and" {
                format!("{test} ? {value} : {param}")
            } else {
                format!("{test} ? {param} : {value}")
            };
            value = format!("(function({param}) {{ return {choice}; }})({arg})");
        }
        Ok(value)
    }

    fn lower_chain_base(&mut self, node: &Node) -> Result<String> {
        let base = self.lower_operand(node)?;
        Ok(match node {
            Node::Pipe(_) => format!("({base})"),
            _ => base,
        })
    }

    /// `base` followed by `path`, called as a method when there are
    /// arguments.
    fn invoke(&self, base: &str, path: &[String], args: &[String], node: &Node) -> Result<String> {
        let target = access(base, path);
        if args.is_empty() {
            Ok(target)
        } else if path.is_empty() {
            Err(self.non_function(node))
        } else {
            Ok(call(&target, args))
        }
    }

    // =========================================================================
    // Names
    // =========================================================================

    fn dot(&self) -> &str {
        self.dots.last().map_or(DATA_PARAM, String::as_str)
    }

    fn truth(&self, value: &str) -> String {
        format!("{}({value})", self.session.helper("truth"))
    }

    fn callee(&self, name: &str, pos: Pos) -> Result<String> {
        self.session
            .callee(name)
            .ok_or_else(|| self.error(pos, format!("function {name:?} not defined")))
    }

    fn lookup(&self, var: &VariableNode) -> Result<String> {
        let name = var.name();
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(declared, _)| declared == name)
            .map(|(_, js)| js.clone())
            .ok_or_else(|| self.error(var.pos, format!("undefined variable {name:?}")))
    }

    /// Bring template variable `name` into the innermost scope under a
    /// JavaScript name not used anywhere else in the function.
    fn declare(&mut self, name: &str) -> String {
        let mut js = name.to_string();
        let mut suffix = 0;
        while self.used.contains(&js) {
            suffix += 1;
            js = format!("{name}_{suffix}");
        }
        self.used.insert(js.clone());
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), js.clone()));
        }
        js
    }

    /// Fresh temporaries sharing one numeric suffix.
    fn temps<const N: usize>(&mut self, bases: [&str; N]) -> [String; N] {
        loop {
            let id = self.next_temp;
            self.next_temp += 1;
            let names = bases.map(|base| format!("{base}{id}"));
            if names.iter().all(|name| !self.used.contains(name)) {
                self.used.extend(names.iter().cloned());
                return names;
            }
        }
    }

    fn error(&self, pos: Pos, message: impl Into<String>) -> CompileError {
        CompileError::lowering(message, self.tree, pos)
    }

    fn non_function(&self, node: &Node) -> CompileError {
        self.error(
            node.pos(),
            format!("can't give argument to non-function {node}"),
        )
    }
}

fn unexpected(node: &Node, context: &'static str) -> CompileError {
    InternalError::UnexpectedNode {
        kind: node.kind(),
        context,
    }
    .into()
}

fn access(base: &str, path: &[String]) -> String {
    path.iter()
        .fold(base.to_string(), |target, key| property(&target, key))
}

fn call(callee: &str, args: &[String]) -> String {
    format!("{callee}({})", args.join(", "))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tmpljs_parse::{
        ActionNode, BoolNode, DotNode, IdentifierNode, NodeKind, NumberKind, NumberNode, TextNode,
    };

    use super::*;
    use crate::compile::Compiler;
    use crate::error::CompileErrorKind;

    fn tree() -> Tree {
        Tree::new("t", "t", ListNode::new(0), Arc::from("{{x}}"))
    }

    /// Lower `node` in statement position into a fresh function body.
    fn lower(node: &Node) -> Result<String> {
        let compiler = Compiler::new();
        let trees = Default::default();
        let session = Session::new(&compiler, &trees)?;
        let tree = tree();
        let mut out = Emitter::new();
        let mut acc = Accumulators::default();
        acc.push_frame(OUTPUT_VAR);
        acc.mark_initialized()?;
        let mut lowerer = Lowerer::new(&session, &tree, &mut out, &mut acc);
        lowerer.lower_node(node)?;
        lowerer.flush()?;
        Ok(out.finish())
    }

    fn command(args: Vec<Node>) -> CommandNode {
        CommandNode { pos: 0, args }
    }

    fn action(cmds: Vec<CommandNode>) -> Node {
        let mut pipe = PipeNode::new(0);
        pipe.cmds = cmds;
        Node::Action(ActionNode { pos: 0, pipe })
    }

    #[test]
    fn text_is_queued() {
        let node = Node::Text(TextNode {
            pos: 0,
            text: "a'b".into(),
        });
        assert_eq!(lower(&node).unwrap(), "output.append('a\\'b');\n");
    }

    #[test]
    fn expression_in_statement_position_is_internal() {
        let node = Node::Bool(BoolNode {
            pos: 0,
            value: true,
        });
        let err = lower(&node).unwrap_err();
        assert!(err.is_internal());
        assert!(matches!(
            err.kind(),
            CompileErrorKind::Internal(InternalError::UnexpectedNode {
                kind: NodeKind::Bool,
                context: "statement",
            })
        ));
    }

    #[test]
    fn statement_in_expression_position_is_internal() {
        let text = Node::Text(TextNode {
            pos: 0,
            text: "x".into(),
        });
        let err = lower(&action(vec![command(vec![text])])).unwrap_err();
        assert!(matches!(
            err.kind(),
            CompileErrorKind::Internal(InternalError::UnexpectedNode {
                kind: NodeKind::Text,
                context: "expression",
            })
        ));
    }

    #[test]
    fn empty_pipeline_is_a_lowering_error() {
        let err = lower(&action(Vec::new())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "template: t:1: missing value for pipeline"
        );
    }

    #[test]
    fn unknown_function_is_a_lowering_error() {
        let ident = Node::Identifier(IdentifierNode {
            pos: 2,
            ident: "nope".into(),
        });
        let err = lower(&action(vec![command(vec![ident])])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "template: t:1: function \"nope\" not defined"
        );
    }

    #[test]
    fn arguments_to_constants_are_rejected() {
        let one = || {
            Node::Number(NumberNode {
                pos: 0,
                kind: NumberKind::Int,
                text: "1".into(),
            })
        };
        let err = lower(&action(vec![command(vec![one(), one()])])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "template: t:1: can't give argument to non-function 1"
        );

        let dot = Node::Dot(DotNode { pos: 0 });
        let err = lower(&action(vec![command(vec![dot, one()])])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "template: t:1: can't give argument to non-function ."
        );
    }

    #[test]
    fn builtins_call_the_runtime() {
        let ident = Node::Identifier(IdentifierNode {
            pos: 0,
            ident: "len".into(),
        });
        let js = lower(&action(vec![command(vec![ident, Node::Dot(DotNode { pos: 0 })])]));
        assert_eq!(js.unwrap(), "output.append(soy.$$tmpl.len(opt_data));\n");
    }
}
