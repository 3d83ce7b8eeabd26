//! The compilation driver and its configuration.

use std::collections::{BTreeMap, HashSet};

use tmpljs_parse::{BUILTINS, DEFAULT_LEFT_DELIM, DEFAULT_RIGHT_DELIM, Tree, TreeSet};

use crate::accumulator::{Accumulators, DEFAULT_BUFFER_TYPE};
use crate::emitter::Emitter;
use crate::error::CompileError;
use crate::escape::{is_identifier, property};
use crate::lower::{DATA_PARAM, Lowerer, OUTPUT_VAR, SB_PARAM};

/// Default helper object providing truthiness, iteration and builtins.
pub const DEFAULT_RUNTIME: &str = "soy.$$tmpl";

const HEADER: [&str; 2] = [
    "// Code generated by tmpljs.",
    "// Please don't edit this file by hand.",
];

/// What an identifier in a template calls.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Callee {
    /// A builtin, provided by the runtime helper object.
    Builtin,
    /// A JavaScript expression supplied by the user.
    Script(String),
}

/// Compiles parsed templates into JavaScript.
///
/// A `Compiler` only holds configuration; every call to [`Compiler::compile`]
/// starts from scratch, so one compiler can serve many threads.
///
/// ```
/// use tmpljs::Compiler;
///
/// let js = Compiler::new()
///     .namespace("app.views")
///     .func("upper", "app.util.upper")
///     .header(false)
///     .compile_source("title", "<h1>{{.Title | upper}}</h1>")?;
/// assert!(js.contains("app.views.title = function(opt_data, opt_sb) {"));
/// assert!(js.contains("output.append('<h1>', app.util.upper(opt_data.Title), '<\\/h1>');"));
/// # Ok::<(), tmpljs::CompileError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Compiler {
    namespace: String,
    left_delim: String,
    right_delim: String,
    buffer_type: String,
    runtime: String,
    funcs: BTreeMap<String, Callee>,
    header: bool,
}

impl Default for Compiler {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            left_delim: DEFAULT_LEFT_DELIM.to_string(),
            right_delim: DEFAULT_RIGHT_DELIM.to_string(),
            buffer_type: DEFAULT_BUFFER_TYPE.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
            funcs: BUILTINS
                .iter()
                .map(|name| (name.to_string(), Callee::Builtin))
                .collect(),
            header: true,
        }
    }
}

impl Compiler {
    /// A compiler with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dot-separated object path the functions are attached to.
    ///
    /// Leading, trailing and repeated dots are ignored. Without a namespace
    /// each template becomes a top-level `var`.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Action delimiters used by [`Compiler::compile_source`]. Empty strings
    /// select the defaults.
    pub fn delimiters(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        let (left, right) = (left.into(), right.into());
        self.left_delim = if left.is_empty() {
            DEFAULT_LEFT_DELIM.to_string()
        } else {
            left
        };
        self.right_delim = if right.is_empty() {
            DEFAULT_RIGHT_DELIM.to_string()
        } else {
            right
        };
        self
    }

    /// Constructor expression for output accumulators.
    pub fn buffer_type(mut self, buffer_type: impl Into<String>) -> Self {
        self.buffer_type = buffer_type.into();
        self
    }

    /// Expression for the runtime helper object.
    pub fn runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Make `name` callable from templates as the JavaScript function
    /// `callee`. Replaces a builtin of the same name.
    pub fn func(mut self, name: impl Into<String>, callee: impl Into<String>) -> Self {
        self.funcs
            .insert(name.into(), Callee::Script(callee.into()));
        self
    }

    /// Whether to start the output with a generated-code comment.
    pub fn header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// Parse `source` as the template `name` and compile it, along with
    /// every template it defines.
    pub fn compile_source(&self, name: &str, source: &str) -> Result<String, CompileError> {
        let trees = tmpljs_parse::parse(
            name,
            source,
            &self.left_delim,
            &self.right_delim,
            &self.funcs,
        )?;
        self.compile(&trees)
    }

    /// Compile every tree in `trees` into one script.
    ///
    /// Functions appear in name order. On error no output is produced.
    pub fn compile(&self, trees: &TreeSet) -> Result<String, CompileError> {
        let session = Session::new(self, trees)?;
        let mut out = Emitter::new();
        let mut acc = Accumulators::new(self.buffer_type.as_str());

        if self.header {
            for line in HEADER {
                out.write_line(&[line]);
            }
            out.write_line(&[]);
        }
        write_namespace_guards(&mut out, &session.namespace);

        for (index, tree) in trees.values().enumerate() {
            if index > 0 {
                out.write_line(&[]);
            }
            session
                .compile_tree(&mut out, &mut acc, tree)
                .map_err(|err| err.in_template(&tree.name))?;
        }
        debug!(
            templates = trees.len(),
            namespace = %session.namespace,
            "compiled templates"
        );
        Ok(out.finish())
    }

    fn namespace_path(&self) -> Result<String, CompileError> {
        let segments: Vec<&str> = self
            .namespace
            .split('.')
            .filter(|segment| !segment.is_empty())
            .collect();
        if let Some(bad) = segments.iter().find(|segment| !is_identifier(segment)) {
            return Err(CompileError::unlocated(format!(
                "namespace segment {bad:?} is not a valid JavaScript identifier"
            )));
        }
        Ok(segments.join("."))
    }
}

/// Compile the template `source` named `name` with the default settings,
/// attaching the functions to `namespace`.
///
/// ```
/// let js = tmpljs::compile_to_script("hello", "hello {{\"world\"}}", "greet")?;
/// assert!(js.contains("output.append('hello ', 'world');"));
/// # Ok::<(), tmpljs::CompileError>(())
/// ```
pub fn compile_to_script(name: &str, source: &str, namespace: &str) -> Result<String, CompileError> {
    Compiler::new().namespace(namespace).compile_source(name, source)
}

/// Existence checks creating each prefix of `namespace`.
fn write_namespace_guards(out: &mut Emitter, namespace: &str) {
    if namespace.is_empty() {
        return;
    }
    let mut prefix = String::new();
    for segment in namespace.split('.') {
        if prefix.is_empty() {
            prefix.push_str(segment);
            out.write_line(&[
                "if (typeof ", &prefix, " == 'undefined') { var ", &prefix, " = {}; }",
            ]);
        } else {
            prefix.push('.');
            prefix.push_str(segment);
            out.write_line(&[
                "if (typeof ", &prefix, " == 'undefined') { ", &prefix, " = {}; }",
            ]);
        }
    }
    out.write_line(&[]);
}

/// Settings resolved once per compilation run.
pub(crate) struct Session<'a> {
    compiler: &'a Compiler,
    namespace: String,
    /// Names visible to every emitted function, which locals must not shadow.
    globals: HashSet<String>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(compiler: &'a Compiler, trees: &TreeSet) -> Result<Self, CompileError> {
        let namespace = compiler.namespace_path()?;
        let mut globals: HashSet<String> = [DATA_PARAM, SB_PARAM, OUTPUT_VAR]
            .into_iter()
            .map(String::from)
            .collect();
        globals.insert(root(&compiler.runtime));
        globals.insert(root(&compiler.buffer_type));
        for callee in compiler.funcs.values() {
            if let Callee::Script(expr) = callee {
                globals.insert(root(expr));
            }
        }
        if namespace.is_empty() {
            globals.extend(trees.keys().cloned());
        } else {
            globals.insert(root(&namespace));
        }
        Ok(Self {
            compiler,
            namespace,
            globals,
        })
    }

    pub(crate) fn globals(&self) -> &HashSet<String> {
        &self.globals
    }

    /// Expression naming the function compiled from template `name`.
    pub(crate) fn function_path(&self, name: &str) -> Option<String> {
        if !self.namespace.is_empty() {
            return Some(property(&self.namespace, name));
        }
        let local = [DATA_PARAM, SB_PARAM, OUTPUT_VAR].contains(&name);
        let shadows_runtime = name == root(&self.compiler.runtime)
            || name == root(&self.compiler.buffer_type)
            || self.compiler.funcs.values().any(|callee| match callee {
                Callee::Script(expr) => root(expr) == name,
                Callee::Builtin => false,
            });
        (is_identifier(name) && !local && !shadows_runtime).then(|| name.to_string())
    }

    /// JavaScript function called for the template function `name`.
    pub(crate) fn callee(&self, name: &str) -> Option<String> {
        match self.compiler.funcs.get(name)? {
            Callee::Builtin => Some(self.helper(name)),
            Callee::Script(expr) => Some(expr.clone()),
        }
    }

    /// Whether `name` is the builtin `and` or `or`, which the lowering
    /// expands inline instead of calling the runtime.
    pub(crate) fn is_short_circuit(&self, name: &str) -> bool {
        matches!(name, "and" | "or")
            && matches!(self.compiler.funcs.get(name), Some(Callee::Builtin))
    }

    /// Member `name` of the runtime helper object.
    pub(crate) fn helper(&self, name: &str) -> String {
        format!("{}.{name}", self.compiler.runtime)
    }

    fn compile_tree(
        &self,
        out: &mut Emitter,
        acc: &mut Accumulators,
        tree: &Tree,
    ) -> Result<(), CompileError> {
        let path = self.function_path(&tree.name).ok_or_else(|| {
            CompileError::unlocated(format!(
                "template name {:?} needs a namespace to be a JavaScript name",
                tree.name
            ))
        })?;
        let target = if self.namespace.is_empty() {
            format!("var {path}")
        } else {
            path
        };
        trace!(template = %tree.name, target = %target, "compiling template");

        acc.push_frame(OUTPUT_VAR);
        out.write_line(&[&target, " = function(", DATA_PARAM, ", ", SB_PARAM, ") {"]);
        out.increase_indent();
        out.write_line(&[
            "var ", OUTPUT_VAR, " = ", SB_PARAM, " || new ", &self.compiler.buffer_type, "();",
        ]);
        acc.mark_initialized()?;

        let mut lowerer = Lowerer::new(self, tree, out, acc);
        lowerer.lower_list(&tree.root)?;
        lowerer.flush()?;

        out.write_line(&["return ", SB_PARAM, " ? '' : ", OUTPUT_VAR, ".toString();"]);
        out.decrease_indent()?;
        out.write_line(&["};"]);
        acc.pop_frame()?;
        Ok(())
    }
}

/// Leading identifier of a JavaScript member expression.
fn root(expr: &str) -> String {
    expr.split(['.', '[', '('])
        .next()
        .unwrap_or(expr)
        .trim()
        .to_string()
}
