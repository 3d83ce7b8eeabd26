//! Failures surfaced by the compiler and the kinds they are reported as.

use std::sync::Arc;

use miette::Diagnostic;
use tmpljs::parse::{
    ActionNode, BoolNode, CommandNode, ListNode, Node, NodeKind, PipeNode, Tree, TreeSet,
    VariableNode,
};
use tmpljs::{CompileError, CompileErrorKind, Compiler, InternalError, compile_to_script};

fn compile(source: &str) -> Result<String, CompileError> {
    Compiler::new().namespace("t").compile_source("page", source)
}

/// A tree set holding one template `page` with the given root nodes.
fn trees(source: &str, nodes: Vec<Node>) -> TreeSet {
    let mut root = ListNode::new(0);
    for node in nodes {
        root.push(node);
    }
    let tree = Tree::new("page", "page", root, Arc::from(source));
    [("page".to_string(), tree)].into()
}

fn action(args: Vec<Node>) -> Node {
    let mut pipe = PipeNode::new(0);
    pipe.cmds.push(CommandNode { pos: 0, args });
    Node::Action(ActionNode { pos: 0, pipe })
}

#[test]
fn syntax_errors_keep_parser_messages() {
    tmpljs_testhelpers::setup();
    let cases = [
        ("{{if}}{{end}}", "template: page:1: missing value for if"),
        ("{{if .A}}", "template: page:1: unexpected EOF"),
        ("a\n{{end}}", "template: page:2: unexpected {{end}}"),
        ("{{$missing}}", "template: page:1: undefined variable \"$missing\""),
        ("{{zzz 1}}", "template: page:1: function \"zzz\" not defined"),
        ("{{break}}", "template: page:1: {{break}} outside {{range}}"),
    ];
    for (source, message) in cases {
        let err = compile(source).unwrap_err();
        assert!(
            matches!(err.kind(), CompileErrorKind::Parse(_)),
            "{source}: {err:?}"
        );
        assert_eq!(err.to_string(), message, "{source}");
        assert_eq!(err.template(), Some("page"));
    }
}

#[test]
fn parse_diagnostics_pass_through() {
    tmpljs_testhelpers::setup();
    let err = compile_to_script("page", "x\n{{$y}}", "").unwrap_err();
    let code = Diagnostic::code(&err).expect("code").to_string();
    assert_eq!(code, "tmpljs::parse::undefined_variable");
    let labels: Vec<_> = err.labels().expect("labels").collect();
    assert_eq!(labels[0].label(), Some("`$y` is not declared"));
    assert_eq!(labels[0].offset(), 4);
}

#[test]
fn arguments_to_non_functions() {
    tmpljs_testhelpers::setup();
    let err = compile(r#"{{"x" 1}}"#).unwrap_err();
    assert!(matches!(err.kind(), CompileErrorKind::Lowering { .. }));
    assert_eq!(
        err.to_string(),
        "template: page:1: can't give argument to non-function \"x\""
    );

    let err = compile("{{$v := 1}}\n{{$v 2}}").unwrap_err();
    assert_eq!(
        err.to_string(),
        "template: page:2: can't give argument to non-function $v"
    );
}

#[test]
fn complex_constants_are_rejected() {
    tmpljs_testhelpers::setup();
    let err = compile("{{print 1+2i}}").unwrap_err();
    assert!(matches!(err.kind(), CompileErrorKind::Lowering { .. }));
    assert_eq!(
        err.to_string(),
        "template: page:1: complex constant 1+2i is not supported"
    );
    let code = Diagnostic::code(&err).expect("code").to_string();
    assert_eq!(code, "tmpljs::lowering");
    let labels: Vec<_> = err.labels().expect("labels").collect();
    assert_eq!(labels[0].offset(), 8);
}

#[test]
fn nil_is_not_a_command() {
    tmpljs_testhelpers::setup();
    let err = compile("{{nil}}").unwrap_err();
    assert_eq!(err.to_string(), "template: page:1: nil is not a command");
}

#[test]
fn and_needs_an_argument() {
    tmpljs_testhelpers::setup();
    let err = compile("x\n{{and}}").unwrap_err();
    assert!(matches!(err.kind(), CompileErrorKind::Lowering { .. }));
    assert_eq!(
        err.to_string(),
        "template: page:2: wrong number of args for and: want at least 1 got 0"
    );
}

#[test]
fn no_namespace_names_cannot_shadow_the_runtime() {
    tmpljs_testhelpers::setup();
    let err = Compiler::new()
        .header(false)
        .compile_source("soy", "x{{.A}}")
        .unwrap_err();
    assert!(matches!(err.kind(), CompileErrorKind::Lowering { .. }));
    assert_eq!(err.template(), Some("soy"));
    assert!(err.to_string().contains("needs a namespace"), "{err}");

    let err = Compiler::new()
        .func("up", "util.up")
        .compile_source("util", "x")
        .unwrap_err();
    assert_eq!(err.template(), Some("util"));

    let js = compile_to_script("soy", "x", "t");
    assert!(js.is_ok());
}

#[test]
fn undeclared_variables_in_built_trees() {
    tmpljs_testhelpers::setup();
    let source = "{{$ghost}}";
    let set = trees(source, vec![action(vec![Node::Variable(VariableNode::new(2, "$ghost"))])]);
    let err = Compiler::new().compile(&set).unwrap_err();
    assert!(matches!(err.kind(), CompileErrorKind::Lowering { .. }));
    assert_eq!(
        err.to_string(),
        "template: page:1: undefined variable \"$ghost\""
    );
}

#[test]
fn misplaced_node_is_an_internal_error() {
    tmpljs_testhelpers::setup();
    let set = trees("", vec![Node::Bool(BoolNode { pos: 0, value: true })]);
    let err = Compiler::new().compile(&set).unwrap_err();
    assert!(err.is_internal());
    assert_eq!(
        err.kind().code(),
        "tmpljs::internal::unexpected_node"
    );
    assert!(matches!(
        err.kind(),
        CompileErrorKind::Internal(InternalError::UnexpectedNode {
            kind: NodeKind::Bool,
            ..
        })
    ));
    assert!(
        err.to_string()
            .starts_with("internal compiler error: unexpected bool node in statement position")
    );
    assert!(err.help().is_some());
}

#[test]
fn template_names_need_a_namespace_to_be_addressable() {
    tmpljs_testhelpers::setup();
    let err = compile_to_script("page.html", "x", "").unwrap_err();
    assert!(matches!(err.kind(), CompileErrorKind::Lowering { .. }));
    assert_eq!(err.template(), Some("page.html"));

    let err = Compiler::new()
        .compile_source("page", r#"{{template "row.html"}}"#)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "template: page:1: template name \"row.html\" cannot be called without a namespace"
    );
}

#[test]
fn bad_namespace() {
    tmpljs_testhelpers::setup();
    let err = compile_to_script("page", "x", "my-app.views").unwrap_err();
    assert_eq!(
        err.to_string(),
        "namespace segment \"my-app\" is not a valid JavaScript identifier"
    );
}

#[test]
fn errors_abort_the_whole_run() {
    tmpljs_testhelpers::setup();
    let result = compile(r#"{{define "a"}}ok{{end}}{{define "b"}}{{print 2i}}{{end}}"#);
    let err = result.unwrap_err();
    assert_eq!(err.template(), Some("b"));
}
