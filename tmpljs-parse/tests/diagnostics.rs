//! Parse errors as seen by callers rendering diagnostics.

use std::collections::BTreeMap;

use miette::Diagnostic;
use tmpljs_parse::{BUILTINS, ParseErrorKind, parse};
use tmpljs_testhelpers::IPanic;

#[test]
fn error_carries_span_and_code() {
    tmpljs_testhelpers::setup();
    let source = "line one\n{{$missing}}";
    let err = parse("page", source, "", "", BUILTINS).unwrap_err();

    assert_eq!(
        err.kind(),
        &ParseErrorKind::UndefinedVariable("$missing".into())
    );
    assert_eq!(err.template(), "page");
    assert_eq!(err.line(), 2);
    let span = err.span().expect("span");
    assert_eq!(&source[span.offset()..span.offset() + span.len()], "$missing");

    let code = Diagnostic::code(&err).expect("code").to_string();
    assert_eq!(code, "tmpljs::parse::undefined_variable");
    let labels: Vec<_> = err.labels().expect("labels").collect();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].label(), Some("`$missing` is not declared"));
}

#[cfg(feature = "suggestions")]
#[test]
fn unknown_function_help_offers_suggestion() {
    tmpljs_testhelpers::setup();
    let mut funcs = BTreeMap::new();
    funcs.insert("upper".to_string(), ());
    let err = parse("page", "{{uper .Name}}", "", "", &funcs).unwrap_err();
    let help = err.help().expect("help").to_string();
    assert_eq!(help, "did you mean `upper`?");
}

#[test]
fn user_functions_are_accepted() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let funcs: BTreeMap<String, &str> = [("upper".to_string(), "toUpper")].into();
    let trees = parse("page", "{{.Name | upper}}", "", "", &funcs)?;
    assert_eq!(trees["page"].root.to_string(), "{{.Name | upper}}");
    Ok(())
}

#[test]
fn positions_map_back_to_source() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let source = "a\n  {{.B}}";
    let trees = parse("page", source, "", "", BUILTINS)?;
    let tree = &trees["page"];
    let action = &tree.root.nodes[1];
    assert_eq!(tree.location(action.pos()), (2, 5));
    assert_eq!(tree.source(), source);
    Ok(())
}
