//! Shape of the JavaScript emitted for whole templates.

use indoc::indoc;
use tmpljs::{CompileError, Compiler, compile_to_script};
use tmpljs_testhelpers::IPanic;

const GUARD: &str = "if (typeof t == 'undefined') { var t = {}; }\n\n";

/// Compile `source` as template `main` in namespace `t`, without the
/// header and namespace guard.
fn compile(source: &str) -> Result<String, CompileError> {
    let js = Compiler::new()
        .header(false)
        .namespace("t")
        .compile_source("main", source)?;
    assert!(js.starts_with(GUARD), "missing guard in:\n{js}");
    Ok(js[GUARD.len()..].to_string())
}

/// `body` inside the function emitted for template `main`.
fn main_function(body: &str) -> String {
    let mut js = String::from(
        "t.main = function(opt_data, opt_sb) {\n  var output = opt_sb || new soy.StringBuilder();\n",
    );
    for line in body.lines() {
        js.push_str("  ");
        js.push_str(line);
        js.push('\n');
    }
    js.push_str("  return opt_sb ? '' : output.toString();\n};\n");
    js
}

#[test]
fn hello_world() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile_to_script("hello", r#"hello {{"world"}}"#, "greet")?;
    insta::assert_snapshot!(js, @r"
    // Code generated by tmpljs.
    // Please don't edit this file by hand.

    if (typeof greet == 'undefined') { var greet = {}; }

    greet.hello = function(opt_data, opt_sb) {
      var output = opt_sb || new soy.StringBuilder();
      output.append('hello ', 'world');
      return opt_sb ? '' : output.toString();
    };
    ");
    Ok(())
}

#[test]
fn empty_template_returns_accumulator() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("")?;
    assert_eq!(
        js,
        indoc! {"
            t.main = function(opt_data, opt_sb) {
              var output = opt_sb || new soy.StringBuilder();
              return opt_sb ? '' : output.toString();
            };
        "}
    );
    Ok(())
}

#[test]
fn adjacent_values_share_one_append() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile(r#"{{.A}}x{{.B}}y{{"z"}}{{3}}{{true}}"#)?;
    assert_eq!(js.matches("output.append(").count(), 1);
    assert!(js.contains("output.append(opt_data.A, 'x', opt_data.B, 'y', 'z', 3, true);"));
    Ok(())
}

#[test]
fn if_wrapping_range() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("a{{if .Items}}b{{range .Items}}{{.}}{{end}}c{{end}}d")?;
    insta::assert_snapshot!(js, @r"
    t.main = function(opt_data, opt_sb) {
      var output = opt_sb || new soy.StringBuilder();
      output.append('a');
      if (soy.$$tmpl.truth(opt_data.Items)) {
        output.append('b');
        var list0 = opt_data.Items;
        var keys0 = soy.$$tmpl.keys(list0);
        if (keys0.length > 0) {
          for (var i0 = 0; i0 < keys0.length; i0++) {
            var item0 = list0[keys0[i0]];
            output.append(item0);
          }
        }
        output.append('c');
      }
      output.append('d');
      return opt_sb ? '' : output.toString();
    };
    ");
    Ok(())
}

#[test]
fn else_if_chains_flatten() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("{{if .A}}a{{else if .B}}b{{else}}c{{end}}")?;
    assert_eq!(
        js,
        main_function(indoc! {"
        if (soy.$$tmpl.truth(opt_data.A)) {
          output.append('a');
        } else if (soy.$$tmpl.truth(opt_data.B)) {
          output.append('b');
        } else {
          output.append('c');
        }
        "})
    );
    Ok(())
}

#[test]
fn else_if_with_declaration_nests() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("{{if .A}}a{{else if $b := .B}}{{$b}}{{end}}")?;
    assert_eq!(
        js,
        main_function(indoc! {"
        if (soy.$$tmpl.truth(opt_data.A)) {
          output.append('a');
        } else {
          var $b = opt_data.B;
          if (soy.$$tmpl.truth($b)) {
            output.append($b);
          }
        }
        "})
    );
    Ok(())
}

#[test]
fn with_narrows_dot() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("{{with .User}}{{.Name}}{{else}}anon{{end}}{{.Name}}")?;
    assert_eq!(
        js,
        main_function(indoc! {"
        var with0 = opt_data.User;
        if (soy.$$tmpl.truth(with0)) {
          output.append(with0.Name);
        } else {
          output.append('anon');
        }
        output.append(opt_data.Name);
        "})
    );
    Ok(())
}

#[test]
fn range_binds_key_and_value() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile(
        "{{range $i, $v := .List}}{{if $v}}{{break}}{{end}}{{$i}}{{else}}none{{end}}",
    )?;
    assert_eq!(
        js,
        main_function(indoc! {"
        var list0 = opt_data.List;
        var keys0 = soy.$$tmpl.keys(list0);
        if (keys0.length > 0) {
          for (var i0 = 0; i0 < keys0.length; i0++) {
            var item0 = list0[keys0[i0]];
            var $i = keys0[i0];
            var $v = item0;
            if (soy.$$tmpl.truth($v)) {
              break;
            }
            output.append($i);
          }
        } else {
          output.append('none');
        }
        "})
    );
    Ok(())
}

#[test]
fn continue_flushes_first() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("{{range .}}a{{continue}}{{end}}")?;
    assert!(js.contains("      output.append('a');\n      continue;\n"));
    Ok(())
}

#[test]
fn nested_ranges_use_fresh_temporaries() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("{{range .Rows}}{{range .Cells}}{{.}}{{end}}{{end}}")?;
    assert!(js.contains("var list0 = opt_data.Rows;"));
    assert!(js.contains("var list1 = item0.Cells;"));
    assert!(js.contains("output.append(item1);"));
    Ok(())
}

#[test]
fn root_variable_is_the_data() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("{{range .Items}}{{$.Title}}{{end}}")?;
    assert!(js.contains("output.append(opt_data.Title);"));
    Ok(())
}

#[test]
fn shadowed_variables_get_distinct_names() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("{{$x := .A}}{{$x}}{{if .B}}{{$x := 1}}{{$x}}{{$x = 2}}{{end}}{{$x}}")?;
    assert_eq!(
        js,
        main_function(indoc! {"
        var $x = opt_data.A;
        output.append($x);
        if (soy.$$tmpl.truth(opt_data.B)) {
          var $x_1 = 1;
          output.append($x_1);
          $x_1 = 2;
        }
        output.append($x);
        "})
    );
    Ok(())
}

#[test]
fn assignment_reaches_outer_variable() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("{{$n := 0}}{{range .}}{{$n = .}}{{end}}{{$n}}")?;
    assert!(js.contains("var $n = 0;"));
    assert!(js.contains("      $n = item0;\n"));
    assert!(js.contains("output.append($n);"));
    Ok(())
}

#[test]
fn pipelines_pass_the_previous_value_last() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile(r#"{{.Name | printf "%s!" | html}}"#)?;
    assert!(js.contains("output.append(soy.$$tmpl.html(soy.$$tmpl.printf('%s!', opt_data.Name)));"));
    Ok(())
}

#[test]
fn and_stops_at_the_first_false_argument() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("{{if and .User .User.Admin}}admin{{else}}guest{{end}}")?;
    assert_eq!(
        js,
        main_function(indoc! {"
        if (soy.$$tmpl.truth((function(cond0) { return soy.$$tmpl.truth(cond0) ? opt_data.User.Admin : cond0; })(opt_data.User))) {
          output.append('admin');
        } else {
          output.append('guest');
        }
        "})
    );
    Ok(())
}

#[test]
fn or_stops_at_the_first_true_argument() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("{{.C | or .A .B}}")?;
    assert_eq!(
        js,
        main_function(indoc! {"
        output.append((function(cond1) { return soy.$$tmpl.truth(cond1) ? cond1 : (function(cond0) { return soy.$$tmpl.truth(cond0) ? cond0 : opt_data.C; })(opt_data.B); })(opt_data.A));
        "})
    );

    let js = compile("{{or .A}}")?;
    assert!(js.contains("output.append(opt_data.A);"));
    Ok(())
}

#[test]
fn registered_and_is_called_directly() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = Compiler::new()
        .header(false)
        .func("and", "util.both")
        .compile_source("main", "{{and .A .B}}")?;
    assert!(js.contains("output.append(util.both(opt_data.A, opt_data.B));"));
    Ok(())
}

#[test]
fn methods_and_chains() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile(r#"{{.User.Greet "hi"}}{{(index .M "k").Name}}{{$u := .U}}{{$u.Say 1}}"#)?;
    assert!(js.contains("opt_data.User.Greet('hi')"));
    assert!(js.contains("(soy.$$tmpl.index(opt_data.M, 'k')).Name"));
    assert!(js.contains("$u.Say(1)"));
    Ok(())
}

#[test]
fn literals() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile(r#"{{printf "%v" 0777 1_000 'a' 1.5e3 nil false "it's </b>"}}"#)?;
    assert!(js.contains(r"soy.$$tmpl.printf('%v', 0o777, 1000, 97, 1.5e3, null, false, 'it\'s <\/b>')"));
    Ok(())
}

#[test]
fn define_and_template_produce_functions() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile(r#"{{define "row"}}<li>{{.}}</li>{{end}}<ul>{{range .}}{{template "row" .}}{{end}}</ul>"#)?;
    insta::assert_snapshot!(js, @r"
    t.main = function(opt_data, opt_sb) {
      var output = opt_sb || new soy.StringBuilder();
      output.append('<ul>');
      var list0 = opt_data;
      var keys0 = soy.$$tmpl.keys(list0);
      if (keys0.length > 0) {
        for (var i0 = 0; i0 < keys0.length; i0++) {
          var item0 = list0[keys0[i0]];
          output.append(t.row(item0));
        }
      }
      output.append('<\/ul>');
      return opt_sb ? '' : output.toString();
    };

    t.row = function(opt_data, opt_sb) {
      var output = opt_sb || new soy.StringBuilder();
      output.append('<li>', opt_data, '<\/li>');
      return opt_sb ? '' : output.toString();
    };
    ");
    Ok(())
}

#[test]
fn block_defines_and_calls() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile(r#"a{{block "side" .Side}}s{{end}}{{template "side"}}"#)?;
    assert!(js.contains(
        "  output.append('a');\n  output.append(t.side(opt_data.Side));\n  output.append(t.side(null));\n"
    ));
    assert!(js.contains("t.side = function(opt_data, opt_sb) {"));
    Ok(())
}

#[test]
fn trim_markers_drop_whitespace() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("a  {{- .X -}}\n  b")?;
    assert!(js.contains("output.append('a', opt_data.X, 'b');"));
    Ok(())
}

#[test]
fn comments_emit_nothing() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("a{{/* note */}}b")?;
    assert!(js.contains("output.append('a', 'b');"));
    Ok(())
}

#[test]
fn text_is_escaped() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile("it's\n<script>x</script>\\")?;
    assert!(js.contains(r"output.append('it\'s\n<script>x<\/script>\\');"));
    let js = compile("<!-- c -->")?;
    assert!(js.contains(r"output.append('\x3c!-- c --\x3e');"));
    Ok(())
}

#[test]
fn output_is_deterministic() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let source = r#"{{define "b"}}{{.}}{{end}}{{define "a"}}{{template "b" .}}{{end}}{{range $k, $v := .}}{{$k}}{{end}}"#;
    let first = compile(source)?;
    let second = compile(source)?;
    assert_eq!(first, second);
    let a = first.find("t.a = function").expect("a");
    let b = first.find("t.b = function").expect("b");
    let main = first.find("t.main = function").expect("main");
    assert!(a < b && b < main);
    Ok(())
}

#[test]
fn indentation_is_balanced() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = compile(
        "{{range .}}{{with .A}}{{if .B}}{{range .C}}x{{else}}y{{end}}{{end}}{{end}}{{end}}",
    )?;
    let mut depth = 0usize;
    for line in js.lines().filter(|line| !line.is_empty()) {
        let trimmed = line.trim_start();
        if trimmed.starts_with('}') {
            depth -= 1;
        }
        assert_eq!(line.len() - trimmed.len(), depth * 2, "line {line:?}");
        if trimmed.ends_with('{') {
            depth += 1;
        }
    }
    assert_eq!(depth, 0);
    Ok(())
}

#[test]
fn namespace_guards_are_idempotent() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let guards = indoc! {"
        if (typeof app == 'undefined') { var app = {}; }
        if (typeof app.views == 'undefined') { app.views = {}; }

    "};
    let compiler = Compiler::new().header(false).namespace(".app..views.");
    let one = compiler.compile_source("one", "1")?;
    let two = compiler.compile_source("two", "2")?;
    assert!(one.starts_with(guards));
    assert!(two.starts_with(guards));
    assert!(one.contains("app.views.one = function(opt_data, opt_sb) {"));
    Ok(())
}

#[test]
fn no_namespace_declares_vars() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = Compiler::new()
        .header(false)
        .compile_source("page", r#"{{define "item"}}i{{end}}{{template "item"}}"#)?;
    assert!(js.starts_with("var item = function(opt_data, opt_sb) {"));
    assert!(js.contains("var page = function(opt_data, opt_sb) {"));
    assert!(js.contains("output.append(item(null));"));
    Ok(())
}

#[test]
fn names_that_are_not_identifiers_use_brackets() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = Compiler::new()
        .header(false)
        .namespace("t")
        .compile_source("page.html", r#"{{template "page.html" .Next}}"#)?;
    assert!(js.contains("t['page.html'] = function(opt_data, opt_sb) {"));
    assert!(js.contains("output.append(t['page.html'](opt_data.Next));"));
    Ok(())
}

#[test]
fn configuration_is_applied() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = Compiler::new()
        .header(false)
        .namespace("t")
        .delimiters("<%", "%>")
        .buffer_type("Buf")
        .runtime("rt")
        .func("upper", "str.upper")
        .compile_source("main", "<%if .A%><%.B | upper%><%end%>{{x}}")?;
    assert!(js.contains("var output = opt_sb || new Buf();"));
    assert!(js.contains("if (rt.truth(opt_data.A)) {"));
    assert!(js.contains("output.append(str.upper(opt_data.B));"));
    assert!(js.contains("output.append('{{x}}');"));
    Ok(())
}

#[test]
fn temporaries_avoid_global_names() -> Result<(), IPanic> {
    tmpljs_testhelpers::setup();
    let js = Compiler::new()
        .header(false)
        .namespace("list0")
        .compile_source("main", "{{range .}}{{.}}{{end}}")?;
    assert!(js.contains("var list1 = opt_data;"));
    assert!(js.contains("var keys1 = soy.$$tmpl.keys(list1);"));
    Ok(())
}
