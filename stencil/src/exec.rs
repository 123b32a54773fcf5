//! Execution
//!
//!     Runs a template from a [`TemplateSet`] against a data [`Value`].
//!     Output is built in memory and only written to the sink once the whole
//!     template has run, so a failed render writes nothing.
//!
//!     In HTML mode the template and every template it calls must have been
//!     analyzed (see [`crate::escape`]); the escaper stages the analyzer
//!     inserted are ordinary pipeline stages here. The template rendered
//!     directly must also have been analyzed as a page, from HTML text to HTML
//!     text; a callee analyzed inside a script or an open attribute is refused.

pub mod error;
mod state;

pub use error::ExecError;

use crate::funcs::FuncMap;
use crate::set::{Mode, RegistryError, TemplateSet};
use crate::value::Value;
use state::State;
use std::io;
use tracing::{debug, warn};

/// Run template `name` and write its output to `sink`.
pub fn execute<W: io::Write + ?Sized>(
    name: &str,
    set: &TemplateSet,
    funcs: &FuncMap,
    data: &Value,
    sink: &mut W,
) -> Result<(), ExecError> {
    let out = render(name, set, funcs, data)?;
    sink.write_all(out.as_bytes())?;
    Ok(())
}

/// Run template `name` and return its output.
pub fn render(
    name: &str,
    set: &TemplateSet,
    funcs: &FuncMap,
    data: &Value,
) -> Result<String, ExecError> {
    let tree = set
        .tree(name)
        .ok_or_else(|| RegistryError::UndefinedTemplate {
            name: name.to_string(),
        })?;
    if set.mode() == Mode::Html && !set.is_escaped_entry(name) {
        return Err(ExecError::NotEscaped {
            name: name.to_string(),
        });
    }

    let mut state = State::new(set, funcs, &tree.name, data.clone());
    match state.walk_list(&tree.nodes) {
        Ok(_) => {
            debug!(template = name, bytes = state.out.len(), "rendered template");
            Ok(state.out)
        }
        Err(err) => {
            warn!(template = name, error = %err, "render failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funcs::{Arity, FuncError};
    use crate::set::{ExecOptions, MissingKey};
    use crate::value::{MapKey, Object};
    use rstest::rstest;

    fn render_text(source: &str, data: Value) -> Result<String, ExecError> {
        let funcs = FuncMap::new();
        let mut set = TemplateSet::text();
        set.parse("t", source, &funcs).expect("parse failed");
        render("t", &set, &funcs, &data)
    }

    fn text(source: &str, data: Value) -> String {
        render_text(source, data).expect("render failed")
    }

    #[rstest]
    #[case("Hello, {{.}}!", "Hello, world!")]
    #[case("{{if .}}yes{{else}}no{{end}}", "yes")]
    #[case("{{if not .}}a{{else if eq . \"world\"}}b{{else}}c{{end}}", "b")]
    #[case("{{len .}}", "5")]
    #[case("{{printf \"%s-%d\" . 3}}", "world-3")]
    #[case("{{. | printf \"%q\"}}", "\"world\"")]
    #[case("{{$x := 1}}{{$x = 2}}{{$x}}", "2")]
    #[case("{{with $y := .}}{{$y}}{{end}}", "world")]
    #[case("{{print 1 2}} {{print \"a\" \"b\"}}", "1 2 ab")]
    #[case("{{slice . 1 3 | printf \"%s!\"}}", "or!")]
    #[case("{{slice . 1 3}}", "or")]
    fn test_basic_rendering(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(text(source, Value::from("world")), expected);
    }

    #[test]
    fn test_range_forms() {
        let data = Value::map([
            ("List", Value::from(vec!["a", "b", "c"])),
            (
                "Map",
                Value::map([
                    (MapKey::Int(2), "two"),
                    (MapKey::Int(0), "zero"),
                    (MapKey::Int(1), "one"),
                ]),
            ),
            ("Empty", Value::List(vec![])),
        ]);
        assert_eq!(text("{{range .List}}{{.}}{{end}}", data.clone()), "abc");
        assert_eq!(
            text("{{range $i, $v := .List}}{{$i}}={{$v}} {{end}}", data.clone()),
            "0=a 1=b 2=c "
        );
        assert_eq!(
            text("{{range $k, $v := .Map}}{{$k}}:{{$v}};{{end}}", data.clone()),
            "0:zero;1:one;2:two;"
        );
        assert_eq!(text("{{range .Empty}}x{{else}}none{{end}}", data.clone()), "none");
        assert_eq!(text("{{range .Missing}}x{{else}}nil{{end}}", data.clone()), "nil");
        assert_eq!(text("{{range 3}}{{.}}{{end}}", data), "012");
    }

    #[test]
    fn test_break_and_continue() {
        let data = Value::from(vec![1, 2, 3, 4, 5]);
        assert_eq!(
            text(
                "{{range .}}{{if eq . 2}}{{continue}}{{end}}{{if eq . 4}}{{break}}{{end}}{{.}}{{end}}",
                data
            ),
            "13"
        );
    }

    #[test]
    fn test_range_over_huge_int_breaks_early() {
        assert_eq!(
            text("{{range .}}{{if eq . 3}}{{break}}{{end}}{{.}}{{end}}done", Value::Int(i64::MAX)),
            "012done"
        );
        assert_eq!(text("{{range .}}x{{else}}none{{end}}", Value::Int(-1)), "none");
    }

    #[test]
    fn test_with_else_uses_outer_dot() {
        let data = Value::map([("Name", Value::from("root")), ("Empty", Value::from(""))]);
        assert_eq!(
            text("{{with .Empty}}inner{{else}}{{.Name}}{{end}}", data.clone()),
            "root"
        );
        assert_eq!(
            text("{{range .Name | len}}{{$.Name}}{{end}}", data),
            "rootrootrootroot"
        );
    }

    #[test]
    fn test_variables_are_scoped_to_construct() {
        assert_eq!(
            text("{{$x := 1}}{{if true}}{{$x := 2}}{{$x}}{{end}}{{$x}}", Value::Nil),
            "21"
        );
        assert_eq!(
            text("{{$x := 1}}{{if true}}{{$x = 2}}{{end}}{{$x}}", Value::Nil),
            "2"
        );
    }

    #[test]
    fn test_and_or_short_circuit() {
        let mut funcs = FuncMap::new();
        funcs.register("boom", Arity::exact(0), |_| Err(FuncError::failed("boom")));
        let mut set = TemplateSet::text();
        set.parse("t", "{{or 1 boom}} {{and 0 boom}} {{and 1 2}} {{or 0 \"\"}}", &funcs)
            .unwrap();
        assert_eq!(render("t", &set, &funcs, &Value::Nil).unwrap(), "1 0 2 ");
    }

    #[test]
    fn test_template_call_gets_fresh_stack() {
        let funcs = FuncMap::new();
        let mut set = TemplateSet::text();
        set.parse(
            "t",
            r#"{{define "item"}}[{{.}}|{{$}}]{{end}}{{$x := 1}}{{template "item" .A}}{{template "item"}}"#,
            &funcs,
        )
        .unwrap();
        let data = Value::map([("A", "a")]);
        assert_eq!(render("t", &set, &funcs, &data).unwrap(), "[a|a][|]");
    }

    #[test]
    fn test_recursion_limit() {
        let funcs = FuncMap::new();
        let options = ExecOptions {
            max_depth: 10,
            ..ExecOptions::default()
        };
        let mut set = TemplateSet::with_options(Mode::Text, options);
        set.parse("t", r#"{{define "r"}}x{{template "r" .}}{{end}}{{template "r"}}"#, &funcs)
            .unwrap();
        let err = render("t", &set, &funcs, &Value::Nil).unwrap_err();
        assert!(matches!(err, ExecError::RecursionLimitExceeded { limit: 10, .. }), "{err}");
    }

    #[test]
    fn test_missing_key_policies() {
        let data = Value::map([("A", 1)]);
        assert_eq!(text("[{{.B}}]", data.clone()), "[]");

        let funcs = FuncMap::new();
        let options = ExecOptions {
            missing_key: MissingKey::Error,
            ..ExecOptions::default()
        };
        let mut set = TemplateSet::with_options(Mode::Text, options);
        set.parse("t", "{{.B}}", &funcs).unwrap();
        let err = render("t", &set, &funcs, &data).unwrap_err();
        assert!(matches!(err, ExecError::NoSuchField { ref field, .. } if field == "B"));
    }

    #[test]
    fn test_field_errors() {
        let err = render_text("{{.A.B}}", Value::map([("A", Value::Nil)])).unwrap_err();
        assert!(matches!(err, ExecError::NilDereference { ref field, .. } if field == "B"));

        let err = render_text("{{.A}}", Value::Int(3)).unwrap_err();
        assert!(matches!(err, ExecError::NoSuchField { ref type_name, .. } if type_name == "int"));
    }

    #[test]
    fn test_function_error_discards_output() {
        let funcs = FuncMap::new();
        let mut set = TemplateSet::text();
        set.parse("t", "partial {{index .L 5}}", &funcs).unwrap();
        let mut sink = Vec::new();
        let data = Value::map([("L", vec![1])]);
        let err = execute("t", &set, &funcs, &data, &mut sink).unwrap_err();
        assert!(matches!(err, ExecError::Func { ref name, .. } if name == "index"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_undefined_template_at_call_time() {
        let err = render_text(r#"{{template "nope"}}"#, Value::Nil).unwrap_err();
        assert!(matches!(
            err,
            ExecError::Registry(RegistryError::UndefinedTemplate { .. })
        ));
    }

    #[test]
    fn test_function_missing_from_exec_map() {
        let mut funcs = FuncMap::new();
        funcs.register("shout", Arity::exact(1), |args| {
            Ok(Value::from(args[0].to_text().to_uppercase()))
        });
        let mut set = TemplateSet::text();
        set.parse("t", "{{shout .}}", &funcs).unwrap();
        let err = render("t", &set, &FuncMap::new(), &Value::from("x")).unwrap_err();
        assert!(matches!(err, ExecError::UndefinedFunction { .. }));
        assert_eq!(render("t", &set, &funcs, &Value::from("x")).unwrap(), "X");
    }

    #[derive(Debug)]
    struct User {
        name: String,
    }

    impl Object for User {
        fn type_name(&self) -> &str {
            "User"
        }

        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "Name" => Some(Value::from(self.name.as_str())),
                _ => None,
            }
        }

        fn call_method(&self, name: &str, args: &[Value]) -> Option<Result<Value, FuncError>> {
            match name {
                "Initial" => Some(Ok(Value::from(self.name.chars().take(1).collect::<String>()))),
                "Greet" => Some(match args {
                    [greeting] => Ok(Value::from(format!("{}, {}", greeting, self.name))),
                    _ => Err(FuncError::failed("Greet takes one argument")),
                }),
                _ => None,
            }
        }

        fn has_method(&self, name: &str) -> bool {
            matches!(name, "Initial" | "Greet")
        }
    }

    #[test]
    fn test_object_fields_and_methods() {
        let data = Value::map([(
            "U",
            Value::object(User {
                name: "Ada".to_string(),
            }),
        )]);
        assert_eq!(
            text(r#"{{.U.Name}} {{.U.Initial}} {{.U.Greet "Hi"}} {{"Yo" | .U.Greet}}"#, data.clone()),
            "Ada A Hi, Ada Yo, Ada"
        );
        let err = render_text("{{.U.Age}}", data).unwrap_err();
        assert!(matches!(err, ExecError::NoSuchField { ref type_name, .. } if type_name == "User"));
    }

    #[test]
    fn test_html_mode_requires_analysis() {
        let funcs = FuncMap::new();
        let mut set = TemplateSet::html();
        set.parse("t", "<p>{{.}}</p>", &funcs).unwrap();
        let err = render("t", &set, &funcs, &Value::from("<x>")).unwrap_err();
        assert!(matches!(err, ExecError::NotEscaped { .. }));
        set.escape("t").unwrap();
        assert_eq!(
            render("t", &set, &funcs, &Value::from("<x>")).unwrap(),
            "<p>&lt;x&gt;</p>"
        );
    }

    #[test]
    fn test_callee_only_analysis_refuses_direct_render() {
        let funcs = FuncMap::new();
        let mut set = TemplateSet::html();
        set.parse("page", r#"{{template "open" .}}">x</a>"#, &funcs).unwrap();
        set.parse("open", r#"<a href=""#, &funcs).unwrap();
        set.escape("page").unwrap();
        assert_eq!(
            render("page", &set, &funcs, &Value::Nil).unwrap(),
            r#"<a href="">x</a>"#
        );
        let err = render("open", &set, &funcs, &Value::Nil).unwrap_err();
        assert!(matches!(err, ExecError::NotEscaped { ref name } if name == "open"));
        // Analyzing it as a page reports why it can't be one
        assert!(matches!(
            set.escape("open"),
            Err(crate::escape::AnalysisError::UnterminatedContext { .. })
        ));
    }
}
