//! Integration tests for template evaluation.

use std::error::Error;
use std::sync::Arc;

use stg::{
    CollectingListener, Diagnostic, ErrorKind, FormalParameter, Formals, Group, Interpreter, Model,
    ScalarKind, StringRenderer, Value,
};

fn collecting(name: &str) -> (Group, Arc<CollectingListener>) {
    let listener = Arc::new(CollectingListener::new());
    let mut group = Group::new(name);
    group.set_listener(listener.clone());
    (group, listener)
}

fn kinds(listener: &CollectingListener) -> Vec<ErrorKind> {
    listener.take().iter().map(Diagnostic::kind).collect()
}

#[derive(Debug)]
struct User {
    name: String,
    id: i64,
}

impl Model for User {
    fn type_name(&self) -> &str {
        "User"
    }

    fn property(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(self.name.as_str().into()),
            "id" => Some(self.id.into()),
            _ => None,
        }
    }
}

// =============================================================================
// Invocation
// =============================================================================

#[test]
fn positional_and_named_arguments() {
    let mut group = Group::new("test");
    group
        .define("pair", Formals::names(["a", "b"]), "<a>-<b>")
        .unwrap();
    group
        .define("t", Formals::Open, "<pair(\"x\", \"y\")> <pair(b=\"y\")>")
        .unwrap();
    assert_eq!(group.instance_of("t").unwrap().render(), "x-y -y");
}

#[test]
fn defaults_apply_only_to_unset_parameters() {
    let mut group = Group::new("test");
    group
        .define(
            "greet",
            vec![
                FormalParameter::new("name"),
                FormalParameter::with_default("greeting", "\"Hello\""),
            ],
            "<greeting>, <name>",
        )
        .unwrap();
    let mut st = group.instance_of("greet").unwrap();
    st.set("name", "Ter").unwrap();
    assert_eq!(st.render(), "Hello, Ter");
    st.set("greeting", "Hi").unwrap();
    assert_eq!(st.render(), "Hi, Ter");
    st.set("greeting", Value::Null).unwrap();
    assert_eq!(st.render(), ", Ter");
}

#[test]
fn defaults_are_evaluated_in_the_callee() {
    let mut group = Group::new("test");
    group
        .define(
            "box",
            vec![
                FormalParameter::new("x"),
                FormalParameter::with_default("label", "{[<x>]}"),
            ],
            "<label>",
        )
        .unwrap();
    group.define("t", Formals::Open, "<box(x=\"a\")>").unwrap();
    assert_eq!(group.instance_of("t").unwrap().render(), "[a]");
}

#[test]
fn template_instances_as_attribute_values() {
    let mut group = Group::new("test");
    group.define("bold", Formals::names(["x"]), "*<x>*").unwrap();
    group.define("page", Formals::names(["body"]), "(<body>)").unwrap();
    let mut bold = group.instance_of("bold").unwrap();
    bold.set("x", "hi").unwrap();
    let mut page = group.instance_of("page").unwrap();
    page.set("body", bold).unwrap();
    assert_eq!(page.render(), "(*hi*)");
}

#[test]
fn indirect_invocation() {
    let mut group = Group::new("test");
    group.define("bold", Formals::names(["x"]), "*<x>*").unwrap();
    let mut st = group
        .instance_from_source("<(name)(x=\"hi\")>|<({bo<suffix>})(x=\"yo\")>")
        .unwrap();
    st.set("name", "bold").unwrap();
    st.set("suffix", "ld").unwrap();
    assert_eq!(st.render(), "*hi*|*yo*");
}

#[test]
fn undefined_indirect_template_aborts_only_that_instance() {
    let (mut group, listener) = collecting("test");
    group
        .define("inner", Formals::names(["n"]), "a<(n)()>b")
        .unwrap();
    group
        .define("outer", Formals::Open, "[<inner(n=\"nope\")>]")
        .unwrap();
    assert_eq!(group.instance_of("outer").unwrap().render(), "[a]");
    let diagnostics = listener.take();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind(), ErrorKind::UndefinedTemplate);
    assert_eq!(diagnostics[0].call_path(), ["outer", "inner"]);
}

#[test]
fn indirect_invocation_checks_argument_count() {
    let (mut group, listener) = collecting("test");
    group.define("one", Formals::names(["x"]), "<x>").unwrap();
    let mut st = group
        .instance_from_source("<(name)(\"a\", \"b\")>after")
        .unwrap();
    st.set("name", "one").unwrap();
    assert_eq!(st.render(), "");
    assert_eq!(kinds(&listener), [ErrorKind::ArgumentCountMismatch]);
}

#[test]
fn recursion_limit_stops_runaway_templates() {
    let (mut group, listener) = collecting("test");
    group.define("r", Formals::Open, "x<r()>").unwrap();
    let st = group.instance_of("r").unwrap();
    let output = Interpreter::builder().max_depth(3).build().run(&st);
    assert_eq!(output, "xxxx");
    assert_eq!(kinds(&listener), [ErrorKind::RecursionLimit]);
}

#[test]
fn interpreter_listener_overrides_group_listener() {
    let (group, group_listener) = collecting("test");
    let mut st = group.instance_from_source("<x.y>").unwrap();
    st.set("x", "text").unwrap();
    let override_listener = Arc::new(CollectingListener::new());
    let interpreter = Interpreter::builder()
        .listener(override_listener.clone())
        .build();
    assert_eq!(interpreter.run(&st), "");
    assert!(group_listener.is_empty());
    assert_eq!(kinds(&override_listener), [ErrorKind::NoSuchProperty]);
}

#[test]
fn undeclared_instance_properties_are_reported() {
    let (mut group, listener) = collecting("test");
    group
        .define("point", Formals::names(["x", "y"]), "(<x>,<y>)")
        .unwrap();
    let mut point = group.instance_of("point").unwrap();
    point.set("x", 1).unwrap();
    let mut st = group.instance_from_source("<p.x>/<p.y>/<p.z>").unwrap();
    st.set("p", point).unwrap();
    assert_eq!(st.render(), "1//");
    let diagnostics = listener.take();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind(), ErrorKind::NoSuchProperty);
    assert_eq!(diagnostics[0].args(), ["point.z"]);
}

#[test]
fn run_to_counts_characters() {
    let group = Group::new("test");
    let mut st = group.instance_from_source("<a>é").unwrap();
    st.set("a", "ab").unwrap();
    let mut out = String::new();
    assert_eq!(st.render_to(&mut out), 3);
    assert_eq!(out, "abé");
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn map_properties() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("<user.name>/<user.missing>/<user.keys; separator=\",\">")
        .unwrap();
    st.set("user", Value::from(stg::attrs! { "name" => "Ter", "id" => 1 }))
        .unwrap();
    assert_eq!(st.render(), "Ter//id,name");
}

#[test]
fn model_properties() {
    let (group, listener) = collecting("test");
    let mut st = group
        .instance_from_source("<user.name>#<user.id><user.email>")
        .unwrap();
    st.set(
        "user",
        Value::object(User {
            name: "Ter".into(),
            id: 7,
        }),
    )
    .unwrap();
    assert_eq!(st.render(), "Ter#7");
    let diagnostics = listener.take();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind(), ErrorKind::NoSuchProperty);
    assert_eq!(diagnostics[0].args(), ["User.email"]);
}

#[test]
fn sequence_properties() {
    let (group, listener) = collecting("test");
    let mut st = group
        .instance_from_source("<names.1> <names.first> <names.last> <names.size> <names.9>")
        .unwrap();
    st.set("names", vec!["Ter", "Tom", "Sumana"]).unwrap();
    assert_eq!(st.render(), "Tom Ter Sumana 3 ");
    assert_eq!(kinds(&listener), [ErrorKind::IndexOutOfRange]);
}

#[test]
fn property_of_null_is_silent() {
    let (group, listener) = collecting("test");
    let st = group.instance_from_source("[<x.y.z>]").unwrap();
    assert_eq!(st.render(), "[]");
    assert!(listener.is_empty());
}

#[test]
fn instance_properties_read_its_attributes() {
    let mut group = Group::new("test");
    group.define("point", Formals::names(["x", "y"]), "").unwrap();
    let mut point = group.instance_of("point").unwrap();
    point.set("x", 3).unwrap();
    let mut st = group.instance_from_source("<p.x>,<p.y>").unwrap();
    st.set("p", point).unwrap();
    assert_eq!(st.render(), "3,");
}

#[test]
fn dynamic_property_access() {
    let group = Group::new("test");
    let mut st = group.instance_from_source("<m.(key)>").unwrap();
    st.set("m", Value::from(stg::attrs! { "a" => "A", "b" => "B" }))
        .unwrap();
    st.set("key", "b").unwrap();
    assert_eq!(st.render(), "B");
}

// =============================================================================
// Built-in Functions
// =============================================================================

#[test]
fn sequence_functions() {
    let group = Group::new("test");
    let source = "<first(n)>|<last(n)>|<rest(n); separator=\",\">|<trunc(n); separator=\",\">\
                  |<reverse(n); separator=\",\">|<length(n)>";
    let mut st = group.instance_from_source(source).unwrap();
    st.set("n", vec!["a", "b", "c"]).unwrap();
    assert_eq!(st.render(), "a|c|b,c|a,b|c,b,a|3");
}

#[test]
fn strip_and_length_with_nulls() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("<length(n)> <length(strip(n))>")
        .unwrap();
    st.set("n", vec![Value::from("a"), Value::Null, Value::from("b")])
        .unwrap();
    assert_eq!(st.render(), "3 2");
}

#[test]
fn text_functions() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("[<trim(s)>] <strlen(s)> <strlen(missing)>")
        .unwrap();
    st.set("s", "  hi  ").unwrap();
    assert_eq!(st.render(), "[hi] 6 0");
}

#[test]
fn list_literals_flatten_one_level() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("<[a, \"x\", b]; separator=\",\">")
        .unwrap();
    st.set("a", vec!["1", "2"]).unwrap();
    assert_eq!(st.render(), "1,2,x");
}

// =============================================================================
// Output
// =============================================================================

#[test]
fn special_characters_and_comments() {
    let group = Group::new("test");
    let st = group
        .instance_from_source("a<\\n>b<\\t>c<! ignored !><\\ >d\\<e")
        .unwrap();
    assert_eq!(st.render(), "a\nb\tc d<e");
}

#[test]
fn line_continuation_swallows_newline() {
    let group = Group::new("test");
    let st = group.instance_from_source("one <\\\\>\ntwo").unwrap();
    assert_eq!(st.render(), "one two");
}

#[test]
fn format_option_uses_registered_renderer() {
    let mut group = Group::new("test");
    group.register_renderer(ScalarKind::Str, StringRenderer);
    let mut st = group
        .instance_from_source("<name; format=\"upper\"> <name>")
        .unwrap();
    st.set("name", "ter").unwrap();
    assert_eq!(st.render(), "TER ter");
}

#[test]
fn format_without_renderer_is_ignored() {
    let (group, listener) = collecting("test");
    let mut st = group.instance_from_source("<n; format=\"%05d\">").unwrap();
    st.set("n", 42).unwrap();
    assert_eq!(st.render(), "42");
    assert!(listener.is_empty());
}

#[test]
fn failing_renderer_falls_back_to_display() {
    let (mut group, listener) = collecting("test");
    group.register_renderer(
        ScalarKind::Int,
        |_: &stg::Scalar, _: Option<&str>| -> Result<String, Box<dyn Error + Send + Sync>> {
            Err("unsupported".into())
        },
    );
    let mut st = group.instance_from_source("<n>").unwrap();
    st.set("n", 42).unwrap();
    assert_eq!(st.render(), "42");
    let diagnostics = listener.take();
    assert_eq!(diagnostics[0].kind(), ErrorKind::RendererFailure);
    assert!(diagnostics[0].to_string().ends_with("Caused by: unsupported"));
}

#[test]
fn renderer_applies_to_rendered_instances_with_format() {
    let mut group = Group::new("test");
    group.register_renderer(ScalarKind::Str, StringRenderer);
    group.define("hello", Formals::names(["x"]), "hello <x>").unwrap();
    let st = group
        .instance_from_source("<hello(\"you\"); format=\"cap\">")
        .unwrap();
    assert_eq!(st.render(), "Hello you");
}
