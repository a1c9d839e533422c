//! Integration tests for template groups: definition, imports and overrides.

use std::sync::Arc;

use stg::{
    CollectingListener, Diagnostic, ErrorKind, Formals, Group, GroupError, TemplateDirectory,
};

fn base() -> Group {
    let mut group = Group::new("base");
    group.define("page", Formals::Open, "<title()>!").unwrap();
    group.define("title", Formals::Open, "base").unwrap();
    group
}

// =============================================================================
// Definition
// =============================================================================

#[test]
fn define_and_render() {
    let mut group = Group::new("test");
    group
        .define("hello", Formals::names(["name"]), "Hello, <name>!")
        .unwrap();
    let mut st = group.instance_of("hello").unwrap();
    st.set("name", "World").unwrap();
    assert_eq!(st.render(), "Hello, World!");
    assert_eq!(st.name(), "hello");
}

#[test]
fn redefinition_is_an_error() {
    let mut group = base();
    assert_eq!(
        group.define("title", Formals::Open, "again"),
        Err(GroupError::Redefinition {
            group: "base".into(),
            name: "title".into(),
        })
    );
}

#[test]
fn invalid_names_are_rejected() {
    let mut group = Group::new("test");
    assert!(matches!(
        group.define("no spaces", Formals::Open, ""),
        Err(GroupError::InvalidName { .. })
    ));
}

#[test]
fn duplicate_parameters_are_rejected() {
    let mut group = Group::new("test");
    assert_eq!(
        group.define("t", Formals::names(["a", "b", "a"]), ""),
        Err(GroupError::DuplicateParameter {
            template: "t".into(),
            parameter: "a".into(),
        })
    );
}

#[test]
fn unknown_template_suggests_names() {
    let group = base();
    let error = group.instance_of("titel").unwrap_err();
    assert_eq!(
        error,
        GroupError::NoSuchTemplate {
            name: "titel".into(),
            suggestions: vec!["title".into()],
        }
    );
    assert_eq!(error.to_string(), "no such template: titel (did you mean title?)");
}

#[test]
fn compile_errors_are_reported_once() {
    let listener = Arc::new(CollectingListener::new());
    let mut group = Group::new("test");
    group.set_listener(listener.clone());
    group
        .define("broken", Formals::names(["a"]), "<b>")
        .unwrap();
    group.define("fine", Formals::Open, "ok").unwrap();

    for _ in 0..2 {
        assert_eq!(
            group.lookup("broken").unwrap_err(),
            GroupError::CompileFailed {
                templates: vec!["broken".into()],
            }
        );
    }
    assert_eq!(listener.len(), 1);
    assert_eq!(listener.take()[0].kind(), ErrorKind::NoSuchAttribute);
    assert!(group.lookup("fine").is_ok());
}

#[test]
fn syntax_errors_survive_later_definitions() {
    let listener = Arc::new(CollectingListener::new());
    let mut group = Group::new("test");
    group.set_listener(listener.clone());
    group.define("bad", Formals::Open, "<if(x)>oops").unwrap();

    assert!(group.lookup("bad").is_err());
    group.define("other", Formals::Open, "fine").unwrap();
    assert!(group.lookup("bad").is_err());
    assert_eq!(listener.len(), 1);
    assert_eq!(listener.take()[0].kind(), ErrorKind::SyntaxError);
}

#[test]
fn missing_callee_compiles_once_defined() {
    let listener = Arc::new(CollectingListener::new());
    let mut group = Group::new("test");
    group.set_listener(listener.clone());
    group.define("page", Formals::Open, "[<body()>]").unwrap();

    assert!(group.lookup("page").is_err());
    group.define("unrelated", Formals::Open, "x").unwrap();
    assert!(group.lookup("page").is_err());
    assert_eq!(listener.len(), 1);
    assert_eq!(listener.take()[0].kind(), ErrorKind::NoSuchTemplate);

    group.define("body", Formals::Open, "text").unwrap();
    assert_eq!(group.instance_of("page").unwrap().render(), "[text]");
    assert!(listener.is_empty());
}

#[test]
fn compile_all_lists_failures() {
    let listener = Arc::new(CollectingListener::new());
    let mut group = Group::new("test");
    group.set_listener(listener.clone());
    group.define("a", Formals::Open, "<if(x)>").unwrap();
    group.define("b", Formals::Open, "fine").unwrap();
    group.define("c", Formals::Open, "<nope()>").unwrap();
    assert_eq!(
        group.compile_all(),
        Err(GroupError::CompileFailed {
            templates: vec!["a".into(), "c".into()],
        })
    );
    assert_eq!(listener.len(), 2);

    let mut fine = Group::new("fine");
    fine.define("x", Formals::Open, "x").unwrap();
    assert_eq!(fine.compile_all(), Ok(1));
}

#[test]
fn calling_a_broken_template_renders_nothing() {
    let listener = Arc::new(CollectingListener::new());
    let mut group = Group::new("test");
    group.set_listener(listener.clone());
    group.define("broken", Formals::Open, "<if(x)>").unwrap();
    group
        .define("main", Formals::Open, "[<(name)()>]")
        .unwrap();
    let mut st = group.instance_of("main").unwrap();
    st.set("name", "broken").unwrap();
    assert_eq!(st.render(), "[");
    let kinds: Vec<_> = listener.take().iter().map(Diagnostic::kind).collect();
    assert_eq!(kinds, [ErrorKind::SyntaxError, ErrorKind::TemplateCompileFailed]);
}

#[test]
fn instances_keep_their_group_snapshot() {
    let mut group = Group::new("test");
    group.define("t", Formals::Open, "<(name)()>").unwrap();
    let mut st = group.instance_of("t").unwrap();
    st.set("name", "later").unwrap();
    group.define("later", Formals::Open, "now defined").unwrap();
    assert_eq!(st.render(), "");
    let mut fresh = group.instance_of("t").unwrap();
    fresh.set("name", "later").unwrap();
    assert_eq!(fresh.render(), "now defined");
}

// =============================================================================
// Imports
// =============================================================================

#[test]
fn imported_templates_are_visible() {
    let mut child = Group::new("child");
    child.import(&base());
    assert!(child.contains("page"));
    assert_eq!(child.instance_of("page").unwrap().render(), "base!");
    assert_eq!(child.template_names(), ["page", "title"]);
    assert!(child.own_template_names().is_empty());
}

#[test]
fn overrides_apply_to_imported_templates() {
    let base = base();
    let mut child = Group::new("child");
    child.import(&base);
    child.define("title", Formals::Open, "child").unwrap();
    assert_eq!(child.instance_of("page").unwrap().render(), "child!");
    assert_eq!(base.instance_of("page").unwrap().render(), "base!");
}

#[test]
fn super_invokes_the_overridden_definition() {
    let mut child = Group::new("child");
    child.import(&base());
    child
        .define("title", Formals::Open, "<super.title()>+")
        .unwrap();
    assert_eq!(child.instance_of("page").unwrap().render(), "base+!");
}

#[test]
fn super_without_an_imported_definition_fails_to_compile() {
    let listener = Arc::new(CollectingListener::new());
    let mut group = Group::new("test");
    group.set_listener(listener.clone());
    group
        .define("title", Formals::Open, "<super.title()>")
        .unwrap();
    assert!(group.lookup("title").is_err());
    let diagnostics = listener.take();
    assert_eq!(diagnostics[0].kind(), ErrorKind::NoSuchTemplate);
    assert_eq!(diagnostics[0].args()[0], "super.title");
}

#[test]
fn earlier_imports_win() {
    let mut first = Group::new("first");
    first.define("name", Formals::Open, "first").unwrap();
    let mut second = Group::new("second");
    second.define("name", Formals::Open, "second").unwrap();
    let mut group = Group::new("test");
    group.import(&first);
    group.import(&second);
    assert_eq!(group.instance_of("name").unwrap().render(), "first");
    assert_eq!(group.source_of("name"), Some("first"));
}

#[test]
fn imported_group_templates_compile_against_their_own_group() {
    let mut lib = Group::new("lib");
    lib.define("helper", Formals::names(["x"]), "\\<<x>>").unwrap();
    lib.define("wrap", Formals::names(["x"]), "<helper(x)>").unwrap();
    let mut app = Group::new("app");
    app.import(&lib);
    app.define("main", Formals::Open, "<wrap(\"hi\")>").unwrap();
    assert_eq!(app.instance_of("main").unwrap().render(), "<hi>");
}

#[test]
fn group_debug_lists_templates() {
    let debug = format!("{:?}", base());
    assert!(debug.contains("\"page\""));
    assert!(debug.contains("\"title\""));
}
