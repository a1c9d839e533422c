//! Integration tests for the core rendering behaviors.

use std::sync::Arc;

use stg::{CollectingListener, Formals, Group, Value};

fn group_with(templates: &[(&str, &[&str], &str)]) -> Group {
    let mut group = Group::new("test");
    for (name, params, source) in templates {
        group.define(*name, Formals::names(params.iter().copied()), *source).unwrap();
    }
    group
}

// =============================================================================
// Attributes
// =============================================================================

#[test]
fn single_attribute() {
    let group = Group::new("test");
    let mut st = group.instance_from_source("hi <name>!").unwrap();
    st.set("name", "Ter").unwrap();
    assert_eq!(st.render(), "hi Ter!");
}

#[test]
fn attribute_added_twice_renders_both() {
    let group = Group::new("test");
    let mut st = group.instance_from_source("<name>").unwrap();
    st.append("name", "Ter").unwrap();
    st.append("name", "Tom").unwrap();
    assert_eq!(st.render(), "TerTom");
}

#[test]
fn appending_to_a_host_list_leaves_it_unchanged() {
    let group = Group::new("test");
    let mut st = group.instance_from_source("<names>").unwrap();
    let names = vec!["Ter", "Tom"];
    st.append("names", &names).unwrap();
    st.append("names", "Sumana").unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(st.render(), "TerTomSumana");
}

#[test]
fn null_attribute_renders_empty() {
    let group = Group::new("test");
    let mut st = group.instance_from_source("[<name>]").unwrap();
    st.set("name", Value::Null).unwrap();
    assert_eq!(st.render(), "[]");
}

#[test]
fn numbers_and_booleans_render_with_display() {
    let group = Group::new("test");
    let mut st = group.instance_from_source("<n> <x> <b>").unwrap();
    st.set("n", 42).unwrap().set("x", 1.5).unwrap().set("b", true).unwrap();
    assert_eq!(st.render(), "42 1.5 true");
}

#[test]
fn declared_template_rejects_unknown_attribute() {
    let group = group_with(&[("t", &["name"], "<name>")]);
    let mut st = group.instance_of("t").unwrap();
    assert!(st.set("title", "x").is_err());
    assert!(st.set("name", "x").is_ok());
}

// =============================================================================
// Conditionals
// =============================================================================

#[test]
fn if_renders_when_attribute_is_set() {
    let group = Group::new("test");
    let mut st = group.instance_from_source("<if(name)>works<endif>").unwrap();
    assert_eq!(st.render(), "");
    st.set("name", "Ter").unwrap();
    assert_eq!(st.render(), "works");
}

#[test]
fn negated_if_is_the_complement() {
    let group = Group::new("test");
    let mut st = group.instance_from_source("<if(!name)>works<endif>").unwrap();
    assert_eq!(st.render(), "works");
    st.set("name", "Ter").unwrap();
    assert_eq!(st.render(), "");
}

#[test]
fn false_and_empty_list_are_falsy() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("<if(a)>a<endif><if(b)>b<endif><if(c)>c<endif>")
        .unwrap();
    st.set("a", false).unwrap();
    st.set("b", Vec::<Value>::new()).unwrap();
    st.set("c", "").unwrap();
    assert_eq!(st.render(), "c");
}

#[test]
fn elseif_takes_first_true_branch() {
    let group = Group::new("test");
    let source = "<if(x)>x<elseif(y)>y<elseif(z)>z<else>none<endif>";
    let mut st = group.instance_from_source(source).unwrap();
    assert_eq!(st.render(), "none");
    st.set("z", true).unwrap();
    assert_eq!(st.render(), "z");
    st.set("y", true).unwrap();
    assert_eq!(st.render(), "y");
    st.set("x", true).unwrap();
    assert_eq!(st.render(), "x");
}

#[test]
fn elseif_without_else_renders_nothing() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("[<if(x)>x<elseif(y)>y<endif>]")
        .unwrap();
    assert_eq!(st.render(), "[]");
    st.set("y", "yes").unwrap();
    assert_eq!(st.render(), "[y]");
}

#[test]
fn boolean_operators() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("<if(a && !b)>1<endif><if(a || b)>2<endif><if(!(a || b))>3<endif>")
        .unwrap();
    assert_eq!(st.render(), "3");
    st.set("a", true).unwrap();
    assert_eq!(st.render(), "12");
    st.set("b", true).unwrap();
    assert_eq!(st.render(), "2");
}

// =============================================================================
// Map
// =============================================================================

#[test]
fn map_with_index_skips_nulls() {
    let group = group_with(&[("t", &["names"], "<names:{n | <i>:<n>}; separator=\", \">")]);
    let mut st = group.instance_of("t").unwrap();
    st.set(
        "names",
        vec![
            Value::from("Ter"),
            Value::from("Tom"),
            Value::Null,
            Value::from("Sumana"),
        ],
    )
    .unwrap();
    assert_eq!(st.render(), "1:Ter, 2:Tom, 3:Sumana");
}

#[test]
fn map_binds_it_for_anonymous_templates() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("<names:{<i0>=<it>}; separator=\" \">")
        .unwrap();
    st.set("names", vec!["a", "b"]).unwrap();
    assert_eq!(st.render(), "0=a 1=b");
}

#[test]
fn round_robin_map_cycles_templates() {
    let group = group_with(&[
        ("a", &["x"], "[<x>]"),
        ("b", &["x"], "(<x>)"),
        ("t", &["names"], "<names:a(),b()>"),
    ]);
    let mut st = group.instance_of("t").unwrap();
    st.set("names", vec!["Ter", "Tom", "Sumana"]).unwrap();
    assert_eq!(st.render(), "[Ter](Tom)[Sumana]");
}

#[test]
fn chained_maps_pipe_results() {
    let group = group_with(&[
        ("a", &["x"], "[<x>]"),
        ("b", &["x"], "(<x>)"),
        ("t", &["names"], "<names:a():b()>"),
    ]);
    let mut st = group.instance_of("t").unwrap();
    st.set("names", vec!["Ter", "Tom"]).unwrap();
    assert_eq!(st.render(), "([Ter])([Tom])");
}

#[test]
fn map_over_scalar_invokes_once() {
    let group = group_with(&[("a", &["x"], "[<x>]"), ("t", &["name"], "<name:a()>")]);
    let mut st = group.instance_of("t").unwrap();
    st.set("name", "Ter").unwrap();
    assert_eq!(st.render(), "[Ter]");
}

#[test]
fn map_over_null_or_empty_renders_nothing() {
    let group = group_with(&[("a", &["x"], "[<x>]"), ("t", &["names"], "<names:a()>")]);
    let mut st = group.instance_of("t").unwrap();
    assert_eq!(st.render(), "");
    st.set("names", Vec::<Value>::new()).unwrap();
    assert_eq!(st.render(), "");
}

#[test]
fn separator_is_not_doubled_around_nulls() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("<names; separator=\", \">")
        .unwrap();
    st.set(
        "names",
        vec![Value::Null, Value::from("a"), Value::Null, Value::from("b"), Value::Null],
    )
    .unwrap();
    assert_eq!(st.render(), "a, b");
}

#[test]
fn null_option_replaces_null_elements() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("<names; null=\"-\", separator=\",\">")
        .unwrap();
    st.set("names", vec![Value::from("a"), Value::Null, Value::from("b")])
        .unwrap();
    assert_eq!(st.render(), "a,-,b");
}

#[test]
fn map_over_map_iterates_keys() {
    let group = Group::new("test");
    let mut st = group
        .instance_from_source("<m:{k | <k>=<m.(k)>}; separator=\";\">")
        .unwrap();
    st.set("m", Value::from(stg::attrs! { "b" => 2, "a" => 1 }))
        .unwrap();
    assert_eq!(st.render(), "a=1;b=2");
}

// =============================================================================
// Scoping
// =============================================================================

#[test]
fn it_does_not_propagate_into_named_templates() {
    let mut group = Group::new("test");
    group.define("foo", Formals::Open, "<it>").unwrap();
    group
        .define("t", Formals::names(["names"]), "<names:{<foo()>}>!")
        .unwrap();
    let mut st = group.instance_of("t").unwrap();
    st.set("names", vec!["Ter", "Tom"]).unwrap();
    assert_eq!(st.render(), "!");
}

#[test]
fn caller_attributes_are_not_visible_to_callees() {
    let mut group = Group::new("test");
    group.define("inner", Formals::Open, "[<name>]").unwrap();
    group
        .define("outer", Formals::names(["name"]), "<name><inner()>")
        .unwrap();
    let mut st = group.instance_of("outer").unwrap();
    st.set("name", "Ter").unwrap();
    assert_eq!(st.render(), "Ter[]");
}

#[test]
fn subtemplates_see_enclosing_attributes() {
    let group = group_with(&[(
        "t",
        &["names", "title"],
        "<names:{n | <title> <n>}; separator=\", \">",
    )]);
    let mut st = group.instance_of("t").unwrap();
    st.set("names", vec!["Ter", "Tom"]).unwrap();
    st.set("title", "Dr.").unwrap();
    assert_eq!(st.render(), "Dr. Ter, Dr. Tom");
}

#[test]
fn nested_subtemplates_see_outer_parameters() {
    let group = group_with(&[(
        "t",
        &["rows", "cols"],
        "<rows:{r | <cols:{c | <r><c>}; separator=\" \">}; separator=\"/\">",
    )]);
    let mut st = group.instance_of("t").unwrap();
    st.set("rows", vec!["a", "b"]).unwrap();
    st.set("cols", vec!["1", "2"]).unwrap();
    assert_eq!(st.render(), "a1 a2/b1 b2");
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn compiling_twice_renders_identically() {
    let source = "<names:{n | <i>. <n>}; separator=\"\\n\"><if(done)>!<endif>";
    let first = Group::new("a").instance_from_source(source).unwrap();
    let second = Group::new("b").instance_from_source(source).unwrap();
    for mut st in [first, second] {
        st.set("names", vec!["x", "y"]).unwrap();
        st.set("done", true).unwrap();
        assert_eq!(st.render(), "1. x\n2. y!");
    }
}

#[test]
fn rendering_does_not_modify_the_instance() {
    let listener = Arc::new(CollectingListener::new());
    let mut group = Group::new("test");
    group.set_listener(listener.clone());
    let mut st = group.instance_from_source("<names:{<it>}>").unwrap();
    st.set("names", vec!["a", "b"]).unwrap();
    assert_eq!(st.render(), "ab");
    assert_eq!(st.render(), "ab");
    assert_eq!(st.attributes().names(), ["names"]);
    assert!(listener.is_empty());
}
