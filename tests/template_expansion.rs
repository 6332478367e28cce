//! Template expansion walker integration tests

mod helpers;

use std::sync::Arc;

use helpers::{lock_globals, mapping, value};
use pretty_assertions::assert_eq;
use serde_json::json;
use structcast::error::{Error, RenderError, TemplateError};
use structcast::template::{TemplateKind, TemplateSettings};
use structcast::{
    configure_templates, expand_structure, render_node, BindingGroups, Context, Pattern, TemplateExpander,
    TemplateNode, TemplateOverrides, TemplateRenderer, Value,
};

fn bindings() -> BindingGroups {
    BindingGroups::new()
        .with_group(
            "default",
            mapping(json!({
                "service": "billing",
                "replicas": 2,
                "ports": [8080, 8443],
            })),
        )
        .with_group("staging", mapping(json!({"service": "billing-staging", "replicas": 1})))
}

#[test]
fn test_merge_into_mapping() {
    let _guard = lock_globals();
    let tree: Value = serde_yaml::from_str(
        r#"
kind: Deployment
_template_yaml_: |
  name: {{service}}
  replicas: {{replicas}}
spec:
  paused: false
"#,
    )
    .unwrap();
    let out = expand_structure(&tree, &bindings()).unwrap();
    assert_eq!(
        out,
        value(json!({
            "kind": "Deployment",
            "name": "billing",
            "replicas": 2,
            "spec": {"paused": false},
        }))
    );
    let keys: Vec<_> = out.as_mapping().unwrap().keys().cloned().collect();
    assert_eq!(keys, vec!["kind", "name", "replicas", "spec"]);
}

#[test]
fn test_merge_collision_is_rejected() {
    let _guard = lock_globals();
    let tree = value(json!({
        "name": "fixed",
        "_template_yaml_": "name: {{service}}",
    }));
    let err = expand_structure(&tree, &bindings()).unwrap_err();
    assert!(matches!(
        err,
        Error::Template(TemplateError::KeyCollision { ref key }) if key == "name"
    ));
}

#[test]
fn test_splice_into_sequence() {
    let _guard = lock_globals();
    let tree = value(json!({
        "ports": [
            22,
            {"_template_json_": "[{{#each ports}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}]"},
            9090,
        ],
    }));
    let out = expand_structure(&tree, &bindings()).unwrap();
    assert_eq!(out, value(json!({"ports": [22, 8080, 8443, 9090]})));
}

#[test]
fn test_groups_and_default_group_setting() {
    let _guard = lock_globals();
    let tree = value(json!({
        "a": {"_template_yaml_": "replicas: {{replicas}}"},
        "b": {"_template_yaml_": "replicas: {{replicas}}", "_template_group_": "staging"},
    }));
    let out = expand_structure(&tree, &bindings()).unwrap();
    assert_eq!(out, value(json!({"a": {"replicas": 2}, "b": {"replicas": 1}})));

    configure_templates(TemplateOverrides {
        default_group: Some("staging".to_string()),
        ..Default::default()
    });
    let out = expand_structure(&tree, &bindings()).unwrap();
    assert_eq!(out, value(json!({"a": {"replicas": 1}, "b": {"replicas": 1}})));
}

#[test]
fn test_unresolved_variables() {
    let _guard = lock_globals();
    let tree = value(json!({"_template_yaml_": "region: '{{region}}'"}));

    let err = expand_structure(&tree, &bindings()).unwrap_err();
    assert!(matches!(
        err,
        Error::Template(TemplateError::Render(RenderError::Unresolved(_)))
    ));

    configure_templates(TemplateOverrides {
        strict: Some(false),
        ..Default::default()
    });
    assert_eq!(
        expand_structure(&tree, &bindings()).unwrap(),
        value(json!({"region": ""}))
    );
}

#[test]
fn test_render_node_with_pipe() {
    let _guard = lock_globals();
    let node = TemplateNode::new(TemplateKind::Json, "{{json ports}}").with_pipe(vec![
        Pattern::address("sum"),
        Pattern::address("str"),
    ]);
    assert_eq!(render_node(&node, &bindings()).unwrap(), Value::from("16523"));

    let raw = TemplateNode::new(TemplateKind::Raw, "{{uppercase service}}-{{lowercase \"X\"}}").with_group("staging");
    assert_eq!(render_node(&raw, &bindings()).unwrap(), Value::from("BILLING-STAGING-x"));
}

#[test]
fn test_template_pipe_key() {
    let _guard = lock_globals();
    let tree = value(json!({
        "counts": [
            {"_template_json_": "[3, 1, 2]", "_template_pipe_": [["_addr_", "sorted"]]},
        ],
    }));
    let out = expand_structure(&tree, &bindings()).unwrap();
    assert_eq!(out, value(json!({"counts": [1, 2, 3]})));
}

struct Uppercase;

impl TemplateRenderer for Uppercase {
    fn render(&self, source: &str, _bindings: &serde_json::Value) -> Result<String, RenderError> {
        Ok(source.to_uppercase())
    }
}

#[test]
fn test_pluggable_renderer_with_local_settings() {
    let ctx = Context::current().with_template_settings(TemplateSettings {
        strict: false,
        default_group: "none".to_string(),
    });
    let expander = TemplateExpander::with_renderer(Arc::new(Uppercase));
    let out = expander
        .expand_with(&ctx, &value(json!({"_template_yaml_": "key: value"})), &BindingGroups::new())
        .unwrap();
    assert_eq!(out, value(json!({"KEY": "VALUE"})));
}

#[test]
fn test_shape_errors() {
    let _guard = lock_globals();
    let err = expand_structure(&value(json!({"_template_yaml_": "- a"})), &bindings()).unwrap_err();
    assert!(matches!(
        err,
        Error::Template(TemplateError::ExpectedMapping { found: "sequence" })
    ));

    let err = expand_structure(&value(json!([{"_template_yaml_": "a: 1"}])), &bindings()).unwrap_err();
    assert!(matches!(
        err,
        Error::Template(TemplateError::ExpectedSequence { found: "mapping" })
    ));

    let err = expand_structure(&value(json!({"_template_yaml_": "a: [", "x": 1})), &bindings()).unwrap_err();
    assert!(matches!(
        err,
        Error::Template(TemplateError::Parse { format: "yaml", .. })
    ));
}
