//! 参数模板与规则文件加载集成测试
//!
//! 规则文档写入临时目录后通过加载器读取，验证模板参数在调度时按实体渲染。

use entity_rules::{
    Argument, EntityRules, FuncMap, InvokeFault, LoadOptions, MethodTable, RuleConfig, RuleError,
    TemplateError,
};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Default, Serialize)]
struct Issue {
    title: String,
    reporter: Reporter,
    labels: Vec<String>,
    notes: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
struct Reporter {
    login: String,
    team: Option<String>,
}

fn issue(title: &str, login: &str, team: Option<&str>) -> Issue {
    Issue {
        title: title.to_string(),
        reporter: Reporter {
            login: login.to_string(),
            team: team.map(str::to_string),
        },
        ..Default::default()
    }
}

fn methods() -> MethodTable<Issue> {
    MethodTable::new()
        .method("HasLabel", |i: &mut Issue, label: String| {
            i.labels.contains(&label)
        })
        .method("LabelCount", |i: &mut Issue| i.labels.len())
        .method("AddLabel", |i: &mut Issue, label: String| i.labels.push(label))
        .method("Note", |i: &mut Issue, note: String| i.notes.push(note))
}

fn funcs() -> FuncMap {
    FuncMap::new().with("upper", |args: &[Value]| match args {
        [Value::String(s)] => Ok(Value::String(s.to_uppercase())),
        other => Err(format!("upper 需要一个字符串参数，实际 {} 个", other.len())),
    })
}

fn options() -> LoadOptions {
    LoadOptions::new()
        .with_func_map(funcs())
        .with_entity_funcs(&methods())
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const YAML_RULES: &str = r#"
entityRules:
  conditions:
    - name: already_triaged
      method: HasLabel
      arguments: ["triaged"]
  actions:
    - name: label_team
      method: AddLabel
      arguments: ["team/{{ .reporter.team }}"]
    - name: shout_title
      method: Note
      arguments: ["{{ upper .title }} by {{ .reporter.login }}"]
    - name: count_labels
      method: Note
      arguments: ["labels={{ LabelCount . }}"]
    - name: triaged
      method: AddLabel
      arguments: ["triaged"]
  rules:
    - name: triage
      when: ["true"]
      if: "not already_triaged"
      do: ["label_team", "shout_title", "count_labels", "triaged"]
"#;

#[test]
fn test_yaml_file_rendering_per_entity() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "rules.yaml", YAML_RULES);

    let config = RuleConfig::from_file(&path, &options()).unwrap();
    let engine = EntityRules::new(config, methods());

    let mut first = issue("crash on start", "alice", Some("core"));
    let mut second = issue("typo", "bob", Some("docs"));
    engine.apply_on([&mut first, &mut second]).unwrap();

    assert_eq!(first.labels, vec!["team/core", "triaged"]);
    assert_eq!(second.labels, vec!["team/docs", "triaged"]);
    assert_eq!(first.notes, vec!["CRASH ON START by alice", "labels=1"]);
    assert_eq!(second.notes, vec!["TYPO by bob", "labels=1"]);
}

#[test]
fn test_null_field_renders_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "rules.yml", YAML_RULES);

    let engine = EntityRules::new(RuleConfig::from_file(&path, &options()).unwrap(), methods());
    let mut orphan = issue("orphan", "carol", None);
    engine.apply_on([&mut orphan]).unwrap();

    assert_eq!(orphan.labels[0], "team/");
}

#[test]
fn test_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "rules.json",
        r#"{
            "entityRules": {
                "Conditions": [],
                "Actions": [
                    {
                        "Name": "note_reporter",
                        "Method": "Note",
                        "Arguments": ["reported by {{ .reporter.login }}"]
                    }
                ],
                "Rules": [
                    { "Name": "note", "When": ["true"], "If": "true", "Do": ["note_reporter"] }
                ]
            }
        }"#,
    );

    let config = RuleConfig::from_json_file(&path, &options()).unwrap();
    let binding = config.actions.get_by_name("note_reporter").unwrap();
    assert!(matches!(
        &binding.arguments[0],
        Argument::Template(t) if t.source() == "reported by {{ .reporter.login }}"
    ));

    let engine = EntityRules::new(config, methods());
    let mut issue = issue("t", "dave", None);
    engine.apply_on([&mut issue]).unwrap();
    assert_eq!(issue.notes, vec!["reported by dave"]);
}

#[test]
fn test_missing_field_is_invocation_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "rules.yaml",
        r#"
entityRules:
  actions:
    - name: note_milestone
      method: Note
      arguments: ["{{ .milestone.title }}"]
  rules:
    - name: r
      when: ["true"]
      if: "true"
      do: ["note_milestone"]
"#,
    );

    let engine = EntityRules::new(RuleConfig::from_file(&path, &options()).unwrap(), methods());
    let mut issue = issue("t", "erin", None);
    let err = engine.apply_on([&mut issue]).unwrap_err();

    assert!(matches!(
        err.root_cause(),
        RuleError::Invocation {
            name,
            source: InvokeFault::Render(TemplateError::FieldNotFound(path)),
        } if name == "note_milestone" && path == ".milestone.title"
    ));
    assert!(issue.notes.is_empty());
}

#[test]
fn test_panicking_free_function_is_invocation_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "rules.yaml",
        r#"
entityRules:
  actions:
    - name: note_first
      method: Note
      arguments: ["{{ first }}"]
  rules:
    - name: r
      when: ["true"]
      if: "true"
      do: ["note_first"]
"#,
    );

    let options = LoadOptions::new()
        .with_func_map(funcs().with("first", |args: &[Value]| Ok(args[0].clone())))
        .with_entity_funcs(&methods());
    let engine = EntityRules::new(RuleConfig::from_file(&path, &options).unwrap(), methods());
    let mut issue = issue("t", "frank", None);
    let err = engine.apply_on([&mut issue]).unwrap_err();

    assert!(matches!(
        err.root_cause(),
        RuleError::Invocation {
            name,
            source: InvokeFault::Render(TemplateError::Function { name: func, .. }),
        } if name == "note_first" && func == "first"
    ));
    assert!(issue.notes.is_empty());
}

#[test]
fn test_load_errors() {
    let dir = tempfile::tempdir().unwrap();

    let missing = RuleConfig::from_file(dir.path().join("absent.yaml"), &options()).unwrap_err();
    assert!(matches!(missing, RuleError::Io(_)));

    let no_section = write(&dir, "other.yaml", "rules: []\n");
    assert!(matches!(
        RuleConfig::from_file(&no_section, &options()).unwrap_err(),
        RuleError::MissingSection(_)
    ));

    let broken_yaml = write(&dir, "broken.yaml", "entityRules: [unclosed\n");
    assert!(matches!(
        RuleConfig::from_file(&broken_yaml, &options()).unwrap_err(),
        RuleError::Yaml(_)
    ));

    let broken_json = write(&dir, "broken.json", "{ \"entityRules\": ");
    assert!(matches!(
        RuleConfig::from_file(&broken_json, &options()).unwrap_err(),
        RuleError::Json(_)
    ));

    let bad_template = write(
        &dir,
        "template.yaml",
        r#"
entityRules:
  actions:
    - name: broken
      method: Note
      arguments: ["{{ .title"]
"#,
    );
    assert!(matches!(
        RuleConfig::from_file(&bad_template, &options()).unwrap_err(),
        RuleError::TemplateParse {
            binding,
            source: TemplateError::Syntax(_),
        } if binding == "broken"
    ));
}

#[test]
fn test_entity_methods_need_opt_in() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "rules.yaml", YAML_RULES);

    // 未注册实体方法时，模板中的 LabelCount 无法解析
    let options = LoadOptions::new().with_func_map(funcs());
    let err = RuleConfig::from_file(&path, &options).unwrap_err();
    assert!(matches!(
        err,
        RuleError::TemplateParse {
            source: TemplateError::UnknownFunction(name),
            ..
        } if name == "LabelCount"
    ));
}
