//! End-to-end validation against manifest directories on disk

use maid_extract::{ArtifactExtractor, ExtractError, ExtractorRegistry};
use maid_manifest::Artifact;
use maid_test_utils::{func, project_dir, write_manifests};
use maid_validate::{
    FileOutcome, Issue, ResultCode, ValidateError, ValidationMode, Validator, ValidatorConfig,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

fn write_source(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

fn validator(root: &Path) -> Validator {
    Validator::new(root, ValidatorConfig::default().with_workers(2))
}

fn kinds(issues: &[Issue]) -> Vec<String> {
    issues
        .iter()
        .map(|i| {
            serde_json::to_value(i).unwrap()["kind"]
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect()
}

#[test]
fn editable_file_allows_private_helpers() {
    let dir = project_dir();
    let root = dir.path();
    write_manifests(
        &root.join("manifests"),
        &[(
            "task-001-a",
            json!({
                "goal": "Add f",
                "taskType": "edit",
                "editableFiles": ["src/a.py"],
                "expectedArtifacts": {
                    "file": "src/a.py",
                    "contains": [
                        {"type": "function", "name": "f", "args": [{"name": "x", "type": "int"}], "returns": "int"}
                    ]
                },
                "validationCommand": ["pytest"]
            }),
        )],
    );
    write_source(
        root,
        "src/a.py",
        "def f(x: int) -> int:\n    return _helper(x)\n\n\ndef _helper(x):\n    return x\n",
    );

    let result = validator(root)
        .validate_file(Path::new("src/a.py"), None)
        .unwrap();
    assert_eq!(result.mode, Some(ValidationMode::Permissive));
    assert_eq!(result.code, ResultCode::Ok);
    assert!(result.issues.is_empty());
}

#[test]
fn superseding_redeclaration_is_authoritative() {
    let dir = project_dir();
    let root = dir.path();
    write_manifests(
        &root.join("manifests"),
        &[
            (
                "task-001-f",
                json!({
                    "goal": "Add f",
                    "taskType": "edit",
                    "editableFiles": ["src/a.py"],
                    "expectedArtifacts": {
                        "file": "src/a.py",
                        "contains": [
                            {"type": "function", "name": "f", "args": [{"name": "x", "type": "int"}], "returns": "int"}
                        ]
                    },
                    "validationCommand": ["pytest"]
                }),
            ),
            (
                "task-002-f-y",
                json!({
                    "goal": "Add y to f",
                    "taskType": "edit",
                    "supersedes": ["task-001-f"],
                    "editableFiles": ["src/a.py"],
                    "expectedArtifacts": {
                        "file": "src/a.py",
                        "contains": [
                            {"type": "function", "name": "f", "args": [
                                {"name": "x", "type": "int"},
                                {"name": "y", "type": "int"}
                            ], "returns": "int"}
                        ]
                    },
                    "validationCommand": ["pytest"]
                }),
            ),
        ],
    );
    write_source(root, "src/a.py", "def f(x: int) -> int:\n    return x\n");

    let result = validator(root)
        .validate_file(Path::new("src/a.py"), None)
        .unwrap();
    assert_eq!(result.code, ResultCode::StructuralFail);
    assert_eq!(
        result.active_manifests.iter().map(|m| m.name()).collect::<Vec<_>>(),
        vec!["task-002-f-y"]
    );
    match &result.issues[..] {
        [Issue::SignatureMismatch {
            field, manifest, ..
        }] => {
            assert_eq!(field.to_string(), "args");
            assert_eq!(manifest.name(), "task-002-f-y");
        }
        other => panic!("expected one args mismatch, got {other:?}"),
    }
}

#[test]
fn creatable_file_rejects_extra_public_function() {
    let dir = project_dir();
    let root = dir.path();
    write_manifests(
        &root.join("manifests"),
        &[(
            "task-001-b",
            json!({
                "goal": "Create b",
                "taskType": "create",
                "creatableFiles": ["src/b.py"],
                "expectedArtifacts": {
                    "file": "src/b.py",
                    "contains": [{"type": "function", "name": "g", "returns": "None"}]
                },
                "validationCommand": ["pytest"]
            }),
        )],
    );
    write_source(
        root,
        "src/b.py",
        "def g() -> None:\n    pass\n\n\ndef h() -> None:\n    pass\n",
    );

    let validator = validator(root);
    let strict = validator.validate_file(Path::new("src/b.py"), None).unwrap();
    assert_eq!(strict.mode, Some(ValidationMode::Strict));
    assert_eq!(kinds(&strict.issues), vec!["strict_extra_artifact"]);
    assert_eq!(
        strict.issues[0].artifact().map(ToString::to_string),
        Some("function h".to_string())
    );
    assert!(matches!(
        &strict.issues[0],
        Issue::StrictExtraArtifact { manifest, .. } if manifest.name() == "task-001-b"
    ));
    assert!(strict.issues[0].to_string().contains("task-001-b"));

    let permissive = validator
        .validate_file(Path::new("src/b.py"), Some(ValidationMode::Permissive))
        .unwrap();
    assert!(permissive.is_ok());
}

#[test]
fn unordered_conflicting_manifests_are_malformed() {
    let dir = project_dir();
    let root = dir.path();
    let declaring = |returns: &str| {
        json!({
            "goal": "Declare k",
            "taskType": "edit",
            "editableFiles": ["src/c.py"],
            "expectedArtifacts": {
                "file": "src/c.py",
                "contains": [{"type": "function", "name": "k", "returns": returns}]
            },
            "validationCommand": ["pytest"]
        })
    };
    write_manifests(
        &root.join("manifests"),
        &[
            ("task-005-left", declaring("int")),
            ("task-005-right", declaring("str")),
        ],
    );
    write_source(root, "src/c.py", "def k() -> int:\n    return 1\n");

    let result = validator(root)
        .validate_file(Path::new("src/c.py"), None)
        .unwrap();
    assert_eq!(result.code, ResultCode::ChainFail);
    assert_eq!(result.mode, None);
    match &result.issues[..] {
        [Issue::MalformedManifest { manifests, .. }] => {
            let names: Vec<&str> = manifests.iter().map(|m| m.name()).collect();
            assert_eq!(names, vec!["task-005-left", "task-005-right"]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[test]
fn rejected_manifest_fails_its_files() {
    let dir = project_dir();
    let root = dir.path();
    write_manifests(
        &root.join("manifests"),
        &[(
            "task-001-bad",
            json!({
                "goal": "Broken",
                "taskType": "edit",
                "editableFiles": ["src/d.py"],
                "expectedArtifacts": {"file": "src/d.py", "contains": []},
                "validationCommand": ["pytest"],
                "unknownField": true
            }),
        )],
    );
    write_source(root, "src/d.py", "");

    let result = validator(root)
        .validate_file(Path::new("src/d.py"), None)
        .unwrap();
    assert_eq!(result.code, ResultCode::ChainFail);
    assert_eq!(kinds(&result.issues), vec!["malformed_manifest"]);
}

#[test]
fn unreferenced_file_is_untracked() {
    let dir = project_dir();
    let root = dir.path();
    write_source(root, "src/e.py", "");

    let result = validator(root).validate_file(Path::new("src/e.py"), None);
    assert!(matches!(result, Err(ValidateError::Untracked(f)) if f == "src/e.py"));
}

#[test]
fn syntax_error_is_an_extraction_issue() {
    let dir = project_dir();
    let root = dir.path();
    write_manifests(
        &root.join("manifests"),
        &[(
            "task-001",
            json!({
                "goal": "Create f",
                "taskType": "create",
                "creatableFiles": ["f.py"],
                "expectedArtifacts": {"file": "f.py", "contains": []},
                "validationCommand": ["pytest"]
            }),
        )],
    );
    write_source(root, "f.py", "def broken(:\n");

    let result = validator(root).validate_file(Path::new("f.py"), None).unwrap();
    assert_eq!(result.code, ResultCode::StructuralFail);
    assert_eq!(kinds(&result.issues), vec!["extraction"]);
    let issue = serde_json::to_value(&result.issues[0]).unwrap();
    assert_eq!(issue["manifest"], "task-001");
}

#[tokio::test]
async fn sweep_reports_every_file_in_order() {
    let dir = project_dir();
    let root = dir.path();
    write_manifests(
        &root.join("manifests"),
        &[
            (
                "task-001-b",
                json!({
                    "goal": "Create b",
                    "taskType": "create",
                    "creatableFiles": ["src/b.py"],
                    "expectedArtifacts": {
                        "file": "src/b.py",
                        "contains": [{"type": "function", "name": "g", "returns": "None"}]
                    },
                    "validationCommand": ["pytest"]
                }),
            ),
            (
                "task-002-a",
                json!({
                    "goal": "Create a",
                    "taskType": "create",
                    "creatableFiles": ["src/a.py"],
                    "expectedArtifacts": {
                        "file": "src/a.py",
                        "contains": [{"type": "function", "name": "f", "returns": "None"}]
                    },
                    "validationCommand": ["pytest"]
                }),
            ),
            (
                "task-003-broken",
                json!({
                    "goal": "Broken",
                    "taskType": "edit",
                    "editableFiles": ["src/z.py"],
                    "expectedArtifacts": {"file": "src/z.py", "contains": []},
                    "validationCommands": "pytest"
                }),
            ),
        ],
    );
    write_source(root, "src/a.py", "def f() -> None:\n    pass\n");
    write_source(root, "src/b.py", "def g() -> None:\n    pass\n");

    let sweep = validator(root).validate_directory().await.unwrap();
    let summary: Vec<(&str, ResultCode)> = sweep
        .results
        .iter()
        .map(|r| (r.file(), r.code()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("src/a.py", ResultCode::Ok),
            ("src/b.py", ResultCode::Ok),
            ("src/z.py", ResultCode::ChainFail),
        ]
    );
    assert_eq!(sweep.rejected.len(), 1);
    assert_eq!(sweep.code(), ResultCode::ChainFail);
    assert_eq!(sweep.incomplete(), 0);
}

#[tokio::test]
async fn sweep_isolates_failing_files() {
    let dir = project_dir();
    let root = dir.path();
    write_manifests(
        &root.join("manifests"),
        &[
            (
                "task-001",
                json!({
                    "goal": "Create a",
                    "taskType": "create",
                    "creatableFiles": ["a.py"],
                    "expectedArtifacts": {
                        "file": "a.py",
                        "contains": [{"type": "function", "name": "f", "returns": "None"}]
                    },
                    "validationCommand": ["pytest"]
                }),
            ),
            (
                "task-002",
                json!({
                    "goal": "Create b",
                    "taskType": "create",
                    "creatableFiles": ["b.py"],
                    "expectedArtifacts": {
                        "file": "b.py",
                        "contains": [{"type": "function", "name": "g", "returns": "None"}]
                    },
                    "validationCommand": ["pytest"]
                }),
            ),
        ],
    );
    write_source(root, "b.py", "def g() -> None:\n    pass\n");

    let sweep = Validator::new(
        root,
        ValidatorConfig::default()
            .with_workers(1)
            .with_sweep_timeout(Some(Duration::from_secs(60))),
    )
    .validate_directory()
    .await
    .unwrap();

    assert!(matches!(
        &sweep.results[0],
        FileOutcome::Completed(r) if r.code == ResultCode::StructuralFail
    ));
    assert!(matches!(
        &sweep.results[1],
        FileOutcome::Completed(r) if r.is_ok()
    ));
    assert_eq!(sweep.failures().count(), 1);
}

/// Python-shaped extractor that stalls on sources marked `# slow`
struct StallingExtractor;

impl ArtifactExtractor for StallingExtractor {
    fn name(&self) -> &'static str {
        "stalling"
    }

    fn extract(&self, source: &str) -> Result<Vec<Artifact>, ExtractError> {
        if source.contains("# slow") {
            std::thread::sleep(Duration::from_secs(3));
        }
        Ok(vec![func("f", &[], "None")])
    }

    fn extensions(&self) -> &[&str] {
        &["py"]
    }
}

#[tokio::test]
async fn sweep_deadline_marks_unfinished_files_incomplete() {
    let dir = project_dir();
    let root = dir.path();
    let creating = |file: &str| {
        json!({
            "goal": format!("Create {file}"),
            "taskType": "create",
            "creatableFiles": [file],
            "expectedArtifacts": {
                "file": file,
                "contains": [{"type": "function", "name": "f", "returns": "None"}]
            },
            "validationCommand": ["pytest"]
        })
    };
    write_manifests(
        &root.join("manifests"),
        &[
            ("task-001-fast", creating("fast.py")),
            ("task-002-slow", creating("slow.py")),
        ],
    );
    write_source(root, "fast.py", "def f() -> None:\n    pass\n");
    write_source(root, "slow.py", "# slow\ndef f() -> None:\n    pass\n");

    let mut registry = ExtractorRegistry::new();
    registry.register(StallingExtractor);
    let sweep = Validator::new(
        root,
        ValidatorConfig::default()
            .with_workers(2)
            .with_sweep_timeout(Some(Duration::from_secs(1))),
    )
    .with_registry(registry)
    .validate_directory()
    .await
    .unwrap();

    assert_eq!(sweep.results.len(), 2);
    assert!(matches!(
        &sweep.results[0],
        FileOutcome::Completed(r) if r.file == "fast.py" && r.is_ok()
    ));
    assert_eq!(
        sweep.results[1],
        FileOutcome::Incomplete {
            file: "slow.py".into()
        }
    );
    assert_eq!(sweep.incomplete(), 1);
    assert_eq!(sweep.code(), ResultCode::StructuralFail);
}

#[test]
fn sweep_report_serializes_with_status_tags() {
    let outcome = FileOutcome::Incomplete {
        file: "slow.py".into(),
    };
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({"status": "incomplete", "file": "slow.py"})
    );
}
