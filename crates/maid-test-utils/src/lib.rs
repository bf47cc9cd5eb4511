//! Testing utilities for MAID workspace
//!
//! Shared test helpers, fixtures, and builders.

#![allow(missing_docs)]

use maid_manifest::{
    Arg, Artifact, CommandSpec, ExpectedArtifacts, FileStatus, Manifest, ManifestDraft,
    ManifestId, ManifestSet, TaskType,
};
use std::path::Path;

/// Fluent builder over [`ManifestDraft`]
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    draft: ManifestDraft,
}

impl ManifestBuilder {
    fn base(name: &str, file: &str, task_type: TaskType) -> Self {
        Self {
            draft: ManifestDraft {
                id: ManifestId::parse(name).unwrap(),
                source: None,
                digest: None,
                goal: format!("test manifest {name}"),
                task_type,
                supersedes: Vec::new(),
                creatable_files: Vec::new(),
                editable_files: Vec::new(),
                readonly_files: Vec::new(),
                expected: ExpectedArtifacts {
                    file: file.to_string(),
                    status: FileStatus::Present,
                    contains: Vec::new(),
                },
                validation_commands: vec![CommandSpec::new(vec!["true".to_string()])],
                metadata: serde_json::Map::new(),
            },
        }
    }

    /// Manifest creating `file` (strict)
    pub fn create(name: &str, file: &str) -> Self {
        let mut builder = Self::base(name, file, TaskType::Create);
        builder.draft.creatable_files.push(file.to_string());
        builder
    }

    /// Manifest editing `file` (permissive)
    pub fn edit(name: &str, file: &str) -> Self {
        let mut builder = Self::base(name, file, TaskType::Edit);
        builder.draft.editable_files.push(file.to_string());
        builder
    }

    pub fn supersedes(mut self, name: &str) -> Self {
        self.draft.supersedes.push(ManifestId::parse(name).unwrap());
        self
    }

    pub fn declare(mut self, artifact: Artifact) -> Self {
        self.draft.expected.contains.push(artifact);
        self
    }

    pub fn also_editable(mut self, file: &str) -> Self {
        self.draft.editable_files.push(file.to_string());
        self
    }

    pub fn readonly(mut self, file: &str) -> Self {
        self.draft.readonly_files.push(file.to_string());
        self
    }

    pub fn file_absent(mut self) -> Self {
        self.draft.expected.status = FileStatus::Absent;
        self
    }

    pub fn commands(mut self, commands: &[&[&str]]) -> Self {
        self.draft.validation_commands = commands
            .iter()
            .map(|argv| CommandSpec::new(argv.iter().map(|s| (*s).to_string()).collect()))
            .collect();
        self
    }

    pub fn build(self) -> Manifest {
        Manifest::new(self.draft).unwrap()
    }
}

/// `name(args...) -> returns` at module level
pub fn func(name: &str, args: &[(&str, &str)], returns: &str) -> Artifact {
    Artifact::function(name)
        .with_args(args.iter().map(|(n, t)| Arg::typed(*n, *t)).collect())
        .returning(returns)
}

/// Method on `class`
pub fn method(class: &str, name: &str, args: &[(&str, &str)], returns: &str) -> Artifact {
    func(name, args, returns).in_class(class)
}

pub fn manifest_set(manifests: Vec<Manifest>) -> ManifestSet {
    ManifestSet::from_manifests(manifests).unwrap()
}

/// Write raw manifest documents into `dir` as `<name>.manifest.json`
pub fn write_manifests(dir: &Path, manifests: &[(&str, serde_json::Value)]) {
    std::fs::create_dir_all(dir).unwrap();
    for (name, doc) in manifests {
        let path = dir.join(format!("{name}.manifest.json"));
        std::fs::write(path, serde_json::to_vec_pretty(doc).unwrap()).unwrap();
    }
}

/// Project directory with a `manifests/` subdirectory
pub fn project_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("manifests")).unwrap();
    dir
}
