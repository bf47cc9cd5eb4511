//! Subcommand handlers

use crate::render;
use crate::Context;
use anyhow::Context as _;
use clap::ArgMatches;
use maid_chain::{ChainResolver, DanglingReference};
use maid_manifest::{manifest_schema, FileReferences, ManifestId};
use maid_validate::{
    chain_issue, snapshot_file, track_files, BehaviorReport, BehaviorRunner, ProcessRunner,
    ResultCode, SkippedFile, SnapshotOptions, TrackingStatus, ValidationMode, Validator,
};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Write `value` as pretty JSON, or through `text`
fn emit<T: Serialize>(
    out: &mut dyn Write,
    json: bool,
    value: &T,
    text: impl FnOnce(&mut dyn Write, &T) -> std::io::Result<()>,
) -> anyhow::Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, value)?;
        writeln!(out)?;
    } else {
        text(out, value)?;
    }
    Ok(())
}

pub(crate) async fn validate(
    ctx: &Context,
    args: &ArgMatches,
    out: &mut dyn Write,
) -> anyhow::Result<ResultCode> {
    let validator = Validator::new(&ctx.root, ctx.config.clone());
    let mode = args.get_one::<ValidationMode>("mode").copied();

    if let Some(file) = args.get_one::<PathBuf>("file") {
        let result = validator.validate_file(file, mode)?;
        emit(out, ctx.json, &result, render::result)?;
        return Ok(result.code);
    }

    if mode.is_some() {
        anyhow::bail!("--mode applies to a single file");
    }
    let sweep = validator.validate_directory().await?;
    emit(out, ctx.json, &sweep, render::sweep)?;
    Ok(sweep.code())
}

/// Manifest history of one file
#[derive(Debug, Serialize)]
pub(crate) struct ManifestListing {
    pub(crate) file: String,
    pub(crate) references: FileReferences,
    pub(crate) active: Vec<ManifestId>,
    pub(crate) superseded: Vec<ManifestId>,
    pub(crate) dangling: Vec<DanglingReference>,
    pub(crate) rejected: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

pub(crate) fn manifests(
    ctx: &Context,
    args: &ArgMatches,
    out: &mut dyn Write,
) -> anyhow::Result<ResultCode> {
    let validator = Validator::new(&ctx.root, ctx.config.clone());
    let file = required_path(args, "file")?;
    let file = validator.relative_path(file)?;
    let report = validator.load()?;

    let mut listing = ManifestListing {
        references: report.manifests.references(&file),
        active: Vec::new(),
        superseded: Vec::new(),
        dangling: Vec::new(),
        rejected: report.rejected_for(&file).map(|r| r.path.clone()).collect(),
        error: None,
        file,
    };
    let mut code = if listing.rejected.is_empty() {
        ResultCode::Ok
    } else {
        ResultCode::ChainFail
    };

    match ChainResolver::new(&report.manifests).resolve_chain(&listing.file) {
        Ok(chain) => {
            listing.active = chain.active_ids();
            listing.superseded = chain.superseded().iter().map(|m| m.id().clone()).collect();
            listing.dangling = chain.dangling().to_vec();
        }
        Err(error) => {
            listing.error = Some(error.to_string());
            code = ResultCode::ChainFail;
        }
    }

    emit(out, ctx.json, &listing, render::listing)?;
    Ok(code)
}

pub(crate) async fn test(
    ctx: &Context,
    args: &ArgMatches,
    out: &mut dyn Write,
) -> anyhow::Result<ResultCode> {
    let validator = Validator::new(&ctx.root, ctx.config.clone());
    let report = validator.load()?;
    let timeout = args
        .get_one::<u64>("command-timeout")
        .map_or_else(|| ctx.config.command_timeout(), |secs| Duration::from_secs(*secs));
    let runner = BehaviorRunner::new(ProcessRunner, &ctx.root, timeout);

    let behavior = if let Some(name) = args.get_one::<String>("manifest") {
        let id = ManifestId::parse(name)?;
        let manifest = report
            .manifests
            .get(&id)
            .with_context(|| format!("no manifest named {name}"))?;
        runner.run_all(&[manifest]).await
    } else if let Some(file) = args.get_one::<PathBuf>("file") {
        let file = validator.relative_path(file)?;
        match ChainResolver::new(&report.manifests).resolve_chain(&file) {
            Ok(chain) if chain.is_empty() => anyhow::bail!("no manifest references {file}"),
            Ok(chain) => runner.run_all(chain.active()).await,
            Err(error) => BehaviorReport {
                runs: Vec::new(),
                issues: vec![chain_issue(&file, error)],
            },
        }
    } else {
        runner.run_sweep(&report.manifests).await
    };

    emit(out, ctx.json, &behavior, render::behavior)?;
    Ok(behavior.code())
}

pub(crate) fn files(
    ctx: &Context,
    args: &ArgMatches,
    out: &mut dyn Write,
) -> anyhow::Result<ResultCode> {
    let validator = Validator::new(&ctx.root, ctx.config.clone());
    let report = validator.load()?;
    let mut tracking = track_files(
        &ctx.root,
        &ctx.config.manifest_dir,
        &report.manifests,
        validator.registry(),
    )?;

    if let Some(status) = args.get_one::<String>("status") {
        let status = parse_status(status)?;
        tracking.files.retain(|f| f.status == status);
    }

    emit(out, ctx.json, &tracking, render::tracking)?;
    Ok(ResultCode::Ok)
}

pub(crate) fn snapshot(
    ctx: &Context,
    args: &ArgMatches,
    out: &mut dyn Write,
) -> anyhow::Result<ResultCode> {
    let validator = Validator::new(&ctx.root, ctx.config.clone());
    let file = required_path(args, "file")?;
    let options = SnapshotOptions {
        output_dir: args.get_one::<PathBuf>("output-dir").cloned(),
        force: args.get_flag("force"),
    };
    let snapshot = snapshot_file(&validator, file, &options)?;
    emit(out, ctx.json, &snapshot, render::snapshot)?;
    Ok(ResultCode::Ok)
}

/// Where `snapshot-system` put its document
#[derive(Debug, Serialize)]
pub(crate) struct SystemSnapshotSummary {
    pub(crate) output_path: PathBuf,
    pub(crate) files: usize,
    pub(crate) artifacts: usize,
    pub(crate) skipped: Vec<SkippedFile>,
}

pub(crate) fn snapshot_system(
    ctx: &Context,
    args: &ArgMatches,
    out: &mut dyn Write,
) -> anyhow::Result<ResultCode> {
    let validator = Validator::new(&ctx.root, ctx.config.clone());
    let report = validator.load()?;
    let snapshot = maid_validate::snapshot_system(&report.manifests);
    let code = if snapshot.skipped.is_empty() {
        ResultCode::Ok
    } else {
        ResultCode::ChainFail
    };

    let output = required_path(args, "output")?;
    if output == Path::new("-") {
        serde_json::to_writer_pretty(&mut *out, &snapshot.manifest)?;
        writeln!(out)?;
        return Ok(code);
    }

    let output_path = ctx.root.join(output);
    let mut document = serde_json::to_vec_pretty(&snapshot.manifest)?;
    document.push(b'\n');
    std::fs::write(&output_path, document)
        .with_context(|| format!("writing {}", output_path.display()))?;

    let summary = SystemSnapshotSummary {
        output_path,
        files: snapshot.file_count(),
        artifacts: snapshot.artifact_count(),
        skipped: snapshot.skipped,
    };
    if ctx.json {
        serde_json::to_writer_pretty(&mut *out, &summary)?;
        writeln!(out)?;
    } else if !args.get_flag("quiet") {
        render::system_snapshot(out, &summary)?;
    }
    Ok(code)
}

pub(crate) fn schema(out: &mut dyn Write) -> anyhow::Result<ResultCode> {
    serde_json::to_writer_pretty(&mut *out, &manifest_schema())?;
    writeln!(out)?;
    Ok(ResultCode::Ok)
}

fn parse_status(status: &str) -> anyhow::Result<TrackingStatus> {
    match status {
        "undeclared" => Ok(TrackingStatus::Undeclared),
        "registered" => Ok(TrackingStatus::Registered),
        "tracked" => Ok(TrackingStatus::Tracked),
        other => anyhow::bail!("unknown status {other}"),
    }
}

fn required_path<'a>(args: &'a ArgMatches, name: &str) -> anyhow::Result<&'a Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("missing <{name}>"))
}
