//! Plain-text report rendering

use crate::commands::{ManifestListing, SystemSnapshotSummary};
use maid_manifest::ManifestId;
use maid_validate::{
    BehaviorReport, CommandStatus, FileOutcome, Snapshot, SweepReport, TrackingReport,
    TrackingStatus, ValidationResult,
};
use std::io::{self, Write};

fn ids(ids: &[ManifestId]) -> String {
    if ids.is_empty() {
        "-".to_string()
    } else {
        ids.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub(crate) fn result(out: &mut dyn Write, result: &ValidationResult) -> io::Result<()> {
    let mode = result
        .mode
        .map_or_else(|| "-".to_string(), |m| m.to_string());
    writeln!(out, "{}: {} ({mode})", result.file, result.code)?;
    if !result.active_manifests.is_empty() {
        writeln!(out, "  active: {}", ids(&result.active_manifests))?;
    }
    for issue in &result.issues {
        writeln!(out, "  - {issue}")?;
    }
    Ok(())
}

pub(crate) fn sweep(out: &mut dyn Write, sweep: &SweepReport) -> io::Result<()> {
    for outcome in &sweep.results {
        match outcome {
            FileOutcome::Completed(r) => result(out, r)?,
            FileOutcome::Error { file, message } => writeln!(out, "{file}: error: {message}")?,
            FileOutcome::Incomplete { file } => writeln!(out, "{file}: incomplete")?,
        }
    }
    for rejected in &sweep.rejected {
        writeln!(
            out,
            "rejected {}: {}",
            rejected.path.display(),
            rejected.reason
        )?;
    }
    writeln!(
        out,
        "{} files, {} failed, {} incomplete: {}",
        sweep.results.len(),
        sweep.failures().count(),
        sweep.incomplete(),
        sweep.code()
    )
}

pub(crate) fn listing(out: &mut dyn Write, listing: &ManifestListing) -> io::Result<()> {
    writeln!(out, "{}", listing.file)?;
    writeln!(out, "  created by:  {}", ids(&listing.references.created_by))?;
    writeln!(out, "  edited by:   {}", ids(&listing.references.edited_by))?;
    writeln!(out, "  read by:     {}", ids(&listing.references.read_by))?;
    writeln!(out, "  active:      {}", ids(&listing.active))?;
    writeln!(out, "  superseded:  {}", ids(&listing.superseded))?;
    for dangling in &listing.dangling {
        writeln!(
            out,
            "  warning: {} supersedes unknown {}",
            dangling.from, dangling.target
        )?;
    }
    for path in &listing.rejected {
        writeln!(out, "  rejected:    {}", path.display())?;
    }
    if let Some(error) = &listing.error {
        writeln!(out, "  error: {error}")?;
    }
    Ok(())
}

pub(crate) fn behavior(out: &mut dyn Write, report: &BehaviorReport) -> io::Result<()> {
    for run in &report.runs {
        let verdict = if run.passed() { "passed" } else { "failed" };
        writeln!(out, "{}: {verdict}", run.manifest)?;
        for command in &run.commands {
            let status = match command.status {
                CommandStatus::Passed => "passed",
                CommandStatus::Failed => "failed",
                CommandStatus::TimedOut => "timeout",
                CommandStatus::Skipped => "skipped",
            };
            writeln!(
                out,
                "  {status:<8} {} ({} ms)",
                command.command, command.duration_ms
            )?;
        }
        if let Some(issue) = &run.issue {
            writeln!(out, "  - {issue}")?;
        }
    }
    for issue in &report.issues {
        writeln!(out, "- {issue}")?;
    }
    writeln!(
        out,
        "{} manifests, {} failed: {}",
        report.runs.len(),
        report.failed().count(),
        report.code()
    )
}

pub(crate) fn tracking(out: &mut dyn Write, report: &TrackingReport) -> io::Result<()> {
    for file in &report.files {
        let status = match file.status {
            TrackingStatus::Undeclared => "undeclared",
            TrackingStatus::Registered => "registered",
            TrackingStatus::Tracked => "tracked",
        };
        writeln!(out, "{status:<11} {}", file.path)?;
    }
    writeln!(
        out,
        "{} tracked, {} registered, {} undeclared",
        report.count(TrackingStatus::Tracked),
        report.count(TrackingStatus::Registered),
        report.count(TrackingStatus::Undeclared)
    )
}

pub(crate) fn snapshot(out: &mut dyn Write, snapshot: &Snapshot) -> io::Result<()> {
    writeln!(
        out,
        "Snapshot manifest generated successfully: {}",
        snapshot.manifest_path.display()
    )?;
    writeln!(
        out,
        "  {} artifacts for {}",
        snapshot.manifest.expected_artifacts.contains.len(),
        snapshot.manifest.expected_artifacts.file
    )?;
    if !snapshot.superseded_manifests.is_empty() {
        writeln!(out, "  supersedes: {}", ids(&snapshot.superseded_manifests))?;
    }
    Ok(())
}

pub(crate) fn system_snapshot(
    out: &mut dyn Write,
    summary: &SystemSnapshotSummary,
) -> io::Result<()> {
    writeln!(
        out,
        "System manifest written to {}: {} files, {} artifacts",
        summary.output_path.display(),
        summary.files,
        summary.artifacts
    )?;
    for skipped in &summary.skipped {
        writeln!(out, "  skipped {}: {}", skipped.file, skipped.reason)?;
    }
    Ok(())
}
