//! Plan rendering for humans, JSON consumers, and GitHub Actions.
//!
//! Renderers take a writer instead of printing, so tests can capture
//! them and the caller decides where output lands.

use std::io::Write;

use anyhow::Result;
use camino::Utf8Path;

use crate::plan::Plan;

pub(crate) fn render_plain(output: &mut dyn Write, plan: &Plan) -> Result<()> {
    if plan.is_empty() {
        writeln!(output, "Nothing to update.")?;
        return Ok(());
    }

    let groups = plan.by_file();
    for (file, entries) in &groups {
        writeln!(output, "{file}")?;
        for entry in entries {
            writeln!(
                output,
                "  {line:>4}  {field}: {old} -> {new}",
                line = entry.reference.line,
                field = entry.reference.field,
                old = entry.reference.raw_value,
                new = entry.new_raw_value,
            )?;
        }
    }
    writeln!(
        output,
        "{updates} update(s) across {files} file(s)",
        updates = plan.len(),
        files = groups.len(),
    )?;

    Ok(())
}

pub(crate) fn render_json(output: &mut dyn Write, plan: &Plan) -> Result<()> {
    serde_json::to_writer_pretty(&mut *output, &plan.records())?;
    writeln!(output)?;
    Ok(())
}

/// Workflow-command output plus a `plan` output parameter, following
/// the workflow-commands contract:
/// <https://docs.github.com/en/actions/using-workflows/workflow-commands-for-github-actions#setting-an-output-parameter>
pub(crate) fn render_github(
    output: &mut dyn Write,
    output_file: Option<&Utf8Path>,
    plan: &Plan,
) -> Result<()> {
    for entry in plan.entries() {
        writeln!(
            output,
            "::notice file={file},line={line}::bump {repository} from {old} to {new}",
            file = entry.reference.file,
            line = entry.reference.line,
            repository = entry.reference.repository,
            old = entry.reference.current_tag,
            new = entry.new_tag,
        )?;
    }

    if !plan.is_empty() {
        let records = serde_json::to_string(&plan.records())?;
        set_output(output, output_file, "plan", &records)?;
    }

    Ok(())
}

/// Appends `name=value` to the workflow's output file when one is
/// given; otherwise the assignment is printed, which keeps terminal
/// runs usable.
fn set_output(
    output: &mut dyn Write,
    output_file: Option<&Utf8Path>,
    name: &str,
    value: &str,
) -> Result<()> {
    let line = format!("{name}={value}\n");
    match output_file {
        Some(path) => {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            file.write_all(line.as_bytes())?;
        }
        None => output.write_all(line.as_bytes())?,
    }
    Ok(())
}
