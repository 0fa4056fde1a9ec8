use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;

use cataguide_data::{LoadReport, SpawnEntry, SpawnReport, ValidationIssue};

/// Monte Carlo estimate attached to a spawn report.
#[derive(Debug, Clone, Serialize)]
pub struct SampledEntries {
    pub trials: u32,
    pub seed: u64,
    pub entries: Vec<SpawnEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    pub fingerprint: String,
    pub load: LoadReport,
    pub kinds: BTreeMap<String, usize>,
    pub issues: Vec<ValidationIssue>,
}

impl CheckSummary {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Result of one CLI command, ready to render.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Outcome {
    Get {
        kind: String,
        id: String,
        fields: Map<String, Value>,
    },
    List {
        kind: String,
        ids: Vec<String>,
    },
    Spawn {
        report: SpawnReport,
        #[serde(skip_serializing_if = "Option::is_none")]
        sampled: Option<SampledEntries>,
    },
    Check(CheckSummary),
}

impl Outcome {
    pub fn failed(&self) -> bool {
        matches!(self, Self::Check(summary) if !summary.passed())
    }
}

pub fn generate_json_report(out: &mut dyn Write, outcome: &Outcome) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, outcome)?;
    writeln!(out)?;
    Ok(())
}

pub fn generate_console_report(out: &mut dyn Write, outcome: &Outcome) -> Result<()> {
    match outcome {
        Outcome::Get { kind, id, fields } => {
            writeln!(out, "{} {}", kind.cyan(), id.bold())?;
            for (field, value) in fields {
                writeln!(out, "  {field}: {value}")?;
            }
        }
        Outcome::List { kind, ids } => {
            writeln!(out, "{} {} record(s)", ids.len().to_string().bold(), kind.cyan())?;
            for id in ids {
                writeln!(out, "  {id}")?;
            }
        }
        Outcome::Spawn { report, sampled } => {
            writeln!(
                out,
                "{}",
                format!("Spawn table for {}", report.root).bright_cyan().bold()
            )?;
            writeln!(out, "{}", "=".repeat(16 + report.root.len()).cyan())?;
            if report.entries.is_empty() {
                writeln!(out, "No items can spawn.")?;
            }
            for entry in &report.entries {
                let sampled_entry = sampled
                    .as_ref()
                    .and_then(|s| s.entries.iter().find(|e| e.item_id == entry.item_id));
                write!(
                    out,
                    "{:>7.2}%  x{:<7.3} {}",
                    entry.probability * 100.0,
                    entry.expected_count,
                    entry.item_id.bold()
                )?;
                if let Some(charges) = entry.charges {
                    write!(out, "  charges {}-{}", charges.min, charges.max)?;
                }
                if let Some(rolled) = sampled_entry {
                    write!(
                        out,
                        "  {}",
                        format!("(rolled {:.2}%)", rolled.probability * 100.0).dimmed()
                    )?;
                }
                writeln!(out)?;
            }
            if let Some(sampled) = sampled {
                writeln!(
                    out,
                    "Sampled {} trials with seed {}",
                    sampled.trials, sampled.seed
                )?;
            }
            if !report.diagnostics.is_empty() {
                writeln!(out)?;
                writeln!(out, "{}", "Diagnostics".bright_yellow().bold())?;
                for diagnostic in &report.diagnostics {
                    writeln!(
                        out,
                        "  • {}: {}",
                        diagnostic.origin,
                        diagnostic.error.to_string().yellow()
                    )?;
                }
            }
        }
        Outcome::Check(summary) => {
            writeln!(out, "{}", "Corpus check".bright_cyan().bold())?;
            if let Some(build) = &summary.build_number {
                writeln!(out, "Build: {build}")?;
            }
            writeln!(out, "Fingerprint: {}", summary.fingerprint)?;
            writeln!(
                out,
                "Indexed: {} (skipped {}, overridden {})",
                summary.load.indexed, summary.load.skipped, summary.load.overridden
            )?;
            for (kind, count) in &summary.kinds {
                writeln!(out, "  {kind}: {count}")?;
            }
            if summary.passed() {
                writeln!(out, "{}", "✅ No structural errors".green())?;
            } else {
                writeln!(
                    out,
                    "{}",
                    format!("❌ {} structural error(s)", summary.issues.len()).red()
                )?;
                for issue in &summary.issues {
                    writeln!(
                        out,
                        "  • {}: {}",
                        issue.record,
                        issue.error.to_string().red()
                    )?;
                }
            }
        }
    }
    Ok(())
}

pub fn generate_markdown_report(out: &mut dyn Write, outcome: &Outcome) -> Result<()> {
    match outcome {
        Outcome::Get { kind, id, fields } => {
            writeln!(out, "# {kind} `{id}`\n")?;
            writeln!(out, "| Field | Value |")?;
            writeln!(out, "|-------|-------|")?;
            for (field, value) in fields {
                writeln!(out, "| {field} | `{value}` |")?;
            }
        }
        Outcome::List { kind, ids } => {
            writeln!(out, "# {kind} records\n")?;
            for id in ids {
                writeln!(out, "- `{id}`")?;
            }
            if ids.is_empty() {
                writeln!(out, "_No records._")?;
            }
        }
        Outcome::Spawn { report, sampled } => {
            writeln!(out, "# Spawn table for `{}`\n", report.root)?;
            writeln!(out, "| Item | Probability | Expected count |")?;
            writeln!(out, "|------|-------------|----------------|")?;
            for entry in &report.entries {
                writeln!(
                    out,
                    "| {} | {:.4} | {:.4} |",
                    entry.item_id, entry.probability, entry.expected_count
                )?;
            }
            if let Some(sampled) = sampled {
                writeln!(
                    out,
                    "\n## Sampled ({} trials, seed {})\n",
                    sampled.trials, sampled.seed
                )?;
                for entry in &sampled.entries {
                    writeln!(
                        out,
                        "- **{}**: {:.4} / {:.4}",
                        entry.item_id, entry.probability, entry.expected_count
                    )?;
                }
            }
            if !report.diagnostics.is_empty() {
                writeln!(out, "\n## Diagnostics\n")?;
                for diagnostic in &report.diagnostics {
                    writeln!(out, "- `{}`: {}", diagnostic.origin, diagnostic.error)?;
                }
            }
        }
        Outcome::Check(summary) => {
            writeln!(out, "# Corpus check\n")?;
            if let Some(build) = &summary.build_number {
                writeln!(out, "- **Build**: {build}")?;
            }
            writeln!(out, "- **Fingerprint**: `{}`", summary.fingerprint)?;
            writeln!(out, "- **Indexed**: {}", summary.load.indexed)?;
            writeln!(out, "- **Skipped**: {}", summary.load.skipped)?;
            writeln!(out, "- **Structural errors**: {}\n", summary.issues.len())?;
            for issue in &summary.issues {
                writeln!(out, "- ❌ `{}`: {}", issue.record, issue.error)?;
            }
        }
    }
    Ok(())
}

pub fn generate_csv_report(out: &mut dyn Write, outcome: &Outcome) -> Result<()> {
    match outcome {
        Outcome::Get { fields, .. } => {
            writeln!(out, "field,value")?;
            for (field, value) in fields {
                writeln!(out, "{},{}", csv_field(field), csv_field(&value.to_string()))?;
            }
        }
        Outcome::List { kind, ids } => {
            writeln!(out, "kind,id")?;
            for id in ids {
                writeln!(out, "{},{}", csv_field(kind), csv_field(id))?;
            }
        }
        Outcome::Spawn { report, sampled } => {
            writeln!(
                out,
                "item_id,probability,expected_count,charges_min,charges_max,sampled_probability,sampled_expected_count"
            )?;
            for entry in &report.entries {
                let (charges_min, charges_max) = entry
                    .charges
                    .map(|c| (c.min.to_string(), c.max.to_string()))
                    .unwrap_or_default();
                let (sampled_p, sampled_e) = sampled
                    .as_ref()
                    .and_then(|s| s.entries.iter().find(|e| e.item_id == entry.item_id))
                    .map(|e| (e.probability.to_string(), e.expected_count.to_string()))
                    .unwrap_or_default();
                writeln!(
                    out,
                    "{},{},{},{charges_min},{charges_max},{sampled_p},{sampled_e}",
                    csv_field(&entry.item_id),
                    entry.probability,
                    entry.expected_count
                )?;
            }
        }
        Outcome::Check(summary) => {
            writeln!(out, "record,error")?;
            for issue in &summary.issues {
                writeln!(
                    out,
                    "{},{}",
                    csv_field(&issue.record),
                    csv_field(&issue.error.to_string())
                )?;
            }
        }
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
