//! Rendering of a finished trace for the terminal.

use chrono::SecondsFormat;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use strum_macros::{Display, EnumString};

use sanchecker::Trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    Text,
    Json,
    Summary,
}

pub fn render(trace: &Trace, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => render_text(trace),
        OutputFormat::Json => serde_json::to_string_pretty(trace)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        OutputFormat::Summary => render_summary(trace),
    }
}

fn source_line(trace: &Trace) -> String {
    format!(
        "Source Certificate Subject Name: {} Thumbprint: {}",
        trace.source.subject_common_name, trace.source.thumbprint
    )
}

fn render_text(trace: &Trace) -> String {
    if trace.results.is_empty() {
        return format!("{}\nNo SAN hostname answered with a certificate.", source_line(trace));
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Hostname",
            "Port",
            "Subject Name",
            "Thumbprint",
            "Expiry",
            "Match",
        ]);

    for result in &trace.results {
        table.add_row(vec![
            result.hostname.clone(),
            result.port.to_string(),
            result.subject_common_name.clone(),
            result.thumbprint.clone(),
            result.expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
            result.is_match.to_string(),
        ]);
    }

    format!("{}\n{}", source_line(trace), table)
}

fn render_summary(trace: &Trace) -> String {
    let mut lines = vec![source_line(trace)];
    for result in &trace.results {
        let status = if result.is_match { "MATCH" } else { "DIFFERENT" };
        lines.push(format!(
            "{:<9} {}:{} {} expires {} ({} days left)",
            status,
            result.hostname,
            result.port,
            result.subject_common_name,
            result.expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
            result.validity_days
        ));
    }
    lines.join("\n")
}
