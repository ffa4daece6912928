use crate::model::{DetectedComponent, ProcessingResultCode, ScanResult};
use anyhow::Result;
use std::fmt::Write;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Type")]
    component_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Dev")]
    development: String,
    #[tabled(rename = "Explicit")]
    explicit: String,
    #[tabled(rename = "Locations")]
    locations: String,
}

#[derive(Tabled)]
struct DetectorRow {
    #[tabled(rename = "Detector")]
    id: String,
    #[tabled(rename = "Version")]
    version: u32,
    #[tabled(rename = "Experimental")]
    experimental: String,
    #[tabled(rename = "Types")]
    types: String,
}

pub fn print_cli_table(result: &ScanResult) -> Result<()> {
    print!("{}", render_cli_table(result)?);
    Ok(())
}

/// Renders the human-readable report.
pub fn render_cli_table(result: &ScanResult) -> Result<String> {
    let mut out = String::new();
    writeln!(out)?;
    writeln!(
        out,
        "Scan completed at: {}",
        result.scan_time.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(out, "Source: {}", result.source_directory.display())?;
    writeln!(out)?;

    if result.components_found.is_empty() {
        writeln!(out, "No components found.")?;
    } else {
        writeln!(out, "Found {} components:", result.components_found.len())?;
        writeln!(out)?;

        let rows: Vec<ComponentRow> = result.components_found.iter().map(component_row).collect();
        writeln!(out, "{}", Table::new(rows).with(Style::rounded()))?;
    }

    if !result.detectors_in_scan.is_empty() {
        writeln!(out)?;
        writeln!(out, "Detectors:")?;
        let rows: Vec<DetectorRow> = result
            .detectors_in_scan
            .iter()
            .map(|d| DetectorRow {
                id: d.detector_id.clone(),
                version: d.version,
                experimental: yes_no(d.is_experimental),
                types: d
                    .supported_component_types
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect();
        writeln!(out, "{}", Table::new(rows).with(Style::rounded()))?;
    }

    writeln!(out)?;
    write_summary(&mut out, result)?;
    Ok(out)
}

fn component_row(component: &DetectedComponent) -> ComponentRow {
    let locations: Vec<&str> = component.file_paths.iter().map(String::as_str).collect();
    ComponentRow {
        component_type: component.component.component_type().to_string(),
        name: truncate(&component.component.name(), 40),
        version: truncate(component.component.version(), 20),
        development: match component.development_dependency {
            Some(dev) => yes_no(dev),
            None => "-".to_string(),
        },
        explicit: yes_no(component.is_explicit_referenced_dependency),
        locations: truncate(&locations.join(", "), 50),
    }
}

fn write_summary(out: &mut String, result: &ScanResult) -> std::fmt::Result {
    writeln!(out, "Summary:")?;
    writeln!(out, "  Total components: {}", result.components_found.len())?;
    writeln!(out, "  Explicitly referenced: {}", result.explicit_count())?;
    writeln!(out, "  Development dependencies: {}", result.development_count())?;

    let by_type = result.count_by_type();
    if by_type.len() > 1 {
        let breakdown: Vec<String> = by_type
            .iter()
            .map(|(t, count)| format!("{} {}", count, t))
            .collect();
        writeln!(out, "  By type: {}", breakdown.join(", "))?;
    }
    writeln!(out, "  Manifests: {}", result.dependency_graphs.len())?;

    writeln!(out)?;
    writeln!(out, "Result: {}", format_result_code(result.result_code))
}

fn format_result_code(code: ProcessingResultCode) -> String {
    match code {
        ProcessingResultCode::Success => "\x1b[32mSuccess\x1b[0m".to_string(),
        ProcessingResultCode::PartialSuccess => "\x1b[33mPartialSuccess\x1b[0m".to_string(),
        ProcessingResultCode::InputError => "\x1b[31mInputError\x1b[0m".to_string(),
        ProcessingResultCode::TimeoutError => "\x1b[31mTimeoutError\x1b[0m".to_string(),
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
