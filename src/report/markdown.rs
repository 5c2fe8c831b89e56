//! Markdown rendering of the benchmark summary.

use std::fmt::Write as _;

use super::aggregate::display_config_key;
use super::BenchmarkSummary;
use crate::scoring::{Averages, Totals};

const MISSING: &str = "-";

const AGGREGATE_HEADERS: [&str; 13] = [
    "Benchmark",
    "Config Key",
    "N runs",
    "TP",
    "FP",
    "FN",
    "Precision",
    "Recall",
    "F1",
    "Span F1",
    "IoU",
    "Avg Time (s)",
    "Avg Cost ($)",
];

const EXERCISE_HEADERS: [&str; 11] = [
    "Exercise",
    "TP",
    "FP",
    "FN",
    "Precision",
    "Recall",
    "F1",
    "Span F1",
    "IoU",
    "Avg Time (s)",
    "Avg Cost ($)",
];

/// Integral values print without decimals, others with `precision` digits.
pub fn format_number(value: Option<f64>, precision: usize) -> String {
    match value {
        None => MISSING.to_string(),
        Some(v) if v.is_finite() && v.fract() == 0.0 => format!("{}", v as i64),
        Some(v) => format!("{:.*}", precision, v),
    }
}

fn metric_cells(totals: &Totals, averages: &Averages) -> Vec<String> {
    vec![
        totals.tp.to_string(),
        totals.fp.to_string(),
        totals.fn_.to_string(),
        format_number(Some(totals.precision), 3),
        format_number(Some(totals.recall), 3),
        format_number(Some(totals.f1), 3),
        format_number(averages.span_f1, 3),
        format_number(averages.iou, 3),
        format_number(averages.time_s, 3),
        format_number(averages.cost_usd, 4),
    ]
}

fn table_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

fn table_header(headers: &[&str]) -> String {
    format!(
        "| {} |\n| {} |",
        headers.join(" | "),
        vec!["---"; headers.len()].join(" | ")
    )
}

fn count_table(
    out: &mut Vec<String>,
    headers: [&str; 2],
    rows: impl Iterator<Item = (String, usize)>,
) {
    let rows: Vec<String> = rows
        .map(|(name, count)| format!("| {} | {} |", name, count))
        .collect();
    if rows.is_empty() {
        return;
    }
    out.push(String::new());
    out.push(table_header(&headers));
    out.extend(rows);
}

/// Renders `summary.md`.
pub fn render_summary(summary: &BenchmarkSummary) -> String {
    let dataset = &summary.dataset_summary;
    let mut lines = vec!["## Dataset Summary".to_string(), String::new()];
    lines.push(format!(
        "- Total annotated variants: {}",
        dataset.total_annotated_variants
    ));
    lines.push(format!("- Total gold issues: {}", dataset.total_issues));

    count_table(
        &mut lines,
        ["Exercise", "Variants"],
        dataset.variants_per_exercise.iter().map(|(k, v)| (k.clone(), *v)),
    );
    count_table(
        &mut lines,
        ["Issue Category", "Count"],
        dataset.issues_per_category.iter().map(|(k, v)| (k.clone(), *v)),
    );
    count_table(
        &mut lines,
        ["Artifact Type", "Count"],
        dataset.issues_per_artifact.iter().map(|(k, v)| (k.clone(), *v)),
    );

    lines.push(String::new());
    lines.push("## Aggregate Results".to_string());
    lines.push(table_header(&AGGREGATE_HEADERS));
    for row in &summary.runs {
        let mut cells = vec![
            row.benchmark.clone(),
            display_config_key(&row.config_key, &row.benchmark).to_string(),
            row.n_runs.to_string(),
        ];
        cells.extend(metric_cells(&row.totals, &row.averages));
        lines.push(table_row(&cells));
    }

    lines.push(String::new());
    lines.push("## Per Exercise Breakdown".to_string());
    for row in &summary.runs {
        let Some(table) = summary
            .per_exercise
            .get(&row.config_key)
            .filter(|t| !t.exercises.is_empty())
        else {
            continue;
        };
        lines.push(String::new());
        lines.push(format!(
            "### {} :: {}",
            row.benchmark,
            display_config_key(&row.config_key, &row.benchmark)
        ));
        lines.push(table_header(&EXERCISE_HEADERS));
        for entry in &table.exercises {
            let mut cells = vec![entry.exercise.clone()];
            cells.extend(metric_cells(&entry.totals, &entry.averages));
            lines.push(table_row(&cells));
        }
    }

    lines.push(String::new());
    lines.push(
        "*Benchmark results are provided under CC-BY-4.0; please attribute PECV Bench when reusing.*"
            .to_string(),
    );

    let mut out = String::new();
    for line in lines {
        let _ = writeln!(out, "{}", line);
    }
    out
}
