use std::fs;
use std::path::Path;

use prettytable::{Cell, Row, Table};

use crate::errors::{Result, TuneError};
use crate::rules::Finding;

pub const COLUMNS: [&str; 5] = ["Area", "Issue", "Recommendation", "Priority", "Rationale"];

/// The fixed five-column projection of a finding. Owned by the assembler,
/// discarded after export.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub area: String,
    pub issue: String,
    pub recommendation: String,
    pub priority: String,
    pub rationale: String,
}

/// Pure, total projection into report rows. No failure mode.
pub fn assemble(findings: &[Finding]) -> Vec<ReportRow> {
    findings
        .iter()
        .map(|f| ReportRow {
            area: f.area.to_string(),
            issue: f.issue.clone(),
            recommendation: f.recommendation.clone(),
            priority: f.priority.to_string(),
            rationale: f.rationale.clone(),
        })
        .collect()
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_document(rows: &[ReportRow]) -> String {
    let mut doc = COLUMNS.join(",");
    doc.push('\n');
    for r in rows {
        let fields = [&r.area, &r.issue, &r.recommendation, &r.priority, &r.rationale];
        let line: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
        doc.push_str(&line.join(","));
        doc.push('\n');
    }
    doc
}

/// Writes the report CSV, creating missing parent directories. The document
/// is rendered fully in memory and written in one shot, so no partially
/// written report is ever observable.
pub fn write_csv(rows: &[ReportRow], path: &str) -> Result<()> {
    let as_output_err = |source: std::io::Error| TuneError::Output {
        path: path.to_string(),
        source,
    };
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(as_output_err)?;
        }
    }
    fs::write(path, csv_document(rows)).map_err(as_output_err)
}

/// Terminal rendering of the final report.
pub fn render_table(rows: &[ReportRow]) -> Table {
    let mut table = Table::new();
    table.set_titles(Row::new(COLUMNS.iter().map(|c| Cell::new(c)).collect()));
    for r in rows {
        table.add_row(Row::new(vec![
            Cell::new(&r.area),
            Cell::new(&r.issue),
            Cell::new(&r.recommendation),
            Cell::new(&r.priority),
            Cell::new(&r.rationale),
        ]));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Area, Priority};

    fn finding() -> Finding {
        Finding {
            area: Area::DbFlags,
            issue: "innodb_buffer_pool_size is small (4096M)".to_string(),
            recommendation: "Increase innodb_buffer_pool_size, reduce disk IO.".to_string(),
            priority: Priority::Medium,
            rationale: String::new(),
        }
    }

    #[test]
    fn assemble_projects_display_vocabulary() {
        let rows = assemble(&[finding()]);
        assert_eq!(rows[0].area, "DB Flags");
        assert_eq!(rows[0].priority, "Medium");
        assert_eq!(rows[0].rationale, "");
    }

    #[test]
    fn csv_quotes_commas_and_doubles_quotes() {
        let rows = assemble(&[finding()]);
        let doc = csv_document(&rows);
        let mut lines = doc.lines();
        assert_eq!(lines.next().unwrap(), "Area,Issue,Recommendation,Priority,Rationale");
        let row = lines.next().unwrap();
        assert!(row.contains("\"Increase innodb_buffer_pool_size, reduce disk IO.\""));

        assert_eq!(csv_escape("he said \"hi\""), "\"he said \"\"hi\"\"\"");
        assert_eq!(csv_escape("plain"), "plain");
    }

    #[test]
    fn empty_report_is_just_the_header() {
        assert_eq!(csv_document(&[]), "Area,Issue,Recommendation,Priority,Rationale\n");
    }

    #[test]
    fn write_csv_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outputs").join("recommendations.csv");
        let path = path.to_str().unwrap();
        write_csv(&assemble(&[finding()]), path).unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.starts_with("Area,Issue,"));
        assert_eq!(written.lines().count(), 2);
    }
}
