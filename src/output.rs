use crate::climatology::ClimatologyTables;
use crate::error::Result;
use crate::model::{SummaryRow, TableKind};
use csv::WriterBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MISSING: &str = "NaN";

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => MISSING.to_string(),
    }
}

fn row_fields(row: &SummaryRow) -> [String; 9] {
    [
        row.year.to_string(),
        row.month.to_string(),
        row.day.to_string(),
        row.count.to_string(),
        format_value(row.mean),
        format_value(row.median),
        format_value(row.min),
        format_value(row.max),
        format_value(row.std),
    ]
}

/// Render a table to CSV bytes.
pub fn render_table(rows: &[SummaryRow]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    for row in rows {
        writer.write_record(row_fields(row))?;
    }

    writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()).into())
}

/// `{SITE}_wtmp_{tag}_{depth}.csv`
pub fn table_file_name(site: &str, kind: TableKind, depth: i64) -> String {
    format!("{}_wtmp_{}_{}.csv", site, kind.tag(), depth)
}

/// Write all five tables for a site, replacing any earlier output.
///
/// Every table is rendered before the first file is touched, and a failed
/// write removes the files already written for the site.
pub fn write_tables(
    dir: &Path,
    site: &str,
    depth: i64,
    tables: &ClimatologyTables,
) -> Result<Vec<PathBuf>> {
    let rendered = TableKind::ALL
        .iter()
        .map(|&kind| {
            let path = dir.join(table_file_name(site, kind, depth));
            Ok((path, render_table(tables.table(kind))?))
        })
        .collect::<Result<Vec<_>>>()?;

    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(rendered.len());
    for (path, bytes) in rendered {
        if let Err(e) = std::fs::write(&path, &bytes) {
            // Leave no partial set behind
            for done in &written {
                let _ = std::fs::remove_file(done);
            }
            return Err(e.into());
        }
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        written.push(path);
    }

    info!("Wrote {} tables for {} to {}", written.len(), site, dir.display());
    Ok(written)
}

/// One line of the site survey.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurveyRecord {
    pub site: String,
    pub lat: f64,
    pub lon: f64,
    pub npts: usize,
    pub nyrs: f64,
    pub maxyrs: i32,
}

/// Write the survey as CSV with a header row.
pub fn write_survey(path: &Path, records: &[SurveyRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!("Wrote survey of {} sites to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> SummaryRow {
        SummaryRow {
            year: 2023,
            month: 5,
            day: 1,
            count: 18,
            mean: Some(50.126),
            median: Some(50.0),
            min: Some(-1.5),
            max: Some(53.999),
            std: None,
        }
    }

    #[test]
    fn test_render_row_format() {
        let bytes = render_table(&[sample_row()]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "2023,5,1,18,50.13,50.00,-1.50,54.00,NaN\n"
        );
    }

    #[test]
    fn test_render_masked_row() {
        let row = SummaryRow {
            count: 17,
            mean: None,
            median: None,
            min: None,
            max: None,
            ..sample_row()
        };
        let bytes = render_table(&[row]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "2023,5,1,17,NaN,NaN,NaN,NaN,NaN\n"
        );
    }

    #[test]
    fn test_render_empty_table() {
        assert!(render_table(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_table_file_name() {
        assert_eq!(
            table_file_name("BN01", TableKind::MonthlyClimatology, 12),
            "BN01_wtmp_mc_12.csv"
        );
    }

    #[test]
    fn test_write_tables_writes_all_five() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("BN01");
        let masked = SummaryRow {
            mean: None,
            ..sample_row()
        };
        let tables = ClimatologyTables {
            daily: vec![sample_row()],
            monthly: vec![masked.clone()],
            annual: Vec::new(),
            daily_climatology: vec![sample_row(), masked],
            monthly_climatology: Vec::new(),
        };

        let written = write_tables(&out, "BN01", 12, &tables).unwrap();
        assert_eq!(written.len(), TableKind::ALL.len());

        for kind in TableKind::ALL {
            let path = out.join(table_file_name("BN01", kind, 12));
            assert!(written.contains(&path));
            let content = std::fs::read(&path).unwrap();
            assert_eq!(content, render_table(tables.table(kind)).unwrap());
        }
    }

    #[test]
    fn test_write_tables_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(table_file_name("BN01", TableKind::Daily, 12));
        std::fs::write(&path, "stale\nstale\n").unwrap();

        let tables = ClimatologyTables {
            daily: vec![sample_row()],
            monthly: Vec::new(),
            annual: Vec::new(),
            daily_climatology: Vec::new(),
            monthly_climatology: Vec::new(),
        };
        write_tables(dir.path(), "BN01", 12, &tables).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "2023,5,1,18,50.13,50.00,-1.50,54.00,NaN\n"
        );
    }

    #[test]
    fn test_write_tables_failure_leaves_no_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the annual table should go makes that write fail
        std::fs::create_dir(dir.path().join(table_file_name("BN01", TableKind::Annual, 12)))
            .unwrap();

        let tables = ClimatologyTables {
            daily: vec![sample_row()],
            monthly: vec![sample_row()],
            annual: vec![sample_row()],
            daily_climatology: Vec::new(),
            monthly_climatology: Vec::new(),
        };
        assert!(write_tables(dir.path(), "BN01", 12, &tables).is_err());

        for kind in [TableKind::Daily, TableKind::Monthly] {
            assert!(!dir.path().join(table_file_name("BN01", kind, 12)).exists());
        }
    }

    #[test]
    fn test_write_survey_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.csv");
        let records = vec![SurveyRecord {
            site: "BN01".to_string(),
            lat: 41.5,
            lon: -70.9,
            npts: 10,
            nyrs: 0.5,
            maxyrs: 2023,
        }];
        write_survey(&path, &records).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "site,lat,lon,npts,nyrs,maxyrs");
        assert_eq!(lines[1], "BN01,41.5,-70.9,10,0.5,2023");
    }
}
