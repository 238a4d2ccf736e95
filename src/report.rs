use log::{debug, error, info, warn};

use policy_stats::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value as JSValue;
use text_diff::print_diff;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_electoral;
mod io_excel;
mod narrative;
mod writers;

use crate::report::config_reader::*;
use crate::report::io_common::{LoadMode, LoadedTable};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReportError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing the JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error opening the CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Error writing the CSV file {path}"))]
    CsvWrite { source: csv::Error, path: String },
    #[snafu(display("Error writing the file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening the Excel file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The Excel file {path} has no worksheet {worksheet}"))]
    MissingWorksheet { path: String, worksheet: String },
    #[snafu(display("The file {path} has no header row"))]
    EmptyFile { path: String },
    #[snafu(display("The file {path} has no column {column} (header: {header:?})"))]
    MissingColumn {
        path: String,
        column: String,
        header: Vec<String>,
    },
    #[snafu(display("{path}, line {lineno}, column {column}: invalid value {content:?}"))]
    InvalidCell {
        path: String,
        lineno: usize,
        column: String,
        content: String,
    },
    #[snafu(display("Invalid configuration: {message}"))]
    Config { message: String },
    #[snafu(display("Analysis failed: {source}"))]
    Analysis { source: AnalysisError },
    #[snafu(display("None of the electoral sources could be read: {paths:?}"))]
    ElectoralUnavailable { paths: Vec<String> },
    #[snafu(display(
        "{path}: no statistics computed from defaulted values ({} cells): {substitutions:?}",
        substitutions.len()
    ))]
    DefaultedValues {
        path: String,
        substitutions: Vec<String>,
    },
    #[snafu(display("The summary differs from the reference {path}"))]
    ReferenceMismatch { path: String },
}

pub type ReportResult<T> = Result<T, ReportError>;

/// Where the report goes.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum OutputTarget {
    /// Only the JSON summary, printed on the standard output.
    Stdout,
    Directory(PathBuf),
}

/// The resolved options of one run. All the paths are usable as is.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReportSettings {
    pub report_name: String,
    pub input_path: String,
    pub input_type: InputType,
    pub excel_worksheet_name: Option<String>,
    pub load_mode: LoadMode,
    pub schema: Schema,
    pub rules: AnalysisRules,
    pub output: OutputTarget,
    pub write_narrative: bool,
    pub write_tables: bool,
    pub electoral_sources: Vec<String>,
    pub electoral_year: Option<u32>,
    pub reference: Option<String>,
}

pub const SUMMARY_FILE: &str = "summary.json";
pub const NARRATIVE_FILE: &str = "summary_narrative.txt";
pub const BENEFIT_COMPARISON_FILE: &str = "benefit_comparison.csv";
pub const TIER_GRADIENT_FILE: &str = "tier_gradient.csv";
pub const TREND_TESTS_FILE: &str = "trend_tests.csv";
pub const ELECTORAL_GAP_FILE: &str = "electoral_gap.json";

pub fn read_policy_table(settings: &ReportSettings) -> ReportResult<LoadedTable> {
    info!(
        "Attempting to read policy file {:?} ({:?})",
        settings.input_path, settings.input_type
    );
    let loaded = match settings.input_type {
        InputType::Csv => io_csv::read_csv_policies(
            &settings.input_path,
            &settings.schema,
            settings.load_mode,
        ),
        InputType::Xlsx => io_excel::read_excel_policies(
            &settings.input_path,
            settings.excel_worksheet_name.as_deref(),
            &settings.schema,
            settings.load_mode,
        ),
    }?;
    info!(
        "read_policy_table: {} jurisdictions, benefits {:?}, {} defaulted cells",
        loaded.table.len(),
        loaded.table.schema().benefit_flags(),
        loaded.substitutions.len()
    );
    Ok(loaded)
}

fn electoral_summary(
    settings: &ReportSettings,
    table: &PolicyTable,
) -> ReportResult<JSValue> {
    let (path, records) = io_electoral::read_first_available(&settings.electoral_sources)?;
    info!("electoral_summary: using {} ({} rows)", path, records.len());
    let enriched = enrich(table, &[]).context(AnalysisSnafu {})?;
    let gap =
        electoral_gap(&enriched, &records, settings.electoral_year).context(AnalysisSnafu {})?;
    Ok(writers::electoral_gap_to_json(&gap, &path))
}

/// Writes the electoral join, if sources are configured. A failure of the
/// join only skips its artifact.
fn write_electoral_gap(settings: &ReportSettings, dir: &Path, table: &PolicyTable) -> ReportResult<()> {
    if settings.electoral_sources.is_empty() {
        return Ok(());
    }
    match electoral_summary(settings, table) {
        Ok(js) => {
            let pretty = serde_json::to_string_pretty(&js).context(SerializingJsonSnafu {})?;
            write_text(dir, ELECTORAL_GAP_FILE, &pretty)
        }
        Err(e) => {
            error!("Skipping {}: {}", ELECTORAL_GAP_FILE, e);
            Ok(())
        }
    }
}

fn create_output_dir(dir: &Path) -> ReportResult<()> {
    fs::create_dir_all(dir).context(WritingFileSnafu {
        path: dir.display().to_string(),
    })
}

fn write_text(dir: &Path, file_name: &str, contents: &str) -> ReportResult<()> {
    let p = dir.join(file_name);
    let path = p.display().to_string();
    debug!("write_text: {}", path);
    fs::write(&p, contents).context(WritingFileSnafu { path })
}

fn check_reference(reference_path: &str, pretty_js_stats: &str) -> ReportResult<()> {
    let summary_ref = read_summary(reference_path)?;
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference summary");
        print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats, "\n");
        return ReferenceMismatchSnafu {
            path: reference_path.to_string(),
        }
        .fail();
    }
    info!("The summary matches the reference {}", reference_path);
    Ok(())
}

/// Loads the data, runs the analysis and writes all the artifacts.
///
/// A table with defaulted cells (`missingValues: "default"`) only feeds the
/// electoral join. The run then fails with [ReportError::DefaultedValues]
/// before computing any statistic.
pub fn run_report(settings: &ReportSettings) -> ReportResult<AnalysisReport> {
    debug!("run_report: settings: {:?}", settings);
    let LoadedTable {
        table,
        substitutions,
    } = read_policy_table(settings)?;
    if !substitutions.is_empty() {
        if let OutputTarget::Directory(dir) = &settings.output {
            if !settings.electoral_sources.is_empty() {
                create_output_dir(dir)?;
                write_electoral_gap(settings, dir, &table)?;
            }
        }
        return DefaultedValuesSnafu {
            path: settings.input_path.clone(),
            substitutions,
        }
        .fail();
    }
    let report = run_analysis(&table, &settings.rules).context(AnalysisSnafu {})?;

    let result_js = writers::build_summary_js(settings, &report);
    let pretty_js_stats =
        serde_json::to_string_pretty(&result_js).context(SerializingJsonSnafu {})?;

    match &settings.output {
        OutputTarget::Stdout => {
            println!("{}", pretty_js_stats);
        }
        OutputTarget::Directory(dir) => {
            create_output_dir(dir)?;
            write_text(dir, SUMMARY_FILE, &pretty_js_stats)?;
            if settings.write_tables {
                writers::write_benefit_comparison(&dir.join(BENEFIT_COMPARISON_FILE), &report)?;
                writers::write_tier_gradient(&dir.join(TIER_GRADIENT_FILE), &report)?;
                writers::write_trend_tests(&dir.join(TREND_TESTS_FILE), &report)?;
            }
            if settings.write_narrative {
                let text = narrative::build_narrative(&settings.report_name, &report);
                write_text(dir, NARRATIVE_FILE, &text)?;
            }
            write_electoral_gap(settings, dir, &table)?;
            info!("Report written to {}", dir.display());
        }
    }

    if let Some(reference_path) = &settings.reference {
        check_reference(reference_path, &pretty_js_stats)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn data_path(name: &str) -> String {
        format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    fn settings_for(input: &str, out: &Path) -> ReportSettings {
        let schema = Schema::canonical();
        ReportSettings {
            report_name: "test".to_string(),
            input_path: input.to_string(),
            input_type: InputType::Csv,
            excel_worksheet_name: None,
            load_mode: LoadMode::Strict,
            rules: AnalysisRules::default_for(&schema),
            schema,
            output: OutputTarget::Directory(out.to_path_buf()),
            write_narrative: true,
            write_tables: true,
            electoral_sources: vec![],
            electoral_year: None,
            reference: None,
        }
    }

    #[test]
    fn full_report_from_fixture() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(&data_path("state_policies.csv"), dir.path());
        settings.electoral_sources = vec![
            data_path("does_not_exist.csv"),
            data_path("electoral_results.csv"),
        ];
        let report = run_report(&settings).unwrap();
        assert_eq!(report.n_jurisdictions, 51);
        assert_eq!(report.headline.n_id_required, 27);
        assert_eq!(report.headline.n_no_effective_id, 24);

        for f in [
            SUMMARY_FILE,
            NARRATIVE_FILE,
            BENEFIT_COMPARISON_FILE,
            TIER_GRADIENT_FILE,
            TREND_TESTS_FILE,
            ELECTORAL_GAP_FILE,
        ] {
            assert!(dir.path().join(f).exists(), "missing {}", f);
        }
        let summary: JSValue =
            serde_json::from_str(&fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(summary["config"]["nJurisdictions"], 51);
        assert!(summary["benefits"]["food"].is_object());

        let gap: JSValue = serde_json::from_str(
            &fs::read_to_string(dir.path().join(ELECTORAL_GAP_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(gap["year"], 2020);
        assert_eq!(gap["source"], data_path("electoral_results.csv"));
        assert_eq!(gap["voterIdAlignment"]["total"], 51);
        assert!(gap["welfareAlignment"]["percentage"].is_number());
    }

    #[test]
    fn defaulted_values_never_reach_the_statistics() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(&data_path("state_policies_missing.csv"), dir.path());
        settings.load_mode = LoadMode::Lenient;
        settings.electoral_sources = vec![data_path("electoral_results.csv")];
        match run_report(&settings) {
            Err(ReportError::DefaultedValues { substitutions, .. }) => {
                assert_eq!(substitutions.len(), 3);
                assert_eq!(substitutions[0], "line 3: id_strictness");
            }
            x => panic!("unexpected result {:?}", x),
        }
        assert!(!dir.path().join(SUMMARY_FILE).exists());
        assert!(!dir.path().join(TIER_GRADIENT_FILE).exists());
        // The join still uses the defaulted table.
        let gap: JSValue = serde_json::from_str(
            &fs::read_to_string(dir.path().join(ELECTORAL_GAP_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(gap["voterIdAlignment"]["total"], 3);

        // Same file, strict loading: the first missing cell is fatal.
        settings.load_mode = LoadMode::Strict;
        assert!(matches!(
            run_report(&settings),
            Err(ReportError::InvalidCell { lineno: 3, .. })
        ));
    }

    #[test]
    fn fixture_config_matches_the_expected_summary() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let settings = build_settings(
            Some(&data_path("report_config.json")),
            &Overrides {
                out: Some(dir.path().display().to_string()),
                reference: Some(data_path("expected_summary.json")),
                ..Default::default()
            },
        )
        .unwrap();
        let report = run_report(&settings).unwrap();
        assert_eq!(report.headline.score, "welfare_score");
        let seniors = report
            .gradient
            .trends
            .iter()
            .find(|t| t.benefit == "health_seniors")
            .unwrap();
        assert_eq!(seniors.failure.as_deref(), Some("quasi-complete separation"));
        assert!(dir.path().join(ELECTORAL_GAP_FILE).exists());
    }

    #[test]
    fn unreadable_electoral_sources_only_skip_their_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_for(&data_path("state_policies.csv"), dir.path());
        settings.write_tables = false;
        settings.write_narrative = false;
        settings.electoral_sources = vec![data_path("does_not_exist.csv")];
        assert!(run_report(&settings).is_ok());
        assert!(dir.path().join(SUMMARY_FILE).exists());
        assert!(!dir.path().join(ELECTORAL_GAP_FILE).exists());
        assert!(!dir.path().join(TIER_GRADIENT_FILE).exists());
    }

    #[test]
    fn reference_summary_is_compared() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(&data_path("state_policies.csv"), dir.path());
        run_report(&settings).unwrap();

        // The summary of a first run is its own reference.
        let mut checked = settings.clone();
        checked.reference = Some(dir.path().join(SUMMARY_FILE).display().to_string());
        assert!(run_report(&checked).is_ok());

        let bad_ref = dir.path().join("bad_reference.json");
        let mut f = fs::File::create(&bad_ref).unwrap();
        f.write_all(b"{\"config\": {}}").unwrap();
        let mut failing = settings;
        failing.reference = Some(bad_ref.display().to_string());
        assert!(matches!(
            run_report(&failing),
            Err(ReportError::ReferenceMismatch { .. })
        ));
    }

    #[test]
    fn missing_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("policies.csv");
        fs::write(
            &input,
            "abbrev,state,id_strictness,health_children,health_adults,food,eitc\nWA,Washington,4,1,1,1,1\n",
        )
        .unwrap();
        let settings = settings_for(&input.display().to_string(), &dir.path().join("out"));
        match run_report(&settings) {
            Err(ReportError::MissingColumn { column, .. }) => assert_eq!(column, "health_seniors"),
            x => panic!("unexpected result {:?}", x),
        }
        assert!(!dir.path().join("out").exists());
    }
}
