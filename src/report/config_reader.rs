use crate::report::*;

use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "reportName")]
    pub report_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "writeNarrative")]
    pub write_narrative: Option<bool>,
    #[serde(rename = "writeTables")]
    pub write_tables: Option<bool>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PolicySource {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub provider: Option<String>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    /// Replaces the five default benefit flags.
    #[serde(rename = "benefitFlags")]
    pub benefit_flags: Option<Vec<String>>,
    /// "error" (default) or "default".
    #[serde(rename = "missingValues")]
    pub missing_values: Option<String>,
}

/// A named score. Each term is either a flag name or a list of flag names.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScoreConfig {
    pub name: String,
    pub terms: Vec<JSValue>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectoralSource {
    #[serde(rename = "filePath")]
    pub file_path: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "policySource")]
    pub policy_source: PolicySource,
    pub scores: Option<Vec<ScoreConfig>>,
    #[serde(rename = "primaryScore")]
    pub primary_score: Option<String>,
    pub grouping: Option<String>,
    #[serde(rename = "electoralSources")]
    pub electoral_sources: Option<Vec<ElectoralSource>>,
    #[serde(rename = "electoralYear")]
    pub electoral_year: Option<u32>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum InputType {
    Csv,
    Xlsx,
}

impl InputType {
    pub fn from_name(name: &str) -> ReportResult<InputType> {
        match name {
            "csv" => Ok(InputType::Csv),
            "xlsx" | "excel" => Ok(InputType::Xlsx),
            x => ConfigSnafu {
                message: format!("unknown input type {:?} (expected csv or xlsx)", x),
            }
            .fail(),
        }
    }
}

/// Command-line values that take precedence over the configuration file.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Overrides {
    pub input: Option<String>,
    pub input_type: Option<String>,
    pub excel_worksheet_name: Option<String>,
    pub out: Option<String>,
    pub reference: Option<String>,
    pub electoral: Vec<String>,
    pub year: Option<u32>,
}

pub fn read_config(path: &str) -> ReportResult<ReportConfig> {
    let config_str = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: ReportConfig =
        serde_json::from_str(&config_str).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> ReportResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

// Paths of the configuration file are relative to its directory.
fn resolve(root: &Path, p: &str) -> String {
    let pb: PathBuf = [root, Path::new(p)].iter().collect();
    pb.display().to_string()
}

fn score_term(score: &str, js: &JSValue) -> ReportResult<ScoreTerm> {
    match js {
        JSValue::String(s) => Ok(ScoreTerm::Flag(s.clone())),
        JSValue::Array(l) => {
            let mut flags: Vec<String> = Vec::new();
            for x in l.iter() {
                match x.as_str() {
                    Some(s) => flags.push(s.to_string()),
                    None => {
                        return ConfigSnafu {
                            message: format!("score {}: invalid flag name {}", score, x),
                        }
                        .fail()
                    }
                }
            }
            Ok(ScoreTerm::AnyOf(flags))
        }
        x => ConfigSnafu {
            message: format!("score {}: invalid term {}", score, x),
        }
        .fail(),
    }
}

impl ScoreConfig {
    pub fn to_definition(&self) -> ReportResult<ScoreDefinition> {
        let terms = self
            .terms
            .iter()
            .map(|js| score_term(&self.name, js))
            .collect::<ReportResult<Vec<ScoreTerm>>>()?;
        Ok(ScoreDefinition {
            name: self.name.clone(),
            terms,
        })
    }
}

fn load_mode(name: &Option<String>) -> ReportResult<LoadMode> {
    match name.as_deref() {
        None | Some("error") => Ok(LoadMode::Strict),
        Some("default") => Ok(LoadMode::Lenient),
        Some(x) => ConfigSnafu {
            message: format!("missingValues must be \"error\" or \"default\", got {:?}", x),
        }
        .fail(),
    }
}

fn analysis_rules(
    schema: &Schema,
    scores: &Option<Vec<ScoreConfig>>,
    primary_score: &Option<String>,
    grouping: &Option<String>,
) -> ReportResult<AnalysisRules> {
    let mut rules = AnalysisRules::default_for(schema);
    if let Some(scs) = scores {
        rules.extra_scores = scs
            .iter()
            .map(|s| s.to_definition())
            .collect::<ReportResult<Vec<ScoreDefinition>>>()?;
    }
    if let Some(name) = primary_score {
        if name != ScoreDefinition::FULL {
            rules.primary_score = match rules.extra_scores.iter().find(|s| &s.name == name) {
                Some(s) => s.clone(),
                None => {
                    return ConfigSnafu {
                        message: format!("the primary score {:?} is not defined in scores", name),
                    }
                    .fail()
                }
            };
        }
    }
    if let Some(g) = grouping {
        rules.grouping = match Grouping::from_name(g) {
            Some(x) => x,
            None => {
                return ConfigSnafu {
                    message: format!(
                        "unknown grouping {:?} (expected five_tier, two_tier, three_tier or photo_id)",
                        g
                    ),
                }
                .fail()
            }
        };
    }
    Ok(rules)
}

fn output_target(out: &str) -> OutputTarget {
    if out == "stdout" {
        OutputTarget::Stdout
    } else {
        OutputTarget::Directory(PathBuf::from(out))
    }
}

/// Builds the settings of a run from an optional configuration file and the
/// command-line overrides.
pub fn build_settings(config_path: Option<&str>, overrides: &Overrides) -> ReportResult<ReportSettings> {
    let config: Option<(ReportConfig, PathBuf)> = match config_path {
        Some(p) => {
            let config = read_config(p)?;
            let root = Path::new(p)
                .parent()
                .map(|x| x.to_path_buf())
                .unwrap_or_default();
            Some((config, root))
        }
        None => None,
    };

    let input_path = match (&overrides.input, &config) {
        (Some(p), _) => p.clone(),
        (None, Some((c, root))) => resolve(root, &c.policy_source.file_path),
        (None, None) => {
            return ConfigSnafu {
                message: "no input: provide a configuration file or an input file".to_string(),
            }
            .fail()
        }
    };

    let policy_source = config.as_ref().map(|(c, _)| &c.policy_source);
    let input_type_name: String = overrides
        .input_type
        .clone()
        .or_else(|| policy_source.and_then(|ps| ps.provider.clone()))
        .unwrap_or_else(|| {
            if input_path.ends_with(".xlsx") {
                "xlsx".to_string()
            } else {
                "csv".to_string()
            }
        });
    let input_type = InputType::from_name(&input_type_name)?;

    let schema = match policy_source.and_then(|ps| ps.benefit_flags.clone()) {
        Some(flags) => Schema::new(&flags).context(AnalysisSnafu {})?,
        None => Schema::canonical(),
    };

    let rules = match &config {
        Some((c, _)) => analysis_rules(&schema, &c.scores, &c.primary_score, &c.grouping)?,
        None => AnalysisRules::default_for(&schema),
    };

    let output = match (&overrides.out, &config) {
        (Some(o), _) => output_target(o),
        (None, Some((c, root))) => match &c.output_settings.output_directory {
            Some(d) => OutputTarget::Directory(PathBuf::from(resolve(root, d))),
            None => OutputTarget::Stdout,
        },
        (None, None) => OutputTarget::Stdout,
    };

    let mut electoral_sources: Vec<String> = overrides.electoral.clone();
    if electoral_sources.is_empty() {
        if let Some((c, root)) = &config {
            electoral_sources = c
                .electoral_sources
                .iter()
                .flatten()
                .map(|es| resolve(root, &es.file_path))
                .collect();
        }
    }

    let res = ReportSettings {
        report_name: config
            .as_ref()
            .map(|(c, _)| c.output_settings.report_name.clone())
            .unwrap_or_else(|| "Voter ID and immigrant benefits".to_string()),
        input_path,
        input_type,
        excel_worksheet_name: overrides
            .excel_worksheet_name
            .clone()
            .or_else(|| policy_source.and_then(|ps| ps.excel_worksheet_name.clone())),
        load_mode: load_mode(&policy_source.and_then(|ps| ps.missing_values.clone()))?,
        schema,
        rules,
        output,
        write_narrative: config
            .as_ref()
            .and_then(|(c, _)| c.output_settings.write_narrative)
            .unwrap_or(true),
        write_tables: config
            .as_ref()
            .and_then(|(c, _)| c.output_settings.write_tables)
            .unwrap_or(true),
        electoral_sources,
        electoral_year: overrides
            .year
            .or_else(|| config.as_ref().and_then(|(c, _)| c.electoral_year)),
        reference: overrides.reference.clone(),
    };
    debug!("build_settings: {:?}", res);
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_path(name: &str) -> String {
        format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    #[test]
    fn settings_from_config_file() {
        let settings = build_settings(Some(&data_path("report_config.json")), &Overrides::default())
            .unwrap();
        assert_eq!(settings.report_name, "State policies");
        assert_eq!(settings.input_path, data_path("state_policies.csv"));
        assert_eq!(settings.input_type, InputType::Csv);
        assert_eq!(settings.load_mode, LoadMode::Strict);
        assert_eq!(
            settings.output,
            OutputTarget::Directory(PathBuf::from(data_path("output")))
        );
        assert_eq!(
            settings.electoral_sources,
            vec![
                data_path("electoral_missing.csv"),
                data_path("electoral_results.csv")
            ]
        );
        assert_eq!(settings.electoral_year, Some(2020));
        assert_eq!(settings.rules.primary_score.name, "welfare_score");
        let names: Vec<&str> = settings
            .rules
            .extra_scores
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["adults", "any"]);
        // The scores of the file are the default ones.
        assert_eq!(settings.rules.extra_scores[0], ScoreDefinition::adults());
        assert_eq!(settings.rules.extra_scores[1], ScoreDefinition::any_coverage());
    }

    #[test]
    fn overrides_take_precedence() {
        let overrides = Overrides {
            input: Some("other.xlsx".to_string()),
            out: Some("stdout".to_string()),
            electoral: vec!["votes.csv".to_string()],
            year: Some(2016),
            ..Default::default()
        };
        let settings = build_settings(Some(&data_path("report_config.json")), &overrides).unwrap();
        assert_eq!(settings.input_path, "other.xlsx");
        // The provider of the configuration file still applies.
        assert_eq!(settings.input_type, InputType::Csv);
        assert_eq!(settings.output, OutputTarget::Stdout);
        assert_eq!(settings.electoral_sources, vec!["votes.csv".to_string()]);
        assert_eq!(settings.electoral_year, Some(2016));
    }

    #[test]
    fn settings_without_config() {
        let overrides = Overrides {
            input: Some("policies.xlsx".to_string()),
            ..Default::default()
        };
        let settings = build_settings(None, &overrides).unwrap();
        assert_eq!(settings.input_type, InputType::Xlsx);
        assert_eq!(settings.output, OutputTarget::Stdout);
        assert_eq!(settings.schema, Schema::canonical());
        assert!(build_settings(None, &Overrides::default()).is_err());
    }

    #[test]
    fn score_terms() {
        let sc: ScoreConfig = serde_json::from_str(
            r#"{"name": "mixed", "terms": ["food", ["health_adults", "health_seniors"]]}"#,
        )
        .unwrap();
        let def = sc.to_definition().unwrap();
        assert_eq!(
            def.terms,
            vec![
                ScoreTerm::Flag("food".to_string()),
                ScoreTerm::AnyOf(vec![
                    "health_adults".to_string(),
                    "health_seniors".to_string()
                ])
            ]
        );
        let bad: ScoreConfig = serde_json::from_str(r#"{"name": "bad", "terms": [3]}"#).unwrap();
        assert!(bad.to_definition().is_err());
    }

    #[test]
    fn invalid_rules_are_config_errors() {
        let schema = Schema::canonical();
        assert!(matches!(
            analysis_rules(&schema, &None, &Some("adults_only".to_string()), &None),
            Err(ReportError::Config { .. })
        ));
        assert!(matches!(
            analysis_rules(&schema, &None, &None, &Some("four_tier".to_string())),
            Err(ReportError::Config { .. })
        ));
        let rules =
            analysis_rules(&schema, &None, &None, &Some("photo_id".to_string())).unwrap();
        assert_eq!(rules.grouping, Grouping::Collapsed(CollapseScheme::PhotoId));
        assert_eq!(load_mode(&Some("default".to_string())).unwrap(), LoadMode::Lenient);
        assert!(load_mode(&Some("zero".to_string())).is_err());
    }
}
