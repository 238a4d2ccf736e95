// Primitives shared by the table readers.

use std::collections::HashMap;
use std::path::Path;

use crate::report::*;

pub const ID_COLUMNS: [&str; 3] = ["jurisdiction_id", "abbrev", "state_po"];
pub const NAME_COLUMNS: [&str; 3] = ["jurisdiction_name", "state", "name"];
pub const TIER_COLUMN: &str = "id_strictness";

/// How missing cells are treated.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum LoadMode {
    /// Missing values are errors.
    Strict,
    /// A missing tier becomes 3 and a missing flag becomes 0.
    Lenient,
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// The position of the first of the candidate names found in the header.
pub fn find_column(header: &[Option<String>], candidates: &[&str]) -> Option<usize> {
    let col_names: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .filter_map(|(idx, x)| x.as_ref().map(|s| (s.as_str(), idx)))
        .collect();
    candidates.iter().find_map(|c| col_names.get(c).cloned())
}

fn require_column(path: &str, header: &[Option<String>], candidates: &[&str]) -> ReportResult<usize> {
    find_column(header, candidates).context(MissingColumnSnafu {
        path,
        column: candidates.join("|"),
        header: header.iter().flatten().cloned().collect::<Vec<String>>(),
    })
}

/// The positions of the columns needed to build a policy table.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnMapping {
    pub id: usize,
    pub name: usize,
    pub tier: usize,
    /// In the order of the schema.
    pub flags: Vec<(usize, String)>,
}

pub fn column_mapping(path: &str, header: &[Option<String>], schema: &Schema) -> ReportResult<ColumnMapping> {
    let id = require_column(path, header, &ID_COLUMNS)?;
    let name = require_column(path, header, &NAME_COLUMNS)?;
    let tier = require_column(path, header, &[TIER_COLUMN])?;
    let mut flags: Vec<(usize, String)> = Vec::new();
    for f in schema.benefit_flags() {
        flags.push((require_column(path, header, &[f.as_str()])?, f.clone()));
    }
    let res = ColumnMapping {
        id,
        name,
        tier,
        flags,
    };
    debug!("column_mapping: {}: {:?}", simplify_file_name(path), res);
    Ok(res)
}

fn cell(row: &[Option<String>], idx: usize) -> Option<&str> {
    row.get(idx)
        .and_then(|x| x.as_deref())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Integers may be written as floats by spreadsheets ("4.0").
pub fn parse_integer(s: &str) -> Option<i64> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        _ => None,
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match parse_integer(s) {
        Some(0) => Some(false),
        Some(1) => Some(true),
        _ => None,
    }
}

/// A policy table and the cells that were filled with a default value.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: PolicyTable,
    /// One entry per defaulted cell, as `line N: column`.
    pub substitutions: Vec<String>,
}

/// Builds the policy table from the data rows of a file. `lineno` is the line
/// number of the row in the file, for the error messages.
pub fn policy_table_from_rows<I>(
    path: &str,
    rows: I,
    mapping: &ColumnMapping,
    schema: &Schema,
    mode: LoadMode,
) -> ReportResult<LoadedTable>
where
    I: IntoIterator<Item = (usize, Vec<Option<String>>)>,
{
    let mut records: Vec<PolicyRecord> = Vec::new();
    let mut substitutions: Vec<String> = Vec::new();
    for (lineno, row) in rows {
        if (0..row.len()).all(|i| cell(&row, i).is_none()) {
            debug!("policy_table_from_rows: skipping empty line {}", lineno);
            continue;
        }
        let jurisdiction_id = cell(&row, mapping.id)
            .context(InvalidCellSnafu {
                path,
                lineno,
                column: ID_COLUMNS[0],
                content: "",
            })?
            .to_string();
        let jurisdiction_name = cell(&row, mapping.name)
            .unwrap_or(jurisdiction_id.as_str())
            .to_string();

        let id_strictness = match (cell(&row, mapping.tier), mode) {
            (Some(s), _) => parse_integer(s).and_then(Tier::new).context(InvalidCellSnafu {
                path,
                lineno,
                column: TIER_COLUMN,
                content: s,
            })?,
            (None, LoadMode::Lenient) => {
                warn!(
                    "{}: line {}: {} has no {}, using tier {}",
                    simplify_file_name(path),
                    lineno,
                    jurisdiction_id,
                    TIER_COLUMN,
                    Tier::MISSING_DEFAULT.value()
                );
                substitutions.push(format!("line {}: {}", lineno, TIER_COLUMN));
                Tier::MISSING_DEFAULT
            }
            (None, LoadMode::Strict) => {
                return InvalidCellSnafu {
                    path,
                    lineno,
                    column: TIER_COLUMN,
                    content: "",
                }
                .fail()
            }
        };

        let mut benefit_flags: Vec<bool> = Vec::with_capacity(mapping.flags.len());
        for (idx, flag_name) in mapping.flags.iter() {
            let v = match (cell(&row, *idx), mode) {
                (Some(s), _) => parse_flag(s).context(InvalidCellSnafu {
                    path,
                    lineno,
                    column: flag_name,
                    content: s,
                })?,
                (None, LoadMode::Lenient) => {
                    warn!(
                        "{}: line {}: {} has no value for {}, using 0",
                        simplify_file_name(path),
                        lineno,
                        jurisdiction_id,
                        flag_name
                    );
                    substitutions.push(format!("line {}: {}", lineno, flag_name));
                    false
                }
                (None, LoadMode::Strict) => {
                    return InvalidCellSnafu {
                        path,
                        lineno,
                        column: flag_name,
                        content: "",
                    }
                    .fail()
                }
            };
            benefit_flags.push(v);
        }

        let record = PolicyRecord {
            jurisdiction_id,
            jurisdiction_name,
            id_strictness,
            benefit_flags,
        };
        debug!("policy_table_from_rows: line {}: {:?}", lineno, record);
        records.push(record);
    }
    let table = PolicyTable::new(schema.clone(), records).context(AnalysisSnafu {})?;
    Ok(LoadedTable {
        table,
        substitutions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Vec<Option<String>> {
        names.iter().map(|s| Some(s.to_string())).collect()
    }

    fn row(cells: &[&str]) -> Vec<Option<String>> {
        cells
            .iter()
            .map(|s| if s.is_empty() { None } else { Some(s.to_string()) })
            .collect()
    }

    fn four_flags() -> Schema {
        Schema::new(&[
            "health".to_string(),
            "food".to_string(),
            "cash".to_string(),
            "eitc".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn aliases_are_tried_in_order() {
        let h = header(&["state", "abbrev", "id_strictness", "state_po"]);
        assert_eq!(find_column(&h, &ID_COLUMNS), Some(1));
        assert_eq!(find_column(&h, &NAME_COLUMNS), Some(0));
        assert_eq!(find_column(&h, &["missing"]), None);
    }

    #[test]
    fn missing_flag_column_is_a_schema_error() {
        let h = header(&["abbrev", "state", "id_strictness", "health", "food", "eitc"]);
        match column_mapping("x.csv", &h, &four_flags()) {
            Err(ReportError::MissingColumn { column, header, .. }) => {
                assert_eq!(column, "cash");
                assert_eq!(header.len(), 6);
            }
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn strict_and_lenient_loading() {
        let schema = four_flags();
        let h = header(&["abbrev", "state", "id_strictness", "health", "food", "cash", "eitc"]);
        let mapping = column_mapping("x.csv", &h, &schema).unwrap();
        let rows = vec![
            (2, row(&["WA", "Washington", "4", "1", "1", "0", "1"])),
            (3, row(&["GA", "Georgia", "", "0", "", "0", "0"])),
            (4, row(&["", "", "", "", "", "", ""])),
        ];
        match policy_table_from_rows("x.csv", rows.clone(), &mapping, &schema, LoadMode::Strict) {
            Err(ReportError::InvalidCell { lineno, column, .. }) => {
                assert_eq!(lineno, 3);
                assert_eq!(column, TIER_COLUMN);
            }
            x => panic!("unexpected {:?}", x),
        }
        let loaded =
            policy_table_from_rows("x.csv", rows, &mapping, &schema, LoadMode::Lenient).unwrap();
        assert_eq!(
            loaded.substitutions,
            vec!["line 3: id_strictness".to_string(), "line 3: food".to_string()]
        );
        let t = loaded.table;
        assert_eq!(t.len(), 2);
        let ga = t.get("GA").unwrap();
        assert_eq!(ga.id_strictness, Tier::MISSING_DEFAULT);
        assert_eq!(ga.benefit_flags, vec![false; 4]);
        assert_eq!(
            t.get("WA").unwrap().benefit_flags,
            vec![true, true, false, true]
        );
    }

    #[test]
    fn invalid_values_fail_in_both_modes() {
        let schema = four_flags();
        let h = header(&["abbrev", "state", "id_strictness", "health", "food", "cash", "eitc"]);
        let mapping = column_mapping("x.csv", &h, &schema).unwrap();
        for bad in [
            row(&["WA", "Washington", "6", "1", "1", "0", "1"]),
            row(&["WA", "Washington", "4", "2", "1", "0", "1"]),
            row(&["WA", "Washington", "4", "yes", "1", "0", "1"]),
        ] {
            for mode in [LoadMode::Strict, LoadMode::Lenient] {
                assert!(matches!(
                    policy_table_from_rows("x.csv", vec![(2, bad.clone())], &mapping, &schema, mode),
                    Err(ReportError::InvalidCell { .. })
                ));
            }
        }
        let dup = vec![
            (2, row(&["WA", "Washington", "4.0", "1", "1", "0", "1"])),
            (3, row(&["WA", "Washington", "4", "1", "1", "0", "1"])),
        ];
        assert!(matches!(
            policy_table_from_rows("x.csv", dup, &mapping, &schema, LoadMode::Strict),
            Err(ReportError::Analysis {
                source: AnalysisError::DuplicateJurisdiction(_)
            })
        ));
    }

    #[test]
    fn integers_from_spreadsheets() {
        assert_eq!(parse_integer("4"), Some(4));
        assert_eq!(parse_integer("4.0"), Some(4));
        assert_eq!(parse_integer("4.5"), None);
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("0.0"), Some(false));
        assert_eq!(parse_flag("-1"), None);
    }
}
