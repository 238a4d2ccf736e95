// Reading policy tables from Excel workbooks.

use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::report::{
    io_common::{column_mapping, policy_table_from_rows, LoadMode, LoadedTable},
    *,
};

/// The content of a cell as text. Numbers without a fractional part are
/// written as integers.
pub fn cell_text(dt: &DataType) -> Option<String> {
    match dt {
        DataType::Empty => None,
        DataType::String(s) if s.trim().is_empty() => None,
        DataType::String(s) => Some(s.trim().to_string()),
        DataType::Int(i) => Some(i.to_string()),
        DataType::Float(f) if f.fract() == 0.0 => Some(format!("{}", *f as i64)),
        DataType::Float(f) => Some(f.to_string()),
        DataType::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        x => Some(format!("{:?}", x)),
    }
}

fn get_range(path: &str, worksheet_name_o: Option<&str>) -> ReportResult<calamine::Range<DataType>> {
    debug!(
        "get_range: path: {:?} worksheet: {:?}",
        path, worksheet_name_o
    );
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(worksheet_name) = worksheet_name_o {
        let wrange = workbook
            .worksheet_range(worksheet_name)
            .context(MissingWorksheetSnafu {
                path,
                worksheet: worksheet_name,
            })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    } else {
        let wrange = workbook
            .worksheet_range_at(0)
            .context(MissingWorksheetSnafu {
                path,
                worksheet: "#1",
            })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    }
}

pub fn read_excel_policies(
    path: &str,
    worksheet_name: Option<&str>,
    schema: &Schema,
    mode: LoadMode,
) -> ReportResult<LoadedTable> {
    let wrange = get_range(path, worksheet_name)?;
    let mut iter = wrange.rows();
    let header: Vec<Option<String>> = iter
        .next()
        .context(EmptyFileSnafu { path })?
        .iter()
        .map(cell_text)
        .collect();
    debug!("read_excel_policies: header: {:?}", header);
    let mapping = column_mapping(path, &header, schema)?;
    // The header is row 1.
    let rows = iter
        .enumerate()
        .map(|(idx, row)| (idx + 2, row.iter().map(cell_text).collect::<Vec<_>>()));
    policy_table_from_rows(path, rows, &mapping, schema, mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_conversions() {
        assert_eq!(cell_text(&DataType::Empty), None);
        assert_eq!(cell_text(&DataType::String("  ".to_string())), None);
        assert_eq!(
            cell_text(&DataType::String(" WA ".to_string())),
            Some("WA".to_string())
        );
        assert_eq!(cell_text(&DataType::Float(4.0)), Some("4".to_string()));
        assert_eq!(cell_text(&DataType::Float(0.5)), Some("0.5".to_string()));
        assert_eq!(cell_text(&DataType::Int(1)), Some("1".to_string()));
        assert_eq!(cell_text(&DataType::Bool(false)), Some("0".to_string()));
    }

    #[test]
    fn missing_workbook() {
        let res = read_excel_policies(
            "/nonexistent/policies.xlsx",
            None,
            &Schema::canonical(),
            LoadMode::Strict,
        );
        assert!(matches!(res, Err(ReportError::OpeningExcel { .. })));
    }
}
