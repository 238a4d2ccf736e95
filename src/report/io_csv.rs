// Primitives for reading CSV files.

use std::fs::File;

use crate::report::{
    io_common::{column_mapping, policy_table_from_rows, LoadMode, LoadedTable},
    *,
};

/// The header of the file, and an iterator over the remaining records.
pub fn get_records(path: &str) -> ReportResult<(Vec<Option<String>>, csv::StringRecordsIntoIter<File>)> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let mut records = rdr.into_records();
    let header = records
        .next()
        .context(EmptyFileSnafu { path })?
        .context(CsvLineParseSnafu { path, lineno: 1usize })?;
    let header: Vec<Option<String>> = header
        .iter()
        // Byte order mark of files exported from spreadsheets
        .map(|s| s.trim_start_matches('\u{feff}').trim())
        .map(|s| if s.is_empty() { None } else { Some(s.to_string()) })
        .collect();
    debug!("get_records: {}: header: {:?}", path, header);
    Ok((header, records))
}

/// Reads all the data rows, numbered by their line in the file.
pub fn read_rows(
    path: &str,
    records: csv::StringRecordsIntoIter<File>,
) -> ReportResult<Vec<(usize, Vec<Option<String>>)>> {
    let mut res: Vec<(usize, Vec<Option<String>>)> = Vec::new();
    for (idx, line_r) in records.enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { path, lineno })?;
        let row: Vec<Option<String>> = line
            .iter()
            .map(|s| if s.trim().is_empty() { None } else { Some(s.to_string()) })
            .collect();
        res.push((lineno, row));
    }
    Ok(res)
}

pub fn read_csv_policies(path: &str, schema: &Schema, mode: LoadMode) -> ReportResult<LoadedTable> {
    let (header, records) = get_records(path)?;
    let mapping = column_mapping(path, &header, schema)?;
    let rows = read_rows(path, records)?;
    policy_table_from_rows(path, rows, &mapping, schema, mode)
}
