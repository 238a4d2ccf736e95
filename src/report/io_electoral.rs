// Electoral results, joined to the policy table by jurisdiction id.

use crate::report::{
    io_common::{find_column, parse_integer, simplify_file_name},
    io_csv::{get_records, read_rows},
    *,
};

pub const ELECTORAL_ID_COLUMNS: [&str; 3] = ["jurisdiction_id", "state_po", "state"];
pub const YEAR_COLUMN: &str = "year";
pub const DEM_SHARE_COLUMN: &str = "dem_share";

pub fn read_electoral_csv(path: &str) -> ReportResult<Vec<ElectoralRecord>> {
    let (header, records) = get_records(path)?;
    let header_names: Vec<String> = header.iter().flatten().cloned().collect();
    let id_idx = find_column(&header, &ELECTORAL_ID_COLUMNS).context(MissingColumnSnafu {
        path,
        column: ELECTORAL_ID_COLUMNS.join("|"),
        header: header_names.clone(),
    })?;
    let year_idx = find_column(&header, &[YEAR_COLUMN]).context(MissingColumnSnafu {
        path,
        column: YEAR_COLUMN,
        header: header_names.clone(),
    })?;
    let share_idx = find_column(&header, &[DEM_SHARE_COLUMN]).context(MissingColumnSnafu {
        path,
        column: DEM_SHARE_COLUMN,
        header: header_names,
    })?;

    let mut res: Vec<ElectoralRecord> = Vec::new();
    for (lineno, row) in read_rows(path, records)? {
        let get = |idx: usize| row.get(idx).cloned().flatten().unwrap_or_default();
        let id = get(id_idx).trim().to_string();
        if id.is_empty() {
            debug!("read_electoral_csv: line {}: no jurisdiction, skipping", lineno);
            continue;
        }
        let year_s = get(year_idx);
        let year = parse_integer(year_s.trim())
            .filter(|y| *y > 0 && *y <= u32::MAX as i64)
            .context(InvalidCellSnafu {
                path,
                lineno,
                column: YEAR_COLUMN,
                content: year_s.as_str(),
            })?;
        let share_s = get(share_idx);
        let dem_share = share_s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|x| x.is_finite())
            .context(InvalidCellSnafu {
                path,
                lineno,
                column: DEM_SHARE_COLUMN,
                content: share_s.as_str(),
            })?;
        res.push(ElectoralRecord {
            jurisdiction_id: id,
            year: year as u32,
            dem_share,
        });
    }
    debug!(
        "read_electoral_csv: {}: {} rows",
        simplify_file_name(path),
        res.len()
    );
    Ok(res)
}

/// Tries the sources in order and returns the first one that can be read.
pub fn read_first_available(paths: &[String]) -> ReportResult<(String, Vec<ElectoralRecord>)> {
    for p in paths.iter() {
        match read_electoral_csv(p) {
            Ok(records) => return Ok((p.clone(), records)),
            Err(e) => {
                warn!("Electoral source {} is not usable: {}", p, e);
            }
        }
    }
    ElectoralUnavailableSnafu {
        paths: paths.to_vec(),
    }
    .fail()
}
