use clap::Parser;

/// Compares the benefits offered to immigrants by jurisdictions with strict and
/// lenient voter-ID requirements.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON configuration of the report. The paths it contains are
    /// relative to its directory. See the manual of the policy_stats crate for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) The policy table. Setting this option overrides the file that may be
    /// specified with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (csv or xlsx, default csv) The type of the policy table.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (default: first worksheet) When using an Excel file, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// (directory path or 'stdout') If specified, the report will be written in this directory.
    /// With 'stdout', only the JSON summary is printed. Setting this option overrides the
    /// directory that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, idwelfare will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, repeatable) Electoral results in CSV format. The files are tried in order
    /// and the first readable one is used.
    #[clap(long, value_parser)]
    pub electoral: Vec<String>,

    /// The election year used for the electoral comparison (default: the latest one).
    #[clap(long, value_parser)]
    pub year: Option<u32>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

impl Args {
    pub fn overrides(&self) -> crate::report::config_reader::Overrides {
        crate::report::config_reader::Overrides {
            input: self.input.clone(),
            input_type: self.input_type.clone(),
            excel_worksheet_name: self.excel_worksheet_name.clone(),
            out: self.out.clone(),
            reference: self.reference.clone(),
            electoral: self.electoral.clone(),
            year: self.year,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_command_line() {
        let args = Args::try_parse_from([
            "idwelfare",
            "-c",
            "report.json",
            "--electoral",
            "a.csv",
            "--electoral",
            "b.csv",
            "--year",
            "2016",
            "-o",
            "stdout",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(args.config, Some("report.json".to_string()));
        assert!(args.verbose);
        let o = args.overrides();
        assert_eq!(o.electoral, vec!["a.csv".to_string(), "b.csv".to_string()]);
        assert_eq!(o.year, Some(2016));
        assert_eq!(o.out, Some("stdout".to_string()));
        assert_eq!(o.input, None);
    }

    #[test]
    fn rejects_a_bad_year() {
        assert!(Args::try_parse_from(["idwelfare", "--year", "last"]).is_err());
    }
}
