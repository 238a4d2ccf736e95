// JSON summary and CSV tables.

use serde_json::json;
use serde_json::Map as JSMap;

use crate::report::{narrative::stars, *};

/// Rounds to 7 significant digits.
pub fn round_sig(x: f64) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    format!("{:.6e}", x).parse::<f64>().unwrap_or(x)
}

fn num(x: f64) -> JSValue {
    json!(round_sig(x))
}

/// Inserts the value under `key`, or `null` and the reason under `{key}Reason`.
fn insert_computed(m: &mut JSMap<String, JSValue>, key: &str, c: &Computed<f64>) {
    match c {
        Computed::Value(x) => {
            m.insert(key.to_string(), num(*x));
        }
        Computed::NotComputable(reason) => {
            m.insert(key.to_string(), JSValue::Null);
            m.insert(format!("{}Reason", key), json!(reason));
        }
    }
}

fn benefits_to_json(report: &AnalysisReport) -> JSMap<String, JSValue> {
    let mut res: JSMap<String, JSValue> = JSMap::new();
    for shares in report.shares.iter() {
        let mut groups: JSMap<String, JSValue> = JSMap::new();
        for gs in shares.groups.iter() {
            let mut g: JSMap<String, JSValue> = JSMap::new();
            g.insert("count".to_string(), json!(gs.count));
            g.insert("total".to_string(), json!(gs.total));
            insert_computed(&mut g, "percentage", &gs.percentage);
            groups.insert(gs.group.clone(), JSValue::Object(g));
        }
        let mut b: JSMap<String, JSValue> = JSMap::new();
        b.insert("groups".to_string(), JSValue::Object(groups));
        if let Some(bo) = report.odds.iter().find(|o| o.benefit == shares.benefit) {
            match &bo.result {
                Computed::Value(or) => {
                    b.insert("oddsRatio".to_string(), num(or.odds_ratio));
                    b.insert("corrected".to_string(), json!(or.corrected));
                    b.insert("pValue".to_string(), num(or.p_value));
                    b.insert("noEffectiveIdPct".to_string(), num(or.group1_pct));
                    b.insert("idRequiredPct".to_string(), num(or.group2_pct));
                    b.insert(
                        "table".to_string(),
                        json!({"a": or.table.a, "b": or.table.b, "c": or.table.c, "d": or.table.d}),
                    );
                }
                Computed::NotComputable(reason) => {
                    b.insert("oddsRatio".to_string(), JSValue::Null);
                    b.insert("oddsRatioReason".to_string(), json!(reason));
                }
            }
        }
        res.insert(shares.benefit.clone(), JSValue::Object(b));
    }
    res
}

fn score_summary_to_json(s: &ScoreSummary) -> JSValue {
    let mut m: JSMap<String, JSValue> = JSMap::new();
    m.insert("group".to_string(), json!(s.group));
    m.insert("n".to_string(), json!(s.n));
    insert_computed(&mut m, "mean", &s.mean);
    insert_computed(&mut m, "median", &s.median);
    JSValue::Object(m)
}

fn score_comparison_to_json(c: &ScoreComparison) -> JSValue {
    let mut m: JSMap<String, JSValue> = JSMap::new();
    m.insert("score".to_string(), json!(c.score));
    m.insert("maxScore".to_string(), json!(c.max_score));
    m.insert(
        "groups".to_string(),
        json!([score_summary_to_json(&c.group1), score_summary_to_json(&c.group2)]),
    );
    insert_computed(&mut m, "meanDifference", &c.mean_difference);
    match &c.test {
        Computed::Value(mw) => {
            m.insert("uStatistic".to_string(), num(mw.u_statistic));
            m.insert("pValue".to_string(), num(mw.p_value));
            m.insert("effectSize".to_string(), num(mw.effect_size));
            m.insert(
                "method".to_string(),
                json!(match mw.method {
                    MannWhitneyMethod::Exact => "exact",
                    MannWhitneyMethod::Asymptotic => "asymptotic",
                }),
            );
        }
        Computed::NotComputable(reason) => {
            m.insert("pValue".to_string(), JSValue::Null);
            m.insert("pValueReason".to_string(), json!(reason));
        }
    }
    JSValue::Object(m)
}

fn correlation_to_json(c: &Computed<Correlation>) -> JSValue {
    match c {
        Computed::Value(x) => json!({"coefficient": num(x.coefficient), "pValue": num(x.p_value)}),
        Computed::NotComputable(reason) => json!({"coefficient": null, "reason": reason}),
    }
}

fn gradient_to_json(g: &TierGradient) -> JSValue {
    let tiers: Vec<JSValue> = g
        .rows
        .iter()
        .map(|row| {
            let mut m: JSMap<String, JSValue> = JSMap::new();
            m.insert("tier".to_string(), json!(row.tier.value()));
            m.insert("label".to_string(), json!(row.tier.label()));
            m.insert("n".to_string(), json!(row.n));
            insert_computed(&mut m, "meanScore", &row.mean_score);
            let mut pcts: JSMap<String, JSValue> = JSMap::new();
            for (benefit, pct) in row.benefit_pct.iter() {
                pcts.insert(
                    benefit.clone(),
                    pct.value().map(|x| num(*x)).unwrap_or(JSValue::Null),
                );
            }
            m.insert("benefitPct".to_string(), JSValue::Object(pcts));
            m.insert("members".to_string(), json!(row.members));
            JSValue::Object(m)
        })
        .collect();
    let trends: Vec<JSValue> = g
        .trends
        .iter()
        .map(|t| {
            json!({
                "benefit": t.benefit,
                "slope": t.slope.map(round_sig),
                "pValue": num(t.p_value),
                "failure": t.failure,
            })
        })
        .collect();
    json!({
        "score": g.score,
        "tiers": tiers,
        "pearson": correlation_to_json(&g.pearson),
        "spearman": correlation_to_json(&g.spearman),
        "trendTests": trends,
    })
}

fn headline_to_json(h: &Headline) -> JSValue {
    let mut m: JSMap<String, JSValue> = JSMap::new();
    m.insert("score".to_string(), json!(h.score));
    m.insert("nNoEffectiveId".to_string(), json!(h.n_no_effective_id));
    m.insert("nIdRequired".to_string(), json!(h.n_id_required));
    insert_computed(&mut m, "meanNoEffectiveId", &h.mean_no_effective_id);
    insert_computed(&mut m, "meanIdRequired", &h.mean_id_required);
    insert_computed(&mut m, "ratio", &h.ratio);
    JSValue::Object(m)
}

pub fn build_summary_js(settings: &ReportSettings, report: &AnalysisReport) -> JSValue {
    let mut comparisons: Vec<JSValue> = vec![score_comparison_to_json(&report.score_comparison)];
    comparisons.extend(
        report
            .extra_score_comparisons
            .iter()
            .map(score_comparison_to_json),
    );
    json!({
        "config": {
            "reportName": settings.report_name,
            "benefitFlags": report.benefit_flags,
            "grouping": report.grouping.name(),
            "primaryScore": report.score_comparison.score,
            "nJurisdictions": report.n_jurisdictions,
        },
        "headline": headline_to_json(&report.headline),
        "benefits": benefits_to_json(report),
        "scoreComparisons": comparisons,
        "tierGradient": gradient_to_json(&report.gradient),
    })
}

fn gap_comparison_to_json(g: &GapComparison) -> JSValue {
    let mut m: JSMap<String, JSValue> = JSMap::new();
    m.insert("group1".to_string(), json!(g.group1));
    m.insert("group2".to_string(), json!(g.group2));
    m.insert("n1".to_string(), json!(g.n1));
    m.insert("n2".to_string(), json!(g.n2));
    insert_computed(&mut m, "mean1", &g.mean1);
    insert_computed(&mut m, "mean2", &g.mean2);
    insert_computed(&mut m, "gap", &g.gap);
    JSValue::Object(m)
}

fn alignment_to_json(a: &Computed<PartyAlignment>) -> JSValue {
    match a {
        Computed::Value(x) => json!({
            "matched": x.matched,
            "total": x.total,
            "percentage": num(x.percentage),
        }),
        Computed::NotComputable(reason) => json!({"percentage": null, "reason": reason}),
    }
}

pub fn electoral_gap_to_json(gap: &ElectoralGap, source: &str) -> JSValue {
    json!({
        "source": source,
        "year": gap.year,
        "voterId": gap_comparison_to_json(&gap.voter_id),
        "welfare": gap_comparison_to_json(&gap.welfare),
        "voterIdAlignment": alignment_to_json(&gap.voter_id_alignment),
        "welfareAlignment": alignment_to_json(&gap.welfare_alignment),
        "unmatched": gap.unmatched,
    })
}

fn fmt_num(x: f64) -> String {
    round_sig(x).to_string()
}

fn fmt_computed(c: &Computed<f64>) -> String {
    c.value().map(|x| fmt_num(*x)).unwrap_or_default()
}

fn write_rows(path: &Path, header: &[String], rows: &[Vec<String>]) -> ReportResult<()> {
    let p = path.display().to_string();
    let mut wtr = csv::Writer::from_path(path).context(CsvWriteSnafu { path: p.as_str() })?;
    wtr.write_record(header)
        .context(CsvWriteSnafu { path: p.as_str() })?;
    for row in rows.iter() {
        wtr.write_record(row)
            .context(CsvWriteSnafu { path: p.as_str() })?;
    }
    wtr.flush().context(WritingFileSnafu { path: p.as_str() })?;
    debug!("write_rows: {} ({} rows)", p, rows.len());
    Ok(())
}

/// One row per benefit: both groups, the odds ratio and the Fisher p-value.
pub fn write_benefit_comparison(path: &Path, report: &AnalysisReport) -> ReportResult<()> {
    let header: Vec<String> = [
        "benefit",
        "no_effective_id_count",
        "no_effective_id_total",
        "no_effective_id_pct",
        "id_required_count",
        "id_required_total",
        "id_required_pct",
        "odds_ratio",
        "corrected",
        "p_value",
        "significance",
        "note",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let rows: Vec<Vec<String>> = report
        .odds
        .iter()
        .map(|bo| match &bo.result {
            Computed::Value(or) => vec![
                bo.benefit.clone(),
                or.table.a.to_string(),
                (or.table.a + or.table.b).to_string(),
                fmt_num(or.group1_pct),
                or.table.c.to_string(),
                (or.table.c + or.table.d).to_string(),
                fmt_num(or.group2_pct),
                fmt_num(or.odds_ratio),
                or.corrected.to_string(),
                fmt_num(or.p_value),
                stars(or.p_value).to_string(),
                String::new(),
            ],
            Computed::NotComputable(reason) => {
                let mut row = vec![bo.benefit.clone()];
                row.extend(std::iter::repeat(String::new()).take(10));
                row.push(reason.clone());
                row
            }
        })
        .collect();
    write_rows(path, &header, &rows)
}

pub fn write_tier_gradient(path: &Path, report: &AnalysisReport) -> ReportResult<()> {
    let g = &report.gradient;
    let mut header: Vec<String> = vec![
        "tier".to_string(),
        "label".to_string(),
        "n".to_string(),
        format!("mean_{}", g.score),
    ];
    if let Some(first) = g.rows.first() {
        header.extend(first.benefit_pct.iter().map(|(b, _)| format!("pct_{}", b)));
    }
    header.push("members".to_string());
    let rows: Vec<Vec<String>> = g
        .rows
        .iter()
        .map(|row| {
            let mut r = vec![
                row.tier.value().to_string(),
                row.tier.label().to_string(),
                row.n.to_string(),
                fmt_computed(&row.mean_score),
            ];
            r.extend(row.benefit_pct.iter().map(|(_, pct)| fmt_computed(pct)));
            r.push(row.members.join(" "));
            r
        })
        .collect();
    write_rows(path, &header, &rows)
}

pub fn write_trend_tests(path: &Path, report: &AnalysisReport) -> ReportResult<()> {
    let header: Vec<String> = ["benefit", "slope", "p_value", "significance", "failure"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let rows: Vec<Vec<String>> = report
        .gradient
        .trends
        .iter()
        .map(|t| {
            vec![
                t.benefit.clone(),
                t.slope.map(fmt_num).unwrap_or_default(),
                fmt_num(t.p_value),
                stars(t.p_value).to_string(),
                t.failure.clone().unwrap_or_default(),
            ]
        })
        .collect();
    write_rows(path, &header, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_stats::builder::Builder;

    fn small_report() -> AnalysisReport {
        let mut b = Builder::canonical();
        b.add_jurisdiction("AA", "A", 1, &[]).unwrap();
        b.add_jurisdiction("BB", "B", 2, &["food"]).unwrap();
        b.add_jurisdiction("CC", "C", 4, &["food", "eitc"]).unwrap();
        b.add_jurisdiction("DD", "D", 5, &["health_children", "food", "eitc"])
            .unwrap();
        let table = b.build().unwrap();
        run_analysis(&table, &AnalysisRules::default_for(table.schema())).unwrap()
    }

    #[test]
    fn rounding() {
        assert_eq!(round_sig(0.123_456_789), 0.123_456_8);
        assert_eq!(round_sig(1.234_567_89e-12), 1.234_568e-12);
        assert_eq!(round_sig(0.0), 0.0);
        assert_eq!(round_sig(20.0), 20.0);
    }

    #[test]
    fn not_computable_values_are_null_with_a_reason() {
        let mut m: JSMap<String, JSValue> = JSMap::new();
        insert_computed(&mut m, "mean", &Computed::NotComputable("empty group".to_string()));
        insert_computed(&mut m, "median", &Computed::Value(2.0));
        assert_eq!(m["mean"], JSValue::Null);
        assert_eq!(m["meanReason"], json!("empty group"));
        assert_eq!(m["median"], json!(2.0));
        assert!(!m.contains_key("medianReason"));
    }

    #[test]
    fn summary_fields() {
        let report = small_report();
        let settings = crate::report::config_reader::build_settings(
            None,
            &crate::report::config_reader::Overrides {
                input: Some("x.csv".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        let js = build_summary_js(&settings, &report);
        assert_eq!(js["config"]["nJurisdictions"], 4);
        assert_eq!(js["config"]["grouping"], "two_tier");
        let food = &js["benefits"]["food"];
        assert_eq!(food["groups"]["No Effective ID"]["count"], 2);
        assert_eq!(food["groups"]["ID Required"]["percentage"], json!(50.0));
        assert_eq!(food["table"]["a"], 2);
        assert_eq!(food["corrected"], true);
        // Nobody offers seniors coverage.
        assert_eq!(js["benefits"]["health_seniors"]["pValue"], json!(1.0));
        assert_eq!(js["scoreComparisons"].as_array().unwrap().len(), 3);
        assert_eq!(js["tierGradient"]["tiers"].as_array().unwrap().len(), 5);
        assert_eq!(js["tierGradient"]["tiers"][2]["meanScore"], JSValue::Null);
        assert!(js["tierGradient"]["tiers"][2]["meanScoreReason"].is_string());
        assert_eq!(js["headline"]["score"], "welfare_score");
        assert_eq!(js["headline"]["meanNoEffectiveId"], json!(2.5));
    }

    #[test]
    fn party_alignment_fields() {
        assert_eq!(
            alignment_to_json(&Computed::Value(PartyAlignment {
                matched: 2,
                total: 3,
                percentage: 200.0 / 3.0,
            })),
            json!({"matched": 2, "total": 3, "percentage": 66.66667})
        );
        assert_eq!(
            alignment_to_json(&Computed::NotComputable("no data".to_string())),
            json!({"percentage": null, "reason": "no data"})
        );
    }

    #[test]
    fn csv_tables() {
        let report = small_report();
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("benefit_comparison.csv");
        write_benefit_comparison(&p, &report).unwrap();
        let mut rdr = csv::Reader::from_path(&p).unwrap();
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        // Five benefits and any_benefit
        assert_eq!(rows.len(), 6);
        let food = rows.iter().find(|r| &r[0] == "food").unwrap();
        assert_eq!(&food[1], "2");
        assert_eq!(&food[2], "2");
        assert_eq!(&food[8], "true");

        let p = dir.path().join("tier_gradient.csv");
        write_tier_gradient(&p, &report).unwrap();
        let mut rdr = csv::Reader::from_path(&p).unwrap();
        let header = rdr.headers().unwrap().clone();
        assert_eq!(&header[3], "mean_welfare_score");
        assert_eq!(header.len(), 4 + 6 + 1);
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 5);
        // Tier 3 is empty.
        assert_eq!(&rows[2][3], "");
        assert_eq!(&rows[4][10], "DD");

        let p = dir.path().join("trend_tests.csv");
        write_trend_tests(&p, &report).unwrap();
        let contents = std::fs::read_to_string(&p).unwrap();
        assert!(contents.starts_with("benefit,slope,p_value,significance,failure"));
    }
}
