// Plain-text summary of the findings.

use crate::report::*;

const HALDANE_NOTICE: &str = "(Haldane–Anscombe corrected)";

pub fn stars(p: f64) -> &'static str {
    if p < 0.001 {
        "***"
    } else if p < 0.01 {
        "**"
    } else if p < 0.05 {
        "*"
    } else {
        ""
    }
}

pub fn format_p_value(p: f64) -> String {
    if !p.is_finite() {
        return "p=nan".to_string();
    }
    if p < 0.001 {
        "p<0.001".to_string()
    } else {
        format!("p={:.3}", p)
    }
}

pub fn not_computable(reason: &str) -> String {
    format!("not computable ({})", reason)
}

fn format_computed(c: &Computed<f64>, f: impl Fn(f64) -> String) -> String {
    match c {
        Computed::Value(x) => f(*x),
        Computed::NotComputable(reason) => not_computable(reason),
    }
}

pub fn format_odds_ratio(or: &OddsRatio) -> String {
    let value = if or.odds_ratio >= 100.0 {
        ">100x".to_string()
    } else {
        format!("{:.2}x", or.odds_ratio)
    };
    if or.corrected {
        format!("{} {}", value, HALDANE_NOTICE)
    } else {
        value
    }
}

fn benefit_line(bo: &BenefitOdds) -> String {
    match &bo.result {
        Computed::Value(or) => {
            let s = stars(or.p_value);
            format!(
                "- {}: {:.1}% of No Effective ID vs {:.1}% of ID Required; odds ratio {}, Fisher {}{}{}",
                bo.benefit,
                or.group1_pct,
                or.group2_pct,
                format_odds_ratio(or),
                format_p_value(or.p_value),
                if s.is_empty() { "" } else { " " },
                s
            )
        }
        Computed::NotComputable(reason) => {
            format!("- {}: {}", bo.benefit, not_computable(reason))
        }
    }
}

fn score_lines(c: &ScoreComparison) -> Vec<String> {
    let mean = |x: f64| format!("{:.2}", x);
    let summary = format!(
        "{} (0-{}): mean {} for {} (n={}) vs {} for {} (n={}), difference {}",
        c.score,
        c.max_score,
        format_computed(&c.group1.mean, mean),
        c.group1.group,
        c.group1.n,
        format_computed(&c.group2.mean, mean),
        c.group2.group,
        c.group2.n,
        format_computed(&c.mean_difference, |x| format!("{:+.2}", x)),
    );
    let test = match &c.test {
        Computed::Value(mw) => format!(
            "  Mann-Whitney U={:.1}, one-sided {} {}, effect size {:.3} ({})",
            mw.u_statistic,
            format_p_value(mw.p_value),
            stars(mw.p_value),
            mw.effect_size,
            match mw.method {
                MannWhitneyMethod::Exact => "exact",
                MannWhitneyMethod::Asymptotic => "normal approximation",
            }
        ),
        Computed::NotComputable(reason) => {
            format!("  Mann-Whitney: {}", not_computable(reason))
        }
    };
    vec![summary, test]
}

fn correlation_text(c: &Computed<Correlation>) -> String {
    match c {
        Computed::Value(x) => format!(
            "{:.3} ({}{})",
            x.coefficient,
            format_p_value(x.p_value),
            if stars(x.p_value).is_empty() {
                String::new()
            } else {
                format!(" {}", stars(x.p_value))
            }
        ),
        Computed::NotComputable(reason) => not_computable(reason),
    }
}

fn trend_line(t: &TrendTest) -> String {
    match &t.failure {
        None => format!(
            "  trend {}: slope {:.3}, {} {}",
            t.benefit,
            t.slope.unwrap_or(f64::NAN),
            format_p_value(t.p_value),
            stars(t.p_value)
        ),
        Some(reason) => format!("  trend {}: p=1.0, fit failed ({})", t.benefit, reason),
    }
}

pub fn build_narrative(report_name: &str, report: &AnalysisReport) -> String {
    let mut lines: Vec<String> = vec![
        report_name.to_string(),
        "=".repeat(report_name.chars().count()),
        String::new(),
    ];

    let h = &report.headline;
    lines.push("HEADLINE".to_string());
    lines.push(format!(
        "{} jurisdictions with no effective voter-ID requirement have a mean {} of {}; \
         {} jurisdictions requiring ID have {}. Ratio: {}.",
        h.n_no_effective_id,
        h.score,
        format_computed(&h.mean_no_effective_id, |x| format!("{:.2}", x)),
        h.n_id_required,
        format_computed(&h.mean_id_required, |x| format!("{:.2}", x)),
        format_computed(&h.ratio, |x| format!("{:.1}x", x)),
    ));
    lines.push(String::new());

    lines.push("BENEFITS (No Effective ID vs ID Required)".to_string());
    lines.extend(report.odds.iter().map(benefit_line));
    lines.push(String::new());

    lines.push("SCORES".to_string());
    lines.extend(score_lines(&report.score_comparison));
    for c in report.extra_score_comparisons.iter() {
        lines.extend(score_lines(c));
    }
    lines.push(String::new());

    let g = &report.gradient;
    lines.push(format!("TIER GRADIENT ({})", g.score));
    for row in g.rows.iter() {
        lines.push(format!(
            "  {} {:<24} n={:<3} mean {}",
            row.tier.value(),
            row.tier.label(),
            row.n,
            format_computed(&row.mean_score, |x| format!("{:.2}", x)),
        ));
    }
    lines.push(format!("Pearson r = {}", correlation_text(&g.pearson)));
    lines.push(format!("Spearman rho = {}", correlation_text(&g.spearman)));
    lines.extend(g.trends.iter().map(trend_line));
    lines.push(String::new());
    lines.push("Significance: * p<0.05, ** p<0.01, *** p<0.001".to_string());

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn odds(odds_ratio: f64, corrected: bool, p_value: f64) -> OddsRatio {
        OddsRatio {
            table: ContingencyTable {
                a: 1,
                b: 1,
                c: 1,
                d: 1,
            },
            odds_ratio,
            corrected,
            p_value,
            group1_pct: 50.0,
            group2_pct: 50.0,
        }
    }

    #[test]
    fn significance_stars() {
        assert_eq!(stars(0.0005), "***");
        assert_eq!(stars(0.001), "**");
        assert_eq!(stars(0.009), "**");
        assert_eq!(stars(0.04), "*");
        assert_eq!(stars(0.05), "");
        assert_eq!(format_p_value(0.0001), "p<0.001");
        assert_eq!(format_p_value(0.0312), "p=0.031");
    }

    #[test]
    fn odds_ratio_text() {
        assert_eq!(format_odds_ratio(&odds(2.5, false, 0.2)), "2.50x");
        assert_eq!(format_odds_ratio(&odds(150.0, false, 0.2)), ">100x");
        assert_eq!(
            format_odds_ratio(&odds(2691.0, true, 1e-10)),
            ">100x (Haldane–Anscombe corrected)"
        );
        assert_eq!(
            format_odds_ratio(&odds(1.12, true, 1.0)),
            "1.12x (Haldane–Anscombe corrected)"
        );
    }

    #[test]
    fn placeholders_for_missing_values() {
        let line = benefit_line(&BenefitOdds {
            benefit: "food".to_string(),
            result: Computed::NotComputable("empty group".to_string()),
        });
        assert_eq!(line, "- food: not computable (empty group)");
        let line = benefit_line(&BenefitOdds {
            benefit: "eitc".to_string(),
            result: Computed::Value(odds(3.0, false, 0.004)),
        });
        assert!(line.ends_with("p=0.004 **"), "{}", line);
    }

    #[test]
    fn narrative_of_a_small_table() {
        let mut b = policy_stats::builder::Builder::canonical();
        b.add_jurisdiction("AA", "A", 1, &[]).unwrap();
        b.add_jurisdiction("BB", "B", 3, &[]).unwrap();
        b.add_jurisdiction("CC", "C", 4, &["food"]).unwrap();
        b.add_jurisdiction("DD", "D", 5, &["food", "eitc"]).unwrap();
        let table = b.build().unwrap();
        let report = run_analysis(&table, &AnalysisRules::default_for(table.schema())).unwrap();
        let text = build_narrative("Test", &report);
        assert!(text.starts_with("Test\n====\n"));
        // The ID Required group has a mean of 0.
        assert!(text.contains("Ratio: not computable ("));
        assert!(text.contains("(Haldane–Anscombe corrected)"));
        assert!(text.contains("TIER GRADIENT (welfare_score)"));
        assert!(text.contains("have a mean welfare_score of 1.50;"), "{}", text);
        assert!(text.ends_with("*** p<0.001\n"));
        assert!(!text.contains("\n\n\n"));
    }

    #[test]
    fn failed_trend_line() {
        let t = TrendTest {
            benefit: "food".to_string(),
            slope: None,
            p_value: 1.0,
            failure: Some("perfect separation".to_string()),
        };
        assert_eq!(trend_line(&t), "  trend food: p=1.0, fit failed (perfect separation)");
    }
}
