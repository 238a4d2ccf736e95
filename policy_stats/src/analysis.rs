use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::config::*;
use crate::hypothesis::*;
use crate::prepare::*;

const ID_REQUIRED: &str = "ID Required";
const NO_EFFECTIVE_ID: &str = "No Effective ID";

fn percentage(count: u64, total: u64) -> Computed<f64> {
    if total == 0 {
        Computed::NotComputable("empty group".to_string())
    } else {
        Computed::Value(100.0 * count as f64 / total as f64)
    }
}

// The benefit flags of the schema followed by the derived `any_benefit` row.
fn benefit_rows(enriched: &EnrichedTable) -> Vec<(String, Vec<bool>)> {
    let mut res: Vec<(String, Vec<bool>)> = Vec::new();
    for name in enriched.table.schema().benefit_flags() {
        if let Some(col) = enriched.benefit_column(name) {
            res.push((name.clone(), col));
        }
    }
    res.push((ANY_BENEFIT.to_string(), enriched.any_benefit_column()));
    res
}

/// For each benefit and each group of the grouping, the number and the
/// percentage of jurisdictions offering the benefit.
///
/// An empty group has a non-computable percentage.
pub fn benefit_shares(enriched: &EnrichedTable, grouping: Grouping) -> Vec<BenefitShares> {
    let labels = grouping.group_labels();
    let group_idx: Vec<usize> = enriched
        .derived
        .iter()
        .map(|d| grouping.group_of(d.id_strictness))
        .collect();
    let mut totals = vec![0u64; labels.len()];
    for g in group_idx.iter() {
        totals[*g] += 1;
    }
    benefit_rows(enriched)
        .into_iter()
        .map(|(benefit, col)| {
            let mut counts = vec![0u64; labels.len()];
            for (g, flag) in group_idx.iter().zip(col.iter()) {
                if *flag {
                    counts[*g] += 1;
                }
            }
            let groups = labels
                .iter()
                .enumerate()
                .map(|(i, label)| GroupShare {
                    group: label.clone(),
                    count: counts[i],
                    total: totals[i],
                    percentage: percentage(counts[i], totals[i]),
                })
                .collect();
            BenefitShares { benefit, groups }
        })
        .collect()
}

/// The 2x2 table of one benefit. Group 1 is "No Effective ID", group 2 is
/// "ID Required".
pub fn contingency_table(no_effective_id: &[bool], flag: &[bool]) -> ContingencyTable {
    let mut t = ContingencyTable {
        a: 0,
        b: 0,
        c: 0,
        d: 0,
    };
    for (g1, f) in no_effective_id.iter().zip(flag.iter()) {
        match (*g1, *f) {
            (true, true) => t.a += 1,
            (true, false) => t.b += 1,
            (false, true) => t.c += 1,
            (false, false) => t.d += 1,
        }
    }
    t
}

fn odds_for(table: ContingencyTable) -> Computed<OddsRatio> {
    let n1 = table.a + table.b;
    let n2 = table.c + table.d;
    if n1 == 0 || n2 == 0 {
        return Computed::NotComputable(format!(
            "empty group ({} with no effective ID, {} requiring ID)",
            n1, n2
        ));
    }
    let (odds_ratio, corrected) = odds_ratio(&table);
    Computed::Value(OddsRatio {
        table,
        odds_ratio,
        corrected,
        p_value: fisher_exact(&table),
        group1_pct: 100.0 * table.a as f64 / n1 as f64,
        group2_pct: 100.0 * table.c as f64 / n2 as f64,
    })
}

/// Odds ratios and Fisher exact tests of every benefit, No Effective ID vs
/// ID Required.
pub fn benefit_odds(enriched: &EnrichedTable) -> Vec<BenefitOdds> {
    let groups: Vec<bool> = enriched.derived.iter().map(|d| d.no_effective_id).collect();
    benefit_rows(enriched)
        .into_iter()
        .map(|(benefit, col)| {
            let result = odds_for(contingency_table(&groups, &col));
            debug!("benefit_odds: {}: {:?}", benefit, result);
            BenefitOdds { benefit, result }
        })
        .collect()
}

fn summarize(group: &str, values: &[f64]) -> ScoreSummary {
    ScoreSummary {
        group: group.to_string(),
        n: values.len() as u64,
        mean: mean(values).into(),
        median: median(values).into(),
    }
}

fn score_values(enriched: &EnrichedTable, score: &str) -> Result<Vec<f64>, AnalysisError> {
    let col = enriched.score_column(score).ok_or_else(|| {
        AnalysisError::Schema(format!("the score {:?} was not computed", score))
    })?;
    Ok(col.into_iter().map(|v| v as f64).collect())
}

/// Compares a score between the No Effective ID group (group 1) and the ID
/// Required group (group 2), with a one-sided Mann-Whitney test.
pub fn compare_scores(
    enriched: &EnrichedTable,
    score: &ScoreDefinition,
) -> Result<ScoreComparison, AnalysisError> {
    let values = score_values(enriched, &score.name)?;
    let mut g1: Vec<f64> = Vec::new();
    let mut g2: Vec<f64> = Vec::new();
    for (d, v) in enriched.derived.iter().zip(values.iter()) {
        if d.no_effective_id {
            g1.push(*v);
        } else {
            g2.push(*v);
        }
    }
    let group1 = summarize(NO_EFFECTIVE_ID, &g1);
    let group2 = summarize(ID_REQUIRED, &g2);
    let mean_difference = match (group1.mean.value(), group2.mean.value()) {
        (Some(m1), Some(m2)) => Computed::Value(m1 - m2),
        _ => Computed::NotComputable("empty group".to_string()),
    };
    let test: Computed<MannWhitney> = mann_whitney_greater(&g1, &g2).into();
    info!(
        "compare_scores: {}: {} (n={}) vs {} (n={}): {:?}",
        score.name,
        NO_EFFECTIVE_ID,
        g1.len(),
        ID_REQUIRED,
        g2.len(),
        test
    );
    Ok(ScoreComparison {
        score: score.name.clone(),
        max_score: score.max_value(),
        group1,
        group2,
        mean_difference,
        test,
    })
}

/// Per-tier summary of a score and the benefits, correlation of the score with
/// the tier, and a logistic trend test per benefit.
pub fn tier_gradient(enriched: &EnrichedTable, score: &str) -> Result<TierGradient, AnalysisError> {
    let values = score_values(enriched, score)?;
    let benefits = benefit_rows(enriched);
    let tiers: Vec<f64> = enriched
        .derived
        .iter()
        .map(|d| d.id_strictness.value() as f64)
        .collect();

    let rows: Vec<TierRow> = Tier::ALL
        .iter()
        .map(|tier| {
            let idxs: Vec<usize> = enriched
                .derived
                .iter()
                .enumerate()
                .filter(|(_, d)| d.id_strictness == *tier)
                .map(|(i, _)| i)
                .collect();
            let n = idxs.len() as u64;
            let tier_values: Vec<f64> = idxs.iter().map(|i| values[*i]).collect();
            let benefit_pct = benefits
                .iter()
                .map(|(name, col)| {
                    let count = idxs.iter().filter(|i| col[**i]).count() as u64;
                    (name.clone(), percentage(count, n))
                })
                .collect();
            let mut members: Vec<String> = idxs
                .iter()
                .map(|i| enriched.derived[*i].jurisdiction_id.clone())
                .collect();
            members.sort();
            TierRow {
                tier: *tier,
                n,
                mean_score: mean(&tier_values).into(),
                benefit_pct,
                members,
            }
        })
        .collect();

    let pearson: Computed<Correlation> = pearson(&tiers, &values).into();
    let spearman: Computed<Correlation> = spearman(&tiers, &values).into();
    info!(
        "tier_gradient: {}: pearson={:?} spearman={:?}",
        score, pearson, spearman
    );

    let trends = benefits
        .iter()
        .map(|(benefit, col)| {
            let (slope, p_value, failure) = logistic_trend(&tiers, col);
            if let Some(reason) = &failure {
                warn!("tier_gradient: trend test for {} failed: {}", benefit, reason);
            }
            TrendTest {
                benefit: benefit.clone(),
                slope,
                p_value,
                failure,
            }
        })
        .collect();

    Ok(TierGradient {
        score: score.to_string(),
        rows,
        pearson,
        spearman,
        trends,
    })
}

/// Group sizes and mean of a score (the primary score of the run) in the two
/// groups.
pub fn headline(enriched: &EnrichedTable, score: &str) -> Result<Headline, AnalysisError> {
    let values = score_values(enriched, score)?;
    let mut no_id: Vec<f64> = Vec::new();
    let mut id_req: Vec<f64> = Vec::new();
    for (d, v) in enriched.derived.iter().zip(values.iter()) {
        if d.no_effective_id {
            no_id.push(*v);
        } else {
            id_req.push(*v);
        }
    }
    let mean_no_effective_id: Computed<f64> = mean(&no_id).into();
    let mean_id_required: Computed<f64> = mean(&id_req).into();
    let ratio = match (mean_no_effective_id.value(), mean_id_required.value()) {
        (Some(_), Some(m2)) if *m2 == 0.0 => Computed::NotComputable(format!(
            "the mean {} of the ID Required group is 0",
            score
        )),
        (Some(m1), Some(m2)) => Computed::Value(m1 / m2),
        _ => Computed::NotComputable("empty group".to_string()),
    };
    Ok(Headline {
        score: score.to_string(),
        n_no_effective_id: no_id.len() as u64,
        n_id_required: id_req.len() as u64,
        mean_no_effective_id,
        mean_id_required,
        ratio,
    })
}

/// Runs all the comparisons on a policy table.
pub fn run_analysis(table: &PolicyTable, rules: &AnalysisRules) -> Result<AnalysisReport, AnalysisError> {
    if table.is_empty() {
        return Err(AnalysisError::EmptyTable);
    }
    let mut scores: Vec<ScoreDefinition> = rules.extra_scores.clone();
    if rules.primary_score.name != ScoreDefinition::FULL {
        let existing = scores
            .iter()
            .find(|s| s.name == rules.primary_score.name)
            .cloned();
        match existing {
            Some(s) if s != rules.primary_score => {
                return Err(AnalysisError::Schema(format!(
                    "the score {:?} has two different definitions",
                    s.name
                )));
            }
            Some(_) => {}
            None => scores.push(rules.primary_score.clone()),
        }
    }
    info!(
        "run_analysis: {} jurisdictions, benefits {:?}, grouping {}",
        table.len(),
        table.schema().benefit_flags(),
        rules.grouping.name()
    );
    let enriched = enrich(table, &scores)?;

    let shares = benefit_shares(&enriched, rules.grouping);
    let odds = benefit_odds(&enriched);
    let score_comparison = compare_scores(&enriched, &rules.primary_score)?;
    let mut extra_score_comparisons: Vec<ScoreComparison> = Vec::new();
    for s in rules.extra_scores.iter() {
        if s.name != rules.primary_score.name {
            extra_score_comparisons.push(compare_scores(&enriched, s)?);
        }
    }
    let gradient = tier_gradient(&enriched, &rules.primary_score.name)?;
    let headline = headline(&enriched, &rules.primary_score.name)?;

    Ok(AnalysisReport {
        benefit_flags: table.schema().benefit_flags().to_vec(),
        n_jurisdictions: table.len() as u64,
        grouping: rules.grouping,
        shares,
        odds,
        score_comparison,
        extra_score_comparisons,
        gradient,
        headline,
    })
}

fn gap_comparison(group1: &str, group2: &str, g1: &[f64], g2: &[f64]) -> GapComparison {
    let mean1: Computed<f64> = mean(g1).map_err(|_| format!("no {} jurisdiction with electoral data", group1)).into();
    let mean2: Computed<f64> = mean(g2).map_err(|_| format!("no {} jurisdiction with electoral data", group2)).into();
    let gap = match (mean1.value(), mean2.value()) {
        (Some(m1), Some(m2)) => Computed::Value(m1 - m2),
        _ => Computed::NotComputable("empty group".to_string()),
    };
    GapComparison {
        group1: group1.to_string(),
        group2: group2.to_string(),
        n1: g1.len() as u64,
        n2: g2.len() as u64,
        mean1,
        mean2,
        gap,
    }
}

// The Democrats win a jurisdiction with at least half of the vote.
const DEM_WIN_SHARE: f64 = 50.0;

/// Counts the jurisdictions where `indicator` is true exactly when the
/// Democrats won.
fn party_alignment(pairs: &[(bool, f64)]) -> Computed<PartyAlignment> {
    if pairs.is_empty() {
        return Computed::NotComputable("no jurisdiction with electoral data".to_string());
    }
    let matched = pairs
        .iter()
        .filter(|(indicator, share)| *indicator == (*share >= DEM_WIN_SHARE))
        .count() as u64;
    let total = pairs.len() as u64;
    Computed::Value(PartyAlignment {
        matched,
        total,
        percentage: 100.0 * matched as f64 / total as f64,
    })
}

/// Democratic vote share gap between ID Required and No Effective ID
/// jurisdictions, and between jurisdictions with and without any benefit.
///
/// `year` defaults to the latest year of the electoral records. Several
/// records for the same jurisdiction and year are averaged.
pub fn electoral_gap(
    enriched: &EnrichedTable,
    records: &[ElectoralRecord],
    year: Option<u32>,
) -> Result<ElectoralGap, AnalysisError> {
    let year = match year.or_else(|| records.iter().map(|r| r.year).max()) {
        Some(y) => y,
        None => return Err(AnalysisError::NoElectoralData),
    };
    let mut shares: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
    for r in records.iter().filter(|r| r.year == year) {
        if !r.dem_share.is_finite() {
            warn!(
                "electoral_gap: ignoring non-finite share for {} in {}",
                r.jurisdiction_id, year
            );
            continue;
        }
        let e = shares.entry(r.jurisdiction_id.as_str()).or_insert((0.0, 0));
        e.0 += r.dem_share;
        e.1 += 1;
    }
    if shares.is_empty() {
        return Err(AnalysisError::NoElectoralData);
    }

    let mut id_required: Vec<f64> = Vec::new();
    let mut no_effective_id: Vec<f64> = Vec::new();
    let mut benefit: Vec<f64> = Vec::new();
    let mut no_benefit: Vec<f64> = Vec::new();
    let mut unmatched: Vec<String> = Vec::new();
    let mut voter_id_pairs: Vec<(bool, f64)> = Vec::new();
    let mut welfare_pairs: Vec<(bool, f64)> = Vec::new();
    for d in enriched.derived.iter() {
        let share = match shares.get(d.jurisdiction_id.as_str()) {
            Some((total, count)) => total / *count as f64,
            None => {
                warn!(
                    "electoral_gap: no {} result for {}, skipping",
                    year, d.jurisdiction_id
                );
                unmatched.push(d.jurisdiction_id.clone());
                continue;
            }
        };
        voter_id_pairs.push((d.no_effective_id, share));
        welfare_pairs.push((d.has_any_benefit, share));
        if d.no_effective_id {
            no_effective_id.push(share);
        } else {
            id_required.push(share);
        }
        if d.has_any_benefit {
            benefit.push(share);
        } else {
            no_benefit.push(share);
        }
    }
    info!(
        "electoral_gap: year {}, {} jurisdictions matched, {} unmatched",
        year,
        id_required.len() + no_effective_id.len(),
        unmatched.len()
    );
    Ok(ElectoralGap {
        year,
        voter_id: gap_comparison(ID_REQUIRED, NO_EFFECTIVE_ID, &id_required, &no_effective_id),
        welfare: gap_comparison("Benefit", "No Benefit", &benefit, &no_benefit),
        voter_id_alignment: party_alignment(&voter_id_pairs),
        welfare_alignment: party_alignment(&welfare_pairs),
        unmatched,
    })
}
