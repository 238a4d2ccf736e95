// Classical tests: Fisher exact, Mann-Whitney U, Pearson/Spearman, logistic trend.

use log::{debug, warn};
use std::cmp::Ordering;

use crate::config::*;
use crate::distributions::*;

/// Relative tolerance used when comparing table probabilities in the Fisher test.
const FISHER_REL_TOLERANCE: f64 = 1e-7;

/// The largest sample size for which the exact Mann-Whitney distribution is used.
const MWU_EXACT_MAX: usize = 8;

const LOGIT_MAX_ITERATIONS: usize = 35;
const LOGIT_TOLERANCE: f64 = 1e-8;

/// Odds ratio (a d) / (b c).
///
/// When b, c or d is zero, 0.5 is added to all four cells (Haldane-Anscombe)
/// and the second element of the result is true.
pub fn odds_ratio(t: &ContingencyTable) -> (f64, bool) {
    if t.b == 0 || t.c == 0 || t.d == 0 {
        let (a, b, c, d) = (
            t.a as f64 + 0.5,
            t.b as f64 + 0.5,
            t.c as f64 + 0.5,
            t.d as f64 + 0.5,
        );
        ((a * d) / (b * c), true)
    } else {
        ((t.a * t.d) as f64 / (t.b * t.c) as f64, false)
    }
}

/// Two-sided Fisher exact test.
///
/// The p-value is the total probability, under the hypergeometric distribution
/// with the observed margins, of the tables that are not more likely than the
/// observed one.
pub fn fisher_exact(t: &ContingencyTable) -> f64 {
    let row1 = t.a + t.b;
    let row2 = t.c + t.d;
    let col1 = t.a + t.c;
    let n = row1 + row2;
    if n == 0 || row1 == 0 || row2 == 0 || col1 == 0 || col1 == n {
        return 1.0;
    }
    let ln_denominator = ln_choose(n, col1);
    let ln_pmf = |x: u64| ln_choose(row1, x) + ln_choose(row2, col1 - x) - ln_denominator;

    let lo = col1.saturating_sub(row2);
    let hi = row1.min(col1);
    let observed = ln_pmf(t.a).exp();
    let threshold = observed * (1.0 + FISHER_REL_TOLERANCE);
    let p: f64 = (lo..=hi)
        .map(|x| ln_pmf(x).exp())
        .filter(|p| *p <= threshold)
        .sum();
    p.min(1.0)
}

/// Ranks starting at 1; tied values get the mean of the ranks they span.
pub fn mid_ranks(values: &[f64]) -> Vec<f64> {
    let mut indexed: Vec<(usize, f64)> = values.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0usize;
    while i < indexed.len() {
        let start = i;
        let val = indexed[i].1;
        let mut end = i + 1;
        while end < indexed.len() && indexed[end].1 == val {
            end += 1;
        }
        let rank = (start + end - 1) as f64 * 0.5 + 1.0;
        for item in indexed.iter().take(end).skip(start) {
            ranks[item.0] = rank;
        }
        i = end;
    }
    ranks
}

// Sizes of the groups of tied values.
fn tie_sizes(values: &[f64]) -> Vec<usize> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mut res: Vec<usize> = Vec::new();
    let mut i = 0usize;
    while i < sorted.len() {
        let mut end = i + 1;
        while end < sorted.len() && sorted[end] == sorted[i] {
            end += 1;
        }
        res.push(end - i);
        i = end;
    }
    res
}

/// One-sided Mann-Whitney U test: is `x` stochastically greater than `y`?
///
/// Uses the exact null distribution when one of the samples has at most 8
/// elements and there are no ties, and the normal approximation (continuity
/// and tie corrected) otherwise.
pub fn mann_whitney_greater(x: &[f64], y: &[f64]) -> Result<MannWhitney, String> {
    let (n1, n2) = (x.len(), y.len());
    if n1 == 0 || n2 == 0 {
        return Err("empty group".to_string());
    }
    let mut all: Vec<f64> = x.to_vec();
    all.extend_from_slice(y);
    if all.iter().any(|v| !v.is_finite()) {
        return Err("non-finite score".to_string());
    }
    let ranks = mid_ranks(&all);
    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let n1n2 = (n1 * n2) as f64;
    let effect_size = 1.0 - 2.0 * u1 / n1n2;

    let ties = tie_sizes(&all);
    let has_ties = ties.iter().any(|t| *t > 1);

    let (p_value, method) = if !has_ties && n1.min(n2) <= MWU_EXACT_MAX {
        (
            exact_u_upper_tail(n1, n2, u1.round() as usize),
            MannWhitneyMethod::Exact,
        )
    } else {
        let n = (n1 + n2) as f64;
        let tie_term: f64 = ties
            .iter()
            .map(|t| {
                let t = *t as f64;
                t * t * t - t
            })
            .sum();
        let variance = n1n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
        if variance <= 0.0 {
            return Err("zero variance: all the scores are identical".to_string());
        }
        let z = (u1 - n1n2 / 2.0 - 0.5) / variance.sqrt();
        (
            normal_sf(z).clamp(0.0, 1.0),
            MannWhitneyMethod::Asymptotic,
        )
    };
    debug!(
        "mann_whitney_greater: n1={} n2={} U={} p={} method={:?}",
        n1, n2, u1, p_value, method
    );
    Ok(MannWhitney {
        u_statistic: u1,
        p_value,
        effect_size,
        method,
    })
}

/// P(U >= u) for the U statistic of the first sample, without ties.
///
/// If the largest of the m + n values belongs to the first sample, it
/// dominates all the n values of the second one. This gives the recursion
/// p(m, n, u) = m/(m+n) p(m-1, n, u-n) + n/(m+n) p(m, n-1, u).
fn exact_u_upper_tail(n1: usize, n2: usize, u: usize) -> f64 {
    let max_u = n1 * n2;
    if u > max_u {
        return 0.0;
    }
    // prev[j][v] = P(U = v) for sizes (i - 1, j)
    let point_mass = |len: usize| {
        let mut v = vec![0.0; len];
        v[0] = 1.0;
        v
    };
    let mut prev: Vec<Vec<f64>> = (0..=n2).map(|_| point_mass(max_u + 1)).collect();
    for i in 1..=n1 {
        let mut cur: Vec<Vec<f64>> = Vec::with_capacity(n2 + 1);
        cur.push(point_mass(max_u + 1));
        for j in 1..=n2 {
            let w_first = i as f64 / (i + j) as f64;
            let w_second = j as f64 / (i + j) as f64;
            let mut dist = vec![0.0; max_u + 1];
            for (v, slot) in dist.iter_mut().enumerate().take(i * j + 1) {
                let from_first = if v >= j { prev[j][v - j] } else { 0.0 };
                *slot = w_first * from_first + w_second * cur[j - 1][v];
            }
            cur.push(dist);
        }
        prev = cur;
    }
    prev[n2][u..].iter().sum::<f64>().min(1.0)
}

fn pearson_coefficient(x: &[f64], y: &[f64]) -> Result<f64, String> {
    if x.len() != y.len() {
        return Err("the two samples have different lengths".to_string());
    }
    if x.len() < 3 {
        return Err(format!("{} observations, at least 3 needed", x.len()));
    }
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den_x = 0.0;
    let mut den_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        num += dx * dy;
        den_x += dx * dx;
        den_y += dy * dy;
    }
    if den_x <= 0.0 || den_y <= 0.0 {
        return Err("zero variance".to_string());
    }
    Ok((num / (den_x * den_y).sqrt()).clamp(-1.0, 1.0))
}

fn correlation_p_value(r: f64, n: usize) -> f64 {
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return 0.0;
    }
    let t = r * (df / denom).sqrt();
    student_t_two_sided(t, df)
}

/// Pearson correlation with its two-sided p-value (t test, n - 2 df).
pub fn pearson(x: &[f64], y: &[f64]) -> Result<Correlation, String> {
    let r = pearson_coefficient(x, y)?;
    Ok(Correlation {
        coefficient: r,
        p_value: correlation_p_value(r, x.len()),
    })
}

/// Spearman rank correlation: Pearson on the mid-ranks.
pub fn spearman(x: &[f64], y: &[f64]) -> Result<Correlation, String> {
    if x.len() != y.len() {
        return Err("the two samples have different lengths".to_string());
    }
    pearson(&mid_ranks(x), &mid_ranks(y))
}

/// Logistic regression of `y` on `x` (with intercept), fitted with
/// Newton-Raphson. Returns the slope and the Wald p-value of the slope.
///
/// Unstable fits never fail: the p-value falls back to 1.0 and the reason is
/// returned alongside.
pub fn logistic_trend(x: &[f64], y: &[bool]) -> (Option<f64>, f64, Option<String>) {
    match fit_logistic(x, y) {
        Ok((slope, p)) => (Some(slope), p, None),
        Err(reason) => {
            warn!("logistic_trend: fit failed ({}), using p = 1.0", reason);
            (None, 1.0, Some(reason))
        }
    }
}

/// Detects a predictor that separates the two responses, for which the
/// maximum likelihood estimate does not exist.
///
/// The ranges of the predictor in the two response groups are compared:
/// disjoint ranges are a perfect separation, ranges that only share their
/// boundary a quasi-complete one.
fn separation(x: &[f64], y: &[bool]) -> Result<(), String> {
    let range = |response: bool| {
        x.iter()
            .zip(y.iter())
            .filter(|(_, yi)| **yi == response)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (xi, _)| {
                (lo.min(*xi), hi.max(*xi))
            })
    };
    let (min0, max0) = range(false);
    let (min1, max1) = range(true);
    if min0.min(min1) == max0.max(max1) {
        return Err("constant predictor".to_string());
    }
    if max0 < min1 || max1 < min0 {
        return Err("perfect separation".to_string());
    }
    if max0 == min1 || max1 == min0 {
        return Err("quasi-complete separation".to_string());
    }
    Ok(())
}

fn fit_logistic(x: &[f64], y: &[bool]) -> Result<(f64, f64), String> {
    if x.len() != y.len() {
        return Err("the predictor and the response have different lengths".to_string());
    }
    if x.len() < 3 {
        return Err("not enough observations".to_string());
    }
    if y.iter().all(|v| *v) || y.iter().all(|v| !*v) {
        return Err("constant response".to_string());
    }
    separation(x, y)?;
    let yv: Vec<f64> = y.iter().map(|v| if *v { 1.0 } else { 0.0 }).collect();

    let mut beta = [0.0f64, 0.0f64];
    let mut converged = false;
    let mut inverse = [[0.0f64; 2]; 2];
    for iteration in 0..LOGIT_MAX_ITERATIONS {
        // Gradient and information matrix.
        let mut g = [0.0f64; 2];
        let mut h = [[0.0f64; 2]; 2];
        for (xi, yi) in x.iter().zip(yv.iter()) {
            let p = 1.0 / (1.0 + (-(beta[0] + beta[1] * xi)).exp());
            let w = p * (1.0 - p);
            g[0] += yi - p;
            g[1] += (yi - p) * xi;
            h[0][0] += w;
            h[0][1] += w * xi;
            h[1][1] += w * xi * xi;
        }
        h[1][0] = h[0][1];
        let det = h[0][0] * h[1][1] - h[0][1] * h[1][0];
        if !det.is_finite() || det.abs() < 1e-12 {
            return Err("singular information matrix".to_string());
        }
        inverse = [
            [h[1][1] / det, -h[0][1] / det],
            [-h[1][0] / det, h[0][0] / det],
        ];
        let step = [
            inverse[0][0] * g[0] + inverse[0][1] * g[1],
            inverse[1][0] * g[0] + inverse[1][1] * g[1],
        ];
        beta[0] += step[0];
        beta[1] += step[1];
        if !beta[0].is_finite() || !beta[1].is_finite() {
            return Err("diverging coefficients".to_string());
        }
        debug!(
            "fit_logistic: iteration {} beta={:?} step={:?}",
            iteration, beta, step
        );
        if step[0].abs().max(step[1].abs()) < LOGIT_TOLERANCE {
            converged = true;
            break;
        }
    }

    if !converged {
        return Err(format!(
            "no convergence after {} iterations",
            LOGIT_MAX_ITERATIONS
        ));
    }
    let se = inverse[1][1].sqrt();
    if !se.is_finite() || se <= 0.0 {
        return Err("undefined standard error".to_string());
    }
    let z = beta[1] / se;
    Ok((beta[1], (2.0 * normal_sf(z.abs())).min(1.0)))
}

pub fn mean(values: &[f64]) -> Result<f64, String> {
    if values.is_empty() {
        return Err("empty group".to_string());
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Result<f64, String> {
    if values.is_empty() {
        return Err("empty group".to_string());
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Ok((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Ok(sorted[mid])
    }
}
