/*!
Statistics relating the voter-ID strictness of a jurisdiction to the benefits
it offers to immigrants.

The entry point is [run_analysis]: it takes a validated [PolicyTable] (see
[builder::Builder] to assemble one) and a set of [AnalysisRules], and returns
an [AnalysisReport] holding the percentage tables, the odds ratios, the score
comparisons and the tier gradient.

See the [manual] for the input format and the statistical methods.
*/

mod analysis;
pub mod builder;
mod config;
mod distributions;
mod hypothesis;
pub mod manual;
mod prepare;

pub use crate::analysis::{
    benefit_odds, benefit_shares, compare_scores, contingency_table, electoral_gap, headline,
    run_analysis, tier_gradient,
};
pub use crate::config::*;
pub use crate::hypothesis::{
    fisher_exact, logistic_trend, mann_whitney_greater, mid_ranks, odds_ratio, pearson, spearman,
};
pub use crate::prepare::{enrich, DerivedView, EnrichedTable, PolicyTable, ANY_BENEFIT};
