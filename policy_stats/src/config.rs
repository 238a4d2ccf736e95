// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// The voter-ID strictness tier of a jurisdiction.
///
/// Tier 1 is the strictest requirement (strict photo ID), tier 5 means that no
/// document is required at all. Values outside of 1..=5 cannot be constructed.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct Tier(u8);

impl Tier {
    pub const ALL: [Tier; 5] = [Tier(1), Tier(2), Tier(3), Tier(4), Tier(5)];

    /// The tier substituted for a missing value when loading leniently
    /// (joins against external data, map-style outputs).
    pub const MISSING_DEFAULT: Tier = Tier(3);

    pub fn new(value: i64) -> Option<Tier> {
        if (1..=5).contains(&value) {
            Some(Tier(value as u8))
        } else {
            None
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn label(&self) -> &'static str {
        match self.0 {
            1 => "Strict Photo ID",
            2 => "Strict Non-Photo ID",
            3 => "Non-Strict Photo ID",
            4 => "Non-Strict Non-Photo ID",
            _ => "No Document Required",
        }
    }

    /// Tiers 4 and 5: an affidavit or nothing at all is enough to vote.
    ///
    /// This is the only definition of the two-tier split. "ID required" is
    /// always expressed as the negation of this predicate.
    pub fn no_effective_id(&self) -> bool {
        self.0 >= 4
    }
}

/// One row of the policy table.
///
/// The flags are aligned with the `benefit_flags` of the [Schema] of the
/// table that holds the record.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PolicyRecord {
    pub jurisdiction_id: String,
    pub jurisdiction_name: String,
    pub id_strictness: Tier,
    pub benefit_flags: Vec<bool>,
}

/// The named benefit flags of a policy table.
///
/// The canonical schema splits health coverage by age band:
/// `health_children`, `health_adults`, `health_seniors`, `food`, `eitc`.
/// The older four-flag files (`health`, `food`, `cash`, `eitc`) can still be
/// described with [Schema::new], but a table only ever holds one schema.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Schema {
    benefit_flags: Vec<String>,
}

impl Schema {
    pub const CANONICAL_FLAGS: [&'static str; 5] = [
        "health_children",
        "health_adults",
        "health_seniors",
        "food",
        "eitc",
    ];

    pub const HEALTH_FLAGS: [&'static str; 3] =
        ["health_children", "health_adults", "health_seniors"];

    pub fn canonical() -> Schema {
        Schema {
            benefit_flags: Schema::CANONICAL_FLAGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn new(flags: &[String]) -> Result<Schema, AnalysisError> {
        if flags.is_empty() {
            return Err(AnalysisError::Schema(
                "a schema needs at least one benefit flag".to_string(),
            ));
        }
        for (idx, f) in flags.iter().enumerate() {
            if f.trim().is_empty() {
                return Err(AnalysisError::Schema(format!(
                    "benefit flag #{} has an empty name",
                    idx + 1
                )));
            }
            if flags[..idx].contains(f) {
                return Err(AnalysisError::Schema(format!(
                    "benefit flag {:?} is listed twice",
                    f
                )));
            }
        }
        Ok(Schema {
            benefit_flags: flags.to_vec(),
        })
    }

    pub fn benefit_flags(&self) -> &[String] {
        &self.benefit_flags
    }

    pub fn flag_index(&self, name: &str) -> Option<usize> {
        self.benefit_flags.iter().position(|f| f == name)
    }

    pub fn len(&self) -> usize {
        self.benefit_flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benefit_flags.is_empty()
    }

    pub fn is_canonical(&self) -> bool {
        self.benefit_flags
            .iter()
            .map(|s| s.as_str())
            .eq(Schema::CANONICAL_FLAGS.iter().copied())
    }
}

/// One term of a welfare score: it counts 1 if the flag (or any of the flags) is set.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ScoreTerm {
    Flag(String),
    AnyOf(Vec<String>),
}

/// A named welfare score, restricted to a sub-population of benefits.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ScoreDefinition {
    pub name: String,
    pub terms: Vec<ScoreTerm>,
}

impl ScoreDefinition {
    /// The name of the score that sums all the flags of a schema.
    pub const FULL: &'static str = "welfare_score";

    /// Sum of all the benefit flags of the schema.
    pub fn full(schema: &Schema) -> ScoreDefinition {
        ScoreDefinition {
            name: ScoreDefinition::FULL.to_string(),
            terms: schema
                .benefit_flags()
                .iter()
                .map(|f| ScoreTerm::Flag(f.clone()))
                .collect(),
        }
    }

    /// Benefits open to working-age adults: health_adults + food + eitc.
    pub fn adults() -> ScoreDefinition {
        ScoreDefinition {
            name: "adults".to_string(),
            terms: vec![
                ScoreTerm::Flag("health_adults".to_string()),
                ScoreTerm::Flag("food".to_string()),
                ScoreTerm::Flag("eitc".to_string()),
            ],
        }
    }

    /// Any health coverage (children, adults or seniors) + food + eitc.
    pub fn any_coverage() -> ScoreDefinition {
        ScoreDefinition {
            name: "any".to_string(),
            terms: vec![
                ScoreTerm::AnyOf(
                    Schema::HEALTH_FLAGS
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                ),
                ScoreTerm::Flag("food".to_string()),
                ScoreTerm::Flag("eitc".to_string()),
            ],
        }
    }

    pub fn max_value(&self) -> u32 {
        self.terms.len() as u32
    }
}

/// Coarser groupings of the five tiers.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum CollapseScheme {
    /// Tiers 1-3: ID required, tiers 4-5: no effective ID.
    TwoTier,
    /// Tiers 1-2: strict, tier 3: non-strict, tiers 4-5: weak or none.
    ThreeTier,
    /// Photo ID (tiers 1 and 3), non-photo ID (tiers 2 and 4), no document (tier 5).
    PhotoId,
}

impl CollapseScheme {
    pub fn name(&self) -> &'static str {
        match self {
            CollapseScheme::TwoTier => "two_tier",
            CollapseScheme::ThreeTier => "three_tier",
            CollapseScheme::PhotoId => "photo_id",
        }
    }

    pub fn from_name(name: &str) -> Option<CollapseScheme> {
        match name {
            "two_tier" => Some(CollapseScheme::TwoTier),
            "three_tier" => Some(CollapseScheme::ThreeTier),
            "photo_id" => Some(CollapseScheme::PhotoId),
            _ => None,
        }
    }

    pub fn group_labels(&self) -> &'static [&'static str] {
        match self {
            CollapseScheme::TwoTier => &["ID Required", "No Effective ID"],
            CollapseScheme::ThreeTier => &["Strict", "Non-Strict", "Weak/None"],
            CollapseScheme::PhotoId => &["Photo ID", "Non-Photo ID", "No Document"],
        }
    }

    /// The index of the group of this tier in `group_labels`.
    pub fn collapse(&self, tier: Tier) -> usize {
        match (self, tier.value()) {
            (CollapseScheme::TwoTier, _) if tier.no_effective_id() => 1,
            (CollapseScheme::TwoTier, _) => 0,
            (CollapseScheme::ThreeTier, 1 | 2) => 0,
            (CollapseScheme::ThreeTier, 3) => 1,
            (CollapseScheme::ThreeTier, _) => 2,
            (CollapseScheme::PhotoId, 1 | 3) => 0,
            (CollapseScheme::PhotoId, 2 | 4) => 1,
            (CollapseScheme::PhotoId, _) => 2,
        }
    }

    pub fn label(&self, tier: Tier) -> &'static str {
        self.group_labels()[self.collapse(tier)]
    }
}

/// How the jurisdictions are split into groups for the percentage tables.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Grouping {
    /// The five raw tiers.
    Tiers,
    Collapsed(CollapseScheme),
}

impl Grouping {
    pub fn name(&self) -> &'static str {
        match self {
            Grouping::Tiers => "five_tier",
            Grouping::Collapsed(s) => s.name(),
        }
    }

    pub fn from_name(name: &str) -> Option<Grouping> {
        match name {
            "five_tier" => Some(Grouping::Tiers),
            n => CollapseScheme::from_name(n).map(Grouping::Collapsed),
        }
    }

    pub fn group_labels(&self) -> Vec<String> {
        match self {
            Grouping::Tiers => Tier::ALL.iter().map(|t| t.label().to_string()).collect(),
            Grouping::Collapsed(s) => s.group_labels().iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn group_of(&self, tier: Tier) -> usize {
        match self {
            Grouping::Tiers => (tier.value() - 1) as usize,
            Grouping::Collapsed(s) => s.collapse(tier),
        }
    }
}

/// The options that control one analysis run.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct AnalysisRules {
    /// Grouping used for the per-benefit percentage table.
    pub grouping: Grouping,
    /// The score compared between the two groups and along the tier gradient.
    pub primary_score: ScoreDefinition,
    /// Extra named scores, compared between the two groups as well.
    pub extra_scores: Vec<ScoreDefinition>,
}

impl AnalysisRules {
    /// Full welfare score, two-tier percentage table and, for the canonical
    /// schema, the adults-only and any-coverage scores.
    pub fn default_for(schema: &Schema) -> AnalysisRules {
        let extra_scores = if schema.is_canonical() {
            vec![ScoreDefinition::adults(), ScoreDefinition::any_coverage()]
        } else {
            vec![]
        };
        AnalysisRules {
            grouping: Grouping::Collapsed(CollapseScheme::TwoTier),
            primary_score: ScoreDefinition::full(schema),
            extra_scores,
        }
    }
}

/// Democratic share of the vote for one jurisdiction and one election.
#[derive(PartialEq, Debug, Clone)]
pub struct ElectoralRecord {
    pub jurisdiction_id: String,
    pub year: u32,
    /// In percent.
    pub dem_share: f64,
}

// ******** Output data structures *********

/// A statistic that may not be defined for the data at hand (empty group,
/// zero variance, ...). The reason is kept so that it can be displayed.
#[derive(PartialEq, Debug, Clone)]
pub enum Computed<T> {
    Value(T),
    NotComputable(String),
}

impl<T> Computed<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Computed::Value(x) => Some(x),
            Computed::NotComputable(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Computed::Value(_) => None,
            Computed::NotComputable(r) => Some(r.as_str()),
        }
    }

    pub fn is_computable(&self) -> bool {
        matches!(self, Computed::Value(_))
    }

    pub fn map<U, F: FnOnce(&T) -> U>(&self, f: F) -> Computed<U> {
        match self {
            Computed::Value(x) => Computed::Value(f(x)),
            Computed::NotComputable(r) => Computed::NotComputable(r.clone()),
        }
    }
}

impl<T> From<Result<T, String>> for Computed<T> {
    fn from(r: Result<T, String>) -> Self {
        match r {
            Ok(x) => Computed::Value(x),
            Err(reason) => Computed::NotComputable(reason),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct GroupShare {
    pub group: String,
    pub count: u64,
    pub total: u64,
    pub percentage: Computed<f64>,
}

/// The share of jurisdictions offering one benefit, for each group.
#[derive(PartialEq, Debug, Clone)]
pub struct BenefitShares {
    pub benefit: String,
    pub groups: Vec<GroupShare>,
}

/// A 2x2 contingency table.
///
/// |         | flag = 1 | flag = 0 |
/// |---------|----------|----------|
/// | group 1 | a        | b        |
/// | group 2 | c        | d        |
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct ContingencyTable {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
}

impl ContingencyTable {
    /// The same table with the two groups exchanged.
    pub fn swap_rows(&self) -> ContingencyTable {
        ContingencyTable {
            a: self.c,
            b: self.d,
            c: self.a,
            d: self.b,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct OddsRatio {
    pub table: ContingencyTable,
    pub odds_ratio: f64,
    /// True when the Haldane-Anscombe correction was applied.
    pub corrected: bool,
    /// Two-sided Fisher exact test on the uncorrected table.
    pub p_value: f64,
    pub group1_pct: f64,
    pub group2_pct: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct BenefitOdds {
    pub benefit: String,
    pub result: Computed<OddsRatio>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum MannWhitneyMethod {
    Exact,
    Asymptotic,
}

#[derive(PartialEq, Debug, Clone)]
pub struct MannWhitney {
    /// U statistic of the first group.
    pub u_statistic: f64,
    /// One-sided: the first group is stochastically greater.
    pub p_value: f64,
    /// Rank-biserial correlation, 1 - 2U/(n1 n2).
    pub effect_size: f64,
    pub method: MannWhitneyMethod,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ScoreSummary {
    pub group: String,
    pub n: u64,
    pub mean: Computed<f64>,
    pub median: Computed<f64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ScoreComparison {
    pub score: String,
    pub max_score: u32,
    pub group1: ScoreSummary,
    pub group2: ScoreSummary,
    pub mean_difference: Computed<f64>,
    pub test: Computed<MannWhitney>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Correlation {
    pub coefficient: f64,
    /// Two-sided.
    pub p_value: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TierRow {
    pub tier: Tier,
    pub n: u64,
    pub mean_score: Computed<f64>,
    pub benefit_pct: Vec<(String, Computed<f64>)>,
    /// Jurisdiction ids, sorted.
    pub members: Vec<String>,
}

/// Logistic regression of a flag on the tier. Failed fits report p = 1.0.
#[derive(PartialEq, Debug, Clone)]
pub struct TrendTest {
    pub benefit: String,
    pub slope: Option<f64>,
    pub p_value: f64,
    pub failure: Option<String>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TierGradient {
    pub score: String,
    pub rows: Vec<TierRow>,
    pub pearson: Computed<Correlation>,
    pub spearman: Computed<Correlation>,
    pub trends: Vec<TrendTest>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Headline {
    /// The score averaged in each group (the primary score of the run).
    pub score: String,
    pub n_no_effective_id: u64,
    pub n_id_required: u64,
    pub mean_no_effective_id: Computed<f64>,
    pub mean_id_required: Computed<f64>,
    /// mean(no effective id) / mean(id required)
    pub ratio: Computed<f64>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisReport {
    pub benefit_flags: Vec<String>,
    pub n_jurisdictions: u64,
    pub grouping: Grouping,
    pub shares: Vec<BenefitShares>,
    pub odds: Vec<BenefitOdds>,
    pub score_comparison: ScoreComparison,
    pub extra_score_comparisons: Vec<ScoreComparison>,
    pub gradient: TierGradient,
    pub headline: Headline,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GapComparison {
    pub group1: String,
    pub group2: String,
    pub n1: u64,
    pub n2: u64,
    pub mean1: Computed<f64>,
    pub mean2: Computed<f64>,
    /// mean1 - mean2, in percentage points.
    pub gap: Computed<f64>,
}

/// How often a binary indicator agrees with the winner of the election.
#[derive(PartialEq, Debug, Clone)]
pub struct PartyAlignment {
    pub matched: u64,
    pub total: u64,
    pub percentage: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ElectoralGap {
    pub year: u32,
    pub voter_id: GapComparison,
    pub welfare: GapComparison,
    /// No Effective ID where the Democrats won, ID Required where they lost.
    pub voter_id_alignment: Computed<PartyAlignment>,
    /// Some benefit where the Democrats won, none where they lost.
    pub welfare_alignment: Computed<PartyAlignment>,
    /// Jurisdictions of the policy table without a result for this year.
    pub unmatched: Vec<String>,
}

/// Errors that prevent an analysis from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AnalysisError {
    Schema(String),
    DuplicateJurisdiction(String),
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },
    EmptyTable,
    NoElectoralData,
}

impl Error for AnalysisError {}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::Schema(msg) => write!(f, "schema error: {}", msg),
            AnalysisError::DuplicateJurisdiction(id) => {
                write!(f, "jurisdiction {} appears more than once", id)
            }
            AnalysisError::InvalidValue { row, column, value } => write!(
                f,
                "invalid value {:?} in column {} (row {})",
                value, column, row
            ),
            AnalysisError::EmptyTable => write!(f, "the policy table has no rows"),
            AnalysisError::NoElectoralData => write!(f, "no electoral data to join"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(v: i64) -> Tier {
        Tier::new(v).unwrap()
    }

    #[test]
    fn tiers_out_of_range() {
        assert_eq!(Tier::new(0), None);
        assert_eq!(Tier::new(6), None);
        assert_eq!(Tier::ALL.iter().map(|t| t.value()).collect::<Vec<u8>>(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn collapse_schemes_cover_every_tier() {
        let expected: [(CollapseScheme, [usize; 5]); 3] = [
            (CollapseScheme::TwoTier, [0, 0, 0, 1, 1]),
            (CollapseScheme::ThreeTier, [0, 0, 1, 2, 2]),
            (CollapseScheme::PhotoId, [0, 1, 0, 1, 2]),
        ];
        for (scheme, groups) in expected.iter() {
            for (t, g) in Tier::ALL.iter().zip(groups.iter()) {
                assert_eq!(scheme.collapse(*t), *g, "{:?} tier {}", scheme, t.value());
                assert_eq!(scheme.label(*t), scheme.group_labels()[*g]);
            }
            let grouping = Grouping::Collapsed(*scheme);
            assert_eq!(grouping.group_labels().len(), scheme.group_labels().len());
            for t in Tier::ALL.iter() {
                assert_eq!(grouping.group_of(*t), scheme.collapse(*t));
            }
            assert_eq!(Grouping::from_name(scheme.name()), Some(grouping));
        }
        for t in Tier::ALL.iter() {
            assert_eq!(Grouping::Tiers.group_of(*t), (t.value() - 1) as usize);
        }
        assert_eq!(Grouping::Tiers.group_labels()[4], "No Document Required");
    }

    #[test]
    fn collapse_labels() {
        assert_eq!(CollapseScheme::ThreeTier.label(tier(2)), "Strict");
        assert_eq!(CollapseScheme::ThreeTier.label(tier(3)), "Non-Strict");
        assert_eq!(CollapseScheme::ThreeTier.label(tier(4)), "Weak/None");
        assert_eq!(CollapseScheme::PhotoId.label(tier(3)), "Photo ID");
        assert_eq!(CollapseScheme::PhotoId.label(tier(4)), "Non-Photo ID");
        assert_eq!(CollapseScheme::PhotoId.label(tier(5)), "No Document");
    }

    #[test]
    fn two_tier_split_is_no_effective_id() {
        for t in Tier::ALL.iter() {
            assert_eq!(CollapseScheme::TwoTier.collapse(*t) == 1, t.no_effective_id());
            let expected = if t.no_effective_id() {
                "No Effective ID"
            } else {
                "ID Required"
            };
            assert_eq!(CollapseScheme::TwoTier.label(*t), expected);
        }
    }
}
