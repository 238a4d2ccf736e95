use log::debug;
use std::collections::HashSet;

use crate::config::*;

/// A validated policy table: one schema, unique jurisdiction ids, one flag per
/// schema entry in every record.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PolicyTable {
    schema: Schema,
    records: Vec<PolicyRecord>,
}

impl PolicyTable {
    pub fn new(schema: Schema, records: Vec<PolicyRecord>) -> Result<PolicyTable, AnalysisError> {
        let mut seen: HashSet<&str> = HashSet::new();
        for (idx, r) in records.iter().enumerate() {
            if !seen.insert(r.jurisdiction_id.as_str()) {
                return Err(AnalysisError::DuplicateJurisdiction(
                    r.jurisdiction_id.clone(),
                ));
            }
            if r.benefit_flags.len() != schema.len() {
                return Err(AnalysisError::Schema(format!(
                    "row {} ({}) has {} benefit flags, the schema has {}",
                    idx + 1,
                    r.jurisdiction_id,
                    r.benefit_flags.len(),
                    schema.len()
                )));
            }
        }
        Ok(PolicyTable { schema, records })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[PolicyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, jurisdiction_id: &str) -> Option<&PolicyRecord> {
        self.records
            .iter()
            .find(|r| r.jurisdiction_id == jurisdiction_id)
    }

    /// The values of one flag, in record order.
    pub fn flag_column(&self, name: &str) -> Option<Vec<bool>> {
        let idx = self.schema.flag_index(name)?;
        Some(self.records.iter().map(|r| r.benefit_flags[idx]).collect())
    }
}

/// A score definition whose flag names have been checked against a schema.
/// Each term is the list of flag indexes of which at least one must be set.
#[derive(Eq, PartialEq, Debug, Clone)]
pub(crate) struct ResolvedScore {
    pub(crate) name: String,
    terms: Vec<Vec<usize>>,
}

impl ResolvedScore {
    pub(crate) fn resolve(
        def: &ScoreDefinition,
        schema: &Schema,
    ) -> Result<ResolvedScore, AnalysisError> {
        if def.terms.is_empty() {
            return Err(AnalysisError::Schema(format!(
                "score {:?} has no terms",
                def.name
            )));
        }
        let lookup = |flag: &String| {
            schema.flag_index(flag).ok_or_else(|| {
                AnalysisError::Schema(format!(
                    "score {:?} refers to the flag {:?}, which is not part of the schema {:?}",
                    def.name,
                    flag,
                    schema.benefit_flags()
                ))
            })
        };
        let mut terms: Vec<Vec<usize>> = Vec::new();
        for t in def.terms.iter() {
            let idxs = match t {
                ScoreTerm::Flag(f) => vec![lookup(f)?],
                ScoreTerm::AnyOf(fs) if fs.is_empty() => {
                    return Err(AnalysisError::Schema(format!(
                        "score {:?} has an empty any-of term",
                        def.name
                    )));
                }
                ScoreTerm::AnyOf(fs) => fs.iter().map(lookup).collect::<Result<Vec<_>, _>>()?,
            };
            terms.push(idxs);
        }
        Ok(ResolvedScore {
            name: def.name.clone(),
            terms,
        })
    }

    pub(crate) fn score(&self, flags: &[bool]) -> u32 {
        self.terms
            .iter()
            .filter(|idxs| idxs.iter().any(|i| flags[*i]))
            .count() as u32
    }
}

/// The derived columns of one jurisdiction.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DerivedView {
    pub jurisdiction_id: String,
    pub id_strictness: Tier,
    pub no_effective_id: bool,
    /// Sum of all the flags of the schema.
    pub welfare_score: u32,
    pub has_any_benefit: bool,
    /// The extra named scores, in the order they were requested.
    pub named_scores: Vec<(String, u32)>,
}

/// The policy table together with its derived columns.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct EnrichedTable {
    pub table: PolicyTable,
    pub derived: Vec<DerivedView>,
}

impl EnrichedTable {
    /// The values of a score, in record order. `welfare_score` is always
    /// available; other names must have been requested in `enrich`.
    pub fn score_column(&self, name: &str) -> Option<Vec<u32>> {
        if name == ScoreDefinition::FULL {
            return Some(self.derived.iter().map(|d| d.welfare_score).collect());
        }
        self.derived
            .iter()
            .map(|d| {
                d.named_scores
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| *v)
            })
            .collect()
    }

    pub fn any_benefit_column(&self) -> Vec<bool> {
        self.derived.iter().map(|d| d.has_any_benefit).collect()
    }

    /// The flag values of a benefit, or of the derived `any_benefit` column.
    pub fn benefit_column(&self, name: &str) -> Option<Vec<bool>> {
        if name == ANY_BENEFIT {
            Some(self.any_benefit_column())
        } else {
            self.table.flag_column(name)
        }
    }
}

/// Name of the derived "any benefit" row in the comparison tables.
pub const ANY_BENEFIT: &str = "any_benefit";

/// Computes the derived columns. The input table is left untouched.
///
/// `scores` are extra named scores. Any flag they mention must belong to the
/// schema of the table.
pub fn enrich(table: &PolicyTable, scores: &[ScoreDefinition]) -> Result<EnrichedTable, AnalysisError> {
    let full = ResolvedScore::resolve(&ScoreDefinition::full(table.schema()), table.schema())?;
    let mut resolved: Vec<ResolvedScore> = Vec::new();
    for s in scores.iter() {
        if s.name == ScoreDefinition::FULL {
            return Err(AnalysisError::Schema(format!(
                "the score name {:?} is reserved",
                s.name
            )));
        }
        if resolved.iter().any(|r| r.name == s.name) {
            return Err(AnalysisError::Schema(format!(
                "the score {:?} is defined twice",
                s.name
            )));
        }
        resolved.push(ResolvedScore::resolve(s, table.schema())?);
    }

    let derived: Vec<DerivedView> = table
        .records()
        .iter()
        .map(|r| {
            let dv = DerivedView {
                jurisdiction_id: r.jurisdiction_id.clone(),
                id_strictness: r.id_strictness,
                no_effective_id: r.id_strictness.no_effective_id(),
                welfare_score: full.score(&r.benefit_flags),
                has_any_benefit: r.benefit_flags.iter().any(|f| *f),
                named_scores: resolved
                    .iter()
                    .map(|rs| (rs.name.clone(), rs.score(&r.benefit_flags)))
                    .collect(),
            };
            debug!("enrich: {:?}", dv);
            dv
        })
        .collect();

    Ok(EnrichedTable {
        table: table.clone(),
        derived,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn small_table() -> PolicyTable {
        let mut b = Builder::canonical();
        b.add_jurisdiction("AA", "Alpha", 1, &[]).unwrap();
        b.add_jurisdiction("BB", "Beta", 3, &["health_children"]).unwrap();
        b.add_jurisdiction("CC", "Gamma", 4, &["health_adults", "food"])
            .unwrap();
        b.add_jurisdiction(
            "DD",
            "Delta",
            5,
            &[
                "health_children",
                "health_adults",
                "health_seniors",
                "food",
                "eitc",
            ],
        )
        .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn no_effective_id_boundary() {
        let t = enrich(&small_table(), &[]).unwrap();
        let flags: Vec<(u8, bool)> = t
            .derived
            .iter()
            .map(|d| (d.id_strictness.value(), d.no_effective_id))
            .collect();
        assert_eq!(flags, vec![(1, false), (3, false), (4, true), (5, true)]);
        for tier in Tier::ALL {
            assert_eq!(tier.no_effective_id(), tier.value() >= 4);
        }
    }

    #[test]
    fn welfare_score_is_the_sum_of_flags() {
        let table = small_table();
        let t = enrich(&table, &[]).unwrap();
        for (r, d) in table.records().iter().zip(t.derived.iter()) {
            let expected = r.benefit_flags.iter().filter(|f| **f).count() as u32;
            assert_eq!(d.welfare_score, expected);
            assert!(d.welfare_score <= table.schema().len() as u32);
            assert_eq!(d.has_any_benefit, expected > 0);
        }
        assert_eq!(t.score_column("welfare_score"), Some(vec![0, 1, 2, 5]));
    }

    #[test]
    fn named_scores() {
        let t = enrich(
            &small_table(),
            &[ScoreDefinition::adults(), ScoreDefinition::any_coverage()],
        )
        .unwrap();
        assert_eq!(t.score_column("adults"), Some(vec![0, 0, 2, 3]));
        assert_eq!(t.score_column("any"), Some(vec![0, 1, 2, 3]));
        assert_eq!(t.score_column("unknown"), None);
    }

    #[test]
    fn enrich_does_not_touch_the_input() {
        let table = small_table();
        let before = table.clone();
        let t = enrich(&table, &[ScoreDefinition::adults()]).unwrap();
        assert_eq!(table, before);
        assert_eq!(t.table, before);
        assert_eq!(enrich(&table, &[ScoreDefinition::adults()]).unwrap(), t);
    }

    #[test]
    fn score_with_unknown_flag_is_a_schema_error() {
        let schema = Schema::new(&[
            "health".to_string(),
            "food".to_string(),
            "cash".to_string(),
            "eitc".to_string(),
        ])
        .unwrap();
        let mut b = Builder::new(&schema).unwrap();
        b.add_jurisdiction("AA", "Alpha", 2, &["cash"]).unwrap();
        let table = b.build().unwrap();
        let res = enrich(&table, &[ScoreDefinition::adults()]);
        assert!(matches!(res, Err(AnalysisError::Schema(_))));
    }

    #[test]
    fn reserved_and_duplicate_score_names() {
        let table = small_table();
        let full = ScoreDefinition::full(table.schema());
        assert!(enrich(&table, &[full]).is_err());
        assert!(enrich(
            &table,
            &[ScoreDefinition::adults(), ScoreDefinition::adults()]
        )
        .is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let r = PolicyRecord {
            jurisdiction_id: "AA".to_string(),
            jurisdiction_name: "Alpha".to_string(),
            id_strictness: Tier::ALL[0],
            benefit_flags: vec![false; 5],
        };
        let res = PolicyTable::new(Schema::canonical(), vec![r.clone(), r]);
        assert_eq!(
            res,
            Err(AnalysisError::DuplicateJurisdiction("AA".to_string()))
        );
    }
}
