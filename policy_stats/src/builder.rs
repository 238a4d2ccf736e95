pub use crate::config::*;
use crate::prepare::PolicyTable;

/// A builder for assembling a policy table row by row.
///
/// ```
/// pub use policy_stats::builder::Builder;
/// # use policy_stats::AnalysisError;
///
/// let mut builder = Builder::canonical();
/// builder.add_jurisdiction("WA", "Washington", 4, &["health_children", "food"])?;
/// builder.add_jurisdiction("GA", "Georgia", 1, &[])?;
/// let table = builder.build()?;
/// assert_eq!(table.len(), 2);
///
/// # Ok::<(), AnalysisError>(())
/// ```
pub struct Builder {
    pub(crate) _schema: Schema,
    pub(crate) _records: Vec<PolicyRecord>,
}

impl Builder {
    pub fn new(schema: &Schema) -> Result<Builder, AnalysisError> {
        if schema.is_empty() {
            return Err(AnalysisError::Schema(
                "a schema needs at least one benefit flag".to_string(),
            ));
        }
        Ok(Builder {
            _schema: schema.clone(),
            _records: Vec::new(),
        })
    }

    /// A builder for the five-flag schema.
    pub fn canonical() -> Builder {
        Builder {
            _schema: Schema::canonical(),
            _records: Vec::new(),
        }
    }

    /// Adds a jurisdiction. `flags_set` lists the benefits that are offered;
    /// all the other flags of the schema are set to 0.
    pub fn add_jurisdiction(
        &mut self,
        id: &str,
        name: &str,
        tier: u8,
        flags_set: &[&str],
    ) -> Result<(), AnalysisError> {
        let row = self._records.len() + 1;
        let id_strictness = Tier::new(tier as i64).ok_or_else(|| AnalysisError::InvalidValue {
            row,
            column: "id_strictness".to_string(),
            value: tier.to_string(),
        })?;
        let mut benefit_flags = vec![false; self._schema.len()];
        for f in flags_set {
            let idx = self._schema.flag_index(f).ok_or_else(|| {
                AnalysisError::Schema(format!("unknown benefit flag {:?} for {}", f, id))
            })?;
            benefit_flags[idx] = true;
        }
        self.add_record(PolicyRecord {
            jurisdiction_id: id.to_string(),
            jurisdiction_name: name.to_string(),
            id_strictness,
            benefit_flags,
        })
    }

    pub fn add_record(&mut self, record: PolicyRecord) -> Result<(), AnalysisError> {
        if record.benefit_flags.len() != self._schema.len() {
            return Err(AnalysisError::Schema(format!(
                "{} has {} benefit flags, the schema has {}",
                record.jurisdiction_id,
                record.benefit_flags.len(),
                self._schema.len()
            )));
        }
        if self
            ._records
            .iter()
            .any(|r| r.jurisdiction_id == record.jurisdiction_id)
        {
            return Err(AnalysisError::DuplicateJurisdiction(record.jurisdiction_id));
        }
        self._records.push(record);
        Ok(())
    }

    pub fn build(self) -> Result<PolicyTable, AnalysisError> {
        PolicyTable::new(self._schema, self._records)
    }
}
