/*!

This is the long-form manual for `policy_stats` and `idwelfare`.

## Input formats

The policy table is read from one of the following formats:
* `csv` Comma Separated Values, with a header row (default)
* `xlsx` Excel spreadsheet, first worksheet or a named one

### Columns

| column              | aliases                 | content                                 |
|---------------------|-------------------------|-----------------------------------------|
| `jurisdiction_id`   | `abbrev`, `state_po`    | short unique code (`WA`, `DC`, ...)     |
| `jurisdiction_name` | `state`, `name`         | display name                            |
| `id_strictness`     |                         | tier, integer from 1 to 5               |
| one per benefit     |                         | `0` or `1`                              |

```text
jurisdiction_id,jurisdiction_name,id_strictness,health_children,health_adults,health_seniors,food,eitc
WA,Washington,4,1,1,0,1,1
GA,Georgia,1,0,0,0,0,0
```

Any other column is ignored. A missing column is an error: no column is ever
filled with default values when computing statistics.

### Benefit schema

The default schema has five flags, with health coverage split by age band:
`health_children`, `health_adults`, `health_seniors`, `food`, `eitc`.

Older files used four flags (`health`, `food`, `cash`, `eitc`). They can still
be read by listing the flags explicitly in the configuration
(`policySource.benefitFlags`). The `adults` and `any` scores refer to flags of
the five-flag schema and are not available for these files.

### Tiers

| tier | label                   | two-tier group  |
|------|-------------------------|-----------------|
| 1    | Strict Photo ID         | ID Required     |
| 2    | Strict Non-Photo ID     | ID Required     |
| 3    | Non-Strict Photo ID     | ID Required     |
| 4    | Non-Strict Non-Photo ID | No Effective ID |
| 5    | No Document Required    | No Effective ID |

The other groupings are `three_tier` (1-2 / 3 / 4-5), `photo_id`
(1 and 3 / 2 and 4 / 5) and `five_tier` (no grouping).

### Electoral results

An optional CSV file with the columns `jurisdiction_id` (or `state_po`,
`state`), `year` and `dem_share` (in percent). Several rows for the same
jurisdiction and year are averaged.

Besides the mean share of each group, `electoral_gap.json` reports the party
alignment of the two indicators: the number of jurisdictions where having no
effective voter-ID requirement (resp. offering a benefit) coincides with a
Democratic win (a share of at least 50%).

## Statistics

* Percentages are computed per group; an empty group is reported as not
  computable rather than 0%.
* Odds ratios compare the No Effective ID group (group 1) with the ID Required
  group (group 2). When one of the cells b, c, d of the table is zero, 0.5 is
  added to every cell (Haldane-Anscombe correction) and the result is marked
  as corrected. The p-value is the two-sided Fisher exact test on the
  uncorrected table.
* Scores are compared with a one-sided Mann-Whitney U test (group 1 greater).
  The exact distribution is used for small samples without ties, the normal
  approximation with continuity and tie corrections otherwise. The effect size
  is the rank-biserial correlation `1 - 2U/(n1 n2)`.
* The tier gradient reports Pearson and Spearman correlations between the tier
  and the score, and a logistic regression of each benefit on the tier. A
  regression that cannot be fitted (perfect or quasi-complete separation,
  constant benefit) reports a p-value of 1.0 and the reason of the failure.
  Separation is detected before fitting, from the tiers of the jurisdictions
  with and without the benefit.

## Configuration

`idwelfare` accepts a configuration file in JSON:

```json
{
  "outputSettings": {
    "reportName": "State policies",
    "outputDirectory": "output",
    "writeNarrative": true,
    "writeTables": true
  },
  "policySource": {
    "filePath": "state_policies.csv",
    "provider": "csv"
  },
  "scores": [
    { "name": "adults", "terms": ["health_adults", "food", "eitc"] },
    { "name": "any", "terms": [["health_children", "health_adults", "health_seniors"], "food", "eitc"] }
  ],
  "primaryScore": "welfare_score",
  "grouping": "two_tier",
  "electoralSources": [{ "filePath": "electoral.csv" }],
  "electoralYear": 2020
}
```

Relative paths are resolved against the directory of the configuration file.
A term of a score is either the name of a flag, or a list of flags of which at
least one must be set.

`grouping` selects the groups of the percentage table (`two_tier` when
absent). The odds ratios and score comparisons always use the two-tier groups.

By default a missing tier or flag is an error. With
`"missingValues": "default"` in `policySource`, a missing tier is read as 3
and a missing flag as 0, and each substitution is logged as a warning. Such a
table is only used for the electoral join: `electoral_gap.json` is written,
then the run fails with the list of defaulted cells. No statistic is ever
computed from defaulted values.

 */
