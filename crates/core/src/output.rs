//! Tabular output sink, customagg aggregation, and the disturbance-history
//! ring buffer (§3 "Outputs", §4.9).

use crate::config::OutputTableConfig;
use crate::error::OutputError;
use crate::expr::{self, DeadTreeWrapper, Evaluator, Expr, ExpressionWrapper, RuWrapper, SaplingWrapper, TreeWrapper};
use crate::resource_unit::ResourceUnit;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    Double,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Int(i64),
    Double(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub description: String,
    pub ty: ColumnType,
}

/// A row-buffered tabular sink with a fixed, setup-time column order and
/// an always-present `year` column (§3 "Outputs", §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    rows: Vec<Vec<CellValue>>,
    /// Non-identifier characters in user-declared customagg column names
    /// are substituted with `_` (§6 "Tabular outputs").
    pub condition: Option<String>,
    pub ru_filter: Option<String>,
}

impl Output {
    pub fn new(name: impl Into<String>) -> Self {
        let mut out = Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            condition: None,
            ru_filter: None,
        };
        out.columns.push(ColumnDef {
            name: "year".to_string(),
            description: "simulated year".to_string(),
            ty: ColumnType::Int,
        });
        out
    }

    /// `setup()` (§4.9): appends a declared column, sanitizing the name.
    pub fn add_column(&mut self, name: &str, description: &str, ty: ColumnType) {
        self.columns.push(ColumnDef {
            name: sanitize_identifier(name),
            description: description.to_string(),
            ty,
        });
    }

    /// `writeRow()` (§4.9): commits a row matching the declared column
    /// order and count.
    pub fn write_row(&mut self, values: Vec<CellValue>) -> Result<(), OutputError> {
        if values.len() != self.columns.len() {
            return Err(OutputError::Write(format!(
                "{}: expected {} columns, got {}",
                self.name,
                self.columns.len(),
                values.len()
            )));
        }
        self.rows.push(values);
        Ok(())
    }

    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Renders to a `;`-separated text sink with a header row (§6 "Tabular
    /// outputs" delimited mode).
    pub fn to_delimited_text(&self) -> String {
        let mut out = String::new();
        out.push_str(
            &self
                .columns
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(";"),
        );
        out.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row
                .iter()
                .map(|v| match v {
                    CellValue::Int(i) => i.to_string(),
                    CellValue::Double(d) => d.to_string(),
                    CellValue::Text(s) => s.clone(),
                })
                .collect();
            out.push_str(&cells.join(";"));
            out.push('\n');
        }
        out
    }
}

fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// The reduction applied by a customagg output field (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Aggregation {
    Mean,
    Sum,
    Min,
    Max,
    Percentile(u8),
    StdDev,
}

impl Aggregation {
    pub fn reduce(&self, mut values: Vec<f64>) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Percentile(p) => {
                values.sort_by(|a, b| a.partial_cmp(b).unwrap());
                let rank = ((*p as f64 / 100.0) * (values.len() as f64 - 1.0)).round() as usize;
                values[rank.min(values.len() - 1)]
            }
            Aggregation::StdDev => {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
                var.sqrt()
            }
        }
    }
}

/// One user-declared `expression.aggregation()` field of a customagg output
/// (§4.9 "a comma-separated list of `expression.aggregation` fields").
pub struct CustomAggField {
    pub column_name: String,
    expr: Expr,
    aggregation: Aggregation,
}

impl CustomAggField {
    /// Parses `"dbh.mean()"`-style input: the expression text, a `.`, then
    /// an aggregation name (`mean`, `sum`, `min`, `max`, `sd`, `median`, or
    /// `p<n>` for a percentile) followed by `()`.
    pub fn parse(raw: &str) -> Result<Self, OutputError> {
        let trimmed = raw.trim();
        let (expr_text, agg_text) = trimmed
            .rsplit_once('.')
            .ok_or_else(|| OutputError::Setup(format!("customagg column '{trimmed}' has no '.<aggregation>()' suffix")))?;
        let agg_name = agg_text.trim_end_matches(')').trim_end_matches('(');
        let aggregation = parse_aggregation_name(agg_name)
            .ok_or_else(|| OutputError::Setup(format!("unknown aggregation '{agg_name}' in customagg column '{trimmed}'")))?;
        let expr = expr::parse(expr_text).map_err(|e| OutputError::Setup(e.to_string()))?;
        Ok(Self {
            column_name: sanitize_identifier(trimmed),
            expr,
            aggregation,
        })
    }
}

fn parse_aggregation_name(name: &str) -> Option<Aggregation> {
    match name {
        "mean" => Some(Aggregation::Mean),
        "sum" => Some(Aggregation::Sum),
        "min" => Some(Aggregation::Min),
        "max" => Some(Aggregation::Max),
        "sd" => Some(Aggregation::StdDev),
        "median" | "p50" => Some(Aggregation::Percentile(50)),
        other => other
            .strip_prefix('p')
            .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u8>().ok())
            .map(Aggregation::Percentile),
    }
}

/// A declared customagg output (§4.9): entity, spatial scope, optional
/// per-entity filter, and the fields to reduce.
pub struct CustomAggSpec {
    pub entity: AggEntity,
    pub spatial_level: SpatialLevel,
    pub entity_filter: Option<Expr>,
    pub fields: Vec<CustomAggField>,
    pub group_by_species: bool,
}

impl CustomAggSpec {
    /// `setup()` (§4.9): builds a spec from an output table's config
    /// subtree — `entity`, `spatial_level`, `filter` (entity filter),
    /// and `columns` (the `expression.aggregation()` field list).
    pub fn from_config(table: &OutputTableConfig) -> Result<Self, OutputError> {
        let entity = match table.entity.as_deref() {
            Some("tree") => AggEntity::Tree,
            Some("sapling") => AggEntity::Sapling,
            Some("ru") => AggEntity::Ru,
            Some("snag") => AggEntity::Snag,
            Some(other) => return Err(OutputError::Setup(format!("unknown customagg entity '{other}'"))),
            None => return Err(OutputError::Setup("customagg output is missing 'entity'".to_string())),
        };
        let spatial_level = match table.spatial_level.as_deref() {
            Some("landscape") | None => SpatialLevel::Landscape,
            Some("ru") => SpatialLevel::Ru,
            Some("stand") => SpatialLevel::Stand,
            Some(other) => return Err(OutputError::Setup(format!("unknown customagg spatial level '{other}'"))),
        };
        let entity_filter = table.filter.as_deref().map(expr::parse).transpose().map_err(|e| OutputError::Setup(e.to_string()))?;
        let fields = table.columns.iter().map(|c| CustomAggField::parse(c)).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            entity,
            spatial_level,
            entity_filter,
            fields,
            group_by_species: entity.groups_by_species_by_default(),
        })
    }

    /// `exec()` (§4.9): iterates the declared entity within `rus` (already
    /// narrowed to the output's spatial scope by the caller) through the
    /// matching wrapper, groups by species index when `group_by_species`
    /// applies to this entity, and reduces every declared field per group.
    /// Returns one `(species group, reduced field values)` pair per group,
    /// field values in column declaration order.
    pub fn exec(&self, rus: &[&ResourceUnit]) -> Result<Vec<(Option<usize>, Vec<f64>)>, OutputError> {
        match self.entity {
            AggEntity::Tree => self.reduce_groups(rus.iter().flat_map(|ru| ru.trees.iter()).filter(|t| !t.is_dead()).map(|t| {
                (self.group_by_species.then_some(t.species_index), TreeWrapper(t))
            })),
            AggEntity::Sapling => self.reduce_groups(
                rus.iter()
                    .flat_map(|ru| ru.saplings.iter())
                    .flat_map(|cell| cell.slots.iter())
                    .filter(|s| s.is_occupied())
                    .map(|s| (self.group_by_species.then_some(s.species_index.unwrap_or(0)), SaplingWrapper(s))),
            ),
            AggEntity::Snag => self.reduce_groups(
                rus.iter()
                    .filter_map(|ru| ru.snag.as_ref())
                    .flat_map(|snag| snag.dead_trees.iter())
                    .filter(|d| !d.removed)
                    .map(|d| (self.group_by_species.then_some(d.species_index), DeadTreeWrapper(d))),
            ),
            AggEntity::Ru => self.reduce_groups(rus.iter().map(|ru| (None, RuWrapper(*ru)))),
        }
    }

    fn reduce_groups<W: ExpressionWrapper>(&self, entities: impl Iterator<Item = (Option<usize>, W)>) -> Result<Vec<(Option<usize>, Vec<f64>)>, OutputError> {
        let mut evaluator = Evaluator::new(false);
        let mut groups: std::collections::BTreeMap<Option<usize>, Vec<W>> = std::collections::BTreeMap::new();
        for (group, wrapper) in entities {
            if let Some(filter) = &self.entity_filter {
                if !evaluator.execute_bool(filter, &wrapper).map_err(|e| OutputError::Write(e.to_string()))? {
                    continue;
                }
            }
            groups.entry(group).or_default().push(wrapper);
        }

        let mut out = Vec::with_capacity(groups.len());
        for (group, wrappers) in groups {
            let mut reduced = Vec::with_capacity(self.fields.len());
            for field in &self.fields {
                let mut values = Vec::with_capacity(wrappers.len());
                for w in &wrappers {
                    values.push(evaluator.execute(&field.expr, w).map_err(|e| OutputError::Write(e.to_string()))?);
                }
                reduced.push(field.aggregation.reduce(values));
            }
            out.push((group, reduced));
        }
        Ok(out)
    }
}

/// Entity a customagg output iterates (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggEntity {
    Tree,
    Sapling,
    Ru,
    Snag,
}

impl AggEntity {
    /// Grouping by species is the default for tree/sapling/snag
    /// aggregations (§4.9).
    pub fn groups_by_species_by_default(&self) -> bool {
        !matches!(self, AggEntity::Ru)
    }
}

/// Spatial scope over which a customagg output is evaluated (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpatialLevel {
    Landscape,
    Ru,
    Stand,
}

/// An event in the bounded, newest-first disturbance-history ring (§4.9
/// "Disturbance history").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisturbanceEvent {
    pub year: u32,
    pub source: DisturbanceSource,
    pub info: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisturbanceSource {
    Fire,
    BarkBeetle,
    Wind,
    Bite,
    Abe,
    Management,
}

/// Per-RU bounded newest-first disturbance history (§4.9, §6
/// "notifyDisturbance").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisturbanceHistory {
    capacity: usize,
    events: VecDeque<DisturbanceEvent>,
}

impl DisturbanceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity),
        }
    }

    pub fn notify(&mut self, event: DisturbanceEvent) {
        self.events.push_front(event);
        while self.events.len() > self.capacity {
            self.events.pop_back();
        }
    }

    pub fn iter_newest_first(&self) -> impl Iterator<Item = &DisturbanceEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_row_rejects_wrong_column_count() {
        let mut out = Output::new("tree");
        out.add_column("dbh", "diameter at breast height", ColumnType::Double);
        let err = out.write_row(vec![CellValue::Int(2020)]).unwrap_err();
        assert!(matches!(err, OutputError::Write(_)));
    }

    #[test]
    fn column_names_sanitize_non_identifier_characters() {
        let mut out = Output::new("customagg");
        out.add_column("dbh.mean()", "mean dbh", ColumnType::Double);
        assert_eq!(out.columns[1].name, "dbh_mean__");
    }

    #[test]
    fn percentile_aggregation_matches_median() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(Aggregation::Percentile(50).reduce(values), 3.0);
    }

    #[test]
    fn disturbance_history_evicts_oldest_beyond_capacity() {
        let mut history = DisturbanceHistory::new(2);
        history.notify(DisturbanceEvent {
            year: 2020,
            source: DisturbanceSource::Wind,
            info: "a".to_string(),
        });
        history.notify(DisturbanceEvent {
            year: 2021,
            source: DisturbanceSource::Fire,
            info: "b".to_string(),
        });
        history.notify(DisturbanceEvent {
            year: 2022,
            source: DisturbanceSource::BarkBeetle,
            info: "c".to_string(),
        });
        let years: Vec<u32> = history.iter_newest_first().map(|e| e.year).collect();
        assert_eq!(years, vec![2022, 2021]);
    }
}
