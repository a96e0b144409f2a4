//! Streaming aggregation.
//!
//! One pass over the matched row set, constant memory for SUM/AVG/MIN/MAX.
//! Aggregations always see every matching row — limit and offset apply only
//! to the returned rows, never here.
//!
//! Array fields contribute one sample per element, so a FACET over an array
//! counts elements, matching what a host-side histogram over the expanded
//! values would produce. Integer SUM accumulates into a saturating i64;
//! double SUM follows IEEE. AVG over zero samples is 0 with count 0, not NaN.
//! FACET buckets come back in ascending value order.

use std::collections::BTreeMap;

use crate::ns::Namespace;
use crate::planner::PlannedAgg;
use crate::query::AggKind;
use crate::schema::FieldType;
use crate::value::{RowId, Value};

/// One FACET bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct FacetBucket {
    pub value: Value,
    pub count: u64,
}

/// The outcome of one requested aggregation, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
    /// Canonical field spelling.
    pub field: String,
    pub kind: AggKind,
    /// SUM/AVG/MIN/MAX value; 0 for an empty input.
    pub value: f64,
    /// Samples consumed.
    pub count: u64,
    /// FACET buckets, ascending by value; empty for other kinds.
    pub facets: Vec<FacetBucket>,
}

enum Accumulator {
    SumInt(i64),
    SumDouble(f64),
    Avg { sum: f64, count: u64 },
    Min(Option<f64>),
    Max(Option<f64>),
    Facet(BTreeMap<Value, u64>),
}

struct AggState {
    spec: PlannedAgg,
    acc: Accumulator,
    samples: u64,
}

impl AggState {
    fn new(ns: &Namespace, spec: &PlannedAgg) -> Self {
        let acc = match spec.kind {
            AggKind::Sum => match ns.field_def(spec.position).field_type {
                FieldType::Double => Accumulator::SumDouble(0.0),
                _ => Accumulator::SumInt(0),
            },
            AggKind::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            AggKind::Min => Accumulator::Min(None),
            AggKind::Max => Accumulator::Max(None),
            AggKind::Facet => Accumulator::Facet(BTreeMap::new()),
        };
        Self {
            spec: spec.clone(),
            acc,
            samples: 0,
        }
    }

    fn feed(&mut self, value: &Value) {
        self.samples += 1;
        match &mut self.acc {
            Accumulator::SumInt(total) => {
                if let Some(v) = value.as_int() {
                    *total = total.saturating_add(v);
                } else if let Some(v) = value.as_double() {
                    *total = total.saturating_add(v as i64);
                }
            }
            Accumulator::SumDouble(total) => {
                if let Some(v) = value.as_double() {
                    *total += v;
                }
            }
            Accumulator::Avg { sum, count } => {
                if let Some(v) = value.as_double() {
                    *sum += v;
                    *count += 1;
                }
            }
            Accumulator::Min(best) => {
                if let Some(v) = value.as_double() {
                    *best = Some(best.map_or(v, |b| b.min(v)));
                }
            }
            Accumulator::Max(best) => {
                if let Some(v) = value.as_double() {
                    *best = Some(best.map_or(v, |b| b.max(v)));
                }
            }
            Accumulator::Facet(buckets) => {
                *buckets.entry(value.clone()).or_insert(0) += 1;
            }
        }
    }

    fn finish(self) -> AggregationResult {
        let (value, count, facets) = match self.acc {
            Accumulator::SumInt(total) => (total as f64, self.samples, Vec::new()),
            Accumulator::SumDouble(total) => (total, self.samples, Vec::new()),
            Accumulator::Avg { sum, count } => {
                let value = if count == 0 { 0.0 } else { sum / count as f64 };
                (value, count, Vec::new())
            }
            Accumulator::Min(best) => (best.unwrap_or(0.0), self.samples, Vec::new()),
            Accumulator::Max(best) => (best.unwrap_or(0.0), self.samples, Vec::new()),
            Accumulator::Facet(buckets) => {
                let total: u64 = buckets.values().sum();
                let facets = buckets
                    .into_iter()
                    .map(|(value, count)| FacetBucket { value, count })
                    .collect();
                (0.0, total, facets)
            }
        };
        AggregationResult {
            field: self.spec.field,
            kind: self.spec.kind,
            value,
            count,
            facets,
        }
    }
}

/// Runs every requested aggregation over the matched rows in one pass.
pub fn run(ns: &Namespace, specs: &[PlannedAgg], rows: &[RowId]) -> Vec<AggregationResult> {
    let mut states: Vec<AggState> = specs.iter().map(|s| AggState::new(ns, s)).collect();
    for &row in rows {
        let Some(payload) = ns.row(row) else { continue };
        for state in &mut states {
            for value in payload.field_values(state.spec.position) {
                state.feed(value);
            }
        }
    }
    states.into_iter().map(AggState::finish).collect()
}
