use crate::core::cascade::CascadeState;
use crate::domain::model::{AggregateKind, AggregateRow, FilterSpec, GroupKey, RowCount};
use crate::utils::error::{ErrorCategory, ExecutionErrorKind, StatsError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const TOP_STATES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Configuration,
    Transient,
    NonTransient,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateFailure {
    pub kind: FailureKind,
    pub status: u16,
    pub message: String,
}

impl AggregateFailure {
    pub fn timed_out(kind: AggregateKind) -> Self {
        Self {
            kind: FailureKind::TimedOut,
            status: 504,
            message: format!("{} did not settle before the fan-out deadline", kind),
        }
    }

    /// The aggregate's task died before producing an outcome.
    pub fn task_failed(kind: AggregateKind, detail: &str) -> Self {
        Self {
            kind: FailureKind::NonTransient,
            status: 500,
            message: format!("{} failed unexpectedly: {}", kind, detail),
        }
    }
}

impl From<&StatsError> for AggregateFailure {
    fn from(error: &StatsError) -> Self {
        let kind = match (error, error.category()) {
            (StatsError::Execution(e), _) => match e.kind {
                ExecutionErrorKind::Transient => FailureKind::Transient,
                ExecutionErrorKind::NonTransient => FailureKind::NonTransient,
            },
            (_, ErrorCategory::Validation) => FailureKind::Validation,
            (_, ErrorCategory::Configuration) => FailureKind::Configuration,
            _ => FailureKind::NonTransient,
        };
        Self {
            kind,
            status: error.status_code(),
            message: error.to_string(),
        }
    }
}

/// How one aggregate settled. Empty is a result, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AggregateOutcome {
    Data { rows: Vec<AggregateRow> },
    Empty,
    Error { error: AggregateFailure },
}

impl AggregateOutcome {
    pub fn from_result(result: Result<Vec<AggregateRow>, StatsError>) -> Self {
        match result {
            Ok(rows) if rows.is_empty() => AggregateOutcome::Empty,
            Ok(rows) => AggregateOutcome::Data { rows },
            Err(e) => AggregateOutcome::Error {
                error: AggregateFailure::from(&e),
            },
        }
    }

    pub fn rows(&self) -> Option<&[AggregateRow]> {
        match self {
            AggregateOutcome::Data { rows } => Some(rows),
            AggregateOutcome::Empty => Some(&[]),
            AggregateOutcome::Error { .. } => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, AggregateOutcome::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AggregateOutcome::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateCount {
    pub state: String,
    pub count: u64,
}

/// Headline figures derived from the settled aggregates. A figure is absent
/// when the aggregate it comes from failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_players: Option<u64>,
    pub hierarchy_groups: Option<usize>,
    pub reported_states: Option<usize>,
    pub average_rating: Option<f64>,
    pub top_states: Vec<StateCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewModel {
    pub filters: FilterSpec,
    pub state: CascadeState,
    pub hierarchy_kind: AggregateKind,
    pub aggregates: BTreeMap<AggregateKind, AggregateOutcome>,
    pub empty: bool,
    pub summary: DashboardSummary,
    pub generated_at: DateTime<Utc>,
    #[serde(skip)]
    pub epoch: u64,
}

impl ViewModel {
    pub fn outcome(&self, kind: AggregateKind) -> Option<&AggregateOutcome> {
        self.aggregates.get(&kind)
    }

    pub fn hierarchy(&self) -> Option<&AggregateOutcome> {
        self.outcome(self.hierarchy_kind)
    }

    pub fn has_errors(&self) -> bool {
        self.aggregates.values().any(AggregateOutcome::is_error)
    }
}

pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(
        filters: FilterSpec,
        state: CascadeState,
        epoch: u64,
        mut aggregates: BTreeMap<AggregateKind, AggregateOutcome>,
    ) -> ViewModel {
        let hierarchy_kind = state.hierarchy_aggregate();
        for kind in std::iter::once(hierarchy_kind).chain(AggregateKind::CROSS_CUTTING) {
            aggregates.entry(kind).or_insert_with(|| AggregateOutcome::Error {
                error: AggregateFailure {
                    kind: FailureKind::NonTransient,
                    status: 500,
                    message: format!("{} was not fetched", kind),
                },
            });
        }
        // a superseded hierarchy level never belongs in this view
        aggregates.retain(|kind, _| !kind.is_hierarchy() || *kind == hierarchy_kind);

        let empty = aggregates.values().all(AggregateOutcome::is_empty);
        let summary = Self::summarize(hierarchy_kind, &aggregates);

        ViewModel {
            filters,
            state,
            hierarchy_kind,
            aggregates,
            empty,
            summary,
            generated_at: Utc::now(),
            epoch,
        }
    }

    fn summarize(
        hierarchy_kind: AggregateKind,
        aggregates: &BTreeMap<AggregateKind, AggregateOutcome>,
    ) -> DashboardSummary {
        let rows = |kind: AggregateKind| aggregates.get(&kind).and_then(AggregateOutcome::rows);

        let total_players = rows(AggregateKind::ByGender).map(|r| r.iter().map(AggregateRow::total).sum());
        let hierarchy_groups = rows(hierarchy_kind).map(<[AggregateRow]>::len);

        let average_rating = rows(AggregateKind::ByRating).and_then(|rows| {
            let (weighted, players) = rows.iter().fold((0.0, 0u64), |(sum, n), row| match (&row.key, row.count) {
                (GroupKey::Rating(r), RowCount::ByGender { male, female }) => {
                    (sum + r.value() * (male + female) as f64, n + male + female)
                }
                _ => (sum, n),
            });
            (players > 0).then(|| weighted / players as f64)
        });

        let states = rows(AggregateKind::ByState);
        let reported_states = states.map(<[AggregateRow]>::len);
        let top_states = states
            .unwrap_or_default()
            .iter()
            .filter_map(|row| match &row.key {
                GroupKey::State(state) => Some(StateCount {
                    state: state.clone(),
                    count: row.total(),
                }),
                _ => None,
            })
            .take(TOP_STATES)
            .collect();

        DashboardSummary {
            total_players,
            hierarchy_groups,
            reported_states,
            average_rating,
            top_states,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{FilterField, Gender, Rating};
    use crate::utils::error::ExecutionError;

    fn outcomes(pairs: Vec<(AggregateKind, AggregateOutcome)>) -> BTreeMap<AggregateKind, AggregateOutcome> {
        pairs.into_iter().collect()
    }

    #[test]
    fn test_all_empty_is_flagged_empty() {
        let view = ResultAssembler::assemble(
            FilterSpec::new(),
            CascadeState::Unscoped,
            1,
            outcomes(vec![
                (AggregateKind::BySection, AggregateOutcome::Empty),
                (AggregateKind::ByGender, AggregateOutcome::Empty),
                (AggregateKind::ByRating, AggregateOutcome::Empty),
                (AggregateKind::ByState, AggregateOutcome::Empty),
            ]),
        );
        assert!(view.empty);
        assert!(!view.has_errors());
        assert_eq!(view.summary.total_players, Some(0));
        assert_eq!(view.summary.average_rating, None);
    }

    #[test]
    fn test_errors_are_not_empty_and_are_kept_per_aggregate() {
        let failure = StatsError::Execution(ExecutionError {
            aggregate: AggregateKind::ByState,
            kind: ExecutionErrorKind::Transient,
            attempts: 3,
            message: "down".into(),
        });
        let view = ResultAssembler::assemble(
            FilterSpec::new(),
            CascadeState::Unscoped,
            1,
            outcomes(vec![
                (AggregateKind::BySection, AggregateOutcome::Empty),
                (AggregateKind::ByGender, AggregateOutcome::Empty),
                (AggregateKind::ByRating, AggregateOutcome::Empty),
                (AggregateKind::ByState, AggregateOutcome::from_result(Err(failure))),
            ]),
        );
        assert!(!view.empty);
        match view.outcome(AggregateKind::ByState) {
            Some(AggregateOutcome::Error { error }) => {
                assert_eq!(error.kind, FailureKind::Transient);
                assert_eq!(error.status, 503);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(view.summary.reported_states, None);
    }

    #[test]
    fn test_missing_aggregates_are_reported_not_omitted() {
        let view = ResultAssembler::assemble(
            FilterSpec::new().with_section("S1"),
            CascadeState::SectionScoped,
            3,
            outcomes(vec![(AggregateKind::BySection, AggregateOutcome::Empty)]),
        );
        assert_eq!(view.hierarchy_kind, AggregateKind::ByDistrict);
        assert_eq!(view.aggregates.len(), 4);
        assert!(view.outcome(AggregateKind::BySection).is_none());
        assert!(view.outcome(AggregateKind::ByDistrict).unwrap().is_error());
    }

    #[test]
    fn test_summary_figures() {
        let view = ResultAssembler::assemble(
            FilterSpec::new(),
            CascadeState::Unscoped,
            1,
            outcomes(vec![
                (
                    AggregateKind::BySection,
                    AggregateOutcome::Data {
                        rows: vec![AggregateRow::named(GroupKey::Section("S1".into()), None, 4)],
                    },
                ),
                (
                    AggregateKind::ByGender,
                    AggregateOutcome::Data {
                        rows: vec![
                            AggregateRow::players(GroupKey::Gender(Gender::Male), 3),
                            AggregateRow::players(GroupKey::Gender(Gender::Female), 1),
                        ],
                    },
                ),
                (
                    AggregateKind::ByRating,
                    AggregateOutcome::Data {
                        rows: vec![
                            AggregateRow::rating(Rating::from_tenths(30), 2, 0),
                            AggregateRow::rating(Rating::from_tenths(40), 1, 1),
                        ],
                    },
                ),
                (AggregateKind::ByState, AggregateOutcome::Empty),
            ]),
        );
        assert!(!view.empty);
        assert_eq!(view.summary.total_players, Some(4));
        assert_eq!(view.summary.hierarchy_groups, Some(1));
        assert_eq!(view.summary.reported_states, Some(0));
        assert_eq!(view.summary.average_rating, Some(3.5));
    }

    #[test]
    fn test_validation_failure_maps_to_400() {
        let failure = AggregateFailure::from(&StatsError::MissingFilter {
            aggregate: AggregateKind::ByDistrict,
            missing: FilterField::Section,
        });
        assert_eq!(failure.kind, FailureKind::Validation);
        assert_eq!(failure.status, 400);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(AggregateOutcome::Empty).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "empty" }));

        let json = serde_json::to_value(AggregateOutcome::Data {
            rows: vec![AggregateRow::players(GroupKey::State("TX".into()), 7)],
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "status": "data", "rows": [{ "state": "TX", "state_count": 7 }] })
        );
    }
}
