use crate::domain::model::{FilterField, FilterSpec};
use crate::domain::query::{AggregateDefinition, Column, Predicate, PredicateSet};
use crate::utils::error::{Result, StatsError};

/// Turns a [`FilterSpec`] into the predicates and positional parameters an
/// aggregate runs under.
///
/// Fields are visited in [`FilterField::ORDER`] and every present field adds
/// its predicate and its parameter in the same step, so parameter `i` always
/// binds predicate `i`. Absent fields add nothing. A filter the aggregate's
/// join shape cannot reach is an error, never a silently dropped predicate.
pub struct PredicateBuilder;

impl PredicateBuilder {
    pub fn build(spec: &FilterSpec, definition: &AggregateDefinition) -> Result<PredicateSet> {
        let mut set = PredicateSet::default();

        for field in FilterField::ORDER {
            if definition.group_by == Column::for_filter(field) && definition.kind.is_hierarchy() {
                continue;
            }
            let Some(value) = spec.get(field) else {
                continue;
            };

            let column = Column::for_filter(field);
            if !definition.join.has(column.table()) {
                return Err(StatsError::UnsupportedFilter {
                    aggregate: definition.kind,
                    field,
                    table: column.table().as_str(),
                });
            }

            set.params.push(value);
            set.predicates.push(Predicate {
                field,
                column,
                slot: set.params.len(),
            });
        }

        debug_assert!(set.is_aligned());
        Ok(set)
    }
}
