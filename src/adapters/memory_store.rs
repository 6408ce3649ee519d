use crate::adapters::dataset::Dataset;
use crate::core::catalog::normalize_rows;
use crate::domain::model::{AggregateRow, FilterValue, Gender, GroupKey, Membership, Player, RowCount};
use crate::domain::ports::{ExecutionHandle, QueryStore, StoreResult};
use crate::domain::query::{AggregateQuery, Column, CountSemantics, JoinShape, Restriction};
use crate::utils::error::StoreError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_POOL_SIZE: usize = 8;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Evaluates aggregate queries over an in-memory [`Dataset`], handing out
/// at most `pool_size` handles at a time.
#[derive(Clone)]
pub struct MemoryStore {
    dataset: Arc<Dataset>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl MemoryStore {
    pub fn new(dataset: Dataset) -> Self {
        Self::with_pool(dataset, DEFAULT_POOL_SIZE, DEFAULT_ACQUIRE_TIMEOUT)
    }

    pub fn with_pool(dataset: Dataset, pool_size: usize, acquire_timeout: Duration) -> Self {
        Self {
            dataset: Arc::new(dataset),
            permits: Arc::new(Semaphore::new(pool_size)),
            acquire_timeout,
        }
    }

    pub fn available_handles(&self) -> usize {
        self.permits.available_permits()
    }
}

pub struct MemoryHandle {
    dataset: Arc<Dataset>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl QueryStore for MemoryStore {
    type Handle = MemoryHandle;

    async fn acquire(&self) -> StoreResult<MemoryHandle> {
        let permit = tokio::time::timeout(self.acquire_timeout, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| StoreError::PoolExhausted(format!("waited {:?}", self.acquire_timeout)))?
            .map_err(|_| StoreError::Unavailable("pool closed".to_string()))?;
        Ok(MemoryHandle {
            dataset: Arc::clone(&self.dataset),
            _permit: permit,
        })
    }
}

#[async_trait]
impl ExecutionHandle for MemoryHandle {
    async fn run(&mut self, query: &AggregateQuery) -> StoreResult<Vec<AggregateRow>> {
        evaluate(&self.dataset, query)
    }
}

type Joined<'a> = (Option<&'a Player>, Option<&'a Membership>);

fn joined_rows<'a>(dataset: &'a Dataset, join: JoinShape) -> Vec<Joined<'a>> {
    match join {
        JoinShape::MembershipsWithPlayers => dataset
            .memberships()
            .iter()
            .map(|m| (dataset.player(&m.player_id), Some(m)))
            .collect(),
        JoinShape::PlayersWithMemberships => dataset
            .players()
            .iter()
            .flat_map(|p| {
                let memberships: Vec<_> = dataset.memberships_of(&p.id).map(Some).collect();
                if memberships.is_empty() {
                    vec![(Some(p), None)]
                } else {
                    memberships.into_iter().map(|m| (Some(p), m)).collect()
                }
            })
            .collect(),
        JoinShape::PlayersOnly => dataset.players().iter().map(|p| (Some(p), None)).collect(),
    }
}

fn column_value(column: Column, (player, membership): Joined<'_>) -> Option<FilterValue> {
    match column {
        Column::SectionId => membership.map(|m| FilterValue::Id(m.section_id.clone())),
        Column::DistrictId => membership.map(|m| FilterValue::Id(m.district_id.clone())),
        Column::AreaId => membership.map(|m| FilterValue::Id(m.area_id.clone())),
        Column::Gender => player.map(|p| FilterValue::Gender(p.gender)),
        Column::Rating => player.map(|p| FilterValue::Rating(p.rating)),
        Column::PlayerId => player.map(|p| FilterValue::Id(p.id.clone())),
        Column::State => player.map(|p| FilterValue::Id(p.state.clone())),
        Column::Country => player.map(|p| FilterValue::Id(p.country.clone())),
    }
}

fn group_key(column: Column, row: Joined<'_>) -> Option<GroupKey> {
    let (player, membership) = row;
    match column {
        Column::SectionId => membership.map(|m| GroupKey::Section(m.section_id.clone())),
        Column::DistrictId => membership.map(|m| GroupKey::District(m.district_id.clone())),
        Column::AreaId => membership.map(|m| GroupKey::Area(m.area_id.clone())),
        Column::Gender => player.map(|p| GroupKey::Gender(p.gender)),
        Column::Rating => player.map(|p| GroupKey::Rating(p.rating)),
        Column::State => player.map(|p| GroupKey::State(p.state.clone())),
        Column::PlayerId | Column::Country => None,
    }
}

fn satisfies(restriction: &Restriction, player: Option<&Player>) -> bool {
    match (restriction, player) {
        (Restriction::RatingBetween(low, high), Some(p)) => p.rating >= *low && p.rating <= *high,
        (Restriction::CountryEquals(country), Some(p)) => &p.country == country,
        (_, None) => false,
    }
}

#[derive(Default)]
struct Group<'a> {
    male: HashSet<&'a str>,
    female: HashSet<&'a str>,
    all: HashSet<&'a str>,
}

/// Evaluates a planned query the way the SQL rendering of it would run.
pub fn evaluate(dataset: &Dataset, query: &AggregateQuery) -> StoreResult<Vec<AggregateRow>> {
    let definition = &query.definition;
    let set = &query.predicates;
    if !set.is_aligned() {
        return Err(StoreError::ParameterMismatch {
            expected: set.predicates.len(),
            actual: set.params.len(),
        });
    }

    let mut bindings = Vec::with_capacity(set.len());
    for predicate in &set.predicates {
        if !definition.join.has(predicate.column.table()) {
            return Err(StoreError::Malformed(format!(
                "{} is not joined",
                predicate.column.qualified()
            )));
        }
        let value = set.param_for(predicate).ok_or(StoreError::ParameterMismatch {
            expected: predicate.slot,
            actual: set.params.len(),
        })?;
        bindings.push((predicate.column, value));
    }

    let mut groups: BTreeMap<GroupKey, Group<'_>> = BTreeMap::new();
    for row in joined_rows(dataset, definition.join) {
        let (player, membership) = row;
        if !definition.restrictions.iter().all(|r| satisfies(r, player)) {
            continue;
        }
        if !bindings
            .iter()
            .all(|(column, value)| column_value(*column, row).as_ref() == Some(*value))
        {
            continue;
        }
        let Some(key) = group_key(definition.group_by, row) else {
            continue;
        };
        let Some(player_id) = player
            .map(|p| p.id.as_str())
            .or_else(|| membership.map(|m| m.player_id.as_str()))
        else {
            continue;
        };

        let group = groups.entry(key).or_default();
        group.all.insert(player_id);
        match player.map(|p| p.gender) {
            Some(Gender::Male) => {
                group.male.insert(player_id);
            }
            Some(Gender::Female) => {
                group.female.insert(player_id);
            }
            None => {}
        }
    }

    let rows = groups
        .into_iter()
        .map(|(key, group)| {
            let count = match definition.count {
                CountSemantics::DistinctPlayers => RowCount::Players(group.all.len() as u64),
                CountSemantics::DistinctPlayersByGender => RowCount::ByGender {
                    male: group.male.len() as u64,
                    female: group.female.len() as u64,
                },
            };
            let name = match &key {
                GroupKey::Section(id) | GroupKey::District(id) | GroupKey::Area(id) => {
                    dataset.name_of(definition.group_by, id).map(str::to_string)
                }
                _ => None,
            };
            AggregateRow { key, name, count }
        })
        .collect();

    Ok(normalize_rows(definition, rows))
}
