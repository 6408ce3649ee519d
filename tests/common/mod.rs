#![allow(dead_code)]

use async_trait::async_trait;
use league_stats::adapters::memory_store::MemoryHandle;
use league_stats::domain::model::{AggregateKind, AggregateRow, Gender, HierarchyNode, Membership, Player, Rating};
use league_stats::domain::ports::{ExecutionHandle, QueryStore, StoreResult};
use league_stats::domain::query::{AggregateQuery, Column};
use league_stats::{Dataset, MemoryStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub const PLAYERS: usize = 120;

/// A deterministic league: three sections, two districts each, two areas per
/// district. Some players hold two memberships, some none, and a tail of
/// single-player states sits under the by-state threshold.
pub fn league() -> Dataset {
    let mut players = Vec::new();
    let mut memberships = Vec::new();

    for i in 0..PLAYERS {
        let id = format!("p{}", i);
        let state = match i % 5 {
            0 | 1 => "TX".to_string(),
            2 => "CA".to_string(),
            3 => "NY".to_string(),
            _ => format!("Z{}", i),
        };
        players.push(Player {
            id: id.clone(),
            gender: if i % 2 == 0 { Gender::Male } else { Gender::Female },
            rating: Rating::from_tenths(25 + 5 * (i % 7) as u16),
            state,
            country: if i % 13 == 12 { "MX".to_string() } else { "US".to_string() },
        });

        if i % 11 == 10 {
            continue;
        }
        let section = i % 3;
        let district = (i / 3) % 2;
        let area = (i / 6) % 2;
        memberships.push(Membership {
            player_id: id.clone(),
            section_id: format!("S{}", section),
            district_id: format!("D{}-{}", section, district),
            area_id: format!("A{}-{}-{}", section, district, area),
        });
        if i % 4 == 0 {
            memberships.push(Membership {
                player_id: id,
                section_id: format!("S{}", section),
                district_id: format!("D{}-{}", section, district),
                area_id: format!("A{}-{}-{}", section, district, 1 - area),
            });
        }
    }

    let sections = (0..3)
        .map(|s| HierarchyNode {
            id: format!("S{}", s),
            name: format!("Section {}", s),
        })
        .collect();

    Dataset::new(players, memberships).with_names(Column::SectionId, sections)
}

/// Wraps a [`MemoryStore`], counting runs and holding back one aggregate
/// until released.
#[derive(Clone)]
pub struct GatedStore {
    inner: MemoryStore,
    pub gated: Option<AggregateKind>,
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
    pub runs: Arc<AtomicUsize>,
}

impl GatedStore {
    pub fn new(dataset: Dataset, gated: Option<AggregateKind>) -> Self {
        Self {
            inner: MemoryStore::new(dataset),
            gated,
            entered: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

pub struct GatedHandle {
    inner: MemoryHandle,
    store: GatedStore,
}

#[async_trait]
impl QueryStore for GatedStore {
    type Handle = GatedHandle;

    async fn acquire(&self) -> StoreResult<GatedHandle> {
        Ok(GatedHandle {
            inner: self.inner.acquire().await?,
            store: self.clone(),
        })
    }
}

#[async_trait]
impl ExecutionHandle for GatedHandle {
    async fn run(&mut self, query: &AggregateQuery) -> StoreResult<Vec<AggregateRow>> {
        self.store.runs.fetch_add(1, Ordering::SeqCst);
        if self.store.gated == Some(query.kind()) {
            self.store.entered.notify_one();
            self.store.release.notified().await;
        }
        self.inner.run(query).await
    }
}
