use crate::core::assembler::{ResultAssembler, ViewModel};
use crate::core::engine::StatsEngine;
use crate::domain::model::{AggregateKind, FilterSpec};
use crate::domain::ports::QueryStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};

/// Depth of the geographic filters, which picks the hierarchy aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeState {
    Unscoped,
    SectionScoped,
    DistrictScoped,
}

impl CascadeState {
    pub fn of(spec: &FilterSpec) -> Self {
        match (&spec.section, &spec.district) {
            (None, _) => CascadeState::Unscoped,
            (Some(_), None) => CascadeState::SectionScoped,
            (Some(_), Some(_)) => CascadeState::DistrictScoped,
        }
    }

    pub fn hierarchy_aggregate(&self) -> AggregateKind {
        match self {
            CascadeState::Unscoped => AggregateKind::BySection,
            CascadeState::SectionScoped => AggregateKind::ByDistrict,
            CascadeState::DistrictScoped => AggregateKind::ByArea,
        }
    }
}

/// Applies the cascade rules to a filter update: clearing or changing a
/// level discards the levels beneath it unless the same update also set them.
pub fn cascade_filters(previous: &FilterSpec, mut next: FilterSpec) -> FilterSpec {
    let section_changed = next.section != previous.section;
    if next.section.is_none() || (section_changed && next.district == previous.district) {
        next.district = None;
        next.area = None;
    }

    let district_changed = next.district != previous.district;
    if next.district.is_none() || (district_changed && next.area == previous.area) {
        next.area = None;
    }
    next
}

/// The aggregates one refresh fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub state: CascadeState,
    pub hierarchy: AggregateKind,
    pub cross_cutting: [AggregateKind; 3],
}

impl FetchPlan {
    pub fn for_filters(spec: &FilterSpec) -> Self {
        let state = CascadeState::of(spec);
        Self {
            state,
            hierarchy: state.hierarchy_aggregate(),
            cross_cutting: AggregateKind::CROSS_CUTTING,
        }
    }

    pub fn kinds(&self) -> Vec<AggregateKind> {
        std::iter::once(self.hierarchy)
            .chain(self.cross_cutting)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: CascadeState,
    pub to: CascadeState,
    pub filters: FilterSpec,
    pub epoch: u64,
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Current(Arc<ViewModel>),
    /// The filters changed while fetching; the results were dropped.
    Superseded { epoch: u64 },
}

#[derive(Debug, Clone)]
struct Snapshot {
    filters: FilterSpec,
    epoch: u64,
}

/// Drives the dashboard through filter changes.
///
/// Each filter update starts a new epoch. A refresh runs the plan for the
/// epoch it started in and is cancelled as soon as the epoch moves on, so
/// its results can never land in a view built for other filters.
pub struct CascadeOrchestrator<S: QueryStore> {
    engine: Arc<StatsEngine<S>>,
    snapshot: watch::Sender<Snapshot>,
    view: RwLock<Option<Arc<ViewModel>>>,
    in_flight: Mutex<()>,
}

impl<S: QueryStore + 'static> CascadeOrchestrator<S> {
    pub fn new(engine: Arc<StatsEngine<S>>) -> Self {
        let (snapshot, _) = watch::channel(Snapshot {
            filters: FilterSpec::new(),
            epoch: 0,
        });
        Self {
            engine,
            snapshot,
            view: RwLock::new(None),
            in_flight: Mutex::new(()),
        }
    }

    pub fn filters(&self) -> FilterSpec {
        self.snapshot.borrow().filters.clone()
    }

    pub fn state(&self) -> CascadeState {
        CascadeState::of(&self.snapshot.borrow().filters)
    }

    pub fn epoch(&self) -> u64 {
        self.snapshot.borrow().epoch
    }

    pub fn plan(&self) -> FetchPlan {
        FetchPlan::for_filters(&self.snapshot.borrow().filters)
    }

    /// Replaces the filters, applying the cascade rules. An update that
    /// leaves the filters unchanged keeps the current epoch.
    pub fn update_filters(&self, next: FilterSpec) -> Transition {
        let mut transition = None;
        self.snapshot.send_if_modified(|snapshot| {
            let from = CascadeState::of(&snapshot.filters);
            let filters = cascade_filters(&snapshot.filters, next);
            let modified = filters != snapshot.filters;
            if modified {
                snapshot.filters = filters;
                snapshot.epoch += 1;
            }
            transition = Some(Transition {
                from,
                to: CascadeState::of(&snapshot.filters),
                filters: snapshot.filters.clone(),
                epoch: snapshot.epoch,
            });
            modified
        });

        let transition = transition.unwrap_or_else(|| Transition {
            from: self.state(),
            to: self.state(),
            filters: self.filters(),
            epoch: self.epoch(),
        });
        if transition.from != transition.to {
            tracing::info!(
                "Cascade moved {:?} -> {:?}; hierarchy aggregate is now {}",
                transition.from,
                transition.to,
                transition.to.hierarchy_aggregate()
            );
        }
        tracing::debug!("Filters now {} (epoch {})", transition.filters, transition.epoch);
        transition
    }

    /// The last view, if it was built for the current filters.
    pub async fn current_view(&self) -> Option<Arc<ViewModel>> {
        let view = self.view.read().await;
        view.as_ref()
            .filter(|v| v.epoch == self.epoch())
            .map(Arc::clone)
    }

    /// Fetches the plan for the current filters and installs the assembled
    /// view, unless the filters change first.
    pub async fn refresh(&self) -> RefreshOutcome {
        let _in_flight = self.in_flight.lock().await;

        let mut changes = self.snapshot.subscribe();
        let snapshot = changes.borrow_and_update().clone();
        let plan = FetchPlan::for_filters(&snapshot.filters);
        let kinds = plan.kinds();
        tracing::debug!(
            "Refreshing {:?} for {} (epoch {})",
            kinds,
            snapshot.filters,
            snapshot.epoch
        );

        let fetch = self.engine.fan_out(&kinds, &snapshot.filters);
        let outcomes = tokio::select! {
            outcomes = fetch => outcomes,
            _ = changes.changed() => {
                tracing::debug!("Refresh for epoch {} superseded; cancelling", snapshot.epoch);
                return RefreshOutcome::Superseded { epoch: snapshot.epoch };
            }
        };

        let view = Arc::new(ResultAssembler::assemble(
            snapshot.filters,
            plan.state,
            snapshot.epoch,
            outcomes,
        ));

        let mut slot = self.view.write().await;
        if self.epoch() != snapshot.epoch {
            tracing::debug!("Discarding late results for epoch {}", snapshot.epoch);
            return RefreshOutcome::Superseded { epoch: snapshot.epoch };
        }
        *slot = Some(Arc::clone(&view));
        RefreshOutcome::Current(view)
    }
}
