use crate::domain::model::{AggregateKind, FilterField, FilterValue, Rating};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Players,
    Memberships,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Players => "player",
            Table::Memberships => "membership",
        }
    }

    pub fn alias(&self) -> &'static str {
        match self {
            Table::Players => "p",
            Table::Memberships => "ps",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    PlayerId,
    SectionId,
    DistrictId,
    AreaId,
    Gender,
    Rating,
    State,
    Country,
}

impl Column {
    pub fn table(&self) -> Table {
        match self {
            Column::SectionId | Column::DistrictId | Column::AreaId => Table::Memberships,
            Column::PlayerId | Column::Gender | Column::Rating | Column::State | Column::Country => {
                Table::Players
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Column::PlayerId => "id",
            Column::SectionId => "section_id",
            Column::DistrictId => "district_id",
            Column::AreaId => "area_id",
            Column::Gender => "gender",
            Column::Rating => "rating",
            Column::State => "state",
            Column::Country => "country",
        }
    }

    /// Qualified reference, e.g. `ps.section_id`.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table().alias(), self.name())
    }

    /// Column a filter dimension compares against.
    pub fn for_filter(field: FilterField) -> Column {
        match field {
            FilterField::Section => Column::SectionId,
            FilterField::District => Column::DistrictId,
            FilterField::Area => Column::AreaId,
            FilterField::Gender => Column::Gender,
            FilterField::Rating => Column::Rating,
        }
    }
}

/// Which tables an aggregate reads and which one drives the row set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinShape {
    /// Membership rows, each left-joined to its player.
    MembershipsWithPlayers,
    /// Player rows, each left-joined to its memberships (zero or more).
    PlayersWithMemberships,
    /// Player rows only.
    PlayersOnly,
}

impl JoinShape {
    pub fn has(&self, table: Table) -> bool {
        match self {
            JoinShape::MembershipsWithPlayers | JoinShape::PlayersWithMemberships => true,
            JoinShape::PlayersOnly => table == Table::Players,
        }
    }

    /// Column identifying the counted player for this shape.
    pub fn player_column(&self) -> &'static str {
        match self {
            JoinShape::MembershipsWithPlayers => "ps.player_id",
            JoinShape::PlayersWithMemberships | JoinShape::PlayersOnly => "p.id",
        }
    }
}

/// One `column = $slot` comparison. Slots are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: FilterField,
    pub column: Column,
    pub slot: usize,
}

/// Predicates together with the parameters they bind, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicateSet {
    pub predicates: Vec<Predicate>,
    pub params: Vec<FilterValue>,
}

impl PredicateSet {
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Parameter bound to a predicate's slot.
    pub fn param_for(&self, predicate: &Predicate) -> Option<&FilterValue> {
        predicate.slot.checked_sub(1).and_then(|i| self.params.get(i))
    }

    pub fn is_aligned(&self) -> bool {
        self.predicates.len() == self.params.len()
            && self
                .predicates
                .iter()
                .enumerate()
                .all(|(i, p)| p.slot == i + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSemantics {
    DistinctPlayers,
    /// Distinct players per group, split into male and female counts.
    DistinctPlayersByGender,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restriction {
    RatingBetween(Rating, Rating),
    CountryEquals(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOrder {
    CountDesc,
    KeyAsc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateDefinition {
    pub kind: AggregateKind,
    pub group_by: Column,
    /// Lookup table supplying display names for the group key.
    pub names: Option<&'static str>,
    pub required: &'static [FilterField],
    pub join: JoinShape,
    pub count: CountSemantics,
    pub restrictions: Vec<Restriction>,
    /// Groups whose count is at or below this value are dropped.
    pub min_group_exclusive: Option<u64>,
    pub order: ResultOrder,
}

/// A definition paired with the predicates it runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateQuery {
    pub definition: AggregateDefinition,
    pub predicates: PredicateSet,
}

impl AggregateQuery {
    pub fn kind(&self) -> AggregateKind {
        self.definition.kind
    }
}
