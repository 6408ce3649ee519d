use crate::core::predicate::PredicateBuilder;
use crate::domain::model::{AggregateKind, AggregateRow, FilterField, FilterSpec, GroupKey, Rating};
use crate::domain::query::{
    AggregateDefinition, AggregateQuery, Column, CountSemantics, JoinShape, Restriction,
    ResultOrder,
};
use crate::utils::error::{Result, StatsError};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

pub const DEFAULT_STATE_COUNTRY: &str = "US";
pub const DEFAULT_STATE_MIN_GROUP: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Country whose players the by-state aggregate reports.
    pub state_country: String,
    /// by-state drops groups whose count is at or below this.
    pub state_min_group: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            state_country: DEFAULT_STATE_COUNTRY.to_string(),
            state_min_group: DEFAULT_STATE_MIN_GROUP,
        }
    }
}

/// Column aliases an aggregate responds with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFields {
    pub key: &'static str,
    pub count: &'static str,
    pub name: Option<&'static str>,
    pub female_count: Option<&'static str>,
}

impl ResponseFields {
    pub fn for_kind(kind: AggregateKind) -> Self {
        let (key, count, name, female_count) = match kind {
            AggregateKind::BySection => ("section_id", "section_count", Some("section_name"), None),
            AggregateKind::ByDistrict => ("district_id", "count", Some("district_name"), None),
            AggregateKind::ByArea => ("area_id", "count", Some("area_name"), None),
            AggregateKind::ByGender => ("gender", "gender_count", None, None),
            AggregateKind::ByRating => ("rating", "male_rating", None, Some("female_rating")),
            AggregateKind::ByState => ("state", "state_count", None, None),
        };
        Self {
            key,
            count,
            name,
            female_count,
        }
    }
}

/// The six aggregate definitions and the rules that plan and finish them.
#[derive(Debug, Clone)]
pub struct AggregateCatalog {
    definitions: Vec<AggregateDefinition>,
}

impl Default for AggregateCatalog {
    fn default() -> Self {
        Self::new(&CatalogSettings::default())
    }
}

impl AggregateCatalog {
    pub fn new(settings: &CatalogSettings) -> Self {
        let hierarchy = |kind: AggregateKind,
                         group_by: Column,
                         names: &'static str,
                         required: &'static [FilterField]| AggregateDefinition {
            kind,
            group_by,
            names: Some(names),
            required,
            join: JoinShape::MembershipsWithPlayers,
            count: CountSemantics::DistinctPlayers,
            restrictions: Vec::new(),
            min_group_exclusive: None,
            order: ResultOrder::CountDesc,
        };

        let definitions = vec![
            hierarchy(AggregateKind::BySection, Column::SectionId, "sections", &[]),
            hierarchy(
                AggregateKind::ByDistrict,
                Column::DistrictId,
                "districts",
                &[FilterField::Section],
            ),
            hierarchy(
                AggregateKind::ByArea,
                Column::AreaId,
                "areas",
                &[FilterField::Section, FilterField::District],
            ),
            AggregateDefinition {
                kind: AggregateKind::ByGender,
                group_by: Column::Gender,
                names: None,
                required: &[],
                join: JoinShape::PlayersWithMemberships,
                count: CountSemantics::DistinctPlayers,
                restrictions: Vec::new(),
                min_group_exclusive: None,
                order: ResultOrder::CountDesc,
            },
            AggregateDefinition {
                kind: AggregateKind::ByRating,
                group_by: Column::Rating,
                names: None,
                required: &[],
                join: JoinShape::PlayersWithMemberships,
                count: CountSemantics::DistinctPlayersByGender,
                restrictions: vec![Restriction::RatingBetween(Rating::MIN, Rating::MAX)],
                min_group_exclusive: None,
                order: ResultOrder::KeyAsc,
            },
            AggregateDefinition {
                kind: AggregateKind::ByState,
                group_by: Column::State,
                names: None,
                required: &[],
                join: JoinShape::PlayersWithMemberships,
                count: CountSemantics::DistinctPlayers,
                restrictions: vec![Restriction::CountryEquals(settings.state_country.clone())],
                min_group_exclusive: Some(settings.state_min_group),
                order: ResultOrder::CountDesc,
            },
        ];

        Self { definitions }
    }

    pub fn definition(&self, kind: AggregateKind) -> &AggregateDefinition {
        // definitions are laid out in AggregateKind::ALL order
        &self.definitions[kind as usize]
    }

    pub fn definitions(&self) -> &[AggregateDefinition] {
        &self.definitions
    }

    /// Checks the aggregate's required filters and builds its predicates.
    pub fn plan(&self, kind: AggregateKind, spec: &FilterSpec) -> Result<AggregateQuery> {
        let definition = self.definition(kind);
        if let Some(missing) = definition.required.iter().find(|f| !spec.is_set(**f)) {
            return Err(StatsError::MissingFilter {
                aggregate: kind,
                missing: *missing,
            });
        }

        let predicates = PredicateBuilder::build(spec, definition)?;
        tracing::debug!(
            "Planned {} with {} predicate(s) for {}",
            kind,
            predicates.len(),
            spec
        );
        Ok(AggregateQuery {
            definition: definition.clone(),
            predicates,
        })
    }
}

/// Applies a definition's restrictions, post-filter and ordering to rows a
/// store returned.
pub fn normalize_rows(definition: &AggregateDefinition, mut rows: Vec<AggregateRow>) -> Vec<AggregateRow> {
    for restriction in &definition.restrictions {
        if let Restriction::RatingBetween(low, high) = restriction {
            rows.retain(|row| match &row.key {
                GroupKey::Rating(r) => r >= low && r <= high,
                _ => true,
            });
        }
    }

    if let Some(min) = definition.min_group_exclusive {
        rows.retain(|row| row.total() > min);
    }

    match definition.order {
        ResultOrder::CountDesc => {
            rows.sort_by(|a, b| (Reverse(a.total()), &a.key).cmp(&(Reverse(b.total()), &b.key)))
        }
        ResultOrder::KeyAsc => rows.sort_by(|a, b| a.key.cmp(&b.key)),
    }
    rows
}

/// Renders a planned query as PostgreSQL with `$n` placeholders, aliasing
/// columns with the aggregate's response field names.
pub fn to_sql(query: &AggregateQuery) -> String {
    let definition = &query.definition;
    let fields = ResponseFields::for_kind(definition.kind);
    let key = definition.group_by.qualified();
    let player = definition.join.player_column();

    let mut select = vec![format!("{} AS {}", key, fields.key)];
    match definition.count {
        CountSemantics::DistinctPlayers => {
            select.push(format!("COUNT(DISTINCT {}) AS {}", player, fields.count));
        }
        CountSemantics::DistinctPlayersByGender => {
            select.push(format!(
                "COUNT(DISTINCT {}) FILTER (WHERE p.gender = 'Male') AS {}",
                player, fields.count
            ));
            select.push(format!(
                "COUNT(DISTINCT {}) FILTER (WHERE p.gender = 'Female') AS {}",
                player,
                fields.female_count.unwrap_or("female_count")
            ));
        }
    }

    let mut from = match definition.join {
        JoinShape::MembershipsWithPlayers => {
            "FROM player_sections ps\nLEFT JOIN players p ON p.id = ps.player_id".to_string()
        }
        JoinShape::PlayersWithMemberships => {
            "FROM players p\nLEFT JOIN player_sections ps ON ps.player_id = p.id".to_string()
        }
        JoinShape::PlayersOnly => "FROM players p".to_string(),
    };

    let mut group_by = vec![key.clone()];
    if let (Some(table), Some(name)) = (definition.names, fields.name) {
        from.push_str(&format!(
            "\nLEFT JOIN {table} n ON n.{col} = {key}",
            col = definition.group_by.name()
        ));
        select.push(format!("n.{name} AS {name}"));
        group_by.push(format!("n.{}", name));
    }

    let mut conditions = Vec::new();
    for restriction in &definition.restrictions {
        match restriction {
            Restriction::RatingBetween(low, high) => {
                conditions.push(format!("p.rating BETWEEN {} AND {}", low, high));
            }
            Restriction::CountryEquals(country) => {
                conditions.push(format!("p.country = '{}'", country.replace('\'', "''")));
            }
        }
    }
    for predicate in &query.predicates.predicates {
        conditions.push(format!("{} = ${}", predicate.column.qualified(), predicate.slot));
    }

    let mut sql = format!("SELECT {}\n{}", select.join(", "), from);
    if !conditions.is_empty() {
        sql.push_str(&format!("\nWHERE {}", conditions.join(" AND ")));
    }
    sql.push_str(&format!("\nGROUP BY {}", group_by.join(", ")));
    if let Some(min) = definition.min_group_exclusive {
        sql.push_str(&format!("\nHAVING COUNT(DISTINCT {}) > {}", player, min));
    }
    match definition.order {
        ResultOrder::CountDesc => {
            sql.push_str(&format!("\nORDER BY {} DESC, {} ASC", fields.count, key));
        }
        ResultOrder::KeyAsc => sql.push_str(&format!("\nORDER BY {} ASC", key)),
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Gender;

    #[test]
    fn test_definitions_are_indexed_by_kind() {
        let catalog = AggregateCatalog::default();
        for kind in AggregateKind::ALL {
            assert_eq!(catalog.definition(kind).kind, kind);
        }
        assert!(catalog
            .definitions()
            .iter()
            .all(|d| d.count == CountSemantics::DistinctPlayers
                || d.count == CountSemantics::DistinctPlayersByGender));
    }

    #[test]
    fn test_required_filters() {
        let catalog = AggregateCatalog::default();

        let err = catalog.plan(AggregateKind::ByDistrict, &FilterSpec::new()).unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = catalog
            .plan(AggregateKind::ByArea, &FilterSpec::new().with_section("S1"))
            .unwrap_err();
        match err {
            StatsError::MissingFilter { missing, .. } => assert_eq!(missing, FilterField::District),
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(catalog
            .plan(AggregateKind::ByArea, &FilterSpec::new().with_section("S1").with_district("D1"))
            .is_ok());
        for kind in [
            AggregateKind::BySection,
            AggregateKind::ByGender,
            AggregateKind::ByRating,
            AggregateKind::ByState,
        ] {
            assert!(catalog.plan(kind, &FilterSpec::new()).is_ok());
        }
    }

    #[test]
    fn test_district_sql_binds_in_filter_order() {
        let catalog = AggregateCatalog::default();
        let spec = FilterSpec::new().with_section("S1").with_gender(Gender::Male);
        let query = catalog.plan(AggregateKind::ByDistrict, &spec).unwrap();
        let sql = to_sql(&query);

        assert!(sql.contains("COUNT(DISTINCT ps.player_id) AS count"));
        assert!(sql.contains("WHERE ps.section_id = $1 AND p.gender = $2"));
        assert!(sql.contains("n.district_name AS district_name"));
        assert!(sql.contains("ORDER BY count DESC"));
        assert!(!sql.contains("$3"));
    }

    #[test]
    fn test_rating_sql_binds_gender_as_parameter() {
        let catalog = AggregateCatalog::default();
        let spec = FilterSpec::new().with_gender(Gender::Female);
        let sql = to_sql(&catalog.plan(AggregateKind::ByRating, &spec).unwrap());

        assert!(sql.contains("p.rating BETWEEN 2.5 AND 5.5"));
        assert!(sql.contains("p.gender = $1"));
        assert!(sql.contains("ORDER BY p.rating ASC"));
    }

    #[test]
    fn test_state_sql_has_country_and_having() {
        let sql = to_sql(&AggregateCatalog::default().plan(AggregateKind::ByState, &FilterSpec::new()).unwrap());
        assert!(sql.contains("WHERE p.country = 'US'"));
        assert!(sql.contains("HAVING COUNT(DISTINCT p.id) > 5"));
    }

    #[test]
    fn test_normalize_orders_and_filters() {
        let catalog = AggregateCatalog::default();

        let states = vec![
            AggregateRow::players(GroupKey::State("TX".into()), 9),
            AggregateRow::players(GroupKey::State("RI".into()), 5),
            AggregateRow::players(GroupKey::State("CA".into()), 30),
            AggregateRow::players(GroupKey::State("AZ".into()), 9),
        ];
        let rows = normalize_rows(catalog.definition(AggregateKind::ByState), states);
        let keys: Vec<_> = rows.iter().map(|r| r.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                GroupKey::State("CA".into()),
                GroupKey::State("AZ".into()),
                GroupKey::State("TX".into()),
            ]
        );

        let ratings = vec![
            AggregateRow::rating(Rating::from_tenths(45), 1, 1),
            AggregateRow::rating(Rating::from_tenths(60), 3, 0),
            AggregateRow::rating(Rating::from_tenths(30), 8, 2),
        ];
        let rows = normalize_rows(catalog.definition(AggregateKind::ByRating), ratings);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, GroupKey::Rating(Rating::from_tenths(30)));
        assert_eq!(rows[1].key, GroupKey::Rating(Rating::from_tenths(45)));
    }
}
