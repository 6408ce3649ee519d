use crate::utils::error::{Result, StatsError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            other => Err(StatsError::InvalidFilterValue {
                field: FilterField::Gender,
                value: other.to_string(),
                reason: "expected Male or Female".to_string(),
            }),
        }
    }
}

/// Skill rating held in tenths so that it orders and hashes exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rating(u16);

impl Rating {
    pub const MIN: Rating = Rating(25);
    pub const MAX: Rating = Rating(55);

    pub fn from_tenths(tenths: u16) -> Self {
        Rating(tenths)
    }

    pub fn tenths(&self) -> u16 {
        self.0
    }

    pub fn value(&self) -> f64 {
        f64::from(self.0) / 10.0
    }

    /// True for the ratings the dashboard reports: 2.5 through 5.5 in half steps.
    pub fn in_domain(&self) -> bool {
        *self >= Self::MIN && *self <= Self::MAX && self.0 % 5 == 0
    }

    /// Parses an exact decimal that is a whole number of tenths ("3", "3.5",
    /// "3.50"). Anything finer, such as "2.45", is rejected rather than rounded.
    pub fn parse(s: &str) -> Option<Self> {
        let value = Decimal::from_str(s.trim()).ok()?;
        let tenths = value.checked_mul(Decimal::TEN)?;
        if !tenths.fract().is_zero() {
            return None;
        }
        tenths.to_u16().map(Rating)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl FromStr for Rating {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match Rating::parse(s) {
            Some(rating) if rating.in_domain() => Ok(rating),
            _ => Err(StatsError::InvalidFilterValue {
                field: FilterField::Rating,
                value: s.to_string(),
                reason: "expected one of 2.5, 3.0, 3.5, 4.0, 4.5, 5.0, 5.5".to_string(),
            }),
        }
    }
}

impl Serialize for Rating {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        // numbers go through their shortest decimal text, never through rounding
        let text = match &raw {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return Err(serde::de::Error::custom("rating must be a number or string")),
        };
        Rating::parse(&text).ok_or_else(|| serde::de::Error::custom(format!("bad rating '{}'", text)))
    }
}

/// The five filter dimensions in their binding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterField {
    Section,
    District,
    Area,
    Gender,
    Rating,
}

impl FilterField {
    pub const ORDER: [FilterField; 5] = [
        FilterField::Section,
        FilterField::District,
        FilterField::Area,
        FilterField::Gender,
        FilterField::Rating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::Section => "section",
            FilterField::District => "district",
            FilterField::Area => "area",
            FilterField::Gender => "gender",
            FilterField::Rating => "rating",
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterValue {
    Id(String),
    Gender(Gender),
    Rating(Rating),
}

impl FilterValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FilterValue::Id(id) => serde_json::Value::String(id.clone()),
            FilterValue::Gender(g) => serde_json::Value::String(g.to_string()),
            FilterValue::Rating(r) => serde_json::Value::String(r.to_string()),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Id(id) => f.write_str(id),
            FilterValue::Gender(g) => write!(f, "{}", g),
            FilterValue::Rating(r) => write!(f, "{}", r),
        }
    }
}

/// The active filter combination. Any subset of fields may be set; the
/// cascade ordering between section, district and area is not assumed here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FilterSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_district(mut self, district: impl Into<String>) -> Self {
        self.district = Some(district.into());
        self
    }

    pub fn with_area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn with_rating(mut self, rating: Rating) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn get(&self, field: FilterField) -> Option<FilterValue> {
        match field {
            FilterField::Section => self.section.clone().map(FilterValue::Id),
            FilterField::District => self.district.clone().map(FilterValue::Id),
            FilterField::Area => self.area.clone().map(FilterValue::Id),
            FilterField::Gender => self.gender.map(FilterValue::Gender),
            FilterField::Rating => self.rating.map(FilterValue::Rating),
        }
    }

    pub fn is_set(&self, field: FilterField) -> bool {
        match field {
            FilterField::Section => self.section.is_some(),
            FilterField::District => self.district.is_some(),
            FilterField::Area => self.area.is_some(),
            FilterField::Gender => self.gender.is_some(),
            FilterField::Rating => self.rating.is_some(),
        }
    }

    /// Present fields in binding order.
    pub fn active_fields(&self) -> Vec<FilterField> {
        FilterField::ORDER
            .into_iter()
            .filter(|field| self.is_set(*field))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active_fields().is_empty()
    }

    /// Parses `section=S1&gender=Male&rating=3.5`. Empty values leave the
    /// field unset and unknown keys are ignored.
    pub fn from_query(query: &str) -> Result<Self> {
        let mut spec = FilterSpec::new();
        let query = query.trim_start_matches('?');
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "section" => spec.section = Some(value.to_string()),
                "district" => spec.district = Some(value.to_string()),
                "area" => spec.area = Some(value.to_string()),
                "gender" => spec.gender = Some(value.parse()?),
                "rating" => spec.rating = Some(value.parse()?),
                other => tracing::debug!("Ignoring unknown filter parameter '{}'", other),
            }
        }
        Ok(spec)
    }

    pub fn to_query(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for field in self.active_fields() {
            if let Some(value) = self.get(field) {
                serializer.append_pair(field.as_str(), &value.to_string());
            }
        }
        serializer.finish()
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let query = self.to_query();
        if query.is_empty() {
            f.write_str("{}")
        } else {
            f.write_str(&query)
        }
    }
}

/// The six fixed aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregateKind {
    BySection,
    ByDistrict,
    ByArea,
    ByGender,
    ByRating,
    ByState,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 6] = [
        AggregateKind::BySection,
        AggregateKind::ByDistrict,
        AggregateKind::ByArea,
        AggregateKind::ByGender,
        AggregateKind::ByRating,
        AggregateKind::ByState,
    ];

    pub const CROSS_CUTTING: [AggregateKind; 3] = [
        AggregateKind::ByGender,
        AggregateKind::ByRating,
        AggregateKind::ByState,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::BySection => "by-section",
            AggregateKind::ByDistrict => "by-district",
            AggregateKind::ByArea => "by-area",
            AggregateKind::ByGender => "by-gender",
            AggregateKind::ByRating => "by-rating",
            AggregateKind::ByState => "by-state",
        }
    }

    pub fn is_hierarchy(&self) -> bool {
        matches!(
            self,
            AggregateKind::BySection | AggregateKind::ByDistrict | AggregateKind::ByArea
        )
    }
}

impl FromStr for AggregateKind {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        AggregateKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| StatsError::UnknownAggregate { name: s.to_string() })
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Player {
    pub id: String,
    pub gender: Gender,
    pub rating: Rating,
    pub state: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Membership {
    pub player_id: String,
    pub section_id: String,
    pub district_id: String,
    pub area_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HierarchyNode {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    Section(String),
    District(String),
    Area(String),
    Gender(Gender),
    Rating(Rating),
    State(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    Players(u64),
    ByGender { male: u64, female: u64 },
}

impl RowCount {
    pub fn total(&self) -> u64 {
        match self {
            RowCount::Players(n) => *n,
            RowCount::ByGender { male, female } => male + female,
        }
    }
}

/// One group of an aggregate result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    pub key: GroupKey,
    pub name: Option<String>,
    pub count: RowCount,
}

impl AggregateRow {
    pub fn players(key: GroupKey, count: u64) -> Self {
        Self {
            key,
            name: None,
            count: RowCount::Players(count),
        }
    }

    pub fn named(key: GroupKey, name: Option<String>, count: u64) -> Self {
        Self {
            key,
            name,
            count: RowCount::Players(count),
        }
    }

    pub fn rating(rating: Rating, male: u64, female: u64) -> Self {
        Self {
            key: GroupKey::Rating(rating),
            name: None,
            count: RowCount::ByGender { male, female },
        }
    }

    pub fn total(&self) -> u64 {
        self.count.total()
    }

    /// Renders the row with the field names each aggregate responds with.
    pub fn to_response(&self) -> serde_json::Value {
        use serde_json::json;
        let count = self.total();
        match (&self.key, &self.count) {
            (GroupKey::Section(id), _) => {
                json!({ "section_id": id, "section_count": count, "section_name": self.name })
            }
            (GroupKey::District(id), _) => {
                json!({ "district_id": id, "district_name": self.name, "count": count })
            }
            (GroupKey::Area(id), _) => {
                json!({ "area_id": id, "area_name": self.name, "count": count })
            }
            (GroupKey::Gender(g), _) => json!({ "gender": g, "gender_count": count }),
            (GroupKey::Rating(r), RowCount::ByGender { male, female }) => {
                json!({ "rating": r, "male_rating": male, "female_rating": female })
            }
            (GroupKey::Rating(r), RowCount::Players(n)) => {
                json!({ "rating": r, "male_rating": n, "female_rating": 0 })
            }
            (GroupKey::State(s), _) => json!({ "state": s, "state_count": count }),
        }
    }
}

impl Serialize for AggregateRow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_response().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_parse_and_domain() {
        assert_eq!(Rating::parse("3.5"), Some(Rating::from_tenths(35)));
        assert_eq!(Rating::parse("4"), Some(Rating::from_tenths(40)));
        assert_eq!(Rating::parse("3.25"), None);
        assert_eq!(Rating::parse("abc"), None);
        assert!(Rating::from_tenths(25).in_domain());
        assert!(!Rating::from_tenths(60).in_domain());
        assert!(!Rating::from_tenths(37).in_domain());
        assert!("6.0".parse::<Rating>().is_err());
        assert_eq!("5.5".parse::<Rating>().unwrap().to_string(), "5.5");
    }

    #[test]
    fn test_rating_accepts_any_scale_of_exact_tenths() {
        assert_eq!(Rating::parse("3.50"), Some(Rating::from_tenths(35)));
        assert_eq!(Rating::parse("4.000"), Some(Rating::from_tenths(40)));
        assert_eq!(Rating::parse("2.45"), None);
        assert_eq!(Rating::parse("-3.5"), None);
        assert_eq!("3.50".parse::<Rating>().unwrap(), Rating::from_tenths(35));
    }

    #[test]
    fn test_rating_deserialize_never_rounds() {
        let from = |raw: &str| serde_json::from_str::<Rating>(raw);

        assert_eq!(from(r#""3.50""#).unwrap(), Rating::from_tenths(35));
        assert_eq!(from(r#""4""#).unwrap(), Rating::from_tenths(40));
        assert_eq!(from("4.0").unwrap(), Rating::from_tenths(40));
        assert_eq!(from("4").unwrap(), Rating::from_tenths(40));
        assert_eq!(from("2.5").unwrap(), Rating::from_tenths(25));
        assert!(from("2.45").is_err());
        assert!(from(r#""2.45""#).is_err());
        assert!(from("true").is_err());
    }

    #[test]
    fn test_aggregate_kind_names() {
        for kind in AggregateKind::ALL {
            assert_eq!(kind.as_str().parse::<AggregateKind>().unwrap(), kind);
        }
        let err = "by-player".parse::<AggregateKind>().unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_filter_spec_from_query() {
        let spec = FilterSpec::from_query("?section=S1&district=&gender=Male&rating=3.0&page=2").unwrap();
        assert_eq!(spec.section.as_deref(), Some("S1"));
        assert_eq!(spec.district, None);
        assert_eq!(spec.gender, Some(Gender::Male));
        assert_eq!(spec.rating, Some(Rating::from_tenths(30)));
        assert_eq!(
            spec.active_fields(),
            vec![FilterField::Section, FilterField::Gender, FilterField::Rating]
        );
        assert_eq!(spec.to_query(), "section=S1&gender=Male&rating=3.0");
    }

    #[test]
    fn test_filter_spec_rejects_bad_values() {
        assert!(FilterSpec::from_query("gender=Other").is_err());
        assert!(FilterSpec::from_query("rating=7.5").is_err());
        assert!(FilterSpec::from_query("").unwrap().is_empty());
    }

    #[test]
    fn test_row_response_field_names() {
        let row = AggregateRow::named(GroupKey::Section("S1".into()), Some("Texas".into()), 12);
        assert_eq!(
            row.to_response(),
            serde_json::json!({ "section_id": "S1", "section_count": 12, "section_name": "Texas" })
        );

        let rating = AggregateRow::rating(Rating::from_tenths(35), 4, 6);
        assert_eq!(rating.total(), 10);
        assert_eq!(
            rating.to_response(),
            serde_json::json!({ "rating": 3.5, "male_rating": 4, "female_rating": 6 })
        );
    }
}
