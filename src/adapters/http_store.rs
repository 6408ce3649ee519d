use crate::core::catalog::{to_sql, ResponseFields};
use crate::domain::model::{AggregateRow, Gender, GroupKey, Rating, RowCount};
use crate::domain::ports::{ExecutionHandle, QueryStore, StoreResult};
use crate::domain::query::{AggregateQuery, Column, CountSemantics};
use crate::utils::error::StoreError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

#[derive(Debug, Deserialize)]
struct SqlResponse {
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

/// Runs rendered SQL against a SQL-over-HTTP endpoint that accepts
/// `{"query": ..., "params": [...]}` and answers `{"rows": [{...}]}`.
#[derive(Clone)]
pub struct HttpSqlStore {
    client: Client,
    endpoint: Url,
    auth_token: Option<String>,
    permits: Arc<Semaphore>,
    request_timeout: Duration,
}

impl HttpSqlStore {
    pub fn new(endpoint: Url, pool_size: usize, request_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            auth_token: None,
            permits: Arc::new(Semaphore::new(pool_size)),
            request_timeout,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

pub struct HttpHandle {
    store: HttpSqlStore,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl QueryStore for HttpSqlStore {
    type Handle = HttpHandle;

    async fn acquire(&self) -> StoreResult<HttpHandle> {
        let permit = tokio::time::timeout(self.request_timeout, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| StoreError::PoolExhausted(format!("waited {:?}", self.request_timeout)))?
            .map_err(|_| StoreError::Unavailable("pool closed".to_string()))?;
        Ok(HttpHandle {
            store: self.clone(),
            _permit: permit,
        })
    }
}

#[async_trait]
impl ExecutionHandle for HttpHandle {
    async fn run(&mut self, query: &AggregateQuery) -> StoreResult<Vec<AggregateRow>> {
        let store = &self.store;
        let body = serde_json::json!({
            "query": to_sql(query),
            "params": query.predicates.params.iter().map(|p| p.to_json()).collect::<Vec<_>>(),
        });

        tracing::debug!("POST {} for {}", store.endpoint, query.kind());
        let mut request = store
            .client
            .post(store.endpoint.clone())
            .timeout(store.request_timeout)
            .json(&body);
        if let Some(token) = &store.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(status, detail));
        }

        let payload: SqlResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        payload.rows.iter().map(|row| decode_row(query, row)).collect()
    }
}

fn classify_transport(error: reqwest::Error) -> StoreError {
    if error.is_timeout() {
        StoreError::Timeout(error.to_string())
    } else {
        StoreError::Unavailable(error.to_string())
    }
}

fn classify_status(status: StatusCode, detail: String) -> StoreError {
    let message = format!("{}: {}", status, detail);
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => StoreError::Timeout(message),
        StatusCode::TOO_MANY_REQUESTS => StoreError::PoolExhausted(message),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Constraint(message),
        s if s.is_server_error() => StoreError::Unavailable(message),
        _ => StoreError::Malformed(message),
    }
}

fn decode_count(row: &serde_json::Map<String, serde_json::Value>, field: &str) -> StoreResult<u64> {
    // bigint counts often arrive as strings
    match row.get(field) {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| StoreError::Decode(format!("missing or invalid '{}'", field)))
}

fn decode_text(row: &serde_json::Map<String, serde_json::Value>, field: &str) -> StoreResult<String> {
    match row.get(field) {
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
        _ => Err(StoreError::Decode(format!("missing or invalid '{}'", field))),
    }
}

fn decode_row(query: &AggregateQuery, row: &serde_json::Map<String, serde_json::Value>) -> StoreResult<AggregateRow> {
    let definition = &query.definition;
    let fields = ResponseFields::for_kind(definition.kind);

    let key = match definition.group_by {
        Column::SectionId => GroupKey::Section(decode_text(row, fields.key)?),
        Column::DistrictId => GroupKey::District(decode_text(row, fields.key)?),
        Column::AreaId => GroupKey::Area(decode_text(row, fields.key)?),
        Column::State => GroupKey::State(decode_text(row, fields.key)?),
        Column::Gender => {
            let text = decode_text(row, fields.key)?;
            let gender = text
                .parse::<Gender>()
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            GroupKey::Gender(gender)
        }
        Column::Rating => {
            let raw = row
                .get(fields.key)
                .cloned()
                .ok_or_else(|| StoreError::Decode(format!("missing '{}'", fields.key)))?;
            let rating: Rating =
                serde_json::from_value(raw).map_err(|e| StoreError::Decode(e.to_string()))?;
            GroupKey::Rating(rating)
        }
        other => {
            return Err(StoreError::Malformed(format!(
                "cannot group by {}",
                other.qualified()
            )))
        }
    };

    let count = match definition.count {
        CountSemantics::DistinctPlayers => RowCount::Players(decode_count(row, fields.count)?),
        CountSemantics::DistinctPlayersByGender => RowCount::ByGender {
            male: decode_count(row, fields.count)?,
            female: decode_count(row, fields.female_count.unwrap_or("female_count"))?,
        },
    };

    let name = fields
        .name
        .and_then(|field| row.get(field))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(AggregateRow { key, name, count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::AggregateCatalog;
    use crate::domain::model::{AggregateKind, FilterSpec};

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_transient());
        assert!(classify_status(StatusCode::GATEWAY_TIMEOUT, String::new()).is_transient());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, String::new()),
            StoreError::Constraint(_)
        ));
    }

    #[test]
    fn test_decode_rating_rows_from_numeric_columns() {
        let query = AggregateCatalog::default()
            .plan(AggregateKind::ByRating, &FilterSpec::new())
            .unwrap();
        let row = |raw: &str| serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw).unwrap();

        let decoded = decode_row(&query, &row(r#"{"rating": "3.50", "male_rating": 4, "female_rating": "2"}"#)).unwrap();
        assert_eq!(decoded, AggregateRow::rating(Rating::from_tenths(35), 4, 2));

        let decoded = decode_row(&query, &row(r#"{"rating": 4.0, "male_rating": 1, "female_rating": 0}"#)).unwrap();
        assert_eq!(decoded.key, GroupKey::Rating(Rating::from_tenths(40)));

        let off_grid = decode_row(&query, &row(r#"{"rating": 2.45, "male_rating": 1, "female_rating": 0}"#));
        assert!(matches!(off_grid, Err(StoreError::Decode(_))));
    }

    #[test]
    fn test_decode_count_accepts_strings() {
        let row: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(r#"{"gender_count": "12", "other": 3}"#).unwrap();
        assert_eq!(decode_count(&row, "gender_count").unwrap(), 12);
        assert_eq!(decode_count(&row, "other").unwrap(), 3);
        assert!(decode_count(&row, "missing").is_err());
    }
}
