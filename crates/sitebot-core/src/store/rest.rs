//! PostgREST-backed [`Store`].
//!
//! Filters are encoded the PostgREST way (`name=ilike.jane*`,
//! `id=in.(1,2)`, `order=created_at.desc,id.desc`). Counts come from the
//! `Content-Range` header of a `Prefer: count=exact` request.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use super::{Filter, Query, Row, Store};
use crate::config::StoreConfig;
use crate::error::{Result, SiteError};

pub struct RestStore {
    client: Client,
    base: String,
    key: String,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: Client::new(),
            base: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            key: config.service_key.clone(),
        }
    }

    fn request(&self, method: reqwest::Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base, table))
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }
}

#[async_trait]
impl Store for RestStore {
    async fn insert(&self, table: &str, row: Row) -> Result<Row> {
        let resp = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&Value::Object(row))
            .send()
            .await?;
        let mut rows: Vec<Row> = check(resp).await?.json().await?;
        if rows.is_empty() {
            return Err(SiteError::Store {
                status: 200,
                body: format!("insert into {table} returned no row"),
            });
        }
        Ok(rows.remove(0))
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
        let resp = self
            .request(reqwest::Method::PATCH, table)
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&Value::Object(patch))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize> {
        let resp = self
            .request(reqwest::Method::DELETE, table)
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<Row> = check(resp).await?.json().await?;
        Ok(rows.len())
    }

    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let resp = self
            .request(reqwest::Method::GET, table)
            .query(&query_params(query))
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let resp = self
            .request(reqwest::Method::GET, table)
            .query(&[("select", "id"), ("limit", "1")])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let resp = check(resp).await?;
        let range = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        parse_content_range_total(range).ok_or_else(|| SiteError::Store {
            status: resp.status().as_u16(),
            body: format!("missing or malformed Content-Range: '{range}'"),
        })
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SiteError::Store {
        status: status.as_u16(),
        body,
    })
}

fn literal(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn list_literal(v: &Value) -> String {
    match v {
        Value::String(s) => format!("\"{}\"", s.replace('"', "\\\"")),
        other => other.to_string(),
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| match f {
            Filter::Eq(col, v) => (col.clone(), format!("eq.{}", literal(v))),
            Filter::ILike(col, pattern) => {
                (col.clone(), format!("ilike.{}", pattern.replace('%', "*")))
            }
            Filter::In(col, values) => {
                let items: Vec<String> = values.iter().map(list_literal).collect();
                (col.clone(), format!("in.({})", items.join(",")))
            }
            Filter::Lt(col, v) => (col.clone(), format!("lt.{}", literal(v))),
        })
        .collect()
}

fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];
    params.extend(filter_params(&query.filters));
    if !query.order.is_empty() {
        let order: Vec<String> = query
            .order
            .iter()
            .map(|o| {
                format!(
                    "{}.{}",
                    o.column,
                    if o.descending { "desc" } else { "asc" }
                )
            })
            .collect();
        params.push(("order".into(), order.join(",")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".into(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".into(), offset.to_string()));
    }
    params
}

/// `0-24/3573` → 3573, `*/0` → 0.
fn parse_content_range_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn store_for(server: &mockito::ServerGuard) -> RestStore {
        RestStore::new(&StoreConfig {
            url: server.url(),
            service_key: "svc".into(),
        })
    }

    #[test]
    fn content_range_parsing() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn query_params_encode_order_and_paging() {
        let q = Query::new()
            .filter(Filter::ilike("name", "jane%"))
            .filter(Filter::is_in("id", vec![json!(1), json!("x")]))
            .order_desc("created_at")
            .order_desc("id")
            .limit(1)
            .offset(50);
        let params = query_params(&q);
        assert!(params.contains(&("name".into(), "ilike.jane*".into())));
        assert!(params.contains(&("id".into(), "in.(1,\"x\")".into())));
        assert!(params.contains(&("order".into(), "created_at.desc,id.desc".into())));
        assert!(params.contains(&("limit".into(), "1".into())));
        assert!(params.contains(&("offset".into(), "50".into())));
    }

    #[tokio::test]
    async fn select_sends_auth_headers_and_filters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rest/v1/programs")
            .match_header("apikey", "svc")
            .match_header("authorization", "Bearer svc")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("select".into(), "*".into()),
                Matcher::UrlEncoded("order".into(), "sort_order.desc".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"id": 4, "sort_order": 7}]"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let rows = store
            .select("programs", &Query::new().order_desc("sort_order").limit(1))
            .await
            .unwrap();
        assert_eq!(rows[0]["sort_order"], 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn insert_returns_representation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rest/v1/stats")
            .match_header("prefer", "return=representation")
            .match_body(Matcher::Json(json!({"label": "Volunteers"})))
            .with_status(201)
            .with_body(r#"[{"id": 9, "label": "Volunteers"}]"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let row = store
            .insert(
                "stats",
                json!({"label": "Volunteers"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(row["id"], 9);
    }

    #[tokio::test]
    async fn error_status_becomes_store_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/rest/v1/events")
            .match_query(Matcher::UrlEncoded("slug".into(), "eq.gala".into()))
            .with_status(409)
            .with_body("conflict")
            .create_async()
            .await;

        let store = store_for(&server);
        let err = store
            .delete("events", &[Filter::eq("slug", "gala")])
            .await
            .unwrap_err();
        match err {
            SiteError::Store { status, body } => {
                assert_eq!(status, 409);
                assert_eq!(body, "conflict");
            }
            other => panic!("expected Store error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn count_reads_content_range() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rest/v1/team_members")
            .match_query(Matcher::Any)
            .match_header("prefer", "count=exact")
            .with_status(200)
            .with_header("content-range", "0-0/12")
            .with_body("[]")
            .create_async()
            .await;

        let store = store_for(&server);
        assert_eq!(store.count("team_members").await.unwrap(), 12);
    }
}
