//! PostgREST query builder.
//!
//! Filters, ordering and limits are encoded as query parameters following
//! PostgREST's conventions (`column=op.value`, `order=column.desc`,
//! `or=(a.eq.x,b.eq.y)`).

use std::fmt::Display;

use reqwest::{Client, Method, header};
use serde::de::DeserializeOwned;

use super::{PostgrestError, response};

/// Accept header value asking PostgREST for a single JSON object.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Characters that must be quoted inside logical-operator filters.
const RESERVED: &[char] = &[',', '.', ':', '(', ')', '"', '\\'];

/// One `column.op.value` term of an `or=(...)` filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: String,
    pub op: &'static str,
    pub value: String,
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Display) -> Self {
        Self { column: column.into(), op: "eq", value: value.to_string() }
    }

    fn encode(&self) -> String {
        format!("{}.{}.{}", self.column, self.op, quote(&self.value))
    }
}

/// Double-quote a value for use inside `or=(...)` when it contains
/// reserved characters or whitespace.
fn quote(value: &str) -> String {
    if !value.contains(RESERVED) && !value.contains(char::is_whitespace) {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// A single PostgREST request under construction.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    http: Client,
    url: String,
    schema: Option<String>,
    method: Method,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    single: bool,
    return_representation: bool,
}

impl QueryBuilder {
    pub(crate) fn new(http: Client, url: String, schema: Option<String>) -> Self {
        Self {
            http,
            url,
            schema,
            method: Method::GET,
            query: Vec::new(),
            body: None,
            single: false,
            return_representation: false,
        }
    }

    pub(crate) fn rpc(mut self, params: serde_json::Value) -> Self {
        self.method = Method::POST;
        self.body = Some(params);
        self
    }

    /// Columns to return. Accepts aliases (`alias:column`) and embedded
    /// resources (`keys:fk_name(a,b)`); whitespace is stripped.
    pub fn select(mut self, columns: &str) -> Self {
        let columns: String = columns.chars().filter(|c| !c.is_whitespace()).collect();
        self.query.push(("select".to_string(), columns));
        self
    }

    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn lt(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "lt", value)
    }

    pub fn is_null(self, column: &str) -> Self {
        self.filter(column, "is", "null")
    }

    /// Raw `column=op.value` filter. `column` may name an embedded resource
    /// (`keys.deleted_at`) to filter the embedded rows.
    pub fn filter(mut self, column: &str, op: &str, value: impl Display) -> Self {
        self.query.push((column.to_string(), format!("{op}.{value}")));
        self
    }

    /// Match rows satisfying any of the conditions.
    pub fn or(mut self, conditions: &[Condition]) -> Self {
        let terms: Vec<String> = conditions.iter().map(Condition::encode).collect();
        self.query.push(("or".to_string(), format!("({})", terms.join(","))));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.query.push(("order".to_string(), format!("{column}.{direction}")));
        self
    }

    pub fn limit(mut self, count: u32) -> Self {
        self.query.push(("limit".to_string(), count.to_string()));
        self
    }

    /// Expect exactly one row; zero rows becomes a 406 `PGRST116` error.
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Insert a row and ask for it back.
    pub fn insert(mut self, row: serde_json::Value) -> Self {
        self.method = Method::POST;
        self.body = Some(row);
        self.return_representation = true;
        self
    }

    /// Update matching rows and ask for them back.
    pub fn update(mut self, values: serde_json::Value) -> Self {
        self.method = Method::PATCH;
        self.body = Some(values);
        self.return_representation = true;
        self
    }

    /// Send the request and decode the body.
    ///
    /// `Ok(None)` means a successful response without data.
    pub async fn execute<T: DeserializeOwned>(self) -> Result<Option<T>, PostgrestError> {
        let mut request = self.http.request(self.method.clone(), &self.url).query(&self.query);

        if let Some(schema) = &self.schema {
            let profile = if self.method == Method::GET { "Accept-Profile" } else { "Content-Profile" };
            request = request.header(profile, schema);
        }
        if self.single {
            request = request.header(header::ACCEPT, SINGLE_OBJECT);
        }
        if self.return_representation {
            request = request.header("Prefer", "return=representation");
        }
        if let Some(body) = &self.body {
            request = request.json(body);
        }

        tracing::debug!(method = %self.method, url = %self.url, schema = ?self.schema, "postgrest request");

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        tracing::debug!(status = status.as_u16(), bytes = bytes.len(), "postgrest response");

        if !status.is_success() {
            return Err(response::api_error(status.as_u16(), &bytes));
        }

        response::decode(&bytes)
    }
}
