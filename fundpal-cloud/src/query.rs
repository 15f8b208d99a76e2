//! Table names, equality filters and select queries understood by every
//! [`Backend`](crate::backend::Backend).

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A storage row: column name → JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Remote tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Funds,
    Groups,
    UserSettings,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Funds => "funds",
            Table::Groups => "groups",
            Table::UserSettings => "user_settings",
        }
    }

    /// Columns forming the table's unique key.
    pub fn key_columns(&self) -> &'static [&'static str] {
        match self {
            Table::Funds => &["user_id", "fund_code"],
            Table::Groups => &["user_id", "group_id"],
            Table::UserSettings => &["user_id"],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Renders a JSON value the way it appears in an equality filter.
pub fn filter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// `column = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column)
            .is_some_and(|v| filter_text(v) == self.value)
    }

    /// PostgREST query parameter form: (`column`, `eq.value`).
    pub fn to_param(&self) -> (String, String) {
        (self.column.clone(), format!("eq.{}", self.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A `SELECT *` over one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub table: Table,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }

    /// Query parameters for the REST gateway, `select=*` first.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(self.filters.iter().map(Filter::to_param));
        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

/// Key identifying a row within its table, built from [`Table::key_columns`].
pub fn row_key(table: Table, row: &Row) -> String {
    table
        .key_columns()
        .iter()
        .map(|c| row.get(*c).map(filter_text).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\u{1f}")
}
