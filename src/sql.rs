use chrono::{DateTime, NaiveDate, NaiveDateTime};
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;
use crate::room::{Room, RoomError};
use crate::slots::{parse_day_or, today};

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    UpsertAppointments(Vec<Appointment>),
    UpdateRoom {
        id: String,
        room: Room,
        date: NaiveDate,
    },
    DeleteAppointment {
        id: String,
    },
    SelectEvents {
        date: NaiveDate,
    },
    /// The whole positioned day as one JSON document.
    SelectDay {
        date: NaiveDate,
    },
    SelectTherapists {
        date: NaiveDate,
    },
    SelectSlots {
        date: NaiveDate,
    },
    SelectUnassigned {
        date: NaiveDate,
    },
    SelectStatus,
}

/// Tables a `SELECT` can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultTable {
    Events,
    Day,
    Therapists,
    Slots,
    Unassigned,
    Status,
}

impl ResultTable {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "events" => Some(ResultTable::Events),
            "day" => Some(ResultTable::Day),
            "therapists" => Some(ResultTable::Therapists),
            "slots" => Some(ResultTable::Slots),
            "unassigned" => Some(ResultTable::Unassigned),
            "status" => Some(ResultTable::Status),
            _ => None,
        }
    }
}

/// Column order for `INSERT INTO appointments` without a column list.
const APPOINTMENT_COLUMNS: [&str; 9] = [
    "id", "therapist", "start_at", "end_at", "customer", "service", "type", "room", "reason",
];

const ROOM_ASSIGNMENT_COLUMNS: [&str; 3] = ["booking_id", "room", "date"];

/// Parse a query; a missing or malformed `date` filter means today.
pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    parse_sql_at(sql, today())
}

/// Parse a query, resolving a missing or malformed `date` filter to `fallback`.
pub fn parse_sql_at(sql: &str, fallback: NaiveDate) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query, fallback),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Which table a `SELECT` reads, without interpreting its filters.
///
/// Used to describe result columns before parameters are bound.
pub fn select_target(sql: &str) -> Option<ResultTable> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).ok()?;
    let Some(Statement::Query(query)) = stmts.first() else {
        return None;
    };
    let SetExpr::Select(select) = query.body.as_ref() else {
        return None;
    };
    let table = table_factor_name(&select.from.first()?.relation).ok()?;
    ResultTable::from_name(&table)
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();
    let rows = extract_all_insert_rows(insert)?;

    match table.as_str() {
        "appointments" => {
            let mut appointments = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                let appt = parse_appointment_row(&columns, row).map_err(|e| match e {
                    SqlError::Parse(msg) if rows.len() > 1 => SqlError::Parse(format!("row {i}: {msg}")),
                    other => other,
                })?;
                appointments.push(appt);
            }
            Ok(Command::UpsertAppointments(appointments))
        }
        "room_assignments" => {
            if rows.len() != 1 {
                return Err(SqlError::Unsupported("one room assignment per statement".into()));
            }
            let row = named_row(&columns, &rows[0], &ROOM_ASSIGNMENT_COLUMNS)?;
            let id = parse_string(require(&row, "booking_id")?)?;
            let room_text = parse_string(require(&row, "room")?)?;
            let room = room_text.parse::<Room>().map_err(SqlError::InvalidRoom)?;
            let date_text = parse_string(require(&row, "date")?)?;
            let date = NaiveDate::parse_from_str(date_text.trim(), "%Y-%m-%d")
                .map_err(|e| SqlError::Parse(format!("bad date {date_text:?}: {e}")))?;
            Ok(Command::UpdateRoom { id, room, date })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_appointment_row(columns: &[String], values: &[Expr]) -> Result<Appointment, SqlError> {
    let row = named_row(columns, values, &APPOINTMENT_COLUMNS)?;
    let mut appt = Appointment::new(
        parse_string(require(&row, "id")?)?,
        parse_string(require(&row, "therapist")?)?,
        parse_timestamp_expr(require(&row, "start_at")?)?,
        parse_timestamp_expr(require(&row, "end_at")?)?,
    );
    if let Some(expr) = lookup(&row, "customer") {
        appt.customer = parse_string_or_null(expr)?.unwrap_or_default();
    }
    if let Some(expr) = lookup(&row, "service") {
        appt.service = parse_string_or_null(expr)?.unwrap_or_default();
    }
    if let Some(expr) = lookup(&row, "type")
        && let Some(text) = parse_string_or_null(expr)?
    {
        appt.kind = AppointmentKind::parse(&text)
            .ok_or_else(|| SqlError::Parse(format!("bad appointment type: {text:?}")))?;
    }
    if let Some(expr) = lookup(&row, "room")
        && let Some(text) = parse_string_or_null(expr)?
    {
        appt.room = text.parse().map_err(SqlError::InvalidRoom)?;
    }
    if let Some(expr) = lookup(&row, "reason") {
        appt.reason = parse_string_or_null(expr)?.filter(|r| !r.is_empty());
    }
    Ok(appt)
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;

    match table.as_str() {
        "appointments" => {
            let selection = delete.selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
            let id = extract_eq_filter(selection, &["id"])
                .ok_or(SqlError::MissingFilter("id"))?;
            Ok(Command::DeleteAppointment { id: parse_string(id)? })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query, fallback: NaiveDate) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let target = ResultTable::from_name(&table).ok_or(SqlError::UnknownTable(table))?;

    let date = match select
        .selection
        .as_ref()
        .and_then(|s| extract_eq_filter(s, &["date", "day"]))
    {
        Some(expr) => parse_day_or(&parse_string(expr)?, fallback),
        None => fallback,
    };

    Ok(match target {
        ResultTable::Events => Command::SelectEvents { date },
        ResultTable::Day => Command::SelectDay { date },
        ResultTable::Therapists => Command::SelectTherapists { date },
        ResultTable::Slots => Command::SelectSlots { date },
        ResultTable::Unassigned => Command::SelectUnassigned { date },
        ResultTable::Status => Command::SelectStatus,
    })
}

/// Find `column = value` anywhere in an AND chain.
fn extract_eq_filter<'a>(expr: &'a Expr, names: &[&str]) -> Option<&'a Expr> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                extract_eq_filter(left, names).or_else(|| extract_eq_filter(right, names))
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)?;
                names.contains(&col.as_str()).then_some(right.as_ref())
            }
            _ => None,
        },
        Expr::Nested(inner) => extract_eq_filter(inner, names),
        _ => None,
    }
}

// ── Timestamps ────────────────────────────────────────────────

/// Parse an ISO-8601 local date-time to wall-clock `Ms`.
///
/// A trailing `Z` or UTC offset is accepted and ignored: the written
/// wall-clock time is what lands on the grid.
pub fn parse_timestamp(text: &str) -> Result<Ms, SqlError> {
    let t = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(to_ms(dt.naive_local()));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Ok(to_ms(dt));
        }
    }
    Err(SqlError::Parse(format!("bad timestamp: {text:?}")))
}

fn parse_timestamp_expr(expr: &Expr) -> Result<Ms, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => parse_timestamp(s),
        Some(Value::Number(s, _)) => s
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
        Some(value) => Err(SqlError::Parse(format!("expected timestamp, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// Pair each value with its column name, using `default_order` when the
/// statement has no column list.
fn named_row<'a>(
    columns: &[String],
    values: &'a [Expr],
    default_order: &[&'static str],
) -> Result<Vec<(String, &'a Expr)>, SqlError> {
    if columns.is_empty() {
        if values.len() > default_order.len() {
            return Err(SqlError::WrongArity("values", default_order.len(), values.len()));
        }
        return Ok(default_order
            .iter()
            .zip(values)
            .map(|(name, expr)| (name.to_string(), expr))
            .collect());
    }
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("values", columns.len(), values.len()));
    }
    for col in columns {
        if !default_order.contains(&col.as_str()) {
            return Err(SqlError::UnknownColumn(col.clone()));
        }
    }
    Ok(columns.iter().cloned().zip(values).collect())
}

fn lookup<'a>(row: &[(String, &'a Expr)], name: &str) -> Option<&'a Expr> {
    row.iter().find(|(col, _)| col == name).map(|(_, expr)| *expr)
}

fn require<'a>(row: &[(String, &'a Expr)], name: &'static str) -> Result<&'a Expr, SqlError> {
    lookup(row, name).ok_or(SqlError::MissingColumn(name))
}

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    parse_string_or_null(expr)?.ok_or_else(|| SqlError::Parse("unexpected NULL".into()))
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(Some(s.clone())),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
    InvalidRoom(RoomError),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::InvalidRoom(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SqlError {}
