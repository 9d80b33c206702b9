use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::StartupHandler;
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use tokio::net::TcpStream;

use crate::engine::Engine;
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command, ResultTable};

pub struct DayGridHandler {
    engine: Arc<Engine>,
    query_parser: Arc<DayGridQueryParser>,
}

impl DayGridHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(DayGridQueryParser),
        }
    }

    async fn execute_command(
        &self,
        cmd: Command,
        format: Option<&Format>,
    ) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.run_command(cmd, format).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn run_command(
        &self,
        cmd: Command,
        format: Option<&Format>,
    ) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::UpsertAppointments(appointments) => {
                let count = engine
                    .upsert_appointments(appointments)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(count))])
            }
            Command::UpdateRoom { id, room, date } => {
                engine.update_room(&id, room, date).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteAppointment { id } => {
                engine.cancel_appointment(&id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectEvents { date } => {
                let view = engine.day_view(date).await;
                let schema = Arc::new(schema(ResultTable::Events, format));
                let rows: Vec<PgWireResult<_>> = view
                    .events
                    .iter()
                    .map(|event| {
                        let appt = &event.appointment;
                        let placement = event.placement.as_ref();
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&appt.id)?;
                        encoder.encode_field(&event.column)?;
                        encoder.encode_field(&format_ms(appt.start))?;
                        encoder.encode_field(&format_ms(appt.end))?;
                        encoder.encode_field(&appt.customer)?;
                        encoder.encode_field(&appt.service)?;
                        encoder.encode_field(&appt.kind.to_string())?;
                        encoder.encode_field(&appt.room.to_string())?;
                        encoder.encode_field(&appt.reason)?;
                        encoder.encode_field(&event.position.left)?;
                        encoder.encode_field(&event.position.width)?;
                        encoder.encode_field(&placement.map(|p| p.slot_index as i32))?;
                        encoder.encode_field(&placement.map(|p| p.end_slot_index as i32))?;
                        encoder.encode_field(&placement.map(|p| p.top_percent))?;
                        encoder.encode_field(&placement.map(|p| p.height_px))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectDay { date } => {
                let view = engine.day_view(date).await;
                let json = serde_json::to_string(&view).map_err(|e| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "XX000".into(),
                        format!("day view encoding failed: {e}"),
                    )))
                })?;
                let schema = Arc::new(schema(ResultTable::Day, format));
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&json)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectTherapists { date } => {
                let names = engine.therapists(date).await;
                let schema = Arc::new(schema(ResultTable::Therapists, format));
                let rows: Vec<PgWireResult<_>> = names
                    .iter()
                    .map(|name| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(name)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectSlots { date } => {
                let slots = engine.slots(date);
                let schema = Arc::new(schema(ResultTable::Slots, format));
                let rows: Vec<PgWireResult<_>> = slots
                    .iter()
                    .enumerate()
                    .map(|(i, slot)| {
                        let label = slot
                            .start_time()
                            .map(|t| t.format("%H:%M").to_string())
                            .unwrap_or_default();
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(i as i32))?;
                        encoder.encode_field(&format_ms(slot.start))?;
                        encoder.encode_field(&format_ms(slot.end()))?;
                        encoder.encode_field(&label)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectUnassigned { date } => {
                let appointments = engine.unassigned(date).await;
                let schema = Arc::new(schema(ResultTable::Unassigned, format));
                let rows: Vec<PgWireResult<_>> = appointments
                    .iter()
                    .map(|appt| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&appt.id)?;
                        encoder.encode_field(&appt.resource)?;
                        encoder.encode_field(&format_ms(appt.start))?;
                        encoder.encode_field(&format_ms(appt.end))?;
                        encoder.encode_field(&appt.customer)?;
                        encoder.encode_field(&appt.service)?;
                        encoder.encode_field(&appt.kind.to_string())?;
                        encoder.encode_field(&appt.reason)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![query_response(schema, rows)])
            }
            Command::SelectStatus => {
                let status = engine.status();
                let schema = Arc::new(schema(ResultTable::Status, format));
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&(status.days as i64))?;
                encoder.encode_field(&(status.appointments as i64))?;
                encoder.encode_field(&(status.roster as i64))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(vec![query_response(schema, rows)])
            }
        }
    }
}

fn query_response(
    schema: Arc<Vec<FieldInfo>>,
    rows: Vec<PgWireResult<pgwire::messages::data::DataRow>>,
) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

/// Timestamps go out as ISO local date-times, the same shape they come in.
fn format_ms(ms: Ms) -> String {
    from_ms(ms)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default()
}

const EVENT_COLUMNS: &[(&str, Type)] = &[
    ("id", Type::VARCHAR),
    ("therapist", Type::VARCHAR),
    ("start_at", Type::VARCHAR),
    ("end_at", Type::VARCHAR),
    ("customer", Type::VARCHAR),
    ("service", Type::VARCHAR),
    ("type", Type::VARCHAR),
    ("room", Type::VARCHAR),
    ("reason", Type::VARCHAR),
    ("left_pct", Type::FLOAT8),
    ("width_pct", Type::FLOAT8),
    ("slot_index", Type::INT4),
    ("end_slot_index", Type::INT4),
    ("top_pct", Type::FLOAT8),
    ("height_px", Type::FLOAT8),
];

const DAY_COLUMNS: &[(&str, Type)] = &[("view", Type::VARCHAR)];

const THERAPIST_COLUMNS: &[(&str, Type)] = &[("name", Type::VARCHAR)];

const SLOT_COLUMNS: &[(&str, Type)] = &[
    ("slot_index", Type::INT4),
    ("start_at", Type::VARCHAR),
    ("end_at", Type::VARCHAR),
    ("label", Type::VARCHAR),
];

const UNASSIGNED_COLUMNS: &[(&str, Type)] = &[
    ("id", Type::VARCHAR),
    ("therapist", Type::VARCHAR),
    ("start_at", Type::VARCHAR),
    ("end_at", Type::VARCHAR),
    ("customer", Type::VARCHAR),
    ("service", Type::VARCHAR),
    ("type", Type::VARCHAR),
    ("reason", Type::VARCHAR),
];

const STATUS_COLUMNS: &[(&str, Type)] = &[
    ("days", Type::INT8),
    ("appointments", Type::INT8),
    ("roster", Type::INT8),
];

/// Result columns of a table. `format` is the client's requested result
/// format; simple queries always get text.
fn schema(table: ResultTable, format: Option<&Format>) -> Vec<FieldInfo> {
    let columns = match table {
        ResultTable::Events => EVENT_COLUMNS,
        ResultTable::Day => DAY_COLUMNS,
        ResultTable::Therapists => THERAPIST_COLUMNS,
        ResultTable::Slots => SLOT_COLUMNS,
        ResultTable::Unassigned => UNASSIGNED_COLUMNS,
        ResultTable::Status => STATUS_COLUMNS,
    };
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            let field_format = format.map_or(FieldFormat::Text, |f| f.format_for(i));
            FieldInfo::new((*name).into(), None, None, ty.clone(), field_format)
        })
        .collect()
}

fn statement_schema(sql: &str, format: Option<&Format>) -> Vec<FieldInfo> {
    sql::select_target(sql).map_or_else(Vec::new, |table| schema(table, format))
}

#[async_trait]
impl SimpleQueryHandler for DayGridHandler {
    async fn do_query<C>(
        &self,
        _client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(cmd, None).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct DayGridQueryParser;

#[async_trait]
impl QueryParser for DayGridQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(statement_schema(stmt, column_format))
    }
}

#[async_trait]
impl ExtendedQueryHandler for DayGridHandler {
    type Statement = String;
    type QueryParser = DayGridQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self
            .execute_command(cmd, Some(&portal.result_column_format))
            .await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            statement_schema(&target.statement, None),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(statement_schema(
            &target.statement.statement,
            Some(&target.result_column_format),
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

/// Replace every `$N` in one pass over `sql`. Bound text is never rescanned,
/// so a value containing `$1` is inserted as written. Placeholders with no
/// bound value are left alone.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(dollar) = rest.find('$') {
        result.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let bound = after[..digits]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| params.get(i));
        match bound {
            Some(Some(bytes)) => {
                let text = String::from_utf8_lossy(bytes.as_ref());
                result.push('\'');
                result.push_str(&text.replace('\'', "''"));
                result.push('\'');
            }
            Some(None) => result.push_str("NULL"),
            None => result.push_str(&rest[dollar..dollar + 1 + digits]),
        }
        rest = &after[digits..];
    }
    result.push_str(rest);
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct DayGridFactory {
    handler: Arc<DayGridHandler>,
    noop: Arc<NoopHandler>,
}

impl DayGridFactory {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            handler: Arc::new(DayGridHandler::new(engine)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for DayGridFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.noop.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(socket: TcpStream, engine: Arc<Engine>) -> std::io::Result<()> {
    let factory = Arc::new(DayGridFactory::new(engine));
    pgwire::tokio::process_socket(socket, None, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
