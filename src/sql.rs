use chrono::{NaiveDate, NaiveTime};
use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::{parse_date, parse_time};

/// Which schedule rows a SELECT asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleFilter {
    Id(Ulid),
    Resource(Ulid),
    OwnerDate { owner: String, date: NaiveDate },
}

/// Parsed command from one protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `INSERT INTO resources (id, owner[, active[, name]]) VALUES (...)`
    InsertResource {
        id: Ulid,
        owner: String,
        active: bool,
        name: Option<String>,
    },
    /// `DELETE FROM resources WHERE id = ...`. Resources are never removed, only deactivated.
    DeactivateResource {
        id: Ulid,
    },
    SelectResources {
        id: Option<Ulid>,
    },
    /// `INSERT INTO schedules (resource_id, date, start, "end") VALUES (...)`
    InsertSchedule {
        resource_id: Ulid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },
    /// `DELETE FROM schedules WHERE id = ... [AND reason = ...]`. Tombstones the entry.
    CancelSchedule {
        id: Ulid,
        reason: Option<String>,
    },
    SelectSchedules {
        filter: ScheduleFilter,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    match stmts.as_slice() {
        [] => Err(SqlError::Empty),
        [Statement::Insert(insert)] => parse_insert(insert),
        [Statement::Delete(delete)] => parse_delete(delete),
        [Statement::Query(query)] => parse_select(query),
        [other] => Err(SqlError::Unsupported(format!("{other}"))),
        _ => Err(SqlError::Unsupported("multiple statements".into())),
    }
}

const RESOURCE_COLUMNS: [&str; 4] = ["id", "owner", "active", "name"];
const SCHEDULE_COLUMNS: [&str; 4] = ["resource_id", "date", "start", "end"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_single_row(insert)?;

    match table.as_str() {
        "resources" => {
            let row = Row::bind("resources", &RESOURCE_COLUMNS, 2, &insert.columns, &values)?;
            Ok(Command::InsertResource {
                id: parse_ulid(row.require("id")?)?,
                owner: parse_string(row.require("owner")?)?,
                active: match row.get("active") {
                    Some(v) => parse_bool(v)?,
                    None => true,
                },
                name: match row.get("name") {
                    Some(v) => parse_string_or_null(v)?,
                    None => None,
                },
            })
        }
        "schedules" => {
            let row = Row::bind("schedules", &SCHEDULE_COLUMNS, 4, &insert.columns, &values)?;
            Ok(Command::InsertSchedule {
                resource_id: parse_ulid(row.require("resource_id")?)?,
                date: parse_date_expr(row.require("date")?)?,
                start: parse_time_expr(row.require("start")?)?,
                end: parse_time_expr(row.require("end")?)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// One INSERT row keyed by column name.
///
/// Named columns bind in the order given; with no column list, values bind
/// to `known` by position. The first `required` known columns must be present.
struct Row<'a> {
    pairs: Vec<(&'static str, &'a Expr)>,
}

impl<'a> Row<'a> {
    fn bind(
        table: &'static str,
        known: &[&'static str],
        required: usize,
        columns: &[ast::Ident],
        values: &'a [Expr],
    ) -> Result<Self, SqlError> {
        if columns.is_empty() {
            if values.len() < required {
                return Err(SqlError::WrongArity(table, required, values.len()));
            }
            if values.len() > known.len() {
                return Err(SqlError::Parse(format!(
                    "{table}: at most {} values, got {}",
                    known.len(),
                    values.len()
                )));
            }
            return Ok(Self {
                pairs: known.iter().copied().zip(values).collect(),
            });
        }

        if columns.len() != values.len() {
            return Err(SqlError::Parse(format!(
                "{table}: {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        let mut pairs: Vec<(&'static str, &'a Expr)> = Vec::with_capacity(columns.len());
        for (ident, value) in columns.iter().zip(values) {
            let name = ident.value.to_lowercase();
            let Some(&column) = known.iter().find(|k| **k == name) else {
                return Err(SqlError::UnknownColumn(table, name));
            };
            if pairs.iter().any(|(c, _)| *c == column) {
                return Err(SqlError::Parse(format!("{table}: duplicate column {column}")));
            }
            pairs.push((column, value));
        }
        if let Some(missing) = known[..required]
            .iter()
            .find(|k| !pairs.iter().any(|(c, _)| c == *k))
        {
            return Err(SqlError::MissingColumn(table, *missing));
        }
        Ok(Self { pairs })
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.pairs
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, expr)| *expr)
    }

    fn require(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column)
            .ok_or(SqlError::MissingColumn("insert", column))
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = Filters::from_selection(delete.selection.as_ref())?;
    let id = filters.ulid("id")?.ok_or(SqlError::MissingFilter("id"))?;

    match table.as_str() {
        "resources" => Ok(Command::DeactivateResource { id }),
        "schedules" => {
            let reason = match filters.get("reason").or(filters.get("cancellation_reason")) {
                Some(expr) => parse_string_or_null(expr)?,
                None => None,
            };
            Ok(Command::CancelSchedule { id, reason })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;
    let filters = Filters::from_selection(select.selection.as_ref())?;

    match table.as_str() {
        "resources" => Ok(Command::SelectResources {
            id: filters.ulid("id")?,
        }),
        "schedules" => {
            let filter = if let Some(id) = filters.ulid("id")? {
                ScheduleFilter::Id(id)
            } else if let Some(resource_id) = filters.ulid("resource_id")? {
                ScheduleFilter::Resource(resource_id)
            } else {
                let owner = filters.get("owner").ok_or(SqlError::MissingFilter("owner"))?;
                let date = filters.get("date").ok_or(SqlError::MissingFilter("date"))?;
                ScheduleFilter::OwnerDate {
                    owner: parse_string(owner)?,
                    date: parse_date_expr(date)?,
                }
            };
            Ok(Command::SelectSchedules { filter })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `column = value` pairs from a WHERE clause of AND-ed equalities.
struct Filters<'a> {
    pairs: Vec<(String, &'a Expr)>,
}

impl<'a> Filters<'a> {
    fn from_selection(selection: Option<&'a Expr>) -> Result<Self, SqlError> {
        let mut pairs = Vec::new();
        if let Some(expr) = selection {
            collect_equalities(expr, &mut pairs)?;
        }
        Ok(Self { pairs })
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.pairs
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, expr)| *expr)
    }

    fn ulid(&self, column: &str) -> Result<Option<Ulid>, SqlError> {
        self.get(column).map(parse_ulid).transpose()
    }
}

fn collect_equalities<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_equalities(inner, out),
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::And,
            right,
        } => {
            collect_equalities(left, out)?;
            collect_equalities(right, out)
        }
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Parse(format!("expected column on left of =, got {left}")))?;
            out.push((column, right.as_ref()));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

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
    let tables = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
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

fn extract_single_row(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let source = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match source.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
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
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string(expr).map(Some),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let raw = parse_string(expr)?;
    Ulid::from_string(&raw).map_err(|e| SqlError::Parse(format!("bad ULID {raw:?}: {e}")))
}

fn parse_date_expr(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let raw = parse_string(expr)?;
    parse_date(&raw).map_err(|e| SqlError::Parse(format!("bad date {raw:?} (want YYYY-MM-DD): {e}")))
}

fn parse_time_expr(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let raw = parse_string(expr)?;
    parse_time(&raw).map_err(|e| SqlError::Parse(format!("bad time {raw:?} (want HH:MM): {e}")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        Some(value) => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    UnknownColumn(&'static str, String),
    MissingColumn(&'static str, &'static str),
    MissingFilter(&'static str),
}

impl SqlError {
    pub fn code(&self) -> &'static str {
        match self {
            SqlError::UnknownTable(_) => "unknown_table",
            _ => "syntax_error",
        }
    }
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at least {expected} values, got {got}")
            }
            SqlError::UnknownColumn(t, col) => write!(f, "{t}: unknown column {col}"),
            SqlError::MissingColumn(t, col) => write!(f, "{t}: missing column {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    fn id() -> Ulid {
        Ulid::from_string(ID).unwrap()
    }

    #[test]
    fn insert_resource_defaults_active() {
        let cmd = parse_sql(&format!("INSERT INTO resources (id, owner) VALUES ('{ID}', 'Alice')")).unwrap();
        assert_eq!(
            cmd,
            Command::InsertResource {
                id: id(),
                owner: "Alice".into(),
                active: true,
                name: None,
            }
        );
    }

    #[test]
    fn insert_resource_full_row() {
        let sql = format!("INSERT INTO resources (id, owner, active, name) VALUES ('{ID}', 'Bob', false, 'Spin 101')");
        match parse_sql(&sql).unwrap() {
            Command::InsertResource { owner, active, name, .. } => {
                assert_eq!(owner, "Bob");
                assert!(!active);
                assert_eq!(name.as_deref(), Some("Spin 101"));
            }
            other => panic!("expected InsertResource, got {other:?}"),
        }
    }

    #[test]
    fn insert_schedule() {
        let sql = format!(
            r#"INSERT INTO schedules (resource_id, date, start, "end") VALUES ('{ID}', '2024-01-15', '09:00', '10:30')"#
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertSchedule {
                resource_id: id(),
                date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            }
        );
    }

    #[test]
    fn insert_schedule_bad_time_rejected() {
        let sql = format!(
            r#"INSERT INTO schedules (resource_id, date, start, "end") VALUES ('{ID}', '2024-01-15', '9am', '10:00')"#
        );
        let err = parse_sql(&sql).unwrap_err();
        assert!(err.to_string().contains("HH:MM"), "{err}");

        let sql = format!(
            r#"INSERT INTO schedules (resource_id, date, start, "end") VALUES ('{ID}', '2024-13-01', '09:00', '10:00')"#
        );
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn insert_schedule_too_few_values() {
        let sql = format!("INSERT INTO schedules VALUES ('{ID}', '2024-01-15')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("schedules", 4, 2))));

        let sql = format!("INSERT INTO schedules (resource_id, date) VALUES ('{ID}', '2024-01-15')");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingColumn("schedules", "start"))
        ));
    }

    #[test]
    fn insert_binds_values_by_column_name() {
        let sql = format!(
            r#"INSERT INTO schedules ("end", date, resource_id, start) VALUES ('10:00', '2024-01-15', '{ID}', '09:00')"#
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertSchedule {
                resource_id: id(),
                date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            }
        );

        let sql = format!("INSERT INTO resources (name, owner, id) VALUES ('Spin', 'Alice', '{ID}')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertResource {
                id: id(),
                owner: "Alice".into(),
                active: true,
                name: Some("Spin".into()),
            }
        );
    }

    #[test]
    fn insert_without_column_list_is_positional() {
        let sql = format!("INSERT INTO schedules VALUES ('{ID}', '2024-01-15', '09:00', '10:00')");
        match parse_sql(&sql).unwrap() {
            Command::InsertSchedule { start, end, .. } => {
                assert_eq!(start, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
                assert_eq!(end, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
            }
            other => panic!("expected InsertSchedule, got {other:?}"),
        }
    }

    #[test]
    fn insert_rejects_bad_column_lists() {
        let unknown = format!(
            r#"INSERT INTO schedules (resource_id, day, start, "end") VALUES ('{ID}', '2024-01-15', '09:00', '10:00')"#
        );
        assert!(matches!(
            parse_sql(&unknown),
            Err(SqlError::UnknownColumn("schedules", ref col)) if col == "day"
        ));

        let duplicate = format!(
            r#"INSERT INTO schedules (resource_id, start, start, "end") VALUES ('{ID}', '09:00', '09:30', '10:00')"#
        );
        let err = parse_sql(&duplicate).unwrap_err();
        assert!(err.to_string().contains("duplicate column start"), "{err}");

        let mismatched = format!("INSERT INTO resources (id, owner) VALUES ('{ID}')");
        assert_eq!(parse_sql(&mismatched).unwrap_err().code(), "syntax_error");
    }

    #[test]
    fn delete_schedule_is_cancel() {
        let cmd = parse_sql(&format!("DELETE FROM schedules WHERE id = '{ID}'")).unwrap();
        assert_eq!(cmd, Command::CancelSchedule { id: id(), reason: None });

        let cmd = parse_sql(&format!(
            "DELETE FROM schedules WHERE id = '{ID}' AND reason = 'instructor sick'"
        ))
        .unwrap();
        assert_eq!(
            cmd,
            Command::CancelSchedule {
                id: id(),
                reason: Some("instructor sick".into()),
            }
        );
    }

    #[test]
    fn delete_resource_is_deactivate() {
        let cmd = parse_sql(&format!("DELETE FROM resources WHERE id = '{ID}'")).unwrap();
        assert_eq!(cmd, Command::DeactivateResource { id: id() });
    }

    #[test]
    fn delete_without_id_rejected() {
        assert!(matches!(
            parse_sql("DELETE FROM schedules WHERE reason = 'x'"),
            Err(SqlError::MissingFilter("id"))
        ));
    }

    #[test]
    fn select_schedules_by_owner_and_date() {
        let cmd = parse_sql("SELECT * FROM schedules WHERE owner = 'Alice' AND date = '2024-01-15'").unwrap();
        assert_eq!(
            cmd,
            Command::SelectSchedules {
                filter: ScheduleFilter::OwnerDate {
                    owner: "Alice".into(),
                    date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                },
            }
        );
    }

    #[test]
    fn select_schedules_by_id_or_resource() {
        let cmd = parse_sql(&format!("SELECT * FROM schedules WHERE id = '{ID}'")).unwrap();
        assert_eq!(cmd, Command::SelectSchedules { filter: ScheduleFilter::Id(id()) });

        let cmd = parse_sql(&format!("SELECT * FROM schedules WHERE (resource_id = '{ID}')")).unwrap();
        assert_eq!(cmd, Command::SelectSchedules { filter: ScheduleFilter::Resource(id()) });
    }

    #[test]
    fn select_schedules_needs_a_filter() {
        assert!(matches!(
            parse_sql("SELECT * FROM schedules WHERE owner = 'Alice'"),
            Err(SqlError::MissingFilter("date"))
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM schedules"),
            Err(SqlError::MissingFilter("owner"))
        ));
    }

    #[test]
    fn select_resources() {
        assert_eq!(
            parse_sql("SELECT * FROM resources").unwrap(),
            Command::SelectResources { id: None }
        );
        assert_eq!(
            parse_sql(&format!("SELECT * FROM resources WHERE id = '{ID}'")).unwrap(),
            Command::SelectResources { id: Some(id()) }
        );
    }

    #[test]
    fn range_filters_unsupported() {
        assert!(matches!(
            parse_sql("SELECT * FROM schedules WHERE owner = 'Alice' AND start >= '09:00'"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn unknown_table_errors() {
        let err = parse_sql(&format!("INSERT INTO members (id) VALUES ('{ID}')")).unwrap_err();
        assert_eq!(err.code(), "unknown_table");
    }

    #[test]
    fn empty_and_garbage() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
        assert_eq!(parse_sql("BOOK ME A CLASS").unwrap_err().code(), "syntax_error");
        assert!(matches!(
            parse_sql("SELECT * FROM resources; SELECT * FROM resources"),
            Err(SqlError::Unsupported(_))
        ));
    }
}
