use std::time::Instant;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, Framed, LinesCodec, LinesCodecError};
use tracing::debug;

use crate::engine::{Engine, EngineError, ScheduleError};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, ScheduleFilter, SqlError};

/// One JSON line written back per statement.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    Ok { rows: Vec<serde_json::Value> },
    Error { code: &'static str, message: String },
}

impl Reply {
    fn error(code: &'static str, message: impl ToString) -> Self {
        Reply::Error {
            code,
            message: message.to_string(),
        }
    }

    fn rows<T: Serialize>(items: impl IntoIterator<Item = T>) -> Self {
        let rows: Result<Vec<_>, _> = items.into_iter().map(serde_json::to_value).collect();
        match rows {
            Ok(rows) => Reply::Ok { rows },
            Err(e) => Reply::error("internal", e),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok { .. })
    }

    fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"error","code":"internal","message":"{e}"}}"#)
        })
    }
}

impl From<SqlError> for Reply {
    fn from(e: SqlError) -> Self {
        Reply::error(e.code(), e)
    }
}

impl From<ScheduleError> for Reply {
    fn from(e: ScheduleError) -> Self {
        Reply::error(e.code(), e)
    }
}

impl From<EngineError> for Reply {
    fn from(e: EngineError) -> Self {
        Reply::error(e.code(), e)
    }
}

/// A decoded protocol line, or the marker left by one that blew the length limit.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    Overlong,
}

/// `LinesCodec` that reports an overlong line as a frame instead of an error.
///
/// `Framed` ends the stream after any decoder error, so the limit is surfaced
/// in-band and the inner codec keeps discarding up to the next newline.
pub struct StatementCodec {
    lines: LinesCodec,
}

impl StatementCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn frame(decoded: Result<Option<String>, LinesCodecError>) -> Result<Option<Frame>, LinesCodecError> {
        match decoded {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Overlong)),
            Err(e) => Err(e),
        }
    }
}

impl Decoder for StatementCodec {
    type Item = Frame;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::frame(self.lines.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::frame(self.lines.decode_eof(buf))
    }
}

impl Encoder<String> for StatementCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), LinesCodecError> {
        self.lines.encode(line, buf)
    }
}

/// Serve one client: read statements line by line, answer each with a JSON line.
pub async fn process_connection<S>(stream: S, engine: &Engine) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, StatementCodec::new(MAX_LINE_LEN));

    while let Some(frame) = framed.next().await {
        let reply = match frame {
            Ok(Frame::Line(line)) if line.trim().is_empty() => continue,
            Ok(Frame::Line(line)) => execute(engine, &line).await,
            Ok(Frame::Overlong) => {
                debug!("discarding line longer than {MAX_LINE_LEN} bytes");
                Reply::error("limit_exceeded", format!("line longer than {MAX_LINE_LEN} bytes"))
            }
            Err(LinesCodecError::Io(e)) => return Err(e),
            Err(other) => return Err(std::io::Error::other(other.to_string())),
        };
        framed.send(reply.encode()).await.map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            other => std::io::Error::other(other.to_string()),
        })?;
    }
    Ok(())
}

/// Parse and run a single statement.
pub async fn execute(engine: &Engine, line: &str) -> Reply {
    let cmd = match sql::parse_sql(line.trim()) {
        Ok(cmd) => cmd,
        Err(e) => {
            metrics::counter!(QUERIES_TOTAL, "command" => "unparsed", "status" => "error")
                .increment(1);
            debug!("rejected statement: {e}");
            return e.into();
        }
    };

    let label = command_label(&cmd);
    let started = Instant::now();
    let reply = execute_command(engine, cmd).await;
    metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
        .record(started.elapsed().as_secs_f64());
    let status = if reply.is_ok() { "ok" } else { "error" };
    metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
    reply
}

async fn execute_command(engine: &Engine, cmd: Command) -> Reply {
    match cmd {
        Command::InsertResource {
            id,
            owner,
            active,
            name,
        } => match engine
            .register_resource(Resource {
                id,
                owner,
                active,
                name,
            })
            .await
        {
            Ok(resource) => Reply::rows([resource]),
            Err(e) => e.into(),
        },
        Command::DeactivateResource { id } => {
            let update = ResourceUpdate {
                active: Some(false),
                ..Default::default()
            };
            match engine.update_resource(id, update).await {
                Ok(resource) => Reply::rows([resource]),
                Err(e) => e.into(),
            }
        }
        Command::SelectResources { id: Some(id) } => match engine.get_resource(id).await {
            Ok(resource) => Reply::rows([resource]),
            Err(EngineError::NotFound(_)) => Reply::rows(Vec::<Resource>::new()),
            Err(e) => e.into(),
        },
        Command::SelectResources { id: None } => match engine.list_resources().await {
            Ok(resources) => Reply::rows(resources),
            Err(e) => e.into(),
        },
        Command::InsertSchedule {
            resource_id,
            date,
            start,
            end,
        } => {
            let request = ScheduleRequest {
                resource_id,
                date,
                start,
                end,
            };
            match engine.create_schedule(request).await {
                Ok(entry) => Reply::rows([entry]),
                Err(e) => e.into(),
            }
        }
        Command::CancelSchedule { id, reason } => match engine.cancel_schedule(id, reason).await {
            Ok(entry) => Reply::rows([entry]),
            Err(e) => e.into(),
        },
        Command::SelectSchedules { filter } => {
            let result = match filter {
                ScheduleFilter::Id(id) => match engine.get_schedule(id).await {
                    Ok(entry) => Ok(vec![entry]),
                    Err(EngineError::NotFound(_)) => Ok(Vec::new()),
                    Err(e) => Err(e),
                },
                ScheduleFilter::Resource(resource_id) => {
                    engine.list_resource_schedules(resource_id).await
                }
                ScheduleFilter::OwnerDate { owner, date } => {
                    engine.list_schedules(&owner, date).await
                }
            };
            match result {
                Ok(entries) => Reply::rows(entries),
                Err(e) => e.into(),
            }
        }
    }
}
