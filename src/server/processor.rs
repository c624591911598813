// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use pgwire::api::query::SimpleQueryHandler;
use pgwire::api::results::{DataRowEncoder, FieldFormat, FieldInfo, QueryResponse, Response, Tag};
use pgwire::api::{ClientInfo, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::data::DataRow;
use tracing::{debug, info};

use crate::executor::{ResultStream, Schema};
use crate::types::{DataType, DataValue, Row};
use crate::{Database, Error, Output};

/// Serves simple queries over a [`Database`].
pub struct Processor {
    db: Database,
}

impl Processor {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SimpleQueryHandler for Processor {
    async fn do_query<'a, C>(
        &self,
        _client: &mut C,
        query: &'a str,
    ) -> PgWireResult<Vec<Response<'a>>>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        info!(query, "simple query");
        let outputs = self.db.run(query).await.map_err(user_error)?;
        if outputs.is_empty() {
            return Ok(vec![Response::EmptyQuery]);
        }
        Ok(outputs.into_iter().map(response).collect())
    }
}

fn response<'a>(output: Output) -> Response<'a> {
    match output {
        Output::Query(stream) => Response::Query(query_response(stream)),
        Output::Insert(rows) => Response::Execution(Tag::new("INSERT").with_rows(rows)),
        Output::Command(tag) => Response::Execution(Tag::new(tag)),
    }
}

/// Rows are encoded batch by batch as the client consumes them.
fn query_response<'a>(stream: ResultStream) -> QueryResponse<'a> {
    let fields = Arc::new(field_infos(stream.schema()));
    let schema = fields.clone();
    let rows = stream
        .map_err(|e| user_error(e.into()))
        .map_ok(|batch| {
            debug!(partition = ?batch.token.partition, progress = batch.token.progress, "batch sent");
            stream::iter(batch.rows.into_iter().map(Ok::<Row, PgWireError>))
        })
        .try_flatten()
        .map(move |row| encode_row(&schema, &row?))
        .boxed();
    QueryResponse::new(fields, rows)
}

fn field_infos(schema: &Schema) -> Vec<FieldInfo> {
    schema
        .iter()
        .map(|column| {
            FieldInfo::new(
                column.name.clone(),
                None,
                None,
                pg_type(&column.datatype),
                FieldFormat::Text,
            )
        })
        .collect()
}

fn pg_type(ty: &DataType) -> Type {
    match ty {
        DataType::Null => Type::UNKNOWN,
        DataType::Bool => Type::BOOL,
        DataType::Int => Type::INT8,
        DataType::Real => Type::FLOAT8,
        DataType::Char(_) => Type::BPCHAR,
        DataType::Varchar(_) => Type::VARCHAR,
    }
}

fn encode_row(fields: &Arc<Vec<FieldInfo>>, row: &Row) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(fields.clone());
    for value in row {
        match value {
            DataValue::Null => encoder.encode_field(&None::<String>)?,
            DataValue::Bool(v) => encoder.encode_field(v)?,
            DataValue::Int64(v) => encoder.encode_field(v)?,
            DataValue::Float64(v) => encoder.encode_field(&v.into_inner())?,
            DataValue::String(v) => encoder.encode_field(v)?,
        }
    }
    encoder.finish()
}

fn user_error(e: Error) -> PgWireError {
    let kind = e.kind();
    debug!(%kind, error = %e, "query failed");
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".to_owned(),
        kind.sqlstate().to_owned(),
        e.to_string(),
    )))
}
