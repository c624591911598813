// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use parse_display::Display;
use tracing::{debug, info};

use crate::binder::{BindError, Binder, BoundStatement, ErrorKind as BindErrorKind};
use crate::catalog::{CatalogError, RootCatalog, RootCatalogRef};
use crate::chunk::{ChunkError, ChunkStore, ChunkStoreOptions, ChunkStoreRef};
use crate::config::{ConfigError, ServerConfig};
use crate::executor::{
    execute_insert, ExecutorError, OnePassExecutor, ProgressiveExecutor, ResultStream,
};
use crate::parser::{parse, ParserError, Statement};
use crate::storage::{open_backend, BackendRef, MemoryBackend, SourceStore, StorageError};
use crate::view::{ViewError, ViewManager, ViewManagerRef};

/// The database instance of a process: the backing stores, the catalog,
/// the chunk store and the progressive views.
#[derive(Clone)]
pub struct Database {
    catalog: RootCatalogRef,
    source: Arc<SourceStore>,
    chunks: ChunkStoreRef,
    views: ViewManagerRef,
}

/// Options of a database instance.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub chunk_size: Option<usize>,
    pub cache_capacity: u64,
    pub advance_chunks: usize,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        let config = ServerConfig::default();
        DatabaseOptions {
            chunk_size: config.chunk_size,
            cache_capacity: config.cache_capacity,
            advance_chunks: config.view.advance_chunks,
        }
    }
}

/// The output of a statement.
#[derive(Debug)]
pub enum Output {
    /// The batches of a query.
    Query(ResultStream),
    /// `INSERT` with the number of rows.
    Insert(usize),
    /// A statement without result rows, with its command tag.
    Command(&'static str),
}

impl Database {
    /// Open the stores named in the configuration.
    pub async fn open(config: &ServerConfig) -> Result<Self, Error> {
        let source = open_backend(&config.source.url).await?;
        let meta = open_backend(&config.meta.url).await?;
        let tmp = open_backend(&config.tmp.url).await?;
        let options = DatabaseOptions {
            chunk_size: config.chunk_size,
            cache_capacity: config.cache_capacity,
            advance_chunks: config.view.advance_chunks,
        };
        Self::with_backends(source, meta, tmp, options).await
    }

    /// A database with every store in memory.
    pub async fn new_in_memory(options: DatabaseOptions) -> Result<Self, Error> {
        Self::with_backends(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            options,
        )
        .await
    }

    /// Load tables, prepared layouts and views from the stores.
    pub async fn with_backends(
        source: BackendRef,
        meta: BackendRef,
        tmp: BackendRef,
        options: DatabaseOptions,
    ) -> Result<Self, Error> {
        let source = Arc::new(SourceStore::new(source));
        let catalog = Arc::new(RootCatalog::new());
        for table in source.load_tables().await? {
            catalog.add_table(table)?;
        }
        let chunks = Arc::new(
            ChunkStore::open(
                source.clone(),
                meta.clone(),
                tmp,
                ChunkStoreOptions {
                    chunk_size: options.chunk_size,
                    cache_capacity: options.cache_capacity,
                },
            )
            .await?,
        );
        let views = Arc::new(ViewManager::new(
            catalog.clone(),
            chunks.clone(),
            meta,
            options.advance_chunks,
        ));
        let loaded = views.load().await?;
        info!(
            tables = catalog.table_names().len(),
            views = loaded,
            "database opened"
        );
        Ok(Database {
            catalog,
            source,
            chunks,
            views,
        })
    }

    pub fn catalog(&self) -> &RootCatalogRef {
        &self.catalog
    }

    pub fn chunks(&self) -> &ChunkStoreRef {
        &self.chunks
    }

    pub fn views(&self) -> &ViewManagerRef {
        &self.views
    }

    /// Run SQL statements and return their outputs.
    ///
    /// Statements run in order. Query outputs are lazy streams.
    pub async fn run(&self, sql: &str) -> Result<Vec<Output>, Error> {
        let stmts = parse(sql)?;
        let mut outputs = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            outputs.push(self.run_statement(&stmt).await?);
        }
        Ok(outputs)
    }

    /// Run SQL statements and collect the last batch of each query.
    pub async fn run_to_end(&self, sql: &str) -> Result<Vec<crate::executor::Batch>, Error> {
        let mut batches = vec![];
        for output in self.run(sql).await? {
            if let Output::Query(mut stream) = output {
                if let Some(batch) = stream.last_batch().await? {
                    batches.push(batch);
                }
            }
        }
        Ok(batches)
    }

    async fn run_statement(&self, stmt: &Statement) -> Result<Output, Error> {
        match stmt {
            Statement::CreateProgressiveView {
                name,
                query,
                futures,
            } => {
                self.views.create_view(name, query, futures).await?;
                return Ok(Output::Command("CREATE PROGRESSIVE VIEW"));
            }
            Statement::SelectView(query) => {
                return Ok(Output::Query(self.views.read(query).await?));
            }
            Statement::DropProgressiveView { name, if_exists } => {
                self.views.drop_view(name, *if_exists).await?;
                return Ok(Output::Command("DROP PROGRESSIVE VIEW"));
            }
            _ => {}
        }

        let binder = Binder::new(self.catalog.clone(), self.chunks.clone());
        let bound = binder.bind(stmt)?;
        debug!("{:#?}", bound);
        Ok(match bound {
            BoundStatement::CreateTable(create) => {
                if self.catalog.get_table(create.table.name()).is_none() {
                    self.source.create_table(&create.table).await?;
                    self.catalog.add_table(create.table)?;
                }
                Output::Command("CREATE TABLE")
            }
            BoundStatement::Insert(insert) => {
                Output::Insert(execute_insert(&self.source, &insert).await?)
            }
            BoundStatement::PrepareTable(table) => {
                self.chunks.prepare_table(&table).await?;
                Output::Command("PREPARE TABLE")
            }
            BoundStatement::Select(select) => {
                Output::Query(OnePassExecutor::new(self.source.clone(), select)?.execute())
            }
            BoundStatement::ProgressiveSelect(select) => {
                Output::Query(ProgressiveExecutor::new(self.chunks.clone(), select)?.execute())
            }
        })
    }
}

/// The error type of database operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParserError),
    #[error("bind error: {0}")]
    Bind(#[from] BindError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Chunk(#[from] ChunkError),
    #[error("execute error: {0}")]
    Execute(#[from] ExecutorError),
    #[error("{0}")]
    View(#[from] ViewError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Machine-readable error kinds reported to clients.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    UnsupportedAggregate,
    NotFound,
    OutOfRange,
    ChunkRead,
    /// A value could not be computed, e.g. an overflow or a division by zero.
    DataException,
    ConcurrentAdvanceConflict,
    Internal,
}

impl ErrorKind {
    /// The SQLSTATE code of the kind.
    pub const fn sqlstate(&self) -> &'static str {
        match self {
            Self::Validation => "42000",
            Self::UnsupportedAggregate => "0A000",
            Self::NotFound => "42P01",
            Self::OutOfRange => "22003",
            Self::ChunkRead => "58030",
            Self::DataException => "22000",
            Self::ConcurrentAdvanceConflict => "40001",
            Self::Internal => "XX000",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Validation,
            Self::Bind(e) => bind_kind(e),
            Self::Catalog(e) => catalog_kind(e),
            Self::Storage(_) | Self::Config(_) => ErrorKind::Internal,
            Self::Chunk(e) => chunk_kind(e),
            Self::Execute(e) => executor_kind(e),
            Self::View(e) => match e {
                ViewError::NotFound(_) => ErrorKind::NotFound,
                ViewError::Exists(_) | ViewError::Parse(_) => ErrorKind::Validation,
                ViewError::ConcurrentAdvance(_) => ErrorKind::ConcurrentAdvanceConflict,
                ViewError::Catalog(e) => catalog_kind(e),
                ViewError::Bind(e) => bind_kind(e),
                ViewError::Chunk(e) => chunk_kind(e),
                ViewError::Executor(e) => executor_kind(e),
                ViewError::Storage(_) => ErrorKind::Internal,
            },
        }
    }

    /// The chunk index of a failed chunk read.
    pub fn chunk_index(&self) -> Option<usize> {
        let chunk = match self {
            Self::Chunk(e) | Self::View(ViewError::Chunk(e)) => e,
            Self::Execute(ExecutorError::Chunk(e))
            | Self::View(ViewError::Executor(ExecutorError::Chunk(e))) => e,
            _ => return None,
        };
        match chunk {
            ChunkError::ChunkRead { index, .. } => Some(*index),
            _ => None,
        }
    }
}

fn bind_kind(e: &BindError) -> ErrorKind {
    match e.kind() {
        BindErrorKind::UnsupportedAggregate(_) => ErrorKind::UnsupportedAggregate,
        BindErrorKind::InvalidTable(_) => ErrorKind::NotFound,
        _ => ErrorKind::Validation,
    }
}

fn catalog_kind(e: &CatalogError) -> ErrorKind {
    match e {
        CatalogError::NotFound(..) => ErrorKind::NotFound,
        CatalogError::Duplicated(..) | CatalogError::InvalidName(_) => ErrorKind::Validation,
    }
}

fn chunk_kind(e: &ChunkError) -> ErrorKind {
    match e {
        ChunkError::NotFound(_) => ErrorKind::NotFound,
        ChunkError::OutOfRange { .. } => ErrorKind::OutOfRange,
        ChunkError::ChunkRead { .. } => ErrorKind::ChunkRead,
        ChunkError::Storage(_) => ErrorKind::Internal,
    }
}

fn executor_kind(e: &ExecutorError) -> ErrorKind {
    match e {
        ExecutorError::Chunk(e) => chunk_kind(e),
        ExecutorError::Convert(_) => ErrorKind::DataException,
        ExecutorError::NotNullable(_) => ErrorKind::Validation,
        ExecutorError::Storage(_)
        | ExecutorError::PartitionOverflow(_)
        | ExecutorError::StateMismatch(_) => ErrorKind::Internal,
    }
}
