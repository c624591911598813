// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! The binder resolves the names in a parsed statement against the catalog,
//! checks types, and extracts the aggregates of a query.

use crate::catalog::{RootCatalogRef, TableCatalogRef};
use crate::chunk::ChunkStoreRef;
use crate::parser::{ident_name, FutureMarkers, ObjectName, Query, Statement};

mod agg_call;
mod create_table;
mod error;
mod expr;
mod insert;
mod select;
mod view;

pub use self::agg_call::*;
pub use self::create_table::BoundCreateTable;
pub use self::error::{BindError, ErrorKind};
pub use self::expr::*;
pub use self::insert::BoundInsert;
pub use self::select::{BoundOrderBy, BoundSelect};
pub use self::view::{view_name, BoundView, BoundViewRead};

pub type Result<T, E = BindError> = std::result::Result<T, E>;

/// A statement after binding.
///
/// View statements are bound through [`Binder::bind_view`] and
/// [`Binder::bind_view_read`], since views are owned by the view manager.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundStatement {
    CreateTable(BoundCreateTable),
    Insert(BoundInsert),
    PrepareTable(TableCatalogRef),
    /// A one-pass query over the source table.
    Select(BoundSelect),
    ProgressiveSelect(BoundSelect),
}

/// Binds statements against the catalog and the prepared tables.
pub struct Binder {
    catalog: RootCatalogRef,
    chunks: ChunkStoreRef,
}

impl Binder {
    pub fn new(catalog: RootCatalogRef, chunks: ChunkStoreRef) -> Self {
        Binder { catalog, chunks }
    }

    /// Bind a table or query statement.
    pub fn bind(&self, stmt: &Statement) -> Result<BoundStatement> {
        use crate::parser::Statement as S;
        match stmt {
            S::Sql(stmt) => self.bind_sql(stmt),
            S::PrepareTable { name } => {
                let table = self
                    .catalog
                    .get_table(name)
                    .ok_or_else(|| ErrorKind::InvalidTable(name.clone()))?;
                Ok(BoundStatement::PrepareTable(table))
            }
            S::ProgressiveSelect(query) => {
                let select = self.bind_select(query)?;
                self.check_prepared(&select.table)?;
                Ok(BoundStatement::ProgressiveSelect(select))
            }
            S::CreateProgressiveView { .. } | S::SelectView(_) | S::DropProgressiveView { .. } => {
                Err(ErrorKind::InvalidExpression("view statement".into()).into())
            }
        }
    }

    fn bind_sql(&self, stmt: &crate::parser::ast::Statement) -> Result<BoundStatement> {
        use crate::parser::ast::Statement as S;
        match stmt {
            S::CreateTable(create) => self.bind_create_table(create),
            S::Insert(insert) => self.bind_insert(insert),
            S::Query(query) => {
                let select = self.bind_select(query)?;
                if select.has_pseudo_column() {
                    return Err(ErrorKind::PseudoColumnNotAllowed("non-progressive query").into());
                }
                Ok(BoundStatement::Select(select))
            }
            stmt => Err(ErrorKind::Todo(format!("statement {stmt}")).into()),
        }
    }

    /// Bind the definition of a progressive view.
    pub fn bind_view(&self, query: &Query, futures: &FutureMarkers) -> Result<BoundView> {
        let view = self.bind_view_definition(query, futures)?;
        self.check_prepared(&view.select.table)?;
        Ok(view)
    }

    fn check_prepared(&self, table: &TableCatalogRef) -> Result<()> {
        if !self.chunks.is_prepared(table.name()) {
            return Err(ErrorKind::TableNotPrepared(table.name().into()).into());
        }
        Ok(())
    }
}

/// The name of a table or view. Only unqualified names are supported.
fn object_name(name: &ObjectName) -> Result<String> {
    match name.0.as_slice() {
        [ident] => Ok(ident_name(ident)),
        _ => Err(ErrorKind::InvalidTable(name.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{ColumnCatalog, ColumnDesc, RootCatalog, TableCatalog};
    use crate::chunk::{ChunkStore, ChunkStoreOptions};
    use crate::parser::parse;
    use crate::storage::{MemoryBackend, SourceStore};
    use crate::types::DataType;

    /// `t(a INT, b VARCHAR, c REAL)` is prepared, `u(x INT)` is not.
    async fn binder() -> Binder {
        let catalog = Arc::new(RootCatalog::new());
        let source = Arc::new(SourceStore::new(Arc::new(MemoryBackend::new())));
        let t = TableCatalog::new(
            "t",
            vec![
                ColumnCatalog::new(0, "a", ColumnDesc::new(DataType::Int, true)),
                ColumnCatalog::new(1, "b", ColumnDesc::new(DataType::Varchar(None), true)),
                ColumnCatalog::new(2, "c", ColumnDesc::new(DataType::Real, true)),
            ],
        )
        .unwrap();
        let u = TableCatalog::new(
            "u",
            vec![ColumnCatalog::new(0, "x", ColumnDesc::new(DataType::Int, false))],
        )
        .unwrap();
        source.create_table(&t).await.unwrap();
        let chunks = ChunkStore::open(
            source,
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            ChunkStoreOptions::default(),
        )
        .await
        .unwrap();
        chunks.prepare_table(&t).await.unwrap();
        catalog.add_table(t).unwrap();
        catalog.add_table(u).unwrap();
        Binder::new(catalog, Arc::new(chunks))
    }

    fn bind(binder: &Binder, sql: &str) -> Result<BoundStatement> {
        let stmts = parse(sql).unwrap();
        binder.bind(&stmts[0])
    }

    fn kind(result: Result<BoundStatement>) -> ErrorKind {
        result.unwrap_err().kind().clone()
    }

    #[tokio::test]
    async fn progressive_select() {
        let binder = binder().await;
        let stmt = bind(
            &binder,
            "SELECT PROGRESSIVE b, SUM(a), AVG(a), SUM(a), PROGRESSIVE_PARTITION(), PROGRESSIVE_PROGRESS() \
             FROM t WHERE c > 1.5 GROUP BY b ORDER BY b DESC",
        )
        .unwrap();
        let BoundStatement::ProgressiveSelect(select) = stmt else {
            panic!("expect a progressive select");
        };
        assert_eq!(select.group_keys.len(), 1);
        // SUM(a) appears twice but is computed once
        assert_eq!(select.aggs.len(), 2);
        assert_eq!(select.outputs[0].kind, BoundExprKind::GroupRef(0));
        assert_eq!(select.outputs[3].kind, BoundExprKind::AggRef(0));
        assert_eq!(
            select.output_types(),
            vec![
                DataType::Varchar(None),
                DataType::Int,
                DataType::Real,
                DataType::Int,
                DataType::Int,
                DataType::Real
            ]
        );
        assert!(select.order_by[0].desc);
        assert!(!select.order_by[0].nulls_first);

        // [b, SUM(a), AVG(a), partition, progress]
        let layout = select.layout();
        let resolved: Vec<_> = select
            .outputs
            .iter()
            .map(|e| e.resolve(&layout).unwrap().kind)
            .collect();
        assert_eq!(
            resolved,
            [0, 1, 2, 1, 3, 4].map(BoundExprKind::InputRef).to_vec()
        );
    }

    #[tokio::test]
    async fn order_by_alias_and_position() {
        let binder = binder().await;
        let BoundStatement::ProgressiveSelect(select) = bind(
            &binder,
            "SELECT PROGRESSIVE b, COUNT(*) AS n FROM t GROUP BY b ORDER BY n DESC, 1",
        )
        .unwrap() else {
            panic!("expect a progressive select");
        };
        assert_eq!(select.order_by[0].expr.kind, BoundExprKind::AggRef(0));
        assert_eq!(select.order_by[1].expr.kind, BoundExprKind::GroupRef(0));
    }

    #[tokio::test]
    async fn validation_errors() {
        let binder = binder().await;
        assert_eq!(
            kind(bind(&binder, "SELECT PROGRESSIVE SUM(a) FROM t WHERE nope > 1")),
            ErrorKind::InvalidColumn("nope".into())
        );
        assert_eq!(
            kind(bind(&binder, "SELECT PROGRESSIVE SUM(a) FROM nope")),
            ErrorKind::InvalidTable("nope".into())
        );
        assert_eq!(
            kind(bind(&binder, "SELECT PROGRESSIVE COUNT(*) FROM u")),
            ErrorKind::TableNotPrepared("u".into())
        );
        assert_eq!(
            kind(bind(&binder, "SELECT PROGRESSIVE a, SUM(c) FROM t")),
            ErrorKind::ColumnNotInAgg("a".into())
        );
        assert_eq!(
            kind(bind(&binder, "SELECT SUM(SUM(a)) FROM t")),
            ErrorKind::NestedAgg
        );
        assert!(matches!(
            kind(bind(&binder, "SELECT SUM(b) FROM t")),
            ErrorKind::TypeError(_)
        ));
        assert!(matches!(
            kind(bind(&binder, "SELECT SUM(a), PROGRESSIVE_PROGRESS() FROM t")),
            ErrorKind::PseudoColumnNotAllowed(_)
        ));
        assert!(matches!(
            kind(bind(&binder, "SELECT COUNT(*) FROM t WHERE PROGRESSIVE_PARTITION() > 1")),
            ErrorKind::PseudoColumnNotAllowed(_)
        ));
    }

    #[tokio::test]
    async fn unsupported_aggregates() {
        let binder = binder().await;
        for sql in [
            "SELECT PROGRESSIVE MEDIAN(a) FROM t",
            "SELECT PROGRESSIVE MODE(a) FROM t",
            "SELECT PROGRESSIVE COUNT(DISTINCT a) FROM t",
            "SELECT PROGRESSIVE SUM(a), UPPER(b) FROM t GROUP BY b",
        ] {
            let err = bind(&binder, sql).unwrap_err();
            assert!(err.is_unsupported_aggregate(), "{sql}: {err}");
        }
    }

    #[tokio::test]
    async fn create_and_insert() {
        let binder = binder().await;
        let BoundStatement::CreateTable(create) = bind(
            &binder,
            "CREATE TABLE lineitem (l_quantity REAL NOT NULL, l_returnflag CHAR(1), l_linestatus TEXT)",
        )
        .unwrap() else {
            panic!("expect CREATE TABLE");
        };
        assert_eq!(create.table.columns().len(), 3);
        assert!(!create.table.columns()[0].is_nullable());
        assert_eq!(create.table.columns()[1].datatype(), DataType::Char(1));

        assert_eq!(
            kind(bind(&binder, "CREATE TABLE t (a INT)")),
            ErrorKind::TableExists("t".into())
        );
        assert!(bind(&binder, "CREATE TABLE IF NOT EXISTS t (a INT)").is_ok());
        assert_eq!(
            kind(bind(&binder, "CREATE TABLE v (a INT, A INT)")),
            ErrorKind::ColumnExists("a".into())
        );

        let BoundStatement::Insert(insert) =
            bind(&binder, "INSERT INTO u VALUES (1), (2 + 3)").unwrap()
        else {
            panic!("expect INSERT");
        };
        assert_eq!(insert.rows.len(), 2);
        assert_eq!(
            kind(bind(&binder, "INSERT INTO t VALUES (1, 'x', 1.0)")),
            ErrorKind::TablePrepared("t".into())
        );
        assert_eq!(
            kind(bind(&binder, "INSERT INTO u VALUES (1, 2)")),
            ErrorKind::ColumnCountMismatch("u".into(), 1, 2)
        );
    }

    #[tokio::test]
    async fn view_definition_and_read() {
        let binder = binder().await;
        let stmts = parse(
            "CREATE PROGRESSIVE VIEW pv AS SELECT AVG(a), b FUTURE FROM t \
             WHERE (b = 'a') FUTURE OR (b = 'b') FUTURE GROUP BY b FUTURE",
        )
        .unwrap();
        let crate::parser::Statement::CreateProgressiveView { query, futures, .. } = &stmts[0]
        else {
            panic!("expect a view definition");
        };
        let view = binder.bind_view(query, futures).unwrap();
        assert_eq!(view.group_count, 1);
        assert_eq!(view.mask_key, Some(1));
        assert_eq!(view.future_terms.len(), 2);
        assert_eq!(view.future_outputs, vec![None, Some(0)]);

        let read = |sql: &str| {
            let stmts = parse(sql).unwrap();
            let crate::parser::Statement::SelectView(query) = &stmts[0] else {
                panic!("expect a view read");
            };
            binder.bind_view_read(&view, query)
        };

        let merged = read("SELECT PROGRESSIVE * FROM pv WITH FUTURE WHERE b = 'b'").unwrap();
        assert_eq!(merged.view, "pv");
        assert!(merged.active.is_empty());
        assert_eq!(merged.output_names, vec!["avg"]);
        assert_eq!(
            merged.filter.unwrap().kind,
            BoundExprKind::MaskBit { key: 1, bit: 1 }
        );

        let grouped = read("SELECT PROGRESSIVE * FROM pv WITH FUTURE GROUP BY b").unwrap();
        assert_eq!(grouped.active, vec![0]);
        assert_eq!(grouped.output_names, vec!["avg", "b"]);

        assert!(matches!(
            read("SELECT PROGRESSIVE * FROM pv WITH FUTURE WHERE c > 1")
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidFuture(_)
        ));
    }

    #[tokio::test]
    async fn malformed_view() {
        let binder = binder().await;
        for sql in [
            // FUTURE select item that is not a FUTURE group key
            "CREATE PROGRESSIVE VIEW v AS SELECT SUM(a) FUTURE FROM t",
            // a FUTURE group key shown without FUTURE
            "CREATE PROGRESSIVE VIEW v AS SELECT SUM(a), b FROM t GROUP BY b FUTURE",
        ] {
            let stmts = parse(sql).unwrap();
            let crate::parser::Statement::CreateProgressiveView { query, futures, .. } = &stmts[0]
            else {
                panic!("expect a view definition");
            };
            assert!(matches!(
                binder.bind_view(query, futures).unwrap_err().kind(),
                ErrorKind::InvalidFuture(_)
            ));
        }
    }
}
