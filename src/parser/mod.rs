// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! The parser module uses the [`sqlparser`] crate for standard SQL
//! and re-exports its AST types. The progressive extensions are
//! recognized on the token stream before it reaches [`sqlparser`]:
//!
//! * `PREPARE TABLE t`
//! * `SELECT PROGRESSIVE ...`
//! * `CREATE PROGRESSIVE VIEW v AS SELECT ... FUTURE ...`
//! * `SELECT PROGRESSIVE * FROM v WITH FUTURE ...`
//! * `DROP PROGRESSIVE VIEW [IF EXISTS] v`

pub use sqlparser::ast;
pub use sqlparser::ast::*;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, TokenizerError};

mod progressive;

pub use self::progressive::FutureMarkers;
use self::progressive::*;

/// The error type of parsing.
#[derive(thiserror::Error, Debug)]
pub enum ParserError {
    #[error("{0}")]
    Sql(#[from] sqlparser::parser::ParserError),
    #[error("{0}")]
    Tokenize(#[from] TokenizerError),
    #[error("malformed FUTURE clause: {0}")]
    Future(String),
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// A standard SQL statement.
    Sql(Box<ast::Statement>),
    /// `PREPARE TABLE t`
    PrepareTable { name: String },
    /// `SELECT PROGRESSIVE ... FROM t ...`
    ProgressiveSelect(Box<Query>),
    /// `CREATE PROGRESSIVE VIEW v AS SELECT ...`
    CreateProgressiveView {
        name: String,
        query: Box<Query>,
        futures: FutureMarkers,
    },
    /// `SELECT PROGRESSIVE * FROM v WITH FUTURE ...`
    SelectView(Box<Query>),
    /// `DROP PROGRESSIVE VIEW [IF EXISTS] v`
    DropProgressiveView { name: String, if_exists: bool },
}

/// Parse the SQL string into a list of statements.
pub fn parse(sql: &str) -> Result<Vec<Statement>, ParserError> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql).tokenize()?;
    split_statements(tokens)
        .into_iter()
        .map(parse_statement)
        .collect()
}

/// Parse a query without progressive extensions.
pub fn parse_query(sql: &str) -> Result<Box<Query>, ParserError> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql).tokenize()?;
    into_query(parse_sql(tokens)?)
}

/// The name in an identifier token. Unquoted identifiers are case-insensitive.
pub fn ident_name(ident: &Ident) -> String {
    match ident.quote_style {
        Some(_) => ident.value.clone(),
        None => ident.value.to_lowercase(),
    }
}

fn parse_statement(mut tokens: Vec<Token>) -> Result<Statement, ParserError> {
    let sig = significant(&tokens);
    let head: Vec<String> = sig
        .iter()
        .take(6)
        .map(|&i| match &tokens[i] {
            Token::Word(w) if w.quote_style.is_none() => w.value.to_uppercase(),
            _ => String::new(),
        })
        .collect();
    let word = |pos: usize, kw: &str| head.get(pos).map_or(false, |w| w == kw);

    if word(0, "PREPARE") && word(1, "TABLE") {
        let name = name_at(&tokens, &sig, 2)?;
        expect_end(&tokens, &sig, 3)?;
        return Ok(Statement::PrepareTable { name });
    }
    if word(0, "CREATE") && word(1, "PROGRESSIVE") && word(2, "VIEW") {
        let name = name_at(&tokens, &sig, 3)?;
        if !word(4, "AS") {
            return Err(ParserError::Syntax("expect AS after view name".into()));
        }
        let mut rest = tokens.split_off(sig.get(5).copied().unwrap_or(tokens.len()));
        strip_progressive(&mut rest);
        let (rest, futures) = strip_future_markers(rest)?;
        let query = into_query(parse_sql(rest)?)?;
        return Ok(Statement::CreateProgressiveView {
            name,
            query,
            futures,
        });
    }
    if word(0, "DROP") && word(1, "PROGRESSIVE") && word(2, "VIEW") {
        let if_exists = word(3, "IF") && word(4, "EXISTS");
        let pos = if if_exists { 5 } else { 3 };
        let name = name_at(&tokens, &sig, pos)?;
        expect_end(&tokens, &sig, pos + 1)?;
        return Ok(Statement::DropProgressiveView { name, if_exists });
    }
    if word(0, "SELECT") && word(1, "PROGRESSIVE") {
        tokens.remove(sig[1]);
        let with_future = take_with_future(&mut tokens);
        reject_future(&tokens)?;
        let query = into_query(parse_sql(tokens)?)?;
        return Ok(if with_future {
            Statement::SelectView(query)
        } else {
            Statement::ProgressiveSelect(query)
        });
    }
    reject_future(&tokens)?;
    Ok(Statement::Sql(Box::new(parse_sql(tokens)?)))
}

fn parse_sql(tokens: Vec<Token>) -> Result<ast::Statement, ParserError> {
    let dialect = PostgreSqlDialect {};
    let mut parser = Parser::new(&dialect).with_tokens(tokens);
    let stmt = parser.parse_statement()?;
    // allow a trailing semicolon, nothing else
    while parser.consume_token(&Token::SemiColon) {}
    if parser.peek_token().token != Token::EOF {
        return Err(ParserError::Syntax(format!(
            "unexpected {} after statement",
            parser.peek_token().token
        )));
    }
    Ok(stmt)
}

fn into_query(stmt: ast::Statement) -> Result<Box<Query>, ParserError> {
    match stmt {
        ast::Statement::Query(query) => Ok(query),
        stmt => Err(ParserError::Syntax(format!("expect a query, found: {stmt}"))),
    }
}

/// Drop `PROGRESSIVE` right after the leading `SELECT`.
fn strip_progressive(tokens: &mut Vec<Token>) {
    let sig = significant(tokens);
    if let [first, second, ..] = sig[..] {
        if is_word(&tokens[first], "SELECT") && is_word(&tokens[second], "PROGRESSIVE") {
            tokens.remove(second);
        }
    }
}

fn name_at(tokens: &[Token], sig: &[usize], pos: usize) -> Result<String, ParserError> {
    match sig.get(pos).map(|&i| &tokens[i]) {
        Some(Token::Word(w)) => Ok(match w.quote_style {
            Some(_) => w.value.clone(),
            None => w.value.to_lowercase(),
        }),
        Some(t) => Err(ParserError::Syntax(format!("expect a name, found {t}"))),
        None => Err(ParserError::Syntax("expect a name".into())),
    }
}

fn expect_end(tokens: &[Token], sig: &[usize], pos: usize) -> Result<(), ParserError> {
    match sig.get(pos) {
        None => Ok(()),
        Some(&i) => Err(ParserError::Syntax(format!(
            "unexpected {} at end of statement",
            tokens[i]
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(sql: &str) -> Statement {
        let mut stmts = parse(sql).unwrap();
        assert_eq!(stmts.len(), 1);
        stmts.remove(0)
    }

    #[test]
    fn prepare_table() {
        assert_eq!(
            parse_one("PREPARE TABLE LineItem;"),
            Statement::PrepareTable {
                name: "lineitem".into()
            }
        );
        assert!(parse("PREPARE TABLE").is_err());
        assert!(parse("PREPARE TABLE a b").is_err());
    }

    #[test]
    fn progressive_select() {
        let stmt = parse_one(
            "SELECT PROGRESSIVE SUM(l_quantity), PROGRESSIVE_PARTITION(), PROGRESSIVE_PROGRESS() \
             FROM lineitem GROUP BY l_returnflag, l_linestatus ORDER BY l_returnflag, l_linestatus",
        );
        let Statement::ProgressiveSelect(query) = stmt else {
            panic!("expect a progressive select");
        };
        assert!(query.to_string().starts_with("SELECT SUM(l_quantity)"));
    }

    #[test]
    fn create_view() {
        let stmt = parse_one(
            "CREATE PROGRESSIVE VIEW pv AS SELECT AVG(a), b FUTURE FROM t2 \
             WHERE (b='a') FUTURE OR (b='b') FUTURE GROUP BY b FUTURE",
        );
        let Statement::CreateProgressiveView {
            name,
            query,
            futures,
        } = stmt
        else {
            panic!("expect a view definition");
        };
        assert_eq!(name, "pv");
        assert_eq!(futures.group_by, [0].into());
        assert!(!query.to_string().contains("FUTURE"));
    }

    #[test]
    fn select_view() {
        let stmt = parse_one("SELECT PROGRESSIVE * FROM pv WITH FUTURE WHERE b = 'b'");
        assert!(matches!(stmt, Statement::SelectView(_)));
    }

    #[test]
    fn drop_view() {
        assert_eq!(
            parse_one("DROP PROGRESSIVE VIEW IF EXISTS pv"),
            Statement::DropProgressiveView {
                name: "pv".into(),
                if_exists: true
            }
        );
        assert_eq!(
            parse_one("drop progressive view pv"),
            Statement::DropProgressiveView {
                name: "pv".into(),
                if_exists: false
            }
        );
    }

    #[test]
    fn plain_sql() {
        let stmts = parse("CREATE TABLE t (a INT); INSERT INTO t VALUES (1), (2);").unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts.iter().all(|s| matches!(s, Statement::Sql(_))));
    }

    #[test]
    fn future_outside_view() {
        assert!(matches!(
            parse("SELECT PROGRESSIVE a FUTURE FROM t"),
            Err(ParserError::Future(_))
        ));
        assert!(matches!(
            parse("SELECT a FUTURE FROM t"),
            Err(ParserError::Future(_))
        ));
    }

    #[test]
    fn syntax_error() {
        assert!(parse("SELECT * FROM (").is_err());
    }
}
