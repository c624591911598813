// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Token-level handling of the progressive extensions.
//!
//! `PROGRESSIVE`, `WITH FUTURE` and `FUTURE` markers are removed from the
//! token stream before it is handed to [`sqlparser`]. The position of each
//! `FUTURE` marker is recorded in [`FutureMarkers`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlparser::tokenizer::Token;

use super::ParserError;

/// Parts of a view definition tagged with `FUTURE`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FutureMarkers {
    /// Indexes into the select list.
    pub select_items: BTreeSet<usize>,
    /// `(disjunct, conjunct)` positions in the WHERE condition, where the
    /// condition is read as `c00 AND c01 .. OR c10 AND c11 ..`.
    pub where_terms: BTreeSet<(usize, usize)>,
    /// Indexes into the GROUP BY list.
    pub group_by: BTreeSet<usize>,
}

impl FutureMarkers {
    pub fn is_empty(&self) -> bool {
        self.select_items.is_empty() && self.where_terms.is_empty() && self.group_by.is_empty()
    }
}

/// Returns true if the token is the unquoted word `kw`.
pub(super) fn is_word(token: &Token, kw: &str) -> bool {
    matches!(token, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(kw))
}

fn is_whitespace(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_))
}

/// Split tokens into statements on top-level semicolons. Empty statements are skipped.
pub(super) fn split_statements(tokens: Vec<Token>) -> Vec<Vec<Token>> {
    let mut statements = vec![];
    let mut current = vec![];
    let mut depth = 0i32;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            Token::SemiColon if depth <= 0 => {
                statements.push(std::mem::take(&mut current));
                continue;
            }
            Token::EOF => continue,
            _ => {}
        }
        current.push(token);
    }
    statements.push(current);
    statements.retain(|s| s.iter().any(|t| !is_whitespace(t)));
    statements
}

/// Indexes of the non-whitespace tokens.
pub(super) fn significant(tokens: &[Token]) -> Vec<usize> {
    (0..tokens.len())
        .filter(|&i| !is_whitespace(&tokens[i]))
        .collect()
}

/// Remove a top-level `WITH FUTURE`. Returns whether it was present.
pub(super) fn take_with_future(tokens: &mut Vec<Token>) -> bool {
    let sig = significant(tokens);
    let mut depth = 0i32;
    for (pos, &i) in sig.iter().enumerate() {
        match &tokens[i] {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            t if depth == 0 && is_word(t, "WITH") => {
                if let Some(&next) = sig.get(pos + 1) {
                    if is_word(&tokens[next], "FUTURE") {
                        tokens.drain(i..=next);
                        return true;
                    }
                }
            }
            _ => {}
        }
    }
    false
}

/// Fails if any `FUTURE` marker is left in the tokens.
pub(super) fn reject_future(tokens: &[Token]) -> Result<(), ParserError> {
    if tokens.iter().any(|t| is_word(t, "FUTURE")) {
        return Err(ParserError::Future(
            "FUTURE is only allowed in CREATE PROGRESSIVE VIEW".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    None,
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
}

/// Remove the `FUTURE` markers of a view definition and record their positions.
pub(super) fn strip_future_markers(
    tokens: Vec<Token>,
) -> Result<(Vec<Token>, FutureMarkers), ParserError> {
    let mut markers = FutureMarkers::default();
    let mut out = Vec::with_capacity(tokens.len());

    let mut clause = Clause::None;
    let mut depth = 0i32;
    // position inside the current clause
    let mut item = 0;
    let mut disjunct = 0;
    let mut conjunct = 0;
    let mut in_between = false;
    // whether a term precedes the current position and is not yet marked
    let mut has_term = false;

    for token in tokens {
        if is_word(&token, "FUTURE") {
            if depth != 0 {
                return Err(ParserError::Future("FUTURE inside parentheses".into()));
            }
            if !has_term {
                return Err(ParserError::Future("FUTURE must follow a term".into()));
            }
            let inserted = match clause {
                Clause::Select => markers.select_items.insert(item),
                Clause::Where => markers.where_terms.insert((disjunct, conjunct)),
                Clause::GroupBy => markers.group_by.insert(item),
                _ => {
                    return Err(ParserError::Future(
                        "FUTURE is allowed in the select list, WHERE and GROUP BY only".into(),
                    ))
                }
            };
            if !inserted {
                return Err(ParserError::Future("duplicated FUTURE".into()));
            }
            has_term = false;
            continue;
        }

        match &token {
            Token::Whitespace(_) => {}
            Token::LParen => {
                depth += 1;
                has_term = true;
            }
            Token::RParen => depth -= 1,
            t if depth == 0 => {
                let next_clause = [
                    ("SELECT", Clause::Select),
                    ("FROM", Clause::From),
                    ("WHERE", Clause::Where),
                    ("GROUP", Clause::GroupBy),
                    ("HAVING", Clause::Having),
                    ("ORDER", Clause::OrderBy),
                    ("LIMIT", Clause::Limit),
                ]
                .into_iter()
                .find(|(kw, _)| is_word(t, kw));
                if let Some((_, next)) = next_clause {
                    clause = next;
                    item = 0;
                    disjunct = 0;
                    conjunct = 0;
                    in_between = false;
                    has_term = false;
                } else if matches!(t, Token::Comma) {
                    item += 1;
                    has_term = false;
                } else if clause == Clause::Where && is_word(t, "OR") {
                    disjunct += 1;
                    conjunct = 0;
                    has_term = false;
                } else if clause == Clause::Where && is_word(t, "AND") {
                    if in_between {
                        in_between = false;
                    } else {
                        conjunct += 1;
                        has_term = false;
                    }
                } else {
                    if clause == Clause::Where && is_word(t, "BETWEEN") {
                        in_between = true;
                    }
                    // `GROUP BY` keeps the position at the first item
                    if !(clause == Clause::GroupBy && is_word(t, "BY")) {
                        has_term = true;
                    }
                }
            }
            _ => has_term = true,
        }
        out.push(token);
    }
    Ok((out, markers))
}
