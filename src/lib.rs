// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! A database that answers aggregate queries progressively.
//!
//! A prepared table is split into chunks. A progressive query emits one
//! refined result per chunk, tagged with the chunk index and the fraction
//! of chunks consumed. Progressive views keep a live aggregate state that
//! advances chunk by chunk, and can be read with a subset of their
//! `FUTURE` terms.

#![deny(unused_must_use)]

pub mod binder;
pub mod catalog;
pub mod chunk;
pub mod config;
mod db;
pub mod executor;
pub mod parser;
pub mod progress;
pub mod server;
pub mod storage;
pub mod types;
pub mod view;

pub use self::db::{Database, DatabaseOptions, Error, ErrorKind, Output};
