//! Typed DDL statement builders.
//!
//! Each statement is a plain struct with a `Display` implementation that
//! renders the final SQL text. Conventions:
//!
//! - 4 spaces for indentation (see `common::SQL_INDENTATION`).
//! - SQL keywords and types are upper case.
//! - Statements do not include a trailing semicolon, this is added when
//!   statements are assembled into a script.

mod common;

pub mod postgres;
pub mod sqlite;

pub use common::{IteratorJoin, SQL_INDENTATION};
