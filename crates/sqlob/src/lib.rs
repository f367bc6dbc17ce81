//! # sqlob
//!
//! Stores plain Rust structs as rows of relational tables, with the table
//! layout derived from the struct itself.
//!
//! This crate provides:
//! - `#[derive(Persist)]` to describe a struct's persistable fields
//! - [`Sqlob`], the engine holding the type mappings and the schema cache
//! - Requests to create and drop tables, and to insert, select, count,
//!   update and delete records
//! - [`Where`] criteria rendered as parameterized SQL
//! - [`ExecutionContext`], the scope owning statements and transactions
//!
//! ## Quick Start
//!
//! ```ignore
//! use sqlob::{CreateRequest, InsertRequest, Persist, Request, SelectRequest, Sqlob, SqlobConfig, SqliteConnection, Where};
//!
//! #[derive(Debug, Default, Persist)]
//! pub struct Person {
//!     pub name: String,
//!     pub age: i32,
//! }
//!
//! async fn example() -> sqlob::Result<()> {
//!     let sqlob = Sqlob::new(SqlobConfig::sqlite());
//!     let mut connection = SqliteConnection::connect("sqlite::memory:").await?;
//!     let mut ctx = sqlob.context(&mut connection);
//!
//!     CreateRequest::<Person>::new().execute(&mut ctx).await?;
//!     InsertRequest::single(Person { name: "Ann".into(), age: 30 })
//!         .execute(&mut ctx)
//!         .await?;
//!
//!     let people = SelectRequest::<Person>::new(Where::eq("name", "Ann"))
//!         .execute(&mut ctx)
//!         .await?;
//!     assert_eq!(people.len(), 1);
//!
//!     ctx.close().await
//! }
//! ```
//!
//! ## References
//!
//! A field marked `#[sqlob(reference)]` holds another mapped object and is
//! stored as that object's row identifier. Storing an object stores what it
//! references first, reusing rows that are already equal to it:
//!
//! ```ignore
//! #[derive(Debug, Default, Persist)]
//! pub struct Address {
//!     pub city: String,
//! }
//!
//! #[derive(Debug, Default, Persist)]
//! pub struct Customer {
//!     pub name: String,
//!     #[sqlob(reference)]
//!     pub address: Option<Box<Address>>,
//! }
//! ```

extern crate self as sqlob;

mod class;
pub mod column;
pub mod connection;
mod context;
mod criteria;
mod error;
mod field;
pub mod persist;
mod registry;
pub mod request;
mod result;
pub mod types;
pub mod value;

pub use class::SqlobClass;
pub use connection::{Connection, Row, SqliteConnection};
pub use context::{ExecutionContext, Statement};
pub use criteria::Where;
pub use error::{Result, SqlobError};
pub use field::SqlobField;
pub use persist::Persist;
pub use registry::{Sqlob, SqlobConfig};
pub use request::{
    CountRequest, CreateRequest, DeleteRequest, DropRequest, InsertRequest, Request,
    SelectRequest, UpdateRequest,
};
pub use result::{Record, Results};
pub use types::{DialectConfig, SqlTypeCode, SqlobType, TypeRegistry, ValueKind};
pub use value::{SqlScalar, SqlValue, ToSqlValue};

pub use sqlob_derive::Persist;

// Re-export for callers naming identifiers without a direct dependency
pub use uuid::Uuid;
