//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use sqlob::persist::{self, AnyObject, Attribute, Description, FieldRef, FieldValue};
use sqlob::{Persist, SqliteConnection, Sqlob, SqlobConfig, Uuid};

#[derive(Debug, Default, Clone, PartialEq, Persist)]
pub struct Person {
    pub name: String,
    pub age: i32,
}

impl Person {
    pub fn new(name: &str, age: i32) -> Self {
        Self {
            name: name.to_string(),
            age,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Persist)]
pub struct Address {
    pub street: String,
    pub city: String,
}

impl Address {
    pub fn new(street: &str, city: &str) -> Self {
        Self {
            street: street.to_string(),
            city: city.to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Persist)]
#[sqlob(table = "customers")]
pub struct Customer {
    pub name: String,
    #[sqlob(column = "active_flag")]
    pub active: bool,
    pub nickname: Option<String>,
    #[sqlob(reference)]
    pub address: Option<Box<Address>>,
    #[sqlob(transient)]
    pub visits: u32,
    cache: String,
}

impl Customer {
    pub fn new(name: &str, address: Option<Address>) -> Self {
        Self {
            name: name.to_string(),
            active: true,
            nickname: None,
            address: address.map(Box::new),
            visits: 0,
            cache: String::new(),
        }
    }

    pub fn with_cache(mut self, cache: &str) -> Self {
        self.cache = cache.to_string();
        self
    }

    pub fn cache(&self) -> &str {
        &self.cache
    }
}

#[derive(Debug, Default, Clone, PartialEq, Persist)]
pub struct Event {
    pub title: String,
    #[sqlob(sql_type = "TEXT")]
    pub notes: String,
    pub day: NaiveDate,
    pub at: NaiveDateTime,
    pub payload: Vec<u8>,
    pub ratio: f64,
    pub grade: char,
    pub small: i8,
    pub big: i64,
    pub code: Uuid,
}

/// A record whose only reference points at itself.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Loop {
    pub label: String,
}

fn get_label(object: &AnyObject) -> sqlob::Result<FieldRef<'_>> {
    Ok(persist::scalar_ref(&persist::access::<Loop>(object, "label")?.label))
}

fn set_label(object: &mut AnyObject, value: FieldValue) -> sqlob::Result<()> {
    persist::access_mut::<Loop>(object, "label")?.label = persist::scalar_from(value, "label")?;
    Ok(())
}

fn get_me(object: &AnyObject) -> sqlob::Result<FieldRef<'_>> {
    persist::access::<Loop>(object, "me")?;
    Ok(FieldRef::Reference(Some(object)))
}

fn set_me(object: &mut AnyObject, _value: FieldValue) -> sqlob::Result<()> {
    persist::access_mut::<Loop>(object, "me").map(|_| ())
}

impl sqlob::Persist for Loop {
    fn description() -> Description {
        Description::new::<Self>(
            "Loop",
            vec![
                Attribute::scalar::<String>("label", get_label, set_label),
                Attribute::reference::<Option<Box<Self>>>("me", get_me, set_me),
            ],
        )
    }
}

pub fn engine() -> Sqlob {
    Sqlob::new(SqlobConfig::sqlite())
}

pub async fn connect() -> SqliteConnection {
    SqliteConnection::connect("sqlite::memory:").await.unwrap()
}
