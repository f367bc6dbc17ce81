//! Engine configuration and the per-type schema cache.

use core::fmt;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::class::SqlobClass;
use crate::column::{ColumnFactory, ReferenceColumnFactory, ScalarColumnFactory};
use crate::connection::Connection;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::persist::{Persist, TypeKey};
use crate::types::{DialectConfig, TypeRegistry};

/// Explicit engine configuration.
pub struct SqlobConfig {
    /// Dialect types.
    pub types: TypeRegistry,
    /// Primary key column name of every table.
    pub primary_key: String,
    factories: Vec<Box<dyn ColumnFactory>>,
}

impl SqlobConfig {
    /// Creates a configuration with the default column factories.
    #[must_use]
    pub fn new(types: TypeRegistry) -> Self {
        Self {
            types,
            primary_key: String::from("id"),
            factories: vec![
                Box::new(ReferenceColumnFactory),
                Box::new(ScalarColumnFactory::new()),
            ],
        }
    }

    /// Built-in SQLite configuration.
    #[must_use]
    pub fn sqlite() -> Self {
        Self::new(TypeRegistry::sqlite())
    }

    /// Built-in PostgreSQL configuration.
    #[must_use]
    pub fn postgres() -> Self {
        Self::new(TypeRegistry::postgres())
    }

    /// Creates a configuration from a dialect file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SqlobError::UnsupportedType`] when a configured type
    /// name is not recognised.
    pub fn from_dialect(dialect: &DialectConfig) -> Result<Self> {
        Ok(Self::new(TypeRegistry::from_config(dialect)?).with_primary_key(dialect.primary_key.clone()))
    }

    /// Adds a column factory ahead of the ones already registered.
    #[must_use]
    pub fn with_factory(mut self, factory: impl ColumnFactory + 'static) -> Self {
        self.factories.insert(0, Box::new(factory));
        self
    }

    /// Sets the primary key column name.
    #[must_use]
    pub fn with_primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = name.into();
        self
    }

    /// Returns the column factories in priority order.
    pub fn factories(&self) -> impl Iterator<Item = &dyn ColumnFactory> {
        self.factories.iter().map(AsRef::as_ref)
    }
}

impl fmt::Debug for SqlobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlobConfig")
            .field("types", &self.types)
            .field("primary_key", &self.primary_key)
            .field("factories", &self.factories.len())
            .finish()
    }
}

type Slot = Arc<Mutex<Option<Arc<SqlobClass>>>>;

/// The persistence engine: configuration plus the schema of every mapped
/// type seen so far.
///
/// Share one `Sqlob` between contexts; it is safe for concurrent use.
pub struct Sqlob {
    config: SqlobConfig,
    classes: Mutex<HashMap<TypeId, Slot>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Sqlob {
    /// Creates an engine.
    #[must_use]
    pub fn new(config: SqlobConfig) -> Self {
        Self {
            config,
            classes: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SqlobConfig {
        &self.config
    }

    /// Returns the schema of `T`, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns the schema error of `T`.
    pub fn class_of<T: Persist>(&self) -> Result<Arc<SqlobClass>> {
        self.class_for(&TypeKey::of::<T>())
    }

    /// Returns the schema of a mapped type, building it on first use.
    ///
    /// Concurrent first calls for one type build it once; other types are
    /// not blocked meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SqlobError::NoApplicableColumnFactory`] or
    /// [`crate::SqlobError::UnsupportedType`] when the schema cannot be
    /// derived. Failed builds are not cached.
    pub fn class_for(&self, key: &TypeKey) -> Result<Arc<SqlobClass>> {
        let slot = Arc::clone(lock(&self.classes).entry(key.id()).or_default());
        let mut cached = lock(&slot);
        if let Some(class) = cached.as_ref() {
            return Ok(Arc::clone(class));
        }
        let built = Arc::new(SqlobClass::build(key, &self.config)?);
        debug!(
            table = %built.name(),
            fields = built.fields().len(),
            "Built schema for {}",
            key.name()
        );
        *cached = Some(Arc::clone(&built));
        Ok(built)
    }

    /// Opens an execution context over `connection`.
    pub fn context<'c>(&'c self, connection: &'c mut dyn Connection) -> ExecutionContext<'c> {
        ExecutionContext::new(self, connection)
    }
}

impl fmt::Debug for Sqlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sqlob")
            .field("config", &self.config)
            .field("classes", &lock(&self.classes).len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlobError;
    use crate::persist::{AnyObject, Attribute, Description, FieldRef, FieldValue};

    #[derive(Debug, Default)]
    struct Gauge {
        level: f64,
    }

    fn get_level(object: &AnyObject) -> Result<FieldRef<'_>> {
        Ok(crate::persist::scalar_ref(
            &crate::persist::access::<Gauge>(object, "level")?.level,
        ))
    }

    fn set_level(object: &mut AnyObject, value: FieldValue) -> Result<()> {
        crate::persist::access_mut::<Gauge>(object, "level")?.level =
            crate::persist::scalar_from(value, "level")?;
        Ok(())
    }

    impl Persist for Gauge {
        fn description() -> Description {
            Description::new::<Self>(
                "Gauge",
                vec![Attribute::scalar::<f64>("level", get_level, set_level)],
            )
        }
    }

    #[test]
    fn test_class_is_cached() {
        let sqlob = Sqlob::new(SqlobConfig::sqlite());
        let first = sqlob.class_of::<Gauge>().unwrap();
        let second = sqlob.class_of::<Gauge>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_first_build_yields_one_class() {
        let sqlob = Arc::new(Sqlob::new(SqlobConfig::sqlite()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sqlob = Arc::clone(&sqlob);
                std::thread::spawn(move || sqlob.class_of::<Gauge>().unwrap())
            })
            .collect();
        let classes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(classes.iter().all(|c| Arc::ptr_eq(c, &classes[0])));
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let sqlob = Sqlob::new(SqlobConfig::new(TypeRegistry::new()));
        assert!(matches!(
            sqlob.class_of::<Gauge>(),
            Err(SqlobError::UnsupportedType(_))
        ));
        assert!(sqlob.class_of::<Gauge>().is_err());
    }

    #[test]
    fn test_no_factory_accepts() {
        struct Nothing;
        impl ColumnFactory for Nothing {
            fn accepts(&self, _: &Attribute) -> bool {
                false
            }
            fn build(&self, _: &Attribute, _: &TypeRegistry) -> Result<crate::column::Column> {
                unreachable!()
            }
        }
        let mut config = SqlobConfig::sqlite();
        config.factories.clear();
        let sqlob = Sqlob::new(config.with_factory(Nothing));
        assert!(matches!(
            sqlob.class_of::<Gauge>(),
            Err(SqlobError::NoApplicableColumnFactory { ref field, .. }) if field == "level"
        ));
    }

    #[test]
    fn test_factory_priority() {
        struct Wide;
        impl ColumnFactory for Wide {
            fn accepts(&self, _: &Attribute) -> bool {
                true
            }
            fn build(&self, attribute: &Attribute, types: &TypeRegistry) -> Result<crate::column::Column> {
                let mut column = ScalarColumnFactory::new().build(attribute, types)?;
                column.sql_type = String::from("NUMERIC");
                Ok(column)
            }
        }
        let sqlob = Sqlob::new(SqlobConfig::sqlite().with_factory(Wide));
        let class = sqlob.class_of::<Gauge>().unwrap();
        assert_eq!(class.fields()[0].column().sql_type, "NUMERIC");
    }
}
