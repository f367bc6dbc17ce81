//! Records and request results.

use uuid::Uuid;

/// An object paired with its row identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T> {
    /// Row identifier.
    pub id: Uuid,
    /// The object.
    pub object: T,
}

impl<T> Record<T> {
    /// Pairs `object` with a freshly generated identifier.
    #[must_use]
    pub fn new(object: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            object,
        }
    }

    /// Pairs `object` with an explicit identifier.
    #[must_use]
    pub const fn with_id(id: Uuid, object: T) -> Self {
        Self { id, object }
    }
}

/// Outcome of a request: the records it produced and the rows it touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Results<T> {
    records: Vec<Record<T>>,
    affected: u64,
}

impl<T> Results<T> {
    pub(crate) const fn new(records: Vec<Record<T>>, affected: u64) -> Self {
        Self { records, affected }
    }

    /// Returns the records.
    #[must_use]
    pub fn records(&self) -> &[Record<T>] {
        &self.records
    }

    /// Returns the identifiers in record order.
    #[must_use]
    pub fn keys(&self) -> Vec<Uuid> {
        self.records.iter().map(|r| r.id).collect()
    }

    /// Iterates over the objects.
    pub fn objects(&self) -> impl Iterator<Item = &T> {
        self.records.iter().map(|r| &r.object)
    }

    /// Returns the object with identifier `id`.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.records
            .iter()
            .find(|r| r.id == id)
            .map(|r| &r.object)
    }

    /// Returns the first record.
    #[must_use]
    pub fn first(&self) -> Option<&Record<T>> {
        self.records.first()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of rows inserted or read.
    #[must_use]
    pub const fn affected_rows(&self) -> u64 {
        self.affected
    }

    /// Consumes the results, returning the records.
    #[must_use]
    pub fn into_records(self) -> Vec<Record<T>> {
        self.records
    }

    /// Consumes the results, returning the objects.
    #[must_use]
    pub fn into_objects(self) -> Vec<T> {
        self.records.into_iter().map(|r| r.object).collect()
    }
}

impl<T> IntoIterator for Results<T> {
    type Item = Record<T>;
    type IntoIter = std::vec::IntoIter<Record<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_results_accessors() {
        let a = Record::new("a");
        let b = Record::with_id(Uuid::nil(), "b");
        let results = Results::new(vec![a.clone(), b], 2);

        assert_eq!(results.len(), 2);
        assert!(!results.is_empty());
        assert_eq!(results.keys(), vec![a.id, Uuid::nil()]);
        assert_eq!(results.get(Uuid::nil()), Some(&"b"));
        assert_eq!(results.first().map(|r| r.object), Some("a"));
        assert_eq!(results.affected_rows(), 2);
        assert_eq!(results.into_objects(), vec!["a", "b"]);
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(Record::new(1).id, Record::new(1).id);
    }
}
