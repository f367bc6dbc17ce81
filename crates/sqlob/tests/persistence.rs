//! Persistence round trips against an in-memory SQLite database.

mod common;

use chrono::NaiveDate;
use common::{connect, engine, Address, Customer, Event, Loop, Person};
use sqlob::{
    CountRequest, CreateRequest, DeleteRequest, DropRequest, InsertRequest, Record, Request,
    SelectRequest, SqlValue, SqlobError, UpdateRequest, Uuid, Where,
};

// =============================================================================
// Schema
// =============================================================================

#[test]
fn test_person_creation_statement() {
    let sqlob = engine();
    let class = sqlob.class_of::<Person>().unwrap();
    assert_eq!(
        class.creation_statement(&sqlob).unwrap(),
        "CREATE TABLE Person (id CHAR(36) PRIMARY KEY, name VARCHAR(1024), age INTEGER)"
    );
}

#[test]
fn test_customer_creation_statement() {
    let sqlob = engine();
    let class = sqlob.class_of::<Customer>().unwrap();
    assert_eq!(class.name(), "customers");
    assert_eq!(
        class.creation_statement_if_absent(&sqlob).unwrap(),
        "CREATE TABLE IF NOT EXISTS customers (id CHAR(36) PRIMARY KEY, name VARCHAR(1024), \
         active_flag BOOLEAN, nickname VARCHAR(1024), address CHAR(36), \
         FOREIGN KEY (address) REFERENCES Address(id))"
    );
}

#[tokio::test]
async fn test_create_request_creates_referenced_tables_first() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);

    let created = CreateRequest::<Customer>::new().execute(&mut ctx).await.unwrap();
    assert_eq!(created, vec!["Address", "customers"]);

    // Creating again is harmless
    CreateRequest::<Customer>::new().execute(&mut ctx).await.unwrap();

    let rows = ctx
        .fetch(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            &[],
        )
        .await
        .unwrap();
    let tables: Vec<_> = rows.iter().map(|r| r.get("name").cloned()).collect();
    assert_eq!(
        tables,
        vec![
            Some(SqlValue::Text("Address".into())),
            Some(SqlValue::Text("customers".into())),
        ]
    );
    ctx.close().await.unwrap();
}

#[test]
fn test_insertion_statement_spans_rows() {
    let sqlob = engine();
    let class = sqlob.class_of::<Person>().unwrap();
    assert_eq!(
        class.insertion_statement(1),
        "INSERT INTO Person (id, name, age) VALUES (?, ?, ?)"
    );
    assert_eq!(
        class.insertion_statement(2),
        "INSERT INTO Person (id, name, age) VALUES (?, ?, ?), (?, ?, ?)"
    );
    assert_eq!(class.drop_statement(), "DROP TABLE IF EXISTS Person");
}

#[tokio::test]
async fn test_table_inspection() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    let class = sqlob.class_of::<Customer>().unwrap();

    assert!(ctx.tables().await.unwrap().is_empty());
    assert!(!class.exists(&mut ctx).await.unwrap());

    CreateRequest::<Customer>::new().execute(&mut ctx).await.unwrap();
    assert!(class.exists(&mut ctx).await.unwrap());
    assert!(ctx.contains_table("ADDRESS").await.unwrap());
    assert_eq!(ctx.tables().await.unwrap(), vec!["Address", "customers"]);
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_drop_request() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Customer>::new().execute(&mut ctx).await.unwrap();
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();

    let dropped = DropRequest::<Person>::new().execute(&mut ctx).await.unwrap();
    assert_eq!(dropped, vec!["Person"]);
    assert_eq!(ctx.tables().await.unwrap(), vec!["Address", "customers"]);

    // Dropping an absent table is harmless
    DropRequest::<Person>::new().execute(&mut ctx).await.unwrap();

    // Referencing tables go first
    let dropped = DropRequest::<Customer>::new()
        .cascade()
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(dropped, vec!["customers", "Address"]);
    assert!(ctx.tables().await.unwrap().is_empty());
    ctx.close().await.unwrap();
}

// =============================================================================
// Insert and select
// =============================================================================

#[tokio::test]
async fn test_round_trip() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();

    let inserted = InsertRequest::single(Person::new("Ann", 30))
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(inserted.len(), 1);
    let id = inserted.keys()[0];

    let loaded = SelectRequest::<Person>::by_id(id)
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(loaded.first(), Some(&Record::with_id(id, Person::new("Ann", 30))));
    assert_eq!(ctx.get::<Person>(id).await.unwrap(), Some(Person::new("Ann", 30)));
    assert_eq!(ctx.get::<Person>(Uuid::new_v4()).await.unwrap(), None);
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_scalar_kinds_round_trip() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Event>::new().execute(&mut ctx).await.unwrap();

    let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
    let event = Event {
        title: String::from("launch"),
        notes: String::from("long text"),
        day,
        at: day.and_hms_opt(13, 45, 10).unwrap(),
        payload: vec![0, 1, 2, 255],
        ratio: 0.25,
        grade: 'A',
        small: -8,
        big: i64::MAX,
        code: Uuid::new_v4(),
    };

    let id = ctx.put(&event).await.unwrap();
    assert_eq!(ctx.get::<Event>(id).await.unwrap(), Some(event));
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_insert_is_idempotent() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();

    let first = ctx.put(&Person::new("Ann", 30)).await.unwrap();
    let second = ctx.put(&Person::new("Ann", 30)).await.unwrap();
    assert_eq!(first, second);

    let again = InsertRequest::single(Person::new("Ann", 30))
        .execute(&mut ctx)
        .await
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(again.affected_rows(), 0);

    let all = SelectRequest::<Person>::all().execute(&mut ctx).await.unwrap();
    assert_eq!(all.keys(), vec![first]);
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_duplicates_in_one_batch_are_inserted_once() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();

    let inserted = InsertRequest::new(vec![
        Person::new("Ann", 30),
        Person::new("Ann", 30),
        Person::new("Bob", 41),
    ])
    .unwrap()
    .execute(&mut ctx)
    .await
    .unwrap();
    assert_eq!(inserted.len(), 2);
    assert_eq!(
        inserted.into_objects(),
        vec![Person::new("Ann", 30), Person::new("Bob", 41)]
    );

    let all = SelectRequest::<Person>::all().execute(&mut ctx).await.unwrap();
    assert_eq!(all.len(), 2);
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_large_batch_spans_statements() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();

    let people: Vec<_> = (0..700).map(|age| Person::new("Ann", age)).collect();
    let inserted = InsertRequest::new(people)
        .unwrap()
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(inserted.len(), 700);
    assert_eq!(inserted.affected_rows(), 700);

    assert_eq!(CountRequest::<Person>::all().execute(&mut ctx).await.unwrap(), 700);
    assert_eq!(
        CountRequest::<Person>::new(Where::eq("age", 699))
            .execute(&mut ctx)
            .await
            .unwrap(),
        1
    );
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_batch_inserts_nothing() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();

    let taken = Record::new(Person::new("Ann", 30));
    let id = taken.id;
    InsertRequest::with_records([taken])
        .unwrap()
        .execute(&mut ctx)
        .await
        .unwrap();

    // The second record reuses a stored identifier
    let err = InsertRequest::with_records([
        Record::new(Person::new("Bob", 41)),
        Record::with_id(id, Person::new("Cy", 22)),
    ])
    .unwrap()
    .execute(&mut ctx)
    .await
    .unwrap_err();
    assert!(matches!(err, SqlobError::Database { .. }));
    assert_eq!(CountRequest::<Person>::all().execute(&mut ctx).await.unwrap(), 1);
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_reference_cascade() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Customer>::new().execute(&mut ctx).await.unwrap();

    let home = Address::new("Main St", "Springfield");
    let ann = Customer::new("Ann", Some(home.clone())).with_cache("scratch");
    let bob = Customer::new("Bob", Some(home.clone()));

    let inserted = InsertRequest::new(vec![ann, bob])
        .unwrap()
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(inserted.len(), 2);

    // Both customers share one stored address
    let addresses = SelectRequest::<Address>::all().execute(&mut ctx).await.unwrap();
    assert_eq!(addresses.len(), 1);
    let address_id = addresses.keys()[0];

    let rows = ctx
        .fetch("SELECT address FROM customers", &[])
        .await
        .unwrap();
    for row in &rows {
        assert_eq!(row.get("address"), Some(&SqlValue::Text(address_id.to_string())));
    }

    let loaded = SelectRequest::<Customer>::new(Where::eq("name", "Ann"))
        .execute(&mut ctx)
        .await
        .unwrap()
        .into_objects();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].address.as_deref(), Some(&home));
    assert!(loaded[0].active);
    // Fields outside the table keep their defaults
    assert_eq!(loaded[0].cache(), "");
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_null_equality() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Customer>::new().execute(&mut ctx).await.unwrap();

    let homeless = Customer::new("Cy", None);
    let first = ctx.put(&homeless).await.unwrap();
    let second = ctx.put(&homeless).await.unwrap();
    assert_eq!(first, second);

    let mut named = Customer::new("Di", None);
    named.nickname = Some(String::from("D"));
    ctx.put(&named).await.unwrap();

    let unnamed = SelectRequest::<Customer>::new(Where::eq("nickname", None::<String>))
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(unnamed.keys(), vec![first]);
    assert_eq!(unnamed.into_objects()[0].address, None);
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_where_parameters_follow_criteria_order() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();
    InsertRequest::new(vec![
        Person::new("Ann", 30),
        Person::new("Bob", 41),
        Person::new("Cy", 30),
    ])
    .unwrap()
    .execute(&mut ctx)
    .await
    .unwrap();

    let criteria = Where::eq("age", 30).and(Where::eq("name", "Cy").or(Where::eq("name", "Bob")));
    let (sql, params) = criteria.to_sql();
    assert_eq!(sql, "(age = ?) AND ((name = ?) OR (name = ?))");
    assert_eq!(
        params,
        vec![
            SqlValue::Int(30),
            SqlValue::Text("Cy".into()),
            SqlValue::Text("Bob".into()),
        ]
    );

    let found = SelectRequest::<Person>::new(criteria)
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(found.into_objects(), vec![Person::new("Cy", 30)]);
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_select_column_subset() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();
    let id = ctx.put(&Person::new("Ann", 30)).await.unwrap();

    let names = SelectRequest::<Person>::all()
        .columns(&["name"])
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(names.first(), Some(&Record::with_id(id, Person::new("Ann", 0))));

    let err = SelectRequest::<Person>::all()
        .columns(&["height"])
        .execute(&mut ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlobError::UnknownColumn { ref column, .. } if column == "height"));
    ctx.close().await.unwrap();
}

// =============================================================================
// Update and delete
// =============================================================================

#[tokio::test]
async fn test_delete_then_select() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();
    let ann = ctx.put(&Person::new("Ann", 30)).await.unwrap();
    let bob = ctx.put(&Person::new("Bob", 41)).await.unwrap();

    let deleted = DeleteRequest::<Person>::new(Where::eq("age", 30))
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    let matching = SelectRequest::<Person>::new(Where::eq("age", 30))
        .execute(&mut ctx)
        .await
        .unwrap();
    assert!(matching.is_empty());

    let remaining = SelectRequest::<Person>::all().execute(&mut ctx).await.unwrap();
    assert_eq!(remaining.keys(), vec![bob]);
    assert_eq!(ctx.get::<Person>(ann).await.unwrap(), None);

    assert_eq!(
        DeleteRequest::<Person>::by_id(bob).execute(&mut ctx).await.unwrap(),
        1
    );
    assert_eq!(DeleteRequest::<Person>::all().execute(&mut ctx).await.unwrap(), 0);
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_update_matching_rows() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();
    let ann = ctx.put(&Person::new("Ann", 30)).await.unwrap();
    let bob = ctx.put(&Person::new("Bob", 41)).await.unwrap();

    let changed = UpdateRequest::<Person>::set("age", 31)
        .and_set("name", "Anne")
        .filter(Where::eq("name", "Ann"))
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(changed, 1);
    assert_eq!(ctx.get::<Person>(ann).await.unwrap(), Some(Person::new("Anne", 31)));
    assert_eq!(ctx.get::<Person>(bob).await.unwrap(), Some(Person::new("Bob", 41)));

    let err = UpdateRequest::<Person>::set("height", 180)
        .execute(&mut ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlobError::UnknownColumn { .. }));
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_replace_rewrites_every_column() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Customer>::new().execute(&mut ctx).await.unwrap();
    let id = ctx.put(&Customer::new("Ann", None)).await.unwrap();

    let moved = Customer::new("Ann", Some(Address::new("Elm St", "Shelbyville")));
    let changed = UpdateRequest::replace(id, moved.clone())
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(changed, 1);
    assert_eq!(ctx.get::<Customer>(id).await.unwrap(), Some(moved));
    ctx.close().await.unwrap();
}

// =============================================================================
// Reference cycles
// =============================================================================

#[tokio::test]
async fn test_self_reference_is_patched_after_insert() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Loop>::new().execute(&mut ctx).await.unwrap();

    let id = ctx
        .put(&Loop {
            label: String::from("ouroboros"),
        })
        .await
        .unwrap();

    let rows = ctx.fetch("SELECT id, me FROM Loop", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("me"), Some(&SqlValue::Text(id.to_string())));

    // The back-reference is left unset while the row itself is loading
    let loaded = ctx.get::<Loop>(id).await.unwrap();
    assert_eq!(
        loaded,
        Some(Loop {
            label: String::from("ouroboros"),
        })
    );
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_self_reference_in_batch_insert() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Loop>::new().execute(&mut ctx).await.unwrap();

    let record = Record::new(Loop {
        label: String::from("knot"),
    });
    let id = record.id;
    let inserted = InsertRequest::with_records([record])
        .unwrap()
        .execute(&mut ctx)
        .await
        .unwrap();
    assert_eq!(inserted.keys(), vec![id]);

    let rows = ctx
        .fetch("SELECT me FROM Loop WHERE id = ?", &[SqlValue::Text(id.to_string())])
        .await
        .unwrap();
    assert_eq!(rows[0].get("me"), Some(&SqlValue::Text(id.to_string())));
    ctx.close().await.unwrap();
}

// =============================================================================
// Context lifecycle
// =============================================================================

#[tokio::test]
async fn test_statements_released_after_failure() {
    let sqlob = engine();
    let mut connection = connect().await;

    CreateRequest::<Person>::new()
        .execute_on(&sqlob, &mut connection)
        .await
        .unwrap();
    assert_eq!(connection.open_statements(), 0);

    // Address has no table
    let err = SelectRequest::<Address>::all()
        .execute_on(&sqlob, &mut connection)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlobError::Database { .. }));
    assert_eq!(connection.open_statements(), 0);

    {
        let mut ctx = sqlob.context(&mut connection);
        SelectRequest::<Person>::all().execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.open_statements(), 1);
        assert!(SelectRequest::<Address>::all().execute(&mut ctx).await.is_err());
        ctx.close().await.unwrap();
        assert_eq!(ctx.open_statements(), 0);
    }
    assert_eq!(connection.open_statements(), 0);
}

#[tokio::test]
async fn test_closed_context_rejects_requests() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();

    ctx.close().await.unwrap();
    assert!(ctx.is_closed());
    // Closing twice is a no-op
    ctx.close().await.unwrap();

    let err = SelectRequest::<Person>::all().execute(&mut ctx).await.unwrap_err();
    assert!(matches!(err, SqlobError::ClosedResource));
    let err = ctx.put(&Person::new("Ann", 30)).await.unwrap_err();
    assert!(matches!(err, SqlobError::ClosedResource));
}

#[tokio::test]
async fn test_rollback_discards_inserts() {
    let sqlob = engine();
    let mut connection = connect().await;
    let mut ctx = sqlob.context(&mut connection);
    CreateRequest::<Person>::new().execute(&mut ctx).await.unwrap();

    ctx.begin().await.unwrap();
    ctx.put(&Person::new("Ann", 30)).await.unwrap();
    ctx.rollback().await.unwrap();
    assert!(SelectRequest::<Person>::all().execute(&mut ctx).await.unwrap().is_empty());

    ctx.begin().await.unwrap();
    ctx.put(&Person::new("Bob", 41)).await.unwrap();
    ctx.commit().await.unwrap();
    assert_eq!(SelectRequest::<Person>::all().execute(&mut ctx).await.unwrap().len(), 1);

    // An open transaction is rolled back on close
    ctx.begin().await.unwrap();
    ctx.put(&Person::new("Cy", 22)).await.unwrap();
    ctx.close().await.unwrap();
    drop(ctx);

    let remaining = SelectRequest::<Person>::all()
        .execute_on(&sqlob, &mut connection)
        .await
        .unwrap();
    assert_eq!(remaining.into_objects(), vec![Person::new("Bob", 41)]);
}

#[tokio::test]
async fn test_dropped_context_rolls_back_its_transaction() {
    let sqlob = engine();
    let mut connection = connect().await;
    CreateRequest::<Person>::new()
        .execute_on(&sqlob, &mut connection)
        .await
        .unwrap();

    {
        let mut ctx = sqlob.context(&mut connection);
        ctx.begin().await.unwrap();
        ctx.put(&Person::new("Ann", 30)).await.unwrap();
        // Dropped without close
    }

    let mut ctx = sqlob.context(&mut connection);
    ctx.begin().await.unwrap();
    assert_eq!(CountRequest::<Person>::all().execute(&mut ctx).await.unwrap(), 0);
    ctx.put(&Person::new("Bob", 41)).await.unwrap();
    ctx.commit().await.unwrap();
    assert_eq!(
        SelectRequest::<Person>::all()
            .execute(&mut ctx)
            .await
            .unwrap()
            .into_objects(),
        vec![Person::new("Bob", 41)]
    );
    ctx.close().await.unwrap();
}
