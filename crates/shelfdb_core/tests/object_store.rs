//! Object store CRUD, key derivation and transaction outcomes.

use shelfdb_core::{
    Database, Engine, ErrorKind, IndexParams, Key, KeyPath, KeyRange, StoreParams, TransactionMode,
    TransactionState, Value,
};

fn library() -> (Engine, Database) {
    let engine = Engine::open_in_memory();
    let db = engine
        .open("library", 1, |txn, _, _| {
            let books = txn.create_object_store("books", StoreParams::new().key_path("isbn"))?;
            books.create_index("by_author", "author", IndexParams::new())?;
            txn.create_object_store("notes", StoreParams::new().auto_increment(true))?;
            txn.create_object_store(
                "tasks",
                StoreParams::new().key_path("meta.id").auto_increment(true),
            )?;
            txn.create_object_store("plain", StoreParams::new())?;
            Ok(())
        })
        .unwrap();
    (engine, db)
}

fn book(isbn: i64, title: &str) -> Value {
    Value::object([
        ("isbn", Value::from(isbn)),
        ("title", Value::from(title)),
        ("author", Value::from("Anon")),
    ])
}

fn isbns(values: &[Value]) -> Vec<i64> {
    values
        .iter()
        .map(|v| v.get_path("isbn").and_then(Value::as_integer).unwrap())
        .collect()
}

#[test]
fn get_all_is_ascending_and_count_matches() {
    let (_engine, db) = library();
    for isbn in [5, 1, 9, 3, 7] {
        db.add("books", book(isbn, "t")).unwrap();
    }
    db.put("books", book(3, "revised")).unwrap();
    db.delete("books", 9).unwrap();

    let all = db.get_all("books", None).unwrap();
    assert_eq!(isbns(&all), vec![1, 3, 5, 7]);
    assert_eq!(db.count("books", None).unwrap(), 4);
    assert_eq!(
        db.get("books", 3).unwrap().unwrap().get_path("title"),
        Some(&Value::from("revised"))
    );
}

#[test]
fn duplicate_add_aborts_whole_transaction() {
    let (_engine, db) = library();
    db.add("books", book(1, "original")).unwrap();

    let txn = db.transaction(["books"], TransactionMode::ReadWrite).unwrap();
    let store = txn.object_store("books").unwrap();
    store.add(book(2, "second")).unwrap();
    let err = store.add(book(1, "duplicate")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Constraint);
    assert_eq!(txn.state(), TransactionState::Aborted);

    let after = store.get(2).unwrap_err();
    assert_eq!(after.kind(), ErrorKind::InvalidState);

    let outcome = txn.commit().unwrap_err();
    assert_eq!(outcome.kind(), ErrorKind::Abort);

    let all = db.get_all("books", None).unwrap();
    assert_eq!(isbns(&all), vec![1]);
    assert_eq!(all[0].get_path("title"), Some(&Value::from("original")));
}

#[test]
fn put_inserts_then_overwrites() {
    let (_engine, db) = library();
    assert_eq!(db.put("books", book(4, "first")).unwrap(), Key::from(4));
    assert_eq!(db.put("books", book(4, "second")).unwrap(), Key::from(4));

    assert_eq!(db.count("books", None).unwrap(), 1);
    let stored = db.get("books", 4).unwrap().unwrap();
    assert_eq!(stored.get_path("title"), Some(&Value::from("second")));
}

#[test]
fn abort_discards_every_operation() {
    let (_engine, db) = library();
    db.add("books", book(1, "keep")).unwrap();
    db.add("notes", Value::from("n1")).unwrap();

    let txn = db
        .transaction(["books", "notes"], TransactionMode::ReadWrite)
        .unwrap();
    {
        let books = txn.object_store("books").unwrap();
        books.put(book(1, "changed")).unwrap();
        books.add(book(2, "new")).unwrap();
        books.delete(1).unwrap();
        let notes = txn.object_store("notes").unwrap();
        notes.clear().unwrap();
        notes.add(Value::from("n2")).unwrap();
    }
    txn.abort().unwrap();

    let books = db.get_all("books", None).unwrap();
    assert_eq!(isbns(&books), vec![1]);
    assert_eq!(books[0].get_path("title"), Some(&Value::from("keep")));
    assert_eq!(db.get_all("notes", None).unwrap(), vec![Value::from("n1")]);
    // The generator went back too.
    assert_eq!(db.add("notes", Value::from("n3")).unwrap(), Key::from(2));
}

#[test]
fn dropping_an_active_transaction_commits() {
    let (_engine, db) = library();
    {
        let txn = db.transaction(["books"], TransactionMode::ReadWrite).unwrap();
        txn.object_store("books").unwrap().add(book(8, "t")).unwrap();
    }
    assert_eq!(db.count("books", None).unwrap(), 1);
}

#[test]
fn run_commits_on_ok_and_aborts_on_err() {
    let (_engine, db) = library();
    db.run(["books"], TransactionMode::ReadWrite, |txn| {
        txn.object_store("books")?.add(book(1, "a"))?;
        Ok(())
    })
    .unwrap();

    let err = db
        .run(["books"], TransactionMode::ReadWrite, |txn| {
            txn.object_store("books")?.add(book(2, "b"))?;
            Err::<(), _>(shelfdb_core::CoreError::invalid_state("caller gave up"))
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(db.count("books", None).unwrap(), 1);
}

#[test]
fn swallowed_failure_still_aborts() {
    let (_engine, db) = library();
    db.add("books", book(1, "a")).unwrap();

    let err = db
        .run(["books"], TransactionMode::ReadWrite, |txn| {
            let books = txn.object_store("books")?;
            books.add(book(2, "b"))?;
            let _ = books.add(book(1, "dup"));
            Ok(())
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Abort);
    assert_eq!(db.count("books", None).unwrap(), 1);
}

#[test]
fn misuse_errors_do_not_abort() {
    let (_engine, db) = library();
    db.add("books", book(1, "a")).unwrap();

    let txn = db.transaction(["books"], TransactionMode::ReadOnly).unwrap();
    let books = txn.object_store("books").unwrap();
    assert_eq!(
        books.add(book(2, "b")).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        txn.object_store("notes").unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        txn.object_store("ghost").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        books.index("missing").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(txn.state(), TransactionState::Active);
    assert_eq!(books.count(None).unwrap(), 1);
    txn.commit().unwrap();
}

#[test]
fn transaction_preconditions() {
    let (_engine, db) = library();

    let empty: [&str; 0] = [];
    assert_eq!(
        db.transaction(empty, TransactionMode::ReadOnly).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        db.transaction(["ghost"], TransactionMode::ReadOnly).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        db.transaction(["books"], TransactionMode::VersionChange)
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );

    db.close();
    assert!(db.is_closed());
    assert_eq!(
        db.transaction(["books"], TransactionMode::ReadOnly).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
}

#[test]
fn key_derivation_errors() {
    let (_engine, db) = library();

    let missing = Value::object([("title", Value::from("no isbn"))]);
    assert_eq!(db.add("books", missing).unwrap_err().kind(), ErrorKind::Data);

    let bad_key = Value::object([("isbn", Value::Bool(true))]);
    assert_eq!(db.add("books", bad_key).unwrap_err().kind(), ErrorKind::Data);

    assert_eq!(
        db.add_with_key("books", book(1, "t"), 1).unwrap_err().kind(),
        ErrorKind::Data
    );
    assert_eq!(
        db.add("plain", Value::from("no key")).unwrap_err().kind(),
        ErrorKind::Data
    );
    assert_eq!(db.add_with_key("plain", Value::from("x"), "k").unwrap(), Key::from("k"));
}

#[test]
fn generator_follows_explicit_keys() {
    let (_engine, db) = library();
    assert_eq!(db.add("notes", Value::from("a")).unwrap(), Key::from(1));
    assert_eq!(db.add("notes", Value::from("b")).unwrap(), Key::from(2));
    assert_eq!(
        db.add_with_key("notes", Value::from("c"), 10).unwrap(),
        Key::from(10)
    );
    assert_eq!(
        db.put_with_key("notes", Value::from("d"), 4).unwrap(),
        Key::from(4)
    );
    assert_eq!(db.add("notes", Value::from("e")).unwrap(), Key::from(11));
}

#[test]
fn generated_key_is_injected() {
    let (_engine, db) = library();
    let task = Value::object([("title", Value::from("write tests"))]);
    let key = db.add("tasks", task).unwrap();
    assert_eq!(key, Key::from(1));

    let stored = db.get("tasks", 1).unwrap().unwrap();
    assert_eq!(stored.get_path("meta.id"), Some(&Value::Integer(1)));

    // A value that already carries a key keeps it.
    let explicit = Value::object([("meta", Value::object([("id", Value::from(40))]))]);
    assert_eq!(db.add("tasks", explicit).unwrap(), Key::from(40));
    assert_eq!(
        db.add("tasks", Value::object([("title", Value::from("next"))]))
            .unwrap(),
        Key::from(41)
    );
}

#[test]
fn range_reads_and_deletes() {
    let (_engine, db) = library();
    for isbn in 1..=10 {
        db.add("books", book(isbn, "t")).unwrap();
    }

    db.run(["books"], TransactionMode::ReadWrite, |txn| {
        let books = txn.object_store("books")?;
        let middle = KeyRange::bound(4, 6, false, false)?;

        assert_eq!(books.count(Some(middle.clone()))?, 3);
        assert_eq!(
            books.get_all_keys(Some(middle.clone()))?,
            vec![Key::from(4), Key::from(5), Key::from(6)]
        );
        assert_eq!(books.get_key(KeyRange::lower_bound(8, true))?, Some(Key::from(9)));
        assert_eq!(isbns(&books.get_all_limited(None, Some(2))?), vec![1, 2]);
        assert_eq!(books.get(KeyRange::upper_bound(0, false))?, None);

        books.delete_range(middle)?;
        assert_eq!(books.count(None)?, 7);
        Ok(())
    })
    .unwrap();

    let all = db.get_all("books", None).unwrap();
    assert_eq!(isbns(&all), vec![1, 2, 3, 7, 8, 9, 10]);
}

#[test]
fn store_metadata() {
    let (_engine, db) = library();
    assert_eq!(db.store_names(), vec!["books", "notes", "plain", "tasks"]);
    assert_eq!(db.name(), "library");
    assert_eq!(db.version(), 1);

    let txn = db.transaction(["books", "notes"], TransactionMode::ReadOnly).unwrap();
    assert_eq!(txn.store_names(), vec!["books", "notes"]);
    let books = txn.object_store("books").unwrap();
    assert_eq!(books.name(), "books");
    assert_eq!(books.key_path().unwrap(), Some(KeyPath::from("isbn")));
    assert!(!books.auto_increment().unwrap());
    assert_eq!(books.index_names().unwrap(), vec!["by_author"]);
    assert!(txn.object_store("notes").unwrap().auto_increment().unwrap());
}
