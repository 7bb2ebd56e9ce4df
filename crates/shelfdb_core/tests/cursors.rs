//! Cursor walks over stores and indexes.

use shelfdb_core::{
    Cursor, Database, Direction, Engine, ErrorKind, IndexParams, Key, KeyRange, StoreParams,
    TransactionMode, TransactionState, Value,
};

fn shelf() -> (Engine, Database) {
    let engine = Engine::open_in_memory();
    let db = engine
        .open("shelf", 1, |txn, _, _| {
            let books = txn.create_object_store("books", StoreParams::new().key_path("id"))?;
            books.create_index("by_author", "author", IndexParams::new())?;
            Ok(())
        })
        .unwrap();
    let authors = ["Herbert", "Austen", "Herbert", "Le Guin", "Austen", "Herbert"];
    for (i, author) in authors.iter().enumerate() {
        let id = i as i64 + 1;
        let book = Value::object([("id", Value::from(id)), ("author", Value::from(*author))]);
        db.add("books", book).unwrap();
    }
    (engine, db)
}

/// Drains a cursor into `(key, primary key)` pairs.
fn walk(cursor: &mut Cursor<'_>) -> Vec<(Key, Key)> {
    let mut seen = Vec::new();
    while let (Some(key), Some(pk)) = (cursor.key(), cursor.primary_key()) {
        seen.push((key.clone(), pk.clone()));
        cursor.advance().unwrap();
    }
    seen
}

fn pair(key: impl Into<Key>, pk: i64) -> (Key, Key) {
    (key.into(), Key::from(pk))
}

#[test]
fn store_cursor_matches_get_all() {
    let (_engine, db) = shelf();
    let txn = db.transaction(["books"], TransactionMode::ReadOnly).unwrap();
    let books = txn.object_store("books").unwrap();

    let range = KeyRange::bound(2, 5, false, true).unwrap();
    let mut values = Vec::new();
    let mut cursor = books.open_cursor(Some(range.clone()), Direction::Next).unwrap();
    while let Some(v) = cursor.value() {
        values.push(v.clone());
        cursor.advance().unwrap();
    }
    assert_eq!(values, books.get_all(Some(range)).unwrap());

    let mut reverse = books.open_cursor(None, Direction::Prev).unwrap();
    let keys: Vec<Key> = walk(&mut reverse).into_iter().map(|(k, _)| k).collect();
    let mut expected = books.get_all_keys(None).unwrap();
    expected.reverse();
    assert_eq!(keys, expected);
}

#[test]
fn index_cursor_matches_index_get_all() {
    let (_engine, db) = shelf();
    let txn = db.transaction(["books"], TransactionMode::ReadOnly).unwrap();
    let index = txn.object_store("books").unwrap().index("by_author").unwrap();

    let mut cursor = index.open_cursor(None, Direction::Next).unwrap();
    let pks: Vec<Key> = walk(&mut cursor).into_iter().map(|(_, pk)| pk).collect();
    assert_eq!(pks, index.get_all_keys(None).unwrap());
    assert_eq!(
        pks,
        [2, 5, 1, 3, 6, 4].map(Key::from).to_vec()
    );
}

#[test]
fn index_cursor_directions() {
    let (_engine, db) = shelf();
    let txn = db.transaction(["books"], TransactionMode::ReadOnly).unwrap();
    let index = txn.object_store("books").unwrap().index("by_author").unwrap();

    let mut prev = index.open_cursor(None, Direction::Prev).unwrap();
    assert_eq!(
        walk(&mut prev),
        vec![
            pair("Le Guin", 4),
            pair("Herbert", 6),
            pair("Herbert", 3),
            pair("Herbert", 1),
            pair("Austen", 5),
            pair("Austen", 2),
        ]
    );

    let mut next_unique = index.open_cursor(None, Direction::NextUnique).unwrap();
    assert_eq!(
        walk(&mut next_unique),
        vec![pair("Austen", 2), pair("Herbert", 1), pair("Le Guin", 4)]
    );

    let mut prev_unique = index.open_cursor(None, Direction::PrevUnique).unwrap();
    assert_eq!(
        walk(&mut prev_unique),
        vec![pair("Le Guin", 4), pair("Herbert", 1), pair("Austen", 2)]
    );

    let only = KeyRange::only("Herbert");
    let mut ranged = index.open_cursor(Some(only), Direction::Prev).unwrap();
    assert_eq!(
        walk(&mut ranged),
        vec![pair("Herbert", 6), pair("Herbert", 3), pair("Herbert", 1)]
    );
}

#[test]
fn continue_and_advance_by() {
    let (_engine, db) = shelf();
    let txn = db.transaction(["books"], TransactionMode::ReadOnly).unwrap();
    let books = txn.object_store("books").unwrap();

    let mut cursor = books.open_cursor(None, Direction::Next).unwrap();
    assert_eq!(cursor.key(), Some(&Key::from(1)));
    assert!(cursor.advance_by(2).unwrap());
    assert_eq!(cursor.key(), Some(&Key::from(3)));
    assert!(cursor.continue_to(5).unwrap());
    assert_eq!(cursor.key(), Some(&Key::from(5)));

    let err = cursor.continue_to(4).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Data);
    assert_eq!(cursor.key(), Some(&Key::from(5)));
    assert_eq!(cursor.advance_by(0).unwrap_err().kind(), ErrorKind::Data);

    assert!(!cursor.advance_by(10).unwrap());
    assert!(cursor.is_exhausted());
    assert_eq!(cursor.advance().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(
        cursor.continue_primary_key(1, 1).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(txn.state(), TransactionState::Active);
}

#[test]
fn continue_primary_key_on_index() {
    let (_engine, db) = shelf();
    let txn = db.transaction(["books"], TransactionMode::ReadOnly).unwrap();
    let index = txn.object_store("books").unwrap().index("by_author").unwrap();

    let mut cursor = index.open_cursor(None, Direction::Next).unwrap();
    assert!(cursor.continue_primary_key("Herbert", 2).unwrap());
    assert_eq!(cursor.primary_key(), Some(&Key::from(3)));
    assert!(cursor.continue_to("Le Guin").unwrap());
    assert_eq!(cursor.primary_key(), Some(&Key::from(4)));
    assert!(!cursor.continue_to("Zola").unwrap());

    let mut unique = index.open_cursor(None, Direction::NextUnique).unwrap();
    assert_eq!(
        unique.continue_primary_key("Herbert", 3).unwrap_err().kind(),
        ErrorKind::InvalidState
    );

    let mut backwards = index.open_cursor(None, Direction::Prev).unwrap();
    assert!(backwards.continue_primary_key("Herbert", 2).unwrap());
    assert_eq!(backwards.primary_key(), Some(&Key::from(1)));
}

#[test]
fn update_and_delete_through_cursor() {
    let (_engine, db) = shelf();
    db.run(["books"], TransactionMode::ReadWrite, |txn| {
        let books = txn.object_store("books")?;
        let index = books.index("by_author")?;
        let mut cursor = index.open_cursor(Some(KeyRange::only("Austen")), Direction::Next)?;
        while let Some(value) = cursor.value().cloned() {
            let id = value.get_path("id").and_then(Value::as_integer).unwrap_or_default();
            if id == 2 {
                cursor.delete()?;
            } else {
                let mut renamed = value;
                renamed.set_path("author", Value::from("Jane Austen"))?;
                cursor.update(renamed)?;
                assert_eq!(
                    cursor.value().and_then(|v| v.get_path("author")),
                    Some(&Value::from("Jane Austen"))
                );
            }
            cursor.advance()?;
        }
        Ok(())
    })
    .unwrap();

    assert_eq!(db.count("books", None).unwrap(), 5);
    let jane = db
        .get_all_from_index("books", "by_author", Some(KeyRange::only("Jane Austen")))
        .unwrap();
    assert_eq!(jane.len(), 1);
    assert_eq!(jane[0].get_path("id"), Some(&Value::Integer(5)));
}

#[test]
fn update_must_keep_inline_key() {
    let (_engine, db) = shelf();
    let txn = db.transaction(["books"], TransactionMode::ReadWrite).unwrap();
    let books = txn.object_store("books").unwrap();
    let mut cursor = books.open_cursor(None, Direction::Next).unwrap();
    let moved = Value::object([("id", Value::from(99)), ("author", Value::from("x"))]);
    assert_eq!(cursor.update(moved).unwrap_err().kind(), ErrorKind::Data);
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[test]
fn read_only_cursor_cannot_write() {
    let (_engine, db) = shelf();
    let txn = db.transaction(["books"], TransactionMode::ReadOnly).unwrap();
    let books = txn.object_store("books").unwrap();
    let mut cursor = books.open_cursor(None, Direction::Next).unwrap();
    assert_eq!(cursor.delete().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(txn.state(), TransactionState::Active);
}

#[test]
fn cursor_sees_writes_ahead_of_it() {
    let (_engine, db) = shelf();
    let txn = db.transaction(["books"], TransactionMode::ReadWrite).unwrap();
    let books = txn.object_store("books").unwrap();
    let mut cursor = books.open_cursor(None, Direction::Next).unwrap();
    books
        .add(Value::object([("id", Value::from(50)), ("author", Value::from("Zola"))]))
        .unwrap();
    books.delete(2).unwrap();

    let keys: Vec<Key> = walk(&mut cursor).into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, [1, 3, 4, 5, 6, 50].map(Key::from).to_vec());
}

#[test]
fn cursor_dies_with_its_transaction() {
    let (_engine, db) = shelf();
    let txn = db.transaction(["books"], TransactionMode::ReadWrite).unwrap();
    let books = txn.object_store("books").unwrap();
    let mut cursor = books.open_cursor(None, Direction::Next).unwrap();

    let dup = Value::object([("id", Value::from(1)), ("author", Value::from("dup"))]);
    assert_eq!(books.add(dup).unwrap_err().kind(), ErrorKind::Constraint);
    assert_eq!(cursor.advance().unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn empty_range_cursor_starts_exhausted() {
    let (_engine, db) = shelf();
    let txn = db.transaction(["books"], TransactionMode::ReadOnly).unwrap();
    let books = txn.object_store("books").unwrap();
    let cursor = books
        .open_cursor(Some(KeyRange::lower_bound(100, false)), Direction::Prev)
        .unwrap();
    assert!(cursor.is_exhausted());
    assert_eq!(cursor.value(), None);
    assert_eq!(cursor.direction(), Direction::Prev);
}
