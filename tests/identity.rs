//! Integration tests for identity resolution against a real SQLite store.

use chrono::{TimeZone, Utc};
use purplebot::bus::Context;
use purplebot::db::{Database, DbError, Hostmask, IdentityStore, User};

fn who(nick: &str, username: &str, hostname: &str) -> Context {
    Context {
        nick: nick.into(),
        username: username.into(),
        hostname: hostname.into(),
        ..Context::default()
    }
}

async fn add(store: &dyn IdentityStore, user: User, mask: &str) -> (i64, i64) {
    let mut user = user;
    let user_id = store.set_user(&mut user).await.unwrap();
    let mut hostmask = Hostmask::parse(user_id, mask);
    let mask_id = store.set_hostmask(&mut hostmask).await.unwrap();
    (user_id, mask_id)
}

#[tokio::test]
async fn user_round_trip_keeps_fields() {
    let db = Database::new(":memory:").await.unwrap();
    let store = db.users();
    let mut user = User {
        admin: true,
        last_seen: Some(Utc.with_ymd_and_hms(2024, 5, 4, 3, 2, 1).unwrap()),
        ..User::named("alice")
    };

    let id = store.set_user(&mut user).await.unwrap();
    let loaded = store.get_user(id).await.unwrap().unwrap();

    assert_eq!(loaded.name, user.name);
    assert_eq!(loaded.admin, user.admin);
    assert_eq!(loaded.last_seen, user.last_seen);
}

#[tokio::test]
async fn matching_and_admin_decisions() {
    let db = Database::new(":memory:").await.unwrap();
    let store = db.users();
    add(
        &store,
        User {
            admin: true,
            ..User::named("alice")
        },
        "alice!~al@home.example",
    )
    .await;
    add(&store, User::named("bob"), "bob!~bob@*.example.org").await;
    add(
        &store,
        User {
            admin: true,
            ..User::named("wild")
        },
        "w?ld!*@*.wild",
    )
    .await;

    assert_eq!(store.match_users_hostmask("*", "*", "*").await.unwrap().len(), 3);
    assert!(
        store
            .match_users_hostmask("*", "*", "nowhere.test")
            .await
            .unwrap()
            .is_empty()
    );

    assert!(store.has_admin(&who("alice", "~al", "home.example")).await.unwrap());
    assert!(!store.has_admin(&who("bob", "~bob", "irc.example.org")).await.unwrap());
    assert!(!store.has_admin(&who("eve", "~e", "evil.test")).await.unwrap());
    assert!(store.has_admin(&who("wold", "x", "den.wild")).await.unwrap());
}

#[tokio::test]
async fn ambiguous_identity_is_denied() {
    let db = Database::new(":memory:").await.unwrap();
    let store = db.users();
    add(
        &store,
        User {
            admin: true,
            ..User::named("root")
        },
        "root!*@*",
    )
    .await;
    add(
        &store,
        User {
            admin: true,
            ..User::named("ops")
        },
        "r*!~r@host",
    )
    .await;

    let users = store.match_users_hostmask("root", "~r", "host").await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(!store.has_admin(&who("root", "~r", "host")).await.unwrap());
}

#[tokio::test]
async fn delete_user_cascades() {
    let db = Database::new(":memory:").await.unwrap();
    let store = db.users();
    let (user_id, first) = add(&store, User::named("carol"), "carol!~c@a").await;
    let mut second = Hostmask::parse(user_id, "carol_!~c2@b");
    let second = store.set_hostmask(&mut second).await.unwrap();

    store.delete_user(&user_id).await.unwrap();

    assert!(store.get_user(user_id).await.unwrap().is_none());
    assert!(store.get_hostmask(first).await.unwrap().is_none());
    assert!(store.get_hostmask(second).await.unwrap().is_none());
}

#[tokio::test]
async fn uniqueness_violations_surface() {
    let db = Database::new(":memory:").await.unwrap();
    let store = db.users();
    let (user_id, _) = add(&store, User::named("dave"), "dave!~d@d.example").await;

    let err = store.set_user(&mut User::named("dave")).await.unwrap_err();
    assert!(err.is_constraint(), "{err}");

    for mask in ["dave!x@y", "x!~d@y", "x!y@d.example"] {
        let mut hostmask = Hostmask::parse(user_id, mask);
        let err = store.set_hostmask(&mut hostmask).await.unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)), "{mask}: {err}");
    }
}

#[tokio::test]
async fn concurrent_writer_gets_busy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("user.db");
    let path = path.to_str().unwrap();
    let first = Database::new(path).await.unwrap();
    let second = Database::new(path).await.unwrap();

    let mut tx = first.pool().begin().await.unwrap();
    sqlx::query("INSERT INTO user (name) VALUES ('holder')")
        .execute(&mut *tx)
        .await
        .unwrap();

    let err = second
        .users()
        .set_user(&mut User::named("waiter"))
        .await
        .unwrap_err();
    assert!(err.is_transient(), "{err}");

    tx.rollback().await.unwrap();
    second
        .users()
        .set_user(&mut User::named("waiter"))
        .await
        .unwrap();
}
