//! End-to-end tests over graphs with cycles, sharing, and every built-in
//! kind.

use chrono::TimeZone;

use amber_core::{
    AsyncShelf, Composite, LoadError, MemoryShelf, Model, Node, NodeId, Response, Shelf, Store,
    Value,
};

#[tokio::test]
async fn mutual_friends_reload_as_one_cycle() {
    let store = Store::in_memory();
    store.register_kind("Person");

    let jim = Node::record("Person");
    let bob = Node::record("Person");
    jim.set("name", "Jim").set("friends", Node::list([Value::from(bob.clone())]));
    bob.set("name", "Bob").set("friends", Node::list([Value::from(jim.clone())]));

    let jim_id = store.save(&jim).await.unwrap();
    assert_eq!(jim_id.kind(), "Person");
    // jim, bob, and their two friends lists: four records, none duplicated.
    assert_eq!(store.shelf().len(), 4);

    let fresh_jim = store.load(&jim_id).await.unwrap();
    assert!(!fresh_jim.ptr_eq(&jim));
    assert_eq!(fresh_jim.get("name"), Some(Value::Text("Jim".into())));

    let fresh_bob = fresh_jim
        .get("friends")
        .unwrap()
        .as_node()
        .unwrap()
        .at(0)
        .unwrap()
        .as_node()
        .unwrap()
        .clone();
    assert_eq!(fresh_bob.get("name"), Some(Value::Text("Bob".into())));

    // Bob's first friend is the very node we started from.
    let back = fresh_bob
        .get("friends")
        .unwrap()
        .as_node()
        .unwrap()
        .at(0)
        .unwrap();
    assert!(back.as_node().unwrap().ptr_eq(&fresh_jim));
}

#[tokio::test]
async fn shared_reference_loads_as_one_instance() {
    let store = Store::in_memory();

    let shared = Node::object();
    shared.set("label", "shared");
    let root = Node::object();
    root.set("left", shared.clone()).set("right", shared);

    let id = store.save(&root).await.unwrap();
    // Root plus the shared node: the shared node is written once.
    assert_eq!(store.shelf().len(), 2);

    let fresh = store.load(&id).await.unwrap();
    let left = fresh.get("left").unwrap();
    let right = fresh.get("right").unwrap();
    assert_eq!(left, right);
    assert!(left.as_node().unwrap().ptr_eq(right.as_node().unwrap()));
}

#[tokio::test]
async fn mixed_container_roundtrip() {
    let store = Store::in_memory();
    store.register_func("add", |args| {
        Value::Int(args.iter().filter_map(Value::as_int).sum())
    });
    store.register_func("mul", |args| {
        Value::Int(args.iter().filter_map(Value::as_int).product())
    });

    let plain = Node::object();
    plain.set("hello", "world");
    let nested = Node::list([Value::Text("I'm a nested list".into()), Value::Int(123)]);
    let mapping = Node::map_of([
        (Value::Text("one".into()), Value::Int(1)),
        (Value::Text("two".into()), Value::Int(2)),
    ]);
    let members = Node::set_of([Value::Int(2), Value::Int(3)]);
    let born = chrono::Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap();

    let root = Node::list([
        Value::from(plain),
        Value::from(nested),
        Value::from(mapping),
        Value::from(members),
        Value::from(Node::timestamp(born)),
        Value::from(store.func("add").unwrap()),
        Value::from(store.func("mul").unwrap()),
    ]);

    let id = store.save(&root).await.unwrap();
    let fresh = store.load(&id).await.unwrap();
    assert_eq!(fresh.len(), 7);

    let plain = fresh.at(0).unwrap().as_node().unwrap().clone();
    assert_eq!(plain.get("hello"), Some(Value::Text("world".into())));

    let nested = fresh.at(1).unwrap().as_node().unwrap().clone();
    assert_eq!(nested.at(0), Some(Value::Text("I'm a nested list".into())));
    assert_eq!(nested.at(1), Some(Value::Int(123)));

    match fresh.at(2).unwrap().as_node().unwrap().snapshot() {
        Composite::Map(entries) => {
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0], (Value::Text("one".into()), Value::Int(1)));
            assert_eq!(entries[1], (Value::Text("two".into()), Value::Int(2)));
        }
        other => panic!("expected a mapping, got {}", other.kind_name()),
    }

    match fresh.at(3).unwrap().as_node().unwrap().snapshot() {
        Composite::Set(members) => {
            assert_eq!(members.len(), 2);
            assert!(members.contains(&Value::Int(2)));
            assert!(members.contains(&Value::Int(3)));
        }
        other => panic!("expected a set, got {}", other.kind_name()),
    }

    match fresh.at(4).unwrap().as_node().unwrap().snapshot() {
        Composite::Timestamp(instant) => {
            assert_eq!(instant.timestamp_millis(), born.timestamp_millis());
        }
        other => panic!("expected a timestamp, got {}", other.kind_name()),
    }

    match fresh.at(5).unwrap().as_node().unwrap().snapshot() {
        Composite::Func(add) => {
            assert_eq!(add.call(&[Value::Int(1), Value::Int(2)]), Value::Int(3));
        }
        other => panic!("expected a func, got {}", other.kind_name()),
    }
    match fresh.at(6).unwrap().as_node().unwrap().snapshot() {
        Composite::Func(mul) => {
            assert_eq!(mul.call(&[Value::Int(5), Value::Int(2)]), Value::Int(10));
        }
        other => panic!("expected a func, got {}", other.kind_name()),
    }
}

#[tokio::test]
async fn response_is_opaque_and_roundtrips() {
    let store = Store::in_memory();

    let response = Response::new(201, "Created", b"{\"ok\":true}".to_vec())
        .with_header("Content-Type", "application/json")
        .with_header("X-Request-Id", "42");
    let root = Node::object();
    root.set("reply", Node::response(response.clone()));

    let id = store.save(&root).await.unwrap();
    // The response is a single record; nothing inside it is walked.
    assert_eq!(store.shelf().len(), 2);

    let fresh = store.load(&id).await.unwrap();
    match fresh.get("reply").unwrap().as_node().unwrap().snapshot() {
        Composite::Response(fresh_response) => {
            assert_eq!(fresh_response, response);
            assert_eq!(fresh_response.header("content-type"), Some("application/json"));
        }
        other => panic!("expected a response, got {}", other.kind_name()),
    }
}

#[tokio::test]
async fn stored_text_matching_an_id_stays_text() {
    let store = Store::in_memory();

    let target = Node::object();
    let target_id = store.save(&target).await.unwrap();

    // A string field whose content happens to equal a rendered id must
    // survive as a string, not come back as a reference.
    let tricky = Node::object();
    tricky.set("note", target_id.to_string());
    let id = store.save(&tricky).await.unwrap();

    let fresh = store.load(&id).await.unwrap();
    assert_eq!(fresh.get("note"), Some(Value::Text(target_id.to_string())));
}

#[tokio::test]
async fn load_of_foreign_id_fails_loudly() {
    let store = Store::in_memory();

    let bogus = NodeId::mint("Bogus");
    assert!(matches!(
        store.load(&bogus).await,
        Err(LoadError::UnknownType(kind)) if kind == "Bogus"
    ));

    let dangling = NodeId::mint("Object");
    assert!(matches!(
        store.load(&dangling).await,
        Err(LoadError::MissingRecord(_))
    ));
}

/// Shelf wrapper that records the order ids are written in.
#[derive(Default)]
struct RecordingShelf {
    inner: MemoryShelf,
    writes: std::sync::Mutex<Vec<NodeId>>,
}

impl Shelf for RecordingShelf {
    type Error = std::convert::Infallible;

    fn get(&self, id: &NodeId) -> Result<Option<Vec<u8>>, Self::Error> {
        self.inner.get(id)
    }

    fn put(&self, id: &NodeId, record: &[u8]) -> Result<(), Self::Error> {
        self.writes.lock().unwrap().push(id.clone());
        self.inner.put(id, record)
    }

    fn has(&self, id: &NodeId) -> Result<bool, Self::Error> {
        self.inner.has(id)
    }
}

#[tokio::test]
async fn children_are_written_before_parents() {
    let store = Store::new(RecordingShelf::default());

    let leaf = Node::object();
    let middle = Node::object();
    middle.set("leaf", leaf);
    let root = Node::object();
    root.set("middle", middle);

    let root_id = store.save(&root).await.unwrap();

    let writes = store.shelf().writes.lock().unwrap().clone();
    assert_eq!(writes.len(), 3);
    // Leaf first, root last.
    assert_eq!(writes[2], root_id);
}

/// Shelf whose every operation suspends before completing, standing in for
/// a network-backed medium.
#[derive(Default)]
struct SuspendingShelf {
    inner: MemoryShelf,
}

impl AsyncShelf for SuspendingShelf {
    type Error = std::convert::Infallible;

    async fn async_get(&self, id: &NodeId) -> Result<Option<Vec<u8>>, Self::Error> {
        tokio::task::yield_now().await;
        self.inner.get(id)
    }

    async fn async_put(&self, id: &NodeId, record: &[u8]) -> Result<(), Self::Error> {
        tokio::task::yield_now().await;
        self.inner.put(id, record)
    }

    async fn async_has(&self, id: &NodeId) -> Result<bool, Self::Error> {
        tokio::task::yield_now().await;
        self.inner.has(id)
    }
}

#[tokio::test]
async fn suspending_shelf_runs_the_same_algorithm() {
    let store = Store::new(SuspendingShelf::default());

    let a = Node::object();
    let b = Node::object();
    a.set("peer", b.clone());
    b.set("peer", a.clone());

    let id = store.save(&a).await.unwrap();
    let fresh = store.load(&id).await.unwrap();

    let peer = fresh.get("peer").unwrap().as_node().unwrap().clone();
    let back = peer.get("peer").unwrap();
    assert!(back.as_node().unwrap().ptr_eq(&fresh));
}

#[derive(Model)]
struct Person {
    name: String,
    age: i64,
    nickname: Option<String>,
    friends: Vec<Node>,
    #[model(skip)]
    visits: i64,
}

#[derive(Model)]
#[model(name = "Hobby")]
struct HobbyModel {
    #[model(rename = "title")]
    label: String,
}

#[tokio::test]
async fn derived_model_roundtrip() {
    let store = Store::in_memory();
    store.register_kind("Person");

    let fencing = HobbyModel {
        label: "fencing".into(),
    };
    let hobby_id = store.save_model(&fencing).await.unwrap();
    assert_eq!(hobby_id.kind(), "Hobby");

    let bob = Node::record("Person");
    bob.set("name", "Bob").set("age", 44).set("friends", Node::list([]));

    let jim = Person {
        name: "Jim".into(),
        age: 41,
        nickname: None,
        friends: vec![bob],
        visits: 7,
    };
    let jim_id = store.save_model(&jim).await.unwrap();
    assert_eq!(jim_id.kind(), "Person");

    let fresh: Person = store.load_model(&jim_id).await.unwrap();
    assert_eq!(fresh.name, "Jim");
    assert_eq!(fresh.age, 41);
    assert_eq!(fresh.nickname, None);
    assert_eq!(fresh.friends.len(), 1);
    assert_eq!(
        fresh.friends[0].get("name"),
        Some(Value::Text("Bob".into()))
    );
    // Skipped fields rebuild from Default.
    assert_eq!(fresh.visits, 0);

    let hobby: HobbyModel = store.load_model(&hobby_id).await.unwrap();
    assert_eq!(hobby.label, "fencing");
}
