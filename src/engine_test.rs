use rmpv::Value;

use super::*;

fn open_engine() -> (tempfile::TempDir, Arc<Engine>) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path());
    let engine = Engine::open(config).unwrap();
    engine.collection("docs", Schema::new());
    (dir, engine)
}

fn payload(pairs: Vec<(&str, Value)>) -> Value {
    Value::Map(pairs.into_iter().map(|(k, v)| (Value::from(k), v)).collect())
}

#[tokio::test]
async fn test_create_and_get() {
    let (_dir, engine) = open_engine();
    let doc = payload(vec![("name", Value::from("ada"))]);

    let created = engine.handle(Action::Create, "docs", payload(vec![("doc", doc.clone())])).await;
    assert_eq!(created.status, Status::Ok);
    let id = map_get(&created.data.unwrap(), "id").unwrap().as_u64().unwrap();

    let got = engine.handle(Action::Get, "docs", payload(vec![("id", Value::from(id))])).await;
    assert_eq!(got.status, Status::Ok);
    let got_doc = got.data.unwrap();
    assert_eq!(map_get(&got_doc, "id"), Some(&Value::from(id)));
    assert_eq!(map_get(&got_doc, "doc"), Some(&doc));
}

#[tokio::test]
async fn test_unknown_collection_errors() {
    let (_dir, engine) = open_engine();
    let resp = engine.handle(Action::Get, "ghost", payload(vec![("id", Value::from(0u64))])).await;
    assert_eq!(resp.status, Status::Error);
}

#[tokio::test]
async fn test_update_and_delete() {
    let (_dir, engine) = open_engine();
    let created = engine.handle(Action::Create, "docs", payload(vec![("doc", Value::from("v1"))])).await;
    let id = map_get(&created.data.unwrap(), "id").unwrap().as_u64().unwrap();

    let updated = engine
        .handle(Action::Update, "docs", payload(vec![("id", Value::from(id)), ("doc", Value::from("v2"))]))
        .await;
    assert_eq!(updated.status, Status::Ok);

    let deleted = engine.handle(Action::Delete, "docs", payload(vec![("id", Value::from(id))])).await;
    assert_eq!(deleted.status, Status::Ok);

    let missing = engine.handle(Action::Get, "docs", payload(vec![("id", Value::from(id))])).await;
    assert_eq!(missing.status, Status::Error);
}

#[tokio::test]
async fn test_create_many_and_get_many() {
    let (_dir, engine) = open_engine();
    let docs = Value::Array(vec![Value::from("a"), Value::from("b")]);
    let created = engine.handle(Action::CreateMany, "docs", payload(vec![("docs", docs)])).await;
    assert_eq!(created.status, Status::Ok);
    let created_data = created.data.unwrap();
    let ids = map_get(&created_data, "ids").unwrap().as_array().unwrap().clone();
    assert_eq!(ids.len(), 2);

    let got = engine.handle(Action::GetMany, "docs", payload(vec![("ids", Value::Array(ids.clone()))])).await;
    assert_eq!(got.status, Status::Ok);
    let got_map = got.data.unwrap().as_map().unwrap().clone();
    assert_eq!(got_map.len(), 2);
    for id in &ids {
        assert!(got_map.iter().any(|(k, _)| k == id));
    }
}

#[tokio::test]
async fn test_find() {
    let (_dir, engine) = open_engine();
    let doc = payload(vec![("age", Value::from(30i64))]);
    engine.handle(Action::Create, "docs", payload(vec![("doc", doc)])).await;

    let where_clause = payload(vec![
        ("field", Value::from("age")),
        ("op", payload(vec![("gte", Value::from(18i64))])),
    ]);
    let resp = engine.handle(Action::Find, "docs", payload(vec![("where", where_clause)])).await;
    assert_eq!(resp.status, Status::Ok);
    assert_eq!(resp.data.unwrap().as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_memory_controls_do_not_panic() {
    let (_dir, engine) = open_engine();
    engine.start_memory_monitoring();
    let stats = engine.memory_stats();
    assert!(stats.monitoring);
    engine.update_memory_config(MemoryConfig::default());
    engine.reset_emergency_brake();
    engine.restart_memory_monitoring();
    engine.stop_memory_monitoring();
}
