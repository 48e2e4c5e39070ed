use rmpv::Value;

use super::*;

#[test]
fn test_action_parse() {
    assert_eq!(Action::parse("create"), Some(Action::Create));
    assert_eq!(Action::parse("getMany"), Some(Action::GetMany));
    assert_eq!(Action::parse("bogus"), None);
}

#[test]
fn test_encode_decode_value_roundtrip() {
    let val = Value::Map(vec![(Value::from("a"), Value::from(1u64)), (Value::from("b"), Value::from("x"))]);
    let bytes = encode_value(&val).unwrap();
    let back = decode_value(&bytes).unwrap();
    assert_eq!(val, back);
}

#[test]
fn test_decode_request_happy_path() {
    let envelope = Value::Map(vec![
        (Value::from("action"), Value::from("get")),
        (Value::from("collection"), Value::from("docs")),
        (Value::from("payload"), Value::Map(vec![(Value::from("id"), Value::from(7u64))])),
    ]);
    let bytes = encode_value(&envelope).unwrap();
    let req = decode_request(&bytes).unwrap();
    assert_eq!(req.action, Action::Get);
    assert_eq!(req.collection, "docs");
    assert_eq!(map_get(&req.payload, "id").and_then(as_doc_id), Some(7));
}

#[test]
fn test_decode_request_missing_action_errors() {
    let envelope = Value::Map(vec![(Value::from("collection"), Value::from("docs"))]);
    let bytes = encode_value(&envelope).unwrap();
    assert!(decode_request(&bytes).is_err());
}

#[test]
fn test_decode_request_unknown_action_errors() {
    let envelope = Value::Map(vec![
        (Value::from("action"), Value::from("frobnicate")),
        (Value::from("collection"), Value::from("docs")),
    ]);
    let bytes = encode_value(&envelope).unwrap();
    assert!(decode_request(&bytes).is_err());
}

#[test]
fn test_encode_response_shapes() {
    let ok = encode_response(Response::ok(Value::from(42u64)));
    assert_eq!(map_get(&ok, "status"), Some(&Value::from("OK")));
    assert_eq!(map_get(&ok, "data"), Some(&Value::from(42u64)));

    let err: Value = encode_response(Response::error());
    assert_eq!(map_get(&err, "status"), Some(&Value::from("ERROR")));
    assert_eq!(map_get(&err, "data"), None);
}

#[tokio::test]
async fn test_frame_roundtrip() {
    let cfg = Config::default();
    let (mut client, mut server) = tokio::io::duplex(4096);

    let body = b"hello world".to_vec();
    let write_cfg = cfg.clone();
    let writer = tokio::spawn(async move {
        write_frame(&mut client, &body, &write_cfg).await.unwrap();
    });

    let frame = read_frame(&mut server, &cfg).await.unwrap();
    writer.await.unwrap();
    assert_eq!(frame, Some(b"hello world".to_vec()));
}

#[tokio::test]
async fn test_read_frame_eof_returns_none() {
    let cfg = Config::default();
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);
    let frame = read_frame(&mut server, &cfg).await.unwrap();
    assert_eq!(frame, None);
}

#[tokio::test]
async fn test_read_frame_oversize_is_framing_error() {
    let mut cfg = Config::default();
    cfg.max_message_bytes = 4;
    let (mut client, mut server) = tokio::io::duplex(64);
    tokio::spawn(async move {
        client.write_all(&100u32.to_be_bytes()).await.unwrap();
    });
    let result = read_frame(&mut server, &cfg).await;
    assert!(result.is_err());
}
