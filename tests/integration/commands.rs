use crate::*;

/// A create command returns an id whose object is the constructed value.
#[tokio::test]
async fn test_create_then_fetch() -> Result<()> {
    let server = start_server(2).await?;
    let id = server.submit(&create("builtins", "str", json!(["456"]))).await?;
    assert_eq!(server.fetch(&id).await?, Value::from("456"));
    Ok(())
}

/// Identical creates are independent units with distinct ids.
#[tokio::test]
async fn test_independent_creates() -> Result<()> {
    let server = start_server(2).await?;
    let a = server.submit(&create("builtins", "int", json!(["7"]))).await?;
    let b = server.submit(&create("builtins", "int", json!(["7"]))).await?;
    assert_ne!(a, b);
    assert_eq!(server.fetch(&a).await?, Value::Int(7));
    assert_eq!(server.fetch(&b).await?, Value::Int(7));
    Ok(())
}

/// `class_` is accepted as an alias of `class`, on the kind-specific route.
#[tokio::test]
async fn test_create_on_kind_route_with_class_alias() -> Result<()> {
    let server = start_server(1).await?;
    let body = json!({ "create": { "module": "builtins", "class_": "list", "args": [[1, 2]] } });
    let resp = server.post_json("/create", &body).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let id = ResultId::parse(resp.text().await?.trim())?;
    assert_eq!(server.fetch(&id).await?, Value::from(vec![1, 2]));
    Ok(())
}

/// A call on a promise runs after the promised value exists.
#[tokio::test]
async fn test_call_chains_through_promises() -> Result<()> {
    let server = start_server(2).await?;
    let text = server.submit(&create("builtins", "str", json!(["a,b,c"]))).await?;
    let parts = server
        .submit(&call(promise(&text), "split", json!([","])))
        .await?;
    let sep = server.submit(&create("builtins", "str", json!(["-"]))).await?;
    let joined = server
        .submit(&call(promise(&sep), "join", json!([promise(&parts)])))
        .await?;
    assert_eq!(server.fetch(&joined).await?, Value::from("a-b-c"));
    Ok(())
}

/// A get with an empty member resolves to the object itself.
#[tokio::test]
async fn test_get_member_and_self() -> Result<()> {
    let server = start_server(1).await?;
    let obj = server.submit(&create(TESTING, "DummyClass", json!([]))).await?;
    let b = server
        .submit(&json!({ "get": { "object": promise(&obj), "member": "b" } }))
        .await?;
    assert_eq!(server.fetch(&b).await?, Value::from("b"));

    let n = server.submit(&create("builtins", "int", json!([3]))).await?;
    let same = server
        .submit(&json!({ "get": { "object": promise(&n), "member": "" } }))
        .await?;
    assert_eq!(server.fetch(&same).await?, Value::Int(3));
    Ok(())
}

/// A raising constructor produces a stored failure, not an HTTP error.
#[tokio::test]
async fn test_failure_is_a_result() -> Result<()> {
    let server = start_server(1).await?;
    let id = server.submit(&create("builtins", "int", json!(["4a"]))).await?;
    match server.fetch(&id).await? {
        Value::Failure(f) => {
            assert!(f.error.contains("invalid literal"), "error: {}", f.error);
            assert!(f.context.is_empty());
        }
        other => panic!("expected a failure, got {:?}", other),
    }
    Ok(())
}

/// Consuming a failed result fails too, keeping the upstream chain.
#[tokio::test]
async fn test_failure_propagates_through_promises() -> Result<()> {
    let server = start_server(1).await?;
    let bad = server.submit(&create("builtins", "int", json!(["4a"]))).await?;
    let next = server
        .submit(&call(promise(&bad), "bit_length", json!([])))
        .await?;
    match server.fetch(&next).await? {
        Value::Failure(f) => {
            assert_eq!(f.context.len(), 1);
            assert!(f.context[0].contains("invalid literal"));
        }
        other => panic!("expected a failure, got {:?}", other),
    }
    Ok(())
}

/// Malformed commands are rejected before queueing.
#[tokio::test]
async fn test_rejections_are_400() -> Result<()> {
    let server = start_server(1).await?;

    let unknown_field = json!({ "create": { "module": "builtins", "class": "str", "bogus": 1 } });
    let resp = server.post_json("/", &unknown_field).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.text().await?.contains("bogus"));

    let resp = server
        .post_raw("/", Some("application/json"), b"{not json".to_vec())
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let dangling = call(promise(&ResultId::generate()), "upper", json!([]));
    let resp = server.post_json("/", &dangling).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .post_json("/call", &create("builtins", "str", json!(["x"])))
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .post_raw("/", Some("text/plain"), b"hello".to_vec())
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = server
        .post_json("/frobnicate", &create("builtins", "str", json!(["x"])))
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    Ok(())
}

/// A body without a content type is read as a JSON command.
#[tokio::test]
async fn test_missing_content_type_means_json() -> Result<()> {
    let server = start_server(1).await?;
    let body = serde_json::to_vec(&create("builtins", "str", json!(["plain"])))?;
    let resp = server.post_raw("/", None, body).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let id = ResultId::parse(resp.text().await?.trim())?;
    assert_eq!(server.fetch(&id).await?, Value::from("plain"));
    Ok(())
}

/// An octet-stream body is stored as a value and usable as a promise.
#[tokio::test]
async fn test_upload_blob() -> Result<()> {
    let server = start_server(1).await?;
    let blob = codec::encode_blob(&Value::from(vec!["x", "y"]))?;
    let resp = server
        .post_raw("/", Some("application/octet-stream"), blob)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let uploaded = ResultId::parse(resp.text().await?.trim())?;

    let len = server
        .submit(&call(promise(&uploaded), "__len__", json!([])))
        .await?;
    assert_eq!(server.fetch(&len).await?, Value::Int(2));
    Ok(())
}

/// A blob nested far past the decoder's depth limit is refused with 400
/// and the server keeps serving.
#[tokio::test]
async fn test_deep_blob_is_rejected() -> Result<()> {
    let server = start_server(1).await?;
    let mut blob = Vec::new();
    for _ in 0..50_000 {
        blob.extend_from_slice(&6u32.to_le_bytes());
        blob.extend_from_slice(&1u64.to_le_bytes());
    }
    blob.extend_from_slice(&0u32.to_le_bytes());

    let resp = server
        .post_raw("/", Some("application/octet-stream"), blob)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.text().await?.contains("deeper than"));

    let id = server
        .submit(&create("builtins", "str", json!(["still up"])))
        .await?;
    assert_eq!(server.fetch(&id).await?, Value::from("still up"));
    Ok(())
}
