use crate::*;

async fn abort(server: &TestServer, target: &ResultId) -> Result<bool> {
    let id = server
        .submit(&json!({ "abort": { "id": target.as_str() } }))
        .await?;
    match server.fetch(&id).await? {
        Value::Bool(hit) => Ok(hit),
        other => bail!("abort returned {:?}", other),
    }
}

/// With one worker busy, a queued unit can be aborted before it runs.
#[tokio::test]
async fn test_abort_queued_and_running() -> Result<()> {
    let server = start_server(1).await?;
    let spinner = server.submit(&create(TESTING, "Spinner", json!([]))).await?;
    let spin = server
        .submit(&call(promise(&spinner), "spin", json!([])))
        .await?;
    server.wait_for_state(&spin, 100).await?;

    let queued = server.submit(&create("builtins", "str", json!(["late"]))).await?;
    let resp = server.get(&format!("/state/{}", queued)).await?;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    assert!(abort(&server, &queued).await?);
    match server.fetch(&queued).await? {
        Value::Failure(f) => assert!(f.is_abort(), "error: {}", f.error),
        other => panic!("expected an abort failure, got {:?}", other),
    }

    assert!(abort(&server, &spin).await?);
    match server.fetch(&spin).await? {
        Value::Failure(f) => assert!(f.error.contains("aborted"), "error: {}", f.error),
        other => panic!("expected an abort failure, got {:?}", other),
    }
    Ok(())
}

/// Aborting finished work is a no-op that reports false.
#[tokio::test]
async fn test_abort_after_completion() -> Result<()> {
    let server = start_server(1).await?;
    let id = server.submit(&create("builtins", "str", json!(["x"]))).await?;
    server.fetch(&id).await?;
    assert!(!abort(&server, &id).await?);
    assert_eq!(server.fetch(&id).await?, Value::from("x"));
    Ok(())
}

/// Aborting an id that was never submitted reports false.
#[tokio::test]
async fn test_abort_unknown_id() -> Result<()> {
    let server = start_server(1).await?;
    let missing = ResultId::generate();
    let resp = server
        .post_json("/abort", &json!({ "abort": { "id": missing.as_str() } }))
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let id = ResultId::parse(resp.text().await?.trim())?;
    assert_eq!(server.fetch(&id).await?, Value::Bool(false));
    Ok(())
}
