use crate::*;

/// Unknown ids are 404 on every read endpoint.
#[tokio::test]
async fn test_unknown_ids_are_404() -> Result<()> {
    let server = start_server(1).await?;
    let missing = ResultId::generate();
    for path in ["object", "status", "state"] {
        let resp = server.get(&format!("/{}/{}", path, missing)).await?;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "/{}", path);
    }
    let resp = server.get("/object/not!an!id").await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    Ok(())
}

/// Status flips to ready once the result is stored.
#[tokio::test]
async fn test_status_and_state_of_finished_result() -> Result<()> {
    let server = start_server(1).await?;
    let id = server.submit(&create("builtins", "str", json!(["done"]))).await?;
    server.fetch(&id).await?;

    let status = server.get(&format!("/status/{}", id)).await?.text().await?;
    assert_eq!(status, "ready");

    let state = server.wait_for_state(&id, 1).await?;
    assert_eq!(state, Value::from("done"));
    Ok(())
}

/// A running unit exposes its latest checkpoint through /state.
#[tokio::test]
async fn test_state_shows_checkpoints() -> Result<()> {
    let server = start_server(1).await?;
    let spinner = server.submit(&create(TESTING, "Spinner", json!([]))).await?;
    let spin = server
        .submit(&call(promise(&spinner), "spin", json!([])))
        .await?;

    let status = server.get(&format!("/status/{}", spin)).await?.text().await?;
    assert_eq!(status, "not ready");

    match server.wait_for_state(&spin, 100).await? {
        Value::Int(n) => assert!(n >= 1),
        other => panic!("expected a counter checkpoint, got {:?}", other),
    }

    server
        .submit(&json!({ "abort": { "id": spin.as_str() } }))
        .await?;
    assert!(matches!(server.fetch(&spin).await?, Value::Failure(_)));
    Ok(())
}

/// The contract lists builtins and registered classes.
#[tokio::test]
async fn test_contract() -> Result<()> {
    let server = start_server(1).await?;
    let contract: Json = server.get("/contract").await?.json().await?;
    let classes = contract["classes"].as_array().context("classes")?;
    let dummy = classes
        .iter()
        .find(|c| c["module"] == "testing" && c["name"] == "DummyClass")
        .context("DummyClass missing from contract")?;
    let methods: Vec<&str> = dummy["methods"]
        .as_array()
        .context("methods")?
        .iter()
        .filter_map(|m| m["name"].as_str())
        .collect();
    assert!(methods.contains(&"a"));
    assert!(methods.contains(&"annotated_method"));
    assert_eq!(dummy["attributes"], json!(["b"]));
    assert!(classes.iter().any(|c| c["module"] == "builtins" && c["name"] == "str"));
    Ok(())
}
