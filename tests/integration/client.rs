use std::sync::Arc;

use futures::TryStreamExt;
use libremora::{Client, ClientError, Outcome, RemoteHandle};

use crate::*;

async fn connect() -> Result<(TestServer, Client)> {
    let server = start_server(2).await?;
    let client = Client::connect(&server.server_address());
    Ok((server, client))
}

/// Typed proxies follow the published contract over HTTP.
#[tokio::test]
async fn test_typed_proxy_members() -> Result<()> {
    let (_server, client) = connect().await?;
    let dummy_class = client.class("testing.DummyClass").await?;
    let dummy = dummy_class.new_instance(vec![]).await?;

    let a = dummy.call("a", vec![]).await?.into_handle().context("a is async")?;
    assert_eq!(a.get().await?, Value::Int(1));
    assert_eq!(dummy.attr("b").await?.get().await?, Value::from("b"));
    assert_eq!(dummy.to_text().await?, "test");

    assert!(matches!(
        dummy.call("missing", vec![]).await,
        Err(ClientError::UnknownMember { .. })
    ));
    Ok(())
}

/// Return hints type the resulting handle with the shared descriptor.
#[tokio::test]
async fn test_annotated_return_is_typed() -> Result<()> {
    let (_server, client) = connect().await?;
    let dummy = client
        .class("testing.DummyClass")
        .await?
        .new_instance(vec![])
        .await?;
    let annotated = match dummy.call("annotated_method", vec![]).await? {
        Outcome::Handle(h) => h,
        Outcome::Value(v) => panic!("expected a handle, got {:?}", v),
    };
    let str_class = client.class("builtins.str").await?;
    assert!(Arc::ptr_eq(
        annotated.descriptor().context("typed")?,
        str_class.descriptor().context("typed")?
    ));
    let upper = annotated.method("upper", vec![]).await?;
    assert_eq!(upper.get().await?, Value::from("ANNOTATED"));
    Ok(())
}

/// Factories are reached through the class and typed as the class.
#[tokio::test]
async fn test_factory() -> Result<()> {
    let (_server, client) = connect().await?;
    let dummy_class = client.class("testing.DummyClass").await?;
    let made = dummy_class.factory("create", vec![]).await?;
    assert_eq!(
        made.descriptor().context("typed")?.qualified_name(),
        "testing.DummyClass"
    );
    assert_eq!(made.to_text().await?, "test");
    Ok(())
}

/// Iteration is driven by __len__ and __getitem__.
#[tokio::test]
async fn test_iteration() -> Result<()> {
    let (_server, client) = connect().await?;
    let iterable = client
        .class("testing.DummyIterable")
        .await?
        .new_instance(vec![Value::from(vec![1, 2, 3])])
        .await?;
    assert_eq!(iterable.len().await?, 3);
    assert_eq!(iterable.to_text().await?, "DummyIterable(3)");

    let items: Vec<RemoteHandle> = iterable.iter()?.try_collect().await?;
    let mut values = Vec::new();
    for item in &items {
        values.push(item.get().await?);
    }
    assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

    let dummy = client
        .class("testing.DummyClass")
        .await?
        .new_instance(vec![])
        .await?;
    assert!(matches!(dummy.iter(), Err(ClientError::NotIterable(_))));
    Ok(())
}

/// A remote failure comes back as a typed error, not a transport error.
#[tokio::test]
async fn test_remote_failure() -> Result<()> {
    let (_server, client) = connect().await?;
    let bad = client
        .untyped_class("builtins", "int")
        .new_instance(vec![Value::from("4a")])
        .await?;
    match bad.get().await {
        Err(ClientError::Remote(f)) => assert!(f.error.contains("invalid literal")),
        other => panic!("expected a remote failure, got {:?}", other),
    }

    let missing = client.untyped_class("nowhere", "Nothing").new_instance(vec![]).await?;
    assert!(matches!(missing.get().await, Err(ClientError::Remote(_))));
    Ok(())
}

/// Handles can be passed as arguments and aborted.
#[tokio::test]
async fn test_handles_as_arguments_and_abort() -> Result<()> {
    let (_server, client) = connect().await?;
    let sep = client.upload(&Value::from("+")).await?;
    let parts = client.upload(&Value::from(vec!["1", "2"])).await?;
    let joined = sep.method("join", vec![Value::from(&parts)]).await?;
    assert_eq!(joined.get().await?, Value::from("1+2"));
    assert!(joined.ready().await?);
    assert!(!joined.abort().await?);

    let spin = client
        .untyped_class(TESTING, "Spinner")
        .new_instance(vec![])
        .await?
        .method("spin", vec![])
        .await?;
    let mut checkpoint = None;
    for _ in 0..100 {
        checkpoint = spin.state().await?;
        if checkpoint.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(matches!(checkpoint, Some(Value::Int(_))));
    assert!(spin.abort().await?);
    assert!(matches!(spin.get().await, Err(ClientError::Remote(_))));
    Ok(())
}

/// A bad address surfaces as a transport error.
#[tokio::test]
async fn test_unreachable_server() -> Result<()> {
    let client = Client::connect(&ServerAddress {
        host: "127.0.0.1".into(),
        port: 1,
    });
    assert!(matches!(
        client.class("builtins.str").await,
        Err(ClientError::Transport(_))
    ));
    Ok(())
}
