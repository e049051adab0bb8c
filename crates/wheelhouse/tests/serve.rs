use wheelhouse_client::{Client, Error};

#[tokio::test]
async fn serves_from_config_file() {
    let _ = tracing_subscriber::fmt::fmt().with_test_writer().try_init();

    let server = wheelhouse::start_listening(wheelhouse::cli::WheelhouseArgs {
        config: "../../configs/test.memory.yaml".into(),
    })
    .await
    .unwrap();

    let server_handle = tokio::task::spawn(server).abort_handle();

    let client = Client::new("http://127.0.0.1:18080");

    let health = client.download("-/healthcheck").await.unwrap();
    assert_eq!(health.as_ref(), b"OK");

    // nothing uploaded yet
    assert!(matches!(client.project_page("").await, Err(Error::NotFound)));
    assert!(matches!(
        client.upload("/", "broken-1.0.tar.gz", b"not an archive".to_vec()).await,
        Err(Error::BadRequest(_))
    ));

    server_handle.abort();
}

#[tokio::test]
async fn missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    let res = wheelhouse::start_listening(wheelhouse::cli::WheelhouseArgs {
        config: dir.path().join("absent.yaml"),
    })
    .await;

    assert!(res.is_err());
}
