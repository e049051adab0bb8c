#![cfg(feature = "test_e2e")]
pub mod common;

use crate::common::archives::{sdist, wheel};
use crate::common::{init_tracing, ServiceStateBuilder};
use wheelhouse_client::{Client, Error};
use wheelhouse_server::router;
use wheelhouse_storage::mem::MemStorageProvider;

async fn spawn_server(storage: MemStorageProvider) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(ServiceStateBuilder::default().storage(storage).build());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn upload_then_install() {
    init_tracing();

    let endpoint = spawn_server(MemStorageProvider::new()).await;
    let client = Client::new(&endpoint);

    let archive = sdist("alarmtime", "0.1.5");
    client
        .upload("/", "alarmtime-0.1.5.tar.gz", archive.clone())
        .await
        .unwrap();
    client
        .upload(
            "/",
            "alarmtime-0.1.5-py3-none-any.whl",
            wheel("alarmtime", "0.1.5"),
        )
        .await
        .unwrap();

    let page = client.project_page("alarmtime/").await.unwrap();
    assert!(page.contains("alarmtime-0.1.5.tar.gz#sha256="));
    assert!(page.contains("alarmtime-0.1.5-py3-none-any.whl#sha256="));

    let downloaded = client
        .download("alarmtime/alarmtime-0.1.5.tar.gz")
        .await
        .unwrap();
    assert_eq!(downloaded.as_ref(), archive.as_slice());
}

#[tokio::test]
async fn rejected_uploads_surface_as_errors() {
    init_tracing();

    let storage = MemStorageProvider::new();
    let endpoint = spawn_server(storage).await;
    let client = Client::new(&endpoint);

    let err = client
        .upload("/", "other-0.1.5.tar.gz", sdist("alarmtime", "0.1.5"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)), "{err}");

    let err = client.download("missing/missing-1.0.tar.gz").await.unwrap_err();
    assert!(matches!(err, Error::NotFound), "{err}");
}
