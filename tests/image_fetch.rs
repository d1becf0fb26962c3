//! The reqwest image fetcher against a throwaway loopback HTTP server.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use catalog_migrate::database_ops::memory::MemoryStorage;
use catalog_migrate::migration::rehost::ImageFetcher;
use catalog_migrate::migration::{AssetRehoster, HttpImageFetcher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve the same canned response to every connection; returns the base URL.
async fn serve(status: &'static str, content_type: Option<&'static str>, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let mut head = format!("HTTP/1.1 {status}\r\n");
            if let Some(ct) = content_type {
                head.push_str(&format!("Content-Type: {ct}\r\n"));
            }
            head.push_str(&format!(
                "Content-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            ));
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}")
}

fn fetcher() -> Arc<HttpImageFetcher> {
    Arc::new(HttpImageFetcher::new(Duration::from_secs(5)).unwrap())
}

#[tokio::test]
async fn png_header_drives_the_extension() {
    let base = serve("200 OK", Some("image/png"), b"\x89PNG").await;
    let url = format!("{base}/media/photo");
    let storage = Arc::new(MemoryStorage::new());
    let tick = Arc::new(AtomicI64::new(1_700_000_000));
    let clock = tick.clone();
    let rehoster = AssetRehoster::new(fetcher(), storage.clone(), "3600")
        .with_clock(move || clock.fetch_add(1, Ordering::SeqCst));

    let first = rehoster.rehost(&url, "product-images", "products/p1").await.unwrap();
    let second = rehoster.rehost(&url, "product-images", "products/p1").await.unwrap();

    assert!(first.ends_with(".png"));
    assert!(second.ends_with(".png"));
    assert_ne!(first, second);
    let paths = storage.paths("product-images");
    assert_eq!(paths.len(), 2);
    let stored = storage.object("product-images", &paths[0]).unwrap();
    assert_eq!(stored.content_type, "image/png");
    assert_eq!(&stored.bytes[..], b"\x89PNG");
}

#[tokio::test]
async fn missing_header_falls_back_to_url_extension() {
    let base = serve("200 OK", None, b"GIF89a").await;
    let image = fetcher().fetch(&format!("{base}/anim.gif")).await.unwrap();
    assert_eq!(image.content_type, None);

    let storage = Arc::new(MemoryStorage::new());
    let rehoster = AssetRehoster::new(fetcher(), storage.clone(), "3600");
    let url = rehoster
        .rehost(&format!("{base}/anim.gif"), "b", "p")
        .await
        .unwrap();
    assert!(url.ends_with(".gif"));
    let path = &storage.paths("b")[0];
    assert_eq!(storage.object("b", path).unwrap().content_type, "image/gif");
}

#[tokio::test]
async fn non_success_status_is_not_an_image() {
    let base = serve("404 Not Found", Some("text/html"), b"nope").await;
    let url = format!("{base}/gone.jpg");
    let err = fetcher().fetch(&url).await.unwrap_err();
    assert!(err.to_string().contains("404"));

    let storage = Arc::new(MemoryStorage::new());
    let rehoster = AssetRehoster::new(fetcher(), storage.clone(), "3600");
    assert_eq!(rehoster.rehost(&url, "b", "p").await, None);
    assert!(storage.paths("b").is_empty());
}
