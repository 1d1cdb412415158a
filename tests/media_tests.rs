use async_trait::async_trait;
use gen_gateway::{
    config::StorageConfig,
    models::{CanonicalState, ProviderKind},
    providers::{RawProviderStatus, VeoRecord},
    services::{HttpObjectStore, MediaRehoster, MediaStore, TaskNormalizer},
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingStore {
    puts: Mutex<Vec<(String, Vec<u8>, String)>>,
}

#[async_trait]
impl MediaStore for RecordingStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        self.puts
            .lock()
            .unwrap()
            .push((key.to_string(), bytes, content_type.to_string()));
        Ok(format!("https://media.first-party.example/{}", key))
    }
}

fn rehoster(store: &Arc<RecordingStore>) -> Arc<MediaRehoster> {
    let store: Arc<dyn MediaStore> = store.clone();
    Arc::new(MediaRehoster::new(Some(store), Duration::from_secs(5)).unwrap())
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    bytes.extend((0..=255u8).cycle().take(4096));
    bytes
}

#[tokio::test]
async fn rehosted_image_is_byte_identical() {
    let mut cdn = Server::new_async().await;
    let original = png_bytes();
    cdn.mock("GET", "/out/result.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(original.clone())
        .create_async()
        .await;

    let store = Arc::new(RecordingStore::default());
    let urls = rehoster(&store)
        .rehost_all(
            ProviderKind::Gpt4oImage,
            "task/1",
            vec![format!("{}/out/result.png", cdn.url())],
        )
        .await;

    assert_eq!(
        urls,
        vec!["https://media.first-party.example/generations/gpt4o_image/task_1/0.png"]
    );
    let puts = store.puts.lock().unwrap();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].1, original);
    assert_eq!(puts[0].2, "image/png");
}

#[tokio::test]
async fn failed_download_keeps_the_provider_url() {
    let mut cdn = Server::new_async().await;
    cdn.mock("GET", "/gone.png").with_status(404).create_async().await;

    let store = Arc::new(RecordingStore::default());
    let url = format!("{}/gone.png", cdn.url());
    let urls = rehoster(&store)
        .rehost_all(ProviderKind::Midjourney, "mj-1", vec![url.clone()])
        .await;

    assert_eq!(urls, vec![url]);
    assert!(store.puts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn normalizer_only_rehosts_completed_images() {
    let store = Arc::new(RecordingStore::default());
    let normalizer = TaskNormalizer::new(rehoster(&store));

    let failed = RawProviderStatus::Veo(
        serde_json::from_value::<VeoRecord>(json!({
            "taskId": "v-1",
            "successFlag": 2,
            "errorMessage": "render failed"
        }))
        .unwrap(),
    );
    let status = normalizer.resolve(&failed, "v-1").await;
    assert_eq!(status.state, CanonicalState::Failed);

    let video = RawProviderStatus::Veo(
        serde_json::from_value::<VeoRecord>(json!({
            "taskId": "v-2",
            "successFlag": 1,
            "response": { "resultUrls": ["https://files.example/v-2.mp4"] }
        }))
        .unwrap(),
    );
    let status = normalizer.resolve(&video, "v-2").await;
    assert_eq!(status.state, CanonicalState::Completed);
    assert_eq!(status.result_urls, vec!["https://files.example/v-2.mp4"]);

    assert!(store.puts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn object_store_uploads_with_bearer_and_returns_public_url() {
    let mut storage = Server::new_async().await;
    let mock = storage
        .mock("POST", "/storage/v1/object/media/generations/suno/s-1/0.mp3")
        .match_header("authorization", "Bearer service-key")
        .match_header("content-type", "audio/mpeg")
        .match_body(Matcher::Exact("ID3".to_string()))
        .with_status(200)
        .with_body(r#"{"Key":"media/generations/suno/s-1/0.mp3"}"#)
        .create_async()
        .await;

    let store = HttpObjectStore::new(
        StorageConfig {
            url: format!("{}/", storage.url()),
            bucket: "media".to_string(),
            api_key: "service-key".to_string(),
        },
        Duration::from_secs(5),
    )
    .unwrap();

    let url = store
        .put("generations/suno/s-1/0.mp3", b"ID3".to_vec(), "audio/mpeg")
        .await
        .unwrap();

    assert_eq!(
        url,
        format!("{}/storage/v1/object/public/media/generations/suno/s-1/0.mp3", storage.url())
    );
    mock.assert_async().await;
}
