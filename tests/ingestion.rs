mod common;

use tokio::sync::{mpsc, watch};

use chanrag_backend::core::config::Settings;
use chanrag_backend::ingest::{IncomingEvent, Outcome, SourceMessage};
use chanrag_backend::store::RecordStore;

use common::build_state;

fn channel_post(id: i64, text: &str, channel_id: i64) -> IncomingEvent {
    IncomingEvent::ChannelMessage {
        message: SourceMessage {
            id,
            text: text.to_string(),
            date: 1_735_787_045,
            author: None,
        },
        channel_id,
    }
}

#[tokio::test]
async fn open_allow_list_indexes_every_channel() {
    let (state, _provider, index) = build_state(Settings::default()).await;
    let dispatcher = state.dispatcher();

    let outcome = dispatcher.handle(channel_post(1, "hello", 42)).await.unwrap();
    assert_eq!(outcome, Outcome::Indexed);

    let documents = index.documents();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].channel_id, "42");
    assert_eq!(documents[0].link, "https://t.me/c/42/1");
    assert_eq!(documents[0].vectors["default"].len(), 1024);
    assert_eq!(state.store.count_chunks().await.unwrap(), 1);
}

#[tokio::test]
async fn channel_outside_allow_list_is_never_embedded() {
    let mut settings = Settings::default();
    settings.telegram.target_chat_ids = vec![7];
    let (state, provider, index) = build_state(settings).await;

    let outcome = state
        .dispatcher()
        .handle(channel_post(1, "hello", 42))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Filtered);
    assert_eq!(provider.embed_calls(), 0);
    assert!(index.documents().is_empty());
}

#[tokio::test]
async fn listener_drains_queue_in_order() {
    let mut settings = Settings::default();
    settings.telegram.target_chat_ids = vec![7];
    let (state, _provider, index) = build_state(settings).await;

    let (tx, rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    tx.send(channel_post(1, "first", 7)).await.unwrap();
    tx.send(channel_post(2, "", 7)).await.unwrap();
    tx.send(IncomingEvent::Unrecognized).await.unwrap();
    tx.send(channel_post(3, "ignored", 8)).await.unwrap();
    tx.send(channel_post(4, "second", 7)).await.unwrap();
    drop(tx);

    state.dispatcher().run(rx, shutdown_rx).await;

    let contents: Vec<String> = index
        .documents()
        .iter()
        .map(|d| d.content.clone())
        .collect();
    assert_eq!(contents, vec!["first".to_string(), "second".to_string()]);
}
