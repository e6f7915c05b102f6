use super::*;

#[tokio::test]
async fn test_notifier_failure_falls_back_to_notice() {
    let env = create_test_env_with(
        |_| {},
        Arc::new(RecordingNotifier::failing()),
        |builder| builder,
    )
    .await;
    let mut rx = env.downloader.subscribe();
    let id = env
        .downloader
        .submit(metadata("noisy"), DownloadRequest::single(inline(GIF)))
        .await
        .unwrap();

    let events = events_until_terminal(&mut rx, id).await;
    assert!(matches!(events.last(), Some(Event::Completed { .. })));

    let notices: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            Event::Notice { message } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert!(!notices.is_empty());
    assert!(notices.iter().any(|m| m.starts_with("Saved ")), "{:?}", notices);

    // The job itself is unaffected
    let record = env.downloader.registry().get(id).await.unwrap().unwrap();
    assert_eq!(record.stage, TaskStage::Success);
}

#[tokio::test]
async fn test_rejections_are_reported_as_notices_when_notifier_fails() {
    let env = create_test_env_with(
        |_| {},
        Arc::new(RecordingNotifier::failing()),
        |builder| builder,
    )
    .await;
    let mut rx = env.downloader.subscribe();

    let err = env
        .downloader
        .submit(metadata("empty"), DownloadRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Download(DownloadError::InvalidRequest(_))
    ));

    let Ok(Event::Notice { message }) = rx.try_recv() else {
        panic!("expected a notice");
    };
    assert!(message.starts_with("Invalid download request"));
}

#[tokio::test]
async fn test_transcoder_statistics_become_progress_text() {
    let env = create_test_env().await;
    let mut rx = env.downloader.subscribe();
    let request = DownloadRequest {
        input_media: vec![inline(GIF), inline(PNG).overlay()],
        merge_overlay: true,
        ..Default::default()
    };
    let id = env
        .downloader
        .submit(metadata("stats"), request)
        .await
        .unwrap();
    events_until_terminal(&mut rx, id).await;

    let progress = env.notifier.progress.lock().unwrap().clone();
    assert!(progress.iter().any(|p| p.percent.is_none()
        && p.message.starts_with("overlay merge: Processing (frames=10")));
}

#[tokio::test]
async fn test_submit_payload() {
    let env = create_test_env().await;
    let mut rx = env.downloader.subscribe();

    let metadata_json = r#"{"content_identifier": "payload-1", "output_path": "chat/p1", "source_tag": "chat_media"}"#;
    let request_json = format!(
        r#"{{"input_media": [{{"kind": "inline_encoded", "content": "{}"}}]}}"#,
        inline(GIF).content
    );
    let id = env
        .downloader
        .submit_payload(metadata_json, &request_json)
        .await
        .unwrap();
    assert!(matches!(
        wait_for_terminal(&mut rx, id).await,
        Event::Completed { .. }
    ));

    let err = env
        .downloader
        .submit_payload("{not json", &request_json)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
    assert_eq!(
        env.notifier.failure_messages(),
        vec!["Failed to parse download request".to_string()]
    );
}
