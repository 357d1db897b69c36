//! End-to-end batch run against a mock synthesis service

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use tts_batch::{
    BatchOrchestrator, Config, Event, FetchStatus, RetryConfig, ServiceConfig, generate_id,
    run_with_shutdown,
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn batch_submits_everything_then_downloads_as_artifacts_appear() {
    let server = MockServer::start().await;
    let temp = tempfile::tempdir().unwrap();

    let docs = [
        ("ready.txt", "hello", 0),
        ("slow.txt", "నమస్కారం ప్రపంచం", 3),
    ];

    for (_, text, failures) in docs {
        let id = generate_id(text);
        Mock::given(method("POST"))
            .and(path("/tts/festival_cs_plugin.php"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains(format!("&count={id}")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let artifact = format!("/tts/wav_output/fest_out{id}.mp3");
        if failures > 0 {
            Mock::given(method("GET"))
                .and(path(artifact.clone()))
                .respond_with(ResponseTemplate::new(404))
                .up_to_n_times(failures)
                .expect(failures)
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path(artifact))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(text.as_bytes()))
            .expect(1)
            .mount(&server)
            .await;
    }

    let paths: Vec<_> = docs
        .iter()
        .map(|(name, text, _)| {
            let path = temp.path().join(name);
            std::fs::write(&path, text).unwrap();
            path
        })
        .collect();

    let config = Config {
        service: ServiceConfig {
            submit_url: format!("{}/tts/festival_cs_plugin.php", server.uri()),
            artifact_url_prefix: format!("{}/tts/wav_output/fest_out", server.uri()),
            ..Default::default()
        },
        retry: RetryConfig::every(Duration::from_millis(50)),
        ..Default::default()
    };
    let orchestrator = BatchOrchestrator::new(config).unwrap();
    let mut events = orchestrator.subscribe();

    let report = orchestrator.run_batch(&paths).await.unwrap();
    assert_eq!(report.submissions.len(), 2);
    assert!(report.submitted_at >= report.started_at);

    let mut reports = tokio::time::timeout(Duration::from_secs(10), run_with_shutdown(&orchestrator))
        .await
        .expect("downloads should finish");
    reports.sort_by_key(|r| r.attempts);

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].attempts, 1);
    assert_eq!(reports[1].attempts, 4);
    for report in &reports {
        assert!(matches!(report.status, FetchStatus::Downloaded { .. }));
    }

    for (name, text, _) in docs {
        let saved = std::fs::read(temp.path().join(format!("{name}.mp3"))).unwrap();
        assert_eq!(saved, text.as_bytes());
    }

    let mut retries = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::DownloadFailed { .. }) {
            retries += 1;
        }
    }
    assert_eq!(retries, 3);
}
