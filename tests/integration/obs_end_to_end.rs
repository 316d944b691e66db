//! Full path: mock OBS → OBS client → fleet sweep → SQLite → notifier.

use std::sync::Arc;

use gradewatch::grades::format::FETCH_ADVISORY;
use gradewatch::scheduler::{FleetConfig, FleetScheduler};
use gradewatch::store::{SnapshotStore, SqliteSnapshotStore};
use gradewatch_obs::{ObsClient, ObsConfig};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{RecordingNotifier, configured, obs_body};

const ASSESSMENTS: &[&str] = &["Midterm", "Final", "Grade"];

async fn mount(server: &MockServer, cookie: &str, final_grade: &str) {
    Mock::given(method("GET"))
        .and(path("/ogrenci/not-gor"))
        .and(query_param("donemId", "2024-1"))
        .and(header("cookie", cookie))
        .respond_with(ResponseTemplate::new(200).set_body_json(obs_body(
            ASSESSMENTS,
            &[("CS101", &["80", final_grade, ""]), ("MATH201", &["--", "", ""])],
        )))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> ObsClient {
    ObsClient::new(ObsConfig {
        base_url: server.uri(),
        timeout_secs: 5,
        max_attempts: 1,
        retry_backoff_ms: 0,
        ..ObsConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn second_sweep_announces_new_grades() {
    let server = MockServer::start().await;
    let store = Arc::new(SqliteSnapshotStore::open_in_memory().unwrap());
    let notifier = Arc::new(RecordingNotifier::new());
    let user = configured(&*store, 77, true, None);
    let fleet = FleetScheduler::new(
        store.clone(),
        Arc::new(client(&server)),
        notifier.clone(),
        FleetConfig::default(),
    );

    mount(&server, "SESSION=77", "--").await;
    let first = fleet.sweep().await;
    assert_eq!(first.succeeded, 1);
    assert!(notifier.messages().is_empty());
    let baseline = store.get(user).unwrap().unwrap().snapshot.unwrap();
    assert_eq!(baseline.get("CS101", "Midterm"), Some("80"));
    assert!(baseline.course("MATH201").unwrap().is_empty());

    server.reset().await;
    mount(&server, "SESSION=77", "90").await;
    let second = fleet.sweep().await;

    assert_eq!(second.notifications_sent, 1);
    assert_eq!(
        notifier.texts_for(user),
        vec!["The Final for CS101 has been announced: 90.".to_owned()]
    );
}

#[tokio::test]
async fn expired_cookie_yields_one_advisory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ogrenci/not-gor"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    let store = Arc::new(SqliteSnapshotStore::open_in_memory().unwrap());
    let notifier = Arc::new(RecordingNotifier::new());
    let user = configured(&*store, 5, true, None);
    let fleet = FleetScheduler::new(
        store.clone(),
        Arc::new(client(&server)),
        notifier.clone(),
        FleetConfig::default(),
    );

    let report = fleet.sweep().await;

    assert_eq!(report.failed, 1);
    assert_eq!(notifier.texts_for(user), vec![FETCH_ADVISORY.to_owned()]);
    assert!(store.get(user).unwrap().unwrap().snapshot.is_none());
}
