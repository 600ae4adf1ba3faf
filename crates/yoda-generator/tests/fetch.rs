//! Fetching sources over HTTP against a mock server.

use std::{fs, path::PathBuf};

use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header_exists, method, path},
};
use yoda_generator::{FetchError, FetchStatus, Fetcher, SourceDescriptor, SourceKind};

fn remote(server: &MockServer, route: &str, destination: &str) -> SourceDescriptor {
    SourceDescriptor {
        locator: format!("{}{route}", server.uri()),
        destination: PathBuf::from(destination),
        kind: SourceKind::Content,
    }
}

#[tokio::test]
async fn failing_source_does_not_stop_the_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/one.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string("# One"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/two.md"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logo.svg"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<svg/>"))
        .mount(&server)
        .await;

    let site = tempfile::tempdir().unwrap();
    let mut logo = remote(&server, "/logo.svg", "assets/logo.svg");
    logo.kind = SourceKind::Asset;
    let descriptors = vec![
        remote(&server, "/one.md", "content/one.md"),
        remote(&server, "/two.md", "content/two.md"),
        logo,
    ];

    let fetcher = Fetcher::new(site.path()).unwrap();
    let report = fetcher.fetch_all(&descriptors).await;

    assert_eq!(
        report.updated,
        vec![
            PathBuf::from("content/one.md"),
            PathBuf::from("assets/logo.svg")
        ]
    );
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
    assert!(matches!(
        report.failures[0].error,
        FetchError::Status { .. }
    ));
    assert!(report.content_changed(&descriptors));
    assert_eq!(
        fs::read_to_string(site.path().join("content/one.md")).unwrap(),
        "# One"
    );
    assert!(!site.path().join("content/two.md").exists());

    let error = report.into_result().unwrap_err();
    assert!(matches!(&error, FetchError::Partial(failures) if failures.len() == 1));
    assert!(error.to_string().contains("/two.md"));
}

#[tokio::test]
async fn not_modified_keeps_the_local_copy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page.md"))
        .and(header_exists("if-modified-since"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let site = tempfile::tempdir().unwrap();
    fs::create_dir_all(site.path().join("content")).unwrap();
    fs::write(site.path().join("content/page.md"), "local").unwrap();

    let fetcher = Fetcher::new(site.path()).unwrap();
    let status = fetcher
        .fetch_one(&remote(&server, "/page.md", "content/page.md"))
        .await
        .unwrap();

    assert_eq!(status, FetchStatus::Unchanged);
    assert_eq!(
        fs::read_to_string(site.path().join("content/page.md")).unwrap(),
        "local"
    );
}

#[tokio::test]
async fn older_last_modified_is_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page.md"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", "Mon, 01 Jan 2001 00:00:00 GMT")
                .set_body_string("remote"),
        )
        .mount(&server)
        .await;

    let site = tempfile::tempdir().unwrap();
    fs::write(site.path().join("page.md"), "local").unwrap();

    let fetcher = Fetcher::new(site.path()).unwrap();
    let report = fetcher
        .fetch_all(&[remote(&server, "/page.md", "page.md")])
        .await;

    assert_eq!(report.unchanged, vec![PathBuf::from("page.md")]);
    assert!(!report.content_changed(&[remote(&server, "/page.md", "page.md")]));
    assert_eq!(fs::read_to_string(site.path().join("page.md")).unwrap(), "local");
}

#[tokio::test]
async fn missing_destination_is_always_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/new.md"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified", "Mon, 01 Jan 2001 00:00:00 GMT")
                .set_body_string("fresh"),
        )
        .mount(&server)
        .await;

    let site = tempfile::tempdir().unwrap();
    let fetcher = Fetcher::new(site.path()).unwrap();
    let status = fetcher
        .fetch_one(&remote(&server, "/new.md", "content/nested/new.md"))
        .await
        .unwrap();

    assert_eq!(status, FetchStatus::Updated);
    assert_eq!(
        fs::read_to_string(site.path().join("content/nested/new.md")).unwrap(),
        "fresh"
    );
}
