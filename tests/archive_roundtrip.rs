//! The JSON archive: export over HTTP, import over HTTP, and the
//! merge/replace semantics of applying one.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use time::OffsetDateTime;
use time::macros::datetime;

use quaderno::application::error::WikiError;
use quaderno::application::repos::{PageStore, SavePageParams};

use common::{ADMIN_EMAIL, TestWiki, read_body};

const BOUNDARY: &str = "qnoarchive";

/// Hand-rolled multipart body for the import form.
fn multipart_upload(json: &str, merge: bool) -> (String, String) {
    let mut body = String::new();
    body.push_str(&format!("--{BOUNDARY}\r\n"));
    body.push_str(
        "Content-Disposition: form-data; name=\"file\"; \
         filename=\"quaderno-export.json\"\r\n",
    );
    body.push_str("Content-Type: application/json\r\n\r\n");
    body.push_str(json);
    body.push_str("\r\n");
    if merge {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        body.push_str("Content-Disposition: form-data; name=\"merge\"\r\n\r\nyes\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

async fn seed_at(
    wiki: &TestWiki,
    title: &str,
    body: &str,
    author: Option<&str>,
    updated: OffsetDateTime,
) {
    wiki.pages
        .save_page(SavePageParams {
            title: title.to_string(),
            body: body.to_string(),
            author_email: author.map(str::to_string),
            links: Vec::new(),
            updated_at: Some(updated),
        })
        .await
        .expect("seed page");
}

#[tokio::test]
async fn http_roundtrip_reproduces_pages_and_timestamps() {
    let source = TestWiki::new();
    seed_at(
        &source,
        "Front Page",
        "# Front\n\nWords.",
        Some("maker@example.com"),
        datetime!(2024-03-01 10:30:00 UTC),
    )
    .await;
    seed_at(
        &source,
        "Notes",
        "notes body",
        None,
        datetime!(2024-06-15 08:05:09 UTC),
    )
    .await;

    let cookie = source.sign_in(ADMIN_EMAIL).await;
    let archive = read_body(source.get_as("/w/data/export", &cookie).await).await;

    let target = TestWiki::new();
    let cookie = target.sign_in(ADMIN_EMAIL).await;
    let (content_type, body) = multipart_upload(&archive, false);
    let response = target
        .request(
            Request::post("/w/data/import")
                .header(header::CONTENT_TYPE, content_type)
                .header(header::COOKIE, cookie)
                .body(Body::from(body))
                .expect("request"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "Done. Saved 2 pages, deleted 0.\n");

    let front = target
        .pages
        .find_by_title("Front Page")
        .await
        .expect("lookup")
        .expect("imported page");
    assert_eq!(front.body, "# Front\n\nWords.");
    assert_eq!(front.author_email.as_deref(), Some("maker@example.com"));
    assert_eq!(front.updated_at, datetime!(2024-03-01 10:30:00 UTC));

    assert_eq!(target.pages.titles().await, vec!["Front Page", "Notes"]);
}

#[tokio::test]
async fn full_import_deletes_pages_the_archive_omits() {
    let wiki = TestWiki::new();
    wiki.seed_page("Keep", "kept body").await;
    wiki.seed_page("Drop", "doomed body").await;

    let archive = json!({
        "Keep": {
            "author": null,
            "updated": "2024-01-02 03:04:05",
            "body": "kept body, revised"
        }
    })
    .to_string();

    let settings = wiki.settings.load().await.expect("settings");
    let report = wiki
        .archive
        .apply_archive(&settings, &archive, false)
        .await
        .expect("import");
    assert_eq!(report.saved, 1);
    assert_eq!(report.deleted, 1);

    assert!(wiki.pages.find_by_title("Drop").await.expect("lookup").is_none());
    // History survives the delete.
    assert_eq!(wiki.pages.revision_count("Drop").await, 1);

    let kept = wiki
        .pages
        .find_by_title("Keep")
        .await
        .expect("lookup")
        .expect("kept page");
    assert_eq!(kept.body, "kept body, revised");
    assert_eq!(kept.updated_at, datetime!(2024-01-02 03:04:05 UTC));
}

#[tokio::test]
async fn merge_import_leaves_other_pages_alone() {
    let wiki = TestWiki::new();
    wiki.seed_page("Keep", "kept body").await;
    wiki.seed_page("Bystander", "untouched").await;

    let archive = json!({
        "Keep": {
            "author": null,
            "updated": "2024-01-02 03:04:05",
            "body": "kept body, revised"
        }
    })
    .to_string();

    let settings = wiki.settings.load().await.expect("settings");
    let report = wiki
        .archive
        .apply_archive(&settings, &archive, true)
        .await
        .expect("import");
    assert_eq!(report.saved, 1);
    assert_eq!(report.deleted, 0);

    let bystander = wiki
        .pages
        .find_by_title("Bystander")
        .await
        .expect("lookup")
        .expect("bystander page");
    assert_eq!(bystander.body, "untouched");
}

#[tokio::test]
async fn import_rejects_bad_timestamps_by_page() {
    let wiki = TestWiki::new();
    let archive = json!({
        "Broken": {
            "author": null,
            "updated": "yesterday, around noon",
            "body": "whatever"
        }
    })
    .to_string();

    let settings = wiki.settings.load().await.expect("settings");
    let error = wiki
        .archive
        .apply_archive(&settings, &archive, true)
        .await
        .expect_err("import must fail");
    assert!(matches!(error, WikiError::BadRequest(_)));
    assert_eq!(error.to_string(), "Invalid timestamp on page Broken.");
}

#[tokio::test]
async fn import_rejects_archives_that_are_not_json() {
    let wiki = TestWiki::new();
    let settings = wiki.settings.load().await.expect("settings");
    let error = wiki
        .archive
        .apply_archive(&settings, "these are not the pages", true)
        .await
        .expect_err("import must fail");
    assert_eq!(error.to_string(), "The archive could not be parsed.");
}

#[tokio::test]
async fn import_without_a_file_is_a_bad_request() {
    let wiki = TestWiki::new();
    let cookie = wiki.sign_in(ADMIN_EMAIL).await;

    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"merge\"\r\n\r\nyes\r\n\
         --{BOUNDARY}--\r\n"
    );
    let response = wiki
        .request(
            Request::post("/w/data/import")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .header(header::COOKIE, cookie)
                .header("X-Requested-With", "XMLHttpRequest")
                .body(Body::from(body))
                .expect("request"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value =
        serde_json::from_str(&read_body(response).await).expect("json envelope");
    assert_eq!(body["error"], "No archive file supplied.");
}

#[tokio::test]
async fn export_format_is_stable() {
    let wiki = TestWiki::new();
    seed_at(
        &wiki,
        "Front Page",
        "# Front\n\nWords.",
        Some("maker@example.com"),
        datetime!(2024-03-01 10:30:00 UTC),
    )
    .await;
    seed_at(
        &wiki,
        "Notes",
        "notes body",
        None,
        datetime!(2024-06-15 08:05:09 UTC),
    )
    .await;

    let archive = wiki.archive.export_all().await.expect("export");
    insta::assert_snapshot!("export_format", archive);
}
