//! Retrieval engine fallbacks against a mock content server.
//!
//! Run with: cargo test --package pubharvest-ingestion --test test_retrieval_chain

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pubharvest_common::{HarvestClient, HarvestConfig};
use pubharvest_ingestion::sources::idconv::IdConverter;
use pubharvest_ingestion::{DownloadStatus, PaperRecord, RetrievalEngine};

fn pdf_body() -> Vec<u8> {
    let mut body = b"%PDF-1.4\n".to_vec();
    body.resize(9_000, b'0');
    body
}

fn engine_for(server: &MockServer, dir: &std::path::Path) -> RetrievalEngine {
    let config = HarvestConfig::for_testing(&server.uri(), dir);
    let http = HarvestClient::new(&config.harvest, &config.rate_limits).unwrap();
    let idconv = IdConverter::new(
        http.clone(),
        &config.endpoints.idconv_url,
        &config.harvest.tool_name,
        &config.harvest.contact_email,
    );
    RetrievalEngine::standard(&config, http, idconv)
}

#[tokio::test]
async fn test_unpaywall_rescues_record_without_pmcid() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/idconv/v1.0/"))
        .and(query_param("ids", "201"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok",
            "records": [{"requested-id": "201", "pmid": "201", "status": "error", "errmsg": "not in PMC"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/unpaywall/v2/10.1000/xyz1"))
        .and(query_param("email", "pubharvest@example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "doi": "10.1000/xyz1",
            "is_oa": true,
            "oa_locations": [
                {"url_for_pdf": format!("{}/oa/gone.pdf", server.uri())},
                {"url_for_pdf": null},
                {"url_for_pdf": format!("{}/oa/xyz1.pdf", server.uri())}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/oa/xyz1.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server, dir.path());
    assert_eq!(engine.strategy_names(), vec!["PMC", "PMC", "EuropePMC", "Unpaywall"]);

    let mut record = PaperRecord::new("201");
    record.title = "Open access elsewhere".into();
    record.year = "2023".into();
    record.doi = Some("10.1000/xyz1".into());

    assert!(engine.fetch(&mut record, dir.path()).await);
    assert_eq!(record.download_status, DownloadStatus::Success);
    assert_eq!(record.download_source.as_deref(), Some("Unpaywall"));
    assert_eq!(record.file_size, 9_000);
    let saved = record.local_path.clone().unwrap();
    assert_eq!(std::fs::read(saved).unwrap().len(), 9_000);
}

#[tokio::test]
async fn test_pmc_page_scrape_finds_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    // Direct PDF path answers with a login page; main.pdf is missing.
    Mock::given(method("GET"))
        .and(path("/pmc/articles/PMC5/pdf/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>please log in</html>"))
        .mount(&server)
        .await;

    let page = format!(
        r#"<html><head><meta name="citation_pdf_url" content="{}/files/PMC5.pdf"></head><body></body></html>"#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/pmc/articles/PMC5/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/PMC5.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server, dir.path());
    let mut record = PaperRecord::new("5");
    record.pmc_id = Some("PMC5".into());
    record.title = "Scraped".into();

    assert!(engine.fetch(&mut record, dir.path()).await);
    assert_eq!(record.download_source.as_deref(), Some("PMC"));
    assert_eq!(record.filename.as_deref(), Some("PMID5_XXXX_Scraped.pdf"));
}

#[tokio::test]
async fn test_translated_pmcid_falls_through_to_europe_pmc() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/idconv/v1.0/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [{"requested-id": "77", "pmid": "77", "pmcid": "PMC770"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/europepmc/articles/PMC770"))
        .and(query_param("pdf", "render"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server, dir.path());
    let mut record = PaperRecord::new("77");
    record.title = "Mirrored".into();

    assert!(engine.fetch(&mut record, dir.path()).await);
    assert_eq!(record.pmc_id.as_deref(), Some("PMC770"));
    assert_eq!(record.download_source.as_deref(), Some("EuropePMC"));
}

#[tokio::test]
async fn test_existing_document_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let engine = engine_for(&server, dir.path());

    let mut record = PaperRecord::new("9");
    record.title = "Already here".into();
    record.year = "2019".into();
    std::fs::write(dir.path().join("PMID9_2019_Already_here.pdf"), pdf_body()).unwrap();

    assert!(engine.fetch(&mut record, dir.path()).await);
    assert_eq!(record.download_status, DownloadStatus::Exists);
    assert_eq!(record.download_source, None);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_exhausted_chain_marks_failed() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let engine = engine_for(&server, dir.path());

    let mut record = PaperRecord::new("404");
    record.pmc_id = Some("PMC404".into());
    record.doi = Some("10.1/none".into());

    assert!(!engine.fetch(&mut record, dir.path()).await);
    assert_eq!(record.download_status, DownloadStatus::Failed);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_unwritable_target_marks_failed() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pmc/articles/PMC1/pdf/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
        .mount(&server)
        .await;

    // A regular file stands where the category directory should be.
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").unwrap();

    let engine = engine_for(&server, dir.path());
    let mut record = PaperRecord::new("1");
    record.pmc_id = Some("PMC1".into());

    assert!(!engine.fetch(&mut record, &blocked).await);
    assert_eq!(record.download_status, DownloadStatus::Failed);
}

#[tokio::test]
async fn test_rejected_bodies_fall_through_to_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    let mut login_page = b"<html><body>Please sign in</body></html>".to_vec();
    login_page.resize(9_000, b' ');
    Mock::given(method("GET"))
        .and(path("/pmc/articles/PMC31/pdf/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(login_page))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pmc/articles/PMC31/pdf/main.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 truncated".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/europepmc/articles/PMC31"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server, dir.path());
    let mut record = PaperRecord::new("31");
    record.pmc_id = Some("PMC31".into());
    record.title = "Mirror only".into();

    assert!(engine.fetch(&mut record, dir.path()).await);
    assert_eq!(record.download_source.as_deref(), Some("EuropePMC"));
    assert_eq!(record.file_size, 9_000);
}

#[tokio::test]
async fn test_scraped_links_resolve_against_redirected_page() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pmc/articles/PMC6/"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("location", format!("{}/pmc/moved/PMC6/", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pmc/moved/PMC6/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body><a href="files/article.pdf">Download PDF</a></body></html>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pmc/moved/PMC6/files/article.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
        .expect(1)
        .mount(&server)
        .await;

    let engine = engine_for(&server, dir.path());
    let mut record = PaperRecord::new("6");
    record.pmc_id = Some("PMC6".into());
    record.title = "Moved".into();

    assert!(engine.fetch(&mut record, dir.path()).await);
    assert_eq!(record.download_source.as_deref(), Some("PMC"));
}
