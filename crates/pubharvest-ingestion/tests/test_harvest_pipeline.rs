//! End-to-end harvest runs against a mock PubMed / PMC server.
//!
//! Run with: cargo test --package pubharvest-ingestion --test test_harvest_pipeline

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pubharvest_common::{DiseaseCategory, HarvestClient, HarvestConfig, Result};
use pubharvest_ingestion::retrieval::document_filename;
use pubharvest_ingestion::sources::idconv::IdConverter;
use pubharvest_ingestion::store::{GLOBAL_JSON, GLOBAL_TABLE, REPORT_FILE};
use pubharvest_ingestion::{
    CitationIndex, DownloadStatus, Harvester, PaperRecord, RetrievalEngine, StateStore,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn pdf_body() -> Vec<u8> {
    let mut body = b"%PDF-1.7\n".to_vec();
    body.resize(8_000, b'x');
    body
}

fn article(pmid: &str, title: &str, pmc: Option<&str>, doi: Option<&str>) -> String {
    let pmc = pmc
        .map(|p| format!(r#"<ArticleId IdType="pmc">{p}</ArticleId>"#))
        .unwrap_or_default();
    let doi = doi
        .map(|d| format!(r#"<ArticleId IdType="doi">{d}</ArticleId>"#))
        .unwrap_or_default();
    format!(
        r#"<PubmedArticle>
  <MedlineCitation>
    <PMID Version="1">{pmid}</PMID>
    <Article>
      <Journal>
        <JournalIssue><PubDate><Year>2022</Year></PubDate></JournalIssue>
        <Title>BMJ</Title>
      </Journal>
      <ArticleTitle>{title}</ArticleTitle>
      <Abstract><AbstractText>We enrolled 300 patients.</AbstractText></Abstract>
      <PublicationTypeList><PublicationType>Journal Article</PublicationType></PublicationTypeList>
    </Article>
  </MedlineCitation>
  <PubmedData>
    <ArticleIdList><ArticleId IdType="pubmed">{pmid}</ArticleId>{pmc}{doi}</ArticleIdList>
  </PubmedData>
</PubmedArticle>"#
    )
}

fn article_set(articles: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<PubmedArticleSet>{}</PubmedArticleSet>",
        articles.concat()
    )
}

fn idlist(ids: &[&str]) -> serde_json::Value {
    serde_json::json!({ "esearchresult": { "count": ids.len().to_string(), "idlist": ids } })
}

async fn mount_search(server: &MockServer, pubmed_ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/entrez/eutils/esearch.fcgi"))
        .and(query_param("db", "pubmed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(idlist(pubmed_ids)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/entrez/eutils/esearch.fcgi"))
        .and(query_param("db", "pmc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(idlist(&[])))
        .mount(server)
        .await;
}

async fn mount_efetch(server: &MockServer, xml: String) {
    Mock::given(method("GET"))
        .and(path("/entrez/eutils/efetch.fcgi"))
        .and(query_param("db", "pubmed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(xml))
        .mount(server)
        .await;
}

async fn mount_pmc_pdfs(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/pmc/articles/PMC\d+/pdf/$"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/pdf")
                .set_body_bytes(pdf_body()),
        )
        .mount(server)
        .await;
}

fn config_for(server: &MockServer, dir: &std::path::Path, categories: Vec<DiseaseCategory>) -> HarvestConfig {
    let mut config = HarvestConfig::for_testing(&server.uri(), dir);
    config.categories = categories;
    config
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_run_fetches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let gout = || vec![DiseaseCategory::new("Gout", &["gout"]).with_target(2)];

    let first = MockServer::start().await;
    mount_search(&first, &["101", "102", "103"]).await;
    mount_efetch(
        &first,
        article_set(&[
            article("101", "Colchicine for gout flares", Some("PMC101"), None),
            article("102", "Allopurinol dosing in gout", Some("PMC102"), None),
            article("103", "Diet and urate", Some("PMC103"), None),
        ]),
    )
    .await;
    mount_pmc_pdfs(&first).await;

    let harvester = Harvester::new(config_for(&first, dir.path(), gout())).unwrap();
    let summary = harvester.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.total_new(), 2);
    assert_eq!(summary.total_existing(), 0);
    assert_eq!(summary.stats[0].by_source.get("PMC"), Some(&2));
    assert!(!summary.stats[0].closed_short);
    for record in &summary.records {
        assert_eq!(record.download_status, DownloadStatus::Success);
        assert!(record.local_path.as_ref().unwrap().is_file());
    }

    // Nothing may be requested from the second server.
    let second = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&second)
        .await;

    let harvester = Harvester::new(config_for(&second, dir.path(), gout())).unwrap();
    let summary = harvester.run(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.total_existing(), 2);
    assert_eq!(summary.total_new(), 0);
    assert!(summary
        .records
        .iter()
        .all(|r| r.download_status == DownloadStatus::Exists));

    assert!(dir.path().join("Gout").join("Gout_papers.csv").is_file());
    assert!(dir.path().join(GLOBAL_TABLE).is_file());
    assert!(dir.path().join(GLOBAL_JSON).is_file());
    assert!(dir.path().join(REPORT_FILE).is_file());
}

#[tokio::test]
async fn test_full_category_makes_no_search_calls() {
    let dir = tempfile::tempdir().unwrap();
    let category = DiseaseCategory::new("Asthma", &["asthma"]).with_target(5);

    let store = StateStore::new(dir.path(), 5_000);
    let cat_dir = store.ensure_category_dir("Asthma").unwrap();
    let mut rows = Vec::new();
    for i in 1..=5 {
        let mut record = PaperRecord::new(i.to_string()).in_category("Asthma", "Asthma");
        record.title = format!("Inhaled steroids {i}");
        record.year = "2020".into();
        std::fs::write(cat_dir.join(document_filename(&record)), pdf_body()).unwrap();
        rows.push(record);
    }
    store.save_category(&category, &rows).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/entrez/eutils/esearch.fcgi"))
        .respond_with(ResponseTemplate::new(200).set_body_json(idlist(&["9"])))
        .expect(0)
        .mount(&server)
        .await;

    let harvester = Harvester::new(config_for(&server, dir.path(), vec![category])).unwrap();
    let summary = harvester.run(CancellationToken::new()).await.unwrap();

    let stats = &summary.stats[0];
    assert_eq!(stats.existing_valid, 5);
    assert_eq!(stats.new_downloaded, 0);
    assert_eq!(stats.total, 5);
    assert_eq!(stats.untracked, 0);
}

#[tokio::test]
async fn test_no_paper_counted_in_two_categories() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_search(&server, &["101", "102", "103", "104"]).await;
    mount_efetch(
        &server,
        article_set(&[
            article("101", "Shared one", Some("PMC101"), None),
            article("102", "Shared two", Some("PMC102"), None),
            article("103", "Shared three", Some("PMC103"), None),
            article("104", "Shared four", Some("PMC104"), None),
        ]),
    )
    .await;
    mount_pmc_pdfs(&server).await;

    let categories = vec![
        DiseaseCategory::new("Alpha", &["overlap"]).with_target(2),
        DiseaseCategory::new("Beta", &["overlap"]).with_target(2),
    ];
    let harvester = Harvester::new(config_for(&server, dir.path(), categories)).unwrap();
    let summary = harvester.run(CancellationToken::new()).await.unwrap();

    let by_category = |key: &str| -> HashSet<String> {
        summary
            .records
            .iter()
            .filter(|r| r.category_key == key)
            .map(|r| r.pmid.clone())
            .collect()
    };
    let alpha = by_category("Alpha");
    let beta = by_category("Beta");
    assert_eq!(alpha.len(), 2);
    assert_eq!(beta.len(), 2);
    assert!(alpha.is_disjoint(&beta));
}

#[tokio::test]
async fn test_exhausted_candidates_close_short() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_search(&server, &["101", "102"]).await;
    mount_efetch(
        &server,
        article_set(&[
            article("101", "Downloadable", Some("PMC101"), None),
            article("102", "Paywalled", None, None),
        ]),
    )
    .await;
    mount_pmc_pdfs(&server).await;

    let categories = vec![DiseaseCategory::new("Eczema", &["eczema"]).with_target(3)];
    let harvester = Harvester::new(config_for(&server, dir.path(), categories)).unwrap();
    let summary = harvester.run(CancellationToken::new()).await.unwrap();

    let stats = &summary.stats[0];
    assert_eq!(stats.total, 1);
    assert_eq!(stats.failed, 1);
    assert!(stats.closed_short);
    assert!(stats.total <= stats.target);
}

#[tokio::test]
async fn test_cancelled_run_skips_categories() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let categories = vec![DiseaseCategory::new("Gout", &["gout"])];
    let harvester = Harvester::new(config_for(&server, dir.path(), categories)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = harvester.run(cancel).await.unwrap();
    assert!(summary.cancelled);
    assert!(summary.stats.is_empty());
}

#[tokio::test]
async fn test_invalid_config_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let harvester = Harvester::new(config_for(&server, dir.path(), Vec::new())).unwrap();
    let err = harvester.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, pubharvest_common::HarvestError::Config(_)));
}

#[tokio::test]
async fn test_untracked_document_is_held_but_not_counted() {
    let dir = tempfile::tempdir().unwrap();
    let gout = DiseaseCategory::new("Gout", &["crystal"]).with_target(1);
    let arthritis = DiseaseCategory::new("Arthritis", &["crystal"]).with_target(1);

    // A document with no table row behind it.
    let store = StateStore::new(dir.path(), 5_000);
    let gout_dir = store.ensure_category_dir("Gout").unwrap();
    let orphan = gout_dir.join("PMID101_2020_Orphan.pdf");
    std::fs::write(&orphan, pdf_body()).unwrap();

    let server = MockServer::start().await;
    mount_search(&server, &["101", "102", "103"]).await;
    mount_efetch(
        &server,
        article_set(&[
            article("101", "Orphaned crystal paper", Some("PMC101"), None),
            article("102", "Crystal imaging", Some("PMC102"), None),
            article("103", "Crystal deposition", Some("PMC103"), None),
        ]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/pmc/articles/PMC101/pdf/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pdf_body()))
        .with_priority(1)
        .expect(0)
        .mount(&server)
        .await;
    mount_pmc_pdfs(&server).await;

    let harvester =
        Harvester::new(config_for(&server, dir.path(), vec![gout.clone(), arthritis])).unwrap();
    let summary = harvester.run(CancellationToken::new()).await.unwrap();

    let gout_stats = &summary.stats[0];
    assert_eq!(gout_stats.untracked, 1);
    assert_eq!(gout_stats.total, 1);
    assert_eq!(gout_stats.new_downloaded, 1);
    assert_eq!(summary.stats[1].untracked, 0);
    assert_eq!(summary.stats[1].total, 1);

    // Neither category scores or owns it, and the file is untouched.
    assert!(summary.records.iter().all(|r| r.pmid != "101"));
    assert!(store.load_category(&gout).records.iter().all(|r| r.pmid != "101"));
    assert_eq!(std::fs::read(&orphan).unwrap(), pdf_body());
}

#[tokio::test]
async fn test_open_access_supplement_fills_shortfall() {
    let dir = tempfile::tempdir().unwrap();
    let category = DiseaseCategory::new("Gout", &["gout"]).with_target(3);

    let store = StateStore::new(dir.path(), 5_000);
    let cat_dir = store.ensure_category_dir("Gout").unwrap();
    let mut held = PaperRecord::new("100").in_category("Gout", "Gout");
    held.title = "Stored earlier".into();
    held.year = "2021".into();
    std::fs::write(cat_dir.join(document_filename(&held)), pdf_body()).unwrap();
    store.save_category(&category, &[held]).unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/entrez/eutils/esearch.fcgi"))
        .and(query_param("db", "pubmed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(idlist(&["100", "101"])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/entrez/eutils/esearch.fcgi"))
        .and(query_param("db", "pmc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(idlist(&["4100", "4101", "4202"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/idconv/v1.0/"))
        .and(query_param("ids", "PMC4100,PMC4101,PMC4202"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "records": [
                {"pmcid": "PMC4100", "pmid": "100"},
                {"pmcid": "PMC4101", "pmid": "101"},
                {"pmcid": "PMC4202", "pmid": "202"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    // Only the two unseen ids are fetched: 100 is held, 101 came from the first search.
    Mock::given(method("GET"))
        .and(path("/entrez/eutils/efetch.fcgi"))
        .and(query_param("id", "101,202"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_set(&[
            article("101", "Urate lowering", Some("PMC4101"), None),
            article("202", "Open access only", Some("PMC4202"), None),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_pmc_pdfs(&server).await;

    let harvester = Harvester::new(config_for(&server, dir.path(), vec![category])).unwrap();
    let summary = harvester.run(CancellationToken::new()).await.unwrap();

    let stats = &summary.stats[0];
    assert_eq!(stats.existing_valid, 1);
    assert_eq!(stats.new_downloaded, 2);
    assert_eq!(stats.total, 3);
    let pmids: HashSet<&str> = summary.records.iter().map(|r| r.pmid.as_str()).collect();
    assert_eq!(pmids, HashSet::from(["100", "101", "202"]));
}

#[tokio::test]
async fn test_failed_metadata_batch_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_search(&server, &["101", "102", "103", "104"]).await;
    Mock::given(method("GET"))
        .and(path("/entrez/eutils/efetch.fcgi"))
        .and(query_param("id", "101,102"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/entrez/eutils/efetch.fcgi"))
        .and(query_param("id", "103,104"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_set(&[
            article("103", "Second batch one", Some("PMC103"), None),
            article("104", "Second batch two", Some("PMC104"), None),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    mount_pmc_pdfs(&server).await;

    let mut config = config_for(
        &server,
        dir.path(),
        vec![DiseaseCategory::new("Lupus", &["lupus"]).with_target(2)],
    );
    config.harvest.detail_batch_size = 2;
    let summary = Harvester::new(config).unwrap().run(CancellationToken::new()).await.unwrap();

    let stats = &summary.stats[0];
    assert_eq!(stats.total, 2);
    assert_eq!(stats.error, None);
    assert!(!stats.closed_short);
    let pmids: HashSet<&str> = summary.records.iter().map(|r| r.pmid.as_str()).collect();
    assert_eq!(pmids, HashSet::from(["103", "104"]));
}

/// Index that cancels the run as soon as the first search comes back.
struct CancellingIndex {
    cancel: CancellationToken,
    fetches: AtomicUsize,
}

#[async_trait]
impl CitationIndex for CancellingIndex {
    async fn search_free_fulltext(&self, _term: &str, _retmax: usize) -> Result<Vec<String>> {
        self.cancel.cancel();
        Ok(vec!["1".into(), "2".into()])
    }

    async fn search_open_access(&self, _term: &str, _retmax: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn pmcids_to_pmids(&self, _pmcids: &[String]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn fetch_records(&self, _pmids: &[String]) -> Result<Vec<PaperRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_cancelled_category_is_not_closed_short() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(
        &server,
        dir.path(),
        vec![
            DiseaseCategory::new("Gout", &["gout"]).with_target(2),
            DiseaseCategory::new("Asthma", &["asthma"]).with_target(2),
        ],
    );
    let http = HarvestClient::new(&config.harvest, &config.rate_limits).unwrap();
    let idconv = IdConverter::new(
        http.clone(),
        &config.endpoints.idconv_url,
        &config.harvest.tool_name,
        &config.harvest.contact_email,
    );
    let engine = RetrievalEngine::standard(&config, http, idconv);

    let cancel = CancellationToken::new();
    let index = Arc::new(CancellingIndex {
        cancel: cancel.clone(),
        fetches: AtomicUsize::new(0),
    });
    let harvester = Harvester::with_components(config, index.clone(), engine);
    let summary = harvester.run(cancel).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.stats.len(), 1);
    let stats = &summary.stats[0];
    assert!(stats.cancelled);
    assert!(!stats.closed_short);
    assert_eq!(stats.total, 0);
    assert_eq!(index.fetches.load(Ordering::SeqCst), 0);
}
