// tests/providers_html.rs
//
// HTML adapter against an in-process server serving the fixture pages.
// One detail page is missing: its record must degrade, not fail the page.

use std::net::SocketAddr;

use axum::{extract::Path, http::StatusCode, response::Html, routing::get, Router};
use chrono::NaiveDate;

use opsidius_leads::ingest::providers::HtmlScrapeAdapter;
use opsidius_leads::ingest::{Normalizer, PageCursor, SourceAdapter, SourceKind};
use opsidius_leads::LeadsConfig;

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn site() -> SocketAddr {
    let search = fixture("html_search.html");
    let mie = fixture("html_detail_mie.html");
    let martin = fixture("html_detail_martin.html");

    let app = Router::new()
        .route("/recherche", get(move || async move { Html(search) }))
        .route(
            "/entreprise/{slug}",
            get(move |Path(slug): Path<String>| async move {
                match slug.as_str() {
                    "la-mie-du-port-912345678" => Ok(Html(mie)),
                    "plomberie-martin-923456789" => Ok(Html(martin)),
                    _ => Err(StatusCode::NOT_FOUND),
                }
            }),
        );
    spawn(app).await
}

fn config(addr: SocketAddr) -> LeadsConfig {
    let mut cfg = LeadsConfig::default_seed();
    cfg.html.base_url = format!("http://{addr}");
    cfg.html.search_path = "/recherche".into();
    cfg.html.detail_concurrency = 2;
    cfg.http.max_attempts = 1;
    cfg
}

#[tokio::test]
async fn search_and_detail_pages_become_records() {
    let addr = site().await;
    let cfg = config(addr);
    let adapter = HtmlScrapeAdapter::new(&cfg).unwrap();
    assert_eq!(adapter.kind(), SourceKind::HtmlScrape);

    let page = adapter.fetch_partition("44", PageCursor::first()).await.unwrap();
    assert_eq!(page.next, None);
    // Duplicate card dropped; discovery order kept.
    assert_eq!(page.records.len(), 3);

    let mie = &page.records[0];
    assert_eq!(mie.text("name").as_deref(), Some("La Mie du Port"));
    assert_eq!(mie.text("siren").as_deref(), Some("912345678"));
    assert_eq!(mie.text("city").as_deref(), Some("Nantes"));
    assert_eq!(mie.text("postal_code").as_deref(), Some("44000"));
    assert_eq!(mie.text("created_at").as_deref(), Some("28/09/2026"));
    assert_eq!(mie.text("naf_code").as_deref(), Some("10.71C"));
    assert_eq!(mie.text("email").as_deref(), Some("bonjour@lamieduport.fr"));
    assert_eq!(mie.text("phone").as_deref(), Some("0240123456"));
    assert_eq!(mie.text("website"), None);

    let martin = &page.records[1];
    assert_eq!(martin.text("name").as_deref(), Some("Plomberie & Chauffage Martin"));
    assert_eq!(martin.text("city").as_deref(), Some("Angers"));
    assert_eq!(martin.text("website").as_deref(), Some("https://plomberie-martin.example"));

    // Detail page 404: name, link and slug id survive.
    let gone = &page.records[2];
    assert_eq!(gone.text("name").as_deref(), Some("Atelier Disparu"));
    assert_eq!(gone.text("siren").as_deref(), Some("934567890"));
    assert!(gone.text("detail_url").unwrap().ends_with("/entreprise/atelier-disparu-934567890"));
    assert_eq!(gone.text("city"), None);
}

#[tokio::test]
async fn scraped_records_normalize_and_degraded_one_is_dropped() {
    let addr = site().await;
    let cfg = config(addr);
    let adapter = HtmlScrapeAdapter::new(&cfg).unwrap();
    let page = adapter.fetch_partition("44", PageCursor::first()).await.unwrap();

    let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
    let n = Normalizer::from_config(&cfg);
    let companies: Vec<_> = page
        .records
        .iter()
        .filter_map(|r| n.normalize_at(r, SourceKind::HtmlScrape, today))
        .collect();

    assert_eq!(companies.len(), 2);
    assert_eq!(companies[0].created_at, NaiveDate::from_ymd_opt(2026, 9, 28).unwrap());
    assert_eq!(companies[0].sector_label, "Food manufacturing");
    assert!(!companies[0].has_website);
    assert_eq!(
        companies[1].website_url.as_deref(),
        Some("https://plomberie-martin.example")
    );
    assert!(companies[1].needs_probe());
}

#[tokio::test]
async fn search_page_failure_fails_the_partition() {
    let app = Router::new().route(
        "/recherche",
        get(|| async { (StatusCode::FORBIDDEN, "blocked") }),
    );
    let addr = spawn(app).await;
    let adapter = HtmlScrapeAdapter::new(&config(addr)).unwrap();
    assert!(adapter.fetch_partition("44", PageCursor::first()).await.is_err());
}
