//! The preview page served over HTTP, checked the way a browser would see it

mod common;

use std::sync::Arc;
use std::time::Duration;

use bookmark_preview::presenter::PRINT_CSS;
use bookmark_preview::server::{PreviewServer, TICKET_HEADER};
use bookmark_preview::{HttpFragmentSource, PreviewConfig, Presenter, Session, YearStrategy};
use chrono::NaiveDate;
use common::FakeRenderer;
use scraper::{Html, Selector};

fn serve(renderer: &FakeRenderer) -> String {
    let config = PreviewConfig {
        render_endpoint: renderer.endpoint.clone(),
        year_strategy: YearStrategy::static_default(),
        ..Default::default()
    };
    let source = HttpFragmentSource::new(&config).unwrap();
    let today = NaiveDate::from_ymd_opt(2025, 10, 19).unwrap();
    let session = Arc::new(Session::start(config, None, Arc::new(source), today).unwrap());

    let server = PreviewServer::bind("127.0.0.1:0", session).unwrap();
    let url = server.url();
    std::thread::spawn(move || {
        let _ = server.run();
    });
    url
}

fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn fragment(http: &reqwest::blocking::Client, base: &str) -> (u64, String) {
    let res = http.get(format!("{}api/fragment", base)).send().unwrap();
    let ticket = res
        .headers()
        .get(TICKET_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("fragment ticket header");
    (ticket, res.text().unwrap())
}

#[test]
fn fragment_reads_carry_the_accepted_ticket() {
    let renderer = FakeRenderer::start("", Duration::ZERO);
    let base = serve(&renderer);
    let http = client();

    let page = http.get(&base).send().unwrap().text().unwrap();
    assert!(page.contains("window.FRAGMENT_TICKET = 1;"));
    assert_eq!(fragment(&http, &base).0, 1);

    // A nudge that changes nothing fetches nothing and keeps the ticket
    for (delta, expected) in [("1", 2), ("-1", 3), ("0", 3)] {
        let status = http
            .post(format!("{}api/nudge?param=font&delta={}", base, delta))
            .send()
            .unwrap()
            .status();
        assert!(status.is_success());
        let (ticket, markup) = fragment(&http, &base);
        assert_eq!(ticket, expected);
        assert!(markup.contains("table class=\"bookmark\""));
    }
    assert_eq!(renderer.count(), 3);
}

#[test]
fn page_embeds_fragment_in_preview_region() {
    let renderer = FakeRenderer::start("", Duration::ZERO);
    let base = serve(&renderer);

    let page = client().get(&base).send().unwrap().text().unwrap();
    let document = Html::parse_document(&page);

    let preview_sel = Selector::parse(".printable-content").unwrap();
    let previews: Vec<_> = document.select(&preview_sel).collect();
    assert_eq!(previews.len(), 1);
    let table_sel = Selector::parse("table.bookmark").unwrap();
    assert!(previews[0].select(&table_sel).next().is_some());

    // The print trigger lives outside the preview region
    let inner_button = Selector::parse(".printable-content button").unwrap();
    assert!(document.select(&inner_button).next().is_none());
    let trigger = Selector::parse("button.print-trigger").unwrap();
    let button = document.select(&trigger).next().expect("print button");
    assert_eq!(button.value().attr("onclick"), Some("window.print()"));

    let selected = Selector::parse("select[name=\"year\"] option[selected]").unwrap();
    let label = document.select(&selected).next().unwrap().text().collect::<String>();
    assert_eq!(label, "התשפה");
}

#[test]
fn print_stylesheet_isolates_preview() {
    let document = Html::parse_document(&Presenter::render_document("<p id=\"sheet\">x</p>"));
    let style_sel = Selector::parse("style").unwrap();
    let css = document
        .select(&style_sel)
        .map(|s| s.text().collect::<String>())
        .collect::<String>();

    assert_eq!(css.trim(), PRINT_CSS.trim());
    let print = &css[css.find("@media print").expect("print block")..];
    assert!(print.contains("body * {\n    visibility: hidden;"));
    assert!(print.contains(".printable-content, .printable-content * {\n    visibility: visible;"));
    assert!(print.contains("button {\n    display: none !important;"));
    assert!(print.contains(".controls {\n    display: none !important;"));
}

#[test]
fn api_round_trip_updates_preview() {
    let renderer = FakeRenderer::start("", Duration::ZERO);
    let base = serve(&renderer);
    let http = client();

    let reply: serde_json::Value = http
        .post(format!("{}api/pending?param=width&value=17.3", base))
        .send()
        .and_then(|r| r.text())
        .map(|body| serde_json::from_str(&body).unwrap())
        .unwrap();
    assert_eq!(reply["outcome"], "unchanged");
    assert_eq!(renderer.count(), 1);

    let reply: serde_json::Value = http
        .post(format!("{}api/commit?param=width&value=17.3", base))
        .send()
        .and_then(|r| r.text())
        .map(|body| serde_json::from_str(&body).unwrap())
        .unwrap();
    assert_eq!(reply["outcome"], "applied");
    assert_eq!(reply["values"]["width"], 17.3);
    assert_eq!(renderer.count(), 2);

    let (ticket, fragment) = fragment(&http, &base);
    assert_eq!(ticket, 2);
    assert!(fragment.contains("width=17.3&"));

    let reply: serde_json::Value = http
        .post(format!("{}api/nudge?param=font&delta=-1", base))
        .send()
        .and_then(|r| r.text())
        .map(|body| serde_json::from_str(&body).unwrap())
        .unwrap();
    assert_eq!(reply["values"]["font"], 14.7);

    let status = http.post(format!("{}api/commit?param=depth", base)).send().unwrap().status();
    assert_eq!(status.as_u16(), 400);
    let status = http.get(format!("{}missing", base)).send().unwrap().status();
    assert_eq!(status.as_u16(), 404);
}
