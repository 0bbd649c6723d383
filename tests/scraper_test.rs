//! サロンサイト取得の統合テスト
//!
//! wiremockのサーバーにページを置いて、ページ送りと失敗時の扱いを検証

use hairstyle_analyzer::config::ScraperConfig;
use hairstyle_analyzer::scraper::{CandidateSource, Candidates, SalonScraper};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scraper_config(base_url: String) -> ScraperConfig {
    ScraperConfig {
        base_url,
        max_retries: 1,
        retry_delay: 0.0,
        timeout: 5.0,
        ..Default::default()
    }
}

fn coupon_page(names: &[&str]) -> String {
    let items: String = names
        .iter()
        .map(|name| {
            format!(
                r#"<li><p class="couponName">{}</p><p class="couponText">説明</p></li>"#,
                name
            )
        })
        .collect();
    format!(r#"<html><body><ul class="couponList">{}</ul></body></html>"#, items)
}

async fn serve(server: &MockServer, page: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// 最終ページを越えた404は打ち切りとして扱い、取得済みのクーポンは残す
#[tokio::test]
async fn test_coupon_page_not_found_after_first_keeps_coupons() {
    let server = MockServer::start().await;
    serve(&server, "/coupon/PN2.html", coupon_page(&["カット+カラー"])).await;
    // PN3 以降は未登録なので 404

    let scraper = SalonScraper::new(&scraper_config(server.uri())).expect("スクレイパー作成失敗");

    let coupons = scraper.coupons().await.expect("クーポン取得失敗");
    assert_eq!(coupons.len(), 1);
    assert_eq!(coupons[0].name, "カット+カラー");

    let candidates = Candidates::fetch(&scraper).await;
    assert_eq!(candidates.coupons.len(), 1);
}

/// 最初のページが取れなければエラー（候補一覧は空で続行）
#[tokio::test]
async fn test_first_coupon_page_failure_is_error() {
    let server = MockServer::start().await;

    let scraper = SalonScraper::new(&scraper_config(server.uri())).expect("スクレイパー作成失敗");

    assert!(scraper.coupons().await.is_err());

    let candidates = Candidates::fetch(&scraper).await;
    assert!(candidates.coupons.is_empty());
    assert!(candidates.stylists.is_empty());
}

/// 空のページでページ送りを止め、重複は最初の出現だけ残す
#[tokio::test]
async fn test_coupon_paging_stops_at_empty_page() {
    let server = MockServer::start().await;
    serve(&server, "/coupon/PN2.html", coupon_page(&["縮毛矯正", "カット"])).await;
    serve(&server, "/coupon/PN3.html", coupon_page(&[])).await;
    Mock::given(method("GET"))
        .and(path("/coupon/PN4.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(coupon_page(&["取得されない"])))
        .expect(0)
        .mount(&server)
        .await;

    let scraper = SalonScraper::new(&scraper_config(server.uri())).expect("スクレイパー作成失敗");
    let coupons = scraper.coupons().await.expect("クーポン取得失敗");

    let names: Vec<&str> = coupons.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["縮毛矯正", "カット"]);
}

/// スタイリストページの取得と解析
#[tokio::test]
async fn test_fetch_stylists() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/stylist/",
        r#"<ul class="stylistList">
             <li><p class="stylistName">佐藤</p><p class="stylistDescription">ボブが得意</p></li>
             <li><p class="stylistName">鈴木</p><p class="stylistDescription">メンズカット</p></li>
           </ul>"#
            .to_string(),
    )
    .await;
    serve(&server, "/coupon/PN2.html", coupon_page(&["カット"])).await;

    let scraper = SalonScraper::new(&scraper_config(server.uri())).expect("スクレイパー作成失敗");
    let candidates = Candidates::fetch(&scraper).await;

    assert_eq!(candidates.stylists.len(), 2);
    assert_eq!(candidates.stylists[0].name, "佐藤");
    assert_eq!(candidates.stylists[0].description, "ボブが得意");
    assert_eq!(candidates.coupons.len(), 1);
}
