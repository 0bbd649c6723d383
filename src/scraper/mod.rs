//! サロンサイトからスタイリスト・クーポン一覧を取得
//!
//! HTMLの解析は同期関数に閉じ込める（scraper::Html は Send でないため）。

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use hairstyle_analyzer_common::{Candidate, CouponCandidate, StylistCandidate};

use crate::config::ScraperConfig;
use crate::error::{HairstyleError, Result};

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// 照合候補の取得元
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn stylists(&self) -> Result<Vec<StylistCandidate>>;
    async fn coupons(&self) -> Result<Vec<CouponCandidate>>;
}

/// 取得済みの候補一覧
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub stylists: Vec<StylistCandidate>,
    pub coupons: Vec<CouponCandidate>,
}

impl Candidates {
    /// 両方を取得する（どちらかが失敗したら空リストで続行）
    pub async fn fetch(source: &dyn CandidateSource) -> Self {
        let stylists = source.stylists().await.unwrap_or_else(|e| {
            warn!(error = %e, "スタイリスト一覧を取得できません");
            Vec::new()
        });
        let coupons = source.coupons().await.unwrap_or_else(|e| {
            warn!(error = %e, "クーポン一覧を取得できません");
            Vec::new()
        });
        Self { stylists, coupons }
    }
}

struct Selectors {
    stylist_item: Selector,
    stylist_name: Selector,
    stylist_description: Selector,
    coupon_item: Selector,
    coupon_name: Selector,
    coupon_text: Selector,
}

fn selector(css: &str, key: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| HairstyleError::Config(format!("scraper.{} が不正なセレクタです: {}: {}", key, css, e)))
}

impl Selectors {
    fn from_config(config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            stylist_item: selector(&config.stylist_item_selector, "stylist_item_selector")?,
            stylist_name: selector(&config.stylist_name_selector, "stylist_name_selector")?,
            stylist_description: selector(&config.stylist_description_selector, "stylist_description_selector")?,
            coupon_item: selector(&config.coupon_item_selector, "coupon_item_selector")?,
            coupon_name: selector(&config.coupon_name_selector, "coupon_name_selector")?,
            coupon_text: selector(&config.coupon_text_selector, "coupon_text_selector")?,
        })
    }
}

/// サロンサイトのスクレイパー
pub struct SalonScraper {
    http: reqwest::Client,
    base_url: String,
    stylist_path: String,
    coupon_path: String,
    page_start: u32,
    page_limit: u32,
    max_retries: u32,
    retry_delay: Duration,
    selectors: Selectors,
}

impl SalonScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(HairstyleError::Config("scraper.base_url が設定されていません".into()));
        }

        let mut builder = reqwest::Client::builder();
        if !config.timeout().is_zero() {
            builder = builder.timeout(config.timeout());
        }
        let http = builder
            .build()
            .map_err(|e| HairstyleError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim().to_string(),
            stylist_path: config.stylist_path.clone(),
            coupon_path: config.coupon_path.clone(),
            page_start: config.coupon_page_start_number,
            page_limit: config.coupon_page_limit,
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay(),
            selectors: Selectors::from_config(config)?,
        })
    }

    fn coupon_urls(&self) -> Vec<String> {
        coupon_page_urls(&self.base_url, &self.coupon_path, self.page_start, self.page_limit)
    }

    /// ページ取得（失敗時は再試行）
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            if attempt > 1 && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }

            let result = async {
                self.http
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await
            }
            .await;

            match result {
                Ok(body) => {
                    debug!(url, attempt, bytes = body.len(), "ページ取得");
                    return Ok(body);
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "ページ取得失敗");
                    last_error = e.to_string();
                }
            }
        }

        Err(HairstyleError::Scrape(format!(
            "{} を{}回試行しても取得できません: {}",
            url, self.max_retries, last_error
        )))
    }
}

#[async_trait]
impl CandidateSource for SalonScraper {
    async fn stylists(&self) -> Result<Vec<StylistCandidate>> {
        let url = join_url(&self.base_url, &self.stylist_path);
        let body = self.fetch(&url).await?;
        let stylists = parse_stylists(&body, &self.selectors);
        info!(count = stylists.len(), "スタイリスト取得");
        Ok(stylists)
    }

    async fn coupons(&self) -> Result<Vec<CouponCandidate>> {
        let mut coupons = Vec::new();

        for (index, url) in self.coupon_urls().into_iter().enumerate() {
            // 2ページ目以降の失敗は最終ページを越えたものとして打ち切る
            let body = match self.fetch(&url).await {
                Ok(body) => body,
                Err(e) if index > 0 => {
                    warn!(url = url.as_str(), error = %e, "クーポンページを取得できないため打ち切り");
                    break;
                }
                Err(e) => return Err(e),
            };
            let page = parse_coupons(&body, &self.selectors);
            if page.is_empty() {
                debug!(url = url.as_str(), "クーポンなし、ページ送り終了");
                break;
            }
            coupons.extend(page);
        }

        let coupons = dedupe_by_name(coupons);
        info!(count = coupons.len(), "クーポン取得");
        Ok(coupons)
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// クーポン一覧ページのURL（`{page}` がなければ1ページのみ）
fn coupon_page_urls(base: &str, coupon_path: &str, start: u32, limit: u32) -> Vec<String> {
    if !coupon_path.contains("{page}") {
        return vec![join_url(base, coupon_path)];
    }

    (start..start.saturating_add(limit))
        .map(|page| join_url(base, &coupon_path.replace("{page}", &page.to_string())))
        .collect()
}

/// 要素内テキスト（空白を1つにまとめる）
fn element_text(element: ElementRef<'_>) -> String {
    let text: String = element.text().collect::<Vec<_>>().join(" ");
    WHITESPACE.replace_all(text.trim(), " ").to_string()
}

fn child_text(item: ElementRef<'_>, selector: &Selector) -> String {
    item.select(selector).next().map(element_text).unwrap_or_default()
}

fn parse_stylists(html: &str, selectors: &Selectors) -> Vec<StylistCandidate> {
    let document = Html::parse_document(html);
    let stylists = document
        .select(&selectors.stylist_item)
        .map(|item| StylistCandidate {
            name: child_text(item, &selectors.stylist_name),
            description: child_text(item, &selectors.stylist_description),
        })
        .filter(|s| !s.name.is_empty())
        .collect();
    dedupe_by_name(stylists)
}

fn parse_coupons(html: &str, selectors: &Selectors) -> Vec<CouponCandidate> {
    let document = Html::parse_document(html);
    document
        .select(&selectors.coupon_item)
        .map(|item| CouponCandidate {
            name: child_text(item, &selectors.coupon_name),
            text: child_text(item, &selectors.coupon_text),
        })
        .filter(|c| !c.name.is_empty())
        .collect()
}

/// 名前の重複を除く（最初の出現を残し、順序は保つ）
pub fn dedupe_by_name<C: Candidate>(items: Vec<C>) -> Vec<C> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.name().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors() -> Selectors {
        let config = ScraperConfig {
            stylist_item_selector: ".stylist".into(),
            stylist_name_selector: ".name".into(),
            stylist_description_selector: ".desc".into(),
            coupon_item_selector: ".coupon".into(),
            coupon_name_selector: ".title".into(),
            coupon_text_selector: ".body".into(),
            ..Default::default()
        };
        Selectors::from_config(&config).unwrap()
    }

    #[test]
    fn test_parse_stylists() {
        let html = r#"
            <ul>
              <li class="stylist"><p class="name"> 佐藤
                 花子 </p><p class="desc">カットが得意</p></li>
              <li class="stylist"><p class="name">鈴木</p></li>
              <li class="stylist"><p class="desc">名前なし</p></li>
              <li class="stylist"><p class="name">佐藤 花子</p><p class="desc">重複</p></li>
            </ul>"#;

        let stylists = parse_stylists(html, &selectors());
        assert_eq!(stylists.len(), 2);
        assert_eq!(stylists[0].name, "佐藤 花子");
        assert_eq!(stylists[0].description, "カットが得意");
        assert_eq!(stylists[1].name, "鈴木");
        assert_eq!(stylists[1].description, "");
    }

    #[test]
    fn test_parse_coupons() {
        let html = r#"
            <div class="coupon"><h3 class="title">カット+カラー</h3><p class="body">¥8,000</p></div>
            <div class="coupon"><h3 class="title">縮毛矯正</h3><p class="body">¥12,000</p></div>"#;

        let coupons = parse_coupons(html, &selectors());
        assert_eq!(coupons.len(), 2);
        assert_eq!(coupons[1].name, "縮毛矯正");
        assert_eq!(coupons[1].text, "¥12,000");
    }

    #[test]
    fn test_parse_empty_page() {
        assert!(parse_coupons("<html><body></body></html>", &selectors()).is_empty());
    }

    #[test]
    fn test_coupon_page_urls() {
        let urls = coupon_page_urls("https://salon.example/", "coupon/PN{page}.html", 2, 3);
        assert_eq!(
            urls,
            vec![
                "https://salon.example/coupon/PN2.html",
                "https://salon.example/coupon/PN3.html",
                "https://salon.example/coupon/PN4.html",
            ]
        );

        let single = coupon_page_urls("https://salon.example", "coupon/", 2, 3);
        assert_eq!(single, vec!["https://salon.example/coupon/"]);
    }

    #[test]
    fn test_dedupe_by_name_keeps_first() {
        let coupons = vec![
            CouponCandidate { name: "A".into(), text: "1".into() },
            CouponCandidate { name: "B".into(), text: "2".into() },
            CouponCandidate { name: "A".into(), text: "3".into() },
        ];
        let deduped = dedupe_by_name(coupons);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].text, "1");
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let config = ScraperConfig {
            base_url: "https://salon.example".into(),
            stylist_item_selector: "[[[".into(),
            ..Default::default()
        };
        assert!(matches!(SalonScraper::new(&config), Err(HairstyleError::Config(_))));
    }

    #[test]
    fn test_missing_base_url() {
        assert!(matches!(
            SalonScraper::new(&ScraperConfig::default()),
            Err(HairstyleError::Config(_))
        ));
    }
}
