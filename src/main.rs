use anyhow::Context;
use clap::Parser;
use hairstyle_analyzer::{analyzer, cli, config, error, export, orchestrator, scanner, scraper};
use hairstyle_analyzer_common::TemplateCatalog;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use analyzer::{ContentCache, GeminiClient, VisionModel};
use cli::{Cli, Commands};
use config::Config;
use error::HairstyleError;
use orchestrator::BatchOrchestrator;
use scraper::{CandidateSource, Candidates, SalonScraper};

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        "hairstyle_analyzer=debug"
    } else {
        "hairstyle_analyzer=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("設定ファイルの読み込みに失敗しました")?;

    match cli.command {
        Commands::Run { folder, output, templates, limit, no_cache } => {
            run(&config, folder, output, templates, limit, no_cache).await?;
        }

        Commands::Scrape => {
            println!("💇 hairstyle-analyzer - 候補取得\n");
            let candidates = scrape(&config).await?;

            println!("スタイリスト ({}件):", candidates.stylists.len());
            for stylist in &candidates.stylists {
                println!("  - {} {}", stylist.name, stylist.description);
            }
            println!("\nクーポン ({}件):", candidates.coupons.len());
            for coupon in &candidates.coupons {
                println!("  - {} {}", coupon.name, coupon.text);
            }
        }

        Commands::Cache { info, clear, prune } => {
            let mut cache = ContentCache::open(&config.cache.path, config.cache.ttl_days, config.cache.max_size);

            if clear {
                cache.clear();
                cache.save()?;
                println!("✔ キャッシュを削除しました: {}", config.cache.path.display());
            }

            if prune {
                let removed = cache.prune();
                cache.save()?;
                println!("✔ {}件を削除しました", removed);
            }

            if info || !(clear || prune) {
                let summary = cache.info();
                println!("キャッシュ情報:");
                println!("  パス: {}", config.cache.path.display());
                println!("  件数: {} / {}", summary.entries, config.cache.max_size);
                println!("  有効期限: {}日", config.cache.ttl_days);
                if let (Some(oldest), Some(newest)) = (summary.oldest, summary.newest) {
                    println!("  期間: {} 〜 {}", oldest.to_rfc3339(), newest.to_rfc3339());
                }
                if let Some(warning) = cache.load_warning() {
                    println!("  ⚠ {}", warning);
                }
            }
        }

        Commands::Config { show, init } => {
            if let Some(path) = init {
                if path.exists() {
                    anyhow::bail!("既に存在します: {}", path.display());
                }
                Config::write_default(&path)?;
                println!("✔ 設定ファイルを作成しました: {}", path.display());
            }

            if show {
                println!("{}", config.redacted().to_yaml()?);
            } else if let Some(path) = Config::config_path() {
                println!("既定の設定ファイル: {}", path.display());
            }
        }
    }

    Ok(())
}

async fn scrape(config: &Config) -> anyhow::Result<Candidates> {
    if config.scraper.base_url.trim().is_empty() {
        tracing::warn!("scraper.base_url が未設定のため候補一覧は空になります");
        return Ok(Candidates::default());
    }
    let source = SalonScraper::new(&config.scraper)?;
    Ok(Candidates::fetch(&source as &dyn CandidateSource).await)
}

fn required_path(arg: Option<PathBuf>, configured: &Option<PathBuf>, key: &str) -> anyhow::Result<PathBuf> {
    arg.or_else(|| configured.clone())
        .ok_or_else(|| HairstyleError::Config(format!("{} を指定してください", key)).into())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

async fn run(
    config: &Config,
    folder: Option<PathBuf>,
    output: Option<PathBuf>,
    templates: Option<PathBuf>,
    limit: Option<usize>,
    no_cache: bool,
) -> anyhow::Result<()> {
    println!("💇 hairstyle-analyzer - 一括処理\n");

    let folder = required_path(folder, &config.paths.image_folder, "画像フォルダ（paths.image_folder）")?;
    let output = required_path(output, &config.paths.output_excel, "出力ファイル（paths.output_excel）")?;
    let output = export::output_path_for(&output, "スタイル一覧");

    let catalog = match templates.or_else(|| config.paths.template_csv.clone()) {
        Some(path) => load_templates(&path)?,
        None => TemplateCatalog::default(),
    };
    let categories = orchestrator::resolve_categories(config, &catalog)?;
    let api_key = config.get_api_key()?;

    // 1. Scan
    println!("[1/4] 画像をスキャン中...");
    let mut images = scanner::scan_folder(&folder)?;
    if images.is_empty() {
        return Err(HairstyleError::NoImagesFound(folder.display().to_string()).into());
    }
    if let Some(limit) = limit {
        images.truncate(limit);
    }
    println!("✔ {}枚の画像を検出\n", images.len());

    // 2. Scrape
    println!("[2/4] スタイリスト・クーポンを取得中...");
    let candidates = scrape(config).await?;
    println!(
        "✔ スタイリスト {}件 / クーポン {}件\n",
        candidates.stylists.len(),
        candidates.coupons.len()
    );

    // 3. Analyze
    println!("[3/4] AI解析中...{}", if no_cache { " (キャッシュ無効)" } else { "" });
    let cache = if no_cache {
        ContentCache::in_memory(config.cache.ttl_days, config.cache.max_size)
    } else {
        ContentCache::open(&config.cache.path, config.cache.ttl_days, config.cache.max_size)
    };
    let model: Arc<dyn VisionModel> = Arc::new(GeminiClient::new(api_key, config.gemini.timeout())?);

    let orchestrator = BatchOrchestrator::new(model, cache.shared(), config, catalog, categories)
        .with_progress(progress_bar());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n中断要求を受け付けました。処理中の画像を完了してから終了します...");
            ctrl_c.cancel();
        }
    });

    let report = orchestrator.run(images, candidates, cancel).await;
    println!(
        "✔ 解析完了: 成功 {}件 / 失敗 {}件 / 未処理 {}件\n",
        report.succeeded_count(),
        report.failed().count(),
        report.skipped.len()
    );

    for issue in &report.candidate_issues {
        println!("⚠ {}", issue);
    }

    // 4. Export
    println!("[4/4] Excelを出力中...");
    let backup = export::export_records(&report.records, &config.excel.headers_in_order(), &output)?;
    if let Some(backup) = backup {
        println!("- 既存ファイルをバックアップ: {}", backup.display());
    }
    println!("✔ Excel出力: {}", output.display());

    let failed: Vec<_> = report.failed().collect();
    if !failed.is_empty() {
        println!("\n⚠ 処理に失敗した画像 ({}件):", failed.len());
        for outcome in failed {
            let reason = outcome.error().map(|e| e.to_string()).unwrap_or_default();
            println!("  - {}: {}", outcome.path.display(), reason);
        }
    }

    println!("\n✅ 完了");
    Ok(())
}

fn load_templates(path: &Path) -> anyhow::Result<TemplateCatalog> {
    if !path.exists() {
        return Err(HairstyleError::FileNotFound(path.display().to_string()).into());
    }
    TemplateCatalog::from_csv(path)
        .with_context(|| format!("テンプレートCSVを読み込めません: {}", path.display()))
}
