//! バッチ処理
//!
//! 1つのFIFOキューから `batch_size` 個のワーカーが画像を取り出し、
//! 画像ごとに 分類 → 属性 → スタイリスト照合 → クーポン照合 → レコード組み立て を順に行う。
//!
//! - API呼び出し間隔はワーカーごとのペーサーで制御
//! - 画像をメモリに載せる前にメモリ枠（セマフォ）を取得
//! - 1画像の失敗はバッチを止めず、レポートに残す
//! - キャンセル時は処理中の画像だけ完了させ、未着手の画像はスキップ扱い
//!   （メモリ枠を待っている画像も未着手）

use indicatif::ProgressBar;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use hairstyle_analyzer_common::{
    assemble_record, sort_records, AttributeResult, ClassificationResult, MatchResult,
    OutputRecord, RecordParts, TemplateCatalog,
};

use crate::analyzer::{
    AttributeResolver, LoadedImage, ModelInvoker, Pacer, SharedCache, VisionModel,
};
use crate::config::{Config, ProcessingConfig};
use crate::error::{HairstyleError, Result, StageError};
use crate::matcher::MatchSelector;
use crate::scanner::ImageTask;
use crate::scraper::Candidates;

/// 分類に渡すカテゴリ（設定が空ならテンプレートから）
pub fn resolve_categories(config: &Config, templates: &TemplateCatalog) -> Result<Vec<String>> {
    let categories = if config.categories.is_empty() {
        templates.categories()
    } else {
        config.categories.clone()
    };

    if categories.is_empty() {
        return Err(HairstyleError::Config(
            "分類カテゴリがありません。categories かテンプレートCSVを設定してください".into(),
        ));
    }
    Ok(categories)
}

/// 候補一覧の問題（致命的ではない）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateIssue {
    NoStylists,
    NoCoupons,
}

impl fmt::Display for CandidateIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateIssue::NoStylists => write!(f, "スタイリスト一覧が空です（全画像 none found）"),
            CandidateIssue::NoCoupons => write!(f, "クーポン一覧が空です（全画像 none found）"),
        }
    }
}

/// 1画像の最終状態
#[derive(Debug, Clone)]
pub enum ImageStatus {
    Succeeded,
    Failed(StageError),
}

/// 1画像の処理結果
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub path: PathBuf,
    pub file_name: String,
    pub status: ImageStatus,
    /// 画像単位の試行回数
    pub attempts: u32,
    pub started: Instant,
    pub finished: Instant,
    pub record: OutputRecord,
}

impl ImageOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, ImageStatus::Failed(_))
    }

    pub fn error(&self) -> Option<&StageError> {
        match &self.status {
            ImageStatus::Failed(e) => Some(e),
            ImageStatus::Succeeded => None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.finished.duration_since(self.started)
    }
}

/// バッチ全体の結果
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// ファイル名順のレコード（失敗画像を含む、スキップ画像は含まない）
    pub records: Vec<OutputRecord>,
    /// ファイル名順
    pub outcomes: Vec<ImageOutcome>,
    /// キャンセルで着手しなかった画像
    pub skipped: Vec<PathBuf>,
    pub candidate_issues: Vec<CandidateIssue>,
}

impl BatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &ImageOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    pub fn failed_paths(&self) -> Vec<&PathBuf> {
        self.failed().map(|o| &o.path).collect()
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.len() - self.failed().count()
    }

    /// 同時に処理中だった画像数の最大値（開始/終了時刻から算出）
    pub fn peak_concurrency(&self) -> usize {
        let mut events: Vec<(Instant, i32)> = Vec::with_capacity(self.outcomes.len() * 2);
        for outcome in &self.outcomes {
            events.push((outcome.started, 1));
            events.push((outcome.finished, -1));
        }
        // 同時刻は終了を先に数える
        events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut current = 0i32;
        let mut peak = 0i32;
        for (_, delta) in events {
            current += delta;
            peak = peak.max(current);
        }
        peak as usize
    }
}

/// 1画像分の途中結果（画像単位の再試行をまたいで保持）
#[derive(Debug, Default)]
struct Partial {
    classification: Option<ClassificationResult>,
    attribute: Option<AttributeResult>,
    stylist: Option<MatchResult>,
    coupon: Option<MatchResult>,
}

/// ワーカーが書き込む集計（ワーカーが異常終了しても残る）
#[derive(Default)]
struct Ledger {
    outcomes: Vec<ImageOutcome>,
    skipped: Vec<PathBuf>,
    /// ワーカーID → 処理中の画像
    active: HashMap<usize, ImageTask>,
}

struct Pipeline {
    invoker: ModelInvoker,
    attributes: AttributeResolver,
    matcher: MatchSelector,
    cache: SharedCache,
    templates: TemplateCatalog,
    categories: Vec<String>,
    prompt_template: String,
    processing: ProcessingConfig,
    memory: Semaphore,
    progress: Option<ProgressBar>,
}

pub struct BatchOrchestrator {
    pipeline: Arc<Pipeline>,
}

impl BatchOrchestrator {
    pub fn new(
        model: Arc<dyn VisionModel>,
        cache: SharedCache,
        config: &Config,
        templates: TemplateCatalog,
        categories: Vec<String>,
    ) -> Self {
        let pipeline = Pipeline {
            invoker: ModelInvoker::new(model.clone(), cache.clone(), &config.gemini),
            attributes: AttributeResolver::new(model.clone(), cache.clone(), &config.gemini),
            matcher: MatchSelector::new(model, &config.gemini, &config.matching),
            cache,
            templates,
            categories,
            prompt_template: config.gemini.prompt_template.clone(),
            processing: config.processing.clone(),
            memory: Semaphore::new(config.processing.memory_slots()),
            progress: None,
        };
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// 進捗バーを付ける（runより前に呼ぶ）
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        if let Some(pipeline) = Arc::get_mut(&mut self.pipeline) {
            pipeline.progress = Some(progress);
        }
        self
    }

    /// 画像一覧を処理する
    pub async fn run(
        &self,
        tasks: Vec<ImageTask>,
        candidates: Candidates,
        cancel: CancellationToken,
    ) -> BatchReport {
        let total = tasks.len();
        let workers = self.pipeline.processing.batch_size.max(1).min(total.max(1));
        info!(images = total, workers, "バッチ処理開始");

        let mut candidate_issues = Vec::new();
        if candidates.stylists.is_empty() {
            warn!("{}", CandidateIssue::NoStylists);
            candidate_issues.push(CandidateIssue::NoStylists);
        }
        if candidates.coupons.is_empty() {
            warn!("{}", CandidateIssue::NoCoupons);
            candidate_issues.push(CandidateIssue::NoCoupons);
        }

        if let Some(progress) = &self.pipeline.progress {
            progress.set_length(total as u64);
        }

        let queue = Arc::new(Mutex::new(tasks.into_iter().collect::<VecDeque<_>>()));
        let candidates = Arc::new(candidates);
        let ledger = Arc::new(Mutex::new(Ledger::default()));

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let pipeline = self.pipeline.clone();
            let queue = queue.clone();
            let candidates = candidates.clone();
            let ledger = ledger.clone();
            let cancel = cancel.clone();
            set.spawn(async move { pipeline.worker(worker_id, queue, candidates, ledger, cancel).await });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "ワーカーが異常終了しました");
            }
        }

        let Ledger {
            mut outcomes,
            mut skipped,
            active,
        } = std::mem::take(&mut *ledger.lock());

        // 異常終了したワーカーが処理中だった画像も失敗として残す
        for (worker_id, task) in active {
            error!(worker_id, file = task.file_name.as_str(), "処理中にワーカーが終了しました");
            outcomes.push(self.pipeline.aborted(&task));
        }

        skipped.extend(queue.lock().drain(..).map(|t| t.path));
        skipped.sort();
        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), "未処理の画像があります");
        }

        // キャッシュは失敗しても結果には影響しない
        if let Err(e) = self.pipeline.cache.lock().save() {
            warn!(error = %e, "キャッシュを保存できません");
        }

        outcomes.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        let mut records: Vec<OutputRecord> = outcomes.iter().map(|o| o.record.clone()).collect();
        sort_records(&mut records);

        if let Some(progress) = &self.pipeline.progress {
            progress.finish_and_clear();
        }

        let report = BatchReport {
            records,
            outcomes,
            skipped,
            candidate_issues,
        };
        info!(
            succeeded = report.succeeded_count(),
            failed = report.failed().count(),
            skipped = report.skipped.len(),
            "バッチ処理完了"
        );
        report
    }
}

impl Pipeline {
    async fn worker(
        &self,
        worker_id: usize,
        queue: Arc<Mutex<VecDeque<ImageTask>>>,
        candidates: Arc<Candidates>,
        ledger: Arc<Mutex<Ledger>>,
        cancel: CancellationToken,
    ) {
        let mut pacer = Pacer::new(self.processing.api_delay());

        loop {
            if cancel.is_cancelled() {
                debug!(worker_id, "キャンセルのため停止");
                break;
            }
            let task = match queue.lock().pop_front() {
                Some(task) => task,
                None => break,
            };

            // メモリ枠を得た時点で着手とみなす
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = self.memory.acquire() => permit.ok(),
            };
            let permit = match permit {
                Some(permit) if !cancel.is_cancelled() => permit,
                _ => {
                    debug!(worker_id, file = task.file_name.as_str(), "キャンセルのため未着手");
                    ledger.lock().skipped.push(task.path);
                    break;
                }
            };

            debug!(worker_id, file = task.file_name.as_str(), "画像処理開始");
            ledger.lock().active.insert(worker_id, task.clone());
            let outcome = self.process(&task, &candidates, &mut pacer, &cancel).await;
            drop(permit);

            if let Some(progress) = &self.progress {
                progress.set_message(task.file_name.clone());
                progress.inc(1);
            }

            let mut ledger = ledger.lock();
            ledger.active.remove(&worker_id);
            ledger.outcomes.push(outcome);
        }
    }

    /// 1画像を処理（画像単位で再試行）
    async fn process(
        &self,
        task: &ImageTask,
        candidates: &Candidates,
        pacer: &mut Pacer,
        cancel: &CancellationToken,
    ) -> ImageOutcome {
        let started = Instant::now();
        let max_attempts = self.processing.max_retries.max(1);
        let mut partial = Partial::default();
        let mut last_error = None;
        let mut attempts = 0;
        let mut image: Option<LoadedImage> = None;

        while attempts < max_attempts {
            if attempts > 0 {
                if cancel.is_cancelled() {
                    break;
                }
                tokio::time::sleep(self.processing.retry_delay()).await;
            }
            attempts += 1;

            match self.run_stages(task, &mut image, candidates, pacer, &mut partial).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    warn!(file = task.file_name.as_str(), attempt = attempts, error = %e, "画像処理失敗");
                    last_error = Some(e);
                }
            }
        }

        let record = self.assemble(&task.file_name, &partial);

        let status = match last_error {
            None => ImageStatus::Succeeded,
            Some(e) => {
                error!(
                    file = task.file_name.as_str(),
                    attempts,
                    stage = e.stage().map(|s| s.as_str()),
                    error = %e,
                    "画像処理を断念"
                );
                ImageStatus::Failed(e)
            }
        };

        ImageOutcome {
            path: task.path.clone(),
            file_name: task.file_name.clone(),
            status,
            attempts,
            started,
            finished: Instant::now(),
            record,
        }
    }

    /// 未完了の段階だけを順に実行
    async fn run_stages(
        &self,
        task: &ImageTask,
        image: &mut Option<LoadedImage>,
        candidates: &Candidates,
        pacer: &mut Pacer,
        partial: &mut Partial,
    ) -> std::result::Result<(), StageError> {
        if partial.classification.is_none() || partial.attribute.is_none() {
            if image.is_none() {
                *image = Some(LoadedImage::load(task).await?);
            }
            let loaded = match image.as_ref() {
                Some(loaded) => loaded,
                None => return Err(StageError::ImageLoad(task.path.display().to_string())),
            };

            // 属性は分類に依存しないので、分類が失敗しても取得する
            let classified = if partial.classification.is_some() {
                Ok(())
            } else {
                self.invoker
                    .classify(loaded, &self.prompt_template, &self.categories, pacer)
                    .await
                    .map(|c| partial.classification = Some(c))
            };
            let resolved = if partial.attribute.is_some() {
                Ok(())
            } else {
                self.attributes
                    .resolve(loaded, pacer)
                    .await
                    .map(|a| partial.attribute = Some(a))
            };

            // 未分類の画像は照合しない
            classified?;
            resolved?;
        }

        // 画像データは照合には不要
        *image = None;

        let classification = match partial.classification.as_ref() {
            Some(c) => c,
            None => return Err(StageError::ImageLoad(task.path.display().to_string())),
        };

        if partial.stylist.is_none() {
            let stylist = self
                .matcher
                .select_stylist(&candidates.stylists, classification, pacer)
                .await?;
            partial.stylist = Some(stylist);
        }

        if partial.coupon.is_none() {
            let coupon = self
                .matcher
                .select_coupon(&candidates.coupons, classification, pacer)
                .await?;
            partial.coupon = Some(coupon);
        }

        Ok(())
    }

    /// ワーカーの異常終了で処理が途切れた画像
    fn aborted(&self, task: &ImageTask) -> ImageOutcome {
        let now = Instant::now();
        ImageOutcome {
            path: task.path.clone(),
            file_name: task.file_name.clone(),
            status: ImageStatus::Failed(StageError::Aborted(task.file_name.clone())),
            attempts: 0,
            started: now,
            finished: now,
            record: self.assemble(&task.file_name, &Partial::default()),
        }
    }

    fn assemble(&self, file_name: &str, partial: &Partial) -> OutputRecord {
        // 分類できなかった画像は番兵値で出力する
        let sentinel = ClassificationResult::unclassified();
        let classification = partial.classification.as_ref().unwrap_or(&sentinel);
        let template = if classification.is_unclassified() {
            None
        } else {
            self.templates.best_for(classification)
        };

        assemble_record(&RecordParts {
            image_filename: file_name,
            classification: Some(classification),
            attribute: partial.attribute.as_ref(),
            stylist: partial.stylist.as_ref(),
            coupon: partial.coupon.as_ref(),
            template,
        })
    }
}
