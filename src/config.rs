use crate::error::{HairstyleError, Result};
use hairstyle_analyzer_common::{prompts, OutputRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 秒数（小数可）をDurationに変換（負数は0）
fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

/// アプリケーション設定（起動時に一度だけ読み込み、以後は不変）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub matching: MatchingConfig,
    pub cache: CacheConfig,
    pub processing: ProcessingConfig,
    pub scraper: ScraperConfig,
    pub excel: ExcelConfig,
    pub paths: PathsConfig,
    /// 分類カテゴリ（空ならテンプレートCSVから取得）
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub fallback_model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_retries: u32,
    /// 秒
    pub retry_delay: f64,
    /// 秒
    pub timeout: f64,
    pub max_keywords: usize,
    pub prompt_template: String,
    pub attribute_prompt_template: String,
    pub stylist_prompt_template: String,
    pub coupon_prompt_template: String,
    pub length_choices: Vec<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".into(),
            fallback_model: Some("gemini-1.5-flash".into()),
            max_tokens: 1024,
            temperature: 0.2,
            max_retries: 3,
            retry_delay: 1.0,
            timeout: 60.0,
            max_keywords: 3,
            prompt_template: prompts::DEFAULT_CLASSIFICATION_PROMPT.into(),
            attribute_prompt_template: prompts::DEFAULT_ATTRIBUTE_PROMPT.into(),
            stylist_prompt_template: prompts::DEFAULT_STYLIST_PROMPT.into(),
            coupon_prompt_template: prompts::DEFAULT_COUPON_PROMPT.into(),
            length_choices: [
                "ベリーショート",
                "ショート",
                "ミディアム",
                "セミロング",
                "ロング",
                "ヘアセット",
                "ミセス",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl GeminiConfig {
    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay)
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MatchingConfig {
    /// スタイリスト/クーポン選択でもフォールバックモデルを使う
    pub use_fallback_model: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub path: PathBuf,
    pub ttl_days: u32,
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cache/analysis_cache.json"),
            ttl_days: 30,
            max_size: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub batch_size: usize,
    /// 秒（同一ワーカーのAI呼び出し間隔）
    pub api_delay: f64,
    /// 画像単位の再処理回数
    pub max_retries: u32,
    /// 秒
    pub retry_delay: f64,
    pub memory_per_image_mb: u64,
    pub max_memory_mb: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            api_delay: 1.0,
            max_retries: 2,
            retry_delay: 3.0,
            memory_per_image_mb: 5,
            max_memory_mb: 1024,
        }
    }
}

impl ProcessingConfig {
    pub fn api_delay(&self) -> Duration {
        secs(self.api_delay)
    }

    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay)
    }

    /// 同時にメモリへ載せてよい画像数（最低1）
    pub fn memory_slots(&self) -> usize {
        if self.memory_per_image_mb == 0 {
            return self.batch_size.max(1);
        }
        ((self.max_memory_mb / self.memory_per_image_mb) as usize).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: String,
    pub stylist_path: String,
    pub stylist_item_selector: String,
    pub stylist_name_selector: String,
    pub stylist_description_selector: String,
    /// `{page}` がページ番号に置換される
    pub coupon_path: String,
    pub coupon_item_selector: String,
    pub coupon_name_selector: String,
    pub coupon_text_selector: String,
    pub coupon_page_start_number: u32,
    pub coupon_page_limit: u32,
    pub max_retries: u32,
    /// 秒
    pub retry_delay: f64,
    /// 秒
    pub timeout: f64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            stylist_path: "stylist/".into(),
            stylist_item_selector: ".stylistList li".into(),
            stylist_name_selector: ".stylistName".into(),
            stylist_description_selector: ".stylistDescription".into(),
            coupon_path: "coupon/PN{page}.html".into(),
            coupon_item_selector: ".couponList li".into(),
            coupon_name_selector: ".couponName".into(),
            coupon_text_selector: ".couponText".into(),
            coupon_page_start_number: 2,
            coupon_page_limit: 3,
            max_retries: 3,
            retry_delay: 1.0,
            timeout: 10.0,
        }
    }
}

impl ScraperConfig {
    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay)
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcelConfig {
    /// 列記号（A〜I）→ ヘッダー文字列
    pub headers: BTreeMap<String, String>,
}

impl Default for ExcelConfig {
    fn default() -> Self {
        let labels = [
            "スタイリスト名",
            "クーポン名",
            "コメント",
            "スタイルタイトル",
            "性別",
            "長さ",
            "スタイルメニュー",
            "ハッシュタグ",
            "画像ファイル名",
        ];
        let headers = OutputRecord::COLUMNS
            .iter()
            .zip(labels.iter())
            .map(|(col, label)| (col.to_string(), label.to_string()))
            .collect();
        Self { headers }
    }
}

impl ExcelConfig {
    /// A〜I列の順にヘッダーを並べる（未設定の列は列記号）
    pub fn headers_in_order(&self) -> [&str; 9] {
        OutputRecord::COLUMNS.map(|col| self.headers.get(col).map(String::as_str).unwrap_or(col))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathsConfig {
    pub image_folder: Option<PathBuf>,
    pub template_csv: Option<PathBuf>,
    pub output_excel: Option<PathBuf>,
}

impl Config {
    /// 設定を読み込む
    ///
    /// `path` 指定時はそのファイル（存在しなければエラー）、
    /// 未指定時は既定パスにあれば読み込み、なければ既定値。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(HairstyleError::FileNotFound(p.display().to_string()));
                }
                Self::from_yaml(&std::fs::read_to_string(p)?)?
            }
            None => match Self::config_path() {
                Some(p) if p.exists() => Self::from_yaml(&std::fs::read_to_string(&p)?)?,
                _ => Self::default(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// 既定の設定ファイルパス
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hairstyle-analyzer").join("config.yaml"))
    }

    /// 既定値の設定ファイルを書き出す
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, Self::default().to_yaml()?)?;
        Ok(())
    }

    /// 値の妥当性チェック（不正なら実行全体を止める）
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(HairstyleError::Config(msg.to_string()));

        if self.processing.batch_size == 0 {
            return fail("processing.batch_size は1以上にしてください");
        }
        if self.processing.max_retries == 0 {
            return fail("processing.max_retries は1以上にしてください");
        }
        if self.processing.memory_per_image_mb == 0 {
            return fail("processing.memory_per_image_mb は1以上にしてください");
        }
        if self.processing.max_memory_mb < self.processing.memory_per_image_mb {
            return fail("processing.max_memory_mb は memory_per_image_mb 以上にしてください");
        }
        if self.cache.max_size == 0 {
            return fail("cache.max_size は1以上にしてください");
        }
        if self.gemini.max_retries == 0 {
            return fail("gemini.max_retries は1以上にしてください");
        }
        if self.gemini.model.trim().is_empty() {
            return fail("gemini.model が空です");
        }
        if self.gemini.length_choices.is_empty() {
            return fail("gemini.length_choices が空です");
        }
        if let Some(missing) = OutputRecord::COLUMNS
            .iter()
            .find(|col| !self.excel.headers.contains_key(**col))
        {
            return Err(HairstyleError::Config(format!(
                "excel.headers に {} 列がありません",
                missing
            )));
        }

        Ok(())
    }

    /// APIキーを取得（環境変数を優先）
    pub fn get_api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }

        self.gemini
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(HairstyleError::MissingApiKey)
    }

    /// 表示用（APIキーを伏せる）
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.gemini.api_key.is_some() {
            config.gemini.api_key = Some("********".into());
        }
        config
    }
}
