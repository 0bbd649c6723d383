//! 解析結果キャッシュモジュール
//!
//! 画像内容のSHA-256ハッシュと呼び出し種別をキーにしてAIの応答をキャッシュし、
//! 同じ画像の再解析をスキップする。
//!
//! - 有効期限（ttl_days）を過ぎたエントリはアクセス時に削除
//! - 件数上限（max_size）を超える前に作成日時の古い順に追い出す
//! - ファイルへの保存は一時ファイル + rename

use crate::error::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// ワーカー間で共有するキャッシュ
pub type SharedCache = Arc<Mutex<ContentCache>>;

/// キャッシュする呼び出しの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Classification,
    Attribute,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Classification => "classification",
            CacheKind::Attribute => "attribute",
        }
    }
}

/// キャッシュキー: `{内容ハッシュ}_{種類}`
pub fn cache_key(content_hash: &str, kind: CacheKind) -> String {
    format!("{}_{}", content_hash, kind.as_str())
}

/// キャッシュエントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// シリアライズ済みの結果
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// 作成日時が同じエントリの追い出し順
    #[serde(skip)]
    seq: u64,
}

impl CacheEntry {
    pub fn new(value: serde_json::Value, created_at: DateTime<Utc>) -> Self {
        Self { value, created_at, seq: 0 }
    }
}

/// `cache --info` 用の概要
#[derive(Debug, Clone)]
pub struct CacheInfo {
    pub entries: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// 内容ハッシュをキーにしたキャッシュ
#[derive(Debug)]
pub struct ContentCache {
    /// Noneならファイルに保存しない
    path: Option<PathBuf>,
    ttl: chrono::Duration,
    max_size: usize,
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
    load_warning: Option<String>,
}

impl ContentCache {
    /// キャッシュファイルを読み込む
    ///
    /// ファイルがない場合は空、壊れている場合は警告を残して空で始める。
    pub fn open(path: impl Into<PathBuf>, ttl_days: u32, max_size: usize) -> Self {
        let path = path.into();
        let mut cache = Self::in_memory(ttl_days, max_size);

        if path.exists() {
            match Self::read_file(&path) {
                Ok(entries) => cache.restore(entries),
                Err(e) => {
                    let message = format!(
                        "キャッシュファイルを読み込めません（空のキャッシュで続行）: {}: {}",
                        path.display(),
                        e
                    );
                    warn!("{}", message);
                    cache.load_warning = Some(message);
                }
            }
        }

        cache.path = Some(path);
        cache
    }

    /// ファイルを持たないキャッシュ（--no-cache やテスト用）
    pub fn in_memory(ttl_days: u32, max_size: usize) -> Self {
        Self {
            path: None,
            ttl: chrono::Duration::days(ttl_days as i64),
            max_size: max_size.max(1),
            entries: HashMap::new(),
            next_seq: 0,
            load_warning: None,
        }
    }

    pub fn shared(self) -> SharedCache {
        Arc::new(Mutex::new(self))
    }

    fn read_file(path: &Path) -> Result<BTreeMap<String, CacheEntry>> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 読み込んだエントリを作成日時順に番号付けして取り込む
    fn restore(&mut self, entries: BTreeMap<String, CacheEntry>) {
        let mut entries: Vec<(String, CacheEntry)> = entries.into_iter().collect();
        entries.sort_by_key(|(_, e)| e.created_at);
        for (key, mut entry) in entries {
            entry.seq = self.bump_seq();
            self.entries.insert(key, entry);
        }
        debug!(entries = self.entries.len(), "キャッシュ読み込み");
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at > self.ttl
    }

    /// 値を取得（期限切れは削除してミス扱い）
    pub fn get(&mut self, key: &str) -> Option<serde_json::Value> {
        let now = Utc::now();
        let expired = self.entries.get(key).map(|e| self.is_expired(e, now))?;
        if expired {
            debug!(key, "キャッシュ期限切れ");
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    /// 型付きで取得（形が合わないエントリはミス扱い）
    pub fn get_as<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "キャッシュの値を復元できません");
                self.entries.remove(key);
                None
            }
        }
    }

    /// 値を保存
    ///
    /// 新しいキーの場合、上限未満になるまで古いエントリを追い出してから入れる。
    pub fn put(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.insert_entry(key, CacheEntry::new(value, Utc::now()));
    }

    pub fn put_as<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        self.put(key, serde_json::to_value(value)?);
        Ok(())
    }

    /// 作成日時を指定してエントリを入れる
    pub fn insert_entry(&mut self, key: impl Into<String>, mut entry: CacheEntry) {
        let key = key.into();
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.max_size {
                if !self.evict_oldest() {
                    break;
                }
            }
        }
        entry.seq = self.bump_seq();
        self.entries.insert(key, entry);
    }

    fn evict_oldest(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.created_at, e.seq))
            .map(|(k, _)| k.clone());

        match oldest {
            Some(key) => {
                debug!(key = key.as_str(), "キャッシュ追い出し");
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    /// 期限切れと上限超過分を削除し、削除件数を返す
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        let now = Utc::now();
        let ttl = self.ttl;
        self.entries.retain(|_, e| now - e.created_at <= ttl);

        while self.entries.len() > self.max_size {
            if !self.evict_oldest() {
                break;
            }
        }

        before - self.entries.len()
    }

    /// ファイルに保存（一時ファイルに書いてからrename）
    pub fn save(&self) -> Result<()> {
        let path = match &self.path {
            Some(p) => p,
            None => return Ok(()),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let sorted: BTreeMap<&String, &CacheEntry> = self.entries.iter().collect();
        let json = serde_json::to_string_pretty(&sorted)?;

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;

        debug!(path = %path.display(), entries = self.entries.len(), "キャッシュ保存");
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 読み込み時に壊れたファイルを捨てた場合の警告
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }

    pub fn info(&self) -> CacheInfo {
        CacheInfo {
            entries: self.entries.len(),
            oldest: self.entries.values().map(|e| e.created_at).min(),
            newest: self.entries.values().map(|e| e.created_at).max(),
        }
    }
}
