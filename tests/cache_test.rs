//! キャッシュ機能テスト
//!
//! キャッシュファイルの保存・読み込み・有効期限・追い出しを検証

use chrono::{Duration, Utc};
use hairstyle_analyzer::analyzer::cache::{cache_key, CacheEntry, CacheKind, ContentCache};
use hairstyle_analyzer_common::{AttributeResult, ClassificationResult, Sex};
use serde_json::json;
use tempfile::tempdir;

/// ファイルがなければ空のキャッシュ
#[test]
fn test_cache_file_missing() {
    let dir = tempdir().expect("Failed to create temp dir");
    let cache = ContentCache::open(dir.path().join("cache.json"), 30, 100);

    assert!(cache.is_empty());
    assert!(cache.load_warning().is_none());
}

/// キャッシュの保存と読み込み
#[test]
fn test_cache_save_and_load() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cache.json");

    let mut cache = ContentCache::open(&path, 30, 100);
    let result = ClassificationResult {
        category: "ボブ".to_string(),
        keywords: vec!["透明感".to_string()],
        ..Default::default()
    };
    cache
        .put_as(cache_key("abc123", CacheKind::Classification), &result)
        .expect("キャッシュ追加失敗");
    cache
        .put_as(
            cache_key("abc123", CacheKind::Attribute),
            &AttributeResult { sex: Sex::Ladies, length: "ボブ".into() },
        )
        .expect("キャッシュ追加失敗");
    cache.save().expect("キャッシュ保存失敗");

    // 再読み込み
    let mut loaded = ContentCache::open(&path, 30, 100);
    assert_eq!(loaded.len(), 2);

    let cached: ClassificationResult = loaded
        .get_as("abc123_classification")
        .expect("キャッシュが見つからない");
    assert_eq!(cached, result);

    let attribute: AttributeResult = loaded.get_as("abc123_attribute").expect("キャッシュが見つからない");
    assert_eq!(attribute.sex, Sex::Ladies);
}

/// ファイル形式: { key: { value, created_at } }
#[test]
fn test_cache_file_format() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cache.json");

    let mut cache = ContentCache::open(&path, 30, 100);
    cache.put("k_classification", json!({"category": "ショート"}));
    cache.save().unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let raw: serde_json::Value = serde_json::from_str(&content).unwrap();
    let entry = &raw["k_classification"];

    assert_eq!(entry["value"]["category"], "ショート");
    let created_at = entry["created_at"].as_str().expect("created_at がない");
    assert!(chrono::DateTime::parse_from_rfc3339(created_at).is_ok());

    // 一時ファイルは残らない
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

/// 外部で書かれたキャッシュファイルも読める
#[test]
fn test_cache_reads_handwritten_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cache.json");
    let created = Utc::now() - Duration::days(1);
    std::fs::write(
        &path,
        format!(
            r#"{{"h_attribute": {{"value": {{"sex": "mens", "length": "ショート"}}, "created_at": "{}"}}}}"#,
            created.to_rfc3339()
        ),
    )
    .unwrap();

    let mut cache = ContentCache::open(&path, 30, 100);
    let attribute: AttributeResult = cache.get_as("h_attribute").expect("読み込めない");
    assert_eq!(attribute.sex, Sex::Mens);
}

/// 壊れたファイルは警告を残して空で始める
#[test]
fn test_cache_corrupt_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "not json at all").unwrap();

    let mut cache = ContentCache::open(&path, 30, 100);
    assert!(cache.is_empty());
    assert!(cache.load_warning().is_some());

    // 保存すれば正常なファイルに戻る
    cache.put("k", json!(1));
    cache.save().unwrap();
    let reloaded = ContentCache::open(&path, 30, 100);
    assert!(reloaded.load_warning().is_none());
    assert_eq!(reloaded.len(), 1);
}

/// 有効期限切れは取得時に消える
#[test]
fn test_cache_ttl() {
    let mut cache = ContentCache::in_memory(7, 100);
    cache.insert_entry("fresh", CacheEntry::new(json!("a"), Utc::now() - Duration::days(6)));
    cache.insert_entry("stale", CacheEntry::new(json!("b"), Utc::now() - Duration::days(8)));

    assert_eq!(cache.get("fresh"), Some(json!("a")));
    assert_eq!(cache.get("stale"), None);
    assert_eq!(cache.len(), 1);
}

/// 上限を超えるときは作成日時の古い順に追い出す
#[test]
fn test_cache_bounded_size() {
    let mut cache = ContentCache::in_memory(30, 3);
    for i in 0..10 {
        cache.put(format!("key{}", i), json!(i));
        assert!(cache.len() <= 3);
    }

    assert!(cache.get("key6").is_none());
    assert_eq!(cache.get("key7"), Some(json!(7)));
    assert_eq!(cache.get("key9"), Some(json!(9)));
}

/// 読み込んだファイルが上限を超えていれば prune で縮める
#[test]
fn test_cache_prune_shrinks_oversized_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cache.json");

    let mut big = ContentCache::open(&path, 30, 10);
    for i in 0..5 {
        big.insert_entry(format!("k{}", i), CacheEntry::new(json!(i), Utc::now() - Duration::hours(10 - i)));
    }
    big.save().unwrap();

    let mut small = ContentCache::open(&path, 30, 2);
    assert_eq!(small.len(), 5);
    assert_eq!(small.prune(), 3);
    assert!(small.get("k3").is_some());
    assert!(small.get("k4").is_some());
}
