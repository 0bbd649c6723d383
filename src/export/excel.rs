//! Excel生成（CLI版）
//!
//! バッファ生成は共通ライブラリ、ここではファイルへの書き出しとバックアップを行う。

use crate::error::{HairstyleError, Result};
use chrono::{DateTime, Local};
use hairstyle_analyzer_common::export::excel_core::generate_excel_buffer;
use hairstyle_analyzer_common::OutputRecord;
use std::path::{Path, PathBuf};
use tracing::info;

/// 既存ファイルの退避先: `{stem}_{YYYYmmdd_HHMMSS}_backup.{ext}`
pub fn backup_path(output_path: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let ext = output_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_else(|| "xlsx".to_string());

    output_path.with_file_name(format!(
        "{}_{}_backup.{}",
        stem,
        now.format("%Y%m%d_%H%M%S"),
        ext
    ))
}

/// Excelファイルを書き出す
///
/// 出力先に既存ファイルがあれば先にバックアップし、そのパスを返す。
pub fn generate_excel(
    records: &[OutputRecord],
    headers: &[&str; 9],
    output_path: &Path,
) -> Result<Option<PathBuf>> {
    let buffer = generate_excel_buffer(records, headers).map_err(HairstyleError::ExcelGeneration)?;

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HairstyleError::ExcelGeneration(format!("出力フォルダ作成エラー: {}", e)))?;
        }
    }

    let backup = if output_path.exists() {
        let backup = backup_path(output_path, Local::now());
        std::fs::copy(output_path, &backup)
            .map_err(|e| HairstyleError::ExcelGeneration(format!("バックアップ作成エラー: {}", e)))?;
        info!(backup = %backup.display(), "既存ファイルをバックアップ");
        Some(backup)
    } else {
        None
    };

    std::fs::write(output_path, buffer)
        .map_err(|e| HairstyleError::ExcelGeneration(format!("ファイル書き込みエラー: {}", e)))?;

    info!(path = %output_path.display(), rows = records.len(), "Excel出力");
    Ok(backup)
}
