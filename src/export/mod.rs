pub mod excel;

use crate::error::Result;
use hairstyle_analyzer_common::OutputRecord;
use std::path::{Path, PathBuf};

/// 出力先がフォルダ（または拡張子なし）ならその中に既定名で作る
pub fn output_path_for(output: &Path, default_name: &str) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{}.xlsx", default_name))
    } else {
        output.to_path_buf()
    }
}

/// レコードをExcelに出力（バックアップを作った場合はそのパスを返す）
pub fn export_records(records: &[OutputRecord], headers: &[&str; 9], output: &Path) -> Result<Option<PathBuf>> {
    excel::generate_excel(records, headers, output)
}
