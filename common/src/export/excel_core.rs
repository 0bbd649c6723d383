//! Excel生成（共通ライブラリ）
//!
//! OutputRecordをA〜I列の固定レイアウトで1シートに書き出す。

use crate::types::OutputRecord;
use rust_xlsxwriter::*;

/// シート名
pub const SHEET_NAME: &str = "スタイルタイトル";

const MIN_COLUMN_WIDTH: f64 = 10.0;
const MAX_COLUMN_WIDTH: f64 = 50.0;

/// 列幅: (最大文字数 + 2) * 1.1 を [10, 50] に丸める
pub fn column_width(max_chars: usize) -> f64 {
    ((max_chars as f64 + 2.0) * 1.1).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
}

/// Excelをバッファに生成
///
/// # Arguments
/// * `records` - 出力行（呼び出し側で並べ替え済み）
/// * `headers` - A〜I列のヘッダー文字列
pub fn generate_excel_buffer(records: &[OutputRecord], headers: &[&str; 9]) -> Result<Vec<u8>, String> {
    let mut workbook = Workbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_font_size(12.0)
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(0x4472C4))
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap()
        .set_border(FormatBorder::Thin);

    let data_format = Format::new()
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap()
        .set_border(FormatBorder::Thin);

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)
        .map_err(|e| format!("シート名設定エラー: {}", e))?;

    // ヘッダー行
    let mut max_chars: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)
            .map_err(|e| format!("ヘッダー書き込みエラー: {}", e))?;
    }

    // データ行（2行目から）
    for (i, record) in records.iter().enumerate() {
        let row = i as u32 + 1;
        for (col, value) in record.to_row().iter().enumerate() {
            worksheet.write_string_with_format(row, col as u16, *value, &data_format)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
            max_chars[col] = max_chars[col].max(value.chars().count());
        }
    }

    for (col, chars) in max_chars.iter().enumerate() {
        worksheet.set_column_width(col as u16, column_width(*chars))
            .map_err(|e| format!("列幅設定エラー: {}", e))?;
    }

    // バッファに書き出し
    workbook.save_to_buffer()
        .map_err(|e| format!("Excel保存エラー: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: [&str; 9] = ["A", "B", "C", "D", "E", "F", "G", "H", "I"];

    #[test]
    fn test_column_width_clamped() {
        assert_eq!(column_width(0), MIN_COLUMN_WIDTH);
        assert!((column_width(18) - 22.0).abs() < 1e-9);
        assert_eq!(column_width(500), MAX_COLUMN_WIDTH);
    }

    #[test]
    fn test_generate_excel_buffer() {
        let records = vec![OutputRecord {
            stylist_name: "佐藤".into(),
            image_filename: "a.jpg".into(),
            ..Default::default()
        }];
        let buffer = generate_excel_buffer(&records, &HEADERS).unwrap();
        // xlsxはZIP形式
        assert!(buffer.starts_with(b"PK"));
    }

    #[test]
    fn test_generate_excel_buffer_empty() {
        let buffer = generate_excel_buffer(&[], &HEADERS).unwrap();
        assert!(!buffer.is_empty());
    }
}
