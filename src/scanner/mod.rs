use crate::error::{HairstyleError, Result};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 処理対象の画像（スキャン時に作られ、以後変更しない）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTask {
    pub path: PathBuf,
    pub file_name: String,
    /// 内容ハッシュ（SHA-256, hex）
    pub hash: String,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// 画像ファイル内容のSHA-256を計算
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// フォルダ直下の画像を列挙し、ファイル名順に並べてハッシュを付ける
pub fn scan_folder(folder: &Path) -> Result<Vec<ImageTask>> {
    if !folder.is_dir() {
        return Err(HairstyleError::FolderNotFound(folder.display().to_string()));
    }

    let mut paths: Vec<(PathBuf, String)> = WalkDir::new(folder)
        .max_depth(1)  // 直下のみ（再帰しない）
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| is_image_extension(&ext.to_string_lossy()))
                .unwrap_or(false)
        })
        .map(|e| {
            let file_name = e.file_name().to_string_lossy().to_string();
            (e.into_path(), file_name)
        })
        .collect();

    // ファイル名でソート
    paths.sort_by(|a, b| a.1.cmp(&b.1));

    // ハッシュは並列計算（順序は保たれる）
    paths
        .into_par_iter()
        .map(|(path, file_name)| {
            let hash = compute_file_hash(&path)?;
            Ok(ImageTask { path, file_name, hash })
        })
        .collect()
}
