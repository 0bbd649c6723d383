//! Hairstyle Analyzer
//!
//! ヘアスタイル写真をVision AIで分類し、サロンサイトから取得したスタイリスト・クーポンと照合して
//! Excelに出力する。

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod matcher;
pub mod orchestrator;
pub mod scanner;
pub mod scraper;

pub use config::Config;
pub use error::{HairstyleError, Result, Stage, StageError};
pub use orchestrator::{BatchOrchestrator, BatchReport, CandidateIssue, ImageOutcome, ImageStatus};
