use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hairstyle-analyzer")]
#[command(about = "ヘアスタイル画像AI解析・スタイリスト/クーポン照合・Excel出力ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 設定ファイル（YAML）
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像フォルダを解析してExcelを出力
    Run {
        /// 画像フォルダのパス（省略時は設定の paths.image_folder）
        folder: Option<PathBuf>,

        /// 出力Excelファイル（省略時は設定の paths.output_excel）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// スタイルテンプレートCSV（省略時は設定の paths.template_csv）
        #[arg(short, long)]
        templates: Option<PathBuf>,

        /// 先頭N枚だけ処理
        #[arg(short, long)]
        limit: Option<usize>,

        /// キャッシュを読み書きしない
        #[arg(long)]
        no_cache: bool,
    },

    /// スタイリスト・クーポン一覧を取得して表示
    Scrape,

    /// キャッシュの確認・削除
    Cache {
        /// 件数と期間を表示
        #[arg(long)]
        info: bool,

        /// 全件削除
        #[arg(long)]
        clear: bool,

        /// 期限切れ・上限超過分を削除
        #[arg(long)]
        prune: bool,
    },

    /// 設定の表示・初期化
    Config {
        /// 現在の設定を表示
        #[arg(long)]
        show: bool,

        /// 既定値の設定ファイルを書き出す
        #[arg(long)]
        init: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "hairstyle-analyzer",
            "-v",
            "run",
            "photos",
            "-o",
            "out.xlsx",
            "--limit",
            "3",
            "--no-cache",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Run { folder, output, limit, no_cache, templates } => {
                assert_eq!(folder, Some(PathBuf::from("photos")));
                assert_eq!(output, Some(PathBuf::from("out.xlsx")));
                assert_eq!(limit, Some(3));
                assert!(no_cache);
                assert!(templates.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["hairstyle-analyzer", "cache", "--info", "-c", "my.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("my.yaml")));
        assert!(matches!(cli.command, Commands::Cache { info: true, clear: false, prune: false }));
    }
}
