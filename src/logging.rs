//! # Logging モジュール
//!
//! AUV群シミュレーションのログ管理機能を提供します。
//!
//! tracing-appenderによる非同期ファイル出力とコンソール出力を組み合わせ、
//! ティック処理の速度に影響を与えずにログを記録します。ファイル側はJSON形式で、
//! 構造化フィールド（auv_id, mission_id など）をそのまま後処理に使えます。
//!
//! ## 設定可能な出力先
//!
//! - `Console`: コンソールのみ
//! - `File`: ファイルのみ（logs/auvsim.YYYY-MM-DD）
//! - `Both`: コンソールとファイルの両方

use std::str::FromStr;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Registry,
};

/// ログ出力先の設定
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogOutput {
    /// コンソールのみ
    Console,
    /// ファイルのみ
    File,
    /// コンソールとファイルの両方
    Both,
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(format!("無効な出力先: {}. 利用可能: console, file, both", s)),
        }
    }
}

/// ログ設定構造体
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub output: LogOutput,
    /// ログファイルのディレクトリ（FileまたはBothの場合）
    pub log_dir: String,
    /// ログファイル名のプレフィックス
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            log_dir: "logs".to_string(),
            file_prefix: "auvsim".to_string(),
        }
    }
}

/// ログシステムを初期化
///
/// 環境変数`RUST_LOG`が設定されていればそちらを優先します。
///
/// # 戻り値
///
/// ファイル出力を行う場合は非同期書き込みのガード。呼び出し側はプロセス終了まで
/// 保持する必要があります（破棄すると未書き込みのログが失われます）
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.output {
        LogOutput::Console => {
            Registry::default()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact()
                )
                .try_init()?;
            Ok(None)
        }
        LogOutput::File => {
            ensure_log_directory(&config.log_dir)?;
            let file_appender = rolling::daily(&config.log_dir, &config.file_prefix);
            let (non_blocking_appender, guard) = non_blocking(file_appender);

            Registry::default()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(non_blocking_appender)
                        .with_target(true)
                        .json()
                )
                .try_init()?;
            Ok(Some(guard))
        }
        LogOutput::Both => {
            ensure_log_directory(&config.log_dir)?;
            let file_appender = rolling::daily(&config.log_dir, &config.file_prefix);
            let (non_blocking_appender, guard) = non_blocking(file_appender);

            Registry::default()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact()
                )
                .with(
                    fmt::layer()
                        .with_writer(non_blocking_appender)
                        .with_target(true)
                        .json()
                )
                .try_init()?;
            Ok(Some(guard))
        }
    }
}

/// ログレベルを文字列から解析（無効な場合はINFO）
pub fn parse_log_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!("警告: 無効なログレベル '{}'. INFOを使用します", level_str);
            Level::INFO
        }
    }
}

/// `-v`の回数からログレベルを決める（明示指定がない場合に使用）
pub fn level_from_verbosity(verbose_level: u8) -> Level {
    match verbose_level {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// ログディレクトリを作成
pub fn ensure_log_directory(log_dir: &str) -> Result<(), std::io::Error> {
    std::fs::create_dir_all(log_dir)?;
    Ok(())
}
