//! Error types for transport deviation analysis
//!
//! 実行を継続できない失敗はすべてここに集約し、バイナリ側で anyhow に包んで終了する。

use std::path::PathBuf;

/// 解析処理のエラー
#[derive(thiserror::Error, Debug)]
pub enum DistError {
    /// 2つのスナップショットが同じ粒子集合・同じ時刻を表していない
    #[error("inconsistent ensembles: {0}")]
    Consistency(String),

    /// 粒子数が事前に宣言した上限を超えた
    #[error("too many particles: {actual} exceeds limit {limit}")]
    Capacity { actual: usize, limit: usize },

    /// 粒子が1つもないスナップショット
    #[error("ensemble is empty")]
    EmptyEnsemble,

    /// 制御ファイルまたは `--set` の値が不正
    #[error("config error: {0}")]
    Config(String),

    /// スナップショットの行が読めない
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// ファイル名に埋め込まれた時刻を解釈できない
    #[error("invalid time tag: {0}")]
    TimeTag(String),

    /// File I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON Lines 出力時のシリアライズエラー
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for deviation analysis
pub type DistResult<T> = Result<T, DistError>;
