//! # Error モジュール
//!
//! シミュレーションエンジンへの外部コマンドが返すエラーを定義します。
//! いずれも呼び出し側で回復可能なエラーで、エンジン内部での再試行は行いません。

/// エンジン操作のエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    /// ミッションのポリゴン頂点数が3未満
    #[error("無効なポリゴン: 頂点は3点以上必要です（指定: {points}点）")]
    InvalidPolygon {
        /// 与えられた頂点数
        points: usize,
    },

    /// 指定IDのAUVが存在しない
    #[error("AUVが見つかりません: {0}")]
    AgentNotFound(String),
}
