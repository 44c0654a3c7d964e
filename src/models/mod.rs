// 基本的なデータ型と数学ユーティリティ
pub mod common;

// エージェントの基本インターフェース（trait）と乱数源
pub mod traits;

// 各モデルの実装
pub mod auv;
pub mod mission;

// 便利な re-export
pub use common::*;
pub use traits::*;
pub use auv::{Auv, AuvFleet, AuvParams, NeighborView};
pub use mission::{Mission, MIN_POLYGON_POINTS};
