//! AUV群シミュレーションエンジン
//!
//! 有界な2次元海域内で、複数の自律型無人潜水機（AUV）がウェイポイントへ向かいながら
//! 互いの衝突を反応的に回避する様子を固定周期でシミュレーションし、その状態を
//! 購読者へ配信します。

pub mod error;
pub mod logging;
pub mod models;
pub mod scenario;
pub mod scheduler;
pub mod simulation;
pub mod snapshot;

pub use error::SimulationError;
pub use scheduler::SimulationHandle;
pub use simulation::SimulationEngine;
