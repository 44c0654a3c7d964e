//! # Snapshot モジュール
//!
//! シミュレーション状態の外部公開用読み取りモデルを提供します。
//!
//! エンジンはティック毎に [`SimulationSnapshot`] を生成し、[`SnapshotPublisher`]
//! のブロードキャストチャネルへ流します。WebSocket等の配信層はこのチャネルを
//! 購読するだけで、エンジン内部の状態には触れません。分析値は
//! [`AnalyticsReport`] としてティック周期とは独立に随時計算できます。
//!
//! フィールド名はcamelCaseでシリアライズされます。

use crate::models::{
    auv::Auv,
    common::{Position2D, math_utils},
    mission::Mission,
    traits::IAgent,
};
use serde::Serialize;
use tokio::sync::broadcast;

/// ブロードキャストチャネルの容量
///
/// 購読側がこれ以上遅れると古いスナップショットは読み飛ばされます。
const BROADCAST_CAPACITY: usize = 64;

/// 1機分の公開状態
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuvState {
    pub id: String,
    /// 小数点以下2桁に丸めた位置
    pub x: f64,
    pub y: f64,
    /// 小数点以下2桁に丸めた針路（ラジアン）
    pub heading: f64,
    pub speed: f64,
    pub current_waypoint: Option<Position2D>,
    pub waypoints_completed: u64,
    pub collisions_avoided: u64,
    pub has_active_waypoint: bool,
}

impl From<&Auv> for AuvState {
    fn from(auv: &Auv) -> Self {
        let current_waypoint = auv.current_waypoint();
        Self {
            id: auv.get_id(),
            x: math_utils::round2(auv.position.x),
            y: math_utils::round2(auv.position.y),
            heading: math_utils::round2(auv.heading),
            speed: auv.speed,
            current_waypoint,
            waypoints_completed: auv.waypoints_completed,
            collisions_avoided: auv.collisions_avoided,
            has_active_waypoint: current_waypoint.is_some(),
        }
    }
}

/// ミッションの公開状態
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionState {
    pub id: String,
    pub polygon: Vec<Position2D>,
    pub assigned_agent_ids: Vec<String>,
}

impl From<&Mission> for MissionState {
    fn from(mission: &Mission) -> Self {
        Self {
            id: mission.id.clone(),
            polygon: mission.polygon.clone(),
            assigned_agent_ids: mission.assigned_auv_ids.clone(),
        }
    }
}

/// ある瞬間の全AUV・全ミッションの一貫した投影
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSnapshot {
    /// UNIXエポックからのミリ秒
    pub timestamp: i64,
    /// シミュレーション開始からの経過ミリ秒
    pub elapsed_simulation_millis: u64,
    pub agents: Vec<AuvState>,
    pub missions: Vec<MissionState>,
}

/// 群全体の集計値
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub total_collisions_avoided: u64,
    pub total_waypoints_completed: u64,
    /// ルートを持ち、全ウェイポイントを消化したAUV数
    pub agents_reached_goal: usize,
    /// 目標ウェイポイントを持つAUV数
    pub active_agents: usize,
    /// 目標ウェイポイントを持たないAUV数
    pub idle_agents: usize,
    pub total_agents: usize,
    /// 経過時間 ÷ 総到達数（小数点以下1桁、到達なしの場合0）
    pub average_time_per_waypoint_seconds: f64,
    /// 稼働時間（整数秒）
    pub simulation_uptime_seconds: u64,
    pub active_missions: usize,
}

impl AnalyticsReport {
    /// AUV群とミッション一覧から集計する
    ///
    /// # 引数
    ///
    /// * `auvs` - 全AUV
    /// * `mission_count` - ミッション数
    /// * `elapsed_s` - シミュレーション開始からの経過秒
    pub fn collect(auvs: &[Auv], mission_count: usize, elapsed_s: f64) -> Self {
        let total_collisions_avoided = auvs.iter().map(|a| a.collisions_avoided).sum();
        let total_waypoints_completed: u64 = auvs.iter().map(|a| a.waypoints_completed).sum();
        let agents_reached_goal = auvs.iter().filter(|a| a.has_reached_goal()).count();
        let active_agents = auvs.iter().filter(|a| a.is_active()).count();

        let average_time_per_waypoint_seconds = if total_waypoints_completed > 0 {
            math_utils::round1(elapsed_s / total_waypoints_completed as f64)
        } else {
            0.0
        };

        Self {
            total_collisions_avoided,
            total_waypoints_completed,
            agents_reached_goal,
            active_agents,
            idle_agents: auvs.len() - active_agents,
            total_agents: auvs.len(),
            average_time_per_waypoint_seconds,
            simulation_uptime_seconds: elapsed_s.max(0.0).round() as u64,
            active_missions: mission_count,
        }
    }
}

/// スナップショット配信用のブロードキャストチャネル
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    tx: broadcast::Sender<SimulationSnapshot>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// 購読を開始する
    pub fn subscribe(&self) -> broadcast::Receiver<SimulationSnapshot> {
        self.tx.subscribe()
    }

    /// 全購読者へ配信し、受信者数を返す（購読者なしは0でエラーではない）
    pub fn publish(&self, snapshot: SimulationSnapshot) -> usize {
        self.tx.send(snapshot).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}
