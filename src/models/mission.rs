use crate::error::SimulationError;
use crate::models::{
    auv::Auv,
    common::Position2D,
    traits::IAgent,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// ミッションに必要な最小頂点数
pub const MIN_POLYGON_POINTS: usize = 3;

/// ポリゴンミッション
///
/// 利用者が描いたポリゴンの頂点列を共有ルートとし、作成時点で待機中の
/// AUVの一部に割り当てます。割り当て先は作成後に変更されません。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    pub id: String,
    pub polygon: Vec<Position2D>,
    pub created_at: DateTime<Utc>,
    pub assigned_auv_ids: Vec<String>,
}

impl Mission {
    /// ポリゴンを検証してミッションを作成（割り当ては未実施）
    pub fn new(polygon: Vec<Position2D>) -> Result<Self, SimulationError> {
        if polygon.len() < MIN_POLYGON_POINTS {
            return Err(SimulationError::InvalidPolygon { points: polygon.len() });
        }

        Ok(Self {
            id: format!("mission-{}", uuid::Uuid::new_v4()),
            polygon,
            created_at: Utc::now(),
            assigned_auv_ids: Vec::new(),
        })
    }

    /// 割り当てを要求するAUV数: max(1, floor(頂点数 / 2))
    pub fn requested_auv_count(&self) -> usize {
        (self.polygon.len() / 2).max(1)
    }

    /// 待機中（目標ウェイポイントなし）のAUVに登録順でルートを割り当てる
    ///
    /// 待機機が要求数に満たない場合は見つかった全機に割り当てます。
    ///
    /// # 戻り値
    ///
    /// 割り当てたAUVの数
    pub fn assign_to_idle(&mut self, auvs: &mut [Auv]) -> usize {
        let requested = self.requested_auv_count();

        for auv in auvs.iter_mut().filter(|auv| !auv.is_active()).take(requested) {
            auv.set_waypoints(self.polygon.clone());
            self.assigned_auv_ids.push(auv.get_id());
        }

        info!(
            mission_id = %self.id,
            vertices = self.polygon.len(),
            requested,
            assigned = self.assigned_auv_ids.len(),
            "MISSION_CREATED: ミッションを作成し割り当てました"
        );

        self.assigned_auv_ids.len()
    }
}
