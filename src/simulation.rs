//! # Simulation モジュール
//!
//! AUV群シミュレーションの中核となるシミュレーションエンジンを提供します。
//!
//! このモジュールは、固定周期で全AUVを1ティックずつ進めるワールドを管理し、
//! ミッション割り当て・単独ウェイポイント割り当て・リセットといった外部コマンドと、
//! スナップショット・分析値の読み取りを提供します。
//!
//! ## ティック処理順序
//!
//! 1. **経過時間計算**: 前ティックからの壁時計差分をΔtとする
//! 2. **近傍スナップショット**: ティック開始時点の全機位置を読み取り専用で複製
//! 3. **AUV処理**: 登録順に各AUVの到達判定・回避・旋回・移動を実行
//!    （全機が同じ近傍スナップショットを参照するため、処理順による偏りはない）
//! 4. **境界処理**: 壁付近のAUVの針路を海域中心へ強制的に向け直す
//! 5. **スナップショット生成**: 配信用の読み取りモデルを作成
//!
//! ## 使用例
//!
//! ```rust
//! use auvsim::models::{AuvFleet, Position2D, SeededRandom};
//! use auvsim::scenario::EngineSettings;
//! use auvsim::simulation::SimulationEngine;
//!
//! let mut engine = SimulationEngine::new(EngineSettings::default(), Box::new(SeededRandom::from_seed(1)));
//! engine.initialize(&AuvFleet::default());
//!
//! let polygon = vec![
//!     Position2D::new(-10.0, -10.0),
//!     Position2D::new(10.0, -10.0),
//!     Position2D::new(10.0, 10.0),
//! ];
//! let mission = engine.create_mission(polygon).unwrap();
//! let snapshot = engine.tick();
//! assert_eq!(snapshot.missions[0].id, mission.id);
//! ```

use crate::error::SimulationError;
use crate::models::*;
use crate::scenario::{EngineSettings, ScenarioConfig};
use crate::snapshot::{AnalyticsReport, AuvState, MissionState, SimulationSnapshot};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 進行状況をログ出力するティック間隔
const PROGRESS_LOG_INTERVAL: u64 = 100;

pub struct SimulationEngine {
    pub settings: EngineSettings,
    pub auvs: Vec<Auv>,
    pub missions: Vec<Mission>,
    pub step_count: u64,

    started_at: Instant,
    last_tick_at: Instant,
    rng: Box<dyn RandomSource>,
}

impl SimulationEngine {
    /// AUVを持たない空のワールドを作成
    pub fn new(settings: EngineSettings, rng: Box<dyn RandomSource>) -> Self {
        let now = Instant::now();
        Self {
            settings,
            auvs: Vec::new(),
            missions: Vec::new(),
            step_count: 0,
            started_at: now,
            last_tick_at: now,
            rng,
        }
    }

    /// 配置済みのAUVからワールドを作成
    pub fn with_auvs(settings: EngineSettings, auvs: Vec<Auv>, rng: Box<dyn RandomSource>) -> Self {
        let mut engine = Self::new(settings, rng);
        engine.auvs = auvs;
        engine
    }

    /// シナリオ設定からワールドを作成し、AUV群を配置する
    pub fn from_scenario(scenario: &ScenarioConfig) -> Self {
        let rng: Box<dyn RandomSource> = match scenario.sim.seed {
            Some(seed) => Box::new(SeededRandom::from_seed(seed)),
            None => Box::new(SeededRandom::from_entropy()),
        };
        let mut engine = Self::new(scenario.engine_settings(), rng);
        engine.initialize(&scenario.fleet());
        engine
    }

    /// ワールドの初期化
    ///
    /// 既存のAUV・ミッションを破棄し、`fleet`設定に従ってAUV群を生成し直します。
    /// 開始時刻もリセットされます。
    pub fn initialize(&mut self, fleet: &AuvFleet) {
        self.auvs = fleet.generate_auvs(self.rng.as_mut());
        self.missions.clear();
        self.step_count = 0;
        self.started_at = Instant::now();
        self.last_tick_at = self.started_at;

        let with_route = self.auvs.iter().filter(|a| a.is_active()).count();
        info!(
            auvs = self.auvs.len(),
            with_route,
            "ワールドを初期化しました"
        );
    }

    /// 次のティックのΔt基準を現在時刻に合わせる（スケジューラ再開時）
    pub fn restart_clock(&mut self) {
        self.last_tick_at = Instant::now();
    }

    /// 壁時計に基づいて1ティック進め、スナップショットを返す
    pub fn tick(&mut self) -> SimulationSnapshot {
        let now = Instant::now();
        let dt = now.saturating_duration_since(self.last_tick_at).as_secs_f64();
        self.last_tick_at = now;

        self.advance(dt);
        self.snapshot()
    }

    /// 指定したΔt（秒）で全AUVを1ティック進める
    pub fn advance(&mut self, dt: f64) {
        let neighbors: Vec<NeighborView> = self.auvs
            .iter()
            .map(|auv| NeighborView { id: auv.get_id(), position: auv.get_position() })
            .collect();

        let settings = self.settings;
        let mut recovered = 0;
        for auv in self.auvs.iter_mut() {
            auv.step(dt, &neighbors, self.rng.as_mut());
            if Self::contain(&settings, auv) {
                recovered += 1;
            }
        }

        self.step_count += 1;

        if recovered > 0 {
            warn!(step = self.step_count, recovered, "非有限な状態を復旧したAUVがあります");
        }
        if self.step_count % PROGRESS_LOG_INTERVAL == 0 {
            let report = self.analytics();
            debug!(
                step = self.step_count,
                dt,
                active_auvs = report.active_agents,
                waypoints_completed = report.total_waypoints_completed,
                collisions_avoided = report.total_collisions_avoided,
                "シミュレーション進行状況"
            );
        }
    }

    /// 境界処理
    ///
    /// 非有限な位置は海域中心へ戻し、壁から`boundary_margin`未満のAUVは
    /// 針路を海域中心へ即座に向け直します。
    ///
    /// # 戻り値
    ///
    /// 非有限な状態を復旧した場合はtrue
    fn contain<M: IMovable + IAgent>(settings: &EngineSettings, agent: &mut M) -> bool {
        let center = settings.bounds.center();
        let mut position = agent.get_position();
        let mut recovered = false;

        if !position.is_finite() {
            warn!(
                auv_id = %agent.get_id(),
                x = position.x,
                y = position.y,
                "STATE_RECOVERED: 非有限な位置を海域中心へ戻しました"
            );
            position = center;
            agent.set_position(center);
            recovered = true;
        }
        if !agent.get_heading().is_finite() {
            agent.set_heading(0.0);
            recovered = true;
        }

        if settings.bounds.is_near_wall(&position, settings.boundary_margin) {
            agent.set_heading(position.bearing_to(&center));
        }

        recovered
    }

    /// ポリゴンミッションを作成し、待機中のAUVへ割り当てる
    ///
    /// 頂点数が3未満の場合は`InvalidPolygon`を返し、状態は変更しません。
    pub fn create_mission(&mut self, polygon: Vec<Position2D>) -> Result<Mission, SimulationError> {
        let mut mission = Mission::new(polygon)?;
        mission.assign_to_idle(&mut self.auvs);
        self.missions.push(mission.clone());
        Ok(mission)
    }

    /// 指定AUVのウェイポイント列末尾へ1点追加する
    pub fn assign_waypoint(&mut self, auv_id: &str, point: Position2D) -> Result<(), SimulationError> {
        let auv = self.auvs
            .iter_mut()
            .find(|auv| auv.id == auv_id)
            .ok_or_else(|| SimulationError::AgentNotFound(auv_id.to_string()))?;

        auv.add_waypoint(point);
        debug!(auv_id, x = point.x, y = point.y, "ウェイポイントを追加しました");
        Ok(())
    }

    /// 指定AUVの公開状態
    pub fn agent_state(&self, auv_id: &str) -> Result<AuvState, SimulationError> {
        self.auvs
            .iter()
            .find(|auv| auv.id == auv_id)
            .map(AuvState::from)
            .ok_or_else(|| SimulationError::AgentNotFound(auv_id.to_string()))
    }

    /// シミュレーション開始からの経過時間
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 全AUV・全ミッションのスナップショット
    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            timestamp: chrono::Utc::now().timestamp_millis(),
            elapsed_simulation_millis: self.elapsed().as_millis() as u64,
            agents: self.auvs.iter().map(AuvState::from).collect(),
            missions: self.missions.iter().map(MissionState::from).collect(),
        }
    }

    /// 群全体の分析値
    pub fn analytics(&self) -> AnalyticsReport {
        AnalyticsReport::collect(&self.auvs, self.missions.len(), self.elapsed().as_secs_f64())
    }

    /// 全AUV・全ミッションを破棄し、開始時刻をリセットする
    ///
    /// AUVの再配置は行いません。必要なら呼び出し側が`initialize`を呼びます。
    pub fn reset(&mut self) {
        let discarded_auvs = self.auvs.len();
        let discarded_missions = self.missions.len();

        self.auvs.clear();
        self.missions.clear();
        self.step_count = 0;
        self.started_at = Instant::now();
        self.last_tick_at = self.started_at;

        info!(discarded_auvs, discarded_missions, "シミュレーションをリセットしました");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn auv(id: &str, x: f64, y: f64, heading: f64) -> Auv {
        Auv::new(id.to_string(), Position2D::new(x, y), heading, 2.0, AuvParams::default())
    }

    fn engine_with(auvs: Vec<Auv>) -> SimulationEngine {
        SimulationEngine::with_auvs(EngineSettings::default(), auvs, Box::new(FixedRandom(0.5)))
    }

    fn square() -> Vec<Position2D> {
        vec![
            Position2D::new(-10.0, -10.0),
            Position2D::new(10.0, -10.0),
            Position2D::new(10.0, 10.0),
            Position2D::new(-10.0, 10.0),
        ]
    }

    fn assert_totals_match(engine: &SimulationEngine) {
        let report = engine.analytics();
        let collisions: u64 = engine.auvs.iter().map(|a| a.collisions_avoided).sum();
        let waypoints: u64 = engine.auvs.iter().map(|a| a.waypoints_completed).sum();
        assert_eq!(report.total_collisions_avoided, collisions);
        assert_eq!(report.total_waypoints_completed, waypoints);
        assert_eq!(report.total_agents, engine.auvs.len());
        assert_eq!(report.active_agents + report.idle_agents, engine.auvs.len());
    }

    #[test]
    fn test_mission_assigns_two_of_three_idle() {
        let mut busy = auv("auv-0", -20.0, 0.0, 0.0);
        busy.add_waypoint(Position2D::new(30.0, 30.0));
        let mut engine = engine_with(vec![
            busy,
            auv("auv-1", 0.0, -20.0, 0.0),
            auv("auv-2", 20.0, 0.0, 0.0),
            auv("auv-3", 0.0, 20.0, 0.0),
        ]);

        let mission = engine.create_mission(square()).unwrap();

        assert_eq!(mission.assigned_auv_ids, vec!["auv-1".to_string(), "auv-2".to_string()]);
        assert_eq!(engine.missions.len(), 1);
        assert_eq!(engine.auvs[1].waypoints, square());
        assert_eq!(engine.auvs[2].waypoints, square());
        assert!(engine.auvs[3].waypoints.is_empty());
        assert_eq!(engine.auvs[0].waypoints, vec![Position2D::new(30.0, 30.0)]);
    }

    #[test]
    fn test_invalid_polygon_leaves_state_untouched() {
        let mut engine = engine_with(vec![auv("auv-0", 0.0, 0.0, 0.0)]);
        let result = engine.create_mission(vec![Position2D::new(0.0, 0.0), Position2D::new(1.0, 0.0)]);

        assert_eq!(result, Err(SimulationError::InvalidPolygon { points: 2 }));
        assert!(engine.missions.is_empty());
        assert!(engine.auvs[0].waypoints.is_empty());
    }

    #[test]
    fn test_assign_waypoint_unknown_id() {
        let mut engine = engine_with(vec![auv("auv-0", 0.0, 0.0, 0.0)]);
        let result = engine.assign_waypoint("auv-42", Position2D::new(1.0, 1.0));

        assert_eq!(result, Err(SimulationError::AgentNotFound("auv-42".to_string())));
        assert_eq!(engine.auvs.len(), 1);
        assert!(engine.auvs[0].waypoints.is_empty());
        assert!(engine.agent_state("auv-42").is_err());
    }

    #[test]
    fn test_assign_waypoint_appends() {
        let mut engine = engine_with(vec![auv("auv-0", 0.0, 0.0, 0.0)]);
        engine.assign_waypoint("auv-0", Position2D::new(12.0, 3.0)).unwrap();
        engine.assign_waypoint("auv-0", Position2D::new(-12.0, 3.0)).unwrap();

        let state = engine.agent_state("auv-0").unwrap();
        assert_eq!(state.current_waypoint, Some(Position2D::new(12.0, 3.0)));
        assert_eq!(engine.auvs[0].waypoints.len(), 2);
    }

    #[test]
    fn test_boundary_containment_points_to_center() {
        let bounds = EngineSettings::default().bounds;
        let mut engine = engine_with(vec![auv("auv-0", bounds.min_x + 2.0, 10.0, PI)]);

        engine.advance(0.2);

        let agent = &engine.auvs[0];
        let expected = agent.position.bearing_to(&bounds.center());
        assert!((agent.heading - expected).abs() < 1e-12);
        assert!(agent.heading.abs() < PI / 2.0);
    }

    #[test]
    fn test_containment_overrides_avoidance() {
        let bounds = EngineSettings::default().bounds;
        let mut engine = engine_with(vec![
            auv("auv-0", bounds.max_x - 1.0, 0.0, 0.0),
            auv("auv-1", bounds.max_x - 3.0, 0.0, 0.0),
        ]);

        engine.advance(0.2);

        for agent in &engine.auvs {
            assert_eq!(agent.collisions_avoided, 1);
            let expected = agent.position.bearing_to(&bounds.center());
            assert!((agent.heading - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_coincident_agents_both_avoid_in_one_tick() {
        let mut engine = engine_with(vec![auv("auv-0", 5.0, 5.0, 0.0), auv("auv-1", 5.0, 5.0, 1.0)]);
        engine.advance(0.2);
        assert_eq!(engine.auvs[0].collisions_avoided, 1);
        assert_eq!(engine.auvs[1].collisions_avoided, 1);
        assert_totals_match(&engine);
    }

    #[test]
    fn test_neighbors_use_pre_tick_positions() {
        // auv-0 は auv-1 の旧位置から離れる。auv-0 が先に動いても auv-1 の判定は変わらない
        let mut engine = engine_with(vec![auv("auv-0", 0.0, 0.0, PI), auv("auv-1", 4.9, 0.0, 0.0)]);
        engine.advance(0.2);
        assert_eq!(engine.auvs[0].collisions_avoided, 1);
        assert_eq!(engine.auvs[1].collisions_avoided, 1);
    }

    #[test]
    fn test_nan_position_is_recovered() {
        let mut broken = auv("auv-0", f64::NAN, 0.0, 0.0);
        broken.add_waypoint(Position2D::new(10.0, 10.0));
        let mut engine = engine_with(vec![broken, auv("auv-1", 20.0, 20.0, 0.0)]);

        engine.advance(0.2);

        assert_eq!(engine.auvs[0].position, EngineSettings::default().bounds.center());
        assert!(engine.auvs[0].heading.is_finite());
        assert_eq!(engine.auvs[1].collisions_avoided, 0);
        engine.advance(0.2);
        assert!(engine.auvs[0].position.is_finite());
    }

    #[test]
    fn test_analytics_totals_hold_over_ticks() {
        let mut engine = SimulationEngine::new(EngineSettings::default(), Box::new(SeededRandom::from_seed(11)));
        engine.initialize(&AuvFleet::default());
        assert_totals_match(&engine);

        engine.create_mission(square()).unwrap();
        for _ in 0..300 {
            engine.advance(0.2);
            for agent in &engine.auvs {
                assert!(agent.heading > -PI && agent.heading <= PI);
            }
        }
        assert_totals_match(&engine);
        assert!(engine.analytics().total_waypoints_completed > 0);
        assert_eq!(engine.analytics().active_missions, 1);
    }

    #[test]
    fn test_tick_produces_snapshot_of_everything() {
        let mut engine = engine_with(vec![auv("auv-0", 0.0, 0.0, 0.0), auv("auv-1", 20.0, 0.0, 0.0)]);
        engine.create_mission(square()).unwrap();

        let snapshot = engine.tick();

        assert_eq!(snapshot.agents.len(), 2);
        assert_eq!(snapshot.missions.len(), 1);
        assert_eq!(snapshot.missions[0].assigned_agent_ids.len(), 2);
        assert_eq!(engine.step_count, 1);
    }

    #[test]
    fn test_reset_discards_everything() {
        let mut engine = SimulationEngine::new(EngineSettings::default(), Box::new(SeededRandom::from_seed(5)));
        engine.initialize(&AuvFleet::default());
        engine.create_mission(square()).unwrap();
        engine.advance(0.2);

        engine.reset();

        let snapshot = engine.snapshot();
        assert!(snapshot.agents.is_empty());
        assert!(snapshot.missions.is_empty());
        let report = engine.analytics();
        assert_eq!(report.total_agents, 0);
        assert_eq!(report.active_missions, 0);
        assert_eq!(report.simulation_uptime_seconds, 0);
        assert_eq!(engine.step_count, 0);

        engine.initialize(&AuvFleet::default());
        assert_eq!(engine.auvs.len(), 25);
    }
}
