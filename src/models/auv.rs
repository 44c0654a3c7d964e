use crate::models::{
    traits::{IAgent, IMovable, RandomSource},
    common::{Position2D, RegionBounds, math_utils},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

/// AUVの運動・回避パラメータ
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuvParams {
    /// 他機との最小安全距離（これ未満で回避動作）
    pub safety_radius: f64,
    /// ウェイポイント到達判定距離
    pub arrival_tolerance: f64,
    /// 最大旋回レート（rad/s）
    pub max_turn_rate: f64,
    /// 回避針路に加える一様摂動の最大絶対値（rad）
    pub avoidance_jitter: f64,
    /// 回避中の速度倍率
    pub avoidance_speed_factor: f64,
}

impl Default for AuvParams {
    fn default() -> Self {
        Self {
            safety_radius: 5.0,
            arrival_tolerance: 2.0,
            max_turn_rate: 2.0,
            avoidance_jitter: 0.25,
            avoidance_speed_factor: 0.5,
        }
    }
}

/// 近接判定に使用する他機の読み取り専用ビュー（ティック開始時点の位置）
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborView {
    pub id: String,
    pub position: Position2D,
}

/// 自律型無人潜水機（AUV）エージェント
///
/// ウェイポイント列に沿って等速で航行し、安全距離内に他機が入った場合は
/// 反発方向へ針路を変えて減速します。旋回は最大旋回レートで制限されます。
#[derive(Debug, Clone)]
pub struct Auv {
    /// 一意識別子（生成後不変）
    pub id: String,
    /// 現在位置
    pub position: Position2D,
    /// 針路（ラジアン、(-π, π]）
    pub heading: f64,
    /// 公称速度（units/s）
    pub speed: f64,
    /// ウェイポイント列
    pub waypoints: Vec<Position2D>,
    /// 現在目標のインデックス（`waypoints.len()`で目標なし）
    pub current_waypoint_index: usize,
    /// 到達済みウェイポイント数（累計）
    pub waypoints_completed: u64,
    /// 回避動作の回数（累計）
    pub collisions_avoided: u64,
    /// 最後にウェイポイントへ到達した時刻
    pub last_waypoint_at: Option<Instant>,
    pub params: AuvParams,
}

impl Auv {
    /// 新しいAUVを作成します
    ///
    /// # 引数
    ///
    /// * `id` - 一意識別子
    /// * `position` - 初期位置
    /// * `heading` - 初期針路（ラジアン、正規化される）
    /// * `speed` - 公称速度
    /// * `params` - 運動・回避パラメータ
    pub fn new(id: String, position: Position2D, heading: f64, speed: f64, params: AuvParams) -> Self {
        Self {
            id,
            position,
            heading: math_utils::normalize_angle(heading),
            speed,
            waypoints: Vec::new(),
            current_waypoint_index: 0,
            waypoints_completed: 0,
            collisions_avoided: 0,
            last_waypoint_at: None,
            params,
        }
    }

    /// ウェイポイント列を置き換え、先頭から再開する
    pub fn set_waypoints(&mut self, route: Vec<Position2D>) {
        self.waypoints = route;
        self.current_waypoint_index = 0;
    }

    /// ウェイポイントを末尾に追加する（現在目標は変えない）
    pub fn add_waypoint(&mut self, point: Position2D) {
        self.waypoints.push(point);
    }

    /// 現在の目標ウェイポイント
    pub fn current_waypoint(&self) -> Option<Position2D> {
        self.waypoints.get(self.current_waypoint_index).copied()
    }

    /// 一度でもルートが与えられ、全て消化済みかどうか
    pub fn has_reached_goal(&self) -> bool {
        !self.waypoints.is_empty() && self.current_waypoint().is_none()
    }

    /// 1ティック分の状態遷移
    ///
    /// 到達判定 → 目標針路 → 回避 → 旋回制限 → 速度調整 → 位置積分 の順に処理します。
    /// `dt`が0以下（または非有限）の場合、旋回と移動は行いません。
    ///
    /// # 引数
    ///
    /// * `dt` - 前ティックからの経過時間（秒）
    /// * `neighbors` - ティック開始時点の全機の位置（自機を含んでよい）
    /// * `rng` - 回避摂動用の乱数源
    pub fn step(&mut self, dt: f64, neighbors: &[NeighborView], rng: &mut dyn RandomSource) {
        self.check_arrival();

        let mut desired_heading = match self.current_waypoint() {
            Some(waypoint) => self.position.bearing_to(&waypoint),
            None => self.heading,
        };

        let avoiding = match self.find_intruder(neighbors) {
            Some(intruder) => {
                desired_heading = self.avoidance_heading(&intruder.position, rng);
                self.collisions_avoided += 1;
                trace!(
                    auv_id = %self.id,
                    intruder_id = %intruder.id,
                    collisions_avoided = self.collisions_avoided,
                    "AUV_AVOIDANCE: 安全距離内の他機を回避"
                );
                true
            }
            None => false,
        };

        if !(dt > 0.0 && dt.is_finite()) {
            return;
        }

        self.turn_towards(desired_heading, dt);

        let effective_speed = if avoiding {
            self.speed * self.params.avoidance_speed_factor
        } else {
            self.speed
        };
        let displacement = Position2D::new(
            self.heading.cos() * effective_speed * dt,
            self.heading.sin() * effective_speed * dt,
        );
        self.position = self.position + displacement;
    }

    fn check_arrival(&mut self) {
        if let Some(waypoint) = self.current_waypoint() {
            let distance = self.position.distance(&waypoint);
            if distance < self.params.arrival_tolerance {
                self.current_waypoint_index += 1;
                self.waypoints_completed += 1;
                self.last_waypoint_at = Some(Instant::now());

                debug!(
                    auv_id = %self.id,
                    waypoint_x = waypoint.x,
                    waypoint_y = waypoint.y,
                    remaining = self.waypoints.len() - self.current_waypoint_index,
                    waypoints_completed = self.waypoints_completed,
                    "WAYPOINT_REACHED: ウェイポイントに到達しました"
                );
            }
        }
    }

    /// 安全距離未満にいる最初の他機（走査順で最初の1機のみ）
    fn find_intruder<'a>(&self, neighbors: &'a [NeighborView]) -> Option<&'a NeighborView> {
        neighbors
            .iter()
            .filter(|other| other.id != self.id)
            .find(|other| self.position.distance(&other.position) < self.params.safety_radius)
    }

    fn avoidance_heading(&self, intruder: &Position2D, rng: &mut dyn RandomSource) -> f64 {
        let away = intruder.bearing_to(&self.position);
        let jitter = self.params.avoidance_jitter;
        away + rng.uniform(-jitter, jitter)
    }

    fn turn_towards(&mut self, desired_heading: f64, dt: f64) {
        let heading_diff = math_utils::angle_difference(self.heading, desired_heading);
        let max_turn = self.params.max_turn_rate * dt;

        self.heading = if heading_diff.abs() > max_turn {
            self.heading + heading_diff.signum() * max_turn
        } else {
            desired_heading
        };
        self.heading = math_utils::normalize_angle(self.heading);
    }
}

impl IAgent for Auv {
    fn get_id(&self) -> String {
        self.id.clone()
    }

    fn is_active(&self) -> bool {
        self.current_waypoint().is_some()
    }
}

impl IMovable for Auv {
    fn get_position(&self) -> Position2D {
        self.position
    }

    fn set_position(&mut self, position: Position2D) {
        self.position = position;
    }

    fn get_heading(&self) -> f64 {
        self.heading
    }

    fn set_heading(&mut self, heading: f64) {
        self.heading = math_utils::normalize_angle(heading);
    }
}

/// AUV群の初期配置を生成するヘルパー構造体
///
/// 出現領域内に一様ランダムに配置し、一定確率で初期ルート（ランダムな
/// ウェイポイント列）を与えます。
#[derive(Debug, Clone)]
pub struct AuvFleet {
    /// 生成する機数
    pub count: usize,
    /// 出現領域
    pub spawn_rect: RegionBounds,
    /// 公称速度の範囲 [min, max)
    pub speed_range: (f64, f64),
    /// 初期ルートを持つ確率
    pub initial_route_probability: f64,
    /// 初期ルートのウェイポイント数の範囲（両端含む）
    pub initial_route_len: (usize, usize),
    pub params: AuvParams,
}

impl Default for AuvFleet {
    fn default() -> Self {
        Self {
            count: 25,
            spawn_rect: RegionBounds::new(-40.0, 40.0, -40.0, 40.0),
            speed_range: (2.0, 4.0),
            initial_route_probability: 0.5,
            initial_route_len: (2, 4),
            params: AuvParams::default(),
        }
    }
}

impl AuvFleet {
    /// 全AUVを生成（IDは`auv-0`から連番）
    pub fn generate_auvs(&self, rng: &mut dyn RandomSource) -> Vec<Auv> {
        let mut auvs = Vec::with_capacity(self.count);

        for index in 0..self.count {
            let position = self.random_point(rng);
            let heading = rng.uniform(0.0, std::f64::consts::TAU);
            let speed = rng.uniform(self.speed_range.0, self.speed_range.1);

            let mut auv = Auv::new(format!("auv-{}", index), position, heading, speed, self.params);

            if rng.next_unit() < self.initial_route_probability {
                let (min_len, max_len) = self.initial_route_len;
                let span = max_len.saturating_sub(min_len) + 1;
                let route_len = min_len + ((rng.next_unit() * span as f64) as usize).min(span - 1);
                for _ in 0..route_len {
                    let waypoint = self.random_point(rng);
                    auv.add_waypoint(waypoint);
                }
            }

            auvs.push(auv);
        }

        auvs
    }

    fn random_point(&self, rng: &mut dyn RandomSource) -> Position2D {
        Position2D::new(
            rng.uniform(self.spawn_rect.min_x, self.spawn_rect.max_x),
            rng.uniform(self.spawn_rect.min_y, self.spawn_rect.max_y),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::traits::{FixedRandom, SeededRandom};
    use std::f64::consts::PI;

    fn auv_at(id: &str, x: f64, y: f64, heading: f64) -> Auv {
        Auv::new(id.to_string(), Position2D::new(x, y), heading, 2.0, AuvParams::default())
    }

    fn views(auvs: &[Auv]) -> Vec<NeighborView> {
        auvs.iter()
            .map(|a| NeighborView { id: a.id.clone(), position: a.position })
            .collect()
    }

    #[test]
    fn test_set_waypoints_resets_cursor() {
        let mut auv = auv_at("auv-0", 0.0, 0.0, 0.0);
        auv.set_waypoints(vec![Position2D::new(1.0, 1.0), Position2D::new(10.0, 10.0)]);
        auv.current_waypoint_index = 2;
        assert_eq!(auv.current_waypoint(), None);

        auv.set_waypoints(vec![Position2D::new(5.0, 5.0)]);
        assert_eq!(auv.current_waypoint_index, 0);
        assert_eq!(auv.current_waypoint(), Some(Position2D::new(5.0, 5.0)));
    }

    #[test]
    fn test_add_waypoint_keeps_cursor() {
        let mut auv = auv_at("auv-0", 0.0, 0.0, 0.0);
        auv.add_waypoint(Position2D::new(30.0, 0.0));
        auv.add_waypoint(Position2D::new(30.0, 30.0));
        assert_eq!(auv.current_waypoint(), Some(Position2D::new(30.0, 0.0)));
        assert_eq!(auv.waypoints.len(), 2);
    }

    #[test]
    fn test_approach_decreases_distance_until_single_arrival() {
        let mut auv = auv_at("auv-0", 0.0, 0.0, 0.0);
        let target = Position2D::new(10.0, 0.0);
        auv.add_waypoint(target);
        let mut rng = FixedRandom(0.5);

        let mut previous = auv.position.distance(&target);
        let mut ticks = 0;
        while auv.current_waypoint().is_some() {
            auv.step(0.2, &[], &mut rng);
            ticks += 1;
            assert!(ticks < 100, "never arrived");
            if auv.current_waypoint().is_some() {
                let distance = auv.position.distance(&target);
                assert!(distance < previous, "distance must shrink: {} -> {}", previous, distance);
                previous = distance;
            }
        }
        assert_eq!(auv.waypoints_completed, 1);
        assert!(auv.last_waypoint_at.is_some());
        assert!(auv.has_reached_goal());

        for _ in 0..10 {
            auv.step(0.2, &[], &mut rng);
        }
        assert_eq!(auv.waypoints_completed, 1);
        assert_eq!(auv.current_waypoint_index, 1);
    }

    #[test]
    fn test_empty_queue_never_completes() {
        let mut auv = auv_at("auv-0", 0.0, 0.0, 1.0);
        let mut rng = FixedRandom(0.5);
        for _ in 0..50 {
            auv.step(0.2, &[], &mut rng);
        }
        assert_eq!(auv.current_waypoint_index, 0);
        assert_eq!(auv.waypoints_completed, 0);
        assert!(!auv.has_reached_goal());
        assert!((auv.heading - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_coincident_auvs_both_avoid() {
        let mut auvs = vec![auv_at("auv-0", 3.0, 3.0, 0.0), auv_at("auv-1", 3.0, 3.0, PI / 2.0)];
        let snapshot = views(&auvs);
        let mut rng = FixedRandom(0.5);
        for auv in auvs.iter_mut() {
            auv.step(0.2, &snapshot, &mut rng);
        }
        assert_eq!(auvs[0].collisions_avoided, 1);
        assert_eq!(auvs[1].collisions_avoided, 1);
    }

    #[test]
    fn test_avoidance_turns_away_and_slows_down() {
        let mut auv = auv_at("auv-0", 0.0, 0.0, 0.0);
        auv.add_waypoint(Position2D::new(20.0, 0.0));
        let intruder = NeighborView { id: "auv-1".to_string(), position: Position2D::new(3.0, 0.0) };
        let mut rng = FixedRandom(0.5);

        auv.step(0.1, &[intruder], &mut rng);

        assert_eq!(auv.collisions_avoided, 1);
        // 旋回は 2.0 rad/s * 0.1 s = 0.2 rad に制限される
        assert!((auv.heading.abs() - 0.2).abs() < 1e-9);
        let travelled = auv.position.distance(&Position2D::new(0.0, 0.0));
        assert!((travelled - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_only_first_intruder_counts() {
        let mut auv = auv_at("auv-0", 0.0, 0.0, 0.0);
        let neighbors = vec![
            NeighborView { id: "auv-0".to_string(), position: Position2D::new(0.0, 0.0) },
            NeighborView { id: "auv-1".to_string(), position: Position2D::new(0.0, 1.0) },
            NeighborView { id: "auv-2".to_string(), position: Position2D::new(1.0, 0.0) },
        ];
        let mut rng = FixedRandom(0.5);
        auv.step(1.0, &neighbors, &mut rng);
        assert_eq!(auv.collisions_avoided, 1);
        // auv-1 (真上) からの離脱方向は -π/2
        assert!((auv.heading + PI / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_avoidance_jitter_bounds_are_exact() {
        // auv-1 (真上) からの離脱方向は -π/2。dtを大きく取り旋回制限を外す
        let intruder = NeighborView { id: "auv-1".to_string(), position: Position2D::new(0.0, 1.0) };
        let away = -PI / 2.0;
        let jitter = AuvParams::default().avoidance_jitter;

        let mut low = auv_at("auv-0", 0.0, 0.0, 0.0);
        low.step(10.0, &[intruder.clone()], &mut FixedRandom(0.0));
        assert!((low.heading - (away - jitter)).abs() < 1e-12);

        let mut high = auv_at("auv-0", 0.0, 0.0, 0.0);
        high.step(10.0, &[intruder], &mut FixedRandom(0.999_999));
        assert!(high.heading < away + jitter);
        assert!((high.heading - (away + jitter)).abs() < 1e-5);
    }

    #[test]
    fn test_avoidance_jitter_stays_within_limit() {
        let auv = auv_at("auv-0", 0.0, 0.0, 0.0);
        let intruder = Position2D::new(-1.0, 0.0);
        let away = intruder.bearing_to(&auv.position);
        let jitter = auv.params.avoidance_jitter;
        let mut rng = SeededRandom::from_seed(17);

        let mut below = false;
        let mut above = false;
        for _ in 0..1000 {
            let offset = auv.avoidance_heading(&intruder, &mut rng) - away;
            assert!(offset.abs() <= jitter);
            below |= offset < 0.0;
            above |= offset > 0.0;
        }
        assert!(below && above);
    }

    #[test]
    fn test_non_positive_dt_does_not_move() {
        let mut auv = auv_at("auv-0", 1.0, 1.0, 0.5);
        auv.add_waypoint(Position2D::new(-20.0, 0.0));
        let mut rng = FixedRandom(0.5);
        let heading = auv.heading;
        auv.step(0.0, &[], &mut rng);
        auv.step(-0.3, &[], &mut rng);
        auv.step(f64::NAN, &[], &mut rng);
        assert_eq!(auv.position, Position2D::new(1.0, 1.0));
        assert_eq!(auv.heading, heading);
    }

    #[test]
    fn test_heading_stays_normalized() {
        let mut auv = auv_at("auv-0", 0.0, 0.0, 3.1);
        auv.set_waypoints(vec![
            Position2D::new(-10.0, -0.5),
            Position2D::new(-10.0, 0.5),
            Position2D::new(10.0, 0.0),
        ]);
        let mut rng = SeededRandom::from_seed(3);
        let neighbors = vec![NeighborView { id: "auv-9".to_string(), position: Position2D::new(-5.0, 0.0) }];
        for _ in 0..500 {
            auv.step(0.2, &neighbors, &mut rng);
            assert!(auv.heading > -PI && auv.heading <= PI);
        }
    }

    #[test]
    fn test_fleet_generation_is_seeded() {
        let fleet = AuvFleet::default();
        let a = fleet.generate_auvs(&mut SeededRandom::from_seed(42));
        let b = fleet.generate_auvs(&mut SeededRandom::from_seed(42));
        assert_eq!(a.len(), 25);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.position, y.position);
            assert_eq!(x.waypoints, y.waypoints);
        }
        for auv in &a {
            assert!(fleet.spawn_rect.contains(&auv.position));
            assert!(auv.speed >= 2.0 && auv.speed < 4.0);
            assert!(auv.waypoints.is_empty() || (2..=4).contains(&auv.waypoints.len()));
        }
        assert_eq!(a[0].id, "auv-0");
        assert_eq!(a[24].id, "auv-24");
    }
}
