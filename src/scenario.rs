use crate::models::{AuvFleet, AuvParams, Position2D, RegionBounds};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// ティック周期（ミリ秒）
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// 実行時間（秒）
    pub duration_s: f64,
    /// 乱数シード（省略時はOSエントロピー）
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tick_interval_ms() -> u64 {
    200
}

/// 世界設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorldConfig {
    pub region_rect: RegionRect,
    /// 壁からこの距離未満に入ったAUVは中心へ向け直される
    #[serde(default = "default_boundary_margin")]
    pub boundary_margin: f64,
}

fn default_boundary_margin() -> f64 {
    5.0
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RegionRect {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl RegionRect {
    pub fn is_finite(&self) -> bool {
        [self.xmin, self.xmax, self.ymin, self.ymax].iter().all(|v| v.is_finite())
    }

    pub fn to_bounds(&self) -> RegionBounds {
        RegionBounds::new(self.xmin, self.xmax, self.ymin, self.ymax)
    }
}

/// AUV群設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FleetConfig {
    pub count: usize,
    pub spawn_rect: RegionRect,
    pub speed_range: [f64; 2],
    #[serde(default)]
    pub initial_route_probability: f64,
    #[serde(default = "default_initial_route_len")]
    pub initial_route_len: [usize; 2],
}

fn default_initial_route_len() -> [usize; 2] {
    [2, 4]
}

/// 実行中に投入するスクリプトイベント
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioEvent {
    /// 投入時刻（シミュレーション開始からの秒）
    pub at_s: f64,
    #[serde(flatten)]
    pub action: EventAction,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventAction {
    /// ポリゴンミッションの作成
    Mission { polygon: Vec<Position2D> },
    /// 単一ウェイポイントの割り当て
    Waypoint { auv_id: String, point: Position2D },
    /// 全状態の破棄（`reseed`がtrueならfleet設定で再配置）
    Reset {
        #[serde(default)]
        reseed: bool,
    },
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    pub world: WorldConfig,
    pub fleet: FleetConfig,
    #[serde(default)]
    pub auv_defaults: AuvParams,
    #[serde(default)]
    pub events: Vec<ScenarioEvent>,
}

/// エンジンの固定設定（セッション中不変）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub bounds: RegionBounds,
    pub boundary_margin: f64,
    pub tick_period: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bounds: RegionBounds::default(),
            boundary_margin: default_boundary_margin(),
            tick_period: Duration::from_millis(default_tick_interval_ms()),
        }
    }
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.sim.tick_interval_ms == 0 {
            return Err(ScenarioError::ValidationError("tick_interval_ms must be positive".to_string()));
        }
        if !(self.sim.duration_s.is_finite() && self.sim.duration_s > 0.0) {
            return Err(ScenarioError::ValidationError("duration_s must be positive and finite".to_string()));
        }

        let region = &self.world.region_rect;
        if !region.is_finite() {
            return Err(ScenarioError::ValidationError("region_rect must be finite".to_string()));
        }
        if region.xmin >= region.xmax || region.ymin >= region.ymax {
            return Err(ScenarioError::ValidationError("Invalid region bounds".to_string()));
        }

        let margin = self.world.boundary_margin;
        if !margin.is_finite() || margin < 0.0 || 2.0 * margin >= (region.xmax - region.xmin).min(region.ymax - region.ymin) {
            return Err(ScenarioError::ValidationError(
                format!("boundary_margin {} leaves no interior in region", margin)
            ));
        }

        let spawn = &self.fleet.spawn_rect;
        if !spawn.is_finite() || spawn.xmin > spawn.xmax || spawn.ymin > spawn.ymax {
            return Err(ScenarioError::ValidationError("Invalid spawn_rect bounds".to_string()));
        }
        let bounds = region.to_bounds();
        let spawn_bounds = spawn.to_bounds();
        if !bounds.contains(&Position2D::new(spawn_bounds.min_x, spawn_bounds.min_y))
            || !bounds.contains(&Position2D::new(spawn_bounds.max_x, spawn_bounds.max_y)) {
            return Err(ScenarioError::ValidationError("spawn_rect outside region bounds".to_string()));
        }

        let [speed_min, speed_max] = self.fleet.speed_range;
        if !(speed_min.is_finite() && speed_max.is_finite()) || speed_min <= 0.0 || speed_min > speed_max {
            return Err(ScenarioError::ValidationError("Invalid speed_range".to_string()));
        }

        if !(0.0..=1.0).contains(&self.fleet.initial_route_probability) {
            return Err(ScenarioError::ValidationError("initial_route_probability must be in [0, 1]".to_string()));
        }

        let [route_min, route_max] = self.fleet.initial_route_len;
        if route_min > route_max {
            return Err(ScenarioError::ValidationError("Invalid initial_route_len".to_string()));
        }

        let params = &self.auv_defaults;
        let finite = [
            params.safety_radius,
            params.arrival_tolerance,
            params.max_turn_rate,
            params.avoidance_jitter,
            params.avoidance_speed_factor,
        ]
        .iter()
        .all(|value| value.is_finite());
        if !finite {
            return Err(ScenarioError::ValidationError("auv_defaults must be finite".to_string()));
        }
        if params.safety_radius < 0.0 || params.arrival_tolerance <= 0.0 || params.max_turn_rate <= 0.0 {
            return Err(ScenarioError::ValidationError("Invalid auv_defaults".to_string()));
        }
        if params.avoidance_jitter < 0.0 || params.avoidance_speed_factor < 0.0 {
            return Err(ScenarioError::ValidationError(
                "avoidance_jitter and avoidance_speed_factor must not be negative".to_string()
            ));
        }

        for (index, event) in self.events.iter().enumerate() {
            if !event.at_s.is_finite() || event.at_s < 0.0 || event.at_s >= self.sim.duration_s {
                return Err(ScenarioError::ValidationError(
                    format!("Event #{} time {} outside simulation time {}", index, event.at_s, self.sim.duration_s)
                ));
            }
            if let EventAction::Mission { polygon } = &event.action {
                if polygon.len() < crate::models::MIN_POLYGON_POINTS {
                    return Err(ScenarioError::ValidationError(
                        format!("Event #{} mission polygon has {} points", index, polygon.len())
                    ));
                }
            }
        }

        Ok(())
    }

    /// エンジン設定を取り出す
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            bounds: self.world.region_rect.to_bounds(),
            boundary_margin: self.world.boundary_margin,
            tick_period: Duration::from_millis(self.sim.tick_interval_ms),
        }
    }

    /// AUV群の生成設定を取り出す
    pub fn fleet(&self) -> AuvFleet {
        AuvFleet {
            count: self.fleet.count,
            spawn_rect: self.fleet.spawn_rect.to_bounds(),
            speed_range: (self.fleet.speed_range[0], self.fleet.speed_range[1]),
            initial_route_probability: self.fleet.initial_route_probability,
            initial_route_len: (self.fleet.initial_route_len[0], self.fleet.initial_route_len[1]),
            params: self.auv_defaults,
        }
    }

    /// イベントを時刻順に並べたもの
    pub fn sorted_events(&self) -> Vec<ScenarioEvent> {
        let mut events = self.events.clone();
        events.sort_by(|a, b| a.at_s.partial_cmp(&b.at_s).unwrap_or(std::cmp::Ordering::Equal));
        events
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("ティック周期: {}ミリ秒", self.sim.tick_interval_ms);
        println!("実行時間: {:.1}秒 ({:.1}分)", self.sim.duration_s, self.sim.duration_s / 60.0);
        match self.sim.seed {
            Some(seed) => println!("シード値: {}", seed),
            None => println!("シード値: (ランダム)"),
        }
        println!();

        let region = &self.world.region_rect;
        println!("=== 海域 ===");
        println!("範囲: x [{:.1}, {:.1}], y [{:.1}, {:.1}]", region.xmin, region.xmax, region.ymin, region.ymax);
        println!("境界マージン: {:.1}", self.world.boundary_margin);
        println!();

        println!("=== AUV群 ===");
        println!("機数: {}機", self.fleet.count);
        println!("速度: {:.1} - {:.1}", self.fleet.speed_range[0], self.fleet.speed_range[1]);
        println!("安全距離: {:.1}", self.auv_defaults.safety_radius);
        println!();

        println!("=== イベント ===");
        println!("イベント数: {}", self.events.len());
        for event in self.sorted_events() {
            match &event.action {
                EventAction::Mission { polygon } => {
                    println!("  {:.1}秒: ミッション作成 ({}頂点)", event.at_s, polygon.len());
                }
                EventAction::Waypoint { auv_id, point } => {
                    println!("  {:.1}秒: {} へウェイポイント ({:.1}, {:.1})", event.at_s, auv_id, point.x, point.y);
                }
                EventAction::Reset { reseed } => {
                    println!("  {:.1}秒: リセット (再配置: {})", event.at_s, reseed);
                }
            }
        }
    }
}

/// シナリオ読み込みエラー
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),
    #[error("YAML解析エラー {}: {}", .0.display(), .1)]
    ParseError(PathBuf, #[source] serde_yaml::Error),
    #[error("設定検証エラー: {0}")]
    ValidationError(String),
}
