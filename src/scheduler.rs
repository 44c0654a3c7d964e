//! # Scheduler モジュール
//!
//! 1つのシミュレーションセッションを所有する明示的なハンドルを提供します。
//!
//! [`SimulationHandle`] は [`SimulationEngine`] を単一の `tokio::sync::Mutex`
//! で保護し、固定周期のティックタスクと外部コマンド（ミッション作成、
//! ウェイポイント割り当て、リセット）および読み取り（スナップショット、分析値）
//! を同じロックで直列化します。このため読み取り側がティック途中のワールドを
//! 観測することはなく、新しいルートは次のティックから有効になります。
//!
//! ティックは遅延しても間引かれず（`MissedTickBehavior::Burst`）、個々の
//! ティックの異常でタスクが停止することはありません。

use crate::error::SimulationError;
use crate::models::{AuvFleet, Mission, Position2D};
use crate::simulation::SimulationEngine;
use crate::snapshot::{AnalyticsReport, AuvState, SimulationSnapshot, SnapshotPublisher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, trace};

/// シミュレーションセッションのハンドル
pub struct SimulationHandle {
    engine: Arc<Mutex<SimulationEngine>>,
    publisher: SnapshotPublisher,
    task: Option<JoinHandle<()>>,
}

impl SimulationHandle {
    pub fn new(engine: SimulationEngine) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            publisher: SnapshotPublisher::new(),
            task: None,
        }
    }

    /// ティック毎のスナップショットを購読する
    pub fn subscribe(&self) -> broadcast::Receiver<SimulationSnapshot> {
        self.publisher.subscribe()
    }

    /// 新規接続: 現在のスナップショットと以降の購読を返す
    pub async fn connect(&self) -> (SimulationSnapshot, broadcast::Receiver<SimulationSnapshot>) {
        let engine = self.engine.lock().await;
        // ロック保持中に購読するため、初期スナップショットと配信の間に欠落はない
        let rx = self.publisher.subscribe();
        (engine.snapshot(), rx)
    }

    /// 現在の購読者数
    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// 固定周期のティックタスクを開始する（実行中なら何もしない）
    ///
    /// tokioランタイム内から呼び出す必要があります。
    pub async fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let period = {
            let mut engine = self.engine.lock().await;
            engine.restart_clock();
            engine.settings.tick_period
        };

        let engine = Arc::clone(&self.engine);
        let publisher = self.publisher.clone();

        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

            loop {
                ticker.tick().await;

                let tick_result = {
                    let mut engine = engine.lock().await;
                    panic::catch_unwind(AssertUnwindSafe(|| engine.tick()))
                };

                match tick_result {
                    Ok(snapshot) => {
                        let receivers = publisher.publish(snapshot);
                        trace!(receivers, "スナップショットを配信しました");
                    }
                    Err(_) => {
                        error!("TICK_FAILED: ティック処理で異常が発生しました。次のティックへ継続します");
                    }
                }
            }
        }));

        info!(tick_period_ms = period.as_millis() as u64, "シミュレーションを開始しました");
    }

    /// ティックタスクを停止する
    ///
    /// # 戻り値
    ///
    /// 実行中のタスクを停止した場合はtrue。停止済みなら何もせずfalse
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                info!("シミュレーションを停止しました");
                true
            }
            None => {
                debug!("シミュレーションは既に停止しています");
                false
            }
        }
    }

    /// ティックタスクを停止し、全AUV・全ミッションを破棄する
    pub async fn reset(&mut self) {
        self.stop();
        self.engine.lock().await.reset();
    }

    /// AUV群を再配置する（リセット後の再シードなど）
    pub async fn initialize(&self, fleet: &AuvFleet) {
        self.engine.lock().await.initialize(fleet);
    }

    pub async fn create_mission(&self, polygon: Vec<Position2D>) -> Result<Mission, SimulationError> {
        self.engine.lock().await.create_mission(polygon)
    }

    pub async fn assign_waypoint(&self, auv_id: &str, point: Position2D) -> Result<(), SimulationError> {
        self.engine.lock().await.assign_waypoint(auv_id, point)
    }

    pub async fn agent_state(&self, auv_id: &str) -> Result<AuvState, SimulationError> {
        self.engine.lock().await.agent_state(auv_id)
    }

    pub async fn snapshot(&self) -> SimulationSnapshot {
        self.engine.lock().await.snapshot()
    }

    pub async fn analytics(&self) -> AnalyticsReport {
        self.engine.lock().await.analytics()
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
