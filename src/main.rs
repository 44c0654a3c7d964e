use auvsim::logging::{LogConfig, LogOutput, init_logging, level_from_verbosity, parse_log_level};
use auvsim::scenario::{EventAction, ScenarioConfig, ScenarioEvent};
use auvsim::snapshot::{AnalyticsReport, SimulationSnapshot};
use auvsim::{SimulationEngine, SimulationHandle};
use clap::{Arg, Command};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{self, Instant};
use tracing::{info, warn};

/// 進行状況を出力するティック間隔
const PROGRESS_TICKS: u64 = 25;

fn main() {
    let matches = Command::new("auvsim")
        .version("0.1.0")
        .about("AUV群シミュレーション (AUV Swarm Simulation)")
        .long_about("自律型無人潜水機（AUV）群のシミュレーションシステム\n\
                     固定周期のティックでウェイポイント航行と衝突回避を再現し、\n\
                     状態スナップショットを配信します。")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .action(clap::ArgAction::SetTrue)
                .help("スナップショットをJSON Lines形式で標準出力へ出力")
                .conflicts_with("info")
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: デバッグ)")
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("ログレベル (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .default_value("console")
                .help("ログ出力先 (console, file, both)")
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");
    let json = matches.get_flag("json");

    let output = match matches.get_one::<String>("log-output").map(|s| s.parse::<LogOutput>()) {
        Some(Ok(output)) => output,
        Some(Err(e)) => {
            eprintln!("エラー: {}", e);
            std::process::exit(2);
        }
        None => LogOutput::Console,
    };
    let level = match matches.get_one::<String>("log-level") {
        Some(level) => parse_log_level(level),
        None => level_from_verbosity(verbose_level),
    };
    let log_config = LogConfig { level, output, ..LogConfig::default() };
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ログ初期化に失敗しました: {}", e);
            std::process::exit(1);
        }
    };

    if !json {
        println!("AUV群シミュレーション (AUV Swarm Simulation) - auvsim v0.1.0");
        println!();
    }

    if let Some(scenario_path) = matches.get_one::<String>("scenario") {
        match run_scenario(scenario_path, matches.get_flag("info"), json, verbose_level) {
            Ok(_) => {
                if verbose_level > 0 && !json {
                    println!("シナリオ実行が正常に完了しました。");
                }
            }
            Err(e) => {
                eprintln!("エラー: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        show_default_help();
    }
}

/// シナリオファイルを読み込んで実行
fn run_scenario(scenario_path: &str, info_only: bool, json: bool, verbose_level: u8) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = ScenarioConfig::from_file(scenario_path)?;

    if info_only {
        scenario.print_summary();
        return Ok(());
    }

    if !json {
        scenario.print_summary();
        println!();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(execute_scenario(scenario, json, verbose_level))?;

    if !json {
        print_report(&report);
    }

    Ok(())
}

/// シナリオの実行
///
/// 実行時間が経過するまでスナップショットを受信し、スクリプトイベントを
/// 指定時刻に投入します。
async fn execute_scenario(
    scenario: ScenarioConfig,
    json: bool,
    verbose_level: u8,
) -> Result<AnalyticsReport, Box<dyn std::error::Error>> {
    let mut handle = SimulationHandle::new(SimulationEngine::from_scenario(&scenario));

    let (initial, mut rx) = handle.connect().await;
    if json {
        emit_json(&initial)?;
    }

    handle.start().await;
    info!(subscribers = handle.subscriber_count(), "=== シミュレーション実行開始 ===");

    let events = scenario.sorted_events();
    let mut next_event = 0;
    let duration = Duration::from_secs_f64(scenario.sim.duration_s);
    let started = Instant::now();
    let mut tick_count: u64 = 0;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= duration {
            break;
        }

        let mut wait = duration - elapsed;
        if let Some(event) = events.get(next_event) {
            let until_event = Duration::from_secs_f64(event.at_s).saturating_sub(elapsed);
            wait = wait.min(until_event);
        }

        match time::timeout(wait, rx.recv()).await {
            Ok(Ok(snapshot)) => {
                tick_count += 1;
                if json {
                    emit_json(&snapshot)?;
                }
                if verbose_level > 0 && tick_count % PROGRESS_TICKS == 0 {
                    let report = handle.analytics().await;
                    info!(
                        tick = tick_count,
                        elapsed_s = started.elapsed().as_secs_f64(),
                        active_auvs = report.active_agents,
                        waypoints_completed = report.total_waypoints_completed,
                        collisions_avoided = report.total_collisions_avoided,
                        "進行状況"
                    );
                }
            }
            Ok(Err(RecvError::Lagged(skipped))) => {
                warn!(skipped, "スナップショットの受信が遅れたため読み飛ばしました");
            }
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => {}
        }

        let elapsed_s = started.elapsed().as_secs_f64();
        while let Some(event) = events.get(next_event) {
            if event.at_s > elapsed_s {
                break;
            }
            apply_event(&mut handle, event, &scenario).await;
            next_event += 1;
        }
    }

    handle.stop();
    info!(ticks = tick_count, "=== シミュレーション完了 ===");

    Ok(handle.analytics().await)
}

/// スクリプトイベントを投入する
///
/// コマンドの失敗はログに記録して実行を継続します（再試行はしない）。
async fn apply_event(handle: &mut SimulationHandle, event: &ScenarioEvent, scenario: &ScenarioConfig) {
    match &event.action {
        EventAction::Mission { polygon } => match handle.create_mission(polygon.clone()).await {
            Ok(mission) => info!(
                at_s = event.at_s,
                mission_id = %mission.id,
                assigned = mission.assigned_auv_ids.len(),
                "ミッションを投入しました"
            ),
            Err(e) => warn!(at_s = event.at_s, error = %e, "ミッションの投入に失敗しました"),
        },
        EventAction::Waypoint { auv_id, point } => match handle.assign_waypoint(auv_id, *point).await {
            Ok(()) => info!(at_s = event.at_s, auv_id = %auv_id, "ウェイポイントを割り当てました"),
            Err(e) => warn!(at_s = event.at_s, error = %e, "ウェイポイントの割り当てに失敗しました"),
        },
        EventAction::Reset { reseed } => {
            handle.reset().await;
            if *reseed {
                handle.initialize(&scenario.fleet()).await;
                handle.start().await;
            }
            info!(at_s = event.at_s, reseed = *reseed, "リセットしました");
        }
    }
}

fn emit_json(snapshot: &SimulationSnapshot) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(snapshot)?);
    Ok(())
}

/// 最終分析値を表示
fn print_report(report: &AnalyticsReport) {
    println!("=== 分析結果 ===");
    println!("総AUV数: {}機", report.total_agents);
    println!("航行中: {}機 / 待機中: {}機", report.active_agents, report.idle_agents);
    println!("目標到達: {}機", report.agents_reached_goal);
    println!("到達ウェイポイント総数: {}", report.total_waypoints_completed);
    println!("衝突回避総数: {}", report.total_collisions_avoided);
    println!("ウェイポイントあたり平均時間: {:.1}秒", report.average_time_per_waypoint_seconds);
    println!("稼働時間: {}秒", report.simulation_uptime_seconds);
    println!("ミッション数: {}", report.active_missions);
}

/// デフォルトヘルプとシナリオ一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  auvsim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>   シナリオファイルを指定して実行");
    println!("  -i, --info              シナリオ情報のみ表示");
    println!("  -j, --json              スナップショットをJSON Linesで出力");
    println!("  -v, --verbose           詳細出力 (複数指定で詳細レベル上昇)");
    println!("      --log-level <LEVEL> ログレベルを指定");
    println!("      --log-output <TARGET> ログ出力先 (console, file, both)");
    println!("  -h, --help              このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/scenario_default.yaml  - 標準シナリオ（25機、ミッション投入あり）");
    println!("  scenarios/scenario_crowded.yaml  - 過密海域での回避動作確認用");
    println!();
    println!("例:");
    println!("  auvsim -s scenarios/scenario_default.yaml");
    println!("  auvsim -s scenarios/scenario_default.yaml -v");
    println!("  auvsim -s scenarios/scenario_crowded.yaml -j > snapshots.jsonl");
}
