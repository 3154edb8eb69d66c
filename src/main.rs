use clap::{Arg, ArgAction, Command};
use rustfra::core::config::{ExtendedCredentials, Settings, TradeXyzCredentials};
use rustfra::exchanges::{ExtendedExchange, TradeXyzExchange};
use rustfra::strategies::funding_arbitrage::TradeManager;
use rustfra::utils::{init_global_notifier, init_logger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载环境变量
    dotenv::dotenv().ok();

    // 解析命令行参数
    let matches = Command::new("rustfra")
        .version("0.1.0")
        .about("双交易所资金费率套利机器人")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("config/config.yaml"),
        )
        .arg(
            Arg::new("single-cycle")
                .long("single-cycle")
                .action(ArgAction::SetTrue)
                .help("只执行一个交易周期"),
        )
        .arg(
            Arg::new("live")
                .long("live")
                .action(ArgAction::SetTrue)
                .help("启用live交易（覆盖配置中的模拟开关）"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("强制模拟模式（默认）"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别: DEBUG, INFO, WARNING, ERROR"),
        )
        .get_matches();

    let config_file = matches.get_one::<String>("config").expect("有默认值");
    let single_cycle = matches.get_flag("single-cycle");

    // 加载配置，文件缺失时用默认值（模拟模式）
    let mut settings = match Settings::from_file(config_file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("配置文件加载失败 ({})，使用默认配置: {}", config_file, e);
            Settings::default()
        }
    };

    // 环境变量与命令行覆盖（命令行优先）
    if let Ok(value) = std::env::var("SIMULATION_MODE") {
        settings.simulation.enabled = value.to_lowercase() != "false";
    }
    if matches.get_flag("live") {
        settings.simulation.enabled = false;
    } else if matches.get_flag("dry-run") {
        settings.simulation.enabled = true;
    }

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .or_else(|| settings.log_level.clone())
        .unwrap_or_else(|| "INFO".to_string());

    init_logger(&log_level)?;
    init_global_notifier(settings.webhook.clone());

    print_banner(settings.simulation.enabled);

    // 加载凭证（live模式拒绝占位值）
    let extended_credentials = ExtendedCredentials::from_env()?;
    let tradexyz_credentials = TradeXyzCredentials::from_env()?;

    if !settings.simulation.enabled {
        extended_credentials.validate_for_live()?;
        tradexyz_credentials.validate_for_live()?;
    }

    // 创建交易所适配器
    let extended = Arc::new(ExtendedExchange::new(
        &settings.extended,
        extended_credentials,
        settings.simulation.enabled,
        settings.execution.requests_per_minute,
    )?);

    let tradexyz = Arc::new(TradeXyzExchange::new(
        &settings.tradexyz,
        tradexyz_credentials,
        settings.simulation.enabled,
        settings.execution.requests_per_minute,
    )?);

    // 创建交易管理器
    let manager = Arc::new(TradeManager::new(extended, tradexyz, settings));

    let exit_code = run_bot(&manager, single_cycle).await;

    std::process::exit(exit_code);
}

/// 运行机器人，返回进程退出码
async fn run_bot(manager: &Arc<TradeManager>, single_cycle: bool) -> i32 {
    if let Err(e) = manager.start().await {
        log::error!("❌ 启动失败: {}", e);
        return 1;
    }

    // 信号处理与独立安全循环
    let safety = manager.safety();
    safety.install_signal_handler();
    tokio::spawn(manager.safety().run_safety_loop());

    let exit_code = if single_cycle {
        log::info!("执行单周期模式");
        let result = manager.run_cycle().await;

        if result.success {
            log::info!(
                "✅ 周期完成: {} token={} 仓位价值=${:.2} 估算收益=${:.4}",
                result.cycle_id,
                result.token,
                result.position_value,
                result.funding_earned
            );
            0
        } else {
            log::error!(
                "❌ 周期失败: {} ({})",
                result.cycle_id,
                result.error_message.as_deref().unwrap_or("unknown")
            );
            1
        }
    } else {
        log::info!("启动连续交易模式");
        manager.run_continuous().await;

        // 紧急停机视为异常退出
        if safety.emergency_triggered() {
            1
        } else {
            0
        }
    };

    if let Err(e) = manager.stop().await {
        log::warn!("⚠️ 停止时出错: {}", e);
    }

    exit_code
}

fn print_banner(simulation: bool) {
    let mode = if simulation { "SIMULATION" } else { "LIVE TRADING" };
    println!();
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║     Delta-Neutral Funding Rate Arbitrage Bot         ║");
    println!("║     Mode: {:<42} ║", mode);
    println!("║     Exchanges: Extended + TradeXYZ                   ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();

    if !simulation {
        println!("⚠️  WARNING: LIVE TRADING MODE - REAL FUNDS AT RISK");
        println!();
    }
}
