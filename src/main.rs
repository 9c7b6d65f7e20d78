// ==========================================
// 需求计划协商系统 - 命令行入口
// ==========================================
// 用法: demand-planning [sales_path] [output_dir] [policy_json]
// 说明: 建议层关闭, 全部阶段走确定性决策
//       退出码 0 = 产出非空计划; 2 = 计划为空
// ==========================================

use anyhow::Context;
use demand_planning::advisory::AdvisoryClient;
use demand_planning::config::PipelineConfig;
use demand_planning::engine::PipelineOrchestrator;
use demand_planning::repository::InteractionStore;
use demand_planning::{logging, APP_NAME, VERSION};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// 配置文件环境变量（可选）
const CONFIG_ENV: &str = "DEMAND_PLANNING_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} v{}", APP_NAME, VERSION);
    tracing::info!("==================================================");

    // 1. 运行参数: 配置文件 -> 环境变量 -> 命令行参数
    let mut config = match std::env::var(CONFIG_ENV) {
        Ok(path) => PipelineConfig::from_json_file(&path)
            .with_context(|| format!("读取运行参数失败: {}", path))?,
        Err(_) => PipelineConfig::default(),
    };
    config.apply_env_overrides();

    let mut args = std::env::args().skip(1);
    if let Some(sales_path) = args.next() {
        config.sales_path = PathBuf::from(sales_path);
    }
    if let Some(output_dir) = args.next() {
        config.output_dir = PathBuf::from(output_dir);
    }
    if let Some(policy_path) = args.next() {
        config.policy_path = Some(PathBuf::from(policy_path));
    }

    // 2. 建议层关闭; 可选交互记录库
    let mut advisory = AdvisoryClient::disabled();
    if let Some(db_path) = &config.interaction_db_path {
        let store = InteractionStore::open(&db_path.to_string_lossy())
            .with_context(|| format!("打开交互记录库失败: {}", db_path.display()))?;
        advisory = advisory.with_store(Arc::new(store));
    }

    // 3. 运行完整周期
    let orchestrator = PipelineOrchestrator::new(config, advisory);
    let result = orchestrator.run().await;

    for line in &result.logs {
        println!("{}", line);
    }

    println!();
    println!("=== Metrics ===");
    println!(
        "{}",
        serde_json::to_string_pretty(&result.report.metrics).context("序列化指标失败")?
    );

    println!();
    println!("=== Explanations ===");
    for line in &result.report.explanations {
        println!("- {}", line);
    }

    println!();
    println!("=== Learnings ===");
    for line in &result.report.learnings {
        println!("- {}", line);
    }

    if let Some(path) = &result.final_plan_path {
        println!();
        println!("Final plan: {}", path.display());
    }

    if result.is_empty() {
        tracing::warn!("最终计划为空");
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
