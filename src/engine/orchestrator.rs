// ==========================================
// 需求计划协商系统 - 流水线编排器
// ==========================================
// 职责: 按固定顺序串联 策略 -> 导入 -> 清洗 -> 分群 -> 基线 -> 情景 -> 协商 -> 落盘 -> 报告
// 红线: 每个阶段隔离执行, 错误或 panic 只让该阶段退化为空输出
//       流水线总能结束并产出 FinalPlan（可能为空）
// ==========================================
// 说明: 阶段严格串行, PolicyContext 注入后只读
//       运行日志按发生顺序记录阶段起止与全部阶段说明
// ==========================================

use crate::advisory::{collect_actions, AdvisedStage, AdvisoryClient};
use crate::config::{JsonFilePolicySource, PipelineConfig, PolicyLoader, PolicySource};
use crate::domain::plan::FinalPlanRow;
use crate::domain::policy::PolicyContext;
use crate::domain::sales::{AnomalyFlag, SalesRecord};
use crate::domain::types::Segment;
use crate::engine::baseline::BaselineForecaster;
use crate::engine::cleaner::Cleaner;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::negotiator::{over_capacity_weeks, Negotiator, WeekNegotiation};
use crate::engine::reporter::{CycleReport, ReportInputs, Reporter};
use crate::engine::scenario::{ScenarioLayer, ScenarioSettings};
use crate::engine::segmenter::{compute_metrics, SegmentationOutput, Segmenter};
use crate::importer::SalesImporter;
use crate::repository::PlanArtifactRepository;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

// ==========================================
// PipelineRunResult - 一次运行的完整结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct PipelineRunResult {
    /// 最终计划, 按 (SKU, Date) 排序
    pub final_plan: Vec<FinalPlanRow>,
    /// SKU -> Segment
    pub segments: BTreeMap<String, Segment>,
    pub report: CycleReport,
    /// 有序运行日志
    pub logs: Vec<String>,
    /// 按 SKU 的预测失败说明
    pub diagnostics: Vec<String>,
    pub anomalies: Vec<AnomalyFlag>,
    pub policy: PolicyContext,
    pub weeks: Vec<WeekNegotiation>,
    /// 实际写出的最终计划文件; 未落盘时为 None
    pub final_plan_path: Option<PathBuf>,
}

impl PipelineRunResult {
    pub fn is_empty(&self) -> bool {
        self.final_plan.is_empty()
    }
}

// ==========================================
// PipelineOrchestrator
// ==========================================
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    policy_loader: PolicyLoader,
    advisory: AdvisoryClient,
    artifacts: Option<PlanArtifactRepository>,
    cleaner: Cleaner,
    segmenter: Segmenter,
    baseline: BaselineForecaster,
    scenario: ScenarioLayer,
    negotiator: Negotiator,
    reporter: Reporter,
}

impl PipelineOrchestrator {
    /// 创建编排器
    ///
    /// 配置了 policy_path 时从 JSON 文件读取策略, 否则只用内置默认值
    pub fn new(config: PipelineConfig, advisory: AdvisoryClient) -> Self {
        let policy_loader = match &config.policy_path {
            Some(path) => {
                let source: Arc<dyn PolicySource> = Arc::new(JsonFilePolicySource::new(path));
                PolicyLoader::new(Some(source), config.policy_timeout())
            }
            None => PolicyLoader::defaults_only(),
        };

        Self {
            artifacts: Some(PlanArtifactRepository::new(&config.output_dir)),
            cleaner: Cleaner::new(config.anomaly_z_threshold, config.clip_sigma),
            segmenter: Segmenter::new(),
            baseline: BaselineForecaster::new(config.horizon_weeks),
            scenario: ScenarioLayer::new(ScenarioSettings {
                upside_scale: config.upside_scale,
                downside_scale: config.downside_scale,
            }),
            negotiator: Negotiator::new(config.residual_shortage_policy),
            reporter: Reporter::new(),
            policy_loader,
            advisory,
            config,
        }
    }

    /// 替换策略加载器（例如接入 ConfigManager）
    pub fn with_policy_loader(mut self, policy_loader: PolicyLoader) -> Self {
        self.policy_loader = policy_loader;
        self
    }

    /// 不写出任何产物
    pub fn without_persistence(mut self) -> Self {
        self.artifacts = None;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ==========================================
    // 入口
    // ==========================================

    /// 按配置的销量文件运行完整周期
    pub async fn run(&self) -> PipelineRunResult {
        self.run_from_path(&self.config.sales_path).await
    }

    /// 从指定销量文件运行完整周期
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn run_from_path(&self, path: &Path) -> PipelineRunResult {
        let mut logs = Vec::new();
        let policy = self.load_policy(&mut logs).await;

        let import = self
            .run_stage(2, "Loading Sales Data", &mut logs, async {
                SalesImporter::new().load(path).map_err(EngineError::from)
            })
            .await;
        logs.extend(import.warnings.iter().map(|w| format!("[Importer] {}", w)));

        self.execute(policy, import.records, logs).await
    }

    /// 使用已在内存中的销量记录运行完整周期
    pub async fn run_with_records(&self, records: Vec<SalesRecord>) -> PipelineRunResult {
        let mut logs = Vec::new();
        let policy = self.load_policy(&mut logs).await;
        logs.push(format!(
            "[Orchestrator] Step 2: Using {} supplied sales records",
            records.len()
        ));
        self.execute(policy, records, logs).await
    }

    // ==========================================
    // 步骤1: 策略加载
    // ==========================================
    async fn load_policy(&self, logs: &mut Vec<String>) -> PolicyContext {
        debug!("步骤1: 加载策略上下文");
        logs.push("[Orchestrator] Step 1: Loading Policy Context".to_string());

        let outcome = self.policy_loader.load().await;
        logs.extend(outcome.notes.iter().map(|n| format!("[Policy] {}", n)));
        logs.push("[Orchestrator] Policy Context Loaded".to_string());
        outcome.context
    }

    async fn execute(
        &self,
        policy: PolicyContext,
        records: Vec<SalesRecord>,
        mut logs: Vec<String>,
    ) -> PipelineRunResult {
        info!(
            records = records.len(),
            capacity_limit = policy.constraints.capacity_limit_total,
            advisory_enabled = self.advisory.is_enabled(),
            "开始执行计划周期"
        );

        // ==========================================
        // 步骤3: 清洗
        // ==========================================
        debug!("步骤3: 数据清洗");
        let cleaning = self
            .run_stage(3, "Cleaning Data", &mut logs, async {
                let (actions, mut notes) = self
                    .advise::<Cleaner>(Cleaner::prompt(&records))
                    .await;
                let mut output = self.cleaner.apply(&records, &actions);
                notes.append(&mut output.notes);
                output.notes = notes;
                Ok(output)
            })
            .await;
        logs.extend(cleaning.notes.iter().cloned());

        // ==========================================
        // 步骤4: 分群
        // ==========================================
        debug!("步骤4: SKU 分群");
        let segmentation = self
            .run_stage(4, "Segmentation", &mut logs, async {
                let prompt = Segmenter::prompt(&compute_metrics(&cleaning.records));
                let (actions, mut notes) = self.advise::<Segmenter>(prompt).await;
                let mut output = self.segmenter.apply(&cleaning.records, &policy, &actions);
                notes.append(&mut output.notes);
                output.notes = notes;
                Ok(output)
            })
            .await;
        logs.extend(segmentation.notes.iter().cloned());

        // ==========================================
        // 步骤5: 基线预测
        // ==========================================
        debug!("步骤5: 基线预测");
        let baseline = self
            .run_stage(5, "Baseline Forecasting", &mut logs, async {
                let prompt = self.baseline.prompt(&segmentation.playbooks);
                let (actions, mut notes) = self.advise::<BaselineForecaster>(prompt).await;
                let mut output =
                    self.baseline
                        .apply(&cleaning.records, &segmentation.playbooks, &actions);
                notes.append(&mut output.notes);
                output.notes = notes;
                Ok(output)
            })
            .await;
        logs.extend(baseline.notes.iter().cloned());

        // ==========================================
        // 步骤6: 情景
        // ==========================================
        debug!("步骤6: 情景生成");
        let scenario = self
            .run_stage(6, "Scenario Planning", &mut logs, async {
                let (actions, mut notes) = self
                    .advise::<ScenarioLayer>(ScenarioLayer::prompt(&policy))
                    .await;
                let mut output = self.scenario.apply(&baseline.forecasts, &policy, &actions);
                notes.append(&mut output.notes);
                output.notes = notes;
                Ok(output)
            })
            .await;
        logs.extend(scenario.notes.iter().cloned());

        // ==========================================
        // 步骤7: 产能协商
        // ==========================================
        debug!("步骤7: 产能协商");
        let negotiation = self
            .run_stage(7, "Negotiation", &mut logs, async {
                let weeks_over =
                    over_capacity_weeks(&scenario.rows, policy.constraints.capacity_limit_total);
                let (actions, mut notes) = self
                    .advise::<Negotiator>(Negotiator::prompt(&policy, &weeks_over))
                    .await;
                let mut output = self.negotiator.apply(&scenario.rows, &policy, &actions);
                notes.append(&mut output.notes);
                output.notes = notes;
                Ok(output)
            })
            .await;
        logs.extend(negotiation.notes.iter().cloned());

        // ==========================================
        // 步骤8: 落盘
        // ==========================================
        debug!("步骤8: 写出产物");
        let final_plan_path = self.persist(&negotiation.rows, &segmentation, &mut logs);

        // ==========================================
        // 步骤9: 报告
        // ==========================================
        debug!("步骤9: 周期报告");
        let report = self
            .run_stage(9, "Monitoring & Reporting", &mut logs, async {
                let inputs = ReportInputs {
                    final_plan: &negotiation.rows,
                    weeks: &negotiation.weeks,
                    capped_uplifts: scenario.capped_count(),
                    forecast_failures: baseline.diagnostics.len(),
                };
                let summary = if self.advisory.is_enabled() {
                    let prompt = Reporter::prompt(&self.reporter.metrics(&inputs));
                    self.advisory
                        .consult(Reporter::request(prompt))
                        .await
                        .summary()
                        .map(str::to_string)
                } else {
                    None
                };
                Ok(self.reporter.report(&inputs, summary.as_deref()))
            })
            .await;

        info!(
            rows = negotiation.rows.len(),
            sku_count = segmentation.playbooks.len(),
            log_lines = logs.len(),
            "计划周期完成"
        );

        PipelineRunResult {
            segments: segmentation.segments(),
            final_plan: negotiation.rows,
            report,
            logs,
            diagnostics: baseline.diagnostics,
            anomalies: cleaning.anomalies,
            policy,
            weeks: negotiation.weeks,
            final_plan_path,
        }
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    /// 隔离执行单个阶段; Err 或 panic 时返回空输出
    async fn run_stage<T, F>(&self, step: usize, name: &str, logs: &mut Vec<String>, stage: F) -> T
    where
        T: Default,
        F: Future<Output = EngineResult<T>>,
    {
        logs.push(format!("[Orchestrator] Step {}: {}", step, name));

        match AssertUnwindSafe(stage).catch_unwind().await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                error!(step, stage = name, error = %err, "阶段执行失败, 使用空输出");
                logs.push(format!("[Orchestrator] Step {} failed: {}", step, err));
                T::default()
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(step, stage = name, panic = %message, "阶段 panic, 使用空输出");
                logs.push(format!("[Orchestrator] Step {} panicked: {}", step, message));
                T::default()
            }
        }
    }

    /// 咨询建议层并解析为本阶段动作; 未启用时直接返回空
    async fn advise<S: AdvisedStage>(&self, prompt: String) -> (Vec<S::Action>, Vec<String>) {
        if !self.advisory.is_enabled() {
            return (Vec::new(), Vec::new());
        }

        let consultation = self.advisory.consult(S::request(prompt)).await;
        let mut notes = consultation.notes;
        let actions = collect_actions::<S>(consultation.response.as_ref(), &mut notes);
        if consultation.response.is_some() && actions.is_empty() {
            notes.push(format!("[{}] 无可执行建议, 使用确定性决策", S::STAGE));
        }
        (actions, notes)
    }

    /// 写出最终计划与分群结果; 失败只记录, 不中断
    fn persist(
        &self,
        final_plan: &[FinalPlanRow],
        segmentation: &SegmentationOutput,
        logs: &mut Vec<String>,
    ) -> Option<PathBuf> {
        logs.push("[Orchestrator] Step 8: Saving Artifacts".to_string());
        let Some(artifacts) = &self.artifacts else {
            logs.push("[Orchestrator] Persistence disabled".to_string());
            return None;
        };

        if let Err(e) = artifacts.save_segmentation(&segmentation.playbooks) {
            error!(error = %e, "分群结果写出失败");
            logs.push(format!("[Orchestrator] Error saving segmentation: {}", e));
        }

        match artifacts.save_final_plan(final_plan) {
            Ok(path) => {
                logs.push("[Orchestrator] Final Plan Saved to Disk".to_string());
                Some(path)
            }
            Err(e) => {
                error!(error = %e, "最终计划写出失败");
                logs.push(format!("[Orchestrator] Error saving final plan: {}", e));
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
