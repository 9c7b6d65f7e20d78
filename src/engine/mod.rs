// ==========================================
// 需求计划协商系统 - 引擎层
// ==========================================
// 职责: 清洗 / 分群 / 基线 / 情景 / 协商 / 报告 六个阶段 + 编排器
// 红线: Engine 不读写文件, 不拼 SQL; 所有修改计划的规则必须输出 reason
// ==========================================

pub mod baseline;
pub mod cleaner;
pub mod error;
pub mod ets;
pub mod negotiator;
pub mod orchestrator;
pub mod plan_index;
pub mod reporter;
pub mod scenario;
pub mod segmenter;
pub mod stats;

// 重导出核心引擎
pub use baseline::{BaselineAction, BaselineForecaster, BaselineOutput};
pub use cleaner::{Cleaner, CleanerAction, CleaningOutput};
pub use error::{EngineError, EngineResult};
pub use negotiator::{
    CutRecord, NegotiationOutput, NegotiationPlan, Negotiator, NegotiatorAction, WeekNegotiation,
    WeekStatus,
};
pub use orchestrator::{PipelineOrchestrator, PipelineRunResult};
pub use plan_index::{PlanIndex, PlanKey};
pub use reporter::{CycleMetrics, CycleReport, ReportInputs, Reporter};
pub use scenario::{
    ScenarioAction, ScenarioLayer, ScenarioOutput, ScenarioPlan, ScenarioSettings, UpliftOutcome,
};
pub use segmenter::{SegmentationOutput, Segmenter, SegmenterAction};
