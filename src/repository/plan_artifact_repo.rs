// ==========================================
// 需求计划协商系统 - 计划产物仓储
// ==========================================
// 职责: final_plan.csv / segmentation.csv 的写入与回读
// 红线: Repository 不做业务逻辑, 只做数据映射
// ==========================================
// 说明: 产物供下游（问答/看板）直接读取, 不需要重跑流水线

use crate::domain::plan::FinalPlanRow;
use crate::domain::playbook::Playbook;
use crate::domain::types::Segment;
use crate::repository::error::{RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FINAL_PLAN_FILE: &str = "final_plan.csv";
pub const SEGMENTATION_FILE: &str = "segmentation.csv";

/// final_plan.csv 表头（空计划时也要写出）
pub const FINAL_PLAN_COLUMNS: [&str; 10] = [
    "Date",
    "SKU",
    "Baseline_P10",
    "Baseline_P50",
    "Baseline_P90",
    "Plan",
    "Upside",
    "Downside",
    "Constrained_Plan",
    "Negotiation_Log",
];

const SEGMENTATION_COLUMNS: [&str; 2] = ["SKU", "Segment"];

/// segmentation.csv 行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SegmentRow {
    #[serde(rename = "SKU")]
    sku: String,
    #[serde(rename = "Segment")]
    segment: Segment,
}

// ==========================================
// PlanArtifactRepository
// ==========================================
pub struct PlanArtifactRepository {
    output_dir: PathBuf,
}

impl PlanArtifactRepository {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn final_plan_path(&self) -> PathBuf {
        self.output_dir.join(FINAL_PLAN_FILE)
    }

    pub fn segmentation_path(&self) -> PathBuf {
        self.output_dir.join(SEGMENTATION_FILE)
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 写出最终计划（按传入顺序, 覆盖旧文件）
    pub fn save_final_plan(&self, rows: &[FinalPlanRow]) -> RepositoryResult<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.final_plan_path();

        let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(&path)?;
        if rows.is_empty() {
            wtr.write_record(FINAL_PLAN_COLUMNS)?;
        }
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;

        debug!(path = %path.display(), rows = rows.len(), "最终计划已写出");
        Ok(path)
    }

    /// 写出 SKU -> Segment 映射（按 SKU 升序）
    pub fn save_segmentation(&self, playbooks: &BTreeMap<String, Playbook>) -> RepositoryResult<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.segmentation_path();

        let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(&path)?;
        if playbooks.is_empty() {
            wtr.write_record(SEGMENTATION_COLUMNS)?;
        }
        for (sku, playbook) in playbooks {
            wtr.serialize(SegmentRow {
                sku: sku.clone(),
                segment: playbook.segment,
            })?;
        }
        wtr.flush()?;

        debug!(path = %path.display(), skus = playbooks.len(), "分群映射已写出");
        Ok(path)
    }

    // ==========================================
    // 读取操作
    // ==========================================

    /// 回读最终计划
    pub fn load_final_plan(&self) -> RepositoryResult<Vec<FinalPlanRow>> {
        let path = self.final_plan_path();
        let mut rdr = self.open_reader(&path)?;

        let mut rows = Vec::new();
        for record in rdr.deserialize::<FinalPlanRow>() {
            rows.push(record?);
        }
        Ok(rows)
    }

    /// 回读 SKU -> Segment 映射
    pub fn load_segmentation(&self) -> RepositoryResult<BTreeMap<String, Segment>> {
        let path = self.segmentation_path();
        let mut rdr = self.open_reader(&path)?;

        let mut mapping = BTreeMap::new();
        for record in rdr.deserialize::<SegmentRow>() {
            let row = record?;
            if mapping.insert(row.sku.clone(), row.segment).is_some() {
                return Err(RepositoryError::FieldValueError {
                    field: "SKU".to_string(),
                    message: format!("分群映射中 SKU 重复: {}", row.sku),
                });
            }
        }
        Ok(mapping)
    }

    fn open_reader(&self, path: &Path) -> RepositoryResult<csv::Reader<fs::File>> {
        if !path.exists() {
            return Err(RepositoryError::ArtifactNotFound(path.display().to_string()));
        }
        Ok(csv::ReaderBuilder::new().has_headers(true).from_path(path)?)
    }
}
