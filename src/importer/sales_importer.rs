// ==========================================
// 需求计划协商系统 - 销量历史导入器
// ==========================================
// 职责: 原始行记录 -> SalesRecord (字段映射 + 数据质量校验)
// 红线: 行级数据问题只丢弃该行并记录告警, 不中断导入
//       缺少必需列属于文件级错误
// ==========================================

use crate::domain::sales::SalesRecord;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{RawRecord, UniversalFileParser};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

// ===== 列名 =====
pub const COL_DATE: &str = "Date";
pub const COL_SKU: &str = "SKU";
pub const COL_SALES: &str = "Sales";
pub const COL_PROMO_FLAG: &str = "Promo_Flag";
pub const COL_MARKETING_SPEND: &str = "Marketing_Spend";

const REQUIRED_COLUMNS: [&str; 3] = [COL_DATE, COL_SKU, COL_SALES];

// ==========================================
// SalesImportResult - 导入结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct SalesImportResult {
    pub records: Vec<SalesRecord>,
    pub warnings: Vec<String>, // 被丢弃行的 DQ 告警
}

// ==========================================
// SalesImporter
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct SalesImporter;

impl SalesImporter {
    pub fn new() -> Self {
        Self
    }

    /// 从文件导入 (.csv / .xlsx / .xls)
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ImportResult<SalesImportResult> {
        let path = path.as_ref();
        let (headers, raw_records) = UniversalFileParser.parse(path)?;
        let result = self.map_records(&headers, raw_records)?;

        info!(
            path = %path.display(),
            records = result.records.len(),
            dropped = result.warnings.len(),
            "销量历史导入完成"
        );
        Ok(result)
    }

    /// 字段映射 + 行级校验
    pub fn map_records(
        &self,
        headers: &[String],
        raw_records: Vec<RawRecord>,
    ) -> ImportResult<SalesImportResult> {
        for column in REQUIRED_COLUMNS {
            if !headers.iter().any(|h| h == column) {
                return Err(ImportError::MissingColumn(column.to_string()));
            }
        }

        let mut result = SalesImportResult::default();
        let mut seen: HashSet<(String, NaiveDate)> = HashSet::new();

        for (idx, raw) in raw_records.into_iter().enumerate() {
            // 表头占第 1 行
            let row = idx + 2;
            match self.map_row(row, &raw) {
                Ok(record) => {
                    let key = (record.sku.clone(), record.date);
                    if !seen.insert(key) {
                        let err = ImportError::DuplicateKey {
                            row,
                            sku: record.sku.clone(),
                            date: record.date.to_string(),
                        };
                        warn!(error = %err, "丢弃重复记录");
                        result.warnings.push(err.to_string());
                        continue;
                    }
                    result.records.push(record);
                }
                Err(err) => {
                    warn!(error = %err, "丢弃数据质量不合格的行");
                    result.warnings.push(err.to_string());
                }
            }
        }

        Ok(result)
    }

    fn map_row(&self, row: usize, raw: &RawRecord) -> ImportResult<SalesRecord> {
        let sku = raw.get(COL_SKU).map(|s| s.trim()).unwrap_or("");
        if sku.is_empty() {
            return Err(ImportError::PrimaryKeyMissing(row));
        }

        let date_raw = raw.get(COL_DATE).map(|s| s.as_str()).unwrap_or("");
        let date = parse_date(date_raw).ok_or_else(|| ImportError::DateFormatError {
            row,
            value: date_raw.to_string(),
        })?;

        let sales = parse_number(row, COL_SALES, raw.get(COL_SALES))?.ok_or_else(|| {
            ImportError::TypeConversionError {
                row,
                field: COL_SALES.to_string(),
                message: "销量为空".to_string(),
            }
        })?;
        if !sales.is_finite() || sales < 0.0 {
            return Err(ImportError::ValueRangeError {
                row,
                field: COL_SALES.to_string(),
                value: sales,
                min: 0.0,
                max: f64::MAX,
            });
        }

        let promo_flag = match parse_number(row, COL_PROMO_FLAG, raw.get(COL_PROMO_FLAG))? {
            Some(v) if v != 0.0 => 1,
            _ => 0,
        };
        let marketing_spend =
            parse_number(row, COL_MARKETING_SPEND, raw.get(COL_MARKETING_SPEND))?.unwrap_or(0.0);

        Ok(SalesRecord {
            date,
            sku: sku.to_string(),
            sales,
            promo_flag,
            marketing_spend,
        })
    }
}

/// 解析日期: YYYY-MM-DD / YYYYMMDD / YYYY-MM-DD HH:MM:SS / YYYY-MM-DDTHH:MM:SS
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let v = value.trim();
    NaiveDate::parse_from_str(v, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(v, "%Y%m%d"))
        .or_else(|_| NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S").map(|dt| dt.date()))
        .or_else(|_| NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .ok()
}

/// 解析可选数值列（空值 -> None）
fn parse_number(row: usize, field: &str, value: Option<&String>) -> ImportResult<Option<f64>> {
    let v = match value.map(|s| s.trim()) {
        Some(v) if !v.is_empty() => v,
        _ => return Ok(None),
    };

    match v.to_lowercase().as_str() {
        "true" | "yes" | "y" => return Ok(Some(1.0)),
        "false" | "no" | "n" => return Ok(Some(0.0)),
        _ => {}
    }

    v.parse::<f64>()
        .map(Some)
        .map_err(|e| ImportError::TypeConversionError {
            row,
            field: field.to_string(),
            message: e.to_string(),
        })
}
