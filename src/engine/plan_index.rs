// ==========================================
// 需求计划协商系统 - 计划行索引
// ==========================================
// 职责: (SKU, Date) -> 行号 的显式索引, 替代按条件整表扫描
// 说明: 按 SKU 的周序列与按周的 SKU 集合均有序, 供情景层与协商器使用
// ==========================================

use crate::domain::plan::{FinalPlanRow, ScenarioRow};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};

/// 可按 (SKU, Date) 定位的计划行
pub trait PlanKey {
    fn plan_sku(&self) -> &str;
    fn plan_date(&self) -> NaiveDate;
}

impl PlanKey for ScenarioRow {
    fn plan_sku(&self) -> &str {
        &self.sku
    }

    fn plan_date(&self) -> NaiveDate {
        self.date
    }
}

impl PlanKey for FinalPlanRow {
    fn plan_sku(&self) -> &str {
        &self.sku
    }

    fn plan_date(&self) -> NaiveDate {
        self.date
    }
}

/// 去除重复的 (SKU, Date) 行, 保留先出现的一行; 返回去除的行数
///
/// 行集合在建索引前去重, 保证每一行都能被索引覆盖
pub fn dedup_plan_rows<R: PlanKey>(rows: &mut Vec<R>) -> usize {
    let before = rows.len();
    let mut seen: HashSet<(String, NaiveDate)> = HashSet::with_capacity(before);
    rows.retain(|row| seen.insert((row.plan_sku().to_string(), row.plan_date())));
    before - rows.len()
}

// ==========================================
// PlanIndex
// ==========================================
// 红线: 索引建立后行集合不得增删, 只允许修改行内数值
#[derive(Debug, Clone, Default)]
pub struct PlanIndex {
    by_key: HashMap<(String, NaiveDate), usize>,
    by_sku: BTreeMap<String, Vec<(NaiveDate, usize)>>,
    by_date: BTreeMap<NaiveDate, Vec<usize>>,
    duplicates: usize,
}

impl PlanIndex {
    /// 建立索引; 重复的 (SKU, Date) 只保留首行
    pub fn build<R: PlanKey>(rows: &[R]) -> Self {
        let mut index = PlanIndex::default();

        for (row_idx, row) in rows.iter().enumerate() {
            let key = (row.plan_sku().to_string(), row.plan_date());
            if index.by_key.contains_key(&key) {
                index.duplicates += 1;
                continue;
            }
            index.by_key.insert(key, row_idx);
            index
                .by_sku
                .entry(row.plan_sku().to_string())
                .or_default()
                .push((row.plan_date(), row_idx));
            index.by_date.entry(row.plan_date()).or_default().push(row_idx);
        }

        for weeks in index.by_sku.values_mut() {
            weeks.sort_by_key(|(date, _)| *date);
        }

        index
    }

    pub fn get(&self, sku: &str, date: NaiveDate) -> Option<usize> {
        self.by_key.get(&(sku.to_string(), date)).copied()
    }

    /// 该 SKU 按日期排序后的第 offset 行（从 0 开始）
    pub fn nth_week(&self, sku: &str, offset: usize) -> Option<usize> {
        self.by_sku
            .get(sku)
            .and_then(|weeks| weeks.get(offset))
            .map(|(_, idx)| *idx)
    }

    pub fn week_count(&self, sku: &str) -> usize {
        self.by_sku.get(sku).map(|weeks| weeks.len()).unwrap_or(0)
    }

    pub fn first_date(&self, sku: &str) -> Option<NaiveDate> {
        self.by_sku
            .get(sku)
            .and_then(|weeks| weeks.first())
            .map(|(date, _)| *date)
    }

    pub fn contains_sku(&self, sku: &str) -> bool {
        self.by_sku.contains_key(sku)
    }

    /// 全部周（升序）及每周的行号
    pub fn weeks(&self) -> impl Iterator<Item = (NaiveDate, &[usize])> {
        self.by_date.iter().map(|(date, rows)| (*date, rows.as_slice()))
    }

    /// 指定周的行号; 无此周返回空切片
    pub fn week_rows(&self, date: NaiveDate) -> &[usize] {
        self.by_date.get(&date).map(|rows| rows.as_slice()).unwrap_or(&[])
    }

    pub fn sku_count(&self) -> usize {
        self.by_sku.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates
    }
}
