// ==========================================
// 需求计划协商系统 - 描述统计
// ==========================================
// 职责: 各阶段共用的均值 / 标准差
// 说明: 清洗与分群用样本标准差 (n-1), 基线残差用总体标准差 (n)
// ==========================================

/// 算术平均; 空序列返回 0
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// 样本标准差 (n-1); 少于 2 个观测时无定义
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    Some((sum_sq_dev(values) / (n - 1) as f64).sqrt())
}

/// 总体标准差 (n); 空序列返回 0
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (sum_sq_dev(values) / values.len() as f64).sqrt()
}

fn sum_sq_dev(values: &[f64]) -> f64 {
    let center = mean(values);
    values.iter().map(|v| (v - center).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_and_population_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert!((population_std(&values) - 2.0).abs() < 1e-12);
        assert!((sample_std(&values).unwrap() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(population_std(&[]), 0.0);
        assert_eq!(sample_std(&[3.0]), None);
        assert_eq!(sample_std(&[3.0, 3.0]), Some(0.0));
    }
}
