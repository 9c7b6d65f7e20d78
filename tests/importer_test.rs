// ==========================================
// 销量导入集成测试
// ==========================================
// 测试目标: 从 CSV 文件导入销量历史
// 覆盖范围: 列映射、日期格式、数据质量告警、文件级错误
// ==========================================


use demand_planning::importer::{ImportError, SalesImporter};
use std::io::Write;
use tempfile::TempDir;
use test_helpers::{demo_records, write_sales_csv};

fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
fn test_roundtrip_demo_csv() {
    let dir = TempDir::new().unwrap();
    let records = demo_records();
    let path = write_sales_csv(dir.path(), &records);

    let result = SalesImporter::new().load(&path).unwrap();
    assert!(result.warnings.is_empty());
    assert_eq!(result.records, records);
}

#[test]
fn test_optional_columns_and_date_formats() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "sales.csv",
        "Date,SKU,Sales\n\
         2024-01-01,SKU_001,10\n\
         20240108,SKU_001,12\n\
         2024-01-15 00:00:00,SKU_001,11\n",
    );

    let result = SalesImporter::new().load(&path).unwrap();
    assert_eq!(result.records.len(), 3);
    assert!(result.records.iter().all(|r| r.promo_flag == 0));
    assert!(result.records.iter().all(|r| r.marketing_spend == 0.0));
    assert_eq!(result.records[1].date.to_string(), "2024-01-08");
}

#[test]
fn test_bad_rows_are_dropped_with_warnings() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "sales.csv",
        "Date,SKU,Sales,Promo_Flag,Marketing_Spend\n\
         2024-01-01,SKU_001,10,0,0\n\
         not-a-date,SKU_001,12,0,0\n\
         2024-01-08,,12,0,0\n\
         2024-01-08,SKU_001,-5,0,0\n\
         2024-01-08,SKU_001,abc,0,0\n\
         2024-01-01,SKU_001,99,1,0\n\
         2024-01-15,SKU_002,7,1,150.5\n",
    );

    let result = SalesImporter::new().load(&path).unwrap();
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.warnings.len(), 5);

    let sku2 = &result.records[1];
    assert_eq!(sku2.promo_flag, 1);
    assert_eq!(sku2.marketing_spend, 150.5);
}

#[test]
fn test_missing_required_column_is_file_error() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "sales.csv", "Date,SKU\n2024-01-01,SKU_001\n");

    let err = SalesImporter::new().load(&path).unwrap_err();
    assert!(matches!(err, ImportError::MissingColumn(ref c) if c == "Sales"));
}

#[test]
fn test_unsupported_and_missing_files() {
    let dir = TempDir::new().unwrap();
    let txt = write_file(&dir, "sales.txt", "Date,SKU,Sales\n");

    assert!(matches!(
        SalesImporter::new().load(&txt),
        Err(ImportError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        SalesImporter::new().load(dir.path().join("nope.csv")),
        Err(ImportError::FileNotFound(_))
    ));
}
