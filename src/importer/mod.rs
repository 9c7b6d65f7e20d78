// ==========================================
// 需求计划协商系统 - 导入层
// ==========================================
// 职责: 外部销量历史导入, 生成 SalesRecord
// 支持: Excel, CSV
// ==========================================

pub mod error;
pub mod file_parser;
pub mod sales_importer;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRecord, UniversalFileParser};
pub use sales_importer::{SalesImportResult, SalesImporter};
