/// 每日股價報表
pub mod stock_report;
