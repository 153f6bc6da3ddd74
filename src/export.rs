//! 检测结果导出 (Excel)

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook};
use tracing::info;

use crate::detection::Counts;
use crate::error::DetectorError;

pub const SHEET_NAME: &str = "Detection Results";
pub const HEADER: [&str; 2] = ["Detected Object", "Count"];
pub const DEFAULT_EXTENSION: &str = "xlsx";

/// 写出表格, 返回写入的行数 (含表头)
pub fn export_counts(counts: &Counts, path: &Path) -> Result<usize, DetectorError> {
    if counts.is_empty() {
        return Err(DetectorError::NoResults);
    }

    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    sheet.set_column_width(0, 30)?;
    sheet.set_column_width(1, 15)?;
    sheet.write_string_with_format(0, 0, HEADER[0], &header)?;
    sheet.write_string_with_format(0, 1, HEADER[1], &header)?;

    let data = rows(counts);
    for (row, (name, count)) in data.iter().enumerate() {
        let row = row as u32 + 1;
        sheet.write_string(row, 0, name.as_str())?;
        sheet.write_number(row, 1, *count as f64)?;
    }

    workbook.save(path)?;
    let written = data.len() + 1;
    info!("💾 导出 {} 行到 {}", written, path.display());
    Ok(written)
}

/// 数据行 (不含表头), 按类别名排序
pub fn rows(counts: &Counts) -> Vec<(String, usize)> {
    // BTreeMap 已按类别名排序
    counts
        .iter()
        .map(|(name, count)| (name.clone(), *count))
        .collect()
}

/// 缺少扩展名时补上 `.xlsx`
pub fn with_default_extension(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(DEFAULT_EXTENSION)
    }
}
