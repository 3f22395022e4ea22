//! 公式引擎：把表格的原始单元格文本求值为字符串网格。
//!
//! # 教案式说明
//! - **意图 (Why)**：服务端资源与缓存客户端的“从缓存定义重算”路径都依赖同一个纯函数式的
//!   求值过程，保证两条路径得到的网格一致；
//! - **契约 (What)**：
//!   - [`FormulaEngine::imports`] 列出表格引用到的其它表格区间；
//!   - 调用方异步解析这些引用后，以 [`ImportedValues`] 交给 [`FormulaEngine::evaluate`]；
//!   - 求值失败（语法错误、引用环、非数值参与运算、除零）返回 [`EngineError`]，绝不以 0 或
//!     旧值代替；
//! - **执行 (How)**：[`StandardEngine`] 逐格解析、记忆化求值，在途集合检测引用环。

mod eval;
mod parser;

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::cell::{CellRange, Grid};
use crate::error::ServiceError;
use crate::model::Spreadsheet;

/// 指向另一张表格某个区间的引用，写作 `'domain/sheet'!A1:B2`。
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ImportRef {
    pub domain: String,
    pub sheet_id: String,
    pub range: CellRange,
}

impl fmt::Display for ImportRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}/{}'!{}", self.domain, self.sheet_id, self.range)
    }
}

/// 已解析的跨表引用值。
pub type ImportedValues = HashMap<ImportRef, Grid>;

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum EngineError {
    #[error("cannot parse formula in {cell}: {detail}")]
    Parse { cell: String, detail: String },
    #[error("reference cycle through {cell}")]
    Cycle { cell: String },
    #[error("{cell}: `{value}` is not a number")]
    NotANumber { cell: String, value: String },
    #[error("{cell}: division by zero")]
    DivisionByZero { cell: String },
    #[error("{cell}: reference {reference} is outside the sheet")]
    OutOfBounds { cell: String, reference: String },
    #[error("invalid dimensions {rows}x{columns}")]
    InvalidDimensions { rows: usize, columns: usize },
    #[error("import {reference} was not resolved")]
    MissingImport { reference: String },
}

impl From<EngineError> for ServiceError {
    fn from(value: EngineError) -> Self {
        ServiceError::internal(value.to_string())
    }
}

pub trait FormulaEngine: Send + Sync + 'static {
    /// 列出表格中的跨表引用（去重，按首次出现排序）。公式无法解析时直接失败。
    fn imports(&self, sheet: &Spreadsheet) -> Result<Vec<ImportRef>, EngineError>;

    /// 在给定的跨表引用值之上求值整张表格，返回 `rows × columns` 网格。
    fn evaluate(&self, sheet: &Spreadsheet, imported: &ImportedValues) -> Result<Grid, EngineError>;
}

/// 默认引擎：四则运算、`SUM`/`AVG`/`MIN`/`MAX`、本表引用与跨表引用。
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardEngine;

impl FormulaEngine for StandardEngine {
    fn imports(&self, sheet: &Spreadsheet) -> Result<Vec<ImportRef>, EngineError> {
        let mut imports = Vec::new();
        for (cell, raw) in &sheet.cells {
            if let Some(body) = raw.strip_prefix('=') {
                let expr = parser::parse_formula(body).map_err(|detail| EngineError::Parse {
                    cell: cell.to_string(),
                    detail,
                })?;
                expr.collect_imports(&mut imports);
            }
        }
        Ok(imports)
    }

    fn evaluate(&self, sheet: &Spreadsheet, imported: &ImportedValues) -> Result<Grid, EngineError> {
        if !sheet.has_valid_dimensions() {
            return Err(EngineError::InvalidDimensions {
                rows: sheet.rows,
                columns: sheet.columns,
            });
        }
        eval::Evaluation::new(sheet, imported).grid()
    }
}
