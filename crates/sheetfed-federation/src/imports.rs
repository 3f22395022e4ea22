//! 跨表引用的异步解析。
//!
//! 公式引擎本身是纯函数：先由 [`FormulaEngine::imports`] 列出引用，调用方通过
//! [`ImportResolver`] 逐个取回被引用区间的值，再交给 [`FormulaEngine::evaluate`]。
//! 服务端资源与缓存客户端共用 [`evaluate_sheet`]，两条路径的求值结果因此一致。

use async_trait::async_trait;
use sheetfed_core::{FormulaEngine, Grid, ImportRef, ImportedValues, ServiceResult, Spreadsheet};

#[async_trait]
pub trait ImportResolver: Send + Sync + 'static {
    /// 以 `sheet` 所有者的身份取回 `import` 指向的区间。
    async fn resolve_import(&self, sheet: &Spreadsheet, import: &ImportRef) -> ServiceResult<Grid>;
}

/// 解析全部引用后求值整张表格。
pub async fn evaluate_sheet(
    engine: &dyn FormulaEngine,
    resolver: &dyn ImportResolver,
    sheet: &Spreadsheet,
) -> ServiceResult<Grid> {
    let mut imported = ImportedValues::new();
    for import in engine.imports(sheet)? {
        let values = resolver.resolve_import(sheet, &import).await?;
        imported.insert(import, values);
    }
    Ok(engine.evaluate(sheet, &imported)?)
}
