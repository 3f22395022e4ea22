use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sheetfed_core::{
    BackgroundTask, CellRange, FormulaEngine, Grid, ServiceResult, Spreadsheet,
    SpreadsheetsService, spawn_periodic,
};
use tracing::debug;

use super::EntityCache;
use crate::imports::{ImportResolver, evaluate_sheet};

tokio::task_local! {
    /// 当前任务中正在从缓存重算的 `(domain, sheet_id)` 序列。
    static RECOMPUTING: Vec<(String, String)>;
}

/// Spreadsheets 服务的缓存旁路客户端。
///
/// # 教案式说明
/// - **意图 (Why)**：表格数值依赖其它表格，缓存派生值会在远端不可达期间返回任意陈旧的结果；
///   因此只缓存定义，回退时用同一个公式引擎现场重算；
/// - **契约 (What)**：
///   - 回退只在远端返回 `Unavailable` 时发生；
///   - 缓存中有定义即重算；没有定义或重算失败时，返回原始的 `Unavailable`；
///   - 区间查询先重算整张表，再截取区间；
/// - **风险 (Trade-offs)**：回退路径不做凭据与共享检查，远端恢复后由其重新把关。
pub struct CachedSpreadsheetsClient {
    domain: String,
    inner: Arc<dyn SpreadsheetsService>,
    cache: Arc<EntityCache<Spreadsheet>>,
    engine: Arc<dyn FormulaEngine>,
    resolver: Arc<dyn ImportResolver>,
}

impl CachedSpreadsheetsClient {
    pub fn new(
        domain: impl Into<String>,
        inner: Arc<dyn SpreadsheetsService>,
        engine: Arc<dyn FormulaEngine>,
        resolver: Arc<dyn ImportResolver>,
    ) -> Self {
        Self {
            domain: domain.into(),
            inner,
            cache: Arc::new(EntityCache::new()),
            engine,
            resolver,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn cached_spreadsheets(&self) -> usize {
        self.cache.len()
    }

    pub async fn refresh(&self) {
        refresh_sheets(&self.domain, self.inner.as_ref(), &self.cache).await;
    }

    pub fn start_refresh(&self, period: Duration) -> BackgroundTask {
        let domain = self.domain.clone();
        let inner = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);
        spawn_periodic(format!("refresh-sheets:{domain}"), period, move || {
            let domain = domain.clone();
            let inner = Arc::clone(&inner);
            let cache = Arc::clone(&cache);
            async move { refresh_sheets(&domain, inner.as_ref(), &cache).await }
        })
    }

    /// 从缓存的定义重算整张表格。
    ///
    /// 重算可能经由引用回到同一张缓存表格；沿当前任务的重算链检测到环时放弃重算。
    async fn recompute(&self, sheet_id: &str) -> Option<Grid> {
        let sheet = self.cache.get(sheet_id)?;
        let key = (self.domain.clone(), sheet.sheet_id.clone());
        let mut chain = RECOMPUTING.try_with(Clone::clone).unwrap_or_default();
        if chain.contains(&key) {
            debug!(domain = %self.domain, sheet_id, "cached sheet imports itself, giving up");
            return None;
        }
        chain.push(key);
        let evaluated = RECOMPUTING
            .scope(
                chain,
                evaluate_sheet(self.engine.as_ref(), self.resolver.as_ref(), &sheet),
            )
            .await;
        match evaluated {
            Ok(grid) => {
                debug!(domain = %self.domain, sheet_id, "recomputed values from cached definition");
                Some(grid)
            }
            Err(err) => {
                debug!(domain = %self.domain, sheet_id, error = %err, "cannot recompute cached sheet");
                None
            }
        }
    }
}

async fn refresh_sheets(
    domain: &str,
    inner: &dyn SpreadsheetsService,
    cache: &EntityCache<Spreadsheet>,
) {
    match inner.list_spreadsheets().await {
        Ok(sheets) => cache.merge(sheets, |sheet| sheet.sheet_id.clone()),
        Err(err) => debug!(domain, error = %err, "spreadsheets cache refresh failed"),
    }
}

fn slice(grid: &Grid, range: &str) -> Option<Grid> {
    let range: CellRange = range.parse().ok()?;
    range.extract(grid).ok()
}

#[async_trait]
impl SpreadsheetsService for CachedSpreadsheetsClient {
    async fn create_spreadsheet(&self, sheet: Spreadsheet, password: &str) -> ServiceResult<String> {
        self.inner.create_spreadsheet(sheet, password).await
    }

    async fn delete_spreadsheet(&self, sheet_id: &str, password: &str) -> ServiceResult<()> {
        self.inner.delete_spreadsheet(sheet_id, password).await
    }

    async fn get_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<Spreadsheet> {
        match self.inner.get_spreadsheet(sheet_id, user_id, password).await {
            Err(err) if err.is_unavailable() => self.cache.get(sheet_id).ok_or(err),
            other => other,
        }
    }

    async fn get_spreadsheet_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<Grid> {
        match self
            .inner
            .get_spreadsheet_values(sheet_id, user_id, password)
            .await
        {
            Err(err) if err.is_unavailable() => self.recompute(sheet_id).await.ok_or(err),
            other => other,
        }
    }

    async fn get_referenced_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        range: &str,
    ) -> ServiceResult<Grid> {
        match self
            .inner
            .get_referenced_values(sheet_id, user_id, range)
            .await
        {
            Err(err) if err.is_unavailable() => {
                let recomputed = self.recompute(sheet_id).await;
                recomputed
                    .and_then(|grid| slice(&grid, range))
                    .ok_or(err)
            }
            other => other,
        }
    }

    async fn update_cell(
        &self,
        sheet_id: &str,
        cell: &str,
        raw_value: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()> {
        self.inner
            .update_cell(sheet_id, cell, raw_value, user_id, password)
            .await
    }

    async fn share_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()> {
        self.inner
            .share_spreadsheet(sheet_id, user_id, password)
            .await
    }

    async fn unshare_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()> {
        self.inner
            .unshare_spreadsheet(sheet_id, user_id, password)
            .await
    }

    async fn delete_user_spreadsheets(&self, user_id: &str, password: &str) -> ServiceResult<()> {
        self.inner.delete_user_spreadsheets(user_id, password).await
    }

    async fn list_spreadsheets(&self) -> ServiceResult<Vec<Spreadsheet>> {
        self.inner.list_spreadsheets().await
    }
}
