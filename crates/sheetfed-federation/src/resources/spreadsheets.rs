use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use sheetfed_core::{
    CellId, CellRange, ErrorKind, FormulaEngine, Grid, ImportRef, ImportedValues, MAX_CELLS,
    ServiceError, ServiceResult, Spreadsheet, SpreadsheetsService, UsersService,
};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::FederationContext;

/// 实体表与所有者索引，总是在同一把锁下一起修改。
#[derive(Default)]
struct SheetStore {
    sheets: HashMap<String, Spreadsheet>,
    owners: HashMap<String, BTreeSet<String>>,
}

impl SheetStore {
    fn insert(&mut self, sheet: Spreadsheet) {
        self.owners
            .entry(sheet.owner.clone())
            .or_default()
            .insert(sheet.sheet_id.clone());
        self.sheets.insert(sheet.sheet_id.clone(), sheet);
    }

    fn remove(&mut self, sheet_id: &str) -> Option<Spreadsheet> {
        let sheet = self.sheets.remove(sheet_id)?;
        if let Some(owned) = self.owners.get_mut(&sheet.owner) {
            owned.remove(sheet_id);
            if owned.is_empty() {
                self.owners.remove(&sheet.owner);
            }
        }
        Some(sheet)
    }

    fn remove_owner(&mut self, owner: &str) -> usize {
        let owned = self.owners.remove(owner).unwrap_or_default();
        for sheet_id in &owned {
            self.sheets.remove(sheet_id);
        }
        owned.len()
    }

    fn get(&self, sheet_id: &str) -> ServiceResult<Spreadsheet> {
        self.sheets
            .get(sheet_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("spreadsheet `{sheet_id}` does not exist")))
    }
}

/// 一个域的 Spreadsheets 服务端资源。
///
/// # 教案式说明
/// - **意图 (Why)**：表格的写操作只发生在所属域；读操作可能沿着跨表引用进入其它域，
///   此时借助上下文装配的缓存客户端，远端不可达时由其从缓存定义重算；
/// - **契约 (What)**：
///   - 凭据一律交给本域 Users 服务校验；建表时所有者未知或密码错误为 `BadRequest`，
///     其它操作中用户未知为 `NotFound`，密码错误或未获共享为 `Forbidden`；
///   - 本域内的跨表引用在本地求值，沿引用链检测环；其它域的引用以所有者 `owner@domain`
///     身份调用远端的 `get_referenced_values`；
///   - 公式求值失败为 `Internal`；引用的远端不可达且无法回退时为 `Unavailable`；
/// - **执行 (How)**：变更在 `write_gate` 内串行；`state` 的读写锁从不跨越 `.await`。
pub struct SpreadsheetsResource {
    context: FederationContext,
    engine: Arc<dyn FormulaEngine>,
    state: RwLock<SheetStore>,
    write_gate: Mutex<()>,
}

impl SpreadsheetsResource {
    /// 构造资源并登记为本域的本地表格服务。
    pub fn new(context: FederationContext) -> Arc<Self> {
        let engine = Arc::clone(context.engine());
        let resource = Arc::new(Self {
            context,
            engine,
            state: RwLock::new(SheetStore::default()),
            write_gate: Mutex::new(()),
        });
        let weak: std::sync::Weak<dyn SpreadsheetsService> = Arc::downgrade(&resource) as _;
        resource.context.attach_local_spreadsheets(weak);
        resource
    }

    pub fn domain(&self) -> &str {
        self.context.domain()
    }

    fn sheet(&self, sheet_id: &str) -> ServiceResult<Spreadsheet> {
        self.state.read().get(sheet_id)
    }

    /// 经本域 Users 服务校验凭据。
    async fn authenticate(
        &self,
        user_id: &str,
        password: &str,
        unknown: ErrorKind,
        rejected: ErrorKind,
    ) -> ServiceResult<()> {
        let users = self.context.users_client(self.domain())?;
        match users.verify_user(user_id, password).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ServiceError::new(
                rejected,
                format!("wrong password for user `{user_id}`"),
            )),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(ServiceError::new(
                unknown,
                format!("user `{user_id}` does not exist"),
            )),
            Err(err) => Err(err),
        }
    }

    /// 读取路径的授权：凭据有效，且为所有者或在共享名单中。
    async fn readable(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<Spreadsheet> {
        let sheet = self.sheet(sheet_id)?;
        self.authenticate(user_id, password, ErrorKind::NotFound, ErrorKind::Forbidden)
            .await?;
        if !sheet.readable_by(user_id) {
            return Err(ServiceError::forbidden(format!(
                "user `{user_id}` cannot access spreadsheet `{sheet_id}`"
            )));
        }
        Ok(sheet)
    }

    /// 所有者专属操作的授权。
    async fn owned(&self, sheet_id: &str, password: &str) -> ServiceResult<Spreadsheet> {
        let sheet = self.sheet(sheet_id)?;
        self.authenticate(&sheet.owner, password, ErrorKind::NotFound, ErrorKind::Forbidden)
            .await?;
        Ok(sheet)
    }

    /// 求值整张表格；`chain` 是本域内正在求值的表格 id 序列。
    fn evaluate(&self, sheet: Spreadsheet, chain: Vec<String>) -> BoxFuture<'_, ServiceResult<Grid>> {
        async move {
            let mut imported = ImportedValues::new();
            for import in self.engine.imports(&sheet)? {
                let values = if import.domain == self.domain() {
                    self.local_import(&sheet, &import, &chain).await
                } else {
                    self.context.resolve_import(&sheet, &import).await
                }
                .map_err(|err| import_failure(&import, err))?;
                imported.insert(import, values);
            }
            Ok(self.engine.evaluate(&sheet, &imported)?)
        }
        .boxed()
    }

    async fn local_import(
        &self,
        sheet: &Spreadsheet,
        import: &ImportRef,
        chain: &[String],
    ) -> ServiceResult<Grid> {
        if chain.contains(&import.sheet_id) {
            return Err(ServiceError::internal(format!(
                "reference cycle through spreadsheet `{}`",
                import.sheet_id
            )));
        }
        let target = self.sheet(&import.sheet_id)?;
        if !target.readable_by(&sheet.qualified_owner()) {
            return Err(ServiceError::forbidden(format!(
                "`{}` cannot access spreadsheet `{}`",
                sheet.qualified_owner(),
                import.sheet_id
            )));
        }
        let mut next = chain.to_vec();
        next.push(import.sheet_id.clone());
        let grid = self.evaluate(target, next).await?;
        Ok(import.range.extract(&grid)?)
    }
}

/// 引用解析失败使当前表格无法求值；只有“不可达”保持原种类。
fn import_failure(import: &ImportRef, err: ServiceError) -> ServiceError {
    if err.is_unavailable() {
        err
    } else {
        ServiceError::internal(format!("cannot resolve {import}: {err}"))
    }
}

#[async_trait]
impl SpreadsheetsService for SpreadsheetsResource {
    async fn create_spreadsheet(&self, sheet: Spreadsheet, password: &str) -> ServiceResult<String> {
        if !sheet.has_valid_dimensions() {
            return Err(ServiceError::bad_request(format!(
                "invalid dimensions {}x{}, at most {MAX_CELLS} cells",
                sheet.rows, sheet.columns
            )));
        }
        if let Some(cell) = sheet.cells.keys().find(|cell| !cell.fits(sheet.rows, sheet.columns)) {
            return Err(ServiceError::bad_request(format!(
                "cell {cell} lies outside a {}x{} spreadsheet",
                sheet.rows, sheet.columns
            )));
        }

        let _gate = self.write_gate.lock().await;
        self.authenticate(&sheet.owner, password, ErrorKind::BadRequest, ErrorKind::BadRequest)
            .await?;

        let mut state = self.state.write();
        let sheet_id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !state.sheets.contains_key(&candidate) {
                break candidate;
            }
        };
        let created = Spreadsheet {
            sheet_id: sheet_id.clone(),
            domain: self.domain().to_owned(),
            ..sheet
        };
        info!(domain = %created.domain, sheet_id = %sheet_id, owner = %created.owner, "spreadsheet created");
        state.insert(created);
        Ok(sheet_id)
    }

    async fn delete_spreadsheet(&self, sheet_id: &str, password: &str) -> ServiceResult<()> {
        let _gate = self.write_gate.lock().await;
        self.owned(sheet_id, password).await?;
        self.state.write().remove(sheet_id);
        Ok(())
    }

    async fn get_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<Spreadsheet> {
        self.readable(sheet_id, user_id, password).await
    }

    async fn get_spreadsheet_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<Grid> {
        let sheet = self.readable(sheet_id, user_id, password).await?;
        let chain = vec![sheet.sheet_id.clone()];
        self.evaluate(sheet, chain).await
    }

    async fn get_referenced_values(
        &self,
        sheet_id: &str,
        user_id: &str,
        range: &str,
    ) -> ServiceResult<Grid> {
        let range: CellRange = range.parse()?;
        let sheet = self.sheet(sheet_id)?;
        if !sheet.readable_by(user_id) {
            return Err(ServiceError::forbidden(format!(
                "`{user_id}` cannot access spreadsheet `{sheet_id}`"
            )));
        }
        debug!(domain = %self.domain(), sheet_id, requester = user_id, %range, "serving referenced values");
        let chain = vec![sheet.sheet_id.clone()];
        let grid = self.evaluate(sheet, chain).await?;
        Ok(range.extract(&grid)?)
    }

    async fn update_cell(
        &self,
        sheet_id: &str,
        cell: &str,
        raw_value: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()> {
        let cell: CellId = cell.parse()?;
        let _gate = self.write_gate.lock().await;
        let sheet = self.readable(sheet_id, user_id, password).await?;
        if !cell.fits(sheet.rows, sheet.columns) {
            return Err(ServiceError::bad_request(format!(
                "cell {cell} lies outside a {}x{} spreadsheet",
                sheet.rows, sheet.columns
            )));
        }
        let mut state = self.state.write();
        let stored = state
            .sheets
            .get_mut(sheet_id)
            .ok_or_else(|| ServiceError::not_found(format!("spreadsheet `{sheet_id}` does not exist")))?;
        stored.place_raw(cell, raw_value.to_owned());
        Ok(())
    }

    async fn share_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()> {
        let _gate = self.write_gate.lock().await;
        let sheet = self.owned(sheet_id, password).await?;
        if sheet.shared_with.contains(user_id) {
            return Err(ServiceError::conflict(format!(
                "spreadsheet `{sheet_id}` is already shared with `{user_id}`"
            )));
        }
        if let Some(stored) = self.state.write().sheets.get_mut(sheet_id) {
            stored.shared_with.insert(user_id.to_owned());
        }
        Ok(())
    }

    async fn unshare_spreadsheet(
        &self,
        sheet_id: &str,
        user_id: &str,
        password: &str,
    ) -> ServiceResult<()> {
        let _gate = self.write_gate.lock().await;
        let sheet = self.owned(sheet_id, password).await?;
        if !sheet.shared_with.contains(user_id) {
            return Err(ServiceError::not_found(format!(
                "spreadsheet `{sheet_id}` is not shared with `{user_id}`"
            )));
        }
        if let Some(stored) = self.state.write().sheets.get_mut(sheet_id) {
            stored.shared_with.remove(user_id);
        }
        Ok(())
    }

    async fn delete_user_spreadsheets(&self, user_id: &str, password: &str) -> ServiceResult<()> {
        let _gate = self.write_gate.lock().await;
        self.authenticate(user_id, password, ErrorKind::NotFound, ErrorKind::Forbidden)
            .await?;
        let removed = self.state.write().remove_owner(user_id);
        info!(domain = %self.domain(), user_id, removed, "deleted spreadsheets of user");
        Ok(())
    }

    async fn list_spreadsheets(&self) -> ServiceResult<Vec<Spreadsheet>> {
        let mut sheets: Vec<Spreadsheet> = self.state.read().sheets.values().cloned().collect();
        sheets.sort_by(|a, b| a.sheet_id.cmp(&b.sheet_id));
        Ok(sheets)
    }
}
