//! 用户与表格的领域模型。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::cell::CellId;

/// 域标识：一组独立部署的副本。
pub type DomainId = String;

/// 单张表格允许的单元格总数上限（`rows × columns`）。
pub const MAX_CELLS: usize = 1 << 20;

/// 用户。密码以明文保存，仅做相等比较。
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
}

impl User {
    pub fn new(
        user_id: impl Into<String>,
        full_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            full_name: full_name.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    /// 创建请求要求所有字段非空。
    pub fn is_complete(&self) -> bool {
        !(self.user_id.is_empty()
            || self.full_name.is_empty()
            || self.email.is_empty()
            || self.password.is_empty())
    }

    /// 搜索语义：全名的大小写不敏感子串匹配；空模式匹配全部。
    pub fn matches(&self, pattern: &str) -> bool {
        pattern.is_empty()
            || self
                .full_name
                .to_lowercase()
                .contains(&pattern.to_lowercase())
    }

    /// 应用局部更新，缺省字段保留原值。
    pub fn patched(&self, patch: &UserPatch) -> User {
        User {
            user_id: self.user_id.clone(),
            full_name: patch
                .full_name
                .clone()
                .unwrap_or_else(|| self.full_name.clone()),
            email: patch.email.clone().unwrap_or_else(|| self.email.clone()),
            password: patch
                .password
                .clone()
                .unwrap_or_else(|| self.password.clone()),
        }
    }
}

/// `update_user` 的局部更新体。
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// 跨域用户引用：`user@domain`。
pub fn qualified_user(user_id: &str, domain: &str) -> String {
    format!("{user_id}@{domain}")
}

/// 表格定义：原始单元格文本与共享名单。值由公式引擎按需求值，不在此保存。
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Spreadsheet {
    pub sheet_id: String,
    pub domain: DomainId,
    pub owner: String,
    pub rows: usize,
    pub columns: usize,
    pub cells: BTreeMap<CellId, String>,
    pub shared_with: BTreeSet<String>,
}

impl Spreadsheet {
    /// 构造待提交的表格；`sheet_id`、`domain` 由接收方资源分配。
    pub fn draft(owner: impl Into<String>, rows: usize, columns: usize) -> Self {
        Self {
            sheet_id: String::new(),
            domain: String::new(),
            owner: owner.into(),
            rows,
            columns,
            cells: BTreeMap::new(),
            shared_with: BTreeSet::new(),
        }
    }

    /// 行列均非零，且单元格总数不溢出、不超过 [`MAX_CELLS`]。
    pub fn has_valid_dimensions(&self) -> bool {
        self.rows > 0
            && self.columns > 0
            && self
                .rows
                .checked_mul(self.columns)
                .is_some_and(|cells| cells <= MAX_CELLS)
    }

    pub fn with_cell(mut self, cell: CellId, raw: impl Into<String>) -> Self {
        self.cells.insert(cell, raw.into());
        self
    }

    pub fn raw(&self, cell: CellId) -> &str {
        self.cells.get(&cell).map_or("", String::as_str)
    }

    /// 写入原始文本；空串等价于清空单元格。
    pub fn place_raw(&mut self, cell: CellId, raw: String) {
        if raw.is_empty() {
            self.cells.remove(&cell);
        } else {
            self.cells.insert(cell, raw);
        }
    }

    /// 所有者的跨域引用形式。
    pub fn qualified_owner(&self) -> String {
        qualified_user(&self.owner, &self.domain)
    }

    /// 读取权限：所有者本人，或共享名单中出现的用户。
    ///
    /// `reader` 既可以是本域的裸 id，也可以是 `user@domain` 形式。
    pub fn readable_by(&self, reader: &str) -> bool {
        let local = reader
            .strip_suffix(self.domain.as_str())
            .and_then(|rest| rest.strip_suffix('@'))
            .unwrap_or(reader);
        local == self.owner
            || self.shared_with.contains(reader)
            || self.shared_with.contains(local)
            || self
                .shared_with
                .contains(&qualified_user(local, &self.domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_keeps_absent_fields() {
        let user = User::new("ana", "Ana Lima", "ana@a.org", "pw");
        let patched = user.patched(&UserPatch {
            email: Some("ana@b.org".to_owned()),
            ..UserPatch::default()
        });
        assert_eq!(patched.full_name, "Ana Lima");
        assert_eq!(patched.email, "ana@b.org");
        assert_eq!(patched.password, "pw");
    }

    #[test]
    fn search_is_case_insensitive_on_full_name() {
        let user = User::new("ana", "Ana Lima", "ana@a.org", "pw");
        assert!(user.matches("LIM"));
        assert!(user.matches(""));
        assert!(!user.matches("ana@"));
    }

    #[test]
    fn dimensions_are_bounded() {
        assert!(Spreadsheet::draft("ana", 1024, 1024).has_valid_dimensions());
        assert!(!Spreadsheet::draft("ana", 0, 4).has_valid_dimensions());
        assert!(!Spreadsheet::draft("ana", 1025, 1024).has_valid_dimensions());
        assert!(!Spreadsheet::draft("ana", usize::MAX, 2).has_valid_dimensions());
    }

    #[test]
    fn readers_cover_owner_and_grants() {
        let mut sheet = Spreadsheet::draft("ana", 2, 2);
        sheet.domain = "alpha".to_owned();
        sheet.shared_with.insert("rui@beta".to_owned());
        sheet.shared_with.insert("leo@alpha".to_owned());
        sheet.shared_with.insert("mia".to_owned());

        assert!(sheet.readable_by("ana"));
        assert!(sheet.readable_by("ana@alpha"));
        assert!(sheet.readable_by("rui@beta"));
        assert!(sheet.readable_by("leo"));
        assert!(!sheet.readable_by("rui"));
        assert!(!sheet.readable_by("ana@beta"));
        assert!(sheet.readable_by("mia@alpha"));
        assert!(!sheet.readable_by("mia@beta"));
    }
}
