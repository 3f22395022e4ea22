//! 缓存旁路客户端。
//!
//! # 教案式说明
//! - **意图 (Why)**：远端域长时间不可达时，读操作仍应尽量给出结果：用户读取返回最近一次看到的
//!   实体，表格数值则从缓存的定义重新计算，而不是返回陈旧的派生值；
//! - **契约 (What)**：
//!   - 缓存只由后台刷新循环写入：周期性全量拉取，按 id 覆盖合并，从不删除；
//!   - 写操作直接转发，不触碰缓存；
//!   - 读操作先走远端，只有结果为 `Unavailable` 时才查询缓存；其它任何结果（包括成功）原样返回；
//! - **执行 (How)**：[`EntityCache`] 是 `parking_lot::RwLock<HashMap>`，锁从不跨越 `.await`；
//!   刷新循环是 [`spawn_periodic`](sheetfed_core::spawn_periodic) 派生的可取消任务。

mod spreadsheets;
mod users;

use std::collections::HashMap;

use parking_lot::RwLock;

pub use spreadsheets::CachedSpreadsheetsClient;
pub use users::CachedUsersClient;

/// 以自然 id 为键的单调累积缓存。
#[derive(Debug)]
pub struct EntityCache<T> {
    entries: RwLock<HashMap<String, T>>,
}

impl<T> Default for EntityCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone> EntityCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 覆盖合并一次全量拉取的结果；拉取中缺席的条目保留。
    pub fn merge<I, F>(&self, items: I, key: F)
    where
        I: IntoIterator<Item = T>,
        F: Fn(&T) -> String,
    {
        let mut entries = self.entries.write();
        for item in items {
            entries.insert(key(&item), item);
        }
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.entries.read().get(id).cloned()
    }

    /// 在读锁内过滤。
    pub fn filter(&self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        self.entries
            .read()
            .values()
            .filter(|item| keep(item))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_and_never_evicts() {
        let cache = EntityCache::new();
        cache.merge([("a", 1), ("b", 2)], |(id, _)| (*id).to_owned());
        cache.merge([("a", 10)], |(id, _)| (*id).to_owned());

        assert_eq!(cache.get("a"), Some(("a", 10)));
        assert_eq!(cache.get("b"), Some(("b", 2)));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.filter(|(_, n)| *n > 5), vec![("a", 10)]);
    }
}
