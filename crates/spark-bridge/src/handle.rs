//! 竞技场 + 索引：托管侧持有的不透明句柄。
//!
//! # 设计背景（Why）
//! - 托管侧对象由其垃圾回收器管理生命周期，却需要引用原生侧拥有的单元；直接持有裸指针会在
//!   “释放与访问竞争”时产生悬垂引用；
//! - 改为托管侧只保存一个整数句柄，原生侧在表中保存实体；释放即删除表项，任何访问路径都把
//!   “表项已不存在”视为良性结果。
//!
//! # 契约说明（What）
//! - 句柄编号单调递增且永不复用，`0` 保留给“空句柄”，因此过期句柄不会误命中新实体；
//! - 查找返回实体的克隆，调用方在表锁之外使用实体，不会因为重入而死锁。

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

use crate::error::{BridgeError, Result};

/// 托管侧持有的不透明句柄。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// 空句柄，永远不会被分配。
    pub const NULL: Handle = Handle(0);

    /// 由托管侧保存的整数还原句柄。
    pub const fn from_raw(id: u64) -> Self {
        Handle(id)
    }

    /// 交给托管侧保存的整数表示。
    pub const fn into_raw(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 以句柄索引实体的并发表。
pub struct HandleTable<T> {
    kind: &'static str,
    entries: DashMap<u64, T>,
    next: AtomicU64,
}

impl<T> HandleTable<T> {
    /// `kind` 仅用于错误与日志中标识实体类别。
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
            next: AtomicU64::new(1),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// 登记实体并分配新句柄。
    pub fn insert(&self, value: T) -> Handle {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(id, value);
        Handle(id)
    }

    /// 查找实体的克隆；句柄过期时返回 `None`。
    pub fn get(&self, handle: Handle) -> Option<T>
    where
        T: Clone,
    {
        self.entries
            .get(&handle.0)
            .map(|entry| entry.value().clone())
    }

    /// 查找实体的克隆；句柄过期时返回 [`BridgeError::StaleHandle`]。
    pub fn resolve(&self, handle: Handle) -> Result<T>
    where
        T: Clone,
    {
        self.get(handle).ok_or_else(|| {
            tracing::debug!(kind = self.kind, %handle, "stale handle access");
            BridgeError::StaleHandle {
                kind: self.kind,
                id: handle.0,
            }
        })
    }

    /// 移除并返回实体；重复移除返回 `None`。
    pub fn remove(&self, handle: Handle) -> Option<T> {
        self.entries.remove(&handle.0).map(|(_, value)| value)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> fmt::Debug for HandleTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("kind", &self.kind)
            .field("live", &self.entries.len())
            .finish()
    }
}
