//! 定义了统一的 Environment trait，用于与不同测试执行环境交互。

pub mod local;
pub mod remote;

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::connection::RemoteProcess;
use crate::error::EnvironmentError;

pub use local::LocalEnvironment;
pub use remote::SshEnvironment;

/// 一个可寻址的执行环境（本地目录或远程主机）
///
/// 所有相对路径都相对于环境的主目录解析，解析结果落在主目录之外时返回
/// [`EnvironmentError::PathOutsideHome`]，且不会执行任何操作。
pub trait Environment: Send + Sync {
    /// 由工厂分配的编号，在环境的生命周期内唯一且不变
    fn id(&self) -> usize;

    fn hostname(&self) -> String;

    /// 用于日志和报告的显示名称
    fn name(&self) -> String;

    /// 把本地文件或目录复制到环境中的目录 `dest_rel_path` 下
    ///
    /// 目标目录不存在时自动创建；目标存在但不是目录时失败。
    fn copy_files_from_local_disk(
        &self,
        src_path: &Path,
        dest_rel_path: &str,
    ) -> Result<(), EnvironmentError>;

    /// 把环境中的文件或目录复制到本地目录 `dest_path` 下
    fn copy_files_to_local_disk(
        &self,
        src_rel_path: &str,
        dest_path: &Path,
    ) -> Result<(), EnvironmentError>;

    /// 创建目录（包括父目录）
    fn mkdirs(&self, rel_path: &str) -> Result<(), EnvironmentError>;

    /// 递归删除文件或目录
    fn remove_file(&self, rel_path: &str) -> Result<(), EnvironmentError>;

    /// 执行命令并阻塞直到结束，返回已结束的进程
    fn run_command(&self, command: &[&str]) -> Result<Box<dyn RemoteProcess>, EnvironmentError>;

    /// 派发命令后立即返回
    fn run_command_asynchronously(
        &self,
        command: &[&str],
    ) -> Result<Box<dyn RemoteProcess>, EnvironmentError>;

    /// 环境的属性存储
    fn properties(&self) -> &Properties;
}

type PropertyValue = Arc<dyn Any + Send + Sync>;

/// 键为字符串、值为任意类型的属性存储
///
/// 用于在准备阶段和应用启动之间传递计算出的配置（例如分配的端口）。
/// 读取不存在的键是错误，不会返回默认值。
#[derive(Default)]
pub struct Properties {
    values: RwLock<HashMap<String, PropertyValue>>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Arc::new(value));
    }

    /// 读取属性值
    ///
    /// # Errors
    ///
    /// 键不存在时返回 [`EnvironmentError::NoSuchProperty`]，值的类型不是 `T` 时返回
    /// [`EnvironmentError::PropertyType`]。
    pub fn get<T: Any + Clone>(&self, key: &str) -> Result<T, EnvironmentError> {
        let value = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| EnvironmentError::NoSuchProperty(key.to_string()))?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| EnvironmentError::PropertyType {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// 以文本形式读取常见类型的属性值，用于展开命令模板
    pub fn render(&self, key: &str) -> Option<String> {
        let value = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        let value: &(dyn Any + Send + Sync) = value.as_ref();

        macro_rules! render_as {
            ($($ty:ty),*) => {
                $(if let Some(v) = value.downcast_ref::<$ty>() {
                    return Some(v.to_string());
                })*
            };
        }
        render_as!(String, &'static str, u16, u32, u64, usize, i32, i64, bool);
        value
            .downcast_ref::<PathBuf>()
            .map(|path| path.display().to_string())
    }
}
