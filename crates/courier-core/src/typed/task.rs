//! Task trait - 型付き Task の定義
//!
//! Task 型そのものが入力 schema、`Output` が出力 schema になる。
//! payload の検証は「`Self` に deserialize できるか」で行う。

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Task は task_type と入出力の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct AddTask {
///     x: i64,
///     y: i64,
/// }
///
/// impl Task for AddTask {
///     const TYPE: &'static str = "add";
///     type Output = i64;
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize`: `Dispatcher::submit_typed` で payload にするため
/// - `DeserializeOwned`: payload の検証と復元のため
/// - `Send + Sync + 'static`: worker の task 上で実行するため
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Registry key and envelope `task_type`.
    const TYPE: &'static str;

    /// Value stored as `result` on success.
    type Output: Serialize + Send + 'static;
}

/// Declared input/output schema of a registered task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSchema {
    pub task_type: &'static str,
    pub input: &'static str,
    pub output: &'static str,
}

impl TaskSchema {
    pub fn of<T: Task>() -> Self {
        Self {
            task_type: T::TYPE,
            input: std::any::type_name::<T>(),
            output: std::any::type_name::<T::Output>(),
        }
    }
}
