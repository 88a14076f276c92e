//! # 游标模块
//!
//! 执行期的"当前节点集"：一组有序去重的树节点句柄，
//! 附带一个 LIFO 快照栈供 `PUSH` / `POP` 保存与恢复。

use crate::error::CursorError;
use crate::tree::NodeId;

/// 指令执行游标
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    nodes: Vec<NodeId>,
    stack: Vec<Vec<NodeId>>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前节点集（文档插入顺序）
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// 整体替换当前节点集，不触碰快照栈
    pub fn set(&mut self, nodes: Vec<NodeId>) {
        self.nodes = nodes;
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 快照当前节点集压栈，当前集保持不变
    pub fn push(&mut self) {
        self.stack.push(self.nodes.clone());
    }

    /// 弹出栈顶快照并恢复为当前节点集
    pub fn pop(&mut self) -> Result<(), CursorError> {
        match self.stack.pop() {
            Some(snapshot) => {
                self.nodes = snapshot;
                Ok(())
            }
            None => Err(CursorError::EmptyStack),
        }
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_lifo() {
        let mut cursor = Cursor::new();
        cursor.set(vec![NodeId(1)]);
        cursor.push();
        cursor.set(vec![NodeId(2), NodeId(3)]);
        cursor.push();
        cursor.set(vec![]);

        cursor.pop().unwrap();
        assert_eq!(cursor.nodes(), &[NodeId(2), NodeId(3)]);
        cursor.pop().unwrap();
        assert_eq!(cursor.nodes(), &[NodeId(1)]);
    }

    #[test]
    fn test_pop_empty_stack_fails() {
        let mut cursor = Cursor::new();
        cursor.set(vec![NodeId(1)]);
        assert!(matches!(cursor.pop(), Err(CursorError::EmptyStack)));
        // 失败不影响当前节点集
        assert_eq!(cursor.nodes(), &[NodeId(1)]);
    }

    #[test]
    fn test_push_keeps_current_set() {
        let mut cursor = Cursor::new();
        cursor.set(vec![NodeId(5)]);
        cursor.push();
        assert_eq!(cursor.nodes(), &[NodeId(5)]);
        assert_eq!(cursor.stack_depth(), 1);
    }
}
