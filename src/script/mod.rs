//! # Script 模块
//!
//! 脚本文本的两阶段解析：
//!
//! ```text
//! 原始文本 → [阶段1: 词法扫描] → token 流 → [阶段2: 指令解析] → Vec<Directive>
//! ```
//!
//! ## 设计原则
//!
//! - 使用手写的字符扫描器，避免正则表达式
//! - 清晰的错误处理和行列号追踪
//! - 快速失败：遇到第一个错误立即中止，不保留部分结果

mod parser;
mod scanner;


pub use parser::parse;
