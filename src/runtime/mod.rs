//! # Runtime 模块
//!
//! 指令执行层：
//!
//! - [`executor`](self)：单条指令对 (树, 游标) 的语义
//! - [`Xembler`]：驱动整段指令序列，遇到第一个错误即中止

mod engine;
mod executor;

pub use engine::Xembler;

pub(crate) use executor::execute;
