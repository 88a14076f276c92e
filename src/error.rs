//! # Error 模块
//!
//! 定义 xembly 中使用的错误类型。
//!
//! 四类执行期错误各自独立成枚举，便于调用方区分处理：
//! 解析失败（[`ParseError`]）、光标结构性前置条件违反（[`CursorError`]）、
//! STRICT 断言失败（[`StrictError`]）、指令执行期的通用失败（[`DirectiveError`]）。
//! 构造参数校验（[`ArgumentError`]）是独立的第五类，
//! 无论指令来自解析器还是链式构造 API 都会触发。

use thiserror::Error;

use crate::xpath::XpathError;

/// 解析错误
///
/// 词法或语法失败，携带出错 token 的行列位置。
/// 解析遇到第一个错误立即中止，不保留部分结果。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// 未知指令名
    #[error("第 {line} 行，第 {column} 列：未知指令 '{name}'")]
    UnknownDirective {
        line: usize,
        column: usize,
        name: String,
    },

    /// 指令缺少必需参数
    #[error("第 {line} 行，第 {column} 列：指令 '{directive}' 缺少参数")]
    ExpectedArgument {
        line: usize,
        column: usize,
        directive: String,
    },

    /// 未闭合的引号字符串（位置指向开引号）
    #[error("第 {line} 行，第 {column} 列：未闭合的字符串 (unterminated string)")]
    UnterminatedString { line: usize, column: usize },

    /// 脚本中出现无法构成 token 的字符
    #[error("第 {line} 行，第 {column} 列：意外字符 '{ch}'")]
    UnexpectedChar {
        line: usize,
        column: usize,
        ch: char,
    },

    /// 参数值无效（如 STRICT 的计数参数不是整数）
    #[error("第 {line} 行，第 {column} 列：参数值无效 - {message}")]
    InvalidArgument {
        line: usize,
        column: usize,
        message: String,
    },

    /// 指令构造参数校验失败（解析期触发时附带位置）
    #[error("第 {line} 行，第 {column} 列：{source}")]
    Argument {
        line: usize,
        column: usize,
        #[source]
        source: ArgumentError,
    },
}

/// 指令构造参数错误
///
/// 由各指令的构造函数直接抛出，与脚本解析无关；
/// 链式 API 构造指令时同样生效。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgumentError {
    /// 元素名为空或全空白
    #[error("节点名不能为空或全空白")]
    BlankNodeName,

    /// 属性名为空或全空白
    #[error("属性名不能为空或全空白")]
    BlankAttributeName,

    /// XPath 表达式为空或全空白
    #[error("XPath 表达式不能为空或全空白")]
    BlankExpression,

    /// 处理指令 target 为空或全空白
    #[error("处理指令 target 不能为空或全空白")]
    BlankPiTarget,
}

/// 光标错误
///
/// 指令的结构性前置条件不满足，执行立即中止。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CursorError {
    /// 指令要求光标非空
    #[error("指令 {directive} 要求光标非空")]
    EmptyCursor { directive: &'static str },

    /// UP / REMOVE 遇到没有父节点的节点（如文档根）
    #[error("指令 {directive} 失败：节点 '{name}' 没有父节点")]
    NoParent {
        directive: &'static str,
        name: String,
    },

    /// POP 时快照栈为空
    #[error("快照栈为空，无法 POP")]
    EmptyStack,
}

/// STRICT 断言错误
///
/// 与 [`CursorError`] 独立，便于调用方把断言失败与结构性错误区分开。
/// 无参形式（光标须非空）与 `STRICT 0`（光标须恰好为空）是不同的检查路径。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrictError {
    /// 无参 STRICT：光标为空
    #[error("STRICT 断言失败：光标为空")]
    EmptyCursor,

    /// 带参 STRICT：节点数与期望不符
    #[error("STRICT 断言失败：期望 {expected} 个节点，实际 {actual} 个")]
    CountMismatch { expected: usize, actual: usize },
}

/// 通用指令错误
///
/// 节点类型不匹配，或查询协作方报告的表达式错误。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectiveError {
    /// 在非元素节点上设置属性
    #[error("无法在 {kind} 节点上设置属性")]
    NotAnElement { kind: &'static str },

    /// XPath 表达式无效，包装查询协作方的底层错误
    #[error("XPath 表达式 '{expression}' 无效")]
    Xpath {
        expression: String,
        #[source]
        source: XpathError,
    },
}

/// xembly 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XemblyError {
    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),

    /// 构造参数错误
    #[error("参数错误: {0}")]
    Argument(#[from] ArgumentError),

    /// 光标错误
    #[error("光标错误: {0}")]
    Cursor(#[from] CursorError),

    /// STRICT 断言错误
    #[error("断言错误: {0}")]
    Strict(#[from] StrictError),

    /// 指令执行错误
    #[error("指令错误: {0}")]
    Directive(#[from] DirectiveError),
}

/// Result 类型别名
pub type XemblyResult<T> = Result<T, XemblyError>;
