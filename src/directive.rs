//! # 指令模块
//!
//! 指令集的数据模型：[`Directive`] 枚举覆盖全部十四条原子指令，
//! [`Directives`] 是顺序指令列表兼流式构建器。
//!
//! 构建器的可失败方法（参数需校验的那些）返回 `Result<Self, ArgumentError>`，
//! 参数恒定合法的方法直接返回 `Self`，链式调用时用 `?` 传播。
//! 指令列表可由脚本解析得到（[`Directives::from_script`]），
//! 也可经 [`Display`](std::fmt::Display) 还原成规范脚本文本。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ArgumentError, ParseError};
use crate::script;

/// 一条原子指令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    /// 为每个游标节点追加子元素，游标移到新节点
    Add { name: String },
    /// 同 `Add`，但同名子元素已存在时复用之
    AddIf { name: String },
    /// 设置属性（字面值）
    Attr { name: String, value: String },
    /// 设置属性（XPath 求值结果）
    Xattr { name: String, expression: String },
    /// 替换文本内容（字面值）
    Set { value: String },
    /// 替换文本内容（XPath 求值结果）
    Xset { expression: String },
    /// 替换为 CDATA 内容
    Cdata { value: String },
    /// 插入处理指令
    Pi { target: String, data: String },
    /// 声明命名空间；`prefix` 为 `None` 时是默认命名空间
    Ns { prefix: Option<String>, uri: String },
    /// 断言游标节点数；`count` 为 `None` 时只要求非空
    Strict { count: Option<usize> },
    /// 游标整体上移到父节点
    Up,
    /// 删除游标节点，游标置空
    Remove,
    /// 快照游标压栈
    Push,
    /// 弹栈恢复游标
    Pop,
    /// 用 XPath 重定位游标
    Xpath { expression: String },
}

fn require_node_name(name: &str) -> Result<(), ArgumentError> {
    if name.trim().is_empty() {
        return Err(ArgumentError::BlankNodeName);
    }
    Ok(())
}

fn require_attr_name(name: &str) -> Result<(), ArgumentError> {
    if name.trim().is_empty() {
        return Err(ArgumentError::BlankAttributeName);
    }
    Ok(())
}

fn require_expression(expression: &str) -> Result<(), ArgumentError> {
    if expression.trim().is_empty() {
        return Err(ArgumentError::BlankExpression);
    }
    Ok(())
}

impl Directive {
    pub fn add(name: impl Into<String>) -> Result<Self, ArgumentError> {
        let name = name.into();
        require_node_name(&name)?;
        Ok(Directive::Add { name })
    }

    pub fn add_if(name: impl Into<String>) -> Result<Self, ArgumentError> {
        let name = name.into();
        require_node_name(&name)?;
        Ok(Directive::AddIf { name })
    }

    pub fn attr(
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ArgumentError> {
        let name = name.into();
        require_attr_name(&name)?;
        Ok(Directive::Attr {
            name,
            value: value.into(),
        })
    }

    pub fn xattr(
        name: impl Into<String>,
        expression: impl Into<String>,
    ) -> Result<Self, ArgumentError> {
        let name = name.into();
        let expression = expression.into();
        require_attr_name(&name)?;
        require_expression(&expression)?;
        Ok(Directive::Xattr { name, expression })
    }

    pub fn set(value: impl Into<String>) -> Self {
        Directive::Set {
            value: value.into(),
        }
    }

    pub fn xset(expression: impl Into<String>) -> Result<Self, ArgumentError> {
        let expression = expression.into();
        require_expression(&expression)?;
        Ok(Directive::Xset { expression })
    }

    pub fn cdata(value: impl Into<String>) -> Self {
        Directive::Cdata {
            value: value.into(),
        }
    }

    pub fn pi(
        target: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<Self, ArgumentError> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(ArgumentError::BlankPiTarget);
        }
        Ok(Directive::Pi {
            target,
            data: data.into(),
        })
    }

    pub fn ns(prefix: Option<String>, uri: impl Into<String>) -> Self {
        Directive::Ns {
            prefix,
            uri: uri.into(),
        }
    }

    pub fn xpath(expression: impl Into<String>) -> Result<Self, ArgumentError> {
        let expression = expression.into();
        require_expression(&expression)?;
        Ok(Directive::Xpath { expression })
    }

    /// 规范脚本文本中的指令名
    pub fn name(&self) -> &'static str {
        match self {
            Directive::Add { .. } => "ADD",
            Directive::AddIf { .. } => "ADDIF",
            Directive::Attr { .. } => "ATTR",
            Directive::Xattr { .. } => "XATTR",
            Directive::Set { .. } => "SET",
            Directive::Xset { .. } => "XSET",
            Directive::Cdata { .. } => "CDATA",
            Directive::Pi { .. } => "PI",
            Directive::Ns { .. } => "NS",
            Directive::Strict { .. } => "STRICT",
            Directive::Up => "UP",
            Directive::Remove => "REMOVE",
            Directive::Push => "PUSH",
            Directive::Pop => "POP",
            Directive::Xpath { .. } => "XPATH",
        }
    }
}

/// 单引号包裹并转义，与脚本语法的引号规则一致
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directive::Add { name } => write!(f, "ADD {}", quote(name)),
            Directive::AddIf { name } => write!(f, "ADDIF {}", quote(name)),
            Directive::Attr { name, value } => {
                write!(f, "ATTR {}, {}", quote(name), quote(value))
            }
            Directive::Xattr { name, expression } => {
                write!(f, "XATTR {}, {}", quote(name), quote(expression))
            }
            Directive::Set { value } => write!(f, "SET {}", quote(value)),
            Directive::Xset { expression } => write!(f, "XSET {}", quote(expression)),
            Directive::Cdata { value } => write!(f, "CDATA {}", quote(value)),
            Directive::Pi { target, data } => {
                write!(f, "PI {}, {}", quote(target), quote(data))
            }
            Directive::Ns { prefix: None, uri } => write!(f, "NS {}", quote(uri)),
            Directive::Ns {
                prefix: Some(prefix),
                uri,
            } => write!(f, "NS {}, {}", quote(prefix), quote(uri)),
            Directive::Strict { count: None } => write!(f, "STRICT"),
            Directive::Strict { count: Some(n) } => write!(f, "STRICT {n}"),
            Directive::Up => write!(f, "UP"),
            Directive::Remove => write!(f, "REMOVE"),
            Directive::Push => write!(f, "PUSH"),
            Directive::Pop => write!(f, "POP"),
            Directive::Xpath { expression } => write!(f, "XPATH {}", quote(expression)),
        }
    }
}

/// 顺序指令列表，同时充当流式构建器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directives {
    items: Vec<Directive>,
}

impl Directives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// 解析脚本文本
    pub fn from_script(text: &str) -> Result<Self, ParseError> {
        Ok(Self {
            items: script::parse(text)?,
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.items.iter()
    }

    /// 追加一条已构建好的指令
    pub fn directive(mut self, directive: Directive) -> Self {
        self.items.push(directive);
        self
    }

    /// 追加另一列表的全部指令
    pub fn append(mut self, other: Directives) -> Self {
        self.items.extend(other.items);
        self
    }

    // ---- 流式构建方法，顺序同指令表 ----

    pub fn add(mut self, name: impl Into<String>) -> Result<Self, ArgumentError> {
        self.items.push(Directive::add(name)?);
        Ok(self)
    }

    pub fn add_if(mut self, name: impl Into<String>) -> Result<Self, ArgumentError> {
        self.items.push(Directive::add_if(name)?);
        Ok(self)
    }

    pub fn attr(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ArgumentError> {
        self.items.push(Directive::attr(name, value)?);
        Ok(self)
    }

    pub fn xattr(
        mut self,
        name: impl Into<String>,
        expression: impl Into<String>,
    ) -> Result<Self, ArgumentError> {
        self.items.push(Directive::xattr(name, expression)?);
        Ok(self)
    }

    pub fn set(mut self, value: impl Into<String>) -> Self {
        self.items.push(Directive::set(value));
        self
    }

    pub fn xset(mut self, expression: impl Into<String>) -> Result<Self, ArgumentError> {
        self.items.push(Directive::xset(expression)?);
        Ok(self)
    }

    pub fn cdata(mut self, value: impl Into<String>) -> Self {
        self.items.push(Directive::cdata(value));
        self
    }

    pub fn pi(
        mut self,
        target: impl Into<String>,
        data: impl Into<String>,
    ) -> Result<Self, ArgumentError> {
        self.items.push(Directive::pi(target, data)?);
        Ok(self)
    }

    pub fn ns(mut self, prefix: Option<String>, uri: impl Into<String>) -> Self {
        self.items.push(Directive::ns(prefix, uri));
        self
    }

    /// `STRICT n`：断言游标恰好 `count` 个节点（0 表示必须为空）
    pub fn strict(mut self, count: usize) -> Self {
        self.items.push(Directive::Strict { count: Some(count) });
        self
    }

    /// 无参 `STRICT`：断言游标非空
    pub fn strict_non_empty(mut self) -> Self {
        self.items.push(Directive::Strict { count: None });
        self
    }

    pub fn up(mut self) -> Self {
        self.items.push(Directive::Up);
        self
    }

    pub fn remove(mut self) -> Self {
        self.items.push(Directive::Remove);
        self
    }

    pub fn push(mut self) -> Self {
        self.items.push(Directive::Push);
        self
    }

    pub fn pop(mut self) -> Self {
        self.items.push(Directive::Pop);
        self
    }

    pub fn xpath(mut self, expression: impl Into<String>) -> Result<Self, ArgumentError> {
        self.items.push(Directive::xpath(expression)?);
        Ok(self)
    }
}

impl fmt::Display for Directives {
    /// 规范脚本形式，可被 [`Directives::from_script`] 重新解析
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for item in &self.items {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{item}")?;
            first = false;
        }
        if !self.items.is_empty() {
            write!(f, ";")?;
        }
        Ok(())
    }
}

impl From<Vec<Directive>> for Directives {
    fn from(items: Vec<Directive>) -> Self {
        Self { items }
    }
}

impl IntoIterator for Directives {
    type Item = Directive;
    type IntoIter = std::vec::IntoIter<Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Directives {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Extend<Directive> for Directives {
    fn extend<T: IntoIterator<Item = Directive>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}
