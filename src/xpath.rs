//! # XPath 模块
//!
//! 查询协作方：在 [`XmlDocument`](crate::tree::XmlDocument) 上求值
//! XPath 1.0 子集（手写词法 / 递归下降解析 / 树求值，无 regex 依赖）。
//!
//! ## 覆盖范围
//!
//! - 路径：绝对 `/a/b`、后代 `//x`、相对步、缩写 `.` `..` `@attr`、
//!   通配 `*`、`text()` / `node()` 测试、谓词 `[...]`（数字谓词按位置过滤）
//! - 运算：`= != < > <= >=`、`+ - * div mod`、`and or`、一元负号、并集 `|`
//! - 函数：`true false not boolean string number count sum last position
//!   name concat contains starts-with string-length normalize-space`
//!
//! ## 入口
//!
//! - [`evaluate`]：任意表达式 → [`Value`]（标量或节点集）
//! - [`select_nodes`]：节点选择形式 → 树节点句柄列表（属性命中被丢弃）

use thiserror::Error;

use crate::tree::{NodeId, NodeKind, XmlDocument};

/// XPath 错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XpathError {
    /// 词法 / 语法错误
    #[error("语法错误：{0}")]
    Syntax(String),

    /// 求值错误（未知函数、参数个数不符等）
    #[error("求值错误：{0}")]
    Evaluation(String),
}

/// 节点集中的一个成员：树节点或某元素上的属性
#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    /// 树节点句柄
    Node(NodeId),
    /// (所属元素, 属性名)
    Attribute(NodeId, String),
}

impl ValueNode {
    /// XPath string-value
    pub fn string_value(&self, doc: &XmlDocument) -> String {
        match self {
            ValueNode::Node(id) => doc.string_value(*id),
            ValueNode::Attribute(id, name) => {
                doc.attribute(*id, name).unwrap_or_default().to_string()
            }
        }
    }
}

/// 求值结果
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 节点集（文档顺序、首见去重）
    Nodeset(Vec<ValueNode>),
    /// 字符串
    String(String),
    /// 数值
    Number(f64),
    /// 布尔
    Boolean(bool),
}

impl Value {
    fn to_bool(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Nodeset(ns) => !ns.is_empty(),
        }
    }

    fn to_number(&self, doc: &XmlDocument) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
            Value::Nodeset(ns) => match ns.first() {
                Some(n) => n.string_value(doc).trim().parse().unwrap_or(f64::NAN),
                None => f64::NAN,
            },
        }
    }

    /// 按 XPath 规则转成字符串
    ///
    /// 字符串原样；数值用不变区域的十进制格式（整数值不带小数部分）；
    /// 布尔为小写 `true` / `false`；节点集取首个成员的 string-value，
    /// 空集为空串。
    pub fn string_value(&self, doc: &XmlDocument) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Nodeset(ns) => ns
                .first()
                .map(|n| n.string_value(doc))
                .unwrap_or_default(),
        }
    }
}

/// XPath 数值的字符串形式：`42` 而不是 `42.0`
fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// -------------------------------------------------------------------------
// 词法
// -------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Name(String),
    Literal(String),
    Number(f64),
    Slash,
    DoubleSlash,
    Dot,
    DotDot,
    At,
    Star,
    Pipe,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    DoubleColon,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    And,
    Or,
    Div,
    Mod,
}

fn is_name_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_name_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, b'_' | b'-' | b'.')
}

fn tokenize(input: &str) -> Result<Vec<Tok>, XpathError> {
    let bytes = input.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        match c {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                toks.push(Tok::DoubleSlash);
                i += 2;
            }
            b'/' => {
                toks.push(Tok::Slash);
                i += 1;
            }
            b'.' if bytes.get(i + 1) == Some(&b'.') => {
                toks.push(Tok::DotDot);
                i += 2;
            }
            b'.' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let text = &input[start..i];
                let n = text
                    .parse()
                    .map_err(|_| XpathError::Syntax(format!("无效数字 '{text}'")))?;
                toks.push(Tok::Number(n));
            }
            b'.' => {
                toks.push(Tok::Dot);
                i += 1;
            }
            b'@' => {
                toks.push(Tok::At);
                i += 1;
            }
            b'*' => {
                toks.push(Tok::Star);
                i += 1;
            }
            b'|' => {
                toks.push(Tok::Pipe);
                i += 1;
            }
            b'[' => {
                toks.push(Tok::LBracket);
                i += 1;
            }
            b']' => {
                toks.push(Tok::RBracket);
                i += 1;
            }
            b'(' => {
                toks.push(Tok::LParen);
                i += 1;
            }
            b')' => {
                toks.push(Tok::RParen);
                i += 1;
            }
            b',' => {
                toks.push(Tok::Comma);
                i += 1;
            }
            b'+' => {
                toks.push(Tok::Plus);
                i += 1;
            }
            b'-' => {
                toks.push(Tok::Minus);
                i += 1;
            }
            b'=' => {
                toks.push(Tok::Eq);
                i += 1;
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => {
                toks.push(Tok::Ne);
                i += 2;
            }
            b'<' if bytes.get(i + 1) == Some(&b'=') => {
                toks.push(Tok::Le);
                i += 2;
            }
            b'<' => {
                toks.push(Tok::Lt);
                i += 1;
            }
            b'>' if bytes.get(i + 1) == Some(&b'=') => {
                toks.push(Tok::Ge);
                i += 2;
            }
            b'>' => {
                toks.push(Tok::Gt);
                i += 1;
            }
            q @ (b'\'' | b'"') => {
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i] != q {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(XpathError::Syntax("未闭合的字符串字面量".to_string()));
                }
                toks.push(Tok::Literal(input[start..i].to_string()));
                i += 1;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                let text = &input[start..i];
                let n = text
                    .parse()
                    .map_err(|_| XpathError::Syntax(format!("无效数字 '{text}'")))?;
                toks.push(Tok::Number(n));
            }
            c if is_name_start(c) => {
                let start = i;
                while i < bytes.len() && is_name_char(bytes[i]) {
                    i += 1;
                }
                if bytes.get(i) == Some(&b':') && bytes.get(i + 1) == Some(&b':') {
                    // 轴名，如 child::
                    toks.push(Tok::Name(input[start..i].to_string()));
                    toks.push(Tok::DoubleColon);
                    i += 2;
                    continue;
                }
                let name = &input[start..i];
                // and/or/div/mod 只在运算符位置上是关键字
                let after_operand = toks.last().is_some_and(|t| {
                    matches!(
                        t,
                        Tok::RBracket
                            | Tok::RParen
                            | Tok::Literal(_)
                            | Tok::Number(_)
                            | Tok::Name(_)
                            | Tok::Star
                            | Tok::Dot
                            | Tok::DotDot
                    )
                });
                if after_operand {
                    match name {
                        "and" => toks.push(Tok::And),
                        "or" => toks.push(Tok::Or),
                        "div" => toks.push(Tok::Div),
                        "mod" => toks.push(Tok::Mod),
                        _ => toks.push(Tok::Name(name.to_string())),
                    }
                } else {
                    toks.push(Tok::Name(name.to_string()));
                }
            }
            _ => {
                let ch = input[i..].chars().next().unwrap_or('?');
                return Err(XpathError::Syntax(format!("意外字符 '{ch}'")));
            }
        }
    }
    Ok(toks)
}

// -------------------------------------------------------------------------
// 语法
// -------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Expr {
    /// (是否绝对路径, 步列表)
    Path(bool, Vec<Step>),
    Union(Box<Expr>, Box<Expr>),
    BinOp(Op, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Call(String, Vec<Expr>),
    Literal(String),
    Number(f64),
}

#[derive(Debug, Clone)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    SelfAxis,
    Attribute,
}

#[derive(Debug, Clone)]
enum NodeTest {
    Name(String),
    Wildcard,
    Text,
    AnyNode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
}

struct ExprParser {
    toks: Vec<Tok>,
    pos: usize,
}

impl ExprParser {
    fn new(toks: Vec<Tok>) -> Self {
        Self { toks, pos: 0 }
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn peek2(&self) -> Option<&Tok> {
        self.toks.get(self.pos + 1)
    }

    fn advance(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), XpathError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(XpathError::Syntax(format!(
                "期望 {tok:?}，实际 {:?}",
                self.peek()
            )))
        }
    }

    fn parse(&mut self) -> Result<Expr, XpathError> {
        let expr = self.parse_or()?;
        if self.pos < self.toks.len() {
            return Err(XpathError::Syntax(format!(
                "表达式末尾有多余 token：{:?}",
                self.peek()
            )));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, XpathError> {
        let mut left = self.parse_and()?;
        while self.eat(&Tok::Or) {
            let right = self.parse_and()?;
            left = Expr::BinOp(Op::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, XpathError> {
        let mut left = self.parse_equality()?;
        while self.eat(&Tok::And) {
            let right = self.parse_equality()?;
            left = Expr::BinOp(Op::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, XpathError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Eq) => Op::Eq,
                Some(Tok::Ne) => Op::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = Expr::BinOp(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, XpathError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Lt) => Op::Lt,
                Some(Tok::Gt) => Op::Gt,
                Some(Tok::Le) => Op::Le,
                Some(Tok::Ge) => Op::Ge,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::BinOp(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, XpathError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => Op::Add,
                Some(Tok::Minus) => Op::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::BinOp(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, XpathError> {
        let mut left = self.parse_unary()?;
        loop {
            // `*` 只有紧跟在操作数之后才是乘号
            let star_is_mul = self.peek() == Some(&Tok::Star)
                && self.pos > 0
                && matches!(
                    self.toks[self.pos - 1],
                    Tok::RBracket
                        | Tok::RParen
                        | Tok::Literal(_)
                        | Tok::Number(_)
                        | Tok::Name(_)
                        | Tok::Dot
                        | Tok::DotDot
                );
            let op = if star_is_mul {
                Op::Mul
            } else {
                match self.peek() {
                    Some(Tok::Div) => Op::Div,
                    Some(Tok::Mod) => Op::Mod,
                    _ => break,
                }
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::BinOp(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, XpathError> {
        if self.eat(&Tok::Minus) {
            Ok(Expr::Neg(Box::new(self.parse_unary()?)))
        } else {
            self.parse_union()
        }
    }

    fn parse_union(&mut self) -> Result<Expr, XpathError> {
        let mut left = self.parse_path_or_primary()?;
        while self.eat(&Tok::Pipe) {
            let right = self.parse_path_or_primary()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_path_or_primary(&mut self) -> Result<Expr, XpathError> {
        match self.peek() {
            Some(Tok::Slash | Tok::DoubleSlash | Tok::Dot | Tok::DotDot | Tok::At | Tok::Star) => {
                self.parse_location_path()
            }
            Some(Tok::LParen | Tok::Literal(_) | Tok::Number(_)) => self.parse_primary(),
            Some(Tok::Name(name)) => {
                // 函数调用；text()/node() 是节点测试不是函数
                let is_call = self.peek2() == Some(&Tok::LParen)
                    && !matches!(name.as_str(), "text" | "node");
                if is_call {
                    self.parse_primary()
                } else {
                    self.parse_location_path()
                }
            }
            None => Err(XpathError::Syntax("表达式意外结束".to_string())),
            other => Err(XpathError::Syntax(format!("意外 token：{other:?}"))),
        }
    }

    fn parse_location_path(&mut self) -> Result<Expr, XpathError> {
        let mut absolute = false;
        let mut steps = Vec::new();

        if self.eat(&Tok::DoubleSlash) {
            absolute = true;
            steps.push(Step {
                axis: Axis::DescendantOrSelf,
                test: NodeTest::AnyNode,
                predicates: Vec::new(),
            });
            steps.push(self.parse_step()?);
        } else if self.eat(&Tok::Slash) {
            absolute = true;
            // 单独一个 `/` 选中文档根
            if self
                .peek()
                .is_some_and(|t| !matches!(t, Tok::Pipe | Tok::RBracket | Tok::RParen | Tok::Comma))
            {
                steps.push(self.parse_step()?);
            }
        } else {
            steps.push(self.parse_step()?);
        }

        loop {
            if self.eat(&Tok::DoubleSlash) {
                steps.push(Step {
                    axis: Axis::DescendantOrSelf,
                    test: NodeTest::AnyNode,
                    predicates: Vec::new(),
                });
                steps.push(self.parse_step()?);
            } else if self.eat(&Tok::Slash) {
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }

        Ok(Expr::Path(absolute, steps))
    }

    fn parse_step(&mut self) -> Result<Step, XpathError> {
        if self.eat(&Tok::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::AnyNode,
                predicates: self.parse_predicates()?,
            });
        }
        if self.eat(&Tok::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::AnyNode,
                predicates: self.parse_predicates()?,
            });
        }

        let axis = if self.eat(&Tok::At) {
            Axis::Attribute
        } else if self.peek2() == Some(&Tok::DoubleColon) {
            let name = match self.advance() {
                Some(Tok::Name(n)) => n,
                other => return Err(XpathError::Syntax(format!("期望轴名，实际 {other:?}"))),
            };
            self.expect(&Tok::DoubleColon)?;
            match name.as_str() {
                "child" => Axis::Child,
                "descendant" => Axis::Descendant,
                "descendant-or-self" => Axis::DescendantOrSelf,
                "parent" => Axis::Parent,
                "ancestor" => Axis::Ancestor,
                "ancestor-or-self" => Axis::AncestorOrSelf,
                "following-sibling" => Axis::FollowingSibling,
                "preceding-sibling" => Axis::PrecedingSibling,
                "self" => Axis::SelfAxis,
                "attribute" => Axis::Attribute,
                _ => return Err(XpathError::Syntax(format!("不支持的轴 '{name}'"))),
            }
        } else {
            Axis::Child
        };

        let test = if self.eat(&Tok::Star) {
            NodeTest::Wildcard
        } else if let Some(Tok::Name(name)) = self.peek().cloned() {
            if matches!(name.as_str(), "text" | "node") && self.peek2() == Some(&Tok::LParen) {
                self.advance();
                self.expect(&Tok::LParen)?;
                self.expect(&Tok::RParen)?;
                if name == "text" {
                    NodeTest::Text
                } else {
                    NodeTest::AnyNode
                }
            } else {
                self.advance();
                NodeTest::Name(name)
            }
        } else {
            return Err(XpathError::Syntax(format!(
                "期望节点测试，实际 {:?}",
                self.peek()
            )));
        };

        Ok(Step {
            axis,
            test,
            predicates: self.parse_predicates()?,
        })
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, XpathError> {
        let mut predicates = Vec::new();
        while self.eat(&Tok::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(&Tok::RBracket)?;
        }
        Ok(predicates)
    }

    fn parse_primary(&mut self) -> Result<Expr, XpathError> {
        match self.peek().cloned() {
            Some(Tok::LParen) => {
                self.advance();
                let expr = self.parse_or()?;
                self.expect(&Tok::RParen)?;
                Ok(expr)
            }
            Some(Tok::Literal(s)) => {
                self.advance();
                Ok(Expr::Literal(s))
            }
            Some(Tok::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Tok::Name(name)) if self.peek2() == Some(&Tok::LParen) => {
                self.advance();
                self.expect(&Tok::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Tok::RParen) {
                    args.push(self.parse_or()?);
                    while self.eat(&Tok::Comma) {
                        args.push(self.parse_or()?);
                    }
                    self.expect(&Tok::RParen)?;
                }
                Ok(Expr::Call(name, args))
            }
            _ => self.parse_location_path(),
        }
    }
}

// -------------------------------------------------------------------------
// 求值
// -------------------------------------------------------------------------

struct EvalCtx<'a> {
    doc: &'a XmlDocument,
    /// 上下文节点
    node: NodeId,
    /// position() / last()
    position: usize,
    size: usize,
}

/// 对 `context` 求值任意 XPath 表达式
pub fn evaluate(
    doc: &XmlDocument,
    context: NodeId,
    expression: &str,
) -> Result<Value, XpathError> {
    let toks = tokenize(expression)?;
    if toks.is_empty() {
        return Err(XpathError::Syntax("空表达式".to_string()));
    }
    let expr = ExprParser::new(toks).parse()?;
    let ctx = EvalCtx {
        doc,
        node: context,
        position: 1,
        size: 1,
    };
    eval_expr(&ctx, &expr)
}

/// 节点选择形式：结果必须是节点集，属性命中被丢弃
pub fn select_nodes(
    doc: &XmlDocument,
    context: NodeId,
    expression: &str,
) -> Result<Vec<NodeId>, XpathError> {
    match evaluate(doc, context, expression)? {
        Value::Nodeset(ns) => Ok(ns
            .into_iter()
            .filter_map(|n| match n {
                ValueNode::Node(id) => Some(id),
                ValueNode::Attribute(..) => None,
            })
            .collect()),
        _ => Err(XpathError::Evaluation(
            "表达式结果不是节点集".to_string(),
        )),
    }
}

fn eval_expr(ctx: &EvalCtx, expr: &Expr) -> Result<Value, XpathError> {
    match expr {
        Expr::Literal(s) => Ok(Value::String(s.clone())),
        Expr::Number(n) => Ok(Value::Number(*n)),

        Expr::Path(absolute, steps) => {
            let start = if *absolute {
                // 沿父链回到文档根
                let mut root = ctx.node;
                while let Some(p) = ctx.doc.parent(root) {
                    root = p;
                }
                root
            } else {
                ctx.node
            };
            eval_steps(ctx.doc, &[start], steps)
        }

        Expr::Union(left, right) => {
            let lv = eval_expr(ctx, left)?;
            let rv = eval_expr(ctx, right)?;
            match (lv, rv) {
                (Value::Nodeset(mut a), Value::Nodeset(b)) => {
                    for n in b {
                        if !a.contains(&n) {
                            a.push(n);
                        }
                    }
                    Ok(Value::Nodeset(a))
                }
                _ => Err(XpathError::Evaluation("并集运算要求节点集".to_string())),
            }
        }

        Expr::BinOp(op, left, right) => {
            let lv = eval_expr(ctx, left)?;
            let rv = eval_expr(ctx, right)?;
            eval_binop(ctx.doc, *op, &lv, &rv)
        }

        Expr::Neg(inner) => {
            let v = eval_expr(ctx, inner)?;
            Ok(Value::Number(-v.to_number(ctx.doc)))
        }

        Expr::Call(name, args) => eval_call(ctx, name, args),
    }
}

fn eval_steps(doc: &XmlDocument, start: &[NodeId], steps: &[Step]) -> Result<Value, XpathError> {
    let mut current: Vec<ValueNode> = start.iter().map(|&id| ValueNode::Node(id)).collect();

    for step in steps {
        let mut next: Vec<ValueNode> = Vec::new();

        for node in &current {
            // 属性没有下级轴
            let ValueNode::Node(id) = node else { continue };

            let mut matched: Vec<ValueNode> = collect_axis(doc, *id, step.axis)
                .into_iter()
                .filter(|c| matches_test(doc, c, &step.test, step.axis))
                .collect();

            for predicate in &step.predicates {
                let size = matched.len();
                let mut kept = Vec::new();
                for (index, m) in matched.into_iter().enumerate() {
                    let pred_node = match &m {
                        ValueNode::Node(id) => *id,
                        ValueNode::Attribute(id, _) => *id,
                    };
                    let pred_ctx = EvalCtx {
                        doc,
                        node: pred_node,
                        position: index + 1,
                        size,
                    };
                    let value = eval_expr(&pred_ctx, predicate)?;
                    // 数字谓词等价于 position() = n
                    let keep = match &value {
                        Value::Number(n) => (index + 1) as f64 == *n,
                        _ => value.to_bool(),
                    };
                    if keep {
                        kept.push(m);
                    }
                }
                matched = kept;
            }

            for m in matched {
                if !next.contains(&m) {
                    next.push(m);
                }
            }
        }

        current = next;
    }

    Ok(Value::Nodeset(current))
}

fn collect_axis(doc: &XmlDocument, id: NodeId, axis: Axis) -> Vec<ValueNode> {
    match axis {
        Axis::Child => doc.children(id).iter().map(|&c| ValueNode::Node(c)).collect(),
        Axis::Descendant => {
            let mut out = Vec::new();
            for &child in doc.children(id) {
                collect_subtree(doc, child, &mut out);
            }
            out
        }
        Axis::DescendantOrSelf => {
            let mut out = Vec::new();
            collect_subtree(doc, id, &mut out);
            out
        }
        Axis::SelfAxis => vec![ValueNode::Node(id)],
        Axis::Parent => doc.parent(id).map(ValueNode::Node).into_iter().collect(),
        Axis::Ancestor => {
            let mut out = Vec::new();
            let mut cur = doc.parent(id);
            while let Some(p) = cur {
                out.push(ValueNode::Node(p));
                cur = doc.parent(p);
            }
            out
        }
        Axis::AncestorOrSelf => {
            let mut out = vec![ValueNode::Node(id)];
            let mut cur = doc.parent(id);
            while let Some(p) = cur {
                out.push(ValueNode::Node(p));
                cur = doc.parent(p);
            }
            out
        }
        Axis::FollowingSibling => match doc.parent(id) {
            Some(parent) => {
                let siblings = doc.children(parent);
                let my_pos = siblings.iter().position(|&s| s == id).unwrap_or(0);
                siblings[my_pos + 1..]
                    .iter()
                    .map(|&s| ValueNode::Node(s))
                    .collect()
            }
            None => Vec::new(),
        },
        Axis::PrecedingSibling => match doc.parent(id) {
            Some(parent) => {
                let siblings = doc.children(parent);
                let my_pos = siblings.iter().position(|&s| s == id).unwrap_or(0);
                siblings[..my_pos]
                    .iter()
                    .rev()
                    .map(|&s| ValueNode::Node(s))
                    .collect()
            }
            None => Vec::new(),
        },
        Axis::Attribute => doc
            .attributes(id)
            .iter()
            .map(|(k, _)| ValueNode::Attribute(id, k.clone()))
            .collect(),
    }
}

fn collect_subtree(doc: &XmlDocument, id: NodeId, out: &mut Vec<ValueNode>) {
    out.push(ValueNode::Node(id));
    for &child in doc.children(id) {
        collect_subtree(doc, child, out);
    }
}

fn matches_test(doc: &XmlDocument, node: &ValueNode, test: &NodeTest, axis: Axis) -> bool {
    match node {
        ValueNode::Node(id) => {
            let kind = doc.kind(*id);
            match test {
                NodeTest::Name(name) => kind == NodeKind::Element && doc.name(*id) == name,
                // `*` 匹配元素（属性轴上由 Attribute 分支处理）
                NodeTest::Wildcard => kind == NodeKind::Element,
                NodeTest::Text => matches!(kind, NodeKind::Text | NodeKind::CData),
                NodeTest::AnyNode => true,
            }
        }
        ValueNode::Attribute(_, name) => {
            debug_assert_eq!(axis, Axis::Attribute);
            match test {
                NodeTest::Name(test_name) => name == test_name,
                NodeTest::Wildcard | NodeTest::AnyNode => true,
                NodeTest::Text => false,
            }
        }
    }
}

fn eval_binop(doc: &XmlDocument, op: Op, lv: &Value, rv: &Value) -> Result<Value, XpathError> {
    match op {
        Op::And => Ok(Value::Boolean(lv.to_bool() && rv.to_bool())),
        Op::Or => Ok(Value::Boolean(lv.to_bool() || rv.to_bool())),

        Op::Eq | Op::Ne => {
            let equal = compare_eq(doc, lv, rv);
            Ok(Value::Boolean(if op == Op::Ne { !equal } else { equal }))
        }

        Op::Lt | Op::Gt | Op::Le | Op::Ge => {
            // 节点集参与比较时取"存在匹配"语义
            if let Value::Nodeset(ns) = lv {
                let rn = rv.to_number(doc);
                return Ok(Value::Boolean(ns.iter().any(|n| {
                    let v: f64 = n.string_value(doc).trim().parse().unwrap_or(f64::NAN);
                    compare_numbers(op, v, rn)
                })));
            }
            if let Value::Nodeset(ns) = rv {
                let ln = lv.to_number(doc);
                return Ok(Value::Boolean(ns.iter().any(|n| {
                    let v: f64 = n.string_value(doc).trim().parse().unwrap_or(f64::NAN);
                    compare_numbers(op, ln, v)
                })));
            }
            Ok(Value::Boolean(compare_numbers(
                op,
                lv.to_number(doc),
                rv.to_number(doc),
            )))
        }

        Op::Add => Ok(Value::Number(lv.to_number(doc) + rv.to_number(doc))),
        Op::Sub => Ok(Value::Number(lv.to_number(doc) - rv.to_number(doc))),
        Op::Mul => Ok(Value::Number(lv.to_number(doc) * rv.to_number(doc))),
        Op::Div => Ok(Value::Number(lv.to_number(doc) / rv.to_number(doc))),
        Op::Mod => Ok(Value::Number(lv.to_number(doc) % rv.to_number(doc))),
    }
}

fn compare_eq(doc: &XmlDocument, lv: &Value, rv: &Value) -> bool {
    match (lv, rv) {
        (Value::Nodeset(ns), Value::String(s)) | (Value::String(s), Value::Nodeset(ns)) => {
            ns.iter().any(|n| n.string_value(doc) == *s)
        }
        (Value::Nodeset(ns), Value::Number(num)) | (Value::Number(num), Value::Nodeset(ns)) => {
            ns.iter().any(|n| {
                n.string_value(doc)
                    .trim()
                    .parse::<f64>()
                    .is_ok_and(|v| v == *num)
            })
        }
        (Value::Nodeset(ns), Value::Boolean(b)) | (Value::Boolean(b), Value::Nodeset(ns)) => {
            !ns.is_empty() == *b
        }
        (Value::Nodeset(a), Value::Nodeset(b)) => a.iter().any(|an| {
            let av = an.string_value(doc);
            b.iter().any(|bn| bn.string_value(doc) == av)
        }),
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Boolean(b), other) | (other, Value::Boolean(b)) => other.to_bool() == *b,
        (Value::Number(n), other) | (other, Value::Number(n)) => other.to_number(doc) == *n,
    }
}

fn compare_numbers(op: Op, a: f64, b: f64) -> bool {
    match op {
        Op::Lt => a < b,
        Op::Gt => a > b,
        Op::Le => a <= b,
        Op::Ge => a >= b,
        _ => false,
    }
}

fn eval_call(ctx: &EvalCtx, name: &str, args: &[Expr]) -> Result<Value, XpathError> {
    match name {
        "true" => Ok(Value::Boolean(true)),
        "false" => Ok(Value::Boolean(false)),
        "not" => {
            check_arity(name, args, 1)?;
            Ok(Value::Boolean(!eval_expr(ctx, &args[0])?.to_bool()))
        }
        "boolean" => {
            check_arity(name, args, 1)?;
            Ok(Value::Boolean(eval_expr(ctx, &args[0])?.to_bool()))
        }
        "string" => {
            if args.is_empty() {
                Ok(Value::String(ctx.doc.string_value(ctx.node)))
            } else {
                check_arity(name, args, 1)?;
                let v = eval_expr(ctx, &args[0])?;
                Ok(Value::String(v.string_value(ctx.doc)))
            }
        }
        "number" => {
            if args.is_empty() {
                let s = ctx.doc.string_value(ctx.node);
                Ok(Value::Number(s.trim().parse().unwrap_or(f64::NAN)))
            } else {
                check_arity(name, args, 1)?;
                Ok(Value::Number(eval_expr(ctx, &args[0])?.to_number(ctx.doc)))
            }
        }
        "count" => {
            check_arity(name, args, 1)?;
            match eval_expr(ctx, &args[0])? {
                Value::Nodeset(ns) => Ok(Value::Number(ns.len() as f64)),
                _ => Err(XpathError::Evaluation("count() 要求节点集".to_string())),
            }
        }
        "sum" => {
            check_arity(name, args, 1)?;
            match eval_expr(ctx, &args[0])? {
                Value::Nodeset(ns) => {
                    let total: f64 = ns
                        .iter()
                        .map(|n| {
                            n.string_value(ctx.doc).trim().parse::<f64>().unwrap_or(0.0)
                        })
                        .sum();
                    Ok(Value::Number(total))
                }
                _ => Err(XpathError::Evaluation("sum() 要求节点集".to_string())),
            }
        }
        "last" => Ok(Value::Number(ctx.size as f64)),
        "position" => Ok(Value::Number(ctx.position as f64)),
        "name" => {
            if args.is_empty() {
                Ok(Value::String(ctx.doc.name(ctx.node).to_string()))
            } else {
                check_arity(name, args, 1)?;
                match eval_expr(ctx, &args[0])? {
                    Value::Nodeset(ns) => match ns.first() {
                        Some(ValueNode::Node(id)) => {
                            Ok(Value::String(ctx.doc.name(*id).to_string()))
                        }
                        Some(ValueNode::Attribute(_, attr)) => Ok(Value::String(attr.clone())),
                        None => Ok(Value::String(String::new())),
                    },
                    _ => Err(XpathError::Evaluation("name() 要求节点集".to_string())),
                }
            }
        }
        "concat" => {
            if args.len() < 2 {
                return Err(XpathError::Evaluation(
                    "concat() 至少需要 2 个参数".to_string(),
                ));
            }
            let mut out = String::new();
            for arg in args {
                out.push_str(&eval_expr(ctx, arg)?.string_value(ctx.doc));
            }
            Ok(Value::String(out))
        }
        "contains" => {
            check_arity(name, args, 2)?;
            let s = eval_expr(ctx, &args[0])?.string_value(ctx.doc);
            let needle = eval_expr(ctx, &args[1])?.string_value(ctx.doc);
            Ok(Value::Boolean(s.contains(&needle)))
        }
        "starts-with" => {
            check_arity(name, args, 2)?;
            let s = eval_expr(ctx, &args[0])?.string_value(ctx.doc);
            let prefix = eval_expr(ctx, &args[1])?.string_value(ctx.doc);
            Ok(Value::Boolean(s.starts_with(&prefix)))
        }
        "string-length" => {
            let s = if args.is_empty() {
                ctx.doc.string_value(ctx.node)
            } else {
                check_arity(name, args, 1)?;
                eval_expr(ctx, &args[0])?.string_value(ctx.doc)
            };
            Ok(Value::Number(s.chars().count() as f64))
        }
        "normalize-space" => {
            let s = if args.is_empty() {
                ctx.doc.string_value(ctx.node)
            } else {
                check_arity(name, args, 1)?;
                eval_expr(ctx, &args[0])?.string_value(ctx.doc)
            };
            Ok(Value::String(
                s.split_whitespace().collect::<Vec<_>>().join(" "),
            ))
        }
        _ => Err(XpathError::Evaluation(format!("未知函数 '{name}()'"))),
    }
}

fn check_arity(name: &str, args: &[Expr], expected: usize) -> Result<(), XpathError> {
    if args.len() != expected {
        return Err(XpathError::Evaluation(format!(
            "{name}() 需要 {expected} 个参数，实际 {}",
            args.len()
        )));
    }
    Ok(())
}
