//! Recursive-descent parser for the stored source language.
//!
//! The grammar is the practical function-definition subset the pool
//! canonicalizes. Constructs outside it fail as *UnsupportedConstruct*
//! with a source span; anything that is not even that fails as
//! *MalformedInput*.

use crate::errors::{PoolError, PoolResult};
use crate::syntax::ast::*;
use crate::syntax::token::{lex, Kw, Op, Tok, Token};

/// Parse a whole module.
pub fn parse_module(source: &str) -> PoolResult<Module> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.module()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).map(|t| &t.tok).unwrap_or(&Tok::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens.get(self.pos + offset).map(|t| &t.tok).unwrap_or(&Tok::Eof)
    }

    fn here(&self) -> (usize, usize) {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1))
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err<M: Into<String>>(&self, message: M) -> PoolError {
        let (line, column) = self.here();
        PoolError::malformed_input(message, line, column)
    }

    fn unsupported<M: Into<String>>(&self, construct: M) -> PoolError {
        let (line, column) = self.here();
        PoolError::unsupported(construct, line, column)
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if *self.peek() == Tok::Op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        if *self.peek() == Tok::Kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Op, what: &str) -> PoolResult<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.err(format!("expected {what}")))
        }
    }

    fn expect_kw(&mut self, kw: Kw) -> PoolResult<()> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.err(format!("expected {:?}", kw.as_str())))
        }
    }

    fn expect_name(&mut self, what: &str) -> PoolResult<String> {
        match self.peek() {
            Tok::Name(n) => {
                let n = n.clone();
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.err(format!("expected {what}"))),
        }
    }

    fn expect_newline(&mut self) -> PoolResult<()> {
        match self.advance() {
            Tok::Newline | Tok::Eof => Ok(()),
            _ => {
                self.pos -= 1;
                Err(self.err("expected end of line"))
            }
        }
    }

    // ── module and statements ───────────────────────────────────────────

    fn module(&mut self) -> PoolResult<Module> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Eof => break,
                Tok::Newline => {
                    self.pos += 1;
                }
                _ => self.statement(&mut body)?,
            }
        }
        Ok(Module { body })
    }

    fn statement(&mut self, out: &mut Vec<Stmt>) -> PoolResult<()> {
        match self.peek() {
            Tok::Kw(Kw::If) => {
                let stmt = self.if_stmt()?;
                out.push(stmt);
            }
            Tok::Kw(Kw::While) => {
                let stmt = self.while_stmt()?;
                out.push(stmt);
            }
            Tok::Kw(Kw::For) => {
                let stmt = self.for_stmt(false)?;
                out.push(stmt);
            }
            Tok::Kw(Kw::Try) => {
                let stmt = self.try_stmt()?;
                out.push(stmt);
            }
            Tok::Kw(Kw::With) => {
                let stmt = self.with_stmt(false)?;
                out.push(stmt);
            }
            Tok::Kw(Kw::Def) => {
                let def = self.function_def(Vec::new(), false)?;
                out.push(Stmt::FunctionDef(def));
            }
            Tok::Kw(Kw::Async) => {
                self.pos += 1;
                match self.peek() {
                    Tok::Kw(Kw::Def) => {
                        let def = self.function_def(Vec::new(), true)?;
                        out.push(Stmt::FunctionDef(def));
                    }
                    Tok::Kw(Kw::For) => out.push(self.for_stmt(true)?),
                    Tok::Kw(Kw::With) => out.push(self.with_stmt(true)?),
                    _ => return Err(self.err("expected \"def\", \"for\" or \"with\" after \"async\"")),
                }
            }
            Tok::Op(Op::At) => {
                let stmt = self.decorated_def()?;
                out.push(stmt);
            }
            Tok::Kw(Kw::Class) => return Err(self.unsupported("class definition")),
            _ => self.simple_stmt_line(out)?,
        }
        Ok(())
    }

    fn simple_stmt_line(&mut self, out: &mut Vec<Stmt>) -> PoolResult<()> {
        loop {
            out.push(self.simple_stmt()?);
            if !self.eat_op(Op::Semi) {
                break;
            }
            if matches!(self.peek(), Tok::Newline | Tok::Eof) {
                break;
            }
        }
        self.expect_newline()
    }

    fn simple_stmt(&mut self) -> PoolResult<Stmt> {
        match self.peek() {
            Tok::Kw(Kw::Return) => {
                self.pos += 1;
                if matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Op(Op::Semi)) {
                    Ok(Stmt::Return(None))
                } else {
                    Ok(Stmt::Return(Some(self.testlist_star()?)))
                }
            }
            Tok::Kw(Kw::Pass) => {
                self.pos += 1;
                Ok(Stmt::Pass)
            }
            Tok::Kw(Kw::Break) => {
                self.pos += 1;
                Ok(Stmt::Break)
            }
            Tok::Kw(Kw::Continue) => {
                self.pos += 1;
                Ok(Stmt::Continue)
            }
            Tok::Kw(Kw::Raise) => {
                self.pos += 1;
                if matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Op(Op::Semi)) {
                    Ok(Stmt::Raise { exc: None, cause: None })
                } else {
                    let exc = self.test()?;
                    let cause =
                        if self.eat_kw(Kw::From) { Some(self.test()?) } else { None };
                    Ok(Stmt::Raise { exc: Some(exc), cause })
                }
            }
            Tok::Kw(Kw::Assert) => {
                self.pos += 1;
                let test = self.test()?;
                let msg = if self.eat_op(Op::Comma) { Some(self.test()?) } else { None };
                Ok(Stmt::Assert { test, msg })
            }
            Tok::Kw(Kw::Del) => {
                self.pos += 1;
                let mut targets = vec![self.test()?];
                while self.eat_op(Op::Comma) {
                    if matches!(self.peek(), Tok::Newline | Tok::Eof | Tok::Op(Op::Semi)) {
                        break;
                    }
                    targets.push(self.test()?);
                }
                Ok(Stmt::Delete(targets))
            }
            Tok::Kw(Kw::Global) => {
                self.pos += 1;
                Ok(Stmt::Global(self.name_list()?))
            }
            Tok::Kw(Kw::Nonlocal) => {
                self.pos += 1;
                Ok(Stmt::Nonlocal(self.name_list()?))
            }
            Tok::Kw(Kw::Import) => self.import_stmt(),
            Tok::Kw(Kw::From) => self.import_from_stmt(),
            Tok::Kw(Kw::Yield) => Err(self.unsupported("yield expression")),
            _ => self.expr_stmt(),
        }
    }

    fn name_list(&mut self) -> PoolResult<Vec<String>> {
        let mut names = vec![self.expect_name("identifier")?];
        while self.eat_op(Op::Comma) {
            names.push(self.expect_name("identifier")?);
        }
        Ok(names)
    }

    fn expr_stmt(&mut self) -> PoolResult<Stmt> {
        let first = self.testlist_star()?;

        if let Some(op) = self.aug_op() {
            self.pos += 1;
            let value = self.testlist_star()?;
            return Ok(Stmt::AugAssign { target: first, op, value });
        }

        if self.eat_op(Op::Colon) {
            let annotation = self.test()?;
            let value = if self.eat_op(Op::Assign) { Some(self.test()?) } else { None };
            return Ok(Stmt::AnnAssign { target: first, annotation, value });
        }

        if *self.peek() == Tok::Op(Op::Assign) {
            let mut chain = vec![first];
            while self.eat_op(Op::Assign) {
                chain.push(self.testlist_star()?);
            }
            let value = chain.pop().expect("chain holds at least the first element");
            return Ok(Stmt::Assign { targets: chain, value });
        }

        Ok(Stmt::Expr(first))
    }

    fn aug_op(&self) -> Option<BinOp> {
        Some(match self.peek() {
            Tok::Op(Op::PlusEq) => BinOp::Add,
            Tok::Op(Op::MinusEq) => BinOp::Sub,
            Tok::Op(Op::StarEq) => BinOp::Mult,
            Tok::Op(Op::SlashEq) => BinOp::Div,
            Tok::Op(Op::DoubleSlashEq) => BinOp::FloorDiv,
            Tok::Op(Op::PercentEq) => BinOp::Mod,
            Tok::Op(Op::AtEq) => BinOp::MatMult,
            Tok::Op(Op::DoubleStarEq) => BinOp::Pow,
            Tok::Op(Op::LShiftEq) => BinOp::LShift,
            Tok::Op(Op::RShiftEq) => BinOp::RShift,
            Tok::Op(Op::AmpEq) => BinOp::BitAnd,
            Tok::Op(Op::PipeEq) => BinOp::BitOr,
            Tok::Op(Op::CaretEq) => BinOp::BitXor,
            _ => return None,
        })
    }

    // ── imports ─────────────────────────────────────────────────────────

    fn import_stmt(&mut self) -> PoolResult<Stmt> {
        self.expect_kw(Kw::Import)?;
        let mut names = vec![self.dotted_as_name()?];
        while self.eat_op(Op::Comma) {
            names.push(self.dotted_as_name()?);
        }
        Ok(Stmt::Import(names))
    }

    fn dotted_as_name(&mut self) -> PoolResult<ImportAlias> {
        let mut name = self.expect_name("module name")?;
        while self.eat_op(Op::Dot) {
            name.push('.');
            name.push_str(&self.expect_name("module name component")?);
        }
        let asname = if self.eat_kw(Kw::As) { Some(self.expect_name("import alias")?) } else { None };
        Ok(ImportAlias { name, asname })
    }

    fn import_from_stmt(&mut self) -> PoolResult<Stmt> {
        self.expect_kw(Kw::From)?;

        let mut level = 0usize;
        loop {
            if self.eat_op(Op::Dot) {
                level += 1;
            } else if self.eat_op(Op::Ellipsis) {
                level += 3;
            } else {
                break;
            }
        }

        let module = if *self.peek() == Tok::Kw(Kw::Import) && level > 0 {
            String::new()
        } else {
            self.dotted_module_path()?
        };

        self.expect_kw(Kw::Import)?;

        if self.eat_op(Op::Star) {
            return Err(self.unsupported("wildcard import"));
        }

        let parenthesized = self.eat_op(Op::LParen);
        let mut names = Vec::new();
        loop {
            let name = self.expect_name("imported name")?;
            let asname =
                if self.eat_kw(Kw::As) { Some(self.expect_name("import alias")?) } else { None };
            names.push(ImportAlias { name, asname });
            if !self.eat_op(Op::Comma) {
                break;
            }
            if parenthesized && *self.peek() == Tok::Op(Op::RParen) {
                break;
            }
        }
        if parenthesized {
            self.expect_op(Op::RParen, "\")\"")?;
        }

        Ok(Stmt::ImportFrom { level, module, names })
    }

    /// A dotted module path. After a dot, the `import` keyword is accepted
    /// as a path component when another `import` follows, so marker paths
    /// like `pool.import` parse.
    fn dotted_module_path(&mut self) -> PoolResult<String> {
        let mut path = self.expect_name("module name")?;
        while self.eat_op(Op::Dot) {
            path.push('.');
            if *self.peek() == Tok::Kw(Kw::Import) && *self.peek_at(1) == Tok::Kw(Kw::Import) {
                self.pos += 1;
                path.push_str("import");
            } else {
                path.push_str(&self.expect_name("module name component")?);
            }
        }
        Ok(path)
    }

    // ── compound statements ─────────────────────────────────────────────

    fn if_stmt(&mut self) -> PoolResult<Stmt> {
        self.expect_kw(Kw::If)?;
        let test = self.test()?;
        let body = self.suite()?;
        let orelse = self.else_tail()?;
        Ok(Stmt::If { test, body, orelse })
    }

    fn else_tail(&mut self) -> PoolResult<Vec<Stmt>> {
        if self.eat_kw(Kw::Elif) {
            let test = self.test()?;
            let body = self.suite()?;
            let orelse = self.else_tail()?;
            Ok(vec![Stmt::If { test, body, orelse }])
        } else if self.eat_kw(Kw::Else) {
            self.suite()
        } else {
            Ok(Vec::new())
        }
    }

    fn while_stmt(&mut self) -> PoolResult<Stmt> {
        self.expect_kw(Kw::While)?;
        let test = self.test()?;
        let body = self.suite()?;
        let orelse = if self.eat_kw(Kw::Else) { self.suite()? } else { Vec::new() };
        Ok(Stmt::While { test, body, orelse })
    }

    fn for_stmt(&mut self, is_async: bool) -> PoolResult<Stmt> {
        self.expect_kw(Kw::For)?;
        let target = self.target_list()?;
        self.expect_kw(Kw::In)?;
        let iter = self.testlist_star()?;
        let body = self.suite()?;
        let orelse = if self.eat_kw(Kw::Else) { self.suite()? } else { Vec::new() };
        Ok(Stmt::For { target, iter, body, orelse, is_async })
    }

    fn with_stmt(&mut self, is_async: bool) -> PoolResult<Stmt> {
        self.expect_kw(Kw::With)?;
        let mut items = Vec::new();
        loop {
            let context = self.test()?;
            let optional_vars = if self.eat_kw(Kw::As) { Some(self.target_atom()?) } else { None };
            items.push(WithItem { context, optional_vars });
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        let body = self.suite()?;
        Ok(Stmt::With { items, body, is_async })
    }

    fn try_stmt(&mut self) -> PoolResult<Stmt> {
        self.expect_kw(Kw::Try)?;
        let body = self.suite()?;
        let mut handlers = Vec::new();
        while self.eat_kw(Kw::Except) {
            let typ = if matches!(self.peek(), Tok::Op(Op::Colon)) { None } else { Some(self.test()?) };
            let name = if self.eat_kw(Kw::As) { Some(self.expect_name("exception name")?) } else { None };
            let handler_body = self.suite()?;
            handlers.push(ExceptHandler { typ, name, body: handler_body });
        }
        let orelse = if self.eat_kw(Kw::Else) { self.suite()? } else { Vec::new() };
        let finalbody = if self.eat_kw(Kw::Finally) { self.suite()? } else { Vec::new() };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.err("try statement needs an except or finally clause"));
        }
        Ok(Stmt::Try { body, handlers, orelse, finalbody })
    }

    fn decorated_def(&mut self) -> PoolResult<Stmt> {
        let mut decorators = Vec::new();
        while self.eat_op(Op::At) {
            decorators.push(self.test()?);
            self.expect_newline()?;
            while matches!(self.peek(), Tok::Newline) {
                self.pos += 1;
            }
        }
        let is_async = self.eat_kw(Kw::Async);
        match self.peek() {
            Tok::Kw(Kw::Def) => {
                let def = self.function_def(decorators, is_async)?;
                Ok(Stmt::FunctionDef(def))
            }
            Tok::Kw(Kw::Class) => Err(self.unsupported("class definition")),
            _ => Err(self.err("expected function definition after decorators")),
        }
    }

    fn function_def(&mut self, decorators: Vec<Expr>, is_async: bool) -> PoolResult<FunctionDef> {
        self.expect_kw(Kw::Def)?;
        let name = self.expect_name("function name")?;
        self.expect_op(Op::LParen, "\"(\"")?;
        let params = self.params()?;
        self.expect_op(Op::RParen, "\")\"")?;
        let returns = if self.eat_op(Op::Arrow) { Some(self.test()?) } else { None };
        let body = self.suite()?;
        Ok(FunctionDef { name, params, body, decorators, returns, is_async })
    }

    fn params(&mut self) -> PoolResult<Params> {
        let mut params = Params::default();
        let mut seen_star = false;
        loop {
            match self.peek() {
                Tok::Op(Op::RParen) => break,
                Tok::Op(Op::Slash) => {
                    self.pos += 1;
                    if seen_star || !params.posonly.is_empty() {
                        return Err(self.err("misplaced \"/\" in parameter list"));
                    }
                    params.posonly = std::mem::take(&mut params.args);
                }
                Tok::Op(Op::Star) => {
                    self.pos += 1;
                    if seen_star {
                        return Err(self.err("multiple \"*\" in parameter list"));
                    }
                    seen_star = true;
                    if let Tok::Name(_) = self.peek() {
                        params.vararg = Some(self.param(false)?);
                    }
                }
                Tok::Op(Op::DoubleStar) => {
                    self.pos += 1;
                    params.kwarg = Some(self.param(false)?);
                }
                Tok::Name(_) => {
                    let p = self.param(true)?;
                    if seen_star {
                        params.kwonly.push(p);
                    } else {
                        params.args.push(p);
                    }
                }
                _ => return Err(self.err("expected parameter")),
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn param(&mut self, allow_default: bool) -> PoolResult<Param> {
        let name = self.expect_name("parameter name")?;
        let annotation = if self.eat_op(Op::Colon) { Some(self.test()?) } else { None };
        let default = if allow_default && self.eat_op(Op::Assign) { Some(self.test()?) } else { None };
        Ok(Param { name, annotation, default })
    }

    fn suite(&mut self) -> PoolResult<Vec<Stmt>> {
        self.expect_op(Op::Colon, "\":\"")?;
        if matches!(self.peek(), Tok::Newline) {
            self.pos += 1;
            match self.advance() {
                Tok::Indent => {}
                _ => {
                    self.pos -= 1;
                    return Err(self.err("expected an indented block"));
                }
            }
            let mut body = Vec::new();
            loop {
                match self.peek() {
                    Tok::Dedent => {
                        self.pos += 1;
                        break;
                    }
                    Tok::Newline => {
                        self.pos += 1;
                    }
                    Tok::Eof => return Err(self.err("unexpected end of input in block")),
                    _ => self.statement(&mut body)?,
                }
            }
            Ok(body)
        } else {
            let mut body = Vec::new();
            self.simple_stmt_line(&mut body)?;
            Ok(body)
        }
    }

    // ── targets ─────────────────────────────────────────────────────────

    fn target_list(&mut self) -> PoolResult<Expr> {
        let first = self.target_atom()?;
        if *self.peek() != Tok::Op(Op::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if *self.peek() == Tok::Kw(Kw::In) {
                break;
            }
            items.push(self.target_atom()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn target_atom(&mut self) -> PoolResult<Expr> {
        if self.eat_op(Op::Star) {
            return Ok(Expr::Starred(Box::new(self.target_atom()?)));
        }
        // Attribute and subscript targets ride on the postfix machinery.
        self.atom_expr()
    }

    // ── expressions ─────────────────────────────────────────────────────

    fn testlist_star(&mut self) -> PoolResult<Expr> {
        let first = self.test_or_starred()?;
        if *self.peek() != Tok::Op(Op::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if self.at_expression_end() {
                break;
            }
            items.push(self.test_or_starred()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn at_expression_end(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Newline
                | Tok::Eof
                | Tok::Op(Op::Semi)
                | Tok::Op(Op::Assign)
                | Tok::Op(Op::Colon)
                | Tok::Op(Op::RParen)
                | Tok::Op(Op::RBracket)
                | Tok::Op(Op::RBrace)
        )
    }

    fn test_or_starred(&mut self) -> PoolResult<Expr> {
        if self.eat_op(Op::Star) {
            Ok(Expr::Starred(Box::new(self.test()?)))
        } else {
            self.test()
        }
    }

    fn test(&mut self) -> PoolResult<Expr> {
        if *self.peek() == Tok::Kw(Kw::Lambda) {
            return self.lambda();
        }
        let body = self.or_test()?;
        if *self.peek() == Tok::Op(Op::Walrus) {
            return Err(self.unsupported("assignment expression"));
        }
        if self.eat_kw(Kw::If) {
            let test = self.or_test()?;
            self.expect_kw(Kw::Else)?;
            let orelse = self.test()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn lambda(&mut self) -> PoolResult<Expr> {
        self.expect_kw(Kw::Lambda)?;
        let mut params = Params::default();
        if *self.peek() != Tok::Op(Op::Colon) {
            let mut seen_star = false;
            loop {
                match self.peek() {
                    Tok::Op(Op::Star) => {
                        self.pos += 1;
                        seen_star = true;
                        if let Tok::Name(_) = self.peek() {
                            params.vararg = Some(self.lambda_param(false)?);
                        }
                    }
                    Tok::Op(Op::DoubleStar) => {
                        self.pos += 1;
                        params.kwarg = Some(self.lambda_param(false)?);
                    }
                    Tok::Name(_) => {
                        let p = self.lambda_param(true)?;
                        if seen_star {
                            params.kwonly.push(p);
                        } else {
                            params.args.push(p);
                        }
                    }
                    _ => return Err(self.err("expected lambda parameter")),
                }
                if !self.eat_op(Op::Comma) {
                    break;
                }
            }
        }
        self.expect_op(Op::Colon, "\":\"")?;
        let body = self.test()?;
        Ok(Expr::Lambda { params: Box::new(params), body: Box::new(body) })
    }

    fn lambda_param(&mut self, allow_default: bool) -> PoolResult<Param> {
        let name = self.expect_name("lambda parameter")?;
        let default = if allow_default && self.eat_op(Op::Assign) { Some(self.test()?) } else { None };
        Ok(Param { name, annotation: None, default })
    }

    fn or_test(&mut self) -> PoolResult<Expr> {
        let first = self.and_test()?;
        if *self.peek() != Tok::Kw(Kw::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw(Kw::Or) {
            values.push(self.and_test()?);
        }
        Ok(Expr::Bool { op: BoolOp::Or, values })
    }

    fn and_test(&mut self) -> PoolResult<Expr> {
        let first = self.not_test()?;
        if *self.peek() != Tok::Kw(Kw::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw(Kw::And) {
            values.push(self.not_test()?);
        }
        Ok(Expr::Bool { op: BoolOp::And, values })
    }

    fn not_test(&mut self) -> PoolResult<Expr> {
        if self.eat_kw(Kw::Not) {
            Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(self.not_test()?) })
        } else {
            self.comparison()
        }
    }

    fn comparison(&mut self) -> PoolResult<Expr> {
        let left = self.bit_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::Op(Op::Lt) => CmpOp::Lt,
                Tok::Op(Op::Gt) => CmpOp::Gt,
                Tok::Op(Op::Le) => CmpOp::Le,
                Tok::Op(Op::Ge) => CmpOp::Ge,
                Tok::Op(Op::EqEq) => CmpOp::Eq,
                Tok::Op(Op::NotEq) => CmpOp::NotEq,
                Tok::Kw(Kw::In) => CmpOp::In,
                Tok::Kw(Kw::Is) => {
                    self.pos += 1;
                    let op = if self.eat_kw(Kw::Not) { CmpOp::IsNot } else { CmpOp::Is };
                    ops.push(op);
                    comparators.push(self.bit_or()?);
                    continue;
                }
                Tok::Kw(Kw::Not) if *self.peek_at(1) == Tok::Kw(Kw::In) => {
                    self.pos += 2;
                    ops.push(CmpOp::NotIn);
                    comparators.push(self.bit_or()?);
                    continue;
                }
                _ => break,
            };
            self.pos += 1;
            ops.push(op);
            comparators.push(self.bit_or()?);
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare { left: Box::new(left), ops, comparators })
        }
    }

    fn bit_or(&mut self) -> PoolResult<Expr> {
        let mut left = self.bit_xor()?;
        while self.eat_op(Op::Pipe) {
            let right = self.bit_xor()?;
            left = Expr::Binary { left: Box::new(left), op: BinOp::BitOr, right: Box::new(right) };
        }
        Ok(left)
    }

    fn bit_xor(&mut self) -> PoolResult<Expr> {
        let mut left = self.bit_and()?;
        while self.eat_op(Op::Caret) {
            let right = self.bit_and()?;
            left = Expr::Binary { left: Box::new(left), op: BinOp::BitXor, right: Box::new(right) };
        }
        Ok(left)
    }

    fn bit_and(&mut self) -> PoolResult<Expr> {
        let mut left = self.shift()?;
        while self.eat_op(Op::Amp) {
            let right = self.shift()?;
            left = Expr::Binary { left: Box::new(left), op: BinOp::BitAnd, right: Box::new(right) };
        }
        Ok(left)
    }

    fn shift(&mut self) -> PoolResult<Expr> {
        let mut left = self.arith()?;
        loop {
            let op = match self.peek() {
                Tok::Op(Op::LShift) => BinOp::LShift,
                Tok::Op(Op::RShift) => BinOp::RShift,
                _ => break,
            };
            self.pos += 1;
            let right = self.arith()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
        }
        Ok(left)
    }

    fn arith(&mut self) -> PoolResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Op(Op::Plus) => BinOp::Add,
                Tok::Op(Op::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
        }
        Ok(left)
    }

    fn term(&mut self) -> PoolResult<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Op(Op::Star) => BinOp::Mult,
                Tok::Op(Op::Slash) => BinOp::Div,
                Tok::Op(Op::DoubleSlash) => BinOp::FloorDiv,
                Tok::Op(Op::Percent) => BinOp::Mod,
                Tok::Op(Op::At) => BinOp::MatMult,
                _ => break,
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary { left: Box::new(left), op, right: Box::new(right) };
        }
        Ok(left)
    }

    fn factor(&mut self) -> PoolResult<Expr> {
        let op = match self.peek() {
            Tok::Op(Op::Plus) => Some(UnaryOp::Pos),
            Tok::Op(Op::Minus) => Some(UnaryOp::Neg),
            Tok::Op(Op::Tilde) => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            return Ok(Expr::Unary { op, operand: Box::new(self.factor()?) });
        }
        self.power()
    }

    fn power(&mut self) -> PoolResult<Expr> {
        let base = self.atom_expr()?;
        if self.eat_op(Op::DoubleStar) {
            let exp = self.factor()?;
            return Ok(Expr::Binary {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exp),
            });
        }
        Ok(base)
    }

    fn atom_expr(&mut self) -> PoolResult<Expr> {
        if self.eat_kw(Kw::Await) {
            let inner = self.atom_expr()?;
            return Ok(Expr::Await(Box::new(inner)));
        }
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                Tok::Op(Op::LParen) => {
                    self.pos += 1;
                    let (args, keywords) = self.call_args()?;
                    expr = Expr::Call { func: Box::new(expr), args, keywords };
                }
                Tok::Op(Op::LBracket) => {
                    self.pos += 1;
                    let index = self.subscript_list()?;
                    self.expect_op(Op::RBracket, "\"]\"")?;
                    expr = Expr::Subscript { value: Box::new(expr), index: Box::new(index) };
                }
                Tok::Op(Op::Dot) => {
                    self.pos += 1;
                    let attr = self.expect_name("attribute name")?;
                    expr = Expr::Attribute { value: Box::new(expr), attr };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn call_args(&mut self) -> PoolResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if self.eat_op(Op::RParen) {
            return Ok((args, keywords));
        }
        loop {
            match self.peek() {
                Tok::Op(Op::Star) => {
                    self.pos += 1;
                    args.push(Expr::Starred(Box::new(self.test()?)));
                }
                Tok::Op(Op::DoubleStar) => {
                    self.pos += 1;
                    keywords.push(Keyword { arg: None, value: self.test()? });
                }
                Tok::Name(_) if *self.peek_at(1) == Tok::Op(Op::Assign) => {
                    let arg = self.expect_name("keyword argument name")?;
                    self.pos += 1;
                    keywords.push(Keyword { arg: Some(arg), value: self.test()? });
                }
                _ => {
                    let value = self.test()?;
                    if args.is_empty() && keywords.is_empty() && *self.peek() == Tok::Kw(Kw::For) {
                        let generators = self.comp_clauses()?;
                        self.expect_op(Op::RParen, "\")\"")?;
                        let gen =
                            Expr::GeneratorExp { elt: Box::new(value), generators };
                        return Ok((vec![gen], keywords));
                    }
                    args.push(value);
                }
            }
            if !self.eat_op(Op::Comma) {
                break;
            }
            if *self.peek() == Tok::Op(Op::RParen) {
                break;
            }
        }
        self.expect_op(Op::RParen, "\")\"")?;
        Ok((args, keywords))
    }

    fn subscript_list(&mut self) -> PoolResult<Expr> {
        let first = self.subscript()?;
        if *self.peek() != Tok::Op(Op::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if *self.peek() == Tok::Op(Op::RBracket) {
                break;
            }
            items.push(self.subscript()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn subscript(&mut self) -> PoolResult<Expr> {
        let lower = if matches!(self.peek(), Tok::Op(Op::Colon)) { None } else { Some(self.test()?) };
        if !self.eat_op(Op::Colon) {
            return lower.ok_or_else(|| self.err("expected subscript expression"));
        }
        let at_end = |t: &Tok| {
            matches!(t, Tok::Op(Op::RBracket) | Tok::Op(Op::Comma) | Tok::Op(Op::Colon))
        };
        let upper = if at_end(self.peek()) { None } else { Some(Box::new(self.test()?)) };
        let step = if self.eat_op(Op::Colon) {
            if at_end(self.peek()) {
                None
            } else {
                Some(Box::new(self.test()?))
            }
        } else {
            None
        };
        Ok(Expr::Slice { lower: lower.map(Box::new), upper, step })
    }

    fn comp_clauses(&mut self) -> PoolResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        loop {
            let is_async = if self.eat_kw(Kw::Async) {
                self.expect_kw(Kw::For)?;
                true
            } else if self.eat_kw(Kw::For) {
                false
            } else {
                break;
            };
            let target = self.target_list()?;
            self.expect_kw(Kw::In)?;
            let iter = self.or_test()?;
            let mut ifs = Vec::new();
            while self.eat_kw(Kw::If) {
                ifs.push(self.or_test()?);
            }
            generators.push(Comprehension { target, iter, ifs, is_async });
        }
        if generators.is_empty() {
            return Err(self.err("expected \"for\" in comprehension"));
        }
        Ok(generators)
    }

    fn atom(&mut self) -> PoolResult<Expr> {
        match self.peek().clone() {
            Tok::Name(n) => {
                self.pos += 1;
                Ok(Expr::Name(n))
            }
            Tok::Int(v) => {
                self.pos += 1;
                Ok(Expr::Int(v))
            }
            Tok::Float(v) => {
                self.pos += 1;
                Ok(Expr::Float(v))
            }
            Tok::Str(s) => {
                self.pos += 1;
                let mut text = s;
                // Adjacent string literals concatenate.
                while let Tok::Str(next) = self.peek() {
                    text.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Str(text))
            }
            Tok::Bytes(b) => {
                self.pos += 1;
                let mut bytes = b;
                while let Tok::Bytes(next) = self.peek() {
                    bytes.extend_from_slice(next);
                    self.pos += 1;
                }
                Ok(Expr::Bytes(bytes))
            }
            Tok::Kw(Kw::True) => {
                self.pos += 1;
                Ok(Expr::BoolLit(true))
            }
            Tok::Kw(Kw::False) => {
                self.pos += 1;
                Ok(Expr::BoolLit(false))
            }
            Tok::Kw(Kw::None) => {
                self.pos += 1;
                Ok(Expr::NoneLit)
            }
            Tok::Op(Op::Ellipsis) => {
                self.pos += 1;
                Ok(Expr::EllipsisLit)
            }
            Tok::Op(Op::LParen) => self.paren_atom(),
            Tok::Op(Op::LBracket) => self.bracket_atom(),
            Tok::Op(Op::LBrace) => self.brace_atom(),
            Tok::Kw(Kw::Lambda) => self.lambda(),
            Tok::Kw(Kw::Yield) => Err(self.unsupported("yield expression")),
            other => Err(self.err(format!("unexpected token {other:?}"))),
        }
    }

    fn paren_atom(&mut self) -> PoolResult<Expr> {
        self.expect_op(Op::LParen, "\"(\"")?;
        if self.eat_op(Op::RParen) {
            return Ok(Expr::Tuple(Vec::new()));
        }
        let first = self.test_or_starred()?;
        if matches!(self.peek(), Tok::Kw(Kw::For) | Tok::Kw(Kw::Async)) {
            let generators = self.comp_clauses()?;
            self.expect_op(Op::RParen, "\")\"")?;
            return Ok(Expr::GeneratorExp { elt: Box::new(first), generators });
        }
        if *self.peek() == Tok::Op(Op::Comma) {
            let mut items = vec![first];
            while self.eat_op(Op::Comma) {
                if *self.peek() == Tok::Op(Op::RParen) {
                    break;
                }
                items.push(self.test_or_starred()?);
            }
            self.expect_op(Op::RParen, "\")\"")?;
            return Ok(Expr::Tuple(items));
        }
        self.expect_op(Op::RParen, "\")\"")?;
        Ok(first)
    }

    fn bracket_atom(&mut self) -> PoolResult<Expr> {
        self.expect_op(Op::LBracket, "\"[\"")?;
        if self.eat_op(Op::RBracket) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.test_or_starred()?;
        if matches!(self.peek(), Tok::Kw(Kw::For) | Tok::Kw(Kw::Async)) {
            let generators = self.comp_clauses()?;
            self.expect_op(Op::RBracket, "\"]\"")?;
            return Ok(Expr::ListComp { elt: Box::new(first), generators });
        }
        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if *self.peek() == Tok::Op(Op::RBracket) {
                break;
            }
            items.push(self.test_or_starred()?);
        }
        self.expect_op(Op::RBracket, "\"]\"")?;
        Ok(Expr::List(items))
    }

    fn brace_atom(&mut self) -> PoolResult<Expr> {
        self.expect_op(Op::LBrace, "\"{\"")?;
        if self.eat_op(Op::RBrace) {
            return Ok(Expr::Dict { keys: Vec::new(), values: Vec::new() });
        }

        if self.eat_op(Op::DoubleStar) {
            let mut keys = vec![None];
            let mut values = vec![self.test()?];
            self.dict_tail(&mut keys, &mut values)?;
            self.expect_op(Op::RBrace, "\"}\"")?;
            return Ok(Expr::Dict { keys, values });
        }

        let first = self.test_or_starred()?;

        if self.eat_op(Op::Colon) {
            let value = self.test()?;
            if matches!(self.peek(), Tok::Kw(Kw::For) | Tok::Kw(Kw::Async)) {
                let generators = self.comp_clauses()?;
                self.expect_op(Op::RBrace, "\"}\"")?;
                return Ok(Expr::DictComp {
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                });
            }
            let mut keys = vec![Some(first)];
            let mut values = vec![value];
            self.dict_tail(&mut keys, &mut values)?;
            self.expect_op(Op::RBrace, "\"}\"")?;
            return Ok(Expr::Dict { keys, values });
        }

        if matches!(self.peek(), Tok::Kw(Kw::For) | Tok::Kw(Kw::Async)) {
            let generators = self.comp_clauses()?;
            self.expect_op(Op::RBrace, "\"}\"")?;
            return Ok(Expr::SetComp { elt: Box::new(first), generators });
        }

        let mut items = vec![first];
        while self.eat_op(Op::Comma) {
            if *self.peek() == Tok::Op(Op::RBrace) {
                break;
            }
            items.push(self.test_or_starred()?);
        }
        self.expect_op(Op::RBrace, "\"}\"")?;
        Ok(Expr::Set(items))
    }

    fn dict_tail(
        &mut self,
        keys: &mut Vec<Option<Expr>>,
        values: &mut Vec<Expr>,
    ) -> PoolResult<()> {
        while self.eat_op(Op::Comma) {
            if *self.peek() == Tok::Op(Op::RBrace) {
                break;
            }
            if self.eat_op(Op::DoubleStar) {
                keys.push(None);
                values.push(self.test()?);
            } else {
                let key = self.test()?;
                self.expect_op(Op::Colon, "\":\" in dict entry")?;
                keys.push(Some(key));
                values.push(self.test()?);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Module {
        parse_module(src).unwrap()
    }

    fn only_def(m: &Module) -> &FunctionDef {
        match &m.body[0] {
            Stmt::FunctionDef(d) => d,
            other => panic!("expected def, got {other:?}"),
        }
    }

    #[test]
    fn parses_simple_function() {
        let m = parse("def sum_list(items):\n    total = 0\n    for item in items:\n        total += item\n    return total\n");
        let d = only_def(&m);
        assert_eq!(d.name, "sum_list");
        assert_eq!(d.params.args.len(), 1);
        assert_eq!(d.body.len(), 3);
        assert!(!d.is_async);
    }

    #[test]
    fn parses_async_and_await() {
        let m = parse("async def fetch(url):\n    data = await get(url)\n    return data\n");
        let d = only_def(&m);
        assert!(d.is_async);
        match &d.body[0] {
            Stmt::Assign { value, .. } => assert!(matches!(value, Expr::Await(_))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_parameter_groups() {
        let m = parse("def f(a, b, /, c, *rest, d, e=1, **kw):\n    pass\n");
        let d = only_def(&m);
        assert_eq!(d.params.posonly.len(), 2);
        assert_eq!(d.params.args.len(), 1);
        assert_eq!(d.params.vararg.as_ref().unwrap().name, "rest");
        assert_eq!(d.params.kwonly.len(), 2);
        assert_eq!(d.params.kwarg.as_ref().unwrap().name, "kw");
    }

    #[test]
    fn parses_pool_import_marker_path() {
        let m = parse("from pool.import import object_abc as helper\n");
        match &m.body[0] {
            Stmt::ImportFrom { module, names, level } => {
                assert_eq!(level, &0);
                assert_eq!(module, "pool.import");
                assert_eq!(names[0].name, "object_abc");
                assert_eq!(names[0].asname.as_deref(), Some("helper"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_dotted_import_with_alias() {
        let m = parse("import collections.abc as abc_mod\n");
        match &m.body[0] {
            Stmt::Import(names) => {
                assert_eq!(names[0].name, "collections.abc");
                assert_eq!(names[0].bound_name(), "abc_mod");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn chained_comparison_structure() {
        let m = parse("x = 0 <= y < 10\n");
        match &m.body[0] {
            Stmt::Assign { value: Expr::Compare { ops, comparators, .. }, .. } => {
                assert_eq!(ops, &[CmpOp::Le, CmpOp::Lt]);
                assert_eq!(comparators.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn comprehension_with_condition() {
        let m = parse("evens = [n for n in numbers if n % 2 == 0]\n");
        match &m.body[0] {
            Stmt::Assign { value: Expr::ListComp { generators, .. }, .. } => {
                assert_eq!(generators.len(), 1);
                assert_eq!(generators[0].ifs.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decorated_function() {
        let m = parse("@trace\n@memoize(size=8)\ndef f(x):\n    return x\n");
        let d = only_def(&m);
        assert_eq!(d.decorators.len(), 2);
        assert!(matches!(d.decorators[0], Expr::Name(_)));
        assert!(matches!(d.decorators[1], Expr::Call { .. }));
    }

    #[test]
    fn try_except_with_binding() {
        let m = parse(
            "def f():\n    try:\n        g()\n    except ValueError as e:\n        raise RuntimeError() from e\n    finally:\n        h()\n",
        );
        let d = only_def(&m);
        match &d.body[0] {
            Stmt::Try { handlers, finalbody, .. } => {
                assert_eq!(handlers[0].name.as_deref(), Some("e"));
                assert_eq!(finalbody.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn slices_parse() {
        let m = parse("y = xs[1:2:3] + xs[:, 0]\n");
        assert!(matches!(&m.body[0], Stmt::Assign { .. }));
    }

    #[test]
    fn class_is_unsupported() {
        let err = parse_module("class A:\n    pass\n").unwrap_err();
        assert!(matches!(err, PoolError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn yield_is_unsupported() {
        let err = parse_module("def f():\n    yield 1\n").unwrap_err();
        assert!(matches!(err, PoolError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn walrus_is_unsupported() {
        let err = parse_module("def f(x):\n    if (n := x):\n        return n\n").unwrap_err();
        assert!(matches!(err, PoolError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn wildcard_import_is_unsupported() {
        let err = parse_module("from os.path import *\n").unwrap_err();
        assert!(matches!(err, PoolError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn broken_source_is_malformed() {
        let err = parse_module("def f(:\n").unwrap_err();
        assert!(matches!(err, PoolError::MalformedInput { .. }));
    }

    #[test]
    fn global_nonlocal_and_del() {
        let m = parse("def f():\n    global counter\n    del counter\n    counter = 1\n");
        let d = only_def(&m);
        assert!(matches!(&d.body[0], Stmt::Global(names) if names == &vec!["counter".to_string()]));
        assert!(matches!(&d.body[1], Stmt::Delete(_)));
    }

    #[test]
    fn keyword_arguments_and_spreads() {
        let m = parse("r = f(1, *rest, key=2, **extra)\n");
        match &m.body[0] {
            Stmt::Assign { value: Expr::Call { args, keywords, .. }, .. } => {
                assert_eq!(args.len(), 2);
                assert!(matches!(args[1], Expr::Starred(_)));
                assert_eq!(keywords.len(), 2);
                assert_eq!(keywords[0].arg.as_deref(), Some("key"));
                assert!(keywords[1].arg.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
