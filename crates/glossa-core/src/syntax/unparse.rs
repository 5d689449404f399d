//! Deterministic pretty-printer.
//!
//! One spelling per tree: 4-space indents, single spaces around binary
//! operators, double-quoted strings, parenthesized tuples, LF endings, no
//! trailing whitespace. Printing then re-parsing yields the identical
//! tree, which is what makes the printed text safe to hash.

use crate::syntax::ast::*;

/// Render a module. Output always ends with a single LF.
pub fn unparse_module(module: &Module) -> String {
    let mut w = Writer { out: String::new(), indent: 0 };
    for stmt in &module.body {
        w.stmt(stmt);
    }
    w.out
}

/// Render a single expression (used by error paths and tests).
pub fn unparse_expr(expr: &Expr) -> String {
    let mut w = Writer { out: String::new(), indent: 0 };
    w.expr(expr, Prec::Test);
    w.out
}

/// Context precedence, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Test,
    Or,
    And,
    Not,
    Compare,
    BitOr,
    BitXor,
    BitAnd,
    Shift,
    Arith,
    Term,
    Unary,
    Power,
    Await,
    Postfix,
}

fn bin_prec(op: BinOp) -> Prec {
    match op {
        BinOp::BitOr => Prec::BitOr,
        BinOp::BitXor => Prec::BitXor,
        BinOp::BitAnd => Prec::BitAnd,
        BinOp::LShift | BinOp::RShift => Prec::Shift,
        BinOp::Add | BinOp::Sub => Prec::Arith,
        BinOp::Mult | BinOp::Div | BinOp::FloorDiv | BinOp::Mod | BinOp::MatMult => Prec::Term,
        BinOp::Pow => Prec::Power,
    }
}

fn next_tighter(p: Prec) -> Prec {
    match p {
        Prec::Test => Prec::Or,
        Prec::Or => Prec::And,
        Prec::And => Prec::Not,
        Prec::Not => Prec::Compare,
        Prec::Compare => Prec::BitOr,
        Prec::BitOr => Prec::BitXor,
        Prec::BitXor => Prec::BitAnd,
        Prec::BitAnd => Prec::Shift,
        Prec::Shift => Prec::Arith,
        Prec::Arith => Prec::Term,
        Prec::Term => Prec::Unary,
        Prec::Unary => Prec::Power,
        Prec::Power => Prec::Await,
        Prec::Await => Prec::Postfix,
        Prec::Postfix => Prec::Postfix,
    }
}

struct Writer {
    out: String,
    indent: usize,
}

impl Writer {
    fn line_start(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn end_line(&mut self) {
        self.out.push('\n');
    }

    fn block(&mut self, body: &[Stmt]) {
        self.indent += 1;
        if body.is_empty() {
            self.line_start();
            self.push("pass");
            self.end_line();
        } else {
            for stmt in body {
                self.stmt(stmt);
            }
        }
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => self.function_def(def),
            Stmt::Expr(e) => {
                self.line_start();
                self.expr(e, Prec::Test);
                self.end_line();
            }
            Stmt::Assign { targets, value } => {
                self.line_start();
                for t in targets {
                    self.expr(t, Prec::Test);
                    self.push(" = ");
                }
                self.expr(value, Prec::Test);
                self.end_line();
            }
            Stmt::AugAssign { target, op, value } => {
                self.line_start();
                self.expr(target, Prec::Test);
                self.push(" ");
                self.push(op.symbol());
                self.push("= ");
                self.expr(value, Prec::Test);
                self.end_line();
            }
            Stmt::AnnAssign { target, annotation, value } => {
                self.line_start();
                self.expr(target, Prec::Test);
                self.push(": ");
                self.expr(annotation, Prec::Test);
                if let Some(v) = value {
                    self.push(" = ");
                    self.expr(v, Prec::Test);
                }
                self.end_line();
            }
            Stmt::Return(value) => {
                self.line_start();
                self.push("return");
                if let Some(v) = value {
                    self.push(" ");
                    self.expr(v, Prec::Test);
                }
                self.end_line();
            }
            Stmt::Pass => {
                self.line_start();
                self.push("pass");
                self.end_line();
            }
            Stmt::Break => {
                self.line_start();
                self.push("break");
                self.end_line();
            }
            Stmt::Continue => {
                self.line_start();
                self.push("continue");
                self.end_line();
            }
            Stmt::If { test, body, orelse } => self.if_chain(test, body, orelse, "if"),
            Stmt::While { test, body, orelse } => {
                self.line_start();
                self.push("while ");
                self.expr(test, Prec::Test);
                self.push(":");
                self.end_line();
                self.block(body);
                if !orelse.is_empty() {
                    self.line_start();
                    self.push("else:");
                    self.end_line();
                    self.block(orelse);
                }
            }
            Stmt::For { target, iter, body, orelse, is_async } => {
                self.line_start();
                if *is_async {
                    self.push("async ");
                }
                self.push("for ");
                self.expr(target, Prec::Test);
                self.push(" in ");
                self.expr(iter, Prec::Test);
                self.push(":");
                self.end_line();
                self.block(body);
                if !orelse.is_empty() {
                    self.line_start();
                    self.push("else:");
                    self.end_line();
                    self.block(orelse);
                }
            }
            Stmt::With { items, body, is_async } => {
                self.line_start();
                if *is_async {
                    self.push("async ");
                }
                self.push("with ");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(&item.context, Prec::Test);
                    if let Some(v) = &item.optional_vars {
                        self.push(" as ");
                        self.expr(v, Prec::Test);
                    }
                }
                self.push(":");
                self.end_line();
                self.block(body);
            }
            Stmt::Try { body, handlers, orelse, finalbody } => {
                self.line_start();
                self.push("try:");
                self.end_line();
                self.block(body);
                for h in handlers {
                    self.line_start();
                    self.push("except");
                    if let Some(t) = &h.typ {
                        self.push(" ");
                        self.expr(t, Prec::Test);
                        if let Some(n) = &h.name {
                            self.push(" as ");
                            self.push(n);
                        }
                    }
                    self.push(":");
                    self.end_line();
                    self.block(&h.body);
                }
                if !orelse.is_empty() {
                    self.line_start();
                    self.push("else:");
                    self.end_line();
                    self.block(orelse);
                }
                if !finalbody.is_empty() {
                    self.line_start();
                    self.push("finally:");
                    self.end_line();
                    self.block(finalbody);
                }
            }
            Stmt::Raise { exc, cause } => {
                self.line_start();
                self.push("raise");
                if let Some(e) = exc {
                    self.push(" ");
                    self.expr(e, Prec::Test);
                    if let Some(c) = cause {
                        self.push(" from ");
                        self.expr(c, Prec::Test);
                    }
                }
                self.end_line();
            }
            Stmt::Assert { test, msg } => {
                self.line_start();
                self.push("assert ");
                self.expr(test, Prec::Test);
                if let Some(m) = msg {
                    self.push(", ");
                    self.expr(m, Prec::Test);
                }
                self.end_line();
            }
            Stmt::Delete(targets) => {
                self.line_start();
                self.push("del ");
                for (i, t) in targets.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(t, Prec::Test);
                }
                self.end_line();
            }
            Stmt::Global(names) => {
                self.line_start();
                self.push("global ");
                self.push(&names.join(", "));
                self.end_line();
            }
            Stmt::Nonlocal(names) => {
                self.line_start();
                self.push("nonlocal ");
                self.push(&names.join(", "));
                self.end_line();
            }
            Stmt::Import(names) => {
                self.line_start();
                self.push("import ");
                self.import_aliases(names);
                self.end_line();
            }
            Stmt::ImportFrom { level, module, names } => {
                self.line_start();
                self.push("from ");
                for _ in 0..*level {
                    self.push(".");
                }
                self.push(module);
                self.push(" import ");
                self.import_aliases(names);
                self.end_line();
            }
        }
    }

    fn import_aliases(&mut self, names: &[ImportAlias]) {
        for (i, alias) in names.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(&alias.name);
            if let Some(asname) = &alias.asname {
                self.push(" as ");
                self.push(asname);
            }
        }
    }

    fn if_chain(&mut self, test: &Expr, body: &[Stmt], orelse: &[Stmt], head: &str) {
        self.line_start();
        self.push(head);
        self.push(" ");
        self.expr(test, Prec::Test);
        self.push(":");
        self.end_line();
        self.block(body);
        match orelse {
            [] => {}
            [Stmt::If { test, body, orelse }] => self.if_chain(test, body, orelse, "elif"),
            _ => {
                self.line_start();
                self.push("else:");
                self.end_line();
                self.block(orelse);
            }
        }
    }

    fn function_def(&mut self, def: &FunctionDef) {
        for d in &def.decorators {
            self.line_start();
            self.push("@");
            self.expr(d, Prec::Test);
            self.end_line();
        }
        self.line_start();
        if def.is_async {
            self.push("async ");
        }
        self.push("def ");
        self.push(&def.name);
        self.push("(");
        self.params(&def.params, true);
        self.push(")");
        if let Some(r) = &def.returns {
            self.push(" -> ");
            self.expr(r, Prec::Test);
        }
        self.push(":");
        self.end_line();
        self.block(&def.body);
    }

    fn params(&mut self, params: &Params, with_annotations: bool) {
        let mut first = true;
        let mut sep = |w: &mut Self, first: &mut bool| {
            if !*first {
                w.push(", ");
            }
            *first = false;
        };
        for p in &params.posonly {
            sep(self, &mut first);
            self.param(p, with_annotations);
        }
        if !params.posonly.is_empty() {
            sep(self, &mut first);
            self.push("/");
        }
        for p in &params.args {
            sep(self, &mut first);
            self.param(p, with_annotations);
        }
        if let Some(v) = &params.vararg {
            sep(self, &mut first);
            self.push("*");
            self.param(v, with_annotations);
        } else if !params.kwonly.is_empty() {
            sep(self, &mut first);
            self.push("*");
        }
        for p in &params.kwonly {
            sep(self, &mut first);
            self.param(p, with_annotations);
        }
        if let Some(k) = &params.kwarg {
            sep(self, &mut first);
            self.push("**");
            self.param(k, with_annotations);
        }
    }

    fn param(&mut self, p: &Param, with_annotations: bool) {
        self.push(&p.name);
        let mut annotated = false;
        if with_annotations {
            if let Some(a) = &p.annotation {
                self.push(": ");
                self.expr(a, Prec::Test);
                annotated = true;
            }
        }
        if let Some(d) = &p.default {
            if annotated {
                self.push(" = ");
            } else {
                self.push("=");
            }
            self.expr(d, Prec::Test);
        }
    }

    fn expr(&mut self, expr: &Expr, ctx: Prec) {
        match expr {
            Expr::Name(n) => self.push(n),
            Expr::Int(v) | Expr::Float(v) => self.push(v),
            Expr::Str(s) => self.string_literal(s),
            Expr::Bytes(b) => self.bytes_literal(b),
            Expr::BoolLit(true) => self.push("True"),
            Expr::BoolLit(false) => self.push("False"),
            Expr::NoneLit => self.push("None"),
            Expr::EllipsisLit => self.push("..."),
            Expr::Tuple(items) => {
                self.push("(");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(item, Prec::Test);
                }
                if items.len() == 1 {
                    self.push(",");
                }
                self.push(")");
            }
            Expr::List(items) => {
                self.push("[");
                self.comma_list(items);
                self.push("]");
            }
            Expr::Set(items) => {
                self.push("{");
                self.comma_list(items);
                self.push("}");
            }
            Expr::Dict { keys, values } => {
                self.push("{");
                for (i, (k, v)) in keys.iter().zip(values).enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    match k {
                        Some(key) => {
                            self.expr(key, Prec::Test);
                            self.push(": ");
                            self.expr(v, Prec::Test);
                        }
                        None => {
                            self.push("**");
                            self.expr(v, Prec::Test);
                        }
                    }
                }
                self.push("}");
            }
            Expr::ListComp { elt, generators } => {
                self.push("[");
                self.expr(elt, Prec::Test);
                self.comp_clauses(generators);
                self.push("]");
            }
            Expr::SetComp { elt, generators } => {
                self.push("{");
                self.expr(elt, Prec::Test);
                self.comp_clauses(generators);
                self.push("}");
            }
            Expr::DictComp { key, value, generators } => {
                self.push("{");
                self.expr(key, Prec::Test);
                self.push(": ");
                self.expr(value, Prec::Test);
                self.comp_clauses(generators);
                self.push("}");
            }
            Expr::GeneratorExp { elt, generators } => {
                self.push("(");
                self.expr(elt, Prec::Test);
                self.comp_clauses(generators);
                self.push(")");
            }
            Expr::Starred(inner) => {
                self.push("*");
                self.expr(inner, Prec::Unary);
            }
            Expr::Attribute { value, attr } => {
                self.wrapped(value, Prec::Postfix);
                self.push(".");
                self.push(attr);
            }
            Expr::Subscript { value, index } => {
                self.wrapped(value, Prec::Postfix);
                self.push("[");
                self.subscript_index(index);
                self.push("]");
            }
            Expr::Call { func, args, keywords } => {
                self.wrapped(func, Prec::Postfix);
                self.push("(");
                let mut first = true;
                for a in args {
                    if !first {
                        self.push(", ");
                    }
                    first = false;
                    self.expr(a, Prec::Test);
                }
                for k in keywords {
                    if !first {
                        self.push(", ");
                    }
                    first = false;
                    match &k.arg {
                        Some(name) => {
                            self.push(name);
                            self.push("=");
                            self.expr(&k.value, Prec::Test);
                        }
                        None => {
                            self.push("**");
                            self.expr(&k.value, Prec::Test);
                        }
                    }
                }
                self.push(")");
            }
            Expr::Await(inner) => {
                let needs = ctx > Prec::Await;
                if needs {
                    self.push("(");
                }
                self.push("await ");
                self.wrapped(inner, Prec::Postfix);
                if needs {
                    self.push(")");
                }
            }
            Expr::Unary { op, operand } => {
                let (text, prec) = match op {
                    UnaryOp::Not => ("not ", Prec::Not),
                    UnaryOp::Neg => ("-", Prec::Unary),
                    UnaryOp::Pos => ("+", Prec::Unary),
                    UnaryOp::Invert => ("~", Prec::Unary),
                };
                let needs = ctx > prec;
                if needs {
                    self.push("(");
                }
                self.push(text);
                self.wrapped(operand, prec);
                if needs {
                    self.push(")");
                }
            }
            Expr::Binary { left, op, right } => {
                let prec = bin_prec(*op);
                let needs = ctx > prec;
                if needs {
                    self.push("(");
                }
                if *op == BinOp::Pow {
                    // right-associative
                    self.wrapped(left, next_tighter(prec));
                    self.push(" ** ");
                    self.wrapped(right, Prec::Unary);
                } else {
                    self.wrapped(left, prec);
                    self.push(" ");
                    self.push(op.symbol());
                    self.push(" ");
                    self.wrapped(right, next_tighter(prec));
                }
                if needs {
                    self.push(")");
                }
            }
            Expr::Bool { op, values } => {
                let (text, prec) = match op {
                    BoolOp::Or => (" or ", Prec::Or),
                    BoolOp::And => (" and ", Prec::And),
                };
                let needs = ctx > prec;
                if needs {
                    self.push("(");
                }
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        self.push(text);
                    }
                    self.wrapped(v, next_tighter(prec));
                }
                if needs {
                    self.push(")");
                }
            }
            Expr::Compare { left, ops, comparators } => {
                let needs = ctx > Prec::Compare;
                if needs {
                    self.push("(");
                }
                self.wrapped(left, next_tighter(Prec::Compare));
                for (op, c) in ops.iter().zip(comparators) {
                    self.push(" ");
                    self.push(op.symbol());
                    self.push(" ");
                    self.wrapped(c, next_tighter(Prec::Compare));
                }
                if needs {
                    self.push(")");
                }
            }
            Expr::IfExp { test, body, orelse } => {
                let needs = ctx > Prec::Test;
                if needs {
                    self.push("(");
                }
                self.wrapped(body, Prec::Or);
                self.push(" if ");
                self.wrapped(test, Prec::Or);
                self.push(" else ");
                self.expr(orelse, Prec::Test);
                if needs {
                    self.push(")");
                }
            }
            Expr::Lambda { params, body } => {
                let needs = ctx > Prec::Test;
                if needs {
                    self.push("(");
                }
                self.push("lambda");
                if !params.is_empty() {
                    self.push(" ");
                    self.params(params, false);
                }
                self.push(": ");
                self.expr(body, Prec::Test);
                if needs {
                    self.push(")");
                }
            }
            Expr::Slice { .. } => {
                // only legal directly inside a subscript; delegate
                self.subscript_index(expr);
            }
        }
    }

    fn comma_list(&mut self, items: &[Expr]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(item, Prec::Test);
        }
    }

    fn wrapped(&mut self, expr: &Expr, ctx: Prec) {
        let own = expr_prec(expr);
        if own < ctx {
            self.push("(");
            self.expr(expr, Prec::Test);
            self.push(")");
        } else {
            self.expr(expr, ctx);
        }
    }

    fn subscript_index(&mut self, index: &Expr) {
        match index {
            Expr::Slice { lower, upper, step } => {
                if let Some(l) = lower {
                    self.expr(l, Prec::Test);
                }
                self.push(":");
                if let Some(u) = upper {
                    self.expr(u, Prec::Test);
                }
                if let Some(s) = step {
                    self.push(":");
                    self.expr(s, Prec::Test);
                }
            }
            Expr::Tuple(items) if !items.is_empty() => {
                // tuple of subscripts prints bare: a[1:2, 3]
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.subscript_index(item);
                }
                if items.len() == 1 {
                    self.push(",");
                }
            }
            other => self.expr(other, Prec::Test),
        }
    }

    fn comp_clauses(&mut self, generators: &[Comprehension]) {
        for g in generators {
            if g.is_async {
                self.push(" async for ");
            } else {
                self.push(" for ");
            }
            self.comp_target(&g.target);
            self.push(" in ");
            self.wrapped(&g.iter, Prec::Or);
            for cond in &g.ifs {
                self.push(" if ");
                self.wrapped(cond, Prec::Or);
            }
        }
    }

    /// Comprehension targets print bare: `for k, v in items`.
    fn comp_target(&mut self, target: &Expr) {
        match target {
            Expr::Tuple(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(item, Prec::Test);
                }
                if items.len() == 1 {
                    self.push(",");
                }
            }
            other => self.expr(other, Prec::Test),
        }
    }

    fn string_literal(&mut self, s: &str) {
        self.push("\"");
        for c in s.chars() {
            match c {
                '\\' => self.push("\\\\"),
                '"' => self.push("\\\""),
                '\n' => self.push("\\n"),
                '\r' => self.push("\\r"),
                '\t' => self.push("\\t"),
                c if (c as u32) < 0x20 => {
                    self.out.push_str(&format!("\\x{:02x}", c as u32));
                }
                c => self.out.push(c),
            }
        }
        self.push("\"");
    }

    fn bytes_literal(&mut self, bytes: &[u8]) {
        self.push("b\"");
        for &b in bytes {
            match b {
                b'\\' => self.push("\\\\"),
                b'"' => self.push("\\\""),
                b'\n' => self.push("\\n"),
                b'\r' => self.push("\\r"),
                b'\t' => self.push("\\t"),
                0x20..=0x7e => self.out.push(b as char),
                other => self.out.push_str(&format!("\\x{other:02x}")),
            }
        }
        self.push("\"");
    }
}

fn expr_prec(expr: &Expr) -> Prec {
    match expr {
        Expr::IfExp { .. } | Expr::Lambda { .. } => Prec::Test,
        Expr::Bool { op: BoolOp::Or, .. } => Prec::Or,
        Expr::Bool { op: BoolOp::And, .. } => Prec::And,
        Expr::Unary { op: UnaryOp::Not, .. } => Prec::Not,
        Expr::Compare { .. } => Prec::Compare,
        Expr::Binary { op, .. } => bin_prec(*op),
        Expr::Unary { .. } => Prec::Unary,
        Expr::Await(_) => Prec::Await,
        Expr::Starred(_) => Prec::Unary,
        Expr::Call { .. } | Expr::Attribute { .. } | Expr::Subscript { .. } => Prec::Postfix,
        _ => Prec::Postfix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parser::parse_module;

    fn roundtrip(src: &str) -> String {
        unparse_module(&parse_module(src).unwrap())
    }

    #[test]
    fn printing_is_a_fixed_point() {
        let sources = [
            "def f(a, b=1, *rest, c, **kw):\n    return a + b\n",
            "x = [n for n in xs if n % 2 == 0]\n",
            "y = (1, 2, 3)\n",
            "z = {\"k\": v for k, v in pairs}\n",
            "def g():\n    try:\n        h()\n    except ValueError as e:\n        raise\n    finally:\n        done()\n",
            "async def f(u):\n    async with open(u) as fh:\n        return await fh.read()\n",
        ];
        for src in sources {
            let once = roundtrip(src);
            let twice = unparse_module(&parse_module(&once).unwrap());
            assert_eq!(once, twice, "fixed point failed for {src:?}");
        }
    }

    #[test]
    fn operator_precedence_parenthesization() {
        assert_eq!(roundtrip("x = (a + b) * c\n"), "x = (a + b) * c\n");
        assert_eq!(roundtrip("x = a + b * c\n"), "x = a + b * c\n");
        assert_eq!(roundtrip("x = -(a ** b)\n"), "x = -a ** b\n");
        assert_eq!(roundtrip("x = (-a) ** b\n"), "x = (-a) ** b\n");
        assert_eq!(roundtrip("x = a ** (b ** c)\n"), "x = a ** b ** c\n");
        assert_eq!(roundtrip("x = (a ** b) ** c\n"), "x = (a ** b) ** c\n");
        assert_eq!(roundtrip("x = not (a or b)\n"), "x = not (a or b)\n");
    }

    #[test]
    fn tuples_always_parenthesized() {
        assert_eq!(roundtrip("x = 1, 2\n"), "x = (1, 2)\n");
        assert_eq!(roundtrip("x = 1,\n"), "x = (1,)\n");
        assert_eq!(roundtrip("return_value = ()\n"), "return_value = ()\n");
    }

    #[test]
    fn strings_double_quoted_with_escapes() {
        assert_eq!(roundtrip("s = 'a\"b'\n"), "s = \"a\\\"b\"\n");
        assert_eq!(roundtrip("s = \"line\\nbreak\"\n"), "s = \"line\\nbreak\"\n");
        assert_eq!(roundtrip("s = 'héllo'\n"), "s = \"héllo\"\n");
    }

    #[test]
    fn slices_print_compactly() {
        assert_eq!(roundtrip("y = xs[1:2:3]\n"), "y = xs[1:2:3]\n");
        assert_eq!(roundtrip("y = xs[:]\n"), "y = xs[:]\n");
        assert_eq!(roundtrip("y = xs[::2]\n"), "y = xs[::2]\n");
        assert_eq!(roundtrip("y = m[:, 0]\n"), "y = m[:, 0]\n");
    }

    #[test]
    fn elif_chains_stay_flat() {
        let src = "def f(x):\n    if x > 1:\n        return 1\n    elif x > 0:\n        return 0\n    else:\n        return -1\n";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn nested_else_if_prints_as_elif() {
        let src = "def f(x):\n    if x:\n        return 1\n    else:\n        if y:\n            return 2\n";
        let printed = roundtrip(src);
        assert!(printed.contains("elif y:"));
        let again = roundtrip(&printed);
        assert_eq!(printed, again);
    }

    #[test]
    fn call_spreads_and_keywords() {
        let src = "r = f(1, *rest, key=2, **extra)\n";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn number_lexemes_unchanged() {
        let src = "x = 0x1F + 1_000 + 2.5e-3\n";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn empty_function_body_prints_pass() {
        let m = Module {
            body: vec![Stmt::FunctionDef(FunctionDef {
                name: "f".into(),
                params: Params::default(),
                body: vec![],
                decorators: vec![],
                returns: None,
                is_async: false,
            })],
        };
        assert_eq!(unparse_module(&m), "def f():\n    pass\n");
    }
}
