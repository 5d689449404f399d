//! AST normalizer: author code in, canonical form out.
//!
//! The pipeline locates the single function definition, extracts the
//! docstring, classifies imports, strips import aliases, rewrites pool
//! call sites, renames every renameable identifier through the allocator,
//! sorts the import preamble, and prints deterministically. The result
//! carries everything a mapping needs to reverse the transformation.

mod allocator;

pub use allocator::NameAllocator;

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;

use crate::builtins::is_builtin;
use crate::errors::{PoolError, PoolResult};
use crate::syntax::ast::*;
use crate::syntax::parser::parse_module;
use crate::syntax::unparse::unparse_module;
use crate::{canonical_name, is_canonical_name, parse_pool_object_name, DEFAULT_POOL_MODULE, DOCSTRING_PLACEHOLDER};

/// Knobs for the normalizer. The pool-import marker module is data, not a
/// hard-coded constant.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub pool_module: String,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { pool_module: DEFAULT_POOL_MODULE.to_string() }
    }
}

/// Everything produced by one normalization run.
#[derive(Debug, Clone)]
pub struct NormalizationResult {
    /// Canonical source, docstring sentinelized.
    pub normalized_code: String,
    /// Canonical source with the empty docstring literal; hash this.
    pub normalized_code_no_docstring: String,
    /// The author's docstring, verbatim; empty when there was none.
    pub docstring: String,
    /// Canonical identifier to original identifier, allocation order.
    pub name_mapping: IndexMap<String, String>,
    /// Referenced function hash to the author's local alias.
    pub alias_mapping: IndexMap<String, String>,
    /// Pool functions referenced by the canonical code, sorted.
    pub dependencies: Vec<String>,
    pub is_async: bool,
}

/// Normalize one module containing imports and exactly one function.
pub fn normalize(source: &str, opts: &NormalizeOptions) -> PoolResult<NormalizationResult> {
    let mut module = parse_module(source)?;

    let mut imports: Vec<Stmt> = Vec::new();
    let mut defs: Vec<FunctionDef> = Vec::new();
    for stmt in module.body.drain(..) {
        match stmt {
            Stmt::Import(_) | Stmt::ImportFrom { .. } => imports.push(stmt),
            Stmt::FunctionDef(def) => defs.push(def),
            _ => {
                return Err(PoolError::unsupported(
                    "top-level statement outside imports and the function definition",
                    1,
                    1,
                ))
            }
        }
    }
    if defs.len() != 1 {
        return Err(PoolError::multiple_definitions(defs.len()));
    }
    let mut def = defs.pop().expect("length checked");

    let mut ctx = ImportContext::default();
    for stmt in &mut imports {
        ctx.collect(stmt, opts)?;
    }
    ctx.collect_body(&mut def.body, opts)?;

    let docstring = extract_docstring(&mut def.body).unwrap_or_default();
    def.body.insert(0, Stmt::Expr(Expr::Str(DOCSTRING_PLACEHOLDER.to_string())));

    rewrite_function(&mut def, &ctx);

    let mut renamer = Renamer { alloc: NameAllocator::new(), ctx: &ctx };
    renamer.function(&mut def);
    let name_mapping = renamer.alloc.into_name_mapping();

    // Sort the preamble by canonical text; identical imports collapse.
    let mut rendered: Vec<(String, Stmt)> = imports
        .into_iter()
        .map(|stmt| {
            let text = unparse_module(&Module { body: vec![stmt.clone()] });
            (text, stmt)
        })
        .collect();
    rendered.sort_by(|a, b| a.0.cmp(&b.0));
    rendered.dedup_by(|a, b| a.0 == b.0);

    let is_async = def.is_async;
    let mut body: Vec<Stmt> = rendered.into_iter().map(|(_, stmt)| stmt).collect();
    body.push(Stmt::FunctionDef(def));
    let mut canonical = Module { body };

    let normalized_code = unparse_module(&canonical);
    set_module_docstring(&mut canonical, Some(""));
    let normalized_code_no_docstring = unparse_module(&canonical);

    Ok(NormalizationResult {
        normalized_code,
        normalized_code_no_docstring,
        docstring,
        name_mapping,
        alias_mapping: ctx.aliases,
        dependencies: ctx.pool_hashes.into_iter().collect(),
        is_async,
    })
}

/// Re-render `source` with its docstring replaced (`Some`) or removed
/// (`None`). The module must contain exactly one function.
pub fn with_docstring(source: &str, docstring: Option<&str>) -> PoolResult<String> {
    let mut module = parse_module(source)?;
    set_module_docstring(&mut module, docstring);
    Ok(unparse_module(&module))
}

/// Facts the validator needs about a piece of canonical code.
#[derive(Debug, Default, Clone)]
pub struct CodeFacts {
    /// Canonical identifiers referenced or bound, attribute names excluded.
    pub canonical_names: BTreeSet<String>,
    /// Pool hashes referenced via imports or `object_<hash>` names.
    pub pool_hashes: BTreeSet<String>,
}

/// Collect [`CodeFacts`] from canonical source.
pub fn analyze(source: &str, opts: &NormalizeOptions) -> PoolResult<CodeFacts> {
    let module = parse_module(source)?;
    let mut facts = CodeFacts::default();
    for stmt in &module.body {
        facts_stmt(stmt, opts, &mut facts);
    }
    Ok(facts)
}

fn extract_docstring(body: &mut Vec<Stmt>) -> Option<String> {
    match body.first() {
        Some(Stmt::Expr(Expr::Str(_))) => match body.remove(0) {
            Stmt::Expr(Expr::Str(s)) => Some(s),
            _ => unreachable!("first statement re-checked"),
        },
        _ => None,
    }
}

fn set_module_docstring(module: &mut Module, docstring: Option<&str>) {
    for stmt in &mut module.body {
        if let Stmt::FunctionDef(def) = stmt {
            if matches!(def.body.first(), Some(Stmt::Expr(Expr::Str(_)))) {
                def.body.remove(0);
            }
            if let Some(d) = docstring {
                def.body.insert(0, Stmt::Expr(Expr::Str(d.to_string())));
            }
            return;
        }
    }
}

// ── import classification ───────────────────────────────────────────────

#[derive(Debug, Default)]
struct ImportContext {
    /// Names bound by imports; never renamed.
    donot: HashSet<String>,
    /// Stripped alias to the expression it reverts to.
    rewrites: HashMap<String, Expr>,
    /// Pool hash to the author's alias.
    aliases: IndexMap<String, String>,
    /// `object_<hash>` names bound by pool imports.
    pool_names: HashSet<String>,
    pool_hashes: BTreeSet<String>,
}

impl ImportContext {
    fn collect(&mut self, stmt: &mut Stmt, opts: &NormalizeOptions) -> PoolResult<()> {
        match stmt {
            Stmt::Import(names) => {
                for alias in names {
                    if let Some(local) = alias.asname.take() {
                        self.rewrites.insert(local, dotted_expr(&alias.name));
                    }
                    let first = alias.name.split('.').next().unwrap_or(&alias.name);
                    self.donot.insert(first.to_string());
                }
            }
            Stmt::ImportFrom { level, module, names } => {
                if *level == 0 && module == &opts.pool_module {
                    for alias in names {
                        let hash = parse_pool_object_name(&alias.name)
                            .ok_or_else(|| {
                                PoolError::unsupported(
                                    format!(
                                        "pool import must bind an object_<hash> name, got {:?}",
                                        alias.name
                                    ),
                                    1,
                                    1,
                                )
                            })?
                            .to_string();
                        if let Some(local) = alias.asname.take() {
                            self.rewrites.insert(local.clone(), Expr::Name(alias.name.clone()));
                            self.aliases.insert(hash.clone(), local);
                        }
                        self.donot.insert(alias.name.clone());
                        self.pool_names.insert(alias.name.clone());
                        self.pool_hashes.insert(hash);
                    }
                } else {
                    for alias in names {
                        if let Some(local) = alias.asname.take() {
                            self.rewrites.insert(local, Expr::Name(alias.name.clone()));
                        }
                        self.donot.insert(alias.name.clone());
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Imports nested inside the function body count too.
    fn collect_body(&mut self, body: &mut [Stmt], opts: &NormalizeOptions) -> PoolResult<()> {
        for stmt in body {
            match stmt {
                Stmt::Import(_) | Stmt::ImportFrom { .. } => self.collect(stmt, opts)?,
                Stmt::FunctionDef(def) => self.collect_body(&mut def.body, opts)?,
                Stmt::If { body, orelse, .. } | Stmt::While { body, orelse, .. } => {
                    self.collect_body(body, opts)?;
                    self.collect_body(orelse, opts)?;
                }
                Stmt::For { body, orelse, .. } => {
                    self.collect_body(body, opts)?;
                    self.collect_body(orelse, opts)?;
                }
                Stmt::With { body, .. } => self.collect_body(body, opts)?,
                Stmt::Try { body, handlers, orelse, finalbody } => {
                    self.collect_body(body, opts)?;
                    for h in handlers {
                        self.collect_body(&mut h.body, opts)?;
                    }
                    self.collect_body(orelse, opts)?;
                    self.collect_body(finalbody, opts)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn dotted_expr(path: &str) -> Expr {
    let mut parts = path.split('.');
    let mut expr = Expr::Name(parts.next().unwrap_or(path).to_string());
    for part in parts {
        expr = Expr::Attribute { value: Box::new(expr), attr: part.to_string() };
    }
    expr
}

// ── alias reversal and pool call rewriting ──────────────────────────────

fn rewrite_function(def: &mut FunctionDef, ctx: &ImportContext) {
    for d in &mut def.decorators {
        rewrite_expr(d, ctx);
    }
    for p in def.params.iter_mut() {
        if let Some(a) = &mut p.annotation {
            rewrite_expr(a, ctx);
        }
        if let Some(d) = &mut p.default {
            rewrite_expr(d, ctx);
        }
    }
    if let Some(r) = &mut def.returns {
        rewrite_expr(r, ctx);
    }
    for stmt in &mut def.body {
        rewrite_stmt(stmt, ctx);
    }
}

fn rewrite_stmt(stmt: &mut Stmt, ctx: &ImportContext) {
    match stmt {
        Stmt::FunctionDef(def) => rewrite_function(def, ctx),
        Stmt::Expr(e) | Stmt::Return(Some(e)) => rewrite_expr(e, ctx),
        Stmt::Return(None) | Stmt::Pass | Stmt::Break | Stmt::Continue => {}
        Stmt::Assign { targets, value } => {
            for t in targets {
                rewrite_expr(t, ctx);
            }
            rewrite_expr(value, ctx);
        }
        Stmt::AugAssign { target, value, .. } => {
            rewrite_expr(target, ctx);
            rewrite_expr(value, ctx);
        }
        Stmt::AnnAssign { target, annotation, value } => {
            rewrite_expr(target, ctx);
            rewrite_expr(annotation, ctx);
            if let Some(v) = value {
                rewrite_expr(v, ctx);
            }
        }
        Stmt::If { test, body, orelse } | Stmt::While { test, body, orelse } => {
            rewrite_expr(test, ctx);
            for s in body {
                rewrite_stmt(s, ctx);
            }
            for s in orelse {
                rewrite_stmt(s, ctx);
            }
        }
        Stmt::For { target, iter, body, orelse, .. } => {
            rewrite_expr(target, ctx);
            rewrite_expr(iter, ctx);
            for s in body {
                rewrite_stmt(s, ctx);
            }
            for s in orelse {
                rewrite_stmt(s, ctx);
            }
        }
        Stmt::With { items, body, .. } => {
            for item in items {
                rewrite_expr(&mut item.context, ctx);
                if let Some(v) = &mut item.optional_vars {
                    rewrite_expr(v, ctx);
                }
            }
            for s in body {
                rewrite_stmt(s, ctx);
            }
        }
        Stmt::Try { body, handlers, orelse, finalbody } => {
            for s in body {
                rewrite_stmt(s, ctx);
            }
            for h in handlers {
                if let Some(t) = &mut h.typ {
                    rewrite_expr(t, ctx);
                }
                for s in &mut h.body {
                    rewrite_stmt(s, ctx);
                }
            }
            for s in orelse {
                rewrite_stmt(s, ctx);
            }
            for s in finalbody {
                rewrite_stmt(s, ctx);
            }
        }
        Stmt::Raise { exc, cause } => {
            if let Some(e) = exc {
                rewrite_expr(e, ctx);
            }
            if let Some(c) = cause {
                rewrite_expr(c, ctx);
            }
        }
        Stmt::Assert { test, msg } => {
            rewrite_expr(test, ctx);
            if let Some(m) = msg {
                rewrite_expr(m, ctx);
            }
        }
        Stmt::Delete(targets) => {
            for t in targets {
                rewrite_expr(t, ctx);
            }
        }
        Stmt::Global(_) | Stmt::Nonlocal(_) | Stmt::Import(_) | Stmt::ImportFrom { .. } => {}
    }
}

fn rewrite_expr(expr: &mut Expr, ctx: &ImportContext) {
    // Pool call sites gain the canonical entry attribute before generic
    // alias replacement runs on the callee name.
    if let Expr::Call { func, .. } = expr {
        if let Expr::Name(n) = func.as_ref() {
            let object_name = if ctx.pool_names.contains(n) {
                Some(n.clone())
            } else {
                match ctx.rewrites.get(n) {
                    Some(Expr::Name(obj)) if ctx.pool_names.contains(obj) => Some(obj.clone()),
                    _ => None,
                }
            };
            if let Some(obj) = object_name {
                **func = Expr::Attribute {
                    value: Box::new(Expr::Name(obj)),
                    attr: canonical_name(0),
                };
            }
        }
    }

    match expr {
        Expr::Name(n) => {
            if let Some(replacement) = ctx.rewrites.get(n) {
                *expr = replacement.clone();
            }
        }
        Expr::Attribute { value, .. } => rewrite_expr(value, ctx),
        Expr::Call { func, args, keywords } => {
            rewrite_expr(func, ctx);
            for a in args {
                rewrite_expr(a, ctx);
            }
            for k in keywords {
                rewrite_expr(&mut k.value, ctx);
            }
        }
        Expr::Subscript { value, index } => {
            rewrite_expr(value, ctx);
            rewrite_expr(index, ctx);
        }
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                rewrite_expr(part, ctx);
            }
        }
        Expr::Unary { operand, .. } => rewrite_expr(operand, ctx),
        Expr::Binary { left, right, .. } => {
            rewrite_expr(left, ctx);
            rewrite_expr(right, ctx);
        }
        Expr::Bool { values, .. } => {
            for v in values {
                rewrite_expr(v, ctx);
            }
        }
        Expr::Compare { left, comparators, .. } => {
            rewrite_expr(left, ctx);
            for c in comparators {
                rewrite_expr(c, ctx);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            rewrite_expr(body, ctx);
            rewrite_expr(test, ctx);
            rewrite_expr(orelse, ctx);
        }
        Expr::Lambda { params, body } => {
            for p in params.iter_mut() {
                if let Some(d) = &mut p.default {
                    rewrite_expr(d, ctx);
                }
            }
            rewrite_expr(body, ctx);
        }
        Expr::Await(inner) | Expr::Starred(inner) => rewrite_expr(inner, ctx),
        Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => {
            for item in items {
                rewrite_expr(item, ctx);
            }
        }
        Expr::Dict { keys, values } => {
            for k in keys.iter_mut().flatten() {
                rewrite_expr(k, ctx);
            }
            for v in values {
                rewrite_expr(v, ctx);
            }
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => {
            rewrite_expr(elt, ctx);
            rewrite_comprehensions(generators, ctx);
        }
        Expr::DictComp { key, value, generators } => {
            rewrite_expr(key, ctx);
            rewrite_expr(value, ctx);
            rewrite_comprehensions(generators, ctx);
        }
        Expr::Str(_)
        | Expr::Bytes(_)
        | Expr::Int(_)
        | Expr::Float(_)
        | Expr::BoolLit(_)
        | Expr::NoneLit
        | Expr::EllipsisLit => {}
    }
}

fn rewrite_comprehensions(generators: &mut [Comprehension], ctx: &ImportContext) {
    for g in generators {
        rewrite_expr(&mut g.target, ctx);
        rewrite_expr(&mut g.iter, ctx);
        for cond in &mut g.ifs {
            rewrite_expr(cond, ctx);
        }
    }
}

// ── renaming ────────────────────────────────────────────────────────────

struct Renamer<'a> {
    alloc: NameAllocator,
    ctx: &'a ImportContext,
}

impl Renamer<'_> {
    fn renameable(&self, name: &str) -> bool {
        !self.ctx.donot.contains(name) && !is_builtin(name)
    }

    fn rename(&mut self, name: &mut String) {
        if self.renameable(name) {
            *name = self.alloc.assign(name);
        }
    }

    /// Walk order fixes the allocation order: function name, parameter
    /// names in declaration order, decorators, parameter annotations and
    /// defaults, return annotation, body.
    fn function(&mut self, def: &mut FunctionDef) {
        self.rename(&mut def.name);
        for p in def.params.iter_mut() {
            self.rename(&mut p.name);
        }
        for d in &mut def.decorators {
            self.expr(d);
        }
        for p in def.params.iter_mut() {
            if let Some(a) = &mut p.annotation {
                self.expr(a);
            }
            if let Some(d) = &mut p.default {
                self.expr(d);
            }
        }
        if let Some(r) = &mut def.returns {
            self.expr(r);
        }
        for stmt in &mut def.body {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => self.function(def),
            Stmt::Expr(e) | Stmt::Return(Some(e)) => self.expr(e),
            Stmt::Return(None) | Stmt::Pass | Stmt::Break | Stmt::Continue => {}
            Stmt::Assign { targets, value } => {
                for t in targets {
                    self.expr(t);
                }
                self.expr(value);
            }
            Stmt::AugAssign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            Stmt::AnnAssign { target, annotation, value } => {
                self.expr(target);
                self.expr(annotation);
                if let Some(v) = value {
                    self.expr(v);
                }
            }
            Stmt::If { test, body, orelse } | Stmt::While { test, body, orelse } => {
                self.expr(test);
                for s in body {
                    self.stmt(s);
                }
                for s in orelse {
                    self.stmt(s);
                }
            }
            Stmt::For { target, iter, body, orelse, .. } => {
                self.expr(target);
                self.expr(iter);
                for s in body {
                    self.stmt(s);
                }
                for s in orelse {
                    self.stmt(s);
                }
            }
            Stmt::With { items, body, .. } => {
                for item in items {
                    self.expr(&mut item.context);
                    if let Some(v) = &mut item.optional_vars {
                        self.expr(v);
                    }
                }
                for s in body {
                    self.stmt(s);
                }
            }
            Stmt::Try { body, handlers, orelse, finalbody } => {
                for s in body {
                    self.stmt(s);
                }
                for h in handlers {
                    if let Some(t) = &mut h.typ {
                        self.expr(t);
                    }
                    if let Some(n) = &mut h.name {
                        self.rename(n);
                    }
                    for s in &mut h.body {
                        self.stmt(s);
                    }
                }
                for s in orelse {
                    self.stmt(s);
                }
                for s in finalbody {
                    self.stmt(s);
                }
            }
            Stmt::Raise { exc, cause } => {
                if let Some(e) = exc {
                    self.expr(e);
                }
                if let Some(c) = cause {
                    self.expr(c);
                }
            }
            Stmt::Assert { test, msg } => {
                self.expr(test);
                if let Some(m) = msg {
                    self.expr(m);
                }
            }
            Stmt::Delete(targets) => {
                for t in targets {
                    self.expr(t);
                }
            }
            Stmt::Global(names) | Stmt::Nonlocal(names) => {
                for n in names {
                    self.rename(n);
                }
            }
            Stmt::Import(_) | Stmt::ImportFrom { .. } => {}
        }
    }

    fn expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Name(n) => self.rename(n),
            Expr::Attribute { value, .. } => self.expr(value),
            Expr::Call { func, args, keywords } => {
                self.expr(func);
                for a in args {
                    self.expr(a);
                }
                // Keyword names at call sites stay; values are walked.
                for k in keywords {
                    self.expr(&mut k.value);
                }
            }
            Expr::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr(part);
                }
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Binary { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Bool { values, .. } => {
                for v in values {
                    self.expr(v);
                }
            }
            Expr::Compare { left, comparators, .. } => {
                self.expr(left);
                for c in comparators {
                    self.expr(c);
                }
            }
            Expr::IfExp { test, body, orelse } => {
                self.expr(body);
                self.expr(test);
                self.expr(orelse);
            }
            Expr::Lambda { params, body } => {
                for p in params.iter_mut() {
                    self.rename(&mut p.name);
                }
                for p in params.iter_mut() {
                    if let Some(d) = &mut p.default {
                        self.expr(d);
                    }
                }
                self.expr(body);
            }
            Expr::Await(inner) | Expr::Starred(inner) => self.expr(inner),
            Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => {
                for item in items {
                    self.expr(item);
                }
            }
            Expr::Dict { keys, values } => {
                for i in 0..values.len() {
                    if let Some(k) = keys.get_mut(i).and_then(|k| k.as_mut()) {
                        self.expr(k);
                    }
                    self.expr(&mut values[i]);
                }
            }
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => {
                self.expr(elt);
                self.comprehensions(generators);
            }
            Expr::DictComp { key, value, generators } => {
                self.expr(key);
                self.expr(value);
                self.comprehensions(generators);
            }
            Expr::Str(_)
            | Expr::Bytes(_)
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::BoolLit(_)
            | Expr::NoneLit
            | Expr::EllipsisLit => {}
        }
    }

    fn comprehensions(&mut self, generators: &mut [Comprehension]) {
        for g in generators {
            self.expr(&mut g.target);
            self.expr(&mut g.iter);
            for cond in &mut g.ifs {
                self.expr(cond);
            }
        }
    }
}

// ── validator-facing analysis ───────────────────────────────────────────

fn facts_stmt(stmt: &Stmt, opts: &NormalizeOptions, facts: &mut CodeFacts) {
    match stmt {
        Stmt::ImportFrom { level, module, names } if *level == 0 && module == &opts.pool_module => {
            for alias in names {
                if let Some(hash) = parse_pool_object_name(&alias.name) {
                    facts.pool_hashes.insert(hash.to_string());
                }
            }
        }
        Stmt::FunctionDef(def) => {
            facts_name(&def.name, facts);
            for p in def.params.iter() {
                facts_name(&p.name, facts);
                if let Some(a) = &p.annotation {
                    facts_expr(a, facts);
                }
                if let Some(d) = &p.default {
                    facts_expr(d, facts);
                }
            }
            for d in &def.decorators {
                facts_expr(d, facts);
            }
            if let Some(r) = &def.returns {
                facts_expr(r, facts);
            }
            for s in &def.body {
                facts_stmt(s, opts, facts);
            }
        }
        Stmt::Expr(e) | Stmt::Return(Some(e)) => facts_expr(e, facts),
        Stmt::Assign { targets, value } => {
            for t in targets {
                facts_expr(t, facts);
            }
            facts_expr(value, facts);
        }
        Stmt::AugAssign { target, value, .. } => {
            facts_expr(target, facts);
            facts_expr(value, facts);
        }
        Stmt::AnnAssign { target, annotation, value } => {
            facts_expr(target, facts);
            facts_expr(annotation, facts);
            if let Some(v) = value {
                facts_expr(v, facts);
            }
        }
        Stmt::If { test, body, orelse } | Stmt::While { test, body, orelse } => {
            facts_expr(test, facts);
            for s in body.iter().chain(orelse) {
                facts_stmt(s, opts, facts);
            }
        }
        Stmt::For { target, iter, body, orelse, .. } => {
            facts_expr(target, facts);
            facts_expr(iter, facts);
            for s in body.iter().chain(orelse) {
                facts_stmt(s, opts, facts);
            }
        }
        Stmt::With { items, body, .. } => {
            for item in items {
                facts_expr(&item.context, facts);
                if let Some(v) = &item.optional_vars {
                    facts_expr(v, facts);
                }
            }
            for s in body {
                facts_stmt(s, opts, facts);
            }
        }
        Stmt::Try { body, handlers, orelse, finalbody } => {
            for s in body.iter().chain(orelse).chain(finalbody) {
                facts_stmt(s, opts, facts);
            }
            for h in handlers {
                if let Some(t) = &h.typ {
                    facts_expr(t, facts);
                }
                if let Some(n) = &h.name {
                    facts_name(n, facts);
                }
                for s in &h.body {
                    facts_stmt(s, opts, facts);
                }
            }
        }
        Stmt::Raise { exc, cause } => {
            for e in [exc, cause].into_iter().flatten() {
                facts_expr(e, facts);
            }
        }
        Stmt::Assert { test, msg } => {
            facts_expr(test, facts);
            if let Some(m) = msg {
                facts_expr(m, facts);
            }
        }
        Stmt::Delete(targets) => {
            for t in targets {
                facts_expr(t, facts);
            }
        }
        Stmt::Global(names) | Stmt::Nonlocal(names) => {
            for n in names {
                facts_name(n, facts);
            }
        }
        _ => {}
    }
}

fn facts_name(name: &str, facts: &mut CodeFacts) {
    if is_canonical_name(name) {
        facts.canonical_names.insert(name.to_string());
    }
    if let Some(hash) = parse_pool_object_name(name) {
        facts.pool_hashes.insert(hash.to_string());
    }
}

fn facts_expr(expr: &Expr, facts: &mut CodeFacts) {
    match expr {
        Expr::Name(n) => facts_name(n, facts),
        Expr::Attribute { value, .. } => facts_expr(value, facts),
        Expr::Call { func, args, keywords } => {
            facts_expr(func, facts);
            for a in args {
                facts_expr(a, facts);
            }
            for k in keywords {
                facts_expr(&k.value, facts);
            }
        }
        Expr::Subscript { value, index } => {
            facts_expr(value, facts);
            facts_expr(index, facts);
        }
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].iter().filter_map(|p| p.as_deref()) {
                facts_expr(part, facts);
            }
        }
        Expr::Unary { operand, .. } => facts_expr(operand, facts),
        Expr::Binary { left, right, .. } => {
            facts_expr(left, facts);
            facts_expr(right, facts);
        }
        Expr::Bool { values, .. } => {
            for v in values {
                facts_expr(v, facts);
            }
        }
        Expr::Compare { left, comparators, .. } => {
            facts_expr(left, facts);
            for c in comparators {
                facts_expr(c, facts);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            facts_expr(body, facts);
            facts_expr(test, facts);
            facts_expr(orelse, facts);
        }
        Expr::Lambda { params, body } => {
            for p in params.iter() {
                facts_name(&p.name, facts);
                if let Some(d) = &p.default {
                    facts_expr(d, facts);
                }
            }
            facts_expr(body, facts);
        }
        Expr::Await(inner) | Expr::Starred(inner) => facts_expr(inner, facts),
        Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => {
            for item in items {
                facts_expr(item, facts);
            }
        }
        Expr::Dict { keys, values } => {
            for k in keys.iter().flatten() {
                facts_expr(k, facts);
            }
            for v in values {
                facts_expr(v, facts);
            }
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => {
            facts_expr(elt, facts);
            for g in generators {
                facts_expr(&g.target, facts);
                facts_expr(&g.iter, facts);
                for cond in &g.ifs {
                    facts_expr(cond, facts);
                }
            }
        }
        Expr::DictComp { key, value, generators } => {
            facts_expr(key, facts);
            facts_expr(value, facts);
            for g in generators {
                facts_expr(&g.target, facts);
                facts_expr(&g.iter, facts);
                for cond in &g.ifs {
                    facts_expr(cond, facts);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::function_hash;

    const SUM_LIST: &str = "def sum_list(items):\n    \"\"\"Sum a list\"\"\"\n    total = 0\n    for item in items:\n        total += item\n    return total\n";

    #[test]
    fn scenario_sum_list_naming() {
        let r = normalize(SUM_LIST, &NormalizeOptions::default()).unwrap();
        let keys: Vec<_> = r.name_mapping.keys().cloned().collect();
        assert_eq!(keys, vec!["_glossa_v_0", "_glossa_v_1", "_glossa_v_2", "_glossa_v_3"]);
        assert_eq!(r.name_mapping["_glossa_v_0"], "sum_list");
        assert_eq!(r.name_mapping["_glossa_v_1"], "items");
        assert_eq!(r.name_mapping["_glossa_v_2"], "total");
        assert_eq!(r.name_mapping["_glossa_v_3"], "item");
        assert_eq!(r.docstring, "Sum a list");
        assert!(r.normalized_code.contains("\"__glossa_docstring__\""));
        assert!(r.normalized_code_no_docstring.contains("\"\"\n"));
        assert!(!r.is_async);
    }

    #[test]
    fn normalization_is_deterministic() {
        let a = normalize(SUM_LIST, &NormalizeOptions::default()).unwrap();
        let b = normalize(SUM_LIST, &NormalizeOptions::default()).unwrap();
        assert_eq!(a.normalized_code, b.normalized_code);
        assert_eq!(
            function_hash(&a.normalized_code_no_docstring),
            function_hash(&b.normalized_code_no_docstring)
        );
    }

    #[test]
    fn docstring_does_not_affect_identity() {
        let other = SUM_LIST.replace("Sum a list", "Somme d'une liste");
        let a = normalize(SUM_LIST, &NormalizeOptions::default()).unwrap();
        let b = normalize(&other, &NormalizeOptions::default()).unwrap();
        assert_eq!(a.normalized_code_no_docstring, b.normalized_code_no_docstring);
        assert_eq!(a.normalized_code, b.normalized_code);
        assert_eq!(a.docstring, "Sum a list");
        assert_eq!(b.docstring, "Somme d'une liste");
    }

    #[test]
    fn identifiers_do_not_affect_identity() {
        let french = "def somme_liste(elements):\n    \"\"\"Somme\"\"\"\n    total = 0\n    for element in elements:\n        total += element\n    return total\n";
        let a = normalize(SUM_LIST, &NormalizeOptions::default()).unwrap();
        let b = normalize(french, &NormalizeOptions::default()).unwrap();
        assert_eq!(a.normalized_code_no_docstring, b.normalized_code_no_docstring);
        assert_eq!(b.name_mapping["_glossa_v_0"], "somme_liste");
    }

    #[test]
    fn builtins_and_keyword_args_survive() {
        let src = "def shout(text):\n    print(len(text), sep=\"-\")\n    return text\n";
        let r = normalize(src, &NormalizeOptions::default()).unwrap();
        assert!(r.normalized_code.contains("print"));
        assert!(r.normalized_code.contains("len"));
        assert!(r.normalized_code.contains("sep="));
        assert!(!r.name_mapping.values().any(|v| v == "print" || v == "len"));
    }

    #[test]
    fn import_aliases_are_stripped_and_references_revert() {
        let src = "import numpy as np\nfrom os.path import join as j\n\ndef load(p):\n    return np.array(j(p, \"x\"))\n";
        let r = normalize(src, &NormalizeOptions::default()).unwrap();
        assert!(r.normalized_code.contains("import numpy\n"));
        assert!(r.normalized_code.contains("from os.path import join\n"));
        assert!(r.normalized_code.contains("numpy.array"));
        assert!(r.normalized_code.contains("join(_glossa_v_1"));
        assert!(!r.normalized_code.contains("np."));
        // aliases change nothing about identity
        let plain = "import numpy\nfrom os.path import join\n\ndef load(p):\n    return numpy.array(join(p, \"x\"))\n";
        let q = normalize(plain, &NormalizeOptions::default()).unwrap();
        assert_eq!(r.normalized_code_no_docstring, q.normalized_code_no_docstring);
    }

    #[test]
    fn dotted_import_alias_reverts_to_attribute_chain() {
        let src = "import collections.abc as cabc\n\ndef f(x):\n    return cabc.Iterable\n";
        let r = normalize(src, &NormalizeOptions::default()).unwrap();
        assert!(r.normalized_code.contains("import collections.abc\n"));
        assert!(r.normalized_code.contains("collections.abc.Iterable"));
    }

    #[test]
    fn imports_sort_lexicographically() {
        let src = "import zlib\nimport base64\n\ndef f(x):\n    return zlib.crc32(base64.b64decode(x))\n";
        let r = normalize(src, &NormalizeOptions::default()).unwrap();
        let z = r.normalized_code.find("import zlib").unwrap();
        let b = r.normalized_code.find("import base64").unwrap();
        assert!(b < z);
    }

    #[test]
    fn pool_import_canonicalization() {
        let h = "c".repeat(64);
        let src = format!(
            "from pool.import import object_{h} as helper\n\ndef apply(x):\n    return helper(x)\n"
        );
        let r = normalize(&src, &NormalizeOptions::default()).unwrap();
        assert!(r.normalized_code.contains(&format!("from pool.import import object_{h}\n")));
        assert!(r.normalized_code.contains(&format!("object_{h}._glossa_v_0(_glossa_v_1)")));
        assert!(!r.normalized_code.contains("helper"));
        assert_eq!(r.alias_mapping[&h], "helper");
        assert_eq!(r.dependencies, vec![h.clone()]);
        // alias choice does not affect identity
        let src2 = format!(
            "from pool.import import object_{h} as aide\n\ndef appliquer(x):\n    return aide(x)\n"
        );
        let q = normalize(&src2, &NormalizeOptions::default()).unwrap();
        assert_eq!(r.normalized_code_no_docstring, q.normalized_code_no_docstring);
        assert_eq!(q.alias_mapping[&h], "aide");
    }

    #[test]
    fn unaliased_pool_call_gets_entry_attribute() {
        let h = "d".repeat(64);
        let src =
            format!("from pool.import import object_{h}\n\ndef go(x):\n    return object_{h}(x)\n");
        let r = normalize(&src, &NormalizeOptions::default()).unwrap();
        assert!(r.normalized_code.contains(&format!("object_{h}._glossa_v_0(_glossa_v_1)")));
        assert!(r.alias_mapping.is_empty());
    }

    #[test]
    fn multiple_definitions_rejected() {
        let src = "def a():\n    pass\n\ndef b():\n    pass\n";
        let err = normalize(src, &NormalizeOptions::default()).unwrap_err();
        assert!(matches!(err, PoolError::MultipleDefinitions { count: 2 }));
        let err = normalize("import os\n", &NormalizeOptions::default()).unwrap_err();
        assert!(matches!(err, PoolError::MultipleDefinitions { count: 0 }));
    }

    #[test]
    fn top_level_statement_rejected() {
        let err = normalize("x = 1\n\ndef f():\n    pass\n", &NormalizeOptions::default())
            .unwrap_err();
        assert!(matches!(err, PoolError::UnsupportedConstruct { .. }));
    }

    #[test]
    fn async_preserved() {
        let src = "async def fetch(url):\n    return await url\n";
        let r = normalize(src, &NormalizeOptions::default()).unwrap();
        assert!(r.is_async);
        assert!(r.normalized_code.contains("async def _glossa_v_0"));
        assert!(r.normalized_code.contains("await _glossa_v_1"));
    }

    #[test]
    fn nested_scopes_share_the_counter() {
        let src = "def outer(x):\n    def inner(y):\n        return y + x\n    return inner\n";
        let r = normalize(src, &NormalizeOptions::default()).unwrap();
        assert_eq!(r.name_mapping["_glossa_v_0"], "outer");
        assert_eq!(r.name_mapping["_glossa_v_1"], "x");
        assert_eq!(r.name_mapping["_glossa_v_2"], "inner");
        assert_eq!(r.name_mapping["_glossa_v_3"], "y");
    }

    #[test]
    fn decorators_are_renamed() {
        let src = "@memoize\ndef fib(n):\n    return n\n";
        let r = normalize(src, &NormalizeOptions::default()).unwrap();
        // function name first, then params, then decorator expression
        assert_eq!(r.name_mapping["_glossa_v_0"], "fib");
        assert_eq!(r.name_mapping["_glossa_v_1"], "n");
        assert_eq!(r.name_mapping["_glossa_v_2"], "memoize");
        assert!(r.normalized_code.contains("@_glossa_v_2"));
    }

    #[test]
    fn global_and_del_renamed() {
        let src = "def bump():\n    global counter\n    counter = counter + 1\n    del counter\n";
        let r = normalize(src, &NormalizeOptions::default()).unwrap();
        assert!(r.normalized_code.contains("global _glossa_v_1"));
        assert!(r.normalized_code.contains("del _glossa_v_1"));
    }

    #[test]
    fn local_imports_excluded_from_renaming() {
        let src = "def stamp(x):\n    import time as t\n    return t.time() + x\n";
        let r = normalize(src, &NormalizeOptions::default()).unwrap();
        assert!(r.normalized_code.contains("import time\n") || r.normalized_code.contains("    import time\n"));
        assert!(r.normalized_code.contains("time.time()"));
        assert!(!r.name_mapping.values().any(|v| v == "time" || v == "t"));
    }

    #[test]
    fn with_docstring_helper_replaces_and_removes() {
        let r = normalize(SUM_LIST, &NormalizeOptions::default()).unwrap();
        let emptied = with_docstring(&r.normalized_code, Some("")).unwrap();
        assert_eq!(emptied, r.normalized_code_no_docstring);
        let removed = with_docstring(&r.normalized_code, None).unwrap();
        assert!(!removed.contains(DOCSTRING_PLACEHOLDER));
    }

    #[test]
    fn analyze_reports_names_and_hashes() {
        let h = "e".repeat(64);
        let src = format!(
            "from pool.import import object_{h} as helper\n\ndef go(x):\n    return helper(x)\n"
        );
        let r = normalize(&src, &NormalizeOptions::default()).unwrap();
        let facts = analyze(&r.normalized_code, &NormalizeOptions::default()).unwrap();
        assert!(facts.canonical_names.contains("_glossa_v_0"));
        assert!(facts.canonical_names.contains("_glossa_v_1"));
        assert_eq!(facts.pool_hashes.len(), 1);
        assert!(facts.pool_hashes.contains(&h));
    }

    #[test]
    fn normalizing_canonical_code_is_idempotent() {
        let h = "f".repeat(64);
        let src = format!(
            "from pool.import import object_{h} as helper\n\ndef apply(x):\n    \"\"\"Apply\"\"\"\n    return helper(x)\n"
        );
        let first = normalize(&src, &NormalizeOptions::default()).unwrap();
        let second = normalize(&first.normalized_code, &NormalizeOptions::default()).unwrap();
        assert_eq!(
            first.normalized_code_no_docstring,
            second.normalized_code_no_docstring
        );
    }
}
