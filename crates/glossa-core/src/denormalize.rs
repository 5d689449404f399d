//! Denormalizer: canonical form plus a chosen mapping back to the
//! author-visible code.
//!
//! Inverts the renaming through `name_mapping`, reattaches pool-import
//! aliases, rewrites pool entry calls back to the alias, and restores the
//! author docstring. The output need not be textually identical to the
//! original source, but re-normalizing it reproduces both hashes.

use crate::errors::{PoolError, PoolResult};
use crate::model::MappingRecord;
use crate::normalize::NormalizeOptions;
use crate::syntax::ast::*;
use crate::syntax::parser::parse_module;
use crate::syntax::unparse::unparse_module;
use crate::{canonical_name, is_canonical_name, parse_pool_object_name};

/// Produce author-visible source for one language variant.
pub fn denormalize(
    normalized_code: &str,
    mapping: &MappingRecord,
    opts: &NormalizeOptions,
) -> PoolResult<String> {
    let mut module = parse_module(normalized_code)?;

    let restorer = Restorer { mapping, entry_attr: canonical_name(0) };
    for stmt in &mut module.body {
        restorer.stmt(stmt, opts)?;
    }

    restore_docstring(&mut module, mapping);

    Ok(unparse_module(&module))
}

fn restore_docstring(module: &mut Module, mapping: &MappingRecord) {
    for stmt in &mut module.body {
        if let Stmt::FunctionDef(def) = stmt {
            if matches!(def.body.first(), Some(Stmt::Expr(Expr::Str(_)))) {
                def.body.remove(0);
            }
            if !mapping.docstring.is_empty() {
                def.body.insert(0, Stmt::Expr(Expr::Str(mapping.docstring.clone())));
            }
            return;
        }
    }
}

struct Restorer<'a> {
    mapping: &'a MappingRecord,
    entry_attr: String,
}

impl Restorer<'_> {
    fn rename_back(&self, name: &mut String) -> PoolResult<()> {
        if !is_canonical_name(name) {
            return Ok(());
        }
        match self.mapping.name_mapping.get(name.as_str()) {
            Some(original) => {
                *name = original.clone();
                Ok(())
            }
            None => Err(PoolError::mapping_incomplete(name.clone())),
        }
    }

    /// Alias for a pool object name, when the author had one.
    fn alias_for(&self, object_name: &str) -> Option<&str> {
        let hash = parse_pool_object_name(object_name)?;
        self.mapping.alias_mapping.get(hash).map(String::as_str)
    }

    fn stmt(&self, stmt: &mut Stmt, opts: &NormalizeOptions) -> PoolResult<()> {
        match stmt {
            Stmt::ImportFrom { level, module, names } => {
                if *level == 0 && module == &opts.pool_module {
                    for alias in names {
                        if let Some(local) = self.alias_for(&alias.name) {
                            alias.asname = Some(local.to_string());
                        }
                    }
                }
            }
            Stmt::Import(_) => {}
            Stmt::FunctionDef(def) => self.function(def, opts)?,
            Stmt::Expr(e) | Stmt::Return(Some(e)) => self.expr(e)?,
            Stmt::Return(None) | Stmt::Pass | Stmt::Break | Stmt::Continue => {}
            Stmt::Assign { targets, value } => {
                for t in targets {
                    self.expr(t)?;
                }
                self.expr(value)?;
            }
            Stmt::AugAssign { target, value, .. } => {
                self.expr(target)?;
                self.expr(value)?;
            }
            Stmt::AnnAssign { target, annotation, value } => {
                self.expr(target)?;
                self.expr(annotation)?;
                if let Some(v) = value {
                    self.expr(v)?;
                }
            }
            Stmt::If { test, body, orelse } | Stmt::While { test, body, orelse } => {
                self.expr(test)?;
                for s in body.iter_mut().chain(orelse) {
                    self.stmt(s, opts)?;
                }
            }
            Stmt::For { target, iter, body, orelse, .. } => {
                self.expr(target)?;
                self.expr(iter)?;
                for s in body.iter_mut().chain(orelse) {
                    self.stmt(s, opts)?;
                }
            }
            Stmt::With { items, body, .. } => {
                for item in items {
                    self.expr(&mut item.context)?;
                    if let Some(v) = &mut item.optional_vars {
                        self.expr(v)?;
                    }
                }
                for s in body {
                    self.stmt(s, opts)?;
                }
            }
            Stmt::Try { body, handlers, orelse, finalbody } => {
                for s in body.iter_mut() {
                    self.stmt(s, opts)?;
                }
                for h in handlers {
                    if let Some(t) = &mut h.typ {
                        self.expr(t)?;
                    }
                    if let Some(n) = &mut h.name {
                        self.rename_back(n)?;
                    }
                    for s in &mut h.body {
                        self.stmt(s, opts)?;
                    }
                }
                for s in orelse.iter_mut().chain(finalbody) {
                    self.stmt(s, opts)?;
                }
            }
            Stmt::Raise { exc, cause } => {
                for e in [exc, cause].into_iter().flatten() {
                    self.expr(e)?;
                }
            }
            Stmt::Assert { test, msg } => {
                self.expr(test)?;
                if let Some(m) = msg {
                    self.expr(m)?;
                }
            }
            Stmt::Delete(targets) => {
                for t in targets {
                    self.expr(t)?;
                }
            }
            Stmt::Global(names) | Stmt::Nonlocal(names) => {
                for n in names {
                    self.rename_back(n)?;
                }
            }
        }
        Ok(())
    }

    fn function(&self, def: &mut FunctionDef, opts: &NormalizeOptions) -> PoolResult<()> {
        self.rename_back(&mut def.name)?;
        for p in def.params.iter_mut() {
            self.rename_back(&mut p.name)?;
            if let Some(a) = &mut p.annotation {
                self.expr(a)?;
            }
            if let Some(d) = &mut p.default {
                self.expr(d)?;
            }
        }
        for d in &mut def.decorators {
            self.expr(d)?;
        }
        if let Some(r) = &mut def.returns {
            self.expr(r)?;
        }
        for stmt in &mut def.body {
            self.stmt(stmt, opts)?;
        }
        Ok(())
    }

    fn expr(&self, expr: &mut Expr) -> PoolResult<()> {
        // A pool entry call reverts to the author's alias as a whole.
        if let Expr::Call { func, .. } = expr {
            if let Expr::Attribute { value, attr } = func.as_ref() {
                if *attr == self.entry_attr {
                    if let Expr::Name(obj) = value.as_ref() {
                        if let Some(local) = self.alias_for(obj) {
                            **func = Expr::Name(local.to_string());
                        }
                    }
                }
            }
        }

        match expr {
            Expr::Name(n) => {
                if let Some(local) = self.alias_for(n) {
                    *n = local.to_string();
                } else {
                    self.rename_back(n)?;
                }
            }
            Expr::Attribute { value, .. } => self.expr(value)?,
            Expr::Call { func, args, keywords } => {
                self.expr(func)?;
                for a in args {
                    self.expr(a)?;
                }
                for k in keywords {
                    self.expr(&mut k.value)?;
                }
            }
            Expr::Subscript { value, index } => {
                self.expr(value)?;
                self.expr(index)?;
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr(part)?;
                }
            }
            Expr::Unary { operand, .. } => self.expr(operand)?,
            Expr::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
            }
            Expr::Bool { values, .. } => {
                for v in values {
                    self.expr(v)?;
                }
            }
            Expr::Compare { left, comparators, .. } => {
                self.expr(left)?;
                for c in comparators {
                    self.expr(c)?;
                }
            }
            Expr::IfExp { test, body, orelse } => {
                self.expr(body)?;
                self.expr(test)?;
                self.expr(orelse)?;
            }
            Expr::Lambda { params, body } => {
                for p in params.iter_mut() {
                    self.rename_back(&mut p.name)?;
                    if let Some(d) = &mut p.default {
                        self.expr(d)?;
                    }
                }
                self.expr(body)?;
            }
            Expr::Await(inner) | Expr::Starred(inner) => self.expr(inner)?,
            Expr::Tuple(items) | Expr::List(items) | Expr::Set(items) => {
                for item in items {
                    self.expr(item)?;
                }
            }
            Expr::Dict { keys, values } => {
                for k in keys.iter_mut().flatten() {
                    self.expr(k)?;
                }
                for v in values {
                    self.expr(v)?;
                }
            }
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => {
                self.expr(elt)?;
                self.comprehensions(generators)?;
            }
            Expr::DictComp { key, value, generators } => {
                self.expr(key)?;
                self.expr(value)?;
                self.comprehensions(generators)?;
            }
            Expr::Str(_)
            | Expr::Bytes(_)
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::BoolLit(_)
            | Expr::NoneLit
            | Expr::EllipsisLit => {}
        }
        Ok(())
    }

    fn comprehensions(&self, generators: &mut [Comprehension]) -> PoolResult<()> {
        for g in generators {
            self.expr(&mut g.target)?;
            self.expr(&mut g.iter)?;
            for cond in &mut g.ifs {
                self.expr(cond)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{function_hash, mapping_hash};
    use crate::model::MappingRecord;
    use crate::normalize::{normalize, NormalizeOptions};

    fn mapping_of(r: &crate::normalize::NormalizationResult, comment: &str) -> MappingRecord {
        MappingRecord {
            docstring: r.docstring.clone(),
            name_mapping: r.name_mapping.clone(),
            alias_mapping: r.alias_mapping.clone(),
            comment: comment.to_string(),
        }
    }

    #[test]
    fn round_trip_preserves_both_hashes() {
        let src = "def somme_liste(elements):\n    \"\"\"Somme d'une liste.\"\"\"\n    total = 0\n    for element in elements:\n        total += element\n    return total\n";
        let opts = NormalizeOptions::default();
        let r = normalize(src, &opts).unwrap();
        let mapping = mapping_of(&r, "");

        let restored = denormalize(&r.normalized_code, &mapping, &opts).unwrap();
        assert!(restored.contains("def somme_liste(elements):"));
        assert!(restored.contains("Somme d'une liste."));

        let again = normalize(&restored, &opts).unwrap();
        assert_eq!(
            function_hash(&r.normalized_code_no_docstring),
            function_hash(&again.normalized_code_no_docstring)
        );
        let mapping_again = mapping_of(&again, "");
        assert_eq!(mapping_hash(&mapping).unwrap(), mapping_hash(&mapping_again).unwrap());
    }

    #[test]
    fn pool_alias_restored_on_import_and_call() {
        let h = "a".repeat(64);
        let src = format!(
            "from pool.import import object_{h} as helper\n\ndef apply(x):\n    return helper(x)\n"
        );
        let opts = NormalizeOptions::default();
        let r = normalize(&src, &opts).unwrap();
        let mapping = mapping_of(&r, "");

        let restored = denormalize(&r.normalized_code, &mapping, &opts).unwrap();
        assert!(restored.contains(&format!("from pool.import import object_{h} as helper")));
        assert!(restored.contains("return helper(x)"));
    }

    #[test]
    fn unaliased_pool_reference_left_canonical() {
        let h = "b".repeat(64);
        let src =
            format!("from pool.import import object_{h}\n\ndef go(x):\n    return object_{h}(x)\n");
        let opts = NormalizeOptions::default();
        let r = normalize(&src, &opts).unwrap();
        let mapping = mapping_of(&r, "");

        let restored = denormalize(&r.normalized_code, &mapping, &opts).unwrap();
        assert!(restored.contains(&format!("from pool.import import object_{h}\n")));
        assert!(restored.contains(&format!("object_{h}._glossa_v_0(x)")));

        let again = normalize(&restored, &opts).unwrap();
        assert_eq!(r.normalized_code_no_docstring, again.normalized_code_no_docstring);
    }

    #[test]
    fn empty_docstring_removes_the_node() {
        let src = "def noop():\n    pass\n";
        let opts = NormalizeOptions::default();
        let r = normalize(src, &opts).unwrap();
        assert_eq!(r.docstring, "");
        let mapping = mapping_of(&r, "");
        let restored = denormalize(&r.normalized_code, &mapping, &opts).unwrap();
        assert!(!restored.contains(crate::DOCSTRING_PLACEHOLDER));
        assert_eq!(restored, "def noop():\n    pass\n");
    }

    #[test]
    fn missing_name_entry_is_mapping_incomplete() {
        let src = "def f(x):\n    return x\n";
        let opts = NormalizeOptions::default();
        let r = normalize(src, &opts).unwrap();
        let mut mapping = mapping_of(&r, "");
        mapping.name_mapping.shift_remove("_glossa_v_1");
        let err = denormalize(&r.normalized_code, &mapping, &opts).unwrap_err();
        assert!(matches!(err, PoolError::MappingIncomplete { canonical } if canonical == "_glossa_v_1"));
    }

    #[test]
    fn async_functions_restore_async() {
        let src = "async def fetch(url):\n    return await url\n";
        let opts = NormalizeOptions::default();
        let r = normalize(src, &opts).unwrap();
        let mapping = mapping_of(&r, "");
        let restored = denormalize(&r.normalized_code, &mapping, &opts).unwrap();
        assert!(restored.starts_with("async def fetch(url):"));
        assert!(restored.contains("await url"));
    }
}
