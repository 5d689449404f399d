//! Canonical-name allocator.
//!
//! Hands out `_glossa_v_N` names in first-occurrence order during the
//! normalizer's pre-order walk. The bijection is on identifier text: all
//! scopes share one table, nested binders keep the running counter going
//! and never reassign a name the walk has already seen.

use indexmap::IndexMap;

use crate::canonical_name;

#[derive(Debug, Default)]
pub struct NameAllocator {
    assigned: IndexMap<String, String>,
    next: usize,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical name for `original`, allocating the next index on first
    /// occurrence.
    pub fn assign(&mut self, original: &str) -> String {
        if let Some(existing) = self.assigned.get(original) {
            return existing.clone();
        }
        let fresh = canonical_name(self.next);
        self.next += 1;
        self.assigned.insert(original.to_string(), fresh.clone());
        fresh
    }

    /// The mapping written into `mapping.json`: canonical to original,
    /// in allocation order.
    pub fn into_name_mapping(self) -> IndexMap<String, String> {
        self.assigned.into_iter().map(|(original, canonical)| (canonical, original)).collect()
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_order() {
        let mut alloc = NameAllocator::new();
        assert_eq!(alloc.assign("sum_list"), "_glossa_v_0");
        assert_eq!(alloc.assign("items"), "_glossa_v_1");
        assert_eq!(alloc.assign("total"), "_glossa_v_2");
        assert_eq!(alloc.assign("items"), "_glossa_v_1");
        assert_eq!(alloc.assign("item"), "_glossa_v_3");
    }

    #[test]
    fn mapping_is_canonical_to_original() {
        let mut alloc = NameAllocator::new();
        alloc.assign("f");
        alloc.assign("x");
        let mapping = alloc.into_name_mapping();
        let keys: Vec<_> = mapping.keys().cloned().collect();
        assert_eq!(keys, vec!["_glossa_v_0", "_glossa_v_1"]);
        assert_eq!(mapping["_glossa_v_0"], "f");
        assert_eq!(mapping["_glossa_v_1"], "x");
    }
}
