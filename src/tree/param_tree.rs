use std::collections::BTreeMap;

use super::kind::{NodeKind, Tree};
use crate::tensor::{Numeric, Param, ParamList};

/// An owned tree of parameters.
///
/// `Struct` keeps its fields in declaration order, `Dict` iterates in key
/// order. Both orders are stable, which the traversal relies on.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamTree<T: Numeric> {
    Leaf(Param<T>),
    Struct(Vec<(String, ParamTree<T>)>),
    Dict(BTreeMap<String, ParamTree<T>>),
}

impl<T: Numeric> From<Param<T>> for ParamTree<T> {
    fn from(param: Param<T>) -> Self {
        ParamTree::Leaf(param)
    }
}

impl<T: Numeric> ParamTree<T> {
    pub fn leaf(param: Param<T>) -> Self {
        ParamTree::Leaf(param)
    }

    /// # Panics
    /// Panics on a repeated field name.
    pub fn structure<K: Into<String>>(fields: impl IntoIterator<Item = (K, ParamTree<T>)>) -> Self {
        let mut out: Vec<(String, ParamTree<T>)> = Vec::new();
        for (name, child) in fields {
            let name = name.into();
            assert!(
                out.iter().all(|(existing, _)| *existing != name),
                "duplicate field `{name}`"
            );
            out.push((name, child));
        }
        ParamTree::Struct(out)
    }

    /// Later entries overwrite earlier ones with the same key.
    pub fn dict<K: Into<String>>(entries: impl IntoIterator<Item = (K, ParamTree<T>)>) -> Self {
        ParamTree::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn empty_dict() -> Self {
        ParamTree::Dict(BTreeMap::new())
    }

    pub fn as_param(&self) -> Option<&Param<T>> {
        match self {
            ParamTree::Leaf(param) => Some(param),
            _ => None,
        }
    }

    /// Dotted-path lookup; the empty path is `self`.
    pub fn get(&self, path: &str) -> Option<&ParamTree<T>> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.')
            .try_fold(self, |node, key| Tree::child(node, key))
    }

    /// Leaf handles in traversal order.
    pub fn leaves(&self) -> ParamList<T> {
        let mut out = Vec::new();
        self.for_each_leaf(&mut String::new(), &mut |_, p| out.push(p.clone()));
        out
    }

    /// `(path, leaf)` pairs in traversal order.
    pub fn named_leaves(&self) -> Vec<(String, Param<T>)> {
        let mut out = Vec::new();
        self.for_each_leaf(&mut String::new(), &mut |path, p| {
            out.push((path.to_string(), p.clone()))
        });
        out
    }

    pub fn num_leaves(&self) -> usize {
        let mut count = 0;
        self.for_each_leaf(&mut String::new(), &mut |_, _| count += 1);
        count
    }

    /// Total number of scalar elements over all leaves.
    pub fn num_parameters(&self) -> usize {
        let mut count = 0;
        self.for_each_leaf(&mut String::new(), &mut |_, p| count += p.numel());
        count
    }

    // `ParamTree` is always classifiable, so this skips the error plumbing of
    // `traverse`.
    fn for_each_leaf<F>(&self, path: &mut String, f: &mut F)
    where
        F: FnMut(&str, &Param<T>),
    {
        if let ParamTree::Leaf(param) = self {
            return f(path, param);
        }
        for (name, child) in Tree::children(self) {
            let len = path.len();
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(name);
            child.for_each_leaf(path, f);
            path.truncate(len);
        }
    }

    /// Structure-preserving map over the leaves.
    pub fn map_leaves<U, F>(&self, mut f: F) -> ParamTree<U>
    where
        U: Numeric,
        F: FnMut(&Param<T>) -> Param<U>,
    {
        self.map_inner(&mut f)
    }

    fn map_inner<U, F>(&self, f: &mut F) -> ParamTree<U>
    where
        U: Numeric,
        F: FnMut(&Param<T>) -> Param<U>,
    {
        match self {
            ParamTree::Leaf(param) => ParamTree::Leaf(f(param)),
            ParamTree::Struct(fields) => ParamTree::Struct(
                fields
                    .iter()
                    .map(|(name, child)| (name.clone(), child.map_inner(f)))
                    .collect(),
            ),
            ParamTree::Dict(entries) => ParamTree::Dict(
                entries
                    .iter()
                    .map(|(name, child)| (name.clone(), child.map_inner(f)))
                    .collect(),
            ),
        }
    }

    /// Fallible [`map_leaves`](Self::map_leaves); stops at the first error.
    pub fn try_map_leaves<U, E, F>(&self, mut f: F) -> Result<ParamTree<U>, E>
    where
        U: Numeric,
        F: FnMut(&Param<T>) -> Result<Param<U>, E>,
    {
        self.try_map_inner(&mut f)
    }

    fn try_map_inner<U, E, F>(&self, f: &mut F) -> Result<ParamTree<U>, E>
    where
        U: Numeric,
        F: FnMut(&Param<T>) -> Result<Param<U>, E>,
    {
        Ok(match self {
            ParamTree::Leaf(param) => ParamTree::Leaf(f(param)?),
            ParamTree::Struct(fields) => ParamTree::Struct(
                fields
                    .iter()
                    .map(|(name, child)| -> Result<_, E> { Ok((name.clone(), child.try_map_inner(f)?)) })
                    .collect::<Result<_, E>>()?,
            ),
            ParamTree::Dict(entries) => ParamTree::Dict(
                entries
                    .iter()
                    .map(|(name, child)| -> Result<_, E> { Ok((name.clone(), child.try_map_inner(f)?)) })
                    .collect::<Result<_, E>>()?,
            ),
        })
    }

    /// Same structure, fresh zero-filled leaves. Handy as a gradient companion.
    pub fn zeros_like(&self) -> ParamTree<T> {
        self.map_leaves(|p| Param::new_with_filler(p.shape().to_vec(), T::zero()))
    }

    /// Same structure, every leaf copied into fresh storage.
    pub fn deep_clone(&self) -> ParamTree<T> {
        self.map_leaves(Param::deep_clone)
    }
}

impl<T: Numeric> Tree for ParamTree<T> {
    type Leaf = Param<T>;

    fn kind(&self) -> Option<NodeKind> {
        Some(match self {
            ParamTree::Leaf(_) => NodeKind::Leaf,
            ParamTree::Struct(_) => NodeKind::Struct,
            ParamTree::Dict(_) => NodeKind::Dict,
        })
    }

    fn as_leaf(&self) -> Option<&Param<T>> {
        self.as_param()
    }

    fn children(&self) -> Vec<(&str, &Self)> {
        match self {
            ParamTree::Leaf(_) => vec![],
            ParamTree::Struct(fields) => fields.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            ParamTree::Dict(entries) => entries.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        }
    }

    fn child(&self, key: &str) -> Option<&Self> {
        match self {
            ParamTree::Leaf(_) => None,
            ParamTree::Struct(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            ParamTree::Dict(entries) => entries.get(key),
        }
    }
}
