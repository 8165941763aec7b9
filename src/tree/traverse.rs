//! Apply a function to every trainable leaf of a tree, zipping companion trees
//! alongside by name.
//!
//! The walk is depth-first and only leaves reach the callback. At each
//! container the companions' children are resolved for *every* child of the
//! root before the walk descends, so a structural mismatch surfaces before the
//! callback has seen any leaf below that container.
//!
//! Companions are matched by key, never by position:
//! - a dict companion missing a key yields [`Companion::Absent`] for that whole
//!   subtree,
//! - a struct companion missing a field is a [`TreeError::StructuralMismatch`],
//! - extra companion keys are ignored.
//!
//! There is no cycle detection. [`ParamTree`](super::ParamTree) cannot form
//! cycles, but a custom [`Tree`] whose `children` loop back will recurse until
//! the stack runs out.

use itertools::Itertools;

use super::kind::{Companion, NodeKind, Tree};
use crate::error::TreeError;

/// Walk `root`, calling `f(leaf, companions_at_leaf)` for each trainable leaf.
///
/// `companions_at_leaf` always has `companions.len()` entries, in the same
/// order as `companions`.
///
/// ```
/// # use light_harness::tensor::Param;
/// # use light_harness::tree::{traverse, ParamTree};
/// let params = ParamTree::structure([("w", ParamTree::leaf(Param::new(vec![1.0, 2.0], vec![2])))]);
/// let grads = params.zeros_like();
/// let mut seen = 0;
/// traverse(
///     |_leaf, companions| {
///         assert!(companions[0].leaf().is_some());
///         seen += 1;
///     },
///     &params,
///     &[&grads],
/// )
/// .unwrap();
/// assert_eq!(seen, 1);
/// ```
pub fn traverse<'a, N, F>(mut f: F, root: &'a N, companions: &[&'a N]) -> Result<(), TreeError>
where
    N: Tree + ?Sized,
    F: FnMut(&'a N::Leaf, &[Companion<'a, N>]),
{
    start(
        &mut |leaf: &'a N::Leaf, _: &[&'a str], paired: &[Companion<'a, N>]| f(leaf, paired),
        root,
        companions,
    )
}

/// Like [`traverse`], but `f` also receives the dotted path of the leaf
/// (`"encoder.layers.0.weight"`). The root leaf's path is empty.
pub fn traverse_with_path<'a, N, F>(
    mut f: F,
    root: &'a N,
    companions: &[&'a N],
) -> Result<(), TreeError>
where
    N: Tree + ?Sized,
    F: FnMut(&'a N::Leaf, &str, &[Companion<'a, N>]),
{
    start(
        &mut |leaf: &'a N::Leaf, path: &[&'a str], paired: &[Companion<'a, N>]| {
            f(leaf, &path.iter().join("."), paired)
        },
        root,
        companions,
    )
}

fn start<'a, N, F>(f: &mut F, root: &'a N, companions: &[&'a N]) -> Result<(), TreeError>
where
    N: Tree + ?Sized,
    F: FnMut(&'a N::Leaf, &[&'a str], &[Companion<'a, N>]),
{
    tracing::trace!(companions = companions.len(), "traversing trainable leaves");
    let paired: Vec<_> = companions.iter().map(|&c| Companion::Present(c)).collect();
    walk(f, root, &paired, &mut Vec::new())
}

fn walk<'a, N, F>(
    f: &mut F,
    node: &'a N,
    companions: &[Companion<'a, N>],
    path: &mut Vec<&'a str>,
) -> Result<(), TreeError>
where
    N: Tree + ?Sized,
    F: FnMut(&'a N::Leaf, &[&'a str], &[Companion<'a, N>]),
{
    match node.kind() {
        None => Err(TreeError::InvalidNode {
            path: display_path(path),
        }),
        Some(NodeKind::Leaf) => {
            let leaf = node.as_leaf().ok_or_else(|| TreeError::InvalidNode {
                path: display_path(path),
            })?;
            f(leaf, path, companions);
            Ok(())
        }
        Some(NodeKind::Struct) | Some(NodeKind::Dict) => {
            let mut resolved = Vec::new();
            for (key, child) in node.children() {
                let paired = companions
                    .iter()
                    .enumerate()
                    .map(|(i, &companion)| companion_child(companion, key, i, path.as_slice()))
                    .collect::<Result<Vec<_>, _>>()?;
                resolved.push((key, child, paired));
            }
            for (key, child, paired) in resolved {
                path.push(key);
                walk(f, child, &paired, path)?;
                path.pop();
            }
            Ok(())
        }
    }
}

fn companion_child<'a, N>(
    companion: Companion<'a, N>,
    key: &str,
    index: usize,
    path: &[&str],
) -> Result<Companion<'a, N>, TreeError>
where
    N: Tree + ?Sized,
{
    let node = match companion {
        Companion::Absent => return Ok(Companion::Absent),
        Companion::Present(node) => node,
    };
    match node.kind() {
        None => Err(TreeError::InvalidNode {
            path: display_path(path),
        }),
        Some(NodeKind::Dict) => Ok(match node.child(key) {
            Some(child) => Companion::Present(child),
            None => {
                tracing::trace!(path = %display_path(path), key, companion = index, "companion key absent");
                Companion::Absent
            }
        }),
        Some(NodeKind::Struct) | Some(NodeKind::Leaf) => node
            .child(key)
            .map(Companion::Present)
            .ok_or_else(|| TreeError::StructuralMismatch {
                path: display_path(path),
                key: key.to_string(),
                companion: index,
            }),
    }
}

fn display_path(path: &[&str]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.iter().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Param;
    use crate::tree::ParamTree;

    fn leaf(v: f64) -> ParamTree<f64> {
        ParamTree::leaf(Param::scalar(v))
    }

    #[test]
    fn test_visits_every_leaf_once() {
        let root = ParamTree::structure([
            ("a", leaf(1.0)),
            (
                "b",
                ParamTree::dict([
                    ("x", leaf(2.0)),
                    ("y", ParamTree::structure([("deep", leaf(3.0))])),
                ]),
            ),
            ("c", leaf(4.0)),
        ]);
        let mut seen = vec![];
        traverse(
            |p: &Param<f64>, comps| {
                assert!(comps.is_empty());
                seen.push(p.elem());
            },
            &root,
            &[],
        )
        .unwrap();
        assert_eq!(seen, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_plain_and_pathed_walks_agree() {
        let root = ParamTree::structure([
            ("a", leaf(1.0)),
            ("b", ParamTree::dict([("y", leaf(3.0)), ("x", leaf(2.0))])),
        ]);
        let grads = root.zeros_like();
        let mut plain = vec![];
        traverse(
            |p: &Param<f64>, comps| plain.push((p.elem(), comps[0].leaf().map(Param::elem))),
            &root,
            &[&grads],
        )
        .unwrap();
        let mut pathed = vec![];
        traverse_with_path(
            |p: &Param<f64>, path, comps| {
                pathed.push((path.to_string(), (p.elem(), comps[0].leaf().map(Param::elem))))
            },
            &root,
            &[&grads],
        )
        .unwrap();
        let paths: Vec<_> = pathed.iter().map(|(path, _)| path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b.x", "b.y"]);
        assert_eq!(plain, pathed.into_iter().map(|(_, v)| v).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_leaf_root() {
        let root = leaf(7.0);
        let other = leaf(8.0);
        let mut pairs = vec![];
        traverse_with_path(
            |p: &Param<f64>, path, comps| {
                pairs.push((path.to_string(), p.elem(), comps[0].leaf().map(Param::elem)))
            },
            &root,
            &[&other],
        )
        .unwrap();
        assert_eq!(pairs, vec![("".to_string(), 7.0, Some(8.0))]);
    }

    #[test]
    fn test_worked_example_with_absent_key() {
        // root = {a: leaf1, b: {c: leaf2}}, companion = {a: leafA, b: {}}
        let root = ParamTree::dict([
            ("a", leaf(1.0)),
            ("b", ParamTree::dict([("c", leaf(2.0))])),
        ]);
        let companion = ParamTree::dict([("a", leaf(10.0)), ("b", ParamTree::empty_dict())]);
        let mut calls = vec![];
        traverse(
            |p: &Param<f64>, comps| calls.push((p.elem(), comps[0].leaf().map(Param::elem))),
            &root,
            &[&companion],
        )
        .unwrap();
        assert_eq!(calls, vec![(1.0, Some(10.0)), (2.0, None)]);
    }

    #[test]
    fn test_absent_propagates_down_subtree() {
        let root = ParamTree::dict([(
            "block",
            ParamTree::structure([("w", leaf(1.0)), ("b", leaf(2.0))]),
        )]);
        let companion = ParamTree::empty_dict();
        let mut absent = 0;
        traverse(
            |_: &Param<f64>, comps| {
                if comps[0].is_absent() {
                    absent += 1;
                }
            },
            &root,
            &[&companion],
        )
        .unwrap();
        assert_eq!(absent, 2);
    }

    #[test]
    fn test_struct_mismatch_before_any_leaf_in_subtree() {
        let root = ParamTree::structure([
            ("layer", ParamTree::structure([("w", leaf(1.0)), ("b", leaf(2.0))])),
        ]);
        let companion = ParamTree::structure([("layer", ParamTree::structure([("w", leaf(0.0))]))]);
        let mut calls = 0;
        let err = traverse(|_: &Param<f64>, _| calls += 1, &root, &[&companion]).unwrap_err();
        assert_eq!(
            err,
            TreeError::StructuralMismatch {
                path: "layer".to_string(),
                key: "b".to_string(),
                companion: 0,
            }
        );
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_companion_leaf_where_root_has_container() {
        let root = ParamTree::structure([("w", leaf(1.0))]);
        let companion = leaf(0.0);
        let err = traverse(|_: &Param<f64>, _| {}, &root, &[&companion]).unwrap_err();
        assert!(matches!(err, TreeError::StructuralMismatch { companion: 0, .. }));
    }

    #[test]
    fn test_extra_companion_keys_ignored() {
        let root = ParamTree::dict([("a", leaf(1.0))]);
        let companion = ParamTree::dict([("a", leaf(2.0)), ("z", leaf(3.0))]);
        let mut calls = 0;
        traverse(|_: &Param<f64>, _| calls += 1, &root, &[&companion]).unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_second_companion_reported_by_index() {
        let root = ParamTree::structure([("a", leaf(1.0))]);
        let ok = root.zeros_like();
        let bad = ParamTree::structure([("other", leaf(1.0))]);
        let err = traverse(|_: &Param<f64>, _| {}, &root, &[&ok, &bad]).unwrap_err();
        assert_eq!(
            err,
            TreeError::StructuralMismatch {
                path: "<root>".to_string(),
                key: "a".to_string(),
                companion: 1,
            }
        );
    }

    /// A tree whose values may be unclassifiable, standing in for a foreign
    /// object graph.
    enum Loose {
        Num(f32),
        Text(&'static str),
        Record(Vec<(&'static str, Loose)>),
    }

    impl Tree for Loose {
        type Leaf = f32;

        fn kind(&self) -> Option<NodeKind> {
            match self {
                Loose::Num(_) => Some(NodeKind::Leaf),
                Loose::Text(_) => None,
                Loose::Record(_) => Some(NodeKind::Struct),
            }
        }

        fn as_leaf(&self) -> Option<&f32> {
            match self {
                Loose::Num(v) => Some(v),
                _ => None,
            }
        }

        fn children(&self) -> Vec<(&str, &Self)> {
            match self {
                Loose::Record(fields) => fields.iter().map(|(k, v)| (*k, v)).collect(),
                _ => vec![],
            }
        }

        fn child(&self, key: &str) -> Option<&Self> {
            match self {
                Loose::Record(fields) => fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v),
                _ => None,
            }
        }
    }

    #[test]
    fn test_invalid_node() {
        let root = Loose::Record(vec![
            ("lr", Loose::Num(0.1)),
            ("name", Loose::Text("mlp")),
        ]);
        let mut seen = vec![];
        let err = traverse(|v: &f32, _| seen.push(*v), &root, &[]).unwrap_err();
        assert_eq!(
            err,
            TreeError::InvalidNode {
                path: "name".to_string()
            }
        );
        // leaves before the bad node were already visited
        assert_eq!(seen, vec![0.1]);
    }
}
