/// How the introspection capability classifies a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Numeric and learnable; the unit the traversal hands to its callback.
    Leaf,
    /// Named fields. Companions must carry every field the root has.
    Struct,
    /// Keyed entries. Companions may lack keys, those positions come out absent.
    Dict,
}

/// The introspection capability a parameter library exposes to the traversal.
///
/// Implementations decide which values are trainable leaves and how containers
/// enumerate their children. `children` must return the same order every time
/// it is called on the same node.
pub trait Tree {
    type Leaf;

    /// `None` when the node is neither a leaf nor a recognised container.
    fn kind(&self) -> Option<NodeKind>;

    fn as_leaf(&self) -> Option<&Self::Leaf>;

    /// Empty for leaves.
    fn children(&self) -> Vec<(&str, &Self)>;

    fn child(&self, key: &str) -> Option<&Self>;
}

/// What a companion object holds at the position of a root leaf.
#[derive(Debug)]
pub enum Companion<'a, N: ?Sized> {
    Present(&'a N),
    /// The companion is a dict lacking this key (or sits under one that does).
    Absent,
}

// Derived impls would require `N: Clone`.
impl<'a, N: ?Sized> Clone for Companion<'a, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, N: ?Sized> Copy for Companion<'a, N> {}

impl<'a, N: Tree + ?Sized> Companion<'a, N> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Companion::Absent)
    }

    pub fn node(&self) -> Option<&'a N> {
        match *self {
            Companion::Present(node) => Some(node),
            Companion::Absent => None,
        }
    }

    /// The companion's leaf, or `None` when absent or not a leaf.
    pub fn leaf(&self) -> Option<&'a N::Leaf> {
        self.node().and_then(Tree::as_leaf)
    }
}
