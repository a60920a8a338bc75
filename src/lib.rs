//! An intrusive, size-augmented AVL tree with split and join.
//!
//! [`AvlTree`] is the balancing engine. Elements carry their own [`Links`] and are owned by the
//! tree through their [`Linked::Handle`]. [`AvlMap`] is an ordered map built on top of it.
//!
//! Besides the usual ordered-map operations the tree supports two structural operations:
//!
//! - [`AvlTree::join`] splices a separator element and two trees whose keys lie on either side
//!   of it into a single tree, in time proportional to the difference of their heights.
//! - [`AvlTree::split`] cuts a tree at a pivot key into the trees of lesser and greater keys by
//!   repeatedly joining the fragments met on the way from the pivot to the root.
//!
//! Insertion, deletion and join report the amount of rebalancing work they performed.

// Conventions used in comments are from Haeupler, Sen and Tarjan:
// - The rank of a node `x` is denoted `r(x)`. In an AVL tree this is its height.
// - The parent of a node `x` is denoted `p(x)`.
// - The rank difference of a node `x` is given by `r(p(x)) - r(x)`.
// - A node `x` is an `i`-child if its rank difference is `i`.
// - A node is `i,j` if one of its children is an `i`-child and the other is a `j`-child.
// - Missing children have rank -1.
//
// The AVL rank rule: every node is 1,1 or 1,2.
//
// Corollaries:
// - All leaves have rank 0.
// - `r(x) = 1 + max(r(left(x)), r(right(x)))`.
//
// Every node also records `s(x)`, the number of nodes in its subtree, and
// `s(x) = s(left(x)) + s(right(x)) + 1` holds between operations. Missing children have size 0.

use core::{
    borrow::Borrow, cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not,
    pin::Pin, ptr::NonNull,
};

use cordyceps::Linked;

mod cursor;
mod debug;
mod error;
mod iter;
mod join;
pub mod map;
#[cfg(any(test, feature = "model"))]
pub mod model;
mod rank;

#[cfg(test)]
mod tests;

pub use cursor::{Cursor, CursorMut};
pub use error::{Error, Result};
pub use iter::Iter;
pub use map::AvlMap;

use rank::Rank;

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord + fmt::Debug;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree whose nodes record the size of their subtree.
///
/// The minimum and maximum elements are cached, so [`first`](Self::first) and
/// [`last`](Self::last) complete in _O(1)_ time.
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    first: Link<T>,
    last: Link<T>,
    len: usize,
}

pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    rank: Rank,
    size: usize,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

/// The position at which a missing key would be attached.
enum InsertAs<T: ?Sized> {
    Root,
    Child { parent: NonNull<T>, dir: Dir },
}

/// The outcome of a descent toward a key.
enum Probe<T: ?Sized> {
    Found(NonNull<T>),
    Vacant(InsertAs<T>),
}

#[inline]
unsafe fn links<'a, T>(node: NonNull<T>) -> &'a Links<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe { T::links(node).as_ref() }
}

#[inline]
unsafe fn links_mut<'a, T>(node: NonNull<T>) -> &'a mut Links<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    unsafe { T::links(node).as_mut() }
}

/// Returns the rank of the linked node, or -1 if it is missing.
#[inline]
unsafe fn rank_of<T>(link: Link<T>) -> Rank
where
    T: TreeNode<Links<T>> + ?Sized,
{
    link.map_or(Rank::MISSING, |node| unsafe { links(node).rank() })
}

/// Returns the size of the linked subtree, or 0 if it is missing.
#[inline]
unsafe fn subtree_size<T>(link: Link<T>) -> usize
where
    T: TreeNode<Links<T>> + ?Sized,
{
    link.map_or(0, |node| unsafe { links(node).size() })
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree {
            root: None,
            first: None,
            last: None,
            len: 0,
        }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the height of the tree, or -1 if it is empty.
    pub fn height(&self) -> i32 {
        unsafe { rank_of(self.root).get().into() }
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0, "empty tree must have length 0");
            assert!(self.first.is_none(), "empty tree must not cache a first element");
            assert!(self.last.is_none(), "empty tree must not cache a last element");
            return;
        };

        unsafe {
            assert!(
                links(root).parent().is_none(),
                "root must not have a parent"
            );

            let size = self.assert_invariants_at(root, None, None);
            assert_eq!(size, self.len, "tree length must match the root's size");

            assert_eq!(self.first, Some(self.min_in_subtree(root).0));
            assert_eq!(self.last, Some(self.max_in_subtree(root)));
        }
    }

    // Checks the subtree rooted at `node`, whose keys must lie strictly between `lower` and
    // `upper`, and returns its size.
    #[allow(clippy::only_used_in_recursion)]
    unsafe fn assert_invariants_at(
        &self,
        node: NonNull<T>,
        lower: Option<&T::Key>,
        upper: Option<&T::Key>,
    ) -> usize {
        unsafe {
            let key = node.as_ref().key();

            if let Some(lower) = lower {
                assert!(lower < key, "{key:?} must be greater than {lower:?}");
            }
            if let Some(upper) = upper {
                assert!(key < upper, "{key:?} must be less than {upper:?}");
            }

            let rank = links(node).rank();
            let mut size = 1;
            let mut diffs = [0; 2];

            for dir in [Dir::Left, Dir::Right] {
                let child = links(node).child(dir);
                diffs[dir as usize] = rank.diff(rank_of(child));

                if let Some(child) = child {
                    // Ensure child's parent link points to this node.
                    let parent = links(child)
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    let (lower, upper) = match dir {
                        Dir::Left => (lower, Some(key)),
                        Dir::Right => (Some(key), upper),
                    };
                    size += self.assert_invariants_at(child, lower, upper);
                }
            }

            // Ensure the node is 1,1 or 1,2.
            diffs.sort_unstable();
            assert_eq!(diffs[0], 1, "{key:?}: rank must exceed its tallest child by one");
            assert!(diffs[1] <= 2, "{key:?}: child heights differ by more than one");

            assert_eq!(links(node).size(), size, "{key:?}: wrong subtree size");

            size
        }
    }

    /// Returns a reference to the node corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a pinned mutable reference to the node corresponding to `key`.
    ///
    /// The caller must not modify the node's key through the returned reference.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_mut())) }
    }

    /// Returns `true` if the tree contains a node corresponding to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => opt_cur = links(cur).left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = links(cur).right(),
                }
            }
        }
    }

    // Descends toward `key` exactly like `get_raw`, adding `delta` to the size of every node
    // visited before the node holding `key`. That node's own size is left unchanged.
    //
    // If `key` is missing, returns the position where it would be attached.
    fn search_with_maintenance<Q>(&mut self, key: &Q, delta: isize) -> Probe<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let Some(mut cur) = self.root else {
            return Probe::Vacant(InsertAs::Root);
        };

        loop {
            unsafe {
                let dir = match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => Dir::Left,
                    Ordering::Equal => return Probe::Found(cur),
                    Ordering::Greater => Dir::Right,
                };

                links_mut(cur).add_size(delta);

                match links(cur).child(dir) {
                    Some(child) => cur = child,
                    None => return Probe::Vacant(InsertAs::Child { parent: cur, dir }),
                }
            }
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        self.first
            .map(|first| unsafe { Pin::new_unchecked(first.as_ref()) })
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        self.last
            .map(|last| unsafe { Pin::new_unchecked(last.as_ref()) })
    }

    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { links_mut(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that `old_child` is a child node of `parent`.
    #[inline]
    unsafe fn replace_child(&mut self, parent: NonNull<T>, old_child: NonNull<T>, new_child: Link<T>) {
        unsafe {
            let dir = self.which_child(parent, old_child);
            debug_assert_eq!(
                links(parent).child(dir),
                Some(old_child),
                "`old_child` must be a child of `parent`"
            );

            links_mut(parent).set_child(dir, new_child);
        }
    }

    // Recomputes the size of `node` from the sizes of its children.
    #[inline]
    unsafe fn update_size(&mut self, node: NonNull<T>) {
        unsafe {
            let size = subtree_size(links(node).left()) + subtree_size(links(node).right()) + 1;
            links_mut(node).set_size(size);
        }
    }

    // Performs a rotation, moving `up` up and its parent `down` down.
    //
    // Sizes of the affected nodes are updated; ranks are not.
    unsafe fn rotate_at(&mut self, down: NonNull<T>, up: NonNull<T>) {
        unsafe {
            // - `down` becomes the `dir` child of `up`.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let dir = if links(down).right() == Some(up) {
                Dir::Left
            } else {
                Dir::Right
            };

            let across = links(up).child(dir);
            links_mut(down).set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            links_mut(up).set_child(dir, Some(down));
            let parent = links_mut(down).set_parent(Some(up));
            links_mut(up).set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));

            // `up` now spans the subtree `down` used to.
            links_mut(up).set_size(links(down).size());
            self.update_size(down);
        }
    }

    /// Inserts an item into the tree.
    ///
    /// On success, returns the number of rebalancing operations performed: each promotion or
    /// demotion counts one and each rotation counts one. If an item with an equal key is
    /// already present, the tree is left unchanged and `item` is handed back.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> core::result::Result<usize, T::Handle> {
        let ptr = T::into_ptr(item);

        // Sizes along the path are only adjusted once the key is known to be missing.
        let insert_as = match self.search_with_maintenance(unsafe { ptr.as_ref().key() }, 0) {
            Probe::Found(_) => return Err(unsafe { T::from_ptr(ptr) }),
            Probe::Vacant(insert_as) => insert_as,
        };

        Ok(unsafe { self.insert_at(insert_as, ptr) })
    }

    // Links `ptr` into the tree as a new leaf and restores the rank rule.
    unsafe fn insert_at(&mut self, insert_as: InsertAs<T>, ptr: NonNull<T>) -> usize {
        unsafe {
            links_mut(ptr).clear();

            match insert_as {
                InsertAs::Root => {
                    self.root = Some(ptr);
                    self.first = Some(ptr);
                    self.last = Some(ptr);
                    self.len += 1;
                    return 0;
                }

                InsertAs::Child { parent, dir } => {
                    links_mut(parent).set_child(dir, Some(ptr));
                    links_mut(ptr).set_parent(Some(parent));
                }
            }

            self.search_with_maintenance(ptr.as_ref().key(), 1);
            self.len += 1;

            let key = ptr.as_ref().key();
            if self.first.is_none_or(|first| key < first.as_ref().key()) {
                self.first = Some(ptr);
            }
            if self.last.is_none_or(|last| key > last.as_ref().key()) {
                self.last = Some(ptr);
            }

            self.rebalance_inserted(ptr)
        }
    }

    // Performs a bottom-up rebalance of the tree after `node` was attached with a rank that may
    // equal its parent's, i.e. `node` may be a 0-child. Returns the number of rebalancing
    // operations performed.
    //
    // This is shared by insertion, where `node` is a new leaf, and join, where `node` is the
    // separator spliced into the taller tree.
    fn rebalance_inserted(&mut self, node: NonNull<T>) -> usize {
        let mut count = 0;
        let mut x = node;

        unsafe {
            while let Some(parent) = links(x).parent() {
                let x_rank = links(x).rank();
                let parent_rank = links(parent).rank();

                // The rank rule holds at `parent`, and therefore above it.
                if x_rank != parent_rank {
                    break;
                }

                let dir = self.which_child(parent, x);
                let sibling_rank = rank_of(links(parent).child(!dir));

                if parent_rank.diff(sibling_rank) == 1 {
                    // `parent` is 0,1: promote it and ascend.
                    self.promote(parent);
                    count += 1;
                    x = parent;
                    continue;
                }

                // `parent` is 0,2. Which rotation applies depends on the children of `x`.
                let outer = links(x).child(dir);
                let inner = links(x).child(!dir);
                let outer_diff = x_rank.diff(rank_of(outer));
                let inner_diff = x_rank.diff(rank_of(inner));

                match inner {
                    // `x` is 1,1. This only happens when `x` is a separator spliced in by a join.
                    // After the rotation `x` has taken the place of `parent` with a rank one
                    // higher, so the violation may have moved up.
                    _ if outer_diff == 1 && inner_diff == 1 => {
                        self.promote(x);
                        self.rotate_at(parent, x);
                        count += 2;
                    }

                    _ if outer_diff == 1 => {
                        self.demote(parent);
                        self.rotate_at(parent, x);
                        return count + 2;
                    }

                    Some(inner) => {
                        debug_assert_eq!(inner_diff, 1);
                        self.demote(parent);
                        self.demote(x);
                        self.promote(inner);
                        self.rotate_at(x, inner);
                        self.rotate_at(parent, inner);
                        return count + 5;
                    }

                    None => unreachable!("the inner child of a 1,2 node is its 1-child"),
                }
            }
        }

        count
    }

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's parent.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Option<NonNull<T>>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(left) = unsafe { links(cur).left() } {
            parent = Some(cur);
            cur = left;
        }

        (cur, parent)
    }

    // Returns the maximum node in the subtree.
    #[inline]
    unsafe fn max_in_subtree(&self, root: NonNull<T>) -> NonNull<T> {
        let mut cur = root;

        while let Some(right) = unsafe { links(cur).right() } {
            cur = right;
        }

        cur
    }

    // Returns the in-order neighbour of `node` in direction `dir`: its successor for
    // `Dir::Right` and its predecessor for `Dir::Left`.
    unsafe fn neighbor_raw(&self, node: NonNull<T>, dir: Dir) -> Link<T> {
        unsafe {
            // Descend to the nearest node of the `dir` subtree.
            if let Some(mut cur) = links(node).child(dir) {
                while let Some(next) = links(cur).child(!dir) {
                    cur = next;
                }

                return Some(cur);
            }

            // Otherwise ascend until arriving from the `!dir` side.
            let mut cur = node;
            while let Some(parent) = links(cur).parent() {
                if links(parent).child(!dir) == Some(cur) {
                    return Some(parent);
                }

                cur = parent;
            }

            None
        }
    }

    #[inline]
    unsafe fn successor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Right) }
    }

    #[inline]
    unsafe fn predecessor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Left) }
    }

    /// Removes the item corresponding to `key` from the tree.
    ///
    /// Returns the removed item and the number of rebalancing operations performed, or `None`
    /// if no item corresponds to `key`.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<(T::Handle, usize)>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = self.first?;
        Some(unsafe { self.remove_at(first).0 })
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.last?;
        Some(unsafe { self.remove_at(last).0 })
    }

    // Removes an arbitrary node from the tree, returning it together with the number of
    // rebalancing operations performed.
    //
    // # Safety
    //
    // It is the caller's responsibility to ensure that `node` is an element of `self`, and not
    // any other tree.
    unsafe fn remove_at(&mut self, node: NonNull<T>) -> (T::Handle, usize) {
        // There are three possible cases:
        //
        // 1. `node` is a leaf. It is replaced by a missing child.
        // 2. `node` has one child, which is elevated to replace it.
        // 3. `node` has two children. Its successor (the least node in its right subtree, which
        //    has no left child) is unlinked from its own position, elevating its right child,
        //    and then assumes `node`'s place, rank and size.
        //
        // In every case the subtree which lost a node hangs off a single parent, and rebalancing
        // starts there.

        unsafe {
            if self.first == Some(node) {
                self.first = self.successor_raw(node);
            }
            if self.last == Some(node) {
                self.last = self.predecessor_raw(node);
            }

            self.len -= 1;

            let parent = links(node).parent();
            let left = links(node).left();
            let right = links(node).right();

            let rebalance_from = match (left, right) {
                (Some(left), Some(right)) => {
                    let (successor, successor_parent) = self.min_in_subtree(right);

                    // Every node from the root down to the successor's parent, `node` included,
                    // loses one descendant.
                    self.search_with_maintenance(successor.as_ref().key(), -1);

                    let successor_right = links(successor).right();

                    let rebalance_from = match successor_parent {
                        Some(successor_parent) => {
                            // Elevate the successor's right child to replace it.
                            self.replace_child(successor_parent, successor, successor_right);
                            self.maybe_set_parent(successor_right, Some(successor_parent));

                            links_mut(successor).set_right(Some(right));
                            links_mut(right).set_parent(Some(successor));

                            successor_parent
                        }

                        // The successor is `right` and keeps its right child.
                        None => successor,
                    };

                    self.replace_child_or_set_root(parent, node, Some(successor));

                    links_mut(successor).set_parent(parent);
                    links_mut(successor).set_left(Some(left));
                    links_mut(successor).set_rank(links(node).rank());
                    links_mut(successor).set_size(links(node).size());
                    links_mut(left).set_parent(Some(successor));

                    Some(rebalance_from)
                }

                (opt_left, opt_right) => {
                    let child = opt_left.or(opt_right);

                    self.search_with_maintenance(node.as_ref().key(), -1);

                    self.replace_child_or_set_root(parent, node, child);
                    self.maybe_set_parent(child, parent);

                    parent
                }
            };

            let count = self.rebalance_removed(rebalance_from);

            links_mut(node).clear();

            (T::from_ptr(node), count)
        }
    }

    // Performs a bottom-up rebalance of the tree after one of `start`'s subtrees lost a node.
    // Returns the number of rebalancing operations performed.
    //
    // A violating node is either 2,2 or has a 3-child.
    unsafe fn rebalance_removed(&mut self, start: Link<T>) -> usize {
        let mut count = 0;
        let mut opt_parent = start;

        unsafe {
            while let Some(parent) = opt_parent {
                let parent_rank = links(parent).rank();
                let diff_left = parent_rank.diff(rank_of(links(parent).left()));
                let diff_right = parent_rank.diff(rank_of(links(parent).right()));

                // `dir` is the side of the 3-child.
                let dir = match (diff_left, diff_right) {
                    (2, 2) => {
                        self.demote(parent);
                        count += 1;
                        opt_parent = links(parent).parent();
                        continue;
                    }

                    (3, _) => Dir::Left,
                    (_, 3) => Dir::Right,
                    _ => break,
                };

                // Here we use the names from the paper.
                let z = parent;
                let y = links(z)
                    .child(!dir)
                    .expect("the sibling of a 3-child has rank at least 1");
                let y_rank = links(y).rank();
                let near = links(y).child(dir);
                let far = links(y).child(!dir);

                match (y_rank.diff(rank_of(near)), y_rank.diff(rank_of(far))) {
                    // `y` is 1,1: a single rotation restores the rank of the subtree root.
                    (1, 1) => {
                        self.demote(z);
                        self.promote(y);
                        self.rotate_at(z, y);
                        return count + 3;
                    }

                    // The far child of `y` is its 1-child: a single rotation, after which the
                    // subtree is one shorter.
                    (2, 1) => {
                        self.demote_twice(z);
                        self.rotate_at(z, y);
                        count += 3;
                        opt_parent = links(y).parent();
                    }

                    // The near child of `y` is its 1-child: a double rotation, after which the
                    // subtree is one shorter.
                    _ => {
                        let v = near.expect("the 1-child of a node of rank at least 1 exists");
                        self.demote_twice(z);
                        self.demote(y);
                        self.promote(v);
                        self.rotate_at(y, v);
                        self.rotate_at(z, v);
                        count += 6;
                        opt_parent = links(v).parent();
                    }
                }
            }
        }

        count
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let (cur, parent) = self.min_in_subtree(cur);
                let parent = parent.or_else(|| links(cur).parent());

                let right = links(cur).right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                links_mut(cur).clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        self.first = None;
        self.last = None;

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    // Support methods ========================================================

    #[inline]
    unsafe fn promote(&mut self, node: NonNull<T>) {
        unsafe { links_mut(node).rank_mut().promote() }
    }

    #[inline]
    unsafe fn demote(&mut self, node: NonNull<T>) {
        unsafe { links_mut(node).rank_mut().demote() }
    }

    #[inline]
    unsafe fn demote_twice(&mut self, node: NonNull<T>) {
        unsafe { links_mut(node).rank_mut().demote_twice() }
    }

    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if unsafe { links(parent).left() } == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T: ?Sized> Links<T> {
    /// Returns the links of a detached leaf.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                rank: Rank::LEAF,
                size: 1,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn rank(&self) -> Rank {
        unsafe { (*self.inner.get()).rank }
    }

    #[inline]
    fn size(&self) -> usize {
        unsafe { (*self.inner.get()).size }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_rank(&mut self, rank: Rank) {
        self.inner.get_mut().rank = rank;
    }

    #[inline]
    fn rank_mut(&mut self) -> &mut Rank {
        &mut self.inner.get_mut().rank
    }

    #[inline]
    fn set_size(&mut self, size: usize) {
        self.inner.get_mut().size = size;
    }

    #[inline]
    fn add_size(&mut self, delta: isize) {
        let inner = self.inner.get_mut();
        inner.size = inner
            .size
            .checked_add_signed(delta)
            .expect("subtree size out of range");
    }

    // Resets the links to those of a detached leaf.
    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.rank = Rank::LEAF;
        inner.size = 1;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("rank", &self.rank().get())
            .field("size", &self.size())
            .finish()
    }
}
