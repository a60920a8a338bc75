use core::{cmp::Ordering, ptr::NonNull};

use crate::{links, links_mut, rank_of, subtree_size, AvlTree, Dir, Link, Links, TreeNode};

/// The fields of a tree, moved out of it.
struct Parts<T: ?Sized> {
    root: Link<T>,
    first: Link<T>,
    last: Link<T>,
    len: usize,
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Joins `separator` and every element of `other` into this tree.
    ///
    /// Every key of one of the two trees must be less than the separator's key, and every key of
    /// the other greater. Either tree may be empty, and either may hold the lesser keys. If this
    /// precondition does not hold the resulting tree is not a search tree.
    ///
    /// Returns the difference between the heights of the two trees plus one, counting an empty
    /// tree as having height -1. The operation completes in time proportional to this value.
    ///
    /// If one tree is empty and the other already holds the separator's key, the separator is
    /// handed back in `Err` and this tree holds the elements of the non-empty one.
    pub fn join(
        &mut self,
        separator: T::Handle,
        mut other: AvlTree<T>,
    ) -> core::result::Result<usize, T::Handle> {
        let sep = T::into_ptr(separator);
        let mine = self.take_parts();
        let theirs = other.take_parts();

        unsafe {
            let cost = usize::from(rank_of(mine.root).diff(rank_of(theirs.root)).unsigned_abs()) + 1;

            let sep_key = sep.as_ref().key();
            let mine_is_low = match (mine.root, theirs.root) {
                (Some(root), _) => root.as_ref().key() < sep_key,
                (None, Some(root)) => root.as_ref().key() > sep_key,
                (None, None) => true,
            };

            let (low, high) = if mine_is_low {
                (mine, theirs)
            } else {
                (theirs, mine)
            };

            tracing::trace!(cost, low_len = low.len, high_len = high.len, "join");

            let (low_root, high_root) = match (low.root, high.root) {
                (Some(low_root), Some(high_root)) => (low_root, high_root),

                // At most one side holds elements, so the separator is a new extreme of it.
                _ => {
                    self.restore_parts(if low.root.is_some() { low } else { high });

                    return self.insert(T::from_ptr(sep)).map(|_| cost);
                }
            };

            links_mut(sep).clear();

            self.first = low.first;
            self.last = high.last;
            self.len = low.len + high.len + 1;

            let low_rank = links(low_root).rank();
            let high_rank = links(high_root).rank();

            match low_rank.cmp(&high_rank) {
                Ordering::Equal => {
                    links_mut(sep).set_left(Some(low_root));
                    links_mut(sep).set_right(Some(high_root));
                    links_mut(low_root).set_parent(Some(sep));
                    links_mut(high_root).set_parent(Some(sep));

                    links_mut(sep).set_rank(low_rank.raised());
                    links_mut(sep).set_size(self.len);

                    self.root = Some(sep);
                }

                // Descend the taller tree along the side facing the shorter one.
                Ordering::Less => self.graft(sep, low_root, high_root, Dir::Left),
                Ordering::Greater => self.graft(sep, high_root, low_root, Dir::Right),
            }

            Ok(cost)
        }
    }

    // Splices `sep` into the tree rooted at `tall` with the strictly shorter tree rooted at
    // `short` as its `dir` child, then restores the rank rule above it.
    //
    // The nodes of `tall`'s `dir` spine are descended until reaching one whose rank is at most
    // `r(short)`. That subtree becomes `sep`'s `!dir` child, so `sep` is 1,1 or 1,2 with rank
    // `r(short) + 1`. Only `sep` can then be a 0-child, which is the situation insertion
    // rebalancing handles.
    unsafe fn graft(&mut self, sep: NonNull<T>, short: NonNull<T>, tall: NonNull<T>, dir: Dir) {
        unsafe {
            let short_rank = links(short).rank();

            let mut parent = tall;
            let mut cur = links(tall).child(dir);

            while let Some(node) = cur {
                if links(node).rank() <= short_rank {
                    break;
                }

                parent = node;
                cur = links(node).child(dir);
            }

            links_mut(parent).set_child(dir, Some(sep));
            links_mut(sep).set_parent(Some(parent));

            links_mut(sep).set_child(dir, Some(short));
            links_mut(short).set_parent(Some(sep));

            links_mut(sep).set_child(!dir, cur);
            self.maybe_set_parent(cur, Some(sep));

            let short_size = links(short).size();
            links_mut(sep).set_rank(short_rank.raised());
            links_mut(sep).set_size(short_size + subtree_size(cur) + 1);

            // Every node above `sep` gains the shorter tree and the separator.
            self.root = Some(tall);
            self.search_with_maintenance(sep.as_ref().key(), (short_size + 1) as isize);

            self.rebalance_inserted(sep);
        }
    }

    /// Splits the tree around the element corresponding to `key`.
    ///
    /// Returns the tree of all lesser elements, the element corresponding to `key`, and the tree
    /// of all greater elements, leaving this tree empty. If no element corresponds to `key`, the
    /// tree is not modified and `None` is returned.
    ///
    /// The pivot's subtrees seed the two results. Walking from the pivot to the root, each
    /// ancestor and its subtree on the far side are joined into the result on that side.
    pub fn split<Q>(&mut self, key: &Q) -> Option<(AvlTree<T>, T::Handle, AvlTree<T>)>
    where
        T::Key: core::borrow::Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let pivot = self.get_raw(key)?;
        self.take_parts();

        unsafe {
            let mut left = AvlTree::from_subtree(links(pivot).left());
            let mut right = AvlTree::from_subtree(links(pivot).right());

            let mut joins = 0;
            let mut cur = pivot;
            let mut opt_parent = links(pivot).parent();

            while let Some(parent) = opt_parent {
                opt_parent = links(parent).parent();

                let from = self.which_child(parent, cur);
                let fragment = AvlTree::from_subtree(links(parent).child(!from));

                links_mut(parent).clear();
                let separator = T::from_ptr(parent);

                let joined = match from {
                    Dir::Left => right.join(separator, fragment),
                    Dir::Right => left.join(separator, fragment),
                };
                debug_assert!(joined.is_ok(), "ancestor key already present in a fragment");

                joins += 1;
                cur = parent;
            }

            left.reset_extremes();
            right.reset_extremes();

            tracing::trace!(joins, left_len = left.len, right_len = right.len, "split");

            links_mut(pivot).clear();

            Some((left, T::from_ptr(pivot), right))
        }
    }

    // Adopts the detached subtree rooted at `root` as a tree of its own.
    //
    // The cached extremes are left unset until `reset_extremes` is called. Joins performed in the
    // meantime keep the structure, sizes and length correct.
    unsafe fn from_subtree(root: Link<T>) -> AvlTree<T> {
        let mut tree = AvlTree::new();

        if let Some(root) = root {
            unsafe {
                links_mut(root).set_parent(None);
                tree.len = links(root).size();
            }
            tree.root = Some(root);
        }

        tree
    }

    // Recomputes the cached extremes by descending from the root.
    fn reset_extremes(&mut self) {
        unsafe {
            self.first = self.root.map(|root| self.min_in_subtree(root).0);
            self.last = self.root.map(|root| self.max_in_subtree(root));
        }
    }

    // Moves the fields out of the tree, leaving it empty.
    fn take_parts(&mut self) -> Parts<T> {
        let parts = Parts {
            root: self.root.take(),
            first: self.first.take(),
            last: self.last.take(),
            len: self.len,
        };
        self.len = 0;

        parts
    }

    fn restore_parts(&mut self, parts: Parts<T>) {
        debug_assert!(self.is_empty());

        self.root = parts.root;
        self.first = parts.first;
        self.last = parts.last;
        self.len = parts.len;
    }
}

#[cfg(test)]
mod tests {
    use crate::model::TestNode;

    use super::*;

    fn tree_of(keys: impl IntoIterator<Item = i64>) -> AvlTree<TestNode> {
        let mut tree = AvlTree::new();

        for key in keys {
            assert!(tree.insert(TestNode::new(key)).is_ok());
        }

        tree.assert_invariants();
        tree
    }

    fn keys(tree: &AvlTree<TestNode>) -> Vec<i64> {
        tree.iter().map(|node| node.key).collect()
    }

    #[test]
    fn join_both_empty() {
        let mut tree = tree_of([]);
        assert_eq!(tree.join(TestNode::new(5), tree_of([])).ok(), Some(1));

        tree.assert_invariants();
        assert_eq!(keys(&tree), [5]);
    }

    #[test]
    fn join_with_one_side_empty() {
        // Height 2 against an empty tree.
        let mut tree = tree_of([1, 2, 3, 4]);
        assert_eq!(tree.join(TestNode::new(10), tree_of([])).ok(), Some(4));
        tree.assert_invariants();
        assert_eq!(keys(&tree), [1, 2, 3, 4, 10]);

        let mut tree = tree_of([]);
        assert_eq!(tree.join(TestNode::new(0), tree_of([1, 2, 3, 4])).ok(), Some(4));
        tree.assert_invariants();
        assert_eq!(keys(&tree), [0, 1, 2, 3, 4]);
    }

    #[test]
    fn join_equal_heights() {
        let mut tree = tree_of([1, 2, 3]);
        assert_eq!(tree.join(TestNode::new(4), tree_of([5, 6, 7])).ok(), Some(1));

        tree.assert_invariants();
        assert_eq!(tree.root.map(|r| unsafe { r.as_ref().key }), Some(4));
        assert_eq!(keys(&tree), [1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn join_unequal_heights_both_orders() {
        let low = 0..3;
        let high = 4..200;

        let mut short_low = tree_of(low.clone());
        let tall_high = tree_of(high.clone());
        let expected_cost = (tall_high.height() - short_low.height()) as usize + 1;
        assert_eq!(short_low.join(TestNode::new(3), tall_high).ok(), Some(expected_cost));
        short_low.assert_invariants();
        assert_eq!(keys(&short_low), (0..200).collect::<Vec<_>>());

        // The same trees, with the receiver holding the greater keys.
        let mut tall_high = tree_of(high);
        let short_low = tree_of(low);
        assert_eq!(tall_high.join(TestNode::new(3), short_low).ok(), Some(expected_cost));
        tall_high.assert_invariants();
        assert_eq!(keys(&tall_high), (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn join_taller_low_side() {
        let mut tree = tree_of(0..100);
        let height = tree.height();
        let cost = tree.join(TestNode::new(100), tree_of([101])).ok();

        tree.assert_invariants();
        assert_eq!(cost, Some(height as usize + 1));
        assert_eq!(tree.len(), 102);
        assert_eq!(tree.first().map(|n| n.key), Some(0));
        assert_eq!(tree.last().map(|n| n.key), Some(101));
    }

    #[test]
    fn split_at_every_key() {
        for pivot in 0..40 {
            let mut tree = tree_of((0..40).map(|k| (k * 7) % 40));
            let (left, node, right) = tree.split(&pivot).expect("pivot not found");

            assert!(tree.is_empty());
            assert_eq!(node.key, pivot);

            left.assert_invariants();
            right.assert_invariants();
            assert_eq!(keys(&left), (0..pivot).collect::<Vec<_>>());
            assert_eq!(keys(&right), (pivot + 1..40).collect::<Vec<_>>());
        }
    }

    #[test]
    fn split_missing_key() {
        let mut tree = tree_of([1, 3, 5]);
        assert!(tree.split(&2).is_none());

        tree.assert_invariants();
        assert_eq!(keys(&tree), [1, 3, 5]);
    }

    #[test]
    fn split_then_join_restores_keys() {
        let mut tree = tree_of((0..64).rev());
        let (mut left, pivot, right) = tree.split(&37).expect("pivot not found");

        assert!(left.join(pivot, right).is_ok());
        left.assert_invariants();
        assert_eq!(keys(&left), (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn join_hands_back_duplicate_separator() {
        let mut tree = tree_of([1, 2, 3]);
        let rejected = tree
            .join(TestNode::new(2), tree_of([]))
            .expect_err("duplicate separator accepted");

        assert_eq!(rejected.key, 2);
        tree.assert_invariants();
        assert_eq!(keys(&tree), [1, 2, 3]);

        // The receiver is empty; the other tree's elements still move into it.
        let mut tree = tree_of([]);
        let rejected = tree
            .join(TestNode::new(3), tree_of([1, 2, 3]))
            .expect_err("duplicate separator accepted");

        assert_eq!(rejected.key, 3);
        tree.assert_invariants();
        assert_eq!(keys(&tree), [1, 2, 3]);
        assert_eq!(tree.last().map(|n| n.key), Some(3));
    }
}
