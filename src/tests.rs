use std::ops::Range;

use proptest::prelude::*;

use crate::model::{self, TestNode};

use super::*;

// Calls `f` with every permutation of `0..n`.
fn for_each_permutation(n: i64, f: impl Fn(&[i64])) {
    fn recurse(keys: &mut Vec<i64>, k: usize, f: &dyn Fn(&[i64])) {
        if k == keys.len() {
            f(&keys[..]);
            return;
        }

        for i in k..keys.len() {
            keys.swap(k, i);
            recurse(keys, k + 1, f);
            keys.swap(k, i);
        }
    }

    recurse(&mut (0..n).collect(), 0, &f);
}

fn insert_all(keys: &[i64]) -> AvlTree<TestNode> {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    tree
}

fn insert_find_all(keys: &[i64]) {
    let tree = insert_all(keys);

    for key in keys {
        let node = tree.get_raw(key).expect("item not found");
        assert_eq!(unsafe { node.as_ref().key() }, key);
    }
    assert_eq!(tree.len(), keys.len());
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn few_elems_find() {
    for n in 2..=5 {
        for_each_permutation(n, insert_find_all);
    }
}

fn insert_remove_all(keys: &[i64]) {
    let mut tree = insert_all(keys);

    for key in keys {
        let node = tree.get_raw(key).expect("item not found");
        unsafe { tree.remove_at(node) };
        tree.assert_invariants();
    }

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        assert!(tree.remove(key).is_some());
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
}

#[test]
fn remove_one() {
    insert_remove_all(&[0]);
}

#[test]
fn remove_few() {
    for n in 2..=5 {
        for_each_permutation(n, insert_remove_all);
    }
}

#[test]
fn insert_duplicate_hands_back_item() {
    let mut tree = insert_all(&[2, 1, 3]);

    let rejected = tree.insert(TestNode::new(2)).expect_err("duplicate accepted");
    assert_eq!(rejected.key, 2);

    tree.assert_invariants();
    assert_eq!(tree.len(), 3);
}

#[test]
fn rebalancing_counts() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    // Promotions only, then a single rotation at the root.
    assert_eq!(tree.insert(TestNode::new(10)).ok(), Some(0));
    assert_eq!(tree.insert(TestNode::new(20)).ok(), Some(1));
    assert_eq!(tree.insert(TestNode::new(30)).ok(), Some(3));
    assert_eq!(tree.insert(TestNode::new(40)).ok(), Some(2));
    assert_eq!(tree.insert(TestNode::new(50)).ok(), Some(3));

    // A double rotation at the root.
    assert_eq!(tree.insert(TestNode::new(25)).ok(), Some(7));
    tree.assert_invariants();
    assert_eq!(tree.height(), 2);
    assert_eq!(tree.root.map(|root| unsafe { root.as_ref().key }), Some(30));

    // The root is replaced by its successor without any rebalancing.
    let (node, count) = tree.remove(&30).expect("item not found");
    assert_eq!((node.key, count), (30, 0));
    tree.assert_invariants();
    assert_eq!(tree.root.map(|root| unsafe { root.as_ref().key }), Some(40));
    assert_eq!(tree.height(), 2);
}

#[test]
fn remove_missing() {
    let mut tree = insert_all(&[1, 2]);

    assert!(tree.remove(&3).is_none());
    tree.assert_invariants();
    assert_eq!(tree.len(), 2);

    let mut empty: AvlTree<TestNode> = AvlTree::new();
    assert!(empty.remove(&3).is_none());
    assert!(empty.pop_first().is_none());
    assert!(empty.pop_last().is_none());
}

#[test]
fn heights_stay_logarithmic() {
    let tree = insert_all(&(0..1023).collect::<Vec<_>>());

    // An AVL tree on n nodes has height below 1.45 log2(n + 2).
    assert!(tree.height() >= 9);
    assert!(tree.height() <= 14);
}

#[test]
fn clear_drops_everything() {
    let mut tree = insert_all(&[5, 3, 8, 1]);

    tree.clear();
    tree.assert_invariants();
    assert!(tree.is_empty());
    assert_eq!(tree.height(), -1);
    assert!(tree.first().is_none());

    assert!(tree.insert(TestNode::new(7)).is_ok());
    tree.assert_invariants();
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn cursor_equivalence(
        keys in proptest::collection::vec(-1000i64..1000, 0..100),
        ops in proptest::collection::vec(model::cursor_op_strategy(), FUZZ_RANGE),
    ) {
        model::run_cursor_equivalence(keys, ops);
    }
}
