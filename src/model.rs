use std::{collections::BTreeMap, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlMap, AvlTree, Error, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: i64,
}

impl TestNode {
    pub(crate) fn new(key: i64) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = i64;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

/// A key operand: either an index into the keys currently present, or a literal key.
#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(i64),
}

impl ItemValue {
    fn resolve(self, map: &BTreeMap<i64, String>) -> i64 {
        match self {
            ItemValue::Index(idx) if !map.is_empty() => {
                map.keys().nth(idx % map.len()).copied().unwrap_or_default()
            }
            ItemValue::Index(idx) => (idx % 1000) as i64,
            ItemValue::Random(key) => key % 1_000_000,
        }
    }
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in -1000i64..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Get(ItemValue),
    Remove(ItemValue),
    Delete(ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
    /// Split around a key, check both halves, then join them back.
    Split(ItemValue),
    /// Join a map of this many greater keys onto the end.
    Append(u8),
    /// Join a map of this many lesser keys onto the front.
    Prepend(u8),
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        4 => value_strategy().prop_map(Op::Insert),
        1 => value_strategy().prop_map(Op::Get),
        1 => value_strategy().prop_map(Op::Remove),
        1 => value_strategy().prop_map(Op::Delete),
        1 => Just(Op::First),
        1 => Just(Op::PopFirst),
        1 => Just(Op::Last),
        1 => Just(Op::PopLast),
        1 => value_strategy().prop_map(Op::Split),
        1 => (0u8..40).prop_map(Op::Append),
        1 => (0u8..40).prop_map(Op::Prepend),
    ]
}

fn value_of(key: i64) -> String {
    format!("v{key}")
}

fn owned<'a>(entry: Option<(&'a i64, &'a String)>) -> Option<(i64, String)> {
    entry.map(|(&key, value)| (key, value.clone()))
}

// Joins `keys` as a separate map onto `avl` around `sep`, mirroring the result in `btree`.
fn join_keys(
    avl: &mut AvlMap<i64, String>,
    btree: &mut BTreeMap<i64, String>,
    sep: i64,
    keys: impl Iterator<Item = i64>,
    op_id: usize,
) {
    let mut other = AvlMap::new();
    for key in keys {
        other.insert(key, value_of(key)).expect("duplicate key in joined map");
        btree.insert(key, value_of(key));
    }
    btree.insert(sep, value_of(sep));

    let expected = (avl.height() - other.height()).unsigned_abs() as usize + 1;
    let cost = avl.join(sep, value_of(sep), other);

    assert_eq!(cost, Ok(expected), "Op #{op_id}: join cost");
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut btree = BTreeMap::new();
    let mut avl: AvlMap<i64, String> = AvlMap::new();

    for (op_id, op) in ops.into_iter().enumerate() {
        match op {
            Op::Insert(item) => {
                let key = item.resolve(&btree);
                let present = btree.contains_key(&key);
                btree.entry(key).or_insert_with(|| value_of(key));

                let from_avl = avl.insert(key, value_of(key));
                if present {
                    assert_eq!(from_avl, Err(Error::DuplicateKey), "Op #{op_id}: {op:?}");
                } else {
                    assert!(from_avl.is_ok(), "Op #{op_id}: {op:?}");
                }
            }

            Op::Get(item) => {
                let key = item.resolve(&btree);
                assert_eq!(btree.get(&key), avl.get(&key), "Op #{op_id}: {op:?}");
            }

            Op::Remove(item) => {
                let key = item.resolve(&btree);
                assert_eq!(btree.remove(&key), avl.remove(&key), "Op #{op_id}: {op:?}");
            }

            Op::Delete(item) => {
                let key = item.resolve(&btree);
                let from_avl = avl.delete(&key);

                match btree.remove(&key) {
                    Some(_) => assert!(from_avl.is_ok(), "Op #{op_id}: {op:?}"),
                    None => assert_eq!(from_avl, Err(Error::KeyNotFound), "Op #{op_id}: {op:?}"),
                }
            }

            Op::First => {
                assert_eq!(
                    owned(btree.first_key_value()),
                    owned(avl.first_key_value()),
                    "Op #{op_id}: {op:?}"
                );
            }

            Op::PopFirst => {
                assert_eq!(btree.pop_first(), avl.pop_first(), "Op #{op_id}: {op:?}");
            }

            Op::Last => {
                assert_eq!(
                    owned(btree.last_key_value()),
                    owned(avl.last_key_value()),
                    "Op #{op_id}: {op:?}"
                );
            }

            Op::PopLast => {
                assert_eq!(btree.pop_last(), avl.pop_last(), "Op #{op_id}: {op:?}");
            }

            Op::Split(item) => {
                let key = item.resolve(&btree);

                if !btree.contains_key(&key) {
                    assert!(
                        matches!(avl.split(&key), Err(Error::PreconditionViolated(_))),
                        "Op #{op_id}: {op:?}"
                    );
                } else {
                    let (mut left, (pivot, value), right) =
                        avl.split_entry(&key).expect("split pivot not found");
                    assert!(avl.is_empty(), "Op #{op_id}: {op:?}");

                    left.assert_invariants();
                    right.assert_invariants();
                    assert_eq!((pivot, value.as_str()), (key, btree[&key].as_str()));
                    assert!(left.iter().eq(btree.range(..key)), "Op #{op_id}: left half");
                    assert!(right.iter().eq(btree.range(key + 1..)), "Op #{op_id}: right half");

                    let expected = (left.height() - right.height()).unsigned_abs() as usize + 1;
                    assert_eq!(left.join(pivot, value, right), Ok(expected));
                    avl = left;
                }
            }

            Op::Append(count) => {
                let sep = avl.last_key_value().map_or(0, |(&max, _)| max + 1);
                join_keys(&mut avl, &mut btree, sep, (1..=i64::from(count)).map(|i| sep + i), op_id);
            }

            Op::Prepend(count) => {
                let sep = avl.first_key_value().map_or(0, |(&min, _)| min - 1);
                join_keys(&mut avl, &mut btree, sep, (1..=i64::from(count)).map(|i| sep - i), op_id);
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree.iter().eq(avl.iter()), "Op #{op_id}: contents differ");
        assert_eq!(btree.values().next(), avl.min());
        assert_eq!(btree.values().next_back(), avl.max());
    }
}

#[derive(Clone, Debug, Arbitrary)]
pub enum CursorOp {
    // The current element is compared after every operation, so there is no `Get`.
    MovePrev,
    MoveNext,
    PeekNext,
    PeekPrev,
    RemoveCurrent,
    RemoveCurrentMovePrev,
}

pub fn cursor_op_strategy() -> impl Strategy<Value = CursorOp> {
    proptest::prop_oneof![
        Just(CursorOp::MovePrev),
        Just(CursorOp::MoveNext),
        Just(CursorOp::PeekNext),
        Just(CursorOp::PeekPrev),
        Just(CursorOp::RemoveCurrent),
        Just(CursorOp::RemoveCurrentMovePrev),
    ]
}

#[derive(Clone, Debug)]
pub struct CursorEquivalenceInput {
    pub keys: Vec<i64>,
    pub ops: Vec<CursorOp>,
}

impl<'a> Arbitrary<'a> for CursorEquivalenceInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let num_keys = u8::arbitrary(u)? % 100;
        let num_ops = u16::arbitrary(u)? % 1000;

        let keys = core::iter::repeat_with(|| i64::arbitrary(u).unwrap_or(0))
            .take(num_keys.into())
            .collect();

        let ops = core::iter::repeat_with(|| CursorOp::arbitrary(u).unwrap_or(CursorOp::MoveNext))
            .take(num_ops.into())
            .collect();

        Ok(CursorEquivalenceInput { keys, ops })
    }
}

/// A position in a sorted `Vec`, with `None` as the "ghost" non-element.
struct VecCursor {
    pos: Option<usize>,
}

impl VecCursor {
    fn next(&self, v: &[i64]) -> Option<usize> {
        match self.pos {
            Some(i) => Some(i + 1).filter(|&i| i < v.len()),
            None => (!v.is_empty()).then_some(0),
        }
    }

    fn prev(&self, v: &[i64]) -> Option<usize> {
        match self.pos {
            Some(i) => i.checked_sub(1),
            None => v.len().checked_sub(1),
        }
    }
}

pub fn run_cursor_equivalence(mut keys: Vec<i64>, ops: Vec<CursorOp>) {
    keys.sort_unstable();
    keys.dedup();

    let mut tree: AvlTree<TestNode> = AvlTree::new();
    for &key in &keys {
        assert!(tree.insert(TestNode::new(key)).is_ok());
    }

    let mut vec_curs = VecCursor { pos: None };
    vec_curs.pos = vec_curs.next(&keys);
    let mut avl_curs = tree.cursor_first_mut();

    assert_eq!(vec_curs.pos.map(|i| &keys[i]), avl_curs.get().map(TestNode::key));

    for (op_id, op) in ops.into_iter().enumerate() {
        match op {
            CursorOp::MoveNext => {
                vec_curs.pos = vec_curs.next(&keys);
                avl_curs.move_next();
            }

            CursorOp::MovePrev => {
                vec_curs.pos = vec_curs.prev(&keys);
                avl_curs.move_prev();
            }

            CursorOp::PeekNext => {
                let expected = vec_curs.next(&keys).map(|i| &keys[i]);
                assert_eq!(expected, avl_curs.peek_next().map(TestNode::key), "Op #{op_id}");
            }

            CursorOp::PeekPrev => {
                let expected = vec_curs.prev(&keys).map(|i| &keys[i]);
                assert_eq!(expected, avl_curs.peek_prev().map(TestNode::key), "Op #{op_id}");
            }

            CursorOp::RemoveCurrent => {
                let expected = vec_curs.pos.map(|i| keys.remove(i));

                // The successor slides into the removed slot.
                if vec_curs.pos == Some(keys.len()) {
                    vec_curs.pos = None;
                }

                let removed = avl_curs.remove_current().map(|node| node.key);
                assert_eq!(expected, removed, "Op #{op_id}");
            }

            CursorOp::RemoveCurrentMovePrev => {
                let expected = match vec_curs.pos {
                    Some(i) => {
                        vec_curs.pos = i.checked_sub(1);
                        Some(keys.remove(i))
                    }
                    None => None,
                };

                let removed = avl_curs.remove_current_and_move_prev().map(|node| node.key);
                assert_eq!(expected, removed, "Op #{op_id}");
            }
        }

        assert_eq!(
            vec_curs.pos.map(|i| &keys[i]),
            avl_curs.get().map(TestNode::key),
            "Op #{op_id}: {op:?}"
        );
    }

    tree.assert_invariants();
    assert!(tree.iter().map(TestNode::key).eq(keys.iter()));
}
