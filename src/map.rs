//! An ordered map built on [`AvlTree`].

use core::{borrow::Borrow, fmt, marker::PhantomPinned, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlTree, Error, Links, Result, TreeNode};

/// An ordered map based on a size-augmented [AVL tree].
///
/// Besides lookups and updates, the map can be [split](Self::split) around a key and two maps
/// can be [joined](Self::join) around a separating entry.
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlMap<K: Ord + fmt::Debug, V> {
    tree: AvlTree<MapNode<K, V>>,
}

struct MapNode<K, V> {
    links: Links<MapNode<K, V>>,
    key: K,
    value: V,
    _unpin: PhantomPinned,
}

impl<K, V> MapNode<K, V> {
    fn new(key: K, value: V) -> Box<Self> {
        Box::new(MapNode {
            links: Links::new(),
            key,
            value,
            _unpin: PhantomPinned,
        })
    }

    fn into_entry(self: Box<Self>) -> (K, V) {
        let MapNode { key, value, .. } = *self;
        (key, value)
    }
}

unsafe impl<K, V> Linked<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MapNode<K, V>>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<K: Ord + fmt::Debug, V> TreeNode<Links<MapNode<K, V>>> for MapNode<K, V> {
    type Key = K;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

impl<K: Ord + fmt::Debug, V> AvlMap<K, V> {
    /// Creates a new, empty `AvlMap`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns the height of the underlying tree, or -1 if the map is empty.
    pub fn height(&self) -> i32 {
        self.tree.height()
    }

    /// Returns `true` if the map contains a value associated with `key`.
    #[inline]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(key)
    }

    /// Returns a reference to the value associated with `key`.
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(key).map(|node| &node.get_ref().value)
    }

    /// Returns a mutable reference to the value associated with `key`.
    #[inline]
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree
            .get_mut(key)
            // SAFETY: Pinning is not structural for `node.value`.
            .map(|node| unsafe { &mut node.get_unchecked_mut().value })
    }

    /// Inserts `value` under `key`.
    ///
    /// Returns the number of rebalancing operations performed, or [`Error::DuplicateKey`] if
    /// `key` is already present, in which case the map is not modified.
    pub fn insert(&mut self, key: K, value: V) -> Result<usize> {
        self.tree
            .insert(MapNode::new(key, value))
            .map_err(|_| Error::DuplicateKey)
    }

    /// Deletes the entry associated with `key`.
    ///
    /// Returns the number of rebalancing operations performed, or [`Error::KeyNotFound`] if
    /// `key` is not present, in which case the map is not modified.
    pub fn delete<Q>(&mut self, key: &Q) -> Result<usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree
            .remove(key)
            .map(|(_, count)| count)
            .ok_or(Error::KeyNotFound)
    }

    /// Removes the entry associated with `key`, returning its value.
    #[inline]
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove(key).map(|(node, _)| node.value)
    }

    /// Returns the value associated with the minimum key.
    #[inline]
    pub fn min(&self) -> Option<&V> {
        self.first_key_value().map(|(_, value)| value)
    }

    /// Returns the value associated with the maximum key.
    #[inline]
    pub fn max(&self) -> Option<&V> {
        self.last_key_value().map(|(_, value)| value)
    }

    /// Returns the first key-value pair in the map.
    ///
    /// The returned key is the minimum key in the map.
    #[inline]
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        self.tree.first().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the first key-value pair in the map.
    #[inline]
    pub fn pop_first(&mut self) -> Option<(K, V)> {
        self.tree.pop_first().map(MapNode::into_entry)
    }

    /// Returns the last key-value pair in the map.
    ///
    /// The returned key is the maximum key in the map.
    #[inline]
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        self.tree.last().map(|node| {
            let node = node.get_ref();
            (&node.key, &node.value)
        })
    }

    /// Removes and returns the last key-value pair in the map.
    #[inline]
    pub fn pop_last(&mut self) -> Option<(K, V)> {
        self.tree.pop_last().map(MapNode::into_entry)
    }

    /// Returns an iterator over the entries of the map, in ascending key order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&K, &V)> + '_ {
        self.tree.iter().map(|node| (&node.key, &node.value))
    }

    /// Returns an iterator over the keys of the map, in ascending order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &K> + '_ {
        self.tree.iter().map(|node| &node.key)
    }

    /// Returns an iterator over the values of the map, in ascending order of their keys.
    pub fn values(&self) -> impl ExactSizeIterator<Item = &V> + '_ {
        self.tree.iter().map(|node| &node.value)
    }

    /// Returns all keys of the map in ascending order.
    pub fn keys_in_order(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.keys().cloned().collect()
    }

    /// Returns all values of the map, in ascending order of their keys.
    pub fn values_in_order(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.values().cloned().collect()
    }

    /// Splits the map around `key`.
    ///
    /// Returns the map of all lesser keys, the entry for `key`, and the map of all greater keys,
    /// leaving this map empty. If `key` is not present, returns
    /// [`Error::PreconditionViolated`] and leaves the map unchanged.
    pub fn split_entry<Q>(&mut self, key: &Q) -> Result<(Self, (K, V), Self)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let (left, pivot, right) = self
            .tree
            .split(key)
            .ok_or(Error::PreconditionViolated("split pivot is not present"))?;

        Ok((
            AvlMap { tree: left },
            pivot.into_entry(),
            AvlMap { tree: right },
        ))
    }

    /// Splits the map around `key`, discarding its entry.
    ///
    /// Returns the map of all lesser keys and the map of all greater keys, leaving this map
    /// empty. If `key` is not present, returns [`Error::PreconditionViolated`] and leaves the
    /// map unchanged.
    pub fn split<Q>(&mut self, key: &Q) -> Result<(Self, Self)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let (left, _, right) = self.split_entry(key)?;
        Ok((left, right))
    }

    /// Joins the entry `(key, value)` and every entry of `other` into this map.
    ///
    /// All keys of one map must be less than `key` and all keys of the other greater; either
    /// map may be the lesser one and either may be empty. Otherwise returns
    /// [`Error::PreconditionViolated`] without modifying either map.
    ///
    /// Returns the difference between the heights of the two maps plus one, counting an empty
    /// map as having height -1.
    pub fn join(&mut self, key: K, value: V, other: Self) -> Result<usize> {
        let below = |map: &Self| map.last_key_value().is_none_or(|(max, _)| *max < key);
        let above = |map: &Self| map.first_key_value().is_none_or(|(min, _)| *min > key);

        let ordered = (below(self) && above(&other)) || (above(self) && below(&other));
        if !ordered {
            return Err(Error::PreconditionViolated(
                "joined keys must lie on either side of the separator",
            ));
        }

        self.tree
            .join(MapNode::new(key, value), other.tree)
            .map_err(|_| Error::DuplicateKey)
    }

    /// Clears the map, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }
}

impl<K: Ord + fmt::Debug, V> Default for AvlMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for AvlMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(keys: &[i32]) -> AvlMap<i32, String> {
        let mut map = AvlMap::new();

        for &key in keys {
            map.insert(key, format!("v{key}")).unwrap();
            map.assert_invariants();
        }

        map
    }

    #[test]
    fn insert_reports_rebalancing() {
        let mut map = AvlMap::new();
        let counts: Vec<_> = [10, 20, 30, 40, 50, 25]
            .into_iter()
            .map(|key| {
                let count = map.insert(key, format!("v{key}")).unwrap();
                map.assert_invariants();
                count
            })
            .collect();

        assert_eq!(counts, [0, 1, 3, 2, 3, 7]);
        assert_eq!(map.keys_in_order(), [10, 20, 25, 30, 40, 50]);
        assert_eq!(map.height(), 2);
    }

    #[test]
    fn delete_root_with_two_children() {
        let mut map = map_of(&[10, 20, 30, 40, 50, 25]);

        assert_eq!(map.delete(&30), Ok(0));
        map.assert_invariants();

        assert_eq!(map.keys_in_order(), [10, 20, 25, 40, 50]);
        assert_eq!(map.height(), 2);
        assert_eq!(map.len(), 5);
    }

    fn root_key(map: &AvlMap<i32, String>) -> Option<i32> {
        map.tree.root.map(|root| unsafe { root.as_ref().key })
    }

    #[test]
    fn delete_reports_rebalancing() {
        // 1 becomes a missing child of 2, which is then 2,2 and is demoted.
        let mut map = map_of(&[3, 2, 5, 1, 4, 6]);
        assert_eq!(map.delete(&1), Ok(1));
        map.assert_invariants();
        assert_eq!(root_key(&map), Some(3));

        // The sibling of the 3-child is 1,1: one rotation and the subtree keeps its height.
        let mut map = map_of(&[2, 1, 4, 3, 5]);
        assert_eq!(map.delete(&1), Ok(3));
        map.assert_invariants();
        assert_eq!(root_key(&map), Some(4));

        // The sibling's far child is its 1-child: one rotation, then the parent is checked.
        let mut map = map_of(&[2, 1, 3, 4]);
        assert_eq!(map.delete(&1), Ok(3));
        map.assert_invariants();
        assert_eq!(root_key(&map), Some(3));

        // The sibling's near child is its 1-child: a double rotation.
        let mut map = map_of(&[2, 1, 4, 3]);
        assert_eq!(map.delete(&1), Ok(6));
        map.assert_invariants();
        assert_eq!(root_key(&map), Some(3));

        // A single rotation that shortens its subtree forces a second one at the root.
        let mut map = map_of(&[5, 3, 8, 2, 4, 7, 10, 1, 6, 9, 11, 12]);
        assert_eq!(map.delete(&4), Ok(6));
        map.assert_invariants();
        assert_eq!(root_key(&map), Some(8));
        assert_eq!(map.height(), 3);
        assert_eq!(map.keys_in_order(), [1, 2, 3, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn insert_then_delete_restores_contents() {
        let mut map = map_of(&[40, 20, 60, 10, 30, 50, 70]);

        for key in [0, 15, 35, 45, 80] {
            let keys = map.keys_in_order();
            let values = map.values_in_order();

            map.insert(key, format!("v{key}")).unwrap();
            map.delete(&key).unwrap();
            map.assert_invariants();

            assert_eq!(map.keys_in_order(), keys);
            assert_eq!(map.values_in_order(), values);
            assert_eq!(map.len(), keys.len());
        }
    }

    #[test]
    fn split_scenario() {
        let mut map = map_of(&[10, 20, 30, 40, 50, 25]);

        let (left, right) = map.split(&30).unwrap();
        assert!(map.is_empty());

        left.assert_invariants();
        right.assert_invariants();
        assert_eq!(left.keys_in_order(), [10, 20, 25]);
        assert_eq!(right.keys_in_order(), [40, 50]);
        assert_eq!(left.values_in_order(), ["v10", "v20", "v25"]);
        assert_eq!(right.min().map(String::as_str), Some("v40"));
        assert_eq!(right.max().map(String::as_str), Some("v50"));
    }

    #[test]
    fn duplicate_insert_leaves_map_unchanged() {
        let mut map = map_of(&[3, 1, 2]);

        assert_eq!(map.insert(2, "other".to_owned()), Err(Error::DuplicateKey));
        map.assert_invariants();
        assert_eq!(map.len(), 3);
        assert_eq!(map.keys_in_order(), [1, 2, 3]);
        assert_eq!(map.get(&2).map(String::as_str), Some("v2"));
    }

    #[test]
    fn missing_delete_leaves_map_unchanged() {
        let mut map = map_of(&[3, 1, 2]);

        assert_eq!(map.delete(&7), Err(Error::KeyNotFound));
        map.assert_invariants();
        assert_eq!(map.keys_in_order(), [1, 2, 3]);

        let mut empty: AvlMap<i32, String> = AvlMap::new();
        assert_eq!(empty.delete(&7), Err(Error::KeyNotFound));
    }

    #[test]
    fn empty_map() {
        let map: AvlMap<i32, String> = AvlMap::default();

        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert_eq!(map.height(), -1);
        assert_eq!(map.get(&1), None);
        assert_eq!(map.min(), None);
        assert_eq!(map.max(), None);
        assert!(map.keys_in_order().is_empty());
        assert!(map.values_in_order().is_empty());
    }

    #[test]
    fn min_max_follow_deletions() {
        let mut map = map_of(&[5, 3, 8, 1, 4, 9]);

        assert_eq!(map.min().map(String::as_str), Some("v1"));
        assert_eq!(map.max().map(String::as_str), Some("v9"));

        map.delete(&1).unwrap();
        map.delete(&9).unwrap();
        map.assert_invariants();
        assert_eq!(map.min().map(String::as_str), Some("v3"));
        assert_eq!(map.max().map(String::as_str), Some("v8"));

        assert_eq!(map.pop_first(), Some((3, "v3".to_owned())));
        assert_eq!(map.pop_last(), Some((8, "v8".to_owned())));
        map.assert_invariants();
        assert_eq!(map.keys_in_order(), [4, 5]);
    }

    #[test]
    fn remove_and_get_mut() {
        let mut map = map_of(&[1, 2, 3]);

        map.get_mut(&2).unwrap().push('!');
        assert_eq!(map.get(&2).map(String::as_str), Some("v2!"));

        assert_eq!(map.remove(&2), Some("v2!".to_owned()));
        assert_eq!(map.remove(&2), None);
        map.assert_invariants();
        assert!(!map.contains_key(&2));
    }

    #[test]
    fn split_missing_pivot() {
        let mut map = map_of(&[1, 2, 3]);

        assert!(matches!(map.split(&4), Err(Error::PreconditionViolated(_))));
        map.assert_invariants();
        assert_eq!(map.keys_in_order(), [1, 2, 3]);
    }

    #[test]
    fn split_then_join_round_trip() {
        let keys: Vec<i32> = (0..50).map(|k| (k * 17) % 50).collect();

        for pivot in [0, 1, 24, 25, 48, 49] {
            let mut map = map_of(&keys);
            let (mut left, (key, value), right) = map.split_entry(&pivot).unwrap();

            assert_eq!(key, pivot);
            left.join(key, value, right).unwrap();
            left.assert_invariants();

            assert_eq!(left.keys_in_order(), (0..50).collect::<Vec<_>>());
            assert_eq!(left.get(&pivot).map(String::as_str), Some(format!("v{pivot}").as_str()));
        }
    }

    #[test]
    fn join_checks_ordering() {
        let mut low = map_of(&[1, 2, 3]);
        let high = map_of(&[10, 11]);

        assert!(matches!(
            low.join(2, "x".to_owned(), map_of(&[10])),
            Err(Error::PreconditionViolated(_))
        ));
        assert!(matches!(
            low.join(5, "x".to_owned(), map_of(&[0, 7])),
            Err(Error::PreconditionViolated(_))
        ));
        low.assert_invariants();
        assert_eq!(low.keys_in_order(), [1, 2, 3]);

        // Either side may hold the lesser keys.
        let mut high_first = map_of(&[10, 11]);
        assert_eq!(high_first.join(5, "v5".to_owned(), map_of(&[1, 2, 3])), Ok(1));
        high_first.assert_invariants();
        assert_eq!(high_first.keys_in_order(), [1, 2, 3, 5, 10, 11]);

        assert_eq!(low.join(5, "v5".to_owned(), high), Ok(1));
        assert_eq!(low.keys_in_order(), [1, 2, 3, 5, 10, 11]);
        assert_eq!(low.min().map(String::as_str), Some("v1"));
        assert_eq!(low.max().map(String::as_str), Some("v11"));
    }

    #[test]
    fn debug_lists_entries() {
        let map = map_of(&[2, 1]);
        assert_eq!(format!("{map:?}"), r#"{1: "v1", 2: "v2"}"#);
    }
}
