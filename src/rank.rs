/// The rank of a node, which for an AVL tree is its height.
///
/// Missing children have rank -1 and leaves have rank 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Rank(i8);

impl Rank {
    pub(crate) const MISSING: Rank = Rank(-1);
    pub(crate) const LEAF: Rank = Rank(0);

    #[inline]
    pub(crate) const fn get(self) -> i8 {
        self.0
    }

    /// Returns the rank one above `self`.
    #[inline]
    pub(crate) fn raised(self) -> Rank {
        Rank(self.0.checked_add(1).unwrap())
    }

    /// Returns the rank difference of a child of rank `child` under a node of rank `self`.
    #[inline]
    pub(crate) fn diff(self, child: Rank) -> i8 {
        self.0 - child.0
    }

    #[inline]
    pub(crate) fn promote(&mut self) {
        self.0 = self.0.checked_add(1).unwrap();
    }

    #[inline]
    pub(crate) fn demote(&mut self) {
        self.0 = self.0.checked_sub(1).unwrap();
    }

    #[inline]
    pub(crate) fn demote_twice(&mut self) {
        self.0 = self.0.checked_sub(2).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_diffs() {
        let mut rank = Rank::LEAF;
        assert_eq!(rank.diff(Rank::MISSING), 1);

        rank.promote();
        rank.promote();
        assert_eq!(rank.get(), 2);
        assert_eq!(rank.diff(Rank::LEAF), 2);
        assert_eq!(rank.diff(Rank::MISSING), 3);

        rank.demote_twice();
        assert_eq!(rank, Rank::LEAF);

        rank.demote();
        assert_eq!(rank, Rank::MISSING);
        assert_eq!(rank.raised(), Rank::LEAF);
    }

    #[test]
    #[should_panic]
    fn demote_below_missing_panics() {
        let mut rank = Rank(i8::MIN);
        rank.demote();
    }
}
