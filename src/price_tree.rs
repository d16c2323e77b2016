//! Price index for one side of one item's book.
//!
//! An arena red-black tree keyed by price. [`PriceTree::remove`] detaches a node from
//! the tree linkage but keeps its [`LevelHead`] counters, so inserting the same price
//! again resumes where that level's storage left off. Nodes are only freed when a
//! rolled-back batch hands back the ones it allocated.
//!
//! Cost is O(log n) per insert/remove/search, where n is the number of distinct
//! prices currently live on this side.

use std::collections::HashMap;

use crate::price_level::LevelHead;
use crate::types::Price;

/// Index of the shared black sentinel leaf.
const NIL: usize = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Clone, Debug)]
struct Node {
    price: Price,
    parent: usize,
    left: usize,
    right: usize,
    color: Color,
    /// Linked into the tree. Cleared on remove; the node itself stays allocated.
    live: bool,
    head: LevelHead,
}

impl Node {
    fn sentinel() -> Self {
        Self {
            price: 0,
            parent: NIL,
            left: NIL,
            right: NIL,
            color: Color::Black,
            live: false,
            head: LevelHead::default(),
        }
    }
}

/// Lifecycle of a price within one tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// No order ever rested at this price.
    Unallocated,
    /// Had orders once; detached but its counters are retained.
    Removed,
    /// Currently has resting orders.
    Live,
}

/// A live price and its level head counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeRef {
    pub price: Price,
    pub head: LevelHead,
}

#[derive(Clone, Debug)]
pub struct PriceTree {
    nodes: Vec<Node>,
    index: HashMap<Price, usize>,
    root: usize,
    len: usize,
}

impl Default for PriceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel()],
            index: HashMap::new(),
            root: NIL,
            len: 0,
        }
    }

    /// Number of live prices.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of prices ever allocated (live or removed).
    pub fn allocated(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn exists(&self, price: Price) -> NodeState {
        match self.index.get(&price) {
            None => NodeState::Unallocated,
            Some(&idx) if self.nodes[idx].live => NodeState::Live,
            Some(_) => NodeState::Removed,
        }
    }

    pub fn is_live(&self, price: Price) -> bool {
        self.exists(price) == NodeState::Live
    }

    /// The live node at `price`; `None` if the price is unallocated or removed.
    pub fn get_node(&self, price: Price) -> Option<NodeRef> {
        let idx = self.live_index(price)?;
        Some(NodeRef {
            price,
            head: self.nodes[idx].head,
        })
    }

    /// Counters of an allocated price, live or removed.
    pub fn retained_head(&self, price: Price) -> Option<LevelHead> {
        self.index.get(&price).map(|&idx| self.nodes[idx].head)
    }

    /// Folds `extra_tombstone_segments` drained segments into the head and replaces the
    /// in-segment deleted count. Returns false if `price` is not live.
    pub fn edit(
        &mut self,
        price: Price,
        extra_tombstone_segments: usize,
        in_segment_deleted: usize,
    ) -> bool {
        let Some(idx) = self.live_index(price) else {
            return false;
        };
        let head = &mut self.nodes[idx].head;
        head.tombstone_offset += extra_tombstone_segments;
        head.in_segment_deleted = in_segment_deleted;
        true
    }

    /// Lowest live price.
    pub fn first(&self) -> Option<Price> {
        if self.root == NIL {
            return None;
        }
        Some(self.nodes[self.minimum(self.root)].price)
    }

    /// Highest live price.
    pub fn last(&self) -> Option<Price> {
        if self.root == NIL {
            return None;
        }
        Some(self.nodes[self.maximum(self.root)].price)
    }

    /// Lowest live price strictly above `price`.
    pub fn next_above(&self, price: Price) -> Option<Price> {
        let mut cur = self.root;
        let mut best = None;
        while cur != NIL {
            let p = self.nodes[cur].price;
            if p > price {
                best = Some(p);
                cur = self.nodes[cur].left;
            } else {
                cur = self.nodes[cur].right;
            }
        }
        best
    }

    /// Highest live price strictly below `price`.
    pub fn next_below(&self, price: Price) -> Option<Price> {
        let mut cur = self.root;
        let mut best = None;
        while cur != NIL {
            let p = self.nodes[cur].price;
            if p < price {
                best = Some(p);
                cur = self.nodes[cur].right;
            } else {
                cur = self.nodes[cur].left;
            }
        }
        best
    }

    /// Live prices in ascending order.
    pub fn ascending(&self) -> Iter<'_> {
        let start = if self.root == NIL {
            NIL
        } else {
            self.minimum(self.root)
        };
        Iter {
            tree: self,
            cur: start,
            descending: false,
        }
    }

    /// Live prices in descending order.
    pub fn descending(&self) -> Iter<'_> {
        let start = if self.root == NIL {
            NIL
        } else {
            self.maximum(self.root)
        };
        Iter {
            tree: self,
            cur: start,
            descending: true,
        }
    }

    /// Links `price` into the tree. A previously removed price reuses its node and
    /// counters. Returns false if the price was already live.
    pub fn insert(&mut self, price: Price) -> bool {
        let idx = match self.index.get(&price) {
            Some(&idx) if self.nodes[idx].live => return false,
            Some(&idx) => idx,
            None => {
                let idx = self.nodes.len();
                self.nodes.push(Node {
                    price,
                    ..Node::sentinel()
                });
                self.index.insert(price, idx);
                idx
            }
        };
        {
            let node = &mut self.nodes[idx];
            node.parent = NIL;
            node.left = NIL;
            node.right = NIL;
            node.color = Color::Red;
            node.live = true;
        }

        let mut parent = NIL;
        let mut cur = self.root;
        while cur != NIL {
            parent = cur;
            cur = if price < self.nodes[cur].price {
                self.nodes[cur].left
            } else {
                self.nodes[cur].right
            };
        }
        self.nodes[idx].parent = parent;
        if parent == NIL {
            self.root = idx;
        } else if price < self.nodes[parent].price {
            self.nodes[parent].left = idx;
        } else {
            self.nodes[parent].right = idx;
        }
        self.insert_fixup(idx);
        self.len += 1;
        true
    }

    /// Detaches `price` from the tree, keeping its counters. Returns false if not live.
    pub fn remove(&mut self, price: Price) -> bool {
        let Some(z) = self.live_index(price) else {
            return false;
        };
        self.delete(z);
        let node = &mut self.nodes[z];
        node.live = false;
        node.parent = NIL;
        node.left = NIL;
        node.right = NIL;
        self.nodes[NIL].parent = NIL;
        self.len -= 1;
        true
    }

    /// Puts an allocated price back into a recorded state: linked or detached, with
    /// exactly `head` as its counters.
    pub(crate) fn restore(&mut self, price: Price, head: LevelHead, live: bool) {
        if live {
            self.insert(price);
        } else {
            self.remove(price);
        }
        if let Some(&idx) = self.index.get(&price) {
            self.nodes[idx].head = head;
        }
    }

    /// Frees every node allocated after the first `allocated`, detaching any that are
    /// still live.
    pub(crate) fn truncate(&mut self, allocated: usize) {
        let keep = allocated + 1;
        if self.nodes.len() <= keep {
            return;
        }
        let prices: Vec<Price> = self.nodes[keep..].iter().map(|n| n.price).collect();
        for price in prices {
            self.remove(price);
            self.index.remove(&price);
        }
        self.nodes.truncate(keep);
    }

    fn live_index(&self, price: Price) -> Option<usize> {
        match self.index.get(&price) {
            Some(&idx) if self.nodes[idx].live => Some(idx),
            _ => None,
        }
    }

    fn color(&self, idx: usize) -> Color {
        self.nodes[idx].color
    }

    fn set_color(&mut self, idx: usize, color: Color) {
        if idx != NIL || color == Color::Black {
            self.nodes[idx].color = color;
        }
    }

    fn parent(&self, idx: usize) -> usize {
        self.nodes[idx].parent
    }

    fn left(&self, idx: usize) -> usize {
        self.nodes[idx].left
    }

    fn right(&self, idx: usize) -> usize {
        self.nodes[idx].right
    }

    fn minimum(&self, mut idx: usize) -> usize {
        while self.left(idx) != NIL {
            idx = self.left(idx);
        }
        idx
    }

    fn maximum(&self, mut idx: usize) -> usize {
        while self.right(idx) != NIL {
            idx = self.right(idx);
        }
        idx
    }

    fn successor(&self, idx: usize) -> usize {
        if self.right(idx) != NIL {
            return self.minimum(self.right(idx));
        }
        let mut child = idx;
        let mut up = self.parent(idx);
        while up != NIL && child == self.right(up) {
            child = up;
            up = self.parent(up);
        }
        up
    }

    fn predecessor(&self, idx: usize) -> usize {
        if self.left(idx) != NIL {
            return self.maximum(self.left(idx));
        }
        let mut child = idx;
        let mut up = self.parent(idx);
        while up != NIL && child == self.left(up) {
            child = up;
            up = self.parent(up);
        }
        up
    }

    fn rotate_left(&mut self, x: usize) {
        let y = self.right(x);
        let y_left = self.left(y);
        self.nodes[x].right = y_left;
        if y_left != NIL {
            self.nodes[y_left].parent = x;
        }
        let xp = self.parent(x);
        self.nodes[y].parent = xp;
        if xp == NIL {
            self.root = y;
        } else if x == self.left(xp) {
            self.nodes[xp].left = y;
        } else {
            self.nodes[xp].right = y;
        }
        self.nodes[y].left = x;
        self.nodes[x].parent = y;
    }

    fn rotate_right(&mut self, x: usize) {
        let y = self.left(x);
        let y_right = self.right(y);
        self.nodes[x].left = y_right;
        if y_right != NIL {
            self.nodes[y_right].parent = x;
        }
        let xp = self.parent(x);
        self.nodes[y].parent = xp;
        if xp == NIL {
            self.root = y;
        } else if x == self.right(xp) {
            self.nodes[xp].right = y;
        } else {
            self.nodes[xp].left = y;
        }
        self.nodes[y].right = x;
        self.nodes[x].parent = y;
    }

    fn insert_fixup(&mut self, mut z: usize) {
        while self.color(self.parent(z)) == Color::Red {
            let p = self.parent(z);
            let g = self.parent(p);
            if p == self.left(g) {
                let uncle = self.right(g);
                if self.color(uncle) == Color::Red {
                    self.set_color(p, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(g, Color::Red);
                    z = g;
                } else {
                    if z == self.right(p) {
                        z = p;
                        self.rotate_left(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.rotate_right(g);
                }
            } else {
                let uncle = self.left(g);
                if self.color(uncle) == Color::Red {
                    self.set_color(p, Color::Black);
                    self.set_color(uncle, Color::Black);
                    self.set_color(g, Color::Red);
                    z = g;
                } else {
                    if z == self.left(p) {
                        z = p;
                        self.rotate_right(z);
                    }
                    let p = self.parent(z);
                    let g = self.parent(p);
                    self.set_color(p, Color::Black);
                    self.set_color(g, Color::Red);
                    self.rotate_left(g);
                }
            }
        }
        let root = self.root;
        self.set_color(root, Color::Black);
    }

    /// Replaces the subtree rooted at `u` with the one rooted at `v`.
    /// `v` may be the sentinel; its parent is set so the delete fixup can climb.
    fn transplant(&mut self, u: usize, v: usize) {
        let up = self.parent(u);
        if up == NIL {
            self.root = v;
        } else if u == self.left(up) {
            self.nodes[up].left = v;
        } else {
            self.nodes[up].right = v;
        }
        self.nodes[v].parent = up;
    }

    fn delete(&mut self, z: usize) {
        let mut removed_color = self.color(z);
        let x;
        if self.left(z) == NIL {
            x = self.right(z);
            self.transplant(z, x);
        } else if self.right(z) == NIL {
            x = self.left(z);
            self.transplant(z, x);
        } else {
            let y = self.minimum(self.right(z));
            removed_color = self.color(y);
            x = self.right(y);
            if self.parent(y) == z {
                self.nodes[x].parent = y;
            } else {
                self.transplant(y, x);
                let zr = self.right(z);
                self.nodes[y].right = zr;
                self.nodes[zr].parent = y;
            }
            self.transplant(z, y);
            let zl = self.left(z);
            self.nodes[y].left = zl;
            self.nodes[zl].parent = y;
            let zc = self.color(z);
            self.set_color(y, zc);
        }
        if removed_color == Color::Black {
            self.delete_fixup(x);
        }
    }

    fn delete_fixup(&mut self, mut x: usize) {
        while x != self.root && self.color(x) == Color::Black {
            let p = self.parent(x);
            if x == self.left(p) {
                let mut w = self.right(p);
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(p, Color::Red);
                    self.rotate_left(p);
                    w = self.right(self.parent(x));
                }
                if self.color(self.left(w)) == Color::Black
                    && self.color(self.right(w)) == Color::Black
                {
                    self.set_color(w, Color::Red);
                    x = self.parent(x);
                } else {
                    if self.color(self.right(w)) == Color::Black {
                        let wl = self.left(w);
                        self.set_color(wl, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_right(w);
                        w = self.right(self.parent(x));
                    }
                    let xp = self.parent(x);
                    let pc = self.color(xp);
                    self.set_color(w, pc);
                    self.set_color(xp, Color::Black);
                    let wr = self.right(w);
                    self.set_color(wr, Color::Black);
                    self.rotate_left(xp);
                    x = self.root;
                }
            } else {
                let mut w = self.left(p);
                if self.color(w) == Color::Red {
                    self.set_color(w, Color::Black);
                    self.set_color(p, Color::Red);
                    self.rotate_right(p);
                    w = self.left(self.parent(x));
                }
                if self.color(self.right(w)) == Color::Black
                    && self.color(self.left(w)) == Color::Black
                {
                    self.set_color(w, Color::Red);
                    x = self.parent(x);
                } else {
                    if self.color(self.left(w)) == Color::Black {
                        let wr = self.right(w);
                        self.set_color(wr, Color::Black);
                        self.set_color(w, Color::Red);
                        self.rotate_left(w);
                        w = self.left(self.parent(x));
                    }
                    let xp = self.parent(x);
                    let pc = self.color(xp);
                    self.set_color(w, pc);
                    self.set_color(xp, Color::Black);
                    let wl = self.left(w);
                    self.set_color(wl, Color::Black);
                    self.rotate_right(xp);
                    x = self.root;
                }
            }
        }
        self.set_color(x, Color::Black);
    }

    /// Checks ordering, parent links and red-black balance. Returns the black height.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<usize, String> {
        if self.color(self.root) != Color::Black {
            return Err("root is red".into());
        }
        if self.root != NIL && self.parent(self.root) != NIL {
            return Err("root has a parent".into());
        }
        let (height, count) = self.check_subtree(self.root, None, None)?;
        if count != self.len {
            return Err(format!("tree holds {} nodes but len is {}", count, self.len));
        }
        Ok(height)
    }

    #[cfg(test)]
    fn check_subtree(
        &self,
        idx: usize,
        lo: Option<Price>,
        hi: Option<Price>,
    ) -> Result<(usize, usize), String> {
        if idx == NIL {
            return Ok((1, 0));
        }
        let node = &self.nodes[idx];
        if !node.live {
            return Err(format!("removed node {} still linked", node.price));
        }
        if lo.is_some_and(|lo| node.price <= lo) || hi.is_some_and(|hi| node.price >= hi) {
            return Err(format!("price {} out of order", node.price));
        }
        for child in [node.left, node.right] {
            if child != NIL && self.parent(child) != idx {
                return Err(format!("bad parent link under {}", node.price));
            }
            if node.color == Color::Red && self.color(child) == Color::Red {
                return Err(format!("red-red at {}", node.price));
            }
        }
        let (lh, lc) = self.check_subtree(node.left, lo, Some(node.price))?;
        let (rh, rc) = self.check_subtree(node.right, Some(node.price), hi)?;
        if lh != rh {
            return Err(format!("black height mismatch at {}", node.price));
        }
        let own = usize::from(node.color == Color::Black);
        Ok((lh + own, lc + rc + 1))
    }
}

/// In-order walk over live prices.
pub struct Iter<'a> {
    tree: &'a PriceTree,
    cur: usize,
    descending: bool,
}

impl Iterator for Iter<'_> {
    type Item = Price;

    fn next(&mut self) -> Option<Price> {
        if self.cur == NIL {
            return None;
        }
        let price = self.tree.nodes[self.cur].price;
        self.cur = if self.descending {
            self.tree.predecessor(self.cur)
        } else {
            self.tree.successor(self.cur)
        };
        Some(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    #[test]
    fn empty_tree_has_no_bounds() {
        let tree = PriceTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.first(), None);
        assert_eq!(tree.last(), None);
        assert_eq!(tree.exists(100), NodeState::Unallocated);
        assert!(tree.get_node(100).is_none());
        assert_eq!(tree.check_invariants(), Ok(1));
    }

    #[test]
    fn ascending_inserts_stay_balanced() {
        let mut tree = PriceTree::new();
        for p in 1..=1000u64 {
            assert!(tree.insert(p));
        }
        let height = tree.check_invariants().unwrap();
        // black height of a 1000-node red-black tree is small
        assert!(height <= 11, "black height {}", height);
        assert_eq!(tree.first(), Some(1));
        assert_eq!(tree.last(), Some(1000));
        assert_eq!(tree.len(), 1000);
    }

    #[test]
    fn duplicate_insert_and_missing_remove_are_noops() {
        let mut tree = PriceTree::new();
        assert!(tree.insert(10));
        assert!(!tree.insert(10));
        assert!(!tree.remove(11));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn exists_distinguishes_three_states() {
        let mut tree = PriceTree::new();
        tree.insert(50);
        assert_eq!(tree.exists(50), NodeState::Live);
        tree.remove(50);
        assert_eq!(tree.exists(50), NodeState::Removed);
        assert_eq!(tree.exists(51), NodeState::Unallocated);
        assert_eq!(tree.first(), None);
        assert_eq!(tree.allocated(), 1);
    }

    #[test]
    fn removed_price_resumes_its_counters() {
        let mut tree = PriceTree::new();
        tree.insert(100);
        assert!(tree.edit(100, 2, 1));
        assert!(tree.edit(100, 1, 3));
        tree.remove(100);
        assert!(!tree.edit(100, 1, 0), "edit on a removed price is refused");
        assert_eq!(
            tree.retained_head(100),
            Some(LevelHead {
                tombstone_offset: 3,
                in_segment_deleted: 3
            })
        );
        tree.insert(100);
        let node = tree.get_node(100).unwrap();
        assert_eq!(node.head.tombstone_offset, 3);
        assert_eq!(node.head.in_segment_deleted, 3);
        assert_eq!(tree.allocated(), 1);
    }

    #[test]
    fn neighbours_and_iteration() {
        let mut tree = PriceTree::new();
        for p in [30, 10, 50, 20, 40] {
            tree.insert(p);
        }
        tree.remove(40);
        assert_eq!(tree.next_above(10), Some(20));
        assert_eq!(tree.next_above(30), Some(50));
        assert_eq!(tree.next_above(50), None);
        assert_eq!(tree.next_below(50), Some(30));
        assert_eq!(tree.next_below(10), None);
        assert_eq!(tree.next_above(0), Some(10));
        assert_eq!(tree.ascending().collect::<Vec<_>>(), vec![10, 20, 30, 50]);
        assert_eq!(tree.descending().collect::<Vec<_>>(), vec![50, 30, 20, 10]);
    }

    #[test]
    fn random_operations_match_btreeset() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut tree = PriceTree::new();
        let mut model = BTreeSet::new();
        for step in 0..5000 {
            let price = rng.gen_range(1..=300u64);
            if rng.gen_bool(0.55) {
                assert_eq!(tree.insert(price), model.insert(price), "step {}", step);
            } else {
                assert_eq!(tree.remove(price), model.remove(&price), "step {}", step);
            }
            if step % 50 == 0 {
                tree.check_invariants().unwrap();
            }
            assert_eq!(tree.first(), model.first().copied());
            assert_eq!(tree.last(), model.last().copied());
            assert_eq!(tree.len(), model.len());
        }
        tree.check_invariants().unwrap();
        assert_eq!(
            tree.ascending().collect::<Vec<_>>(),
            model.iter().copied().collect::<Vec<_>>()
        );
        for price in [0u64, 1, 150, 299, 300] {
            assert_eq!(
                tree.next_above(price),
                model.range(price + 1..).next().copied()
            );
            assert_eq!(tree.next_below(price), model.range(..price).next_back().copied());
        }
    }

    #[test]
    fn drain_to_empty_and_refill() {
        let mut tree = PriceTree::new();
        for p in (1..=64u64).rev() {
            tree.insert(p * 5);
        }
        for p in 1..=64u64 {
            assert!(tree.remove(p * 5));
            tree.check_invariants().unwrap();
        }
        assert!(tree.is_empty());
        for p in 1..=64u64 {
            tree.insert(p * 5);
        }
        tree.check_invariants().unwrap();
        assert_eq!(tree.allocated(), 64);
        assert_eq!(tree.first(), Some(5));
    }

    #[test]
    fn restore_and_truncate_undo_later_allocations() {
        let mut tree = PriceTree::new();
        for p in [10, 20, 30] {
            tree.insert(p);
        }
        tree.edit(20, 2, 1);
        let before = tree.retained_head(20).unwrap();

        tree.edit(20, 1, 0);
        tree.remove(20);
        tree.insert(40);
        tree.insert(5);
        tree.remove(5);

        tree.restore(20, before, true);
        tree.truncate(3);
        tree.check_invariants().unwrap();
        assert_eq!(tree.ascending().collect::<Vec<_>>(), vec![10, 20, 30]);
        assert_eq!(tree.get_node(20).unwrap().head, before);
        assert_eq!(tree.exists(40), NodeState::Unallocated);
        assert_eq!(tree.exists(5), NodeState::Unallocated);
        assert_eq!(tree.allocated(), 3);

        // freed slots are reused cleanly
        tree.insert(40);
        tree.check_invariants().unwrap();
        assert_eq!(tree.last(), Some(40));
    }
}
