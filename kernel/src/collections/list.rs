//! Liste doublement chaînée à sentinelle, propriété vérifiée
//!
//! Nodes live in a [`NodeArena`]: a fixed slot table, either borrowed from
//! the caller or carved from a [`MemoryArena`]. Links are slot indices, and
//! every handle carries the generation of its slot, so a handle kept after
//! `delete_node` resolves to `NotFound` instead of to whatever reused the
//! slot.
//!
//! A list is a sentinel node plus a count. The sentinel closes the ring:
//!
//! ```text
//!   empty    : S.next == S, S.prev == S
//!   non-empty: S.next == first, S.prev == last, last.next == S
//! ```
//!
//! Each real node records the list that owns it. `remove` and `move_node`
//! refuse a node through a list that does not own it.

use core::mem;

use ek_types::{EkError, ErrorCode, Result};

use crate::memory::{ArenaBox, MemoryArena};

const NIL: u16 = u16::MAX;

/// Handle to one node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u16,
    generation: u16,
}

/// Handle to a list (the id of its sentinel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListId(NodeId);

/// Where `move_node` reinserts into the destination list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Head,
    Tail,
    /// Ascending key order, after existing equal keys
    Ordered,
}

enum Body<T> {
    Sentinel { count: u16 },
    Item(T),
}

struct Node<T> {
    body: Body<T>,
    key: u16,
    prev: u16,
    next: u16,
    owner: Option<ListId>,
}

enum Entry<T> {
    Vacant { next_free: u16 },
    Occupied(Node<T>),
}

/// One entry of a node table. Callers supplying static storage fill an
/// array with [`Slot::vacant`].
pub struct Slot<T> {
    generation: u16,
    entry: Entry<T>,
}

impl<T> Slot<T> {
    pub const fn vacant() -> Self {
        Slot {
            generation: 0,
            entry: Entry::Vacant { next_free: NIL },
        }
    }
}

enum SlotStorage<'a, T> {
    Static(&'a mut [Slot<T>]),
    Dynamic(ArenaBox<'a, [Slot<T>]>),
}

impl<T> SlotStorage<'_, T> {
    fn slots(&self) -> &[Slot<T>] {
        match self {
            SlotStorage::Static(s) => &s[..],
            SlotStorage::Dynamic(b) => &b[..],
        }
    }

    fn slots_mut(&mut self) -> &mut [Slot<T>] {
        match self {
            SlotStorage::Static(s) => &mut s[..],
            SlotStorage::Dynamic(b) => &mut b[..],
        }
    }
}

/// Node table shared by any number of lists.
pub struct NodeArena<'a, T> {
    storage: SlotStorage<'a, T>,
    free_head: u16,
    live: usize,
}

fn broken_link() -> EkError {
    EkError::with_message(ErrorCode::Unknown, "broken list link")
}

impl<'a, T> NodeArena<'a, T> {
    /// Node table over caller-owned slots. Previous slot contents are dropped.
    pub fn create_static(slots: &'a mut [Slot<T>]) -> Result<Self> {
        Self::with_storage(SlotStorage::Static(slots))
    }

    /// Node table of `capacity` slots allocated from `arena`.
    pub fn create_dynamic(arena: &'a MemoryArena<'a>, capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity >= NIL as usize {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        let slots = ArenaBox::from_fn_in(capacity, arena, |_| Slot::vacant())?;
        Self::with_storage(SlotStorage::Dynamic(slots))
    }

    fn with_storage(mut storage: SlotStorage<'a, T>) -> Result<Self> {
        let slots = storage.slots_mut();
        let len = slots.len();
        if len == 0 || len >= NIL as usize {
            return Err(EkError::new(ErrorCode::InvalidParameter));
        }
        for (i, slot) in slots.iter_mut().enumerate() {
            let next_free = if i + 1 < len { (i + 1) as u16 } else { NIL };
            slot.entry = Entry::Vacant { next_free };
        }
        Ok(NodeArena {
            storage,
            free_head: 0,
            live: 0,
        })
    }

    /// Total slots, sentinels included.
    pub fn capacity(&self) -> usize {
        self.storage.slots().len()
    }

    /// Slots still free.
    pub fn available(&self) -> usize {
        self.capacity() - self.live
    }

    /// Unlinked node holding `content`, ordered by `key`.
    pub fn create_node(&mut self, content: T, key: u16) -> Result<NodeId> {
        self.alloc_slot(Node {
            body: Body::Item(content),
            key,
            prev: NIL,
            next: NIL,
            owner: None,
        })
    }

    /// Empty list: a lone sentinel pointing at itself.
    pub fn create_list(&mut self) -> Result<ListId> {
        let id = self.alloc_slot(Node {
            body: Body::Sentinel { count: 0 },
            key: 0,
            prev: NIL,
            next: NIL,
            owner: None,
        })?;
        let sentinel = self.node_at_mut(id.index)?;
        sentinel.prev = id.index;
        sentinel.next = id.index;
        Ok(ListId(id))
    }

    /// List starting with `initial` as its only member.
    pub fn create_list_with(&mut self, initial: NodeId) -> Result<ListId> {
        self.check_unlinked(initial)?;
        let list = self.create_list()?;
        self.insert_tail(list, initial)?;
        Ok(list)
    }

    pub fn insert_head(&mut self, list: ListId, node: NodeId) -> Result<()> {
        self.check_insertable(list, node)?;
        let s = list.0.index;
        let first = self.node_at(s)?.next;
        self.splice(list, node.index, s, first)
    }

    pub fn insert_tail(&mut self, list: ListId, node: NodeId) -> Result<()> {
        self.check_insertable(list, node)?;
        let s = list.0.index;
        let last = self.node_at(s)?.prev;
        self.splice(list, node.index, last, s)
    }

    /// Insert by ascending key; equal keys keep insertion order.
    pub fn insert_ordered(&mut self, list: ListId, node: NodeId) -> Result<()> {
        self.check_insertable(list, node)?;
        let key = self.resolve(node)?.key;
        let s = list.0.index;
        let (count, first, last) = {
            let sentinel = self.node_at(s)?;
            (self.count_of(sentinel)?, sentinel.next, sentinel.prev)
        };

        if count == 0 || key >= self.node_at(last)?.key {
            return self.splice(list, node.index, last, s);
        }
        if key < self.node_at(first)?.key {
            return self.splice(list, node.index, s, first);
        }

        let mut cur = first;
        for _ in 0..count {
            let n = self.node_at(cur)?;
            if n.key > key {
                let prev = n.prev;
                return self.splice(list, node.index, prev, cur);
            }
            cur = n.next;
        }
        Err(broken_link())
    }

    /// Unlink `node` from `list` and clear its links and owner.
    pub fn remove(&mut self, list: ListId, node: NodeId) -> Result<()> {
        let count = {
            let sentinel = self.sentinel(list)?;
            self.count_of(sentinel)?
        };
        if node == list.0 {
            return Err(EkError::with_message(ErrorCode::InvalidParameter, "sentinel"));
        }
        if count == 0 {
            return Err(EkError::new(ErrorCode::Empty));
        }

        let n = self.resolve(node)?;
        if n.owner != Some(list) {
            return Err(EkError::new(ErrorCode::NotOwner));
        }
        let (prev, next) = (n.prev, n.next);

        self.node_at_mut(prev)?.next = next;
        self.node_at_mut(next)?.prev = prev;
        let n = self.node_at_mut(node.index)?;
        n.prev = NIL;
        n.next = NIL;
        n.owner = None;
        *self.count_mut(list)? -= 1;
        Ok(())
    }

    /// Move `node` from `src` to `dst`. Moving within one list is a no-op.
    pub fn move_node(
        &mut self,
        src: ListId,
        dst: ListId,
        node: NodeId,
        placement: Placement,
    ) -> Result<()> {
        if src == dst {
            return Ok(());
        }
        self.sentinel(dst)?;
        self.remove(src, node)?;
        match placement {
            Placement::Head => self.insert_head(dst, node),
            Placement::Tail => self.insert_tail(dst, node),
            Placement::Ordered => self.insert_ordered(dst, node),
        }
    }

    /// Stable merge sort by key, relinking nodes in place.
    pub fn sort(&mut self, list: ListId, descending: bool) -> Result<()> {
        let count = self.len(list)?;
        if count < 2 {
            return Ok(());
        }

        let s = list.0.index;
        let mut chain = self.node_at(s)?.next;
        let last = self.node_at(s)?.prev;
        self.node_at_mut(last)?.next = NIL;

        // Bottom-up merge over the NIL-terminated `next` chain.
        let mut width = 1usize;
        loop {
            let mut p = chain;
            let mut tail = NIL;
            let mut merges = 0usize;
            chain = NIL;

            while p != NIL {
                merges += 1;
                let mut q = p;
                let mut psize = 0usize;
                while psize < width && q != NIL {
                    psize += 1;
                    q = self.node_at(q)?.next;
                }
                let mut qsize = width;

                while psize > 0 || (qsize > 0 && q != NIL) {
                    let take_p = if psize == 0 {
                        false
                    } else if qsize == 0 || q == NIL {
                        true
                    } else {
                        let (kp, kq) = (self.node_at(p)?.key, self.node_at(q)?.key);
                        if descending {
                            kp >= kq
                        } else {
                            kp <= kq
                        }
                    };

                    let e = if take_p {
                        let e = p;
                        p = self.node_at(p)?.next;
                        psize -= 1;
                        e
                    } else {
                        let e = q;
                        q = self.node_at(q)?.next;
                        qsize -= 1;
                        e
                    };

                    if tail == NIL {
                        chain = e;
                    } else {
                        self.node_at_mut(tail)?.next = e;
                    }
                    tail = e;
                }
                p = q;
            }

            if tail != NIL {
                self.node_at_mut(tail)?.next = NIL;
            }
            if merges <= 1 {
                break;
            }
            width *= 2;
        }

        let mut prev = s;
        let mut cur = chain;
        while cur != NIL {
            let n = self.node_at_mut(cur)?;
            n.prev = prev;
            prev = cur;
            cur = n.next;
        }
        self.node_at_mut(prev)?.next = s;
        let sentinel = self.node_at_mut(s)?;
        sentinel.next = chain;
        sentinel.prev = prev;
        Ok(())
    }

    /// Free an unlinked node and hand back its content.
    pub fn delete_node(&mut self, node: NodeId) -> Result<T> {
        let n = self.resolve(node)?;
        if matches!(n.body, Body::Sentinel { .. }) {
            return Err(EkError::with_message(ErrorCode::InvalidParameter, "sentinel"));
        }
        if n.owner.is_some() {
            return Err(EkError::with_message(
                ErrorCode::InvalidParameter,
                "node still linked",
            ));
        }
        match self.release_slot(node.index)?.body {
            Body::Item(content) => Ok(content),
            Body::Sentinel { .. } => Err(broken_link()),
        }
    }

    /// Free every member of `list`, then its sentinel. Contents go to `dispose`
    /// in list order.
    pub fn delete_list<F>(&mut self, list: ListId, mut dispose: F) -> Result<()>
    where
        F: FnMut(T),
    {
        let count = self.len(list)?;
        let s = list.0.index;
        let mut cur = self.node_at(s)?.next;
        for _ in 0..count {
            let next = self.node_at(cur)?.next;
            if let Body::Item(content) = self.release_slot(cur)?.body {
                dispose(content);
            }
            cur = next;
        }
        if cur != s {
            return Err(broken_link());
        }
        self.release_slot(s)?;
        Ok(())
    }

    pub fn len(&self, list: ListId) -> Result<usize> {
        let sentinel = self.sentinel(list)?;
        Ok(self.count_of(sentinel)? as usize)
    }

    pub fn is_empty(&self, list: ListId) -> Result<bool> {
        Ok(self.len(list)? == 0)
    }

    pub fn head(&self, list: ListId) -> Result<Option<NodeId>> {
        let sentinel = self.sentinel(list)?;
        Ok(self.neighbour(list, sentinel.next))
    }

    pub fn tail(&self, list: ListId) -> Result<Option<NodeId>> {
        let sentinel = self.sentinel(list)?;
        Ok(self.neighbour(list, sentinel.prev))
    }

    /// Following node in the owning list, `None` at the end or when unlinked.
    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        let n = self.resolve(node).ok()?;
        self.neighbour(n.owner?, n.next)
    }

    pub fn prev(&self, node: NodeId) -> Option<NodeId> {
        let n = self.resolve(node).ok()?;
        self.neighbour(n.owner?, n.prev)
    }

    pub fn get(&self, node: NodeId) -> Option<&T> {
        match &self.resolve(node).ok()?.body {
            Body::Item(content) => Some(content),
            Body::Sentinel { .. } => None,
        }
    }

    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut T> {
        match &mut self.resolve_mut(node).ok()?.body {
            Body::Item(content) => Some(content),
            Body::Sentinel { .. } => None,
        }
    }

    pub fn key(&self, node: NodeId) -> Option<u16> {
        self.resolve(node).ok().map(|n| n.key)
    }

    pub fn owner(&self, node: NodeId) -> Option<ListId> {
        self.resolve(node).ok().and_then(|n| n.owner)
    }

    /// Members of `list` from head to tail. Empty for an unknown list.
    pub fn iter(&self, list: ListId) -> Iter<'_, T> {
        let (cur, remaining) = match self.sentinel(list) {
            Ok(sentinel) => (sentinel.next, self.count_of(sentinel).unwrap_or(0) as usize),
            Err(_) => (NIL, 0),
        };
        Iter {
            slots: self.storage.slots(),
            cur,
            remaining,
        }
    }

    /// Verify the sentinel ring, back links, owners and count of `list`.
    pub fn check_links(&self, list: ListId) -> bool {
        let Ok(sentinel) = self.sentinel(list) else {
            return false;
        };
        let Ok(count) = self.count_of(sentinel) else {
            return false;
        };
        let s = list.0.index;
        if count == 0 {
            return sentinel.next == s && sentinel.prev == s;
        }

        let mut prev = s;
        let mut cur = sentinel.next;
        for _ in 0..count {
            let Ok(n) = self.node_at(cur) else {
                return false;
            };
            if cur == s || n.prev != prev || n.owner != Some(list) {
                return false;
            }
            prev = cur;
            cur = n.next;
        }
        cur == s && sentinel.prev == prev
    }

    // ── internals ────────────────────────────────────────────────────────────

    fn alloc_slot(&mut self, node: Node<T>) -> Result<NodeId> {
        let index = self.free_head;
        if index == NIL {
            return Err(EkError::with_message(
                ErrorCode::AllocationFailure,
                "node table full",
            ));
        }
        let slot = self
            .storage
            .slots_mut()
            .get_mut(index as usize)
            .ok_or_else(broken_link)?;
        let Entry::Vacant { next_free } = slot.entry else {
            return Err(broken_link());
        };
        slot.entry = Entry::Occupied(node);
        let generation = slot.generation;

        self.free_head = next_free;
        self.live += 1;
        Ok(NodeId { index, generation })
    }

    fn release_slot(&mut self, index: u16) -> Result<Node<T>> {
        let free_head = self.free_head;
        let slot = self
            .storage
            .slots_mut()
            .get_mut(index as usize)
            .ok_or_else(broken_link)?;
        match mem::replace(&mut slot.entry, Entry::Vacant { next_free: free_head }) {
            Entry::Occupied(node) => {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_head = index;
                self.live -= 1;
                Ok(node)
            }
            vacant => {
                slot.entry = vacant;
                Err(broken_link())
            }
        }
    }

    fn resolve(&self, id: NodeId) -> Result<&Node<T>> {
        match self.storage.slots().get(id.index as usize) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(node),
            }) if *generation == id.generation => Ok(node),
            _ => Err(EkError::new(ErrorCode::NotFound)),
        }
    }

    fn resolve_mut(&mut self, id: NodeId) -> Result<&mut Node<T>> {
        match self.storage.slots_mut().get_mut(id.index as usize) {
            Some(Slot {
                generation,
                entry: Entry::Occupied(node),
            }) if *generation == id.generation => Ok(node),
            _ => Err(EkError::new(ErrorCode::NotFound)),
        }
    }

    fn node_at(&self, index: u16) -> Result<&Node<T>> {
        match self.storage.slots().get(index as usize) {
            Some(Slot {
                entry: Entry::Occupied(node),
                ..
            }) => Ok(node),
            _ => Err(broken_link()),
        }
    }

    fn node_at_mut(&mut self, index: u16) -> Result<&mut Node<T>> {
        match self.storage.slots_mut().get_mut(index as usize) {
            Some(Slot {
                entry: Entry::Occupied(node),
                ..
            }) => Ok(node),
            _ => Err(broken_link()),
        }
    }

    fn sentinel(&self, list: ListId) -> Result<&Node<T>> {
        let node = self.resolve(list.0)?;
        match node.body {
            Body::Sentinel { .. } => Ok(node),
            Body::Item(_) => Err(EkError::with_message(
                ErrorCode::InvalidParameter,
                "not a list",
            )),
        }
    }

    fn count_of(&self, sentinel: &Node<T>) -> Result<u16> {
        match sentinel.body {
            Body::Sentinel { count } => Ok(count),
            Body::Item(_) => Err(broken_link()),
        }
    }

    fn count_mut(&mut self, list: ListId) -> Result<&mut u16> {
        match &mut self.node_at_mut(list.0.index)?.body {
            Body::Sentinel { count } => Ok(count),
            Body::Item(_) => Err(broken_link()),
        }
    }

    fn id_of(&self, index: u16) -> Option<NodeId> {
        self.storage.slots().get(index as usize).map(|slot| NodeId {
            index,
            generation: slot.generation,
        })
    }

    /// Id of the node at `index`, or `None` when it is the sentinel of `list`.
    fn neighbour(&self, list: ListId, index: u16) -> Option<NodeId> {
        if index == list.0.index {
            None
        } else {
            self.id_of(index)
        }
    }

    fn check_unlinked(&self, node: NodeId) -> Result<()> {
        let n = self.resolve(node)?;
        if matches!(n.body, Body::Sentinel { .. }) || n.owner.is_some() {
            return Err(EkError::with_message(
                ErrorCode::InvalidParameter,
                "node already linked",
            ));
        }
        Ok(())
    }

    fn check_insertable(&self, list: ListId, node: NodeId) -> Result<()> {
        self.sentinel(list)?;
        self.check_unlinked(node)
    }

    fn splice(&mut self, list: ListId, index: u16, prev: u16, next: u16) -> Result<()> {
        let n = self.node_at_mut(index)?;
        n.prev = prev;
        n.next = next;
        n.owner = Some(list);
        self.node_at_mut(prev)?.next = index;
        self.node_at_mut(next)?.prev = index;
        *self.count_mut(list)? += 1;
        Ok(())
    }
}

/// Iterator over `(NodeId, &T)` of one list, bounded by its count.
pub struct Iter<'r, T> {
    slots: &'r [Slot<T>],
    cur: u16,
    remaining: usize,
}

impl<'r, T> Iterator for Iter<'r, T> {
    type Item = (NodeId, &'r T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.slots.get(self.cur as usize)?;
        let Entry::Occupied(node) = &slot.entry else {
            return None;
        };
        let Body::Item(content) = &node.body else {
            return None;
        };
        let id = NodeId {
            index: self.cur,
            generation: slot.generation,
        };
        self.remaining -= 1;
        self.cur = node.next;
        Some((id, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(nodes: &NodeArena<'_, &'static str>, list: ListId) -> Vec<u16> {
        nodes
            .iter(list)
            .map(|(id, _)| nodes.key(id).unwrap())
            .collect()
    }

    fn names(nodes: &NodeArena<'_, &'static str>, list: ListId) -> Vec<&'static str> {
        nodes.iter(list).map(|(_, name)| *name).collect()
    }

    fn table<'s>(slots: &'s mut [Slot<&'static str>]) -> NodeArena<'s, &'static str> {
        NodeArena::create_static(slots).unwrap()
    }

    #[test]
    fn test_empty_list_sentinel() {
        let mut slots: [Slot<&str>; 4] = core::array::from_fn(|_| Slot::vacant());
        let mut nodes = table(&mut slots);
        let list = nodes.create_list().unwrap();

        assert!(nodes.check_links(list));
        assert_eq!(nodes.len(list).unwrap(), 0);
        assert_eq!(nodes.head(list).unwrap(), None);
        assert_eq!(nodes.tail(list).unwrap(), None);

        let a = nodes.create_node("a", 1).unwrap();
        nodes.insert_tail(list, a).unwrap();
        nodes.remove(list, a).unwrap();
        assert!(nodes.check_links(list));
        assert!(nodes.is_empty(list).unwrap());
        assert_eq!(nodes.owner(a), None);
    }

    #[test]
    fn test_insert_ordered_and_sort() {
        let mut slots: [Slot<&str>; 8] = core::array::from_fn(|_| Slot::vacant());
        let mut nodes = table(&mut slots);
        let list = nodes.create_list().unwrap();

        for key in [50, 100, 75, 200] {
            let n = nodes.create_node("n", key).unwrap();
            nodes.insert_ordered(list, n).unwrap();
        }
        assert_eq!(keys(&nodes, list), [50, 75, 100, 200]);

        nodes.sort(list, true).unwrap();
        assert_eq!(keys(&nodes, list), [200, 100, 75, 50]);
        assert!(nodes.check_links(list));

        nodes.sort(list, false).unwrap();
        assert_eq!(keys(&nodes, list), [50, 75, 100, 200]);
        assert!(nodes.check_links(list));
    }

    #[test]
    fn test_equal_keys_fifo() {
        let mut slots: [Slot<&str>; 8] = core::array::from_fn(|_| Slot::vacant());
        let mut nodes = table(&mut slots);
        let list = nodes.create_list().unwrap();

        for (name, key) in [("a", 10), ("b", 10), ("c", 5), ("d", 10), ("e", 7)] {
            let n = nodes.create_node(name, key).unwrap();
            nodes.insert_ordered(list, n).unwrap();
        }
        assert_eq!(names(&nodes, list), ["c", "e", "a", "b", "d"]);

        nodes.sort(list, true).unwrap();
        assert_eq!(names(&nodes, list), ["a", "b", "d", "e", "c"]);
    }

    #[test]
    fn test_head_tail_and_neighbours() {
        let mut slots: [Slot<&str>; 8] = core::array::from_fn(|_| Slot::vacant());
        let mut nodes = table(&mut slots);
        let first = nodes.create_node("first", 0).unwrap();
        let list = nodes.create_list_with(first).unwrap();

        let h = nodes.create_node("head", 0).unwrap();
        let t = nodes.create_node("tail", 0).unwrap();
        nodes.insert_head(list, h).unwrap();
        nodes.insert_tail(list, t).unwrap();

        assert_eq!(names(&nodes, list), ["head", "first", "tail"]);
        assert_eq!(nodes.head(list).unwrap(), Some(h));
        assert_eq!(nodes.tail(list).unwrap(), Some(t));
        assert_eq!(nodes.next(h), Some(first));
        assert_eq!(nodes.prev(first), Some(h));
        assert_eq!(nodes.next(t), None);
        assert_eq!(nodes.prev(h), None);
    }

    #[test]
    fn test_ownership_checks() {
        let mut slots: [Slot<&str>; 8] = core::array::from_fn(|_| Slot::vacant());
        let mut nodes = table(&mut slots);
        let a_list = nodes.create_list().unwrap();
        let b_list = nodes.create_list().unwrap();
        let x = nodes.create_node("x", 1).unwrap();
        let y = nodes.create_node("y", 1).unwrap();

        // Empty list is reported before ownership.
        assert_eq!(nodes.remove(b_list, x).unwrap_err(), ErrorCode::Empty);

        nodes.insert_tail(a_list, x).unwrap();
        nodes.insert_tail(b_list, y).unwrap();
        assert_eq!(nodes.remove(b_list, x).unwrap_err(), ErrorCode::NotOwner);
        assert_eq!(nodes.insert_tail(b_list, x).unwrap_err(), ErrorCode::InvalidParameter);
        assert_eq!(
            nodes.remove(a_list, a_list.0).unwrap_err(),
            ErrorCode::InvalidParameter
        );
        assert!(nodes.check_links(a_list));
        assert!(nodes.check_links(b_list));
    }

    #[test]
    fn test_stale_handle_not_found() {
        let mut slots: [Slot<&str>; 4] = core::array::from_fn(|_| Slot::vacant());
        let mut nodes = table(&mut slots);
        let list = nodes.create_list().unwrap();
        let old = nodes.create_node("old", 1).unwrap();
        assert_eq!(nodes.delete_node(old).unwrap(), "old");

        // Slot reused under a new generation.
        let new = nodes.create_node("new", 1).unwrap();
        assert_eq!(new.index, old.index);
        assert_ne!(new, old);

        nodes.insert_tail(list, new).unwrap();
        assert_eq!(nodes.remove(list, old).unwrap_err(), ErrorCode::NotFound);
        assert!(nodes.get(old).is_none());
        assert_eq!(nodes.get(new), Some(&"new"));
    }

    #[test]
    fn test_move_between_lists() {
        let mut slots: [Slot<&str>; 8] = core::array::from_fn(|_| Slot::vacant());
        let mut nodes = table(&mut slots);
        let src = nodes.create_list().unwrap();
        let dst = nodes.create_list().unwrap();

        let mut ids = Vec::new();
        for (name, key) in [("a", 3), ("b", 1), ("c", 2)] {
            let n = nodes.create_node(name, key).unwrap();
            nodes.insert_tail(src, n).unwrap();
            ids.push(n);
        }

        nodes.move_node(src, dst, ids[0], Placement::Ordered).unwrap();
        nodes.move_node(src, dst, ids[1], Placement::Ordered).unwrap();
        nodes.move_node(src, dst, ids[2], Placement::Head).unwrap();
        assert_eq!(names(&nodes, dst), ["c", "b", "a"]);
        assert!(nodes.is_empty(src).unwrap());

        // Same list: no-op, even with a foreign node.
        nodes.move_node(dst, dst, ids[0], Placement::Tail).unwrap();
        assert_eq!(names(&nodes, dst), ["c", "b", "a"]);

        assert_eq!(
            nodes.move_node(src, dst, ids[0], Placement::Tail).unwrap_err(),
            ErrorCode::Empty
        );
        assert_eq!(nodes.owner(ids[0]), Some(dst));
    }

    #[test]
    fn test_delete_node_requires_unlink() {
        let mut slots: [Slot<&str>; 4] = core::array::from_fn(|_| Slot::vacant());
        let mut nodes = table(&mut slots);
        let list = nodes.create_list().unwrap();
        let n = nodes.create_node("n", 0).unwrap();
        nodes.insert_head(list, n).unwrap();

        assert_eq!(nodes.delete_node(n).unwrap_err(), ErrorCode::InvalidParameter);
        nodes.remove(list, n).unwrap();
        assert_eq!(nodes.delete_node(n).unwrap(), "n");
        assert_eq!(nodes.available(), 3);
    }

    #[test]
    fn test_delete_list_releases_all() {
        let mut slots: [Slot<&str>; 4] = core::array::from_fn(|_| Slot::vacant());
        let mut nodes = table(&mut slots);
        let list = nodes.create_list().unwrap();
        for name in ["a", "b", "c"] {
            let n = nodes.create_node(name, 0).unwrap();
            nodes.insert_tail(list, n).unwrap();
        }
        assert_eq!(nodes.create_node("full", 0).unwrap_err(), ErrorCode::AllocationFailure);

        let mut seen = Vec::new();
        nodes.delete_list(list, |name| seen.push(name)).unwrap();
        assert_eq!(seen, ["a", "b", "c"]);
        assert_eq!(nodes.available(), 4);
        assert_eq!(nodes.len(list).unwrap_err(), ErrorCode::NotFound);
    }

    #[test]
    fn test_dynamic_table_in_arena() {
        use crate::memory::MemoryArena;

        #[repr(C, align(8))]
        struct Pool([u8; 1024]);
        let mut pool = Pool([0; 1024]);
        let mut arena = MemoryArena::new(&mut pool.0);
        assert!(arena.init());
        {
            let mut nodes: NodeArena<'_, u32> = NodeArena::create_dynamic(&arena, 6).unwrap();
            let list = nodes.create_list().unwrap();
            let n = nodes.create_node(7, 7).unwrap();
            nodes.insert_ordered(list, n).unwrap();
            *nodes.get_mut(n).unwrap() += 1;
            assert_eq!(nodes.get(n), Some(&8));
            assert!(arena.get_free_size() < 1024);
        }
        assert_eq!(arena.get_free_size(), 1024);
        assert!(NodeArena::<u32>::create_dynamic(&arena, 0).is_err());
    }
}
