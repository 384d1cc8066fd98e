//! Free-list allocator over one contiguous byte range.
//!
//! Nodes live in a vector and link to each other by index. The chain is
//! always sorted by offset and covers the whole range without gaps, so the
//! node capacities sum to the arena capacity at all times.
//!
//! A node with `size == 0` is free. Freeing coalesces with both neighbours,
//! so two free nodes are never adjacent.

/// Snapshot of one node in an [`Arena`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct NodeInfo {
    pub offset: u64,
    /// Requested size. Zero for free nodes.
    pub size: u64,
    /// Reserved bytes; a multiple of the arena alignment for claimed nodes.
    pub capacity: u64,
    /// Changes on every claim so stale handles can be told apart.
    pub generation: u32,
}

impl NodeInfo {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.capacity
    }
}

#[derive(Debug, Clone)]
struct Node {
    offset: u64,
    size: u64,
    capacity: u64,
    generation: u32,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Node {
    fn info(&self) -> NodeInfo {
        NodeInfo {
            offset: self.offset,
            size: self.size,
            capacity: self.capacity,
            generation: self.generation,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Arena {
    nodes: Vec<Node>,
    /// Slots in `nodes` that were unlinked by a merge and can be reused.
    vacant: Vec<usize>,
    /// Node at offset 0. Merges only ever remove the later node, so this never moves.
    head: usize,
    capacity: u64,
    alignment: u64,
    used: u64,
    claimed: usize,
    generation: u32,
}

impl Arena {
    /// Creates an arena with a single free node spanning `capacity` bytes.
    ///
    /// # Panics
    /// Panics if `alignment` is not a power of two or `capacity` is zero.
    pub fn new(capacity: u64, alignment: u64) -> Self {
        assert!(alignment.is_power_of_two(), "arena alignment must be a power of two, got {alignment}");
        assert!(capacity > 0, "arena capacity must be non-zero");

        Self {
            nodes: vec![Node {
                offset: 0,
                size: 0,
                capacity,
                generation: 0,
                prev: None,
                next: None,
            }],
            vacant: Vec::new(),
            head: 0,
            capacity,
            alignment,
            used: 0,
            claimed: 0,
            generation: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Sum of requested sizes of all claimed nodes.
    #[inline]
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Number of claimed nodes.
    #[inline]
    pub fn claimed(&self) -> usize {
        self.claimed
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.claimed == 0
    }

    /// Total capacity of free nodes.
    pub fn free_capacity(&self) -> u64 {
        self.nodes().filter(NodeInfo::is_free).map(|n| n.capacity).sum()
    }

    /// Rounds `size` up to the arena alignment.
    #[inline]
    pub fn aligned_size(&self, size: u64) -> Option<u64> {
        size.checked_next_multiple_of(self.alignment)
    }

    /// Claims `size` bytes from the first free node large enough.
    ///
    /// Returns `None` for zero-sized requests and when no free node fits; the
    /// arena never over-allocates.
    pub fn claim(&mut self, size: u64) -> Option<NodeInfo> {
        if size == 0 {
            return None;
        }
        let aligned = self.aligned_size(size)?;

        let mut cursor = Some(self.head);
        while let Some(i) = cursor {
            let node = &self.nodes[i];
            if node.size == 0 && node.capacity >= aligned {
                return Some(self.split(i, size, aligned));
            }
            cursor = node.next;
        }
        None
    }

    /// Returns the claimed node starting at `offset`, if any.
    pub fn get(&self, offset: u64) -> Option<NodeInfo> {
        self.find_claimed(offset).map(|i| self.nodes[i].info())
    }

    /// Releases the claimed node at `offset` and coalesces it with free neighbours.
    ///
    /// Returns the node as it was before release, or `None` if no claimed node
    /// starts at `offset`.
    pub fn free(&mut self, offset: u64) -> Option<NodeInfo> {
        let i = self.find_claimed(offset)?;
        let released = self.nodes[i].info();

        self.used -= released.size;
        self.claimed -= 1;
        self.nodes[i].size = 0;

        if let Some(next) = self.nodes[i].next {
            if self.nodes[next].size == 0 {
                self.absorb_next(i);
            }
        }
        if let Some(prev) = self.nodes[i].prev {
            if self.nodes[prev].size == 0 {
                self.absorb_next(prev);
            }
        }

        Some(released)
    }

    /// Iterates nodes in offset order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeInfo> + '_ {
        let mut cursor = Some(self.head);
        core::iter::from_fn(move || {
            let i = cursor?;
            cursor = self.nodes[i].next;
            Some(self.nodes[i].info())
        })
    }

    fn find_claimed(&self, offset: u64) -> Option<usize> {
        let mut cursor = Some(self.head);
        while let Some(i) = cursor {
            let node = &self.nodes[i];
            if node.offset == offset {
                return (node.size > 0).then_some(i);
            }
            if node.offset > offset {
                return None;
            }
            cursor = node.next;
        }
        None
    }

    fn split(&mut self, i: usize, size: u64, aligned: u64) -> NodeInfo {
        let remainder = self.nodes[i].capacity - aligned;
        if remainder > 0 {
            let next = self.nodes[i].next;
            let tail = self.insert(Node {
                offset: self.nodes[i].offset + aligned,
                size: 0,
                capacity: remainder,
                generation: 0,
                prev: Some(i),
                next,
            });
            if let Some(n) = next {
                self.nodes[n].prev = Some(tail);
            }
            self.nodes[i].next = Some(tail);
            self.nodes[i].capacity = aligned;
        }

        self.generation = self.generation.wrapping_add(1);
        self.used += size;
        self.claimed += 1;

        let node = &mut self.nodes[i];
        node.size = size;
        node.generation = self.generation;
        node.info()
    }

    /// Merges the node after `i` into `i`.
    fn absorb_next(&mut self, i: usize) {
        let Some(next) = self.nodes[i].next else { return };
        let (capacity, after) = (self.nodes[next].capacity, self.nodes[next].next);

        self.nodes[i].capacity += capacity;
        self.nodes[i].next = after;
        if let Some(a) = after {
            self.nodes[a].prev = Some(i);
        }

        self.nodes[next].prev = None;
        self.nodes[next].next = None;
        self.vacant.push(next);
    }

    fn insert(&mut self, node: Node) -> usize {
        match self.vacant.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }
}
