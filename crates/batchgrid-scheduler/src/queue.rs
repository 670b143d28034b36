//! Binary-heap priority queue ordered by an injected comparator.
//!
//! The same type backs the queue of preemptor jobs, each job's queue of
//! pending tasks, and the per-node queue of victims (with the task order
//! reversed). `less(a, b)` means "`a` comes out before `b`" and must be a
//! strict weak ordering: irreflexive and transitive. A comparator that
//! answers `true` for `less(a, a)` does not corrupt memory, but pop order
//! is then unspecified.

use std::fmt;

type LessFn<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

pub struct PriorityQueue<T> {
    items: Vec<T>,
    less: LessFn<T>,
}

impl<T> PriorityQueue<T> {
    pub fn new(less: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            items: Vec::new(),
            less: Box::new(less),
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// Remove and return the element that comes first, `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let top = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        top
    }

    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !(self.less)(&self.items[idx], &self.items[parent]) {
                break;
            }
            self.items.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut first = idx;
            if left < len && (self.less)(&self.items[left], &self.items[first]) {
                first = left;
            }
            if right < len && (self.less)(&self.items[right], &self.items[first]) {
                first = right;
            }
            if first == idx {
                break;
            }
            self.items.swap(idx, first);
            idx = first;
        }
    }
}

impl<T> Extend<T> for PriorityQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.items.len())
            .finish()
    }
}
