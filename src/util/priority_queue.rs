use std::fmt;

/// Bounded binary min-heap ordered by a caller-supplied `less_than`.
///
/// The top is always the least element. Once full, [`PriorityQueue::insert`]
/// only admits elements greater than the current top, which makes the queue
/// a top-K selector in O(log K) per candidate.
pub struct PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    heap: Vec<T>,
    capacity: usize,
    less_than: F,
}

impl<T: fmt::Debug, F: Fn(&T, &T) -> bool> fmt::Debug for PriorityQueue<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.heap.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<T, F> PriorityQueue<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    pub fn new(capacity: usize, less_than: F) -> Self {
        Self {
            heap: Vec::with_capacity(capacity.min(4096)),
            capacity,
            less_than,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Least element
    pub fn top(&self) -> Option<&T> {
        self.heap.first()
    }

    /// Mutable access to the least element. Call [`PriorityQueue::adjust_top`]
    /// after changing its ordering key.
    pub fn top_mut(&mut self) -> Option<&mut T> {
        self.heap.first_mut()
    }

    /// Restore heap order after the top element changed
    pub fn adjust_top(&mut self) {
        self.down_heap(0);
    }

    /// Add an element, returning whichever element falls out.
    ///
    /// Below capacity nothing falls out. At capacity the element replaces the
    /// top only if the top is less than it; otherwise the element itself is
    /// returned.
    pub fn insert(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        if self.heap.len() < self.capacity {
            self.heap.push(item);
            let last = self.heap.len() - 1;
            self.up_heap(last);
            return None;
        }
        if (self.less_than)(&self.heap[0], &item) {
            let evicted = std::mem::replace(&mut self.heap[0], item);
            self.down_heap(0);
            Some(evicted)
        } else {
            Some(item)
        }
    }

    /// Remove and return the least element
    pub fn pop(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let item = self.heap.pop();
        if !self.heap.is_empty() {
            self.down_heap(0);
        }
        item
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Drain into a vector ordered greatest first
    pub fn into_sorted_vec(mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(item) = self.pop() {
            out.push(item);
        }
        out.reverse();
        out
    }

    fn up_heap(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if (self.less_than)(&self.heap[i], &self.heap[parent]) {
                self.heap.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn down_heap(&mut self, mut i: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len && (self.less_than)(&self.heap[right], &self.heap[left]) {
                smallest = right;
            }
            if (self.less_than)(&self.heap[smallest], &self.heap[i]) {
                self.heap.swap(i, smallest);
                i = smallest;
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Worse hit is "less": lower score, or equal score and higher doc id
    fn hit_less(a: &(f32, u32), b: &(f32, u32)) -> bool {
        if a.0 != b.0 {
            a.0 < b.0
        } else {
            a.1 > b.1
        }
    }

    fn lcg(seed: &mut u64) -> u64 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        *seed >> 33
    }

    #[test]
    fn test_pop_order() {
        let mut pq = PriorityQueue::new(10, |a: &i32, b: &i32| a < b);
        for v in [5, 1, 9, 3, 7] {
            assert!(pq.insert(v).is_none());
        }
        assert_eq!(pq.top(), Some(&1));
        let mut popped = Vec::new();
        while let Some(v) = pq.pop() {
            popped.push(v);
        }
        assert_eq!(popped, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_overflow_returns_rejected() {
        let mut pq = PriorityQueue::new(2, |a: &i32, b: &i32| a < b);
        assert_eq!(pq.insert(4), None);
        assert_eq!(pq.insert(6), None);
        assert_eq!(pq.insert(1), Some(1));
        assert_eq!(pq.insert(8), Some(4));
        assert_eq!(pq.into_sorted_vec(), vec![8, 6]);
    }

    #[test]
    fn test_adjust_top() {
        let mut pq = PriorityQueue::new(4, |a: &i32, b: &i32| a < b);
        for v in [2, 4, 6] {
            pq.insert(v);
        }
        if let Some(top) = pq.top_mut() {
            *top = 10;
        }
        pq.adjust_top();
        assert_eq!(pq.top(), Some(&4));
    }

    #[test]
    fn test_top_k_matches_full_sort() {
        let mut seed = 42u64;
        for k in [1usize, 3, 10, 50] {
            let stream: Vec<(f32, u32)> = (0..500u32)
                .map(|doc| ((lcg(&mut seed) % 20) as f32, doc))
                .collect();

            let mut pq = PriorityQueue::new(k, hit_less);
            for hit in &stream {
                pq.insert(*hit);
            }
            let top = pq.into_sorted_vec();

            let mut expected = stream.clone();
            expected.sort_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap()
                    .then_with(|| a.1.cmp(&b.1))
            });
            expected.truncate(k);
            assert_eq!(top, expected, "k = {}", k);
        }
    }

    #[test]
    fn test_zero_capacity() {
        let mut pq = PriorityQueue::new(0, |a: &i32, b: &i32| a < b);
        assert_eq!(pq.insert(1), Some(1));
        assert!(pq.is_empty());
    }
}
