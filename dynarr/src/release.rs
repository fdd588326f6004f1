//! Bounded-step shrinking.
//!
//! Shrinking an array is driven through a [`ReleaseIter`], a small cursor holding the path from
//! the root to the node currently being worked on. Every call advances the cursor by one bounded
//! step: descend into one child, surface or clear words of one data node, or free one node and
//! climb back up. Callers choose how many steps to run before yielding.
//!
//! The walk goes from the highest positions down. A node is freed only once every position it
//! covers lies at or above the target; a data node straddling the target is kept and its words
//! from the target upwards are zeroed, so that growing the array again reads zeros there. The
//! head is updated as nodes go, which leaves it consistent if a shrink is abandoned halfway.

use crate::{array::DynArr, fault::consistency_fault, pool::Serializer};
use dynarr_core::{span, NodeRef, FANOUT, MAX_LEVELS};

/// The outcome of one shrink step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The shrink is complete. Further steps return `Done` again.
    Done,
    /// A word was written to the output.
    Data,
    /// Progress was made without output.
    NoData,
}

impl Step {
    /// The numeric code of the step: 0, 1 and 2 respectively.
    pub fn code(self) -> u32 {
        match self {
            Step::Done => 0,
            Step::Data => 1,
            Step::NoData => 2,
        }
    }

    pub fn is_done(self) -> bool {
        self == Step::Done
    }
}

/// The cursor of a shrink in progress.
///
/// Obtained from [`DynArr::release_iter`] and valid for one shrink of the array it was created
/// for. The array must not be written to until the shrink is done.
#[derive(Debug, Clone)]
pub struct ReleaseIter {
    // Size of the array when the shrink began.
    size: u32,
    // Number of frames on the path. 0 once done.
    depth: u8,
    path: [NodeRef; MAX_LEVELS],
    // The top frame counts the children (or words) not yet visited. Frames below the top hold
    // the index of the child being visited.
    cursor: [u16; MAX_LEVELS],
}

impl ReleaseIter {
    /// The size of the array when the shrink began.
    pub fn start_size(&self) -> u32 {
        self.size
    }

    pub fn is_done(&self) -> bool {
        self.depth == 0
    }
}

impl<'a, S: Serializer> DynArr<'a, S> {
    /// Begin a shrink of this array.
    pub fn release_iter(&self) -> ReleaseIter {
        let mut iter = ReleaseIter {
            size: self.head.size,
            depth: 0,
            path: [NodeRef::NIL; MAX_LEVELS],
            cursor: [0; MAX_LEVELS],
        };
        if !self.head.root.is_nil() {
            iter.depth = 1;
            iter.path[0] = self.head.root;
            iter.cursor[0] = self.frame_width(&iter, 0);
        }
        iter
    }

    /// One step of emptying the array, surfacing each word of every data node through `out`.
    ///
    /// Words are surfaced from the highest position down, one per [`Step::Data`]. Once done, the
    /// head is empty and every node is back in the pool.
    pub fn release(&mut self, iter: &mut ReleaseIter, out: &mut u32) -> Step {
        self.truncate(0, iter, Some(out))
    }

    /// One step of shrinking the array to `pos`, discarding the words at and above it.
    pub fn trim(&mut self, pos: u32, iter: &mut ReleaseIter) -> Step {
        self.truncate(pos, iter, None)
    }

    /// One step of shrinking the array to `pos`.
    ///
    /// With `out`, each word at or above `pos` in a data node is surfaced through it, one per
    /// [`Step::Data`]. Without, such words are cleared in bulk and the step reports
    /// [`Step::NoData`]. A `pos` at or beyond the size of the array completes at once, unless
    /// `pos` is 0 and nodes remain from an abandoned shrink.
    pub fn truncate(&mut self, pos: u32, iter: &mut ReleaseIter, out: Option<&mut u32>) -> Step {
        if iter.depth == 0 {
            return self.finish(pos, iter);
        }
        // The size reaches 0 before the last nodes are freed.
        if pos >= iter.size && pos > 0 {
            return self.finish(pos, iter);
        }

        let levels = self.head.levels;
        let top = iter.depth as usize - 1;
        let base = Self::base(levels, iter, top);
        let target = pos as u64;
        let node = self.resolve(iter.path[top], base as u32, top);

        if top + 1 == levels as usize {
            let remaining = iter.cursor[top] as usize;
            if remaining > 0 && base + remaining as u64 > target {
                match out {
                    Some(out) => {
                        let index = remaining - 1;
                        // SAFETY: the node is linked into this array, which we borrow mutably.
                        unsafe {
                            *out = node.read(index);
                            node.write(index, 0);
                        }
                        iter.cursor[top] = index as u16;
                        self.clamp_size(base + index as u64);
                        return Step::Data;
                    }
                    None => {
                        let keep = (target.saturating_sub(base) as usize).min(remaining);
                        // SAFETY: as above.
                        unsafe { node.zero(keep, remaining) };
                        iter.cursor[top] = keep as u16;
                        self.clamp_size(base.max(target));
                        return Step::NoData;
                    }
                }
            }
        } else {
            let child_span = span(levels, top + 1);
            while iter.cursor[top] > 0 {
                let index = iter.cursor[top] as usize - 1;
                if base + (index as u64 + 1) * child_span <= target {
                    break;
                }
                iter.cursor[top] = index as u16;
                // SAFETY: the node is linked into this array, which we borrow mutably.
                let child = unsafe { node.child(index) };
                if !child.is_nil() {
                    iter.path[top + 1] = child;
                    iter.depth += 1;
                    iter.cursor[top + 1] = self.frame_width(iter, top + 1);
                    return Step::NoData;
                }
            }
        }

        // Nothing left to do in the top frame: climb out of it.
        iter.depth -= 1;
        if base >= target {
            self.free(iter, top, base);
        }
        if iter.depth == 0 {
            return self.finish(pos, iter);
        }
        Step::NoData
    }

    fn finish(&mut self, pos: u32, iter: &mut ReleaseIter) -> Step {
        iter.depth = 0;
        if self.head.root.is_nil() {
            if self.head.node_count != 0 {
                consistency_fault(format_args!(
                    "array emptied with {} nodes unaccounted for (head {:?})",
                    self.head.node_count, self.head
                ));
            }
            self.head.levels = 0;
            self.head.size = 0;
        } else {
            self.clamp_size(pos as u64);
        }
        Step::Done
    }

    // Unlink the node of the frame at `top`, which was just popped, and give it back to the pool.
    fn free(&mut self, iter: &ReleaseIter, top: usize, base: u64) {
        let node_ref = iter.path[top];
        if top == 0 {
            self.head.root = NodeRef::NIL;
        } else {
            let parent = self.resolve(iter.path[top - 1], base as u32, top - 1);
            // SAFETY: the parent is linked into this array, which we borrow mutably.
            unsafe { parent.set_child(iter.cursor[top - 1] as usize, NodeRef::NIL) };
        }

        if self.head.node_count <= 0 {
            consistency_fault(format_args!(
                "freeing {:?} from an array which owns no nodes (head {:?})",
                node_ref, self.head
            ));
        }
        self.pool.release(node_ref);
        self.head.node_count -= 1;
        self.clamp_size(base);
    }

    fn clamp_size(&mut self, bound: u64) {
        if (self.head.size as u64) > bound {
            self.head.size = bound as u32;
        }
    }

    // The first position covered by the frame at `depth`.
    fn base(levels: u8, iter: &ReleaseIter, depth: usize) -> u64 {
        (0..depth)
            .map(|k| iter.cursor[k] as u64 * span(levels, k + 1))
            .sum()
    }

    // The number of children (or words) of the frame at `depth` which may be in use.
    fn frame_width(&self, iter: &ReleaseIter, depth: usize) -> u16 {
        let levels = self.head.levels;
        if depth + 1 < levels as usize {
            return FANOUT as u16;
        }
        let base = Self::base(levels, iter, depth);
        (iter.size as u64).saturating_sub(base).min(FANOUT as u64) as u16
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        context::{ContextOptions, RegionContext},
        head::Head,
        pool::Pool,
        DynArr, Step,
    };
    use std::sync::Arc;

    fn pool() -> Pool {
        Pool::new(7, Arc::new(RegionContext::new(ContextOptions::new())))
    }

    fn fill(pool: &Pool, head: &mut Head, words: &[(u32, u32)]) {
        let mut arr = DynArr::new(pool, head);
        for &(pos, value) in words {
            *arr.set(pos).unwrap() = value;
        }
    }

    // Drive a trim to completion, checking the head after every step. Returns the step count.
    fn trim(pool: &Pool, head: &mut Head, pos: u32) -> usize {
        let mut arr = DynArr::new(pool, head);
        let mut iter = arr.release_iter();
        let mut steps = 0;
        loop {
            steps += 1;
            let step = arr.trim(pos, &mut iter);
            assert_eq!(arr.node_census() as i32, arr.head().node_count());
            if step.is_done() {
                return steps;
            }
            assert_eq!(step, Step::NoData);
        }
    }

    fn release(pool: &Pool, head: &mut Head) -> Vec<u32> {
        let mut arr = DynArr::new(pool, head);
        let mut iter = arr.release_iter();
        let mut surfaced = Vec::new();
        let mut out = 0;
        loop {
            match arr.release(&mut iter, &mut out) {
                Step::Done => return surfaced,
                Step::Data => surfaced.push(out),
                Step::NoData => {}
            }
        }
    }

    #[test]
    fn step_codes() {
        assert_eq!(Step::Done.code(), 0);
        assert_eq!(Step::Data.code(), 1);
        assert_eq!(Step::NoData.code(), 2);
        assert!(Step::Done.is_done());
        assert!(!Step::Data.is_done());
    }

    #[test]
    fn release_frees_every_node_and_surfaces_every_word() {
        let pool = pool();
        let mut head = Head::new();
        fill(&pool, &mut head, &[(1, 10), (256, 20), (65536, 30)]);
        assert_eq!(head.levels(), 3);
        let nodes = head.node_count();
        assert_eq!(pool.info().inuse_nodes, nodes as u64);

        let surfaced = release(&pool, &mut head);

        // Three data nodes, each surfaced in full.
        assert_eq!(surfaced.len(), 3 * 256);
        let mut live: Vec<u32> = surfaced.into_iter().filter(|&w| w != 0).collect();
        live.sort();
        assert_eq!(live, vec![10, 20, 30]);

        assert!(head.is_empty());
        assert_eq!(head.node_count(), 0);
        assert_eq!(head.levels(), 0);
        assert_eq!(pool.info().inuse_nodes, 0);
    }

    #[test]
    fn trim_retains_the_straddling_data_node() {
        let pool = pool();
        let mut head = Head::new();
        fill(&pool, &mut head, &[(50, 5), (150, 15)]);
        assert_eq!(head.size(), 256);

        trim(&pool, &mut head, 100);
        assert_eq!(head.size(), 100);
        assert_eq!(head.node_count(), 1);

        let mut arr = DynArr::new(&pool, &mut head);
        assert_eq!(arr.get(150), None);
        assert_eq!(arr.get(50), Some(&5));

        // Growing again exposes cleared words.
        *arr.set(160).unwrap() = 16;
        assert_eq!(arr.head().size(), 256);
        assert_eq!(arr.get(150), Some(&0));
        assert_eq!(arr.get(160), Some(&16));
        release(&pool, &mut head);
    }

    #[test]
    fn trim_keeps_depth_and_frees_whole_subtrees() {
        let pool = pool();
        let mut head = Head::new();
        fill(
            &pool,
            &mut head,
            &[(3, 1), (299, 2), (600, 3), (70000, 4), (1 << 17, 5)],
        );
        assert_eq!(head.levels(), 3);

        trim(&pool, &mut head, 300);
        assert_eq!(head.levels(), 3);
        assert_eq!(head.size(), 300);
        // The root, one index node and the data nodes of 3 and 299.
        assert_eq!(head.node_count(), 4);

        let arr = DynArr::new(&pool, &mut head);
        assert_eq!(arr.get(3), Some(&1));
        assert_eq!(arr.get(299), Some(&2));
        assert_eq!(arr.get(300), None);
        drop(arr);
        release(&pool, &mut head);
        assert_eq!(pool.info().inuse_nodes, 0);
    }

    #[test]
    fn target_beyond_size_changes_nothing() {
        let pool = pool();
        let mut head = Head::new();
        fill(&pool, &mut head, &[(10, 1)]);

        assert_eq!(trim(&pool, &mut head, 256), 1);
        assert_eq!(trim(&pool, &mut head, 5000), 1);
        assert_eq!(head.size(), 256);
        assert_eq!(head.node_count(), 1);
        release(&pool, &mut head);
    }

    #[test]
    fn truncate_with_output_surfaces_words_above_target() {
        let pool = pool();
        let mut head = Head::new();
        let words: Vec<(u32, u32)> = (0..600).map(|i| (i, i + 1)).collect();
        fill(&pool, &mut head, &words);

        let mut arr = DynArr::new(&pool, &mut head);
        let mut iter = arr.release_iter();
        let mut surfaced = Vec::new();
        let mut out = 0;
        loop {
            match arr.truncate(400, &mut iter, Some(&mut out)) {
                Step::Done => break,
                Step::Data => surfaced.push(out),
                Step::NoData => {}
            }
        }

        // Positions 400..768 of the three data nodes, highest first.
        let expected: Vec<u32> = (400..768)
            .rev()
            .map(|pos| if pos < 600 { pos + 1 } else { 0 })
            .collect();
        assert_eq!(surfaced, expected);
        assert_eq!(arr.head().size(), 400);
        assert_eq!(arr.get(399), Some(&400));
        release(&pool, &mut head);
    }

    #[test]
    fn done_is_sticky() {
        let pool = pool();
        let mut head = Head::new();
        fill(&pool, &mut head, &[(1000, 1)]);

        let mut arr = DynArr::new(&pool, &mut head);
        let mut iter = arr.release_iter();
        while !arr.trim(0, &mut iter).is_done() {}
        assert!(iter.is_done());
        assert_eq!(arr.trim(0, &mut iter), Step::Done);
        let mut out = 0;
        assert_eq!(arr.release(&mut iter, &mut out), Step::Done);
        assert!(arr.head().is_empty());
    }

    #[test]
    fn abandoned_trim_to_zero_can_be_finished() {
        let pool = pool();
        let mut head = Head::new();
        fill(&pool, &mut head, &[(5, 1)]);

        {
            let mut arr = DynArr::new(&pool, &mut head);
            let mut iter = arr.release_iter();
            assert_eq!(arr.trim(0, &mut iter), Step::NoData);
        }
        assert_eq!(head.size(), 0);
        assert_eq!(head.node_count(), 1);

        release(&pool, &mut head);
        assert!(head.is_empty());
        assert_eq!(head.levels(), 0);
        assert_eq!(head.node_count(), 0);
        assert_eq!(pool.info().inuse_nodes, 0);
    }

    #[test]
    fn abandoned_release_can_be_finished() {
        let pool = pool();
        let mut head = Head::new();
        fill(&pool, &mut head, &[(3, 1), (700, 2)]);

        {
            // surface every word, stopping before the nodes are freed.
            let mut arr = DynArr::new(&pool, &mut head);
            let mut iter = arr.release_iter();
            let mut out = 0;
            while arr.head().size() > 0 {
                assert_ne!(arr.release(&mut iter, &mut out), Step::Done);
            }
            assert!(arr.head().node_count() > 0);
            assert_eq!(arr.node_census() as i32, arr.head().node_count());
        }

        let surfaced = release(&pool, &mut head);
        assert!(surfaced.iter().all(|&w| w == 0));
        assert_eq!(head.node_count(), 0);
        assert_eq!(pool.info().inuse_nodes, 0);

        // abandoned at size 0, a trim to 0 finishes the job too.
        fill(&pool, &mut head, &[(70000, 3)]);
        {
            let mut arr = DynArr::new(&pool, &mut head);
            let mut iter = arr.release_iter();
            while arr.head().size() > 0 {
                arr.trim(0, &mut iter);
            }
        }
        trim(&pool, &mut head, 0);
        assert!(head.is_empty());
        assert_eq!(pool.info().inuse_nodes, 0);
    }

    #[test]
    fn release_of_empty_array_is_done_at_once() {
        let pool = pool();
        let mut head = Head::new();
        let mut arr = DynArr::new(&pool, &mut head);
        let mut iter = arr.release_iter();
        let mut out = 0;
        assert_eq!(arr.release(&mut iter, &mut out), Step::Done);
        assert!(arr.head().is_empty());
    }

    #[test]
    fn abandoned_shrink_leaves_a_consistent_head() {
        let pool = pool();
        let mut head = Head::new();
        let words: Vec<(u32, u32)> = (0..40).map(|i| (i * 1000, i)).collect();
        fill(&pool, &mut head, &words);

        {
            let mut arr = DynArr::new(&pool, &mut head);
            let mut iter = arr.release_iter();
            for _ in 0..25 {
                arr.trim(5000, &mut iter);
            }
            assert_eq!(arr.node_census() as i32, arr.head().node_count());
            for pos in 0..5 {
                assert_eq!(arr.get(pos * 1000), Some(&pos));
            }
        }

        // A fresh shrink picks up where the abandoned one left.
        trim(&pool, &mut head, 5000);
        assert_eq!(head.size(), 5000);
        release(&pool, &mut head);
        assert_eq!(pool.info().inuse_nodes, 0);
    }
}
