use dynarr::{ContextOptions, DynArr, Head, Pool, RegionContext, ReleaseIter, Serializer, Step};
use std::sync::Arc;

pub fn context(page_limit: Option<u32>) -> Arc<RegionContext> {
    let mut options = ContextOptions::new();
    options.region_pages(8);
    if let Some(limit) = page_limit {
        options.page_limit(limit);
    }
    Arc::new(RegionContext::new(options))
}

#[allow(dead_code)]
pub fn seed() -> [u8; 16] {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("no time?")
        .as_nanos()
        .to_le_bytes()[0..16]
        .try_into()
        .unwrap()
}

#[allow(dead_code)]
#[derive(Clone, Copy, Debug)]
pub enum Shrink {
    Release,
    Trim(u32),
    Truncate(u32),
}

/// Drive a shrink to completion. Returns the number of steps taken and the surfaced words.
pub fn shrink<S: Serializer>(arr: &mut DynArr<'_, S>, shrink: Shrink) -> (usize, Vec<u32>) {
    let mut iter: ReleaseIter = arr.release_iter();
    let mut surfaced = Vec::new();
    let mut out = 0;
    let mut steps = 0;
    loop {
        steps += 1;
        let step = match shrink {
            Shrink::Release => arr.release(&mut iter, &mut out),
            Shrink::Trim(pos) => arr.trim(pos, &mut iter),
            Shrink::Truncate(pos) => arr.truncate(pos, &mut iter, Some(&mut out)),
        };
        match step {
            Step::Done => return (steps, surfaced),
            Step::Data => surfaced.push(out),
            Step::NoData => {}
        }
    }
}

/// One array over a private pool. Whatever is left in the array is released on drop.
pub struct Test {
    pool: Pool,
    head: Head,
}

#[allow(dead_code)]
impl Test {
    pub fn new() -> Self {
        Self::with_page_limit(None)
    }

    pub fn with_page_limit(page_limit: Option<u32>) -> Self {
        Test {
            pool: Pool::new(1, context(page_limit)),
            head: Head::new(),
        }
    }

    pub fn arr(&mut self) -> DynArr<'_> {
        DynArr::new(&self.pool, &mut self.head)
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn set(&mut self, pos: u32, value: u32) {
        *self.arr().set(pos).unwrap() = value;
    }

    pub fn get(&mut self, pos: u32) -> Option<u32> {
        self.arr().get(pos).copied()
    }

    pub fn census(&mut self) -> u32 {
        self.arr().node_census()
    }

    pub fn trim(&mut self, pos: u32) -> usize {
        shrink(&mut self.arr(), Shrink::Trim(pos)).0
    }

    pub fn truncate(&mut self, pos: u32) -> Vec<u32> {
        shrink(&mut self.arr(), Shrink::Truncate(pos)).1
    }

    pub fn release(&mut self) -> Vec<u32> {
        shrink(&mut self.arr(), Shrink::Release).1
    }
}

impl Drop for Test {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            self.release();
        }
    }
}
