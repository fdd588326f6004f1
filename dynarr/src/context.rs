//! The memory context: where pools get their pages from.
//!
//! A [`MemoryContext`] hands out fixed-size, aligned pages on behalf of a pool and takes them back
//! when the pool is torn down. Every request carries the pool's type id so the context can keep
//! per-type accounting.
//!
//! [`RegionContext`] is the stock implementation. It maps anonymous memory in large regions and
//! carves them into pages, keeping returned pages on a free list for reuse.

#[cfg(not(target_family = "unix"))]
std::compile_error!("dynarr's region context only supports Unix-based OSs");

use dashmap::DashMap;
use parking_lot::Mutex;
use std::ptr::NonNull;

/// The size of a page handed out by a [`MemoryContext`].
pub const PAGE_SIZE: usize = 32 * 1024;

/// The minimum alignment of a page handed out by a [`MemoryContext`].
pub const PAGE_ALIGN: usize = 4096;

/// An exclusively owned page of [`PAGE_SIZE`] bytes.
///
/// The contents of a fresh page are unspecified.
#[derive(Debug)]
pub struct RawPage(NonNull<u8>);

impl RawPage {
    /// Wrap a pointer to a page.
    ///
    /// # Safety
    ///
    /// The caller is responsible for making sure:
    ///
    /// 1. that `ptr` is valid for reads and writes of [`PAGE_SIZE`] bytes,
    /// 2. that `ptr` is aligned to [`PAGE_ALIGN`],
    /// 3. that nothing else accesses the memory while the returned value, or anything built from
    ///    it, is alive.
    pub unsafe fn from_raw(ptr: NonNull<u8>) -> Self {
        debug_assert_eq!(ptr.as_ptr() as usize % PAGE_ALIGN, 0);
        RawPage(ptr)
    }

    /// Returns a pointer to the start of the page.
    pub fn as_ptr(&self) -> *mut u8 {
        self.0.as_ptr()
    }

    /// Give up the page, returning the pointer it was built from.
    pub fn into_raw(self) -> NonNull<u8> {
        self.0
    }
}

unsafe impl Send for RawPage {}

/// A provider of pages.
pub trait MemoryContext: Send + Sync {
    /// Allocate a page accounted to `type_id`. Returns `None` when no memory is available.
    fn alloc_page(&self, type_id: u32) -> Option<RawPage>;

    /// Return a page previously obtained from [`MemoryContext::alloc_page`] with the same
    /// `type_id`.
    ///
    /// # Safety
    ///
    /// The page must have been allocated by this context, and must not be accessed afterwards.
    unsafe fn release_page(&self, type_id: u32, page: RawPage);
}

/// Options for a [`RegionContext`].
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub(crate) region_pages: usize,
    pub(crate) page_limit: Option<u32>,
}

impl ContextOptions {
    /// Create a new `ContextOptions` instance with the default values.
    pub fn new() -> Self {
        Self {
            region_pages: 64,
            page_limit: None,
        }
    }

    /// Set the number of pages mapped at once whenever the context runs dry.
    ///
    /// Default: 64 pages (2 MiB).
    pub fn region_pages(&mut self, region_pages: usize) {
        assert!(region_pages > 0);
        self.region_pages = region_pages;
    }

    /// Set the maximum number of pages that may be handed out at any one time. Requests beyond
    /// the limit fail as if memory were exhausted.
    ///
    /// Default: unlimited.
    pub fn page_limit(&mut self, page_limit: u32) {
        self.page_limit = Some(page_limit);
    }
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct State {
    regions: Vec<NonNull<u8>>,
    freelist: Vec<NonNull<u8>>,
    in_use: u32,
}

/// A [`MemoryContext`] backed by anonymous memory mappings.
///
/// Pages are never unmapped individually. Released pages go on a free list and the regions are
/// only unmapped when the context is dropped.
pub struct RegionContext {
    region_pages: usize,
    page_limit: Option<u32>,
    state: Mutex<State>,
    usage: DashMap<u32, u32>,
}

impl RegionContext {
    /// Creates a new, empty context.
    pub fn new(options: ContextOptions) -> Self {
        RegionContext {
            region_pages: options.region_pages,
            page_limit: options.page_limit,
            state: Mutex::new(State {
                regions: vec![],
                freelist: vec![],
                in_use: 0,
            }),
            usage: DashMap::new(),
        }
    }

    /// The number of pages currently handed out.
    pub fn pages_in_use(&self) -> u32 {
        self.state.lock().in_use
    }

    /// The number of pages currently handed out under `type_id`.
    pub fn usage(&self, type_id: u32) -> u32 {
        self.usage.get(&type_id).map_or(0, |n| *n)
    }

    /// The number of regions mapped so far.
    pub fn regions(&self) -> usize {
        self.state.lock().regions.len()
    }

    fn region_size(&self) -> usize {
        self.region_pages * PAGE_SIZE
    }

    fn grow(&self, state: &mut State) -> Option<NonNull<u8>> {
        assert!(state.freelist.is_empty());
        let region_ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                self.region_size(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                /* fd */ -1,
                /* offset */ 0,
            )
        };
        if region_ptr == libc::MAP_FAILED {
            tracing::warn!(
                region_bytes = self.region_size(),
                "failed to map a page region"
            );
            return None;
        }
        // UNWRAP: mmap never returns null on success.
        let region = NonNull::new(region_ptr as *mut u8).unwrap();
        state.regions.push(region);

        // Reverse order, so pages are handed out from the start of the region.
        for slot in (0..self.region_pages).rev() {
            // SAFETY: `slot` is within the region that was just mapped.
            let page = unsafe { NonNull::new_unchecked(region.as_ptr().add(slot * PAGE_SIZE)) };
            state.freelist.push(page);
        }
        tracing::trace!(regions = state.regions.len(), "mapped a page region");

        state.freelist.pop()
    }
}

impl MemoryContext for RegionContext {
    fn alloc_page(&self, type_id: u32) -> Option<RawPage> {
        let page = {
            let mut state = self.state.lock();
            if self.page_limit.map_or(false, |limit| state.in_use >= limit) {
                return None;
            }
            let page = match state.freelist.pop() {
                Some(page) => page,
                None => self.grow(&mut state)?,
            };
            state.in_use += 1;
            page
        };

        *self.usage.entry(type_id).or_insert(0) += 1;
        // SAFETY: the page lies within a live region and has just left the free list.
        Some(unsafe { RawPage::from_raw(page) })
    }

    unsafe fn release_page(&self, type_id: u32, page: RawPage) {
        if let Some(mut pages) = self.usage.get_mut(&type_id) {
            *pages = pages.saturating_sub(1);
        }

        let mut state = self.state.lock();
        state.in_use -= 1;
        state.freelist.push(page.into_raw());
    }
}

impl Drop for RegionContext {
    fn drop(&mut self) {
        let size = self.region_size();
        let state = self.state.get_mut();
        if state.in_use != 0 {
            tracing::warn!(pages = state.in_use, "memory context dropped with pages in use");
        }
        for region_ptr in state.regions.drain(..) {
            unsafe {
                libc::munmap(region_ptr.as_ptr() as *mut libc::c_void, size);
            }
        }
    }
}

unsafe impl Send for RegionContext {}
unsafe impl Sync for RegionContext {}
