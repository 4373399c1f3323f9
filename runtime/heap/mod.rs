pub mod collect;
mod validate;

use std::{cmp, mem, ptr};

use crate::config::Config;
use crate::error::{ErrorKind, Result, Violation};
use crate::word::{Header, ObjectRef, Word};

/// Contiguous region of words used as either from-space or to-space
///
/// This has a gross pointer-based representation so generated native code can bump allocate from
/// it directly. The pointers stay valid for as long as the space is alive as the backing vector is
/// never resized.
pub struct Space {
    begin: *mut Word,
    end: *mut Word,
    backing_vec: Vec<Word>,
}

impl Space {
    /// Creates a zero-filled space with room for `count` words
    fn with_capacity(count: usize) -> Result<Space> {
        let mut backing_vec = Vec::new();
        if backing_vec.try_reserve_exact(count).is_err() {
            return Err(ErrorKind::AllocationFailure { words: count }.into());
        }
        backing_vec.resize(count, Word::ZERO);

        let begin: *mut Word = backing_vec.as_mut_ptr();
        Ok(Space {
            begin,
            end: unsafe { begin.add(count) },
            backing_vec,
        })
    }

    fn empty() -> Space {
        let mut backing_vec = Vec::new();
        let begin: *mut Word = backing_vec.as_mut_ptr();

        Space {
            begin,
            end: begin,
            backing_vec,
        }
    }

    /// Returns the number of words this space can hold
    pub fn capacity(&self) -> usize {
        self.backing_vec.len()
    }

    pub fn begin(&self) -> *mut Word {
        self.begin
    }

    pub fn end(&self) -> *mut Word {
        self.end
    }

    /// Returns a pointer to the word at `index`
    fn word_ptr(&self, index: usize) -> *mut Word {
        debug_assert!(index <= self.capacity());
        unsafe { self.begin.add(index) }
    }

    /// Returns the word index of `word_ptr` if it lies within the first `used` words
    fn index_of(&self, word_ptr: *const Word, used: usize) -> Option<usize> {
        let offset = (word_ptr as usize).checked_sub(self.begin as usize)?;
        let index = offset / mem::size_of::<Word>();

        if offset % mem::size_of::<Word>() == 0 && index < used {
            Some(index)
        } else {
            None
        }
    }

    fn contains(&self, word_ptr: *const Word) -> bool {
        self.index_of(word_ptr, self.capacity()).is_some()
    }
}

/// Running totals kept by a [`Collector`]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Completed `collect` calls
    pub collections: u64,
    /// Collections that had to grow both spaces
    pub growths: u64,
    /// Objects relocated across all passes
    pub objects_copied: u64,
    /// Words relocated across all passes, including headers
    pub words_copied: u64,
    /// Words surviving the most recent pass
    pub live_words: usize,
}

/// Semi-space copying garbage collector
///
/// Owns from-space, to-space and the free cursor into from-space. Objects are placed by the
/// caller directly in from-space; the collector only ever relocates them.
pub struct Collector {
    from_space: Space,
    to_space: Space,
    free: usize,
    stack_begin: *mut Word,
    config: Config,
    stats: Stats,
}

impl Collector {
    /// Initialises a collector with spaces of `initial_words` words
    ///
    /// `stack_begin` is the stack's high-water mark; every word below it down to the stack top
    /// passed to [`Collector::collect`] is a root.
    pub fn init(stack_begin: *mut Word, initial_words: usize) -> Result<Collector> {
        Self::new(stack_begin, Config::default().with_initial_words(initial_words))
    }

    /// Initialises a collector with an explicit configuration
    pub fn new(stack_begin: *mut Word, config: Config) -> Result<Collector> {
        log::debug!(
            "initialising collector with {} words per space ({:?})",
            config.initial_words,
            config.validation
        );

        let from_space = Space::with_capacity(config.initial_words)?;
        let to_space = Space::with_capacity(config.initial_words)?;

        Ok(Collector {
            from_space,
            to_space,
            free: 0,
            stack_begin,
            config,
            stats: Stats::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn stack_begin(&self) -> *mut Word {
        self.stack_begin
    }

    pub fn from_space(&self) -> &Space {
        &self.from_space
    }

    pub fn to_space(&self) -> &Space {
        &self.to_space
    }

    pub fn from_space_words(&self) -> usize {
        self.from_space.capacity()
    }

    pub fn to_space_words(&self) -> usize {
        self.to_space.capacity()
    }

    /// Returns the number of allocated words in from-space
    pub fn used_words(&self) -> usize {
        self.free
    }

    /// Returns the number of words that can be allocated without collecting
    pub fn free_words(&self) -> usize {
        self.from_space.capacity() - self.free
    }

    /// Returns the first free word in from-space
    pub fn free_ptr(&self) -> *mut Word {
        self.from_space.word_ptr(self.free)
    }

    /// Returns the first word after from-space
    pub fn from_space_end(&self) -> *mut Word {
        self.from_space.end()
    }

    /// Moves the free cursor after generated code has bump allocated past it
    pub fn set_free_ptr(&mut self, free_ptr: *mut Word) -> Result<()> {
        if free_ptr == self.from_space.end() {
            self.free = self.from_space.capacity();
            return Ok(());
        }

        match self.from_space.index_of(free_ptr, self.from_space.capacity()) {
            Some(index) => {
                self.free = index;
                Ok(())
            }
            None => Err(Violation::FreePointerOutsideFromSpace {
                address: free_ptr as usize,
            }
            .into()),
        }
    }

    /// Returns true if `object_ref` points in to the allocated part of from-space
    pub fn contains(&self, object_ref: ObjectRef) -> bool {
        self.from_space
            .index_of(object_ref.as_ptr(), self.free)
            .is_some()
    }

    /// Returns contiguous memory for holding `count` words
    ///
    /// If from-space is full this will return `None`
    pub fn alloc_words(&mut self, count: usize) -> Option<*mut Word> {
        if count > self.free_words() {
            return None;
        }

        let alloc = self.from_space.word_ptr(self.free);
        self.free += count;
        Some(alloc)
    }

    /// Allocates an object with `len` payload words, collecting first if from-space is full
    ///
    /// The payload is filled with immediate zeros. Any reference held by the caller that isn't
    /// stored between `stack_top` and the stack's high-water mark is invalidated if a collection
    /// happens.
    pub fn alloc_object(&mut self, stack_top: *mut Word, len: usize) -> Result<ObjectRef> {
        let word_len = len + 1;

        let alloc = match self.alloc_words(word_len) {
            Some(alloc) => alloc,
            None => {
                self.collect(stack_top, word_len)?;
                self.alloc_words(word_len)
                    .expect("collection did not free the requested words")
            }
        };

        unsafe {
            ptr::write(alloc, Header::Unforwarded { len }.encode());
            for index in 1..word_len {
                ptr::write(alloc.add(index), Word::ZERO);
            }

            Ok(ObjectRef::new(alloc))
        }
    }

    /// Swaps the roles of from-space and to-space
    fn swap_spaces(&mut self) {
        mem::swap(&mut self.from_space, &mut self.to_space);
    }

    /// Releases to-space and replaces it with a fresh space of `count` words
    fn replace_to_space(&mut self, count: usize) -> Result<()> {
        drop(mem::replace(&mut self.to_space, Space::empty()));
        self.to_space = Space::with_capacity(count)?;
        Ok(())
    }
}

/// Returns the new space size needed to hold `live_words` plus `requested_words`
///
/// The current size is doubled until it's large enough. A zero sized space is treated as a single
/// word. Returns `None` if the size overflows.
pub fn grown_size(current_words: usize, live_words: usize, requested_words: usize) -> Option<usize> {
    let needed_words = live_words.checked_add(requested_words)?;
    let mut new_words = cmp::max(current_words, 1);

    while new_words < needed_words {
        new_words = new_words.checked_mul(2)?;
    }

    Some(new_words)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::word::Value;

    fn test_collector(initial_words: usize) -> Collector {
        Collector::init(ptr::null_mut(), initial_words).unwrap()
    }

    #[test]
    fn init_spaces() {
        let collector = test_collector(8);

        assert_eq!(8, collector.from_space_words());
        assert_eq!(8, collector.to_space_words());
        assert_eq!(0, collector.used_words());
        assert_eq!(8, collector.free_words());
        assert_eq!(collector.from_space().begin(), collector.free_ptr());
        assert_eq!(
            unsafe { collector.from_space().begin().add(8) },
            collector.from_space_end()
        );
    }

    #[test]
    fn impossible_init() {
        let err = Collector::init(ptr::null_mut(), usize::MAX).err().unwrap();
        assert!(err.is_allocation_failure());
    }

    #[test]
    fn basic_alloc() {
        let mut collector = test_collector(4);

        let first = collector.alloc_words(3).unwrap();
        assert_eq!(collector.from_space().begin(), first);
        assert_eq!(1, collector.free_words());

        assert_eq!(None, collector.alloc_words(2));

        let second = collector.alloc_words(1).unwrap();
        assert_eq!(unsafe { first.add(3) }, second);
        assert_eq!(0, collector.free_words());
        assert_eq!(collector.from_space_end(), collector.free_ptr());
    }

    #[test]
    fn alloc_object_without_collect() {
        let mut collector = test_collector(8);

        let object_ref = collector.alloc_object(ptr::null_mut(), 2).unwrap();
        assert!(collector.contains(object_ref));
        assert_eq!(3, collector.used_words());

        unsafe {
            assert_eq!(2, object_ref.len());
            assert_eq!(
                vec![Value::Immediate(0), Value::Immediate(0)],
                object_ref.fields()
            );
        }

        assert_eq!(0, collector.stats().collections);
    }

    #[test]
    fn move_free_ptr() {
        let mut collector = test_collector(4);
        let begin = collector.from_space().begin();

        collector.set_free_ptr(unsafe { begin.add(2) }).unwrap();
        assert_eq!(2, collector.used_words());

        collector.set_free_ptr(collector.from_space_end()).unwrap();
        assert_eq!(0, collector.free_words());

        let err = collector
            .set_free_ptr(begin.wrapping_add(5))
            .err()
            .unwrap();
        assert_eq!(false, err.is_allocation_failure());
    }

    #[test]
    fn grown_sizes() {
        // Already large enough
        assert_eq!(Some(8), grown_size(8, 2, 6));
        // Doubles until it fits
        assert_eq!(Some(16), grown_size(8, 2, 7));
        assert_eq!(Some(64), grown_size(8, 10, 50));
        // Zero sized spaces still grow
        assert_eq!(Some(4), grown_size(0, 0, 3));
        // Overflow
        assert_eq!(None, grown_size(8, usize::MAX, 1));
        assert_eq!(None, grown_size(8, 0, usize::MAX));
    }
}
