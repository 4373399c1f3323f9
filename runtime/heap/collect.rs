//! Functionality for garbage collecting heaps
//!
//! This is a Cheney-style semi-space collector. It doesn't support generations, incremental or
//! concurrent collection. Every collection is a single breadth-first copying pass from from-space
//! in to to-space, followed by a second pass in to larger spaces if the first didn't free enough
//! room.

use std::{mem, ptr};

use crate::config::Validation;
use crate::error::{ErrorKind, Result};
use crate::heap::validate;
use crate::heap::{grown_size, Collector, Space};
use crate::word::{apply_tag, is_forwarded, is_reference, strip_tag, Header, Word};

/// Returns the root slots between the stack's high-water mark and `stack_top`
///
/// The stack grows downwards so slots are returned from the oldest to the newest. `stack_top` is
/// the newest slot and is included.
fn root_slots(stack_begin: *mut Word, stack_top: *mut Word) -> impl Iterator<Item = *mut Word> {
    let root_bytes = (stack_begin as usize).saturating_sub(stack_top as usize);
    let root_count = root_bytes / mem::size_of::<Word>();
    (1..=root_count).map(move |depth| stack_begin.wrapping_sub(depth))
}

/// Totals from a single [`CopyPass`]
struct PassSummary {
    live_words: usize,
    objects_copied: u64,
}

/// Single copying pass from a from-space in to a to-space
///
/// To-space is treated as an append-only queue: copying an object enqueues it at `free` and the
/// scan cursor dequeues one word at a time. The pass is complete once the scan cursor catches up.
struct CopyPass<'a> {
    from_space: &'a Space,
    from_used: usize,
    to_space: &'a mut Space,
    free: usize,
    validation: Validation,
    objects_copied: u64,
}

impl<'a> CopyPass<'a> {
    fn new(
        from_space: &'a Space,
        from_used: usize,
        to_space: &'a mut Space,
        validation: Validation,
    ) -> CopyPass<'a> {
        CopyPass {
            from_space,
            from_used,
            to_space,
            free: 0,
            validation,
            objects_copied: 0,
        }
    }

    fn run(mut self, roots: impl Iterator<Item = *mut Word>) -> Result<PassSummary> {
        log::trace!("scanning stack");
        for slot in roots {
            self.visit_slot(slot)?;
        }

        log::trace!("scanning to-space");
        let mut scan = 0;
        // `free` advances as objects are copied during the scan
        while scan < self.free {
            let slot = self.to_space.word_ptr(scan);
            self.visit_slot(slot)?;
            scan += 1;
        }

        Ok(PassSummary {
            live_words: self.free,
            objects_copied: self.objects_copied,
        })
    }

    /// Relocates the object referenced by `slot` and updates `slot` to its new location
    ///
    /// Immediates are left untouched.
    fn visit_slot(&mut self, slot: *mut Word) -> Result<()> {
        if !unsafe { is_reference(slot) } {
            return Ok(());
        }

        let object_ptr = strip_tag(unsafe { ptr::read(slot) });

        let object_index = match self.validation {
            Validation::Checked => Some(validate::check_reference(
                object_ptr,
                self.from_space,
                self.from_used,
                &*self.to_space,
            )?),
            Validation::Trusted => None,
        };

        let new_location = if unsafe { is_forwarded(object_ptr) } {
            // The header is already a tagged reference to the copy
            let forwarding_ref = unsafe { ptr::read(object_ptr) };

            if self.validation == Validation::Checked {
                validate::check_forwarded(
                    object_ptr,
                    strip_tag(forwarding_ref),
                    &*self.to_space,
                    self.free,
                )?;
            }

            log::trace!("object at {:p} already copied", object_ptr);
            forwarding_ref
        } else {
            let len = match Header::decode(unsafe { ptr::read(object_ptr) }) {
                Header::Unforwarded { len } => len,
                Header::Forwarded { .. } => unreachable!("forwarded header without tag"),
            };

            if let Some(object_index) = object_index {
                validate::check_object_len(object_ptr, object_index, len, self.from_used)?;
            }

            self.copy_object(object_ptr, len)?
        };

        unsafe {
            ptr::write(slot, new_location);
        }

        Ok(())
    }

    /// Copies an object to the free cursor and overwrites its old header with a forwarding
    /// reference
    fn copy_object(&mut self, object_ptr: *mut Word, len: usize) -> Result<Word> {
        let word_len = len + 1;
        let available = self.to_space.capacity() - self.free;

        if word_len > available {
            return Err(ErrorKind::ToSpaceOverflow {
                needed: word_len,
                available,
            }
            .into());
        }

        log::trace!("copying object of {} words from {:p}", word_len, object_ptr);

        let dest_location = self.to_space.word_ptr(self.free);
        unsafe {
            ptr::copy_nonoverlapping(object_ptr as *const Word, dest_location, word_len);
        }
        self.free += word_len;
        self.objects_copied += 1;

        let forwarding_ref = apply_tag(dest_location);
        unsafe {
            ptr::write(object_ptr, forwarding_ref);
        }

        Ok(forwarding_ref)
    }
}

impl Collector {
    /// Collects garbage, ensuring `requested_words` words are free in from-space afterwards
    ///
    /// Every root between `stack_top` and the stack's high-water mark is updated to the new
    /// location of its object. Any other reference in to from-space held by the caller is invalid
    /// once this returns.
    ///
    /// If this returns an error the heap is left in an unspecified state and must not be used.
    pub fn collect(&mut self, stack_top: *mut Word, requested_words: usize) -> Result<()> {
        log::debug!(
            "collecting from-space {:p}..{:p} with free pointer {:p}",
            self.from_space.begin(),
            self.from_space.end(),
            self.free_ptr()
        );

        self.copy_and_swap_spaces(stack_top)?;

        if self.free_words() < requested_words {
            self.grow(stack_top, requested_words)?;
        }

        self.stats.collections += 1;

        log::debug!(
            "collected with {} live words and {} free words",
            self.free,
            self.free_words()
        );

        Ok(())
    }

    /// Grows both spaces until the live data plus `requested_words` fits
    ///
    /// The current size is doubled until it's large enough. Live data is copied in to a larger
    /// to-space and the other space is then reallocated at the same size.
    fn grow(&mut self, stack_top: *mut Word, requested_words: usize) -> Result<()> {
        let current_words = self.from_space.capacity();
        let new_words = grown_size(current_words, self.free, requested_words).ok_or(
            ErrorKind::AllocationFailure {
                words: usize::MAX,
            },
        )?;

        log::debug!(
            "reallocating spaces: requested words {}, current space words {}, new space words {}",
            requested_words,
            current_words,
            new_words
        );

        self.replace_to_space(new_words)?;
        self.copy_and_swap_spaces(stack_top)?;
        self.replace_to_space(new_words)?;

        self.stats.growths += 1;
        Ok(())
    }

    /// Copies everything reachable from the roots in to to-space and swaps the spaces
    fn copy_and_swap_spaces(&mut self, stack_top: *mut Word) -> Result<()> {
        let pass = CopyPass::new(
            &self.from_space,
            self.free,
            &mut self.to_space,
            self.config.validation,
        );
        let summary = pass.run(root_slots(self.stack_begin, stack_top))?;

        self.swap_spaces();
        self.free = summary.live_words;

        self.stats.objects_copied += summary.objects_copied;
        self.stats.words_copied += summary.live_words as u64;
        self.stats.live_words = summary.live_words;

        Ok(())
    }
}
