//! Entry points called from generated code
//!
//! Generated code bump allocates inline: it reads `gc_free_ptr`, advances it past the new object
//! and compares it against `gc_fromspace_end`. When an allocation wouldn't fit it calls
//! `gc_collect` with its current stack pointer. Both symbols are republished after every call
//! here, so generated code must reload them and any heap pointer it keeps on the stack.
//!
//! There is exactly one collector per process and it's only ever touched from the thread running
//! generated code.

use std::{process, ptr};

use crate::config::Config;
use crate::error::Error;
use crate::heap::Collector;
use crate::word::Word;

/// First free word in from-space
#[export_name = "gc_free_ptr"]
pub static mut FREE_PTR: *mut Word = ptr::null_mut();

/// First word after from-space
#[export_name = "gc_fromspace_end"]
pub static mut FROMSPACE_END: *mut Word = ptr::null_mut();

static mut COLLECTOR: Option<Collector> = None;

fn fatal(err: Error) -> ! {
    if err.is_allocation_failure() {
        eprintln!("PANIC: Garbage collector ran out of memory.");
    } else {
        eprintln!("PANIC: {}", err);
    }

    process::exit(1);
}

unsafe fn publish_cursor(collector: &Collector) {
    FREE_PTR = collector.free_ptr();
    FROMSPACE_END = collector.from_space_end();
}

/// Initialises the process' collector
///
/// `stack_begin` is the stack pointer at the beginning of `main` and `heap_size` is the initial
/// size of both from-space and to-space in words.
///
/// # Safety
///
/// This must be called exactly once before any allocation. Every word between `stack_begin` and
/// the stack pointer passed to [`collect`] must be a valid tagged word.
#[export_name = "gc_init"]
pub unsafe extern "C" fn init(stack_begin: *mut Word, heap_size: u64) {
    let config = Config::from_env().with_initial_words(heap_size as usize);
    let collector = Collector::new(stack_begin, config).unwrap_or_else(|err| fatal(err));

    publish_cursor(&collector);
    *ptr::addr_of_mut!(COLLECTOR) = Some(collector);
}

/// Collects garbage so at least `requested_words` words are free
///
/// # Safety
///
/// [`init`] must have been called first and `stack_end` must be the current stack pointer.
#[export_name = "gc_collect"]
pub unsafe extern "C" fn collect(stack_end: *mut Word, requested_words: u64) {
    let collector = match &mut *ptr::addr_of_mut!(COLLECTOR) {
        Some(collector) => collector,
        None => {
            eprintln!("PANIC: gc_collect called before gc_init");
            process::exit(1);
        }
    };

    let result = collector
        .set_free_ptr(FREE_PTR)
        .and_then(|()| collector.collect(stack_end, requested_words as usize));

    if let Err(err) = result {
        fatal(err);
    }

    publish_cursor(collector);
}
