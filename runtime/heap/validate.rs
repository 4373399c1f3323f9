//! Caller contract checks used by [`Validation::Checked`](crate::config::Validation::Checked)
//!
//! None of these dereference the address being checked; they only compare it against the space
//! bounds. Headers are read by the caller once the object address has been accepted.

use std::mem;

use crate::error::{Result, Violation};
use crate::heap::Space;
use crate::word::Word;

/// Checks that a reference points at an allocated word of from-space
pub fn check_reference(
    object_ptr: *const Word,
    from_space: &Space,
    from_used: usize,
    to_space: &Space,
) -> Result<usize> {
    let address = object_ptr as usize;

    if address % mem::align_of::<Word>() != 0 {
        return Err(Violation::MisalignedReference { address }.into());
    }

    if to_space.contains(object_ptr) {
        return Err(Violation::ReferenceIntoToSpace { address }.into());
    }

    from_space
        .index_of(object_ptr, from_used)
        .ok_or_else(|| Violation::ReferenceOutsideFromSpace { address }.into())
}

/// Checks that an unforwarded object's payload ends inside the allocated part of from-space
pub fn check_object_len(
    object_ptr: *const Word,
    object_index: usize,
    len: usize,
    from_used: usize,
) -> Result<()> {
    let fits = object_index
        .checked_add(len)
        .and_then(|last_index| last_index.checked_add(1))
        .map(|end_index| end_index <= from_used)
        .unwrap_or(false);

    if fits {
        Ok(())
    } else {
        Err(Violation::ObjectOverrunsFromSpace {
            address: object_ptr as usize,
            len,
        }
        .into())
    }
}

/// Checks that a forwarding reference points at an object already copied to to-space
pub fn check_forwarded(
    object_ptr: *const Word,
    new_object_ptr: *const Word,
    to_space: &Space,
    to_used: usize,
) -> Result<()> {
    match to_space.index_of(new_object_ptr, to_used) {
        Some(_) => Ok(()),
        None => Err(Violation::ForwardedOutsideToSpace {
            address: object_ptr as usize,
            new_address: new_object_ptr as usize,
        }
        .into()),
    }
}
