//! Tagged machine words
//!
//! Every word on the stack or inside a heap object is either an immediate or a tagged reference.
//! The low bit is the tag: immediates are stored shifted left by one with a zero tag bit while
//! references are the object's address plus one byte. Object headers reuse the same encoding; an
//! unforwarded header is an immediate holding the payload length and a forwarded header is a
//! reference to the object's new location.
//!
//! The bit packing is confined to this module. Everything else works against [`Value`] and
//! [`Header`].

use std::fmt;
use std::ptr;

/// Raw machine word as stored on the stack and in the heap
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Word(i64);

impl Word {
    pub const ZERO: Word = Word(0);

    pub const fn from_raw(raw: i64) -> Word {
        Word(raw)
    }

    pub const fn to_raw(self) -> i64 {
        self.0
    }

    /// Returns true if the tag bit is set
    pub fn is_tagged(self) -> bool {
        self.0 & 1 == 1
    }

    /// Decodes this word as a stack or payload value
    pub fn decode(self) -> Value {
        if self.is_tagged() {
            Value::Reference(ObjectRef::from_tagged(self).expect("tagged null reference"))
        } else {
            Value::Immediate(self.0 >> 1)
        }
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "Word({:#x})", self.0)
    }
}

/// Tests whether the word at `word_ptr` holds a tagged reference
///
/// # Safety
///
/// `word_ptr` must be valid for reads.
pub unsafe fn is_reference(word_ptr: *const Word) -> bool {
    ptr::read(word_ptr).is_tagged()
}

/// Tests whether the header of the object at `object_ptr` has been overwritten with a forwarding
/// reference
///
/// # Safety
///
/// `object_ptr` must point to a readable object header.
pub unsafe fn is_forwarded(object_ptr: *const Word) -> bool {
    ptr::read(object_ptr).is_tagged()
}

/// Converts a tagged reference in to the object's real address
pub fn strip_tag(tagged: Word) -> *mut Word {
    debug_assert!(tagged.is_tagged(), "stripping tag from immediate {:?}", tagged);
    (tagged.0 as usize).wrapping_sub(1) as *mut Word
}

/// Converts an object address in to a tagged reference
pub fn apply_tag(object_ptr: *const Word) -> Word {
    debug_assert_eq!(
        object_ptr as usize & 1,
        0,
        "tagging unaligned address {:p}",
        object_ptr
    );
    Word((object_ptr as usize).wrapping_add(1) as i64)
}

/// Semantic view of a stack or payload word
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Immediate(i64),
    Reference(ObjectRef),
}

impl Value {
    /// Packs this value in to its tagged word form
    ///
    /// Immediates lose their most significant bit.
    pub fn encode(self) -> Word {
        match self {
            Value::Immediate(value) => Word(value << 1),
            Value::Reference(object_ref) => object_ref.tagged(),
        }
    }

    pub fn as_immediate(self) -> Option<i64> {
        match self {
            Value::Immediate(value) => Some(value),
            Value::Reference(_) => None,
        }
    }

    pub fn as_reference(self) -> Option<ObjectRef> {
        match self {
            Value::Immediate(_) => None,
            Value::Reference(object_ref) => Some(object_ref),
        }
    }
}

impl From<Value> for Word {
    fn from(value: Value) -> Word {
        value.encode()
    }
}

/// Decoded object header
///
/// Before an object is relocated its header holds the payload length. Relocation destructively
/// overwrites it with a reference to the copy; the length is not recoverable afterwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Header {
    Unforwarded { len: usize },
    Forwarded { new_location: ObjectRef },
}

impl Header {
    pub fn decode(word: Word) -> Header {
        if word.is_tagged() {
            Header::Forwarded {
                new_location: ObjectRef::from_tagged(word).expect("forwarded to null"),
            }
        } else {
            Header::Unforwarded {
                len: (word.0 as u64 >> 1) as usize,
            }
        }
    }

    pub fn encode(self) -> Word {
        match self {
            Header::Unforwarded { len } => Word((len as i64) << 1),
            Header::Forwarded { new_location } => new_location.tagged(),
        }
    }
}

/// Untagged address of a heap object's header word
///
/// This is not memory safe and does not root the object; it's sugar for a raw pointer.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    inner: ptr::NonNull<Word>,
}

impl ObjectRef {
    /// Wraps an untagged object address
    ///
    /// # Safety
    ///
    /// `object_ptr` must be non-null and word aligned.
    pub unsafe fn new(object_ptr: *mut Word) -> ObjectRef {
        ObjectRef {
            inner: ptr::NonNull::new_unchecked(object_ptr),
        }
    }

    /// Wraps the address encoded in a tagged reference
    ///
    /// Returns `None` if the reference encodes a null address.
    pub fn from_tagged(tagged: Word) -> Option<ObjectRef> {
        ptr::NonNull::new(strip_tag(tagged)).map(|inner| ObjectRef { inner })
    }

    pub fn as_ptr(self) -> *mut Word {
        self.inner.as_ptr()
    }

    pub fn tagged(self) -> Word {
        apply_tag(self.as_ptr())
    }

    /// Reads the object's header
    ///
    /// # Safety
    ///
    /// The object must be readable.
    pub unsafe fn header(self) -> Header {
        Header::decode(ptr::read(self.as_ptr()))
    }

    /// Returns the payload length of an unforwarded object
    ///
    /// # Safety
    ///
    /// The object must be readable and not yet forwarded.
    pub unsafe fn len(self) -> usize {
        match self.header() {
            Header::Unforwarded { len } => len,
            Header::Forwarded { .. } => panic!("length of forwarded object {:?}", self),
        }
    }

    /// Reads the payload word at `index`
    ///
    /// # Safety
    ///
    /// The object must be readable and `index` must be less than its length.
    pub unsafe fn field(self, index: usize) -> Value {
        ptr::read(self.as_ptr().add(1 + index)).decode()
    }

    /// Writes the payload word at `index`
    ///
    /// # Safety
    ///
    /// The object must be writable and `index` must be less than its length.
    pub unsafe fn set_field(self, index: usize, value: Value) {
        ptr::write(self.as_ptr().add(1 + index), value.encode())
    }

    /// Returns all payload values in order
    ///
    /// # Safety
    ///
    /// The object must be readable and not yet forwarded.
    pub unsafe fn fields(self) -> Vec<Value> {
        (0..self.len()).map(|index| self.field(index)).collect()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "ObjectRef({:p})", self.as_ptr())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn immediate_encoding() {
        for &value in &[0, 1, -1, 10000, -12345, i64::MAX >> 1, i64::MIN >> 1] {
            let word = Value::Immediate(value).encode();

            assert_eq!(false, word.is_tagged());
            assert_eq!(value << 1, word.to_raw());
            assert_eq!(Value::Immediate(value), word.decode());
        }
    }

    #[test]
    fn tag_round_trip() {
        let mut cells = [Word::ZERO; 4];

        for cell in cells.iter_mut() {
            let object_ptr = cell as *mut Word;
            let tagged = apply_tag(object_ptr);

            assert_eq!(true, tagged.is_tagged());
            assert_eq!(object_ptr as i64 + 1, tagged.to_raw());
            assert_eq!(object_ptr, strip_tag(tagged));
        }
    }

    #[test]
    fn reference_decoding() {
        let mut cell = Header::Unforwarded { len: 0 }.encode();
        let object_ref = unsafe { ObjectRef::new(&mut cell) };

        let word = Value::Reference(object_ref).encode();
        assert_eq!(Value::Reference(object_ref), word.decode());
        assert_eq!(Some(object_ref), word.decode().as_reference());
        assert_eq!(None, word.decode().as_immediate());
    }

    #[test]
    fn header_encoding() {
        let mut cells = [Word::ZERO; 3];
        let new_location = unsafe { ObjectRef::new(&mut cells[1]) };

        let unforwarded = Header::Unforwarded { len: 2 };
        assert_eq!(4, unforwarded.encode().to_raw());
        assert_eq!(unforwarded, Header::decode(unforwarded.encode()));

        let forwarded = Header::Forwarded { new_location };
        assert_eq!(new_location.tagged(), forwarded.encode());
        assert_eq!(forwarded, Header::decode(forwarded.encode()));
    }

    #[test]
    fn tag_bit_tests() {
        let mut object = [Header::Unforwarded { len: 1 }.encode(), Word::ZERO];
        let mut copy = [Word::ZERO; 2];

        let object_ptr: *mut Word = object.as_mut_ptr();
        let mut slot = apply_tag(object_ptr);

        unsafe {
            assert_eq!(true, is_reference(&slot));
            assert_eq!(false, is_forwarded(object_ptr));
        }

        object[0] = apply_tag(copy.as_mut_ptr());
        slot = Value::Immediate(7).encode();

        unsafe {
            assert_eq!(false, is_reference(&slot));
            assert_eq!(true, is_forwarded(object.as_ptr()));
        }
    }

    #[test]
    fn object_fields() {
        let mut cells = [
            Header::Unforwarded { len: 2 }.encode(),
            Value::Immediate(10000).encode(),
            Value::Immediate(10001).encode(),
        ];
        let object_ref = unsafe { ObjectRef::new(cells.as_mut_ptr()) };

        unsafe {
            assert_eq!(2, object_ref.len());
            assert_eq!(
                vec![Value::Immediate(10000), Value::Immediate(10001)],
                object_ref.fields()
            );

            object_ref.set_field(1, Value::Reference(object_ref));
            assert_eq!(Value::Reference(object_ref), object_ref.field(1));
        }
    }
}
