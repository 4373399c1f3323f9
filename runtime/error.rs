use std::error;
use std::fmt;
use std::fmt::Display;
use std::result;

/// Garbage collector error
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Error {
        Error { kind }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns true if this error was caused by the underlying allocator
    pub fn is_allocation_failure(&self) -> bool {
        match self.kind {
            ErrorKind::AllocationFailure { .. } => true,
            _ => false,
        }
    }
}

impl error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind().message())
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::new(kind)
    }
}

impl From<Violation> for Error {
    fn from(violation: Violation) -> Error {
        Error::new(ErrorKind::ContractViolation(violation))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// A space of `words` words could not be obtained
    AllocationFailure { words: usize },
    /// The destination space ran out of room while copying
    ToSpaceOverflow { needed: usize, available: usize },
    /// A root or object broke the tagging convention
    ///
    /// This is only detected when validation is enabled.
    ContractViolation(Violation),
}

impl ErrorKind {
    /// Returns a string describing the error
    pub fn message(&self) -> String {
        match self {
            ErrorKind::AllocationFailure { words } => format!(
                "garbage collector ran out of memory allocating a space of {} words",
                words
            ),
            ErrorKind::ToSpaceOverflow { needed, available } => format!(
                "to-space overflow copying {} words with {} words available",
                needed, available
            ),
            ErrorKind::ContractViolation(violation) => violation.message(),
        }
    }
}

/// Broken caller contract found by checked collection
///
/// Addresses are recorded as integers for reporting; they are never dereferenced.
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    MisalignedReference { address: usize },
    ReferenceOutsideFromSpace { address: usize },
    ReferenceIntoToSpace { address: usize },
    ObjectOverrunsFromSpace { address: usize, len: usize },
    ForwardedOutsideToSpace { address: usize, new_address: usize },
    FreePointerOutsideFromSpace { address: usize },
}

impl Violation {
    pub fn message(&self) -> String {
        match self {
            Violation::MisalignedReference { address } => {
                format!("tagged reference to misaligned address {:#x}", address)
            }
            Violation::ReferenceOutsideFromSpace { address } => format!(
                "tagged reference to {:#x} is outside the allocated from-space",
                address
            ),
            Violation::ReferenceIntoToSpace { address } => {
                format!("tagged reference to {:#x} points in to to-space", address)
            }
            Violation::ObjectOverrunsFromSpace { address, len } => format!(
                "object at {:#x} with length {} extends past the allocated from-space",
                address, len
            ),
            Violation::ForwardedOutsideToSpace {
                address,
                new_address,
            } => format!(
                "object at {:#x} is forwarded to {:#x} outside to-space",
                address, new_address
            ),
            Violation::FreePointerOutsideFromSpace { address } => {
                format!("free pointer {:#x} is outside from-space", address)
            }
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
