//! Module: buffer::toast
//! Responsibility: shared storage for out-of-line (variable-length) values.
//! Does not own: which cells reference which values.
//! Boundary: immutable once built; buffers share it through `Arc`.

///
/// ToastRef
///
/// Packed reference stored in a variable-length cell: offset in the high
/// 32 bits, byte length in the low 32 bits.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ToastRef {
    pub offset: u32,
    pub len: u32,
}

impl ToastRef {
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            offset: (bits >> 32) as u32,
            len: bits as u32,
        }
    }

    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.offset as u64) << 32) | self.len as u64
    }
}

///
/// ToastArena
///

#[derive(Clone, Debug, Default)]
pub struct ToastArena {
    data: Vec<u8>,
}

impl ToastArena {
    #[must_use]
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Append one value and return its reference.
    ///
    /// Returns `None` when the arena would outgrow 32-bit offsets.
    pub fn push(&mut self, value: &str) -> Option<ToastRef> {
        let offset = u32::try_from(self.data.len()).ok()?;
        let len = u32::try_from(value.len()).ok()?;
        offset.checked_add(len)?;
        self.data.extend_from_slice(value.as_bytes());

        Some(ToastRef { offset, len })
    }

    /// Resolve one reference; `None` if it does not land on a valid value.
    #[must_use]
    pub fn get(&self, reference: ToastRef) -> Option<&str> {
        let start = reference.offset as usize;
        let end = start.checked_add(reference.len as usize)?;
        let bytes = self.data.get(start..end)?;

        std::str::from_utf8(bytes).ok()
    }

    #[must_use]
    pub fn contains(&self, reference: ToastRef) -> bool {
        self.get(reference).is_some()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
