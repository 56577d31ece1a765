use std::{
    hint,
    sync::atomic::{AtomicU8, AtomicU64, Ordering},
};

const STATE_NULL: u8 = 0;
const STATE_PUBLISHING: u8 = 1;
const STATE_VALUE: u8 = 2;

///
/// AtomicDatum
///
/// One nullable 64-bit cell that many threads may merge into concurrently.
///
/// A null cell becomes non-null exactly once: the first writer moves the
/// state to `PUBLISHING`, stores the word, then releases `VALUE`. After
/// that, updates are plain compare-and-swap retries on the word. A cell
/// never returns to null through `update`.
///

#[derive(Debug)]
pub struct AtomicDatum {
    state: AtomicU8,
    bits: AtomicU64,
}

impl AtomicDatum {
    #[must_use]
    pub const fn null() -> Self {
        Self {
            state: AtomicU8::new(STATE_NULL),
            bits: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn new(value: Option<u64>) -> Self {
        match value {
            Some(bits) => Self {
                state: AtomicU8::new(STATE_VALUE),
                bits: AtomicU64::new(bits),
            },
            None => Self::null(),
        }
    }

    /// Observe the current word, or `None` while null.
    #[must_use]
    pub fn load(&self) -> Option<u64> {
        loop {
            match self.state.load(Ordering::Acquire) {
                STATE_NULL => return None,
                STATE_VALUE => return Some(self.bits.load(Ordering::Acquire)),
                _ => hint::spin_loop(),
            }
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.load().is_none()
    }

    /// Overwrite the cell.
    ///
    /// Only valid while the caller is the sole writer of this cell for the
    /// current phase (a barrier separates it from concurrent merges).
    pub fn store(&self, value: Option<u64>) {
        match value {
            Some(bits) => {
                self.bits.store(bits, Ordering::Relaxed);
                self.state.store(STATE_VALUE, Ordering::Release);
            }
            None => {
                self.state.store(STATE_NULL, Ordering::Release);
                self.bits.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Read-modify-write with a retry loop.
    ///
    /// `f` maps the observed word to the desired word; returning `None`
    /// (or the observed word) leaves the cell untouched. `f` may run more
    /// than once under contention and must be free of side effects other
    /// than recording its latest outcome.
    pub fn update<E>(
        &self,
        mut f: impl FnMut(Option<u64>) -> Result<Option<u64>, E>,
    ) -> Result<(), E> {
        loop {
            match self.state.load(Ordering::Acquire) {
                STATE_NULL => {
                    let Some(next) = f(None)? else {
                        return Ok(());
                    };
                    if self
                        .state
                        .compare_exchange(
                            STATE_NULL,
                            STATE_PUBLISHING,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        self.bits.store(next, Ordering::Relaxed);
                        self.state.store(STATE_VALUE, Ordering::Release);
                        return Ok(());
                    }
                }
                STATE_VALUE => {
                    let current = self.bits.load(Ordering::Acquire);
                    let Some(next) = f(Some(current))? else {
                        return Ok(());
                    };
                    if next == current {
                        return Ok(());
                    }
                    if self
                        .bits
                        .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return Ok(());
                    }
                }
                _ => hint::spin_loop(),
            }
        }
    }
}

impl Default for AtomicDatum {
    fn default() -> Self {
        Self::null()
    }
}
