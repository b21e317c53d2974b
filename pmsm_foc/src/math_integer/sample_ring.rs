// Licensed under the Apache License, Version 2.0
// Copyright 2024 Anton Khrustalev, creapunk.com

/// Fixed-depth history of the most recent samples.
///
/// `N` must be a power of two. The write index always points at the newest
/// sample; the oldest one sits at `(index - (N - 1)) & (N - 1)`, which for the
/// 4-deep current history is the classic `(counter - 3) & 3`.
#[derive(Clone, Copy, Debug)]
pub struct SampleRing<T, const N: usize> {
    buffer: [T; N],
    idx: usize,
}

impl<T, const N: usize> SampleRing<T, N>
where
    T: Default + Copy,
{
    const MASK: usize = {
        assert!(N.is_power_of_two(), "SampleRing depth must be a power of two");
        N - 1
    };

    pub fn new() -> Self {
        Self {
            buffer: [T::default(); N],
            idx: 0,
        }
    }

    /// Advances the write index and stores `value` as the newest sample
    pub fn push(&mut self, value: T) {
        self.idx = (self.idx + 1) & Self::MASK;
        self.buffer[self.idx] = value;
    }

    /// Sample written by the last `push`
    pub fn latest(&self) -> T {
        self.buffer[self.idx]
    }

    /// Sample written `N - 1` pushes before the latest one
    pub fn oldest(&self) -> T {
        self.buffer[self.idx.wrapping_sub(N - 1) & Self::MASK]
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl<T: Default + Copy, const N: usize> Default for SampleRing<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
