use crate::{Error, Result};
use std::ops::Index;

/// A read-only window over a contiguous buffer owned by someone else.
///
/// The borrow on `data` keeps the backing buffer alive and unresized for as
/// long as any segment over it exists. Popping elements only moves the window;
/// the data stays where it is.
#[derive(Debug, Clone, Copy)]
pub struct ArraySegment<'a, T> {
    data: &'a [T],
    offset: usize,
    size: usize,
}

impl<'a, T> ArraySegment<'a, T> {
    /// Build a segment of `count` elements starting at `offset` in `data`.
    pub fn new(data: &'a [T], offset: usize, count: usize) -> Result<Self> {
        match offset.checked_add(count) {
            Some(end) if end <= data.len() => Ok(Self {
                data,
                offset,
                size: count,
            }),
            _ => Err(Error::SegmentOutOfRange {
                offset,
                count,
                len: data.len(),
            }),
        }
    }

    /// An empty segment at the start of `data`.
    pub fn empty(data: &'a [T]) -> Self {
        Self {
            data,
            offset: 0,
            size: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Offset of the first element of the window in the backing buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn get(&self, index: usize) -> Option<&'a T> {
        if index < self.size {
            self.data.get(self.offset + index)
        } else {
            None
        }
    }

    /// The elements currently in view.
    pub fn as_slice(&self) -> &'a [T] {
        &self.data[self.offset..self.offset + self.size]
    }

    /// Skip the first `count` elements. Fails without moving if `count > size()`.
    pub fn pop_front(&mut self, count: usize) -> Result<()> {
        if count > self.size {
            return Err(Error::PopOverflow {
                requested: count,
                available: self.size,
            });
        }
        self.offset += count;
        self.size -= count;
        Ok(())
    }
}

impl<T> Index<usize> for ArraySegment<'_, T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        assert!(
            index < self.size,
            "index {index} out of range for segment of {}",
            self.size
        );
        &self.data[self.offset + index]
    }
}
