use std::fmt::{Debug, Error, Formatter};
use std::iter::{DoubleEndedIterator, Enumerate, FromIterator};
use std::ops::Sub;
use std::result::Result;
use std::slice::Iter;

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are given in
/// terms of the sum of the widths of the previous elements (as opposed to the number of preceding
/// elements).
///
/// Two places in a class file are addressed this way:
///
///   - the constant pool (most entries have width 1, but `long` and `double` have width 2)
///   - method code (instructions are addressed by their byte offset in the code array)
///
/// For the constant pool, the width is a property of the element. For decoded code, the width
/// is whatever the decoder consumed (the same instruction may have several encodings), so that
/// case goes through `push_sized`.
#[derive(Clone)]
pub struct OffsetVec<T: Sized> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,

    /// Offset for the first element (usually 0, but 1 for the constant pool)
    initial_offset: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

impl<T: Sized> OffsetVec<T> {
    /// New empty offset vector
    pub fn new() -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: Offset(0),
            initial_offset: Offset(0),
        }
    }

    /// New empty offset vector, with a custom starting offset
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
            initial_offset,
        }
    }

    /// Length of the `OffsetVec` (aka. number of entries)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current offset size of the `OffsetVec` (aka. offset of the next element
    /// to be added)
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Offset of the first element
    pub fn initial_offset(&self) -> Offset {
        self.initial_offset
    }

    /// Add an entry to the back, occupying an explicitly given width
    pub fn push_sized(&mut self, slot: T, width: usize) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += width;
        self.entries.push((offset, slot));

        offset
    }

    /// Get an entry (and its index) by its offset in the vector
    ///
    /// Note: this uses binary search to find the offset
    pub fn get_offset(&self, offset: Offset) -> OffsetResult<'_, T> {
        match self.entries.binary_search_by_key(&offset, |(off, _)| *off) {
            Err(insert_at) if insert_at == self.entries.len() => OffsetResult::TooLarge,
            Err(insert_at) => OffsetResult::InvalidOffset(insert_at),
            Ok(found_idx) => OffsetResult::Ok(found_idx, &self.entries[found_idx].1),
        }
    }

    /// Get an entry (and its offset) by its position in the vector
    pub fn get_index(&self, index: usize) -> Option<(Offset, &T)> {
        self.entries.get(index).map(|(offset, t)| (*offset, t))
    }

    pub fn iter(&self) -> OffsetVecIter<'_, T> {
        self.into_iter()
    }
}

impl<T: Sized + Width> OffsetVec<T> {
    /// Add an entry to the back
    pub fn push(&mut self, slot: T) -> Offset {
        let width = slot.width();
        self.push_sized(slot, width)
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<A: Eq> Eq for OffsetVec<A> {}

impl<A> Default for OffsetVec<A> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

pub enum OffsetResult<'a, T> {
    /// Element was accessed
    Ok(usize, &'a T),

    /// Offset was invalid, and falls in the middle of the element at this index
    InvalidOffset(usize),

    /// Offset is too big
    TooLarge,
}

impl<'a, T> OffsetResult<'a, T> {
    /// Convert to an `Option` and keep only the value found
    pub fn ok(&self) -> Option<&'a T> {
        match self {
            OffsetResult::Ok(_, found) => Some(found),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => None,
        }
    }

    /// Convert to an `Option` and keep only the index found
    pub fn index(&self) -> Option<usize> {
        match self {
            OffsetResult::Ok(idx, _) => Some(*idx),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => None,
        }
    }
}

/// Iterator for borrowed `OffsetVec`
pub struct OffsetVecIter<'a, T>(Enumerate<Iter<'a, (Offset, T)>>);

impl<'a, T> Iterator for OffsetVecIter<'a, T> {
    type Item = (Offset, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(idx, (off, elem))| (*off, idx, elem))
    }
}

impl<'a, T> DoubleEndedIterator for OffsetVecIter<'a, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0
            .next_back()
            .map(|(idx, (off, elem))| (*off, idx, elem))
    }
}

impl<'a, T> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, usize, &'a T);
    type IntoIter = OffsetVecIter<'a, T>;

    fn into_iter(self) -> OffsetVecIter<'a, T> {
        OffsetVecIter(self.entries.iter().enumerate())
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut offset_vec = OffsetVec::new();
        for elem in elems {
            offset_vec.push(elem);
        }
        offset_vec
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Entry {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Entry {
        fn width(&self) -> usize {
            match self {
                Entry::Narrow(_) => 1,
                Entry::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn constant_pool_style_offsets() {
        let mut pool: OffsetVec<Entry> = OffsetVec::new_starting_at(Offset(1));
        pool.push(Entry::Narrow(1));
        pool.push(Entry::Wide(2));
        pool.push(Entry::Narrow(3));

        let offsets: Vec<usize> = pool.iter().map(|(off, _, _)| off.0).collect();
        assert_eq!(offsets, vec![1, 2, 4]);
        assert_eq!(pool.offset_len(), Offset(5));

        assert_eq!(pool.get_offset(Offset(2)).ok(), Some(&Entry::Wide(2)));
        assert!(matches!(pool.get_offset(Offset(3)), OffsetResult::InvalidOffset(2)));
        assert!(matches!(pool.get_offset(Offset(5)), OffsetResult::TooLarge));
    }

    #[test]
    fn explicitly_sized_entries() {
        let mut code: OffsetVec<&'static str> = OffsetVec::new();
        code.push_sized("iconst_0", 1);
        code.push_sized("tableswitch", 24);
        code.push_sized("return", 1);

        assert_eq!(code.get_offset(Offset(25)).ok(), Some(&"return"));
        assert_eq!(code.get_offset(Offset(1)).index(), Some(1));
        assert_eq!(code.get_index(2), Some((Offset(25), &"return")));
        assert!(code.get_offset(Offset(7)).ok().is_none());
    }
}
