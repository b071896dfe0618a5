use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Handle returned by the arena allocator.
///
/// Handles carry the arena generation they were issued in; after [`Arena::clear`] old
/// handles stop resolving instead of aliasing newly allocated entries.
pub struct ArenaHandle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ArenaHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArenaHandle<T> {}

impl<T> PartialEq for ArenaHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for ArenaHandle<T> {}

impl<T> Hash for ArenaHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for ArenaHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaHandle({}@{})", self.index, self.generation)
    }
}

impl<T> ArenaHandle<T> {
    fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Bump allocation arena with bulk release.
#[derive(Debug)]
pub struct Arena<T> {
    entries: Vec<T>,
    generation: u32,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            generation: 0,
        }
    }

    pub fn allocate(&mut self, value: T) -> ArenaHandle<T> {
        let handle = ArenaHandle::new(self.entries.len(), self.generation);
        self.entries.push(value);
        handle
    }

    pub fn get(&self, handle: ArenaHandle<T>) -> Option<&T> {
        if handle.generation != self.generation {
            return None;
        }
        self.entries.get(handle.index())
    }

    pub fn get_mut(&mut self, handle: ArenaHandle<T>) -> Option<&mut T> {
        if handle.generation != self.generation {
            return None;
        }
        self.entries.get_mut(handle.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Releases every entry and invalidates outstanding handles.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation = self.generation.wrapping_add(1);
    }
}
