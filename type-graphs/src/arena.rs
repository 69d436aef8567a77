// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2024, type-graphs authors.
// Licensed under either of Apache License, Version 2.0, or MIT license, at your option.
// Please see the LICENSE-APACHE or LICENSE-MIT files in this distribution for license details.
// ------------------------------------------------------------------------------------------------

//! Id-addressed arena storage for type graph data.
//!
//! Type graphs are directed and frequently cyclic: a struct can contain a pointer to itself, two
//! structs can point at each other, and so on.  Instead of modelling those edges with owning or
//! reference-counted pointers, every node lives in an [`Arena<T>`][`Arena`] owned by its graph, and
//! every edge is a [`Handle<T>`][`Handle`], a small non-zero integer that indexes into that arena.
//! Handles are just numbers, so they can be copied freely, compared cheaply, stored in side tables,
//! and used to describe edges whose target hasn't been created yet.
//!
//! Unlike a plain vector, an [`Arena`][] lets the caller choose the index at which an item is
//! stored.  The merge algorithm relies on this: it allocates the ids of the nodes that it will
//! create before it creates any of them, so that nodes can refer to each other while they are
//! being built.
//!
//! Note that our arena implementation does not support deletion!  Any content that you add to a
//! [`TypeGraph`][] will live as long as the graph itself does.
//!
//! [`Arena`]: struct.Arena.html
//! [`Handle`]: struct.Handle.html
//! [`TypeGraph`]: ../graph/struct.TypeGraph.html

use std::fmt::Debug;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::ops::Index;
use std::ops::IndexMut;

use bitvec::vec::BitVec;

//-------------------------------------------------------------------------------------------------
// Arenas and handles

/// A handle to an instance of type `T` that was allocated from an [`Arena`][].
///
/// #### Safety
///
/// Because of the type parameter `T`, the compiler can ensure that you don't use a handle for one
/// type to index into an arena of another type.  However, if you have multiple arenas for the
/// _same type_ (and when merging type graphs, you always do), we do not do anything to ensure that
/// you only use a handle with the corresponding arena.
#[repr(transparent)]
pub struct Handle<T> {
    index: NonZeroU32,
    _phantom: PhantomData<T>,
}

impl<T> Handle<T> {
    pub(crate) fn new(index: NonZeroU32) -> Handle<T> {
        Handle {
            index,
            _phantom: PhantomData,
        }
    }

    /// Creates a handle from its raw index, which must be non-zero.
    pub fn from_u32(index: u32) -> Option<Handle<T>> {
        NonZeroU32::new(index).map(Handle::new)
    }

    #[inline(always)]
    pub fn as_u32(self) -> u32 {
        self.index.get()
    }

    #[inline(always)]
    pub fn as_usize(self) -> usize {
        self.index.get() as usize
    }
}

// Normally we would #[derive] all of these traits, but the auto-derived implementations all
// require that T implement the trait as well.  We don't store any real instances of T inside of
// Handle, so our implementations do _not_ require that.

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Handle<T> {
        Handle::new(self.index)
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> Display for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Handles are always Send and Sync, even if the underlying types are not.  After all, a handle is
// just a number!  And you _also_ need access to the Arena (which _won't_ be Send/Sync if T isn't)
// to dereference the handle.
unsafe impl<T> Send for Handle<T> {}
unsafe impl<T> Sync for Handle<T> {}

#[cfg(feature = "serde")]
impl<T> serde::Serialize for Handle<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.as_u32())
    }
}

#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for Handle<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let index = <u32 as serde::Deserialize>::deserialize(deserializer)?;
        Handle::from_u32(index).ok_or_else(|| serde::de::Error::custom("handle index must be non-zero"))
    }
}

/// Manages the life cycle of instances of type `T`, addressed by [`Handle`][]s.
///
/// Handles are dense starting from a configurable first index.  You can either append an instance
/// at the next free index with [`add`][], or place it at an index that you have reserved ahead of
/// time with [`insert`][].
///
/// [`Handle`]: struct.Handle.html
/// [`add`]: #method.add
/// [`insert`]: #method.insert
pub struct Arena<T> {
    first: u32,
    items: Vec<Option<T>>,
    count: usize,
}

impl<T> Arena<T> {
    /// Creates a new arena whose first handle has index 1.
    pub fn new() -> Arena<T> {
        Arena::starting_at(NonZeroU32::MIN)
    }

    /// Creates a new arena whose handles start at `first`.  Indexes below `first` can never be
    /// stored in this arena.
    pub fn starting_at(first: NonZeroU32) -> Arena<T> {
        Arena {
            first: first.get(),
            items: Vec::new(),
            count: 0,
        }
    }

    /// Returns the index of the first handle that can be stored in this arena.
    pub fn first_index(&self) -> u32 {
        self.first
    }

    /// Returns the handle that the next call to [`add`][] will return.
    ///
    /// [`add`]: #method.add
    pub fn next_handle(&self) -> Handle<T> {
        let index = self.first + self.items.len() as u32;
        Handle::new(unsafe { NonZeroU32::new_unchecked(index) })
    }

    /// Adds a new instance to this arena after every instance already in it, returning a stable
    /// handle to it.
    ///
    /// Note that we do not deduplicate instances of `T` in any way.  If you add two instances that
    /// have the same content, you will get distinct handles for each one.
    pub fn add(&mut self, item: T) -> Handle<T> {
        let handle = self.next_handle();
        self.items.push(Some(item));
        self.count += 1;
        handle
    }

    /// Stores an instance at a specific handle.  If that handle is already occupied (or lies before
    /// the first handle of this arena), the instance is handed back unchanged.
    pub fn insert(&mut self, handle: Handle<T>, item: T) -> Result<(), T> {
        let slot = match self.slot(handle) {
            Some(slot) => slot,
            None => return Err(item),
        };
        if self.items.len() <= slot {
            self.items.resize_with(slot + 1, || None);
        }
        if self.items[slot].is_some() {
            return Err(item);
        }
        self.items[slot] = Some(item);
        self.count += 1;
        Ok(())
    }

    #[inline(always)]
    fn slot(&self, handle: Handle<T>) -> Option<usize> {
        handle
            .as_u32()
            .checked_sub(self.first)
            .map(|slot| slot as usize)
    }

    /// Returns whether there is an instance stored at `handle`.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Dereferences a handle to an instance owned by this arena, returning a reference to it.
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slot(handle)
            .and_then(|slot| self.items.get(slot))
            .and_then(Option::as_ref)
    }

    /// Dereferences a handle to an instance owned by this arena, returning a mutable reference to
    /// it.
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        match self.slot(handle) {
            Some(slot) => self.items.get_mut(slot).and_then(Option::as_mut),
            None => None,
        }
    }

    /// Returns an iterator of all of the handles in this arena, in increasing order.  (Note that
    /// this iterator does not retain a reference to the arena!)
    pub fn iter_handles(&self) -> impl Iterator<Item = Handle<T>> {
        self.iter()
            .map(|(handle, _)| handle)
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Returns an iterator of all of the instances in this arena, in increasing handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        let first = self.first;
        self.items.iter().enumerate().filter_map(move |(slot, item)| {
            item.as_ref().map(|item| {
                let index = first + slot as u32;
                (Handle::new(unsafe { NonZeroU32::new_unchecked(index) }), item)
            })
        })
    }

    /// Returns an iterator of mutable references to all of the instances in this arena, in
    /// increasing handle order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> + '_ {
        let first = self.first;
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(move |(slot, item)| {
                item.as_mut().map(|item| {
                    let index = first + slot as u32;
                    (Handle::new(unsafe { NonZeroU32::new_unchecked(index) }), item)
                })
            })
    }

    /// Returns the number of instances stored in this arena.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena::new()
    }
}

impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;
    fn index(&self, handle: Handle<T>) -> &T {
        match self.get(handle) {
            Some(item) => item,
            None => panic!("no instance stored at handle {}", handle),
        }
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        match self.get_mut(handle) {
            Some(item) => item,
            None => panic!("no instance stored at handle {}", handle),
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Supplemental arenas

/// A supplemental arena lets you store additional data about some data type that is itself stored
/// in an [`Arena`][].  The merge algorithm uses these as side tables keyed by node id: id mappings,
/// equivalence marks, and visit generations.
///
/// We implement `Index` and `IndexMut` for a more ergonomic syntax.  In an _immutable_ context,
/// indexing a handle that has no data yet returns a reference to a shared `Default` value.  In a
/// _mutable_ context, we automatically create a `Default` instance of the type if there isn't
/// already an instance for that handle in the arena.
///
/// ```
/// # use type_graphs::arena::Arena;
/// # use type_graphs::arena::SupplementalArena;
/// // We need an Arena to create handles.
/// let mut arena = Arena::<u32>::new();
/// let handle = arena.add(1);
///
/// let mut supplemental = SupplementalArena::<u32, String>::new();
/// assert_eq!(supplemental.get(handle), None);
///
/// supplemental[handle] = "hello".to_string();
/// assert_eq!(supplemental[handle].as_str(), "hello");
/// ```
///
/// [`Arena`]: struct.Arena.html
pub struct SupplementalArena<H, T> {
    items: Vec<T>,
    default: T,
    _phantom: PhantomData<H>,
}

impl<H, T> SupplementalArena<H, T>
where
    T: Default,
{
    /// Creates a new, empty supplemental arena.
    pub fn new() -> SupplementalArena<H, T> {
        SupplementalArena {
            items: Vec::new(),
            default: T::default(),
            _phantom: PhantomData,
        }
    }

    /// Clear the supplemental arena, keeping underlying allocated capacity.
    #[inline(always)]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Returns the item belonging to a particular handle, if it has been created.
    pub fn get(&self, handle: Handle<H>) -> Option<&T> {
        self.items.get(handle.as_usize())
    }

    /// Returns a mutable reference to the item belonging to a particular handle, creating it first
    /// (using the type's `Default` implementation) if it doesn't already exist.
    pub fn get_mut_or_default(&mut self, handle: Handle<H>) -> &mut T {
        let index = handle.as_usize();
        if self.items.len() <= index {
            self.items.resize_with(index + 1, T::default);
        }
        &mut self.items[index]
    }

    /// Returns the number of slots currently allocated in this arena.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<H, T> Default for SupplementalArena<H, T>
where
    T: Default,
{
    fn default() -> SupplementalArena<H, T> {
        SupplementalArena::new()
    }
}

impl<H, T> Index<Handle<H>> for SupplementalArena<H, T>
where
    T: Default,
{
    type Output = T;
    fn index(&self, handle: Handle<H>) -> &T {
        self.get(handle).unwrap_or(&self.default)
    }
}

impl<H, T> IndexMut<Handle<H>> for SupplementalArena<H, T>
where
    T: Default,
{
    fn index_mut(&mut self, handle: Handle<H>) -> &mut T {
        self.get_mut_or_default(handle)
    }
}

//-------------------------------------------------------------------------------------------------
// Handle sets

/// Contains a set of handles, encoded efficiently using a bit set.
pub struct HandleSet<T> {
    elements: BitVec<u32, bitvec::order::Lsb0>,
    _phantom: PhantomData<T>,
}

impl<T> HandleSet<T> {
    /// Creates a new, empty handle set.
    pub fn new() -> HandleSet<T> {
        HandleSet::default()
    }

    /// Removes all elements from this handle set.
    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// Returns whether this set contains a particular handle.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        let index = handle.as_usize();
        self.elements.get(index).map(|bit| *bit).unwrap_or(false)
    }

    /// Adds a handle to this set.  Returns whether the handle was newly added.
    pub fn add(&mut self, handle: Handle<T>) -> bool {
        let index = handle.as_usize();
        if self.elements.len() <= index {
            self.elements.resize(index + 1, false);
        }
        let was_present = self.elements[index];
        self.elements.set(index, true);
        !was_present
    }

    /// Removes a handle from this set.
    pub fn remove(&mut self, handle: Handle<T>) {
        let index = handle.as_usize();
        if index < self.elements.len() {
            self.elements.set(index, false);
        }
    }

    /// Returns an iterator of all of the handles in this set, in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        self.elements
            .iter_ones()
            .map(|index| Handle::new(unsafe { NonZeroU32::new_unchecked(index as u32) }))
    }

    /// Returns the number of handles in this set.
    pub fn len(&self) -> usize {
        self.elements.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.not_any()
    }
}

impl<T> Default for HandleSet<T> {
    fn default() -> HandleSet<T> {
        HandleSet {
            elements: BitVec::default(),
            _phantom: PhantomData,
        }
    }
}
