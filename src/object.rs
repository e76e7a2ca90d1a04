// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object header and reference counting
//!
//! Every kernel object this crate manages (thread, process, timer,
//! event, mutex, semaphore, wait block) embeds an `ObjectHeader`. The
//! header tracks a type tag and an atomic refcount that is deliberate
//! and separate from the backing `Arc`'s strong count: callers hand
//! out references with `ObjRef::clone`, and the type-specific
//! destructor only runs when the *last* such reference drops, not
//! merely when the last in-tree `Arc` drops. This is what lets a
//! thread be unlinked from every registry while a caller still holds
//! a reference to it.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

/// Discriminant for the kinds of object this crate manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Thread,
    Process,
    Timer,
    Event,
    Mutex,
    Semaphore,
    WaitBlock,
}

/// Capability rights bitmask. The execution core does not enforce
/// these itself (handle tables are IPC/security's concern), but the
/// header carries a default mask per object type so that layer can be
/// built on top without reshaping this header later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rights(pub u32);

impl Rights {
    pub const NONE: Self = Self(0x00);
    pub const READ: Self = Self(0x01);
    pub const WRITE: Self = Self(0x02);
    pub const SIGNAL: Self = Self(0x04);
    pub const WAIT: Self = Self(0x08);
    pub const DUPLICATE: Self = Self(0x10);
    pub const MANAGE: Self = Self(0x20);
    pub const DEFAULT: Self = Self(0x1F);

    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn default_for(object_type: ObjectType) -> Self {
        match object_type {
            ObjectType::Thread | ObjectType::Process => Self::MANAGE,
            ObjectType::Timer => Self::SIGNAL | Self::WRITE,
            ObjectType::Event | ObjectType::Mutex | ObjectType::Semaphore => {
                Self::SIGNAL | Self::WAIT
            }
            ObjectType::WaitBlock => Self::NONE,
        }
    }
}

impl core::ops::BitOr for Rights {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Common prefix for every reference-counted kernel object.
pub struct ObjectHeader {
    object_type: ObjectType,
    refcount: AtomicU32,
    flags: AtomicU32,
}

impl ObjectHeader {
    /// Refcount starts at 1: the creator's own reference.
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            refcount: AtomicU32::new(1),
            flags: AtomicU32::new(0),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Relaxed)
    }

    pub fn set_flags(&self, flags: u32) {
        self.flags.store(flags, Ordering::Relaxed);
    }

    /// Increments the refcount. Overflow is unreachable in practice
    /// (bounded by the number of live references the system can hold).
    pub(crate) fn reference(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the refcount. Returns `true` exactly once, for the
    /// caller that drove it from 1 to 0 and is therefore responsible
    /// for invoking the type-specific destructor.
    pub(crate) fn dereference(&self) -> bool {
        self.refcount.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

/// Implemented by every object that embeds an `ObjectHeader`, so
/// `ObjRef` can find it without knowing the concrete type.
pub trait KernelObject {
    fn header(&self) -> &ObjectHeader;

    /// Invoked exactly once, when the last `ObjRef` to this object is
    /// dropped. Default does nothing; override to release per-type
    /// resources (owned stacks, TLS storage, drained wait queues).
    fn destroy(&self) {}
}

/// A manually-refcounted handle to a kernel object, layered on top of
/// an `Arc` so the backing allocation is freed once both the header's
/// refcount and the `Arc`'s strong count reach zero -- whichever
/// happens last. Cloning an `ObjRef` increments the header's refcount;
/// dropping it decrements, invoking `destroy()` on the transition to
/// zero.
pub struct ObjRef<T: KernelObject + ?Sized>(Arc<T>);

impl<T: KernelObject + ?Sized> ObjRef<T> {
    /// Wraps a freshly created object. Does not increment the
    /// refcount: `ObjectHeader::new` already accounts for this, the
    /// first, reference.
    pub fn new(inner: Arc<T>) -> Self {
        Self(inner)
    }

    pub fn as_arc(&self) -> &Arc<T> {
        &self.0
    }
}

impl<T: KernelObject + ?Sized> Clone for ObjRef<T> {
    fn clone(&self) -> Self {
        self.0.header().reference();
        Self(self.0.clone())
    }
}

impl<T: KernelObject + ?Sized> core::ops::Deref for ObjRef<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: KernelObject + ?Sized> Drop for ObjRef<T> {
    fn drop(&mut self) {
        if self.0.header().dereference() {
            self.0.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering as O};

    struct Probe {
        header: ObjectHeader,
        destroyed: AtomicUsize,
    }

    impl KernelObject for Probe {
        fn header(&self) -> &ObjectHeader {
            &self.header
        }

        fn destroy(&self) {
            self.destroyed.fetch_add(1, O::SeqCst);
        }
    }

    #[test]
    fn destructor_fires_once_on_last_reference() {
        let probe = Arc::new(Probe {
            header: ObjectHeader::new(ObjectType::Thread),
            destroyed: AtomicUsize::new(0),
        });
        let shared_counter = probe.clone();

        let r1 = ObjRef::new(probe);
        let r2 = r1.clone();
        let r3 = r2.clone();
        assert_eq!(r1.header().refcount(), 3);

        drop(r3);
        assert_eq!(shared_counter.destroyed.load(O::SeqCst), 0);
        drop(r2);
        assert_eq!(shared_counter.destroyed.load(O::SeqCst), 0);
        drop(r1);
        assert_eq!(shared_counter.destroyed.load(O::SeqCst), 1);
    }

    #[test]
    fn default_rights_by_type() {
        assert_eq!(Rights::default_for(ObjectType::Thread), Rights::MANAGE);
        assert!(Rights::default_for(ObjectType::Event).contains(Rights::WAIT));
    }
}
