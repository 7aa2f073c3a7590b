//! # Interrupt Vector Table
//!
//! Maps each of the [`INTERRUPT_VECTORS`] vectors to an ordered list of
//! [`InterruptHook`]s. Hooks live in a fixed arena of
//! [`MAX_INTERRUPT_HOOKS`] nodes and are chained per vector by index, so
//! registering a hook never allocates:
//!
//! ```text
//! slots[vec] ─ head ─▶ node 3 ─▶ node 7 ─▶ NIL
//!            └ tail ──────────────┘
//! ```
//!
//! A slot goes from empty to hooked and stays there; there is no unhook.

use core::fmt;

/// Number of interrupt vectors.
pub const INTERRUPT_VECTORS: usize = 256;

/// Capacity of the hook arena, shared by all vectors.
pub const MAX_INTERRUPT_HOOKS: usize = 128;

const NIL: u16 = u16::MAX;

const _: () = assert!(MAX_INTERRUPT_HOOKS < NIL as usize);

/// CPU register state saved by the interrupt entry stub.
#[repr(C)]
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CpuState {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub vector: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Interrupt handler: trapped CPU state, hook parameter, raw vector number.
pub type InterruptHandler = fn(&mut CpuState, usize, u32);

/// A registered `(handler, parameter)` pair.
#[derive(Clone, Copy)]
pub struct InterruptHook {
    pub handler: InterruptHandler,
    pub param: usize,
}

impl InterruptHook {
    #[must_use]
    pub const fn new(handler: InterruptHandler, param: usize) -> Self {
        Self { handler, param }
    }
}

impl PartialEq for InterruptHook {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::fn_addr_eq(self.handler, other.handler) && self.param == other.param
    }
}

impl Eq for InterruptHook {}

impl fmt::Debug for InterruptHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptHook")
            .field("handler", &(self.handler as *const ()))
            .field("param", &self.param)
            .finish()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum HookError {
    #[error("interrupt vector {0} does not exist")]
    InvalidVector(u32),
    #[error("interrupt hook table is full")]
    TableFull,
}

#[derive(Clone, Copy)]
struct Slot {
    head: u16,
    tail: u16,
}

impl Slot {
    const EMPTY: Self = Self {
        head: NIL,
        tail: NIL,
    };
}

#[derive(Clone, Copy)]
struct Node {
    hook: InterruptHook,
    next: u16,
}

pub struct InterruptVectorTable {
    slots: [Slot; INTERRUPT_VECTORS],
    nodes: [Option<Node>; MAX_INTERRUPT_HOOKS],
    len: usize,
}

impl Default for InterruptVectorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptVectorTable {
    /// An empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [Slot::EMPTY; INTERRUPT_VECTORS],
            nodes: [None; MAX_INTERRUPT_HOOKS],
            len: 0,
        }
    }

    fn slot(&self, vector: u32) -> Option<&Slot> {
        self.slots.get(vector as usize)
    }

    /// Number of hooks registered across all vectors.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_hooked(&self, vector: u32) -> bool {
        self.slot(vector).is_some_and(|s| s.head != NIL)
    }

    /// Hooks of `vector` in registration order.
    #[must_use]
    pub fn hooks(&self, vector: u32) -> Hooks<'_> {
        Hooks {
            table: self,
            next: self.slot(vector).map_or(NIL, |s| s.head),
        }
    }

    /// Register `handler` with `param` on `vector`.
    ///
    /// Returns `Ok(false)` if the same pair is already registered there.
    ///
    /// # Errors
    /// [`HookError::InvalidVector`] or [`HookError::TableFull`].
    pub fn hook(
        &mut self,
        vector: u32,
        handler: InterruptHandler,
        param: usize,
    ) -> Result<bool, HookError> {
        let hook = InterruptHook::new(handler, param);
        if self.slot(vector).is_none() {
            return Err(HookError::InvalidVector(vector));
        }
        if self.hooks(vector).any(|h| *h == hook) {
            return Ok(false);
        }
        if self.len == MAX_INTERRUPT_HOOKS {
            return Err(HookError::TableFull);
        }

        #[allow(clippy::cast_possible_truncation)]
        let index = self.len as u16;
        self.nodes[self.len] = Some(Node { hook, next: NIL });
        self.len += 1;

        let slot = &mut self.slots[vector as usize];
        if slot.tail == NIL {
            slot.head = index;
        } else if let Some(tail) = self.nodes[usize::from(slot.tail)].as_mut() {
            tail.next = index;
        }
        slot.tail = index;
        Ok(true)
    }

    /// Invoke every hook of `vector` in registration order.
    ///
    /// Returns the number of hooks run.
    pub fn dispatch(&self, vector: u32, state: &mut CpuState) -> usize {
        let mut count = 0;
        for hook in self.hooks(vector) {
            (hook.handler)(state, hook.param, vector);
            count += 1;
        }
        count
    }
}

/// Iterator over the hooks of one vector.
pub struct Hooks<'a> {
    table: &'a InterruptVectorTable,
    next: u16,
}

impl<'a> Iterator for Hooks<'a> {
    type Item = &'a InterruptHook;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.table.nodes.get(usize::from(self.next))?.as_ref()?;
        self.next = node.next;
        Some(&node.hook)
    }
}

impl core::iter::FusedIterator for Hooks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_rax(state: &mut CpuState, param: usize, _vector: u32) {
        state.rax = state.rax * 10 + u64::try_from(param).unwrap();
    }

    fn set_rbx(state: &mut CpuState, _param: usize, vector: u32) {
        state.rbx = u64::from(vector);
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let mut table = InterruptVectorTable::new();
        assert!(table.hook(33, set_rax, 1).unwrap());
        assert!(table.hook(33, set_rax, 2).unwrap());
        assert!(table.hook(40, set_rax, 9).unwrap());
        assert!(table.hook(33, set_rax, 3).unwrap());

        let mut state = CpuState::default();
        assert_eq!(table.dispatch(33, &mut state), 3);
        assert_eq!(state.rax, 123);
    }

    #[test]
    fn duplicate_pair_is_ignored() {
        let mut table = InterruptVectorTable::new();
        assert!(table.hook(1, set_rax, 5).unwrap());
        assert!(!table.hook(1, set_rax, 5).unwrap());
        assert!(table.hook(1, set_rbx, 5).unwrap());
        assert_eq!(table.hooks(1).count(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn handlers_see_raw_vector() {
        let mut table = InterruptVectorTable::new();
        table.hook(255, set_rbx, 0).unwrap();
        let mut state = CpuState::default();
        table.dispatch(255, &mut state);
        assert_eq!(state.rbx, 255);
    }

    #[test]
    fn unhooked_and_invalid_vectors() {
        let mut table = InterruptVectorTable::new();
        assert!(!table.is_hooked(7));
        assert_eq!(table.dispatch(7, &mut CpuState::default()), 0);
        assert_eq!(table.dispatch(300, &mut CpuState::default()), 0);
        assert_eq!(
            table.hook(256, set_rax, 0),
            Err(HookError::InvalidVector(256))
        );
    }

    #[test]
    fn arena_exhaustion() {
        let mut table = InterruptVectorTable::new();
        for param in 0..MAX_INTERRUPT_HOOKS {
            table.hook(0, set_rax, param).unwrap();
        }
        assert_eq!(table.hook(1, set_rax, 0), Err(HookError::TableFull));
        // Duplicates still succeed when full.
        assert_eq!(table.hook(0, set_rax, 0), Ok(false));
    }
}
