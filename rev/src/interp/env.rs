//! Frame arena for variable bindings
//!
//! Scopes live in an arena and refer to their parent by [`FrameId`], a slot
//! index plus generation. Closures hold the id of their defining frame
//! instead of a pointer, so scope/closure cycles need no reference
//! counting. A frame is freed when its scope exits unless a closure
//! captured it; captured frames are reclaimed by [`FrameArena::collect`].

use super::value::Value;
use crate::scope::Binding;
use std::collections::HashMap;

/// Handle to a frame. Stale handles (to a freed slot) never resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Frame {
    parent: Option<FrameId>,
    bindings: HashMap<String, Binding<Value>>,
    /// Some closure refers to this frame or a descendant of it
    captured: bool,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    frame: Option<Frame>,
}

/// Why an assignment was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignError {
    Undefined,
    Immutable,
}

#[derive(Debug, Default)]
pub struct FrameArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl FrameArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty frame
    pub fn alloc(&mut self, parent: Option<FrameId>) -> FrameId {
        let frame = Frame {
            parent,
            bindings: HashMap::new(),
            captured: false,
        };
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.frame = Some(frame);
            return FrameId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            frame: Some(frame),
        });
        FrameId { index, generation: 0 }
    }

    fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.frame.as_ref())
    }

    fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.frame.as_mut())
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.frame(id).is_some()
    }

    /// Number of frames currently allocated
    pub fn live(&self) -> usize {
        self.live
    }

    fn free_slot(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        if slot.frame.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
            self.live -= 1;
        }
    }

    /// Scope exit. Captured frames stay until the next collection.
    pub fn release(&mut self, id: FrameId) {
        if self.frame(id).is_some_and(|f| !f.captured) {
            self.free_slot(id.index);
        }
    }

    /// A closure now refers to `id`; pin it and its ancestors
    pub fn mark_captured(&mut self, id: FrameId) {
        let mut current = Some(id);
        while let Some(frame) = current.and_then(|id| self.frame_mut(id)) {
            if frame.captured {
                break;
            }
            frame.captured = true;
            current = frame.parent;
        }
    }

    /// Define `name` in frame `id`, replacing any binding of the same name there
    pub fn define(&mut self, id: FrameId, name: impl Into<String>, binding: Binding<Value>) -> bool {
        match self.frame_mut(id) {
            Some(frame) => {
                frame.bindings.insert(name.into(), binding);
                true
            }
            None => false,
        }
    }

    /// Resolve `name` starting at frame `id` and walking outward
    pub fn lookup(&self, id: FrameId, name: &str) -> Option<&Binding<Value>> {
        let mut current = Some(id);
        while let Some(frame) = current.and_then(|id| self.frame(id)) {
            if let Some(binding) = frame.bindings.get(name) {
                return Some(binding);
            }
            current = frame.parent;
        }
        None
    }

    /// Overwrite the binding that `name` resolves to from frame `id`
    pub fn assign(&mut self, id: FrameId, name: &str, value: Value) -> Result<(), AssignError> {
        let mut current = Some(id);
        while let Some(frame_id) = current {
            let frame = self.frame_mut(frame_id).ok_or(AssignError::Undefined)?;
            if let Some(binding) = frame.bindings.get_mut(name) {
                if !binding.mutable {
                    return Err(AssignError::Immutable);
                }
                binding.value = value;
                return Ok(());
            }
            current = frame.parent;
        }
        Err(AssignError::Undefined)
    }

    /// Bindings of a single frame, sorted by name
    pub fn bindings(&self, id: FrameId) -> Vec<(&str, &Binding<Value>)> {
        let mut entries: Vec<_> = self
            .frame(id)
            .map(|f| f.bindings.iter().map(|(k, v)| (k.as_str(), v)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Copy of the bindings of frame `id`
    pub fn snapshot(&self, id: FrameId) -> HashMap<String, Binding<Value>> {
        self.frame(id).map(|f| f.bindings.clone()).unwrap_or_default()
    }

    /// Replace the bindings of frame `id` with an earlier snapshot
    pub fn restore(&mut self, id: FrameId, bindings: HashMap<String, Binding<Value>>) {
        if let Some(frame) = self.frame_mut(id) {
            frame.bindings = bindings;
        }
    }

    /// Mark-and-sweep over frames reachable from `roots` through parent
    /// links and closure environments. Returns how many frames were freed.
    pub fn collect(&mut self, roots: &[FrameId]) -> usize {
        let mut marked = vec![false; self.slots.len()];
        let mut pending: Vec<FrameId> = roots.to_vec();
        while let Some(id) = pending.pop() {
            let Some(frame) = self.frame(id) else { continue };
            let index = id.index as usize;
            if marked[index] {
                continue;
            }
            marked[index] = true;
            pending.extend(frame.parent);
            for binding in frame.bindings.values() {
                if let Value::Function(closure) = &binding.value {
                    pending.push(closure.env);
                }
            }
        }

        let before = self.live;
        for index in 0..self.slots.len() {
            if !marked[index] && self.slots[index].frame.is_some() {
                self.free_slot(index as u32);
            }
        }
        let freed = before - self.live;
        tracing::trace!(freed, live = self.live, "frame collection");
        freed
    }
}
