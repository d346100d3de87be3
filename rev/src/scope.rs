//! Chained lexical scopes
//!
//! A stack of frames, index 0 being the top-level frame. The analyzer uses
//! `ScopeStack<()>` (types only); interpreter frames reuse [`Binding`] with
//! runtime values.
//!
//! Frames also carry narrowing facts: a refined type for a name that holds
//! only inside the frame that recorded it. Facts never cross a function
//! frame, and assignment to the name drops them.

use crate::types::Type;
use std::collections::HashMap;

/// A named slot: declared type, payload, and whether it may be reassigned
#[derive(Debug, Clone, PartialEq)]
pub struct Binding<V> {
    pub ty: Type,
    pub value: V,
    pub mutable: bool,
}

impl<V> Binding<V> {
    pub fn new(ty: Type, value: V, mutable: bool) -> Self {
        Self { ty, value, mutable }
    }
}

/// What opened a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Top,
    Block,
    Function,
}

#[derive(Debug, Clone)]
struct Frame<V> {
    kind: FrameKind,
    bindings: HashMap<String, Binding<V>>,
    facts: HashMap<String, Type>,
}

impl<V> Frame<V> {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            bindings: HashMap::new(),
            facts: HashMap::new(),
        }
    }
}

/// Stack of scopes
#[derive(Debug, Clone)]
pub struct ScopeStack<V> {
    frames: Vec<Frame<V>>,
}

/// Saved top-level frame, restored when an incremental input is rejected
#[derive(Debug, Clone)]
pub struct TopSnapshot<V>(HashMap<String, Binding<V>>);

impl<V: Clone> ScopeStack<V> {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new(FrameKind::Top)],
        }
    }

    pub fn push(&mut self, kind: FrameKind) {
        self.frames.push(Frame::new(kind));
    }

    /// Pop the innermost frame. The top-level frame is never popped.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn at_top_level(&self) -> bool {
        self.frames.len() == 1
    }

    /// Define `name` in the innermost frame, shadowing outer bindings.
    /// Returns the binding it replaced in the same frame, if any.
    pub fn define(&mut self, name: impl Into<String>, binding: Binding<V>) -> Option<Binding<V>> {
        let name = name.into();
        let frame = self.innermost_mut();
        frame.facts.remove(&name);
        frame.bindings.insert(name, binding)
    }

    /// Binding visible under `name`, ignoring narrowing
    pub fn lookup(&self, name: &str) -> Option<&Binding<V>> {
        self.frames.iter().rev().find_map(|f| f.bindings.get(name))
    }

    /// Type of `name` at this point, taking narrowing facts into account
    pub fn current_type(&self, name: &str) -> Option<Type> {
        let mut facts_apply = true;
        for frame in self.frames.iter().rev() {
            if facts_apply {
                if let Some(ty) = frame.facts.get(name) {
                    return Some(ty.clone());
                }
            }
            if let Some(binding) = frame.bindings.get(name) {
                return Some(binding.ty.clone());
            }
            if frame.kind == FrameKind::Function {
                facts_apply = false;
            }
        }
        None
    }

    /// Record that `name` has type `ty` for the rest of the innermost frame
    pub fn narrow(&mut self, name: impl Into<String>, ty: Type) {
        self.innermost_mut().facts.insert(name.into(), ty);
    }

    /// Forget every narrowing fact about `name`
    pub fn invalidate(&mut self, name: &str) {
        for frame in &mut self.frames {
            frame.facts.remove(name);
        }
    }

    /// Forget every narrowing fact about any of `names`
    pub fn invalidate_all<'a>(&mut self, names: impl IntoIterator<Item = &'a String>) {
        for name in names {
            self.invalidate(name);
        }
    }

    /// Every visible name, innermost first, without duplicates
    pub fn visible_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for frame in self.frames.iter().rev() {
            let mut frame_names: Vec<&str> = frame.bindings.keys().map(String::as_str).collect();
            frame_names.sort_unstable();
            for name in frame_names {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Top-level bindings sorted by name
    pub fn top_level(&self) -> Vec<(&str, &Binding<V>)> {
        let mut entries: Vec<_> = self.frames[0]
            .bindings
            .iter()
            .map(|(name, binding)| (name.as_str(), binding))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn snapshot_top(&self) -> TopSnapshot<V> {
        TopSnapshot(self.frames[0].bindings.clone())
    }

    /// Restore the top-level frame and drop any frames above it
    pub fn restore_top(&mut self, snapshot: TopSnapshot<V>) {
        self.frames.truncate(1);
        self.frames[0].bindings = snapshot.0;
        self.frames[0].facts.clear();
    }

    fn innermost_mut(&mut self) -> &mut Frame<V> {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

impl<V: Clone> Default for ScopeStack<V> {
    fn default() -> Self {
        Self::new()
    }
}
