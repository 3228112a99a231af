//! Arena of open elements.
//!
//! Classification and extraction patterns are evaluated against the path
//! from the document root to the current element. Only that path has to be
//! kept: an element's slot is released as soon as the element closes, so
//! memory is bounded by nesting depth rather than document size.
//!
//! Slots are reused, and [`ElementId`] carries a generation so that a stale
//! id (for example one held by an extraction binding whose element has
//! closed) never aliases the element that later reuses the slot.

use crate::event::Attributes;
use crate::model::ObjectType;

/// Generational handle to an element in an [`ElementTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId {
    index: u32,
    generation: u32,
}

/// One open element.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub name: String,
    pub attributes: Attributes,
    /// Type of the record this element spawned, if any.
    pub record: Option<ObjectType>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<ElementNode>,
}

/// The open-element path, stored in a slot arena.
#[derive(Debug, Default)]
pub struct ElementTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    open: Vec<ElementId>,
}

impl ElementTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a child of the current element (or the root when nothing is open).
    pub fn open(&mut self, name: String, attributes: Attributes) -> ElementId {
        let node = ElementNode {
            name,
            attributes,
            record: None,
        };
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.node = Some(node);
                ElementId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                ElementId {
                    index,
                    generation: 0,
                }
            }
        };
        self.open.push(id);
        id
    }

    /// Close the innermost open element and release its slot.
    pub fn close(&mut self) -> Option<(ElementId, ElementNode)> {
        let id = self.open.pop()?;
        let node = self.slots[id.index as usize].node.take()?;
        self.free.push(id.index);
        Some((id, node))
    }

    pub fn get(&self, id: ElementId) -> Option<&ElementNode> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut ElementNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Innermost open element.
    pub fn current(&self) -> Option<ElementId> {
        self.open.last().copied()
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Whether `id` is open at `depth` (0 = root) on the current path.
    pub fn is_open_at(&self, id: ElementId, depth: usize) -> bool {
        self.open.get(depth) == Some(&id)
    }

    /// The open path, root first.
    pub fn path(&self) -> Vec<&ElementNode> {
        self.open
            .iter()
            .filter_map(|&id| self.slots[id.index as usize].node.as_ref())
            .collect()
    }

    /// Depth of the innermost open element named `name`.
    pub fn find_open(&self, name: &str) -> Option<usize> {
        self.open
            .iter()
            .rposition(|&id| self.get(id).is_some_and(|node| node.name == name))
    }

    /// Number of slots ever allocated; bounded by the maximum nesting depth.
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }
}
