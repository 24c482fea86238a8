//! Pointer-drag reorder gesture, one committed move per gesture.

use shared::domain::OwnerId;

use crate::AuthorizationContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRequest {
    pub source: usize,
    pub target: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DragInteractionState {
    #[default]
    Idle,
    Dragging {
        source: usize,
    },
    Targeting {
        source: usize,
        target: usize,
    },
}

impl DragInteractionState {
    /// Starting a new drag discards whatever the previous one captured.
    #[must_use]
    pub fn begin(self, index: usize) -> Self {
        Self::Dragging { source: index }
    }

    /// Hovering never mutates the collection, and is ignored while idle.
    #[must_use]
    pub fn drag_over(self, index: usize) -> Self {
        match self {
            Self::Idle => Self::Idle,
            Self::Dragging { source } | Self::Targeting { source, .. } => Self::Targeting {
                source,
                target: index,
            },
        }
    }

    /// Always returns to idle. A move is produced only when a target
    /// different from the source was captured.
    #[must_use]
    pub fn end(self) -> (Self, Option<MoveRequest>) {
        let request = match self {
            Self::Targeting { source, target } if source != target => {
                Some(MoveRequest { source, target })
            }
            Self::Idle | Self::Dragging { .. } | Self::Targeting { .. } => None,
        };
        (Self::Idle, request)
    }

    #[must_use]
    pub fn cancel(self) -> Self {
        Self::Idle
    }

    pub fn source(&self) -> Option<usize> {
        match self {
            Self::Idle => None,
            Self::Dragging { source } | Self::Targeting { source, .. } => Some(*source),
        }
    }

    pub fn target(&self) -> Option<usize> {
        match self {
            Self::Targeting { target, .. } => Some(*target),
            Self::Idle | Self::Dragging { .. } => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Drag handling is only attached for the owner viewing their own
/// collection.
pub fn attach_drag(
    auth: &dyn AuthorizationContext,
    owner_id: OwnerId,
) -> Option<DragInteractionState> {
    auth.can_edit(owner_id).then_some(DragInteractionState::Idle)
}

#[cfg(test)]
#[path = "tests/drag_tests.rs"]
mod tests;
