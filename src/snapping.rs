use crate::types::{Position, Rect};

/// Snap pass applied when a drag is released.
///
/// For every other live surface, in tracked iteration order, each axis runs
/// an if/else-if chain of edge rules: opposing edges first (right-to-left,
/// left-to-right), then aligned edges (left-to-left, right-to-right), same
/// for the vertical axis. The first matching rule of a chain moves the
/// working rect, and a later neighbor's match overrides an earlier one on
/// the same axis. Distances are strict less-than. This exact tie-break is
/// deliberate and iteration-order dependent; it is not nearest-edge
/// snapping.
pub fn snap_released(dragged: Rect, others: &[Rect], distance: i32) -> Position {
    let mut rect = dragged;
    for other in others {
        if (rect.right() - other.left()).abs() < distance {
            rect.x = other.left() - rect.width;
        } else if (rect.left() - other.right()).abs() < distance {
            rect.x = other.right();
        } else if (rect.left() - other.left()).abs() < distance {
            rect.x = other.left();
        } else if (rect.right() - other.right()).abs() < distance {
            rect.x = other.right() - rect.width;
        }

        if (rect.bottom() - other.top()).abs() < distance {
            rect.y = other.top() - rect.height;
        } else if (rect.top() - other.bottom()).abs() < distance {
            rect.y = other.bottom();
        } else if (rect.top() - other.top()).abs() < distance {
            rect.y = other.top();
        } else if (rect.bottom() - other.bottom()).abs() < distance {
            rect.y = other.bottom() - rect.height;
        }
    }
    Position::new(rect.x, rect.y)
}
