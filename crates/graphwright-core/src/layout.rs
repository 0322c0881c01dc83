use crate::Position;

/// Minimum separation kept between a synthesized node and its neighbours.
pub const NODE_SPACING: f64 = 800.0;

/// Place the `slot`-th helper node for `anchor` to its left, stacking
/// successive helpers vertically so they never share coordinates.
pub fn helper_position(anchor: Position, slot: usize) -> Position {
    Position {
        x: anchor.x - NODE_SPACING,
        y: anchor.y + (slot as f64) * NODE_SPACING,
    }
}

/// Midpoint between two nodes, pushed down so an adapter does not sit on the link.
pub fn between(source: Position, sink: Position, slot: usize) -> Position {
    Position {
        x: (source.x + sink.x) / 2.0,
        y: source.y.max(sink.y) + NODE_SPACING * (slot as f64 + 1.0),
    }
}

/// Place the `slot`-th node added after `anchor` further along the flow.
pub fn after(anchor: Position, slot: usize) -> Position {
    Position {
        x: anchor.x + NODE_SPACING * (slot as f64 + 1.0),
        y: anchor.y,
    }
}
