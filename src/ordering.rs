//! Dense zero-based ordering for a session's elements.
//!
//! Everything here works on an in-memory snapshot sorted ascending by the
//! stored order (ties by insertion). Callers persist the returned patches.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSlot {
    pub id: String,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPatch {
    pub id: String,
    pub order: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    /// Repairs that make the snapshot dense before swapping.
    pub repairs: Vec<OrderPatch>,
    /// The two writes of an adjacent swap; `None` at either boundary.
    pub swap: Option<[OrderPatch; 2]>,
}

/// One patch per slot whose stored order differs from its position.
pub fn normalize_plan(sorted: &[OrderSlot]) -> Vec<OrderPatch> {
    sorted
        .iter()
        .enumerate()
        .filter(|(i, slot)| slot.order != *i as i64)
        .map(|(i, slot)| OrderPatch {
            id: slot.id.clone(),
            order: i as i64,
        })
        .collect()
}

/// `max + 1`, or 0 for an empty session.
pub fn next_order<I>(orders: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    orders.into_iter().max().map(|m| m + 1).unwrap_or(0)
}

pub fn is_dense(sorted_orders: &[i64]) -> bool {
    sorted_orders
        .iter()
        .enumerate()
        .all(|(i, order)| *order == i as i64)
}

/// Plans a single-step move. Returns `None` when `target` is not in the snapshot.
pub fn step_plan(sorted: &[OrderSlot], target: &str, direction: Direction) -> Option<StepPlan> {
    let position = sorted.iter().position(|slot| slot.id == target)?;
    let repairs = normalize_plan(sorted);

    let neighbour = match direction {
        Direction::Up if position > 0 => Some(position - 1),
        Direction::Down if position + 1 < sorted.len() => Some(position + 1),
        _ => None,
    };

    // After repair every slot's order equals its position.
    let swap = neighbour.map(|n| {
        [
            OrderPatch {
                id: sorted[position].id.clone(),
                order: n as i64,
            },
            OrderPatch {
                id: sorted[n].id.clone(),
                order: position as i64,
            },
        ]
    });

    Some(StepPlan { repairs, swap })
}
