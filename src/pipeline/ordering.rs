//! Ordering rules shared by processors and listeners.

use serde::{Deserialize, Serialize};

/// Explicit ordering of an extension point. Lower values sort first.
///
/// Groups sort before each other in declaration order: every `Priority`
/// entry runs before any `Value` entry, which run before `Unordered` ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Order {
    Priority(i32),
    Value(i32),
    #[default]
    Unordered,
}

impl Order {
    fn sort_key(self) -> (u8, i32) {
        match self {
            Order::Priority(value) => (0, value),
            Order::Value(value) => (1, value),
            Order::Unordered => (2, 0),
        }
    }
}

/// Stable sort, so unordered entries (and ties) keep registration order.
pub fn sort_ordered<T>(items: &mut [T], order_of: impl Fn(&T) -> Order) {
    items.sort_by_key(|item| order_of(item).sort_key());
}

/// Index at which `order` should be inserted into an already sorted list.
pub(crate) fn insertion_index<T>(items: &[T], order: Order, order_of: impl Fn(&T) -> Order) -> usize {
    let key = order.sort_key();
    items.partition_point(|item| order_of(item).sort_key() <= key)
}
