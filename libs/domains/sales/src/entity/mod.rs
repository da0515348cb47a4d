//! Sea-ORM entities for the `orders` and `order_items` tables.

pub mod order_items;
pub mod orders;
