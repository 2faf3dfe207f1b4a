mod pick;
mod range;
mod select;

pub use pick::{pick_manifest, select_highest_compatible, PickError};
pub use range::MigrationRange;
pub use select::{order_migrations, select_by_name, select_in_range, SelectError};

#[cfg(test)]
mod tests;
