//! Built-in token generators.

mod column_transform;
mod group_order;
mod insert;
mod pagination;
mod projection;
mod table;

pub use column_transform::ColumnTransformTokenGenerator;
pub use group_order::GroupOrderTokenGenerator;
pub use insert::{InsertColumnsTokenGenerator, InsertValuesTokenGenerator};
pub use pagination::PaginationTokenGenerator;
pub use projection::DerivedProjectionTokenGenerator;
pub use table::TableTokenGenerator;

use super::SqlTokenGenerator;

pub fn builtin_generators() -> Vec<Box<dyn SqlTokenGenerator>> {
    vec![
        Box::new(TableTokenGenerator),
        Box::new(DerivedProjectionTokenGenerator),
        Box::new(GroupOrderTokenGenerator),
        Box::new(PaginationTokenGenerator),
        Box::new(InsertColumnsTokenGenerator),
        Box::new(InsertValuesTokenGenerator),
        Box::new(ColumnTransformTokenGenerator),
    ]
}
