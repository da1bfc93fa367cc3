use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Atomic per-month counter backing order number generation.
///
/// `period` is the `"YY-MM"` key; `value` is the last issued sequence
/// number for that month. Incremented with a single conditional UPDATE so
/// concurrent creators in the same month cannot mint duplicates.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "po_sequences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub period: String,
    pub value: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
