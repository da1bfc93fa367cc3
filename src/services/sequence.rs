//! Order number generation.
//!
//! Numbers follow `PO-{YY}-{MM}-{NNNN}`. The year/month come from a fixed
//! UTC offset rather than server-local time so numbering stays
//! deterministic across deployment regions, and `NNNN` comes from an
//! atomic per-month counter row, incremented with a single UPDATE, so
//! concurrent creates in the same month cannot mint duplicates.

use crate::entities::po_sequence;
use crate::errors::ServiceError;
use chrono::{DateTime, Datelike, FixedOffset, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use tracing::instrument;

/// Offset used to derive the numbering period, in hours east of UTC.
const SEQUENCE_UTC_OFFSET_HOURS: i32 = 3;

/// Generates unique, human-readable purchase order numbers.
#[derive(Clone, Default)]
pub struct SequenceService;

impl SequenceService {
    pub fn new() -> Self {
        Self
    }

    /// The `"YY-MM"` period key for a given instant.
    pub fn period_for(at: DateTime<Utc>) -> String {
        let offset = FixedOffset::east_opt(SEQUENCE_UTC_OFFSET_HOURS * 3600)
            .expect("fixed sequence offset is valid");
        let local = at.with_timezone(&offset);
        format!("{:02}-{:02}", local.year() % 100, local.month())
    }

    /// Formats a full order number from a period key and sequence value.
    pub fn format_number(period: &str, value: i64) -> String {
        format!("PO-{}-{:04}", period, value)
    }

    /// Issues the next order number for the current period.
    ///
    /// Runs against the caller's connection so it participates in the
    /// surrounding create transaction. The counter row is claimed with an
    /// insert-or-increment: the insert takes value 1, a conflicting insert
    /// falls through to a single atomic increment.
    #[instrument(skip(self, conn))]
    pub async fn next_po_number<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> Result<String, ServiceError> {
        let period = Self::period_for(Utc::now());

        let claimed = po_sequence::ActiveModel {
            period: Set(period.clone()),
            value: Set(1),
        };
        let insert = po_sequence::Entity::insert(claimed)
            .on_conflict(
                OnConflict::column(po_sequence::Column::Period)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(conn)
            .await;

        match insert {
            Ok(_) => {}
            Err(DbErr::RecordNotInserted) => {
                po_sequence::Entity::update_many()
                    .col_expr(
                        po_sequence::Column::Value,
                        Expr::col(po_sequence::Column::Value).add(1),
                    )
                    .filter(po_sequence::Column::Period.eq(period.clone()))
                    .exec(conn)
                    .await?;
            }
            Err(e) => return Err(e.into()),
        }

        let value = po_sequence::Entity::find_by_id(period.clone())
            .one(conn)
            .await?
            .map(|row| row.value)
            .ok_or_else(|| {
                ServiceError::InternalError(format!("sequence row missing for period {}", period))
            })?;

        Ok(Self::format_number(&period, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_uses_the_fixed_offset() {
        // 22:30 UTC on Jan 31 is already February in UTC+3.
        let at = Utc.with_ymd_and_hms(2026, 1, 31, 22, 30, 0).unwrap();
        assert_eq!(SequenceService::period_for(at), "26-02");

        let at = Utc.with_ymd_and_hms(2026, 8, 15, 12, 0, 0).unwrap();
        assert_eq!(SequenceService::period_for(at), "26-08");
    }

    #[test]
    fn numbers_are_zero_padded() {
        assert_eq!(SequenceService::format_number("26-08", 1), "PO-26-08-0001");
        assert_eq!(SequenceService::format_number("26-08", 42), "PO-26-08-0042");
        assert_eq!(
            SequenceService::format_number("26-12", 12345),
            "PO-26-12-12345"
        );
    }
}
