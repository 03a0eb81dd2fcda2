//! Read-side summaries over records and movements (alerts, dashboards).

use serde::{Deserialize, Serialize};

use crate::movement::{MovementRecord, MovementType};
use crate::record::{InventoryRecord, StockStatus};

/// Answer to "can `requested` units be promised right now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub has_record: bool,
    pub requested: i64,
    pub quantity: i64,
    pub reserved_quantity: i64,
    pub available_quantity: i64,
    pub min_quantity: i64,
    pub is_available: bool,
}

impl Availability {
    pub fn of(record: Option<&InventoryRecord>, requested: i64) -> Self {
        match record {
            Some(r) => Self {
                has_record: true,
                requested,
                quantity: r.quantity(),
                reserved_quantity: r.reserved_quantity(),
                available_quantity: r.available_quantity(),
                min_quantity: r.min_quantity(),
                is_available: requested > 0 && r.available_quantity() >= requested,
            },
            None => Self {
                has_record: false,
                requested,
                quantity: 0,
                reserved_quantity: 0,
                available_quantity: 0,
                min_quantity: 0,
                is_available: false,
            },
        }
    }
}

/// Per-tenant stock counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockStatistics {
    pub total_items: u64,
    pub sufficient: u64,
    pub low: u64,
    pub out_of_stock: u64,
    pub high: u64,
    /// Records with anything reserved.
    pub reserved_items: u64,
    pub total_reserved_quantity: i64,
}

impl StockStatistics {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a InventoryRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.total_items += 1;
            match record.status() {
                StockStatus::Sufficient => stats.sufficient += 1,
                StockStatus::Low => stats.low += 1,
                StockStatus::OutOfStock => stats.out_of_stock += 1,
                StockStatus::High => stats.high += 1,
            }
            if record.reserved_quantity() > 0 {
                stats.reserved_items += 1;
                stats.total_reserved_quantity += record.reserved_quantity();
            }
        }
        stats
    }
}

/// Totals and counts per movement type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementSummary {
    pub total_entries: i64,
    pub count_entries: u64,
    pub total_exits: i64,
    pub count_exits: u64,
    pub total_adjustments: i64,
    pub count_adjustments: u64,
    /// `total_entries - total_exits`
    pub balance: i64,
}

impl MovementSummary {
    pub fn from_movements<'a>(movements: impl IntoIterator<Item = &'a MovementRecord>) -> Self {
        let mut summary = Self::default();
        for m in movements {
            match m.movement_type {
                MovementType::Entry => {
                    summary.total_entries += m.quantity;
                    summary.count_entries += 1;
                }
                MovementType::Exit => {
                    summary.total_exits += m.quantity;
                    summary.count_exits += 1;
                }
                MovementType::Adjustment => {
                    summary.total_adjustments += m.quantity;
                    summary.count_adjustments += 1;
                }
            }
        }
        summary.balance = summary.total_entries - summary.total_exits;
        summary
    }
}
