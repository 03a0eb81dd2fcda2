use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, ProductId, TenantId};

use crate::error::{StockError, StockResult};
use crate::movement::{MovementKind, StockChange};

/// Identity of an inventory record: one per (tenant, product).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
}

impl StockKey {
    pub fn new(tenant_id: TenantId, product_id: ProductId) -> Self {
        Self {
            tenant_id,
            product_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.product_id)
    }
}

/// Stock level classification used by alerts and statistics.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Low,
    High,
    Sufficient,
}

/// Per-product stock record.
///
/// Holds the physical quantity and the reserved (soft-locked) quantity. Every
/// mutation goes through a method that checks `quantity >= reserved_quantity`
/// and `reserved_quantity >= 0` before touching state, so a rejected call
/// leaves the record exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    tenant_id: TenantId,
    product_id: ProductId,
    quantity: i64,
    reserved_quantity: i64,
    min_quantity: i64,
    max_quantity: Option<i64>,
}

impl InventoryRecord {
    /// Initial state used by get-or-initialize: nothing on hand, nothing reserved.
    pub fn new(key: StockKey) -> Self {
        Self {
            tenant_id: key.tenant_id,
            product_id: key.product_id,
            quantity: 0,
            reserved_quantity: 0,
            min_quantity: 0,
            max_quantity: None,
        }
    }

    /// Rebuild a record from persisted columns.
    pub fn restore(
        key: StockKey,
        quantity: i64,
        reserved_quantity: i64,
        min_quantity: i64,
        max_quantity: Option<i64>,
    ) -> Self {
        Self {
            tenant_id: key.tenant_id,
            product_id: key.product_id,
            quantity,
            reserved_quantity,
            min_quantity,
            max_quantity,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.tenant_id, self.product_id)
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn reserved_quantity(&self) -> i64 {
        self.reserved_quantity
    }

    pub fn min_quantity(&self) -> i64 {
        self.min_quantity
    }

    pub fn max_quantity(&self) -> Option<i64> {
        self.max_quantity
    }

    pub fn available_quantity(&self) -> i64 {
        self.quantity - self.reserved_quantity
    }

    pub fn status(&self) -> StockStatus {
        let available = self.available_quantity();
        if available <= 0 {
            StockStatus::OutOfStock
        } else if available <= self.min_quantity {
            StockStatus::Low
        } else if self.max_quantity.is_some_and(|max| self.quantity >= max) {
            StockStatus::High
        } else {
            StockStatus::Sufficient
        }
    }

    /// Soft-lock `quantity` units against future outbound movement.
    pub fn reserve(&mut self, quantity: i64) -> StockResult<()> {
        ensure_positive(quantity)?;

        let available = self.available_quantity();
        if available < quantity {
            return Err(StockError::InsufficientAvailableStock {
                available,
                requested: quantity,
            });
        }

        self.reserved_quantity += quantity;
        Ok(())
    }

    /// Free `quantity` previously reserved units.
    pub fn release(&mut self, quantity: i64) -> StockResult<()> {
        ensure_positive(quantity)?;

        if self.reserved_quantity < quantity {
            return Err(StockError::InsufficientReservedStock {
                reserved: self.reserved_quantity,
                requested: quantity,
            });
        }

        self.reserved_quantity -= quantity;
        Ok(())
    }

    /// Apply a physical change and return the computed before/after pair.
    pub fn apply_movement(
        &mut self,
        kind: MovementKind,
        quantity: i64,
    ) -> StockResult<StockChange> {
        let change =
            StockChange::compute(kind, quantity, self.quantity, self.reserved_quantity)?;
        self.quantity = change.new_quantity;
        Ok(change)
    }

    /// Update reorder thresholds. Quantities are untouched.
    pub fn set_thresholds(
        &mut self,
        min_quantity: i64,
        max_quantity: Option<i64>,
    ) -> StockResult<()> {
        if min_quantity < 0 {
            return Err(DomainError::validation("min_quantity cannot be negative").into());
        }
        if let Some(max) = max_quantity {
            if max < min_quantity {
                return Err(
                    DomainError::validation("max_quantity cannot be less than min_quantity").into(),
                );
            }
        }

        self.min_quantity = min_quantity;
        self.max_quantity = max_quantity;
        Ok(())
    }
}

fn ensure_positive(quantity: i64) -> Result<(), DomainError> {
    if quantity <= 0 {
        return Err(DomainError::validation(format!(
            "quantity must be positive (got {quantity})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StockErrorKind;
    use proptest::prelude::*;

    fn test_key() -> StockKey {
        StockKey::new(TenantId::new(), ProductId::new())
    }

    fn stocked(quantity: i64, reserved: i64) -> InventoryRecord {
        InventoryRecord::restore(test_key(), quantity, reserved, 0, None)
    }

    #[test]
    fn reserve_on_fresh_record_is_rejected() {
        let mut record = InventoryRecord::new(test_key());
        let err = record.reserve(10).unwrap_err();
        assert_eq!(
            err,
            StockError::InsufficientAvailableStock {
                available: 0,
                requested: 10
            }
        );
        assert_eq!(record.reserved_quantity(), 0);
    }

    #[test]
    fn reserve_then_release_round_trips() {
        let mut record = stocked(10, 2);
        record.reserve(4).unwrap();
        assert_eq!(record.reserved_quantity(), 6);
        assert_eq!(record.available_quantity(), 4);

        record.release(4).unwrap();
        assert_eq!(record.reserved_quantity(), 2);
    }

    #[test]
    fn release_more_than_reserved_is_rejected() {
        let mut record = stocked(10, 2);
        let err = record.release(3).unwrap_err();
        assert_eq!(err.kind(), StockErrorKind::InsufficientReservedStock);
        assert_eq!(record.reserved_quantity(), 2);
    }

    #[test]
    fn non_positive_quantities_are_invalid() {
        let mut record = stocked(10, 0);
        assert_eq!(record.reserve(0).unwrap_err().kind(), StockErrorKind::InvalidInput);
        assert_eq!(record.release(-1).unwrap_err().kind(), StockErrorKind::InvalidInput);
    }

    #[test]
    fn failed_exit_leaves_quantity_unchanged() {
        let mut record = stocked(10, 5);
        let err = record.apply_movement(MovementKind::Out, 6).unwrap_err();
        assert_eq!(err.kind(), StockErrorKind::FloorViolation);
        assert_eq!(record.quantity(), 10);
    }

    #[test]
    fn adjustment_sets_absolute_quantity() {
        let mut record = stocked(10, 5);
        let change = record.apply_movement(MovementKind::Adjustment, 7).unwrap();
        assert_eq!(change.previous_quantity, 10);
        assert_eq!(record.quantity(), 7);
    }

    #[test]
    fn status_follows_available_quantity_and_thresholds() {
        let mut record = stocked(10, 10);
        assert_eq!(record.status(), StockStatus::OutOfStock);

        record.release(7).unwrap();
        record.set_thresholds(8, Some(10)).unwrap();
        assert_eq!(record.status(), StockStatus::Low);

        record.release(3).unwrap();
        assert_eq!(record.status(), StockStatus::High);

        record.set_thresholds(2, Some(50)).unwrap();
        assert_eq!(record.status(), StockStatus::Sufficient);
    }

    #[test]
    fn thresholds_are_validated() {
        let mut record = stocked(0, 0);
        assert!(record.set_thresholds(-1, None).is_err());
        assert!(record.set_thresholds(5, Some(4)).is_err());
        assert_eq!(record.min_quantity(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(i64),
        Release(i64),
        Confirm(i64),
        Update(MovementKind, i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let kind = prop_oneof![
            Just(MovementKind::In),
            Just(MovementKind::Out),
            Just(MovementKind::Adjustment),
        ];
        prop_oneof![
            (1i64..50).prop_map(Op::Reserve),
            (1i64..50).prop_map(Op::Release),
            (1i64..50).prop_map(Op::Confirm),
            (kind, -5i64..80).prop_map(|(k, q)| Op::Update(k, q)),
        ]
    }

    /// Confirm as a composed operation over a scratch copy: both steps or neither.
    fn confirm(record: &mut InventoryRecord, quantity: i64) -> StockResult<StockChange> {
        let mut scratch = record.clone();
        scratch.release(quantity)?;
        let change = scratch.apply_movement(MovementKind::Out, quantity)?;
        *record = scratch;
        Ok(change)
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: reserved never goes negative and never exceeds physical
        /// quantity, so physical never goes negative either; rejected operations
        /// leave the record untouched.
        #[test]
        fn reserved_floor_holds_for_any_sequence(
            ops in prop::collection::vec(op_strategy(), 1..60)
        ) {
            let mut record = InventoryRecord::new(test_key());

            for op in ops {
                let before = record.clone();
                let result = match op {
                    Op::Reserve(q) => record.reserve(q).map(|_| ()),
                    Op::Release(q) => record.release(q).map(|_| ()),
                    Op::Confirm(q) => confirm(&mut record, q).map(|_| ()),
                    Op::Update(kind, q) => record.apply_movement(kind, q).map(|_| ()),
                };

                if result.is_err() {
                    prop_assert_eq!(&record, &before);
                }
                prop_assert!(record.reserved_quantity() >= 0);
                prop_assert!(record.quantity() >= record.reserved_quantity());
                prop_assert!(record.quantity() >= 0);
            }
        }

        /// Property: confirm nets out to release followed by an outbound movement.
        #[test]
        fn confirm_equals_release_then_exit(
            stock in 0i64..100,
            reserve in 1i64..100,
            confirm_qty in 1i64..100
        ) {
            let mut record = stocked(stock, 0);
            prop_assume!(record.reserve(reserve).is_ok());

            let mut composed = record.clone();
            let composed_result = composed
                .release(confirm_qty)
                .and_then(|_| composed.apply_movement(MovementKind::Out, confirm_qty));

            let mut confirmed = record.clone();
            let confirm_result = confirm(&mut confirmed, confirm_qty);

            prop_assert_eq!(composed_result.is_ok(), confirm_result.is_ok());
            if confirm_result.is_ok() {
                prop_assert_eq!(&confirmed, &composed);
            } else {
                prop_assert_eq!(&confirmed, &record);
            }
        }
    }
}
