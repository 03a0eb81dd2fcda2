use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, MovementId, ProductId, TenantId, UserId};

use crate::error::{StockError, StockResult};
use crate::record::StockKey;

/// Direction of a requested physical stock change.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Inbound receipt: `quantity` is added.
    In,
    /// Outbound shipment: `quantity` is removed.
    Out,
    /// Manual correction: `quantity` is the new absolute physical quantity.
    Adjustment,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Adjustment => "adjustment",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(MovementKind::In),
            "out" => Ok(MovementKind::Out),
            "adjustment" => Ok(MovementKind::Adjustment),
            other => Err(StockError::InvalidMovementType(other.to_string())),
        }
    }
}

/// Movement type as stored in the audit ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Entry,
    Exit,
    Adjustment,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Entry => "entry",
            MovementType::Exit => "exit",
            MovementType::Adjustment => "adjustment",
        }
    }
}

impl From<MovementKind> for MovementType {
    fn from(kind: MovementKind) -> Self {
        match kind {
            MovementKind::In => MovementType::Entry,
            MovementKind::Out => MovementType::Exit,
            MovementKind::Adjustment => MovementType::Adjustment,
        }
    }
}

impl FromStr for MovementType {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(MovementType::Entry),
            "exit" => Ok(MovementType::Exit),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(StockError::InvalidMovementType(other.to_string())),
        }
    }
}

/// Outcome of one physical stock change, computed once and handed to the recorder.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub kind: MovementKind,
    /// Quantity as requested by the caller (absolute value for adjustments).
    pub quantity: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
}

impl StockChange {
    /// Compute the resulting physical quantity, enforcing the reserved floor.
    ///
    /// Reserved quantity is never negative, so the floor also keeps physical
    /// quantity at or above zero.
    pub fn compute(
        kind: MovementKind,
        quantity: i64,
        previous: i64,
        reserved: i64,
    ) -> StockResult<Self> {
        let new_quantity = match kind {
            MovementKind::In => {
                if quantity < 0 {
                    return Err(
                        DomainError::validation("inbound quantity cannot be negative").into(),
                    );
                }
                previous
                    .checked_add(quantity)
                    .ok_or_else(|| DomainError::validation("stock quantity overflow"))?
            }
            MovementKind::Out => {
                if quantity < 0 {
                    return Err(
                        DomainError::validation("outbound quantity cannot be negative").into(),
                    );
                }
                let new_quantity = previous
                    .checked_sub(quantity)
                    .ok_or_else(|| DomainError::validation("stock quantity overflow"))?;
                if new_quantity < reserved {
                    return Err(StockError::BelowReservedOnExit {
                        max_outbound: previous - reserved,
                        requested: quantity,
                    });
                }
                new_quantity
            }
            MovementKind::Adjustment => {
                if quantity < reserved {
                    return Err(StockError::BelowReservedOnAdjustment {
                        reserved,
                        requested: quantity,
                    });
                }
                quantity
            }
        };

        Ok(Self {
            kind,
            quantity,
            previous_quantity: previous,
            new_quantity,
        })
    }

    pub fn movement_type(&self) -> MovementType {
        self.kind.into()
    }
}

/// Caller-supplied metadata linking a movement to its business document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementMeta {
    pub reason: Option<String>,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
}

impl MovementMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_reference(mut self, id: impl Into<String>, kind: impl Into<String>) -> Self {
        self.reference_id = Some(id.into());
        self.reference_type = Some(kind.into());
        self
    }
}

/// Immutable audit entry for one physical quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reason: Option<String>,
    pub reference_id: Option<String>,
    pub reference_type: Option<String>,
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl MovementRecord {
    /// Transcribe a computed change into an audit entry. No business checks.
    pub fn from_change(
        key: StockKey,
        change: &StockChange,
        meta: &MovementMeta,
        actor: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            tenant_id: key.tenant_id,
            product_id: key.product_id,
            movement_type: change.movement_type(),
            quantity: change.quantity,
            previous_quantity: change.previous_quantity,
            new_quantity: change.new_quantity,
            reason: meta.reason.clone(),
            reference_id: meta.reference_id.clone(),
            reference_type: meta.reference_type.clone(),
            user_id: actor,
            created_at,
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.tenant_id, self.product_id)
    }
}

/// Filter for reading movement history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub movement_type: Option<MovementType>,
    pub limit: Option<usize>,
}

impl MovementFilter {
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, movement: &MovementRecord) -> bool {
        self.product_id.is_none_or(|p| p == movement.product_id)
            && self.movement_type.is_none_or(|t| t == movement.movement_type)
    }
}
