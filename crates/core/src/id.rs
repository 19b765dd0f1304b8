//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $t:ident, $name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered), so ids sort in creation order.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

uuid_newtype!(
    /// Identifier of a user (originator, approver, reviewer, actor).
    UserId,
    "UserId"
);
uuid_newtype!(OfficeId, "OfficeId");
uuid_newtype!(CurrencyId, "CurrencyId");
uuid_newtype!(UnitId, "UnitId");
uuid_newtype!(VendorId, "VendorId");
uuid_newtype!(
    /// Identifier of a fund / department / LIN / activity code.
    CodeId,
    "CodeId"
);
uuid_newtype!(RequestId, "RequestId");
uuid_newtype!(ItemId, "ItemId");
uuid_newtype!(FinanceCodesId, "FinanceCodesId");
uuid_newtype!(AttachmentId, "AttachmentId");
uuid_newtype!(LogEntryId, "LogEntryId");
uuid_newtype!(RfqId, "RfqId");
uuid_newtype!(RfqItemId, "RfqItemId");
uuid_newtype!(QuotationAnalysisId, "QuotationAnalysisId");
uuid_newtype!(PurchaseOrderId, "PurchaseOrderId");
uuid_newtype!(PurchaseOrderItemId, "PurchaseOrderItemId");
uuid_newtype!(GoodsReceivedNoteId, "GoodsReceivedNoteId");
uuid_newtype!(GoodsReceivedNoteItemId, "GoodsReceivedNoteItemId");
