//! Scoped serial numbers (`sno` per office, `item_sno` per request).
//!
//! A scope's next number is `max(existing) + 1`, starting at 1. The
//! read-compute-write must run while the scope's parent row is locked, so
//! two writers in the same scope never compute the same number while writers
//! in different scopes never wait on each other.

use epro_core::{OfficeId, RequestId};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceScope {
    Office(OfficeId),
    Request(RequestId),
}

impl SequenceScope {
    /// Statement that locks the scope's parent row.
    pub fn lock_sql(self) -> &'static str {
        match self {
            SequenceScope::Office(_) => "SELECT id FROM offices WHERE id = $1 FOR UPDATE",
            SequenceScope::Request(_) => "SELECT id FROM purchase_requests WHERE id = $1 FOR UPDATE",
        }
    }

    /// Statement returning the current maximum in the scope (NULL if empty).
    pub fn max_sql(self) -> &'static str {
        match self {
            SequenceScope::Office(_) => {
                "SELECT MAX(sno) AS current FROM purchase_requests WHERE office_id = $1"
            }
            SequenceScope::Request(_) => {
                "SELECT MAX(item_sno) AS current FROM items WHERE request_id = $1"
            }
        }
    }

    pub fn parent_id(self) -> Uuid {
        match self {
            SequenceScope::Office(id) => *id.as_uuid(),
            SequenceScope::Request(id) => *id.as_uuid(),
        }
    }

    pub fn parent_name(self) -> &'static str {
        match self {
            SequenceScope::Office(_) => "office",
            SequenceScope::Request(_) => "purchase request",
        }
    }
}

/// Next number after the current maximum of a scope.
pub fn next_after(current: Option<u32>) -> u32 {
    current.map_or(1, |n| n.saturating_add(1))
}

/// Next number given every number already used in a scope.
pub fn next_in(existing: impl IntoIterator<Item = u32>) -> u32 {
    next_after(existing.into_iter().max())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scope_starts_at_one() {
        assert_eq!(next_in(Vec::<u32>::new()), 1);
        assert_eq!(next_after(None), 1);
    }

    #[test]
    fn next_is_max_plus_one_even_with_gaps() {
        assert_eq!(next_in([1, 2, 3]), 4);
        assert_eq!(next_in([1, 5, 2]), 6);
    }

    #[test]
    fn scopes_lock_their_own_parent() {
        let office = SequenceScope::Office(OfficeId::new());
        let request = SequenceScope::Request(RequestId::new());
        assert!(office.lock_sql().contains("offices"));
        assert!(request.lock_sql().contains("purchase_requests"));
        assert!(request.max_sql().contains("item_sno"));
    }
}
