//! Slot allocation and the append-only layout checker.
//!
//! Allocation is static: it runs when layouts are declared, before any code
//! is bound to a proxy, and never on the call path.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use slotproxy_core::{Error, LayoutConflictKind, Result, Slot};

use crate::Field;

/// The owner name used for the proxy's own reservation.
pub const PROXY_OWNER: &str = "proxy";

/// A contiguous slot range `[base, base + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSlotRange {
    pub base: u64,
    pub len: u64,
}

impl StorageSlotRange {
    pub fn new(base: u64, len: u64) -> Self {
        Self { base, len }
    }

    /// One past the last slot, saturating at `u64::MAX`.
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, slot: Slot) -> bool {
        slot.0 >= self.base && slot.0 < self.end()
    }

    /// Empty ranges overlap nothing.
    pub fn overlaps(&self, other: &StorageSlotRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.base < other.end()
            && other.base < self.end()
    }
}

impl fmt::Display for StorageSlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.base, self.end())
    }
}

/// Where one field landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOffset {
    pub name: String,
    pub slot: Slot,
    pub width: u64,
}

/// The slots assigned to one owner's declared fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub owner: String,
    pub range: StorageSlotRange,
    pub fields: Vec<Field>,
    pub offsets: Vec<FieldOffset>,
}

impl Allocation {
    /// The first slot of a field, by name.
    pub fn slot_of(&self, name: &str) -> Option<Slot> {
        self.offsets.iter().find(|o| o.name == name).map(|o| o.slot)
    }
}

/// Assign each field its slot by accumulating prior widths in declaration
/// order, starting at `base`.
pub fn allocate(owner: &str, base: u64, fields: &[Field]) -> Result<Allocation> {
    let out_of_slots = || Error::layout(owner, LayoutConflictKind::OutOfSlots);

    let mut offsets = Vec::with_capacity(fields.len());
    let mut next = base;
    for field in fields {
        let width = field.ty.slots().ok_or_else(out_of_slots)?;
        offsets.push(FieldOffset {
            name: field.name.clone(),
            slot: Slot(next),
            width,
        });
        next = next.checked_add(width).ok_or_else(out_of_slots)?;
    }

    Ok(Allocation {
        owner: owner.to_string(),
        range: StorageSlotRange::new(base, next - base),
        fields: fields.to_vec(),
        offsets,
    })
}

/// Every previously shipped field must still be at its position with the
/// same name and type. New fields may only follow them.
fn check_append_only(owner: &str, shipped: &[Field], declared: &[Field]) -> Result<()> {
    for (position, old) in shipped.iter().enumerate() {
        match declared.get(position) {
            Some(new) if new == old => {}
            Some(new) => {
                return Err(Error::layout(
                    owner,
                    LayoutConflictKind::NotAppendOnly {
                        position,
                        shipped: old.to_string(),
                        declared: Some(new.to_string()),
                    },
                ))
            }
            None => {
                return Err(Error::layout(
                    owner,
                    LayoutConflictKind::NotAppendOnly {
                        position,
                        shipped: old.to_string(),
                        declared: None,
                    },
                ))
            }
        }
    }
    Ok(())
}

/// Tracks the proxy reservation and every module's shipped layout.
///
/// A declaration either succeeds completely or leaves the checker as it was.
///
/// ```rust
/// use slotproxy_layout::{Field, FieldType, LayoutChecker};
///
/// let mut checker = LayoutChecker::new();
/// checker
///     .reserve_proxy(vec![
///         Field::new("owner", FieldType::Address),
///         Field::new("resolver", FieldType::Address),
///     ])
///     .unwrap();
///
/// let tokens = checker
///     .declare_module("Tokens", None, vec![Field::new("balances", FieldType::Mapping)])
///     .unwrap();
/// assert_eq!(tokens.range.base, 2);
///
/// // Base 1 is inside the proxy's slots.
/// assert!(checker.declare_module("Bad", Some(1), vec![]).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct LayoutChecker {
    proxy: Option<Allocation>,
    modules: BTreeMap<String, Allocation>,
}

impl LayoutChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots reserved for the proxy's own fields.
    pub fn proxy_width(&self) -> u64 {
        self.proxy.as_ref().map_or(0, |a| a.range.len)
    }

    pub fn proxy_allocation(&self) -> Option<&Allocation> {
        self.proxy.as_ref()
    }

    /// Reserve the proxy's own fields starting at slot 0.
    ///
    /// A second reservation is treated as a re-declaration: it may only
    /// append fields, and it may not grow into a module's range.
    pub fn reserve_proxy(&mut self, fields: Vec<Field>) -> Result<StorageSlotRange> {
        if let Some(shipped) = &self.proxy {
            check_append_only(PROXY_OWNER, &shipped.fields, &fields)?;
        }

        let allocation = allocate(PROXY_OWNER, 0, &fields)?;
        for (owner, module) in &self.modules {
            if allocation.range.overlaps(&module.range) {
                return Err(Error::layout(
                    PROXY_OWNER,
                    LayoutConflictKind::OverlapsModule {
                        other: owner.clone(),
                        start: module.range.base,
                        end: module.range.end(),
                    },
                ));
            }
        }

        let range = allocation.range;
        tracing::debug!(%range, "proxy reservation declared");
        self.proxy = Some(allocation);
        Ok(range)
    }

    /// Declare (or re-declare) the layout of one module identity.
    ///
    /// With `base: None` a new identity is placed after every allocated slot
    /// and a shipped identity keeps its shipped base.
    pub fn declare_module(
        &mut self,
        identity: &str,
        base: Option<u64>,
        fields: Vec<Field>,
    ) -> Result<Allocation> {
        let shipped = self.modules.get(identity);

        let base = match (shipped, base) {
            (Some(s), Some(requested)) if requested != s.range.base => {
                return Err(Error::layout(
                    identity,
                    LayoutConflictKind::BaseMoved {
                        shipped: s.range.base,
                        requested,
                    },
                ))
            }
            (Some(s), _) => s.range.base,
            (None, Some(requested)) => requested,
            (None, None) => self.next_free(),
        };

        let reserved = self.proxy_width();
        if base < reserved {
            return Err(Error::layout(
                identity,
                LayoutConflictKind::OverlapsProxy { base, reserved },
            ));
        }

        if let Some(shipped) = shipped {
            check_append_only(identity, &shipped.fields, &fields)?;
        }

        let allocation = allocate(identity, base, &fields)?;
        for (owner, other) in &self.modules {
            if owner != identity && allocation.range.overlaps(&other.range) {
                return Err(Error::layout(
                    identity,
                    LayoutConflictKind::OverlapsModule {
                        other: owner.clone(),
                        start: other.range.base,
                        end: other.range.end(),
                    },
                ));
            }
        }

        tracing::debug!(identity, range = %allocation.range, "module layout declared");
        self.modules
            .insert(identity.to_string(), allocation.clone());
        Ok(allocation)
    }

    pub fn allocation(&self, identity: &str) -> Option<&Allocation> {
        self.modules.get(identity)
    }

    /// Every owned range, the proxy reservation first.
    pub fn ranges(&self) -> Vec<(String, StorageSlotRange)> {
        self.proxy
            .iter()
            .chain(self.modules.values())
            .map(|a| (a.owner.clone(), a.range))
            .collect()
    }

    fn next_free(&self) -> u64 {
        self.modules
            .values()
            .map(|a| a.range.end())
            .fold(self.proxy_width(), u64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldType;

    fn proxy_fields() -> Vec<Field> {
        vec![
            Field::new("owner", FieldType::Address),
            Field::new("authority", FieldType::Address),
            Field::new("resolver", FieldType::Address),
        ]
    }

    fn token_fields() -> Vec<Field> {
        vec![
            Field::new("supply", FieldType::uint256()),
            Field::new("balances", FieldType::Mapping),
        ]
    }

    #[test]
    fn allocate_accumulates_widths() {
        let fields = vec![
            Field::new("a", FieldType::Bool),
            Field::new("b", FieldType::fixed_array(FieldType::uint256(), 3)),
            Field::new("c", FieldType::Address),
        ];
        let alloc = allocate("m", 10, &fields).unwrap();
        assert_eq!(alloc.slot_of("a"), Some(Slot(10)));
        assert_eq!(alloc.slot_of("b"), Some(Slot(11)));
        assert_eq!(alloc.slot_of("c"), Some(Slot(14)));
        assert_eq!(alloc.range, StorageSlotRange::new(10, 5));
        assert_eq!(alloc.slot_of("missing"), None);
    }

    #[test]
    fn allocate_detects_slot_overflow() {
        let fields = vec![Field::new("x", FieldType::uint256())];
        assert!(matches!(
            allocate("m", u64::MAX, &fields),
            Err(Error::LayoutConflict {
                kind: LayoutConflictKind::OutOfSlots,
                ..
            })
        ));
    }

    #[test]
    fn modules_are_placed_after_the_proxy() {
        let mut checker = LayoutChecker::new();
        assert_eq!(checker.reserve_proxy(proxy_fields()).unwrap().len, 3);

        let tokens = checker.declare_module("Tokens", None, token_fields()).unwrap();
        assert_eq!(tokens.range, StorageSlotRange::new(3, 2));

        let votes = checker
            .declare_module("Votes", None, vec![Field::new("tally", FieldType::Mapping)])
            .unwrap();
        assert_eq!(votes.range.base, 5);
    }

    #[test]
    fn base_inside_proxy_reservation_is_rejected() {
        let mut checker = LayoutChecker::new();
        checker.reserve_proxy(proxy_fields()).unwrap();

        let err = checker
            .declare_module("Tokens", Some(2), token_fields())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::LayoutConflict {
                kind: LayoutConflictKind::OverlapsProxy { base: 2, reserved: 3 },
                ..
            }
        ));
        assert!(checker.allocation("Tokens").is_none());
    }

    #[test]
    fn redeclaration_may_append() {
        let mut checker = LayoutChecker::new();
        checker.reserve_proxy(proxy_fields()).unwrap();
        checker.declare_module("Tokens", None, token_fields()).unwrap();

        let mut v2 = token_fields();
        v2.push(Field::new("allowances", FieldType::Mapping));
        let alloc = checker.declare_module("Tokens", None, v2).unwrap();
        assert_eq!(alloc.range, StorageSlotRange::new(3, 3));
        assert_eq!(alloc.slot_of("allowances"), Some(Slot(5)));
    }

    #[test]
    fn redeclaration_may_not_remove_or_reorder() {
        let mut checker = LayoutChecker::new();
        checker.declare_module("Tokens", None, token_fields()).unwrap();

        let removed = vec![Field::new("supply", FieldType::uint256())];
        assert!(matches!(
            checker.declare_module("Tokens", None, removed),
            Err(Error::LayoutConflict {
                kind: LayoutConflictKind::NotAppendOnly { position: 1, declared: None, .. },
                ..
            })
        ));

        let reordered = vec![
            Field::new("balances", FieldType::Mapping),
            Field::new("supply", FieldType::uint256()),
        ];
        assert!(matches!(
            checker.declare_module("Tokens", None, reordered),
            Err(Error::LayoutConflict {
                kind: LayoutConflictKind::NotAppendOnly { position: 0, declared: Some(_), .. },
                ..
            })
        ));

        let retyped = vec![
            Field::new("supply", FieldType::Int { bits: 128 }),
            Field::new("balances", FieldType::Mapping),
        ];
        assert!(checker.declare_module("Tokens", None, retyped).is_err());

        // The shipped layout is untouched by the failed attempts.
        assert_eq!(checker.allocation("Tokens").unwrap().fields, token_fields());
    }

    #[test]
    fn redeclaration_may_not_move_base() {
        let mut checker = LayoutChecker::new();
        checker.declare_module("Tokens", Some(10), token_fields()).unwrap();
        assert!(checker.declare_module("Tokens", Some(10), token_fields()).is_ok());
        assert!(matches!(
            checker.declare_module("Tokens", Some(20), token_fields()),
            Err(Error::LayoutConflict {
                kind: LayoutConflictKind::BaseMoved { shipped: 10, requested: 20 },
                ..
            })
        ));
    }

    #[test]
    fn growth_into_a_neighbour_is_rejected() {
        let mut checker = LayoutChecker::new();
        checker.declare_module("Tokens", Some(0), token_fields()).unwrap();
        checker
            .declare_module("Votes", Some(2), vec![Field::new("tally", FieldType::Mapping)])
            .unwrap();

        let mut grown = token_fields();
        grown.push(Field::new("paused", FieldType::Bool));
        let err = checker.declare_module("Tokens", None, grown).unwrap_err();
        assert!(matches!(
            err,
            Error::LayoutConflict {
                kind: LayoutConflictKind::OverlapsModule { ref other, start: 2, end: 3 },
                ..
            } if other == "Votes"
        ));
    }

    #[test]
    fn proxy_reservation_is_append_only_and_cannot_grow_into_modules() {
        let mut checker = LayoutChecker::new();
        checker.reserve_proxy(proxy_fields()).unwrap();
        checker.declare_module("Tokens", None, token_fields()).unwrap();

        assert!(checker
            .reserve_proxy(vec![Field::new("owner", FieldType::Address)])
            .is_err());

        let mut grown = proxy_fields();
        grown.push(Field::new("paused", FieldType::Bool));
        assert!(matches!(
            checker.reserve_proxy(grown),
            Err(Error::LayoutConflict {
                kind: LayoutConflictKind::OverlapsModule { .. },
                ..
            })
        ));
        assert_eq!(checker.proxy_width(), 3);
    }

    #[test]
    fn ranges_lists_proxy_first() {
        let mut checker = LayoutChecker::new();
        checker.reserve_proxy(proxy_fields()).unwrap();
        checker.declare_module("Tokens", None, token_fields()).unwrap();
        let ranges = checker.ranges();
        assert_eq!(ranges[0], (PROXY_OWNER.to_string(), StorageSlotRange::new(0, 3)));
        assert_eq!(ranges[1], ("Tokens".to_string(), StorageSlotRange::new(3, 2)));
    }

    #[test]
    fn empty_ranges_never_overlap() {
        let empty = StorageSlotRange::new(5, 0);
        assert!(!empty.overlaps(&StorageSlotRange::new(0, 10)));
        assert!(StorageSlotRange::new(0, 6).overlaps(&StorageSlotRange::new(5, 1)));
        assert!(!StorageSlotRange::new(0, 5).overlaps(&StorageSlotRange::new(5, 1)));
        assert!(StorageSlotRange::new(2, 2).contains(Slot(3)));
        assert!(!StorageSlotRange::new(2, 2).contains(Slot(4)));
    }

    #[test]
    fn range_end_saturates_near_the_top_of_the_slot_space() {
        let range = StorageSlotRange::new(u64::MAX - 1, 10);
        assert_eq!(range.end(), u64::MAX);
        assert!(range.contains(Slot(u64::MAX - 1)));
        assert!(range.overlaps(&StorageSlotRange::new(u64::MAX - 5, 10)));
        assert_eq!(range.to_string(), format!("[{}, {})", u64::MAX - 1, u64::MAX));

        let decoded: StorageSlotRange =
            serde_json::from_str(&format!(r#"{{"base":{},"len":{}}}"#, u64::MAX, u64::MAX))
                .unwrap();
        assert_eq!(decoded.end(), u64::MAX);
        assert!(!decoded.overlaps(&StorageSlotRange::new(0, 10)));
    }
}
