use bitflags::bitflags;
use smallvec::SmallVec;

use crate::expression::ExpressionId;
use crate::types::NarrowKind;

bitflags! {
    /// Capability facts accumulated from how an expression is used.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct UsageFlags: u8 {
        /// Operand of `..`.
        const CONCATENATION    = 1 << 0;
        /// Operand of an arithmetic or bitwise operator.
        const MATH             = 1 << 1;
        /// Operand of `#`.
        const LENGTH           = 1 << 2;
        /// Base of a member or index read.
        const INDEXING         = 1 << 3;
        /// Base of an assignment target.
        const INDEX_ASSIGNMENT = 1 << 4;
        /// Bound of a numeric `for`.
        const NUMERIC_FOR      = 1 << 5;
        /// Base of a call.
        const CALLED           = 1 << 6;
    }
}

/// One call site's argument expressions, in order.
pub type CallArguments = SmallVec<[ExpressionId; 4]>;

/// Everything observed about how one expression is used.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Usage {
    pub flags: UsageFlags,
    /// Argument lists of every call whose base is this expression.
    pub calls: Vec<CallArguments>,
}

impl Usage {
    pub fn merge_flags(&mut self, flags: UsageFlags) {
        self.flags.insert(flags);
    }

    pub fn record_call(&mut self, arguments: CallArguments) {
        self.flags.insert(UsageFlags::CALLED);
        self.calls.push(arguments);
    }

    /// The coarse kinds compatible with every recorded usage, as a union of
    /// the kinds each capability permits.
    ///
    /// Narrowing only applies when the result is non-trivial: at least one
    /// flag set, and not so permissive that every kind survives.
    pub fn candidate_kinds(&self) -> CandidateKinds {
        let mut kinds = CandidateKinds::default();
        if self.flags.contains(UsageFlags::CONCATENATION) {
            kinds.insert(NarrowKind::String);
            kinds.insert(NarrowKind::Number);
        }
        if self.flags.intersects(UsageFlags::MATH | UsageFlags::NUMERIC_FOR) {
            kinds.insert(NarrowKind::Number);
        }
        if self.flags.intersects(UsageFlags::LENGTH | UsageFlags::INDEXING) {
            kinds.insert(NarrowKind::Table);
            kinds.insert(NarrowKind::String);
        }
        if self.flags.contains(UsageFlags::INDEX_ASSIGNMENT) {
            kinds.insert(NarrowKind::Table);
        }
        if self.flags.contains(UsageFlags::CALLED) {
            kinds.insert(NarrowKind::Function);
        }
        kinds
    }
}

/// A small set of coarse kinds an expression may narrow to.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CandidateKinds(u8);

impl CandidateKinds {
    const ALL: u8 = 0b1_1111;

    fn insert(&mut self, kind: NarrowKind) {
        self.0 |= 1 << kind as u8;
    }

    pub fn contains(self, kind: NarrowKind) -> bool {
        self.0 & (1 << kind as u8) != 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether the set is worth narrowing against: non-empty, but not every
    /// kind.
    pub fn is_narrowing(self) -> bool {
        !self.is_empty() && self.0 != Self::ALL
    }
}

#[cfg(test)]
mod tests {
    use super::{Usage, UsageFlags};
    use crate::types::NarrowKind;

    #[test]
    fn concatenation_permits_string_and_number() {
        let mut usage = Usage::default();
        usage.merge_flags(UsageFlags::CONCATENATION);
        let kinds = usage.candidate_kinds();
        assert!(kinds.contains(NarrowKind::String));
        assert!(kinds.contains(NarrowKind::Number));
        assert!(!kinds.contains(NarrowKind::Table));
        assert!(kinds.is_narrowing());
    }

    #[test]
    fn no_usage_is_not_narrowing() {
        assert!(!Usage::default().candidate_kinds().is_narrowing());
    }

    #[test]
    fn every_capability_is_not_narrowing() {
        let mut usage = Usage::default();
        usage.merge_flags(
            UsageFlags::CONCATENATION | UsageFlags::INDEXING | UsageFlags::CALLED,
        );
        // string + number + table + function: still missing boolean, so the
        // set stays useful.
        assert!(usage.candidate_kinds().is_narrowing());
        assert_eq!(usage.candidate_kinds().len(), 4);
    }

    #[test]
    fn calls_accumulate_per_site() {
        let mut usage = Usage::default();
        usage.record_call(smallvec::smallvec![]);
        usage.record_call(smallvec::smallvec![]);
        assert_eq!(usage.calls.len(), 2);
        assert!(usage.flags.contains(UsageFlags::CALLED));
    }
}
