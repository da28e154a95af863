//! Session capability declarations for dynamically dispatched engines.

use std::fmt::{Debug, Display, Formatter};

/// One operation a dynamic session may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    OpenSession,
    BeginTransaction,
    Save,
    Get,
    Remove,
    CreateQuery,
    Commit,
    Rollback,
    Close,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::OpenSession,
        Capability::BeginTransaction,
        Capability::Save,
        Capability::Get,
        Capability::Remove,
        Capability::CreateQuery,
        Capability::Commit,
        Capability::Rollback,
        Capability::Close,
    ];

    /// Stable operation name used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenSession => "open_session",
            Self::BeginTransaction => "begin_transaction",
            Self::Save => "save",
            Self::Get => "get",
            Self::Remove => "remove",
            Self::CreateQuery => "create_query",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
            Self::Close => "close",
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact set of capabilities, resolved once per engine.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    pub fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub fn without(self, capability: Capability) -> Self {
        Self(self.0 & !capability.bit())
    }

    pub fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |capability| self.contains(*capability))
    }

    /// Capabilities of `required` absent from this set.
    pub fn missing(self, required: CapabilitySet) -> Vec<Capability> {
        required.iter().filter(|c| !self.contains(*c)).collect()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl Display for CapabilitySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.iter().map(Capability::as_str).collect();
        write!(f, "{}", names.join(","))
    }
}

impl Debug for CapabilitySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CapabilitySet({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::{Capability, CapabilitySet};

    #[test]
    fn all_contains_every_capability() {
        let set = CapabilitySet::all();
        for capability in Capability::ALL {
            assert!(set.contains(capability), "{capability} missing");
        }
        assert_eq!(set.iter().count(), Capability::ALL.len());
    }

    #[test]
    fn with_and_without_toggle_membership() {
        let set = CapabilitySet::empty()
            .with(Capability::Get)
            .with(Capability::Close);
        assert!(set.contains(Capability::Get));
        assert!(!set.contains(Capability::Save));

        let set = set.without(Capability::Get);
        assert!(!set.contains(Capability::Get));
        assert!(set.contains(Capability::Close));
    }

    #[test]
    fn reports_missing_capabilities_in_declaration_order() {
        let have: CapabilitySet = [Capability::BeginTransaction, Capability::Commit]
            .into_iter()
            .collect();
        let need: CapabilitySet = [
            Capability::Rollback,
            Capability::BeginTransaction,
            Capability::Close,
        ]
        .into_iter()
        .collect();

        assert_eq!(
            have.missing(need),
            vec![Capability::Rollback, Capability::Close]
        );
    }

    #[test]
    fn renders_as_comma_separated_names() {
        let set: CapabilitySet = [Capability::Save, Capability::Get].into_iter().collect();
        assert_eq!(set.to_string(), "save,get");
        assert!(CapabilitySet::empty().is_empty());
    }
}
