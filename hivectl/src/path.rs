//! Registry Path Resolution
//!
//! Registry paths address a key by root store and subpath:
//!
//! ```text
//! HKLM:\SOFTWARE\Microsoft\Windows
//! └┬─┘ └──────────┬──────────────┘
//!  alias       subpath (segments separated by '\')
//! ```
//!
//! The alias is matched case-insensitively against a fixed table of short
//! (`HKLM`) and long (`HKEY_LOCAL_MACHINE`) hive names, and may be followed
//! by a ':' drive marker. Whatever follows the alias and marker must start
//! with '\', so `HKLM:SOFTWARE` is rejected while colons inside key names
//! are kept. An alias with no segments addresses the root store itself.
//!
//! Commands take batches of paths. [`group_paths`] resolves every path,
//! groups the subpaths by root store in first-seen order, and reports an
//! error record for each path it could not resolve without giving up on
//! the rest of the batch.

use core::fmt;
use core::str::FromStr;

use serde::Serialize;

use crate::status::{error_ids, ErrorRecord, RegError};

/// Separator between path segments
pub const PATH_SEPARATOR: char = '\\';

/// Top-level registry namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RootStore {
    /// HKEY_CLASSES_ROOT - class registrations
    ClassesRoot,
    /// HKEY_CURRENT_USER - configuration of the calling user
    CurrentUser,
    /// HKEY_LOCAL_MACHINE - machine-wide configuration
    LocalMachine,
    /// HKEY_USERS - every loaded user profile
    Users,
    /// HKEY_PERFORMANCE_DATA - performance counters
    PerformanceData,
    /// HKEY_CURRENT_CONFIG - active hardware profile
    CurrentConfig,
}

impl RootStore {
    pub const ALL: [Self; 6] = [
        Self::ClassesRoot,
        Self::CurrentUser,
        Self::LocalMachine,
        Self::Users,
        Self::PerformanceData,
        Self::CurrentConfig,
    ];

    /// Canonical name, as it appears at the start of a key's full name
    pub const fn name(self) -> &'static str {
        match self {
            Self::ClassesRoot => "HKEY_CLASSES_ROOT",
            Self::CurrentUser => "HKEY_CURRENT_USER",
            Self::LocalMachine => "HKEY_LOCAL_MACHINE",
            Self::Users => "HKEY_USERS",
            Self::PerformanceData => "HKEY_PERFORMANCE_DATA",
            Self::CurrentConfig => "HKEY_CURRENT_CONFIG",
        }
    }

    pub const fn short_name(self) -> &'static str {
        match self {
            Self::ClassesRoot => "HKCR",
            Self::CurrentUser => "HKCU",
            Self::LocalMachine => "HKLM",
            Self::Users => "HKU",
            Self::PerformanceData => "HKPD",
            Self::CurrentConfig => "HKCC",
        }
    }

    /// Predefined handle value of the store
    pub const fn predefined_handle(self) -> u32 {
        match self {
            Self::ClassesRoot => 0x8000_0000,
            Self::CurrentUser => 0x8000_0001,
            Self::LocalMachine => 0x8000_0002,
            Self::Users => 0x8000_0003,
            Self::PerformanceData => 0x8000_0004,
            Self::CurrentConfig => 0x8000_0005,
        }
    }

    /// Look up a hive alias (case-insensitive)
    pub fn from_alias(alias: &str) -> Option<Self> {
        ROOT_ALIASES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(alias))
            .map(|(_, store)| *store)
    }
}

impl fmt::Display for RootStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Alias table: short and long hive names
static ROOT_ALIASES: [(&str, RootStore); 12] = [
    ("HKCR", RootStore::ClassesRoot),
    ("HKCU", RootStore::CurrentUser),
    ("HKLM", RootStore::LocalMachine),
    ("HKU", RootStore::Users),
    ("HKPD", RootStore::PerformanceData),
    ("HKCC", RootStore::CurrentConfig),
    ("HKEY_CLASSES_ROOT", RootStore::ClassesRoot),
    ("HKEY_CURRENT_USER", RootStore::CurrentUser),
    ("HKEY_LOCAL_MACHINE", RootStore::LocalMachine),
    ("HKEY_USERS", RootStore::Users),
    ("HKEY_PERFORMANCE_DATA", RootStore::PerformanceData),
    ("HKEY_CURRENT_CONFIG", RootStore::CurrentConfig),
];

/// Location of a key beneath its root store
///
/// Never begins or ends with a separator. Empty denotes the root store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Subpath(String);

impl Subpath {
    /// Build a subpath, dropping leading and trailing separators
    pub fn new(raw: &str) -> Self {
        Self(raw.trim_matches(PATH_SEPARATOR).to_string())
    }

    /// The root store itself
    pub const fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Subpath of the parent key, `None` for the root store
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(PATH_SEPARATOR) {
            Some(pos) => Some(Self::new(&self.0[..pos])),
            None => Some(Self::root()),
        }
    }

    /// Last segment (empty for the root store)
    pub fn leaf(&self) -> &str {
        match self.0.rfind(PATH_SEPARATOR) {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    pub fn join(&self, child: &str) -> Self {
        if self.is_root() {
            Self::new(child)
        } else {
            Self::new(&format!("{}{}{}", self.0, PATH_SEPARATOR, child))
        }
    }
}

impl fmt::Display for Subpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully resolved registry path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RegistryPath {
    pub store: RootStore,
    pub subpath: Subpath,
}

impl RegistryPath {
    pub fn new(store: RootStore, subpath: Subpath) -> Self {
        Self { store, subpath }
    }

    /// Resolve a raw path such as `HKLM:\Software` or `HKEY_USERS\.DEFAULT`
    pub fn parse(raw: &str) -> Result<Self, RegError> {
        let invalid = || RegError::InvalidPath {
            path: raw.to_string(),
        };

        let alias_len = raw
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(raw.len());
        let (alias, rest) = raw.split_at(alias_len);

        // ALIAS, ALIAS:, ALIAS:\... or ALIAS\...
        let rest = rest.strip_prefix(':').unwrap_or(rest);
        if alias.is_empty() || !(rest.is_empty() || rest.starts_with(PATH_SEPARATOR)) {
            return Err(invalid());
        }
        let store = RootStore::from_alias(alias).ok_or_else(invalid)?;
        let subpath = Subpath::new(rest);

        Ok(Self { store, subpath })
    }

    /// Full key name: `HKEY_LOCAL_MACHINE\SOFTWARE\...`
    pub fn full_name(&self) -> String {
        if self.subpath.is_root() {
            self.store.name().to_string()
        } else {
            format!("{}{}{}", self.store.name(), PATH_SEPARATOR, self.subpath)
        }
    }
}

impl FromStr for RegistryPath {
    type Err = RegError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RegistryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Subpaths grouped by root store
///
/// Stores keep first-seen order; subpaths keep input order and may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedPaths {
    groups: Vec<(RootStore, Vec<Subpath>)>,
}

impl GroupedPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, store: RootStore, subpath: Subpath) {
        match self.groups.iter_mut().find(|(s, _)| *s == store) {
            Some((_, subpaths)) => subpaths.push(subpath),
            None => self.groups.push((store, vec![subpath])),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (RootStore, &[Subpath])> {
        self.groups.iter().map(|(store, subpaths)| (*store, subpaths.as_slice()))
    }

    pub fn stores(&self) -> impl Iterator<Item = RootStore> + '_ {
        self.groups.iter().map(|(store, _)| *store)
    }

    pub fn get(&self, store: RootStore) -> Option<&[Subpath]> {
        self.groups
            .iter()
            .find(|(s, _)| *s == store)
            .map(|(_, subpaths)| subpaths.as_slice())
    }

    /// First resolved path of the batch
    pub fn first(&self) -> Option<RegistryPath> {
        let (store, subpaths) = self.groups.first()?;
        subpaths
            .first()
            .map(|subpath| RegistryPath::new(*store, subpath.clone()))
    }

    /// Number of root stores
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of subpaths across all stores
    pub fn path_count(&self) -> usize {
        self.groups.iter().map(|(_, subpaths)| subpaths.len()).sum()
    }
}

/// Resolve a batch of raw paths
///
/// Unresolvable paths produce an `InvalidPath` record each; the rest of the
/// batch is still grouped.
pub fn group_paths<I, S>(paths: I) -> (GroupedPaths, Vec<ErrorRecord>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut grouped = GroupedPaths::new();
    let mut errors = Vec::new();

    for raw in paths {
        let raw = raw.as_ref();
        match RegistryPath::parse(raw) {
            Ok(path) => grouped.push(path.store, path.subpath),
            Err(err) => {
                log::debug!("rejecting path {raw:?}: {err}");
                errors.push(ErrorRecord::new(error_ids::INVALID_PATH, raw, err));
            }
        }
    }

    (grouped, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ErrorCategory;
    use proptest::prelude::*;

    #[test]
    fn test_parse_forms() {
        let path = RegistryPath::parse("HKLM:\\SOFTWARE\\Microsoft").unwrap();
        assert_eq!(path.store, RootStore::LocalMachine);
        assert_eq!(path.subpath.as_str(), "SOFTWARE\\Microsoft");

        let path = RegistryPath::parse("hkey_users\\.DEFAULT\\").unwrap();
        assert_eq!(path.store, RootStore::Users);
        assert_eq!(path.subpath.as_str(), ".DEFAULT");

        let path = RegistryPath::parse("HKCU:\\").unwrap();
        assert_eq!(path.store, RootStore::CurrentUser);
        assert!(path.subpath.is_root());

        let path = RegistryPath::parse("HKCC").unwrap();
        assert_eq!(path.store, RootStore::CurrentConfig);
        assert!(path.subpath.is_root());
    }

    #[test]
    fn test_parse_rejects_unknown_alias() {
        for raw in ["BOGUS:\\X", "", "\\SOFTWARE", "HKLMX\\A", "HK-LM\\A", " HKLM\\A"] {
            let err = RegistryPath::parse(raw).unwrap_err();
            assert_eq!(err.category(), ErrorCategory::InvalidArgument, "{raw:?}");
        }
    }

    #[test]
    fn test_parse_rejects_drive_relative_forms() {
        for raw in ["HKLM:X", "HKLM:SOFTWARE\\A", "HKLM::\\A", "HKCU:.DEFAULT"] {
            let err = RegistryPath::parse(raw).unwrap_err();
            assert_eq!(err, RegError::InvalidPath { path: raw.to_string() }, "{raw:?}");
        }
    }

    #[test]
    fn test_parse_keeps_colons_inside_key_names() {
        let path = RegistryPath::parse("HKLM:\\SOFTWARE\\A:").unwrap();
        assert_eq!(path.subpath.as_str(), "SOFTWARE\\A:");

        let path = RegistryPath::parse("HKCU\\Printers:\\Port:1").unwrap();
        assert_eq!(path.subpath.as_str(), "Printers:\\Port:1");
        assert_eq!(path.full_name(), "HKEY_CURRENT_USER\\Printers:\\Port:1");
    }

    #[test]
    fn test_full_name() {
        let path = RegistryPath::parse("HKLM:\\SYSTEM\\Select").unwrap();
        assert_eq!(path.full_name(), "HKEY_LOCAL_MACHINE\\SYSTEM\\Select");
        assert_eq!(
            RegistryPath::parse(&path.full_name()).unwrap(),
            path
        );
        let root = RegistryPath::parse("HKU:").unwrap();
        assert_eq!(root.full_name(), "HKEY_USERS");
    }

    #[test]
    fn test_subpath_navigation() {
        let sub = Subpath::new("A\\B\\C");
        assert_eq!(sub.depth(), 3);
        assert_eq!(sub.leaf(), "C");
        assert_eq!(sub.parent(), Some(Subpath::new("A\\B")));
        assert_eq!(Subpath::new("A").parent(), Some(Subpath::root()));
        assert_eq!(Subpath::root().parent(), None);
        assert_eq!(Subpath::root().join("X"), Subpath::new("X"));
        assert_eq!(sub.join("D").as_str(), "A\\B\\C\\D");
    }

    #[test]
    fn test_group_paths_partial_failure() {
        let (grouped, errors) = group_paths([
            "HKLM:\\SOFTWARE",
            "BOGUS:\\X",
            "HKCU\\Console",
            "HKEY_LOCAL_MACHINE\\SYSTEM",
            "HKLM:\\SOFTWARE",
        ]);

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id, error_ids::INVALID_PATH);
        assert_eq!(errors[0].target, "BOGUS:\\X");

        let stores: Vec<_> = grouped.stores().collect();
        assert_eq!(stores, vec![RootStore::LocalMachine, RootStore::CurrentUser]);

        let hklm: Vec<_> = grouped
            .get(RootStore::LocalMachine)
            .unwrap()
            .iter()
            .map(Subpath::as_str)
            .collect();
        assert_eq!(hklm, vec!["SOFTWARE", "SYSTEM", "SOFTWARE"]);
        assert_eq!(grouped.path_count(), 4);
        assert_eq!(
            grouped.first(),
            Some(RegistryPath::new(RootStore::LocalMachine, Subpath::new("SOFTWARE")))
        );
    }

    proptest! {
        #[test]
        fn prop_drive_marker_is_optional(
            alias_index in 0usize..12,
            segments in proptest::collection::vec("[A-Za-z0-9 ._-]{1,8}", 0..4),
        ) {
            let alias = ROOT_ALIASES[alias_index].0;
            let subpath = segments.join("\\");

            let with_marker = RegistryPath::parse(&format!("{alias}:\\{subpath}")).unwrap();
            let without_marker = RegistryPath::parse(&format!("{alias}\\{subpath}")).unwrap();

            prop_assert_eq!(&with_marker, &without_marker);
            prop_assert_eq!(with_marker.store, ROOT_ALIASES[alias_index].1);
            prop_assert_eq!(with_marker.subpath.as_str(), subpath.as_str());
        }
    }
}
