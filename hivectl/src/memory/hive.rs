//! Registry Hives
//!
//! A hive is a discrete body of registry keys, subkeys, and values. Every
//! machine starts with the standard layout:
//!
//! # HKEY_LOCAL_MACHINE
//! - SYSTEM: Control sets and the `Select` key
//! - SOFTWARE: Installed software settings
//! - HARDWARE: Hardware descriptions (volatile)
//! - SAM, SECURITY
//!
//! # HKEY_USERS
//! - .DEFAULT: Default user profile
//!
//! HKEY_CURRENT_USER, HKEY_CURRENT_CONFIG and HKEY_CLASSES_ROOT get a few
//! well-known keys; HKEY_PERFORMANCE_DATA stays empty.
//!
//! Further hives can be mounted from [`KeyTree`] images under HKLM or HKU.

use crate::path::{RootStore, Subpath};
use crate::value::PropertyValue;

use super::key::{KeyFlags, KeyNode, KeyPool, KeyTree};

/// One host's registry
#[derive(Debug)]
pub struct Machine {
    pub host: String,
    pub pool: KeyPool,
    roots: [usize; RootStore::ALL.len()],
}

impl Machine {
    /// Create a machine with the standard hive structure
    pub fn new(host: &str) -> Self {
        let mut pool = KeyPool::new();
        let roots = RootStore::ALL.map(|store| {
            pool.allocate(KeyNode::new(store.name(), None, KeyFlags::HIVE_ROOT))
        });

        let mut machine = Self {
            host: host.to_string(),
            pool,
            roots,
        };
        machine.init_local_machine();
        machine.init_users();
        machine.init_current_user();
        machine.init_current_config();
        machine.init_classes_root();
        machine
    }

    /// Root key of a store
    pub fn root(&self, store: RootStore) -> usize {
        let slot = RootStore::ALL
            .iter()
            .position(|s| *s == store)
            .unwrap_or_default();
        self.roots[slot]
    }

    /// Store a root key belongs to
    pub fn store_of_root(&self, index: usize) -> Option<RootStore> {
        self.roots
            .iter()
            .position(|&r| r == index)
            .map(|slot| RootStore::ALL[slot])
    }

    /// Materialize a hive image as a new hive root under `parent`
    pub fn mount(&mut self, parent: usize, name: &str, image: &KeyTree) -> Option<usize> {
        let index = self
            .pool
            .add_subkey(parent, name, KeyFlags::HIVE_ROOT | KeyFlags::MOUNTED)?;
        self.pool.merge(index, image)?;
        Some(index)
    }

    fn init_local_machine(&mut self) {
        let hklm = self.root(RootStore::LocalMachine);

        self.init_system_hive(hklm);
        self.init_software_hive(hklm);
        self.init_hardware_hive(hklm);

        self.create_hive(hklm, "SAM", KeyFlags::empty());
        self.create_hive(hklm, "SECURITY", KeyFlags::empty());
    }

    fn init_system_hive(&mut self, hklm: usize) {
        let Some(system) = self.create_hive(hklm, "SYSTEM", KeyFlags::empty()) else {
            return;
        };

        self.create_subkey(system, "CurrentControlSet");

        if let Some(cs001) = self.create_subkey(system, "ControlSet001") {
            self.create_subkey(cs001, "Control");
            self.create_subkey(cs001, "Enum");
            self.create_subkey(cs001, "Hardware Profiles");
            self.create_subkey(cs001, "Services");
        }

        if let Some(select) = self.create_subkey(system, "Select") {
            self.set_value(select, "Current", PropertyValue::Int32(1));
            self.set_value(select, "Default", PropertyValue::Int32(1));
            self.set_value(select, "Failed", PropertyValue::Int32(0));
            self.set_value(select, "LastKnownGood", PropertyValue::Int32(1));
        }

        self.create_subkey(system, "Setup");
    }

    fn init_software_hive(&mut self, hklm: usize) {
        let Some(software) = self.create_hive(hklm, "SOFTWARE", KeyFlags::empty()) else {
            return;
        };

        self.create_subkey(software, "Classes");
        self.create_subkey(software, "Clients");

        if let Some(ms) = self.create_subkey(software, "Microsoft") {
            if let Some(windows) = self.create_subkey(ms, "Windows") {
                if let Some(cv) = self.create_subkey(windows, "CurrentVersion") {
                    self.set_value(cv, "ProgramFilesDir", PropertyValue::String("C:\\Program Files".into()));
                    self.set_value(cv, "CommonFilesDir", PropertyValue::ExpandString("%ProgramFiles%\\Common Files".into()));
                    self.set_value(cv, "CurrentBuildNumber", PropertyValue::String("1".into()));
                }
            }
            self.create_subkey(ms, "Windows NT");
        }

        self.create_subkey(software, "Policies");
        self.create_subkey(software, "RegisteredApplications");
    }

    fn init_hardware_hive(&mut self, hklm: usize) {
        let Some(hardware) = self.create_hive(hklm, "HARDWARE", KeyFlags::VOLATILE) else {
            return;
        };

        if let Some(desc) = self.create_subkey(hardware, "DESCRIPTION") {
            if let Some(sys) = self.create_subkey(desc, "System") {
                self.set_value(sys, "Identifier", PropertyValue::String("AT/AT COMPATIBLE".into()));
                self.create_subkey(sys, "CentralProcessor");
                self.create_subkey(sys, "FloatingPointProcessor");
            }
        }

        self.create_subkey(hardware, "DEVICEMAP");
        self.create_subkey(hardware, "RESOURCEMAP");
    }

    fn init_users(&mut self) {
        let hku = self.root(RootStore::Users);
        if let Some(default) = self.create_hive(hku, ".DEFAULT", KeyFlags::empty()) {
            self.create_subkey(default, "Software");
            self.create_subkey(default, "Environment");
        }
    }

    fn init_current_user(&mut self) {
        let hkcu = self.root(RootStore::CurrentUser);
        self.create_subkey(hkcu, "Software");
        if let Some(env) = self.create_subkey(hkcu, "Environment") {
            self.set_value(env, "TEMP", PropertyValue::ExpandString("%USERPROFILE%\\AppData\\Local\\Temp".into()));
        }
        self.create_subkey(hkcu, "Control Panel");
    }

    fn init_current_config(&mut self) {
        let hkcc = self.root(RootStore::CurrentConfig);
        self.create_subkey(hkcc, "Software");
        self.create_subkey(hkcc, "System");
    }

    fn init_classes_root(&mut self) {
        let hkcr = self.root(RootStore::ClassesRoot);
        self.create_subkey(hkcr, "CLSID");
        self.create_subkey(hkcr, "Interface");
    }

    fn create_hive(&mut self, parent: usize, name: &str, flags: KeyFlags) -> Option<usize> {
        self.pool.add_subkey(parent, name, flags | KeyFlags::HIVE_ROOT)
    }

    /// Helper: create a subkey inheriting the parent's volatility
    fn create_subkey(&mut self, parent: usize, name: &str) -> Option<usize> {
        let inherited = self.pool.get(parent)?.flags & KeyFlags::VOLATILE;
        self.pool.add_subkey(parent, name, inherited)
    }

    fn set_value(&mut self, key: usize, name: &str, data: PropertyValue) {
        if let Some(key) = self.pool.get_mut(key) {
            key.set_value(name, data);
        }
    }

    /// Look up a key by store and subpath
    pub fn lookup(&self, store: RootStore, subpath: &Subpath) -> Option<usize> {
        self.pool.lookup(self.root(store), subpath)
    }
}
