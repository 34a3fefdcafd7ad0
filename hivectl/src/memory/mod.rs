//! In-Process Registry
//!
//! [`MemoryRegistry`] implements [`RegistryApi`] over per-host key pools:
//!
//! - **Machines**: one key pool per host, each with the standard hives.
//!   The empty host is the local machine; unknown hosts are unreachable.
//! - **Handles**: a flat handle table. Handles are multiples of 4 and each
//!   entry carries the access mask granted at open time.
//! - **Hive files**: staged [`KeyTree`] images that `load_hive` mounts and
//!   `unload_hive` writes back.
//! - **Privileges**: held and enabled process privileges.
//!
//! Failure hooks ([`MemoryRegistry::deny`], [`MemoryRegistry::fail_copies_into`],
//! [`MemoryRegistry::conceal_hosts`]) let callers reproduce the error paths a
//! real store produces.
//!
//! # Handle Format
//!
//! ```text
//! handle = (slot + 1) * 4
//! ```

pub mod hive;
pub mod key;

pub use hive::Machine;
pub use key::{KeyFlags, KeyNode, KeyPool, KeyTree, KeyValue};

use spin::Mutex;

use crate::native::{
    CreateOptions, KeyHandle, KeyRights, PermissionCheck, Privilege, RegistryApi, RegistryView,
    ValueOptions,
};
use crate::path::{RootStore, Subpath, PATH_SEPARATOR};
use crate::status::NativeStatus;
use crate::value::{PropertyValue, ValueKind};

/// Handle increment (handles are multiples of 4)
pub const HANDLE_INCREMENT: u32 = 4;

/// Handle table entry
#[derive(Debug, Clone, Copy)]
struct HandleEntry {
    machine: usize,
    key: usize,
    generation: u32,
    access_mask: KeyRights,
}

#[derive(Debug, Default)]
struct State {
    machines: Vec<Machine>,
    handles: Vec<Option<HandleEntry>>,
    held: Vec<Privilege>,
    enabled: Vec<Privilege>,
    hive_files: Vec<(String, KeyTree)>,
    mounts: Vec<(usize, usize, String)>,
    denied: Vec<(String, String)>,
    copy_failures: Vec<(String, i32)>,
    conceal_hosts: bool,
}

impl State {
    fn machine_index(&self, host: &str) -> Option<usize> {
        self.machines
            .iter()
            .position(|m| m.host.eq_ignore_ascii_case(host))
    }

    fn insert_handle(&mut self, entry: HandleEntry) -> KeyHandle {
        let slot = match self.handles.iter().position(Option::is_none) {
            Some(slot) => {
                self.handles[slot] = Some(entry);
                slot
            }
            None => {
                self.handles.push(Some(entry));
                self.handles.len() - 1
            }
        };
        KeyHandle((slot as u32 + 1) * HANDLE_INCREMENT)
    }

    fn slot(handle: KeyHandle) -> Option<usize> {
        let raw = handle.raw();
        if raw == 0 || raw % HANDLE_INCREMENT != 0 {
            return None;
        }
        Some((raw / HANDLE_INCREMENT - 1) as usize)
    }

    fn entry(&self, handle: KeyHandle) -> Result<HandleEntry, NativeStatus> {
        Self::slot(handle)
            .and_then(|slot| self.handles.get(slot).copied().flatten())
            .ok_or(NativeStatus::INVALID_HANDLE)
    }

    /// Resolve a handle to a live key
    fn resolve(&self, handle: KeyHandle) -> Result<HandleEntry, NativeStatus> {
        let entry = self.entry(handle)?;
        if self.machines[entry.machine].pool.is_live(entry.key, entry.generation) {
            Ok(entry)
        } else {
            Err(NativeStatus::KEY_DELETED)
        }
    }

    fn resolve_with(&self, handle: KeyHandle, needed: KeyRights) -> Result<HandleEntry, NativeStatus> {
        let entry = self.resolve(handle)?;
        if entry.access_mask.contains(needed) {
            Ok(entry)
        } else {
            Err(NativeStatus::ACCESS_DENIED)
        }
    }

    fn open_entry(&mut self, machine: usize, key: usize, access_mask: KeyRights) -> KeyHandle {
        let generation = self.machines[machine]
            .pool
            .get(key)
            .map(|k| k.generation)
            .unwrap_or_default();
        self.insert_handle(HandleEntry {
            machine,
            key,
            generation,
            access_mask,
        })
    }

    fn check_denied(&self, machine: usize, key: usize) -> Result<(), NativeStatus> {
        let m = &self.machines[machine];
        let name = m.pool.full_name(key).unwrap_or_default();
        let denied = self
            .denied
            .iter()
            .any(|(host, path)| host.eq_ignore_ascii_case(&m.host) && path.eq_ignore_ascii_case(&name));
        if denied {
            Err(NativeStatus::ACCESS_DENIED)
        } else {
            Ok(())
        }
    }

    fn is_enabled(&self, privilege: Privilege) -> bool {
        self.enabled.contains(&privilege)
    }

    /// Parent key and leaf name of `subpath` beneath `start`
    fn split_leaf(&self, machine: usize, start: usize, subpath: &Subpath) -> Result<(usize, String), NativeStatus> {
        let parent_path = subpath.parent().ok_or(NativeStatus::INVALID_PARAMETER)?;
        let parent = self.machines[machine]
            .pool
            .lookup(start, &parent_path)
            .ok_or(NativeStatus::FILE_NOT_FOUND)?;
        Ok((parent, subpath.leaf().to_string()))
    }
}

/// In-process registry store
#[derive(Debug)]
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    /// Create a registry with only the local machine
    pub fn new() -> Self {
        let state = State {
            machines: vec![Machine::new("")],
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make a remote host reachable
    pub fn add_host(&self, host: &str) {
        let mut state = self.state.lock();
        if state.machine_index(host).is_none() {
            log::debug!("adding host {host:?}");
            state.machines.push(Machine::new(host));
        }
    }

    pub fn with_host(self, host: &str) -> Self {
        self.add_host(host);
        self
    }

    /// Grant a privilege to the process (disabled until adjusted)
    pub fn grant_privilege(&self, privilege: Privilege) {
        let mut state = self.state.lock();
        if !state.held.contains(&privilege) {
            state.held.push(privilege);
        }
    }

    pub fn is_privilege_enabled(&self, privilege: Privilege) -> bool {
        self.state.lock().is_enabled(privilege)
    }

    /// Stage a hive file that `load_hive` can mount
    pub fn stage_hive_file(&self, file: &str, image: KeyTree) {
        let mut state = self.state.lock();
        state.hive_files.retain(|(f, _)| !f.eq_ignore_ascii_case(file));
        state.hive_files.push((file.to_string(), image));
    }

    /// Contents of a staged hive file
    pub fn hive_file(&self, file: &str) -> Option<KeyTree> {
        self.state
            .lock()
            .hive_files
            .iter()
            .find(|(f, _)| f.eq_ignore_ascii_case(file))
            .map(|(_, image)| image.clone())
    }

    /// Refuse every open of `full_name` on `host`
    pub fn deny(&self, host: &str, full_name: &str) {
        self.state
            .lock()
            .denied
            .push((host.to_string(), full_name.to_string()));
    }

    /// Make `copy_tree` into the key named `full_name` return `code`
    pub fn fail_copies_into(&self, full_name: &str, code: i32) {
        self.state
            .lock()
            .copy_failures
            .push((full_name.to_string(), code));
    }

    /// Make `key_host` unable to report hosts
    pub fn conceal_hosts(&self, conceal: bool) {
        self.state.lock().conceal_hosts = conceal;
    }

    /// Create a key (and missing ancestors) outside any handle
    pub fn seed_key(&self, host: &str, store: RootStore, subpath: &str) -> Option<()> {
        let mut state = self.state.lock();
        let machine = state.machine_index(host)?;
        let m = &mut state.machines[machine];
        let mut current = m.root(store);
        for segment in Subpath::new(subpath).segments() {
            current = match m.pool.find_subkey(current, segment) {
                Some(existing) => existing,
                None => {
                    let inherited = m.pool.get(current)?.flags & KeyFlags::VOLATILE;
                    m.pool.add_subkey(current, segment, inherited)?
                }
            };
        }
        Some(())
    }

    /// Set a value outside any handle, creating the key if needed
    pub fn seed_value(&self, host: &str, store: RootStore, subpath: &str, name: &str, data: PropertyValue) -> Option<()> {
        self.seed_key(host, store, subpath)?;
        let mut state = self.state.lock();
        let machine = state.machine_index(host)?;
        let m = &mut state.machines[machine];
        let key = m.lookup(store, &Subpath::new(subpath))?;
        m.pool.get_mut(key)?.set_value(name, data);
        Some(())
    }

    pub fn key_exists(&self, host: &str, store: RootStore, subpath: &str) -> bool {
        let state = self.state.lock();
        state
            .machine_index(host)
            .and_then(|m| state.machines[m].lookup(store, &Subpath::new(subpath)))
            .is_some()
    }

    /// Value stored at a key, read outside any handle
    pub fn peek_value(&self, host: &str, store: RootStore, subpath: &str, name: &str) -> Option<PropertyValue> {
        let state = self.state.lock();
        let m = &state.machines[state.machine_index(host)?];
        let key = m.lookup(store, &Subpath::new(subpath))?;
        m.pool.get(key)?.find_value(name).map(|v| v.data.clone())
    }

    /// Subkey names of a key, read outside any handle
    pub fn peek_subkeys(&self, host: &str, store: RootStore, subpath: &str) -> Option<Vec<String>> {
        let state = self.state.lock();
        let m = &state.machines[state.machine_index(host)?];
        let key = m.lookup(store, &Subpath::new(subpath))?;
        Some(
            m.pool
                .get(key)?
                .subkeys
                .iter()
                .filter_map(|&s| m.pool.get(s).map(|k| k.name.clone()))
                .collect(),
        )
    }

    /// Number of handles currently open
    pub fn open_handle_count(&self) -> usize {
        self.state.lock().handles.iter().flatten().count()
    }
}

impl RegistryApi for MemoryRegistry {
    fn open_root(&self, host: &str, store: RootStore, view: RegistryView) -> Result<KeyHandle, NativeStatus> {
        let mut state = self.state.lock();
        let machine = state.machine_index(host).ok_or(NativeStatus::BAD_NETPATH)?;
        let root = state.machines[machine].root(store);
        state.check_denied(machine, root)?;

        log::debug!("opened {store} on {host:?} ({view:?} view)");
        Ok(state.open_entry(machine, root, KeyRights::FULL_CONTROL))
    }

    fn close(&self, key: KeyHandle) -> Result<(), NativeStatus> {
        let mut state = self.state.lock();
        let slot = State::slot(key).ok_or(NativeStatus::INVALID_HANDLE)?;
        match state.handles.get_mut(slot) {
            Some(entry @ Some(_)) => {
                *entry = None;
                Ok(())
            }
            _ => Err(NativeStatus::INVALID_HANDLE),
        }
    }

    fn open_subkey(
        &self,
        parent: KeyHandle,
        subpath: &Subpath,
        _check: PermissionCheck,
        rights: KeyRights,
    ) -> Result<KeyHandle, NativeStatus> {
        let mut state = self.state.lock();
        let entry = state.resolve(parent)?;
        let key = state.machines[entry.machine]
            .pool
            .lookup(entry.key, subpath)
            .ok_or(NativeStatus::FILE_NOT_FOUND)?;
        state.check_denied(entry.machine, key)?;
        Ok(state.open_entry(entry.machine, key, rights))
    }

    fn create_subkey(
        &self,
        parent: KeyHandle,
        subpath: &Subpath,
        _check: PermissionCheck,
        options: CreateOptions,
    ) -> Result<KeyHandle, NativeStatus> {
        let mut state = self.state.lock();
        let entry = state.resolve(parent)?;
        if subpath.is_root() {
            return Err(NativeStatus::INVALID_PARAMETER);
        }

        let volatile = options.contains(CreateOptions::VOLATILE);
        let mut current = entry.key;
        for segment in subpath.segments() {
            let existing = state.machines[entry.machine].pool.find_subkey(current, segment);
            current = match existing {
                Some(child) => child,
                None => {
                    state.check_denied(entry.machine, current)?;
                    let pool = &mut state.machines[entry.machine].pool;
                    let parent_volatile = pool.get(current).is_some_and(KeyNode::is_volatile);
                    if parent_volatile && !volatile {
                        return Err(NativeStatus::CHILD_MUST_BE_VOLATILE);
                    }
                    let flags = if volatile { KeyFlags::VOLATILE } else { KeyFlags::empty() };
                    pool.add_subkey(current, segment, flags)
                        .ok_or(NativeStatus::KEY_DELETED)?
                }
            };
        }

        state.check_denied(entry.machine, current)?;
        Ok(state.open_entry(entry.machine, current, KeyRights::FULL_CONTROL))
    }

    fn delete_subkey(&self, parent: KeyHandle, subpath: &Subpath) -> Result<(), NativeStatus> {
        let mut state = self.state.lock();
        let entry = state.resolve(parent)?;
        let pool = &state.machines[entry.machine].pool;
        let key = pool.lookup(entry.key, subpath).ok_or(NativeStatus::FILE_NOT_FOUND)?;
        let node = pool.get(key).ok_or(NativeStatus::FILE_NOT_FOUND)?;
        if subpath.is_root() || node.is_hive_root() || !node.subkeys.is_empty() {
            return Err(NativeStatus::ACCESS_DENIED);
        }
        state.check_denied(entry.machine, key)?;
        state.machines[entry.machine].pool.free_subtree(key);
        Ok(())
    }

    fn delete_subkey_tree(&self, parent: KeyHandle, subpath: &Subpath) -> Result<(), NativeStatus> {
        let mut state = self.state.lock();
        let entry = state.resolve(parent)?;
        let pool = &state.machines[entry.machine].pool;
        let key = pool.lookup(entry.key, subpath).ok_or(NativeStatus::FILE_NOT_FOUND)?;
        let is_hive_root = pool.get(key).is_some_and(KeyNode::is_hive_root);
        if subpath.is_root() || is_hive_root {
            return Err(NativeStatus::ACCESS_DENIED);
        }
        state.check_denied(entry.machine, key)?;
        state.machines[entry.machine].pool.free_subtree(key);
        Ok(())
    }

    fn subkey_names(&self, key: KeyHandle) -> Result<Vec<String>, NativeStatus> {
        let state = self.state.lock();
        let entry = state.resolve_with(key, KeyRights::ENUMERATE_SUB_KEYS)?;
        let pool = &state.machines[entry.machine].pool;
        let node = pool.get(entry.key).ok_or(NativeStatus::KEY_DELETED)?;
        Ok(node
            .subkeys
            .iter()
            .filter_map(|&s| pool.get(s).map(|k| k.name.clone()))
            .collect())
    }

    fn value_names(&self, key: KeyHandle) -> Result<Vec<String>, NativeStatus> {
        let state = self.state.lock();
        let entry = state.resolve_with(key, KeyRights::QUERY_VALUES)?;
        let node = state.machines[entry.machine]
            .pool
            .get(entry.key)
            .ok_or(NativeStatus::KEY_DELETED)?;
        Ok(node.values.iter().map(|v| v.name.clone()).collect())
    }

    fn get_value(&self, key: KeyHandle, name: &str, options: ValueOptions) -> Result<PropertyValue, NativeStatus> {
        let state = self.state.lock();
        let entry = state.resolve_with(key, KeyRights::QUERY_VALUES)?;
        let value = state.machines[entry.machine]
            .pool
            .get(entry.key)
            .and_then(|k| k.find_value(name))
            .ok_or(NativeStatus::FILE_NOT_FOUND)?;

        Ok(match &value.data {
            PropertyValue::ExpandString(s) if !options.contains(ValueOptions::DO_NOT_EXPAND) => {
                PropertyValue::ExpandString(expand_environment(s))
            }
            other => other.clone(),
        })
    }

    fn value_kind(&self, key: KeyHandle, name: &str) -> Result<ValueKind, NativeStatus> {
        let state = self.state.lock();
        let entry = state.resolve_with(key, KeyRights::QUERY_VALUES)?;
        state.machines[entry.machine]
            .pool
            .get(entry.key)
            .and_then(|k| k.find_value(name))
            .map(|v| v.data.kind())
            .ok_or(NativeStatus::FILE_NOT_FOUND)
    }

    fn set_value(&self, key: KeyHandle, name: &str, value: &PropertyValue) -> Result<(), NativeStatus> {
        let mut state = self.state.lock();
        let entry = state.resolve_with(key, KeyRights::SET_VALUE)?;
        let node = state.machines[entry.machine]
            .pool
            .get_mut(entry.key)
            .ok_or(NativeStatus::KEY_DELETED)?;
        node.set_value(name, value.clone());
        Ok(())
    }

    fn delete_value(&self, key: KeyHandle, name: &str) -> Result<(), NativeStatus> {
        let mut state = self.state.lock();
        let entry = state.resolve_with(key, KeyRights::SET_VALUE)?;
        let node = state.machines[entry.machine]
            .pool
            .get_mut(entry.key)
            .ok_or(NativeStatus::KEY_DELETED)?;
        if node.remove_value(name) {
            Ok(())
        } else {
            Err(NativeStatus::FILE_NOT_FOUND)
        }
    }

    fn copy_tree(&self, source: KeyHandle, dest: KeyHandle) -> i32 {
        let mut state = self.state.lock();
        let (src, dst) = match (state.resolve(source), state.resolve(dest)) {
            (Ok(src), Ok(dst)) => (src, dst),
            (Err(status), _) | (_, Err(status)) => return status.code(),
        };

        let dest_name = state.machines[dst.machine]
            .pool
            .full_name(dst.key)
            .unwrap_or_default();
        let injected = state
            .copy_failures
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&dest_name))
            .map(|(_, code)| *code);
        if let Some(code) = injected {
            return code;
        }

        // Snapshot first so copying a key into its own subtree terminates
        let Some(tree) = state.machines[src.machine].pool.snapshot(src.key) else {
            return NativeStatus::KEY_DELETED.code();
        };
        match state.machines[dst.machine].pool.merge(dst.key, &tree) {
            Some(()) => NativeStatus::SUCCESS.code(),
            None => NativeStatus::KEY_DELETED.code(),
        }
    }

    fn rename_key(&self, parent: KeyHandle, subpath: &Subpath, new_name: &str) -> i32 {
        let mut state = self.state.lock();
        let entry = match state.resolve(parent) {
            Ok(entry) => entry,
            Err(status) => return status.code(),
        };
        if new_name.is_empty() || new_name.contains(PATH_SEPARATOR) {
            return NativeStatus::INVALID_PARAMETER.code();
        }

        let pool = &state.machines[entry.machine].pool;
        let Some(key) = pool.lookup(entry.key, subpath) else {
            return NativeStatus::FILE_NOT_FOUND.code();
        };
        let Some(node) = pool.get(key) else {
            return NativeStatus::FILE_NOT_FOUND.code();
        };
        let Some(parent_key) = node.parent.filter(|_| !subpath.is_root() && !node.is_hive_root()) else {
            return NativeStatus::ACCESS_DENIED.code();
        };
        if let Some(clash) = pool.find_subkey(parent_key, new_name) {
            if clash != key {
                return NativeStatus::ALREADY_EXISTS.code();
            }
        }
        if let Err(status) = state.check_denied(entry.machine, key) {
            return status.code();
        }

        match state.machines[entry.machine].pool.get_mut(key) {
            Some(node) => {
                node.name = new_name.to_string();
                NativeStatus::SUCCESS.code()
            }
            None => NativeStatus::KEY_DELETED.code(),
        }
    }

    fn load_hive(&self, parent: KeyHandle, subpath: &Subpath, file: &str) -> i32 {
        let mut state = self.state.lock();
        let entry = match state.resolve(parent) {
            Ok(entry) => entry,
            Err(status) => return status.code(),
        };
        if !state.is_enabled(Privilege::Restore) {
            return NativeStatus::PRIVILEGE_NOT_HELD.code();
        }

        let m = &state.machines[entry.machine];
        let mountable = matches!(
            m.store_of_root(entry.key),
            Some(RootStore::LocalMachine | RootStore::Users)
        );
        if !mountable || subpath.depth() != 1 {
            return NativeStatus::INVALID_PARAMETER.code();
        }
        if m.pool.lookup(entry.key, subpath).is_some() {
            return NativeStatus::ALREADY_EXISTS.code();
        }

        let Some((file_name, image)) = state
            .hive_files
            .iter()
            .find(|(f, _)| f.eq_ignore_ascii_case(file))
            .cloned()
        else {
            return NativeStatus::FILE_NOT_FOUND.code();
        };

        match state.machines[entry.machine].mount(entry.key, subpath.leaf(), &image) {
            Some(mounted) => {
                state.mounts.push((entry.machine, mounted, file_name));
                NativeStatus::SUCCESS.code()
            }
            None => NativeStatus::KEY_DELETED.code(),
        }
    }

    fn unload_hive(&self, parent: KeyHandle, subpath: &Subpath) -> i32 {
        let mut state = self.state.lock();
        let entry = match state.resolve(parent) {
            Ok(entry) => entry,
            Err(status) => return status.code(),
        };
        if !state.is_enabled(Privilege::Restore) {
            return NativeStatus::PRIVILEGE_NOT_HELD.code();
        }

        let Some(key) = state.machines[entry.machine].pool.lookup(entry.key, subpath) else {
            return NativeStatus::FILE_NOT_FOUND.code();
        };
        let Some(mount) = state
            .mounts
            .iter()
            .position(|(machine, mounted, _)| *machine == entry.machine && *mounted == key)
        else {
            return NativeStatus::INVALID_PARAMETER.code();
        };

        let (_, _, file) = state.mounts.remove(mount);
        let pool = &mut state.machines[entry.machine].pool;
        let image = pool.snapshot(key).unwrap_or_default();
        pool.free_subtree(key);

        state.hive_files.retain(|(f, _)| !f.eq_ignore_ascii_case(&file));
        state.hive_files.push((file, image));
        NativeStatus::SUCCESS.code()
    }

    fn adjust_privilege(&self, privilege: Privilege, enable: bool) -> Result<bool, NativeStatus> {
        let mut state = self.state.lock();
        if !state.held.contains(&privilege) {
            return Err(NativeStatus::PRIVILEGE_NOT_HELD);
        }
        let was_enabled = state.is_enabled(privilege);
        if enable && !was_enabled {
            state.enabled.push(privilege);
        } else if !enable {
            state.enabled.retain(|p| *p != privilege);
        }
        log::debug!("{} {}", privilege.name(), if enable { "enabled" } else { "disabled" });
        Ok(was_enabled)
    }

    fn granted_access(&self, key: KeyHandle) -> Result<KeyRights, NativeStatus> {
        let state = self.state.lock();
        state.entry(key).map(|e| e.access_mask)
    }

    fn key_name(&self, key: KeyHandle) -> Result<String, NativeStatus> {
        let state = self.state.lock();
        let entry = state.resolve(key)?;
        state.machines[entry.machine]
            .pool
            .full_name(entry.key)
            .ok_or(NativeStatus::KEY_DELETED)
    }

    fn key_host(&self, key: KeyHandle) -> Result<Option<String>, NativeStatus> {
        let state = self.state.lock();
        let entry = state.entry(key)?;
        if state.conceal_hosts {
            return Ok(None);
        }
        Ok(Some(state.machines[entry.machine].host.clone()))
    }
}

/// Substitute `%NAME%` references from the process environment
///
/// Unknown variables are left as written.
pub fn expand_environment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
