//! Native Registry Boundary
//!
//! Everything the engines need from the operating system's registry goes
//! through [`RegistryApi`]:
//!
//! - `open_root` - Connect to a root store on a (possibly remote) host
//! - `open_subkey` / `create_subkey` - Open or create a key beneath an open key
//! - `delete_subkey` / `delete_subkey_tree` - Delete a leaf key or a subtree
//! - `subkey_names` / `value_names` - Enumerate a key
//! - `get_value` / `value_kind` / `set_value` / `delete_value` - Named values
//! - `copy_tree` - Atomically copy a subtree from one open key into another
//! - `rename_key` - Rename a subkey
//! - `load_hive` / `unload_hive` - Mount a store-backing file
//! - `adjust_privilege` - Enable or disable a process privilege
//! - `granted_access` - Access mask granted on an open handle
//! - `key_name` / `key_host` - Metadata of an open handle
//!
//! Primitives that report bare return codes (`copy_tree`,
//! `rename_key`, `load_hive`, `unload_hive`) return the raw `i32`; the
//! engines wrap nonzero codes themselves.
//!
//! # Handles
//!
//! A [`KeyHandle`] is an opaque reference scoped to one host and store.
//! Whoever opens a handle closes it, unless the caller asked to keep it
//! ([`Disposal::Keep`]). [`OwnedKey`] ties that rule to scope exit.

use core::fmt;

use serde::Serialize;

use crate::path::{RootStore, Subpath};
use crate::status::NativeStatus;
use crate::value::{PropertyValue, ValueKind};

/// Opaque open reference to a registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct KeyHandle(pub u32);

impl KeyHandle {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

bitflags::bitflags! {
    /// Key access rights
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct KeyRights: u32 {
        const QUERY_VALUES = 0x0001;
        const SET_VALUE = 0x0002;
        const CREATE_SUB_KEY = 0x0004;
        const ENUMERATE_SUB_KEYS = 0x0008;
        const NOTIFY = 0x0010;
        const CREATE_LINK = 0x0020;
        const DELETE = 0x0001_0000;
        const READ_PERMISSIONS = 0x0002_0000;
        const CHANGE_PERMISSIONS = 0x0004_0000;
        const TAKE_OWNERSHIP = 0x0008_0000;

        const READ_KEY = Self::READ_PERMISSIONS.bits()
            | Self::QUERY_VALUES.bits()
            | Self::ENUMERATE_SUB_KEYS.bits()
            | Self::NOTIFY.bits();
        const WRITE_KEY = Self::READ_PERMISSIONS.bits()
            | Self::SET_VALUE.bits()
            | Self::CREATE_SUB_KEY.bits();
        const FULL_CONTROL = 0x000F_003F;
    }
}

impl KeyRights {
    /// Rights used by traversal when the caller names none
    pub const WALK_DEFAULT: Self = Self::ENUMERATE_SUB_KEYS
        .union(Self::QUERY_VALUES)
        .union(Self::NOTIFY)
        .union(Self::SET_VALUE);

    /// Destination rights when the source's granted mask is unavailable
    pub const COPY_FALLBACK: Self = Self::ENUMERATE_SUB_KEYS
        .union(Self::QUERY_VALUES)
        .union(Self::SET_VALUE);
}

bitflags::bitflags! {
    /// Options for creating a key
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CreateOptions: u32 {
        /// Key lives in memory only and is lost when the hive unloads
        const VOLATILE = 0x0001;
    }
}

bitflags::bitflags! {
    /// Options for reading a value
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ValueOptions: u32 {
        /// Return expandable strings without substituting %VARIABLE% references
        const DO_NOT_EXPAND = 0x0001;
    }
}

/// How access is checked when opening or creating a subkey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PermissionCheck {
    /// Inherit the parent's check mode
    Default,
    ReadSubTree,
    #[default]
    ReadWriteSubTree,
}

/// Registry view on 64-bit systems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum RegistryView {
    #[default]
    Default,
    Registry32,
    Registry64,
}

/// Process privileges the engines toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Privilege {
    Backup = 17,
    Restore = 18,
}

impl Privilege {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Backup => "SeBackupPrivilege",
            Self::Restore => "SeRestorePrivilege",
        }
    }
}

/// Who closes a handle once an operation is done with it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Disposal {
    /// The operation closes every handle it opened
    #[default]
    Close,
    /// Handles handed back to the caller stay open; the caller closes them
    Keep,
}

impl Disposal {
    pub const fn closes(self) -> bool {
        matches!(self, Self::Close)
    }
}

/// Native registry primitives
///
/// Implementations are external, already-correct stores. Every call blocks
/// until the store answers.
pub trait RegistryApi {
    /// Connect to `store` on `host` (empty host is the local machine)
    fn open_root(
        &self,
        host: &str,
        store: RootStore,
        view: RegistryView,
    ) -> Result<KeyHandle, NativeStatus>;

    fn close(&self, key: KeyHandle) -> Result<(), NativeStatus>;

    /// Open an existing subkey; `FILE_NOT_FOUND` when it does not exist
    fn open_subkey(
        &self,
        parent: KeyHandle,
        subpath: &Subpath,
        check: PermissionCheck,
        rights: KeyRights,
    ) -> Result<KeyHandle, NativeStatus>;

    /// Create a subkey (and any missing ancestors), or open it if present
    fn create_subkey(
        &self,
        parent: KeyHandle,
        subpath: &Subpath,
        check: PermissionCheck,
        options: CreateOptions,
    ) -> Result<KeyHandle, NativeStatus>;

    /// Delete a subkey that has no subkeys of its own
    fn delete_subkey(&self, parent: KeyHandle, subpath: &Subpath) -> Result<(), NativeStatus>;

    fn delete_subkey_tree(&self, parent: KeyHandle, subpath: &Subpath)
        -> Result<(), NativeStatus>;

    fn subkey_names(&self, key: KeyHandle) -> Result<Vec<String>, NativeStatus>;

    /// Value names, the default value included as `""` when set
    fn value_names(&self, key: KeyHandle) -> Result<Vec<String>, NativeStatus>;

    fn get_value(
        &self,
        key: KeyHandle,
        name: &str,
        options: ValueOptions,
    ) -> Result<PropertyValue, NativeStatus>;

    fn value_kind(&self, key: KeyHandle, name: &str) -> Result<ValueKind, NativeStatus>;

    fn set_value(
        &self,
        key: KeyHandle,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), NativeStatus>;

    fn delete_value(&self, key: KeyHandle, name: &str) -> Result<(), NativeStatus>;

    /// Merge the subtree under `source` into `dest`; returns a native code
    fn copy_tree(&self, source: KeyHandle, dest: KeyHandle) -> i32;

    /// Rename `subpath` beneath `parent` to `new_name`; returns a native code
    fn rename_key(&self, parent: KeyHandle, subpath: &Subpath, new_name: &str) -> i32;

    /// Mount `file` at `subpath` beneath `parent`; returns a native code
    fn load_hive(&self, parent: KeyHandle, subpath: &Subpath, file: &str) -> i32;

    fn unload_hive(&self, parent: KeyHandle, subpath: &Subpath) -> i32;

    /// Enable or disable a privilege; returns whether it was enabled before
    fn adjust_privilege(&self, privilege: Privilege, enable: bool) -> Result<bool, NativeStatus>;

    /// Access mask granted when `key` was opened
    fn granted_access(&self, key: KeyHandle) -> Result<KeyRights, NativeStatus>;

    /// Fully qualified name, e.g. `HKEY_LOCAL_MACHINE\SOFTWARE\Vendor`
    fn key_name(&self, key: KeyHandle) -> Result<String, NativeStatus>;

    /// Host the key was opened on; `None` when it cannot be determined
    fn key_host(&self, key: KeyHandle) -> Result<Option<String>, NativeStatus>;
}

/// A handle closed on scope exit unless its disposal is [`Disposal::Keep`]
pub struct OwnedKey<'r, R: RegistryApi + ?Sized> {
    api: &'r R,
    handle: KeyHandle,
    disposal: Disposal,
}

impl<'r, R: RegistryApi + ?Sized> OwnedKey<'r, R> {
    pub fn new(api: &'r R, handle: KeyHandle, disposal: Disposal) -> Self {
        Self {
            api,
            handle,
            disposal,
        }
    }

    pub fn handle(&self) -> KeyHandle {
        self.handle
    }

    pub fn disposal(&self) -> Disposal {
        self.disposal
    }

    /// Hand the handle to the caller; it is no longer closed here
    pub fn release(mut self) -> KeyHandle {
        self.disposal = Disposal::Keep;
        self.handle
    }
}

impl<R: RegistryApi + ?Sized> Drop for OwnedKey<'_, R> {
    fn drop(&mut self) {
        if self.disposal.closes() {
            if let Err(status) = self.api.close(self.handle) {
                log::debug!("closing key {} failed: {}", self.handle, status);
            }
        }
    }
}

impl<R: RegistryApi + ?Sized> fmt::Debug for OwnedKey<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedKey")
            .field("handle", &self.handle)
            .field("disposal", &self.disposal)
            .finish()
    }
}
