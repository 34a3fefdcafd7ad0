//! Key and Property Commands
//!
//! Mutation commands built on the path resolver and [`RegistryApi`]:
//!
//! - [`new_keys`] - create keys (host × store × subpath)
//! - [`remove_keys`] - delete a leaf key or a whole subtree
//! - [`rename_keys`] - rename keys on the local machine
//! - [`add_properties`] / [`remove_properties`] - write or delete named values on open keys
//! - [`mount_hive`] / [`dismount_hive`] - load or unload a store-backing file
//!
//! Every command reports per-item failures and carries on with the rest of
//! its batch. Destructive steps ask a [`Confirm`] first. Store connections
//! opened here are always closed before the command returns; handles passed
//! in by the caller are closed unless the caller keeps them.

use serde::Serialize;

use crate::coerce::{prepare_properties, PropertySpec};
use crate::confirm::{CancelToken, Confirm, Gate, Prompt, Verdict};
use crate::native::{
    CreateOptions, Disposal, KeyHandle, OwnedKey, PermissionCheck, Privilege, RegistryApi,
    RegistryView,
};
use crate::path::{group_paths, GroupedPaths, RegistryPath, RootStore};
use crate::report::Sink;
use crate::status::{error_ids, ErrorCategory, ErrorRecord, NativeStatus, RegError};
use crate::value::PropertyValue;
use crate::walk::KeyRecord;

// ============================================================================
// Shared plumbing
// ============================================================================

/// Open a store connection, reporting failure against the host
fn open_base<'r, R, T>(
    api: &'r R,
    host: &str,
    store: RootStore,
    view: RegistryView,
    sink: &mut dyn Sink<T>,
) -> Option<OwnedKey<'r, R>>
where
    R: RegistryApi + ?Sized,
{
    log::debug!("{host}: opening base key {store}");
    match api.open_root(host, store, view) {
        Ok(handle) => Some(OwnedKey::new(api, handle, Disposal::Close)),
        Err(status) => {
            sink.error(ErrorRecord::new(error_ids::UNABLE_TO_OPEN_BASE_KEY, host, status));
            None
        }
    }
}

/// Resolve raw paths, reporting the ones that do not resolve
fn resolve<S: AsRef<str>, T>(paths: &[S], sink: &mut dyn Sink<T>) -> GroupedPaths {
    let (grouped, errors) = group_paths(paths);
    for error in errors {
        sink.error(error);
    }
    grouped
}

/// Report a stop once the caller has cancelled
fn cancelled<T>(cancel: Option<&CancelToken>, sink: &mut dyn Sink<T>) -> bool {
    if cancel.is_some_and(CancelToken::is_cancelled) {
        sink.error(ErrorRecord::new(error_ids::OPERATION_STOPPED, "", RegError::Stopped));
        true
    } else {
        false
    }
}

fn empty_subpath(store: RootStore, action: &'static str) -> ErrorRecord {
    ErrorRecord::new(
        error_ids::EMPTY_SUB_KEY_PATH,
        store.name(),
        RegError::EmptySubkeyPath { store, action },
    )
}

fn close_unless_kept<R: RegistryApi + ?Sized>(api: &R, key: KeyHandle, disposal: Disposal) {
    if disposal.closes() {
        if let Err(status) = api.close(key) {
            log::debug!("closing key {key} failed: {status}");
        }
    }
}

// ============================================================================
// New key
// ============================================================================

/// Options for [`new_keys`]
#[derive(Debug, Clone)]
pub struct NewKeyOptions {
    pub hosts: Vec<String>,
    pub check: PermissionCheck,
    pub create: CreateOptions,
    pub view: RegistryView,
    /// Keep the created keys open and hand their handles back
    pub disposal: Disposal,
    pub cancel: Option<CancelToken>,
}

impl Default for NewKeyOptions {
    fn default() -> Self {
        Self {
            hosts: vec![String::new()],
            check: PermissionCheck::Default,
            create: CreateOptions::empty(),
            view: RegistryView::Default,
            disposal: Disposal::Close,
            cancel: None,
        }
    }
}

/// Create every key named by `paths` on every host
///
/// Missing ancestors are created too. Each created key is reported as a
/// key-only record.
pub fn new_keys<R, S>(api: &R, paths: &[S], options: &NewKeyOptions, sink: &mut dyn Sink<KeyRecord>)
where
    R: RegistryApi + ?Sized,
    S: AsRef<str>,
{
    let grouped = resolve(paths, sink);

    for host in &options.hosts {
        for (store, subpaths) in grouped.iter() {
            if cancelled(options.cancel.as_ref(), sink) {
                return;
            }
            let Some(base) = open_base(api, host, store, options.view, sink) else {
                continue;
            };

            for subpath in subpaths {
                if cancelled(options.cancel.as_ref(), sink) {
                    return;
                }
                if subpath.is_root() {
                    sink.error(empty_subpath(store, "create"));
                    continue;
                }
                let path = RegistryPath::new(store, subpath.clone());
                let key = match api.create_subkey(base.handle(), subpath, options.check, options.create) {
                    Ok(handle) => OwnedKey::new(api, handle, options.disposal),
                    Err(status) => {
                        sink.error(ErrorRecord::new(
                            error_ids::UNABLE_TO_CREATE_KEY,
                            path.full_name(),
                            status,
                        ));
                        continue;
                    }
                };

                let name = api.key_name(key.handle()).unwrap_or_else(|_| path.full_name());
                log::info!("created key {name}");
                let handle = match key.disposal() {
                    Disposal::Keep => Some(key.release()),
                    Disposal::Close => None,
                };
                sink.item(KeyRecord {
                    host: host.clone(),
                    store,
                    name,
                    depth: 0,
                    properties: Vec::new(),
                    handle,
                });
            }
        }
    }
}

// ============================================================================
// Remove key
// ============================================================================

/// Options for [`remove_keys`]
#[derive(Debug, Clone)]
pub struct RemoveKeyOptions {
    pub hosts: Vec<String>,
    /// Delete whole subtrees instead of leaf keys only
    pub recurse: bool,
    pub view: RegistryView,
    pub cancel: Option<CancelToken>,
}

impl Default for RemoveKeyOptions {
    fn default() -> Self {
        Self {
            hosts: vec![String::new()],
            recurse: false,
            view: RegistryView::Default,
            cancel: None,
        }
    }
}

/// Delete every key named by `paths` on every host
///
/// Reports the full name of each deleted key. Without `recurse`, keys that
/// still have subkeys are refused by the store.
pub fn remove_keys<R, S>(
    api: &R,
    paths: &[S],
    options: &RemoveKeyOptions,
    confirm: &mut dyn Confirm,
    sink: &mut dyn Sink<String>,
) where
    R: RegistryApi + ?Sized,
    S: AsRef<str>,
{
    let grouped = resolve(paths, sink);
    let mut gate = Gate::new(confirm);

    for host in &options.hosts {
        for (store, subpaths) in grouped.iter() {
            if gate.is_aborted() || cancelled(options.cancel.as_ref(), sink) {
                return;
            }
            let Some(base) = open_base(api, host, store, options.view, sink) else {
                continue;
            };

            for subpath in subpaths {
                if cancelled(options.cancel.as_ref(), sink) {
                    return;
                }
                if subpath.is_root() {
                    sink.error(empty_subpath(store, "delete"));
                    continue;
                }
                let display = RegistryPath::new(store, subpath.clone()).full_name();
                let prompt = Prompt::new(
                    format!("Will delete key: \"{display}\""),
                    format!("Delete key: \"{display}\"?"),
                );
                match gate.check(&prompt) {
                    Verdict::Proceed => {}
                    Verdict::Skip => continue,
                    Verdict::Abort => return,
                }

                let deleted = if options.recurse {
                    api.delete_subkey_tree(base.handle(), subpath)
                } else {
                    api.delete_subkey(base.handle(), subpath)
                };
                match deleted {
                    Ok(()) => {
                        log::info!("deleted key {display}");
                        sink.item(display);
                    }
                    Err(status) => sink.error(ErrorRecord::new(
                        error_ids::UNABLE_TO_DELETE_KEY,
                        display.as_str(),
                        RegError::from_status(status, display.as_str()),
                    )),
                }
            }
        }
    }
}

// ============================================================================
// Rename key
// ============================================================================

/// Rename every key named by `paths` to `new_name`, on the local machine
///
/// Reports the new full name of each renamed key.
pub fn rename_keys<R, S>(
    api: &R,
    paths: &[S],
    new_name: &str,
    view: RegistryView,
    cancel: Option<&CancelToken>,
    confirm: &mut dyn Confirm,
    sink: &mut dyn Sink<String>,
) where
    R: RegistryApi + ?Sized,
    S: AsRef<str>,
{
    let grouped = resolve(paths, sink);
    let mut gate = Gate::new(confirm);

    for (store, subpaths) in grouped.iter() {
        if gate.is_aborted() || cancelled(cancel, sink) {
            return;
        }
        let base = match api.open_root("", store, view) {
            Ok(handle) => OwnedKey::new(api, handle, Disposal::Close),
            Err(status) => {
                sink.error(ErrorRecord::new(error_ids::UNABLE_TO_OPEN_BASE_KEY, store.name(), status));
                continue;
            }
        };

        for subpath in subpaths {
            if cancelled(cancel, sink) {
                return;
            }
            let Some(parent) = subpath.parent() else {
                sink.error(empty_subpath(store, "rename"));
                continue;
            };
            let source = RegistryPath::new(store, subpath.clone()).full_name();
            let dest = RegistryPath::new(store, parent.join(new_name)).full_name();
            let prompt = Prompt::new(
                format!("Will rename \"{source}\" key to \"{dest}\""),
                format!("Rename \"{source}\" key to \"{dest}\"?"),
            );
            match gate.check(&prompt) {
                Verdict::Proceed => {}
                Verdict::Skip => continue,
                Verdict::Abort => return,
            }

            match NativeStatus::check(api.rename_key(base.handle(), subpath, new_name)) {
                Ok(()) => {
                    log::info!("renamed {source} to {dest}");
                    sink.item(dest);
                }
                Err(status) => sink.error(ErrorRecord::new(
                    error_ids::UNABLE_TO_RENAME_KEY,
                    source.as_str(),
                    RegError::from_status(status, source.as_str()),
                )),
            }
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

/// A value written to or removed from a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyChange {
    /// Full name of the key
    pub key: String,
    pub name: String,
}

/// Options shared by the property commands
#[derive(Debug, Clone, Default)]
pub struct PropertyOptions {
    /// Whether the target keys are closed once their properties are done
    pub disposal: Disposal,
    pub cancel: Option<CancelToken>,
}

/// Write `properties` to every key in `keys`
///
/// All properties are converted before anything is written; a property
/// that does not convert is reported and left out for every key. When a
/// key turns out to be unusable (released or deleted), its remaining
/// properties are skipped.
pub fn add_properties<R: RegistryApi + ?Sized>(
    api: &R,
    keys: &[KeyHandle],
    properties: Vec<PropertySpec>,
    options: &PropertyOptions,
    sink: &mut dyn Sink<PropertyChange>,
) {
    let (prepared, errors) = prepare_properties(properties);
    for error in errors {
        sink.error(error);
    }
    let mut values: Vec<(String, PropertyValue)> = Vec::with_capacity(prepared.len());
    for spec in prepared {
        match spec.to_property_value() {
            Ok(value) => values.push((spec.name, value)),
            Err(error) => sink.error(ErrorRecord::new(
                error_ids::UNABLE_TO_CONVERT_VALUE,
                spec.name.as_str(),
                error,
            )),
        }
    }

    for (index, &key) in keys.iter().enumerate() {
        if cancelled(options.cancel.as_ref(), sink) {
            // Keys never reached are still the caller's to release
            for &rest in &keys[index..] {
                close_unless_kept(api, rest, options.disposal);
            }
            return;
        }
        let key_name = api.key_name(key).unwrap_or_else(|_| key.to_string());

        for (name, value) in &values {
            match api.set_value(key, name, value) {
                Ok(()) => {
                    log::info!("set {name:?} on {key_name}");
                    sink.item(PropertyChange {
                        key: key_name.clone(),
                        name: name.clone(),
                    });
                }
                Err(status) => {
                    let error = RegError::from(status);
                    let unusable = error.category() == ErrorCategory::ResourceUnavailable;
                    sink.error(ErrorRecord::new(error_ids::UNABLE_TO_SET_VALUE, name.as_str(), error));
                    if unusable {
                        break;
                    }
                }
            }
        }

        close_unless_kept(api, key, options.disposal);
    }
}

/// Delete the values named `names` from every key in `keys`
pub fn remove_properties<R, S>(
    api: &R,
    keys: &[KeyHandle],
    names: &[S],
    options: &PropertyOptions,
    confirm: &mut dyn Confirm,
    sink: &mut dyn Sink<PropertyChange>,
) where
    R: RegistryApi + ?Sized,
    S: AsRef<str>,
{
    let mut gate = Gate::new(confirm);

    for (index, &key) in keys.iter().enumerate() {
        if gate.is_aborted() || cancelled(options.cancel.as_ref(), sink) {
            for &rest in &keys[index..] {
                close_unless_kept(api, rest, options.disposal);
            }
            return;
        }
        let key_name = api.key_name(key).unwrap_or_else(|_| key.to_string());

        for name in names {
            let name = name.as_ref();
            let prompt = Prompt::new(
                format!("Will delete \"{name}\" property from \"{key_name}\""),
                format!("Delete \"{name}\" property from \"{key_name}\"?"),
            );
            match gate.check(&prompt) {
                Verdict::Proceed => {}
                Verdict::Skip => continue,
                Verdict::Abort => break,
            }

            match api.delete_value(key, name) {
                Ok(()) => {
                    log::info!("removed {name:?} from {key_name}");
                    sink.item(PropertyChange {
                        key: key_name.clone(),
                        name: name.to_string(),
                    });
                }
                Err(status) => sink.error(ErrorRecord::new(
                    error_ids::UNABLE_TO_REMOVE_VALUE,
                    name,
                    RegError::from_status(status, name),
                )),
            }
        }

        close_unless_kept(api, key, options.disposal);
    }
}

// ============================================================================
// Hive files
// ============================================================================

/// Restore privilege held for the duration of a mount or dismount
///
/// Disabled again on drop, unless it was already enabled beforehand.
struct RestorePrivilege<'r, R: RegistryApi + ?Sized> {
    api: &'r R,
    restore: bool,
}

impl<'r, R: RegistryApi + ?Sized> RestorePrivilege<'r, R> {
    fn enable(api: &'r R) -> Result<Self, NativeStatus> {
        let was_enabled = api.adjust_privilege(Privilege::Restore, true)?;
        Ok(Self {
            api,
            restore: !was_enabled,
        })
    }
}

impl<R: RegistryApi + ?Sized> Drop for RestorePrivilege<'_, R> {
    fn drop(&mut self) {
        if self.restore {
            if let Err(status) = self.api.adjust_privilege(Privilege::Restore, false) {
                log::warn!("unable to disable {}: {status}", Privilege::Restore.name());
            }
        }
    }
}

/// Enable the restore privilege, reporting (but not stopping on) failure
fn hold_restore<'r, R, T>(api: &'r R, sink: &mut dyn Sink<T>) -> Option<RestorePrivilege<'r, R>>
where
    R: RegistryApi + ?Sized,
{
    match RestorePrivilege::enable(api) {
        Ok(held) => Some(held),
        Err(status) => {
            sink.error(ErrorRecord::new(
                error_ids::UNABLE_TO_ADJUST_PRIVILEGE,
                Privilege::Restore.name(),
                status,
            ));
            None
        }
    }
}

/// Mount the hive `file` at `destination` on `host`
///
/// Reports the full name of the mounted key.
pub fn mount_hive<R: RegistryApi + ?Sized>(
    api: &R,
    file: &str,
    destination: &str,
    host: &str,
    view: RegistryView,
    sink: &mut dyn Sink<String>,
) {
    let path = match RegistryPath::parse(destination) {
        Ok(path) => path,
        Err(error) => {
            sink.error(ErrorRecord::new(error_ids::INVALID_PATH, destination, error));
            return;
        }
    };
    let _privilege = hold_restore(api, sink);

    let base = match api.open_root(host, path.store, view) {
        Ok(handle) => OwnedKey::new(api, handle, Disposal::Close),
        Err(status) => {
            sink.error(ErrorRecord::new(error_ids::UNABLE_TO_MOUNT_HIVE, file, status));
            return;
        }
    };
    match NativeStatus::check(api.load_hive(base.handle(), &path.subpath, file)) {
        Ok(()) => {
            log::info!("mounted {file} at {path}");
            sink.item(path.full_name());
        }
        Err(status) => sink.error(ErrorRecord::new(
            error_ids::UNABLE_TO_MOUNT_HIVE,
            file,
            RegError::from_status(status, file),
        )),
    }
}

/// Unload the hives mounted at `paths` on every host
///
/// Reports the full name of each dismounted key.
pub fn dismount_hive<R, S>(
    api: &R,
    paths: &[S],
    hosts: &[String],
    view: RegistryView,
    cancel: Option<&CancelToken>,
    sink: &mut dyn Sink<String>,
) where
    R: RegistryApi + ?Sized,
    S: AsRef<str>,
{
    let grouped = resolve(paths, sink);
    let _privilege = hold_restore(api, sink);

    for host in hosts {
        for (store, subpaths) in grouped.iter() {
            if cancelled(cancel, sink) {
                return;
            }
            let Some(base) = open_base(api, host, store, view, sink) else {
                continue;
            };
            for subpath in subpaths {
                if cancelled(cancel, sink) {
                    return;
                }
                let display = RegistryPath::new(store, subpath.clone()).full_name();
                match NativeStatus::check(api.unload_hive(base.handle(), subpath)) {
                    Ok(()) => {
                        log::info!("dismounted {display}");
                        sink.item(display);
                    }
                    Err(status) => sink.error(ErrorRecord::new(
                        error_ids::UNABLE_TO_DISMOUNT_KEY,
                        display.as_str(),
                        RegError::from_status(status, display.as_str()),
                    )),
                }
            }
        }
    }
}
