//! Copy and Move
//!
//! Copies the subtree under one open source key into destination paths on
//! one or more hosts. Move is the same engine with a single destination,
//! its own prompt wording, and deletion of the source afterwards.
//!
//! For every host × root store × subpath:
//!
//! 1. Open the store (failure skips its subpaths on that host)
//! 2. Open the destination with the resolved rights
//! 3. Ask to create-and-copy (missing) or overwrite (present)
//! 4. Create the destination if missing, then run the native subtree copy
//!
//! The native copy merges: same-named values and subkeys are overwritten,
//! entries only present at the destination survive.
//!
//! A move deletes its source only when at least one copy succeeded and
//! nothing failed or aborted along the way.

use serde::Serialize;

use crate::confirm::{CancelToken, Confirm, Gate, Prompt, Verdict};
use crate::native::{
    CreateOptions, Disposal, KeyHandle, KeyRights, OwnedKey, PermissionCheck, RegistryApi,
    RegistryView,
};
use crate::path::{group_paths, GroupedPaths, RegistryPath, Subpath, PATH_SEPARATOR};
use crate::report::Sink;
use crate::status::{error_ids, ErrorRecord, NativeStatus, RegError};

/// Copy and move options
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub view: RegistryView,
    /// Rights for opening existing destinations; taken from the source when unset
    pub dest_rights: Option<KeyRights>,
    /// Whether the source and destination handles are closed when done
    pub disposal: Disposal,
    pub cancel: Option<CancelToken>,
}

/// A destination that received the source's data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopiedKey {
    pub host: String,
    pub name: String,
    /// The destination did not exist before the copy
    pub created: bool,
    /// Open destination handle when the caller keeps handles
    #[serde(skip)]
    pub handle: Option<KeyHandle>,
}

/// Tally of one copy or move invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CopySummary {
    pub copied: usize,
    pub declined: usize,
    pub failed: usize,
    pub aborted: bool,
    pub source_deleted: bool,
}

impl CopySummary {
    /// Whether a move may delete its source
    pub fn source_deletable(&self) -> bool {
        self.copied > 0 && self.failed == 0 && !self.aborted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Copy,
    Move,
}

impl Mode {
    fn prompt(self, dest: &str, source: &str, exists: bool) -> Prompt {
        match (self, exists) {
            (Self::Copy, false) => Prompt::new(
                format!("Will create \"{dest}\" and copy data from \"{source}\""),
                format!("Create \"{dest}\" and copy data from \"{source}\"?"),
            ),
            (Self::Copy, true) => Prompt::new(
                format!("Will overwrite \"{dest}\" with data from \"{source}\""),
                format!("Overwrite \"{dest}\" with data from \"{source}\"?"),
            ),
            (Self::Move, false) => Prompt::new(
                format!("Will move \"{source}\" to \"{dest}\""),
                format!("Move \"{source}\" to \"{dest}\"?"),
            ),
            (Self::Move, true) => Prompt::new(
                format!("Will move \"{source}\" to \"{dest}\" - replacing any existing data."),
                format!("Move \"{source}\" to \"{dest}\" - replacing any existing data?"),
            ),
        }
    }
}

/// Copy `source` into every destination on every host
pub fn copy_key<R, S>(
    api: &R,
    source: KeyHandle,
    destinations: &[S],
    hosts: &[String],
    options: &CopyOptions,
    confirm: &mut dyn Confirm,
    sink: &mut dyn Sink<CopiedKey>,
) -> CopySummary
where
    R: RegistryApi + ?Sized,
    S: AsRef<str>,
{
    let (grouped, errors) = group_paths(destinations);
    let mut summary = CopySummary {
        failed: errors.len(),
        ..CopySummary::default()
    };
    for error in errors {
        sink.error(error);
    }

    let mut engine = Engine {
        api,
        source,
        mode: Mode::Copy,
        options,
        gate: Gate::new(confirm),
        summary: &mut summary,
        sink,
    };
    engine.run(&grouped, hosts);

    close_source(api, source, options.disposal);
    summary
}

/// Move `source` to `destination` on `host`
pub fn move_key<R: RegistryApi + ?Sized>(
    api: &R,
    source: KeyHandle,
    destination: &str,
    host: &str,
    options: &CopyOptions,
    confirm: &mut dyn Confirm,
    sink: &mut dyn Sink<CopiedKey>,
) -> CopySummary {
    let (grouped, errors) = group_paths([destination]);
    let mut summary = CopySummary {
        failed: errors.len(),
        ..CopySummary::default()
    };
    for error in errors {
        sink.error(error);
    }

    let hosts = [host.to_string()];
    let mut engine = Engine {
        api,
        source,
        mode: Mode::Move,
        options,
        gate: Gate::new(confirm),
        summary: &mut summary,
        sink,
    };
    engine.run(&grouped, &hosts);

    if summary.source_deletable() {
        match delete_source(api, source, options.view) {
            Ok(()) => summary.source_deleted = true,
            Err(error) => {
                summary.failed += 1;
                sink.error(error);
            }
        }
    } else {
        log::debug!("source left in place: {summary:?}");
    }

    close_source(api, source, options.disposal);
    summary
}

fn close_source<R: RegistryApi + ?Sized>(api: &R, source: KeyHandle, disposal: Disposal) {
    if disposal.closes() {
        if let Err(status) = api.close(source) {
            log::debug!("closing source key failed: {status}");
        }
    }
}

/// Delete the subtree a handle refers to, located from the handle itself
fn delete_source<R: RegistryApi + ?Sized>(
    api: &R,
    source: KeyHandle,
    view: RegistryView,
) -> Result<(), ErrorRecord> {
    let id = error_ids::UNABLE_TO_DELETE_SOURCE_KEY;
    let name = api
        .key_name(source)
        .map_err(|status| ErrorRecord::new(error_ids::UNABLE_TO_GET_KEY_NAME, source.to_string(), status))?;
    let host = api
        .key_host(source)
        .map_err(|status| ErrorRecord::new(id, name.as_str(), status))?
        .ok_or_else(|| {
            ErrorRecord::new(id, name.as_str(), RegError::UnknownSourceHost { key: name.clone() })
        })?;
    let path = RegistryPath::parse(&name).map_err(|e| ErrorRecord::new(id, name.as_str(), e))?;
    if path.subpath.is_root() {
        return Err(ErrorRecord::new(
            error_ids::EMPTY_SUB_KEY_PATH,
            name.as_str(),
            RegError::EmptySubkeyPath {
                store: path.store,
                action: "move",
            },
        ));
    }

    let root = api
        .open_root(&host, path.store, view)
        .map_err(|status| ErrorRecord::new(error_ids::UNABLE_TO_OPEN_BASE_KEY, host.as_str(), status))?;
    let root = OwnedKey::new(api, root, Disposal::Close);

    api.delete_subkey_tree(root.handle(), &path.subpath)
        .map_err(|status| ErrorRecord::new(id, name.as_str(), RegError::from_status(status, name.as_str())))?;
    log::info!("deleted source key {name}");
    Ok(())
}

/// Destination-open rights: explicit, else granted on the source, else the fallback
fn resolve_rights<R: RegistryApi + ?Sized>(
    api: &R,
    source: KeyHandle,
    explicit: Option<KeyRights>,
) -> KeyRights {
    if let Some(rights) = explicit.filter(|r| !r.is_empty()) {
        return rights;
    }
    match api.granted_access(source) {
        Ok(rights) if !rights.is_empty() => rights,
        Ok(_) => {
            log::warn!(
                "source key handle carries no rights; using default rights {:?} for the destination key",
                KeyRights::COPY_FALLBACK
            );
            KeyRights::COPY_FALLBACK
        }
        Err(status) => {
            log::warn!(
                "unable to read granted rights from source key handle ({status}); using default rights {:?} for the destination key",
                KeyRights::COPY_FALLBACK
            );
            KeyRights::COPY_FALLBACK
        }
    }
}

struct Engine<'a, 'c, R: RegistryApi + ?Sized> {
    api: &'a R,
    source: KeyHandle,
    mode: Mode,
    options: &'a CopyOptions,
    gate: Gate<'c>,
    summary: &'a mut CopySummary,
    sink: &'a mut dyn Sink<CopiedKey>,
}

impl<R: RegistryApi + ?Sized> Engine<'_, '_, R> {
    fn stopped(&mut self) -> bool {
        let cancelled = self
            .options
            .cancel
            .as_ref()
            .is_some_and(CancelToken::is_cancelled);
        if cancelled && !self.summary.aborted {
            self.summary.aborted = true;
            self.sink.error(ErrorRecord::new(
                error_ids::OPERATION_STOPPED,
                "",
                RegError::Stopped,
            ));
        }
        self.summary.aborted
    }

    fn run(&mut self, grouped: &GroupedPaths, hosts: &[String]) {
        if grouped.is_empty() {
            return;
        }
        let source_name = match self.api.key_name(self.source) {
            Ok(name) => name,
            Err(status) => {
                self.summary.failed += 1;
                self.sink.error(ErrorRecord::new(
                    error_ids::UNABLE_TO_GET_KEY_NAME,
                    self.source.to_string(),
                    status,
                ));
                return;
            }
        };
        let rights = resolve_rights(self.api, self.source, self.options.dest_rights);
        let source_host = match self.mode {
            Mode::Move => self.api.key_host(self.source).ok().flatten(),
            Mode::Copy => None,
        };

        for host in hosts {
            for (store, subpaths) in grouped.iter() {
                if self.stopped() {
                    return;
                }
                log::debug!("{host}: opening base key {store}");
                let base = match self.api.open_root(host, store, self.options.view) {
                    Ok(handle) => OwnedKey::new(self.api, handle, Disposal::Close),
                    Err(status) => {
                        self.summary.failed += 1;
                        self.sink.error(ErrorRecord::new(
                            error_ids::UNABLE_TO_OPEN_BASE_KEY,
                            host.as_str(),
                            status,
                        ));
                        continue;
                    }
                };
                let base_name = self
                    .api
                    .key_name(base.handle())
                    .unwrap_or_else(|_| store.name().to_string());

                for subpath in subpaths {
                    if self.stopped() {
                        return;
                    }
                    let dest = if subpath.is_root() {
                        base_name.clone()
                    } else {
                        format!("{base_name}{PATH_SEPARATOR}{subpath}")
                    };
                    if self.mode == Mode::Move
                        && overlaps(source_host.as_deref(), &source_name, host, &dest)
                    {
                        self.summary.failed += 1;
                        self.sink.error(ErrorRecord::new(
                            error_ids::DESTINATION_OVERLAPS_SOURCE,
                            dest.as_str(),
                            RegError::OverlappingMove {
                                key: source_name.clone(),
                                dest: dest.clone(),
                            },
                        ));
                        continue;
                    }
                    let target = Target {
                        host,
                        base: base.handle(),
                        subpath,
                        dest: &dest,
                    };
                    self.copy_one(&target, &source_name, rights);
                }
            }
        }
    }

    fn copy_one(&mut self, target: &Target<'_>, source_name: &str, rights: KeyRights) {
        let api = self.api;
        let existing = match api.open_subkey(target.base, target.subpath, PermissionCheck::ReadWriteSubTree, rights) {
            Ok(handle) => Some(OwnedKey::new(api, handle, Disposal::Close)),
            Err(NativeStatus::FILE_NOT_FOUND) => None,
            Err(status) => {
                self.fail(target.dest, status);
                return;
            }
        };

        let prompt = self.mode.prompt(target.dest, source_name, existing.is_some());
        match self.gate.check(&prompt) {
            Verdict::Proceed => {}
            Verdict::Skip => {
                self.summary.declined += 1;
                return;
            }
            Verdict::Abort => {
                self.summary.aborted = true;
                return;
            }
        }

        let created = existing.is_none();
        let dest_key = match existing {
            Some(key) => key,
            None => match api.create_subkey(
                target.base,
                target.subpath,
                PermissionCheck::ReadWriteSubTree,
                CreateOptions::empty(),
            ) {
                Ok(handle) => OwnedKey::new(api, handle, Disposal::Close),
                Err(status) => {
                    self.fail(target.dest, status);
                    return;
                }
            },
        };

        if let Err(status) = NativeStatus::check(api.copy_tree(self.source, dest_key.handle())) {
            self.fail(target.dest, status);
            return;
        }

        log::info!("copied \"{source_name}\" to \"{}\"", target.dest);
        self.summary.copied += 1;
        // Only a delivered destination is handed to the caller
        let handle = match self.options.disposal {
            Disposal::Keep => Some(dest_key.release()),
            Disposal::Close => None,
        };
        self.sink.item(CopiedKey {
            host: target.host.to_string(),
            name: target.dest.to_string(),
            created,
            handle,
        });
    }

    fn fail(&mut self, dest: &str, status: NativeStatus) {
        self.summary.failed += 1;
        self.sink.error(ErrorRecord::new(
            error_ids::UNABLE_TO_COPY_KEY,
            dest,
            RegError::from_status(status, dest),
        ));
    }
}

/// `name` is `ancestor` itself or lies beneath it
fn is_within(name: &str, ancestor: &str) -> bool {
    match name.get(..ancestor.len()) {
        Some(head) if head.eq_ignore_ascii_case(ancestor) => {
            name.len() == ancestor.len() || name[ancestor.len()..].starts_with(PATH_SEPARATOR)
        }
        _ => false,
    }
}

/// A move destination that is the source, or inside it, or contains it
///
/// An undeterminable source host is taken to match every host.
fn overlaps(source_host: Option<&str>, source: &str, host: &str, dest: &str) -> bool {
    let same_host = source_host.map_or(true, |h| h.eq_ignore_ascii_case(host));
    same_host && (is_within(dest, source) || is_within(source, dest))
}

struct Target<'t> {
    host: &'t str,
    base: KeyHandle,
    subpath: &'t Subpath,
    dest: &'t str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confirm::{AlwaysProceed, Decision, WhatIf};
    use crate::memory::MemoryRegistry;
    use crate::path::RootStore;
    use crate::report::BatchReport;
    use crate::status::ErrorCategory;
    use crate::value::PropertyValue;
    use crate::walk::open_key;

    const SRC: &str = "SOFTWARE\\Vendor\\App";

    fn registry() -> MemoryRegistry {
        let reg = MemoryRegistry::new().with_host("remote");
        reg.seed_value("", RootStore::LocalMachine, SRC, "Version", PropertyValue::Int32(2));
        reg.seed_value("", RootStore::LocalMachine, "SOFTWARE\\Vendor\\App\\Plugins", "Enabled", PropertyValue::Int32(1));
        reg
    }

    fn source(reg: &MemoryRegistry) -> KeyHandle {
        open_key(reg, "HKLM:\\SOFTWARE\\Vendor\\App", "").unwrap().handle.unwrap()
    }

    fn local() -> Vec<String> {
        vec![String::new()]
    }

    #[test]
    fn test_copy_creates_missing_destination() {
        let reg = registry();
        let src = source(&reg);
        let mut prompts = Vec::new();
        let mut confirm = |p: &Prompt| {
            prompts.push(p.query.clone());
            Decision::Proceed
        };
        let mut report = BatchReport::new();

        let summary = copy_key(&reg, src, &["HKLM:\\SOFTWARE\\Backup"], &local(), &CopyOptions::default(), &mut confirm, &mut report);

        assert_eq!(summary.copied, 1);
        assert!(report.is_clean());
        assert!(report.items[0].created);
        assert_eq!(report.items[0].name, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Backup");
        assert_eq!(
            prompts,
            vec!["Create \"HKEY_LOCAL_MACHINE\\SOFTWARE\\Backup\" and copy data from \"HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor\\App\"?".to_string()]
        );
        assert_eq!(
            reg.peek_value("", RootStore::LocalMachine, "SOFTWARE\\Backup\\Plugins", "Enabled"),
            Some(PropertyValue::Int32(1))
        );
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_copy_merges_into_existing_destination() {
        let reg = registry();
        reg.seed_value("", RootStore::LocalMachine, "SOFTWARE\\Backup", "Version", PropertyValue::Int32(1));
        reg.seed_value("", RootStore::LocalMachine, "SOFTWARE\\Backup", "Local", PropertyValue::Int32(5));
        let src = source(&reg);
        let mut queries = Vec::new();
        let mut confirm = |p: &Prompt| {
            queries.push(p.query.clone());
            Decision::Proceed
        };
        let mut report = BatchReport::new();

        copy_key(&reg, src, &["HKLM\\SOFTWARE\\Backup"], &local(), &CopyOptions::default(), &mut confirm, &mut report);

        assert!(queries[0].starts_with("Overwrite \"HKEY_LOCAL_MACHINE\\SOFTWARE\\Backup\""));
        assert!(!report.items[0].created);
        assert_eq!(reg.peek_value("", RootStore::LocalMachine, "SOFTWARE\\Backup", "Version"), Some(PropertyValue::Int32(2)));
        assert_eq!(reg.peek_value("", RootStore::LocalMachine, "SOFTWARE\\Backup", "Local"), Some(PropertyValue::Int32(5)));
    }

    #[test]
    fn test_decline_is_not_an_error() {
        let reg = registry();
        let src = source(&reg);
        let mut confirm = |p: &Prompt| {
            if p.query.contains("First") {
                Decision::Skip
            } else {
                Decision::Proceed
            }
        };
        let mut report = BatchReport::new();

        let summary = copy_key(
            &reg,
            src,
            &["HKLM:\\SOFTWARE\\First", "HKLM:\\SOFTWARE\\Second"],
            &local(),
            &CopyOptions::default(),
            &mut confirm,
            &mut report,
        );

        assert_eq!(summary.declined, 1);
        assert_eq!(summary.copied, 1);
        assert!(report.is_clean());
        assert!(!reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\First"));
        assert!(reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\Second\\Plugins"));
    }

    #[test]
    fn test_native_failure_is_per_destination() {
        let reg = registry();
        reg.seed_key("", RootStore::LocalMachine, "SOFTWARE\\Broken");
        reg.fail_copies_into("HKEY_LOCAL_MACHINE\\SOFTWARE\\Broken", 1450);
        let src = source(&reg);
        let mut report = BatchReport::new();

        let summary = copy_key(
            &reg,
            src,
            &["HKLM:\\SOFTWARE\\Broken", "HKLM:\\SOFTWARE\\Fine"],
            &local(),
            &CopyOptions::default(),
            &mut AlwaysProceed,
            &mut report,
        );

        assert_eq!((summary.copied, summary.failed), (1, 1));
        assert_eq!(report.errors[0].id, error_ids::UNABLE_TO_COPY_KEY);
        assert_eq!(report.errors[0].error.native_code(), Some(1450));
        assert_eq!(report.errors[0].category(), ErrorCategory::NotSpecified);
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_copy_to_each_host() {
        let reg = registry();
        let src = source(&reg);
        let hosts = vec![String::new(), "offline".to_string(), "remote".to_string()];
        let mut report = BatchReport::new();

        let summary = copy_key(&reg, src, &["HKCU:\\Software\\App"], &hosts, &CopyOptions::default(), &mut AlwaysProceed, &mut report);

        assert_eq!(summary.copied, 2);
        assert_eq!(report.error_ids(), vec![error_ids::UNABLE_TO_OPEN_BASE_KEY]);
        assert!(reg.key_exists("remote", RootStore::CurrentUser, "Software\\App\\Plugins"));
        assert!(reg.key_exists("", RootStore::CurrentUser, "Software\\App"));
    }

    #[test]
    fn test_rights_fall_back_when_source_grants_nothing() {
        let reg = registry();
        reg.seed_key("", RootStore::LocalMachine, "SOFTWARE\\Existing");
        let root = reg.open_root("", RootStore::LocalMachine, RegistryView::Default).unwrap();
        let src = reg
            .open_subkey(root, &crate::path::Subpath::new(SRC), PermissionCheck::Default, KeyRights::empty())
            .unwrap();
        let options = CopyOptions {
            disposal: Disposal::Keep,
            ..CopyOptions::default()
        };
        let mut report = BatchReport::new();

        copy_key(&reg, src, &["HKLM:\\SOFTWARE\\Existing"], &local(), &options, &mut AlwaysProceed, &mut report);

        let dest = report.items[0].handle.unwrap();
        assert_eq!(reg.granted_access(dest), Ok(KeyRights::COPY_FALLBACK));
        assert!(reg.granted_access(src).is_ok());
    }

    #[test]
    fn test_abort_all_stops_the_batch() {
        let reg = registry();
        let src = source(&reg);
        let mut confirm = |_: &Prompt| Decision::AbortAll;
        let mut report = BatchReport::new();

        let summary = copy_key(
            &reg,
            src,
            &["HKLM:\\SOFTWARE\\One", "HKLM:\\SOFTWARE\\Two"],
            &local(),
            &CopyOptions::default(),
            &mut confirm,
            &mut report,
        );

        assert!(summary.aborted);
        assert_eq!(summary.copied, 0);
        assert!(!reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\One"));
        assert!(!reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\Two"));
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_what_if_mutates_nothing() {
        let reg = registry();
        let src = source(&reg);
        let mut what_if = WhatIf::default();
        let mut report = BatchReport::new();

        copy_key(&reg, src, &["HKLM:\\SOFTWARE\\Preview"], &local(), &CopyOptions::default(), &mut what_if, &mut report);

        assert!(!reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\Preview"));
        assert!(what_if.described[0].starts_with("Will create"));
    }

    #[test]
    fn test_move_deletes_source_once() {
        let reg = registry();
        let src = source(&reg);
        let mut queries = Vec::new();
        let mut confirm = |p: &Prompt| {
            queries.push(p.query.clone());
            Decision::Proceed
        };
        let mut report = BatchReport::new();

        let summary = move_key(&reg, src, "HKLM:\\SOFTWARE\\Moved", "", &CopyOptions::default(), &mut confirm, &mut report);

        assert!(summary.source_deleted);
        assert!(report.is_clean());
        assert_eq!(
            queries,
            vec!["Move \"HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor\\App\" to \"HKEY_LOCAL_MACHINE\\SOFTWARE\\Moved\"?".to_string()]
        );
        assert!(!reg.key_exists("", RootStore::LocalMachine, SRC));
        assert!(reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\Moved\\Plugins"));
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_move_over_existing_uses_replace_wording() {
        let reg = registry();
        reg.seed_key("", RootStore::LocalMachine, "SOFTWARE\\Target");
        let src = source(&reg);
        let mut what_if = WhatIf::default();
        let mut report = BatchReport::new();

        let summary = move_key(&reg, src, "HKLM:\\SOFTWARE\\Target", "", &CopyOptions::default(), &mut what_if, &mut report);

        assert!(what_if.described[0].ends_with("- replacing any existing data."));
        assert!(!summary.source_deleted);
        assert!(reg.key_exists("", RootStore::LocalMachine, SRC));
    }

    #[test]
    fn test_move_keeps_source_when_copy_fails() {
        let reg = registry();
        reg.seed_key("", RootStore::LocalMachine, "SOFTWARE\\Target");
        reg.fail_copies_into("HKEY_LOCAL_MACHINE\\SOFTWARE\\Target", 5);
        let src = source(&reg);
        let mut report = BatchReport::new();

        let summary = move_key(&reg, src, "HKLM:\\SOFTWARE\\Target", "", &CopyOptions::default(), &mut AlwaysProceed, &mut report);

        assert!(!summary.source_deleted);
        assert_eq!(report.errors[0].category(), ErrorCategory::PermissionDenied);
        assert!(reg.key_exists("", RootStore::LocalMachine, SRC));
    }

    #[test]
    fn test_move_refuses_unknown_source_host() {
        let reg = registry();
        let src = source(&reg);
        reg.conceal_hosts(true);
        let mut report = BatchReport::new();

        let summary = move_key(&reg, src, "HKLM:\\SOFTWARE\\Moved", "", &CopyOptions::default(), &mut AlwaysProceed, &mut report);

        assert!(!summary.source_deleted);
        assert_eq!(summary.copied, 1);
        assert!(matches!(report.errors[0].error, RegError::UnknownSourceHost { .. }));
        assert!(reg.key_exists("", RootStore::LocalMachine, SRC));
    }

    #[test]
    fn test_move_with_invalid_destination_keeps_source() {
        let reg = registry();
        let src = source(&reg);
        let mut report = BatchReport::new();

        let summary = move_key(&reg, src, "NOPE:\\X", "", &CopyOptions::default(), &mut AlwaysProceed, &mut report);

        assert_eq!(summary.failed, 1);
        assert_eq!(report.error_ids(), vec![error_ids::INVALID_PATH]);
        assert!(reg.key_exists("", RootStore::LocalMachine, SRC));
    }

    #[test]
    fn test_kept_disposal_only_holds_delivered_destinations() {
        let reg = registry();
        reg.seed_key("", RootStore::LocalMachine, "SOFTWARE\\Dst");
        reg.seed_key("", RootStore::LocalMachine, "SOFTWARE\\Broken");
        reg.fail_copies_into("HKEY_LOCAL_MACHINE\\SOFTWARE\\Broken", 1450);
        let src = source(&reg);
        let options = CopyOptions {
            disposal: Disposal::Keep,
            ..CopyOptions::default()
        };
        let mut confirm = |p: &Prompt| {
            if p.query.contains("SOFTWARE\\Dst") {
                Decision::Skip
            } else {
                Decision::Proceed
            }
        };
        let mut report = BatchReport::new();

        let summary = copy_key(&reg, src, &["HKLM:\\SOFTWARE\\Dst", "HKLM:\\SOFTWARE\\Broken"], &local(), &options, &mut confirm, &mut report);

        assert_eq!((summary.declined, summary.failed, summary.copied), (1, 1, 0));
        assert_eq!(reg.open_handle_count(), 1);

        let mut report = BatchReport::new();
        copy_key(&reg, src, &["HKLM:\\SOFTWARE\\Fresh"], &local(), &options, &mut AlwaysProceed, &mut report);

        assert!(report.items[0].handle.is_some());
        assert_eq!(reg.open_handle_count(), 2);
    }

    #[test]
    fn test_kept_disposal_releases_destination_on_abort() {
        let reg = registry();
        reg.seed_key("", RootStore::LocalMachine, "SOFTWARE\\Dst");
        let src = source(&reg);
        let options = CopyOptions {
            disposal: Disposal::Keep,
            ..CopyOptions::default()
        };
        let mut confirm = |_: &Prompt| Decision::AbortAll;
        let mut report = BatchReport::new();

        let summary = copy_key(&reg, src, &["HKLM:\\SOFTWARE\\Dst"], &local(), &options, &mut confirm, &mut report);

        assert!(summary.aborted);
        assert_eq!(reg.open_handle_count(), 1);
    }

    #[test]
    fn test_move_onto_itself_keeps_source() {
        let reg = registry();
        let src = source(&reg);
        let mut report = BatchReport::new();

        let summary = move_key(&reg, src, "HKLM:\\software\\vendor\\APP", "", &CopyOptions::default(), &mut AlwaysProceed, &mut report);

        assert!(!summary.source_deleted);
        assert_eq!((summary.copied, summary.failed), (0, 1));
        assert_eq!(report.error_ids(), vec![error_ids::DESTINATION_OVERLAPS_SOURCE]);
        assert_eq!(report.errors[0].category(), ErrorCategory::InvalidArgument);
        assert_eq!(reg.peek_value("", RootStore::LocalMachine, SRC, "Version"), Some(PropertyValue::Int32(2)));
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_move_into_own_subtree_or_ancestor_keeps_source() {
        for dest in ["HKLM:\\SOFTWARE\\Vendor\\App\\Child", "HKLM:\\SOFTWARE\\Vendor"] {
            let reg = registry();
            let src = source(&reg);
            let mut report = BatchReport::new();

            let summary = move_key(&reg, src, dest, "", &CopyOptions::default(), &mut AlwaysProceed, &mut report);

            assert!(!summary.source_deleted, "{dest}");
            assert_eq!(report.error_ids(), vec![error_ids::DESTINATION_OVERLAPS_SOURCE]);
            assert!(reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\Vendor\\App\\Plugins"));
            assert!(!reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\Vendor\\App\\Child"));
        }
    }

    #[test]
    fn test_move_to_sibling_with_shared_prefix_is_allowed() {
        let reg = registry();
        let src = source(&reg);
        let mut report = BatchReport::new();

        let summary = move_key(&reg, src, "HKLM:\\SOFTWARE\\Vendor\\AppOld", "", &CopyOptions::default(), &mut AlwaysProceed, &mut report);

        assert!(summary.source_deleted);
        assert!(report.is_clean());
        assert!(reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\Vendor\\AppOld\\Plugins"));
    }

    #[test]
    fn test_move_same_path_on_another_host_is_allowed() {
        let reg = registry();
        let src = source(&reg);
        let mut report = BatchReport::new();

        let summary = move_key(&reg, src, "HKLM:\\SOFTWARE\\Vendor\\App", "remote", &CopyOptions::default(), &mut AlwaysProceed, &mut report);

        assert!(summary.source_deleted);
        assert!(reg.key_exists("remote", RootStore::LocalMachine, "SOFTWARE\\Vendor\\App\\Plugins"));
        assert!(!reg.key_exists("", RootStore::LocalMachine, SRC));
    }

    #[test]
    fn test_move_keeps_source_when_destination_store_is_unreachable() {
        let reg = registry();
        let src = source(&reg);
        let mut report = BatchReport::new();

        let summary = move_key(&reg, src, "HKLM:\\SOFTWARE\\Moved", "offline", &CopyOptions::default(), &mut AlwaysProceed, &mut report);

        assert_eq!((summary.copied, summary.failed), (0, 1));
        assert!(!summary.source_deleted);
        assert_eq!(report.error_ids(), vec![error_ids::UNABLE_TO_OPEN_BASE_KEY]);
        assert!(reg.key_exists("", RootStore::LocalMachine, SRC));
    }

    #[test]
    fn test_source_deletable_requires_a_clean_run() {
        let summary = |copied, declined, failed, aborted| CopySummary {
            copied,
            declined,
            failed,
            aborted,
            source_deleted: false,
        };

        assert!(summary(1, 0, 0, false).source_deletable());
        assert!(summary(1, 3, 0, false).source_deletable());
        assert!(!summary(0, 1, 0, false).source_deletable());
        assert!(!summary(2, 0, 1, false).source_deletable());
        assert!(!summary(0, 0, 2, false).source_deletable());
        assert!(!summary(1, 0, 0, true).source_deletable());
    }

    #[test]
    fn test_cancel_between_destinations() {
        let reg = registry();
        let src = source(&reg);
        let token = CancelToken::new();
        let options = CopyOptions {
            cancel: Some(token.clone()),
            ..CopyOptions::default()
        };
        let mut confirm = |_: &Prompt| {
            token.cancel();
            Decision::Proceed
        };
        let mut report = BatchReport::new();

        let summary = copy_key(
            &reg,
            src,
            &["HKLM:\\SOFTWARE\\One", "HKLM:\\SOFTWARE\\Two"],
            &local(),
            &options,
            &mut confirm,
            &mut report,
        );

        assert!(summary.aborted);
        assert_eq!(summary.copied, 1);
        assert!(reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\One"));
        assert!(!reg.key_exists("", RootStore::LocalMachine, "SOFTWARE\\Two"));
        assert_eq!(report.error_ids(), vec![error_ids::OPERATION_STOPPED]);
        assert_eq!(reg.open_handle_count(), 0);
    }
}
