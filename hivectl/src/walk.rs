//! Key Traversal
//!
//! [`Walk`] visits the keys named by a [`GroupedPaths`] on every requested
//! host and yields one [`KeyRecord`] per visited key, interleaved with the
//! errors it meets, as soon as each is known.
//!
//! For each host and root store the walk opens one connection. A store that
//! cannot be opened is reported once and its subpaths are skipped. Each
//! subpath is opened beneath that connection; an empty subpath means the
//! connection itself.
//!
//! With `recurse` the walk is breadth-first over an explicit FIFO queue. A
//! key's depth is the number of separators in its full name; children are
//! enumerated only while that depth is below `start depth + depth`, and every
//! dequeued key is emitted whether or not it was expanded.
//!
//! # Handles
//!
//! With [`Disposal::Close`] the walk closes every key after emitting it and
//! the connection when the store is done. With [`Disposal::Keep`] each record
//! carries its open handle and the caller closes it. Handles the walk never
//! emitted are closed when it stops or is dropped.

use std::collections::VecDeque;

use serde::Serialize;

use crate::confirm::CancelToken;
use crate::native::{
    Disposal, KeyHandle, KeyRights, PermissionCheck, RegistryApi, RegistryView, ValueOptions,
};
use crate::path::{group_paths, GroupedPaths, RegistryPath, RootStore, Subpath, PATH_SEPARATOR};
use crate::report::{BatchReport, Sink};
use crate::status::{error_ids, ErrorRecord, RegError};
use crate::value::Property;

/// Traversal options
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Hosts to visit; the empty string is the local machine
    pub hosts: Vec<String>,
    pub recurse: bool,
    /// Levels below each resolved key to descend when recursing
    pub depth: Option<usize>,
    /// Skip reading values
    pub keys_only: bool,
    /// Report each value's kind
    pub include_type: bool,
    pub check: PermissionCheck,
    pub rights: KeyRights,
    pub view: RegistryView,
    pub value_options: ValueOptions,
    pub disposal: Disposal,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            hosts: vec![String::new()],
            recurse: false,
            depth: None,
            keys_only: false,
            include_type: true,
            check: PermissionCheck::ReadWriteSubTree,
            rights: KeyRights::WALK_DEFAULT,
            view: RegistryView::Default,
            value_options: ValueOptions::empty(),
            disposal: Disposal::Close,
        }
    }
}

impl WalkOptions {
    pub fn on_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn recursive(mut self, depth: Option<usize>) -> Self {
        self.recurse = true;
        self.depth = depth;
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn keep_handles(mut self) -> Self {
        self.disposal = Disposal::Keep;
        self
    }
}

/// A visited key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRecord {
    /// Host the key was read from (empty for the local machine)
    pub host: String,
    pub store: RootStore,
    /// Fully qualified name
    pub name: String,
    /// Levels below the key the walk started from
    pub depth: usize,
    pub properties: Vec<Property>,
    /// Open handle, present only when the caller keeps handles
    #[serde(skip)]
    pub handle: Option<KeyHandle>,
}

impl KeyRecord {
    /// Location of the key beneath its store
    pub fn subpath(&self) -> Subpath {
        match self.name.split_once(PATH_SEPARATOR) {
            Some((_, rest)) => Subpath::new(rest),
            None => Subpath::root(),
        }
    }

    pub fn path(&self) -> RegistryPath {
        RegistryPath::new(self.store, self.subpath())
    }

    /// Last segment of the name
    pub fn leaf(&self) -> &str {
        self.name
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or(&self.name)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

pub type WalkItem = Result<KeyRecord, ErrorRecord>;

/// Depth of a key: separators in its full name
pub fn key_depth(full_name: &str) -> usize {
    full_name.matches(PATH_SEPARATOR).count()
}

/// Read every value under a key
///
/// Values that fail to read are reported and left out; the rest are kept.
pub fn read_properties<R: RegistryApi + ?Sized>(
    api: &R,
    key: KeyHandle,
    options: ValueOptions,
    include_type: bool,
) -> (Vec<Property>, Vec<RegError>) {
    let names = match api.value_names(key) {
        Ok(names) => names,
        Err(status) => return (Vec::new(), vec![status.into()]),
    };

    let mut properties = Vec::with_capacity(names.len());
    let mut errors = Vec::new();
    for name in names {
        let value = match api.get_value(key, &name, options) {
            Ok(value) => value,
            Err(status) => {
                errors.push(RegError::from_status(status, name));
                continue;
            }
        };
        let mut property = Property::new(name, value);
        if include_type {
            match api.value_kind(key, &property.name) {
                Ok(kind) => property = property.with_kind(kind),
                Err(status) => errors.push(status.into()),
            }
        }
        properties.push(property);
    }
    (properties, errors)
}

/// Start a walk over already grouped paths
pub fn walk<'r, R: RegistryApi + ?Sized>(
    api: &'r R,
    paths: &GroupedPaths,
    options: WalkOptions,
) -> Walk<'r, R> {
    Walk::new(api, paths, options)
}

/// Resolve raw paths and walk them; path errors come first
pub fn get_keys<'r, R, I, S>(api: &'r R, paths: I, options: WalkOptions) -> impl Iterator<Item = WalkItem> + 'r
where
    R: RegistryApi + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let (grouped, errors) = group_paths(paths);
    errors
        .into_iter()
        .map(Err)
        .chain(Walk::new(api, &grouped, options))
}

/// Open exactly the keys named by `paths`, keeping their handles
pub fn open_keys<R, I, S>(api: &R, paths: I, hosts: &[String]) -> BatchReport<KeyRecord>
where
    R: RegistryApi + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let options = WalkOptions::default()
        .on_hosts(hosts.iter().cloned())
        .keys_only()
        .keep_handles();

    let mut report = BatchReport::new();
    for item in get_keys(api, paths, options) {
        match item {
            Ok(record) => report.item(record),
            Err(error) => report.error(error),
        }
    }
    report
}

/// Open the single key named by `path` on `host`, keeping its handle
pub fn open_key<R: RegistryApi + ?Sized>(
    api: &R,
    path: &str,
    host: &str,
) -> Result<KeyRecord, ErrorRecord> {
    let mut report = open_keys(api, [path], &[host.to_string()]);
    match report.errors.pop() {
        Some(error) => Err(error),
        None => report.items.pop().ok_or_else(|| {
            ErrorRecord::new(
                error_ids::UNABLE_TO_OPEN_SUB_KEY,
                path,
                RegError::NotFound {
                    target: path.to_string(),
                },
            )
        }),
    }
}

struct Pending {
    handle: KeyHandle,
    is_base: bool,
}

struct Base {
    handle: KeyHandle,
    handed_out: bool,
}

/// Lazy traversal; see the module docs
pub struct Walk<'r, R: RegistryApi + ?Sized> {
    api: &'r R,
    groups: Vec<(RootStore, Vec<Subpath>)>,
    options: WalkOptions,
    cancel: Option<CancelToken>,
    host: usize,
    store: usize,
    subpath: usize,
    base: Option<Base>,
    queue: VecDeque<Pending>,
    start_depth: usize,
    max_depth: usize,
    out: VecDeque<WalkItem>,
    done: bool,
}

impl<'r, R: RegistryApi + ?Sized> Walk<'r, R> {
    pub fn new(api: &'r R, paths: &GroupedPaths, options: WalkOptions) -> Self {
        let groups = paths
            .iter()
            .map(|(store, subpaths)| (store, subpaths.to_vec()))
            .collect();
        Self {
            api,
            groups,
            options,
            cancel: None,
            host: 0,
            store: 0,
            subpath: 0,
            base: None,
            queue: VecDeque::new(),
            start_depth: 0,
            max_depth: usize::MAX,
            out: VecDeque::new(),
            done: false,
        }
    }

    /// Stop at the next item boundary once `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Stream everything into a sink
    pub fn drain_into(self, sink: &mut impl Sink<KeyRecord>) {
        for item in self {
            match item {
                Ok(record) => sink.item(record),
                Err(error) => sink.error(error),
            }
        }
    }

    fn host_name(&self) -> &str {
        self.options
            .hosts
            .get(self.host)
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn store_target(&self, store: RootStore) -> String {
        let host = self.host_name();
        if host.is_empty() {
            store.name().to_string()
        } else {
            format!("\\\\{host}\\{store}")
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Do one unit of work; false once nothing is left
    fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        if self.is_cancelled() {
            self.stop();
            return true;
        }
        if let Some(pending) = self.queue.pop_front() {
            self.visit(pending);
            return true;
        }
        if self.host >= self.options.hosts.len() {
            self.done = true;
            return false;
        }

        let Some((store, count)) = self.groups.get(self.store).map(|(s, list)| (*s, list.len())) else {
            self.host += 1;
            self.store = 0;
            return true;
        };

        if self.base.is_none() {
            log::debug!("{}: opening base key {}", self.host_name(), store);
            match self.api.open_root(self.host_name(), store, self.options.view) {
                Ok(handle) => {
                    self.base = Some(Base {
                        handle,
                        handed_out: false,
                    })
                }
                Err(status) => {
                    let target = self.store_target(store);
                    self.out.push_back(Err(ErrorRecord::new(
                        error_ids::UNABLE_TO_OPEN_BASE_KEY,
                        target,
                        status,
                    )));
                    self.store += 1;
                    self.subpath = 0;
                    return true;
                }
            }
        }

        if self.subpath >= count {
            self.release_base();
            self.store += 1;
            self.subpath = 0;
            return true;
        }

        let subpath = self.groups[self.store].1[self.subpath].clone();
        self.subpath += 1;
        self.seed(store, &subpath);
        true
    }

    /// Open a resolved subpath and start visiting it
    fn seed(&mut self, store: RootStore, subpath: &Subpath) {
        let Some(base) = self.base.as_ref().map(|b| b.handle) else {
            return;
        };

        let pending = if subpath.is_root() {
            log::debug!("{}: sub key path is empty, treating base key as the key", self.host_name());
            Pending {
                handle: base,
                is_base: true,
            }
        } else {
            log::debug!("{}: opening sub key {}", self.host_name(), subpath);
            match self.api.open_subkey(base, subpath, self.options.check, self.options.rights) {
                Ok(handle) => Pending {
                    handle,
                    is_base: false,
                },
                Err(status) => {
                    let target = RegistryPath::new(store, subpath.clone()).full_name();
                    let error = RegError::from_status(status, target.clone());
                    self.out.push_back(Err(ErrorRecord::new(
                        error_ids::UNABLE_TO_OPEN_SUB_KEY,
                        target,
                        error,
                    )));
                    return;
                }
            }
        };

        if !self.options.recurse {
            self.visit(pending);
            return;
        }

        match self.api.key_name(pending.handle) {
            Ok(name) => {
                self.start_depth = key_depth(&name);
                let depth = self.options.depth.unwrap_or(usize::MAX);
                self.max_depth = self.start_depth.saturating_add(depth);
                self.queue.push_back(pending);
            }
            Err(status) => self.fail_key(pending, status.into()),
        }
    }

    /// Expand a key if within depth, then emit it
    fn visit(&mut self, pending: Pending) {
        let name = match self.api.key_name(pending.handle) {
            Ok(name) => name,
            Err(status) => {
                self.fail_key(pending, status.into());
                return;
            }
        };
        let depth = key_depth(&name);
        if !self.options.recurse {
            // A lone key is its own starting point
            self.start_depth = depth;
        }

        if self.options.recurse && depth < self.max_depth {
            self.expand(pending.handle, &name);
        }
        self.emit(pending, name, depth);
    }

    fn expand(&mut self, handle: KeyHandle, name: &str) {
        let names = match self.api.subkey_names(handle) {
            Ok(names) => names,
            Err(status) => {
                self.out.push_back(Err(ErrorRecord::new(
                    error_ids::UNABLE_TO_GET_SUB_KEY_NAMES,
                    name,
                    status,
                )));
                return;
            }
        };

        for child in names {
            let child_path = Subpath::new(&child);
            match self.api.open_subkey(handle, &child_path, self.options.check, self.options.rights) {
                Ok(child_handle) => self.queue.push_back(Pending {
                    handle: child_handle,
                    is_base: false,
                }),
                Err(status) => {
                    let target = format!("{name}{PATH_SEPARATOR}{child}");
                    let error = RegError::from_status(status, target.clone());
                    self.out.push_back(Err(ErrorRecord::new(
                        error_ids::UNABLE_TO_OPEN_SUB_KEY,
                        target,
                        error,
                    )));
                }
            }
        }
    }

    fn emit(&mut self, pending: Pending, name: String, depth: usize) {
        let mut properties = Vec::new();
        if !self.options.keys_only {
            let (read, errors) = read_properties(
                self.api,
                pending.handle,
                self.options.value_options,
                self.options.include_type,
            );
            properties = read;
            for error in errors {
                self.out.push_back(Err(ErrorRecord::new(
                    error_ids::UNABLE_TO_GET_PROPERTIES,
                    name.clone(),
                    error,
                )));
            }
        }

        let keep = !self.options.disposal.closes();
        let record = KeyRecord {
            host: self.host_name().to_string(),
            store: self.groups[self.store].0,
            depth: depth.saturating_sub(self.start_depth),
            name,
            properties,
            handle: keep.then_some(pending.handle),
        };

        if pending.is_base {
            if let Some(base) = self.base.as_mut() {
                base.handed_out |= keep;
            }
        } else if !keep {
            self.close(pending.handle);
        }
        self.out.push_back(Ok(record));
    }

    fn fail_key(&mut self, pending: Pending, error: RegError) {
        self.out.push_back(Err(ErrorRecord::new(
            error_ids::UNABLE_TO_GET_KEY_NAME,
            pending.handle.to_string(),
            error,
        )));
        if !pending.is_base {
            self.close(pending.handle);
        }
    }

    fn close(&self, handle: KeyHandle) {
        if let Err(status) = self.api.close(handle) {
            log::debug!("closing key {handle} failed: {status}");
        }
    }

    fn release_base(&mut self) {
        if let Some(base) = self.base.take() {
            if !base.handed_out {
                self.close(base.handle);
            }
        }
    }

    /// Close everything not handed to the caller
    fn cleanup(&mut self) {
        while let Some(pending) = self.queue.pop_front() {
            if !pending.is_base {
                self.close(pending.handle);
            }
        }
        self.release_base();
    }

    fn stop(&mut self) {
        log::debug!("walk stopped");
        self.cleanup();
        self.out.push_back(Err(ErrorRecord::new(
            error_ids::OPERATION_STOPPED,
            self.host_name().to_string(),
            RegError::Stopped,
        )));
        self.done = true;
    }
}

impl<R: RegistryApi + ?Sized> Iterator for Walk<'_, R> {
    type Item = WalkItem;

    fn next(&mut self) -> Option<WalkItem> {
        loop {
            if let Some(item) = self.out.pop_front() {
                return Some(item);
            }
            if !self.advance() {
                return None;
            }
        }
    }
}

impl<R: RegistryApi + ?Sized> Drop for Walk<'_, R> {
    fn drop(&mut self) {
        self.cleanup();
    }
}
