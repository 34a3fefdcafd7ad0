//! hivectl
//!
//! Batch manipulation of a hierarchical registry store across one or more
//! hosts:
//!
//! - **Paths**: `HKLM:\SOFTWARE\...` strings resolved to a root store and subpath
//! - **Traversal**: breadth-first, depth-bounded key enumeration with values
//! - **Copy/Move**: native subtree copies into many destinations, move deletes the source
//! - **Coercion**: loosely typed caller data normalized per value kind
//! - **Commands**: new/remove/rename keys, add/remove properties, mount/dismount hives
//!
//! # Layout
//!
//! ```text
//! command (ops, copy, walk)
//! ├── path       alias table, GroupedPaths
//! ├── coerce     InputValue -> PropertyValue
//! ├── confirm    Confirm callback, Gate, CancelToken
//! ├── report     Sink, BatchReport
//! └── native     RegistryApi (the store boundary)
//!     └── memory in-process store: key pool, hives, handle table
//! ```
//!
//! Every command streams results and per-item [`ErrorRecord`]s to a
//! [`Sink`]; a failing item never stops its siblings.

pub mod status;
pub mod path;
pub mod value;
pub mod coerce;
pub mod native;
pub mod memory;
pub mod confirm;
pub mod report;
pub mod walk;
pub mod copy;
pub mod ops;

pub use coerce::{coerce, prepare_properties, InputValue, PropertySpec};
pub use confirm::{AlwaysProceed, CancelToken, Confirm, Decision, Prompt, WhatIf};
pub use copy::{copy_key, move_key, CopiedKey, CopyOptions, CopySummary};
pub use memory::MemoryRegistry;
pub use native::{Disposal, KeyHandle, KeyRights, RegistryApi, RegistryView};
pub use ops::{
    add_properties, dismount_hive, mount_hive, new_keys, remove_keys, remove_properties,
    rename_keys, NewKeyOptions, PropertyChange, PropertyOptions, RemoveKeyOptions,
};
pub use path::{group_paths, GroupedPaths, RegistryPath, RootStore, Subpath};
pub use report::{BatchReport, Sink};
pub use status::{ErrorCategory, ErrorRecord, NativeStatus, RegError};
pub use value::{Property, PropertyValue, ValueKind};
pub use walk::{get_keys, open_key, open_keys, walk, KeyRecord, Walk, WalkOptions};
