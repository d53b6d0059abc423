// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! TrayStack — stacks the system tray icon cluster (network, volume,
//! battery, plus optional members) vertically inside the Windows 11
//! taskbar, from inside the shell process.
//!
//! The host ships no API for any of this, so the crate works under total
//! binary opacity: it resolves private functions from mangled export
//! tables, intercepts the host's measure pass via detours with a preserved
//! trampoline, walks the reference-counted XAML tree through a minimal
//! capability surface, locates the icon cluster with a corroborating
//! multi-signal heuristic, and injects reversible margin/orientation
//! overrides: idempotently, every frame, without ever letting a failure
//! escape into the host.
//!
//! Everything except `platform/` is host-agnostic and fully unit-tested
//! against mock graphs; the Windows backend maps the same contracts onto
//! `IInspectable`, `GetProcAddress` and inline detours.

pub mod context;
pub mod foreign;
pub mod hooks;
pub mod layout;
pub mod locator;
pub mod platform;
pub mod settings;
pub mod symbols;

#[cfg(test)]
pub(crate) mod mock;

pub use context::{HookReplacements, ModContext};
pub use foreign::{Capability, ForeignError, HAlign, Orientation, Thickness, UiNode};
pub use hooks::{CodePatcher, HookError, HookManager, HookRecord, InstallState};
pub use layout::OverrideRule;
pub use locator::{locate, ClusterPredicate, Signal, SignalVerdict};
pub use settings::Settings;
pub use symbols::{resolve, Address, ModuleHandle, Resolution, SymbolSource, SymbolTarget};
