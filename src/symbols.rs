// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Symbol Resolver — from a logical operation name to a callable address.
//!
//! Host internals are version-dependent and undocumented, so every target
//! carries an ordered list of candidate mangled names that are tried until
//! one resolves. Not finding any candidate is non-fatal: the caller keeps
//! running in a degraded mode (no interception for that operation).

use tracing::debug;

/// A function address inside the host process.
pub type Address = usize;

/// A loaded host module. Pure lookup key — never owned, never freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub usize);

/// One logical host operation plus its known spellings across host versions.
/// Immutable once defined.
#[derive(Debug)]
pub struct SymbolTarget {
    /// Logical name, used for records and diagnostics.
    pub op: &'static str,
    /// Module expected to carry the symbol.
    pub module: &'static str,
    /// Mangled-name candidates, tried in order until one resolves.
    pub candidates: &'static [&'static str],
}

// ── Bekannte Targets ────────────────────────────────
// Mangled-Namen aus beobachteten Hostversionen; Reihenfolge = Priorität.

/// Entry of the host's measure pass (`UIElement::Measure`). The injection
/// point for layout overrides.
pub const MEASURE_PASS: SymbolTarget = SymbolTarget {
    op: "uielement-measure",
    module: "Windows.UI.Xaml.dll",
    candidates: &[
        // x64
        "?Measure@UIElement@Xaml@UI@Windows@@QEAAXUSize@Foundation@4@@Z",
        // x86
        "?Measure@UIElement@Xaml@UI@Windows@@QAEXUSize@Foundation@4@@Z",
    ],
};

/// Tray icon view constructor. Fires when the host (re)builds the icon
/// cluster. Frequently absent from export tables — resolution failure here
/// is the normal degraded mode and must not affect the measure hook.
pub const ICON_VIEW_CTOR: SymbolTarget = SymbolTarget {
    op: "iconview-ctor",
    module: "Taskbar.View.dll",
    candidates: &[
        "??0IconView@implementation@SystemTray@winrt@@QEAA@XZ",
        "public: __cdecl winrt::SystemTray::implementation::IconView::IconView(void)",
    ],
};

/// Read access to the host's module and symbol tables. Implemented over
/// `GetModuleHandleW`/`GetProcAddress` on Windows and over fixture maps in
/// tests.
pub trait SymbolSource {
    /// Handle of a loaded module, `None` while it has not been loaded yet.
    fn module(&self, name: &str) -> Option<ModuleHandle>;

    /// Address of an exported/mangled symbol inside `module`.
    fn symbol(&self, module: ModuleHandle, mangled: &str) -> Option<Address>;
}

/// Outcome of resolving a [`SymbolTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// First candidate that resolved.
    Address(Address),
    /// Module not loaded yet — worth retrying on a later lifecycle callback.
    ModuleNotLoaded,
    /// Module present but no candidate matched — degrade for this session.
    NotFound,
}

/// Try each candidate in order, stopping at the first hit.
pub fn resolve(source: &dyn SymbolSource, target: &SymbolTarget) -> Resolution {
    let Some(module) = source.module(target.module) else {
        debug!(op = target.op, module = target.module, "module not loaded");
        return Resolution::ModuleNotLoaded;
    };

    for &candidate in target.candidates {
        if let Some(address) = source.symbol(module, candidate) {
            debug!(op = target.op, candidate, address, "symbol resolved");
            return Resolution::Address(address);
        }
    }

    debug!(op = target.op, module = target.module, "no candidate resolved");
    Resolution::NotFound
}
