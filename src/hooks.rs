// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hook Manager — installs, tracks and removes function interceptions.
//!
//! Invariants: at most one record per target address, a second successful
//! install attempt is a no-op, and a failed install degrades (no
//! interception for that target) instead of destabilizing the host. Host
//! stability always wins over feature availability.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::symbols::{resolve, Address, Resolution, SymbolSource, SymbolTarget};

/// Failures inside the patching backend.
#[derive(Debug, Clone, Error)]
pub enum HookError {
    #[error("patch failed: {0}")]
    PatchFailed(String),

    #[error("unpatch failed: {0}")]
    UnpatchFailed(String),
}

/// Low-level code patching. The Windows backend diverts the function via a
/// detour and hands back the trampoline; the test mock records the patch.
///
/// Contract: after `patch(target, replacement)` succeeds, calling `target`
/// runs `replacement`, and the returned trampoline reaches the original with
/// the original calling convention. `unpatch` restores the entry point; the
/// trampoline is invalid afterwards.
pub trait CodePatcher {
    fn patch(&mut self, target: Address, replacement: Address) -> Result<Address, HookError>;

    fn unpatch(&mut self, target: Address) -> Result<(), HookError>;
}

/// One installed interception.
#[derive(Debug, Clone)]
pub struct HookRecord {
    pub op: &'static str,
    pub address: Address,
    pub replacement: Address,
    pub trampoline: Address,
    pub installed: bool,
}

/// Outcome of one install attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// Interception active (either freshly installed or already in place).
    Installed,
    /// Target module not loaded yet; retry on the next opportunity.
    Pending,
    /// No interception for this target this session (symbol absent, address
    /// conflict, or patch failure). The system keeps running without it.
    Degraded,
}

/// Tracks all interceptions of this process. Owned by the lifecycle
/// context; all mutation goes through it.
#[derive(Debug, Default)]
pub struct HookManager {
    records: HashMap<&'static str, HookRecord>,
}

impl HookManager {
    pub fn new() -> Self {
        HookManager { records: HashMap::new() }
    }

    /// Resolve `target` and install `replacement` over it.
    ///
    /// Safe to call before the target module is loaded (`Pending`) and safe
    /// to call again after a prior success (no-op, `Installed`). Never
    /// patches an address that already carries a record.
    pub fn ensure_installed(
        &mut self,
        source: &dyn SymbolSource,
        patcher: &mut dyn CodePatcher,
        target: &SymbolTarget,
        replacement: Address,
    ) -> InstallState {
        if self.records.get(target.op).is_some_and(|r| r.installed) {
            return InstallState::Installed;
        }

        let address = match resolve(source, target) {
            Resolution::Address(address) => address,
            Resolution::ModuleNotLoaded => return InstallState::Pending,
            Resolution::NotFound => {
                warn!(op = target.op, "symbol not found, running without this interception");
                return InstallState::Degraded;
            }
        };

        // Nie dieselbe Adresse doppelt patchen, egal unter welchem Namen.
        if self.records.values().any(|r| r.installed && r.address == address) {
            warn!(op = target.op, address, "address already hooked, skipping");
            return InstallState::Degraded;
        }

        match patcher.patch(address, replacement) {
            Ok(trampoline) => {
                debug!(op = target.op, address, trampoline, "hook installed");
                self.records.insert(
                    target.op,
                    HookRecord { op: target.op, address, replacement, trampoline, installed: true },
                );
                InstallState::Installed
            }
            Err(err) => {
                warn!(op = target.op, address, %err, "hook install failed, degrading");
                InstallState::Degraded
            }
        }
    }

    /// Trampoline to the original function, if the hook is active.
    pub fn trampoline(&self, op: &str) -> Option<Address> {
        self.records.get(op).filter(|r| r.installed).map(|r| r.trampoline)
    }

    pub fn is_installed(&self, op: &str) -> bool {
        self.records.get(op).is_some_and(|r| r.installed)
    }

    /// Remove every active interception and invalidate its trampoline.
    /// Unpatch failures are logged and skipped; teardown always finishes.
    pub fn uninstall_all(&mut self, patcher: &mut dyn CodePatcher) {
        for record in self.records.values_mut().filter(|r| r.installed) {
            if let Err(err) = patcher.unpatch(record.address) {
                warn!(op = record.op, address = record.address, %err, "unpatch failed");
            }
            record.installed = false;
            record.trampoline = 0;
        }
        self.records.clear();
    }
}
