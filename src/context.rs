// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Lifecycle Controller — one process-wide context object instead of
//! scattered globals.
//!
//! Owns the active hooks, the current configuration and the unloading flag,
//! and sequences installation, reconfiguration and teardown. The loader
//! drives it through four notifications: init, after-init (module-load
//! retry point), settings-changed, uninit.
//!
//! Interception callbacks land in [`ModContext::on_layout_pass`] on the
//! host's UI thread. Nothing here blocks and nothing long-running happens
//! inline; cross-thread state is atomics plus a mutex-guarded settings
//! snapshot.

use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Mutex;

use tracing::{debug, info};

use crate::foreign::UiNode;
use crate::hooks::{CodePatcher, HookManager};
use crate::layout;
use crate::locator::{locate, ClusterPredicate};
use crate::settings::Settings;
use crate::symbols::{Address, SymbolSource, ICON_VIEW_CTOR, MEASURE_PASS};

/// Addresses of the replacement functions the platform glue exposes to the
/// host. Plain data so the portable core stays free of function-pointer ABI.
#[derive(Debug, Clone, Copy)]
pub struct HookReplacements {
    pub measure: Address,
    pub icon_ctor: Address,
}

/// Process-wide state. Exactly one instance lives for the lifetime of the
/// injected module; all mutation goes through its methods.
pub struct ModContext {
    unloading: AtomicBool,
    overrides_active: AtomicBool,
    tray_rebuilt: AtomicBool,
    settings: Mutex<Settings>,
    hooks: Mutex<HookManager>,
}

impl ModContext {
    pub fn new(settings: Settings) -> Self {
        ModContext {
            unloading: AtomicBool::new(false),
            overrides_active: AtomicBool::new(false),
            tray_rebuilt: AtomicBool::new(false),
            settings: Mutex::new(settings.clamped()),
            hooks: Mutex::new(HookManager::new()),
        }
    }

    // ── Lifecycle-Notifications ─────────────────────

    /// First notification. Installs whatever can be installed now; missing
    /// modules stay pending for [`ModContext::after_init`]. Never fails;
    /// a fully degraded install just means no interception.
    pub fn init(
        &self,
        source: &dyn SymbolSource,
        patcher: &mut dyn CodePatcher,
        replacements: &HookReplacements,
    ) {
        info!("init");
        self.install_hooks(source, patcher, replacements);
    }

    /// Module-load retry point. The host loads its tray module lazily, so
    /// installation state is re-checked here. Idempotent.
    pub fn after_init(
        &self,
        source: &dyn SymbolSource,
        patcher: &mut dyn CodePatcher,
        replacements: &HookReplacements,
    ) {
        debug!("after-init, retrying pending installs");
        self.install_hooks(source, patcher, replacements);
    }

    fn install_hooks(
        &self,
        source: &dyn SymbolSource,
        patcher: &mut dyn CodePatcher,
        replacements: &HookReplacements,
    ) {
        let mut hooks = self.hooks.lock().unwrap();
        let measure = hooks.ensure_installed(source, patcher, &MEASURE_PASS, replacements.measure);
        let ctor = hooks.ensure_installed(source, patcher, &ICON_VIEW_CTOR, replacements.icon_ctor);
        info!(?measure, ?ctor, "install states");
    }

    /// Swap in a fresh configuration. Takes effect on the next layout pass:
    /// enabled changes re-apply idempotently, a disable resets the cluster.
    pub fn settings_changed(&self, new: Settings) {
        let new = new.clamped();
        info!(?new, "settings changed");
        *self.settings.lock().unwrap() = new;
    }

    /// Teardown. Sets the unloading flag first, so every interception
    /// callback turns pass-through, then removes all hooks.
    pub fn uninit(&self, patcher: &mut dyn CodePatcher) {
        info!("uninit");
        self.unloading.store(true, SeqCst);
        self.hooks.lock().unwrap().uninstall_all(patcher);
    }

    // ── Zustand ─────────────────────────────────────

    pub fn is_unloading(&self) -> bool {
        self.unloading.load(SeqCst)
    }

    /// Immutable snapshot of the current configuration.
    pub fn settings(&self) -> Settings {
        self.settings.lock().unwrap().clone()
    }

    pub fn trampoline(&self, op: &str) -> Option<Address> {
        self.hooks.lock().unwrap().trampoline(op)
    }

    pub fn hook_installed(&self, op: &str) -> bool {
        self.hooks.lock().unwrap().is_installed(op)
    }

    // ── Interception-Eintrittspunkte ────────────────

    /// The icon-view constructor fired: the host is (re)building the
    /// cluster. Only noted for diagnostics; the next measure pass applies
    /// idempotently anyway.
    pub fn notify_icon_created(&self) {
        if self.is_unloading() {
            return;
        }
        self.tray_rebuilt.store(true, SeqCst);
    }

    /// One measure pass of the host, entered with whatever element the host
    /// is measuring. Locates the cluster below that element and applies or
    /// resets the overrides. Every outcome short of success is a silent
    /// skip. The host never sees an error from here.
    pub fn on_layout_pass<N: UiNode>(&self, root: &N) {
        if self.is_unloading() {
            return;
        }

        let settings = self.settings();
        if !settings.enabled {
            // Einmaliges Zurückschreiben nach Deaktivierung.
            if self.overrides_active.load(SeqCst) {
                if let Some(cluster) = locate(root, &ClusterPredicate::tray_cluster()) {
                    layout::reset(&cluster);
                    self.overrides_active.store(false, SeqCst);
                }
            }
            return;
        }

        let Some(cluster) = locate(root, &ClusterPredicate::tray_cluster()) else {
            return; // Cluster gerade nicht da (z.B. Rebuild), nächster Pass
        };

        if self.tray_rebuilt.swap(false, SeqCst) {
            debug!("tray rebuilt, re-applying overrides");
        }

        let Ok(count) = cluster.child_count() else { return };
        if count == 0 {
            return;
        }

        let rules = layout::plan(count, &settings);
        layout::apply(&cluster, &rules, &settings);
        self.overrides_active.store(true, SeqCst);
    }
}
