// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Windows backend: XAML object adapter, Win32 symbol tables, detour-based
//! patching, and the exported lifecycle entry points the loader invokes.
//!
//! This is the only file that touches raw host pointers. Everything that
//! crosses into the portable core goes through [`XamlNode`].

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::sync::{Mutex, OnceLock};

use retour::RawDetour;
use tracing::{debug, info};
use windows::core::{Interface, IInspectable, HRESULT, PCSTR, PCWSTR};
use windows::Win32::Foundation::{E_NOINTERFACE, HMODULE};
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::UI::Xaml::Controls::{Orientation as XamlOrientation, StackPanel};
use windows::UI::Xaml::Media::VisualTreeHelper;
use windows::UI::Xaml::{
    DependencyObject, FrameworkElement, HorizontalAlignment, Thickness as XamlThickness,
};

use crate::context::{HookReplacements, ModContext};
use crate::foreign::{Capability, ForeignError, HAlign, Orientation, Thickness, UiNode};
use crate::hooks::{CodePatcher, HookError};
use crate::settings::Settings;
use crate::symbols::{Address, ModuleHandle, SymbolSource, ICON_VIEW_CTOR, MEASURE_PASS};

const SETTINGS_FILE: &str = "traystack.json";
const LOG_FILE: &str = "traystack.log";

// ── Globaler State ──────────────────────────────────
// Ein Kontextobjekt, ein Patcher, zwei Trampolin-Spiegel für den Hot-Path
// (die Replacements dürfen nie auf ein Lock warten).

static CONTEXT: OnceLock<ModContext> = OnceLock::new();
static PATCHER: OnceLock<Mutex<RetourPatcher>> = OnceLock::new();
static MEASURE_TRAMPOLINE: AtomicUsize = AtomicUsize::new(0);
static ICON_CTOR_TRAMPOLINE: AtomicUsize = AtomicUsize::new(0);

fn patcher() -> &'static Mutex<RetourPatcher> {
    PATCHER.get_or_init(|| Mutex::new(RetourPatcher::new()))
}

// ── Symbolauflösung über Win32 ──────────────────────

/// Module and export tables of the live host process. Lookup only: this
/// never loads a module and never extends its lifetime.
pub struct Win32Symbols;

impl SymbolSource for Win32Symbols {
    fn module(&self, name: &str) -> Option<ModuleHandle> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        match unsafe { GetModuleHandleW(PCWSTR(wide.as_ptr())) } {
            Ok(module) if !module.is_invalid() => Some(ModuleHandle(module.0 as usize)),
            _ => None,
        }
    }

    fn symbol(&self, module: ModuleHandle, mangled: &str) -> Option<Address> {
        let name = CString::new(mangled).ok()?;
        let proc = unsafe {
            GetProcAddress(HMODULE(module.0 as *mut c_void), PCSTR(name.as_ptr().cast()))
        };
        proc.map(|f| f as usize)
    }
}

// ── Detour-Patcher ──────────────────────────────────

/// Code patching via inline detours. Keeps every live detour so the
/// trampoline stays valid until [`CodePatcher::unpatch`].
pub struct RetourPatcher {
    detours: HashMap<Address, RawDetour>,
}

impl RetourPatcher {
    pub fn new() -> Self {
        RetourPatcher { detours: HashMap::new() }
    }
}

impl CodePatcher for RetourPatcher {
    fn patch(&mut self, target: Address, replacement: Address) -> Result<Address, HookError> {
        // Safety: `target` stammt aus der Exporttabelle des geladenen
        // Moduls, `replacement` ist eine eigene extern-"system"-Funktion
        // mit identischer Aufrufkonvention.
        let detour = unsafe { RawDetour::new(target as *const (), replacement as *const ()) }
            .map_err(|e| HookError::PatchFailed(e.to_string()))?;
        unsafe { detour.enable() }.map_err(|e| HookError::PatchFailed(e.to_string()))?;

        let trampoline = detour.trampoline() as *const () as Address;
        self.detours.insert(target, detour);
        Ok(trampoline)
    }

    fn unpatch(&mut self, target: Address) -> Result<(), HookError> {
        let detour = self
            .detours
            .remove(&target)
            .ok_or_else(|| HookError::UnpatchFailed(format!("0x{target:X} not patched")))?;
        unsafe { detour.disable() }.map_err(|e| HookError::UnpatchFailed(e.to_string()))?;
        Ok(())
    }
}

// ── XAML-Adapter ────────────────────────────────────

/// A reference-counted handle on a live XAML object. `Clone` AddRefs,
/// `Drop` releases; the WinRT runtime does both under the hood.
#[derive(Clone)]
pub struct XamlNode(IInspectable);

impl XamlNode {
    /// Wrap the borrowed `this` of an intercepted call. Takes its own
    /// reference so the object cannot die mid-traversal.
    ///
    /// # Safety
    /// `this` must be a (possibly null) pointer to a COM object whose
    /// vtable starts with `IUnknown`.
    pub unsafe fn from_measured(this: *mut c_void) -> Option<XamlNode> {
        if this.is_null() {
            return None;
        }
        IInspectable::from_raw_borrowed(&this).map(|borrowed| XamlNode(borrowed.clone()))
    }

    /// Capability query against the real interface table.
    fn probe<T: Interface>(&self, cap: Capability) -> Result<T, ForeignError> {
        self.0.cast::<T>().map_err(|e| {
            if e.code() == E_NOINTERFACE {
                ForeignError::Unsupported(cap)
            } else {
                ForeignError::CallFailed(e.to_string())
            }
        })
    }

    fn as_dependency_object(&self) -> Result<DependencyObject, ForeignError> {
        self.probe::<DependencyObject>(Capability::FrameworkElement)
    }
}

fn host_err(e: windows::core::Error) -> ForeignError {
    ForeignError::CallFailed(e.to_string())
}

impl UiNode for XamlNode {
    fn query(&self, cap: Capability) -> Result<Self, ForeignError> {
        match cap {
            Capability::FrameworkElement => {
                self.probe::<FrameworkElement>(cap)?;
            }
            Capability::Panel => {
                self.probe::<windows::UI::Xaml::Controls::Panel>(cap)?;
            }
            Capability::StackPanel => {
                self.probe::<StackPanel>(cap)?;
            }
        }
        Ok(self.clone())
    }

    fn class_name(&self) -> Result<String, ForeignError> {
        // HSTRING wird beim Drop freigegeben, auch im Fehlerpfad.
        let name = self.0.GetRuntimeClassName().map_err(host_err)?;
        Ok(name.to_string_lossy())
    }

    fn display_name(&self) -> Result<String, ForeignError> {
        let element = self.probe::<FrameworkElement>(Capability::FrameworkElement)?;
        let name = element.Name().map_err(host_err)?;
        Ok(name.to_string_lossy())
    }

    fn child_count(&self) -> Result<usize, ForeignError> {
        let object = self.as_dependency_object()?;
        let count = VisualTreeHelper::GetChildrenCount(&object).map_err(host_err)?;
        Ok(count.max(0) as usize)
    }

    fn child_at(&self, index: usize) -> Result<Self, ForeignError> {
        let object = self.as_dependency_object()?;
        let child = VisualTreeHelper::GetChild(&object, index as i32).map_err(host_err)?;
        let inspectable = child.cast::<IInspectable>().map_err(host_err)?;
        Ok(XamlNode(inspectable))
    }

    fn parent(&self) -> Result<Option<Self>, ForeignError> {
        let object = self.as_dependency_object()?;
        // Null-Parent (Wurzel) kommt als Fehler zurück; beides ist "kein
        // Parent" für die Signale.
        match VisualTreeHelper::GetParent(&object) {
            Ok(parent) => {
                let inspectable = parent.cast::<IInspectable>().map_err(host_err)?;
                Ok(Some(XamlNode(inspectable)))
            }
            Err(_) => Ok(None),
        }
    }

    fn set_margin(&self, margin: Thickness) -> Result<(), ForeignError> {
        let element = self.probe::<FrameworkElement>(Capability::FrameworkElement)?;
        element
            .SetMargin(XamlThickness {
                Left: margin.left,
                Top: margin.top,
                Right: margin.right,
                Bottom: margin.bottom,
            })
            .map_err(host_err)
    }

    fn set_alignment(&self, align: HAlign) -> Result<(), ForeignError> {
        let element = self.probe::<FrameworkElement>(Capability::FrameworkElement)?;
        let value = match align {
            HAlign::Stretch => HorizontalAlignment::Stretch,
            HAlign::Center => HorizontalAlignment::Center,
        };
        element.SetHorizontalAlignment(value).map_err(host_err)
    }

    fn set_fixed_size(&self, side: f64) -> Result<(), ForeignError> {
        // NaN ist in XAML "Auto", also der Host-Default.
        let element = self.probe::<FrameworkElement>(Capability::FrameworkElement)?;
        element.SetWidth(side).map_err(host_err)?;
        element.SetHeight(side).map_err(host_err)
    }

    fn set_orientation(&self, orientation: Orientation) -> Result<(), ForeignError> {
        let panel = self.probe::<StackPanel>(Capability::StackPanel)?;
        let value = match orientation {
            Orientation::Horizontal => XamlOrientation::Horizontal,
            Orientation::Vertical => XamlOrientation::Vertical,
        };
        panel.SetOrientation(value).map_err(host_err)
    }

    fn set_spacing(&self, spacing: f64) -> Result<(), ForeignError> {
        let panel = self.probe::<StackPanel>(Capability::StackPanel)?;
        panel.SetSpacing(spacing).map_err(host_err)
    }
}

// ── Replacements ────────────────────────────────────
// ABI exakt wie das Original: x64, `this` in rcx, die 8-Byte-Size by value
// in rdx, HRESULT in rax. Jede Abweichung korrumpiert den Host.

/// `Windows.Foundation.Size` as passed to the measure entry.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct XamlSize {
    pub width: f32,
    pub height: f32,
}

type MeasureFn = unsafe extern "system" fn(*mut c_void, XamlSize) -> HRESULT;
type IconCtorFn = unsafe extern "system" fn(*mut c_void) -> *mut c_void;

/// Replacement for `UIElement::Measure`. Own logic is fully fenced: any
/// failure or panic inside it means "no effect this frame", and the
/// original is reached in every case.
unsafe extern "system" fn measure_replacement(this: *mut c_void, size: XamlSize) -> HRESULT {
    let _ = panic::catch_unwind(AssertUnwindSafe(|| {
        if let Some(ctx) = CONTEXT.get() {
            if !ctx.is_unloading() {
                if let Some(node) = XamlNode::from_measured(this) {
                    ctx.on_layout_pass(&node);
                }
            }
        }
    }));

    let trampoline = MEASURE_TRAMPOLINE.load(SeqCst);
    if trampoline == 0 {
        // Ohne Original lieber still no-op als ein Absturz im Host.
        return HRESULT(0);
    }
    let original: MeasureFn = mem::transmute(trampoline);
    original(this, size)
}

/// Replacement for the icon view constructor: original first, then note
/// that the host is rebuilding the cluster.
unsafe extern "system" fn icon_ctor_replacement(this: *mut c_void) -> *mut c_void {
    let trampoline = ICON_CTOR_TRAMPOLINE.load(SeqCst);
    let result = if trampoline != 0 {
        let original: IconCtorFn = mem::transmute(trampoline);
        original(this)
    } else {
        this
    };

    let _ = panic::catch_unwind(|| {
        if let Some(ctx) = CONTEXT.get() {
            ctx.notify_icon_created();
        }
    });

    result
}

fn replacements() -> HookReplacements {
    HookReplacements {
        measure: measure_replacement as usize,
        icon_ctor: icon_ctor_replacement as usize,
    }
}

/// Mirror the current trampolines into the lock-free statics the
/// replacements read.
fn sync_trampolines(ctx: &ModContext) {
    MEASURE_TRAMPOLINE.store(ctx.trampoline(MEASURE_PASS.op).unwrap_or(0), SeqCst);
    ICON_CTOR_TRAMPOLINE.store(ctx.trampoline(ICON_VIEW_CTOR.op).unwrap_or(0), SeqCst);
}

// ── Logging ─────────────────────────────────────────

fn init_tracing(debug_logging: bool) {
    let filter = if debug_logging { "traystack=debug" } else { "traystack=info" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_ansi(false);

    // In den Host injiziert gibt es kein brauchbares stderr, Logfile daneben.
    match std::fs::File::create(LOG_FILE) {
        Ok(file) => {
            let _ = builder.with_writer(Mutex::new(file)).try_init();
        }
        Err(_) => {
            let _ = builder.try_init();
        }
    }
}

// ── Lifecycle-Exports ───────────────────────────────
// Der Loader ruft diese vier Punkte: init, after-init (Retry nachdem der
// Host seine Module nachgeladen hat), settings-changed, uninit.

#[no_mangle]
pub extern "C" fn mod_init() -> bool {
    let settings = Settings::load(Path::new(SETTINGS_FILE));
    init_tracing(settings.debug_logging);
    info!("=== TrayStack init ===");

    let ctx = CONTEXT.get_or_init(|| ModContext::new(settings));
    {
        let mut patcher = patcher().lock().unwrap();
        ctx.init(&Win32Symbols, &mut *patcher, &replacements());
    }
    sync_trampolines(ctx);
    true
}

#[no_mangle]
pub extern "C" fn mod_after_init() {
    let Some(ctx) = CONTEXT.get() else { return };
    debug!("after-init");
    {
        let mut patcher = patcher().lock().unwrap();
        ctx.after_init(&Win32Symbols, &mut *patcher, &replacements());
    }
    sync_trampolines(ctx);
}

#[no_mangle]
pub extern "C" fn mod_settings_changed() {
    let Some(ctx) = CONTEXT.get() else { return };
    let settings = Settings::load(Path::new(SETTINGS_FILE));
    ctx.settings_changed(settings);
}

#[no_mangle]
pub extern "C" fn mod_uninit() {
    let Some(ctx) = CONTEXT.get() else { return };
    info!("=== TrayStack uninit ===");

    // Reihenfolge: erst Unloading-Flag (Callbacks werden pass-through),
    // dann Patches zurücknehmen, erst danach Trampoline invalidieren.
    {
        let mut patcher = patcher().lock().unwrap();
        ctx.uninit(&mut *patcher);
    }
    MEASURE_TRAMPOLINE.store(0, SeqCst);
    ICON_CTOR_TRAMPOLINE.store(0, SeqCst);
}
