// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Test doubles: an in-memory foreign graph with reference counting, a
//! fixture symbol table, and a recording patcher. Everything the portable
//! core needs to run without a host process.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::foreign::{Capability, ForeignError, HAlign, Orientation, Thickness, UiNode};
use crate::hooks::{CodePatcher, HookError};
use crate::symbols::{Address, ModuleHandle, SymbolSource};

// ── Mock-Graph ──────────────────────────────────────

struct NodeState {
    class: String,
    display_name: String,
    caps: Vec<Capability>,
    children: Vec<usize>,
    parent: Option<usize>,
    margin: Thickness,
    alignment: HAlign,
    size: f64,
    orientation: Orientation,
    spacing: f64,
    fail_calls: bool,
}

struct GraphCore {
    nodes: RefCell<Vec<NodeState>>,
    acquires: Cell<usize>,
    releases: Cell<usize>,
    writes: Cell<usize>,
}

/// Builder and inspector for a fake host UI tree. Hand out [`MockNode`]
/// handles via [`MockGraph::node`]; every handle acquisition and release is
/// counted so tests can assert balance.
pub struct MockGraph {
    core: Rc<GraphCore>,
}

impl MockGraph {
    pub fn new() -> Self {
        MockGraph {
            core: Rc::new(GraphCore {
                nodes: RefCell::new(Vec::new()),
                acquires: Cell::new(0),
                releases: Cell::new(0),
                writes: Cell::new(0),
            }),
        }
    }

    fn add(&self, class: &str, caps: Vec<Capability>) -> usize {
        let mut nodes = self.core.nodes.borrow_mut();
        nodes.push(NodeState {
            class: class.to_string(),
            display_name: String::new(),
            caps,
            children: Vec::new(),
            parent: None,
            margin: Thickness::ZERO,
            alignment: HAlign::Stretch,
            size: f64::NAN,
            orientation: Orientation::Horizontal,
            spacing: 0.0,
            fail_calls: false,
        });
        nodes.len() - 1
    }

    /// Plain element: queryable as FrameworkElement only.
    pub fn add_element(&self, class: &str) -> usize {
        self.add(class, vec![Capability::FrameworkElement])
    }

    /// Container element: FrameworkElement + Panel + StackPanel.
    pub fn add_panel(&self, class: &str) -> usize {
        self.add(
            class,
            vec![Capability::FrameworkElement, Capability::Panel, Capability::StackPanel],
        )
    }

    pub fn attach(&self, parent: usize, child: usize) {
        let mut nodes = self.core.nodes.borrow_mut();
        nodes[parent].children.push(child);
        nodes[child].parent = Some(parent);
    }

    /// First node ever added, the conventional tree root in tests.
    pub fn root(&self) -> usize {
        0
    }

    /// Acquire a live handle on `id`.
    pub fn node(&self, id: usize) -> MockNode {
        self.core.acquires.set(self.core.acquires.get() + 1);
        MockNode { core: Rc::clone(&self.core), id }
    }

    // ── Fehlerinjektion / Umbau ─────────────────────

    /// Every host call on this node fails from now on.
    pub fn fail_calls_on(&self, id: usize) {
        self.core.nodes.borrow_mut()[id].fail_calls = true;
    }

    /// Node loses every capability (still traversable from its parent).
    pub fn strip_capabilities(&self, id: usize) {
        self.core.nodes.borrow_mut()[id].caps.clear();
    }

    pub fn set_display_name(&self, id: usize, name: &str) {
        self.core.nodes.borrow_mut()[id].display_name = name.to_string();
    }

    // ── Inspektion (liest den Zustand direkt, nicht über UiNode) ──

    pub fn parent_of(&self, id: usize) -> Option<usize> {
        self.core.nodes.borrow()[id].parent
    }

    pub fn child_of(&self, id: usize, index: usize) -> usize {
        self.core.nodes.borrow()[id].children[index]
    }

    pub fn margin_of(&self, id: usize) -> Thickness {
        self.core.nodes.borrow()[id].margin
    }

    pub fn alignment_of(&self, id: usize) -> HAlign {
        self.core.nodes.borrow()[id].alignment
    }

    /// Fixed size of a node; `NaN` while auto-sized.
    pub fn size_of(&self, id: usize) -> f64 {
        self.core.nodes.borrow()[id].size
    }

    pub fn orientation_of(&self, id: usize) -> Orientation {
        self.core.nodes.borrow()[id].orientation
    }

    pub fn spacing_of(&self, id: usize) -> f64 {
        self.core.nodes.borrow()[id].spacing
    }

    pub fn acquires(&self) -> usize {
        self.core.acquires.get()
    }

    pub fn releases(&self) -> usize {
        self.core.releases.get()
    }

    /// Number of mutating writes that reached the graph.
    pub fn write_count(&self) -> usize {
        self.core.writes.get()
    }
}

/// One counted reference into a [`MockGraph`].
pub struct MockNode {
    core: Rc<GraphCore>,
    id: usize,
}

impl MockNode {
    pub fn id(&self) -> usize {
        self.id
    }

    fn state<R>(&self, read: impl FnOnce(&NodeState) -> R) -> R {
        read(&self.core.nodes.borrow()[self.id])
    }

    fn check_alive(&self) -> Result<(), ForeignError> {
        if self.state(|n| n.fail_calls) {
            Err(ForeignError::CallFailed("injected failure".into()))
        } else {
            Ok(())
        }
    }

    fn acquire(&self, id: usize) -> MockNode {
        self.core.acquires.set(self.core.acquires.get() + 1);
        MockNode { core: Rc::clone(&self.core), id }
    }

    fn write(&self, mutate: impl FnOnce(&mut NodeState)) {
        self.core.writes.set(self.core.writes.get() + 1);
        mutate(&mut self.core.nodes.borrow_mut()[self.id]);
    }
}

impl Clone for MockNode {
    fn clone(&self) -> Self {
        self.acquire(self.id)
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.core.releases.set(self.core.releases.get() + 1);
    }
}

impl UiNode for MockNode {
    fn query(&self, cap: Capability) -> Result<Self, ForeignError> {
        self.check_alive()?;
        if self.state(|n| n.caps.contains(&cap)) {
            Ok(self.acquire(self.id))
        } else {
            Err(ForeignError::Unsupported(cap))
        }
    }

    fn class_name(&self) -> Result<String, ForeignError> {
        self.check_alive()?;
        Ok(self.state(|n| n.class.clone()))
    }

    fn display_name(&self) -> Result<String, ForeignError> {
        self.check_alive()?;
        Ok(self.state(|n| n.display_name.clone()))
    }

    fn child_count(&self) -> Result<usize, ForeignError> {
        self.check_alive()?;
        Ok(self.state(|n| n.children.len()))
    }

    fn child_at(&self, index: usize) -> Result<Self, ForeignError> {
        self.check_alive()?;
        match self.state(|n| n.children.get(index).copied()) {
            Some(child) => Ok(self.acquire(child)),
            None => Err(ForeignError::CallFailed(format!("stale child index {index}"))),
        }
    }

    fn parent(&self) -> Result<Option<Self>, ForeignError> {
        self.check_alive()?;
        Ok(self.state(|n| n.parent).map(|id| self.acquire(id)))
    }

    fn set_margin(&self, margin: Thickness) -> Result<(), ForeignError> {
        self.check_alive()?;
        if !self.state(|n| n.caps.contains(&Capability::FrameworkElement)) {
            return Err(ForeignError::Unsupported(Capability::FrameworkElement));
        }
        self.write(|n| n.margin = margin);
        Ok(())
    }

    fn set_alignment(&self, align: HAlign) -> Result<(), ForeignError> {
        self.check_alive()?;
        if !self.state(|n| n.caps.contains(&Capability::FrameworkElement)) {
            return Err(ForeignError::Unsupported(Capability::FrameworkElement));
        }
        self.write(|n| n.alignment = align);
        Ok(())
    }

    fn set_fixed_size(&self, side: f64) -> Result<(), ForeignError> {
        self.check_alive()?;
        if !self.state(|n| n.caps.contains(&Capability::FrameworkElement)) {
            return Err(ForeignError::Unsupported(Capability::FrameworkElement));
        }
        self.write(|n| n.size = side);
        Ok(())
    }

    fn set_orientation(&self, orientation: Orientation) -> Result<(), ForeignError> {
        self.check_alive()?;
        if !self.state(|n| n.caps.contains(&Capability::StackPanel)) {
            return Err(ForeignError::Unsupported(Capability::StackPanel));
        }
        self.write(|n| n.orientation = orientation);
        Ok(())
    }

    fn set_spacing(&self, spacing: f64) -> Result<(), ForeignError> {
        self.check_alive()?;
        if !self.state(|n| n.caps.contains(&Capability::StackPanel)) {
            return Err(ForeignError::Unsupported(Capability::StackPanel));
        }
        self.write(|n| n.spacing = spacing);
        Ok(())
    }
}

// ── Mock-Symboltabelle ──────────────────────────────

/// Fixture module/symbol tables. Modules can be added after construction to
/// model the host loading them late.
pub struct MockSymbols {
    modules: Vec<String>,
    symbols: HashMap<(usize, String), Address>,
}

impl MockSymbols {
    pub fn new() -> Self {
        MockSymbols { modules: Vec::new(), symbols: HashMap::new() }
    }

    pub fn add_module(&mut self, name: &str) {
        if !self.modules.iter().any(|m| m == name) {
            self.modules.push(name.to_string());
        }
    }

    pub fn add_symbol(&mut self, module: &str, mangled: &str, address: Address) {
        self.add_module(module);
        let index = self.modules.iter().position(|m| m == module).unwrap();
        self.symbols.insert((index, mangled.to_string()), address);
    }
}

impl SymbolSource for MockSymbols {
    fn module(&self, name: &str) -> Option<ModuleHandle> {
        // Handle = Index + 1, damit 0 nie ein gültiges Modul ist.
        self.modules.iter().position(|m| m == name).map(|i| ModuleHandle(i + 1))
    }

    fn symbol(&self, module: ModuleHandle, mangled: &str) -> Option<Address> {
        self.symbols.get(&(module.0 - 1, mangled.to_string())).copied()
    }
}

// ── Mock-Patcher ────────────────────────────────────

/// Records patches instead of writing code. Trampolines are synthesized
/// deterministically so tests can predict them.
pub struct MockPatcher {
    patched: HashMap<Address, Address>,
    patch_calls: usize,
    fail_next: bool,
}

impl MockPatcher {
    pub fn new() -> Self {
        MockPatcher { patched: HashMap::new(), patch_calls: 0, fail_next: false }
    }

    pub fn fail_next_patch(&mut self) {
        self.fail_next = true;
    }

    pub fn is_patched(&self, target: Address) -> bool {
        self.patched.contains_key(&target)
    }

    pub fn patch_calls(&self) -> usize {
        self.patch_calls
    }

    pub fn trampoline_for(&self, target: Address) -> Address {
        target + 0x10
    }
}

impl CodePatcher for MockPatcher {
    fn patch(&mut self, target: Address, replacement: Address) -> Result<Address, HookError> {
        if self.fail_next {
            self.fail_next = false;
            return Err(HookError::PatchFailed("injected failure".into()));
        }
        self.patch_calls += 1;
        self.patched.insert(target, replacement);
        Ok(self.trampoline_for(target))
    }

    fn unpatch(&mut self, target: Address) -> Result<(), HookError> {
        match self.patched.remove(&target) {
            Some(_) => Ok(()),
            None => Err(HookError::UnpatchFailed(format!("0x{target:X} was not patched"))),
        }
    }
}
