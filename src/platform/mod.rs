// TrayStack — Vertical Relayout of the System Tray Icon Cluster
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Platform backends. Only the Windows backend exists — everything outside
//! this module is host-agnostic and runs against mocks on any platform.

#[cfg(windows)]
pub mod windows;
