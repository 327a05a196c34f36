// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pieces shared by the root key binaries and servers

pub mod authn;
pub mod backoff;
pub mod cmd;
pub mod transport;
