// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0
//! # Identity broker core
//!
//! Building blocks of an identity broker that federates external identity
//! providers and discharges third party caveats:
//!
//! - [`pool`]: generic bounded session pool and recycle list,
//! - [`store`]: the broker pool handing out [`store::Store`] handles,
//! - [`meeting`]: the rendezvous ("meeting place") between a login
//!   completion and a waiting request,
//! - [`identity`]: the identity repository,
//! - [`authz`]: ACL resolution for discharge time authorization,
//! - [`idp`]: login variants completing a rendezvous.

pub mod api;
pub mod authz;
pub mod config;
pub mod db;
pub mod db_migration;
pub mod error;
pub mod identity;
pub mod idp;
pub mod meeting;
pub mod metrics;
pub mod pool;
pub mod store;

#[cfg(test)]
mod tests;
