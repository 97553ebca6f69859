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

pub use super::identity::Entity as Identity;
pub use super::identity_extra_info::Entity as IdentityExtraInfo;
pub use super::identity_group::Entity as IdentityGroup;
pub use super::identity_public_key::Entity as IdentityPublicKey;
pub use super::identity_ssh_key::Entity as IdentitySshKey;
pub use super::meeting::Entity as Meeting;
