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
//! Username syntax.
use regex::Regex;
use std::sync::LazyLock;

const NAME: &str = "[a-zA-Z0-9](?:[a-zA-Z0-9.+-]*[a-zA-Z0-9])?";

static USER_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!("^{NAME}$")).ok());

static USER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!("^{NAME}(?:@{NAME})?$")).ok());

/// Whether `name` is a plain user name, without a domain.
pub fn is_valid_user_name(name: &str) -> bool {
    USER_NAME.as_ref().is_some_and(|re| re.is_match(name))
}

/// Whether `name` is a user name, optionally qualified as `name@domain`.
pub fn is_valid_user(name: &str) -> bool {
    USER.as_ref().is_some_and(|re| re.is_match(name))
}

/// Split an agent username into its name and owner parts when both are
/// valid.
pub fn split_agent(username: &str) -> Option<(&str, &str)> {
    let (name, owner) = username.split_once('@')?;
    (is_valid_user_name(name) && is_valid_user(owner)).then_some((name, owner))
}
