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

use sea_orm::ConnectionTrait;
use sea_orm::entity::*;
use sea_orm::sea_query::OnConflict;
use std::collections::BTreeMap;

use crate::db::entity::{
    identity_extra_info as db_identity_extra_info,
    prelude::IdentityExtraInfo as DbIdentityExtraInfo,
};
use crate::identity::backend::error::{IdentityDatabaseError, db_err};

/// Merge extra info entries. Existing keys get the new value, other stored
/// keys stay untouched.
pub(super) async fn merge<C: ConnectionTrait>(
    db: &C,
    username: &str,
    info: &BTreeMap<String, String>,
) -> Result<(), IdentityDatabaseError> {
    if info.is_empty() {
        return Ok(());
    }
    DbIdentityExtraInfo::insert_many(info.iter().map(|(key, value)| {
        db_identity_extra_info::ActiveModel {
            username: Set(username.to_string()),
            key: Set(key.clone()),
            value: Set(value.clone()),
        }
    }))
    .on_conflict(
        OnConflict::columns([
            db_identity_extra_info::Column::Username,
            db_identity_extra_info::Column::Key,
        ])
        .update_column(db_identity_extra_info::Column::Value)
        .to_owned(),
    )
    .exec_without_returning(db)
    .await
    .map_err(|err| db_err(err, "merging identity extra info"))?;
    Ok(())
}
