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
use std::collections::BTreeSet;

use crate::db::entity::{
    identity_ssh_key as db_identity_ssh_key, prelude::IdentitySshKey as DbIdentitySshKey,
};
use crate::identity::backend::error::{IdentityDatabaseError, db_err};

/// Add SSH keys, keeping the ones already present.
pub(super) async fn insert<C: ConnectionTrait>(
    db: &C,
    username: &str,
    keys: &BTreeSet<String>,
) -> Result<(), IdentityDatabaseError> {
    if keys.is_empty() {
        return Ok(());
    }
    DbIdentitySshKey::insert_many(keys.iter().map(|key| db_identity_ssh_key::ActiveModel {
        username: Set(username.to_string()),
        ssh_key: Set(key.clone()),
    }))
    .on_conflict(
        OnConflict::columns([
            db_identity_ssh_key::Column::Username,
            db_identity_ssh_key::Column::SshKey,
        ])
        .do_nothing()
        .to_owned(),
    )
    .exec_without_returning(db)
    .await
    .map_err(|err| db_err(err, "adding identity ssh keys"))?;
    Ok(())
}
