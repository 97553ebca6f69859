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

use sea_orm::entity::*;
use sea_orm::query::*;
use sea_orm::{ConnectionTrait, PaginatorTrait};
use std::collections::BTreeMap;

use crate::db::entity::{
    identity as db_identity, identity_extra_info as db_identity_extra_info,
    identity_group as db_identity_group, identity_public_key as db_identity_public_key,
    identity_ssh_key as db_identity_ssh_key,
    prelude::{
        Identity as DbIdentity, IdentityExtraInfo as DbIdentityExtraInfo,
        IdentityGroup as DbIdentityGroup, IdentityPublicKey as DbIdentityPublicKey,
        IdentitySshKey as DbIdentitySshKey,
    },
};
use crate::identity::backend::error::{IdentityDatabaseError, db_err};
use crate::identity::types::{Identity, PublicKey};

pub async fn get<C: ConnectionTrait, U: AsRef<str>>(
    db: &C,
    username: U,
) -> Result<Option<Identity>, IdentityDatabaseError> {
    let username = username.as_ref();
    let Some(row) = DbIdentity::find()
        .filter(db_identity::Column::Username.eq(username))
        .one(db)
        .await
        .map_err(|err| db_err(err, "fetching identity"))?
    else {
        return Ok(None);
    };

    let mut groups: Vec<String> = DbIdentityGroup::find()
        .select_only()
        .column(db_identity_group::Column::GroupName)
        .filter(db_identity_group::Column::Username.eq(username))
        .into_tuple()
        .all(db)
        .await
        .map_err(|err| db_err(err, "fetching identity groups"))?;
    groups.sort();

    let mut ssh_keys: Vec<String> = DbIdentitySshKey::find()
        .select_only()
        .column(db_identity_ssh_key::Column::SshKey)
        .filter(db_identity_ssh_key::Column::Username.eq(username))
        .into_tuple()
        .all(db)
        .await
        .map_err(|err| db_err(err, "fetching identity ssh keys"))?;
    ssh_keys.sort();

    let encoded_keys: Vec<String> = DbIdentityPublicKey::find()
        .select_only()
        .column(db_identity_public_key::Column::PublicKey)
        .filter(db_identity_public_key::Column::Username.eq(username))
        .into_tuple()
        .all(db)
        .await
        .map_err(|err| db_err(err, "fetching identity public keys"))?;
    let mut public_keys = encoded_keys
        .iter()
        .map(|key| PublicKey::try_from(key.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| IdentityDatabaseError::PublicKey {
            username: username.to_string(),
            source,
        })?;
    public_keys.sort();

    let extra_info: BTreeMap<String, String> = DbIdentityExtraInfo::find()
        .filter(db_identity_extra_info::Column::Username.eq(username))
        .all(db)
        .await
        .map_err(|err| db_err(err, "fetching identity extra info"))?
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect();

    Ok(Some(Identity {
        username: row.username,
        external_id: row.external_id,
        owner: row.owner,
        email: row.email,
        display_name: row.display_name,
        avatar_id: row.avatar_id,
        groups,
        ssh_keys,
        public_keys,
        extra_info,
        last_login: row.last_login.map(|x| x.and_utc()),
    }))
}

pub async fn count<C: ConnectionTrait>(db: &C) -> Result<u64, IdentityDatabaseError> {
    DbIdentity::find()
        .count(db)
        .await
        .map_err(|err| db_err(err, "counting identities"))
}

/// Fail with [`IdentityDatabaseError::IdentityNotFound`] unless the username
/// is known.
pub(super) async fn ensure_exists<C: ConnectionTrait>(
    db: &C,
    username: &str,
) -> Result<(), IdentityDatabaseError> {
    let count = DbIdentity::find()
        .filter(db_identity::Column::Username.eq(username))
        .count(db)
        .await
        .map_err(|err| db_err(err, "looking up identity"))?;
    if count == 0 {
        return Err(IdentityDatabaseError::IdentityNotFound(username.to_string()));
    }
    Ok(())
}
