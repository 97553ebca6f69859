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
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::collections::BTreeSet;

use super::identity::ensure_exists;
use crate::db::entity::{
    identity_public_key as db_identity_public_key,
    prelude::IdentityPublicKey as DbIdentityPublicKey,
};
use crate::identity::backend::error::{IdentityDatabaseError, db_err};
use crate::identity::types::PublicKey;

/// Drop every public key of the identity and store the given ones instead.
pub(super) async fn replace<C: ConnectionTrait>(
    db: &C,
    username: &str,
    keys: &[PublicKey],
) -> Result<(), IdentityDatabaseError> {
    DbIdentityPublicKey::delete_many()
        .filter(db_identity_public_key::Column::Username.eq(username))
        .exec(db)
        .await
        .map_err(|err| db_err(err, "deleting identity public keys"))?;

    let keys: BTreeSet<&PublicKey> = keys.iter().collect();
    if keys.is_empty() {
        return Ok(());
    }
    DbIdentityPublicKey::insert_many(keys.into_iter().map(|key| {
        db_identity_public_key::ActiveModel {
            username: Set(username.to_string()),
            public_key: Set(key.to_base64()),
        }
    }))
    .on_conflict(
        OnConflict::columns([
            db_identity_public_key::Column::Username,
            db_identity_public_key::Column::PublicKey,
        ])
        .do_nothing()
        .to_owned(),
    )
    .exec_without_returning(db)
    .await
    .map_err(|err| db_err(err, "adding identity public keys"))?;
    Ok(())
}

pub async fn set<U: AsRef<str>>(
    db: &DatabaseConnection,
    username: U,
    keys: &[PublicKey],
) -> Result<(), IdentityDatabaseError> {
    let username = username.as_ref();
    let txn = db
        .begin()
        .await
        .map_err(|err| db_err(err, "starting transaction for setting public keys"))?;
    ensure_exists(&txn, username).await?;
    replace(&txn, username, keys).await?;
    txn.commit()
        .await
        .map_err(|err| db_err(err, "committing identity public keys"))?;
    Ok(())
}
