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
use super::unique_strings;
use crate::db::entity::{
    identity_group as db_identity_group, prelude::IdentityGroup as DbIdentityGroup,
};
use crate::identity::backend::error::{IdentityDatabaseError, db_err};

/// Add groups, keeping the ones already present.
pub(super) async fn insert<C: ConnectionTrait>(
    db: &C,
    username: &str,
    groups: &BTreeSet<String>,
) -> Result<(), IdentityDatabaseError> {
    if groups.is_empty() {
        return Ok(());
    }
    DbIdentityGroup::insert_many(groups.iter().map(|group| db_identity_group::ActiveModel {
        username: Set(username.to_string()),
        group_name: Set(group.clone()),
    }))
    .on_conflict(
        OnConflict::columns([
            db_identity_group::Column::Username,
            db_identity_group::Column::GroupName,
        ])
        .do_nothing()
        .to_owned(),
    )
    .exec_without_returning(db)
    .await
    .map_err(|err| db_err(err, "adding identity groups"))?;
    Ok(())
}

/// Drop every group of the identity and store the given ones instead.
pub(super) async fn replace<C: ConnectionTrait>(
    db: &C,
    username: &str,
    groups: &BTreeSet<String>,
) -> Result<(), IdentityDatabaseError> {
    DbIdentityGroup::delete_many()
        .filter(db_identity_group::Column::Username.eq(username))
        .exec(db)
        .await
        .map_err(|err| db_err(err, "deleting identity groups"))?;
    insert(db, username, groups).await
}

pub async fn set<U: AsRef<str>>(
    db: &DatabaseConnection,
    username: U,
    groups: &[String],
) -> Result<(), IdentityDatabaseError> {
    let username = username.as_ref();
    let txn = db
        .begin()
        .await
        .map_err(|err| db_err(err, "starting transaction for setting identity groups"))?;
    ensure_exists(&txn, username).await?;
    replace(&txn, username, &unique_strings(groups)).await?;
    txn.commit()
        .await
        .map_err(|err| db_err(err, "committing identity groups"))?;
    Ok(())
}

pub async fn add<U: AsRef<str>>(
    db: &DatabaseConnection,
    username: U,
    groups: &[String],
) -> Result<(), IdentityDatabaseError> {
    let username = username.as_ref();
    let txn = db
        .begin()
        .await
        .map_err(|err| db_err(err, "starting transaction for adding identity groups"))?;
    ensure_exists(&txn, username).await?;
    insert(&txn, username, &unique_strings(groups)).await?;
    txn.commit()
        .await
        .map_err(|err| db_err(err, "committing identity groups"))?;
    Ok(())
}

pub async fn remove<U: AsRef<str>>(
    db: &DatabaseConnection,
    username: U,
    groups: &[String],
) -> Result<(), IdentityDatabaseError> {
    let username = username.as_ref();
    let txn = db
        .begin()
        .await
        .map_err(|err| db_err(err, "starting transaction for removing identity groups"))?;
    ensure_exists(&txn, username).await?;
    if !groups.is_empty() {
        DbIdentityGroup::delete_many()
            .filter(db_identity_group::Column::Username.eq(username))
            .filter(db_identity_group::Column::GroupName.is_in(groups.iter().cloned()))
            .exec(&txn)
            .await
            .map_err(|err| db_err(err, "removing identity groups"))?;
    }
    txn.commit()
        .await
        .map_err(|err| db_err(err, "committing identity groups"))?;
    Ok(())
}
