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
use sea_orm::sea_query::Expr;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use uuid::Uuid;

use super::{extra_info, group, public_key, ssh_key, unique_strings};
use crate::db::entity::{identity as db_identity, prelude::Identity as DbIdentity};
use crate::identity::backend::error::{IdentityDatabaseError, conflict_as, db_err};
use crate::identity::types::Identity;

const DUPLICATE_USER: &str = "cannot add user: duplicate username or external_id";
const DUPLICATE_AGENT: &str = "cannot add agent: duplicate username";

fn new_identity(identity: &Identity) -> db_identity::ActiveModel {
    db_identity::ActiveModel {
        id: Set(Uuid::new_v4().simple().to_string()),
        username: Set(identity.username.clone()),
        external_id: Set(identity.external_id.clone()),
        owner: Set(identity.owner.clone()),
        email: Set(identity.email.clone()),
        display_name: Set(identity.display_name.clone()),
        avatar_id: Set(identity.avatar_id.clone()),
        last_login: Set(identity.last_login.map(|x| x.naive_utc())),
    }
}

async fn insert_identity<C: ConnectionTrait>(
    db: &C,
    identity: &Identity,
    duplicate: &str,
) -> Result<(), IdentityDatabaseError> {
    DbIdentity::insert(new_identity(identity))
        .exec_without_returning(db)
        .await
        .map_err(|err| conflict_as(db_err(err, "inserting identity"), duplicate))?;
    Ok(())
}

/// Create or merge a user keyed by (username, external_id).
///
/// A first time upsert racing with another one for the same username or
/// external id is arbitrated by the unique indexes: the loser gets a
/// conflict and its transaction is rolled back.
pub async fn upsert_user(
    db: &DatabaseConnection,
    identity: &Identity,
) -> Result<(), IdentityDatabaseError> {
    let txn = db
        .begin()
        .await
        .map_err(|err| db_err(err, "starting transaction for upserting user"))?;

    let mut update = DbIdentity::update_many()
        .col_expr(
            db_identity::Column::Email,
            Expr::value(identity.email.clone()),
        )
        .col_expr(
            db_identity::Column::DisplayName,
            Expr::value(identity.display_name.clone()),
        )
        .col_expr(
            db_identity::Column::AvatarId,
            Expr::value(identity.avatar_id.clone()),
        );
    if let Some(last_login) = identity.last_login {
        update = update.col_expr(
            db_identity::Column::LastLogin,
            Expr::value(last_login.naive_utc()),
        );
    }
    let updated = update
        .filter(db_identity::Column::Username.eq(identity.username.as_str()))
        .filter(db_identity::Column::ExternalId.eq(identity.external_id.clone()))
        .exec(&txn)
        .await
        .map_err(|err| db_err(err, "updating user"))?;
    if updated.rows_affected == 0 {
        insert_identity(&txn, identity, DUPLICATE_USER).await?;
    }

    group::insert(&txn, &identity.username, &unique_strings(&identity.groups)).await?;
    ssh_key::insert(&txn, &identity.username, &unique_strings(&identity.ssh_keys)).await?;
    extra_info::merge(&txn, &identity.username, &identity.extra_info).await?;

    txn.commit()
        .await
        .map_err(|err| db_err(err, "committing user"))?;
    Ok(())
}

/// Create or update an agent keyed by (username, owner). Groups and public
/// keys are replaced.
pub async fn upsert_agent(
    db: &DatabaseConnection,
    identity: &Identity,
) -> Result<(), IdentityDatabaseError> {
    let txn = db
        .begin()
        .await
        .map_err(|err| db_err(err, "starting transaction for upserting agent"))?;

    let mut update = DbIdentity::update_many().col_expr(
        db_identity::Column::Owner,
        Expr::value(identity.owner.clone()),
    );
    if let Some(last_login) = identity.last_login {
        update = update.col_expr(
            db_identity::Column::LastLogin,
            Expr::value(last_login.naive_utc()),
        );
    }
    let updated = update
        .filter(db_identity::Column::Username.eq(identity.username.as_str()))
        .filter(db_identity::Column::Owner.eq(identity.owner.clone()))
        .exec(&txn)
        .await
        .map_err(|err| db_err(err, "updating agent"))?;
    if updated.rows_affected == 0 {
        insert_identity(&txn, identity, DUPLICATE_AGENT).await?;
    }

    group::replace(&txn, &identity.username, &unique_strings(&identity.groups)).await?;
    public_key::replace(&txn, &identity.username, &identity.public_keys).await?;

    txn.commit()
        .await
        .map_err(|err| db_err(err, "committing agent"))?;
    Ok(())
}
