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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::*;
use sea_orm::query::*;
use sea_orm::sea_query::{Alias, Expr, Func, OnConflict, SimpleExpr};
use sea_orm::{ConnectionTrait, DatabaseConnection};

use super::MeetingBackend;
use super::error::{MeetingDatabaseError, db_err};
use crate::db::entity::{meeting as db_meeting, prelude::Meeting as DbMeeting};
use crate::meeting::error::MeetingError;
use crate::meeting::types::{Meeting, Removed};

#[derive(Clone, Debug, Default)]
pub struct SqlBackend {}

fn from_micros(id: &str, created_at: i64) -> Result<DateTime<Utc>, MeetingDatabaseError> {
    DateTime::from_timestamp_micros(created_at).ok_or_else(|| MeetingDatabaseError::CreatedAt {
        id: id.to_string(),
        created_at,
    })
}

impl TryFrom<db_meeting::Model> for Meeting {
    type Error = MeetingDatabaseError;

    fn try_from(value: db_meeting::Model) -> Result<Self, Self::Error> {
        let created_at = from_micros(&value.id, value.created_at)?;
        Ok(Self {
            id: value.id,
            category: value.category,
            address: value.address,
            created_at,
        })
    }
}

/// Case sensitive prefix match on the category. `LIKE` folds ASCII case on
/// SQLite.
fn category_starts_with(prefix: &str) -> SimpleExpr {
    let len = i32::try_from(prefix.chars().count()).unwrap_or(i32::MAX);
    Expr::expr(
        Func::cust(Alias::new("substr"))
            .arg(Expr::col((db_meeting::Entity, db_meeting::Column::Category)))
            .arg(1)
            .arg(len),
    )
    .eq(prefix)
}

pub async fn put<C: ConnectionTrait>(db: &C, entry: &Meeting) -> Result<(), MeetingDatabaseError> {
    DbMeeting::insert(db_meeting::ActiveModel {
        id: Set(entry.id.clone()),
        category: Set(entry.category.clone()),
        address: Set(entry.address.clone()),
        created_at: Set(entry.created_at.timestamp_micros()),
    })
    .on_conflict(
        OnConflict::column(db_meeting::Column::Id)
            .update_columns([
                db_meeting::Column::Category,
                db_meeting::Column::Address,
                db_meeting::Column::CreatedAt,
            ])
            .to_owned(),
    )
    .exec_without_returning(db)
    .await
    .map_err(|err| db_err(err, "storing rendezvous"))?;
    Ok(())
}

pub async fn get<C: ConnectionTrait>(
    db: &C,
    id: &str,
) -> Result<Option<Meeting>, MeetingDatabaseError> {
    DbMeeting::find_by_id(id)
        .one(db)
        .await
        .map_err(|err| db_err(err, "fetching rendezvous"))?
        .map(Meeting::try_from)
        .transpose()
}

/// Delete the entry only if it still is the version that was read, so a
/// concurrent overwrite survives.
pub async fn remove<C: ConnectionTrait>(db: &C, id: &str) -> Result<Removed, MeetingDatabaseError> {
    let Some(row) = DbMeeting::find_by_id(id)
        .one(db)
        .await
        .map_err(|err| db_err(err, "fetching rendezvous"))?
    else {
        return Ok(Removed::Absent);
    };

    let res = DbMeeting::delete_many()
        .filter(db_meeting::Column::Id.eq(id))
        .filter(db_meeting::Column::CreatedAt.eq(row.created_at))
        .exec(db)
        .await
        .map_err(|err| db_err(err, "removing rendezvous"))?;
    if res.rows_affected == 0 {
        return Ok(Removed::Absent);
    }
    Ok(Removed::Consumed {
        created_at: from_micros(&row.id, row.created_at)?,
    })
}

/// Delete the entries created at or before `cutoff` whose category starts
/// with `prefix` and return their ids. Entries refreshed or consumed in the
/// meantime are not reported.
pub async fn remove_old<C: ConnectionTrait>(
    db: &C,
    prefix: &str,
    cutoff: DateTime<Utc>,
) -> Result<Vec<String>, MeetingDatabaseError> {
    let mut delete = DbMeeting::delete_many()
        .filter(db_meeting::Column::CreatedAt.lte(cutoff.timestamp_micros()));
    if !prefix.is_empty() {
        delete = delete.filter(category_starts_with(prefix));
    }
    let mut ids: Vec<String> = delete
        .exec_with_returning(db)
        .await
        .map_err(|err| db_err(err, "removing expired rendezvous"))?
        .into_iter()
        .map(|row| row.id)
        .collect();
    ids.sort();
    Ok(ids)
}

pub async fn count<C: ConnectionTrait>(db: &C) -> Result<u64, MeetingDatabaseError> {
    DbMeeting::find()
        .count(db)
        .await
        .map_err(|err| db_err(err, "counting rendezvous"))
}

#[async_trait]
impl MeetingBackend for SqlBackend {
    async fn put(&self, db: &DatabaseConnection, entry: &Meeting) -> Result<(), MeetingError> {
        Ok(put(db, entry).await?)
    }

    async fn get<'a>(
        &self,
        db: &DatabaseConnection,
        id: &'a str,
    ) -> Result<Option<Meeting>, MeetingError> {
        Ok(get(db, id).await?)
    }

    async fn remove<'a>(
        &self,
        db: &DatabaseConnection,
        id: &'a str,
    ) -> Result<Removed, MeetingError> {
        Ok(remove(db, id).await?)
    }

    async fn remove_old<'a>(
        &self,
        db: &DatabaseConnection,
        prefix: &'a str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, MeetingError> {
        Ok(remove_old(db, prefix, cutoff).await?)
    }

    async fn count(&self, db: &DatabaseConnection) -> Result<u64, MeetingError> {
        Ok(count(db).await?)
    }
}
