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

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(meeting_table()).await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_meeting_category_created_at")
                    .table(Meeting::Table)
                    .col(Meeting::Category)
                    .col(Meeting::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Meeting::Table).to_owned())
            .await?;

        Ok(())
    }
}

/// The category defaults to the address, so both are unbounded.
fn meeting_table() -> TableCreateStatement {
    Table::create()
        .table(Meeting::Table)
        .if_not_exists()
        .col(string_len(Meeting::Id, 255).primary_key())
        .col(text(Meeting::Category))
        .col(text(Meeting::Address))
        .col(big_integer(Meeting::CreatedAt))
        .to_owned()
}

#[derive(DeriveIden)]
enum Meeting {
    Table,
    Id,
    Category,
    Address,
    CreatedAt,
}
