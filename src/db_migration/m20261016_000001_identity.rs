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
        manager
            .create_table(
                Table::create()
                    .table(Identity::Table)
                    .if_not_exists()
                    .col(string_len(Identity::Id, 64).primary_key())
                    .col(string_len(Identity::Username, 255))
                    .col(string_len_null(Identity::ExternalId, 255))
                    .col(string_len_null(Identity::Owner, 255))
                    .col(string_len_null(Identity::Email, 255))
                    .col(string_len_null(Identity::DisplayName, 255))
                    .col(string_len_null(Identity::AvatarId, 255))
                    .col(date_time_null(Identity::LastLogin))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ixu_identity_username")
                    .table(Identity::Table)
                    .col(Identity::Username)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // NULL external ids never collide, agents leave it unset.
        manager
            .create_index(
                Index::create()
                    .name("ixu_identity_external_id")
                    .table(Identity::Table)
                    .col(Identity::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdentityGroup::Table)
                    .if_not_exists()
                    .col(string_len(IdentityGroup::Username, 255))
                    .col(string_len(IdentityGroup::GroupName, 255))
                    .primary_key(
                        Index::create()
                            .col(IdentityGroup::Username)
                            .col(IdentityGroup::GroupName),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-identity-group-identity")
                            .from(IdentityGroup::Table, IdentityGroup::Username)
                            .to(Identity::Table, Identity::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdentitySshKey::Table)
                    .if_not_exists()
                    .col(string_len(IdentitySshKey::Username, 255))
                    .col(string_len(IdentitySshKey::SshKey, 2048))
                    .primary_key(
                        Index::create()
                            .col(IdentitySshKey::Username)
                            .col(IdentitySshKey::SshKey),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-identity-ssh-key-identity")
                            .from(IdentitySshKey::Table, IdentitySshKey::Username)
                            .to(Identity::Table, Identity::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdentityPublicKey::Table)
                    .if_not_exists()
                    .col(string_len(IdentityPublicKey::Username, 255))
                    .col(string_len(IdentityPublicKey::PublicKey, 64))
                    .primary_key(
                        Index::create()
                            .col(IdentityPublicKey::Username)
                            .col(IdentityPublicKey::PublicKey),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-identity-public-key-identity")
                            .from(IdentityPublicKey::Table, IdentityPublicKey::Username)
                            .to(Identity::Table, Identity::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdentityExtraInfo::Table)
                    .if_not_exists()
                    .col(string_len(IdentityExtraInfo::Username, 255))
                    .col(string_len(IdentityExtraInfo::Key, 255))
                    .col(text(IdentityExtraInfo::Value))
                    .primary_key(
                        Index::create()
                            .col(IdentityExtraInfo::Username)
                            .col(IdentityExtraInfo::Key),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-identity-extra-info-identity")
                            .from(IdentityExtraInfo::Table, IdentityExtraInfo::Username)
                            .to(Identity::Table, Identity::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IdentityExtraInfo::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdentityPublicKey::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdentitySshKey::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(IdentityGroup::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Identity::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Identity {
    Table,
    Id,
    Username,
    ExternalId,
    Owner,
    Email,
    DisplayName,
    AvatarId,
    LastLogin,
}

#[derive(DeriveIden)]
enum IdentityGroup {
    Table,
    Username,
    GroupName,
}

#[derive(DeriveIden)]
enum IdentitySshKey {
    Table,
    Username,
    SshKey,
}

#[derive(DeriveIden)]
enum IdentityPublicKey {
    Table,
    Username,
    PublicKey,
}

#[derive(DeriveIden)]
enum IdentityExtraInfo {
    Table,
    Username,
    Key,
    Value,
}
