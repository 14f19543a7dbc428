use crate::entities::prelude::*;
use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::Schema;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Settings seeded on first run. The superadmin page edits these in place.
const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("forum_name", "Ember Forum"),
    ("header_msg", ""),
    ("signup_disabled", "0"),
    ("group_creation_disabled", "0"),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(
                schema
                    .create_table_from_entity(Users)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(ResetTokens)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(Settings)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                schema
                    .create_table_from_entity(ExtraNotes)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        for (name, value) in DEFAULT_SETTINGS {
            let insert = sea_orm_migration::sea_query::Query::insert()
                .into_table(Settings)
                .columns([
                    crate::entities::settings::Column::Name,
                    crate::entities::settings::Column::Value,
                ])
                .values_panic([(*name).into(), (*value).into()])
                .to_owned();
            manager.exec_stmt(insert).await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExtraNotes).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Settings).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ResetTokens).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users).to_owned())
            .await?;

        Ok(())
    }
}
