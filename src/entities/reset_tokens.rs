use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "reset_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Random 64-char hex string. Sole bearer credential for a reset.
    #[sea_orm(unique)]
    pub token: String,

    pub username: String,

    pub created_at: String,

    /// Unix seconds. Tokens past this instant are dead.
    pub expires_at: i64,

    /// Set exactly once, by the redemption that wins.
    pub consumed: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
