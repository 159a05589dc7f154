use chrono::Utc;
use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};

/// The demand figures are uniform random draws, not forecasts.
pub const MODEL_USED: &str = "SimulatedModel";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "demand_predictions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i32,
    pub product_id: i32,
    pub predicted_date: Date,
    pub predicted_demand: i32,
    pub model_used: String,
    pub prediction_time: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub fn new(product_id: i32, predicted_date: Date, predicted_demand: i32) -> Self {
        Self {
            id: NotSet,
            product_id: Set(product_id),
            predicted_date: Set(predicted_date),
            predicted_demand: Set(predicted_demand),
            model_used: Set(MODEL_USED.to_owned()),
            prediction_time: Set(Utc::now().naive_utc()),
        }
    }
}
