use chrono::Utc;
use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};

pub const TYPE_LOW_STOCK: &str = "LowStock";
pub const TYPE_QUALITY_FAIL: &str = "QualityFail";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i32,
    pub product_id: i32,
    pub alert_type: String,
    pub message: String,
    pub timestamp: DateTime,
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
    pub fn new(product_id: i32, alert_type: &str, message: String) -> Self {
        Self {
            id: NotSet,
            product_id: Set(product_id),
            alert_type: Set(alert_type.to_owned()),
            message: Set(message),
            timestamp: Set(Utc::now().naive_utc()),
        }
    }
}
