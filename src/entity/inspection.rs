use chrono::Utc;
use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};

pub const STATUS_PASS: &str = "Pass";
pub const STATUS_FAIL: &str = "Fail";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "quality_inspections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i32,
    pub product_id: i32,
    pub quality_status: String,
    pub confidence_score: f64,
    pub image_path: String,
    pub inspection_time: DateTime,
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
    pub fn new(product_id: i32, quality_status: &str, confidence_score: f64, image_path: String) -> Self {
        Self {
            id: NotSet,
            product_id: Set(product_id),
            quality_status: Set(quality_status.to_owned()),
            confidence_score: Set(confidence_score),
            image_path: Set(image_path),
            inspection_time: Set(Utc::now().naive_utc()),
        }
    }
}
