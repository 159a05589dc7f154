use chrono::{Duration, Utc};
use fakeit::{company, hipster};
use rand::{thread_rng, Rng};
use sea_orm::{entity::prelude::*, ActiveValue::NotSet, Set};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub id: i32,
    pub name: String,
    pub category: String,
    pub manufacturer: String,
    pub expiry_date: Date,
    pub current_stock: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inspection::Entity")]
    Inspection,
    #[sea_orm(has_many = "super::sale::Entity")]
    Sale,
    #[sea_orm(has_many = "super::alert::Entity")]
    Alert,
    #[sea_orm(has_many = "super::prediction::Entity")]
    Prediction,
}

impl Related<super::inspection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Inspection.def()
    }
}

impl Related<super::sale::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sale.def()
    }
}

impl Related<super::alert::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Alert.def()
    }
}

impl Related<super::prediction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prediction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

const CATEGORIES: &[&str] = &["Tablet", "Capsule", "Syrup", "Ointment", "Powder"];

impl ActiveModel {
    pub fn new(
        name: String,
        category: String,
        manufacturer: String,
        expiry_date: Date,
        current_stock: i32,
    ) -> Self {
        Self {
            id: NotSet,
            name: Set(name),
            category: Set(category),
            manufacturer: Set(manufacturer),
            expiry_date: Set(expiry_date),
            current_stock: Set(current_stock),
        }
    }

    pub fn rand_fake_new() -> Self {
        let mut rng = thread_rng();
        Self {
            id: NotSet,
            name: Set(hipster::sentence(2)),
            category: Set(CATEGORIES[rng.gen_range(0..CATEGORIES.len())].to_owned()),
            manufacturer: Set(company::company()),
            expiry_date: Set(Utc::now().date_naive() + Duration::days(rng.gen_range(30..720))),
            current_stock: Set(rng.gen_range(0..100)),
        }
    }
}
