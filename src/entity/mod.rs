use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};

pub mod alert;
pub mod inspection;
pub mod prediction;
pub mod product;
pub mod sale;

async fn _schema_setup<E>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let schema = Schema::new(db.get_database_backend());
    let mut create_stmt = schema.create_table_from_entity(entity);
    create_stmt.if_not_exists();
    db.execute(db.get_database_backend().build(&create_stmt))
        .await?;
    Ok(())
}

/// Creates any missing tables. Products first, the rest reference it.
pub async fn schema_setup(db: &DatabaseConnection) -> Result<(), DbErr> {
    _schema_setup(db, product::Entity).await?;
    _schema_setup(db, inspection::Entity).await?;
    _schema_setup(db, sale::Entity).await?;
    _schema_setup(db, alert::Entity).await?;
    _schema_setup(db, prediction::Entity).await?;
    tracing::debug!("database schema ready");
    Ok(())
}
