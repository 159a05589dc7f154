use crate::entity::{product, schema_setup};
use anyhow::{Context, Result};
use futures::future::join_all;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, TransactionTrait};

pub struct Config {
    pub product_count: u32,
    pub txn_size: u32,
    pub concurrent: u32,
}

pub async fn execute(db: &DatabaseConnection, config: Config) -> Result<()> {
    schema_setup(db).await.context("Failed to setup schema")?;
    insert_products(db, &config)
        .await
        .context("Failed to insert products")?;
    println!("seeded {} products", config.product_count);
    Ok(())
}

async fn insert_products(db: &DatabaseConnection, config: &Config) -> Result<()> {
    let mut handles = Vec::new();
    for i in 0..config.concurrent {
        let db = db.clone();
        let count = config.product_count;
        let concurrent = config.concurrent;
        let txn_size_limit = config.txn_size;
        let handle = tokio::spawn(async move {
            let mut unit_count = count / concurrent;
            if i == concurrent - 1 {
                unit_count += count - (unit_count * concurrent);
            }
            while unit_count > 0 {
                let txn_size = txn_size_limit.min(unit_count);
                unit_count -= txn_size;
                db.transaction::<_, (), DbErr>(|txn| {
                    Box::pin(async move {
                        for _ in 0..txn_size {
                            product::ActiveModel::rand_fake_new().insert(txn).await?;
                        }
                        Ok(())
                    })
                })
                .await?;
            }
            Ok::<(), sea_orm::TransactionError<DbErr>>(())
        });
        handles.push(handle);
    }
    for handle in join_all(handles).await {
        handle??;
    }
    Ok(())
}
